//! Crawl orchestrator
//!
//! Single logical worker: claim a player from the frontier, fetch the
//! profile and every season it lists, validate and persist the extracted
//! matches, and queue the players they mention one level deeper.
//!
//! Failures are contained at the narrowest scope: one match does not abort
//! its season, one season does not abort the player. Only a failed profile
//! fetch fails the player's queue item.

use crate::config::{Config, SeedEntry};
use crate::crawler::fetcher::{HttpFetcher, PageFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::parser::extract_matches;
use crate::matches::{validate, Finding, ParsedMatch};
use crate::output::QualityReport;
use crate::state::Pacer;
use crate::storage::{
    EntityStore, InsertOutcome, LogLevel, NewMatch, QueueItem, RunStatus, RunStore,
    SqliteStorage, TournamentRecord, ValidationLogEntry,
};
use crate::{FetchError, FetchResult, RallyError, Result};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a claimed player's cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerOutcome {
    Completed,
    /// Stopped at a suspension point; the item stays processing
    Cancelled,
}

/// Main crawl orchestrator
pub struct Coordinator<F: PageFetcher> {
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
    frontier: Frontier,
    fetcher: F,
    pacer: Pacer,
    report: QualityReport,
    run_id: i64,
    cancel: CancellationToken,
}

impl Coordinator<HttpFetcher> {
    /// Opens the configured database and builds the HTTP fetcher
    ///
    /// With `respect-robots`, robots.txt is read once here and its crawl
    /// delay raises the pacer's floor.
    pub async fn from_config(
        config: Config,
        config_hash: &str,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let mut fetcher = HttpFetcher::new(&config)?;
        let mut pacer = Pacer::new(&config.pacing);

        if config.source.respect_robots {
            if let Some(delay) = fetcher.load_robots().await {
                tracing::info!("robots.txt asks for a crawl delay of {:?}", delay);
                pacer.raise_floor(delay);
            }
        }

        Self::with_pacer(config, storage, fetcher, pacer, config_hash, cancel)
    }
}

impl<F: PageFetcher> Coordinator<F> {
    /// Creates a coordinator over an open store and records a new run
    pub fn new(
        config: Config,
        storage: SqliteStorage,
        fetcher: F,
        config_hash: &str,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let pacer = Pacer::new(&config.pacing);
        Self::with_pacer(config, storage, fetcher, pacer, config_hash, cancel)
    }

    fn with_pacer(
        config: Config,
        mut storage: SqliteStorage,
        fetcher: F,
        pacer: Pacer,
        config_hash: &str,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let run_id = storage.create_run(config_hash)?;
        tracing::info!("Created crawl run {}", run_id);

        let storage = Arc::new(Mutex::new(storage));
        let frontier = Frontier::new(Arc::clone(&storage), config.crawler.depth_limit());

        Ok(Self {
            config: Arc::new(config),
            storage,
            frontier,
            fetcher,
            pacer,
            report: QualityReport::new(),
            run_id,
            cancel,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn report(&self) -> &QualityReport {
        &self.report
    }

    fn lock(&self) -> Result<MutexGuard<'_, SqliteStorage>> {
        self.storage
            .lock()
            .map_err(|_| RallyError::Storage("storage lock poisoned".to_string()))
    }

    /// Enqueues seed players at depth 0
    ///
    /// `force_reset` puts already-known players back to pending for a re-scrape.
    pub fn seed(&self, seeds: &[SeedEntry], force_reset: bool) -> Result<usize> {
        let mut queued = 0;
        for seed in seeds {
            let outcome = self
                .frontier
                .enqueue(seed.player_id, seed.priority, 0, None, force_reset)?;
            tracing::debug!("Seed {}: {:?}", seed.player_id, outcome);
            queued += 1;
        }
        Ok(queued)
    }

    /// Seeds listed in the configuration, without force-reset
    pub fn seed_from_config(&self) -> Result<usize> {
        let seeds = self.config.seeds.clone();
        self.seed(&seeds, false)
    }

    /// Runs the crawl loop
    ///
    /// Returns when cancelled, or once `max_players` items reached a terminal
    /// state in this run. An empty frontier is polled, not treated as the end.
    ///
    /// A queue update rejected for one player is logged and counted. Only a
    /// frontier that cannot be read ends the run early; the run row is then
    /// marked failed.
    pub async fn run(&mut self, max_players: Option<u64>) -> Result<QualityReport> {
        tracing::info!("Starting crawl run {}", self.run_id);

        let outcome = self.crawl_loop(max_players).await;
        let status = match &outcome {
            Ok(true) => RunStatus::Interrupted,
            Ok(false) => RunStatus::Completed,
            Err(_) => RunStatus::Failed,
        };

        let processed = self.report.players_processed();
        let finished = self
            .lock()
            .and_then(|mut storage| Ok(storage.finish_run(self.run_id, status, processed)?));

        match outcome {
            Ok(_) => {
                finished?;
                tracing::info!(
                    "Crawl run {} {}: {} players processed",
                    self.run_id,
                    status.to_db_string(),
                    processed
                );
                Ok(self.report.clone())
            }
            Err(e) => {
                if let Err(finish_err) = finished {
                    tracing::error!("Cannot record the end of run {}: {}", self.run_id, finish_err);
                }
                tracing::error!(
                    "Crawl run {} failed after {} players:\n{}",
                    self.run_id,
                    processed,
                    self.report
                );
                Err(e)
            }
        }
    }

    /// Claims and processes players; `Ok(true)` means interrupted
    async fn crawl_loop(&mut self, max_players: Option<u64>) -> Result<bool> {
        let idle = Duration::from_secs(self.config.crawler.idle_poll_secs);

        loop {
            if self.cancel.is_cancelled() {
                return Ok(true);
            }

            if let Some(limit) = max_players {
                if self.report.players_processed() >= limit {
                    tracing::info!("Reached the limit of {} players for this run", limit);
                    return Ok(false);
                }
            }

            let item = match self.frontier.dequeue_next()? {
                Some(item) => item,
                None => {
                    tracing::debug!("Frontier is empty, checking again in {:?}", idle);
                    self.idle_wait(idle).await;
                    continue;
                }
            };

            if let Err(e) = self.frontier.mark_processing(item.player_id) {
                // changed by an operator since it was read
                tracing::warn!("Cannot claim player {}: {}", item.player_id, e);
                self.report.queue_update_failures += 1;
                self.idle_wait(idle).await;
                continue;
            }
            tracing::info!(
                "Crawling player {} (depth {}, attempt {})",
                item.player_id,
                item.depth,
                item.attempts + 1
            );

            match self.process_player(&item).await {
                Ok(PlayerOutcome::Completed) => {
                    self.report.players_completed += 1;
                    let update = self.frontier.mark_completed(item.player_id);
                    self.note_queue_update(item.player_id, update);
                }
                Ok(PlayerOutcome::Cancelled) => {
                    tracing::warn!(
                        "Interrupted while crawling player {}; it stays in processing",
                        item.player_id
                    );
                    return Ok(true);
                }
                Err(e) => {
                    tracing::error!("Player {} failed: {}", item.player_id, e);
                    self.report.players_failed += 1;
                    let update = self.frontier.mark_failed(item.player_id, &e.to_string());
                    self.note_queue_update(item.player_id, update);
                }
            }

            let processed = self.report.players_processed();
            if processed % 10 == 0 {
                tracing::info!(
                    "Progress: {} players, {} matches stored, {} rejected, delay {:?}",
                    processed,
                    self.report.accepted,
                    self.report.rejected,
                    self.pacer.current_delay()
                );
            }
        }
    }

    async fn idle_wait(&self, idle: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(idle) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    /// Logs a rejected terminal transition; the player's work is kept
    fn note_queue_update(&mut self, player_id: i64, update: Result<()>) {
        if let Err(e) = update {
            tracing::warn!("Queue update for player {} failed: {}", player_id, e);
            self.report.queue_update_failures += 1;
        }
    }

    fn record_fetch<T>(&mut self, result: &FetchResult<T>) {
        match result {
            Ok(_) => self.pacer.on_success(),
            // no request went out
            Err(FetchError::RobotsDenied { .. }) => {}
            Err(_) => self.pacer.on_error(),
        }
    }

    async fn process_player(&mut self, item: &QueueItem) -> Result<PlayerOutcome> {
        if !self.pacer.wait_for_next(&self.cancel).await {
            return Ok(PlayerOutcome::Cancelled);
        }
        let profile = self.fetcher.fetch_profile(item.player_id).await;
        self.record_fetch(&profile);
        let profile = profile?;

        {
            let mut storage = self.lock()?;
            storage.upsert_player(profile.player_id, &profile.name, &profile.fields)?;
            for season in &profile.seasons {
                storage.ensure_season(&season.code, &season.label)?;
            }
        }

        if profile.seasons.is_empty() {
            tracing::info!("Player {} lists no seasons", item.player_id);
        }

        for season in &profile.seasons {
            if !self.pacer.wait_for_next(&self.cancel).await {
                return Ok(PlayerOutcome::Cancelled);
            }
            let html = self.fetcher.fetch_season(item.player_id, &season.code).await;
            self.record_fetch(&html);

            match html {
                Ok(html) => self.process_season(item, &season.code, &html),
                Err(e) => {
                    tracing::error!(
                        "Season {} of player {} failed: {}",
                        season.code,
                        item.player_id,
                        e
                    );
                    self.report.seasons_failed += 1;
                }
            }
        }

        Ok(PlayerOutcome::Completed)
    }

    fn process_season(&mut self, item: &QueueItem, season_code: &str, html: &str) {
        let matches = extract_matches(html, item.player_id);
        tracing::debug!(
            "Season {} of player {}: {} match rows",
            season_code,
            item.player_id,
            matches.len()
        );

        for parsed in &matches {
            if let Err(e) = self.handle_match(item, season_code, parsed) {
                tracing::error!(
                    "Failed to persist match {} for player {}: {}",
                    parsed.match_key(),
                    item.player_id,
                    e
                );
                self.report.persist_failures += 1;
            }
        }
    }

    /// Validates one record and, if accepted, writes it with its references
    fn handle_match(
        &mut self,
        item: &QueueItem,
        season_code: &str,
        parsed: &ParsedMatch,
    ) -> Result<()> {
        let result = validate(parsed);
        self.report.record_validation(&result);

        if !result.is_valid() {
            let reasons: Vec<String> = result.errors.iter().map(|f| f.to_string()).collect();
            tracing::debug!(
                "Skipping match in tournament {:?} round '{}' for player {}: {}",
                parsed.tournament_id,
                parsed.round,
                parsed.subject_id,
                reasons.join("; ")
            );
            self.log_findings(parsed, LogLevel::Error, &result.errors);
            return Ok(());
        }
        if result.has_warnings() {
            self.log_findings(parsed, LogLevel::Warning, &result.warnings);
        }

        let new_match = NewMatch::from_parsed(parsed, Some(season_code)).ok_or_else(|| {
            RallyError::Extraction {
                player_id: parsed.subject_id,
                message: "match without a tournament id".to_string(),
            }
        })?;
        let discovered = parsed.discovered_players();

        for (player_id, _) in &discovered {
            self.frontier
                .enqueue(*player_id, 0, item.depth + 1, Some(item.player_id), false)?;
        }

        // seen from the other player's page or an earlier season
        if self.lock()?.match_exists(&new_match.match_key)? {
            tracing::trace!("Match {} already stored", new_match.match_key);
            self.report.duplicates_skipped += 1;
            return Ok(());
        }

        // references first, so the match row's foreign keys resolve
        {
            let mut storage = self.lock()?;
            storage.upsert_tournament(&TournamentRecord {
                id: new_match.tournament_id,
                name: parsed.tournament_name.clone(),
                date: parsed.tournament_date,
                season_code: Some(season_code.to_string()),
            })?;
            for (player_id, name) in &discovered {
                storage.upsert_placeholder(*player_id, name)?;
            }
        }

        let outcome = self.lock()?.insert_match(&new_match)?;
        match outcome {
            InsertOutcome::Inserted(id) => {
                tracing::trace!("Stored match {} as {}", new_match.match_key, id);
                self.report.accepted += 1;
            }
            InsertOutcome::Duplicate => {
                tracing::trace!("Match {} already stored", new_match.match_key);
                self.report.duplicates_skipped += 1;
            }
        }
        Ok(())
    }

    /// Writes findings to the validation log; write failures are only logged
    fn log_findings(&self, parsed: &ParsedMatch, level: LogLevel, findings: &[Finding]) {
        let mut storage = match self.lock() {
            Ok(storage) => storage,
            Err(e) => {
                tracing::warn!("Cannot record validation findings: {}", e);
                return;
            }
        };

        let round = Some(parsed.round.trim().to_string()).filter(|r| !r.is_empty());
        for finding in findings {
            let entry = ValidationLogEntry {
                run_id: self.run_id,
                player_id: parsed.subject_id,
                tournament_id: parsed.tournament_id,
                round: round.clone(),
                level,
                category: finding.category.to_string(),
                detail: finding.detail.clone(),
            };
            if let Err(e) = storage.log_validation(&entry) {
                tracing::warn!("Cannot record validation finding {}: {}", finding, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::parser::fixtures::{PROFILE_HTML, SEASON_HTML};
    use crate::crawler::parser::{parse_profile, PlayerProfile};
    use crate::state::QueueStatus;
    use crate::storage::{FrontierStore, MatchArchive};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves canned pages; anything unknown is a 404/500
    #[derive(Default)]
    struct StubFetcher {
        profiles: HashMap<i64, PlayerProfile>,
        seasons: HashMap<(i64, String), String>,
        /// Cleared while a profile is fetched, like a concurrent `--clear-queue`
        clear_queue_on_profile: Option<Arc<Mutex<SqliteStorage>>>,
    }

    impl StubFetcher {
        fn with_player_five(seasons: &[&str]) -> Self {
            let mut stub = Self::default();
            stub.profiles.insert(5, parse_profile(PROFILE_HTML, 5));
            for code in seasons {
                stub.seasons
                    .insert((5, code.to_string()), SEASON_HTML.to_string());
            }
            stub
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch_profile(&self, player_id: i64) -> FetchResult<PlayerProfile> {
            if let Some(storage) = &self.clear_queue_on_profile {
                storage.lock().unwrap().clear_queue().unwrap();
            }
            self.profiles
                .get(&player_id)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: format!("stub://player/{}", player_id),
                    status: 404,
                })
        }

        async fn fetch_season(&self, player_id: i64, season_code: &str) -> FetchResult<String> {
            self.seasons
                .get(&(player_id, season_code.to_string()))
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: format!("stub://player/{}?season={}", player_id, season_code),
                    status: 500,
                })
        }
    }

    fn test_config(max_depth: i32) -> Config {
        crate::config::parse_config(&format!(
            r#"
[crawler]
max-depth = {}
max-players = -1
idle-poll-secs = 1

[pacing]
base-delay-ms = 50
min-delay-ms = 50
max-delay-ms = 200

[source]
base-url = "https://results.example.org/"
profile-path = "player/{{id}}"

[user-agent]
crawler-name = "RallyGraph"
crawler-version = "0.3"
contact-url = "https://example.org/about"
contact-email = "ops@example.org"

[output]
database-path = ":memory:"
report-path = "report.md"

[[seed]]
player-id = 5
priority = 10
"#,
            max_depth
        ))
        .unwrap()
    }

    fn create_test_coordinator(max_depth: i32, fetcher: StubFetcher) -> Coordinator<StubFetcher> {
        let storage = SqliteStorage::new_in_memory().unwrap();
        Coordinator::new(
            test_config(max_depth),
            storage,
            fetcher,
            "test-hash",
            CancellationToken::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_crawl_one_player() {
        let mut coordinator =
            create_test_coordinator(2, StubFetcher::with_player_five(&["2024", "2023"]));
        assert_eq!(coordinator.seed_from_config().unwrap(), 1);

        let report = coordinator.run(Some(1)).await.unwrap();

        assert_eq!(report.players_completed, 1);
        assert_eq!(report.matches_seen, 8);
        assert_eq!(report.accepted, 3);
        // the second season repeats the first
        assert_eq!(report.duplicates_skipped, 3);
        // "Unknown Guest" has no id and the match is not a walkover
        assert_eq!(report.rejected, 2);
        assert_eq!(report.error_categories.get("missing_opponent"), Some(&2));
        assert_eq!(report.persist_failures, 0);

        let storage = coordinator.lock().unwrap();
        assert_eq!(storage.count_matches().unwrap(), 3);
        assert_eq!(
            storage.get_queue_item(5).unwrap().unwrap().status,
            QueueStatus::Completed
        );

        // opponents and partners queued one level deeper
        for id in [9, 11, 20, 21, 6] {
            let item = storage.get_queue_item(id).unwrap().unwrap();
            assert_eq!(item.depth, 1);
            assert_eq!(item.origin_id, Some(5));
            assert_eq!(item.status, QueueStatus::Pending);
        }
        assert_eq!(storage.count_players().unwrap(), (6, 5));

        let run = storage.get_run(coordinator.run_id()).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.players_processed, 1);

        let logged = storage.validation_summary(Some(coordinator.run_id())).unwrap();
        assert!(logged.contains(&("error".to_string(), "missing_opponent".to_string(), 2)));
    }

    #[tokio::test]
    async fn test_depth_bound_stops_expansion() {
        let mut coordinator = create_test_coordinator(0, StubFetcher::with_player_five(&["2024"]));
        coordinator.seed_from_config().unwrap();

        coordinator.run(Some(1)).await.unwrap();

        let storage = coordinator.lock().unwrap();
        assert_eq!(storage.count_matches().unwrap(), 3);
        let counts = storage.count_by_status().unwrap();
        assert_eq!(counts.values().sum::<u64>(), 1);
    }

    #[tokio::test]
    async fn test_profile_failure_marks_failed_and_continues() {
        let mut coordinator = create_test_coordinator(0, StubFetcher::with_player_five(&["2024"]));
        coordinator
            .seed(
                &[SeedEntry {
                    player_id: 77,
                    priority: 20,
                }],
                false,
            )
            .unwrap();
        coordinator.seed_from_config().unwrap();

        let report = coordinator.run(Some(2)).await.unwrap();
        assert_eq!(report.players_failed, 1);
        assert_eq!(report.players_completed, 1);

        let storage = coordinator.lock().unwrap();
        let failed = storage.get_queue_item(77).unwrap().unwrap();
        assert_eq!(failed.status, QueueStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(failed.last_error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_season_failure_does_not_fail_player() {
        // profile lists 2024 and 2023, only 2024 is served
        let mut coordinator = create_test_coordinator(0, StubFetcher::with_player_five(&["2024"]));
        coordinator.seed_from_config().unwrap();

        let report = coordinator.run(Some(1)).await.unwrap();
        assert_eq!(report.seasons_failed, 1);
        assert_eq!(report.players_completed, 1);
        assert_eq!(report.accepted, 3);
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_queue_untouched() {
        let mut coordinator = create_test_coordinator(2, StubFetcher::with_player_five(&["2024"]));
        coordinator.seed_from_config().unwrap();
        coordinator.cancel.cancel();

        let report = coordinator.run(None).await.unwrap();
        assert_eq!(report.players_processed(), 0);

        let storage = coordinator.lock().unwrap();
        assert_eq!(
            storage.get_queue_item(5).unwrap().unwrap().status,
            QueueStatus::Pending
        );
        assert_eq!(
            storage.get_run(coordinator.run_id()).unwrap().status,
            RunStatus::Interrupted
        );
    }

    #[tokio::test]
    async fn test_force_reset_seed_recrawls() {
        let mut coordinator = create_test_coordinator(0, StubFetcher::with_player_five(&["2024"]));
        coordinator.seed_from_config().unwrap();
        coordinator.run(Some(1)).await.unwrap();

        let seeds = coordinator.config.seeds.clone();
        coordinator.seed(&seeds, true).unwrap();
        let report = coordinator.run(Some(2)).await.unwrap();

        assert_eq!(report.players_completed, 2);
        // nothing new on the second pass
        assert_eq!(report.accepted, 3);
        assert_eq!(report.duplicates_skipped, 3);
    }

    #[tokio::test]
    async fn test_queue_cleared_mid_crawl_keeps_run_going() {
        let mut coordinator = create_test_coordinator(2, StubFetcher::with_player_five(&["2024"]));
        coordinator.fetcher.clear_queue_on_profile = Some(Arc::clone(&coordinator.storage));
        coordinator.seed_from_config().unwrap();

        let report = coordinator.run(Some(1)).await.unwrap();
        assert_eq!(report.players_completed, 1);
        assert_eq!(report.queue_update_failures, 1);
        assert_eq!(report.accepted, 3);

        let storage = coordinator.lock().unwrap();
        assert!(storage.get_queue_item(5).unwrap().is_none());
        let run = storage.get_run(coordinator.run_id()).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.players_processed, 1);
    }

    #[tokio::test]
    async fn test_unreadable_frontier_fails_run() {
        let mut coordinator = create_test_coordinator(0, StubFetcher::default());
        coordinator
            .lock()
            .unwrap()
            .connection()
            .execute_batch("DROP TABLE queue")
            .unwrap();

        assert!(coordinator.run(None).await.is_err());

        let storage = coordinator.lock().unwrap();
        let run = storage.get_run(coordinator.run_id()).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.finished_at.is_some());
    }
}
