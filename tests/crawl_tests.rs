//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the results site and run the
//! whole crawl cycle against a database in a temporary directory.

use rally_graph::audit::{run_audit, AuditScope, Rule};
use rally_graph::config::load_config_with_hash;
use rally_graph::crawler::run_crawl;
use rally_graph::state::QueueStatus;
use rally_graph::storage::{FrontierStore, MatchArchive, RunStatus, RunStore, SqliteStorage};
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROFILE_FIVE: &str = r#"
<html><body>
  <h1 class="player-name">Alpha Player</h1>
  <table class="player-info"><tr><th>Club</th><td>TC Riverside</td></tr></table>
  <select name="season"><option value="2024">2024 / 2025</option></select>
</body></html>
"#;

const SEASON_FIVE: &str = r#"
<html><body>
  <h2 class="section">Singles - individual</h2>
  <div class="tournament">
    <div class="tournament-header">
      <a href="/tournament/100">Spring Open</a>
      <span class="date">12.05.2024</span>
    </div>
    <table class="matches">
      <tr>
        <td class="round">8>4</td>
        <td class="side-left"><a href="/player/9">Beta Player</a></td>
        <td class="side-right"><a href="/player/5">Alpha Player</a></td>
        <td class="score">6:3, 6:3</td>
      </tr>
      <tr>
        <td class="round">4>2</td>
        <td class="side-left"><a href="/player/5">Alpha Player</a></td>
        <td class="side-right"><a href="/player/11">Gamma Player</a></td>
        <td class="score">6:2, 6:2</td>
      </tr>
      <tr>
        <td class="round">2>1</td>
        <td class="side-left"><a href="/player/5">Alpha Player</a></td>
        <td class="side-right">Walk-in Guest</td>
        <td class="score">6:0, 6:0</td>
      </tr>
    </table>
  </div>
</body></html>
"#;

fn write_config(dir: &TempDir, base_url: &str) -> std::path::PathBuf {
    let db_path = dir.path().join("rally.db");
    let report_path = dir.path().join("report.md");
    let config = format!(
        r#"
[crawler]
max-depth = 1
max-players = -1
request-timeout-secs = 5
idle-poll-secs = 1

[pacing]
base-delay-ms = 50
min-delay-ms = 50
max-delay-ms = 200

[source]
base-url = "{}/"
profile-path = "player/{{id}}"
season-query = "season"
respect-robots = true

[user-agent]
crawler-name = "RallyGraph"
crawler-version = "0.3"
contact-url = "https://example.org/about"
contact-email = "ops@example.org"

[output]
database-path = "{}"
report-path = "{}"

[[seed]]
player-id = 5
priority = 10
"#,
        base_url,
        db_path.display(),
        report_path.display()
    );

    let config_path = dir.path().join("rally.toml");
    std::fs::write(&config_path, config).unwrap();
    config_path
}

async fn mount_player_five(server: &MockServer) {
    // season requests first so the bare profile mock does not shadow them
    Mock::given(method("GET"))
        .and(path("/player/5"))
        .and(query_param("season", "2024"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SEASON_FIVE))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/player/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PROFILE_FIVE))
        .mount(server)
        .await;
}

fn open(config_path: &Path) -> SqliteStorage {
    let (config, _) = load_config_with_hash(config_path).unwrap();
    SqliteStorage::new(Path::new(&config.output.database_path)).unwrap()
}

#[tokio::test]
async fn test_crawl_single_player() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&server)
        .await;
    mount_player_five(&server).await;

    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, &server.uri());
    let (config, hash) = load_config_with_hash(&config_path).unwrap();

    let report = run_crawl(config, &hash, &[], Some(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.players_completed, 1);
    assert_eq!(report.accepted, 2);
    // the final has no linked opponent
    assert_eq!(report.rejected, 1);

    let storage = open(&config_path);
    assert_eq!(storage.count_matches().unwrap(), 2);
    assert_eq!(
        storage.get_queue_item(5).unwrap().unwrap().status,
        QueueStatus::Completed
    );
    for id in [9, 11] {
        let item = storage.get_queue_item(id).unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.depth, 1);
    }

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, hash);

    // lost 8>4 yet has a stored 4>2 match
    let audit = run_audit(&storage, AuditScope::Player(5)).unwrap();
    assert!(audit
        .issues
        .iter()
        .any(|issue| issue.rule == Rule::NoMatchAfterLoss));
}

#[tokio::test]
async fn test_recrawl_is_idempotent() {
    let server = MockServer::start().await;
    mount_player_five(&server).await;

    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, &server.uri());

    let (config, hash) = load_config_with_hash(&config_path).unwrap();
    run_crawl(config, &hash, &[], Some(1), CancellationToken::new())
        .await
        .unwrap();

    // force a re-scrape of the seed
    let (config, hash) = load_config_with_hash(&config_path).unwrap();
    let seeds = config.seeds.clone();
    let report = run_crawl(config, &hash, &seeds, Some(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.players_completed, 1);
    assert_eq!(report.accepted, 0);
    assert_eq!(report.duplicates_skipped, 2);
    assert_eq!(open(&config_path).count_matches().unwrap(), 2);
}

#[tokio::test]
async fn test_robots_denied_player_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /player/"))
        .mount(&server)
        .await;
    mount_player_five(&server).await;

    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, &server.uri());
    let (config, hash) = load_config_with_hash(&config_path).unwrap();

    let report = run_crawl(config, &hash, &[], Some(1), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.players_failed, 1);

    let storage = open(&config_path);
    let item = storage.get_queue_item(5).unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert!(item.last_error.unwrap().contains("robots.txt"));
    assert_eq!(storage.count_matches().unwrap(), 0);
}
