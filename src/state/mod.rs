//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `QueueStatus`: lifecycle of a Frontier item (pending, processing, completed, failed)
//! - `Pacer`: adaptive delay between outbound requests

mod pacer;
mod queue_status;

// Re-export main types
pub use pacer::Pacer;
pub use queue_status::QueueStatus;
