pub mod models;
pub use models::*;

mod stats_sse;
pub use stats_sse::poll_stats_sse;

/// Capacity of the event channel; slower subscribers skip what they missed.
pub const EVENT_CAPACITY: usize = 100;

pub fn create_sse_broadcaster() -> SseSender {
    tokio::sync::broadcast::channel(EVENT_CAPACITY).0
}
