//! Subscriber hub: topic rooms, bounded fan-out, and the axum endpoint.

mod handler;
mod hub;

pub use handler::{router, ws_handler};
pub use hub::{run_fanout, Hub, SUBSCRIBER_QUEUE_CAPACITY};
