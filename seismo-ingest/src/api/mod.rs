//! HTTP API handlers for seismo-ingest
//!
//! Query endpoints over stored events, the manual processing trigger, the
//! live SSE stream and health.

pub mod events;
pub mod health;
pub mod stream;

pub use events::event_routes;
pub use health::health_routes;
pub use stream::earthquake_stream;
