//! Pipeline services: feed intake, impact inference, orchestration and polling

pub mod feed_client;
pub mod feed_normalizer;
pub mod inference;
pub mod poller;
pub mod seismic_processor;

pub use feed_client::{FeedError, FeedQuery, SeismicFeed, UsgsClient};
pub use inference::{ImpactInferenceClient, InferenceOutcome, InferenceRequest, InferenceSource};
pub use poller::{announce_processed, spawn_poller};
pub use seismic_processor::{CycleReport, SeismicProcessor};
