//! # Seismo Common Library
//!
//! Shared code for the seismic monitoring services including:
//! - Impact radius model (pure seismology arithmetic)
//! - Canonical impact/destruction types and persisted record shapes
//! - Live-update notification payloads and the subscriber hub
//! - Configuration loading
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod impact;
pub mod models;
pub mod radius;
pub mod sse;

pub use error::{Error, Result};
pub use impact::{DestructionLevel, ImpactAssessment, Tier};
pub use models::{EventWithImpacts, SeismicEvent};
