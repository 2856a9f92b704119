//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the feed, the decoder and the tick store.
pub mod ports;

/// Ingestion supervision and pair analytics services.
pub mod services;
