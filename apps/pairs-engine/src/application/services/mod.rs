//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StreamConnection`: one symbol's feed session, decode and store
//! - `IngestionSupervisor`: per-symbol workers with reconnect backoff
//! - `PairAnalytics`: pair snapshots from resampled bars

pub mod pair_analytics;
pub mod stream_connection;
pub mod supervisor;

pub use pair_analytics::{PairAnalytics, PairRequest, PairSnapshot};
pub use stream_connection::{FeedPipeline, RunOutcome, StreamConnection};
pub use supervisor::{IngestionSupervisor, SupervisorConfig};
