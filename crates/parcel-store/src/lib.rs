// ABOUTME: Persistence layer for parcel, holding pending deliveries across process restarts.
// ABOUTME: Provides the SQLite-backed queue store, persisted settings, and the retention sweeper.

pub mod retention;
pub mod sqlite;

pub use retention::{DEFAULT_MAX_AGE, SweepError, SweepReport, sweep, sweep_at};
pub use sqlite::{Appended, QueueStore, StoreError, settings};
