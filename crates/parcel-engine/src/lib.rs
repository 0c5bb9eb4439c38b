// ABOUTME: Queue engine for parcel: accepts artifacts, drains them in capture order, and schedules drains.
// ABOUTME: Exposes QueueEngine, the single-flight DrainWorker, QueueService, and the connectivity monitor.

pub mod connectivity;
pub mod engine;
pub mod service;
pub mod worker;

pub use connectivity::{ConnectivityMonitor, ConnectivityProbe, TcpProbe};
pub use engine::{DrainReport, EngineConfig, EnqueueOutcome, QueueEngine};
pub use service::QueueService;
pub use worker::{DrainHandle, DrainWorker, TriggerSource, WorkerError};
