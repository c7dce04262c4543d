//! Background maintenance scheduling for the strata tablet server.
//!
//! Tablet servers accumulate in-memory state (write buffers, delta stores,
//! anchored history) that periodic housekeeping ops drain: memory flushes,
//! compactions, log garbage collection. The [`MaintenanceManager`] decides
//! which op to run next, and when, given bounded worker parallelism and
//! competing pressures on memory, log retention, and read performance.

pub mod manager;
pub mod op;
pub mod tracker;
pub mod types;

pub use manager::MaintenanceManager;
pub use op::{MaintenanceOp, OpKind, OpStats};
pub use tracker::{InflightCounts, InflightTracker};
pub use types::{CompletedOp, MaintenanceStatus, ManagerOptions, OpStatusSnapshot};
