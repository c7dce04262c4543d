pub mod error;
pub mod memory;
pub mod metrics;

pub use error::*;
pub use memory::{FixedMemoryProbe, MemoryProbe, SystemMemoryProbe};
pub use metrics::{AtomicGauge, DurationHistogram, HistogramSnapshot};
