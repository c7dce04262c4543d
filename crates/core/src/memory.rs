//! Process memory introspection.
//!
//! The maintenance scheduler reacts to memory pressure but does not do its
//! own accounting; it reads a [`MemoryProbe`]. Production servers use
//! [`SystemMemoryProbe`]; tests and embedders with their own accountant
//! supply a [`FixedMemoryProbe`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::warn;

/// Source of current process memory usage and installed capacity.
pub trait MemoryProbe: Send + Sync {
    /// Total installed memory in bytes. Consulted once at manager init.
    fn total_memory(&self) -> u64;

    /// Current resident usage in bytes. Consulted every scheduling tick,
    /// so implementations should answer without blocking on anything
    /// slower than a short internal lock.
    fn used(&self) -> u64;
}

/// OS-backed probe reading installed memory and this process's RSS.
pub struct SystemMemoryProbe {
    pid: Pid,
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            pid: Pid::from_u32(std::process::id()),
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn total_memory(&self) -> u64 {
        let mut system = self.system.lock().unwrap();
        system.refresh_memory();
        system.total_memory()
    }

    fn used(&self) -> u64 {
        let mut system = self.system.lock().unwrap();
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        match system.process(self.pid) {
            Some(process) => process.memory(),
            None => {
                warn!(pid = %self.pid, "memory probe could not find own process");
                0
            }
        }
    }
}

/// Probe with externally supplied readings.
pub struct FixedMemoryProbe {
    total: u64,
    used: AtomicU64,
}

impl FixedMemoryProbe {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            used: AtomicU64::new(0),
        }
    }

    pub fn set_used(&self, bytes: u64) {
        self.used.store(bytes, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn total_memory(&self) -> u64 {
        self.total
    }

    fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }
}
