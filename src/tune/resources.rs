use serde::{Deserialize, Serialize};

pub const GIB: u64 = 1024 * 1024 * 1024;

/// What a single trial reserves while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: f64,
    pub memory_bytes: u64,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory_bytes: 2 * GIB,
        }
    }
}

impl Resources {
    /// How many trials fit at once on a machine with `cpus` cores and
    /// `total_memory` bytes, optionally capped. Always at least one.
    pub fn max_concurrency(&self, cpus: usize, total_memory: Option<u64>, cap: Option<usize>) -> usize {
        let by_cpu = if self.cpu > 0.0 {
            (cpus as f64 / self.cpu).floor() as usize
        } else {
            usize::MAX
        };
        let by_memory = match total_memory {
            Some(total) if self.memory_bytes > 0 => (total / self.memory_bytes) as usize,
            _ => usize::MAX,
        };
        let mut slots = by_cpu.min(by_memory);
        if let Some(cap) = cap {
            slots = slots.min(cap);
        }
        if slots == usize::MAX {
            slots = cpus;
        }
        slots.max(1)
    }
}
