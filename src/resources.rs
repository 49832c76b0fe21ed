//! Process resource journaling around CPU-heavy stages.
//!
//! Purely observational: failures to sample are logged at debug level and
//! never affect the conversion.
//!
//! Figures are process-wide, not per request. One sampler is shared by every
//! request, so the CPU percentage covers the interval since the last sample
//! taken by any request, and with concurrent conversions it includes their
//! work too.

use std::sync::{Mutex, OnceLock};
use sysinfo::{Pid, System};
use tracing::{debug, info};

/// Memory and CPU sample for the current process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    /// Resident set size in bytes.
    pub rss_bytes: u64,
    /// Process CPU usage since the previous sample taken anywhere in the
    /// process, in percent of one core.
    pub cpu_percent: f32,
}

impl ResourceSnapshot {
    pub fn rss_mib(&self) -> f64 {
        self.rss_bytes as f64 / (1024.0 * 1024.0)
    }
}

// CPU usage is a delta between refreshes, so the `System` must outlive a
// single sample.
static SYSTEM: OnceLock<Mutex<System>> = OnceLock::new();

/// Sample the current process. `None` when the platform gives no data.
pub fn snapshot() -> Option<ResourceSnapshot> {
    let pid: Pid = sysinfo::get_current_pid().ok()?;
    let mut sys = SYSTEM
        .get_or_init(|| Mutex::new(System::new()))
        .lock()
        .ok()?;
    if !sys.refresh_process(pid) {
        return None;
    }
    let process = sys.process(pid)?;
    Some(ResourceSnapshot {
        rss_bytes: process.memory(),
        cpu_percent: process.cpu_usage(),
    })
}

/// Log process-wide memory and CPU usage tagged with `stage`.
pub fn log_resource_usage(stage: &str) {
    match snapshot() {
        Some(s) => info!(
            "{} - Process Memory Usage: {:.2} MB, Process CPU Usage: {:.1}%",
            stage,
            s.rss_mib(),
            s.cpu_percent
        ),
        None => debug!("{} - resource usage unavailable", stage),
    }
}
