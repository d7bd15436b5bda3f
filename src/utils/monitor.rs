use crate::domain::model::ContactResult;
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Per-run outcome counters.
#[derive(Debug, Default)]
pub struct RunCounters {
    processed: AtomicUsize,
    phones: AtomicUsize,
    faxes: AtomicUsize,
    references: AtomicUsize,
    owners: AtomicUsize,
    errors: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub processed: usize,
    pub phones: usize,
    pub faxes: usize,
    pub references: usize,
    /// Rows with at least one owner name, given or found.
    pub owners: usize,
    pub errors: usize,
}

impl RunCounters {
    pub fn record(&self, result: &ContactResult) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if result.extracted_phone.is_some() {
            self.phones.fetch_add(1, Ordering::Relaxed);
        }
        if result.extracted_fax.is_some() {
            self.faxes.fetch_add(1, Ordering::Relaxed);
        }
        if result.reference_label.is_some() {
            self.references.fetch_add(1, Ordering::Relaxed);
        }
        if result.phone_owner.is_some() || result.fax_owner.is_some() {
            self.owners.fetch_add(1, Ordering::Relaxed);
        }
        if result.error.is_some() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn totals(&self) -> RunTotals {
        RunTotals {
            processed: self.processed.load(Ordering::Relaxed),
            phones: self.phones.load(Ordering::Relaxed),
            faxes: self.faxes.load(Ordering::Relaxed),
            references: self.references.load(Ordering::Relaxed),
            owners: self.owners.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_totals(&self) {
        let t = self.totals();
        let rate = |n: usize| {
            if t.processed == 0 {
                0.0
            } else {
                n as f64 / t.processed as f64 * 100.0
            }
        };
        tracing::info!(
            "📈 Rows: {}, phone: {} ({:.1}%), fax: {} ({:.1}%), reference: {}, owners: {}, errors: {}",
            t.processed,
            t.phones,
            rate(t.phones),
            t.faxes,
            rate(t.faxes),
            t.references,
            t.owners,
            t.errors
        );
    }
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub memory_usage_percent: f32,
    pub peak_memory_mb: u64,
    pub elapsed_time: Duration,
}

#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    start_time: Instant,
    peak_memory: Mutex<u64>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let pid = if enabled {
            sysinfo::get_current_pid()
                .map_err(|e| tracing::warn!("⚠️ System monitoring unavailable: {}", e))
                .ok()
        } else {
            None
        };

        let mut system = System::new();
        if let Some(pid) = pid {
            // 初始刷新
            system.refresh_memory();
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        }

        Self {
            system: Mutex::new(system),
            pid,
            start_time: Instant::now(),
            peak_memory: Mutex::new(0),
            enabled,
        }
    }

    pub fn get_stats(&self) -> Option<SystemStats> {
        if !self.enabled {
            return None;
        }
        let pid = self.pid?;

        let mut system = self.system.lock().ok()?;
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;
        let total_memory = system.total_memory() / 1024 / 1024;
        let memory_percent = if total_memory > 0 {
            (memory_mb as f32 / total_memory as f32) * 100.0
        } else {
            0.0
        };

        // 更新峰值記憶體
        let mut peak = self.peak_memory.lock().ok()?;
        if memory_mb > *peak {
            *peak = memory_mb;
        }

        Some(SystemStats {
            cpu_usage: process.cpu_usage(),
            memory_usage_mb: memory_mb,
            memory_usage_percent: memory_percent,
            peak_memory_mb: *peak,
            elapsed_time: self.start_time.elapsed(),
        })
    }

    pub fn log_stats(&self, phase: &str) {
        if let Some(stats) = self.get_stats() {
            tracing::info!(
                "📊 {} - CPU: {:.1}%, Memory: {}MB ({:.1}%), Peak: {}MB, Time: {:?}",
                phase,
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.memory_usage_percent,
                stats.peak_memory_mb,
                stats.elapsed_time
            );
        }
    }

    pub fn log_final_stats(&self) {
        if let Some(stats) = self.get_stats() {
            tracing::info!(
                "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB",
                stats.elapsed_time,
                stats.peak_memory_mb
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 非 CLI 環境的空實現
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn log_stats(&self, _phase: &str) {}

    pub fn log_final_stats(&self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
