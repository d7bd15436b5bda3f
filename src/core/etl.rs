use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::{RunCounters, RunTotals, SystemMonitor};

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
    counters: RunCounters,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
            counters: RunCounters::default(),
        }
    }

    pub fn totals(&self) -> RunTotals {
        self.counters.totals()
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting contact lookup");
        self.monitor.log_stats("Start");

        // Extract
        let sheet = self.pipeline.extract().await?;
        tracing::info!("📥 Extracted {} rows ({} columns)", sheet.rows.len(), sheet.headers.len());
        self.monitor.log_stats("Extract");

        // Transform
        let result = self.pipeline.transform(sheet).await?;
        for row in &result.results {
            self.counters.record(row);
        }
        self.counters.log_totals();
        tracing::info!(
            "🧮 Fax check: {}/{} well-formed ({:.1}%)",
            result.summary.valid,
            result.summary.total,
            result.summary.valid_rate
        );
        for file in &result.worker_outputs {
            tracing::debug!("Worker output: {}", file);
        }
        self.monitor.log_stats("Transform");

        // Load
        let output_path = self.pipeline.load(result).await?;
        tracing::info!("💾 Output saved to: {}", output_path);
        self.monitor.log_stats("Load");
        self.monitor.log_final_stats();

        Ok(output_path)
    }
}
