//! Partitioned workers: each runs the same sequential loop over its own rows.

use crate::adapters::spreadsheet::write_results;
use crate::core::lookup::RowProcessor;
use crate::domain::model::{ContactResult, InstitutionRow};
use crate::domain::ports::Storage;
use crate::utils::error::{EtlError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinSet};

/// Where and how often workers write their files.
#[derive(Debug, Clone)]
pub struct WorkerPlan {
    pub workers: usize,
    pub batch_size: usize,
    pub output_path: String,
    pub output_prefix: String,
    pub run_stamp: String,
}

#[derive(Debug, Default)]
pub struct WorkerOutcome {
    pub results: Vec<ContactResult>,
    pub files: Vec<String>,
    /// Workers that crashed or could not save their own file.
    pub failed_workers: Vec<usize>,
}

/// Join an output directory and file name; an empty directory means the storage root.
pub fn output_file(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Split rows into at most `workers` contiguous, non-empty partitions.
pub fn partition(rows: Vec<InstitutionRow>, workers: usize) -> Vec<Vec<InstitutionRow>> {
    if rows.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, rows.len());
    let chunk = rows.len().div_ceil(workers);

    let mut parts = Vec::with_capacity(workers);
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        parts.push(rows.by_ref().take(chunk).collect());
    }
    parts
}

/// Run every partition and merge the results back into input order.
/// A failed worker never takes the others down: its rows come back with
/// `error` set and its number lands in `failed_workers`.
pub async fn run_workers<S>(
    processor: RowProcessor,
    rows: Vec<InstitutionRow>,
    headers: Arc<Vec<String>>,
    storage: S,
    plan: WorkerPlan,
) -> WorkerOutcome
where
    S: Storage + Clone + 'static,
{
    let parts = partition(rows, plan.workers);
    let parallel = parts.len() > 1;

    if !parallel {
        let rows = parts.into_iter().next().unwrap_or_default();
        return run_partition(1, processor, rows, headers, storage, plan, false).await;
    }

    tracing::info!("👷 Starting {} workers", parts.len());
    let mut set = JoinSet::new();
    let mut spawned: HashMap<Id, (usize, Vec<InstitutionRow>)> = HashMap::new();
    for (i, rows) in parts.into_iter().enumerate() {
        let worker = i + 1;
        let handle = set.spawn(run_partition(
            worker,
            processor.clone(),
            rows.clone(),
            headers.clone(),
            storage.clone(),
            plan.clone(),
            true,
        ));
        spawned.insert(handle.id(), (worker, rows));
    }

    let mut merged = WorkerOutcome::default();
    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((id, outcome)) => {
                spawned.remove(&id);
                merged.results.extend(outcome.results);
                merged.files.extend(outcome.files);
                merged.failed_workers.extend(outcome.failed_workers);
            }
            Err(e) => {
                let Some((worker, rows)) = spawned.remove(&e.id()) else {
                    tracing::error!("❌ unknown worker task failed: {}", e);
                    continue;
                };
                let error = EtlError::WorkerError {
                    worker,
                    message: e.to_string(),
                };
                tracing::error!("❌ {} ({} rows lost)", error, rows.len());
                merged.results.extend(rows.into_iter().map(|row| failed_row(row, &error)));
                merged.failed_workers.push(worker);
            }
        }
    }

    merged.results.sort_by_key(|r| r.row.index);
    merged.files.sort();
    merged.failed_workers.sort_unstable();
    merged
}

fn failed_row(row: InstitutionRow, error: &EtlError) -> ContactResult {
    let mut result = ContactResult::new(row);
    result.error = Some(error.to_string());
    result.processed_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    result
}

fn append_error(result: &mut ContactResult, message: &str) {
    result.error = Some(match result.error.take() {
        Some(existing) => format!("{}; {}", existing, message),
        None => message.to_string(),
    });
}

async fn run_partition<S: Storage>(
    worker: usize,
    processor: RowProcessor,
    rows: Vec<InstitutionRow>,
    headers: Arc<Vec<String>>,
    storage: S,
    plan: WorkerPlan,
    own_file: bool,
) -> WorkerOutcome {
    let total = rows.len();
    let delay = Duration::from_millis(processor.options().delay_ms);
    let mut outcome = WorkerOutcome {
        results: Vec::with_capacity(total),
        ..Default::default()
    };

    tracing::info!("👷 worker {} processing {} rows", worker, total);

    for (i, row) in rows.into_iter().enumerate() {
        outcome.results.push(processor.process(row).await);

        let done = i + 1;
        if plan.batch_size > 0 && done % plan.batch_size == 0 && done < total {
            let name = format!(
                "{}_worker{}_batch{}.csv",
                plan.output_prefix,
                worker,
                done / plan.batch_size
            );
            let path = output_file(&plan.output_path, &name);
            // 進度檔失敗不中斷
            match write_csv(&storage, &path, &headers, &outcome.results).await {
                Ok(()) => {
                    tracing::info!("💾 worker {} saved progress {}/{} to {}", worker, done, total, path);
                    outcome.files.push(path);
                }
                Err(e) => tracing::warn!("⚠️ worker {} could not save {}: {}", worker, path, e),
            }
        }

        if done < total && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    if own_file {
        let name = format!(
            "{}_worker{}_{}.csv",
            plan.output_prefix, worker, plan.run_stamp
        );
        let path = output_file(&plan.output_path, &name);
        match write_csv(&storage, &path, &headers, &outcome.results).await {
            Ok(()) => {
                tracing::info!("✅ worker {} wrote {}", worker, path);
                outcome.files.push(path);
            }
            Err(e) => {
                // 結果仍交回合併，只標記未存檔
                let error = EtlError::WorkerError {
                    worker,
                    message: format!("output not saved: {}", e),
                };
                tracing::error!("❌ {}", error);
                let message = error.to_string();
                for result in &mut outcome.results {
                    append_error(result, &message);
                }
                outcome.failed_workers.push(worker);
            }
        }
    }

    outcome
}

async fn write_csv<S: Storage>(
    storage: &S,
    path: &str,
    headers: &[String],
    results: &[ContactResult],
) -> Result<()> {
    let data = write_results(headers, results)?;
    storage.write_file(path, &data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RegexOracle;
    use crate::domain::model::ContactSource;
    use crate::domain::ports::{LookupOptions, PageFetcher};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn rows(n: usize) -> Vec<InstitutionRow> {
        (0..n)
            .map(|index| InstitutionRow {
                index,
                name: format!("기관{}", index),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_partition_is_contiguous() {
        let parts = partition(rows(10), 3);
        let sizes: Vec<usize> = parts.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(parts[1][0].index, 4);
        assert_eq!(parts[2][1].index, 9);
    }

    #[test]
    fn test_partition_edge_cases() {
        assert!(partition(rows(0), 4).is_empty());
        assert_eq!(partition(rows(2), 8).len(), 2);
        assert_eq!(partition(rows(5), 0).len(), 1);
    }

    /// Keeps files in memory; refuses any path containing `reject`.
    #[derive(Clone, Default)]
    struct PickyStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        reject: &'static str,
    }

    impl PickyStorage {
        fn names(&self) -> Vec<String> {
            let mut names: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
            names.sort();
            names
        }
    }

    impl Storage for PickyStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            Err(EtlError::ProcessingError {
                message: format!("unexpected read of {}", path),
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            if !self.reject.is_empty() && path.contains(self.reject) {
                return Err(EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("read-only: {}", path),
                )));
            }
            self.files.lock().unwrap().insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    /// Panics on `http://boom.test`, otherwise serves a contact block.
    struct BoomFetcher;

    #[async_trait]
    impl PageFetcher for BoomFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            if url.contains("boom.test") {
                panic!("parser blew up on {}", url);
            }
            Ok("<p>전화 02-2148-1114 팩스 02-2148-5039</p>".to_string())
        }
    }

    fn processor() -> RowProcessor {
        let options = LookupOptions {
            delay_ms: 0,
            use_search: false,
            ..LookupOptions::default()
        };
        RowProcessor::new(Arc::new(BoomFetcher), options)
            .with_oracle(ContactSource::Homepage, Arc::new(RegexOracle))
    }

    fn plan(workers: usize) -> WorkerPlan {
        WorkerPlan {
            workers,
            batch_size: 0,
            output_path: "out".to_string(),
            output_prefix: "contacts".to_string(),
            run_stamp: "20260101_000000".to_string(),
        }
    }

    fn headers() -> Arc<Vec<String>> {
        Arc::new(vec!["기관명".to_string()])
    }

    fn with_homepages(homepages: &[&str]) -> Vec<InstitutionRow> {
        rows(homepages.len())
            .into_iter()
            .zip(homepages)
            .map(|(row, homepage)| InstitutionRow {
                homepage: homepage.to_string(),
                ..row
            })
            .collect()
    }

    #[tokio::test]
    async fn test_unsaved_worker_file_keeps_other_results() {
        let storage = PickyStorage {
            reject: "worker2_",
            ..Default::default()
        };
        let input = with_homepages(&["http://a.test", "http://b.test", "http://c.test", "http://d.test"]);

        let outcome = run_workers(processor(), input, headers(), storage.clone(), plan(2)).await;

        assert_eq!(outcome.results.len(), 4);
        assert_eq!(outcome.failed_workers, vec![2]);
        assert_eq!(outcome.files, vec!["out/contacts_worker1_20260101_000000.csv"]);
        assert_eq!(storage.names(), outcome.files);

        // 第二個 worker 的資料還在，只多了錯誤
        for result in &outcome.results {
            assert_eq!(result.extracted_fax.as_deref(), Some("02-2148-5039"));
        }
        assert!(outcome.results[0].error.is_none());
        assert!(outcome.results[1].error.is_none());
        let error = outcome.results[2].error.as_deref().unwrap();
        assert!(error.contains("Worker 2 failed: output not saved"));
        assert!(outcome.results[3].error.is_some());
    }

    #[tokio::test]
    async fn test_crashed_worker_is_reported_by_number() {
        let storage = PickyStorage::default();
        let input = with_homepages(&[
            "http://a.test",
            "http://b.test",
            "http://boom.test",
            "http://d.test",
            "http://e.test",
            "http://f.test",
        ]);

        let outcome = run_workers(processor(), input, headers(), storage, plan(3)).await;

        let indexes: Vec<usize> = outcome.results.iter().map(|r| r.row.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(outcome.failed_workers, vec![2]);
        assert_eq!(outcome.files.len(), 2);

        for lost in &outcome.results[2..4] {
            assert!(lost.extracted_fax.is_none());
            assert!(lost.error.as_deref().unwrap().starts_with("Worker 2 failed"));
            assert!(!lost.processed_at.is_empty());
        }
        assert_eq!(outcome.results[4].extracted_fax.as_deref(), Some("02-2148-5039"));
        assert!(outcome.results[5].error.is_none());
    }

    #[test]
    fn test_output_file() {
        assert_eq!(output_file("out/", "a.csv"), "out/a.csv");
        assert_eq!(output_file("", "a.csv"), "a.csv");
    }
}
