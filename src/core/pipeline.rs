use crate::adapters::spreadsheet::{read_reference, read_sheet, write_results};
use crate::core::lookup::RowProcessor;
use crate::core::worker::{output_file, run_workers, WorkerPlan};
use crate::domain::model::{InputSheet, TransformResult};
use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
use crate::domain::services::fax::summarize;
use crate::domain::services::phone::is_blank;
use crate::domain::services::reference::ReferenceIndex;
use crate::domain::services::ValidationSummary;
use crate::utils::error::Result;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use zip::write::{FileOptions, ZipWriter};

/// Contents of `summary.json` inside the output archive.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub run_stamp: &'a str,
    pub total_rows: usize,
    pub phones_found: usize,
    pub faxes_found: usize,
    pub reference_matches: usize,
    pub owners_found: usize,
    pub errors: usize,
    pub fax_summary: &'a ValidationSummary,
    pub worker_outputs: &'a [String],
}

pub struct ContactPipeline<S: Storage + Clone + 'static, C: ConfigProvider> {
    storage: S,
    config: C,
    processor: RowProcessor,
    run_stamp: String,
}

impl<S: Storage + Clone + 'static, C: ConfigProvider> ContactPipeline<S, C> {
    pub fn new(storage: S, config: C, processor: RowProcessor) -> Self {
        Self {
            storage,
            config,
            processor,
            run_stamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    /// Build the pipeline with the fetcher and oracles the config asks for.
    pub fn from_config(storage: S, config: C) -> Result<Self> {
        let processor = RowProcessor::from_config(&config)?;
        Ok(Self::new(storage, config, processor))
    }

    pub fn run_stamp(&self) -> &str {
        &self.run_stamp
    }

    async fn load_reference(&self) -> Result<Option<ReferenceIndex>> {
        let files = self.config.lookup_files();
        if files.is_empty() {
            return Ok(None);
        }

        let mut entries = Vec::new();
        for file in files {
            let data = self.storage.read_file(file).await?;
            let loaded = read_reference(&data)?;
            tracing::info!("📚 Loaded {} reference rows from {}", loaded.len(), file);
            entries.extend(loaded);
        }
        Ok(Some(ReferenceIndex::new(entries)))
    }

    fn plan(&self) -> WorkerPlan {
        WorkerPlan {
            workers: self.config.concurrent_requests(),
            batch_size: self.config.batch_size(),
            output_path: self.config.output_path().to_string(),
            output_prefix: self.config.output_prefix().to_string(),
            run_stamp: self.run_stamp.clone(),
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage + Clone + 'static, C: ConfigProvider> Pipeline for ContactPipeline<S, C> {
    async fn extract(&self) -> Result<InputSheet> {
        tracing::debug!("Reading input from: {}", self.config.input_path());
        let data = self.storage.read_file(self.config.input_path()).await?;
        let mut sheet = read_sheet(&data, &self.config.columns())?;

        if let Some(max) = self.config.max_records() {
            if sheet.rows.len() > max {
                tracing::info!("✂️ Limiting {} rows to {}", sheet.rows.len(), max);
                sheet.rows.truncate(max);
            }
        }
        Ok(sheet)
    }

    async fn transform(&self, sheet: InputSheet) -> Result<TransformResult> {
        let mut processor = self.processor.clone();
        if let Some(index) = self.load_reference().await? {
            tracing::info!("📚 Reference index holds {} numbers", index.len());
            processor = processor.with_reference(Arc::new(index));
        }

        let headers = Arc::new(sheet.headers);
        let outcome = run_workers(
            processor,
            sheet.rows,
            headers.clone(),
            self.storage.clone(),
            self.plan(),
        )
        .await;
        if !outcome.failed_workers.is_empty() {
            tracing::warn!("⚠️ workers {:?} failed; their rows carry the error", outcome.failed_workers);
        }

        let summary = summarize(
            outcome
                .results
                .iter()
                .map(|r| r.reported_fax())
                .filter(|f| !is_blank(f)),
        );

        Ok(TransformResult {
            headers: headers.to_vec(),
            results: outcome.results,
            summary,
            worker_outputs: outcome.files,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let csv_name = format!("{}_{}.csv", self.config.output_prefix(), self.run_stamp);
        let csv_data = write_results(&result.headers, &result.results)?;

        if !self.config.compress_output() {
            let path = output_file(self.config.output_path(), &csv_name);
            tracing::debug!("Writing CSV ({} bytes) to {}", csv_data.len(), path);
            self.storage.write_file(&path, &csv_data).await?;
            return Ok(path);
        }

        let report = RunReport {
            run_stamp: &self.run_stamp,
            total_rows: result.results.len(),
            phones_found: result.results.iter().filter(|r| r.extracted_phone.is_some()).count(),
            faxes_found: result.results.iter().filter(|r| r.extracted_fax.is_some()).count(),
            reference_matches: result
                .results
                .iter()
                .filter(|r| r.reference_label.is_some())
                .count(),
            owners_found: result
                .results
                .iter()
                .filter(|r| r.phone_owner.is_some() || r.fax_owner.is_some())
                .count(),
            errors: result.results.iter().filter(|r| r.error.is_some()).count(),
            fax_summary: &result.summary,
            worker_outputs: &result.worker_outputs,
        };

        // 壓縮包：結果 CSV + summary.json
        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>(csv_name.as_str(), FileOptions::default())?;
            zip.write_all(&csv_data)?;

            zip.start_file::<_, ()>("summary.json", FileOptions::default())?;
            zip.write_all(serde_json::to_string_pretty(&report)?.as_bytes())?;

            zip.finish()?.into_inner()
        };

        let zip_name = format!("{}_{}.zip", self.config.output_prefix(), self.run_stamp);
        let path = output_file(self.config.output_path(), &zip_name);
        tracing::debug!("Writing ZIP ({} bytes) to {}", zip_data.len(), path);
        self.storage.write_file(&path, &zip_data).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ColumnMapping, ContactSource};
    use crate::domain::ports::{AiSettings, LookupOptions, PageFetcher};
    use crate::utils::error::EtlError;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn put(&self, path: &str, data: &str) {
            self.files
                .lock()
                .await
                .insert(path.to_string(), data.as_bytes().to_vec());
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }

        async fn names(&self) -> Vec<String> {
            let mut names: Vec<String> = self.files.lock().await.keys().cloned().collect();
            names.sort();
            names
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    /// Every page carries the same contact block.
    struct StaticFetcher;

    #[async_trait::async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<String> {
            Ok("<p>전화 02-2148-1114 팩스 02-2148-5039</p>".to_string())
        }
    }

    struct MockConfig {
        lookup_files: Vec<String>,
        workers: usize,
        batch_size: usize,
        max_records: Option<usize>,
        compress: bool,
    }

    impl Default for MockConfig {
        fn default() -> Self {
            Self {
                lookup_files: vec![],
                workers: 1,
                batch_size: 0,
                max_records: None,
                compress: false,
            }
        }
    }

    impl ConfigProvider for MockConfig {
        fn input_path(&self) -> &str {
            "input.csv"
        }
        fn output_path(&self) -> &str {
            "out"
        }
        fn output_prefix(&self) -> &str {
            "contacts"
        }
        fn lookup_files(&self) -> &[String] {
            &self.lookup_files
        }
        fn concurrent_requests(&self) -> usize {
            self.workers
        }
        fn batch_size(&self) -> usize {
            self.batch_size
        }
        fn max_records(&self) -> Option<usize> {
            self.max_records
        }
        fn compress_output(&self) -> bool {
            self.compress
        }
        fn columns(&self) -> ColumnMapping {
            ColumnMapping::default()
        }
        fn lookup_options(&self) -> LookupOptions {
            LookupOptions {
                delay_ms: 0,
                use_search: false,
                ..LookupOptions::default()
            }
        }
        fn user_agent(&self) -> &str {
            "test"
        }
        fn timeout_seconds(&self) -> u64 {
            5
        }
        fn ai_settings(&self) -> Option<AiSettings> {
            None
        }
    }

    const INPUT: &str = "기관명,주소,전화번호,팩스번호,홈페이지\n\
        청운효자동,서울특별시 종로구,02-2148-5033,02-2148-5039,\n\
        종로구청,서울특별시 종로구,,,www.jongno.go.kr\n\
        사직동,서울특별시 종로구,,,www.sajik.go.kr\n\
        삼청동,서울특별시 종로구,,,\n";

    async fn pipeline(config: MockConfig) -> (ContactPipeline<MockStorage, MockConfig>, MockStorage) {
        let storage = MockStorage::new();
        storage.put("input.csv", INPUT).await;
        storage
            .put(
                "ref.csv",
                "center_name,phone,fax\n청운효자동 주민센터,02-2148-5033,02-2148-5039\n",
            )
            .await;
        let options = config.lookup_options();
        let processor = RowProcessor::new(Arc::new(StaticFetcher), options).with_oracle(
            ContactSource::Homepage,
            Arc::new(crate::adapters::RegexOracle),
        );
        (ContactPipeline::new(storage.clone(), config, processor), storage)
    }

    #[tokio::test]
    async fn test_extract_respects_max_records() {
        let (pipeline, _) = pipeline(MockConfig {
            max_records: Some(2),
            ..MockConfig::default()
        })
        .await;
        let sheet = pipeline.extract().await.unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.headers[0], "기관명");
    }

    #[tokio::test]
    async fn test_transform_uses_reference_and_homepages() {
        let (pipeline, _) = pipeline(MockConfig {
            lookup_files: vec!["ref.csv".to_string()],
            ..MockConfig::default()
        })
        .await;
        let sheet = pipeline.extract().await.unwrap();
        let result = pipeline.transform(sheet).await.unwrap();

        assert_eq!(result.results.len(), 4);
        assert_eq!(result.results[0].fax_source, Some(ContactSource::Reference));
        assert_eq!(result.results[1].fax_source, Some(ContactSource::Homepage));
        assert!(result.results[3].extracted_fax.is_none());
        // 三筆有傳真，一筆沒有
        assert_eq!(result.summary.total, 3);
        assert_eq!(result.summary.valid, 3);
        assert!(result.worker_outputs.is_empty());
    }

    #[tokio::test]
    async fn test_workers_write_partition_and_batch_files() {
        let (pipeline, storage) = pipeline(MockConfig {
            workers: 2,
            batch_size: 1,
            ..MockConfig::default()
        })
        .await;
        let stamp = pipeline.run_stamp().to_string();
        let sheet = pipeline.extract().await.unwrap();
        let result = pipeline.transform(sheet).await.unwrap();

        let indexes: Vec<usize> = result.results.iter().map(|r| r.row.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);

        let names = storage.names().await;
        assert!(names.contains(&"out/contacts_worker1_batch1.csv".to_string()));
        assert!(names.contains(&"out/contacts_worker2_batch1.csv".to_string()));
        assert!(names.contains(&format!("out/contacts_worker1_{}.csv", stamp)));
        assert!(names.contains(&format!("out/contacts_worker2_{}.csv", stamp)));
        assert_eq!(result.worker_outputs.len(), 4);
    }

    #[tokio::test]
    async fn test_load_writes_csv() {
        let (pipeline, storage) = pipeline(MockConfig::default()).await;
        let sheet = pipeline.extract().await.unwrap();
        let result = pipeline.transform(sheet).await.unwrap();
        let path = pipeline.load(result).await.unwrap();

        assert_eq!(path, format!("out/contacts_{}.csv", pipeline.run_stamp()));
        let data = storage.get_file(&path).await.unwrap();
        let text = String::from_utf8(data).unwrap();
        assert!(text.contains("추출_팩스번호"));
        assert!(text.contains("02-2148-5039"));
    }

    #[tokio::test]
    async fn test_load_zip_contains_csv_and_summary() {
        let (pipeline, storage) = pipeline(MockConfig {
            compress: true,
            ..MockConfig::default()
        })
        .await;
        let sheet = pipeline.extract().await.unwrap();
        let result = pipeline.transform(sheet).await.unwrap();
        let path = pipeline.load(result).await.unwrap();
        assert!(path.ends_with(".zip"));

        let zip_bytes = storage.get_file(&path).await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let summary: serde_json::Value = {
            let mut file = archive.by_name("summary.json").unwrap();
            let mut content = String::new();
            std::io::Read::read_to_string(&mut file, &mut content).unwrap();
            serde_json::from_str(&content).unwrap()
        };
        assert_eq!(summary["total_rows"], 4);
        assert_eq!(summary["faxes_found"], 2);
        assert_eq!(summary["owners_found"], 0);
        assert_eq!(summary["fax_summary"]["total"], 3);
        assert!(archive
            .by_name(&format!("contacts_{}.csv", pipeline.run_stamp()))
            .is_ok());
    }

    #[tokio::test]
    async fn test_missing_input_is_io_error() {
        let storage = MockStorage::new();
        let processor = RowProcessor::new(Arc::new(StaticFetcher), LookupOptions::default());
        let pipeline = ContactPipeline::new(storage, MockConfig::default(), processor);
        assert!(matches!(
            pipeline.extract().await,
            Err(EtlError::IoError(_))
        ));
    }
}
