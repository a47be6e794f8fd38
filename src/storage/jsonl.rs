//! JSON Lines result sink.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{BenchmarkRecord, ResultSink};
use crate::error::SinkError;

/// Appends one JSON object per line to a file.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    /// Opens `path` for appending, creating it and its parent directory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn record(&self, record: &BenchmarkRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn record(task_id: &str, passed: bool) -> BenchmarkRecord {
        BenchmarkRecord {
            task_id: task_id.to_string(),
            task_name: task_id.to_string(),
            benchmark_id: Uuid::new_v4(),
            input: "x".to_string(),
            labels: Default::default(),
            passed,
            retries: 0,
            duration_ms: 12,
            accuracy: if passed { 1.0 } else { 0.0 },
            model_pair: serde_json::Value::Null,
            pre_process_model: None,
            test: Some("true".to_string()),
            run_at: Utc::now(),
            benchmark_file: Some("tasks.jsonl".to_string()),
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/results.jsonl");

        let sink = JsonlSink::open(&path).await.unwrap();
        sink.record(&record("t1", true)).await.unwrap();
        sink.record(&record("t2", false)).await.unwrap();
        drop(sink);

        let sink = JsonlSink::open(&path).await.unwrap();
        sink.record(&record("t3", true)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let ids: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<BenchmarkRecord>(l).unwrap().task_id)
            .collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }
}
