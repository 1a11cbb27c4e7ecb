//! Staging storage for load files.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use service_core::error::AppError;
use std::io::{BufRead, BufReader, Write};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError>;
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(AppError::StorageError(anyhow::anyhow!(
                "Invalid object key: {}",
                key
            )));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to read object {}: {}", key, e))
        })
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }
}

/// Gzip-compressed newline-delimited JSON, one record per line.
pub fn encode_ndjson_gzip<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, AppError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

    for row in rows {
        serde_json::to_writer(&mut encoder, row).map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to encode row: {}", e))
        })?;
        encoder.write_all(b"\n")?;
    }

    Ok(encoder.finish()?)
}

pub fn decode_ndjson_gzip<T: DeserializeOwned>(data: &[u8]) -> Result<Vec<T>, AppError> {
    let reader = BufReader::new(GzDecoder::new(data));
    let mut rows = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to decode row: {}", e))
        })?;
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        customer: String,
        cost: f64,
    }

    #[test]
    fn test_ndjson_has_one_line_per_row() {
        let rows = vec![
            Line { customer: "a".into(), cost: 1.5 },
            Line { customer: "b".into(), cost: 2.0 },
        ];
        let data = encode_ndjson_gzip(&rows).unwrap();

        let mut text = String::new();
        std::io::Read::read_to_string(&mut GzDecoder::new(&data[..]), &mut text).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));

        let decoded: Vec<Line> = decode_ndjson_gzip(&data).unwrap();
        assert_eq!(decoded, rows);
    }

    #[tokio::test]
    async fn local_store_upload_download_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).await.unwrap();

        store.upload("looker/part.json.gz", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.download("looker/part.json.gz").await.unwrap(), vec![1, 2, 3]);

        store.delete("looker/part.json.gz").await.unwrap();
        assert!(store.download("looker/part.json.gz").await.is_err());
    }

    #[tokio::test]
    async fn local_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).await.unwrap();
        assert!(store.upload("../outside", vec![1]).await.is_err());
        assert!(store.upload("/abs", vec![1]).await.is_err());
    }
}
