use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{EvalError, EvalResult};
use crate::types::TestCase;

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(&self) -> EvalResult<Vec<TestCase>>;
}

pub struct VecDataSource {
    cases: Vec<TestCase>,
}

impl VecDataSource {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }
}

#[async_trait]
impl DataSource for VecDataSource {
    async fn load(&self) -> EvalResult<Vec<TestCase>> {
        Ok(self.cases.clone())
    }
}

/// Dataset file written by the generator: a JSON array of test cases.
pub struct JsonFileDataSource {
    path: PathBuf,
}

impl JsonFileDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataSource for JsonFileDataSource {
    async fn load(&self) -> EvalResult<Vec<TestCase>> {
        load_dataset(&self.path).await
    }
}

pub async fn load_dataset(path: impl AsRef<Path>) -> EvalResult<Vec<TestCase>> {
    let path = path.as_ref().to_path_buf();
    let content = read_to_string(&path).await?;
    Ok(serde_json::from_str(&content)?)
}

pub async fn save_dataset(path: impl AsRef<Path>, cases: &[TestCase]) -> EvalResult<()> {
    write_json_pretty(path, &cases).await
}

/// Serialize `value` as pretty-printed UTF-8 JSON and write it in one go.
pub async fn write_json_pretty<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> EvalResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_file(path.as_ref(), json).await
}

pub(crate) async fn write_file(path: &Path, contents: String) -> EvalResult<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| EvalError::io(path, e))
}

#[cfg(not(feature = "sync-fs"))]
pub(crate) async fn read_to_string(path: &PathBuf) -> EvalResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EvalError::io(path, e))
}

#[cfg(feature = "sync-fs")]
pub(crate) async fn read_to_string(path: &PathBuf) -> EvalResult<String> {
    let path_clone = path.clone();
    tokio::task::spawn_blocking(move || {
        std::fs::read_to_string(&path_clone).map_err(|e| EvalError::io(&path_clone, e))
    })
    .await?
}
