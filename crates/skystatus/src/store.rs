//! API トークンや最後に反映したステータスのフィンガープリントを保持するパラメータストア。

use std::{
    collections::BTreeMap,
    fs,
    io::Write as _,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Parameter not found: {0}")]
    NotFound(String),
    #[error("Failed to access parameter file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse parameter file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 名前付きの文字列値を保持する永続ストア。
pub trait ParameterStore: Send + Sync {
    /// 値を取得する。`decrypt` は暗号化された値を復号して返すよう要求する。
    fn get(&self, name: &str, decrypt: bool) -> Result<String, StoreError>;

    /// 値を上書き保存する。
    fn put(&self, name: &str, value: &str) -> Result<(), StoreError>;
}

/// JSON ファイルにパラメータを保存するストア。
///
/// 呼び出しのたびにファイルを読み書きするので、別プロセスからの更新も反映される。
/// 値は平文で保存されるため `decrypt` は無視する。
pub struct FileParameterStore {
    /// 永続化ファイルのパス
    path: PathBuf,
}

impl FileParameterStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ファイルを読み込む。ファイルが存在しない場合は空として扱う。
    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 同じディレクトリの一時ファイルに書いてから置き換える。途中で落ちても元のファイルは残る。
    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let content = serde_json::to_string_pretty(values)?;
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ParameterStore for FileParameterStore {
    fn get(&self, name: &str, _decrypt: bool) -> Result<String, StoreError> {
        self.load()?
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn put(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.load()?;
        values.insert(name.to_string(), value.to_string());
        self.save(&values)
    }
}

/// プロセス内だけで値を保持するストア。
#[derive(Default)]
pub struct MemoryParameterStore {
    values: Mutex<BTreeMap<String, String>>,
    writes: Mutex<usize>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: Mutex::new(values),
            writes: Mutex::new(0),
        }
    }

    /// `put` が呼ばれた回数。
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn value(&self, name: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl ParameterStore for MemoryParameterStore {
    fn get(&self, name: &str, _decrypt: bool) -> Result<String, StoreError> {
        self.value(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn put(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
