//! JSON 파일 저장소

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// 글로벌 설정 디렉토리 이름 (`<config_dir>/splice`)
pub const GLOBAL_DIR_NAME: &str = "splice";

/// 프로젝트 설정 디렉토리 이름 (`./.splice`)
pub const PROJECT_DIR_NAME: &str = ".splice";

/// JSON 파일 저장소
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 글로벌 저장소 (`<config_dir>/splice/`)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join(GLOBAL_DIR_NAME);
        Ok(Self::new(dir))
    }

    /// 프로젝트 저장소 (`<root>/.splice/`)
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(PROJECT_DIR_NAME))
    }

    /// 현재 디렉토리 프로젝트 저장소
    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot get current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            std::fs::create_dir_all(&self.base_dir).map_err(|e| {
                Error::Storage(format!(
                    "Failed to create {}: {}",
                    self.base_dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// 텍스트 그대로 읽기 (파일이 없으면 None)
    pub fn read_text(&self, filename: &str) -> Result<Option<String>> {
        let path = self.file_path(filename);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// 텍스트 저장 (임시 파일 + rename)
    pub fn write_text(&self, filename: &str, text: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.file_path(filename);
        let tmp = self.file_path(&format!(".{}.tmp", filename));
        std::fs::write(&tmp, text)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| Error::Storage(format!("Failed to replace {}: {}", path.display(), e)))
    }

    /// JSON 로드
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        let path = self.file_path(filename);
        let content = self
            .read_text(filename)?
            .ok_or_else(|| Error::NotFound(path.display().to_string()))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// JSON 로드 (Optional)
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        match self.read_text(filename)? {
            Some(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
                Error::Config(format!(
                    "Failed to parse {}: {}",
                    self.file_path(filename).display(),
                    e
                ))
            }),
            None => Ok(None),
        }
    }

    /// JSON 로드 (실패 시 기본값 + 경고)
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, filename: &str) -> T {
        match self.load_optional(filename) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!("{}; falling back to defaults", e);
                T::default()
            }
        }
    }

    /// JSON 저장
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(data)?;
        self.write_text(filename, &content)
    }

    /// 파일 존재 여부
    pub fn exists(&self, filename: &str) -> bool {
        self.file_path(filename).exists()
    }
}
