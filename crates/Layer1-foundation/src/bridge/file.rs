//! 디렉토리 기반 Native Bridge

use super::NativeBridge;
use crate::storage::JsonStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

/// 설정 파일명
pub const SETTINGS_FILE: &str = "settings.json";

/// Quick style 파일명
pub const QUICK_CSS_FILE: &str = "quickCss.css";

/// 파일 시스템 브릿지
///
/// 쓰기는 내부 Mutex로 직렬화되어 먼저 시작된 쓰기가 나중 쓰기를 덮어쓰지 않습니다.
pub struct FileBridge {
    store: JsonStore,
    write_lock: Arc<Mutex<()>>,
    quick_style_tx: broadcast::Sender<String>,
}

impl FileBridge {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let (quick_style_tx, _) = broadcast::channel(16);
        Self {
            store: JsonStore::new(dir),
            write_lock: Arc::new(Mutex::new(())),
            quick_style_tx,
        }
    }

    /// 글로벌 설정 디렉토리 사용
    pub fn global() -> Result<Self> {
        let store = JsonStore::global()?;
        Ok(Self::new(store.base_dir().to_path_buf()))
    }

    pub fn dir(&self) -> &Path {
        self.store.base_dir()
    }

    async fn write(&self, filename: &'static str, text: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.write_text(filename, &text))
            .await
            .map_err(|e| Error::Storage(format!("Write task failed: {}", e)))??;
        debug!("Wrote {}", self.store.file_path(filename).display());
        Ok(())
    }
}

#[async_trait]
impl NativeBridge for FileBridge {
    fn get_settings_text(&self) -> Result<Option<String>> {
        self.store.read_text(SETTINGS_FILE)
    }

    async fn set_settings_text(&self, text: String) -> Result<()> {
        self.write(SETTINGS_FILE, text).await
    }

    fn get_quick_style_text(&self) -> Result<String> {
        Ok(self.store.read_text(QUICK_CSS_FILE)?.unwrap_or_default())
    }

    async fn set_quick_style_text(&self, text: String) -> Result<()> {
        self.write(QUICK_CSS_FILE, text.clone()).await?;
        // 수신자가 없으면 Err이지만 무시해도 됨
        let _ = self.quick_style_tx.send(text);
        Ok(())
    }

    fn subscribe_quick_style(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.quick_style_tx.subscribe())
    }
}
