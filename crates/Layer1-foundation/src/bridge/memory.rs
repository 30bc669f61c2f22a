//! 메모리 Native Bridge - 테스트 및 임베딩용

use super::NativeBridge;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use url::Url;

/// 메모리 브릿지
///
/// 모든 설정 쓰기를 순서대로 기록합니다.
pub struct MemoryBridge {
    settings: Mutex<Option<String>>,
    writes: Mutex<Vec<String>>,
    quick_style: Mutex<String>,
    opened: Mutex<Vec<String>>,
    quick_style_tx: broadcast::Sender<String>,
}

impl MemoryBridge {
    /// 빈 브릿지 (저장된 설정 없음)
    pub fn new() -> Self {
        let (quick_style_tx, _) = broadcast::channel(16);
        Self {
            settings: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            quick_style: Mutex::new(String::new()),
            opened: Mutex::new(Vec::new()),
            quick_style_tx,
        }
    }

    /// 저장된 설정 텍스트로 시작
    pub fn with_settings(text: impl Into<String>) -> Self {
        let bridge = Self::new();
        *bridge.settings.lock() = Some(text.into());
        bridge
    }

    /// 지금까지 기록된 쓰기 (순서대로)
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    /// 쓰기 횟수
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    /// 마지막으로 저장된 설정
    pub fn last_written(&self) -> Option<String> {
        self.writes.lock().last().cloned()
    }

    /// 열린 외부 URL 목록
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NativeBridge for MemoryBridge {
    fn get_settings_text(&self) -> Result<Option<String>> {
        Ok(self.settings.lock().clone())
    }

    async fn set_settings_text(&self, text: String) -> Result<()> {
        *self.settings.lock() = Some(text.clone());
        self.writes.lock().push(text);
        Ok(())
    }

    fn get_quick_style_text(&self) -> Result<String> {
        Ok(self.quick_style.lock().clone())
    }

    async fn set_quick_style_text(&self, text: String) -> Result<()> {
        *self.quick_style.lock() = text.clone();
        let _ = self.quick_style_tx.send(text);
        Ok(())
    }

    fn subscribe_quick_style(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.quick_style_tx.subscribe())
    }

    async fn open_external(&self, url: &Url) -> Result<()> {
        self.opened.lock().push(url.to_string());
        Ok(())
    }
}
