//! Native Bridge - 데스크톱 셸 프로세스와의 연동 계약
//!
//! 런타임 코어가 셸 프로세스에 요구하는 최소 인터페이스입니다.
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────────┐
//! │   SettingsStore      │ ─────▶ │ get_settings_text (sync) │
//! │                      │ ─────▶ │ set_settings_text (async)│
//! ├──────────────────────┤        ├──────────────────────────┤
//! │   Quick style        │ ─────▶ │ get/set_quick_style_text │
//! │                      │ ◀───── │ subscribe_quick_style    │
//! ├──────────────────────┤        ├──────────────────────────┤
//! │   Plugin hooks       │ ─────▶ │ open_external (allow-list│
//! └──────────────────────┘        └──────────────────────────┘
//! ```
//!
//! - `file`: 디렉토리 기반 구현 (`settings.json`, `quickCss.css`)
//! - `memory`: 테스트/임베딩용 메모리 구현 (쓰기 기록 보관)

mod file;
mod memory;

pub use file::{FileBridge, QUICK_CSS_FILE, SETTINGS_FILE};
pub use memory::MemoryBridge;

use crate::{Error, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use url::Url;

/// 셸 프로세스 브릿지
#[async_trait]
pub trait NativeBridge: Send + Sync {
    /// 저장된 설정 텍스트 (시작 시 한 번, 동기 호출). 없으면 None
    fn get_settings_text(&self) -> Result<Option<String>>;

    /// 설정 텍스트 저장
    ///
    /// 호출자는 완료를 기다리지 않아도 되지만, 구현은 호출 순서대로 적용해야 합니다.
    async fn set_settings_text(&self, text: String) -> Result<()>;

    /// Quick style 텍스트
    fn get_quick_style_text(&self) -> Result<String> {
        Ok(String::new())
    }

    /// Quick style 텍스트 저장
    async fn set_quick_style_text(&self, _text: String) -> Result<()> {
        Err(Error::Unsupported("quick style storage".to_string()))
    }

    /// 외부 편집 알림 채널
    fn subscribe_quick_style(&self) -> Option<broadcast::Receiver<String>> {
        None
    }

    /// 외부 URL 열기 (scheme 검사는 호출자가 이미 수행)
    async fn open_external(&self, url: &Url) -> Result<()> {
        Err(Error::Unsupported(format!("opening {}", url)))
    }
}
