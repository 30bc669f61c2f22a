//! Error types for Splice
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Splice 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 플러그인 관련
    // ========================================================================
    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin {0} is required and cannot be disabled")]
    RequiredPlugin(String),

    // ========================================================================
    // 패치 / 모듈 관련
    // ========================================================================
    #[error("Patch by {plugin} failed: {message}")]
    Patch { plugin: String, message: String },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Module error: {0}")]
    Module(String),

    /// 모듈 로더 훅은 프로세스당 한 번만 설치 가능
    #[error("Module loader is already intercepted")]
    AlreadyIntercepted,

    // ========================================================================
    // 외부 연동
    // ========================================================================
    #[error("URL not allowed: {0}")]
    UrlNotAllowed(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 복구 불가능한 프로그래밍 오류인지 확인
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::AlreadyIntercepted)
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::RequiredPlugin(_)
                | Error::PluginNotFound(_)
                | Error::UrlNotAllowed(_)
                | Error::InvalidInput(_)
                | Error::NotFound(_)
        )
    }

    /// 패치 에러 생성 헬퍼
    pub fn patch(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Patch {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
