//! # splice-foundation
//!
//! Foundation layer for Splice:
//! - Error: 중앙 에러 타입
//! - Config: 런타임 설정 (RuntimeConfig, 글로벌 + 프로젝트 병합)
//! - Storage: JsonStore (범용 JSON 파일)
//! - Bridge: 셸 프로세스 연동 계약 (설정 텍스트, quick style, 외부 URL)
//! - Security: 외부 URL scheme 정책
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  splice-core (Registry / Patch / Plugin / Settings)     │
//! │                     │                                   │
//! │                     ▼                                   │
//! │          NativeBridge (settings text, urls)             │
//! │          ┌─────────┴─────────┐                          │
//! │          ▼                   ▼                          │
//! │     FileBridge          MemoryBridge                    │
//! │   (settings.json)      (tests / embedding)              │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod security;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{RuntimeConfig, DEFAULT_SELF_REFERENCE, RUNTIME_CONFIG_FILE};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::JsonStore;

// ============================================================================
// Bridge (셸 연동)
// ============================================================================
pub use bridge::{FileBridge, MemoryBridge, NativeBridge, QUICK_CSS_FILE, SETTINGS_FILE};

// ============================================================================
// Security (URL 정책)
// ============================================================================
pub use security::{UrlPolicy, DEFAULT_ALLOWED_SCHEMES};
