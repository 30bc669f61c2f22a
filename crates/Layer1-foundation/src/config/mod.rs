//! Config - 런타임 설정 관리
//!
//! - `runtime.rs` - RuntimeConfig (글로벌 + 프로젝트 병합)

mod runtime;

pub use runtime::{RuntimeConfig, DEFAULT_SELF_REFERENCE, RUNTIME_CONFIG_FILE};
