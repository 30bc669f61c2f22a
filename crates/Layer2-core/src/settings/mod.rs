//! Settings - 반응형 설정 저장소
//!
//! - `store`: 트리, 구독, 잠금, 저장 요청
//! - `persist`: 단일 writer 태스크 (debounce)
//! - `plugin`: 플러그인 범위 핸들
//! - `tree`: 경로 조작 / 기본값 병합

mod defaults;
mod persist;
mod plugin;
mod store;
mod tree;

pub use defaults::default_settings;
pub use persist::Persister;
pub use plugin::PluginSettings;
pub use store::{SettingsCallback, SettingsStore, SubscriptionId};
pub use tree::{get_path, merge_defaults, set_path};
