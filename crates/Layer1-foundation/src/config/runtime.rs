//! Runtime Config - 런타임 설정
//!
//! 글로벌(`<config_dir>/splice/splice.json`)과 프로젝트(`./.splice/splice.json`)
//! 설정을 순서대로 병합합니다. 지정되지 않은 값은 기본값을 사용합니다.

use crate::security::{UrlPolicy, DEFAULT_ALLOWED_SCHEMES};
use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 설정 파일명
pub const RUNTIME_CONFIG_FILE: &str = "splice.json";

/// `$self` 치환 기본 템플릿 (`{name}` 자리에 플러그인 이름)
pub const DEFAULT_SELF_REFERENCE: &str = "Splice.Plugins.plugins[\"{name}\"]";

/// 런타임 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// 설정 저장 디렉토리 (None이면 글로벌 디렉토리)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_dir: Option<PathBuf>,

    /// 설정 저장 debounce (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_debounce_ms: Option<u64>,

    /// 매칭되지 않은 패치 경고 여부
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_unmatched_patches: Option<bool>,

    /// `$self` 치환 템플릿
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_reference: Option<String>,

    /// 외부 URL 허용 scheme
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_url_schemes: Option<Vec<String>>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)? {
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)?
            {
                config.merge(project_config);
            }
        }

        Ok(config)
    }

    /// 특정 저장소에서만 로드
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)?
            .unwrap_or_default())
    }

    /// 저장
    pub fn save_to(&self, store: &JsonStore) -> Result<()> {
        store.save(RUNTIME_CONFIG_FILE, self)
    }

    /// 다른 설정 병합 (지정된 값이 우선)
    pub fn merge(&mut self, other: RuntimeConfig) {
        if other.settings_dir.is_some() {
            self.settings_dir = other.settings_dir;
        }
        if other.persist_debounce_ms.is_some() {
            self.persist_debounce_ms = other.persist_debounce_ms;
        }
        if other.warn_unmatched_patches.is_some() {
            self.warn_unmatched_patches = other.warn_unmatched_patches;
        }
        if other.self_reference.is_some() {
            self.self_reference = other.self_reference;
        }
        if other.allowed_url_schemes.is_some() {
            self.allowed_url_schemes = other.allowed_url_schemes;
        }
    }

    // ========================================================================
    // 접근자 (기본값 적용)
    // ========================================================================

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms.unwrap_or(0))
    }

    pub fn warn_unmatched(&self) -> bool {
        self.warn_unmatched_patches.unwrap_or(true)
    }

    /// 플러그인 이름으로 `$self` 치환 텍스트 생성
    pub fn self_reference_for(&self, plugin: &str) -> String {
        self.self_reference
            .as_deref()
            .unwrap_or(DEFAULT_SELF_REFERENCE)
            .replace("{name}", plugin)
    }

    pub fn url_policy(&self) -> UrlPolicy {
        match &self.allowed_url_schemes {
            Some(schemes) => UrlPolicy::new(schemes.iter().cloned()),
            None => UrlPolicy::new(DEFAULT_ALLOWED_SCHEMES.iter().copied()),
        }
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn settings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings_dir = Some(dir.into());
        self
    }

    pub fn persist_debounce_ms(mut self, ms: u64) -> Self {
        self.persist_debounce_ms = Some(ms);
        self
    }

    pub fn warn_unmatched_patches(mut self, warn: bool) -> Self {
        self.warn_unmatched_patches = Some(warn);
        self
    }

    pub fn self_reference(mut self, template: impl Into<String>) -> Self {
        self.self_reference = Some(template.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::new();
        assert_eq!(config.persist_debounce(), Duration::ZERO);
        assert!(config.warn_unmatched());
        assert_eq!(
            config.self_reference_for("NoTrack"),
            "Splice.Plugins.plugins[\"NoTrack\"]"
        );
    }

    #[test]
    fn test_merge_prefers_specified_values() {
        let mut base = RuntimeConfig::new().persist_debounce_ms(100);
        let project = RuntimeConfig::new().warn_unmatched_patches(false);

        base.merge(project);

        assert_eq!(base.persist_debounce(), Duration::from_millis(100));
        assert!(!base.warn_unmatched());
    }

    #[test]
    fn test_round_trip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        let config = RuntimeConfig::new()
            .settings_dir("/tmp/splice")
            .self_reference("window.$plugins.{name}");
        config.save_to(&store).unwrap();

        let loaded = RuntimeConfig::load_from(&store).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.self_reference_for("Foo"), "window.$plugins.Foo");

        let text = store.read_text(RUNTIME_CONFIG_FILE).unwrap().unwrap();
        assert!(text.contains("selfReference"));
    }
}
