//! Plugin Manifest - 플러그인 메타데이터 정의
//!
//! 네이티브 플러그인은 빌더로, 선언형 플러그인은 JSON 매니페스트로
//! 같은 `PluginManifest`를 만듭니다. 매니페스트의 패치는 템플릿 치환만
//! 표현할 수 있습니다.

use crate::patch::{FindToken, MatchPattern, PatchDescriptor, Replacement};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use splice_foundation::Result;
use std::collections::BTreeMap;

// ============================================================================
// StartAt
// ============================================================================

/// 플러그인 시작 단계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StartAt {
    /// 부트스트랩 직후 (모듈 로드 전)
    Init,
    /// 호스트 모듈 준비 완료
    #[default]
    ModulesReady,
    /// DOM 준비 완료
    DomReady,
}

// ============================================================================
// Options
// ============================================================================

/// 옵션 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Boolean,
    Number,
    String,
    Select,
    Slider,
    Custom,
}

/// select 옵션 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: Value,
    #[serde(default)]
    pub default: bool,
}

/// 플러그인 옵션 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDef {
    #[serde(rename = "type")]
    pub kind: OptionType,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,

    /// 변경 시 재시작 필요
    #[serde(default)]
    pub restart_needed: bool,
}

impl OptionDef {
    pub fn new(kind: OptionType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            default: None,
            options: Vec::new(),
            restart_needed: false,
        }
    }

    pub fn boolean(description: impl Into<String>, default: bool) -> Self {
        Self::new(OptionType::Boolean, description).with_default(default)
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn restart_needed(mut self) -> Self {
        self.restart_needed = true;
        self
    }

    /// 기본값 (select는 default로 표시된 항목)
    pub fn default_value(&self) -> Option<Value> {
        if let Some(default) = &self.default {
            return Some(default.clone());
        }
        self.options
            .iter()
            .find(|o| o.default)
            .map(|o| o.value.clone())
    }
}

// ============================================================================
// 선언형 패치
// ============================================================================

/// 치환 규칙 (템플릿)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementManifest {
    #[serde(rename = "match")]
    pub pattern: String,

    /// 리터럴 매치 (기본은 정규식)
    #[serde(default)]
    pub literal: bool,

    #[serde(default)]
    pub global: bool,

    pub replace: String,
}

impl ReplacementManifest {
    fn compile(&self) -> Result<Replacement> {
        let pattern = if self.literal {
            MatchPattern::literal(&self.pattern)
        } else if self.global {
            MatchPattern::regex_global(&self.pattern)?
        } else {
            MatchPattern::regex(&self.pattern)?
        };
        Ok(Replacement::template(pattern, &self.replace))
    }
}

/// 한 개 또는 여러 개
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
            OneOrMany::Many(items) => items.iter(),
        }
    }
}

/// 선언형 패치
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchManifest {
    pub find: String,

    /// find를 정규식으로 취급
    #[serde(default)]
    pub find_regex: bool,

    pub replacement: OneOrMany<ReplacementManifest>,

    #[serde(default, alias = "noWarn")]
    pub optional: bool,

    #[serde(default)]
    pub group: bool,
}

impl PatchManifest {
    pub fn compile(&self) -> Result<PatchDescriptor> {
        let find = if self.find_regex {
            FindToken::regex(&self.find)?
        } else {
            FindToken::literal(&self.find)
        };

        let mut descriptor = PatchDescriptor::new(find);
        for replacement in self.replacement.iter() {
            descriptor = descriptor.replacement(replacement.compile()?);
        }
        descriptor.optional = self.optional;
        descriptor.group = self.group;
        Ok(descriptor)
    }
}

// ============================================================================
// PluginManifest
// ============================================================================

/// 플러그인 작성자
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// 플러그인 매니페스트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// 고유 이름
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub authors: Vec<PluginAuthor>,

    /// 항상 활성 (비활성화 불가)
    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub enabled_by_default: bool,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub start_at: StartAt,

    #[serde(default)]
    pub options: BTreeMap<String, OptionDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<PatchManifest>,
}

impl PluginManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            authors: Vec::new(),
            required: false,
            enabled_by_default: false,
            dependencies: Vec::new(),
            start_at: StartAt::default(),
            options: BTreeMap::new(),
            patches: Vec::new(),
        }
    }

    /// 설정 기본값 (`enabled` + 옵션 기본값)
    pub fn settings_defaults(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(
            "enabled".to_string(),
            Value::Bool(self.required || self.enabled_by_default),
        );
        for (key, option) in &self.options {
            if let Some(default) = option.default_value() {
                map.insert(key.clone(), default);
            }
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleId;
    use crate::patch::PatchEngine;
    use serde_json::json;

    #[test]
    fn test_parse_manifest() {
        let manifest: PluginManifest = serde_json::from_value(json!({
            "name": "NoTrack",
            "description": "Disable analytics",
            "authors": [{"name": "dev"}],
            "required": true,
            "dependencies": ["Core"],
            "startAt": "Init",
            "options": {
                "mode": {
                    "type": "select",
                    "options": [
                        {"label": "Strict", "value": "strict", "default": true},
                        {"label": "Loose", "value": "loose"}
                    ]
                },
                "verbose": {"type": "boolean", "default": false, "restartNeeded": true}
            },
            "patches": [{
                "find": ".track(",
                "replacement": {"match": "(\\i)\\.track\\(", "replace": "void 0&&$1.track("},
                "noWarn": true
            }]
        }))
        .unwrap();

        assert_eq!(manifest.start_at, StartAt::Init);
        assert!(manifest.patches[0].optional);
        assert_eq!(
            manifest.settings_defaults(),
            json!({"enabled": true, "mode": "strict", "verbose": false})
        );
    }

    #[test]
    fn test_compiled_patch_applies() {
        let patch: PatchManifest = serde_json::from_value(json!({
            "find": "helloWorld",
            "replacement": [
                {"match": "helloWorld()", "literal": true, "replace": "helloWorld(42)"}
            ]
        }))
        .unwrap();

        let engine = PatchEngine::default();
        engine.register("Greeter", patch.compile().unwrap());
        let outcome = engine.apply(&ModuleId::from("1"), "function f(){return helloWorld();}");
        assert_eq!(outcome.source, "function f(){return helloWorld(42);}");
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let patch: PatchManifest = serde_json::from_value(json!({
            "find": "x",
            "replacement": {"match": "(", "replace": ""}
        }))
        .unwrap();
        assert!(patch.compile().is_err());
    }
}
