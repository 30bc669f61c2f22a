//! Module Types - 모듈 식별자, export 값, 모듈 레코드
//!
//! 호스트 번들의 모듈 export는 JSON 값 위에 두 가지 확장을 얹어 표현합니다:
//!
//! - 함수: 소스 텍스트(`by_code` 필터 대상)와 선택적 displayName
//! - 객체: 속성 맵 + 선택적 클래스 이름 (store 판별용)
//!
//! 번들 JSON에서는 `{"$fn": "..."}`가 함수, `{"$class": "..."}`가 클래스
//! 이름을 가진 객체입니다.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// 함수 export 표시 키
pub const FUNCTION_KEY: &str = "$fn";

/// 클래스 이름 표시 키
pub const CLASS_KEY: &str = "$class";

/// 중첩 export 탐색 시 허용되는 최대 키 길이 (난독화된 짧은 이름)
pub const NESTED_KEY_MAX_LEN: usize = 3;

// ============================================================================
// ModuleId
// ============================================================================

/// 모듈 ID (호스트 번들 내 고유)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for ModuleId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

// ============================================================================
// ExportValue
// ============================================================================

/// 모듈 export 값
#[derive(Debug, Clone, PartialEq)]
pub enum ExportValue {
    /// 일반 JSON 값 (숫자, 문자열, 배열, null ...)
    Value(Value),

    /// 함수
    Function {
        source: String,
        display_name: Option<String>,
    },

    /// 객체 (속성 + 클래스 이름)
    Object {
        props: BTreeMap<String, ExportValue>,
        class_name: Option<String>,
    },
}

impl ExportValue {
    /// 함수 export
    pub fn function(source: impl Into<String>) -> Self {
        ExportValue::Function {
            source: source.into(),
            display_name: None,
        }
    }

    /// displayName을 가진 컴포넌트 함수
    pub fn component(display_name: impl Into<String>, source: impl Into<String>) -> Self {
        ExportValue::Function {
            source: source.into(),
            display_name: Some(display_name.into()),
        }
    }

    /// 객체 export
    pub fn object<K: Into<String>>(props: impl IntoIterator<Item = (K, ExportValue)>) -> Self {
        ExportValue::Object {
            props: props.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            class_name: None,
        }
    }

    /// 클래스 인스턴스 (flux store 등)
    pub fn instance<K: Into<String>>(
        class_name: impl Into<String>,
        props: impl IntoIterator<Item = (K, ExportValue)>,
    ) -> Self {
        ExportValue::Object {
            props: props.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            class_name: Some(class_name.into()),
        }
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn is_object(&self) -> bool {
        matches!(self, ExportValue::Object { .. })
    }

    /// JS 기준 truthy 여부 (null, false, 0, "" 는 falsy)
    pub fn is_truthy(&self) -> bool {
        match self {
            ExportValue::Value(Value::Null) | ExportValue::Value(Value::Bool(false)) => false,
            ExportValue::Value(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            ExportValue::Value(Value::String(s)) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn props(&self) -> Option<&BTreeMap<String, ExportValue>> {
        match self {
            ExportValue::Object { props, .. } => Some(props),
            _ => None,
        }
    }

    /// 속성 조회
    pub fn get(&self, key: &str) -> Option<&ExportValue> {
        self.props().and_then(|props| props.get(key))
    }

    /// 속성 존재 여부 (값이 falsy여도 존재하면 true)
    pub fn has_prop(&self, key: &str) -> bool {
        self.props().map(|props| props.contains_key(key)).unwrap_or(false)
    }

    /// `default` export
    pub fn default_export(&self) -> Option<&ExportValue> {
        self.get("default")
    }

    pub fn function_source(&self) -> Option<&str> {
        match self {
            ExportValue::Function { source, .. } => Some(source),
            _ => None,
        }
    }

    /// 함수의 displayName, 또는 객체의 `displayName` 문자열 속성
    pub fn display_name(&self) -> Option<&str> {
        match self {
            ExportValue::Function { display_name, .. } => display_name.as_deref(),
            ExportValue::Object { props, .. } => match props.get("displayName") {
                Some(ExportValue::Value(Value::String(name))) => Some(name),
                _ => None,
            },
            ExportValue::Value(_) => None,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            ExportValue::Object { class_name, .. } => class_name.as_deref(),
            _ => None,
        }
    }

    /// 짧은 키(난독화된 이름)를 가진 중첩 export
    pub fn short_key_members(&self) -> impl Iterator<Item = (&str, &ExportValue)> {
        self.props()
            .into_iter()
            .flat_map(|props| props.iter())
            .filter(|(key, _)| key.chars().count() <= NESTED_KEY_MAX_LEN)
            .map(|(key, value)| (key.as_str(), value))
    }

    // ========================================================================
    // JSON 변환
    // ========================================================================

    /// 번들 JSON 표현으로 변환
    pub fn to_json(&self) -> Value {
        match self {
            ExportValue::Value(v) => v.clone(),
            ExportValue::Function {
                source,
                display_name,
            } => {
                let mut map = Map::new();
                map.insert(FUNCTION_KEY.to_string(), Value::String(source.clone()));
                if let Some(name) = display_name {
                    map.insert("displayName".to_string(), Value::String(name.clone()));
                }
                Value::Object(map)
            }
            ExportValue::Object { props, class_name } => {
                let mut map: Map<String, Value> =
                    props.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                if let Some(class) = class_name {
                    map.insert(CLASS_KEY.to_string(), Value::String(class.clone()));
                }
                Value::Object(map)
            }
        }
    }
}

impl From<Value> for ExportValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                if let Some(Value::String(source)) = map.get(FUNCTION_KEY) {
                    let display_name = match map.get("displayName") {
                        Some(Value::String(name)) => Some(name.clone()),
                        _ => None,
                    };
                    return ExportValue::Function {
                        source: source.clone(),
                        display_name,
                    };
                }

                let class_name = match map.remove(CLASS_KEY) {
                    Some(Value::String(class)) => Some(class),
                    _ => None,
                };
                ExportValue::Object {
                    props: map.into_iter().map(|(k, v)| (k, ExportValue::from(v))).collect(),
                    class_name,
                }
            }
            other => ExportValue::Value(other),
        }
    }
}

impl From<ExportValue> for Value {
    fn from(value: ExportValue) -> Self {
        value.to_json()
    }
}

impl Serialize for ExportValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExportValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ExportValue::from)
    }
}

// ============================================================================
// ModuleRecord
// ============================================================================

/// 모듈 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    /// 정의됨 (아직 평가 전)
    Defined,
    /// 평가 중
    Evaluating,
    /// 평가 완료
    Loaded,
}

/// 모듈 레코드
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub id: ModuleId,

    /// 원본 소스 (변경되지 않음)
    pub raw_source: Arc<str>,

    /// 평가에 사용된 패치된 소스 (패치가 없거나 fallback 시 None)
    pub patched_source: Option<String>,

    /// 소스를 수정한 플러그인 목록
    pub patched_by: Vec<String>,

    /// 평가 결과 (한 번만 설정됨)
    pub exports: Option<Arc<ExportValue>>,

    pub state: ModuleState,
}

impl ModuleRecord {
    pub fn new(id: ModuleId, raw_source: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            raw_source: raw_source.into(),
            patched_source: None,
            patched_by: Vec::new(),
            exports: None,
            state: ModuleState::Defined,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ModuleState::Loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_bundle_json() {
        let value = ExportValue::from(json!({
            "$class": "UserStore",
            "getUser": { "$fn": "function(e){return this.users[e]}" },
            "Button": { "$fn": "function(){}", "displayName": "Button" },
            "count": 3
        }));

        assert_eq!(value.class_name(), Some("UserStore"));
        assert!(value.has_prop("getUser"));
        assert!(!value.has_prop("$class"));
        assert_eq!(
            value.get("getUser").and_then(|f| f.function_source()),
            Some("function(e){return this.users[e]}")
        );
        assert_eq!(value.get("Button").and_then(|b| b.display_name()), Some("Button"));
    }

    #[test]
    fn test_to_json_keeps_markers() {
        let value = ExportValue::instance(
            "ChannelStore",
            [("getChannel", ExportValue::function("function(){}"))],
        );
        let json = value.to_json();
        assert_eq!(json["$class"], "ChannelStore");
        assert_eq!(json["getChannel"]["$fn"], "function(){}");
        assert_eq!(ExportValue::from(json), value);
    }

    #[test]
    fn test_truthiness() {
        assert!(!ExportValue::Value(Value::Null).is_truthy());
        assert!(!ExportValue::Value(json!(0)).is_truthy());
        assert!(!ExportValue::Value(json!("")).is_truthy());
        assert!(ExportValue::Value(json!(1)).is_truthy());
        assert!(ExportValue::object(Vec::<(String, ExportValue)>::new()).is_truthy());
    }

    #[test]
    fn test_short_key_members() {
        let value = ExportValue::object([
            ("Z", ExportValue::function("a")),
            ("abc", ExportValue::function("b")),
            ("long", ExportValue::function("c")),
        ]);
        let keys: Vec<&str> = value.short_key_members().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Z", "abc"]);
    }
}
