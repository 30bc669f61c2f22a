//! Filters - export 술어
//!
//! 필터는 export 값을 읽기만 하는 순수 술어입니다 (`&ExportValue`).

use crate::module::ExportValue;
use regex::Regex;
use splice_foundation::Result;
use std::fmt;
use std::sync::Arc;

type Predicate = dyn Fn(&ExportValue) -> bool + Send + Sync;

/// Export 필터
#[derive(Clone)]
pub struct Filter {
    description: Arc<str>,
    predicate: Arc<Predicate>,
}

impl Filter {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&ExportValue) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into().into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, value: &ExportValue) -> bool {
        (self.predicate)(value)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.description).finish()
    }
}

// ============================================================================
// 기본 필터
// ============================================================================

/// 모든 속성을 가진 객체
pub fn by_props<S: AsRef<str>>(props: &[S]) -> Filter {
    let props: Vec<String> = props.iter().map(|p| p.as_ref().to_string()).collect();
    let description = format!("byProps({})", props.join(", "));

    if let [single] = props.as_slice() {
        let single = single.clone();
        return Filter::new(description, move |value| value.has_prop(&single));
    }

    Filter::new(description, move |value| props.iter().all(|p| value.has_prop(p)))
}

/// 함수 소스에 모든 부분 문자열이 포함된 함수
pub fn by_code<S: AsRef<str>>(code: &[S]) -> Filter {
    let code: Vec<String> = code.iter().map(|c| c.as_ref().to_string()).collect();
    let description = format!("byCode({})", code.join(", "));

    Filter::new(description, move |value| match value.function_source() {
        Some(source) => code.iter().all(|c| source.contains(c.as_str())),
        None => false,
    })
}

/// displayName이 일치하는 컴포넌트
pub fn by_display_name(name: impl Into<String>) -> Filter {
    let name = name.into();
    Filter::new(format!("byDisplayName({})", name), move |value| {
        value.display_name() == Some(name.as_str())
    })
}

/// 클래스 이름이 일치하는 store 인스턴스
pub fn by_store_name(name: impl Into<String>) -> Filter {
    let name = name.into();
    Filter::new(format!("byStoreName({})", name), move |value| {
        value.class_name() == Some(name.as_str())
    })
}

/// 임의 술어
pub fn custom<F>(description: impl Into<String>, predicate: F) -> Filter
where
    F: Fn(&ExportValue) -> bool + Send + Sync + 'static,
{
    Filter::new(description, predicate)
}

// ============================================================================
// CodePattern - 원본 소스 대상 패턴
// ============================================================================

/// 평가 전 소스 텍스트 대상 패턴
#[derive(Debug, Clone)]
pub enum CodePattern {
    Literal(String),
    Regex(Regex),
}

impl CodePattern {
    pub fn literal(text: impl Into<String>) -> Self {
        CodePattern::Literal(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(CodePattern::Regex(Regex::new(pattern)?))
    }

    pub fn is_match(&self, source: &str) -> bool {
        match self {
            CodePattern::Literal(text) => source.contains(text.as_str()),
            CodePattern::Regex(re) => re.is_match(source),
        }
    }
}

impl fmt::Display for CodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodePattern::Literal(text) => write!(f, "{:?}", text),
            CodePattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for CodePattern {
    fn from(text: &str) -> Self {
        CodePattern::Literal(text.to_string())
    }
}

impl From<Regex> for CodePattern {
    fn from(re: Regex) -> Self {
        CodePattern::Regex(re)
    }
}
