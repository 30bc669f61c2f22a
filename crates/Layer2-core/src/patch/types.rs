//! Patch Types - 패치 디스크립터
//!
//! ```text
//! PatchDescriptor
//! ├── find: FindToken            (모듈 게이트: 포함되어야 규칙 평가)
//! ├── predicate                  (false면 디스크립터 전체 건너뜀)
//! ├── optional / group
//! └── replacements: [Replacement]
//!     ├── pattern: MatchPattern  (리터럴 | 정규식, global 여부)
//!     ├── replace: Replace       (템플릿 | 함수)
//!     └── predicate
//! ```

use super::canonical::{canonicalize_pattern, PatchMatch};
use regex::Regex;
use splice_foundation::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// 디스크립터/규칙 활성 조건
pub type PatchPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// 치환 함수
pub type ReplaceFn = Arc<dyn Fn(&PatchMatch<'_>) -> anyhow::Result<String> + Send + Sync>;

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&canonicalize_pattern(pattern))
        .map_err(|e| Error::InvalidPattern(format!("{}: {}", pattern, e)))
}

// ============================================================================
// FindToken
// ============================================================================

/// 모듈 게이트 토큰
#[derive(Clone)]
pub enum FindToken {
    Literal(String),
    Regex(Regex),
}

impl FindToken {
    pub fn literal(text: impl Into<String>) -> Self {
        FindToken::Literal(text.into())
    }

    /// 정규식 토큰 (`\i` 전개)
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(FindToken::Regex(compile(pattern)?))
    }

    pub fn occurs_in(&self, source: &str) -> bool {
        match self {
            FindToken::Literal(text) => source.contains(text.as_str()),
            FindToken::Regex(re) => re.is_match(source),
        }
    }
}

impl fmt::Display for FindToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindToken::Literal(text) => f.write_str(text),
            FindToken::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl fmt::Debug for FindToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FindToken({})", self)
    }
}

impl From<&str> for FindToken {
    fn from(text: &str) -> Self {
        FindToken::literal(text)
    }
}

impl From<String> for FindToken {
    fn from(text: String) -> Self {
        FindToken::Literal(text)
    }
}

// ============================================================================
// MatchPattern
// ============================================================================

/// 치환 대상 패턴
#[derive(Clone)]
pub enum MatchPattern {
    /// 첫 번째 출현만 치환
    Literal(String),
    /// global이면 모든 매치 치환
    Regex { regex: Regex, global: bool },
}

impl MatchPattern {
    pub fn literal(text: impl Into<String>) -> Self {
        MatchPattern::Literal(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(MatchPattern::Regex {
            regex: compile(pattern)?,
            global: false,
        })
    }

    pub fn regex_global(pattern: &str) -> Result<Self> {
        Ok(MatchPattern::Regex {
            regex: compile(pattern)?,
            global: true,
        })
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPattern::Literal(text) => write!(f, "{:?}", text),
            MatchPattern::Regex { regex, global } => {
                write!(f, "/{}/{}", regex.as_str(), if *global { "g" } else { "" })
            }
        }
    }
}

impl fmt::Debug for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchPattern({})", self)
    }
}

// ============================================================================
// Replacement
// ============================================================================

/// 치환 방식
#[derive(Clone)]
pub enum Replace {
    /// `$1`, `$&`, `$<name>`, `$self` 템플릿
    Template(String),
    /// 함수 (에러/panic은 규칙 실패로 처리)
    Func(ReplaceFn),
}

impl fmt::Debug for Replace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replace::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Replace::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// 치환 규칙
#[derive(Clone)]
pub struct Replacement {
    pub pattern: MatchPattern,
    pub replace: Replace,
    pub predicate: Option<PatchPredicate>,
}

impl Replacement {
    /// 템플릿 치환
    pub fn template(pattern: MatchPattern, template: impl Into<String>) -> Self {
        Self {
            pattern,
            replace: Replace::Template(template.into()),
            predicate: None,
        }
    }

    /// 함수 치환
    pub fn with_fn<F>(pattern: MatchPattern, f: F) -> Self
    where
        F: Fn(&PatchMatch<'_>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self {
            pattern,
            replace: Replace::Func(Arc::new(f)),
            predicate: None,
        }
    }

    /// 활성 조건
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replacement")
            .field("pattern", &self.pattern)
            .field("replace", &self.replace)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

// ============================================================================
// PatchDescriptor
// ============================================================================

/// 패치 디스크립터 (소유 플러그인은 등록 시 지정)
#[derive(Clone)]
pub struct PatchDescriptor {
    pub find: FindToken,
    pub replacements: Vec<Replacement>,
    /// 매치 실패를 경고하지 않음
    pub optional: bool,
    /// 하나라도 실패하면 디스크립터의 모든 변경을 되돌림
    pub group: bool,
    pub predicate: Option<PatchPredicate>,
}

impl PatchDescriptor {
    pub fn new(find: impl Into<FindToken>) -> Self {
        Self {
            find: find.into(),
            replacements: Vec::new(),
            optional: false,
            group: false,
            predicate: None,
        }
    }

    pub fn replacement(mut self, replacement: Replacement) -> Self {
        self.replacements.push(replacement);
        self
    }

    /// 정규식 템플릿 치환 추가
    pub fn replace(self, pattern: &str, template: impl Into<String>) -> Result<Self> {
        Ok(self.replacement(Replacement::template(MatchPattern::regex(pattern)?, template)))
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn group(mut self) -> Self {
        self.group = true;
        self
    }

    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for PatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchDescriptor")
            .field("find", &self.find)
            .field("replacements", &self.replacements)
            .field("optional", &self.optional)
            .field("group", &self.group)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_token() {
        assert!(FindToken::literal(".track(").occurs_in("e.track(n)"));
        let token = FindToken::regex(r"\i\.track\(").unwrap();
        assert!(token.occurs_in("analytics.track(n)"));
        assert!(!token.occurs_in("track"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = MatchPattern::regex("(unclosed");
        assert!(matches!(result, Err(Error::InvalidPattern(_))));
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor = PatchDescriptor::new("helloWorld")
            .replace(r"helloWorld\((\d+)\)", "helloWorld($1+1)")
            .unwrap()
            .optional()
            .group();

        assert_eq!(descriptor.replacements.len(), 1);
        assert!(descriptor.optional && descriptor.group);
        assert_eq!(descriptor.find.to_string(), "helloWorld");
    }
}
