//! Patch - 모듈 소스 재작성 엔진
//!
//! - `types`: PatchDescriptor, Replacement, FindToken, MatchPattern
//! - `canonical`: `\i` 전개, 치환 템플릿
//! - `engine`: 토큰 게이트 + 규칙 적용 + 진단
//! - `report`: 적용 결과, 요약, 보고서

mod canonical;
mod engine;
mod report;
mod types;

pub use canonical::{canonicalize_pattern, expand_template, PatchMatch, IDENTIFIER_PATTERN};
pub use engine::{PatchEngine, PatchEngineConfig};
pub use report::{
    DiagnosticKind, PatchDiagnostic, PatchOutcome, PatchReport, PatchStatus, PatchSummary,
};
pub use types::{
    FindToken, MatchPattern, PatchDescriptor, PatchPredicate, Replace, ReplaceFn, Replacement,
};
