//! Module - 호스트 모듈 레지스트리
//!
//! - `types`: ModuleId, ExportValue, ModuleRecord
//! - `evaluator`: 평가 위임 (ModuleEvaluator) 및 소스 변환 (SourceTransform)
//! - `registry`: 정의/평가/리스너 관리

mod evaluator;
mod registry;
mod types;

pub use evaluator::{DeclaredExports, ModuleEvaluator, SourceTransform, TransformedSource};
pub use registry::{ListenerId, ModuleListener, ModuleRegistry, Visit, VisitError};
pub use types::{
    ExportValue, ModuleId, ModuleRecord, ModuleState, CLASS_KEY, FUNCTION_KEY, NESTED_KEY_MAX_LEN,
};
