//! Module Evaluator / Source Transform
//!
//! 모듈 소스를 실제로 실행하는 것은 호스트의 몫입니다. 레지스트리는
//! `ModuleEvaluator`를 통해 평가를 위임하고, 평가 직전에
//! `SourceTransform`(패치 엔진)으로 소스를 변환합니다.

use super::types::{ExportValue, ModuleId};
use std::collections::HashMap;

/// 모듈 평가자
pub trait ModuleEvaluator: Send + Sync {
    /// 소스를 평가해 export 반환
    fn evaluate(&self, id: &ModuleId, source: &str) -> anyhow::Result<ExportValue>;
}

impl<F> ModuleEvaluator for F
where
    F: Fn(&ModuleId, &str) -> anyhow::Result<ExportValue> + Send + Sync,
{
    fn evaluate(&self, id: &ModuleId, source: &str) -> anyhow::Result<ExportValue> {
        self(id, source)
    }
}

/// 변환된 소스
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedSource {
    pub source: String,
    pub patched_by: Vec<String>,
}

/// 평가 전 소스 변환기
pub trait SourceTransform: Send + Sync {
    /// 변경이 없으면 None
    fn transform(&self, id: &ModuleId, source: &str) -> Option<TransformedSource>;
}

// ============================================================================
// DeclaredExports - 선언된 export를 그대로 돌려주는 평가자
// ============================================================================

/// 번들 파일에 선언된 export를 반환하는 평가자
///
/// 소스를 실행하지 않으므로 `reject_marker`를 지정하면 해당 문자열이
/// 포함된 소스를 평가 실패로 처리합니다 (깨진 패치 시뮬레이션용).
#[derive(Debug, Default)]
pub struct DeclaredExports {
    exports: HashMap<ModuleId, ExportValue>,
    reject_marker: Option<String>,
}

impl DeclaredExports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<ModuleId>, exports: ExportValue) {
        self.exports.insert(id.into(), exports);
    }

    pub fn reject_marker(mut self, marker: impl Into<String>) -> Self {
        self.reject_marker = Some(marker.into());
        self
    }
}

impl ModuleEvaluator for DeclaredExports {
    fn evaluate(&self, id: &ModuleId, source: &str) -> anyhow::Result<ExportValue> {
        if let Some(marker) = &self.reject_marker {
            if source.contains(marker.as_str()) {
                anyhow::bail!("SyntaxError in module {}", id);
            }
        }
        Ok(self
            .exports
            .get(id)
            .cloned()
            .unwrap_or(ExportValue::Value(serde_json::Value::Null)))
    }
}
