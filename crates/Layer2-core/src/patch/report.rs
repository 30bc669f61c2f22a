//! Patch Report - 패치 적용 결과 및 진단

use crate::module::ModuleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 모듈 패치 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatchStatus {
    /// 게이트를 통과한 디스크립터 없음
    Unpatched,
    /// 모든 규칙 성공
    Patched,
    /// 일부 규칙 실패
    PartiallyPatched,
}

/// 진단 종류
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// 패턴이 매치되지 않음
    Miss,
    /// 매치됐지만 소스가 변하지 않음
    NoEffect,
    /// 치환 함수 실패
    Fault { error: String },
    /// group 디스크립터의 변경이 되돌려짐
    GroupReverted,
}

/// 패치 진단
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchDiagnostic {
    pub module_id: ModuleId,
    pub owner: String,
    pub find: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    /// optional 디스크립터 (경고하지 않음)
    pub suppressed: bool,
}

impl PatchDiagnostic {
    pub fn is_failure(&self) -> bool {
        !matches!(self.kind, DiagnosticKind::GroupReverted)
    }
}

/// 한 모듈에 대한 적용 결과
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub source: String,
    pub status: PatchStatus,
    /// 소스를 실제로 변경한 플러그인 (중복 없음, 등록 순서)
    pub patched_by: Vec<String>,
    pub diagnostics: Vec<PatchDiagnostic>,
}

impl PatchOutcome {
    pub fn is_changed(&self, original: &str) -> bool {
        self.source != original
    }
}

/// 디스크립터별 요약
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSummary {
    pub owner: String,
    pub find: String,
    pub optional: bool,
    pub group: bool,
    /// 게이트를 통과한 모듈 수
    pub token_hits: u64,
    pub applied: u64,
    pub failures: u64,
}

impl PatchSummary {
    pub fn is_unmatched(&self) -> bool {
        self.token_hits == 0
    }
}

/// 전체 패치 보고서
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchReport {
    pub generated_at: DateTime<Utc>,
    pub modules_scanned: u64,
    pub modules_patched: u64,
    pub pattern_evaluations: u64,
    pub patches: Vec<PatchSummary>,
    pub diagnostics: Vec<PatchDiagnostic>,
}

impl PatchReport {
    pub fn unmatched(&self) -> impl Iterator<Item = &PatchSummary> {
        self.patches.iter().filter(|p| p.is_unmatched())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PatchDiagnostic> {
        self.diagnostics.iter().filter(|d| d.is_failure())
    }
}
