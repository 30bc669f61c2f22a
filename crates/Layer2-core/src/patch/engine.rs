//! Patch Engine - 토큰 게이트 기반 소스 재작성
//!
//! 모듈마다 등록 순서대로 디스크립터를 평가합니다:
//!
//! 1. 디스크립터 predicate가 false면 건너뜀
//! 2. find 토큰이 소스에 없으면 건너뜀 (정규식 규칙은 평가하지 않음)
//! 3. 규칙을 순서대로 적용 (앞 규칙의 결과 위에 다음 규칙)
//! 4. 실패는 진단으로 기록, group이면 디스크립터 전체 되돌림
//!
//! 같은 (id, source)에 대해 결과 소스는 항상 같습니다. 패치는 첫 매치 후
//! 소비되지 않습니다.

use super::canonical::{expand_template, PatchMatch};
use super::report::{
    DiagnosticKind, PatchDiagnostic, PatchOutcome, PatchReport, PatchStatus, PatchSummary,
};
use super::types::{MatchPattern, PatchDescriptor, PatchPredicate, Replace, Replacement};
use crate::isolate::{isolate, isolate_predicate};
use crate::module::{ModuleId, SourceTransform, TransformedSource};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use splice_foundation::{RuntimeConfig, DEFAULT_SELF_REFERENCE};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 보관하는 최근 진단 수
const MAX_DIAGNOSTICS: usize = 500;

// ============================================================================
// 설정
// ============================================================================

/// 패치 엔진 설정
#[derive(Debug, Clone)]
pub struct PatchEngineConfig {
    /// `$self` 템플릿 (`{name}` 자리에 플러그인 이름)
    pub self_reference: String,
    /// DOM 준비 시 매칭되지 않은 패치 경고
    pub warn_unmatched: bool,
}

impl PatchEngineConfig {
    pub fn from_runtime(config: &RuntimeConfig) -> Self {
        Self {
            self_reference: config
                .self_reference
                .clone()
                .unwrap_or_else(|| DEFAULT_SELF_REFERENCE.to_string()),
            warn_unmatched: config.warn_unmatched(),
        }
    }

    fn self_reference_for(&self, owner: &str) -> String {
        self.self_reference.replace("{name}", owner)
    }
}

impl Default for PatchEngineConfig {
    fn default() -> Self {
        Self {
            self_reference: DEFAULT_SELF_REFERENCE.to_string(),
            warn_unmatched: true,
        }
    }
}

// ============================================================================
// 등록된 패치
// ============================================================================

struct RegisteredPatch {
    owner: String,
    self_reference: String,
    descriptor: PatchDescriptor,
    token_hits: AtomicU64,
    applied: AtomicU64,
    failures: AtomicU64,
}

impl RegisteredPatch {
    fn summary(&self) -> PatchSummary {
        PatchSummary {
            owner: self.owner.clone(),
            find: self.descriptor.find.to_string(),
            optional: self.descriptor.optional,
            group: self.descriptor.group,
            token_hits: self.token_hits.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn diagnostic(&self, module_id: &ModuleId, pattern: Option<String>, kind: DiagnosticKind) -> PatchDiagnostic {
        PatchDiagnostic {
            module_id: module_id.clone(),
            owner: self.owner.clone(),
            find: self.descriptor.find.to_string(),
            pattern,
            kind,
            suppressed: self.descriptor.optional,
        }
    }
}

// ============================================================================
// PatchEngine
// ============================================================================

/// 패치 엔진
pub struct PatchEngine {
    config: PatchEngineConfig,
    patches: RwLock<Vec<Arc<RegisteredPatch>>>,
    modules_scanned: AtomicU64,
    modules_patched: AtomicU64,
    pattern_evaluations: AtomicU64,
    diagnostics: Mutex<Vec<PatchDiagnostic>>,
}

impl PatchEngine {
    pub fn new(config: PatchEngineConfig) -> Self {
        Self {
            config,
            patches: RwLock::new(Vec::new()),
            modules_scanned: AtomicU64::new(0),
            modules_patched: AtomicU64::new(0),
            pattern_evaluations: AtomicU64::new(0),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &PatchEngineConfig {
        &self.config
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 디스크립터 등록 (등록 순서 = 적용 순서)
    pub fn register(&self, owner: impl Into<String>, descriptor: PatchDescriptor) -> usize {
        let owner = owner.into();
        let mut patches = self.patches.write();

        debug!(plugin = %owner, find = %descriptor.find, "Registered patch");
        patches.push(Arc::new(RegisteredPatch {
            self_reference: self.config.self_reference_for(&owner),
            owner,
            descriptor,
            token_hits: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }));
        patches.len() - 1
    }

    pub fn register_all(&self, owner: &str, descriptors: impl IntoIterator<Item = PatchDescriptor>) -> usize {
        descriptors
            .into_iter()
            .map(|descriptor| self.register(owner, descriptor))
            .count()
    }

    pub fn patch_count(&self) -> usize {
        self.patches.read().len()
    }

    pub fn has_patches_for(&self, owner: &str) -> bool {
        self.patches.read().iter().any(|p| p.owner == owner)
    }

    // ========================================================================
    // 적용
    // ========================================================================

    /// 모듈 소스에 모든 활성 디스크립터 적용
    pub fn apply(&self, module_id: &ModuleId, source: &str) -> PatchOutcome {
        let patches: Vec<Arc<RegisteredPatch>> = self.patches.read().clone();
        self.modules_scanned.fetch_add(1, Ordering::Relaxed);

        let mut code = source.to_string();
        let mut patched_by: Vec<String> = Vec::new();
        let mut diagnostics = Vec::new();

        for patch in &patches {
            let descriptor = &patch.descriptor;
            if !predicate_allows(descriptor.predicate.as_ref(), &patch.owner) {
                continue;
            }
            if !descriptor.find.occurs_in(&code) {
                continue;
            }
            patch.token_hits.fetch_add(1, Ordering::Relaxed);

            let snapshot = descriptor.group.then(|| code.clone());
            let mut changed = false;
            let mut failed = false;

            for replacement in &descriptor.replacements {
                if !predicate_allows(replacement.predicate.as_ref(), &patch.owner) {
                    continue;
                }
                self.pattern_evaluations.fetch_add(1, Ordering::Relaxed);

                let kind = match apply_replacement(&code, replacement, &patch.self_reference) {
                    Ok(Some(next)) if next != code => {
                        code = next;
                        changed = true;
                        None
                    }
                    Ok(Some(_)) => Some(DiagnosticKind::NoEffect),
                    Ok(None) => Some(DiagnosticKind::Miss),
                    Err(e) => Some(DiagnosticKind::Fault {
                        error: format!("{:#}", e),
                    }),
                };

                if let Some(kind) = kind {
                    failed = true;
                    diagnostics.push(patch.diagnostic(
                        module_id,
                        Some(replacement.pattern.to_string()),
                        kind,
                    ));
                    if descriptor.group {
                        break;
                    }
                }
            }

            if failed {
                patch.failures.fetch_add(1, Ordering::Relaxed);
                if let Some(snapshot) = snapshot {
                    code = snapshot;
                    changed = false;
                    diagnostics.push(patch.diagnostic(module_id, None, DiagnosticKind::GroupReverted));
                }
            }

            if changed {
                patch.applied.fetch_add(1, Ordering::Relaxed);
                if !patched_by.contains(&patch.owner) {
                    patched_by.push(patch.owner.clone());
                }
            }
        }

        let status = if diagnostics.iter().any(PatchDiagnostic::is_failure) {
            PatchStatus::PartiallyPatched
        } else if patched_by.is_empty() {
            PatchStatus::Unpatched
        } else {
            PatchStatus::Patched
        };

        if code != source {
            self.modules_patched.fetch_add(1, Ordering::Relaxed);
            debug!(module = %module_id, patched_by = ?patched_by, "Module patched");
        }
        self.record_diagnostics(&diagnostics);

        PatchOutcome {
            source: code,
            status,
            patched_by,
            diagnostics,
        }
    }

    fn record_diagnostics(&self, diagnostics: &[PatchDiagnostic]) {
        if diagnostics.is_empty() {
            return;
        }

        for d in diagnostics {
            let pattern = d.pattern.as_deref().unwrap_or("");
            match &d.kind {
                DiagnosticKind::Fault { error } => error!(
                    plugin = %d.owner, module = %d.module_id, find = %d.find, pattern,
                    "Patch replacement failed: {}", error
                ),
                DiagnosticKind::Miss if !d.suppressed => warn!(
                    plugin = %d.owner, module = %d.module_id, find = %d.find, pattern,
                    "Patch did not match"
                ),
                DiagnosticKind::NoEffect if !d.suppressed => warn!(
                    plugin = %d.owner, module = %d.module_id, find = %d.find, pattern,
                    "Patch had no effect"
                ),
                DiagnosticKind::GroupReverted if !d.suppressed => warn!(
                    plugin = %d.owner, module = %d.module_id, find = %d.find,
                    "Patch group reverted"
                ),
                _ => {}
            }
        }

        let mut history = self.diagnostics.lock();
        history.extend(diagnostics.iter().cloned());
        if history.len() > MAX_DIAGNOSTICS {
            let excess = history.len() - MAX_DIAGNOSTICS;
            history.drain(..excess);
        }
    }

    // ========================================================================
    // 보고
    // ========================================================================

    pub fn summaries(&self) -> Vec<PatchSummary> {
        self.patches.read().iter().map(|p| p.summary()).collect()
    }

    /// 한 번도 게이트를 통과하지 못한 디스크립터
    pub fn unmatched(&self) -> Vec<PatchSummary> {
        self.summaries().into_iter().filter(|s| s.is_unmatched()).collect()
    }

    /// 매칭되지 않은 패치 경고 (optional 제외). 경고 수 반환
    pub fn warn_unmatched(&self) -> usize {
        if !self.config.warn_unmatched {
            return 0;
        }

        let unmatched: Vec<PatchSummary> = self
            .unmatched()
            .into_iter()
            .filter(|s| !s.optional)
            .collect();
        for summary in &unmatched {
            warn!(plugin = %summary.owner, find = %summary.find, "Patch found no module");
        }
        if !unmatched.is_empty() {
            info!("{} patches found no module", unmatched.len());
        }
        unmatched.len()
    }

    /// 정규식 규칙 평가 횟수
    pub fn pattern_evaluations(&self) -> u64 {
        self.pattern_evaluations.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> PatchReport {
        PatchReport {
            generated_at: Utc::now(),
            modules_scanned: self.modules_scanned.load(Ordering::Relaxed),
            modules_patched: self.modules_patched.load(Ordering::Relaxed),
            pattern_evaluations: self.pattern_evaluations(),
            patches: self.summaries(),
            diagnostics: self.diagnostics.lock().clone(),
        }
    }
}

impl Default for PatchEngine {
    fn default() -> Self {
        Self::new(PatchEngineConfig::default())
    }
}

impl SourceTransform for PatchEngine {
    fn transform(&self, id: &ModuleId, source: &str) -> Option<TransformedSource> {
        let outcome = self.apply(id, source);
        if !outcome.is_changed(source) {
            return None;
        }
        Some(TransformedSource {
            source: outcome.source,
            patched_by: outcome.patched_by,
        })
    }
}

// ============================================================================
// 규칙 적용
// ============================================================================

fn predicate_allows(predicate: Option<&PatchPredicate>, owner: &str) -> bool {
    let Some(predicate) = predicate else {
        return true;
    };
    match isolate_predicate(|| predicate()) {
        Ok(allowed) => allowed,
        Err(message) => {
            error!(plugin = %owner, "Patch predicate panicked: {}", message);
            false
        }
    }
}

/// 규칙 하나 적용. 매치가 없으면 None
fn apply_replacement(
    code: &str,
    replacement: &Replacement,
    self_reference: &str,
) -> anyhow::Result<Option<String>> {
    match &replacement.pattern {
        MatchPattern::Literal(needle) => {
            let Some(start) = code.find(needle.as_str()) else {
                return Ok(None);
            };
            let end = start + needle.len();
            let produced = produce(
                &replacement.replace,
                &PatchMatch::literal(&code[start..end]),
                self_reference,
            )?;
            Ok(Some(format!("{}{}{}", &code[..start], produced, &code[end..])))
        }
        MatchPattern::Regex { regex, global: false } => {
            let Some(caps) = regex.captures(code) else {
                return Ok(None);
            };
            let Some(whole) = caps.get(0) else {
                return Ok(None);
            };
            let produced = produce(&replacement.replace, &PatchMatch::captures(&caps), self_reference)?;
            Ok(Some(format!(
                "{}{}{}",
                &code[..whole.start()],
                produced,
                &code[whole.end()..]
            )))
        }
        MatchPattern::Regex { regex, global: true } => {
            let mut out = String::with_capacity(code.len());
            let mut last = 0;
            let mut matched = false;

            for caps in regex.captures_iter(code) {
                let Some(whole) = caps.get(0) else {
                    continue;
                };
                matched = true;
                out.push_str(&code[last..whole.start()]);
                out.push_str(&produce(&replacement.replace, &PatchMatch::captures(&caps), self_reference)?);
                last = whole.end();
            }

            if !matched {
                return Ok(None);
            }
            out.push_str(&code[last..]);
            Ok(Some(out))
        }
    }
}

fn produce(replace: &Replace, m: &PatchMatch<'_>, self_reference: &str) -> anyhow::Result<String> {
    match replace {
        Replace::Template(template) => Ok(expand_template(template, m, self_reference)),
        Replace::Func(f) => isolate(|| f(m)),
    }
}
