//! Module Registry - 모듈 로더 가로채기
//!
//! 호스트가 모듈을 정의(`define`)하고 요청(`require`)하면, 레지스트리는
//! 평가 직전에 설치된 `SourceTransform`으로 소스를 변환합니다.
//!
//! ```text
//! define(id, source) ──► ModuleRecord (raw)
//!                            │
//! require(id) ──────────────►│ transform (patch engine)
//!                            │      │ 실패 시 원본으로 재평가
//!                            ▼      ▼
//!                        evaluate ──► exports (한 번만)
//!                            │
//!                            ▼
//!                    on_module_loaded 리스너 (등록 순서)
//! ```

use super::evaluator::{ModuleEvaluator, SourceTransform, TransformedSource};
use super::types::{ExportValue, ModuleId, ModuleRecord, ModuleState};
use crate::isolate::isolate;
use parking_lot::RwLock;
use splice_foundation::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 리스너 ID
pub type ListenerId = u64;

/// 모듈 로드 리스너
pub type ModuleListener = Arc<dyn Fn(&ModuleId, &Arc<ExportValue>) -> anyhow::Result<()> + Send + Sync>;

/// 순회 제어
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// 순회 중 방문자가 실패한 모듈
#[derive(Debug)]
pub struct VisitError {
    pub module_id: ModuleId,
    pub error: anyhow::Error,
}

#[derive(Default)]
struct RegistryInner {
    records: HashMap<ModuleId, ModuleRecord>,
    /// 정의 순서
    defined: Vec<ModuleId>,
    /// 평가 완료 순서
    loaded: Vec<ModuleId>,
}

// ============================================================================
// ModuleRegistry
// ============================================================================

/// 모듈 레지스트리
pub struct ModuleRegistry {
    inner: RwLock<RegistryInner>,
    transform: RwLock<Option<Arc<dyn SourceTransform>>>,
    intercepted: AtomicBool,
    unpatched_warned: AtomicBool,
    listeners: RwLock<Vec<(ListenerId, ModuleListener)>>,
    listener_counter: AtomicU64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            transform: RwLock::new(None),
            intercepted: AtomicBool::new(false),
            unpatched_warned: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
            listener_counter: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // 가로채기
    // ========================================================================

    /// 모듈 로더 훅 설치 (한 번만 가능)
    pub fn intercept(&self, transform: Arc<dyn SourceTransform>) -> Result<()> {
        if self
            .intercepted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            error!("Module loader intercepted twice");
            return Err(Error::AlreadyIntercepted);
        }

        *self.transform.write() = Some(transform);
        info!("Module loader intercepted");
        Ok(())
    }

    pub fn is_intercepted(&self) -> bool {
        self.intercepted.load(Ordering::Acquire)
    }

    // ========================================================================
    // 정의 / 평가
    // ========================================================================

    /// 모듈 정의 (평가 전). 같은 ID 재정의는 평가 전까지만 소스를 교체
    pub fn define(&self, id: impl Into<ModuleId>, source: impl Into<Arc<str>>) {
        let id = id.into();
        let mut inner = self.inner.write();

        if let Some(record) = inner.records.get_mut(&id) {
            if record.state == ModuleState::Defined {
                record.raw_source = source.into();
            } else {
                warn!(module = %id, "Ignoring redefinition of evaluated module");
            }
            return;
        }

        inner.defined.push(id.clone());
        inner.records.insert(id.clone(), ModuleRecord::new(id, source));
    }

    /// 모듈 요청 - 최초 1회 (변환 후) 평가, 이후 캐시 반환
    pub fn require(&self, id: &ModuleId, evaluator: &dyn ModuleEvaluator) -> Result<Arc<ExportValue>> {
        let raw = {
            let mut inner = self.inner.write();
            let record = inner
                .records
                .get_mut(id)
                .ok_or_else(|| Error::Module(format!("Module {} is not defined", id)))?;

            match record.state {
                ModuleState::Loaded => {
                    if let Some(exports) = &record.exports {
                        return Ok(Arc::clone(exports));
                    }
                }
                ModuleState::Evaluating => {
                    return Err(Error::Module(format!("Circular require of module {}", id)));
                }
                ModuleState::Defined => {}
            }

            record.state = ModuleState::Evaluating;
            Arc::clone(&record.raw_source)
        };

        let transformed = self.transform_source(id, &raw);
        let (result, applied) = match transformed {
            Some(patched) => match evaluate_guarded(evaluator, id, &patched.source) {
                Ok(exports) => (Ok(exports), Some(patched)),
                Err(e) => {
                    error!(
                        module = %id,
                        patched_by = ?patched.patched_by,
                        "Error evaluating patched module, falling back to original source: {:#}",
                        e
                    );
                    (evaluate_guarded(evaluator, id, &raw), None)
                }
            },
            None => (evaluate_guarded(evaluator, id, &raw), None),
        };

        let exports = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            let Some(record) = inner.records.get_mut(id) else {
                return Err(Error::Internal(format!("Module {} vanished during evaluation", id)));
            };

            match result {
                Ok(exports) => {
                    let exports = Arc::new(exports);
                    record.exports = Some(Arc::clone(&exports));
                    record.state = ModuleState::Loaded;
                    if let Some(patched) = applied {
                        record.patched_by = patched.patched_by;
                        record.patched_source = Some(patched.source);
                    }
                    inner.loaded.push(id.clone());
                    exports
                }
                Err(e) => {
                    record.state = ModuleState::Defined;
                    return Err(Error::Module(format!("{}: {:#}", id, e)));
                }
            }
        };

        debug!(module = %id, "Module loaded");
        self.notify_loaded(id, &exports);
        Ok(exports)
    }

    /// define + require
    pub fn load_module(
        &self,
        id: impl Into<ModuleId>,
        source: impl Into<Arc<str>>,
        evaluator: &dyn ModuleEvaluator,
    ) -> Result<Arc<ExportValue>> {
        let id = id.into();
        self.define(id.clone(), source);
        self.require(&id, evaluator)
    }

    fn transform_source(&self, id: &ModuleId, raw: &str) -> Option<TransformedSource> {
        let transform = self.transform.read().clone();
        match transform {
            Some(transform) => transform.transform(id, raw),
            None => {
                if !self.unpatched_warned.swap(true, Ordering::AcqRel) {
                    error!(module = %id, "Module loader was not intercepted before first load, modules run unpatched");
                }
                None
            }
        }
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn get(&self, id: &ModuleId) -> Option<ModuleRecord> {
        self.inner.read().records.get(id).cloned()
    }

    pub fn exports(&self, id: &ModuleId) -> Option<Arc<ExportValue>> {
        self.inner.read().records.get(id).and_then(|r| r.exports.clone())
    }

    pub fn raw_source(&self, id: &ModuleId) -> Option<Arc<str>> {
        self.inner.read().records.get(id).map(|r| Arc::clone(&r.raw_source))
    }

    /// 정의 순서대로 모든 모듈 ID
    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.inner.read().defined.clone()
    }

    /// 정의 순서대로 (ID, 원본 소스) 스냅샷
    pub fn sources(&self) -> Vec<(ModuleId, Arc<str>)> {
        let inner = self.inner.read();
        inner
            .defined
            .iter()
            .filter_map(|id| inner.records.get(id).map(|r| (id.clone(), Arc::clone(&r.raw_source))))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().defined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loaded_count(&self) -> usize {
        self.inner.read().loaded.len()
    }

    /// 로드된 모듈 순회 (로드 순서)
    ///
    /// 방문자의 에러/panic은 순회를 멈추지 않고 수집되어 반환됩니다.
    pub fn for_each_loaded_module<F>(&self, mut visitor: F) -> Vec<VisitError>
    where
        F: FnMut(&ModuleId, &Arc<ExportValue>) -> anyhow::Result<Visit>,
    {
        let snapshot: Vec<(ModuleId, Arc<ExportValue>)> = {
            let inner = self.inner.read();
            inner
                .loaded
                .iter()
                .filter_map(|id| {
                    inner
                        .records
                        .get(id)
                        .and_then(|r| r.exports.clone())
                        .map(|exports| (id.clone(), exports))
                })
                .collect()
        };

        let mut errors = Vec::new();
        for (id, exports) in &snapshot {
            match isolate(|| visitor(id, exports)) {
                Ok(Visit::Continue) => {}
                Ok(Visit::Stop) => break,
                Err(error) => errors.push(VisitError {
                    module_id: id.clone(),
                    error,
                }),
            }
        }
        errors
    }

    // ========================================================================
    // 리스너
    // ========================================================================

    /// 모듈 로드 리스너 등록
    pub fn on_module_loaded<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ModuleId, &Arc<ExportValue>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.listener_counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn notify_loaded(&self, id: &ModuleId, exports: &Arc<ExportValue>) {
        let listeners: Vec<(ListenerId, ModuleListener)> = self.listeners.read().clone();

        for (listener_id, listener) in listeners {
            if let Err(e) = isolate(|| listener(id, exports)) {
                error!(module = %id, listener = listener_id, "Error in module load listener: {:#}", e);
            }
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn evaluate_guarded(
    evaluator: &dyn ModuleEvaluator,
    id: &ModuleId,
    source: &str,
) -> anyhow::Result<ExportValue> {
    isolate(|| evaluator.evaluate(id, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct Uppercase;

    impl SourceTransform for Uppercase {
        fn transform(&self, _id: &ModuleId, source: &str) -> Option<TransformedSource> {
            let upper = source.to_uppercase();
            (upper != source).then(|| TransformedSource {
                source: upper,
                patched_by: vec!["Upper".to_string()],
            })
        }
    }

    fn echo(_id: &ModuleId, source: &str) -> anyhow::Result<ExportValue> {
        Ok(ExportValue::function(source))
    }

    #[test]
    fn test_intercept_once() {
        let registry = ModuleRegistry::new();
        assert!(registry.intercept(Arc::new(Uppercase)).is_ok());

        let second = registry.intercept(Arc::new(Uppercase));
        assert!(matches!(second, Err(Error::AlreadyIntercepted)));
        assert!(second.unwrap_err().is_fatal());
    }

    #[test]
    fn test_transform_applied_before_evaluation() {
        let registry = ModuleRegistry::new();
        registry.intercept(Arc::new(Uppercase)).unwrap();

        let exports = registry.load_module("1", "abc", &echo).unwrap();
        assert_eq!(exports.function_source(), Some("ABC"));

        let record = registry.get(&ModuleId::from("1")).unwrap();
        assert_eq!(&*record.raw_source, "abc");
        assert_eq!(record.patched_by, vec!["Upper".to_string()]);
    }

    #[test]
    fn test_evaluates_once() {
        let registry = ModuleRegistry::new();
        let calls = AtomicUsize::new(0);
        let counting = |_id: &ModuleId, source: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(ExportValue::function(source))
        };

        registry.define("1", "x");
        let first = registry.require(&ModuleId::from("1"), &counting).unwrap();
        let second = registry.require(&ModuleId::from("1"), &counting).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fallback_to_original_when_patched_fails() {
        let registry = ModuleRegistry::new();
        registry.intercept(Arc::new(Uppercase)).unwrap();

        let strict = |_id: &ModuleId, source: &str| {
            if source.chars().any(|c| c.is_ascii_uppercase()) {
                anyhow::bail!("SyntaxError");
            }
            Ok(ExportValue::function(source))
        };

        let exports = registry.load_module("1", "abc", &strict).unwrap();
        assert_eq!(exports.function_source(), Some("abc"));
        assert!(registry.get(&ModuleId::from("1")).unwrap().patched_by.is_empty());
    }

    #[test]
    fn test_unpatched_error_propagates() {
        let registry = ModuleRegistry::new();
        let failing = |_id: &ModuleId, _source: &str| -> anyhow::Result<ExportValue> {
            anyhow::bail!("host module threw")
        };

        let result = registry.load_module("1", "abc", &failing);
        assert!(matches!(result, Err(Error::Module(_))));
        assert_eq!(registry.loaded_count(), 0);
    }

    #[test]
    fn test_listeners_in_order_and_isolated() {
        let registry = ModuleRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        registry.on_module_loaded(move |id, _| {
            s1.lock().push(format!("first:{}", id));
            Ok(())
        });
        registry.on_module_loaded(|_, _| panic!("listener bug"));
        let s3 = Arc::clone(&seen);
        let third = registry.on_module_loaded(move |id, _| {
            s3.lock().push(format!("third:{}", id));
            anyhow::bail!("listener error")
        });

        registry.load_module("5", "x", &echo).unwrap();
        assert_eq!(*seen.lock(), vec!["first:5".to_string(), "third:5".to_string()]);

        assert!(registry.remove_listener(third));
        registry.load_module("6", "y", &echo).unwrap();
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_for_each_collects_errors() {
        let registry = ModuleRegistry::new();
        for id in ["1", "2", "3"] {
            registry.load_module(id, id, &echo).unwrap();
        }

        let mut visited = Vec::new();
        let errors = registry.for_each_loaded_module(|id, _| {
            visited.push(id.to_string());
            if id.as_str() == "2" {
                anyhow::bail!("bad visitor");
            }
            Ok(Visit::Continue)
        });

        assert_eq!(visited, vec!["1", "2", "3"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].module_id.as_str(), "2");

        let mut count = 0;
        registry.for_each_loaded_module(|_, _| {
            count += 1;
            Ok(Visit::Stop)
        });
        assert_eq!(count, 1);
    }
}
