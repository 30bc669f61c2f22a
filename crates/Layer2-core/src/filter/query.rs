//! Module Query - 로드된 모듈 검색
//!
//! 검색 순서 (모듈마다):
//! 1. export 전체
//! 2. `default` export
//! 3. 짧은 키(3자 이하)를 가진 중첩 export
//!
//! 아직 로드되지 않은 모듈은 `wait_for`로 기다릴 수 있습니다.
//! 대기자는 매칭 시 정확히 한 번 호출된 뒤 제거됩니다.

use super::filters::{self, CodePattern, Filter};
use crate::isolate::{isolate, isolate_predicate};
use crate::module::{ExportValue, ListenerId, ModuleId, ModuleRegistry, Visit};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, trace, warn};

// ============================================================================
// 검색 결과
// ============================================================================

/// 매칭된 위치
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPath {
    /// export 전체
    Root,
    /// `default` export
    Default,
    /// 중첩 export (키)
    Member(String),
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct Found {
    pub module_id: ModuleId,
    pub path: ExportPath,
    exports: Arc<ExportValue>,
}

impl Found {
    fn new(module_id: &ModuleId, path: ExportPath, exports: &Arc<ExportValue>) -> Self {
        Self {
            module_id: module_id.clone(),
            path,
            exports: Arc::clone(exports),
        }
    }

    /// 매칭된 값
    pub fn value(&self) -> &ExportValue {
        let nested = match &self.path {
            ExportPath::Root => None,
            ExportPath::Default => self.exports.default_export(),
            ExportPath::Member(key) => self.exports.get(key),
        };
        nested.unwrap_or(&self.exports)
    }

    /// 모듈 export 전체
    pub fn module_exports(&self) -> &Arc<ExportValue> {
        &self.exports
    }
}

/// 검색 옵션
#[derive(Debug, Clone, Copy)]
pub struct FindOptions {
    /// `default` export가 매칭되면 `default`를 반환 (false면 export 전체)
    pub prefer_default_export: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            prefer_default_export: true,
        }
    }
}

/// `wait_for` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// 이미 로드된 모듈에서 찾아 즉시 호출됨
    Resolved,
    /// 대기 등록됨
    Pending(u64),
}

type WaitCallback = Box<dyn FnOnce(Found) + Send>;

struct Waiter {
    id: u64,
    filter: Filter,
    callback: WaitCallback,
}

// ============================================================================
// ModuleQuery
// ============================================================================

/// 모듈 검색기
pub struct ModuleQuery {
    registry: Arc<ModuleRegistry>,
    waiters: Arc<Mutex<Vec<Waiter>>>,
    waiter_counter: AtomicU64,
    listener_id: ListenerId,
}

impl ModuleQuery {
    /// 레지스트리에 로드 리스너를 등록하고 검색기 생성
    pub fn new(registry: Arc<ModuleRegistry>) -> Arc<Self> {
        let waiters: Arc<Mutex<Vec<Waiter>>> = Arc::new(Mutex::new(Vec::new()));

        let listener_waiters = Arc::clone(&waiters);
        let listener_id = registry.on_module_loaded(move |id, exports| {
            resolve_waiters(&listener_waiters, id, exports);
            Ok(())
        });

        Arc::new(Self {
            registry,
            waiters,
            waiter_counter: AtomicU64::new(0),
            listener_id,
        })
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    // ========================================================================
    // find
    // ========================================================================

    /// 첫 번째 매칭 (로드 순서)
    pub fn find(&self, filter: &Filter, options: FindOptions) -> Option<Found> {
        let mut found = None;

        let errors = self.registry.for_each_loaded_module(|id, exports| {
            match match_exports(filter, id, exports, options) {
                Some(hit) => {
                    found = Some(hit);
                    Ok(Visit::Stop)
                }
                None => Ok(Visit::Continue),
            }
        });
        log_visit_errors(filter, errors);

        if found.is_none() {
            trace!(filter = filter.description(), "find: no module matched");
        }
        found
    }

    /// 모든 매칭
    ///
    /// 한 모듈에서 export 전체와 `default`가 모두 매칭되면 둘 다 포함됩니다.
    pub fn find_all(&self, filter: &Filter, options: FindOptions) -> Vec<Found> {
        let mut results = Vec::new();

        let errors = self.registry.for_each_loaded_module(|id, exports| {
            if filter.matches(exports) {
                results.push(Found::new(id, ExportPath::Root, exports));
            } else if !exports.is_object() {
                return Ok(Visit::Continue);
            }

            if let Some(default) = exports.default_export() {
                if filter.matches(default) {
                    let path = if options.prefer_default_export {
                        ExportPath::Default
                    } else {
                        ExportPath::Root
                    };
                    results.push(Found::new(id, path, exports));
                    return Ok(Visit::Continue);
                }
            }

            for (key, nested) in exports.short_key_members() {
                if nested.is_truthy() && filter.matches(nested) {
                    results.push(Found::new(id, ExportPath::Member(key.to_string()), exports));
                    break;
                }
            }
            Ok(Visit::Continue)
        });
        log_visit_errors(filter, errors);

        results
    }

    /// 여러 필터를 한 번의 순회로 검색 (입력 순서대로 결과)
    pub fn find_bulk(&self, filters: &[Filter]) -> Vec<Option<Found>> {
        let mut results: Vec<Option<Found>> = vec![None; filters.len()];
        let mut remaining = filters.len();

        let errors = self.registry.for_each_loaded_module(|id, exports| {
            for (slot, filter) in results.iter_mut().zip(filters) {
                if slot.is_some() {
                    continue;
                }
                if let Some(hit) = match_exports(filter, id, exports, FindOptions::default()) {
                    *slot = Some(hit);
                    remaining -= 1;
                    break;
                }
            }
            Ok(if remaining == 0 { Visit::Stop } else { Visit::Continue })
        });
        for error in errors {
            error!(module = %error.module_id, "Error in findBulk filter: {:#}", error.error);
        }

        if remaining > 0 {
            let missing: Vec<&str> = results
                .iter()
                .zip(filters)
                .filter(|(slot, _)| slot.is_none())
                .map(|(_, f)| f.description())
                .collect();
            warn!(missing = ?missing, "findBulk: {} of {} filters found nothing", remaining, filters.len());
        }
        results
    }

    /// 지연 검색 - 첫 접근 시 검색하고 성공하면 캐시
    pub fn find_lazy(self: &Arc<Self>, filter: Filter) -> LazyFound {
        LazyFound {
            query: Arc::clone(self),
            filter,
            cell: OnceLock::new(),
        }
    }

    // ========================================================================
    // 편의 함수
    // ========================================================================

    pub fn find_by_props(&self, props: &[&str]) -> Option<Found> {
        self.find(&filters::by_props(props), FindOptions::default())
    }

    pub fn find_all_by_props(&self, props: &[&str]) -> Vec<Found> {
        self.find_all(&filters::by_props(props), FindOptions::default())
    }

    pub fn find_by_code(&self, code: &[&str]) -> Option<Found> {
        self.find(&filters::by_code(code), FindOptions::default())
    }

    pub fn find_by_display_name(&self, name: &str) -> Option<Found> {
        self.find(&filters::by_display_name(name), FindOptions::default())
    }

    pub fn find_store(&self, name: &str) -> Option<Found> {
        let found = self.find(&filters::by_store_name(name), FindOptions::default());
        if found.is_none() {
            debug!("Store {} not found", name);
        }
        found
    }

    // ========================================================================
    // 원본 소스 검색
    // ========================================================================

    /// 원본 소스에 모든 패턴이 매칭되는 첫 모듈 ID (정의 순서)
    pub fn find_module_id(&self, code: &[CodePattern]) -> Option<ModuleId> {
        self.registry
            .sources()
            .into_iter()
            .find(|(_, source)| code.iter().all(|p| p.is_match(source)))
            .map(|(id, _)| id)
    }

    /// 원본 소스에 모든 패턴이 매칭되는 모든 모듈 ID
    pub fn search(&self, code: &[CodePattern]) -> Vec<ModuleId> {
        self.registry
            .sources()
            .into_iter()
            .filter(|(_, source)| code.iter().all(|p| p.is_match(source)))
            .map(|(id, _)| id)
            .collect()
    }

    /// 난독화된 모듈의 export를 이름으로 매핑
    ///
    /// `code`로 모듈을 찾은 뒤 각 export를 매퍼 필터와 비교합니다.
    /// 하나의 export는 하나의 이름에만 할당됩니다.
    pub fn map_mangled_module(
        &self,
        code: &[CodePattern],
        mappers: &[(&str, Filter)],
    ) -> HashMap<String, Found> {
        let mut mapped = HashMap::new();

        let Some(id) = self.find_module_id(code) else {
            warn!("mapMangledModule: no module matched {:?}", code.iter().map(|p| p.to_string()).collect::<Vec<_>>());
            return mapped;
        };
        let Some(exports) = self.registry.exports(&id) else {
            debug!(module = %id, "mapMangledModule: module is not loaded yet");
            return mapped;
        };

        for (key, member) in exports.props().into_iter().flat_map(|p| p.iter()) {
            for (name, filter) in mappers {
                if mapped.contains_key(*name) {
                    continue;
                }
                if filter.matches(member) {
                    mapped.insert(
                        name.to_string(),
                        Found::new(&id, ExportPath::Member(key.clone()), &exports),
                    );
                    break;
                }
            }
        }
        mapped
    }

    // ========================================================================
    // wait_for
    // ========================================================================

    /// 매칭되는 모듈이 로드되면 콜백 호출 (이미 로드됐으면 즉시)
    pub fn wait_for<F>(&self, filter: Filter, callback: F) -> WaitStatus
    where
        F: FnOnce(Found) + Send + 'static,
    {
        if let Some(found) = self.find(&filter, FindOptions::default()) {
            invoke_callback(&filter, Box::new(callback), found);
            return WaitStatus::Resolved;
        }

        let id = self.waiter_counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.waiters.lock().push(Waiter {
            id,
            filter,
            callback: Box::new(callback),
        });
        WaitStatus::Pending(id)
    }

    /// 대기 취소
    pub fn cancel_wait(&self, id: u64) -> bool {
        let mut waiters = self.waiters.lock();
        let before = waiters.len();
        waiters.retain(|w| w.id != id);
        waiters.len() != before
    }

    pub fn pending_waiters(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Drop for ModuleQuery {
    fn drop(&mut self) {
        self.registry.remove_listener(self.listener_id);
    }
}

// ============================================================================
// LazyFound
// ============================================================================

/// 지연 검색 결과
pub struct LazyFound {
    query: Arc<ModuleQuery>,
    filter: Filter,
    cell: OnceLock<Found>,
}

impl LazyFound {
    /// 캐시된 결과, 없으면 검색
    pub fn get(&self) -> Option<&Found> {
        if let Some(found) = self.cell.get() {
            return Some(found);
        }
        let found = self.query.find(&self.filter, FindOptions::default())?;
        Some(self.cell.get_or_init(|| found))
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

// ============================================================================
// 내부 헬퍼
// ============================================================================

fn match_exports(
    filter: &Filter,
    id: &ModuleId,
    exports: &Arc<ExportValue>,
    options: FindOptions,
) -> Option<Found> {
    if filter.matches(exports) {
        return Some(Found::new(id, ExportPath::Root, exports));
    }
    if !exports.is_object() {
        return None;
    }

    if let Some(default) = exports.default_export() {
        if filter.matches(default) {
            let path = if options.prefer_default_export {
                ExportPath::Default
            } else {
                ExportPath::Root
            };
            return Some(Found::new(id, path, exports));
        }
    }

    exports
        .short_key_members()
        .find(|(_, nested)| nested.is_truthy() && filter.matches(nested))
        .map(|(key, _)| Found::new(id, ExportPath::Member(key.to_string()), exports))
}

fn resolve_waiters(waiters: &Mutex<Vec<Waiter>>, id: &ModuleId, exports: &Arc<ExportValue>) {
    let matched: Vec<(Waiter, Found)> = {
        let mut waiters = waiters.lock();
        let mut matched = Vec::new();
        let mut index = 0;
        while index < waiters.len() {
            let filter = &waiters[index].filter;
            let hit = match isolate_predicate(|| waiter_matches(filter, exports)) {
                Ok(Some(path)) => Some(Found::new(id, path, exports)),
                Ok(None) => None,
                Err(e) => {
                    // 술어가 panic한 waiter는 남겨 두고 다음 모듈에서 다시 검사
                    error!(
                        module = %id,
                        filter = filter.description(),
                        "waitFor filter panicked: {}",
                        e
                    );
                    None
                }
            };

            match hit {
                Some(found) => matched.push((waiters.remove(index), found)),
                None => index += 1,
            }
        }
        matched
    };

    // 잠금 해제 후 호출 (콜백이 wait_for를 다시 호출할 수 있음)
    for (waiter, found) in matched {
        invoke_callback(&waiter.filter, waiter.callback, found);
    }
}

fn waiter_matches(filter: &Filter, exports: &ExportValue) -> Option<ExportPath> {
    if filter.matches(exports) {
        return Some(ExportPath::Root);
    }
    exports
        .default_export()
        .filter(|default| filter.matches(default))
        .map(|_| ExportPath::Default)
}

fn invoke_callback(filter: &Filter, callback: WaitCallback, found: Found) {
    let module_id = found.module_id.clone();
    if let Err(e) = isolate(move || {
        callback(found);
        Ok(())
    }) {
        error!(
            module = %module_id,
            filter = filter.description(),
            "Error in waitFor callback: {:#}",
            e
        );
    }
}

fn log_visit_errors(filter: &Filter, errors: Vec<crate::module::VisitError>) {
    for error in errors {
        debug!(
            module = %error.module_id,
            filter = filter.description(),
            "Filter failed while searching: {:#}",
            error.error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn declared(value: serde_json::Value) -> impl Fn(&ModuleId, &str) -> anyhow::Result<ExportValue> {
        move |_id: &ModuleId, _source: &str| Ok(ExportValue::from(value.clone()))
    }

    fn setup() -> (Arc<ModuleRegistry>, Arc<ModuleQuery>) {
        let registry = Arc::new(ModuleRegistry::new());
        let query = ModuleQuery::new(Arc::clone(&registry));
        (registry, query)
    }

    #[test]
    fn test_find_all_by_props() {
        let (registry, query) = setup();
        registry.load_module("1", "", &declared(json!({"alpha": 1}))).unwrap();
        registry.load_module("2", "", &declared(json!({"alpha": 1, "beta": 2}))).unwrap();
        registry.load_module("3", "", &declared(json!({"beta": 2}))).unwrap();

        let found = query.find_all_by_props(&["alpha", "beta"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].module_id.as_str(), "2");
        assert_eq!(found[0].path, ExportPath::Root);
    }

    #[test]
    fn test_default_and_nested_exports() {
        let (registry, query) = setup();
        registry
            .load_module("10", "", &declared(json!({"default": {"getToken": {"$fn": "f"}}})))
            .unwrap();
        registry
            .load_module("11", "", &declared(json!({"Zx": {"$fn": "g", "displayName": "Tooltip"}, "longName": 1})))
            .unwrap();

        let token = query.find_by_props(&["getToken"]).unwrap();
        assert_eq!(token.path, ExportPath::Default);
        assert!(token.value().has_prop("getToken"));

        let whole = query
            .find(&filters::by_props(&["getToken"]), FindOptions { prefer_default_export: false })
            .unwrap();
        assert_eq!(whole.path, ExportPath::Root);
        assert!(whole.value().has_prop("default"));

        let tooltip = query.find_by_display_name("Tooltip").unwrap();
        assert_eq!(tooltip.path, ExportPath::Member("Zx".to_string()));
        assert_eq!(tooltip.value().function_source(), Some("g"));
    }

    #[test]
    fn test_find_miss_and_panicking_filter() {
        let (registry, query) = setup();
        registry.load_module("1", "", &declared(json!({"a": 1}))).unwrap();
        registry.load_module("2", "", &declared(json!({"b": 1}))).unwrap();

        assert!(query.find_by_props(&["missing"]).is_none());

        let exploding = filters::custom("explodes on a", |v| {
            if v.has_prop("a") {
                panic!("filter bug");
            }
            v.has_prop("b")
        });
        let found = query.find(&exploding, FindOptions::default()).unwrap();
        assert_eq!(found.module_id.as_str(), "2");
    }

    #[test]
    fn test_find_bulk() {
        let (registry, query) = setup();
        registry.load_module("1", "", &declared(json!({"a": 1}))).unwrap();
        registry.load_module("2", "", &declared(json!({"b": 1}))).unwrap();

        let results = query.find_bulk(&[
            filters::by_props(&["b"]),
            filters::by_props(&["nothing"]),
            filters::by_props(&["a"]),
        ]);
        assert_eq!(results[0].as_ref().unwrap().module_id.as_str(), "2");
        assert!(results[1].is_none());
        assert_eq!(results[2].as_ref().unwrap().module_id.as_str(), "1");
    }

    #[test]
    fn test_source_search_and_mangled_mapping() {
        let (registry, query) = setup();
        registry.define("1", "function a(){return 'unrelated'}");
        registry
            .load_module(
                "2",
                "e.exports={Z:()=>'Menu.open',q:()=>'Menu.close'}",
                &declared(json!({"Z": {"$fn": "()=>'Menu.open'"}, "q": {"$fn": "()=>'Menu.close'"}})),
            )
            .unwrap();

        assert_eq!(
            query.find_module_id(&[CodePattern::literal("Menu.open")]).map(|id| id.to_string()),
            Some("2".to_string())
        );
        assert_eq!(query.search(&[CodePattern::literal("function")]).len(), 1);

        let mapped = query.map_mangled_module(
            &[CodePattern::literal("Menu.open")],
            &[
                ("openMenu", filters::by_code(&["open"])),
                ("closeMenu", filters::by_code(&["close"])),
            ],
        );
        assert_eq!(mapped["openMenu"].path, ExportPath::Member("Z".to_string()));
        assert_eq!(mapped["closeMenu"].path, ExportPath::Member("q".to_string()));
    }

    #[test]
    fn test_wait_for_fires_once() {
        let (registry, query) = setup();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        let status = query.wait_for(filters::by_props(&["late"]), move |found| {
            assert_eq!(found.module_id.as_str(), "9");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(matches!(status, WaitStatus::Pending(_)));
        assert_eq!(query.pending_waiters(), 1);

        registry.load_module("9", "", &declared(json!({"late": true}))).unwrap();
        registry.load_module("10", "", &declared(json!({"late": true}))).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(query.pending_waiters(), 0);
    }

    #[test]
    fn test_wait_for_survives_panicking_filter() {
        let (registry, query) = setup();
        let fired = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let first = Arc::clone(&fired);
        query.wait_for(filters::by_props(&["late"]), move |_| first.lock().push("first"));
        query.wait_for(filters::custom("exploding", |_| panic!("bad filter")), |_| {});
        let third = Arc::clone(&fired);
        query.wait_for(filters::by_props(&["late"]), move |_| third.lock().push("third"));

        registry.load_module("9", "", &declared(json!({"late": true}))).unwrap();

        assert_eq!(*fired.lock(), vec!["first", "third"]);
        assert_eq!(query.pending_waiters(), 1);
    }

    #[test]
    fn test_wait_for_already_loaded() {
        let (registry, query) = setup();
        registry.load_module("1", "", &declared(json!({"ready": 1}))).unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let status = query.wait_for(filters::by_props(&["ready"]), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(status, WaitStatus::Resolved);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_find_lazy_caches() {
        let (registry, query) = setup();
        let lazy = query.find_lazy(filters::by_props(&["later"]));
        assert!(lazy.get().is_none());
        assert!(!lazy.is_resolved());

        registry.load_module("1", "", &declared(json!({"later": 1}))).unwrap();
        assert_eq!(lazy.get().unwrap().module_id.as_str(), "1");
        assert!(lazy.is_resolved());
    }
}
