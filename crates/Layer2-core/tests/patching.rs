//! 모듈 로드 → 패치 → 검색 통합 테스트

use splice_core::filter::by_props;
use splice_core::patch::{DiagnosticKind, MatchPattern, Replacement};
use splice_core::{
    DeclaredExports, ExportValue, FindOptions, ModuleId, PatchDescriptor, PatchStatus,
    PluginCatalogue, PluginDefinition, RuntimeConfig, SpliceRuntime,
};
use splice_foundation::MemoryBridge;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 평가 결과로 (패치된) 소스를 그대로 돌려주는 평가자
fn echo(_id: &ModuleId, source: &str) -> anyhow::Result<ExportValue> {
    Ok(ExportValue::function(source))
}

fn runtime_with(plugins: Vec<PluginDefinition>) -> SpliceRuntime {
    let mut catalogue = PluginCatalogue::new();
    for plugin in plugins {
        catalogue.add(plugin.enabled_by_default()).unwrap();
    }
    SpliceRuntime::bootstrap(RuntimeConfig::new(), Arc::new(MemoryBridge::new()), catalogue).unwrap()
}

#[tokio::test]
async fn test_hello_world_rewrite_on_load() {
    let greeter = PluginDefinition::new("Greeter").patch(
        PatchDescriptor::new("helloWorld").replacement(Replacement::with_fn(
            MatchPattern::regex(r"helloWorld\(\)").unwrap(),
            |_| Ok("helloWorld(42)".to_string()),
        )),
    );
    let runtime = runtime_with(vec![greeter]);

    let exports = runtime
        .load_module("f", "function f(){return helloWorld();}", &echo)
        .unwrap();

    assert_eq!(exports.function_source(), Some("function f(){return helloWorld(42);}"));
    let record = runtime.registry().get(&ModuleId::from("f")).unwrap();
    assert_eq!(record.patched_by, vec!["Greeter".to_string()]);
    assert_eq!(&*record.raw_source, "function f(){return helloWorld();}");
}

#[tokio::test]
async fn test_rewrite_is_idempotent() {
    let runtime = runtime_with(vec![PluginDefinition::new("Renamer")
        .patch(
            PatchDescriptor::new("getToken")
                .replace(r"(\i)\.getToken\(\)", "$1.getToken(true)")
                .unwrap(),
        )
        .patch(PatchDescriptor::new("track(").replace(r"track\(", "void(").unwrap())]);

    let source = "a.getToken();track(1);b.getToken()";
    let id = ModuleId::from("1");
    let first = runtime.engine().apply(&id, source);
    let second = runtime.engine().apply(&id, source);

    assert_eq!(first.source, "a.getToken(true);void(1);b.getToken()");
    assert_eq!(first.source, second.source);
    assert_eq!(first.patched_by, second.patched_by);
}

#[tokio::test]
async fn test_faulting_replacement_is_isolated() {
    let runtime = runtime_with(vec![
        PluginDefinition::new("Broken").patch(
            PatchDescriptor::new("target")
                .replacement(Replacement::with_fn(MatchPattern::literal("target"), |_| {
                    anyhow::bail!("replacement threw")
                }))
                .replacement(Replacement::template(MatchPattern::literal("alpha"), "ALPHA")),
        ),
        PluginDefinition::new("Sibling").patch(
            PatchDescriptor::new("target")
                .replacement(Replacement::template(MatchPattern::literal("beta"), "BETA")),
        ),
    ]);

    let exports = runtime.load_module("m", "target alpha beta", &echo).unwrap();
    assert_eq!(exports.function_source(), Some("target ALPHA BETA"));

    let report = runtime.engine().report();
    assert_eq!(report.modules_patched, 1);
    assert!(report
        .failures()
        .any(|d| d.owner == "Broken" && matches!(d.kind, DiagnosticKind::Fault { .. })));

    let outcome = runtime.engine().apply(&ModuleId::from("m"), "target alpha beta");
    assert_eq!(outcome.status, PatchStatus::PartiallyPatched);
}

#[tokio::test]
async fn test_token_gate_never_evaluates_pattern() {
    let calls = Arc::new(AtomicUsize::new(0));
    let spy = Arc::clone(&calls);
    let runtime = runtime_with(vec![PluginDefinition::new("Spy").patch(
        PatchDescriptor::new("needle").replacement(Replacement::with_fn(
            MatchPattern::regex(r"\w+").unwrap(),
            move |m| {
                spy.fetch_add(1, Ordering::SeqCst);
                Ok(m.text().to_uppercase())
            },
        )),
    )]);

    runtime.load_module("1", "haystack only", &echo).unwrap();
    runtime.load_module("2", "more hay", &echo).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(runtime.engine().pattern_evaluations(), 0);

    let exports = runtime.load_module("3", "needle here", &echo).unwrap();
    assert_eq!(exports.function_source(), Some("NEEDLE here"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.engine().pattern_evaluations(), 1);
}

#[tokio::test]
async fn test_broken_patch_falls_back_to_original_source() {
    let runtime = runtime_with(vec![PluginDefinition::new("Breaker").patch(
        PatchDescriptor::new("render").replace("render", "render<<broken>>").unwrap(),
    )]);

    let mut declared = DeclaredExports::new().reject_marker("<<broken>>");
    declared.insert("ui", ExportValue::component("Button", "function render(){}"));

    let exports = runtime.load_module("ui", "function render(){}", &declared).unwrap();
    assert_eq!(exports.display_name(), Some("Button"));

    let record = runtime.registry().get(&ModuleId::from("ui")).unwrap();
    assert!(record.is_loaded());
    assert!(record.patched_source.is_none());
    assert!(record.patched_by.is_empty());
}

#[tokio::test]
async fn test_find_all_by_props_returns_exact_match() {
    let runtime = runtime_with(vec![]);
    let mut declared = DeclaredExports::new();
    declared.insert("1", serde_json::json!({"alpha": 1}).into());
    declared.insert("2", serde_json::json!({"alpha": 1, "beta": 2}).into());
    declared.insert("3", serde_json::json!({"beta": 2}).into());

    for id in ["1", "2", "3"] {
        runtime.load_module(id, "module", &declared).unwrap();
    }

    let found = runtime
        .query()
        .find_all(&by_props(&["alpha", "beta"]), FindOptions::default());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].module_id, ModuleId::from("2"));
    assert_eq!(
        found[0].value().to_json(),
        serde_json::json!({"alpha": 1, "beta": 2})
    );
}

#[tokio::test]
async fn test_wait_for_resolves_on_later_load() {
    let runtime = runtime_with(vec![]);
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let mut declared = DeclaredExports::new();
    declared.insert("late", serde_json::json!({"getCurrentUser": {"$fn": "function(){}"}}).into());

    runtime.query().wait_for(by_props(&["getCurrentUser"]), move |found| {
        assert_eq!(found.module_id, ModuleId::from("late"));
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runtime.query().pending_waiters(), 1);

    runtime.load_module("early", "x", &declared).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    runtime.load_module("late", "y", &declared).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.query().pending_waiters(), 0);
}
