//! Plugin Manager - 플러그인 라이프사이클 관리
//!
//! ## 부트 순서
//!
//! ```text
//! init()
//!   1. required 플러그인의 enabled 고정
//!   2. 활성 플러그인의 (전이) 의존성을 dependency로 활성화
//!   3. 활성 플러그인의 패치를 카탈로그 순서대로 엔진에 등록
//! start_all(Init) ─► start_all(ModulesReady) ─► start_all(DomReady)
//! ```
//!
//! 패치는 대상 모듈이 로드되기 전에만 의미가 있으므로, 부트 이후에 켜진
//! 플러그인(또는 그 의존성)이 패치를 가지고 있으면 재시작이 필요합니다.

use super::definition::{PluginContext, PluginDefinition};
use super::manifest::StartAt;
use super::registry::PluginCatalogue;
use crate::filter::ModuleQuery;
use crate::isolate::isolate;
use crate::patch::PatchEngine;
use crate::settings::SettingsStore;
use parking_lot::Mutex;
use serde::Serialize;
use splice_foundation::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `plugins.<name>.enabled`
pub fn enabled_path(name: &str) -> String {
    format!("plugins.{}.enabled", name)
}

// ============================================================================
// 상태 / 결과 타입
// ============================================================================

/// 런타임 플러그인 상태 (저장되지 않음)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginState {
    pub started: bool,
    /// 다른 플러그인의 의존성으로 활성화됨
    pub is_dependency: bool,
    /// 부트 시 패치가 엔진에 등록됨
    pub patches_active: bool,
}

/// 플러그인 현황 (목록 표시용)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    pub name: String,
    pub enabled: bool,
    pub started: bool,
    pub required: bool,
    pub is_dependency: bool,
    pub patches: usize,
    pub start_at: StartAt,
}

/// 의존성 시작 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyStart {
    /// 패치를 가진 의존성이 있어 재시작 필요
    pub restart_needed: bool,
    /// 시작에 실패한 의존성
    pub failures: Vec<String>,
}

/// `enable_plugin` 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnableOutcome {
    Started,
    AlreadyRunning,
    RestartNeeded,
    Failed,
    DependencyFailures(Vec<String>),
}

/// `disable_plugin` 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableOutcome {
    Stopped,
    RestartNeeded,
    Failed,
    /// 활성화된 플러그인이 의존 중
    HasDependents(Vec<String>),
}

/// `init` 결과
#[derive(Debug, Clone, Default)]
pub struct InitSummary {
    pub enabled: Vec<String>,
    pub patches_registered: usize,
    /// (플러그인, 알 수 없는 의존성)
    pub unresolved: Vec<(String, String)>,
}

/// `start_all` 결과
#[derive(Debug, Clone, Default)]
pub struct StartSummary {
    pub started: Vec<String>,
    pub failed: Vec<String>,
}

// ============================================================================
// PluginManager
// ============================================================================

/// 플러그인 매니저
pub struct PluginManager {
    catalogue: Arc<PluginCatalogue>,
    settings: Arc<SettingsStore>,
    engine: Arc<PatchEngine>,
    query: Arc<ModuleQuery>,
    states: Mutex<HashMap<String, PluginState>>,
    initialized: AtomicBool,
}

impl PluginManager {
    pub fn new(
        catalogue: Arc<PluginCatalogue>,
        settings: Arc<SettingsStore>,
        engine: Arc<PatchEngine>,
        query: Arc<ModuleQuery>,
    ) -> Self {
        Self {
            catalogue,
            settings,
            engine,
            query,
            states: Mutex::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn catalogue(&self) -> &Arc<PluginCatalogue> {
        &self.catalogue
    }

    // ========================================================================
    // 상태 조회
    // ========================================================================

    /// required, dependency, 또는 설정에서 활성화
    pub fn is_enabled(&self, name: &str) -> bool {
        let Some(plugin) = self.catalogue.get(name) else {
            return false;
        };
        plugin.is_required()
            || self.state(name).is_dependency
            || self.settings.get_bool(&enabled_path(name)) == Some(true)
    }

    pub fn is_started(&self, name: &str) -> bool {
        self.state(name).started
    }

    pub fn state(&self, name: &str) -> PluginState {
        self.states.lock().get(name).cloned().unwrap_or_default()
    }

    fn update_state(&self, name: &str, f: impl FnOnce(&mut PluginState)) {
        f(self.states.lock().entry(name.to_string()).or_default());
    }

    pub fn started_plugins(&self) -> Vec<String> {
        self.catalogue
            .iter()
            .filter(|p| self.is_started(p.name()))
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn statuses(&self) -> Vec<PluginStatus> {
        self.catalogue
            .iter()
            .map(|p| {
                let state = self.state(p.name());
                PluginStatus {
                    name: p.name().to_string(),
                    enabled: self.is_enabled(p.name()),
                    started: state.started,
                    required: p.is_required(),
                    is_dependency: state.is_dependency,
                    patches: p.patches().len(),
                    start_at: p.manifest().start_at,
                }
            })
            .collect()
    }

    /// 훅 컨텍스트
    pub fn context_for(&self, name: &str) -> PluginContext {
        PluginContext::new(name, self.settings.plugin(name), Arc::clone(&self.query))
    }

    // ========================================================================
    // 부트
    // ========================================================================

    /// 활성 패치 계산 및 등록 (모듈 로드 전 한 번)
    pub fn init(&self) -> Result<InitSummary> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(Error::Plugin("Plugin manager is already initialized".to_string()));
        }

        for plugin in self.catalogue.iter().filter(|p| p.is_required()) {
            self.settings
                .lock_path(&enabled_path(plugin.name()), true, plugin.name())?;
        }

        let mut summary = InitSummary::default();
        let enabled: Vec<String> = self
            .catalogue
            .iter()
            .filter(|p| self.is_enabled(p.name()))
            .map(|p| p.name().to_string())
            .collect();

        let mut visited = HashSet::new();
        for name in &enabled {
            self.mark_dependencies(name, &mut visited, &mut summary.unresolved);
        }

        for plugin in self.catalogue.iter() {
            if !self.is_enabled(plugin.name()) {
                continue;
            }
            summary.enabled.push(plugin.name().to_string());

            if plugin.has_patches() {
                summary.patches_registered += self
                    .engine
                    .register_all(plugin.name(), plugin.patches().iter().cloned());
                self.update_state(plugin.name(), |s| s.patches_active = true);
            }
        }

        info!(
            "Plugins initialized: {} enabled, {} patches registered",
            summary.enabled.len(),
            summary.patches_registered
        );
        Ok(summary)
    }

    fn mark_dependencies(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        unresolved: &mut Vec<(String, String)>,
    ) {
        let Some(plugin) = self.catalogue.get(name) else {
            return;
        };

        for dep in plugin.dependencies() {
            if !self.catalogue.contains(dep) {
                warn!(plugin = %name, dependency = %dep, "Plugin has unknown dependency");
                unresolved.push((name.to_string(), dep.clone()));
                continue;
            }
            if !visited.insert(dep.clone()) {
                continue;
            }

            self.update_state(dep, |s| s.is_dependency = true);
            if let Err(e) = self.settings.set(&enabled_path(dep), true) {
                warn!(plugin = %dep, "Failed to enable dependency: {}", e);
            }
            self.mark_dependencies(dep, visited, unresolved);
        }
    }

    // ========================================================================
    // start / stop
    // ========================================================================

    /// 시작 훅 호출. 훅이 없으면 성공
    pub fn start_plugin(&self, name: &str) -> bool {
        let Some(plugin) = self.catalogue.get(name).cloned() else {
            error!(plugin = %name, "Cannot start unknown plugin");
            return false;
        };

        if let Some(hook) = plugin.start_hook() {
            if self.is_started(name) {
                warn!(plugin = %name, "Plugin is already started");
                return false;
            }

            info!(plugin = %name, "Starting plugin");
            let ctx = self.context_for(name);
            if let Err(e) = isolate(|| hook(&ctx)) {
                error!(plugin = %name, "Failed to start plugin: {:#}", e);
                return false;
            }
        }

        self.update_state(name, |s| s.started = true);
        true
    }

    /// 정지 훅 호출. 훅이 없으면 성공
    pub fn stop_plugin(&self, name: &str) -> bool {
        let Some(plugin) = self.catalogue.get(name).cloned() else {
            error!(plugin = %name, "Cannot stop unknown plugin");
            return false;
        };
        if plugin.is_required() {
            warn!(plugin = %name, "Refusing to stop required plugin");
            return false;
        }

        if let Some(hook) = plugin.stop_hook() {
            if !self.is_started(name) {
                warn!(plugin = %name, "Plugin is not started");
                return false;
            }

            info!(plugin = %name, "Stopping plugin");
            let ctx = self.context_for(name);
            if let Err(e) = isolate(|| hook(&ctx)) {
                error!(plugin = %name, "Failed to stop plugin: {:#}", e);
                return false;
            }
        }

        self.update_state(name, |s| s.started = false);
        true
    }

    /// 해당 단계의 활성 플러그인 시작 (카탈로그 순서)
    pub fn start_all(&self, stage: StartAt) -> StartSummary {
        let mut summary = StartSummary::default();

        for plugin in self.catalogue.iter() {
            let name = plugin.name();
            if plugin.manifest().start_at != stage || !self.is_enabled(name) || self.is_started(name) {
                continue;
            }
            if self.start_plugin(name) {
                summary.started.push(name.to_string());
            } else {
                summary.failed.push(name.to_string());
            }
        }

        debug!(stage = ?stage, started = summary.started.len(), failed = summary.failed.len(), "Stage started");
        summary
    }

    // ========================================================================
    // 의존성
    // ========================================================================

    /// 시작되지 않은 의존성을 깊이 우선으로 시작
    ///
    /// 부트 때 패치가 등록되지 않은 의존성이 패치를 가지고 있으면 시작하지
    /// 않고 `restart_needed`를 보고합니다.
    pub fn start_dependencies_recursive(&self, name: &str) -> DependencyStart {
        let mut result = DependencyStart::default();
        let mut visited = HashSet::new();
        visited.insert(name.to_string());
        self.walk_dependencies(name, &mut visited, &mut result);
        result
    }

    fn walk_dependencies(&self, name: &str, visited: &mut HashSet<String>, result: &mut DependencyStart) {
        let Some(plugin) = self.catalogue.get(name).cloned() else {
            return;
        };

        for dep in plugin.dependencies() {
            if !visited.insert(dep.clone()) {
                continue;
            }
            let Some(dep_plugin) = self.catalogue.get(dep).cloned() else {
                warn!(plugin = %name, dependency = %dep, "Plugin has unknown dependency");
                result.failures.push(dep.clone());
                continue;
            };

            self.walk_dependencies(dep, visited, result);
            if self.is_started(dep) {
                continue;
            }

            self.update_state(dep, |s| s.is_dependency = true);
            if let Err(e) = self.settings.set(&enabled_path(dep), true) {
                warn!(plugin = %dep, "Failed to enable dependency: {}", e);
            }

            if dep_plugin.has_patches() && !self.state(dep).patches_active {
                warn!(
                    plugin = %name,
                    dependency = %dep,
                    "Dependency has patches, restart required to enable it"
                );
                result.restart_needed = true;
                continue;
            }

            if !self.start_plugin(dep) {
                result.failures.push(dep.clone());
            }
        }
    }

    // ========================================================================
    // 사용자 토글
    // ========================================================================

    /// 플러그인 활성화 (의존성 먼저)
    pub fn enable_plugin(&self, name: &str) -> Result<EnableOutcome> {
        let plugin: Arc<PluginDefinition> = self
            .catalogue
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;

        if self.is_started(name) {
            self.settings.set(&enabled_path(name), true)?;
            return Ok(EnableOutcome::AlreadyRunning);
        }

        let deps = self.start_dependencies_recursive(name);
        if !deps.failures.is_empty() {
            error!(plugin = %name, failures = ?deps.failures, "Failed to start dependencies");
            return Ok(EnableOutcome::DependencyFailures(deps.failures));
        }

        self.settings.set(&enabled_path(name), true)?;
        if deps.restart_needed || (plugin.has_patches() && !self.state(name).patches_active) {
            info!(plugin = %name, "Plugin enabled, restart needed to apply patches");
            return Ok(EnableOutcome::RestartNeeded);
        }

        if self.start_plugin(name) {
            return Ok(EnableOutcome::Started);
        }
        if !plugin.is_required() {
            self.settings.set(&enabled_path(name), false)?;
        }
        Ok(EnableOutcome::Failed)
    }

    /// 플러그인 비활성화
    pub fn disable_plugin(&self, name: &str) -> Result<DisableOutcome> {
        let plugin = self
            .catalogue
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;

        if plugin.is_required() {
            warn!(plugin = %name, "Refusing to disable required plugin");
            return Err(Error::RequiredPlugin(name.to_string()));
        }

        let dependents: Vec<String> = self
            .catalogue
            .dependents_of(name)
            .into_iter()
            .filter(|p| self.is_enabled(p.name()))
            .map(|p| p.name().to_string())
            .collect();
        if !dependents.is_empty() {
            return Ok(DisableOutcome::HasDependents(dependents));
        }

        self.settings.set(&enabled_path(name), false)?;
        self.update_state(name, |s| s.is_dependency = false);

        let state = self.state(name);
        if state.patches_active {
            info!(plugin = %name, "Plugin disabled, restart needed to remove patches");
            return Ok(DisableOutcome::RestartNeeded);
        }
        if !state.started {
            return Ok(DisableOutcome::Stopped);
        }

        Ok(if self.stop_plugin(name) {
            DisableOutcome::Stopped
        } else {
            DisableOutcome::Failed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleRegistry;
    use crate::patch::{PatchDescriptor, PatchEngineConfig};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn manager(catalogue: PluginCatalogue, settings: serde_json::Value) -> PluginManager {
        let store = Arc::new(SettingsStore::in_memory(&settings));
        store.register_defaults(&catalogue.settings_defaults());
        let registry = Arc::new(ModuleRegistry::new());
        PluginManager::new(
            Arc::new(catalogue),
            store,
            Arc::new(PatchEngine::new(PatchEngineConfig::default())),
            ModuleQuery::new(registry),
        )
    }

    fn greeter_patch() -> PatchDescriptor {
        PatchDescriptor::new("helloWorld")
            .replace(r"helloWorld\(\)", "helloWorld(42)")
            .unwrap()
    }

    #[test]
    fn test_start_without_hook_succeeds() {
        let pm = manager(
            PluginCatalogue::new().with(PluginDefinition::new("Plain")).unwrap(),
            json!({}),
        );
        assert!(pm.start_plugin("Plain"));
        assert!(pm.is_started("Plain"));
        assert!(!pm.start_plugin("Unknown"));
    }

    #[test]
    fn test_double_start_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("Hooked").on_start(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .unwrap(),
            json!({}),
        );

        assert!(pm.start_plugin("Hooked"));
        assert!(!pm.start_plugin("Hooked"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_failure_is_isolated() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("Panics").on_start(|_| panic!("start bug")))
                .unwrap()
                .with(PluginDefinition::new("Errors").on_start(|_| anyhow::bail!("no module")))
                .unwrap(),
            json!({}),
        );

        assert!(!pm.start_plugin("Panics"));
        assert!(!pm.start_plugin("Errors"));
        assert!(!pm.is_started("Panics"));
    }

    #[test]
    fn test_stop_requires_started() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("P").on_start(|_| Ok(())).on_stop(|_| Ok(())))
                .unwrap(),
            json!({}),
        );

        assert!(!pm.stop_plugin("P"));
        assert!(pm.start_plugin("P"));
        assert!(pm.stop_plugin("P"));
        assert!(!pm.is_started("P"));
    }

    #[test]
    fn test_init_registers_enabled_patches_and_dependencies() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("Lib").patch(greeter_patch()))
                .unwrap()
                .with(PluginDefinition::new("Feature").dependency("Lib").dependency("Ghost"))
                .unwrap()
                .with(PluginDefinition::new("Off").patch(greeter_patch()))
                .unwrap(),
            json!({"plugins": {"Feature": {"enabled": true}}}),
        );

        let summary = pm.init().unwrap();
        assert_eq!(summary.enabled, vec!["Lib".to_string(), "Feature".to_string()]);
        assert_eq!(summary.patches_registered, 1);
        assert_eq!(summary.unresolved, vec![("Feature".to_string(), "Ghost".to_string())]);
        assert!(pm.state("Lib").is_dependency);
        assert!(pm.state("Lib").patches_active);
        assert!(pm.init().is_err());
    }

    #[test]
    fn test_start_all_by_stage() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("Early").enabled_by_default().start_at(StartAt::Init))
                .unwrap()
                .with(PluginDefinition::new("Late").enabled_by_default().start_at(StartAt::DomReady))
                .unwrap()
                .with(PluginDefinition::new("Disabled").start_at(StartAt::Init))
                .unwrap(),
            json!({}),
        );
        pm.init().unwrap();

        assert_eq!(pm.start_all(StartAt::Init).started, vec!["Early".to_string()]);
        assert!(pm.start_all(StartAt::ModulesReady).started.is_empty());
        assert_eq!(pm.start_all(StartAt::DomReady).started, vec!["Late".to_string()]);
    }

    #[test]
    fn test_required_plugin_cannot_be_disabled() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("Core").required())
                .unwrap(),
            json!({"plugins": {"Core": {"enabled": false}}}),
        );
        pm.init().unwrap();

        assert!(pm.is_enabled("Core"));
        assert!(matches!(pm.disable_plugin("Core"), Err(Error::RequiredPlugin(_))));
        assert!(pm.start_plugin("Core"));
        assert!(!pm.stop_plugin("Core"));
    }

    #[test]
    fn test_disable_with_dependents() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("Lib"))
                .unwrap()
                .with(PluginDefinition::new("App").dependency("Lib"))
                .unwrap(),
            json!({"plugins": {"App": {"enabled": true}}}),
        );
        pm.init().unwrap();

        assert_eq!(
            pm.disable_plugin("Lib").unwrap(),
            DisableOutcome::HasDependents(vec!["App".to_string()])
        );
        assert_eq!(pm.disable_plugin("App").unwrap(), DisableOutcome::Stopped);
        assert_eq!(pm.disable_plugin("Lib").unwrap(), DisableOutcome::Stopped);
        assert!(!pm.is_enabled("Lib"));
    }

    #[test]
    fn test_enable_with_failed_dependency_stays_disabled() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("App").dependency("Lib"))
                .unwrap()
                .with(PluginDefinition::new("Lib").on_start(|_| anyhow::bail!("lib broke")))
                .unwrap(),
            json!({}),
        );
        pm.init().unwrap();

        assert_eq!(
            pm.enable_plugin("App").unwrap(),
            EnableOutcome::DependencyFailures(vec!["Lib".to_string()])
        );
        assert!(!pm.is_enabled("App"));
        assert!(!pm.is_started("App"));
    }

    #[test]
    fn test_enable_with_failing_hook_reverts_setting() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("App").on_start(|_| anyhow::bail!("start broke")))
                .unwrap(),
            json!({}),
        );
        pm.init().unwrap();

        assert_eq!(pm.enable_plugin("App").unwrap(), EnableOutcome::Failed);
        assert!(!pm.is_enabled("App"));
        assert!(!pm.is_started("App"));
    }

    #[test]
    fn test_dependency_failure_reported_before_restart() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("App").dependency("Patched").dependency("Broken"))
                .unwrap()
                .with(PluginDefinition::new("Patched").patch(greeter_patch()))
                .unwrap()
                .with(PluginDefinition::new("Broken").on_start(|_| anyhow::bail!("no")))
                .unwrap(),
            json!({}),
        );
        pm.init().unwrap();

        assert_eq!(
            pm.enable_plugin("App").unwrap(),
            EnableOutcome::DependencyFailures(vec!["Broken".to_string()])
        );
        assert!(!pm.is_enabled("App"));
    }

    #[test]
    fn test_enable_plugin_with_patches_needs_restart() {
        let pm = manager(
            PluginCatalogue::new()
                .with(PluginDefinition::new("Greeter").patch(greeter_patch()))
                .unwrap(),
            json!({}),
        );
        pm.init().unwrap();

        assert_eq!(pm.enable_plugin("Greeter").unwrap(), EnableOutcome::RestartNeeded);
        assert!(pm.is_enabled("Greeter"));
        assert!(!pm.is_started("Greeter"));
        assert!(matches!(pm.enable_plugin("Nope"), Err(Error::PluginNotFound(_))));
    }
}
