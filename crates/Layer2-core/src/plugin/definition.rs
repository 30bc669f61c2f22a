//! Plugin Definition - 플러그인 등록 객체
//!
//! 매니페스트 + 컴파일된 패치 + 선택적 start/stop 훅.

use super::manifest::{OptionDef, PluginAuthor, PluginManifest, StartAt};
use crate::filter::ModuleQuery;
use crate::patch::PatchDescriptor;
use crate::settings::PluginSettings;
use splice_foundation::Result;
use std::fmt;
use std::sync::Arc;

/// start/stop 훅
pub type HookFn = Arc<dyn Fn(&PluginContext) -> anyhow::Result<()> + Send + Sync>;

// ============================================================================
// PluginContext
// ============================================================================

/// 훅에 전달되는 컨텍스트
pub struct PluginContext {
    name: String,
    settings: PluginSettings,
    query: Arc<ModuleQuery>,
}

impl PluginContext {
    pub fn new(name: impl Into<String>, settings: PluginSettings, query: Arc<ModuleQuery>) -> Self {
        Self {
            name: name.into(),
            settings,
            query,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `plugins.<name>.*` 설정
    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    pub fn query(&self) -> &Arc<ModuleQuery> {
        &self.query
    }
}

// ============================================================================
// PluginDefinition
// ============================================================================

/// 플러그인 정의
#[derive(Clone)]
pub struct PluginDefinition {
    manifest: PluginManifest,
    patches: Vec<PatchDescriptor>,
    start: Option<HookFn>,
    stop: Option<HookFn>,
}

impl PluginDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            manifest: PluginManifest::new(name),
            patches: Vec::new(),
            start: None,
            stop: None,
        }
    }

    /// 선언형 매니페스트에서 생성 (패치 컴파일)
    pub fn from_manifest(manifest: PluginManifest) -> Result<Self> {
        let patches = manifest
            .patches
            .iter()
            .map(|p| p.compile())
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            manifest,
            patches,
            start: None,
            stop: None,
        })
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.manifest.description = description.into();
        self
    }

    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.manifest.authors.push(PluginAuthor {
            name: name.into(),
            id: None,
        });
        self
    }

    pub fn required(mut self) -> Self {
        self.manifest.required = true;
        self
    }

    pub fn enabled_by_default(mut self) -> Self {
        self.manifest.enabled_by_default = true;
        self
    }

    pub fn dependency(mut self, name: impl Into<String>) -> Self {
        self.manifest.dependencies.push(name.into());
        self
    }

    pub fn start_at(mut self, stage: StartAt) -> Self {
        self.manifest.start_at = stage;
        self
    }

    pub fn option(mut self, key: impl Into<String>, option: OptionDef) -> Self {
        self.manifest.options.insert(key.into(), option);
        self
    }

    pub fn patch(mut self, descriptor: PatchDescriptor) -> Self {
        self.patches.push(descriptor);
        self
    }

    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PluginContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.start = Some(Arc::new(hook));
        self
    }

    pub fn on_stop<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PluginContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.stop = Some(Arc::new(hook));
        self
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn is_required(&self) -> bool {
        self.manifest.required
    }

    pub fn dependencies(&self) -> &[String] {
        &self.manifest.dependencies
    }

    pub fn patches(&self) -> &[PatchDescriptor] {
        &self.patches
    }

    pub fn has_patches(&self) -> bool {
        !self.patches.is_empty()
    }

    pub fn start_hook(&self) -> Option<&HookFn> {
        self.start.as_ref()
    }

    pub fn stop_hook(&self) -> Option<&HookFn> {
        self.stop.as_ref()
    }
}

impl fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("name", &self.manifest.name)
            .field("required", &self.manifest.required)
            .field("dependencies", &self.manifest.dependencies)
            .field("patches", &self.patches.len())
            .field("start", &self.start.is_some())
            .field("stop", &self.stop.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::PatchManifest;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let plugin = PluginDefinition::new("NoTrack")
            .description("Disable analytics")
            .author("dev")
            .dependency("Core")
            .start_at(StartAt::DomReady)
            .option("verbose", OptionDef::boolean("Log blocked calls", false))
            .on_start(|_| Ok(()));

        assert_eq!(plugin.name(), "NoTrack");
        assert_eq!(plugin.dependencies(), &["Core".to_string()]);
        assert!(plugin.start_hook().is_some());
        assert!(plugin.stop_hook().is_none());
        assert!(!plugin.has_patches());
        assert_eq!(plugin.manifest().start_at, StartAt::DomReady);
    }

    #[test]
    fn test_from_manifest_compiles_patches() {
        let mut manifest = PluginManifest::new("Greeter");
        manifest.patches.push(
            serde_json::from_value::<PatchManifest>(json!({
                "find": "helloWorld",
                "replacement": {"match": "helloWorld\\(\\)", "replace": "helloWorld(42)"}
            }))
            .unwrap(),
        );

        let plugin = PluginDefinition::from_manifest(manifest).unwrap();
        assert!(plugin.has_patches());
        assert_eq!(plugin.patches()[0].find.to_string(), "helloWorld");
    }
}
