//! Plugin Catalogue - 알려진 플러그인 목록
//!
//! 등록 순서가 곧 패치 등록 순서입니다. JSON 매니페스트 디렉토리에서
//! 선언형 플러그인을 로드할 수 있습니다.

use super::definition::PluginDefinition;
use super::manifest::PluginManifest;
use serde_json::{Map, Value};
use splice_foundation::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 플러그인 카탈로그
#[derive(Debug, Default, Clone)]
pub struct PluginCatalogue {
    plugins: Vec<Arc<PluginDefinition>>,
    index: HashMap<String, usize>,
}

impl PluginCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 플러그인 추가 (이름 중복 시 에러)
    pub fn add(&mut self, plugin: PluginDefinition) -> Result<()> {
        let name = plugin.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::Plugin(format!("Plugin {} is already registered", name)));
        }

        debug!(plugin = %name, patches = plugin.patches().len(), "Registered plugin");
        self.index.insert(name, self.plugins.len());
        self.plugins.push(Arc::new(plugin));
        Ok(())
    }

    pub fn with(mut self, plugin: PluginDefinition) -> Result<Self> {
        self.add(plugin)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<PluginDefinition>> {
        self.index.get(name).map(|&i| &self.plugins[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// 등록 순서대로
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PluginDefinition>> {
        self.plugins.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// `name`에 의존하는 플러그인
    pub fn dependents_of(&self, name: &str) -> Vec<&Arc<PluginDefinition>> {
        self.plugins
            .iter()
            .filter(|p| p.dependencies().iter().any(|d| d == name))
            .collect()
    }

    /// 카탈로그에 없는 의존성 (플러그인, 의존성)
    pub fn unresolved_dependencies(&self) -> Vec<(String, String)> {
        self.plugins
            .iter()
            .flat_map(|p| {
                p.dependencies()
                    .iter()
                    .filter(|d| !self.contains(d))
                    .map(|d| (p.name().to_string(), d.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// 설정 기본값 (`{"plugins": {name: {...}}}`)
    pub fn settings_defaults(&self) -> Value {
        let plugins: Map<String, Value> = self
            .plugins
            .iter()
            .map(|p| (p.name().to_string(), p.manifest().settings_defaults()))
            .collect();

        let mut root = Map::new();
        root.insert("plugins".to_string(), Value::Object(plugins));
        Value::Object(root)
    }

    // ========================================================================
    // 매니페스트 로드
    // ========================================================================

    /// 디렉토리의 `*.json` 매니페스트 로드 (파일명 순). 로드된 수 반환
    ///
    /// 잘못된 파일은 경고 후 건너뜁니다.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match load_manifest(&path).and_then(|m| {
                let plugin = PluginDefinition::from_manifest(m)?;
                self.add(plugin)
            }) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Failed to load plugin manifest {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} plugin manifests from {}", loaded, dir.display());
        Ok(loaded)
    }
}

fn load_manifest(path: &Path) -> Result<PluginManifest> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_and_order() {
        let catalogue = PluginCatalogue::new()
            .with(PluginDefinition::new("B"))
            .unwrap()
            .with(PluginDefinition::new("A").dependency("B").dependency("Ghost"))
            .unwrap();

        assert_eq!(catalogue.names(), vec!["B", "A"]);
        assert_eq!(catalogue.dependents_of("B").len(), 1);
        assert_eq!(
            catalogue.unresolved_dependencies(),
            vec![("A".to_string(), "Ghost".to_string())]
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalogue = PluginCatalogue::new();
        catalogue.add(PluginDefinition::new("A")).unwrap();
        assert!(catalogue.add(PluginDefinition::new("A")).is_err());
    }

    #[test]
    fn test_settings_defaults() {
        let catalogue = PluginCatalogue::new()
            .with(PluginDefinition::new("Core").required())
            .unwrap()
            .with(PluginDefinition::new("Extra"))
            .unwrap();

        assert_eq!(
            catalogue.settings_defaults(),
            json!({"plugins": {"Core": {"enabled": true}, "Extra": {"enabled": false}}})
        );
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a-greeter.json"),
            r#"{"name": "Greeter", "patches": [{"find": "helloWorld", "replacement": {"match": "helloWorld\\(\\)", "replace": "helloWorld(42)"}}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("b-broken.json"), "{ nope").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut catalogue = PluginCatalogue::new();
        assert_eq!(catalogue.load_dir(dir.path()).unwrap(), 1);
        assert!(catalogue.get("Greeter").unwrap().has_patches());
    }
}
