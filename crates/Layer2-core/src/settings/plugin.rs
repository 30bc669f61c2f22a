//! 플러그인 범위 설정 (`plugins.<name>.*`)

use super::store::{SettingsStore, SubscriptionId};
use serde_json::Value;
use splice_foundation::Result;
use std::sync::Arc;

/// 플러그인 설정 핸들
#[derive(Clone)]
pub struct PluginSettings {
    store: Arc<SettingsStore>,
    plugin: String,
}

impl PluginSettings {
    pub(crate) fn new(store: Arc<SettingsStore>, plugin: &str) -> Self {
        Self {
            store,
            plugin: plugin.to_string(),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// 전체 경로 (`plugins.<name>.<key>`)
    pub fn path(&self, key: &str) -> String {
        format!("plugins.{}.{}", self.plugin, key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(&self.path(key))
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.store.set(&self.path(key), value)
    }

    pub fn enabled(&self) -> bool {
        self.store.get_bool(&self.path("enabled")).unwrap_or(false)
    }

    pub fn subscribe<F>(&self, key: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Value, &str) + Send + Sync + 'static,
    {
        self.store.subscribe(Some(&self.path(key)), callback)
    }
}
