//! Settings Store - 반응형 설정 트리
//!
//! ```text
//! set(path, value)
//!   ├─ 잠긴 경로? ──────────► 거부 (required 플러그인)
//!   ├─ 현재 값과 같음? ─────► no-op (알림/저장 없음)
//!   ├─ 트리 갱신
//!   ├─ 구독자 알림 (path 일치 또는 전체 구독, 등록 순서)
//!   └─ Persister로 저장 요청
//! ```

use super::persist::Persister;
use super::plugin::PluginSettings;
use super::tree::{get_path, merge_defaults, set_path};
use crate::isolate::isolate;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use splice_foundation::{Error, NativeBridge, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 구독 ID
pub type SubscriptionId = u64;

/// 구독 콜백 (새 값, 변경된 경로)
pub type SettingsCallback = Arc<dyn Fn(&Value, &str) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    path: Option<String>,
    callback: SettingsCallback,
}

struct LockedPath {
    value: Value,
    owner: String,
}

// ============================================================================
// SettingsStore
// ============================================================================

/// 설정 저장소
pub struct SettingsStore {
    tree: RwLock<Value>,
    subscriptions: RwLock<Vec<Subscription>>,
    subscription_counter: AtomicU64,
    locked: RwLock<HashMap<String, LockedPath>>,
    persister: Option<Persister>,
}

impl SettingsStore {
    /// 브릿지에서 로드 후 기본값 병합
    ///
    /// 저장된 텍스트가 깨져 있으면 에러를 기록하고 기본값으로 시작합니다.
    /// tokio 런타임 밖에서 호출되면 저장 없이 메모리에서만 동작합니다.
    pub fn load(bridge: Arc<dyn NativeBridge>, defaults: &Value, debounce: Duration) -> Self {
        let mut tree = match bridge.get_settings_text() {
            Ok(Some(text)) => parse_settings(&text),
            Ok(None) => {
                info!("No saved settings, using defaults");
                Value::Object(Map::new())
            }
            Err(e) => {
                error!("Failed to read settings: {}", e);
                Value::Object(Map::new())
            }
        };
        merge_defaults(&mut tree, defaults);

        let persister = match Persister::spawn(bridge, debounce) {
            Ok(persister) => Some(persister),
            Err(e) => {
                warn!("Settings will not be persisted: {}", e);
                None
            }
        };

        Self::with_tree(tree, persister)
    }

    /// 저장하지 않는 메모리 전용 저장소
    pub fn in_memory(defaults: &Value) -> Self {
        let mut tree = Value::Object(Map::new());
        merge_defaults(&mut tree, defaults);
        Self::with_tree(tree, None)
    }

    /// 기본값 추가 병합 (알림/저장 없음, 기존 값 유지)
    pub fn register_defaults(&self, defaults: &Value) {
        merge_defaults(&mut self.tree.write(), defaults);
    }

    fn with_tree(tree: Value, persister: Option<Persister>) -> Self {
        Self {
            tree: RwLock::new(tree),
            subscriptions: RwLock::new(Vec::new()),
            subscription_counter: AtomicU64::new(0),
            locked: RwLock::new(HashMap::new()),
            persister,
        }
    }

    // ========================================================================
    // 읽기
    // ========================================================================

    pub fn get(&self, path: &str) -> Option<Value> {
        get_path(&self.tree.read(), path).cloned()
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }

    /// 전체 트리 복사본
    pub fn snapshot(&self) -> Value {
        self.tree.read().clone()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.tree.read())?)
    }

    // ========================================================================
    // 쓰기
    // ========================================================================

    /// 값 설정. 변경되었으면 true, 같은 값이면 false (no-op)
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        self.check_locked(path, &value)?;

        let text = {
            let mut tree = self.tree.write();
            if get_path(&tree, path) == Some(&value) {
                return Ok(false);
            }
            set_path(&mut tree, path, value.clone())?;
            match &self.persister {
                Some(_) => Some(serde_json::to_string_pretty(&*tree)?),
                None => None,
            }
        };

        debug!(path, "Setting changed");
        self.notify(path, &value);

        if let (Some(persister), Some(text)) = (&self.persister, text) {
            persister.schedule(text);
        }
        Ok(true)
    }

    fn check_locked(&self, path: &str, value: &Value) -> Result<()> {
        let locked = self.locked.read();
        let prefix = format!("{}.", path);

        for (locked_path, lock) in locked.iter() {
            let incoming = if locked_path == path {
                Some(value)
            } else if let Some(rest) = locked_path.strip_prefix(&prefix) {
                get_path(value, rest)
            } else {
                continue;
            };

            if incoming != Some(&lock.value) {
                warn!(path = %locked_path, plugin = %lock.owner, "Rejected write to locked setting");
                return Err(Error::RequiredPlugin(lock.owner.clone()));
            }
        }
        Ok(())
    }

    /// 경로를 값으로 고정 (required 플러그인의 enabled 등)
    pub fn lock_path(&self, path: &str, value: impl Into<Value>, owner: impl Into<String>) -> Result<()> {
        let value = value.into();
        {
            let mut tree = self.tree.write();
            if get_path(&tree, path) != Some(&value) {
                set_path(&mut tree, path, value.clone())?;
            }
        }
        self.locked.write().insert(
            path.to_string(),
            LockedPath {
                value,
                owner: owner.into(),
            },
        );
        Ok(())
    }

    pub fn is_locked(&self, path: &str) -> bool {
        self.locked.read().contains_key(path)
    }

    // ========================================================================
    // 구독
    // ========================================================================

    /// 경로 구독 (None이면 모든 변경)
    pub fn subscribe<F>(&self, path: Option<&str>, callback: F) -> SubscriptionId
    where
        F: Fn(&Value, &str) + Send + Sync + 'static,
    {
        let id = self.subscription_counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscriptions.write().push(Subscription {
            id,
            path: path.map(str::to_string),
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    fn notify(&self, path: &str, value: &Value) {
        let callbacks: Vec<(SubscriptionId, SettingsCallback)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.path.as_deref().map_or(true, |p| p == path))
            .map(|s| (s.id, Arc::clone(&s.callback)))
            .collect();

        for (id, callback) in callbacks {
            if let Err(e) = isolate(|| {
                callback(value, path);
                Ok(())
            }) {
                error!(path, subscription = id, "Error in settings subscriber: {:#}", e);
            }
        }
    }

    // ========================================================================
    // 플러그인
    // ========================================================================

    /// 플러그인 범위 설정
    pub fn plugin(self: &Arc<Self>, name: &str) -> PluginSettings {
        PluginSettings::new(Arc::clone(self), name)
    }

    /// 이름이 바뀐 플러그인의 설정 이전
    ///
    /// 새 이름의 설정이 이미 있으면 아무것도 하지 않습니다.
    pub fn migrate_plugin_settings(&self, name: &str, old_names: &[&str]) -> Result<bool> {
        let text = {
            let mut tree = self.tree.write();
            let Some(plugins) = tree.get_mut("plugins").and_then(|p| p.as_object_mut()) else {
                return Ok(false);
            };
            if plugins.contains_key(name) {
                return Ok(false);
            }

            let Some(old) = old_names.iter().find(|old| plugins.contains_key(**old)) else {
                return Ok(false);
            };
            let Some(value) = plugins.remove(*old) else {
                return Ok(false);
            };
            info!("Migrating settings from old name {} to {}", old, name);
            plugins.insert(name.to_string(), value);

            match &self.persister {
                Some(_) => Some(serde_json::to_string_pretty(&*tree)?),
                None => None,
            }
        };

        if let (Some(persister), Some(text)) = (&self.persister, text) {
            persister.schedule(text);
        }
        Ok(true)
    }

    // ========================================================================
    // 저장
    // ========================================================================

    pub fn is_persistent(&self) -> bool {
        self.persister.is_some()
    }

    /// 저장 요청 횟수
    pub fn persist_requests(&self) -> u64 {
        self.persister.as_ref().map(|p| p.requests()).unwrap_or(0)
    }

    /// 대기 중인 저장 완료 대기
    pub async fn flush(&self) {
        if let Some(persister) = &self.persister {
            persister.flush().await;
        }
    }
}

fn parse_settings(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            error!("Saved settings are not a JSON object, using defaults");
            Value::Object(Map::new())
        }
        Err(e) => {
            error!("Failed to parse saved settings, using defaults: {}", e);
            Value::Object(Map::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use splice_foundation::MemoryBridge;

    fn defaults() -> Value {
        json!({"useQuickCss": true, "plugins": {}})
    }

    #[test]
    fn test_set_and_noop() {
        let store = SettingsStore::in_memory(&defaults());
        assert!(store.set("plugins.A.enabled", true).unwrap());
        assert!(!store.set("plugins.A.enabled", true).unwrap());
        assert_eq!(store.get_bool("plugins.A.enabled"), Some(true));
    }

    #[test]
    fn test_subscribers_by_path() {
        let store = SettingsStore::in_memory(&defaults());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let exact = Arc::clone(&seen);
        store.subscribe(Some("useQuickCss"), move |v, p| exact.lock().push(format!("exact {} {}", p, v)));
        let all = Arc::clone(&seen);
        let all_id = store.subscribe(None, move |_, p| all.lock().push(format!("all {}", p)));
        store.subscribe(Some("useQuickCss"), |_, _| panic!("subscriber bug"));

        store.set("useQuickCss", false).unwrap();
        store.set("themeLinks", json!([])).unwrap();
        store.set("useQuickCss", false).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                "exact useQuickCss false".to_string(),
                "all useQuickCss".to_string(),
                "all themeLinks".to_string(),
            ]
        );

        assert!(store.unsubscribe(all_id));
        assert!(!store.unsubscribe(all_id));
    }

    #[test]
    fn test_locked_path() {
        let store = SettingsStore::in_memory(&defaults());
        store.lock_path("plugins.Core.enabled", true, "Core").unwrap();

        assert_eq!(store.get_bool("plugins.Core.enabled"), Some(true));
        assert!(matches!(
            store.set("plugins.Core.enabled", false),
            Err(Error::RequiredPlugin(_))
        ));
        assert!(matches!(
            store.set("plugins.Core", json!({"enabled": false})),
            Err(Error::RequiredPlugin(_))
        ));
        assert!(store.set("plugins.Core", json!({"enabled": true, "extra": 1})).unwrap());
        assert!(store.is_locked("plugins.Core.enabled"));
    }

    #[test]
    fn test_corrupt_settings_fall_back() {
        let bridge = Arc::new(MemoryBridge::with_settings("{not json"));
        let store = SettingsStore::load(bridge, &defaults(), Duration::ZERO);

        assert_eq!(store.snapshot(), defaults());
        assert!(!store.is_persistent());
    }

    #[test]
    fn test_register_defaults_fills_missing_only() {
        let store = SettingsStore::in_memory(&json!({"plugins": {"A": {"enabled": true}}}));
        store.register_defaults(&json!({"plugins": {"A": {"enabled": false, "level": 3}}}));

        assert_eq!(store.get_bool("plugins.A.enabled"), Some(true));
        assert_eq!(store.get("plugins.A.level"), Some(json!(3)));
    }

    #[test]
    fn test_migrate_plugin_settings() {
        let store = SettingsStore::in_memory(&json!({"plugins": {"OldName": {"enabled": true}}}));
        assert!(store.migrate_plugin_settings("NewName", &["Missing", "OldName"]).unwrap());
        assert_eq!(store.get_bool("plugins.NewName.enabled"), Some(true));
        assert_eq!(store.get("plugins.OldName"), None);
        assert!(!store.migrate_plugin_settings("NewName", &["OldName"]).unwrap());
    }

    #[tokio::test]
    async fn test_persists_changes_only() {
        let bridge = Arc::new(MemoryBridge::with_settings(r#"{"useQuickCss": false}"#));
        let store = SettingsStore::load(bridge.clone(), &defaults(), Duration::ZERO);

        assert_eq!(store.get_bool("useQuickCss"), Some(false));
        assert_eq!(store.get("plugins"), Some(json!({})));

        store.set("useQuickCss", false).unwrap();
        store.set("useQuickCss", true).unwrap();
        store.flush().await;

        assert_eq!(bridge.write_count(), 1);
        let saved: Value = serde_json::from_str(&bridge.last_written().unwrap()).unwrap();
        assert_eq!(saved["useQuickCss"], json!(true));
        assert_eq!(store.persist_requests(), 1);
    }
}
