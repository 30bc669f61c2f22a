//! 기본 설정 템플릿

use serde_json::{json, Value};

/// 최상위 기본 설정
pub fn default_settings() -> Value {
    json!({
        "unsafeRequire": false,
        "useQuickCss": true,
        "notifyAboutUpdates": true,
        "autoUpdate": false,
        "themeLinks": [],
        "plugins": {}
    })
}
