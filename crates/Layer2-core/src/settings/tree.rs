//! 점(.) 경로 기반 JSON 트리 조작

use serde_json::{Map, Value};
use splice_foundation::{Error, Result};

fn segments(path: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::InvalidInput(format!("Invalid settings path: {:?}", path)));
    }
    Ok(parts)
}

/// 경로 값 조회
pub fn get_path<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(tree, |node, key| node.as_object()?.get(key))
}

/// 경로 값 설정 (중간 객체 생성). 중간 값이 객체가 아니면 에러
pub fn set_path(tree: &mut Value, path: &str, value: Value) -> Result<()> {
    let parts = segments(path)?;
    let Some((last, parents)) = parts.split_last() else {
        return Err(Error::InvalidInput("Empty settings path".to_string()));
    };

    let mut node = tree;
    for key in parents {
        let map = node
            .as_object_mut()
            .ok_or_else(|| Error::InvalidInput(format!("{} is not an object", key)))?;
        node = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = node
        .as_object_mut()
        .ok_or_else(|| Error::InvalidInput(format!("Parent of {} is not an object", path)))?;
    map.insert(last.to_string(), value);
    Ok(())
}

/// 누락된 키만 기본값으로 채움 (기존 값은 덮어쓰지 않음)
pub fn merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target), Some(defaults)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default) in defaults {
        match target.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default.is_object() {
                    merge_defaults(existing, default);
                }
            }
            None => {
                target.insert(key.clone(), default.clone());
            }
        }
    }
}
