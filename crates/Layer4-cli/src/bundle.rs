//! Module bundle - 호스트 모듈 스냅샷 파일
//!
//! ```json
//! {
//!   "modules": [
//!     { "id": "42", "source": "function(){helloWorld()}", "exports": { "greet": { "$fn": "..." } } }
//!   ]
//! }
//! ```
//!
//! 소스는 실행하지 않습니다. `exports`에 선언된 값이 평가 결과로 사용됩니다.

use anyhow::Context;
use serde::{Deserialize, Deserializer};
use splice_core::{DeclaredExports, ExportValue, ModuleId, SpliceRuntime};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct BundleModule {
    #[serde(deserialize_with = "module_id")]
    pub id: ModuleId,
    pub source: String,
    #[serde(default)]
    pub exports: Option<ExportValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub modules: Vec<BundleModule>,
}

/// 번들러는 숫자 ID를 쓰기도 함
fn module_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ModuleId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => ModuleId::from(n),
        RawId::Text(s) => ModuleId::from(s),
    })
}

/// 로드 결과
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub loaded: usize,
    pub failed: Vec<ModuleId>,
}

impl Bundle {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bundle {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid bundle {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn evaluator(&self) -> DeclaredExports {
        let mut declared = DeclaredExports::new();
        for module in &self.modules {
            if let Some(exports) = &module.exports {
                declared.insert(module.id.clone(), exports.clone());
            }
        }
        declared
    }

    /// 모든 모듈을 런타임에 로드 (패치 적용 후 평가)
    pub fn load_into(&self, runtime: &SpliceRuntime) -> LoadStats {
        let evaluator = self.evaluator();
        let mut stats = LoadStats::default();

        for module in &self.modules {
            match runtime.load_module(module.id.clone(), &module.source, &evaluator) {
                Ok(_) => stats.loaded += 1,
                Err(e) => {
                    warn!(module = %module.id, "Failed to load module: {}", e);
                    stats.failed.push(module.id.clone());
                }
            }
        }

        debug!("Loaded {} of {} bundle modules", stats.loaded, self.modules.len());
        stats
    }
}
