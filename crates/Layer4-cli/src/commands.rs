//! CLI 명령 구현
//!
//! 각 명령은 출력할 텍스트를 반환하고, 출력은 `main`이 담당합니다.

use crate::bundle::Bundle;
use splice_core::filter::{by_code, by_display_name, by_props, by_store_name, custom};
use splice_core::{
    DisableOutcome, EnableOutcome, ExportPath, Filter, FindOptions, Found, ModuleId,
    PluginCatalogue, SpliceRuntime,
};
use splice_foundation::{FileBridge, NativeBridge, RuntimeConfig};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Runtime 구성
// ============================================================================

/// 런타임 구성 옵션
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub settings_dir: Option<PathBuf>,
    pub plugins_dir: Option<PathBuf>,
}

/// 기본 플러그인 디렉토리 (`<config_dir>/splice/plugins`)
pub fn default_plugins_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("splice").join("plugins"))
}

/// 설정 파일 + 플러그인 매니페스트로 런타임 부트스트랩
pub fn build_runtime(options: &RuntimeOptions) -> anyhow::Result<SpliceRuntime> {
    let mut config = RuntimeConfig::load()?;
    if let Some(dir) = &options.settings_dir {
        config.settings_dir = Some(dir.clone());
    }

    let bridge: Arc<dyn NativeBridge> = match &config.settings_dir {
        Some(dir) => Arc::new(FileBridge::new(dir.clone())),
        None => Arc::new(FileBridge::global()?),
    };

    let mut catalogue = PluginCatalogue::new();
    let plugins_dir = options.plugins_dir.clone().or_else(default_plugins_dir);
    if let Some(dir) = plugins_dir.filter(|d| d.is_dir()) {
        let count = catalogue.load_dir(&dir)?;
        debug!("Loaded {} plugin manifests from {}", count, dir.display());
    }

    Ok(SpliceRuntime::bootstrap(config, bridge, catalogue)?)
}

/// 번들을 로드하고 모든 시작 단계를 진행
pub fn boot_bundle(runtime: &SpliceRuntime, bundle_path: &Path) -> anyhow::Result<()> {
    let bundle = Bundle::load(bundle_path)?;
    let stats = bundle.load_into(runtime);
    if !stats.failed.is_empty() {
        warn!(failed = ?stats.failed, "Some modules failed to load");
    }
    runtime.modules_ready();
    runtime.dom_ready();
    Ok(())
}

// ============================================================================
// report
// ============================================================================

/// 패치 리포트
pub fn report(runtime: &SpliceRuntime, json: bool) -> anyhow::Result<String> {
    let report = runtime.engine().report();
    if json {
        return Ok(serde_json::to_string_pretty(&report)?);
    }

    let mut out = String::new();
    writeln!(
        out,
        "Modules: {} scanned, {} patched ({} pattern evaluations)",
        report.modules_scanned, report.modules_patched, report.pattern_evaluations
    )?;
    writeln!(out, "Patches: {}", report.patches.len())?;
    for patch in &report.patches {
        let mark = if patch.is_unmatched() { "✗" } else { "✓" };
        writeln!(
            out,
            "  {} [{}] {} (hits {}, applied {}, failures {})",
            mark, patch.owner, patch.find, patch.token_hits, patch.applied, patch.failures
        )?;
    }

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        writeln!(out, "Failures: {}", failures.len())?;
        for diagnostic in failures {
            writeln!(
                out,
                "  module {} [{}] {}: {:?}",
                diagnostic.module_id, diagnostic.owner, diagnostic.find, diagnostic.kind
            )?;
        }
    }
    Ok(out)
}

// ============================================================================
// patch
// ============================================================================

/// 모듈의 패치된 소스 (패치가 없으면 원본)
pub fn patched_source(runtime: &SpliceRuntime, module_id: &str) -> anyhow::Result<String> {
    let id = ModuleId::from(module_id);
    let record = runtime
        .registry()
        .get(&id)
        .ok_or_else(|| anyhow::anyhow!("Module not found: {}", id))?;

    if !record.patched_by.is_empty() {
        info!(module = %id, patched_by = ?record.patched_by, "Module was patched");
    }
    Ok(record
        .patched_source
        .unwrap_or_else(|| record.raw_source.to_string()))
}

// ============================================================================
// find
// ============================================================================

/// 검색 조건
#[derive(Debug, Clone, Default)]
pub struct FindArgs {
    pub props: Vec<String>,
    pub code: Vec<String>,
    pub display_name: Option<String>,
    pub store: Option<String>,
    pub all: bool,
}

impl FindArgs {
    /// 지정된 조건을 모두 만족하는 필터
    pub fn to_filter(&self) -> anyhow::Result<Filter> {
        let mut filters = Vec::new();
        if !self.props.is_empty() {
            filters.push(by_props(self.props.as_slice()));
        }
        if !self.code.is_empty() {
            filters.push(by_code(self.code.as_slice()));
        }
        if let Some(name) = &self.display_name {
            filters.push(by_display_name(name.clone()));
        }
        if let Some(name) = &self.store {
            filters.push(by_store_name(name.clone()));
        }

        match filters.len() {
            0 => anyhow::bail!("At least one of --props, --code, --display-name, --store is required"),
            1 => Ok(filters.remove(0)),
            _ => {
                let description = filters
                    .iter()
                    .map(|f| f.description().to_string())
                    .collect::<Vec<_>>()
                    .join(" && ");
                Ok(custom(description, move |value| filters.iter().all(|f| f.matches(value))))
            }
        }
    }
}

fn describe(found: &Found) -> anyhow::Result<String> {
    let path = match &found.path {
        ExportPath::Root => String::new(),
        ExportPath::Default => ".default".to_string(),
        ExportPath::Member(key) => format!(".{}", key),
    };
    Ok(format!(
        "module {}{}: {}",
        found.module_id,
        path,
        serde_json::to_string(&found.value().to_json())?
    ))
}

/// 로드된 모듈에서 검색
pub fn find(runtime: &SpliceRuntime, args: &FindArgs) -> anyhow::Result<String> {
    let filter = args.to_filter()?;
    let query = runtime.query();

    let results = if args.all {
        query.find_all(&filter, FindOptions::default())
    } else {
        query.find(&filter, FindOptions::default()).into_iter().collect()
    };

    if results.is_empty() {
        warn!(filter = filter.description(), "No module matched");
        return Ok(format!("No module matched {}", filter.description()));
    }

    let lines = results.iter().map(describe).collect::<anyhow::Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

// ============================================================================
// plugins
// ============================================================================

/// 플러그인 목록
pub fn plugins_list(runtime: &SpliceRuntime, json: bool) -> anyhow::Result<String> {
    let statuses = runtime.plugins().statuses();
    if json {
        return Ok(serde_json::to_string_pretty(&statuses)?);
    }
    if statuses.is_empty() {
        return Ok("No plugins installed.".to_string());
    }

    let mut out = String::new();
    writeln!(out, "{:<24} {:<8} {:<8} {:<8} {:<8}", "Name", "Enabled", "Required", "Patches", "Start")?;
    writeln!(out, "{}", "-".repeat(60))?;
    for status in statuses {
        let flag = |b: bool| if b { "yes" } else { "no" };
        let enabled = if status.is_dependency && status.enabled {
            "dep"
        } else {
            flag(status.enabled)
        };
        writeln!(
            out,
            "{:<24} {:<8} {:<8} {:<8} {:?}",
            status.name,
            enabled,
            flag(status.required),
            status.patches,
            status.start_at
        )?;
    }
    Ok(out)
}

/// 플러그인 활성화 후 설정 저장
pub async fn plugins_enable(runtime: &SpliceRuntime, name: &str) -> anyhow::Result<String> {
    let outcome = runtime.plugins().enable_plugin(name)?;
    runtime.flush().await;

    Ok(match outcome {
        EnableOutcome::Started => format!("Enabled {}", name),
        EnableOutcome::AlreadyRunning => format!("{} is already running", name),
        EnableOutcome::RestartNeeded => format!("Enabled {}, restart needed to apply patches", name),
        EnableOutcome::Failed => format!("Enabled {}, but its start hook failed", name),
        EnableOutcome::DependencyFailures(failures) => {
            format!("Enabled {}, but dependencies failed to start: {}", name, failures.join(", "))
        }
    })
}

/// 플러그인 비활성화 후 설정 저장
pub async fn plugins_disable(runtime: &SpliceRuntime, name: &str) -> anyhow::Result<String> {
    let outcome = runtime.plugins().disable_plugin(name)?;
    runtime.flush().await;

    Ok(match outcome {
        DisableOutcome::Stopped => format!("Disabled {}", name),
        DisableOutcome::RestartNeeded => format!("Disabled {}, restart needed to remove patches", name),
        DisableOutcome::Failed => format!("Disabled {}, but its stop hook failed", name),
        DisableOutcome::HasDependents(dependents) => {
            format!("Cannot disable {}: required by {}", name, dependents.join(", "))
        }
    })
}
