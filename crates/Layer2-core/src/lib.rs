//! splice-core: Core Runtime for Splice
//!
//! Layer2 - 모듈 가로채기 및 라이브 패치 런타임
//!
//! # 주요 모듈
//!
//! - `module`: 모듈 레지스트리 (정의, 평가, 로드 리스너, 가로채기)
//! - `filter`: 모듈 검색 (byProps, byCode, find, waitFor ...)
//! - `patch`: 평가 전 소스 재작성 엔진
//! - `plugin`: 플러그인 카탈로그 및 라이프사이클
//! - `settings`: 반응형 설정 저장소
//! - `runtime`: 위 구성요소를 묶는 서비스 객체
//!
//! # 사용 예시
//!
//! ```ignore
//! use splice_core::{PluginCatalogue, PluginDefinition, PatchDescriptor, SpliceRuntime};
//!
//! let mut catalogue = PluginCatalogue::new();
//! catalogue.add(
//!     PluginDefinition::new("Greeter")
//!         .enabled_by_default()
//!         .patch(PatchDescriptor::new("helloWorld").replace(r"helloWorld\(\)", "helloWorld(42)")?),
//! )?;
//!
//! let runtime = SpliceRuntime::bootstrap(config, bridge, catalogue)?;
//!
//! // 호스트 모듈 로드 (패치 적용 후 평가)
//! let exports = runtime.load_module("42", source, &evaluator)?;
//!
//! runtime.modules_ready();
//! runtime.dom_ready();
//! ```

mod isolate;

pub mod filter;
pub mod module;
pub mod patch;
pub mod plugin;
pub mod runtime;
pub mod settings;

// Re-exports: Module
pub use module::{
    DeclaredExports, ExportValue, ModuleEvaluator, ModuleId, ModuleRecord, ModuleRegistry,
    SourceTransform, Visit,
};

// Re-exports: Filter
pub use filter::{
    by_code, by_display_name, by_props, by_store_name, CodePattern, ExportPath, Filter,
    FindOptions, Found, ModuleQuery, WaitStatus,
};

// Re-exports: Patch
pub use patch::{
    FindToken, MatchPattern, PatchDescriptor, PatchEngine, PatchEngineConfig, PatchOutcome,
    PatchReport, PatchStatus, Replacement,
};

// Re-exports: Plugin
pub use plugin::{
    DisableOutcome, EnableOutcome, PluginCatalogue, PluginContext, PluginDefinition,
    PluginManager, PluginManifest, StartAt,
};

// Re-exports: Settings
pub use settings::{default_settings, PluginSettings, SettingsStore};

// Re-exports: Runtime
pub use runtime::SpliceRuntime;

// Re-exports from foundation
pub use splice_foundation::{Error, NativeBridge, Result, RuntimeConfig};
