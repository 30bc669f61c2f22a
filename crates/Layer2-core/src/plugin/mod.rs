//! # Plugin System
//!
//! 토글 가능한 플러그인의 카탈로그와 라이프사이클
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginManager                           │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │                   PluginCatalogue                      │ │
//! │  │  ┌────────────┬────────────┬────────────────────┐     │ │
//! │  │  │ Plugin A   │ Plugin B   │ Plugin C           │     │ │
//! │  │  │ (native)   │ (native)   │ (JSON manifest)    │     │ │
//! │  │  └────────────┴────────────┴────────────────────┘     │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! │        │ patches                 │ start / stop             │
//! │        ▼                         ▼                          │
//! │   PatchEngine              PluginContext                    │
//! │                            - PluginSettings                 │
//! │                            - ModuleQuery                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! let plugin = PluginDefinition::new("NoTrack")
//!     .description("Disable analytics")
//!     .patch(PatchDescriptor::new(".track(").replace(r"(\i)\.track\(", "void 0&&$1.track(")?)
//!     .on_start(|ctx| {
//!         ctx.query().wait_for(by_props(&["track"]), |found| { /* ... */ });
//!         Ok(())
//!     });
//!
//! let mut catalogue = PluginCatalogue::new();
//! catalogue.add(plugin)?;
//! ```

mod definition;
mod manager;
mod manifest;
mod registry;

pub use definition::{HookFn, PluginContext, PluginDefinition};
pub use manager::{
    enabled_path, DependencyStart, DisableOutcome, EnableOutcome, InitSummary, PluginManager,
    PluginState, PluginStatus, StartSummary,
};
pub use manifest::{
    OneOrMany, OptionDef, OptionType, PatchManifest, PluginAuthor, PluginManifest,
    ReplacementManifest, SelectOption, StartAt,
};
pub use registry::PluginCatalogue;
