//! Filter - 모듈 검색 엔진
//!
//! - `filters`: export 술어 (byProps, byCode, byDisplayName, byStoreName)
//! - `query`: 로드된 모듈 검색, 대기, 원본 소스 검색

pub mod filters;
mod query;

pub use filters::{by_code, by_display_name, by_props, by_store_name, custom, CodePattern, Filter};
pub use query::{ExportPath, FindOptions, Found, LazyFound, ModuleQuery, WaitStatus};
