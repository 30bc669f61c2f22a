//! Storage module for Splice
//!
//! - `json`: JSON - 런타임 설정 파일 저장/로드

mod json;

pub use json::JsonStore;
