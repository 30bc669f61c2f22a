//! 실패 격리 헬퍼
//!
//! 플러그인 훅, 치환 함수, 리스너는 외부 코드입니다. 에러와 panic 모두
//! `anyhow::Error`로 변환해 호출 지점에서 로그만 남기고 계속 진행합니다.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// 클로저 실행 - panic은 에러로 변환
pub(crate) fn isolate<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// 술어 실행 - panic은 메시지로 변환
pub(crate) fn isolate_predicate<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
