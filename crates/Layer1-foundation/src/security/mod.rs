//! Security - 외부 URL 허용 정책
//!
//! 플러그인 훅이 셸에 외부 URL 열기를 요청할 때 scheme allow-list를 검사합니다.

use crate::{Error, Result};
use url::Url;

/// 기본 허용 scheme
pub const DEFAULT_ALLOWED_SCHEMES: &[&str] = &[
    "http",
    "https",
    "steam",
    "spotify",
    "com.epicgames.launcher",
    "tidal",
    "itunes",
];

/// 외부 URL 정책
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    allowed_schemes: Vec<String>,
}

impl UrlPolicy {
    pub fn new(allowed_schemes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_schemes: allowed_schemes
                .into_iter()
                .map(|s| s.into().trim_end_matches(':').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn allowed_schemes(&self) -> &[String] {
        &self.allowed_schemes
    }

    /// URL 파싱 및 scheme 검사
    pub fn check(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw).map_err(|e| Error::InvalidInput(format!("{}: {}", raw, e)))?;
        if self.allowed_schemes.iter().any(|s| s == url.scheme()) {
            Ok(url)
        } else {
            Err(Error::UrlNotAllowed(raw.to_string()))
        }
    }
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_SCHEMES.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = UrlPolicy::default();

        assert!(policy.check("https://example.com/page").is_ok());
        assert!(policy.check("steam://run/440").is_ok());
        assert!(matches!(
            policy.check("file:///etc/passwd"),
            Err(Error::UrlNotAllowed(_))
        ));
        assert!(matches!(
            policy.check("javascript:alert(1)"),
            Err(Error::UrlNotAllowed(_))
        ));
    }

    #[test]
    fn test_invalid_url() {
        let policy = UrlPolicy::default();
        assert!(matches!(policy.check("not a url"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_custom_schemes_are_normalized() {
        let policy = UrlPolicy::new(["HTTPS:", "mailto"]);
        assert_eq!(policy.allowed_schemes(), &["https".to_string(), "mailto".to_string()]);
        assert!(policy.check("mailto:someone@example.com").is_ok());
        assert!(policy.check("http://example.com").is_err());
    }
}
