//! Stream path identity

use std::fmt;

/// `/<app>/<stream name>` as requested by a publisher
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamPath {
    /// Application name (e.g., "live")
    pub app: String,
    /// Stream name without query string
    pub name: String,
}

impl StreamPath {
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
        }
    }

    /// Path a publisher must use when a stream key is enforced
    pub fn expected(stream_key: &str) -> Self {
        Self::new("live", stream_key)
    }
}

impl fmt::Display for StreamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.app, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(StreamPath::new("live", "abc").to_string(), "/live/abc");
        assert_eq!(StreamPath::expected("cam-7").to_string(), "/live/cam-7");
    }

    #[test]
    fn test_equality_is_exact() {
        assert_eq!(StreamPath::new("live", "abc"), StreamPath::expected("abc"));
        assert_ne!(StreamPath::new("live", "ABC"), StreamPath::expected("abc"));
        assert_ne!(StreamPath::new("app", "abc"), StreamPath::expected("abc"));
    }
}
