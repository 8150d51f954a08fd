pub mod browser;
pub mod html_to_md;
pub mod registry;

use async_trait::async_trait;
use friday_core::{Config, Result};
use serde_json::Value;
use std::path::PathBuf;

pub use registry::ToolRegistry;

/// Truncate a string to at most `max_chars` bytes, respecting UTF-8 char
/// boundaries. Returns a borrowed slice if no truncation needed.
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    if s.len() <= max_chars {
        return s;
    }
    let mut end = max_chars;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Per-call context handed to every tool.
#[derive(Clone)]
pub struct ToolContext {
    pub workspace: PathBuf,
    pub config: Config,
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// One LLM-callable tool. `execute` returns success-shaped values only:
/// browser action failures are rendered to prose inside the result so the
/// calling model can read them; `Err` is reserved for malformed arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    fn validate(&self, params: &Value) -> Result<()>;
    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_boundary() {
        let s = "héllo wörld";
        let t = safe_truncate(s, 3);
        assert!(t.len() <= 3);
        assert!(s.starts_with(t));
    }

    #[test]
    fn test_safe_truncate_noop() {
        assert_eq!(safe_truncate("abc", 10), "abc");
    }
}
