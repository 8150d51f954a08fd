//! LLM-facing tool wrappers around the browser executors.
//!
//! Each wrapper validates argument shape, delegates to `BrowserTools`, and
//! returns the executor's status string as the tool result. Action failures
//! come back as `Ok` prose; `Err` means the arguments themselves were
//! malformed.

use async_trait::async_trait;
use friday_core::{Error, Result};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{Tool, ToolContext, ToolSchema};

use super::actions::BrowserTools;

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Tool(format!("missing required parameter '{}'", key)))
}

/// Target URLs must parse and be fetchable over HTTP(S); anything else is a
/// malformed argument, not an action failure.
fn required_url(params: &Value, key: &str) -> Result<()> {
    let raw = required_str(params, key)?;
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::Tool(format!("invalid url '{}': {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::Tool(format!(
            "unsupported url scheme '{}' in '{}'",
            scheme, raw
        ))),
    }
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

pub struct BrowseUrlTool {
    pub tools: Arc<BrowserTools>,
}

#[async_trait]
impl Tool for BrowseUrlTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browse_url",
            description: "Open a URL in the managed browser and return the page content as \
                          markdown. Reuses the existing browser session when one is active.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Full URL to open, including scheme"}
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_url(params, "url")
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let url = required_str(&params, "url")?;
        Ok(Value::String(self.tools.browse_url(url).await))
    }
}

pub struct FindInteractiveElementsTool {
    pub tools: Arc<BrowserTools>,
}

#[async_trait]
impl Tool for FindInteractiveElementsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "find_interactive_elements",
            description: "List the interactive elements (links, buttons, inputs, selects) on a \
                          page with XPath locators usable by the click and type tools. Locators \
                          go stale when the page changes; call this again after navigation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Page to scan"},
                    "keywords": {
                        "type": "string",
                        "description": "Optional case-insensitive filter matched against \
                                        element text and attributes"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_url(params, "url")
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let url = required_str(&params, "url")?;
        let keywords = optional_str(&params, "keywords");
        Ok(Value::String(self.tools.find_elements(url, keywords).await))
    }
}

pub struct ClickElementTool {
    pub tools: Arc<BrowserTools>,
}

#[async_trait]
impl Tool for ClickElementTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "click_element_by_id",
            description: "Click an element identified by an XPath locator from \
                          find_interactive_elements.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Page the element lives on"},
                    "element_id": {
                        "type": "string",
                        "description": "XPath locator of the element to click"
                    }
                },
                "required": ["url", "element_id"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_url(params, "url")?;
        required_str(params, "element_id").map(|_| ())
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let url = required_str(&params, "url")?;
        let element_id = required_str(&params, "element_id")?;
        Ok(Value::String(self.tools.click_element(url, element_id).await))
    }
}

pub struct TypeIntoElementTool {
    pub tools: Arc<BrowserTools>,
}

#[async_trait]
impl Tool for TypeIntoElementTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "type_into_element_by_id",
            description: "Type text into an input element identified by an XPath locator from \
                          find_interactive_elements. Clears the field first.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Page the element lives on"},
                    "element_id": {
                        "type": "string",
                        "description": "XPath locator of the input element"
                    },
                    "text_to_type": {"type": "string", "description": "Text to enter"}
                },
                "required": ["url", "element_id", "text_to_type"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_url(params, "url")?;
        required_str(params, "element_id")?;
        // Empty text is allowed: typing "" clears the field.
        params
            .get("text_to_type")
            .and_then(|v| v.as_str())
            .map(|_| ())
            .ok_or_else(|| Error::Tool("missing required parameter 'text_to_type'".to_string()))
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let url = required_str(&params, "url")?;
        let element_id = required_str(&params, "element_id")?;
        let text = params
            .get("text_to_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Tool("missing required parameter 'text_to_type'".to_string()))?;
        Ok(Value::String(
            self.tools.type_into_element(url, element_id, text).await,
        ))
    }
}

pub struct ScrollPageTool {
    pub tools: Arc<BrowserTools>,
}

#[async_trait]
impl Tool for ScrollPageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "scroll_page_at_url",
            description: "Scroll the page up, down, or jump to the top or bottom.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Page to scroll"},
                    "direction": {
                        "type": "string",
                        "enum": ["up", "down", "top", "bottom"],
                        "description": "Scroll direction"
                    }
                },
                "required": ["url", "direction"]
            }),
        }
    }

    // Direction VALUE is deliberately not validated here: an unknown
    // direction comes back as a prose correction the model can act on.
    fn validate(&self, params: &Value) -> Result<()> {
        required_url(params, "url")?;
        required_str(params, "direction").map(|_| ())
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let url = required_str(&params, "url")?;
        let direction = required_str(&params, "direction")?;
        Ok(Value::String(self.tools.scroll_page(url, direction).await))
    }
}

pub struct SignInTool {
    pub tools: Arc<BrowserTools>,
}

#[async_trait]
impl Tool for SignInTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "sign_in_to_website",
            description: "Fill a login form and submit it: types the username and password into \
                          the given fields, clicks the submit element, waits for the page to \
                          settle, and reports where the browser landed.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Login page URL"},
                    "username_element_id": {
                        "type": "string",
                        "description": "XPath locator of the username field"
                    },
                    "password_element_id": {
                        "type": "string",
                        "description": "XPath locator of the password field"
                    },
                    "submit_element_id": {
                        "type": "string",
                        "description": "XPath locator of the submit button"
                    },
                    "username": {"type": "string", "description": "Account name to type"},
                    "password": {"type": "string", "description": "Password to type"}
                },
                "required": ["url", "username_element_id", "password_element_id",
                             "submit_element_id", "username", "password"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_url(params, "url")?;
        for key in [
            "username_element_id",
            "password_element_id",
            "submit_element_id",
            "username",
            "password",
        ] {
            required_str(params, key)?;
        }
        Ok(())
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let url = required_str(&params, "url")?;
        let username_id = required_str(&params, "username_element_id")?;
        let password_id = required_str(&params, "password_element_id")?;
        let submit_id = required_str(&params, "submit_element_id")?;
        let username = required_str(&params, "username")?;
        let password = required_str(&params, "password")?;
        Ok(Value::String(
            self.tools
                .sign_in(url, username_id, password_id, submit_id, username, password)
                .await,
        ))
    }
}

pub struct AnalyzeViewTool {
    pub tools: Arc<BrowserTools>,
}

#[async_trait]
impl Tool for AnalyzeViewTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "analyze_current_view_with_gemini",
            description: "Capture what the browser currently shows and ask the vision model a \
                          question about it. Requires an active browser session.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Question to ask about the current view"
                    }
                },
                "required": ["prompt"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "prompt").map(|_| ())
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let prompt = required_str(&params, "prompt")?;
        Ok(Value::String(self.tools.analyze_view(prompt).await))
    }
}

pub struct CloseBrowserTool {
    pub tools: Arc<BrowserTools>,
}

#[async_trait]
impl Tool for CloseBrowserTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "close_browser_session",
            description: "Shut down the managed browser session and release its resources. \
                          Safe to call when no session is active.",
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, _ctx: ToolContext, _params: Value) -> Result<Value> {
        Ok(Value::String(self.tools.close().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::artifact::ScreenshotSlot;
    use crate::browser::session::tests::{MockDriver, MockFactory};
    use friday_core::config::BrowserConfig;
    use friday_core::Config;
    use serde_json::json;

    fn test_tools() -> (tempfile::TempDir, Arc<BrowserTools>) {
        let dir = tempfile::tempdir().unwrap();
        let driver = MockDriver::new();
        *driver.eval_result.lock().unwrap() = json!("<html><body>ok</body></html>");
        let tools = Arc::new(BrowserTools::new(
            Box::new(MockFactory::new(driver)),
            ScreenshotSlot::new(dir.path().join("action_screenshot.jpeg")),
            dir.path().join("vision_analysis_view.jpeg"),
            None,
            BrowserConfig {
                settle_ms: 0,
                scroll_settle_ms: 0,
                sign_in_settle_ms: 0,
                ..Default::default()
            },
        ));
        (dir, tools)
    }

    fn ctx(dir: &tempfile::TempDir) -> ToolContext {
        ToolContext {
            workspace: dir.path().to_path_buf(),
            config: Config::default(),
        }
    }

    #[tokio::test]
    async fn test_browse_url_requires_url() {
        let (dir, tools) = test_tools();
        let tool = BrowseUrlTool { tools };

        assert!(tool.validate(&json!({})).is_err());
        assert!(tool.validate(&json!({"url": ""})).is_err());
        assert!(tool.validate(&json!({"url": "not a url"})).is_err());
        assert!(tool.validate(&json!({"url": "file:///etc/passwd"})).is_err());
        assert!(tool.validate(&json!({"url": "https://example.com"})).is_ok());

        let out = tool
            .execute(ctx(&dir), json!({"url": "https://example.com"}))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().starts_with("Successfully browsed to"));
    }

    #[tokio::test]
    async fn test_scroll_direction_value_is_prose_not_err() {
        let (dir, tools) = test_tools();
        let tool = ScrollPageTool { tools };

        // Shape is valid even though the value is not a known direction.
        assert!(tool
            .validate(&json!({"url": "https://example.com", "direction": "sideways"}))
            .is_ok());

        let out = tool
            .execute(
                ctx(&dir),
                json!({"url": "https://example.com", "direction": "sideways"}),
            )
            .await
            .unwrap();
        assert_eq!(
            out.as_str().unwrap(),
            "Error: Invalid scroll direction 'sideways'. Use 'up', 'down', 'top', or 'bottom'."
        );
    }

    #[tokio::test]
    async fn test_type_tool_allows_empty_text() {
        let (_dir, tools) = test_tools();
        let tool = TypeIntoElementTool { tools };

        assert!(tool
            .validate(&json!({
                "url": "https://example.com",
                "element_id": "body/input[1]",
                "text_to_type": ""
            }))
            .is_ok());
        assert!(tool
            .validate(&json!({
                "url": "https://example.com",
                "element_id": "body/input[1]"
            }))
            .is_err());
    }

    #[tokio::test]
    async fn test_sign_in_requires_all_locators() {
        let (_dir, tools) = test_tools();
        let tool = SignInTool { tools };

        assert!(tool
            .validate(&json!({
                "url": "https://example.com/login",
                "username_element_id": "id(\"u\")",
                "password_element_id": "id(\"p\")",
                "username": "alice",
                "password": "x"
            }))
            .is_err());
    }

    #[tokio::test]
    async fn test_close_tool_without_session() {
        let (dir, tools) = test_tools();
        let tool = CloseBrowserTool { tools };

        let out = tool.execute(ctx(&dir), json!({})).await.unwrap();
        assert_eq!(out.as_str().unwrap(), "No active browser session to close.");
    }

    #[test]
    fn test_schema_names_are_stable() {
        let (_dir, tools) = test_tools();
        let names = [
            BrowseUrlTool { tools: tools.clone() }.schema().name,
            FindInteractiveElementsTool { tools: tools.clone() }.schema().name,
            ClickElementTool { tools: tools.clone() }.schema().name,
            TypeIntoElementTool { tools: tools.clone() }.schema().name,
            ScrollPageTool { tools: tools.clone() }.schema().name,
            SignInTool { tools: tools.clone() }.schema().name,
            AnalyzeViewTool { tools: tools.clone() }.schema().name,
            CloseBrowserTool { tools }.schema().name,
        ];
        assert_eq!(
            names,
            [
                "browse_url",
                "find_interactive_elements",
                "click_element_by_id",
                "type_into_element_by_id",
                "scroll_page_at_url",
                "sign_in_to_website",
                "analyze_current_view_with_gemini",
                "close_browser_session",
            ]
        );
    }
}
