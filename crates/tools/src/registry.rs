use std::collections::HashMap;
use std::sync::Arc;

use friday_core::{Config, Paths};
use friday_providers::{GeminiVision, VisionProvider};
use serde_json::{json, Value};
use tracing::debug;

use crate::browser::artifact::ScreenshotSlot;
use crate::browser::driver::ChromeLauncher;
use crate::browser::{
    AnalyzeViewTool, BrowseUrlTool, BrowserTools, ClickElementTool, CloseBrowserTool,
    FindInteractiveElementsTool, ScrollPageTool, SignInTool, TypeIntoElementTool,
};
use crate::Tool;

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Build the registry with the full browser tool set wired to one shared
    /// session, slot, and vision bridge.
    pub fn with_defaults(config: &Config, paths: &Paths) -> Self {
        let mut registry = Self::new();

        let vision: Option<Arc<dyn VisionProvider>> = if config.gemini.api_key.is_empty() {
            None
        } else {
            Some(Arc::new(GeminiVision::new(&config.gemini)))
        };

        let browser = Arc::new(BrowserTools::new(
            Box::new(ChromeLauncher::new(config.browser.clone())),
            ScreenshotSlot::new(paths.action_screenshot()),
            paths.vision_screenshot(),
            vision,
            config.browser.clone(),
        ));

        registry.register_browser_tools(browser);
        registry
    }

    /// Register the browser tool set against an already-built `BrowserTools`.
    /// Used by tests to swap in a mock engine.
    pub fn register_browser_tools(&mut self, browser: Arc<BrowserTools>) {
        self.register(Arc::new(BrowseUrlTool {
            tools: browser.clone(),
        }));
        self.register(Arc::new(FindInteractiveElementsTool {
            tools: browser.clone(),
        }));
        self.register(Arc::new(ClickElementTool {
            tools: browser.clone(),
        }));
        self.register(Arc::new(TypeIntoElementTool {
            tools: browser.clone(),
        }));
        self.register(Arc::new(ScrollPageTool {
            tools: browser.clone(),
        }));
        self.register(Arc::new(SignInTool {
            tools: browser.clone(),
        }));
        self.register(Arc::new(AnalyzeViewTool {
            tools: browser.clone(),
        }));
        self.register(Arc::new(CloseBrowserTool { tools: browser }));
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Schemas in the function-calling shape the orchestration layer sends
    /// to the model.
    pub fn get_tool_schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "type": "function",
                    "function": {
                        "name": schema.name,
                        "description": schema.description,
                        "parameters": schema.parameters
                    }
                })
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
