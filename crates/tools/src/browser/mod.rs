//! Stateful browser automation: one managed engine per process, prose-first
//! tool results, and a single-slot screenshot hand-off to the transport.

pub mod actions;
pub mod artifact;
pub mod cdp;
pub mod driver;
pub mod locator;
pub mod session;
pub mod tool;

pub use actions::BrowserTools;
pub use artifact::{produces_screenshot, screenshot_message, ScreenshotSlot};
pub use driver::{ChromeLauncher, DriverFactory, PageDriver};
pub use session::BrowserSession;
pub use tool::{
    AnalyzeViewTool, BrowseUrlTool, ClickElementTool, CloseBrowserTool,
    FindInteractiveElementsTool, ScrollPageTool, SignInTool, TypeIntoElementTool,
};
