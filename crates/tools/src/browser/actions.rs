//! Browser action executors.
//!
//! Every executor speaks prose: the calling model only ever sees a status
//! string, success or failure. Internally failures are a tagged
//! `ActionError` so the session/locator layers stay testable; rendering to
//! text happens here, at the boundary, with the URL and locator context the
//! model needs to recover.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use friday_core::config::BrowserConfig;
use friday_providers::VisionProvider;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::html_to_md::html_to_markdown;
use crate::safe_truncate;

use super::artifact::ScreenshotSlot;
use super::driver::{DriverError, DriverFactory};
use super::locator::{
    build_descriptors, click_script, parse_resolve_payload, parse_scan_payload, type_script,
    SCAN_SCRIPT,
};
use super::session::BrowserSession;

const PAGE_PREVIEW_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum ActionError {
    /// No engine could be started. Fatal for this call, never retried.
    #[error("{0}")]
    Provisioning(String),

    /// A page load exceeded its bound. The tracked position is dropped.
    #[error("{0}")]
    NavigationTimeout(String),

    /// A locator did not resolve against the current DOM.
    #[error("no element matches {locator}")]
    ElementNotFound { locator: String },

    /// The element was found but the interaction did not settle in time.
    #[error("{0}")]
    ActionTimeout(String),

    /// Rejected before touching the engine.
    #[error("{0}")]
    InvalidInput(String),

    /// Catch-all; the engine's message is passed through.
    #[error("{0}")]
    Engine(String),
}

/// Errors from `ensure_at`: a driver timeout here is a page-load timeout.
fn nav_err(e: DriverError) -> ActionError {
    match e {
        DriverError::Provision(m) => ActionError::Provisioning(m),
        DriverError::Timeout(m) => ActionError::NavigationTimeout(m),
        DriverError::Engine(m) => ActionError::Engine(m),
    }
}

/// Errors from an in-page interaction: a driver timeout here means the
/// element stalled, not the page load.
fn act_err(e: DriverError) -> ActionError {
    match e {
        DriverError::Provision(m) => ActionError::Provisioning(m),
        DriverError::Timeout(m) => ActionError::ActionTimeout(m),
        DriverError::Engine(m) => ActionError::Engine(m),
    }
}

/// Shared state behind all browser tools: one session, one screenshot slot,
/// the vision bridge. Tool structs hold this behind an `Arc` so every tool
/// call in a conversation drives the same engine.
///
/// Built for one logical caller issuing one tool call at a time. The session
/// mutex keeps interleaved calls from corrupting engine state, but the
/// screenshot slot is last-write-wins, so concurrent conversations sharing
/// one instance would mix up their captures.
pub struct BrowserTools {
    session: Mutex<BrowserSession>,
    slot: ScreenshotSlot,
    vision_slot: PathBuf,
    vision: Option<Arc<dyn VisionProvider>>,
    config: BrowserConfig,
}

impl BrowserTools {
    pub fn new(
        factory: Box<dyn DriverFactory>,
        slot: ScreenshotSlot,
        vision_slot: PathBuf,
        vision: Option<Arc<dyn VisionProvider>>,
        config: BrowserConfig,
    ) -> Self {
        Self {
            session: Mutex::new(BrowserSession::new(factory)),
            slot,
            vision_slot,
            vision,
            config,
        }
    }

    pub fn slot(&self) -> &ScreenshotSlot {
        &self.slot
    }

    async fn settle(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Best-effort capture into the hand-off slot. Capture failures are
    /// logged, never surfaced; the status text is the primary channel.
    async fn capture(&self, session: &BrowserSession) {
        let Some(driver) = session.driver() else {
            return;
        };
        match driver.screenshot_jpeg().await {
            Ok(jpeg) => {
                if let Err(e) = self.slot.store(&jpeg) {
                    warn!(error = %e, "Failed to store action screenshot");
                }
            }
            Err(e) => warn!(error = %e, "Failed to capture action screenshot"),
        }
    }

    /// Drop the tracked position after a failure, unless the failure was an
    /// interaction timeout. A stalled click may still be on the page it
    /// started on; a failed or timed-out load leaves the engine somewhere
    /// unknown.
    fn apply_failure_policy(session: &mut BrowserSession, err: &ActionError) {
        if !matches!(err, ActionError::ActionTimeout(_)) {
            session.invalidate();
        }
    }

    // ─── browse ───────────────────────────────────────────────────────

    pub async fn browse_url(&self, url: &str) -> String {
        let mut session = self.session.lock().await;
        match self.try_browse(&mut session, url).await {
            Ok(text) => text,
            Err(e) => {
                Self::apply_failure_policy(&mut session, &e);
                format!("Error browsing {}: {}", url, e)
            }
        }
    }

    async fn try_browse(
        &self,
        session: &mut BrowserSession,
        url: &str,
    ) -> Result<String, ActionError> {
        session.ensure_at(url).await.map_err(nav_err)?;
        self.settle(self.config.settle_ms).await;

        let driver = session.driver().ok_or_else(|| {
            ActionError::Engine("engine disappeared mid-call".to_string())
        })?;
        let html = driver
            .eval("document.documentElement.outerHTML")
            .await
            .map_err(act_err)?;
        let html = html.as_str().unwrap_or_default();
        let markdown = html_to_markdown(html);
        let landed = driver.current_url().await.map_err(act_err)?;
        session.note_position(&landed);

        self.capture(session).await;
        info!(url = %landed, chars = markdown.len(), "Browsed page");

        Ok(format!(
            "Successfully browsed to {}. Page content (markdown):\n{}... (truncated if long)",
            landed,
            safe_truncate(&markdown, PAGE_PREVIEW_CHARS)
        ))
    }

    // ─── find ─────────────────────────────────────────────────────────

    pub async fn find_elements(&self, url: &str, keywords: Option<&str>) -> String {
        let mut session = self.session.lock().await;
        match self.try_find(&mut session, url, keywords).await {
            Ok(text) => text,
            Err(e) => {
                Self::apply_failure_policy(&mut session, &e);
                format!("Error finding interactive elements on {}: {}", url, e)
            }
        }
    }

    async fn try_find(
        &self,
        session: &mut BrowserSession,
        url: &str,
        keywords: Option<&str>,
    ) -> Result<String, ActionError> {
        session.ensure_at(url).await.map_err(nav_err)?;

        let driver = session.driver().ok_or_else(|| {
            ActionError::Engine("engine disappeared mid-call".to_string())
        })?;
        let payload = driver.eval(SCAN_SCRIPT).await.map_err(act_err)?;
        let raws = parse_scan_payload(&payload).map_err(ActionError::Engine)?;
        let descriptors = build_descriptors(&raws, keywords);

        if descriptors.is_empty() {
            let at = driver.current_url().await.map_err(act_err)?;
            return Ok(match keywords {
                Some(kw) => format!(
                    "No interactive elements found on {} matching keywords: '{}'.",
                    at, kw
                ),
                None => format!("No interactive elements found on {}.", at),
            });
        }

        info!(count = descriptors.len(), "Scanned interactive elements");
        serde_json::to_string_pretty(&descriptors)
            .map_err(|e| ActionError::Engine(format!("failed to render element list: {}", e)))
    }

    // ─── click ────────────────────────────────────────────────────────

    pub async fn click_element(&self, url: &str, element_id: &str) -> String {
        let mut session = self.session.lock().await;
        match self.try_click(&mut session, url, element_id).await {
            Ok(text) => text,
            Err(ActionError::ActionTimeout(_)) => {
                // The page may have been mid-navigation; position unchanged.
                self.capture(&session).await;
                format!(
                    "Timeout after attempting to click element (ID/XPath: {}) on {}. \
                     Page may have been navigating or element not interactable.",
                    element_id, url
                )
            }
            Err(e) => {
                Self::apply_failure_policy(&mut session, &e);
                format!(
                    "Error clicking element (ID/XPath: {}) on {}: {}",
                    element_id, url, e
                )
            }
        }
    }

    async fn try_click(
        &self,
        session: &mut BrowserSession,
        url: &str,
        element_id: &str,
    ) -> Result<String, ActionError> {
        session.ensure_at(url).await.map_err(nav_err)?;

        let driver = session.driver().ok_or_else(|| {
            ActionError::Engine("engine disappeared mid-call".to_string())
        })?;
        let payload = driver
            .eval(&click_script(element_id))
            .await
            .map_err(act_err)?;
        let outcome = parse_resolve_payload(&payload).map_err(ActionError::Engine)?;
        if !outcome.found {
            return Err(ActionError::ElementNotFound {
                locator: element_id.to_string(),
            });
        }

        // Clicks often navigate; give the page a beat, then read where the
        // engine actually ended up.
        self.settle(self.config.settle_ms).await;
        let landed = driver.current_url().await.map_err(act_err)?;
        session.note_position(&landed);

        self.capture(session).await;
        info!(locator = element_id, landed = %landed, "Clicked element");

        Ok(format!(
            "Successfully clicked element (ID/XPath: {}, Text: '{}'). Current URL is now: {}",
            element_id, outcome.label, landed
        ))
    }

    // ─── type ─────────────────────────────────────────────────────────

    pub async fn type_into_element(&self, url: &str, element_id: &str, text: &str) -> String {
        let mut session = self.session.lock().await;
        match self.try_type(&mut session, url, element_id, text).await {
            Ok(text) => text,
            Err(ActionError::ActionTimeout(_)) => {
                self.capture(&session).await;
                format!(
                    "Timeout when trying to type into element (ID/XPath: {}) on {}.",
                    element_id, url
                )
            }
            Err(e) => {
                Self::apply_failure_policy(&mut session, &e);
                format!(
                    "Error typing into element (ID/XPath: {}) on {}: {}",
                    element_id, url, e
                )
            }
        }
    }

    async fn try_type(
        &self,
        session: &mut BrowserSession,
        url: &str,
        element_id: &str,
        text: &str,
    ) -> Result<String, ActionError> {
        session.ensure_at(url).await.map_err(nav_err)?;

        let driver = session.driver().ok_or_else(|| {
            ActionError::Engine("engine disappeared mid-call".to_string())
        })?;
        let payload = driver
            .eval(&type_script(element_id, text))
            .await
            .map_err(act_err)?;
        let outcome = parse_resolve_payload(&payload).map_err(ActionError::Engine)?;
        if !outcome.found {
            return Err(ActionError::ElementNotFound {
                locator: element_id.to_string(),
            });
        }

        self.capture(session).await;
        info!(locator = element_id, "Typed into element");

        Ok(format!(
            "Successfully typed '{}' into element (ID/XPath: {}, Label/Name: '{}').",
            text, element_id, outcome.label
        ))
    }

    // ─── scroll ───────────────────────────────────────────────────────

    pub async fn scroll_page(&self, url: &str, direction: &str) -> String {
        // Direction is validated before the engine is ever touched.
        let script = match direction {
            "down" => "window.scrollBy(0, window.innerHeight)",
            "up" => "window.scrollBy(0, -window.innerHeight)",
            "top" => "window.scrollTo(0, 0)",
            "bottom" => "window.scrollTo(0, document.body.scrollHeight)",
            other => {
                return format!(
                    "Error: Invalid scroll direction '{}'. Use 'up', 'down', 'top', or 'bottom'.",
                    other
                );
            }
        };

        let mut session = self.session.lock().await;
        match self.try_scroll(&mut session, url, script).await {
            Ok(at) => format!(
                "Successfully scrolled {} on {}. New content might be visible.",
                direction, at
            ),
            Err(ActionError::ActionTimeout(_)) => {
                self.capture(&session).await;
                format!("Timeout while scrolling {} on {}.", direction, url)
            }
            Err(e) => {
                Self::apply_failure_policy(&mut session, &e);
                format!("Error scrolling {} on {}: {}", direction, url, e)
            }
        }
    }

    async fn try_scroll(
        &self,
        session: &mut BrowserSession,
        url: &str,
        script: &str,
    ) -> Result<String, ActionError> {
        session.ensure_at(url).await.map_err(nav_err)?;

        let driver = session.driver().ok_or_else(|| {
            ActionError::Engine("engine disappeared mid-call".to_string())
        })?;
        driver.eval(script).await.map_err(act_err)?;
        self.settle(self.config.scroll_settle_ms).await;

        let at = driver.current_url().await.map_err(act_err)?;
        self.capture(session).await;
        Ok(at)
    }

    // ─── sign in ──────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn sign_in(
        &self,
        url: &str,
        username_id: &str,
        password_id: &str,
        submit_id: &str,
        username: &str,
        password: &str,
    ) -> String {
        let mut session = self.session.lock().await;
        let result = self
            .try_sign_in(
                &mut session,
                url,
                username_id,
                password_id,
                submit_id,
                username,
                password,
            )
            .await;

        match result {
            Ok(text) => text,
            // A missing field is a locator problem, not a page problem; say
            // which one and skip the screenshot. The tracked position is
            // still dropped so the next call re-verifies where the engine is.
            Err(ActionError::ElementNotFound { locator }) => {
                session.invalidate();
                format!(
                    "Error signing in to {}: could not find form element (ID/XPath: {}). \
                     Use find_interactive_elements to get fresh locators.",
                    url, locator
                )
            }
            Err(ActionError::ActionTimeout(_)) => {
                self.capture(&session).await;
                format!(
                    "Timeout during sign-in attempt on {}. The page may still be \
                     processing the login; check the screenshot.",
                    url
                )
            }
            Err(e) => {
                Self::apply_failure_policy(&mut session, &e);
                self.capture(&session).await;
                format!("Error signing in to {}: {}", url, e)
            }
        }
    }

    async fn try_sign_in(
        &self,
        session: &mut BrowserSession,
        url: &str,
        username_id: &str,
        password_id: &str,
        submit_id: &str,
        username: &str,
        password: &str,
    ) -> Result<String, ActionError> {
        session.ensure_at(url).await.map_err(nav_err)?;

        let driver = session.driver().ok_or_else(|| {
            ActionError::Engine("engine disappeared mid-call".to_string())
        })?;

        for (locator, value) in [(username_id, username), (password_id, password)] {
            let payload = driver
                .eval(&type_script(locator, value))
                .await
                .map_err(act_err)?;
            let outcome = parse_resolve_payload(&payload).map_err(ActionError::Engine)?;
            if !outcome.found {
                return Err(ActionError::ElementNotFound {
                    locator: locator.to_string(),
                });
            }
        }

        let payload = driver
            .eval(&click_script(submit_id))
            .await
            .map_err(act_err)?;
        let outcome = parse_resolve_payload(&payload).map_err(ActionError::Engine)?;
        if !outcome.found {
            return Err(ActionError::ElementNotFound {
                locator: submit_id.to_string(),
            });
        }

        // Logins redirect slowly; wait longer than a plain click.
        self.settle(self.config.sign_in_settle_ms).await;
        let landed = driver.current_url().await.map_err(act_err)?;
        session.note_position(&landed);

        self.capture(session).await;
        info!(url = url, landed = %landed, "Sign-in attempted");

        Ok(format!(
            "Sign-in attempted on {}. Current URL is now: {}. \
             Check the screenshot to verify whether the login succeeded.",
            url, landed
        ))
    }

    // ─── vision ───────────────────────────────────────────────────────

    /// Capture the current view to a temporary artifact, run it through the
    /// vision model, and clean the artifact up whether or not the call
    /// succeeded. Uses its own slot so it never races the action hand-off.
    pub async fn analyze_view(&self, prompt: &str) -> String {
        let session = self.session.lock().await;
        let Some(driver) = session.driver() else {
            return "No active browser session to analyze. Use browse_url to open a page first."
                .to_string();
        };

        let Some(vision) = &self.vision else {
            return "Vision analysis is not configured; set a Gemini API key to enable it."
                .to_string();
        };

        let jpeg = match driver.screenshot_jpeg().await {
            Ok(b) => b,
            Err(e) => return format!("Error capturing current view: {}", e),
        };

        if let Some(parent) = self.vision_slot.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.vision_slot, &jpeg) {
            return format!("Error saving view for analysis: {}", e);
        }

        let result = vision.analyze_image(prompt, &jpeg, "image/jpeg").await;

        // The temporary artifact never outlives the call.
        if let Err(e) = std::fs::remove_file(&self.vision_slot) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "Failed to remove vision artifact");
            }
        }

        match result {
            Ok(answer) => answer,
            Err(e) => format!("Error analyzing current view: {}", e),
        }
    }

    // ─── close ────────────────────────────────────────────────────────

    pub async fn close(&self) -> String {
        let mut session = self.session.lock().await;
        if session.is_active() {
            // A capture from the final action would otherwise outlive the
            // session it belongs to.
            self.slot.discard();
        }
        match session.release().await {
            Ok(true) => "Browser session closed successfully.".to_string(),
            Ok(false) => "No active browser session to close.".to_string(),
            Err(e) => format!("Error closing browser session: {}", e),
        }
    }
}
