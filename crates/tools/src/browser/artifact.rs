//! Single-slot screenshot hand-off between the browser executors and the
//! outbound transport.
//!
//! Every page-mutating action overwrites the same well-known file; the
//! transport drains it right after the status text is sent. Last write wins
//! when actions race, which matches the one-screenshot-per-turn contract.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use friday_core::OutboundMessage;
use tracing::{debug, warn};

/// The one file all action screenshots go through.
pub struct ScreenshotSlot {
    path: PathBuf,
}

impl ScreenshotSlot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the slot's content. Deletes any previous capture first so a
    /// failed write never leaves a stale image behind.
    pub fn store(&self, jpeg: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        std::fs::write(&self.path, jpeg)?;
        debug!(path = %self.path.display(), bytes = jpeg.len(), "Stored action screenshot");
        Ok(())
    }

    /// Read the slot without consuming it.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Read and remove the slot. `None` when no capture is waiting.
    pub fn take(&self) -> Option<Vec<u8>> {
        let bytes = std::fs::read(&self.path).ok()?;
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove consumed screenshot");
        }
        Some(bytes)
    }

    /// Remove the slot if present, ignoring a missing file.
    pub fn discard(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to discard screenshot");
            }
        }
    }
}

/// Whether a tool hands a screenshot to the transport after its status text.
/// Keyed on the tool name, never on the shape of the response text.
pub fn produces_screenshot(tool_name: &str) -> bool {
    matches!(
        tool_name,
        "browse_url"
            | "click_element_by_id"
            | "type_into_element_by_id"
            | "scroll_page_at_url"
            | "sign_in_to_website"
    )
}

/// Drain the slot into an outbound screenshot message, if the tool is one
/// that captures and a capture is actually waiting.
pub fn screenshot_message(slot: &ScreenshotSlot, tool_name: &str) -> Option<OutboundMessage> {
    if !produces_screenshot(tool_name) {
        return None;
    }
    let bytes = slot.take()?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Some(OutboundMessage::screenshot(tool_name, encoded))
}
