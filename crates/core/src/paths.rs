use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".friday"))
            .unwrap_or_else(|| PathBuf::from(".friday"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn workspace(&self) -> PathBuf {
        self.base.join("workspace")
    }

    /// Well-known slot for the most recent action screenshot. The transport
    /// layer reads this file after a screenshot-producing tool returns.
    pub fn action_screenshot(&self) -> PathBuf {
        self.workspace().join("action_screenshot.jpeg")
    }

    /// Temporary capture slot used by the vision analysis bridge. Never the
    /// same file as `action_screenshot` so an analysis cannot clobber the
    /// pending hand-off artifact.
    pub fn vision_screenshot(&self) -> PathBuf {
        self.workspace().join("vision_analysis_view.jpeg")
    }

    /// Directory where the (separate) image generation tool drops its output.
    /// The browser core must not write under this directory.
    pub fn images_dir(&self) -> PathBuf {
        self.workspace().join("images")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
