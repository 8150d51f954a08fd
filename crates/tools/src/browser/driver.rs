//! Browser engine handle: the `PageDriver` seam, Chrome provisioning, and
//! the CDP-backed implementation.
//!
//! A `PageDriver` is the live handle controlling one browser process. It is
//! deliberately narrow (navigate, read position, evaluate a script, capture
//! a screenshot, shut down) so the session layer above can be exercised
//! against a mock in tests.

use async_trait::async_trait;
use base64::Engine as _;
use friday_core::config::BrowserConfig;
use serde_json::Value;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::cdp::CdpClient;

#[derive(Debug, Error)]
pub enum DriverError {
    /// No browser engine could be started. Fatal for the calling tool turn.
    #[error("failed to provision browser engine: {0}")]
    Provision(String),

    /// A bounded engine operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Anything else the engine reported.
    #[error("{0}")]
    Engine(String),
}

/// Live handle to one browser process.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` and wait for the document to become ready, bounded by the
    /// configured page-load timeout.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// The URL the engine is actually positioned at.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Evaluate a script in the page, returning its value.
    async fn eval(&self, expression: &str) -> Result<Value, DriverError>;

    /// Capture the current viewport as JPEG bytes.
    async fn screenshot_jpeg(&self) -> Result<Vec<u8>, DriverError>;

    /// Graceful shutdown. The handle is unusable afterwards.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Constructs driver handles. Separate from the session so tests can inject
/// counting/failing factories.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError>;
}

// ─── Chrome provisioning ──────────────────────────────────────────────

/// Launches Chrome with a debugging port and connects over CDP.
///
/// Provisioning is two-stage: the primary strategy uses the configured
/// binary or well-known Chrome install locations; if that fails, the
/// fallback probes PATH for any Chromium-family binary. Both failing is
/// fatal for the call; there is no retry loop.
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn primary_candidates(&self) -> Vec<String> {
        if let Some(binary) = &self.config.binary {
            return vec![binary.clone()];
        }
        if cfg!(target_os = "macos") {
            vec![
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome".to_string(),
                "/Applications/Chromium.app/Contents/MacOS/Chromium".to_string(),
            ]
        } else if cfg!(target_os = "linux") {
            vec![
                "/usr/bin/google-chrome".to_string(),
                "/usr/bin/google-chrome-stable".to_string(),
                "google-chrome".to_string(),
                "google-chrome-stable".to_string(),
            ]
        } else {
            vec![
                r"C:\Program Files\Google\Chrome\Application\chrome.exe".to_string(),
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe".to_string(),
            ]
        }
    }

    fn fallback_candidates(&self) -> Vec<String> {
        vec![
            "chromium".to_string(),
            "chromium-browser".to_string(),
            "brave-browser".to_string(),
            "microsoft-edge".to_string(),
        ]
    }

    fn resolve_binary(candidates: &[String]) -> Option<String> {
        for candidate in candidates {
            if std::path::Path::new(candidate).exists() {
                return Some(candidate.clone());
            }
            if !candidate.contains('/') && !candidate.contains('\\') {
                if which::which(candidate).is_ok() {
                    return Some(candidate.clone());
                }
            }
        }
        None
    }

    fn build_args(&self, debug_port: u16) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", debug_port),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-extensions".to_string(),
            "--disable-sync".to_string(),
        ];
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        args.push(format!(
            "--window-size={},{}",
            self.config.viewport_width, self.config.viewport_height
        ));
        args.push("about:blank".to_string());
        args
    }

    async fn launch_binary(&self, binary: &str) -> Result<Box<dyn PageDriver>, String> {
        let debug_port = find_free_port().await?;
        let args = self.build_args(debug_port);

        info!(
            binary = binary,
            port = debug_port,
            headless = self.config.headless,
            "Launching browser engine"
        );

        let child = Command::new(binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to launch {}: {}", binary, e))?;

        wait_for_cdp_ready(debug_port, 15).await?;
        let page_ws_url = get_page_ws_url(debug_port).await?;
        let cdp = CdpClient::connect(&page_ws_url).await?;

        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;
        cdp.set_viewport(self.config.viewport_width, self.config.viewport_height)
            .await?;

        info!(ws_url = %page_ws_url, "CDP connection established (page target)");

        Ok(Box::new(CdpDriver {
            cdp,
            _process: child,
            page_load_timeout: Duration::from_secs(self.config.page_load_timeout_secs),
        }))
    }
}

#[async_trait]
impl DriverFactory for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        let primary_err = match Self::resolve_binary(&self.primary_candidates()) {
            Some(binary) => match self.launch_binary(&binary).await {
                Ok(driver) => return Ok(driver),
                Err(e) => e,
            },
            None => "no Chrome binary found in well-known locations".to_string(),
        };

        warn!(
            error = %primary_err,
            "Primary browser provisioning failed, trying fallback"
        );

        let fallback_err = match Self::resolve_binary(&self.fallback_candidates()) {
            Some(binary) => match self.launch_binary(&binary).await {
                Ok(driver) => return Ok(driver),
                Err(e) => e,
            },
            None => "no Chromium-family binary found on PATH".to_string(),
        };

        Err(DriverError::Provision(format!(
            "primary: {}; fallback: {}",
            primary_err, fallback_err
        )))
    }
}

// ─── CDP-backed driver ────────────────────────────────────────────────

/// `PageDriver` over a CDP connection to a Chrome child process.
pub struct CdpDriver {
    cdp: CdpClient,
    _process: Child,
    page_load_timeout: Duration,
}

impl CdpDriver {
    fn map_err(e: String) -> DriverError {
        if e.contains("timed out") {
            DriverError::Timeout(e)
        } else {
            DriverError::Engine(e)
        }
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.cdp.navigate(url).await.map_err(Self::map_err)?;

        // Poll document readiness up to the page-load bound.
        let start = Instant::now();
        loop {
            if start.elapsed() > self.page_load_timeout {
                return Err(DriverError::Timeout(format!(
                    "page load of {} exceeded {}s",
                    url,
                    self.page_load_timeout.as_secs()
                )));
            }
            let state = self.eval("document.readyState").await?;
            if state.as_str() == Some("complete") {
                debug!(url = url, elapsed_ms = start.elapsed().as_millis() as u64, "Page load complete");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let value = self.eval("window.location.href").await?;
        value
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| DriverError::Engine("location.href is not a string".to_string()))
    }

    async fn eval(&self, expression: &str) -> Result<Value, DriverError> {
        let result = self
            .cdp
            .evaluate_js(expression)
            .await
            .map_err(Self::map_err)?;

        if let Some(exception) = result
            .get("exceptionDetails")
            .and_then(|e| e.get("text"))
            .and_then(|t| t.as_str())
        {
            return Err(DriverError::Engine(format!(
                "script exception: {}",
                exception
            )));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn screenshot_jpeg(&self) -> Result<Vec<u8>, DriverError> {
        let encoded = self.cdp.screenshot_jpeg().await.map_err(Self::map_err)?;
        base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .map_err(|e| DriverError::Engine(format!("screenshot decode: {}", e)))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.cdp.close_browser().await.map_err(Self::map_err)
    }
}

// ─── CDP endpoint discovery ───────────────────────────────────────────

/// Find a free TCP port for the debugging endpoint.
async fn find_free_port() -> Result<u16, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("Failed to bind to find free port: {}", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local addr: {}", e))?
        .port();
    drop(listener);
    Ok(port)
}

/// Wait for Chrome's CDP endpoint to become available.
/// Polls /json/version until it responds, up to `timeout_secs`.
async fn wait_for_cdp_ready(port: u16, timeout_secs: u64) -> Result<String, String> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(format!(
                "Chrome CDP not ready after {}s on port {}",
                timeout_secs, port
            ));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Connect to the first page target's WebSocket URL via /json/list.
/// Retries a few times since the page target may not appear immediately.
async fn get_page_ws_url(port: u16) -> Result<String, String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        let resp = match reqwest::get(&url).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        let targets: Vec<Value> = match resp.json().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        for target in &targets {
            if target.get("type").and_then(|v| v.as_str()) == Some("page") {
                if let Some(ws_url) = target.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }
    }

    Err("No page target found after retries".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_binary_wins() {
        let launcher = ChromeLauncher::new(BrowserConfig {
            binary: Some("/opt/custom/chrome".to_string()),
            ..Default::default()
        });
        assert_eq!(launcher.primary_candidates(), vec!["/opt/custom/chrome"]);
    }

    #[test]
    fn test_headless_flag_in_args() {
        let launcher = ChromeLauncher::new(BrowserConfig::default());
        let args = launcher.build_args(9222);
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a == "--no-sandbox"));
        assert!(args.iter().any(|a| a == "--window-size=1920,1080"));

        let headed = ChromeLauncher::new(BrowserConfig {
            headless: false,
            ..Default::default()
        });
        assert!(!headed.build_args(9222).iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn test_resolve_binary_missing_path() {
        let got = ChromeLauncher::resolve_binary(&["/nonexistent/browser/binary".to_string()]);
        assert!(got.is_none());
    }

    #[test]
    fn test_map_err_classifies_timeouts() {
        assert!(matches!(
            CdpDriver::map_err("CDP command 'Page.navigate' timed out after 30s".to_string()),
            DriverError::Timeout(_)
        ));
        assert!(matches!(
            CdpDriver::map_err("CDP error: something".to_string()),
            DriverError::Engine(_)
        ));
    }
}
