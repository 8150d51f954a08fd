//! Browser session: single shared engine lifecycle plus navigation
//! reconciliation.
//!
//! One `BrowserSession` owns at most one live engine handle for the whole
//! process lifetime of a conversation. It tracks the last confirmed position
//! so executors can skip redundant page loads, and it drops that knowledge
//! whenever an operation fails before confirming where the engine ended up.

use tracing::{debug, info};

use super::driver::{DriverError, DriverFactory, PageDriver};

/// Strip the trailing slash so `https://example.com/` and
/// `https://example.com` compare equal.
pub fn normalize_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

pub struct BrowserSession {
    factory: Box<dyn DriverFactory>,
    driver: Option<Box<dyn PageDriver>>,
    /// Last confirmed, normalized position. `None` forces the next
    /// `ensure_at` to issue a real navigation.
    current_url: Option<String>,
}

impl BrowserSession {
    pub fn new(factory: Box<dyn DriverFactory>) -> Self {
        Self {
            factory,
            driver: None,
            current_url: None,
        }
    }

    /// The live handle, if the engine has been started.
    pub fn driver(&self) -> Option<&dyn PageDriver> {
        self.driver.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.driver.is_some()
    }

    pub fn tracked_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// Forget the tracked position. The next `ensure_at` re-navigates even
    /// to a URL the engine may still be sitting on.
    pub fn invalidate(&mut self) {
        self.current_url = None;
    }

    /// Record a confirmed position reported by the engine.
    pub fn note_position(&mut self, url: &str) {
        self.current_url = Some(normalize_url(url).to_string());
    }

    /// Lazily start the engine. Reuses the existing handle if present.
    pub async fn acquire(&mut self) -> Result<&dyn PageDriver, DriverError> {
        if self.driver.is_none() {
            info!("No active browser engine, provisioning one");
            self.driver = Some(self.factory.launch().await?);
        }
        Ok(self.driver.as_deref().unwrap())
    }

    /// Shut the engine down. State is cleared whether or not the shutdown
    /// succeeds, so a half-closed engine can never be handed out again.
    /// Returns `Ok(false)` when there was nothing to close.
    pub async fn release(&mut self) -> Result<bool, DriverError> {
        let Some(driver) = self.driver.take() else {
            return Ok(false);
        };
        self.current_url = None;

        let result = driver.close().await;
        drop(driver);
        match result {
            Ok(()) => {
                info!("Browser session closed");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Navigate the engine to `target` unless it is already there.
    ///
    /// Both the engine's actual position and the locally tracked position
    /// must match the normalized target for the load to be skipped; the
    /// double check guards against client-side redirects the tracker never
    /// observed and against stale state after a failed operation. Returns
    /// whether a real navigation happened. The confirmed landing URL (which
    /// may differ from `target` after redirects) becomes the new tracked
    /// position.
    pub async fn ensure_at(&mut self, target: &str) -> Result<bool, DriverError> {
        self.acquire().await?;
        let driver = self.driver.as_deref().unwrap();

        let actual = driver.current_url().await?;
        let normalized_actual = normalize_url(&actual).to_string();
        let normalized_target = normalize_url(target).to_string();
        let tracked_matches = self.current_url.as_deref() == Some(normalized_target.as_str());

        if normalized_actual == normalized_target && tracked_matches {
            return Ok(false);
        }

        debug!(
            target = target,
            engine_at = %actual,
            tracked = ?self.current_url,
            "Navigating"
        );
        driver.goto(target).await?;
        let landed = driver.current_url().await?;
        self.current_url = Some(normalize_url(&landed).to_string());
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scriptable in-memory engine for exercising the session and executor
    /// layers without a browser.
    pub struct MockDriver {
        pub goto_calls: AtomicUsize,
        pub eval_calls: AtomicUsize,
        pub screenshot_calls: AtomicUsize,
        pub url: Mutex<String>,
        /// Value the next `eval` calls return.
        pub eval_result: Mutex<Value>,
        /// When set, `goto` fails with this error kind ("timeout"/"engine").
        pub fail_goto: Mutex<Option<String>>,
        pub screenshot_bytes: Mutex<Vec<u8>>,
        pub close_calls: AtomicUsize,
        pub fail_close: Mutex<bool>,
    }

    impl MockDriver {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                goto_calls: AtomicUsize::new(0),
                eval_calls: AtomicUsize::new(0),
                screenshot_calls: AtomicUsize::new(0),
                url: Mutex::new("about:blank".to_string()),
                eval_result: Mutex::new(Value::Null),
                fail_goto: Mutex::new(None),
                screenshot_bytes: Mutex::new(b"jpeg-bytes".to_vec()),
                close_calls: AtomicUsize::new(0),
                fail_close: Mutex::new(false),
            })
        }
    }

    #[async_trait]
    impl PageDriver for Arc<MockDriver> {
        async fn goto(&self, url: &str) -> Result<(), DriverError> {
            self.goto_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(kind) = self.fail_goto.lock().unwrap().clone() {
                return match kind.as_str() {
                    "timeout" => Err(DriverError::Timeout("page load timed out".to_string())),
                    _ => Err(DriverError::Engine("navigation refused".to_string())),
                };
            }
            *self.url.lock().unwrap() = url.to_string();
            Ok(())
        }

        async fn current_url(&self) -> Result<String, DriverError> {
            Ok(self.url.lock().unwrap().clone())
        }

        async fn eval(&self, _expression: &str) -> Result<Value, DriverError> {
            self.eval_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.eval_result.lock().unwrap().clone())
        }

        async fn screenshot_jpeg(&self) -> Result<Vec<u8>, DriverError> {
            self.screenshot_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.screenshot_bytes.lock().unwrap().clone())
        }

        async fn close(&self) -> Result<(), DriverError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail_close.lock().unwrap() {
                return Err(DriverError::Engine("engine already gone".to_string()));
            }
            Ok(())
        }
    }

    pub struct MockFactory {
        pub driver: Arc<MockDriver>,
        pub launch_calls: AtomicUsize,
        pub fail: bool,
    }

    impl MockFactory {
        pub fn new(driver: Arc<MockDriver>) -> Self {
            Self {
                driver,
                launch_calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl DriverFactory for MockFactory {
        async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
            self.launch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DriverError::Provision(
                    "primary: no binary; fallback: no binary".to_string(),
                ));
            }
            Ok(Box::new(self.driver.clone()))
        }
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("https://example.com/"), "https://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
        assert_eq!(
            normalize_url("https://example.com/a/b//"),
            "https://example.com/a/b"
        );
    }

    #[tokio::test]
    async fn test_acquire_is_lazy_and_reuses() {
        let driver = MockDriver::new();
        let factory = MockFactory::new(driver);
        let mut session = BrowserSession::new(Box::new(factory));

        assert!(!session.is_active());
        session.acquire().await.unwrap();
        session.acquire().await.unwrap();
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_ensure_at_navigates_once_for_same_url() {
        let driver = MockDriver::new();
        let factory = MockFactory::new(driver.clone());
        let mut session = BrowserSession::new(Box::new(factory));

        let navigated = session.ensure_at("https://example.com").await.unwrap();
        assert!(navigated);
        let navigated = session.ensure_at("https://example.com").await.unwrap();
        assert!(!navigated);
        assert_eq!(driver.goto_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_at_trailing_slash_is_same_page() {
        let driver = MockDriver::new();
        let factory = MockFactory::new(driver.clone());
        let mut session = BrowserSession::new(Box::new(factory));

        session.ensure_at("https://example.com/").await.unwrap();
        let navigated = session.ensure_at("https://example.com").await.unwrap();
        assert!(!navigated);
        assert_eq!(driver.goto_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_renavigation() {
        let driver = MockDriver::new();
        let factory = MockFactory::new(driver.clone());
        let mut session = BrowserSession::new(Box::new(factory));

        session.ensure_at("https://example.com").await.unwrap();
        session.invalidate();
        // Engine is still on the page, but the tracker no longer trusts it.
        let navigated = session.ensure_at("https://example.com").await.unwrap();
        assert!(navigated);
        assert_eq!(driver.goto_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ensure_at_follows_redirect_position() {
        let driver = MockDriver::new();
        let factory = MockFactory::new(driver.clone());
        let mut session = BrowserSession::new(Box::new(factory));

        session.ensure_at("https://example.com/login").await.unwrap();
        // Simulate a client-side redirect the tracker never saw.
        *driver.url.lock().unwrap() = "https://example.com/dashboard".to_string();

        let navigated = session.ensure_at("https://example.com/login").await.unwrap();
        assert!(navigated);
        // Tracked position is where the engine landed, not the request.
        assert_eq!(
            session.tracked_url(),
            Some("https://example.com/login")
        );
    }

    #[tokio::test]
    async fn test_release_idempotent_and_clears_state() {
        let driver = MockDriver::new();
        let factory = MockFactory::new(driver.clone());
        let mut session = BrowserSession::new(Box::new(factory));

        session.ensure_at("https://example.com").await.unwrap();
        let closed = session.release().await.unwrap();
        assert!(closed);
        assert!(!session.is_active());
        assert!(session.tracked_url().is_none());

        let closed = session.release().await.unwrap();
        assert!(!closed);
        assert_eq!(driver.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_clears_state_even_on_shutdown_error() {
        let driver = MockDriver::new();
        *driver.fail_close.lock().unwrap() = true;
        let factory = MockFactory::new(driver.clone());
        let mut session = BrowserSession::new(Box::new(factory));

        session.ensure_at("https://example.com").await.unwrap();
        assert!(session.release().await.is_err());
        assert!(!session.is_active());
        assert!(session.tracked_url().is_none());
    }

    #[tokio::test]
    async fn test_provisioning_failure_propagates() {
        let driver = MockDriver::new();
        let mut factory = MockFactory::new(driver);
        factory.fail = true;
        let mut session = BrowserSession::new(Box::new(factory));

        let err = session.ensure_at("https://example.com").await.unwrap_err();
        assert!(matches!(err, DriverError::Provision(_)));
        assert!(!session.is_active());
    }
}
