use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::debug;

use crate::config::Config;
use crate::error::{SessionError, StepError};
use crate::plan::WaitState;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The capability set the interpreter needs from a browser. One operation
/// per tool, each blocking until the action completes or its timeout
/// elapses. Implementations are not safe for concurrent use on one
/// session; the interpreter calls them strictly sequentially.
pub trait BrowserDriver {
    fn navigate(&self, url: &str) -> Result<(), StepError>;
    fn click(&self, selector: &str) -> Result<(), StepError>;
    fn type_text(&self, selector: &str, text: &str, clear: bool) -> Result<(), StepError>;
    fn wait_for(&self, selector: &str, state: WaitState) -> Result<(), StepError>;
    fn extract_text(&self, selector: &str) -> Result<String, StepError>;
}

/// A live Chrome session: one browser process, one tab, owned by exactly
/// one run. Dropping the session closes the browser, so release is
/// guaranteed on every exit path.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
    timeout: Duration,
    allowed_url_patterns: Vec<String>,
}

impl BrowserSession {
    pub fn launch(config: &Config) -> Result<Self, SessionError> {
        let options = LaunchOptions {
            headless: config.headless,
            args: vec![
                std::ffi::OsStr::new("--no-first-run"),
                std::ffi::OsStr::new("--no-default-browser-check"),
                std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
            ],
            idle_browser_timeout: Duration::from_secs(60),
            ..Default::default()
        };

        debug!(headless = config.headless, "launching Chrome");
        let browser =
            Browser::new(options).map_err(|e| SessionError(format!("launch failed: {e:#}")))?;
        let tab = browser
            .new_tab()
            .map_err(|e| SessionError(format!("could not open tab: {e:#}")))?;

        Ok(Self {
            _browser: browser,
            tab,
            timeout: config.step_timeout,
            allowed_url_patterns: config.allowed_url_patterns.clone(),
        })
    }

    fn url_allowed(&self, url: &str) -> bool {
        url_allowed(&self.allowed_url_patterns, url)
    }

    /// Evaluate a JS expression expected to yield a bool.
    fn eval_bool(&self, expression: &str) -> Result<bool, StepError> {
        let result = self
            .tab
            .evaluate(expression, false)
            .map_err(|e| StepError::Session(format!("evaluate failed: {e:#}")))?;
        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }
}

impl BrowserDriver for BrowserSession {
    fn navigate(&self, url: &str) -> Result<(), StepError> {
        if !self.url_allowed(url) {
            return Err(StepError::Navigation(format!(
                "url not allowed by ALLOWED_URL_PATTERNS: {url}"
            )));
        }
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| StepError::Navigation(format!("{e:#}")))?;
        Ok(())
    }

    fn click(&self, selector: &str) -> Result<(), StepError> {
        let element = self
            .tab
            .wait_for_element_with_custom_timeout(selector, self.timeout)
            .map_err(|_| StepError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        element.click().map_err(|e| StepError::ElementNotActionable {
            selector: selector.to_string(),
            detail: format!("{e:#}"),
        })?;
        Ok(())
    }

    fn type_text(&self, selector: &str, text: &str, clear: bool) -> Result<(), StepError> {
        let element = self
            .tab
            .wait_for_element_with_custom_timeout(selector, self.timeout)
            .map_err(|_| StepError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        // Focus the field the way a user would before typing.
        element.click().map_err(|e| StepError::ElementNotActionable {
            selector: selector.to_string(),
            detail: format!("{e:#}"),
        })?;
        if clear {
            let js_sel = js_escape(selector);
            self.tab
                .evaluate(
                    &format!("document.querySelector('{js_sel}').value = ''"),
                    false,
                )
                .map_err(|e| StepError::Session(format!("clear failed: {e:#}")))?;
        }
        self.tab
            .type_str(text)
            .map_err(|e| StepError::ElementNotActionable {
                selector: selector.to_string(),
                detail: format!("typing failed: {e:#}"),
            })?;
        Ok(())
    }

    fn wait_for(&self, selector: &str, state: WaitState) -> Result<(), StepError> {
        let predicate = state_predicate(selector, state);
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.eval_bool(&predicate)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(StepError::Timeout {
                    selector: selector.to_string(),
                    state,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn extract_text(&self, selector: &str) -> Result<String, StepError> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, self.timeout)
            .map_err(|_| StepError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        let js_sel = js_escape(selector);
        let result = self
            .tab
            .evaluate(
                &format!("(document.querySelector('{js_sel}') || {{}}).innerText || ''"),
                false,
            )
            .map_err(|e| StepError::Session(format!("extract failed: {e:#}")))?;
        let text = result
            .value
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

/// An empty pattern list allows everything; otherwise the URL must contain
/// at least one configured pattern.
fn url_allowed(patterns: &[String], url: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| url.contains(p))
}

/// Escape a selector for embedding in a single-quoted JS string.
fn js_escape(selector: &str) -> String {
    selector.replace('\\', "\\\\").replace('\'', "\\'")
}

/// JS predicate deciding whether the element matching `selector` is in
/// `state`. Visibility rules match what the page actually shows: an element
/// with no layout box or display:none/visibility:hidden/opacity:0 counts as
/// hidden.
fn state_predicate(selector: &str, state: WaitState) -> String {
    let js_sel = js_escape(selector);
    let check = match state {
        WaitState::Attached => "el !== null",
        WaitState::Detached => "el === null",
        WaitState::Visible => "visible(el)",
        WaitState::Hidden => "!visible(el)",
    };
    format!(
        r#"(() => {{
  const el = document.querySelector('{js_sel}');
  const visible = (el) => {{
    if (!el) return false;
    if (el.offsetParent === null && el.tagName !== 'BODY' && el.tagName !== 'HTML') return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  }};
  return {check};
}})()"#
    )
}
