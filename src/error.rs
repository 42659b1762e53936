use thiserror::Error;

use crate::plan::WaitState;

/// Failure of a single plan step. The interpreter catches every variant and
/// folds it into the report's `error` field; none of these abort the process.
#[derive(Debug, Error)]
pub enum StepError {
    /// Step shape is malformed: unknown tool, missing or mistyped required
    /// arg. Detected before dispatch, never reaches the browser.
    #[error("invalid step: {0}")]
    Validation(String),

    /// Selector did not match any element within the timeout.
    #[error("no element matching \"{selector}\" within timeout")]
    ElementNotFound { selector: String },

    /// Element matched but could not be interacted with.
    #[error("element \"{selector}\" not actionable: {detail}")]
    ElementNotActionable { selector: String, detail: String },

    /// Navigation failed (network, invalid URL, load timeout, allowlist).
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A wait_for condition was not met in time.
    #[error("timed out waiting for \"{selector}\" to become {state}")]
    Timeout { selector: String, state: WaitState },

    /// The browser session was lost mid-run.
    #[error("browser session error: {0}")]
    Session(String),
}

/// The session could not be created (or was torn down out from under us at
/// setup). Fatal for the whole run: without a session there is no report to
/// build, so this is the one error that propagates to the caller.
#[derive(Debug, Error)]
#[error("failed to open browser session: {0}")]
pub struct SessionError(pub String);
