use serde::{Deserialize, Serialize};

use crate::error::StepError;

/// A declarative plan: a goal, an ordered list of steps, and an optional
/// report template consumed by the CLI formatter (never by the interpreter).
///
/// Steps stay raw JSON here. Validation is lazy: each step is parsed right
/// before it executes, so a malformed step 3 only fails step 3 and a plan
/// document with one bad step still loads.
#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    pub goal: String,
    #[serde(default)]
    pub steps: Vec<serde_json::Value>,
    #[serde(default)]
    pub final_report: Option<serde_json::Value>,
}

/// One parsed, validated plan step: the action plus an optional capture id
/// under which the step's result (if it produces one) is stored.
#[derive(Debug, Clone)]
pub struct Step {
    pub action: Action,
    pub id: Option<String>,
}

/// One variant per tool, each carrying exactly its required argument set.
/// Unknown args are ignored; an unknown tool or a missing/mistyped required
/// arg fails the parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum Action {
    Navigate {
        url: String,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
        #[serde(default)]
        clear: bool,
    },
    WaitFor {
        selector: String,
        state: WaitState,
    },
    ExtractText {
        selector: String,
    },
}

/// Element states wait_for can block on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl std::fmt::Display for WaitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        };
        f.write_str(s)
    }
}

impl Step {
    /// Parse one raw step. Serde enforces the tool enum and the per-tool
    /// required args; the capture id and emptiness checks are on top of
    /// that. Unknown keys at either level pass through untouched.
    pub fn parse(raw: &serde_json::Value) -> Result<Self, StepError> {
        let id = match raw.get("id") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(other) => {
                return Err(StepError::Validation(format!(
                    "id must be a string, got {other}"
                )));
            }
        };
        let action: Action = serde_json::from_value(raw.clone())
            .map_err(|e| StepError::Validation(e.to_string()))?;
        let step = Step { action, id };

        match &step.action {
            Action::Navigate { url } if url.is_empty() => {
                return Err(StepError::Validation("navigate: url is empty".into()));
            }
            Action::Click { selector }
            | Action::Type { selector, .. }
            | Action::WaitFor { selector, .. }
            | Action::ExtractText { selector }
                if selector.is_empty() =>
            {
                return Err(StepError::Validation(format!(
                    "{}: selector is empty",
                    step.action.tool_name()
                )));
            }
            _ => {}
        }

        Ok(step)
    }
}

impl Action {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Action::Navigate { .. } => "navigate",
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::WaitFor { .. } => "wait_for",
            Action::ExtractText { .. } => "extract_text",
        }
    }
}

/// Compact one-line description for logs and progress events.
impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Navigate { url } => write!(f, "navigate {url}"),
            Action::Click { selector } => write!(f, "click {selector}"),
            Action::Type { selector, clear, .. } => {
                write!(f, "type into {selector} (clear={clear})")
            }
            Action::WaitFor { selector, state } => write!(f, "wait_for {selector} ({state})"),
            Action::ExtractText { selector } => write!(f, "extract_text {selector}"),
        }
    }
}
