use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{SessionError, StepError};
use crate::hands::{BrowserDriver, BrowserSession};
use crate::plan::{Action, Plan, Step};
use crate::report::{ExecutionReport, StepFailure};

/// Progress events emitted while a plan runs. The HTTP layer streams these
/// to clients over SSE; the CLI relies on the tracing log instead.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Step { number: usize, description: String },
    StepError { message: String },
    RunComplete { summary: String },
    RunFailed { message: String },
    Ready,
}

/// Execute every step of `plan` in order against `driver`, reporting
/// progress through `on_event`.
///
/// Fail-fast with partial results: the first validation or operation
/// failure records `{step_index, message}` and stops the loop — later steps
/// are skipped, values captured before the failure stay in the report.
pub fn execute_plan_with(
    plan: &Plan,
    driver: &dyn BrowserDriver,
    on_event: &mut dyn FnMut(RunEvent),
) -> ExecutionReport {
    let mut report = ExecutionReport::new(&plan.goal);
    info!(goal = %plan.goal, steps = plan.steps.len(), "executing plan");

    for (i, raw) in plan.steps.iter().enumerate() {
        // Validation is lazy and per step; a bad step never reaches the
        // driver, and a bad step 3 still lets steps 0..2 run.
        let step = match Step::parse(raw) {
            Ok(step) => step,
            Err(e) => {
                warn!(step = i, "validation failed: {e}");
                on_event(RunEvent::StepError {
                    message: e.to_string(),
                });
                report.error = Some(StepFailure {
                    step_index: i,
                    message: e.to_string(),
                });
                break;
            }
        };

        info!(step = i, "{}", step.action);
        on_event(RunEvent::Step {
            number: i + 1,
            description: step.action.to_string(),
        });

        match dispatch(driver, &step.action) {
            Ok(result) => {
                // Store a result only when the operation naturally produces
                // one; an id on any other step executes fine and stores
                // nothing. Reused ids overwrite (last write wins).
                if let (Some(id), Some(value)) = (step.id, result) {
                    report.extracted.insert(id, Value::String(value));
                }
            }
            Err(e) => {
                warn!(step = i, "step failed: {e}");
                on_event(RunEvent::StepError {
                    message: e.to_string(),
                });
                report.error = Some(StepFailure {
                    step_index: i,
                    message: e.to_string(),
                });
                break;
            }
        }
    }

    report
}

/// `execute_plan_with` without an observer.
pub fn execute_plan(plan: &Plan, driver: &dyn BrowserDriver) -> ExecutionReport {
    execute_plan_with(plan, driver, &mut |_| {})
}

fn dispatch(driver: &dyn BrowserDriver, action: &Action) -> Result<Option<String>, StepError> {
    match action {
        Action::Navigate { url } => driver.navigate(url).map(|()| None),
        Action::Click { selector } => driver.click(selector).map(|()| None),
        Action::Type {
            selector,
            text,
            clear,
        } => driver.type_text(selector, text, *clear).map(|()| None),
        Action::WaitFor { selector, state } => driver.wait_for(selector, *state).map(|()| None),
        Action::ExtractText { selector } => driver.extract_text(selector).map(Some),
    }
}

/// Run a plan end to end: acquire a fresh browser session, execute, release.
/// The session is owned by this call and dropped on every exit path; only a
/// failure to open it at all propagates.
pub fn run(
    plan: &Plan,
    config: &Config,
    on_event: &mut dyn FnMut(RunEvent),
) -> Result<ExecutionReport, SessionError> {
    let session = BrowserSession::launch(config)?;
    let report = execute_plan_with(plan, &session, on_event);
    match &report.error {
        None => on_event(RunEvent::RunComplete {
            summary: format!("plan executed, {} value(s) extracted", report.extracted.len()),
        }),
        Some(failure) => on_event(RunEvent::RunFailed {
            message: format!(
                "stopped at step {}: {}",
                failure.step_index, failure.message
            ),
        }),
    }
    Ok(report)
}
