use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};

use crate::config::Config;
use crate::plan::Plan;
use crate::runner::{self, RunEvent};

impl RunEvent {
    /// SSE event name + JSON payload.
    fn sse_parts(&self) -> (&'static str, String) {
        match self {
            RunEvent::Step {
                number,
                description,
            } => (
                "step",
                format!(
                    "{{\"number\":{},\"description\":{}}}",
                    number,
                    serde_json::json!(description)
                ),
            ),
            RunEvent::StepError { message } => (
                "step_error",
                format!("{{\"message\":{}}}", serde_json::json!(message)),
            ),
            RunEvent::RunComplete { summary } => (
                "run_complete",
                format!("{{\"summary\":{}}}", serde_json::json!(summary)),
            ),
            RunEvent::RunFailed { message } => (
                "run_failed",
                format!("{{\"message\":{}}}", serde_json::json!(message)),
            ),
            RunEvent::Ready => ("ready", "{}".to_string()),
        }
    }

    fn to_sse_event(&self) -> Event {
        let (name, data) = self.sse_parts();
        Event::default().event(name).data(data)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub event_tx: broadcast::Sender<RunEvent>,
}

/// Serve the runner over HTTP: POST /run executes a plan body and returns
/// its report, GET /events streams run progress as SSE. Binds `port`,
/// falling back to the next few ports if it is taken.
pub async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let (event_tx, _) = broadcast::channel::<RunEvent>(64);

    let state = Arc::new(AppState { config, event_tx });

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/run", post(run_handler))
        .route("/events", get(sse_handler))
        .with_state(state);

    let mut listener = None;
    for p in port..port.saturating_add(10) {
        match tokio::net::TcpListener::bind(format!("127.0.0.1:{p}")).await {
            Ok(l) => {
                listener = Some(l);
                break;
            }
            Err(_) => continue,
        }
    }
    let Some(listener) = listener else {
        anyhow::bail!("could not bind any port in {}..{}", port, port.saturating_add(10));
    };

    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Execute the plan in the request body and return its report.
///
/// The interpreter is blocking (real browser I/O), so it runs under
/// spawn_blocking; a server-side upper timeout guards against plans that
/// never finish. Each request gets its own browser session, so concurrent
/// runs never share state.
async fn run_handler(State(state): State<Arc<AppState>>, Json(plan): Json<Plan>) -> Response {
    info!(goal = %plan.goal, "POST /run");

    let config = state.config.clone();
    let events = state.event_tx.clone();
    let run_timeout = config.run_timeout;
    let task = tokio::task::spawn_blocking(move || {
        runner::run(&plan, &config, &mut |event| {
            let _ = events.send(event);
        })
    });

    let result = match tokio::time::timeout(run_timeout, task).await {
        Err(_) => {
            error!("run exceeded {}s", run_timeout.as_secs());
            return (StatusCode::GATEWAY_TIMEOUT, "run timed out").into_response();
        }
        Ok(Err(join_err)) => {
            error!("runner task failed: {join_err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "runner task failed").into_response();
        }
        Ok(Ok(result)) => result,
    };

    let _ = state.event_tx.send(RunEvent::Ready);

    match result {
        Ok(report) => Json(report).into_response(),
        Err(session_err) => {
            error!("{session_err}");
            (StatusCode::BAD_GATEWAY, session_err.to_string()).into_response()
        }
    }
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream =
        BroadcastStream::new(rx).filter_map(|result: Result<RunEvent, _>| match result {
            Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
            Err(_) => None,
        });
    Sse::new(stream)
}
