use anyhow::{Result, anyhow};
use autocontinue::StatusView;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::mpsc;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Commands from the status panel to the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    Toggle,
    ToggleContinuous,
    SetMaxActions(u32),
}

#[derive(Clone)]
pub struct AppState {
    pub cmd_tx: mpsc::Sender<UiCommand>,
    pub status_rx: watch::Receiver<Option<StatusView>>,
}

#[derive(Deserialize)]
struct MaxActionsPayload {
    value: u32,
}

/// Serve the status panel on the first free port from `port`. Returns the
/// command receiver and the status publisher.
pub async fn start_server(
    port: u16,
) -> Result<(mpsc::Receiver<UiCommand>, watch::Sender<Option<StatusView>>)> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<UiCommand>();
    let (status_tx, status_rx) = watch::channel::<Option<StatusView>>(None);

    let state = Arc::new(AppState { cmd_tx, status_rx });

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/status", get(status_handler))
        .route("/events", get(sse_handler))
        .route("/toggle", post(toggle_handler))
        .route("/continuous", post(continuous_handler))
        .route("/max-actions", post(max_actions_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state);

    let mut bound = None;
    for p in port..port.saturating_add(10) {
        match tokio::net::TcpListener::bind(("127.0.0.1", p)).await {
            Ok(l) => {
                bound = Some((l, p));
                break;
            }
            Err(e) => debug!(port = p, "port unavailable: {e}"),
        }
    }
    let (listener, port) = bound.ok_or_else(|| {
        anyhow!(
            "could not bind any port in {port}..{}",
            port.saturating_add(10)
        )
    })?;

    info!("status panel at http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("status panel stopped: {e}");
        }
    });

    Ok((cmd_rx, status_tx))
}

fn send(state: &AppState, cmd: UiCommand) -> StatusCode {
    debug!(?cmd, "panel command");
    match state.cmd_tx.send(cmd) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<Option<StatusView>> {
    Json(*state.status_rx.borrow())
}

async fn toggle_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    send(&state, UiCommand::Toggle)
}

async fn continuous_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    send(&state, UiCommand::ToggleContinuous)
}

async fn max_actions_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MaxActionsPayload>,
) -> StatusCode {
    send(&state, UiCommand::SetMaxActions(payload.value))
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.status_rx.clone()).filter_map(|view| {
        let view = view?;
        let event = Event::default().event("status").json_data(StatusPayload::from(view));
        event.ok().map(Ok::<_, Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// The view plus the strings the panel shows verbatim.
#[derive(serde::Serialize)]
struct StatusPayload {
    #[serde(flatten)]
    view: StatusView,
    routine: &'static str,
    clicks: String,
    color: &'static str,
}

impl From<StatusView> for StatusPayload {
    fn from(view: StatusView) -> Self {
        Self {
            routine: view.routine_label(),
            clicks: view.clicks_label(),
            color: view.color(),
            view,
        }
    }
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Auto Continue</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    height: 100vh;
    display: flex;
    align-items: center;
    justify-content: center;
  }
  .card {
    background: #111118;
    border: 1px solid #1a1a2e;
    border-radius: 12px;
    padding: 24px 32px;
    display: flex;
    flex-direction: column;
    gap: 16px;
    min-width: 320px;
  }
  .row { display: flex; align-items: center; gap: 12px; }
  #toggle {
    width: 48px; height: 48px;
    border-radius: 50%;
    border: 2px solid #fff;
    color: #fff;
    font-size: 20px;
    font-weight: bold;
    cursor: pointer;
    background: rgba(0, 0, 0, 0.8);
  }
  #routine { font-size: 18px; font-weight: 600; }
  #clicks { font-family: 'Consolas', monospace; color: #aaa; }
  .hint { font-size: 12px; color: #666; }
  input {
    background: #0a0a0f;
    border: 1px solid #222;
    border-radius: 8px;
    padding: 8px 12px;
    color: #fff;
    width: 80px;
  }
  button.plain {
    background: #6366f1;
    color: #fff;
    border: none;
    border-radius: 8px;
    padding: 8px 16px;
    cursor: pointer;
  }
</style>
</head>
<body>
  <div class="card">
    <div class="row">
      <button id="toggle" title="Click: on/off. Hold: continuous mode">&gt;&gt;</button>
      <div>
        <div id="routine">Waiting for chat page...</div>
        <div id="clicks"></div>
      </div>
    </div>
    <div class="row">
      <input type="number" id="max" min="0" placeholder="max" />
      <button class="plain" onclick="setMax()">Set max auto-clicks</button>
    </div>
    <div class="hint">0 = continuous mode</div>
  </div>
<script>
  const toggle = document.getElementById('toggle');
  let pressTimer = null, longPress = false;

  toggle.addEventListener('mousedown', e => {
    if (e.button !== 0) return;
    longPress = false;
    pressTimer = setTimeout(() => { longPress = true; fetch('/continuous', { method: 'POST' }); }, 500);
  });
  toggle.addEventListener('mouseup', e => {
    if (e.button !== 0) return;
    clearTimeout(pressTimer);
    if (!longPress) fetch('/toggle', { method: 'POST' });
    longPress = false;
  });
  toggle.addEventListener('mouseleave', () => { clearTimeout(pressTimer); longPress = false; });

  async function setMax() {
    const value = parseInt(document.getElementById('max').value, 10);
    if (isNaN(value) || value < 0) { alert('Invalid number.'); return; }
    await fetch('/max-actions', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ value }),
    });
  }

  const es = new EventSource('/events');
  es.addEventListener('status', e => {
    const d = JSON.parse(e.data);
    document.getElementById('routine').textContent = 'Routine: ' + d.routine;
    document.getElementById('clicks').textContent = d.clicks;
    toggle.style.backgroundColor = d.color;
  });
</script>
</body>
</html>
"##;
