use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use maze_shift_server::ai::SeededTieBreaker;
use maze_shift_server::config::ServerConfig;
use maze_shift_server::outbound::Outbound;
use maze_shift_server::protocol::{parse_client_message, ClientMessage};
use maze_shift_server::room::GameHandle;
use maze_shift_server::server_utils::{sanitize_name, start_options};
use maze_shift_server::types::SessionId;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const SESSION_QUEUE_CAPACITY: usize = 256;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Per-session bounded queues drained by one writer task each.
#[derive(Default)]
struct ChannelOutbound {
    sessions: Mutex<HashMap<SessionId, mpsc::Sender<String>>>,
}

impl ChannelOutbound {
    fn register(&self, session: SessionId, tx: mpsc::Sender<String>) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session, tx);
        }
    }

    fn unregister(&self, session: SessionId) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(&session);
        }
    }
}

impl Outbound for ChannelOutbound {
    fn send_to(&self, session: SessionId, message: &Value) {
        let Ok(sessions) = self.sessions.lock() else {
            return;
        };
        let Some(tx) = sessions.get(&session) else {
            return;
        };
        if let Err(error) = tx.try_send(message.to_string()) {
            warn!(%session, %error, "dropping outbound message");
        }
    }
}

#[derive(Clone)]
struct AppState {
    game: GameHandle,
    outbound: Arc<ChannelOutbound>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    let room_config = config.room_config(rand::random::<u32>());
    info!(seed = room_config.seed, "room configured");

    let outbound = Arc::new(ChannelOutbound::default());
    let tie_breaker = Arc::new(SeededTieBreaker::new(room_config.seed));
    let game = GameHandle::new(room_config, outbound.clone(), tie_breaker);
    let state = AppState { game, outbound };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(port = config.port, "listening");
    axum::serve(listener, app).await
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let session = SessionId(NEXT_SESSION.fetch_add(1, Ordering::Relaxed));
    let (tx, mut rx) = mpsc::channel::<String>(SESSION_QUEUE_CAPACITY);
    state.outbound.register(session, tx);
    debug!(%session, "socket opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => handle_client_message(&state, session, raw.as_str()).await,
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_client_message(&state, session, text).await,
                Err(_) => send_invalid(&state, session, "invalid utf8 message"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.outbound.unregister(session);
    state.game.disconnect(session).await;
    debug!(%session, "socket closed");
    let _ = writer.await;
}

async fn handle_client_message(state: &AppState, session: SessionId, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        send_invalid(state, session, "invalid message");
        return;
    };

    let game = &state.game;
    let result = match message {
        ClientMessage::Hello {
            name,
            reconnect_token,
        } => game
            .connect(session, &sanitize_name(&name), reconnect_token.as_deref())
            .await
            .map(|_| ()),
        ClientMessage::Start {
            rows,
            cols,
            treasures,
            minutes,
        } => {
            let options =
                start_options(&game.config().default_options, rows, cols, treasures, minutes);
            game.start(session, Some(options)).await
        }
        ClientMessage::Leave => game.leave(session).await,
        ClientMessage::Action(action) => game.act(session, action).await.map(|_| ()),
        ClientMessage::Ping { t } => {
            state
                .outbound
                .send_to(session, &json!({ "type": "pong", "t": t }));
            Ok(())
        }
    };

    if let Err(error) = result {
        game.report_error(session, &error);
    }
}

fn send_invalid(state: &AppState, session: SessionId, message: &str) {
    state.outbound.send_to(
        session,
        &json!({ "type": "error", "code": "invalid_message", "message": message }),
    );
}
