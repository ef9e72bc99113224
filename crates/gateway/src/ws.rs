//! WebSocket synthesis endpoint.
//!
//! One request per text message: `{"text": ..., "voice": ..., "speed": ...}`
//! in, a run of `{"type": "audio", "data": <b64>, "index": n}` frames out,
//! closed by `{"type": "done", "chunks": n}`; bad input gets
//! `{"type": "error", "data": ...}`. Voice and speed default to the
//! current config snapshot.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use docent_synthesis::{strip_markdown, ReorderBuffer, SentenceSplitter};

use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct TtsRequest {
    #[serde(default)]
    text: String,
    voice: Option<String>,
    speed: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TtsFrame {
    Audio { data: String, index: u64 },
    Done { chunks: u64 },
    Error { data: String },
}

pub async fn tts_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return,
            Ok(_) => continue,
        };

        let request: TtsRequest = match serde_json::from_str(&message) {
            Ok(request) => request,
            Err(e) => {
                if send_frame(&mut socket, &TtsFrame::Error { data: format!("invalid request: {e}") })
                    .await
                    .is_err()
                {
                    return;
                }
                continue;
            }
        };

        if request.text.trim().is_empty() {
            if send_frame(&mut socket, &TtsFrame::Error { data: "text is required".to_string() })
                .await
                .is_err()
            {
                return;
            }
            continue;
        }

        if synthesize_to_socket(&mut socket, &state, request).await.is_err() {
            return;
        }
    }
}

/// Run one synthesis request, streaming ordered audio frames. `Err` means
/// the socket is gone.
async fn synthesize_to_socket(
    socket: &mut WebSocket,
    state: &AppState,
    request: TtsRequest,
) -> Result<(), ()> {
    let snapshot = state.config.current();
    let voice = request
        .voice
        .unwrap_or_else(|| snapshot.tts_default_voice.clone());
    let speed = request.speed.unwrap_or(snapshot.tts_speed);

    metrics::counter!("docent_requests_total", "endpoint" => "tts_ws").increment(1);

    let (mut session, mut synth_rx) = state.synthesis.session(&snapshot.tts_provider, &voice, speed);
    let mut splitter = SentenceSplitter::new();
    let clean = strip_markdown(&request.text);
    let mut units = splitter.push(&clean);
    if let Some(last) = splitter.flush() {
        units.push(last);
    }
    for unit in units {
        session.dispatch(unit);
    }
    drop(session);

    let mut buffer = ReorderBuffer::new();
    let mut chunks = 0u64;
    while let Some((sequence, audio)) = synth_rx.recv().await {
        for (_, bytes) in buffer.complete(sequence, audio) {
            let frame = TtsFrame::Audio {
                data: base64::engine::general_purpose::STANDARD.encode(&bytes),
                index: chunks,
            };
            send_frame(socket, &frame).await?;
            chunks += 1;
        }
    }

    send_frame(socket, &TtsFrame::Done { chunks }).await
}

async fn send_frame(socket: &mut WebSocket, frame: &TtsFrame) -> Result<(), ()> {
    let payload = match serde_json::to_string(frame) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "TTS frame serialization failed");
            return Err(());
        }
    };
    socket.send(Message::Text(payload)).await.map_err(|_| ())
}
