//! Live tail: mirror a game's frame log to one observer until the game stops.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use ludus_controller::{with_deadline, ControllerClient, ListGameFramesRequest};
use ludus_kernel::{Frame, GameId, GameStatus};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("observer connection: {0}")]
    Connection(String),
}

/// Where a live tail delivers frames.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Normal-closure handshake. Called exactly once when the tail ends.
    async fn close(&mut self) -> Result<(), SinkError>;
}

/// Pushes each frame as one JSON text message.
pub struct WebSocketSink {
    socket: WebSocket,
}

impl WebSocketSink {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let text = serde_json::to_string(frame)?;
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: Cow::Borrowed(""),
            })))
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))
    }
}

/// Stream every frame of `id` to `sink`, in turn order, then close it.
///
/// Polls from the last forwarded offset. An empty poll checks the game
/// status and the tail ends once the game is no longer running. Any controller
/// or sink failure ends the tail. Returns the number of frames forwarded.
pub async fn live_tail<S>(
    client: &dyn ControllerClient,
    id: &GameId,
    sink: &mut S,
    poll_timeout: Duration,
) -> usize
where
    S: FrameSink + ?Sized,
{
    let mut offset: usize = 0;
    let mut forwarded = 0;

    'poll: loop {
        let req = ListGameFramesRequest::new(id.clone()).with_offset(offset as i64);
        let listed = with_deadline(
            poll_timeout,
            "list_game_frames",
            client.list_game_frames(&req),
        )
        .await;
        let page = match listed {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(
                    game = %id,
                    error = %e,
                    "error while retrieving frames from controller"
                );
                break;
            }
        };

        for frame in &page.frames {
            if let Err(e) = sink.send_frame(frame).await {
                tracing::error!(
                    game = %id,
                    turn = frame.turn,
                    error = %e,
                    "unable to write frame to observer"
                );
                break 'poll;
            }
            forwarded += 1;
        }
        offset += page.frames.len();

        if page.frames.is_empty() {
            match with_deadline(poll_timeout, "status", client.status(id)).await {
                Ok(status) if status.game.status == GameStatus::Running => {}
                Ok(_) => break,
                Err(e) => {
                    tracing::error!(
                        game = %id,
                        error = %e,
                        "error while retrieving game status from controller"
                    );
                    break;
                }
            }
        }
    }

    if let Err(e) = sink.close().await {
        tracing::warn!(game = %id, error = %e, "problem closing observer stream");
    }
    tracing::debug!(game = %id, frames = forwarded, "live tail finished");
    forwarded
}
