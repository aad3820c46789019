//! The production [`Transport`]: an unbounded channel drained by a
//! writer task that owns the socket's send half. Enqueueing never
//! blocks the hub, and the single drain task preserves per-connection
//! frame order.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;

use hubbub_core::{Transport, TransportError};

pub enum OutFrame {
    Text(String),
    Binary(Bytes),
}

pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutFrame>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send_text(&self, payload: &str) -> Result<(), TransportError> {
        self.tx
            .send(OutFrame::Text(payload.to_owned()))
            .map_err(|_| TransportError::Closed)
    }

    fn send_binary(&self, payload: Bytes) -> Result<(), TransportError> {
        self.tx
            .send(OutFrame::Binary(payload))
            .map_err(|_| TransportError::Closed)
    }
}

/// Drain the outbound queue into the socket until either side closes.
/// Runs as its own task; when it exits, every subsequent enqueue fails
/// and the hub reaps the connection on the next fanout.
pub async fn pump_outbound(
    mut rx: mpsc::UnboundedReceiver<OutFrame>,
    mut sink: SplitSink<WebSocket, Message>,
) {
    while let Some(frame) = rx.recv().await {
        let message = match frame {
            OutFrame::Text(text) => Message::Text(text.into()),
            OutFrame::Binary(data) => Message::Binary(data),
        };
        if sink.send(message).await.is_err() {
            break;
        }
    }
    rx.close();
}

/// Best-effort policy close before the connection is admitted.
pub async fn close_with_policy(mut sink: SplitSink<WebSocket, Message>, reason: &str) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: 1008,
            reason: reason.to_string().into(),
        })))
        .await;
}
