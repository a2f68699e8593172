//! WebSocket transport for observers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use super::AppState;
use crate::hub::{FrameSink, FrameSource, InboundHandler, TransportError, serve_connection};

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| observe(socket, state))
}

async fn observe(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    let handler: Arc<dyn InboundHandler> = state.viewer.clone();

    let result = serve_connection(
        state.viewer.hub(),
        WsSink(sink),
        WsSource(stream),
        handler,
        state.viewer.connection_settings(),
        state.shutdown.child_token(),
    )
    .await;

    match result {
        Ok(reason) => crate::debug_event!("ws", "closed", "{reason:?}"),
        Err(e) => tracing::warn!("[ws] observer not registered: {e}"),
    }
}

fn transport_error(e: axum::Error) -> TransportError {
    TransportError::Failed(e.to_string())
}

struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(transport_error)
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.0
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(transport_error)
    }

    async fn close(&mut self) {
        let _ = self.0.send(Message::Close(None)).await;
        let _ = self.0.close().await;
    }
}

struct WsSource(SplitStream<WebSocket>);

#[async_trait]
impl FrameSource for WsSource {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => return None,
                // Pongs and binary frames carry nothing for us
                Ok(_) => continue,
                Err(e) => return Some(Err(transport_error(e))),
            }
        }
    }
}
