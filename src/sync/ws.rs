//! Live channel over a websocket.

use futures::channel::mpsc;
use futures::future::LocalBoxFuture;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio_websockets::{ClientBuilder, Message};

use crate::error::TransportError;
use crate::models::messages::{ClientFrame, ServerFrame};
use crate::sync::transport::{Channel, ChannelConnector, ChannelEvent};

/// Opens `{ws_base_url}/ws/chess/{game_id}/?token=...`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn channel_url(&self, game_id: &str, token: &str) -> String {
        format!("{}/ws/chess/{}/?token={}", self.base_url, game_id, token)
    }
}

/// Unknown or malformed frames are dropped; only transport errors fail the
/// channel.
pub(crate) fn decode_frame(text: &str) -> Option<ChannelEvent> {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => Some(ChannelEvent::Frame(frame)),
        Err(e) => {
            warn!("Ignoring undecodable frame: {}", e);
            None
        }
    }
}

impl ChannelConnector for WsConnector {
    fn connect(&self, game_id: &str, token: &str) -> LocalBoxFuture<'static, Result<Channel, TransportError>> {
        let url = self.channel_url(game_id, token);
        let game_id = game_id.to_string();
        Box::pin(async move {
            let builder = ClientBuilder::new()
                .uri(&url)
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            let (socket, _) = builder
                .connect()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            info!("Live channel open for game {}", game_id);

            let (mut sink, stream) = socket.split();
            let (outbound, mut pending) = mpsc::unbounded::<ClientFrame>();

            // Writer: ends when the session drops its sender, which closes the socket.
            actix_rt::spawn(async move {
                while let Some(frame) = pending.next().await {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Could not encode {:?}: {}", frame, e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::text(text)).await {
                        warn!("Channel write failed: {}", e);
                        break;
                    }
                }
                let _ = sink.close().await;
                debug!("Channel writer finished");
            });

            let events = stream
                .filter_map(|item| async move {
                    match item {
                        Ok(message) if message.is_close() => Some(ChannelEvent::Closed),
                        Ok(message) => message.as_text().and_then(decode_frame),
                        Err(e) => Some(ChannelEvent::Failed(e.to_string())),
                    }
                })
                .chain(futures::stream::once(async { ChannelEvent::Closed }))
                .boxed_local();

            Ok(Channel { outbound, events })
        })
    }
}
