use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use optisync_core::{ShapeSource, ShapeStream, StreamError};
use optisync_proto::{decode_frame, Offset, ShapeMessage, TableName};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const SHAPE_PATH: &str = "/v1/shape";

/// Opens change-stream sessions against a shape-log server over WebSocket
#[derive(Debug, Clone)]
pub struct WebsocketShapeSource {
    endpoint: Url,
}

impl WebsocketShapeSource {
    /// Accepts `ws://`, `wss://`, `http://`, `https://` or a bare host (treated as `wss://`)
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&Self::normalize_url(server_url))?;
        info!("Creating WebSocket shape source for {}", endpoint);
        Ok(Self { endpoint })
    }

    fn normalize_url(url: &str) -> String {
        let url = url.trim_end_matches('/');
        match url {
            u if u.starts_with("ws://") || u.starts_with("wss://") => format!("{}{}", u, SHAPE_PATH),
            u if u.starts_with("http://") => format!("ws://{}{}", &u[7..], SHAPE_PATH),
            u if u.starts_with("https://") => format!("wss://{}{}", &u[8..], SHAPE_PATH),
            u => format!("wss://{}{}", u, SHAPE_PATH),
        }
    }

    /// The session URL for `table`, resuming after `offset`
    pub fn shape_url(&self, table: &TableName, offset: Offset) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("table", table.as_str()).append_pair("offset", &offset.to_string());
        url
    }
}

#[async_trait]
impl ShapeSource for WebsocketShapeSource {
    async fn connect(&self, table: &TableName, offset: Offset) -> Result<ShapeStream, StreamError> {
        let url = self.shape_url(table, offset);
        info!("Attempting to connect to {}", url);
        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|e| StreamError::Connect(e.to_string()))?;
        info!("WebSocket handshake completed with {}", url);

        Ok(ws_stream.flat_map(|msg| stream::iter(handle_incoming_message(msg))).boxed())
    }
}

fn handle_incoming_message(msg: Result<Message, tokio_tungstenite::tungstenite::Error>) -> Vec<Result<ShapeMessage, StreamError>> {
    match msg {
        Ok(Message::Text(text)) => decode(text.as_str()),
        Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
            Ok(text) => decode(text),
            Err(e) => vec![Err(StreamError::Decode(e.to_string()))],
        },
        Ok(Message::Close(_)) => {
            info!("WebSocket connection closed by server");
            Vec::new()
        }
        Ok(_) => {
            debug!("Received ping/pong or raw frame");
            Vec::new()
        }
        Err(e) => {
            warn!("WebSocket error: {}", e);
            vec![Err(StreamError::Transport(e.to_string()))]
        }
    }
}

fn decode(frame: &str) -> Vec<Result<ShapeMessage, StreamError>> {
    match decode_frame(frame) {
        Ok(messages) => {
            debug!("Received {} shape messages", messages.len());
            messages.into_iter().map(Ok).collect()
        }
        Err(e) => vec![Err(StreamError::Decode(e.to_string()))],
    }
}
