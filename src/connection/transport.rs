use {
    async_trait::async_trait,
    futures_util::StreamExt,
    tokio::net::TcpStream,
    tokio_tungstenite::{
        connect_async,
        tungstenite::{self, Message},
        MaybeTlsStream, WebSocketStream,
    },
    url::Url,
};

#[derive(Debug)]
pub enum TransportError {
    Connect(String),
    Stream(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "Connection error: {}", msg),
            TransportError::Stream(msg) => write!(f, "Stream error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<tungstenite::Error> for TransportError {
    fn from(e: tungstenite::Error) -> Self {
        TransportError::Stream(e.to_string())
    }
}

/// Opens connections to the live stats endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn FrameStream>, TransportError>;
}

/// Inbound text frames of one open connection
///
/// `None` means the connection closed.
#[async_trait]
pub trait FrameStream: Send {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &Url) -> Result<Box<dyn FrameStream>, TransportError> {
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WebSocketFrames { ws }))
    }
}

struct WebSocketFrames {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameStream for WebSocketFrames {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Close(frame))) => {
                    log::debug!("Server closed connection: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite; binary frames are not part of the protocol
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            }
        }
    }
}
