//! WebSocket channel and HTTP side-calls for the client.
//!
//! Provides [`Channel`], a handle to one open room channel, and
//! [`HttpClient`] for the health probe, network info, file transfer, and
//! transcript export. This is a thin layer that only moves bytes; protocol
//! logic remains in the Sans-IO [`Client`](crate::Client).

use std::{path::Path, time::Duration};

use futures_util::{SinkExt, StreamExt, TryStreamExt};
use parley_proto::{ClientFrame, ExportRequest, HealthResponse, NetworkInfo, ServerFrame};
use thiserror::Error;
use tokio::{io::AsyncWriteExt, sync::mpsc};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Message, protocol::frame::coding::CloseCode},
};
use tokio_util::io::ReaderStream;
use url::Url;

/// Server used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server URL could not be parsed or converted.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// Channel could not be opened.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(String),

    /// Local file I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel task is gone.
    #[error("channel closed")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Server endpoints derived from one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrls {
    base: Url,
}

impl ServerUrls {
    /// Resolve a configured server address.
    ///
    /// `auto` (or empty) means [`DEFAULT_SERVER_URL`]; anything else is used
    /// verbatim.
    pub fn resolve(raw: &str) -> Result<Self, TransportError> {
        let raw = raw.trim();
        let raw = if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
            DEFAULT_SERVER_URL
        } else {
            raw
        };

        let base = Url::parse(raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;
        match base.scheme() {
            "http" | "https" => Ok(Self { base }),
            other => Err(TransportError::InvalidUrl(format!("unsupported scheme {other}"))),
        }
    }

    /// Base HTTP URL, without a trailing slash.
    pub fn base(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Channel URL: `ws`/`wss` scheme and `/ws` path.
    pub fn channel(&self) -> Result<Url, TransportError> {
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        let mut url = self.join("ws")?;
        url.set_scheme(scheme)
            .map_err(|()| TransportError::InvalidUrl(format!("cannot use scheme {scheme}")))?;
        Ok(url)
    }

    /// Health probe endpoint.
    pub fn health(&self) -> Result<Url, TransportError> {
        self.join("health")
    }

    /// Network info endpoint.
    pub fn info(&self) -> Result<Url, TransportError> {
        self.join("info")
    }

    /// Transcript export endpoint.
    pub fn export(&self) -> Result<Url, TransportError> {
        self.join("export")
    }

    fn join(&self, path: &str) -> Result<Url, TransportError> {
        let mut base = self.base.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path).map_err(|e| TransportError::InvalidUrl(e.to_string()))
    }
}

/// Events produced by an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A decoded server frame.
    Frame(ServerFrame),
    /// The channel ended.
    Closed {
        /// The server closed deliberately and must not be retried.
        server_initiated: bool,
        /// Human-readable reason.
        reason: String,
    },
}

/// Whether a close code from the server ends the session for good.
///
/// Only a policy close (1008) or an application code (4000-4999) means the
/// server removed this client. Normal closure, going away, restarts, and
/// errors are treated as transient and retried.
pub fn is_forced_close(code: CloseCode) -> bool {
    matches!(code, CloseCode::Policy) || matches!(u16::from(code), 4000..=4999)
}

/// Handle to an open room channel.
///
/// Frames are sent and received via the channels; an internal task handles
/// the WebSocket I/O. Dropping the handle stops the task.
pub struct Channel {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<ClientFrame>,
    /// Receive events from the server.
    pub from_server: mpsc::Receiver<ChannelEvent>,
    abort_handle: tokio::task::AbortHandle,
}

impl Channel {
    /// Stop the channel.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Open the room channel.
pub async fn open_channel(url: &Url, timeout: Duration) -> Result<Channel, TransportError> {
    let connect = connect_async(url.as_str());
    let (stream, _) = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| TransportError::Connection(format!("timed out after {timeout:?}")))?
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<ClientFrame>(64);
    let (from_server_tx, from_server_rx) = mpsc::channel::<ChannelEvent>(256);

    let handle = tokio::spawn(run_channel(stream, to_server_rx, from_server_tx));

    Ok(Channel {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Bridge between the frame channels and the WebSocket.
async fn run_channel(
    stream: WsStream,
    mut to_server: mpsc::Receiver<ClientFrame>,
    from_server: mpsc::Sender<ChannelEvent>,
) {
    let (mut sink, mut source) = stream.split();

    let closed = loop {
        tokio::select! {
            outgoing = to_server.recv() => {
                let Some(frame) = outgoing else {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                };
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, event = frame.name(), "failed to encode frame");
                        continue;
                    },
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    break ChannelEvent::Closed { server_initiated: false, reason: e.to_string() };
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ServerFrame::decode(&text) {
                    Ok(frame) => {
                        if from_server.send(ChannelEvent::Frame(frame)).await.is_err() {
                            return;
                        }
                    },
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
                },
                Some(Ok(Message::Binary(bytes))) => {
                    tracing::warn!(len = bytes.len(), "dropping binary frame");
                },
                Some(Ok(Message::Close(frame))) => {
                    let (server_initiated, reason) = match frame {
                        Some(f) => (is_forced_close(f.code), f.reason.to_string()),
                        None => (false, "server closed the channel".to_string()),
                    };
                    break ChannelEvent::Closed { server_initiated, reason };
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    break ChannelEvent::Closed { server_initiated: false, reason: e.to_string() };
                },
                None => {
                    break ChannelEvent::Closed {
                        server_initiated: false,
                        reason: "transport close".to_string(),
                    };
                },
            },
        }
    };

    let _ = from_server.send(closed).await;
}

/// HTTP side-calls against one server.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    urls: ServerUrls,
}

impl HttpClient {
    /// Build a client with bounded connect time.
    pub fn new(urls: ServerUrls, connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client, urls })
    }

    /// Endpoints in use.
    pub fn urls(&self) -> &ServerUrls {
        &self.urls
    }

    /// Best-effort liveness probe. `None` on any failure.
    pub async fn health(&self, timeout: Duration) -> Option<HealthResponse> {
        let url = self.urls.health().ok()?;
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(status = %r.status(), "health probe rejected");
                return None;
            },
            Err(e) => {
                tracing::warn!(error = %e, "health probe failed");
                return None;
            },
        };
        // A reachable server with an unexpected body still counts as alive
        Some(response.json::<HealthResponse>().await.unwrap_or_default())
    }

    /// Server's externally visible address.
    pub async fn network_info(&self) -> Result<NetworkInfo, TransportError> {
        let response = self.client.get(self.urls.info()?).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Write a local file to a presigned destination, reporting
    /// `(sent, total)` as bytes go out.
    pub async fn upload(
        &self,
        path: &Path,
        presigned_url: &str,
        content_type: &str,
        progress: mpsc::UnboundedSender<(u64, u64)>,
    ) -> Result<(), TransportError> {
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();

        let mut sent = 0u64;
        let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
            sent += chunk.len() as u64;
            let _ = progress.send((sent, total));
        });

        self.client
            .put(presigned_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetch a resolved download location into `dest`. Returns bytes written.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let mut file = tokio::fs::File::create(dest).await?;

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Render a transcript. Returns the document bytes.
    pub async fn export(&self, request: &ExportRequest) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .post(self.urls.export()?)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
