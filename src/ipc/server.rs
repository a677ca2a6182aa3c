//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications for
//! state change events to subscribed clients.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::events::StateEvent;
use crate::state::SessionStatus;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    status_rx: watch::Receiver<SessionStatus>,
    /// Template receiver; each subscriber gets its own copy
    events: broadcast::Receiver<StateEvent>,
    start_time: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        status_rx: watch::Receiver<SessionStatus>,
        events: broadcast::Receiver<StateEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to set socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            status_rx,
            events,
            start_time: Instant::now(),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let client = Client {
                        status_rx: self.status_rx.clone(),
                        events: self.events.resubscribe(),
                        start_time: self.start_time,
                    };
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = client.handle(stream) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Per-connection state
struct Client {
    status_rx: watch::Receiver<SessionStatus>,
    events: broadcast::Receiver<StateEvent>,
    start_time: Instant,
}

/// A request, or the reason one could not be parsed
type Incoming = std::result::Result<Request, String>;

impl Client {
    /// Handle a single client connection
    async fn handle(self, stream: UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (req_tx, mut req_rx) = mpsc::channel::<Incoming>(8);
        let reader_task = tokio::spawn(read_requests(reader, req_tx));

        let result = self.serve(&mut writer, &mut req_rx).await;

        reader_task.abort();
        result
    }

    /// Answer requests and forward events until the client disconnects
    async fn serve(
        &self,
        writer: &mut OwnedWriteHalf,
        req_rx: &mut mpsc::Receiver<Incoming>,
    ) -> Result<()> {
        let mut subscription: Option<broadcast::Receiver<StateEvent>> = None;

        loop {
            tokio::select! {
                incoming = req_rx.recv() => {
                    let Some(incoming) = incoming else {
                        debug!("client disconnected");
                        return Ok(());
                    };
                    let response = match incoming {
                        Ok(request) => {
                            debug!(?request, "received request");
                            self.process_request(request, &mut subscription)
                        }
                        Err(message) => Response::Error {
                            code: "bad_request".to_string(),
                            message,
                        },
                    };
                    send_message(writer, &response).await?;
                }
                event = next_event(&mut subscription) => match event {
                    Ok(event) => {
                        send_message(writer, &Notification::StateEvent { event }).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        subscription = None;
                    }
                },
            }
        }
    }

    /// Process a request and return a response
    fn process_request(
        &self,
        request: Request,
        subscription: &mut Option<broadcast::Receiver<StateEvent>>,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let session = self.status_rx.borrow().clone();
                let uptime = self.start_time.elapsed().as_secs();
                Response::Status(DaemonStatus::new(session, uptime))
            }

            Request::Subscribe => {
                if subscription.is_none() {
                    *subscription = Some(self.events.resubscribe());
                    debug!("client subscribed to notifications");
                }
                Response::Subscribed
            }
        }
    }
}

/// Next event for a subscribed client; never resolves otherwise
async fn next_event(
    subscription: &mut Option<broadcast::Receiver<StateEvent>>,
) -> std::result::Result<StateEvent, broadcast::error::RecvError> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read length-prefixed requests until EOF or an oversized frame
async fn read_requests(mut reader: OwnedReadHalf, tx: mpsc::Sender<Incoming>) {
    loop {
        let body = match read_frame(&mut reader).await {
            Ok(Some(body)) => body,
            Ok(None) => return,
            Err(e) => {
                debug!(?e, "client read ended");
                return;
            }
        };

        let incoming = serde_json::from_slice::<Request>(&body)
            .map_err(|e| format!("failed to parse request: {}", e));
        if tx.send(incoming).await.is_err() {
            return;
        }
    }
}

/// Read one frame; `None` on clean EOF
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    // Read message length (4-byte little-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large ({} bytes)", len);
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
