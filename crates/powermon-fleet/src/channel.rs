//! One-shot command delivery over TCP.
//!
//! ```text
//! connect (connect_timeout)
//!   → write one frame
//!     → read at most one reply line (reply_timeout), or EOF
//!       → drop the stream
//! ```
//!
//! The stream is owned by the delivery future, so it is closed on every
//! exit path, including timeouts and cancellation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use powermon_core::{CommandConfig, PowerAction, WorkerEndpoint};

use crate::command::CommandEncoder;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Longest reply line we are willing to buffer.
const MAX_REPLY_BYTES: u64 = 4096;

/// Why a command did not reach a worker.
#[derive(Debug, Error)]
pub enum CommandDeliveryError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Delivers a single power command to a single worker.
pub trait CommandChannel: Send + Sync {
    fn send<'a>(
        &'a self,
        endpoint: &'a WorkerEndpoint,
        action: PowerAction,
    ) -> BoxFuture<'a, Result<(), CommandDeliveryError>>;
}

/// Fresh TCP connection per command; no pooling.
#[derive(Debug, Clone)]
pub struct TcpCommandChannel {
    encoder: CommandEncoder,
    connect_timeout: Duration,
    reply_timeout: Duration,
}

impl TcpCommandChannel {
    pub fn new(encoder: CommandEncoder, connect_timeout: Duration, reply_timeout: Duration) -> Self {
        Self {
            encoder,
            connect_timeout,
            reply_timeout,
        }
    }

    pub fn from_config(config: &CommandConfig) -> Self {
        Self::new(
            CommandEncoder::from_config(config),
            config.connect_timeout,
            config.reply_timeout,
        )
    }

    /// Deliver `action` and return the worker's reply line, if it sent one.
    pub async fn deliver(
        &self,
        endpoint: &WorkerEndpoint,
        action: PowerAction,
    ) -> Result<Option<String>, CommandDeliveryError> {
        let frame = self.encoder.encode(action)?;
        let address = endpoint.address();

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address.as_str()))
            .await
            .map_err(|_| CommandDeliveryError::ConnectTimeout(self.connect_timeout))?
            .map_err(CommandDeliveryError::Connect)?;
        debug!(worker = %endpoint.name, %address, "connected");

        tokio::time::timeout(self.reply_timeout, stream.write_all(&frame))
            .await
            .map_err(|_| CommandDeliveryError::WriteTimeout(self.reply_timeout))?
            .map_err(CommandDeliveryError::Transport)?;
        debug!(
            worker = %endpoint.name,
            command = %String::from_utf8_lossy(&frame).trim_end(),
            "command sent"
        );

        let reply = self.read_reply(&mut stream).await?;
        match &reply {
            Some(line) => debug!(worker = %endpoint.name, reply = %line, "worker replied"),
            None => debug!(worker = %endpoint.name, "no reply"),
        }
        Ok(reply)
    }

    /// One newline-terminated frame, EOF, or nothing before the timeout.
    async fn read_reply(
        &self,
        stream: &mut TcpStream,
    ) -> Result<Option<String>, CommandDeliveryError> {
        let mut reader = BufReader::new(stream.take(MAX_REPLY_BYTES));
        let mut line = Vec::new();
        match tokio::time::timeout(self.reply_timeout, reader.read_until(b'\n', &mut line)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Ok(None),
            // Replies are only logged, so any bytes will do.
            Ok(Ok(_)) => Ok(Some(String::from_utf8_lossy(&line).trim_end().to_string())),
            Ok(Err(e)) => Err(CommandDeliveryError::Transport(e)),
        }
    }
}

impl CommandChannel for TcpCommandChannel {
    fn send<'a>(
        &'a self,
        endpoint: &'a WorkerEndpoint,
        action: PowerAction,
    ) -> BoxFuture<'a, Result<(), CommandDeliveryError>> {
        Box::pin(async move { self.deliver(endpoint, action).await.map(|_| ()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn channel(reply_timeout: Duration) -> TcpCommandChannel {
        TcpCommandChannel::new(CommandEncoder::default(), Duration::from_secs(1), reply_timeout)
    }

    async fn listener() -> (TcpListener, WorkerEndpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, WorkerEndpoint::new("worker", "127.0.0.1", port))
    }

    async fn read_frame(stream: &mut TcpStream) -> String {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn delivers_frame_and_reads_reply() {
        let (listener, endpoint) = listener().await;
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let frame = read_frame(&mut stream).await;
            stream.write_all(b"{\"id\":0,\"result\":true}\n").await.unwrap();
            frame
        });

        let reply = channel(Duration::from_secs(1))
            .deliver(&endpoint, PowerAction::Disable)
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("{\"id\":0,\"result\":true}"));

        let frame = server.await.unwrap();
        assert_eq!(
            frame,
            "{\"id\":0,\"jsonrpc\":\"2.0\",\"method\":\"control_gpu\",\"params\":[-1,0]}\n"
        );
    }

    #[tokio::test]
    async fn close_without_reply_is_delivered() {
        let (listener, endpoint) = listener().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_frame(&mut stream).await;
        });

        let reply = channel(Duration::from_secs(1))
            .deliver(&endpoint, PowerAction::Enable)
            .await
            .unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn silent_worker_releases_after_reply_timeout() {
        let (listener, endpoint) = listener().await;
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_frame(&mut stream).await;
            // Hold the connection open until the test finishes.
            let _ = done_rx.await;
        });

        let started = std::time::Instant::now();
        let reply = channel(Duration::from_millis(100))
            .deliver(&endpoint, PowerAction::Enable)
            .await
            .unwrap();
        assert_eq!(reply, None);
        assert!(started.elapsed() < Duration::from_secs(5));
        let _ = done_tx.send(());
    }

    #[tokio::test]
    async fn binary_reply_is_still_delivered() {
        let (listener, endpoint) = listener().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_frame(&mut stream).await;
            stream.write_all(b"\xff\xfeok\n").await.unwrap();
        });

        let reply = channel(Duration::from_secs(1))
            .deliver(&endpoint, PowerAction::Enable)
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("\u{fffd}\u{fffd}ok"));
    }

    #[tokio::test]
    async fn full_backlog_is_connect_timeout() {
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = socket.local_addr().unwrap();
        let _listener = socket.listen(1).unwrap();

        // Never accepted: once the accept queue is full, further SYNs go
        // unanswered and connects hang.
        let mut held = Vec::new();
        for _ in 0..16 {
            match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => held.push(stream),
                _ => break,
            }
        }

        let endpoint = WorkerEndpoint::new("worker", "127.0.0.1", addr.port());
        let connect_timeout = Duration::from_millis(100);
        let err = TcpCommandChannel::new(CommandEncoder::default(), connect_timeout, connect_timeout)
            .send(&endpoint, PowerAction::Disable)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandDeliveryError::ConnectTimeout(t) if t == connect_timeout));
    }

    #[tokio::test]
    async fn closed_port_is_connect_error() {
        let (listener, endpoint) = listener().await;
        drop(listener);

        let err = channel(Duration::from_secs(1))
            .send(&endpoint, PowerAction::Disable)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandDeliveryError::Connect(_)));
    }
}
