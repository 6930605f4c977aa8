//! Connection Handler
//!
//! Each client gets its own task running a read → decode → execute → reply
//! loop until the client disconnects, an error occurs, or the server shuts
//! down.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! Connected ──► Reading ◄──► Dispatching
//!                  │
//!                  ▼
//!               Closed   (peer EOF, I/O error, protocol error, shutdown)
//! ```
//!
//! ## Framing
//!
//! By default every socket read is treated as exactly one request frame,
//! which is how simple request/response clients behave. A request split
//! across reads, or several requests in one read, is not handled in that
//! mode: the first is a protocol error and the rest of the second is
//! discarded. [`FrameMode::Pipelined`] buffers bytes across reads and
//! answers every complete frame instead.

use crate::commands::CommandHandler;
use crate::config::READ_BUFFER_SIZE;
use crate::protocol::{decode_frame, Command, ProtocolError, RespValue};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Upper bound on buffered, not yet decoded bytes in pipelined mode (64 MB)
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// How request frames are cut out of the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMode {
    /// Each read holds exactly one request
    #[default]
    PerRead,
    /// Bytes accumulate until complete frames can be decoded
    Pipelined,
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent bytes that are not a valid request
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The stream ended in the middle of a frame
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("buffer size limit exceeded")]
    BufferFull,
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    /// Scratch space for one read
    chunk: Box<[u8]>,
    /// Undecoded bytes (pipelined mode only)
    buffer: BytesMut,
    command_handler: CommandHandler,
    mode: FrameMode,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        mode: FrameMode,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            chunk: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            buffer: BytesMut::new(),
            command_handler,
            mode,
            shutdown,
        }
    }

    /// Runs the connection until it closes.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed with error"),
        }

        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let n = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => {
                    debug!(client = %self.addr, "Closing connection for shutdown");
                    return Ok(());
                }
                read = self.stream.get_mut().read(&mut self.chunk) => read?,
            };

            if n == 0 {
                return if self.buffer.is_empty() {
                    Ok(())
                } else {
                    Err(ConnectionError::UnexpectedEof)
                };
            }
            trace!(client = %self.addr, bytes = n, "Read data");

            match self.mode {
                FrameMode::PerRead => self.handle_read(n).await?,
                FrameMode::Pipelined => self.handle_buffered(n).await?,
            }
        }
    }

    /// Decodes the last read as one request and answers it.
    async fn handle_read(&mut self, n: usize) -> Result<(), ConnectionError> {
        let command = match decode_frame(&self.chunk[..n]) {
            Ok(Some((command, consumed))) => {
                if consumed < n {
                    warn!(
                        client = %self.addr,
                        discarded = n - consumed,
                        "Ignoring bytes after the first frame"
                    );
                }
                command
            }
            Ok(None) => return self.reject(ProtocolError::Incomplete).await,
            Err(e) => return self.reject(e).await,
        };

        self.dispatch(command).await
    }

    /// Appends the last read to the buffer and answers every complete frame.
    async fn handle_buffered(&mut self, n: usize) -> Result<(), ConnectionError> {
        if self.buffer.len() + n > MAX_BUFFER_SIZE {
            warn!(client = %self.addr, size = self.buffer.len(), "Buffer size limit exceeded");
            return Err(ConnectionError::BufferFull);
        }
        self.buffer.extend_from_slice(&self.chunk[..n]);

        loop {
            match decode_frame(&self.buffer) {
                Ok(Some((command, consumed))) => {
                    self.buffer.advance(consumed);
                    self.dispatch(command).await?;
                }
                Ok(None) => {
                    trace!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        "Incomplete frame, need more data"
                    );
                    return Ok(());
                }
                Err(e) => return self.reject(e).await,
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<(), ConnectionError> {
        trace!(client = %self.addr, command = %command.name, args = command.args.len(), "Executing");

        let response = match self.command_handler.execute(command).await {
            Ok(response) => response,
            Err(e) => {
                debug!(client = %self.addr, error = %e, "Command failed");
                e.to_resp()
            }
        };
        self.send_response(&response).await
    }

    /// Answers a malformed frame and ends the connection; the stream
    /// position can no longer be trusted.
    async fn reject(&mut self, error: ProtocolError) -> Result<(), ConnectionError> {
        warn!(client = %self.addr, error = %error, "Protocol error");
        let reply = RespValue::error(format!("ERR Protocol error: {}", error));
        // Best effort: the connection is closing either way.
        let _ = self.send_response(&reply).await;
        Err(ConnectionError::Protocol(error))
    }

    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(client = %self.addr, bytes = bytes.len(), reply = %response, "Sent response");
        Ok(())
    }
}

/// Resolves once the shutdown flag is raised or its sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Runs a connection to completion, logging how it ended.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    mode: FrameMode,
    shutdown: watch::Receiver<bool>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, mode, shutdown);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}
