//! AsyncRuntime: a `tokio`-backed event loop exposing callback-style
//! file/directory/TCP/UDP/TLS operations as `async fn`s, built on
//! `tokio::spawn` and channel-based message passing as a standalone
//! component.
//!
//! ```rust,ignore
//! use u8core::runtime::Runtime;
//!
//! let rt = Runtime::new()?;
//! rt.block_on(async {
//!     let mut file = rt.open_file("Cargo.toml", OpenMode::Read, 0).await?;
//!     let bytes = file.read(4096).await?;
//!     Ok::<_, RuntimeError>(())
//! })?;
//! ```

mod file;
mod handle_state;
mod io_trait;
mod tcp;
mod tls;
mod udp;

pub use file::{AsyncDirectory, AsyncFile, DirEntry, EntryKind, FileStat, OpenMode};
pub use handle_state::{HandleState, HandleStateCell};
pub use io_trait::AsyncIo;
pub use tcp::{TcpHandle, TcpListenerHandle};
pub use tls::{TlsHandle, TlsListenerHandle};
pub use udp::{UdpHandle, UdpMode, UdpRecvSession};

use std::sync::Arc;
use thiserror::Error;

/// AsyncRuntime's unified error type.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("connection reset")]
    ConnectionReset,

    #[error("end of stream")]
    Eof,

    #[error("TLS handshake timed out")]
    TlsHandshakeTimeout,

    #[error("TLS connect timed out")]
    TlsConnectTimeout,

    #[error("invalid handle state transition: {0}")]
    InvalidState(String),

    #[error("handle closed")]
    Closed,

    #[error("TLS error: {0}")]
    Tls(String),
}

impl RuntimeError {
    /// A short, user-facing description, never a `{:?}`-formatted internal.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// The async runtime: a thin wrapper over a `tokio::runtime::Runtime`,
/// exposing the file/TCP/UDP/TLS components as methods. Additional
/// "auxiliary loops" are constructed the same way, each owning its own
/// OS thread, mirroring the reference implementation's primary/auxiliary
/// loop split without reimplementing a bespoke event loop.
pub struct Runtime {
    inner: Arc<tokio::runtime::Runtime>,
}

impl Runtime {
    /// Build a new multi-thread runtime to serve as the primary loop.
    pub fn new() -> RuntimeResult<Self> {
        let inner = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Build an auxiliary loop: a fully independent runtime with its own
    /// thread pool, a full sibling of the primary loop.
    pub fn new_auxiliary() -> RuntimeResult<Self> {
        Self::new()
    }

    pub fn handle(&self) -> tokio::runtime::Handle {
        self.inner.handle().clone()
    }

    /// Run a future to completion on this runtime, blocking the calling
    /// thread.
    pub fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.inner.block_on(fut)
    }

    /// Spawn a future onto this runtime without blocking the caller.
    pub fn spawn<F>(&self, fut: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    /// Shut the runtime down, waiting up to `timeout` for in-flight tasks.
    pub fn shutdown(self, timeout: std::time::Duration) {
        if let Ok(inner) = Arc::try_unwrap(self.inner) {
            inner.shutdown_timeout(timeout);
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_future_to_completion() {
        let rt = Runtime::new().unwrap();
        let result = rt.block_on(async { 1 + 1 });
        assert_eq!(result, 2);
    }

    #[test]
    fn spawns_concurrent_work() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let handle = rt.spawn(async { 41 + 1 });
            let value = handle.await.unwrap();
            assert_eq!(value, 42);
        });
    }

    #[test]
    fn describe_never_debug_formats() {
        let err = RuntimeError::ConnectionReset;
        assert_eq!(err.describe(), "connection reset");
    }
}
