//! TCP component: listener and connection handles, with per-handle
//! single-consumer queues enforcing FIFO read/write completion order, the
//! same ordering guarantee a connection pool needs for in-order message
//! delivery over a shared socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;

use super::handle_state::{HandleState, HandleStateCell};
use super::io_trait::AsyncIo;
use super::{RuntimeError, RuntimeResult};

/// A bound, listening TCP socket. `.accept()` yields each new incoming
/// connection as a child `TcpHandle`.
pub struct TcpListenerHandle {
    listener: TcpListener,
}

impl TcpListenerHandle {
    pub async fn listen(ip: &str, port: u16, backlog: u32) -> RuntimeResult<Self> {
        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .map_err(|e| RuntimeError::InvalidArgument(format!("bad listen address: {e}")))?;

        let socket = if addr.is_ipv4() {
            socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None)?
        } else {
            socket2::Socket::new(socket2::Domain::IPV6, socket2::Type::STREAM, None)?
        };
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog as i32)?;
        socket.set_nonblocking(true)?;

        let listener = TcpListener::from_std(socket.into())?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> RuntimeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept(&self) -> RuntimeResult<TcpHandle> {
        let (stream, peer) = self.listener.accept().await?;
        Ok(TcpHandle::from_stream(stream, peer))
    }
}

/// A connected TCP stream. Reads and writes are each routed through a
/// single-consumer async mutex so concurrent callers observe FIFO
/// completion order rather than racing the underlying socket.
pub struct TcpHandle {
    state: HandleStateCell,
    stream: AsyncMutex<TcpStream>,
    peer_addr: SocketAddr,
    reset: AtomicBool,
}

impl TcpHandle {
    fn from_stream(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        let state = HandleStateCell::new();
        state.transition(HandleState::Opening).ok();
        state.transition(HandleState::Ready).ok();
        Self {
            state,
            stream: AsyncMutex::new(stream),
            peer_addr,
            reset: AtomicBool::new(false),
        }
    }

    pub async fn connect(bind_ip: &str, bind_port: u16, ip: &str, port: u16) -> RuntimeResult<Self> {
        let bind_addr: SocketAddr = format!("{bind_ip}:{bind_port}")
            .parse()
            .map_err(|e| RuntimeError::InvalidArgument(format!("bad bind address: {e}")))?;
        let peer_addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .map_err(|e| RuntimeError::InvalidArgument(format!("bad peer address: {e}")))?;

        let domain = if peer_addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };
        let socket = socket2::Socket::new(domain, socket2::Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&bind_addr.into())?;
        socket.set_nonblocking(true)?;

        let std_stream: std::net::TcpStream = socket.into();
        let stream = TcpStream::from_std(std_stream)?;
        stream.connect(peer_addr).await?;
        stream.set_nodelay(true)?;

        Ok(Self::from_stream(stream, peer_addr))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Enable TCP keepalive with the given idle delay before the first
    /// probe. `tokio::net::TcpStream` has no keepalive-delay knob itself,
    /// so the underlying fd is briefly borrowed via `socket2::SockRef`.
    pub fn enable_keepalive(&self, delay: std::time::Duration) -> RuntimeResult<()> {
        let guard = self.stream.try_lock().map_err(|_| {
            RuntimeError::InvalidArgument("keepalive cannot be set while a read/write is in flight".into())
        })?;
        let sock_ref = SockRef::from(&*guard);
        let keepalive = TcpKeepalive::new().with_time(delay);
        sock_ref.set_tcp_keepalive(&keepalive)?;
        Ok(())
    }

    pub fn disable_keepalive(&self) -> RuntimeResult<()> {
        let guard = self.stream.try_lock().map_err(|_| {
            RuntimeError::InvalidArgument("keepalive cannot be cleared while a read/write is in flight".into())
        })?;
        let sock_ref = SockRef::from(&*guard);
        sock_ref.set_keepalive(false)?;
        Ok(())
    }

    fn classify_io_error(&self, e: std::io::Error) -> RuntimeError {
        use std::io::ErrorKind::*;
        match e.kind() {
            ConnectionReset | ConnectionAborted | BrokenPipe => {
                self.reset.store(true, Ordering::SeqCst);
                RuntimeError::ConnectionReset
            }
            _ => RuntimeError::IoError(e),
        }
    }
}

#[async_trait]
impl AsyncIo for TcpHandle {
    async fn read(&self, max_bytes: usize) -> RuntimeResult<Vec<u8>> {
        if self.reset.load(Ordering::SeqCst) {
            return Err(RuntimeError::ConnectionReset);
        }
        self.state.require_ready()?;
        let mut stream = self.stream.lock().await;
        let mut buf = vec![0u8; max_bytes];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| self.classify_io_error(e))?;
        buf.truncate(n);
        Ok(buf)
    }

    async fn write(&self, bytes: &[u8]) -> RuntimeResult<i64> {
        if self.reset.load(Ordering::SeqCst) {
            return Err(RuntimeError::ConnectionReset);
        }
        self.state.require_ready()?;
        let mut stream = self.stream.lock().await;
        stream
            .write_all(bytes)
            .await
            .map_err(|e| self.classify_io_error(e))?;
        Ok(bytes.len() as i64)
    }

    async fn close(&self) -> RuntimeResult<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        self.state.transition(HandleState::Closing)?;
        let mut stream = self.stream.lock().await;
        let _ = stream.shutdown().await;
        self.state.transition(HandleState::Closed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_over_a_loopback_connection() {
        let listener = TcpListenerHandle::listen("127.0.0.1", 0, 16).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let conn = listener.accept().await.unwrap();
            let data = conn.read(16).await.unwrap();
            conn.write(&data).await.unwrap();
        });

        let client = TcpHandle::connect("127.0.0.1", 0, "127.0.0.1", addr.port())
            .await
            .unwrap();
        client.write(b"ping").await.unwrap();
        let reply = client.read(16).await.unwrap();
        assert_eq!(reply, b"ping");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn partial_reads_observe_submission_order() {
        let listener = TcpListenerHandle::listen("127.0.0.1", 0, 16).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let conn = listener.accept().await.unwrap();
            conn.write(b"ABCDEFGHIJ").await.unwrap();
        });

        let client = TcpHandle::connect("127.0.0.1", 0, "127.0.0.1", addr.port())
            .await
            .unwrap();
        let mut chunks = Vec::new();
        for _ in 0..4 {
            let chunk = client.read(3).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            chunks.push(String::from_utf8(chunk).unwrap());
        }
        assert_eq!(chunks, vec!["ABC", "DEF", "GHI", "J"]);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let listener = TcpListenerHandle::listen("127.0.0.1", 0, 16).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let client = TcpHandle::connect("127.0.0.1", 0, "127.0.0.1", addr.port())
            .await
            .unwrap();
        client.close().await.unwrap();
        client.close().await.unwrap();
    }
}
