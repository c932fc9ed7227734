//! UDP component. A handle is either idle, bound to a default peer for
//! single-shot `read`/`write`, or in receive mode via `recv()`; the two
//! modes are mutually exclusive, enforced by `UdpMode`.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use super::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpMode {
    Idle,
    DefaultPeer,
    Receiving,
}

pub struct UdpHandle {
    socket: Arc<UdpSocket>,
    default_peer: Mutex<Option<SocketAddr>>,
    mode: Mutex<UdpMode>,
    buffer_size: usize,
}

impl UdpHandle {
    pub async fn open(ip: &str, port: u16, buffer_size: usize) -> RuntimeResult<Self> {
        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .map_err(|e| RuntimeError::InvalidArgument(format!("bad bind address: {e}")))?;
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            default_peer: Mutex::new(None),
            mode: Mutex::new(UdpMode::Idle),
            buffer_size,
        })
    }

    pub fn local_addr(&self) -> RuntimeResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Configure a default peer; `read`/`write` then operate in single-shot
    /// mode, filtered to datagrams from that peer.
    pub fn set_default_peer(&self, peer: SocketAddr) -> RuntimeResult<()> {
        let mut mode = self.mode.lock();
        if *mode == UdpMode::Receiving {
            return Err(RuntimeError::InvalidArgument(
                "cannot set a default peer while a recv() session is active".into(),
            ));
        }
        *mode = UdpMode::DefaultPeer;
        *self.default_peer.lock() = Some(peer);
        Ok(())
    }

    pub async fn send(&self, bytes: &[u8], ip: &str, port: u16) -> RuntimeResult<usize> {
        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .map_err(|e| RuntimeError::InvalidArgument(format!("bad destination address: {e}")))?;
        Ok(self.socket.send_to(bytes, addr).await?)
    }

    /// Single-shot read, filtered to the configured default peer if set.
    pub async fn read(&self, max_bytes: usize) -> RuntimeResult<Vec<u8>> {
        if *self.mode.lock() == UdpMode::Receiving {
            return Err(RuntimeError::InvalidArgument(
                "read() is unavailable while a recv() session is active".into(),
            ));
        }
        let expected_peer = *self.default_peer.lock();
        loop {
            let mut buf = vec![0u8; max_bytes];
            let (n, from) = self.socket.recv_from(&mut buf).await?;
            if let Some(peer) = expected_peer {
                if from != peer {
                    continue;
                }
            }
            buf.truncate(n);
            return Ok(buf);
        }
    }

    pub async fn write(&self, bytes: &[u8]) -> RuntimeResult<i64> {
        let peer = self.default_peer.lock().ok_or_else(|| {
            RuntimeError::InvalidArgument("write() requires a default peer to be set".into())
        })?;
        let n = self.socket.send_to(bytes, peer).await?;
        Ok(n as i64)
    }

    /// Enter receive mode: returns a `UdpRecvSession` that yields datagrams
    /// until dropped or `stop_recv()` is called, at which point the handle
    /// reverts to idle.
    pub fn recv(self: &Arc<Self>) -> RuntimeResult<UdpRecvSession> {
        {
            let mut mode = self.mode.lock();
            if *mode == UdpMode::Receiving {
                return Err(RuntimeError::InvalidArgument(
                    "a recv() session is already active on this handle".into(),
                ));
            }
            *mode = UdpMode::Receiving;
        }

        let (tx, rx) = mpsc::channel(64);
        let socket = Arc::clone(&self.socket);
        let buffer_size = self.buffer_size.max(1);
        let task = tokio::spawn(async move {
            loop {
                let mut buf = vec![0u8; buffer_size];
                match socket.recv_from(&mut buf).await {
                    Ok((n, from)) => {
                        buf.truncate(n);
                        if tx.send((buf, from)).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(UdpRecvSession {
            handle: Arc::clone(self),
            receiver: rx,
            task,
        })
    }
}

/// A live `recv()` session. Its lifetime ties the UDP handle's receiving
/// state to this guard, not to the handle itself: dropping the session (or
/// calling `stop_recv()`) reverts the handle to idle and aborts the
/// background receive task.
pub struct UdpRecvSession {
    handle: Arc<UdpHandle>,
    receiver: mpsc::Receiver<(Vec<u8>, SocketAddr)>,
    task: tokio::task::JoinHandle<()>,
}

impl UdpRecvSession {
    pub async fn next_datagram(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        self.receiver.recv().await
    }

    pub fn stop_recv(self) {
        // Drop runs the Drop impl below, which aborts the task and resets
        // the handle's mode.
    }
}

impl Drop for UdpRecvSession {
    fn drop(&mut self) {
        self.task.abort();
        *self.handle.mode.lock() = UdpMode::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_shot_round_trip_with_default_peer() {
        let a = UdpHandle::open("127.0.0.1", 0, 1024).await.unwrap();
        let b = UdpHandle::open("127.0.0.1", 0, 1024).await.unwrap();
        let b_addr = b.local_addr().unwrap();

        a.set_default_peer(b_addr).unwrap();
        a.write(b"ping").await.unwrap();

        let received = b.read(1024).await.unwrap();
        assert_eq!(received, b"ping");
    }

    #[tokio::test]
    async fn recv_mode_yields_multiple_datagrams() {
        let server = Arc::new(UdpHandle::open("127.0.0.1", 0, 1024).await.unwrap());
        let server_addr = server.local_addr().unwrap();
        let client = UdpHandle::open("127.0.0.1", 0, 1024).await.unwrap();

        let mut session = server.recv().unwrap();
        client.send(b"one", "127.0.0.1", server_addr.port()).await.unwrap();
        client.send(b"two", "127.0.0.1", server_addr.port()).await.unwrap();

        let (first, _) = session.next_datagram().await.unwrap();
        let (second, _) = session.next_datagram().await.unwrap();
        assert_eq!(first, b"one");
        assert_eq!(second, b"two");
    }

    #[tokio::test]
    async fn read_and_recv_modes_are_mutually_exclusive() {
        let handle = Arc::new(UdpHandle::open("127.0.0.1", 0, 1024).await.unwrap());
        let _session = handle.recv().unwrap();
        assert!(handle.read(16).await.is_err());
    }

    #[tokio::test]
    async fn dropping_the_session_reverts_to_idle() {
        let handle = Arc::new(UdpHandle::open("127.0.0.1", 0, 1024).await.unwrap());
        {
            let _session = handle.recv().unwrap();
            assert_eq!(*handle.mode.lock(), UdpMode::Receiving);
        }
        assert_eq!(*handle.mode.lock(), UdpMode::Idle);
    }
}
