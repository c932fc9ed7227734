//! `AsyncIo`: the capability trait every concrete handle type implements.
//! Flattens the reference implementation's `IOHandle`/`IOHandleThen`
//! class hierarchy and fluent "then" chaining into a trait plus ordinary
//! `.await`/combinator usage.

use async_trait::async_trait;

use super::RuntimeResult;

#[async_trait]
pub trait AsyncIo: Send + Sync {
    /// Read up to `max_bytes`, returning fewer if that's all that's
    /// currently available (never blocks for more than one read).
    async fn read(&self, max_bytes: usize) -> RuntimeResult<Vec<u8>>;

    /// Write `bytes`, returning the number of bytes accepted.
    async fn write(&self, bytes: &[u8]) -> RuntimeResult<i64>;

    /// Close the handle. Idempotent: closing an already-closed handle is a
    /// no-op, not an error.
    async fn close(&self) -> RuntimeResult<()>;
}
