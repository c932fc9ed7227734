//! # u8core
//!
//! Embedded execution core for a distributed-ledger node.
//!
//! ## Architecture
//!
//! - `serializer`: BOSS binary serialization (C1)
//! - `crypto`: RSA keys, multi-hash digests, symmetric keys, PBKDF2,
//!   HashId, KeyAddress, Safe58 (C2)
//! - `runtime`: async files, directories, TCP, UDP, TLS over a shared
//!   tokio runtime (C3)
//! - `session`: nonce-handshake secure session protocol, client and
//!   server (C4)
//! - `loader`: signed module bundle loading and trust resolution (C5)

#![warn(missing_docs)]
#![warn(clippy::all)]

// Crate-wide error aggregation
pub mod error;

// BOSS binary serialization
pub mod serializer;

// RSA, multi-hash digests, symmetric keys, PBKDF2, HashId, KeyAddress, Safe58
pub mod crypto;

// Async files, directories, TCP, UDP, TLS over a shared tokio runtime
pub mod runtime;

// Nonce-handshake secure session protocol (client and server)
pub mod session;

// Signed module bundle loading and trust resolution
pub mod loader;

/// Re-export version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
