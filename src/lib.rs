//! # Ghostpost
//!
//! Ghostpost is an inbound-only mail intake server. It accepts mail for a
//! fixed set of domains and writes every message it receives, verbatim, to
//! a date-partitioned store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ghostpost::storage::MemoryStore;
//! use ghostpost::{DomainPolicy, SmtpServer};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let store = Arc::new(MemoryStore::new());
//! let server = SmtpServer::new(DomainPolicy::new(["ghostpost.sh"]), store.clone());
//!
//! thread::spawn(move || {
//!     server.start("127.0.0.1:2525").unwrap();
//! });
//!
//! // Mail sent to anything@ghostpost.sh on localhost:2525 ends up in `store`
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Always answered with `250 Ok`
//! - `MAIL FROM` - Accepted unconditionally
//! - `RCPT TO` - Accepted only for the configured domains
//! - `DATA` - Send the message body
//! - `QUIT` - Close connection
//!
//! Any other command gets `500 Command not recognized`.
//!
//! ## Storage
//!
//! Each message is saved under `emails/<yyyy>/<mm>/<dd>/<id>.eml`, where the
//! date is the UTC day of receipt and the id is a random UUID. Any
//! [`storage::MailStore`] can be plugged in. [`storage::S3Store`] writes to
//! an S3-compatible bucket, [`storage::DirStore`] to a local directory tree,
//! and [`storage::MemoryStore`] keeps messages in memory for tests.
//!
//! ## Notes
//!
//! - Messages are accepted up to 10 MiB by default. A larger body gets
//!   `552` and the connection is closed.
//! - If a save fails the client gets `450` and may retry; nothing is queued.
//! - Outbound relay, authentication and TLS are not supported.
//! - A PROXY v1/v2 header from a load balancer can be honoured for logging.

pub mod config;
mod smtp;
pub mod storage;

pub use config::{Config, ConfigError};
pub use smtp::{
    CommandDispatcher, DataAction, DataTranscoder, Dispatch, DomainPolicy, Envelope, PendingEmail,
    Phase, ServerSettings, SmtpError, SmtpLimits, SmtpResponse, SmtpServer, SmtpSession, Verb,
    read_proxy_header,
};
