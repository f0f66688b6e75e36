//! SMTP server implementation

pub mod commands;
pub mod data;
pub mod email;
pub mod error;
pub mod policy;
pub mod proxy;
pub mod response;
pub mod server;
pub mod session;

pub use commands::{CommandDispatcher, Dispatch, Verb};
pub use data::{DataAction, DataTranscoder};
pub use email::PendingEmail;
pub use error::{SmtpError, SmtpLimits};
pub use policy::DomainPolicy;
pub use proxy::read_proxy_header;
pub use response::SmtpResponse;
pub use server::{ServerSettings, SmtpServer};
pub use session::{Envelope, Phase, SmtpSession};
