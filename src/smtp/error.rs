//! Error types for the SMTP server

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command not recognized")]
    UnrecognizedCommand,

    #[error("Syntax error in parameters")]
    InvalidSyntax,

    #[error("Command line longer than {max} bytes")]
    LineTooLong { max: usize },

    #[error("Relay not permitted for {0}")]
    RelayDenied(String),

    #[error("Bad sequence of commands: {0}")]
    BadSequence(&'static str),

    #[error("Message size exceeds maximum permitted (max {max} bytes)")]
    MessageTooLarge { max: usize },

    #[error("Malformed proxy header: {0}")]
    ProxyHeader(String),
}

/// Size and time limits applied to every session
pub struct SmtpLimits;

impl SmtpLimits {
    /// Default ceiling on the size of a message body, after dot-stuffing removal
    pub const MAX_DATA_SIZE: usize = 10 * 1024 * 1024; // 10MB

    /// Longest command line accepted, including CRLF. RFC 5321 only requires
    /// 512; longer lines are discarded whole and answered with a single 500.
    pub const MAX_COMMAND_LINE: usize = 4096;

    /// Longest PROXY v1 header line, including CRLF
    pub const PROXY_V1_MAX_LENGTH: usize = 107;

    /// How long a new connection may stay silent before we stop looking for a
    /// PROXY header and greet it as a direct client
    pub const PROXY_HEADER_TIMEOUT: Duration = Duration::from_secs(3);
}

/// Maps SMTP errors to appropriate response codes
impl SmtpError {
    pub fn to_response_code(&self) -> u16 {
        match self {
            SmtpError::Io(_) => 421,
            SmtpError::UnrecognizedCommand => 500,
            SmtpError::LineTooLong { .. } => 500,
            SmtpError::InvalidSyntax => 501,
            SmtpError::RelayDenied(_) => 550,
            SmtpError::BadSequence(_) => 503,
            SmtpError::MessageTooLarge { .. } => 552,
            SmtpError::ProxyHeader(_) => 421,
        }
    }

    pub fn to_response_message(&self) -> &'static str {
        match self {
            SmtpError::Io(_) => "Service not available",
            SmtpError::UnrecognizedCommand => "Command not recognized",
            SmtpError::LineTooLong { .. } => "Line too long",
            SmtpError::InvalidSyntax => "Syntax error in parameters",
            SmtpError::RelayDenied(_) => "Relay not permitted",
            SmtpError::BadSequence(_) => "Bad sequence of commands",
            SmtpError::MessageTooLarge { .. } => "Message size exceeds maximum permitted",
            SmtpError::ProxyHeader(_) => "Service not available",
        }
    }

    /// Whether the session must be torn down after reporting this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SmtpError::Io(_) | SmtpError::MessageTooLarge { .. } | SmtpError::ProxyHeader(_)
        )
    }
}
