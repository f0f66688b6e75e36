//! SMTP response handling

use crate::smtp::error::SmtpError;

/// Represents an SMTP response that can be sent to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    /// The SMTP reply code (e.g., 250, 354, 500)
    pub code: u16,
    /// The human-readable message
    pub message: String,
}

impl SmtpResponse {
    /// Create a new SMTP response
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    /// Create a success response (250 Ok)
    pub fn ok() -> Self {
        Self::new(250, "Ok")
    }

    /// Create a greeting response (220)
    pub fn greeting() -> Self {
        Self::new(220, "Ready to receive mail")
    }

    /// Create a DATA intermediate response (354)
    pub fn data_start() -> Self {
        Self::new(354, "Start mail input; end with <CRLF>.<CRLF>")
    }

    /// Create a QUIT response (221)
    pub fn quit() -> Self {
        Self::new(221, "Bye")
    }

    /// Create the temporary failure sent when the message could not be stored (450)
    pub fn mailbox_unavailable() -> Self {
        Self::new(450, "Requested mail action not taken: mailbox unavailable")
    }

    /// Create an error response from an error
    pub fn from_error(error: &SmtpError) -> Self {
        Self::new(error.to_response_code(), error.to_response_message())
    }

    /// Format the response for sending over the wire
    pub fn format(&self) -> String {
        format!("{} {}\r\n", self.code, self.message)
    }
}
