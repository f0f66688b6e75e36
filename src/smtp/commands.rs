//! Implementation of SMTP commands

use std::sync::Arc;

use log::debug;

use crate::smtp::error::SmtpError;
use crate::smtp::policy::DomainPolicy;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::{Envelope, Phase};

/// Recognised command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// HELO / EHLO
    Helo,
    /// MAIL FROM:<address>
    Mail,
    /// RCPT TO:<address>
    Rcpt,
    /// DATA
    Data,
    /// QUIT
    Quit,
    /// Anything else
    Unknown,
}

static VERBS: &[(&str, Verb)] = &[
    ("HELO", Verb::Helo),
    ("EHLO", Verb::Helo),
    ("MAIL", Verb::Mail),
    ("RCPT", Verb::Rcpt),
    ("DATA", Verb::Data),
    ("QUIT", Verb::Quit),
];

impl Verb {
    /// Classify a command line by its first whitespace-delimited token
    pub fn parse(line: &str) -> Self {
        let token = line.split_whitespace().next().unwrap_or("");
        VERBS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map_or(Verb::Unknown, |&(_, verb)| verb)
    }
}

/// The outcome of dispatching one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub response: SmtpResponse,
    /// Phase the session should move to, if any
    pub transition: Option<Phase>,
}

impl Dispatch {
    fn reply(response: SmtpResponse) -> Self {
        Self {
            response,
            transition: None,
        }
    }

    fn transition(response: SmtpResponse, phase: Phase) -> Self {
        Self {
            response,
            transition: Some(phase),
        }
    }
}

/// Handles SMTP commands and returns appropriate responses
///
/// Dispatch never touches storage; it only produces a reply, an optional
/// phase change, and updates the session's envelope.
#[derive(Debug)]
pub struct CommandDispatcher {
    policy: Arc<DomainPolicy>,
    require_recipient: bool,
}

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new(policy: Arc<DomainPolicy>) -> Self {
        Self {
            policy,
            require_recipient: false,
        }
    }

    /// Refuse DATA until a recipient has been accepted
    pub fn require_recipient(mut self, require: bool) -> Self {
        self.require_recipient = require;
        self
    }

    pub fn policy(&self) -> &DomainPolicy {
        &self.policy
    }

    /// Process a trimmed command line
    pub fn dispatch(&self, command_line: &str, envelope: &mut Envelope) -> Dispatch {
        let result = match Verb::parse(command_line) {
            Verb::Helo => Ok(Dispatch::reply(SmtpResponse::ok())),
            Verb::Mail => Ok(self.handle_mail(command_line, envelope)),
            Verb::Rcpt => self.handle_rcpt(command_line, envelope),
            Verb::Data => self.handle_data(envelope),
            Verb::Quit => Ok(Dispatch::transition(SmtpResponse::quit(), Phase::Closed)),
            Verb::Unknown => Err(SmtpError::UnrecognizedCommand),
        };

        result.unwrap_or_else(|e| {
            debug!("Rejected {command_line:?}: {e}");
            Dispatch::reply(SmtpResponse::from_error(&e))
        })
    }

    /// Handle MAIL command. The sender is recorded when one can be found but
    /// never validated.
    fn handle_mail(&self, command_line: &str, envelope: &mut Envelope) -> Dispatch {
        envelope.sender = extract_address(command_line).ok().map(str::to_string);
        Dispatch::reply(SmtpResponse::ok())
    }

    /// Handle RCPT command
    fn handle_rcpt(
        &self,
        command_line: &str,
        envelope: &mut Envelope,
    ) -> Result<Dispatch, SmtpError> {
        let address = extract_address(command_line)?;
        if !self.policy.accepts(address) {
            return Err(SmtpError::RelayDenied(address.to_string()));
        }

        envelope.recipient = Some(address.to_string());
        Ok(Dispatch::reply(SmtpResponse::ok()))
    }

    /// Handle DATA command
    fn handle_data(&self, envelope: &Envelope) -> Result<Dispatch, SmtpError> {
        if self.require_recipient && envelope.recipient.is_none() {
            return Err(SmtpError::BadSequence("DATA requires an accepted RCPT first"));
        }

        Ok(Dispatch::transition(SmtpResponse::data_start(), Phase::Data))
    }
}

/// Text between the first `<` and the first `>` on the line
pub fn extract_address(command_line: &str) -> Result<&str, SmtpError> {
    let start = command_line.find('<').ok_or(SmtpError::InvalidSyntax)?;
    let end = command_line.find('>').ok_or(SmtpError::InvalidSyntax)?;
    if end < start {
        return Err(SmtpError::InvalidSyntax);
    }
    Ok(&command_line[start + 1..end])
}
