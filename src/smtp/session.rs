//! SMTP session state management

use std::io::{BufRead, Read, Write};
use std::sync::Arc;

use log::{debug, info, trace, warn};

use crate::smtp::commands::CommandDispatcher;
use crate::smtp::data::{DataAction, DataTranscoder};
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::storage::MailStore;

/// Represents the current phase of an SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Connection accepted, greeting not yet sent
    Greeting,
    /// Reading command lines
    Command,
    /// DATA command received - collecting the message body
    Data,
    /// Terminal; nothing more is read or written
    Closed,
}

/// Envelope details seen so far in the current transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Address from the last MAIL FROM command
    pub sender: Option<String>,
    /// Last recipient accepted by RCPT TO
    pub recipient: Option<String>,
}

impl Envelope {
    pub fn clear(&mut self) {
        self.sender = None;
        self.recipient = None;
    }
}

/// Drives one connection from greeting to close
pub struct SmtpSession<R, W> {
    reader: R,
    writer: W,
    peer: String,
    phase: Phase,
    envelope: Envelope,
    dispatcher: Arc<CommandDispatcher>,
    data: DataTranscoder,
}

impl<R: BufRead, W: Write> SmtpSession<R, W> {
    /// Create a new SMTP session over an established byte stream
    pub fn new(
        reader: R,
        writer: W,
        dispatcher: Arc<CommandDispatcher>,
        store: Arc<dyn MailStore>,
        max_message_size: usize,
    ) -> Self {
        Self {
            reader,
            writer,
            peer: "-".to_string(),
            phase: Phase::Greeting,
            envelope: Envelope::default(),
            dispatcher,
            data: DataTranscoder::new(store, max_message_size),
        }
    }

    /// Name used for this connection in log messages
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Run the session until the client quits or disconnects.
    ///
    /// A clean end of stream returns `Ok`. Transport faults and an oversized
    /// body return the error after the session has been closed.
    pub fn run(&mut self) -> Result<(), SmtpError> {
        let result = self.run_phases();
        self.phase = Phase::Closed;
        result
    }

    fn run_phases(&mut self) -> Result<(), SmtpError> {
        loop {
            match self.phase {
                Phase::Greeting => {
                    self.send_response(&SmtpResponse::greeting())?;
                    self.phase = Phase::Command;
                }
                Phase::Command => {
                    let Some(line) = self.read_line(SmtpLimits::MAX_COMMAND_LINE)? else {
                        return Ok(());
                    };
                    if line.ends_with(b"\n") {
                        self.handle_command_line(&line)?;
                    } else if self.discard_rest_of_line()? {
                        let e = SmtpError::LineTooLong {
                            max: SmtpLimits::MAX_COMMAND_LINE,
                        };
                        debug!("{} {e}", self.peer);
                        self.send_response(&SmtpResponse::from_error(&e))?;
                    } else {
                        return Ok(());
                    }
                }
                Phase::Data => {
                    // Room for a terminator line even when the body is full
                    let limit = self.data.remaining().saturating_add(3);
                    let Some(line) = self.read_line(limit)? else {
                        return Ok(());
                    };
                    self.handle_data_line(&line)?;
                }
                Phase::Closed => return Ok(()),
            }
        }
    }

    fn handle_command_line(&mut self, line: &[u8]) -> Result<(), SmtpError> {
        let line = String::from_utf8_lossy(line);
        let command = line.trim();
        trace!("{} <- {command}", self.peer);

        let dispatch = self.dispatcher.dispatch(command, &mut self.envelope);
        self.send_response(&dispatch.response)?;

        if let Some(next) = dispatch.transition {
            if next == Phase::Data {
                self.data.reset();
            }
            self.phase = next;
        }
        Ok(())
    }

    fn handle_data_line(&mut self, line: &[u8]) -> Result<(), SmtpError> {
        match self.data.consume(line) {
            Ok(DataAction::Continue) => Ok(()),
            Ok(DataAction::Complete(outcome)) => {
                let response = match outcome {
                    Ok(id) => {
                        info!(
                            "{} Saved message {id} for {}",
                            self.peer,
                            self.envelope.recipient.as_deref().unwrap_or("<no recipient>")
                        );
                        SmtpResponse::ok()
                    }
                    Err(e) => {
                        warn!("{} Failed to save email: {e}", self.peer);
                        SmtpResponse::mailbox_unavailable()
                    }
                };
                self.envelope.clear();
                self.phase = Phase::Command;
                self.send_response(&response)
            }
            Err(e) if e.is_fatal() => {
                warn!("{} {e}", self.peer);
                self.phase = Phase::Closed;
                self.send_response(&SmtpResponse::from_error(&e))?;
                Err(e)
            }
            Err(e) => {
                debug!("{} {e}", self.peer);
                self.send_response(&SmtpResponse::from_error(&e))
            }
        }
    }

    /// Skip input up to and including the next `\n`. Returns false if the
    /// stream ended first.
    fn discard_rest_of_line(&mut self) -> Result<bool, SmtpError> {
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(false);
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.reader.consume(end + 1);
                    return Ok(true);
                }
                None => {
                    let n = buf.len();
                    self.reader.consume(n);
                }
            }
        }
    }

    /// Read one line, including its terminator.
    ///
    /// Returns `None` at end of stream; a partial line left at end of stream
    /// is dropped. A line longer than `limit` is returned in pieces of at
    /// most `limit` bytes.
    fn read_line(&mut self, limit: usize) -> Result<Option<Vec<u8>>, SmtpError> {
        let mut line = Vec::new();
        let n = (&mut self.reader)
            .take(limit as u64)
            .read_until(b'\n', &mut line)?;

        if n == 0 {
            return Ok(None);
        }
        if !line.ends_with(b"\n") && n < limit {
            debug!("{} Dropping {n} bytes of unterminated input", self.peer);
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Send a response to the client
    fn send_response(&mut self, response: &SmtpResponse) -> Result<(), SmtpError> {
        let formatted = response.format();
        trace!("{} -> {}", self.peer, formatted.trim_end());
        self.writer.write_all(formatted.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}
