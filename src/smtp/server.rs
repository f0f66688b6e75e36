//! SMTP server implementation

use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::smtp::commands::CommandDispatcher;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::policy::DomainPolicy;
use crate::smtp::proxy::read_proxy_header;
use crate::smtp::session::SmtpSession;
use crate::storage::MailStore;

/// Per-connection behaviour shared by every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Largest accepted message body, in bytes after dot-stuffing removal
    pub max_message_size: usize,
    /// Read/write timeout on each socket; `None` waits forever
    pub idle_timeout: Option<Duration>,
    /// Look for a PROXY v1/v2 header before greeting
    pub proxy_protocol: bool,
    /// Answer DATA with 503 until a recipient has been accepted
    pub require_recipient: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_message_size: SmtpLimits::MAX_DATA_SIZE,
            idle_timeout: None,
            proxy_protocol: false,
            require_recipient: false,
        }
    }
}

/// Accepts SMTP connections and saves every completed message to a store
#[derive(Clone)]
pub struct SmtpServer {
    dispatcher: Arc<CommandDispatcher>,
    store: Arc<dyn MailStore>,
    settings: ServerSettings,
}

impl SmtpServer {
    /// Create a new SMTP server with default settings
    pub fn new(policy: DomainPolicy, store: Arc<dyn MailStore>) -> Self {
        Self::with_settings(policy, store, ServerSettings::default())
    }

    pub fn with_settings(
        policy: DomainPolicy,
        store: Arc<dyn MailStore>,
        settings: ServerSettings,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(Arc::new(policy))
            .require_recipient(settings.require_recipient);
        Self {
            dispatcher: Arc::new(dispatcher),
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Start the server on the specified address (blocking)
    pub fn start(&self, addr: &str) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Start the server with an existing listener (blocking)
    ///
    /// Each connection is served on its own thread. Accept errors are logged
    /// and do not stop the loop.
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!("SMTP server listening on {}", listener.local_addr()?);
        info!(
            "Accepting mail for {}",
            self.dispatcher.policy().domains().join(", ")
        );

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.spawn_client(stream),
                Err(e) => warn!("Error accepting connection: {e}"),
            }
        }

        Ok(())
    }

    fn spawn_client(&self, stream: TcpStream) {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                warn!("Dropping connection with no peer address: {e}");
                return;
            }
        };

        let server = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("smtp-{peer}"))
            .spawn(move || {
                if let Err(e) = server.handle_client(stream, peer) {
                    warn!("Error handling client {peer}: {e}");
                }
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn session thread for {peer}: {e}");
        }
    }

    /// Handle a client connection
    fn handle_client(&self, stream: TcpStream, mut peer: SocketAddr) -> Result<(), SmtpError> {
        let mut reader = BufReader::new(stream.try_clone()?);

        if self.settings.proxy_protocol {
            stream.set_read_timeout(Some(SmtpLimits::PROXY_HEADER_TIMEOUT))?;
            if let Some(source) = read_proxy_header(&mut reader)? {
                debug!("{peer} is proxying for {source}");
                peer = source;
            }
        }
        stream.set_read_timeout(self.settings.idle_timeout)?;
        stream.set_write_timeout(self.settings.idle_timeout)?;

        info!("{peer} connected");
        let mut session = SmtpSession::new(
            reader,
            &stream,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.store),
            self.settings.max_message_size,
        )
        .with_peer(peer.to_string());

        let result = session.run();
        info!("{peer} disconnected");
        result
    }
}
