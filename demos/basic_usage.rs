//! Basic usage example for the Ghostpost intake server
//!
//! Starts a server backed by a temporary directory, delivers one message
//! over a plain TCP conversation, tries a recipient outside the accepted
//! domains, and then lists what ended up on disk.

use chrono::Utc;
use ghostpost::storage::DirStore;
use ghostpost::{DomainPolicy, SmtpServer};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Ghostpost Basic Usage Example");
    println!("=============================");

    let root = tempfile::tempdir()?;
    let store = DirStore::open(root.path())?;
    println!("Storing mail under {}", store.root().display());

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = SmtpServer::new(
        DomainPolicy::new(["ghostpost.sh", "xn--9q8hgh.ws"]),
        Arc::new(store.clone()),
    );

    // Start server in a background thread
    thread::spawn(move || {
        if let Err(e) = server.start_with_listener(listener) {
            eprintln!("Server error: {e}");
        }
    });
    println!("Server started on {addr}");

    println!("\nSending test email...");
    let mut client = Client::connect(addr)?;
    client.command("HELO client.example.com")?;
    client.command("MAIL FROM:<sender@example.com>")?;
    client.command("RCPT TO:<inbox@ghostpost.sh>")?;
    client.command("DATA")?;
    client.send_body(&[
        "From: sender@example.com",
        "To: inbox@ghostpost.sh",
        "Subject: Test Email from Ghostpost",
        "",
        "This is a test email sent to demonstrate",
        ".a line starting with a dot survives dot-stuffing",
    ])?;

    println!("\nTrying a domain we do not accept...");
    client.command("RCPT TO:<someone@example.com>")?;
    client.command("QUIT")?;

    let today = Utc::now().date_naive();
    println!("\nMessages stored on {today}:");
    for id in store.list_day(today)? {
        println!("  {}", store.path_for(today, &id).display());
        if let Some(content) = store.get(today, &id)? {
            for line in String::from_utf8_lossy(&content).lines() {
                println!("    {line}");
            }
        }
    }

    Ok(())
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: std::net::SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let reader = BufReader::new(stream.try_clone()?);
        let mut client = Self { stream, reader };
        client.read_reply()?;
        Ok(client)
    }

    fn read_reply(&mut self) -> std::io::Result<()> {
        let mut response = String::new();
        self.reader.read_line(&mut response)?;
        print!("S: {response}");
        Ok(())
    }

    fn command(&mut self, command: &str) -> std::io::Result<()> {
        println!("C: {command}");
        write!(self.stream, "{command}\r\n")?;
        self.read_reply()
    }

    /// Send body lines with dot-stuffing, then the terminator
    fn send_body(&mut self, lines: &[&str]) -> std::io::Result<()> {
        for line in lines {
            if line.starts_with('.') {
                self.stream.write_all(b".")?;
            }
            write!(self.stream, "{line}\r\n")?;
        }
        self.stream.write_all(b".\r\n")?;
        self.read_reply()
    }
}
