//! PROXY protocol header detection
//!
//! When the server sits behind a load balancer the real client address is
//! announced in a PROXY header (v1 text or v2 binary) before any SMTP
//! traffic. Early bytes count as a header only when they carry a complete
//! v1 or v2 signature; anything else is left for the SMTP session.

use std::io::{self, BufRead, Read};
use std::net::SocketAddr;

use log::debug;
use ppp::{v1, v2};

use crate::smtp::error::{SmtpError, SmtpLimits};

const V1_PREFIX: &[u8] = b"PROXY ";
const V2_SIGNATURE: &[u8] = b"\r\n\r\n\0\r\nQUIT\n";
const V2_FIXED_LEN: usize = 16;

enum HeaderKind {
    None,
    V1,
    V2,
}

/// Consume a PROXY header if one is waiting on `reader`.
///
/// Returns the announced source address, or `None` when there is no header,
/// the reader timed out waiting for one, or the header carries no address
/// (`UNKNOWN` / `LOCAL`). A header that starts but cannot be parsed is an
/// error and the connection should be dropped.
pub fn read_proxy_header<R: BufRead>(reader: &mut R) -> Result<Option<SocketAddr>, SmtpError> {
    let kind = match reader.fill_buf() {
        Ok(buf) => classify(buf),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            debug!("No PROXY header before timeout");
            HeaderKind::None
        }
        Err(e) => return Err(e.into()),
    };

    match kind {
        HeaderKind::None => Ok(None),
        HeaderKind::V1 => read_v1(reader),
        HeaderKind::V2 => read_v2(reader),
    }
}

fn classify(buf: &[u8]) -> HeaderKind {
    if buf.starts_with(V1_PREFIX) {
        HeaderKind::V1
    } else if buf.starts_with(V2_SIGNATURE) {
        HeaderKind::V2
    } else {
        HeaderKind::None
    }
}

fn read_v1<R: BufRead>(reader: &mut R) -> Result<Option<SocketAddr>, SmtpError> {
    let mut line = Vec::new();
    reader
        .by_ref()
        .take(SmtpLimits::PROXY_V1_MAX_LENGTH as u64)
        .read_until(b'\n', &mut line)?;

    let text = std::str::from_utf8(&line)
        .map_err(|_| SmtpError::ProxyHeader("v1 header is not ASCII".to_string()))?;
    let header =
        v1::Header::try_from(text).map_err(|e| SmtpError::ProxyHeader(e.to_string()))?;

    Ok(match header.addresses {
        v1::Addresses::Tcp4(a) => Some(SocketAddr::from((a.source_address, a.source_port))),
        v1::Addresses::Tcp6(a) => Some(SocketAddr::from((a.source_address, a.source_port))),
        v1::Addresses::Unknown => None,
    })
}

fn read_v2<R: BufRead>(reader: &mut R) -> Result<Option<SocketAddr>, SmtpError> {
    let mut header = vec![0u8; V2_FIXED_LEN];
    reader.read_exact(&mut header)?;

    // Bytes 14..16 hold the big-endian length of the address block
    let len = u16::from_be_bytes([header[14], header[15]]) as usize;
    header.resize(V2_FIXED_LEN + len, 0);
    reader.read_exact(&mut header[V2_FIXED_LEN..])?;

    let header = v2::Header::try_from(header.as_slice())
        .map_err(|e| SmtpError::ProxyHeader(e.to_string()))?;

    Ok(match header.addresses {
        v2::Addresses::IPv4(a) => Some(SocketAddr::from((a.source_address, a.source_port))),
        v2::Addresses::IPv6(a) => Some(SocketAddr::from((a.source_address, a.source_port))),
        _ => None,
    })
}
