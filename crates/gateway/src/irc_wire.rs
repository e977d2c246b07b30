//! Minimal IRC wire support shared by the IRC processor and sender:
//! connecting (plain TCP or TLS), client registration, and line parsing.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use aegis_domain::config::IrcServerConfig;
use aegis_domain::{Error, Result};

/// Boxed duplex stream so plain and TLS connections share one type.
pub trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

/// Open a connection to `server`, optionally wrapped in TLS.
pub async fn connect(server: &IrcServerConfig) -> Result<Box<dyn IrcStream>> {
    let tcp = TcpStream::connect((server.host.as_str(), server.port))
        .await
        .map_err(|e| Error::Transport(format!("irc connect {}:{}: {e}", server.host, server.port)))?;

    if !server.tls {
        return Ok(Box::new(tcp));
    }

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
    let name = rustls::pki_types::ServerName::try_from(server.host.clone())
        .map_err(|e| Error::Transport(format!("irc tls name {}: {e}", server.host)))?;
    let tls = connector
        .connect(name, tcp)
        .await
        .map_err(|e| Error::Transport(format!("irc tls handshake {}: {e}", server.host)))?;
    Ok(Box::new(tls))
}

/// Send NICK/USER registration and JOIN the configured channels.
pub async fn register(stream: &mut (impl AsyncWrite + Unpin), server: &IrcServerConfig) -> Result<()> {
    let nick = &server.nick;
    write_line(stream, &format!("NICK {nick}")).await?;
    write_line(stream, &format!("USER {nick} 0 * :{nick}")).await?;
    for channel in &server.channels {
        write_line(stream, &format!("JOIN {channel}")).await?;
    }
    Ok(())
}

pub async fn write_line(stream: &mut (impl AsyncWrite + Unpin), line: &str) -> Result<()> {
    stream
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .map_err(|e| Error::Transport(format!("irc write: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::Transport(format!("irc flush: {e}")))
}

/// A parsed IRC line: `:prefix COMMAND params :trailing`.
#[derive(Debug, Clone, PartialEq)]
pub struct IrcLine {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl IrcLine {
    /// The `nick!user@host` sender, when the prefix carries one.
    pub fn source(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|p| p.contains('!'))
    }
}

/// Parse one raw IRC line. Returns `None` for empty lines.
pub fn parse_line(raw: &str) -> Option<IrcLine> {
    let raw = raw.trim_end_matches(['\r', '\n']);
    if raw.is_empty() {
        return None;
    }

    let (prefix, rest) = match raw.strip_prefix(':') {
        Some(prefixed) => {
            let (prefix, rest) = prefixed.split_once(' ')?;
            (Some(prefix.to_string()), rest)
        }
        None => (None, raw),
    };

    let (middle, trailing) = match rest.split_once(" :") {
        Some((middle, trailing)) => (middle, Some(trailing.to_string())),
        None => (rest, None),
    };

    let mut parts = middle.split_ascii_whitespace();
    let command = parts.next()?.to_string();
    let params = parts.map(str::to_string).collect();

    Some(IrcLine {
        prefix,
        command,
        params,
        trailing,
    })
}
