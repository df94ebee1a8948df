use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ProbeError {
    #[error("cannot resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("no address found for {host}")]
    NoAddress { host: String },
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: io::Error,
    },
    #[error("TLS handshake failed: {source}")]
    Tls {
        #[source]
        source: native_tls::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ProbeError {
    fn io(source: io::Error) -> Self {
        Self::Io { source }
    }

    pub(crate) fn tls(source: native_tls::Error) -> Self {
        Self::Tls { source }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// First word of every line, upper-cased: the EHLO keywords.
    pub fn keywords(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_ascii_uppercase)
            .collect()
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.keywords()
            .iter()
            .any(|keyword| keyword.eq_ignore_ascii_case(cap))
    }

    /// Mechanisms listed on the `AUTH` line, if any.
    pub fn auth_methods(&self) -> Vec<String> {
        self.lines
            .iter()
            .find_map(|line| {
                let mut words = line.split_whitespace();
                words
                    .next()
                    .filter(|keyword| keyword.eq_ignore_ascii_case("AUTH"))
                    .map(|_| words.map(str::to_ascii_uppercase).collect())
            })
            .unwrap_or_default()
    }
}

#[derive(Debug)]
enum StreamState {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Invalid,
}

#[derive(Debug)]
pub(crate) struct SmtpStream {
    state: StreamState,
    buffer: Vec<u8>,
}

impl SmtpStream {
    pub fn connect(addr: &SocketAddr, timeout: Duration) -> Result<Self, ProbeError> {
        let stream = TcpStream::connect_timeout(addr, timeout).map_err(|source| {
            ProbeError::Connect {
                addr: *addr,
                source,
            }
        })?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(ProbeError::io)?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(ProbeError::io)?;
        Ok(Self {
            state: StreamState::Plain(stream),
            buffer: Vec::new(),
        })
    }

    pub fn upgrade_tls(&mut self, host: &str, connector: &TlsConnector) -> Result<(), ProbeError> {
        let plain = match std::mem::replace(&mut self.state, StreamState::Invalid) {
            StreamState::Plain(stream) => stream,
            StreamState::Tls(stream) => {
                self.state = StreamState::Tls(stream);
                return Ok(());
            }
            StreamState::Invalid => {
                return Err(ProbeError::Protocol("invalid stream state".into()));
            }
        };
        let tls = complete_handshake(connector, host, plain)?;
        self.state = StreamState::Tls(Box::new(tls));
        self.buffer.clear();
        Ok(())
    }

    pub fn send_command(&mut self, command: &str) -> Result<(), ProbeError> {
        let mut data = command.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        let written = match &mut self.state {
            StreamState::Plain(stream) => stream.write_all(&data).and_then(|_| stream.flush()),
            StreamState::Tls(stream) => stream.write_all(&data).and_then(|_| stream.flush()),
            StreamState::Invalid => {
                return Err(ProbeError::Protocol("invalid stream state".into()));
            }
        };
        written.map_err(ProbeError::io)
    }

    pub fn read_reply(&mut self) -> Result<SmtpReply, ProbeError> {
        let mut lines = Vec::new();
        let mut code: Option<u16> = None;
        loop {
            let line = self.read_line()?;
            let parsed_code = line
                .get(..3)
                .and_then(|digits| digits.parse::<u16>().ok())
                .ok_or_else(|| ProbeError::Protocol(format!("invalid reply: {line}")))?;
            match code {
                Some(existing) if existing != parsed_code => {
                    return Err(ProbeError::Protocol(format!(
                        "inconsistent reply codes: {existing} vs {parsed_code}"
                    )));
                }
                Some(_) => {}
                None => code = Some(parsed_code),
            }
            let is_last = line.as_bytes().get(3) != Some(&b'-');
            lines.push(line.get(4..).unwrap_or_default().to_string());
            if is_last {
                break;
            }
        }
        Ok(SmtpReply {
            code: code.unwrap_or_default(),
            lines,
        })
    }

    fn read_line(&mut self) -> Result<String, ProbeError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                while matches!(line.last(), Some(b'\n' | b'\r')) {
                    line.pop();
                }
                return String::from_utf8(line)
                    .map_err(|err| ProbeError::Protocol(format!("utf8 error: {err}")));
            }

            let mut buf = [0u8; 512];
            let read = match &mut self.state {
                StreamState::Plain(stream) => stream.read(&mut buf),
                StreamState::Tls(stream) => stream.read(&mut buf),
                StreamState::Invalid => {
                    return Err(ProbeError::Protocol("invalid stream state".into()));
                }
            };
            let read = read.map_err(ProbeError::io)?;
            if read == 0 {
                return Err(ProbeError::io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }
}

fn complete_handshake(
    connector: &TlsConnector,
    host: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, ProbeError> {
    match connector.connect(host, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(err)) => Err(ProbeError::tls(err)),
        Err(HandshakeError::WouldBlock(mut mid)) => loop {
            match mid.handshake() {
                Ok(tls) => break Ok(tls),
                Err(HandshakeError::Failure(err)) => break Err(ProbeError::tls(err)),
                Err(HandshakeError::WouldBlock(next)) => mid = next,
            }
        },
    }
}

/// Connect to the first reachable address of `addresses`.
pub(crate) fn connect_any(
    host: &str,
    addresses: &[SocketAddr],
    timeout: Duration,
) -> Result<SmtpStream, ProbeError> {
    let mut last_err = None;
    for addr in addresses {
        match SmtpStream::connect(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| ProbeError::NoAddress {
        host: host.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(lines: &[&str]) -> SmtpReply {
        SmtpReply {
            code: 250,
            lines: lines.iter().map(|line| line.to_string()).collect(),
        }
    }

    #[test]
    fn ehlo_capabilities() {
        let ehlo = reply(&["mx.example.com Hello", "PIPELINING", "STARTTLS", "AUTH PLAIN login"]);
        assert!(ehlo.has_capability("starttls"));
        assert!(!ehlo.has_capability("SMTPUTF8"));
        assert_eq!(ehlo.auth_methods(), vec!["PLAIN", "LOGIN"]);
        assert!(ehlo.is_positive_completion());
    }

    #[test]
    fn no_auth_line_means_no_methods() {
        assert!(reply(&["mx.example.com", "8BITMIME"]).auth_methods().is_empty());
    }
}
