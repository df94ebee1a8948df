use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use native_tls::TlsConnector;
use tracing::{debug, info};

use super::session::{ProbeError, SmtpStream, connect_any};
use super::{SmtpObservation, SmtpProber};

const SMTP_PORT: u16 = 25;
const SUBMISSION_PORT: u16 = 587;
const SMTPS_PORT: u16 = 465;

/// Blocking SMTP prober: EHLO and STARTTLS on port 25, then implicit TLS on
/// 465 and EHLO plus STARTTLS on 587.
#[derive(Debug, Clone)]
pub struct TlsProber {
    helo_name: String,
    ipv6: bool,
}

impl Default for TlsProber {
    fn default() -> Self {
        Self {
            helo_name: "localhost".to_string(),
            ipv6: false,
        }
    }
}

impl TlsProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = helo_name.into();
        self
    }

    pub fn with_ipv6(mut self, ipv6: bool) -> Self {
        self.ipv6 = ipv6;
        self
    }

    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ProbeError> {
        let addresses: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| ProbeError::Resolve {
                host: host.to_string(),
                source,
            })?
            .filter(|addr| self.ipv6 || addr.is_ipv4())
            .collect();
        if addresses.is_empty() {
            return Err(ProbeError::NoAddress {
                host: host.to_string(),
            });
        }
        Ok(addresses)
    }

    fn dialogue(
        &self,
        host: &str,
        connector: &TlsConnector,
        timeout: Duration,
        observation: &mut SmtpObservation,
    ) -> Result<(), ProbeError> {
        let addresses = self.resolve(host, SMTP_PORT)?;
        let mut stream = connect_any(host, &addresses, timeout)?;
        let banner = stream.read_reply()?;
        observation.connected = true;
        observation.banner = Some(format!("{} {}", banner.code, banner.lines.join(" ")));

        let ehlo_cmd = format!("EHLO {}", self.helo_name);
        stream.send_command(&ehlo_cmd)?;
        let ehlo = stream.read_reply()?;
        // first line is the greeting, the rest are keywords
        observation.extensions = ehlo.keywords().into_iter().skip(1).collect();
        observation.auth_methods = ehlo.auth_methods();
        observation.supports_starttls = ehlo.has_capability("STARTTLS");

        if observation.supports_starttls && start_tls(&mut stream, host, connector)? {
            observation.supports_tls = true;
            if observation.auth_methods.is_empty() {
                // some servers only announce AUTH after STARTTLS
                stream.send_command(&ehlo_cmd)?;
                observation.auth_methods = stream.read_reply()?.auth_methods();
            }
        }

        let _ = stream.send_command("QUIT");
        Ok(())
    }

    fn implicit_tls(
        &self,
        host: &str,
        connector: &TlsConnector,
        timeout: Duration,
    ) -> Result<(), ProbeError> {
        let addresses = self.resolve(host, SMTPS_PORT)?;
        let mut stream = connect_any(host, &addresses, timeout)?;
        stream.upgrade_tls(host, connector)?;
        let banner = stream.read_reply()?;
        if !banner.is_positive_completion() {
            return Err(ProbeError::Protocol(format!(
                "unexpected greeting {} on port {SMTPS_PORT}",
                banner.code
            )));
        }
        let _ = stream.send_command("QUIT");
        Ok(())
    }

    /// Port 587 counts as open once it greets; a STARTTLS upgrade there also
    /// counts as TLS support.
    fn submission(
        &self,
        host: &str,
        addresses: &[SocketAddr],
        connector: &TlsConnector,
        timeout: Duration,
    ) -> SubmissionPort {
        let mut port = SubmissionPort::default();
        let greeted = connect_any(host, addresses, timeout)
            .and_then(|mut stream: SmtpStream| stream.read_reply().map(|_| stream));
        let mut stream = match greeted {
            Ok(stream) => stream,
            Err(err) => {
                debug!(host, error = %err, "submission port closed");
                return port;
            }
        };
        port.open = true;

        let ehlo = stream
            .send_command(&format!("EHLO {}", self.helo_name))
            .and_then(|()| stream.read_reply());
        match ehlo {
            Ok(reply) if reply.has_capability("STARTTLS") => {
                match start_tls(&mut stream, host, connector) {
                    Ok(upgraded) => port.starttls = upgraded,
                    Err(err) => debug!(host, error = %err, "STARTTLS on submission port failed"),
                }
            }
            Ok(_) => {}
            Err(err) => debug!(host, error = %err, "EHLO on submission port failed"),
        }

        let _ = stream.send_command("QUIT");
        port
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SubmissionPort {
    open: bool,
    starttls: bool,
}

/// Send STARTTLS and upgrade the session. `Ok(false)` when the server
/// refuses the command or the handshake fails.
fn start_tls(
    stream: &mut SmtpStream,
    host: &str,
    connector: &TlsConnector,
) -> Result<bool, ProbeError> {
    stream.send_command("STARTTLS")?;
    if !stream.read_reply()?.is_positive_completion() {
        return Ok(false);
    }
    match stream.upgrade_tls(host, connector) {
        Ok(()) => Ok(true),
        Err(err) => {
            debug!(host, error = %err, "STARTTLS upgrade failed");
            Ok(false)
        }
    }
}

impl SmtpProber for TlsProber {
    fn probe(&self, host: &str, timeout: Duration) -> SmtpObservation {
        let connector = match TlsConnector::new() {
            Ok(connector) => connector,
            Err(err) => return SmtpObservation::unreachable(host, ProbeError::tls(err).to_string()),
        };

        let mut observation = SmtpObservation {
            host: host.to_string(),
            ..SmtpObservation::default()
        };
        if let Err(err) = self.dialogue(host, &connector, timeout, &mut observation) {
            debug!(host, error = %err, "SMTP dialogue failed");
            if !observation.connected {
                observation.error = Some(err.to_string());
                return observation;
            }
        }

        if !observation.supports_tls {
            match self.implicit_tls(host, &connector, timeout) {
                Ok(()) => observation.supports_tls = true,
                Err(err) => debug!(host, error = %err, "no implicit TLS"),
            }
        }
        match self.resolve(host, SUBMISSION_PORT) {
            Ok(addresses) => {
                let port = self.submission(host, &addresses, &connector, timeout);
                observation.submission_open = port.open;
                observation.supports_tls |= port.starttls;
            }
            Err(err) => debug!(host, error = %err, "cannot resolve submission port"),
        }

        info!(
            host,
            tls = observation.supports_tls,
            starttls = observation.supports_starttls,
            submission = observation.submission_open,
            "SMTP probe finished"
        );
        observation
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    /// One-connection SMTP server answering EHLO and STARTTLS with canned
    /// replies. Returns the commands it received.
    fn fake_submission_server(
        ehlo_reply: &'static str,
        starttls_reply: &'static str,
    ) -> (SocketAddr, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().expect("accept");
            socket
                .write_all(b"220 submission.example ESMTP\r\n")
                .expect("banner");
            let mut reader = BufReader::new(socket.try_clone().expect("clone"));
            let mut commands = Vec::new();
            let mut line = String::new();
            while reader.read_line(&mut line).map(|read| read > 0).unwrap_or(false) {
                let command = line.trim_end().to_string();
                line.clear();
                let verb = command.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
                let reply = match verb.as_str() {
                    "EHLO" => ehlo_reply,
                    "STARTTLS" => starttls_reply,
                    _ => "221 bye\r\n",
                };
                commands.push(command);
                let _ = socket.write_all(reply.as_bytes());
                // a 220 hands the socket over to TLS; closing it fails the handshake
                if verb == "QUIT" || (verb == "STARTTLS" && reply.starts_with("220")) {
                    break;
                }
            }
            commands
        });
        (addr, handle)
    }

    fn submission_against(addr: SocketAddr) -> SubmissionPort {
        let connector = TlsConnector::new().expect("tls connector");
        TlsProber::new()
            .with_helo_name("client.example")
            .submission("localhost", &[addr], &connector, TIMEOUT)
    }

    #[test]
    fn starttls_is_attempted_on_submission_port() {
        let (addr, server) = fake_submission_server(
            "250-submission.example\r\n250-AUTH PLAIN\r\n250 STARTTLS\r\n",
            "220 ready to start TLS\r\n",
        );
        let port = submission_against(addr);
        let commands = server.join().expect("server thread");

        assert!(port.open);
        assert!(!port.starttls, "handshake against a closed socket cannot succeed");
        assert_eq!(commands, vec!["EHLO client.example", "STARTTLS"]);
    }

    #[test]
    fn refused_starttls_leaves_port_open_without_tls() {
        let (addr, server) = fake_submission_server(
            "250-submission.example\r\n250 STARTTLS\r\n",
            "454 TLS not available\r\n",
        );
        let port = submission_against(addr);
        let commands = server.join().expect("server thread");

        assert_eq!(port, SubmissionPort { open: true, starttls: false });
        assert_eq!(commands, vec!["EHLO client.example", "STARTTLS", "QUIT"]);
    }

    #[test]
    fn starttls_not_sent_unless_advertised() {
        let (addr, server) = fake_submission_server("250 submission.example\r\n", "");
        let port = submission_against(addr);
        let commands = server.join().expect("server thread");

        assert!(port.open);
        assert_eq!(commands, vec!["EHLO client.example", "QUIT"]);
    }

    #[test]
    fn closed_submission_port() {
        let addr = TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .expect("free port");
        assert_eq!(submission_against(addr), SubmissionPort::default());
    }
}
