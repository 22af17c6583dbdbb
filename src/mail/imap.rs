//! Minimal blocking IMAP4rev1 client over rustls.
//!
//! Only what the fetcher needs: LOGIN, SELECT, FETCH RFC822, MOVE (with a
//! COPY/STORE/EXPUNGE fallback) and LOGOUT. Run it from `spawn_blocking`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::ops::{ControlFlow, Deref, DerefMut, RangeInclusive};
use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::error::MailError;

/// One message as returned by `FETCH ... RFC822`.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    /// Message sequence number in the selected mailbox.
    pub seq: u32,
    /// Raw RFC 822 bytes.
    pub raw: Vec<u8>,
}

/// Mailbox operations used by the fetcher.
///
/// Methods block; callers run them off the async runtime.
pub trait MailSession {
    /// Select a mailbox and return its message count.
    fn select(&mut self, mailbox: &str) -> Result<u32, MailError>;

    /// Fetch the full content of every message in `range`, handing each to
    /// `on_message` as it arrives.
    ///
    /// `Break` abandons the command without reading the rest of the response
    /// and returns [`MailError::Abandoned`]. The session is then only good for
    /// [`MailSession::logout`].
    fn fetch(
        &mut self,
        range: RangeInclusive<u32>,
        on_message: &mut dyn FnMut(FetchedMessage) -> ControlFlow<()>,
    ) -> Result<(), MailError>;

    /// Move every message in `range` to `mailbox`.
    fn move_messages(&mut self, range: RangeInclusive<u32>, mailbox: &str)
    -> Result<(), MailError>;

    /// End the session.
    fn logout(&mut self) -> Result<(), MailError>;
}

/// Owns a session and logs out when dropped, on success and error paths alike.
pub struct SessionGuard<S: MailSession> {
    session: S,
    released: bool,
}

impl<S: MailSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            released: false,
        }
    }

    /// Log out now and surface the result.
    pub fn logout(mut self) -> Result<(), MailError> {
        self.released = true;
        self.session.logout()
    }
}

impl<S: MailSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: MailSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: MailSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.session.logout()
        {
            debug!("Logout on drop failed: {e}");
        }
    }
}

/// TLS transport used in production.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// A single server response, with any literals lifted out of the line.
#[derive(Debug, Default)]
struct Response {
    /// Response text; each literal is left in place as its `{n}` marker.
    line: String,
    /// Literal payloads paired with the offset of their `{` marker in `line`.
    literals: Vec<(usize, Vec<u8>)>,
}

/// Tagged completion status.
#[derive(Debug, PartialEq, Eq)]
enum Status {
    Ok,
    No(String),
    Bad(String),
}

impl Status {
    fn parse(rest: &str) -> Self {
        let (word, text) = rest.split_once(' ').unwrap_or((rest, ""));
        match word.to_ascii_uppercase().as_str() {
            "OK" => Status::Ok,
            "NO" => Status::No(text.to_string()),
            _ => Status::Bad(text.to_string()),
        }
    }

    fn into_result(self, command: &str) -> Result<(), MailError> {
        match self {
            Status::Ok => Ok(()),
            Status::No(reason) | Status::Bad(reason) => Err(MailError::Command {
                command: command.to_string(),
                reason,
            }),
        }
    }
}

/// IMAP session over any byte stream.
pub struct ImapSession<S: Read + Write> {
    stream: BufReader<S>,
    tag_counter: u32,
    logged_out: bool,
    /// A response was left unread; the stream is out of sync with the tags.
    desynced: bool,
}

impl ImapSession<TlsStream> {
    /// Dial the server over TLS, read the greeting and log in.
    pub fn connect(config: &MailConfig) -> Result<Self, MailError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|e| {
            MailError::Connect {
                server: config.server(),
                reason: e.to_string(),
            }
        })?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(config.host.clone())
            .map_err(|e| MailError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailError::Tls(e.to_string()))?;

        let mut session = Self::from_stream(rustls::StreamOwned::new(conn, tcp))?;
        session.login(&config.username, config.password.expose_secret())?;
        info!("Connection established");
        Ok(session)
    }
}

impl<S: Read + Write> ImapSession<S> {
    /// Wrap an already-connected stream and consume the server greeting.
    pub fn from_stream(stream: S) -> Result<Self, MailError> {
        let mut session = Self {
            stream: BufReader::new(stream),
            tag_counter: 0,
            logged_out: false,
            desynced: false,
        };
        let greeting = session.read_response()?;
        let upper = greeting.line.to_ascii_uppercase();
        if !(upper.starts_with("* OK") || upper.starts_with("* PREAUTH")) {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.line
            )));
        }
        Ok(session)
    }

    /// Authenticate with `LOGIN`.
    pub fn login(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        let command = format!("LOGIN {} {}", quote(username), quote(password));
        match self.execute(&command, |_| Ok(()))? {
            Status::Ok => Ok(()),
            Status::No(reason) | Status::Bad(reason) => Err(MailError::AuthFailed {
                user: username.to_string(),
                reason,
            }),
        }
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    fn read_line(&mut self) -> Result<Vec<u8>, MailError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailError::Closed);
        }
        Ok(buf)
    }

    fn read_response(&mut self) -> Result<Response, MailError> {
        let mut line = Vec::new();
        let mut literals = Vec::new();
        loop {
            let chunk = self.read_line()?;
            match literal_len(&chunk) {
                Some((marker, len)) => {
                    let offset = line.len() + marker;
                    line.extend_from_slice(trim_crlf(&chunk));
                    let mut payload = vec![0u8; len];
                    self.stream.read_exact(&mut payload)?;
                    literals.push((offset, payload));
                }
                None => {
                    line.extend_from_slice(trim_crlf(&chunk));
                    break;
                }
            }
        }
        Ok(Response {
            line: String::from_utf8_lossy(&line).into_owned(),
            literals,
        })
    }

    /// Send a tagged command and feed untagged responses to `on_untagged`
    /// until the matching completion arrives.
    fn execute<F>(&mut self, command: &str, mut on_untagged: F) -> Result<Status, MailError>
    where
        F: FnMut(Response) -> Result<(), MailError>,
    {
        let tag = self.next_tag();
        let verb = command.split(' ').next().unwrap_or(command);
        debug!(tag = %tag, command = verb, "IMAP command");

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        stream.flush()?;

        let prefix = format!("{tag} ");
        loop {
            let response = self.read_response()?;
            if let Some(rest) = response.line.strip_prefix(&prefix) {
                return Ok(Status::parse(rest));
            }
            if response.line.starts_with('+') {
                return Err(MailError::Protocol(format!(
                    "unexpected continuation for {verb}"
                )));
            }
            on_untagged(response)?;
        }
    }
}

impl<S: Read + Write> MailSession for ImapSession<S> {
    fn select(&mut self, mailbox: &str) -> Result<u32, MailError> {
        let mut exists = 0;
        let status = self.execute(&format!("SELECT {}", quote(mailbox)), |response| {
            if let Some(count) = parse_exists(&response.line) {
                exists = count;
            }
            Ok(())
        })?;
        status.into_result("SELECT")?;
        Ok(exists)
    }

    fn fetch(
        &mut self,
        range: RangeInclusive<u32>,
        on_message: &mut dyn FnMut(FetchedMessage) -> ControlFlow<()>,
    ) -> Result<(), MailError> {
        let command = format!("FETCH {} (RFC822)", sequence_set(&range));
        let result = self.execute(&command, |response| {
            if let Some(message) = take_rfc822(response)
                && on_message(message).is_break()
            {
                return Err(MailError::Abandoned);
            }
            Ok(())
        });
        if matches!(result, Err(MailError::Abandoned)) {
            self.desynced = true;
        }
        result?.into_result("FETCH")
    }

    fn move_messages(
        &mut self,
        range: RangeInclusive<u32>,
        mailbox: &str,
    ) -> Result<(), MailError> {
        let set = sequence_set(&range);
        let target = quote(mailbox);

        match self.execute(&format!("MOVE {set} {target}"), |_| Ok(()))? {
            Status::Ok => return Ok(()),
            Status::No(reason) | Status::Bad(reason) => {
                debug!("MOVE rejected ({reason}), falling back to COPY/EXPUNGE");
            }
        }

        self.execute(&format!("COPY {set} {target}"), |_| Ok(()))?
            .into_result("COPY")?;
        self.execute(&format!("STORE {set} +FLAGS.SILENT (\\Deleted)"), |_| Ok(()))?
            .into_result("STORE")?;
        self.execute("EXPUNGE", |_| Ok(()))?.into_result("EXPUNGE")
    }

    fn logout(&mut self) -> Result<(), MailError> {
        if self.logged_out {
            return Ok(());
        }
        self.logged_out = true;
        if self.desynced {
            // The reply would queue behind the unread response; send and go.
            let tag = self.next_tag();
            let stream = self.stream.get_mut();
            stream.write_all(format!("{tag} LOGOUT\r\n").as_bytes())?;
            stream.flush()?;
            return Ok(());
        }
        match self.execute("LOGOUT", |_| Ok(())) {
            Ok(status) => status.into_result("LOGOUT"),
            // Servers may close right after BYE.
            Err(MailError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Quote a string for use as an IMAP quoted-string.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn sequence_set(range: &RangeInclusive<u32>) -> String {
    if range.start() == range.end() {
        range.start().to_string()
    } else {
        format!("{}:{}", range.start(), range.end())
    }
}

fn trim_crlf(chunk: &[u8]) -> &[u8] {
    let chunk = chunk.strip_suffix(b"\n").unwrap_or(chunk);
    chunk.strip_suffix(b"\r").unwrap_or(chunk)
}

/// If a line ends in a literal marker `{n}`, return the marker offset and `n`.
fn literal_len(chunk: &[u8]) -> Option<(usize, usize)> {
    let line = trim_crlf(chunk);
    let body = line.strip_suffix(b"}")?;
    let open = body.iter().rposition(|&b| b == b'{')?;
    let digits = std::str::from_utf8(&body[open + 1..]).ok()?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((open, digits.parse().ok()?))
}

/// Parse `* <n> EXISTS`.
fn parse_exists(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "*" {
        return None;
    }
    let count = parts.next()?.parse().ok()?;
    parts
        .next()
        .filter(|w| w.eq_ignore_ascii_case("EXISTS"))
        .map(|_| count)
}

/// Pull the RFC822 literal out of a `* <n> FETCH (...)` response.
fn take_rfc822(response: Response) -> Option<FetchedMessage> {
    let mut parts = response.line.splitn(4, ' ');
    if parts.next()? != "*" {
        return None;
    }
    let seq: u32 = parts.next()?.parse().ok()?;
    if !parts.next()?.eq_ignore_ascii_case("FETCH") {
        return None;
    }

    let upper = response.line.to_ascii_uppercase();
    let marker = upper.find("RFC822 {")? + "RFC822 ".len();
    response
        .literals
        .into_iter()
        .find(|(offset, _)| *offset == marker)
        .map(|(_, raw)| FetchedMessage { seq, raw })
}
