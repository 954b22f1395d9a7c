//! Sender address resolution through a Postfix `tcp_table` style service
//! such as postsrsd.
//!
//! The client sends `get <key>\n` and reads back a single coded line,
//! `200 <value>` on success and `500 <reason>` when there is nothing to
//! substitute.

use std::{future::Future, io, pin::Pin};

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::{debug, warn};

/// Boxed future type for resolver operations, enabling object safety.
pub type ResolveFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, LookupError>> + Send + 'a>>;

/// Errors that can occur while resolving an address.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Connecting to the service or talking to it failed.
    #[error("{0}")]
    Io(#[from] io::Error),
    /// The response line could not be parsed.
    #[error("srs: malformed response {0:?}")]
    Malformed(String),
    /// The service answered with a code other than 200 or 500.
    #[error("srs: unexpected returncode {code} ({message})")]
    Protocol { code: u16, message: String },
}

/// Trait for resolvers translating the envelope sender of a forwarded
/// message.
pub trait AddressResolver: Send + Sync {
    /// Resolves `key` into the address to use as envelope sender.
    fn resolve<'a>(&'a self, key: &'a str) -> ResolveFuture<'a>;

    /// Returns the name of this resolver.
    fn name(&self) -> &str;
}

/// Resolver talking to an SRS lookup service over TCP.
pub struct SrsResolver {
    addr: String,
}

impl SrsResolver {
    /// Creates a new [`SrsResolver`] for the service listening on `addr`.
    pub fn new(addr: String) -> Self {
        Self { addr }
    }

    /// Returns the address of the lookup service.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl AddressResolver for SrsResolver {
    fn resolve<'a>(&'a self, key: &'a str) -> ResolveFuture<'a> {
        Box::pin(async move {
            debug!(addr = %self.addr, key = %key, "Connecting to SRS lookup service");
            let stream = TcpStream::connect(&self.addr).await?;
            lookup(stream, key).await
        })
    }

    fn name(&self) -> &str {
        "srs"
    }
}

/// Performs a single `get` lookup of `key` over an established `stream`.
pub async fn lookup<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    key: &str,
) -> Result<String, LookupError> {
    let mut stream = BufReader::new(stream);
    stream
        .get_mut()
        .write_all(format!("get {key}\n").as_bytes())
        .await?;
    stream.get_mut().flush().await?;

    let mut line = String::new();
    if stream.read_line(&mut line).await? == 0 {
        return Err(LookupError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
    }

    let (code, message) = parse_code_line(&line)?;
    match code {
        200 => {
            debug!(key = %key, value = %message, "Resolved address");
            Ok(message.to_string())
        }
        500 => {
            warn!(key = %key, "srs: returncode 500 ({message})");
            Ok(key.to_string())
        }
        _ => Err(LookupError::Protocol {
            code,
            message: message.to_string(),
        }),
    }
}

/// Splits a `DDD message` response line into its code and message.
///
/// The line terminator is ignored; continuation lines (`DDD-message`) are
/// rejected as only single line responses are expected.
///
/// # Examples
///
/// ```rust
/// let (code, message) = srsforward_utils::parse_code_line("200 a@b.com\n").unwrap();
/// assert_eq!(code, 200);
/// assert_eq!(message, "a@b.com");
/// ```
pub fn parse_code_line(line: &str) -> Result<(u16, &str), LookupError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let malformed = || LookupError::Malformed(trimmed.to_string());

    if trimmed.len() < 4 || !trimmed.is_char_boundary(3) || !trimmed.is_char_boundary(4) {
        return Err(malformed());
    }
    let (code, rest) = trimmed.split_at(3);
    if !code.bytes().all(|b| b.is_ascii_digit()) || !rest.starts_with(' ') {
        return Err(malformed());
    }
    let code = code.parse().map_err(|_| malformed())?;

    Ok((code, &rest[1..]))
}
