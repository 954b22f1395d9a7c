use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::ENVELOPE_PREFIX;

/// Errors that can occur while capturing the header section of a message.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Reading from the input failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A header line could not be understood.
    #[error("malformed MIME header line: {0}")]
    Malformed(String),
}

/// The header section of a message, captured from a stream that can only be
/// read once.
///
/// `raw` holds every byte consumed while parsing (envelope line, header
/// lines and the blank separator line), `remainder` is the reader positioned
/// at the first byte of the body.
#[derive(Debug)]
pub struct CapturedHeaders<R> {
    /// Ordered list of headers (case-preserved keys, unfolded and trimmed values).
    pub headers: Vec<(String, String)>,

    /// Raw header section bytes, exactly as read.
    pub raw: Vec<u8>,

    /// The unread rest of the input.
    pub remainder: R,

    /// Indexes into `headers` of values that held invalid UTF-8 bytes.
    lossy: Vec<usize>,
}

impl<R> CapturedHeaders<R> {
    /// Returns the first header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Same as [`CapturedHeaders::header`], but fails when the raw value of
    /// the header was not valid UTF-8, as replacement characters would end
    /// up in its decoded value.
    pub fn strict_header(&self, name: &str) -> Result<Option<&str>, CaptureError> {
        let Some(index) = self
            .headers
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
        else {
            return Ok(None);
        };
        if self.lossy.contains(&index) {
            return Err(CaptureError::Malformed(format!(
                "non UTF-8 value in {name} header"
            )));
        }
        Ok(Some(self.headers[index].1.as_str()))
    }
}

/// Reads the header section of a message from `reader`, keeping a copy of
/// every byte read.
///
/// Reading stops right after the first blank line (or at end of stream), so
/// that no body byte is ever consumed. An mbox `From ` envelope on the first
/// line is captured but not parsed as a header. Folded continuation lines
/// are joined to the previous value with a single space.
///
/// # Examples
///
/// ```rust
/// # tokio_test_block(async {
/// let input: &[u8] = b"Return-Path: <a@b.com>\r\nSubject: Hi\r\n\r\nBody";
/// let captured = srsforward_utils::capture_headers(input).await.unwrap();
/// assert_eq!(captured.header("return-path"), Some("<a@b.com>"));
/// assert_eq!(captured.raw, b"Return-Path: <a@b.com>\r\nSubject: Hi\r\n\r\n");
/// assert_eq!(captured.remainder, b"Body");
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub async fn capture_headers<R: AsyncBufRead + Unpin>(
    mut reader: R,
) -> Result<CapturedHeaders<R>, CaptureError> {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut raw = Vec::new();
    let mut lossy = Vec::new();
    let mut first = true;

    loop {
        let start = raw.len();
        if reader.read_until(b'\n', &mut raw).await? == 0 {
            break;
        }

        let line = &raw[start..];
        if std::mem::take(&mut first) && line.starts_with(ENVELOPE_PREFIX) {
            continue;
        }

        let valid = std::str::from_utf8(line).is_ok();
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            break;
        }

        if text.starts_with([' ', '\t']) {
            let index = headers
                .len()
                .checked_sub(1)
                .ok_or_else(|| CaptureError::Malformed(text.to_string()))?;
            let (_, value) = &mut headers[index];
            if !valid && !lossy.contains(&index) {
                lossy.push(index);
            }
            let folded = text.trim();
            if !folded.is_empty() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(folded);
            }
            continue;
        }

        let (key, value) = text
            .split_once(':')
            .ok_or_else(|| CaptureError::Malformed(text.to_string()))?;
        if !valid {
            lossy.push(headers.len());
        }
        headers.push((key.trim().to_string(), value.trim().to_string()));
    }

    debug!(
        headers = headers.len(),
        size = raw.len(),
        "Captured message header section"
    );

    Ok(CapturedHeaders {
        headers,
        raw,
        remainder: reader,
        lossy,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::{AsyncReadExt, BufReader};

    use super::*;

    #[tokio::test]
    async fn test_capture_stops_at_blank_line() {
        let input: &[u8] = b"From: a@b.com\r\nTo: c@d.com\r\n\r\nFrom: body@line\r\n";
        let captured = capture_headers(input).await.unwrap();

        assert_eq!(captured.headers.len(), 2);
        assert_eq!(
            captured.headers[0],
            ("From".to_string(), "a@b.com".to_string())
        );
        assert_eq!(captured.raw, b"From: a@b.com\r\nTo: c@d.com\r\n\r\n");
        assert_eq!(captured.remainder, b"From: body@line\r\n");
    }

    #[tokio::test]
    async fn test_capture_skips_envelope_line() {
        let input: &[u8] =
            b"From x@y.com Mon Jan 1\nReturn-Path: <x@y.com>\nSubject: hi\n\nbody";
        let captured = capture_headers(input).await.unwrap();

        assert_eq!(captured.headers.len(), 2);
        assert_eq!(captured.header("Return-Path"), Some("<x@y.com>"));
        assert!(captured.raw.starts_with(b"From x@y.com Mon Jan 1\n"));
        assert_eq!(captured.remainder, b"body");
    }

    #[tokio::test]
    async fn test_capture_envelope_only_on_first_line() {
        let input: &[u8] = b"Subject: hi\nFrom x@y.com Mon Jan 1\n\n";
        let result = capture_headers(input).await;

        assert!(matches!(result, Err(CaptureError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_capture_unfolds_continuation_lines() {
        let input: &[u8] = b"Subject: a very\r\n  long subject\r\n\tindeed\r\nTo: x@y\r\n\r\n";
        let captured = capture_headers(input).await.unwrap();

        assert_eq!(captured.header("subject"), Some("a very long subject indeed"));
        assert_eq!(captured.header("TO"), Some("x@y"));
    }

    #[tokio::test]
    async fn test_capture_rejects_malformed_line() {
        let input: &[u8] = b"Subject: hi\r\nthis is not a header\r\n\r\n";
        let result = capture_headers(input).await;

        match result {
            Err(CaptureError::Malformed(line)) => assert_eq!(line, "this is not a header"),
            other => panic!("Expected malformed error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capture_rejects_leading_continuation() {
        let input: &[u8] = b" folded\r\nSubject: hi\r\n\r\n";
        assert!(matches!(
            capture_headers(input).await,
            Err(CaptureError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_capture_without_body_separator() {
        let input: &[u8] = b"Return-Path: <a@b>\nSubject: hi";
        let captured = capture_headers(input).await.unwrap();

        assert_eq!(captured.header("Subject"), Some("hi"));
        assert_eq!(captured.raw, input);
        assert!(captured.remainder.is_empty());
    }

    #[tokio::test]
    async fn test_capture_remainder_keeps_buffered_bytes() {
        let input = b"Return-Path: <a@b>\r\n\r\nbody line one\r\nbody line two\r\n".to_vec();
        let reader = BufReader::with_capacity(8, Cursor::new(input));
        let mut captured = capture_headers(reader).await.unwrap();

        let mut body = Vec::new();
        captured.remainder.read_to_end(&mut body).await.unwrap();

        assert_eq!(captured.raw, b"Return-Path: <a@b>\r\n\r\n");
        assert_eq!(body, b"body line one\r\nbody line two\r\n");
    }

    #[tokio::test]
    async fn test_capture_first_header_wins() {
        let input: &[u8] = b"Received: one\nReceived: two\n\n";
        let captured = capture_headers(input).await.unwrap();

        assert_eq!(captured.headers.len(), 2);
        assert_eq!(captured.header("Received"), Some("one"));
    }

    #[tokio::test]
    async fn test_strict_header_rejects_invalid_utf8() {
        let input: &[u8] = b"Return-Path: <x\xff@y.com>\nSubject: caf\xe9\nFrom: Alice\n\t<a\xff@b>\nTo: c@d\n\n";
        let captured = capture_headers(input).await.unwrap();

        assert_eq!(captured.header("Return-Path"), Some("<x\u{fffd}@y.com>"));
        match captured.strict_header("return-path") {
            Err(CaptureError::Malformed(message)) => {
                assert_eq!(message, "non UTF-8 value in return-path header")
            }
            other => panic!("Expected malformed error, got {other:?}"),
        }
        assert!(captured.strict_header("Subject").is_err());
        assert!(captured.strict_header("From").is_err());
        assert_eq!(captured.strict_header("To").unwrap(), Some("c@d"));
        assert_eq!(captured.strict_header("Cc").unwrap(), None);
    }

    #[tokio::test]
    async fn test_capture_keeps_invalid_utf8_raw() {
        let input: &[u8] = b"Subject: caf\xe9\n\nbody";
        let captured = capture_headers(input).await.unwrap();

        assert_eq!(captured.raw, b"Subject: caf\xe9\n\n");
        assert_eq!(captured.remainder, b"body");
    }
}
