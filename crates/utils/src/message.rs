//! Forwarding metadata extracted from the header section of a message.
//!
//! This module defines [`ForwardMetadata`], the values the pipeline needs
//! from the original headers (return path and display name), and the
//! construction of the headers inserted into the forwarded message.

use chrono::{DateTime, TimeZone};

use crate::{CapturedHeaders, ForwardError, ForwardResult};

/// Suffix appended to the display name of forwarded messages.
pub const FORWARDED_SUFFIX: &str = " (forwarded)";

/// Display name used when the message has no `From` header.
pub const UNKNOWN_SENDER: &str = "unknown (forwarded)";

/// Name reported in the inserted `Received` header.
pub const RECEIVED_BY: &str = "srsforward";

/// Timestamp layout of the `Received` header (RFC 5322 date-time).
const RECEIVED_DATE_FORMAT: &str = "%a, %-d %b %Y %H:%M:%S %z";

/// Values extracted from the original message that drive forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardMetadata {
    /// Return-path header value as found in the message (brackets included).
    pub original_return_path: String,

    /// Return path with the surrounding `<>` removed, used as lookup key.
    pub return_path: String,

    /// Full name passed to sendmail for the forwarded message.
    pub from_name: String,
}

impl ForwardMetadata {
    /// Extracts the metadata from the captured headers, using `rp_header`
    /// as the name of the header holding the return path.
    ///
    /// A missing or empty return-path header makes the message unusable, as
    /// does a return-path or `From` value that is not valid UTF-8.
    pub fn from_headers<R>(
        captured: &CapturedHeaders<R>,
        rp_header: &str,
    ) -> ForwardResult<Self> {
        let original_return_path = captured
            .strict_header(rp_header)?
            .filter(|value| !value.is_empty())
            .ok_or(ForwardError::MissingReturnPath)?
            .to_string();
        let return_path = strip_brackets(&original_return_path).to_string();

        let from_name = match captured.strict_header("From")? {
            Some(from) if !from.is_empty() => format!("{from}{FORWARDED_SUFFIX}"),
            _ => UNKNOWN_SENDER.to_string(),
        };

        Ok(Self {
            original_return_path,
            return_path,
            from_name,
        })
    }
}

/// Removes one leading `<` and one trailing `>` from `value`, when present.
pub fn strip_brackets(value: &str) -> &str {
    let value = value.strip_prefix('<').unwrap_or(value);
    value.strip_suffix('>').unwrap_or(value)
}

/// Builds the headers inserted at the top of the forwarded message, in
/// insertion order.
pub fn forwarding_headers<Tz: TimeZone>(
    hostname: &str,
    now: &DateTime<Tz>,
    original_return_path: &str,
) -> Vec<String>
where
    Tz::Offset: std::fmt::Display,
{
    vec![
        format!(
            "Received: by {hostname} ({RECEIVED_BY}); {}",
            now.format(RECEIVED_DATE_FORMAT)
        ),
        format!("X-Original-Return-Path: {original_return_path}"),
    ]
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Utc};

    use super::*;
    use crate::{capture_headers, CaptureError};

    async fn metadata(raw: &[u8], rp_header: &str) -> ForwardResult<ForwardMetadata> {
        let captured = capture_headers(raw).await.unwrap();
        ForwardMetadata::from_headers(&captured, rp_header)
    }

    #[tokio::test]
    async fn test_metadata_from_headers() {
        let metadata = metadata(
            b"Return-Path: <x@y.com>\r\nFrom: Alice <a@b>\r\n\r\n",
            "Return-Path",
        )
        .await
        .unwrap();

        assert_eq!(metadata.original_return_path, "<x@y.com>");
        assert_eq!(metadata.return_path, "x@y.com");
        assert_eq!(metadata.from_name, "Alice <a@b> (forwarded)");
    }

    #[tokio::test]
    async fn test_metadata_without_from() {
        let metadata = metadata(b"Return-Path: <x@y.com>\n\n", "Return-Path")
            .await
            .unwrap();

        assert_eq!(metadata.from_name, "unknown (forwarded)");
    }

    #[tokio::test]
    async fn test_metadata_custom_rp_header() {
        let metadata = metadata(
            b"Return-Path: <ignored@y.com>\nX-Envelope-From: <real@y.com>\n\n",
            "x-envelope-from",
        )
        .await
        .unwrap();

        assert_eq!(metadata.return_path, "real@y.com");
    }

    #[tokio::test]
    async fn test_metadata_missing_return_path() {
        let result = metadata(b"From: Alice <a@b>\n\n", "Return-Path").await;
        assert!(matches!(result, Err(ForwardError::MissingReturnPath)));

        let result = metadata(b"Return-Path:\nFrom: Alice <a@b>\n\n", "Return-Path").await;
        assert!(matches!(result, Err(ForwardError::MissingReturnPath)));
    }

    #[tokio::test]
    async fn test_metadata_rejects_invalid_utf8() {
        let result = metadata(b"Return-Path: <x\xff@y.com>\n\n", "Return-Path").await;
        match result {
            Err(error @ ForwardError::Parse(CaptureError::Malformed(_))) => {
                assert_eq!(error.exit_code(), 65)
            }
            other => panic!("Expected parse error, got {other:?}"),
        }

        let result = metadata(
            b"Return-Path: <x@y.com>\nFrom: Ren\xe9 <r@b>\n\n",
            "Return-Path",
        )
        .await;
        assert!(matches!(
            result,
            Err(ForwardError::Parse(CaptureError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_metadata_ignores_invalid_utf8_elsewhere() {
        let metadata = metadata(
            b"Return-Path: <x@y.com>\nSubject: caf\xe9\nFrom: Alice <a@b>\n\n",
            "Return-Path",
        )
        .await
        .unwrap();

        assert_eq!(metadata.return_path, "x@y.com");
        assert_eq!(metadata.from_name, "Alice <a@b> (forwarded)");
    }

    #[test]
    fn test_strip_brackets() {
        assert_eq!(strip_brackets("<x@y.com>"), "x@y.com");
        assert_eq!(strip_brackets("x@y.com"), "x@y.com");
        assert_eq!(strip_brackets("<>"), "");
        assert_eq!(strip_brackets("<<x@y.com>>"), "<x@y.com>");
    }

    #[test]
    fn test_forwarding_headers() {
        let now = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2006, 1, 2, 15, 4, 5)
            .unwrap();
        let headers = forwarding_headers("mx.example.com", &now, "<x@y.com>");

        assert_eq!(
            headers,
            vec![
                "Received: by mx.example.com (srsforward); Mon, 2 Jan 2006 15:04:05 +0200"
                    .to_string(),
                "X-Original-Return-Path: <x@y.com>".to_string(),
            ]
        );
    }

    #[test]
    fn test_forwarding_headers_utc() {
        let now = Utc.with_ymd_and_hms(2024, 11, 30, 8, 9, 10).unwrap();
        let headers = forwarding_headers("host", &now, "<a@b>");

        assert_eq!(
            headers[0],
            "Received: by host (srsforward); Sat, 30 Nov 2024 08:09:10 +0000"
        );
    }
}
