//! Header rewriting applied to the captured header section before the
//! message is handed back to sendmail.
//!
//! The rewriter strips the mbox `From sender time_stamp` envelope line that
//! Postfix prepends, removes any `From:` header and inserts the supplied
//! headers at the top. The `Return-Path` header is left intact, the Postfix
//! cleanup daemon replaces it on re-injection.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// Prefix of the mbox envelope line, only honored on the first line.
pub const ENVELOPE_PREFIX: &[u8] = b"From ";

/// Prefix of the header removed from the forwarded message.
pub const FROM_HEADER_PREFIX: &[u8] = b"From:";

const CRLF: &[u8] = b"\r\n";
const LF: &[u8] = b"\n";

/// Guesses the line ending to use for inserted headers from the first input
/// line, mimicking sendmail(1) in Postfix which switches to `\r\n` stripping
/// when the first record ends with `\r`.
pub fn guess_line_ending(line: &[u8]) -> &'static [u8] {
    if line.ends_with(CRLF) {
        CRLF
    } else {
        LF
    }
}

/// Rewrites the lines read from `input`, returning the fully materialized
/// result.
///
/// `headers` are inserted before the first line, terminated with the line
/// ending guessed from that line (`\n` for an empty input). Every other line
/// is copied verbatim, trailing bytes without a terminator included.
pub async fn rewrite_headers<R: AsyncBufRead + Unpin>(
    mut input: R,
    headers: &[String],
) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut line = Vec::new();
    let mut line_number = 0usize;
    let mut dropped = 0usize;

    loop {
        line.clear();
        let read = input.read_until(b'\n', &mut line).await?;
        line_number += 1;

        if line_number == 1 {
            let line_ending = guess_line_ending(&line);
            for header in headers {
                output.extend_from_slice(header.as_bytes());
                output.extend_from_slice(line_ending);
            }
            if line.starts_with(ENVELOPE_PREFIX) {
                dropped += 1;
                continue;
            }
        }

        if read == 0 {
            break;
        }

        if line.starts_with(FROM_HEADER_PREFIX) {
            dropped += 1;
            continue;
        }
        output.extend_from_slice(&line);
    }

    debug!(
        inserted = headers.len(),
        dropped = dropped,
        size = output.len(),
        "Rewrote message headers"
    );

    Ok(output)
}
