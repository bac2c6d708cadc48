//! Byte-level request-line and header-block parsing.
//!
//! `spec.md` §4.2 gives exact splitting rules that don't match
//! `httparse::Request`'s "one fixed-size header slice, parse everything
//! at once" shape (our parser already has the `\r\n\r\n`-terminated view
//! in hand from `AsyncByteReader`, and wants to store raw header lines
//! verbatim rather than a parsed `Header` struct). So this is hand-rolled
//! against the spec's byte rules, the way the teacher hand-rolls
//! `RequestTarget::parse` (`src/server/request_target.rs`) for the one
//! piece of parsing `httparse` doesn't cover either.

use error::Error;

/// The request line and header block, split and validated, but not yet
/// copied into owned storage -- the caller (`HttpParser`) decides what
/// to keep.
pub struct RequestLine<'a> {
    pub method: &'a [u8],
    pub uri: &'a [u8],
    pub protocol: &'a [u8],
}

/// Split `view` (the full `\r\n\r\n`-terminated head, delimiter included)
/// into the request line and the raw header lines in arrival order.
///
/// Per `spec.md` §4.2: split at the first `\r\n` into `request_line` and
/// `header_block`; split `header_block` on `\r\n` into individual lines,
/// ignoring the empty line that terminates the block.
pub fn split_head(view: &[u8]) -> (&[u8], &[u8]) {
    let crlf = find(view, b"\r\n").unwrap_or(view.len());
    let request_line_end = crlf;
    let header_block_start = (crlf + 2).min(view.len());
    (&view[..request_line_end], &view[header_block_start..])
}

/// Split a header block into raw `"Name: Value"` lines, dropping the
/// final empty line.
pub fn header_lines(block: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut rest = block;
    loop {
        match find(rest, b"\r\n") {
            Some(pos) => {
                let line = &rest[..pos];
                if !line.is_empty() {
                    lines.push(line);
                }
                rest = &rest[pos + 2..];
            }
            None => {
                if !rest.is_empty() {
                    lines.push(rest);
                }
                break;
            }
        }
    }
    lines
}

/// Parse a request line per `spec.md` §4.2: skip leading whitespace,
/// `method` is the token up to the next whitespace, `protocol` is the
/// *rightmost* whitespace-delimited token (scanning from the right,
/// preferring the rightmost space/tab), and `uri` is everything between
/// them with trailing whitespace trimmed. Fails if any of the three is
/// empty.
pub fn parse_request_line(line: &[u8]) -> Result<RequestLine, Error> {
    let mut start = 0;
    while start < line.len() && is_ws(line[start]) {
        start += 1;
    }
    let mut method_end = start;
    while method_end < line.len() && !is_ws(line[method_end]) {
        method_end += 1;
    }
    let method = &line[start..method_end];

    let mut uri_start = method_end;
    while uri_start < line.len() && is_ws(line[uri_start]) {
        uri_start += 1;
    }

    let mut protocol_start = line.len();
    while protocol_start > uri_start && !is_ws(line[protocol_start - 1]) {
        protocol_start -= 1;
    }
    let protocol = &line[protocol_start..];

    let mut uri_end = protocol_start;
    while uri_end > uri_start && is_ws(line[uri_end - 1]) {
        uri_end -= 1;
    }
    let uri = &line[uri_start..uri_end];

    if method.is_empty() || uri.is_empty() || protocol.is_empty() {
        return Err(Error::MalformedRequest);
    }
    Ok(RequestLine { method: method, uri: uri, protocol: protocol })
}

fn is_ws(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
