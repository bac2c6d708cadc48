//! Chunk-size line parsing.
//!
//! Grounded on the teacher's `src/chunked.rs`, which drives
//! `httparse::parse_chunk_size` over a `netbuf::Buf` slice the same way.
//! The difference here is that our caller already holds a complete,
//! `\r\n`-terminated view (handed over by `AsyncByteReader`'s
//! `advance_to_string(b"\r\n")`), so there is no partial/incomplete case
//! to propagate back up -- `parse_chunk_size` either accepts the line or
//! the hex number at its head is malformed.

use httparse::{self, parse_chunk_size};

use error::Error;

/// Parse one `<hex-size>[;extensions]\r\n` line. Chunk extensions after
/// `;` are discarded unconditionally, per `spec.md` §4.2/§9.
///
/// Returns the chunk size; `0` signals the terminating chunk.
pub fn parse_chunk_size_line(view: &[u8]) -> Result<u64, Error> {
    match parse_chunk_size(view) {
        Ok(httparse::Status::Complete((_consumed, size))) => Ok(size),
        Ok(httparse::Status::Partial) => {
            // The view is `\r\n`-terminated by construction; a `Partial`
            // result here means the hex run never terminated before the
            // delimiter, which httparse reports as the same case.
            Err(httparse::InvalidChunkSize.into())
        }
        Err(e) => Err(e.into()),
    }
}
