//! A demand-driven byte-stream accumulator.
//!
//! The owner registers a *pull request* ("call back when N more bytes
//! are available" or "...when a delimiter next appears") and feeds
//! arbitrary byte chunks via `feed`. Once a request is satisfiable the
//! owner reads the matching prefix through `view()`/`ready_len()` and
//! then `consume()`s it, which both advances the read cursor and
//! disarms the pull.
//!
//! Unlike the C original this does not store a continuation itself
//! (see `spec.md` §9, design note (a)): the owning `HttpParser` drives
//! its own loop of "check readiness, consume, re-arm" instead of handing
//! a function pointer to the reader. The observable contract --
//! exactly one outstanding pull, synchronous-vs-deferred satisfaction,
//! partial-tail re-matching of delimiters across chunk boundaries -- is
//! unchanged.

use std::io::Write;

use netbuf::Buf;

/// A single outstanding pull request.
#[derive(Debug, Clone)]
enum Pull {
    Bytes(usize),
    Delimiter(Vec<u8>),
}

/// A demand-driven accumulator over an arbitrarily chunked byte stream.
pub struct AsyncByteReader<A = ()> {
    buf: Buf,
    pull: Option<Pull>,
    arg: Option<A>,
}

impl<A> AsyncByteReader<A> {
    /// Create an empty reader with no outstanding pull.
    pub fn new() -> AsyncByteReader<A> {
        AsyncByteReader {
            buf: Buf::new(),
            pull: None,
            arg: None,
        }
    }

    /// Attach an opaque user value.
    pub fn set_arg(&mut self, arg: A) {
        self.arg = Some(arg);
    }

    /// Borrow the attached user value, if any.
    pub fn get_arg(&self) -> Option<&A> {
        self.arg.as_ref()
    }

    /// Append bytes at the write cursor.
    ///
    /// Does not by itself invoke anything; the owner must follow this
    /// with a loop over `ready_len`/`view`/`consume` to drain whatever
    /// pulls are now satisfiable.
    pub fn feed(&mut self, bytes: &[u8]) {
        // netbuf::Buf is an in-memory growable byte vector; writes to it
        // never fail.
        self.buf.write_all(bytes)
            .expect("writing to an in-memory buffer cannot fail");
    }

    /// Arm a pull for exactly `n` more bytes past the read cursor.
    ///
    /// Returns `true` if the pull is already satisfiable with data
    /// already buffered (the owner may read `view()` immediately and
    /// keep processing); `false` if the pull is now outstanding.
    pub fn advance_bytes(&mut self, n: usize) -> bool {
        self.pull = Some(Pull::Bytes(n));
        self.ready_len().is_some()
    }

    /// Arm a pull for the bytes up to and including the first
    /// occurrence of `delim` in the unread region.
    ///
    /// Returns `true`/`false` with the same synchronous-vs-deferred
    /// semantics as `advance_bytes`. The eventual view includes `delim`
    /// at its tail (callers that want the payload without the
    /// delimiter must trim it themselves, as `spec.md` §4.1 specifies).
    pub fn advance_to_string(&mut self, delim: &[u8]) -> bool {
        self.pull = Some(Pull::Delimiter(delim.to_vec()));
        self.ready_len().is_some()
    }

    /// Length of the currently satisfied view, if the armed pull is
    /// satisfiable with buffered data.
    ///
    /// For a delimiter pull this re-scans the *entire* unread region
    /// each time (the unread region between calls is small -- a header
    /// block, a chunk-size line, a trailer line -- so this is not a
    /// hot-path scan of the whole body); a partial match at the tail of
    /// one append is naturally re-tested in full once more bytes land,
    /// which is exactly the partial-tail rule `spec.md` §4.1 calls for.
    pub fn ready_len(&self) -> Option<usize> {
        match self.pull {
            Some(Pull::Bytes(n)) => {
                if self.buf.len() >= n {
                    Some(n)
                } else {
                    None
                }
            }
            Some(Pull::Delimiter(ref delim)) => {
                find_subslice(&self.buf[..], delim)
                    .map(|pos| pos + delim.len())
            }
            None => None,
        }
    }

    /// The currently buffered, unconsumed bytes (`[read_cursor,
    /// write_cursor)`). Combine with `ready_len()` to get exactly the
    /// satisfied slice: `&reader.view()[..reader.ready_len().unwrap()]`.
    pub fn view(&self) -> &[u8] {
        &self.buf[..]
    }

    /// Drop the first `n` bytes of the unread region and disarm the
    /// current pull. Called once the owner is done reading the view
    /// returned for the satisfied pull.
    pub fn consume(&mut self, n: usize) {
        self.buf.consume(n);
        self.pull = None;
    }

    /// Reset cursors, discard buffered bytes, and drop any outstanding
    /// pull.
    pub fn clear(&mut self) {
        let len = self.buf.len();
        if len > 0 {
            self.buf.consume(len);
        }
        self.pull = None;
        self.arg = None;
    }
}

/// Earliest occurrence of `needle` in `haystack`, or `None`.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod test {
    use super::AsyncByteReader;

    #[test]
    fn bytes_satisfied_synchronously() {
        let mut r: AsyncByteReader = AsyncByteReader::new();
        r.feed(b"hello world");
        assert!(r.advance_bytes(5));
        assert_eq!(&r.view()[..r.ready_len().unwrap()], b"hello");
        r.consume(5);
        assert_eq!(&r.view()[..], b" world");
    }

    #[test]
    fn bytes_deferred_until_fed() {
        let mut r: AsyncByteReader = AsyncByteReader::new();
        assert!(!r.advance_bytes(5));
        assert_eq!(r.ready_len(), None);
        r.feed(b"he");
        assert_eq!(r.ready_len(), None);
        r.feed(b"llo");
        assert_eq!(r.ready_len(), Some(5));
    }

    #[test]
    fn delimiter_includes_tail() {
        let mut r: AsyncByteReader = AsyncByteReader::new();
        r.feed(b"GET / HTTP/1.1\r\n\r\nbody");
        assert!(r.advance_to_string(b"\r\n\r\n"));
        let n = r.ready_len().unwrap();
        assert_eq!(&r.view()[..n], b"GET / HTTP/1.1\r\n\r\n");
        r.consume(n);
        assert_eq!(&r.view()[..], b"body");
    }

    #[test]
    fn delimiter_partial_tail_retested_across_chunks() {
        let mut r: AsyncByteReader = AsyncByteReader::new();
        r.advance_to_string(b"\r\n\r\n");
        r.feed(b"GET / HTTP/1.1\r\n\r");
        assert_eq!(r.ready_len(), None);
        r.feed(b"\nHost: x\r\n\r\n");
        let n = r.ready_len().unwrap();
        assert_eq!(&r.view()[..n], b"GET / HTTP/1.1\r\n\r\nHost: x\r\n\r\n");
    }

    #[test]
    fn earliest_occurrence_wins() {
        let mut r: AsyncByteReader = AsyncByteReader::new();
        r.feed(b"aXbXc");
        r.advance_to_string(b"X");
        let n = r.ready_len().unwrap();
        assert_eq!(&r.view()[..n], b"aX");
    }

    #[test]
    fn new_pull_replaces_old_one() {
        let mut r: AsyncByteReader = AsyncByteReader::new();
        r.feed(b"abcdef");
        r.advance_bytes(2);
        r.advance_bytes(4);
        assert_eq!(r.ready_len(), Some(4));
    }

    #[test]
    fn clear_drops_everything() {
        let mut r: AsyncByteReader = AsyncByteReader::new();
        r.feed(b"abc");
        r.advance_bytes(2);
        r.clear();
        assert_eq!(r.view().len(), 0);
        assert_eq!(r.ready_len(), None);
    }

    #[test]
    fn set_get_arg() {
        let mut r: AsyncByteReader<u32> = AsyncByteReader::new();
        assert!(r.get_arg().is_none());
        r.set_arg(42);
        assert_eq!(r.get_arg(), Some(&42));
    }
}
