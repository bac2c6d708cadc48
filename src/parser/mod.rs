//! `HttpParser`: a single streaming HTTP/1.x request parser.
//!
//! The state machine below is `spec.md` §4.2's transition table
//! verbatim, represented the way `rotor-http`'s `Parser<M>`
//! (`other_examples/`) represents its own request states: a tagged
//! `enum State` driven by a `parse` loop, not a bitfield. Each variant
//! carries exactly the data needed to resume (the chunk size in
//! flight, the whole-body length in flight) rather than stashing it in
//! separate "current chunk size" fields the way the C original's flat
//! struct would.

mod chunked;

use std::cell::RefCell;
use std::sync::Arc;

use cgi;
use error::Error;
use headers::{header_name_prefix, is_chunked, starts_with_ignore_case};
use pool::GroupInner;
use reader::AsyncByteReader;
use request_line::{header_lines, parse_request_line, split_head};

pub use self::chunked::parse_chunk_size_line;

/// Initial capacity of the buffer a parser accumulates chunked body
/// data into when no `on_body_chunk` callback is registered.
/// `spec.md` §6 calls this out explicitly as a tuning constant.
const CHUNK_ACCUM_INITIAL_CAPACITY: usize = 4096;

/// Where a `param`/`params` lookup should search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// A request header, matched case-insensitively by name.
    Header,
    /// The query string on the request URI.
    Query,
    /// The request body, decoded as a form only when `Content-Type` is
    /// `application/x-www-form-urlencoded`.
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingHeaders,
    ReadingWholeBody(u64),
    ReadingChunkSize,
    ReadingChunkData(u64),
    ReadingFooters,
    Complete,
}

/// A streaming HTTP/1.x request parser.
///
/// Parsers are normally obtained from a `HttpParserGroup` rather than
/// constructed directly, so that they share one set of callbacks and
/// are recycled through the group's free list.
pub struct HttpParser<A = ()> {
    group: Arc<GroupInner<A>>,
    reader: AsyncByteReader<()>,
    state: State,
    pool_member: bool,

    method: Option<String>,
    uri: Option<String>,
    protocol: Option<String>,
    header_lines: Vec<Vec<u8>>,

    /// The request body, once fully received: either the single
    /// length-delimited read, or (absent `on_body_chunk`) the
    /// concatenation of all chunks. Stays populated until `reset`, so
    /// `body()` remains valid for the lifetime of the parser after
    /// `on_request_end`, not just for the duration of the callback.
    post: Option<Vec<u8>>,
    chunk_accum: Option<Vec<u8>>,

    last_error: Option<Error>,
    arg: Option<A>,

    query_cache: RefCell<Option<cgi::Decoder>>,
    body_cache: RefCell<Option<cgi::Decoder>>,
}

impl<A> HttpParser<A> {
    pub(crate) fn new(group: Arc<GroupInner<A>>) -> HttpParser<A> {
        let mut parser = HttpParser {
            group: group,
            reader: AsyncByteReader::new(),
            state: State::ReadingHeaders,
            pool_member: false,
            method: None,
            uri: None,
            protocol: None,
            header_lines: Vec::new(),
            post: None,
            chunk_accum: None,
            last_error: None,
            arg: None,
            query_cache: RefCell::new(None),
            body_cache: RefCell::new(None),
        };
        parser.reader.advance_to_string(b"\r\n\r\n");
        parser
    }

    pub(crate) fn set_pool_member(&mut self, member: bool) {
        self.pool_member = member;
    }

    pub(crate) fn is_pool_member(&self) -> bool {
        self.pool_member
    }

    pub(crate) fn discard_accumulated_body(&mut self) {
        self.chunk_accum = None;
    }

    /// Reset to the initial state, ready to parse another request.
    /// Called by the owning group when recycling a parser off its free
    /// list; never needs to be called directly when using a group.
    pub(crate) fn reset(&mut self) {
        self.reader.clear();
        self.reader.advance_to_string(b"\r\n\r\n");
        self.state = State::ReadingHeaders;
        self.method = None;
        self.uri = None;
        self.protocol = None;
        self.header_lines.clear();
        self.post = None;
        self.chunk_accum = None;
        self.last_error = None;
        self.arg = None;
        *self.query_cache.borrow_mut() = None;
        *self.body_cache.borrow_mut() = None;
    }

    /// Attach an opaque user value to this parser (e.g. a connection
    /// handle), retrievable from inside any of the group's callbacks.
    pub fn set_arg(&mut self, arg: A) {
        self.arg = Some(arg);
    }

    pub fn get_arg(&self) -> Option<&A> {
        self.arg.as_ref()
    }

    pub fn take_arg(&mut self) -> Option<A> {
        self.arg.take()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// The raw `"Name: Value"` header lines, in arrival order.
    pub fn headers(&self) -> &[Vec<u8>] {
        &self.header_lines
    }

    /// The request body, if one was received (by either delivery mode).
    pub fn body(&self) -> Option<&[u8]> {
        self.post.as_deref()
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Feed more bytes of the request stream into the parser. Drives
    /// the state machine forward as far as the buffered data allows,
    /// firing callbacks along the way, and returns once either the
    /// request completes or more bytes are needed.
    ///
    /// Calling this again after the terminal callback has already
    /// fired (`is_complete()` is `true`) fires `on_parsing_error` with
    /// `Error::AlreadyComplete` instead of parsing anything.
    pub fn parse(&mut self, bytes: &[u8]) {
        if self.state == State::Complete {
            self.fire_error(Error::AlreadyComplete);
            return;
        }
        self.reader.feed(bytes);
        loop {
            if self.state == State::Complete {
                break;
            }
            let len = match self.reader.ready_len() {
                Some(len) => len,
                None => break,
            };
            let view = self.reader.view()[..len].to_vec();
            self.reader.consume(len);
            self.step(view);
        }
    }

    fn step(&mut self, view: Vec<u8>) {
        match self.state {
            State::ReadingHeaders => self.handle_headers(&view),
            State::ReadingWholeBody(n) => self.handle_whole_body(&view, n),
            State::ReadingChunkSize => self.handle_chunk_size(&view),
            State::ReadingChunkData(size) => self.handle_chunk_data(&view, size),
            State::ReadingFooters => self.handle_footer(&view),
            State::Complete => {}
        }
    }

    fn handle_headers(&mut self, view: &[u8]) {
        let (request_line, header_block) = split_head(view);
        let parsed = match parse_request_line(request_line) {
            Ok(rl) => rl,
            Err(e) => {
                self.fire_error(e);
                return;
            }
        };
        self.method = Some(String::from_utf8_lossy(parsed.method).into_owned());
        self.uri = Some(String::from_utf8_lossy(parsed.uri).into_owned());
        self.protocol = Some(String::from_utf8_lossy(parsed.protocol).into_owned());
        self.header_lines = header_lines(header_block)
            .into_iter()
            .map(|line| line.to_vec())
            .collect();

        self.fire_headers();
        if self.state == State::Complete {
            // on_headers is not expected to abort the request, but a
            // parsing error fired from elsewhere in the meantime (there
            // is none today) would already have set this.
            return;
        }

        if let Some(value) = self.header_value("Transfer-Encoding") {
            if is_chunked(value) {
                trace!("{} {}: chunked body", self.method.as_deref().unwrap_or("?"),
                    self.uri.as_deref().unwrap_or("?"));
                self.state = State::ReadingChunkSize;
                self.reader.advance_to_string(b"\r\n");
                return;
            }
        }
        if let Some(value) = self.header_value("Content-Length") {
            let n = parse_uint64(value);
            if n > 0 {
                trace!("{} {}: {} byte body", self.method.as_deref().unwrap_or("?"),
                    self.uri.as_deref().unwrap_or("?"), n);
                self.state = State::ReadingWholeBody(n);
                self.reader.advance_bytes(n as usize);
                return;
            }
        }
        self.finish_no_body();
    }

    fn handle_whole_body(&mut self, view: &[u8], _n: u64) {
        let body = view.to_vec();
        self.state = State::Complete;
        self.fire_request_end(Some(&body));
        self.post = Some(body);
    }

    fn handle_chunk_size(&mut self, view: &[u8]) {
        match parse_chunk_size_line(view) {
            Ok(0) => {
                self.state = State::ReadingFooters;
                self.reader.advance_to_string(b"\r\n");
            }
            Ok(size) => {
                self.state = State::ReadingChunkData(size);
                self.reader.advance_bytes((size + 2) as usize);
            }
            Err(e) => self.fire_error(e),
        }
    }

    fn handle_chunk_data(&mut self, view: &[u8], size: u64) {
        let payload = &view[..size as usize];
        if self.group.callbacks.on_body_chunk.is_some() {
            self.fire_body_chunk(payload);
        } else {
            let buf = self.chunk_accum.get_or_insert_with(|| {
                Vec::with_capacity(CHUNK_ACCUM_INITIAL_CAPACITY)
            });
            buf.extend_from_slice(payload);
        }
        self.state = State::ReadingChunkSize;
        self.reader.advance_to_string(b"\r\n");
    }

    fn handle_footer(&mut self, view: &[u8]) {
        if view.len() == 2 {
            self.finish_chunked();
        } else {
            self.state = State::ReadingFooters;
            self.reader.advance_to_string(b"\r\n");
        }
    }

    fn finish_chunked(&mut self) {
        self.state = State::Complete;
        if self.group.callbacks.on_body_chunk.is_some() {
            self.fire_request_end(None);
        } else {
            let body = self.chunk_accum.take().unwrap_or_default();
            self.fire_request_end(Some(&body));
            self.post = Some(body);
        }
    }

    fn finish_no_body(&mut self) {
        self.state = State::Complete;
        self.post = None;
        self.fire_request_end(None);
    }

    fn fire_headers(&mut self) {
        let group = self.group.clone();
        (group.callbacks.on_headers)(self);
    }

    fn fire_body_chunk(&mut self, data: &[u8]) {
        let group = self.group.clone();
        if let Some(ref cb) = group.callbacks.on_body_chunk {
            cb(self, data);
        }
    }

    fn fire_request_end(&mut self, body: Option<&[u8]>) {
        let group = self.group.clone();
        (group.callbacks.on_request_end)(self, body);
    }

    fn fire_error(&mut self, e: Error) {
        debug!("parse error: {}", e);
        self.last_error = Some(e);
        self.state = State::Complete;
        let group = self.group.clone();
        (group.callbacks.on_parsing_error)(self);
    }

    /// First header whose name matches `name` case-insensitively,
    /// with leading spaces after the colon trimmed.
    fn header_value(&self, name: &str) -> Option<&[u8]> {
        for line in &self.header_lines {
            if let Some(off) = header_name_prefix(line, name) {
                let mut i = off;
                while i < line.len() && line[i] == b' ' {
                    i += 1;
                }
                return Some(&line[i..]);
            }
        }
        None
    }

    fn content_type_is_form(&self) -> bool {
        match self.header_value("Content-Type") {
            Some(v) => starts_with_ignore_case(v, "application/x-www-form-urlencoded"),
            None => false,
        }
    }

    fn with_query_params<R>(&self, f: impl FnOnce(&cgi::Decoder) -> R) -> R {
        if self.query_cache.borrow().is_none() {
            let uri = self.uri.as_deref().unwrap_or("");
            *self.query_cache.borrow_mut() = Some(cgi::Decoder::from_uri_query(uri));
        }
        f(self.query_cache.borrow().as_ref().unwrap())
    }

    fn with_body_params<R>(&self, f: impl FnOnce(&cgi::Decoder) -> R) -> R {
        if self.body_cache.borrow().is_none() {
            let body = self.post.as_deref().unwrap_or(b"");
            let text = String::from_utf8_lossy(body);
            *self.body_cache.borrow_mut() = Some(cgi::Decoder::parse(&text));
        }
        f(self.body_cache.borrow().as_ref().unwrap())
    }

    /// Look up a single parameter. `default` is returned whenever `key`
    /// is entirely absent from the chosen location; a header present
    /// with an empty value still wins over `default`, per `spec.md`
    /// §4.2/§6.
    pub fn param(&self, loc: Location, key: &str, default: &str) -> String {
        match loc {
            Location::Header => {
                match self.header_value(key) {
                    Some(v) => String::from_utf8_lossy(v).into_owned(),
                    None => default.to_string(),
                }
            }
            Location::Query => self.with_query_params(|d| d.str(key, default)),
            Location::Body => {
                if self.content_type_is_form() {
                    self.with_body_params(|d| d.str(key, default))
                } else {
                    default.to_string()
                }
            }
        }
    }

    /// All values for a repeated parameter. Headers are single-valued
    /// in this model, so `Location::Header` always returns the empty
    /// sequence, present or not; only `Query`/`Body` ever return more
    /// than one value.
    pub fn params(&self, loc: Location, key: &str) -> Vec<String> {
        match loc {
            Location::Header => Vec::new(),
            Location::Query => self.with_query_params(|d| d.strs(key)),
            Location::Body => {
                if self.content_type_is_form() {
                    self.with_body_params(|d| d.strs(key))
                } else {
                    Vec::new()
                }
            }
        }
    }
}

fn parse_uint64(bytes: &[u8]) -> u64 {
    ::std::str::from_utf8(bytes).ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::{HttpParser, Location, State};
    use pool::{Callbacks, GroupInner};
    use error::Error;

    // These tests drive a bare `HttpParser` directly against a
    // `GroupInner` built by hand, rather than going through
    // `HttpParserGroup`, so they can assert on captured callback state.
    // The capture has to be `Arc<Mutex<_>>`, not `Rc<RefCell<_>>`: the
    // group's callback boxes are `Send + Sync` because a group may be
    // shared across threads, and a closure captured into one of them
    // has to uphold that bound even in a single-threaded test.

    #[derive(Default)]
    struct Capture {
        headers_fired: usize,
        chunks: Vec<Vec<u8>>,
        request_end: Option<Option<Vec<u8>>>,
        error: Option<String>,
    }

    fn parser_with(
        on_body_chunk: bool,
    ) -> (HttpParser<()>, Arc<Mutex<Capture>>) {
        let capture = Arc::new(Mutex::new(Capture::default()));

        let c1 = capture.clone();
        let on_headers: Box<dyn Fn(&mut HttpParser<()>) + Send + Sync> =
            Box::new(move |_p| { c1.lock().unwrap().headers_fired += 1; });

        let body_chunk_cb: Option<Box<dyn Fn(&mut HttpParser<()>, &[u8]) + Send + Sync>> =
            if on_body_chunk {
                let c2 = capture.clone();
                Some(Box::new(move |_p: &mut HttpParser<()>, data: &[u8]| {
                    c2.lock().unwrap().chunks.push(data.to_vec());
                }))
            } else {
                None
            };

        let c3 = capture.clone();
        let on_request_end: Box<dyn Fn(&mut HttpParser<()>, Option<&[u8]>) + Send + Sync> =
            Box::new(move |_p, body| {
                c3.lock().unwrap().request_end = Some(body.map(|b| b.to_vec()));
            });

        let c4 = capture.clone();
        let on_parsing_error: Box<dyn Fn(&mut HttpParser<()>) + Send + Sync> =
            Box::new(move |p| {
                c4.lock().unwrap().error = p.last_error().map(|e| format!("{}", e));
            });

        let inner = Arc::new(GroupInner::for_callbacks(Callbacks {
            on_headers: on_headers,
            on_body_chunk: body_chunk_cb,
            on_request_end: on_request_end,
            on_parsing_error: on_parsing_error,
        }));

        (HttpParser::new(inner), capture)
    }

    #[test]
    fn simple_get_with_no_body() {
        let (mut p, capture) = parser_with(false);
        p.parse(b"GET /hi HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(p.method(), Some("GET"));
        assert_eq!(p.uri(), Some("/hi"));
        assert_eq!(p.protocol(), Some("HTTP/1.1"));
        assert!(p.is_complete());
        assert_eq!(capture.lock().unwrap().headers_fired, 1);
        assert_eq!(capture.lock().unwrap().request_end, Some(None));
    }

    #[test]
    fn byte_by_byte_feed_reaches_the_same_state() {
        let (mut p, capture) = parser_with(false);
        let request = b"GET / HTTP/1.0\r\n\r\n";
        for b in request {
            p.parse(&[*b]);
        }
        assert!(p.is_complete());
        assert_eq!(capture.lock().unwrap().headers_fired, 1);
    }

    #[test]
    fn length_delimited_post_body() {
        let (mut p, capture) = parser_with(false);
        p.parse(b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        assert!(p.is_complete());
        assert_eq!(p.body(), Some(&b"hello"[..]));
        assert_eq!(capture.lock().unwrap().request_end, Some(Some(b"hello".to_vec())));
    }

    #[test]
    fn query_and_form_body_params() {
        let (mut p, _capture) = parser_with(false);
        p.parse(
            b"POST /submit?page=2 HTTP/1.1\r\n\
              Content-Type: application/x-www-form-urlencoded\r\n\
              Content-Length: 9\r\n\r\na=1&b=two");
        assert_eq!(p.param(Location::Query, "page", ""), "2");
        assert_eq!(p.param(Location::Body, "a", ""), "1");
        assert_eq!(p.param(Location::Body, "b", ""), "two");
        assert_eq!(p.param(Location::Body, "c", "fallback"), "fallback");
    }

    #[test]
    fn header_params_are_always_empty() {
        let (mut p, _capture) = parser_with(false);
        p.parse(b"GET /hi HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert!(p.params(Location::Header, "Host").is_empty());
        assert!(p.params(Location::Header, "Nonexistent").is_empty());
    }

    #[test]
    fn chunked_body_without_on_body_chunk_is_accumulated() {
        let (mut p, capture) = parser_with(false);
        p.parse(
            b"POST /upload HTTP/1.1\r\n\
              Transfer-Encoding: chunked\r\n\r\n\
              4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n");
        assert!(p.is_complete());
        assert_eq!(p.body(), Some(&b"Wikipedia"[..]));
        assert_eq!(capture.lock().unwrap().request_end, Some(Some(b"Wikipedia".to_vec())));
        assert!(capture.lock().unwrap().chunks.is_empty());
    }

    #[test]
    fn chunked_body_with_on_body_chunk_streams_and_ends_empty() {
        let (mut p, capture) = parser_with(true);
        p.parse(
            b"POST /upload HTTP/1.1\r\n\
              Transfer-Encoding: chunked\r\n\r\n\
              4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n");
        assert!(p.is_complete());
        assert_eq!(capture.lock().unwrap().chunks, vec![b"Wiki".to_vec(), b"pedia".to_vec()]);
        assert_eq!(capture.lock().unwrap().request_end, Some(None));
        assert_eq!(p.body(), None);
    }

    #[test]
    fn malformed_request_line_fires_parsing_error_once() {
        let (mut p, capture) = parser_with(false);
        p.parse(b"????\r\n\r\n");
        assert!(p.is_complete());
        assert_eq!(capture.lock().unwrap().error.as_deref(), Some("malformed request line"));
        assert_eq!(capture.lock().unwrap().headers_fired, 0);
    }

    #[test]
    fn feeding_a_completed_parser_errors_again() {
        let (mut p, capture) = parser_with(false);
        p.parse(b"GET / HTTP/1.0\r\n\r\n");
        assert!(p.is_complete());
        p.parse(b"more garbage");
        match p.last_error() {
            Some(Error::AlreadyComplete) => {}
            other => panic!("expected AlreadyComplete, got {:?}", other),
        }
        assert_eq!(capture.lock().unwrap().error.as_deref(), Some("parser fed bytes after request completion"));
    }

    #[test]
    fn reset_clears_prior_request_state() {
        let (mut p, _capture) = parser_with(false);
        p.parse(b"GET /first HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc");
        assert!(p.is_complete());
        p.reset();
        assert_eq!(p.method(), None);
        assert_eq!(p.body(), None);
        assert_eq!(p.state, State::ReadingHeaders);
    }
}
