use httparse;

quick_error! {
    /// The user-visible failure modes of the core (`spec.md` §7):
    /// exactly two parse failures, plus feeding a completed parser.
    ///
    /// Any of these fires `on_parsing_error` once and drives the parser
    /// to `State::Complete`; the parser never retries.
    #[derive(Debug)]
    pub enum Error {
        /// The request line did not yield a non-empty method, URI and
        /// protocol triple.
        MalformedRequest {
            description("malformed request line")
        }
        /// The chunk-size line did not start with a valid hex number.
        MalformedChunkSize(err: httparse::InvalidChunkSize) {
            description("malformed chunk size")
            from()
        }
        /// `parse()` was called on a parser that already fired its
        /// terminal callback.
        AlreadyComplete {
            description("parser fed bytes after request completion")
        }
    }
}
