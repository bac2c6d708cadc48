//! A streaming HTTP/1.x request parser driven by a demand-driven byte
//! accumulator, plus a parser pool for reuse across connections.
//!
//! The three pieces compose as: bytes arrive at [`HttpParser::parse`],
//! which feeds them to an internal [`AsyncByteReader`]; once the
//! reader's armed pull is satisfiable the parser steps its state
//! machine and fires one of the group's four callbacks. Parsers are
//! normally obtained from a [`HttpParserGroup`], which recycles
//! released parsers through a capped free list instead of allocating
//! one per connection.

extern crate httparse;
extern crate netbuf;
extern crate url;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate log;

mod cgi;
mod error;
mod headers;
mod reader;
mod request_line;
mod parser;
mod pool;

pub use error::Error;
pub use parser::{HttpParser, Location};
pub use pool::{Callbacks, HttpParserGroup, MAX_POOL};
pub use reader::AsyncByteReader;
