//! The CGI query/form decoder.
//!
//! `spec.md` §1/§6 marks this as an external collaborator, out of scope
//! for the core, specifying only its consumed contract: `init(pool,
//! string)`, `str(key, default)`, `strs(key)`. Nothing outside this
//! crate can supply that contract in a Rust build, so it is implemented
//! here directly on top of `url::form_urlencoded` -- already in the
//! teacher's dependency graph (used by its client module for URL
//! handling) -- rather than hand-rolling a byte-level `k=v&k=v` splitter.

use std::collections::HashMap;

use url::form_urlencoded;

/// A parsed `k=v&k=v&...` query string or form body.
pub struct Decoder {
    values: HashMap<String, Vec<String>>,
}

impl Decoder {
    /// Parse a raw `k=v&k=v` string (already percent-decoded by
    /// `form_urlencoded`, which also handles `+` as space).
    pub fn parse(input: &str) -> Decoder {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in form_urlencoded::parse(input.as_bytes()) {
            values.entry(k.into_owned())
                .or_insert_with(Vec::new)
                .push(v.into_owned());
        }
        Decoder { values: values }
    }

    /// Parse the query component of a request URI (the part after `?`,
    /// or empty if there is none).
    pub fn from_uri_query(uri: &str) -> Decoder {
        let query = match uri.find('?') {
            Some(pos) => &uri[pos + 1..],
            None => "",
        };
        Decoder::parse(query)
    }

    /// The first value for `key`, or `default` if it is absent.
    pub fn str(&self, key: &str, default: &str) -> String {
        self.values.get(key)
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// All values for `key`, in arrival order, or empty if absent.
    pub fn strs(&self, key: &str) -> Vec<String> {
        self.values.get(key).cloned().unwrap_or_default()
    }
}
