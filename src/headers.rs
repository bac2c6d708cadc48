//! Case-insensitive, whitespace-tolerant comparisons against the small
//! set of header tokens this core's protocol logic depends on.

/// Case-insensitive comparison of a header value against `"chunked"`,
/// tolerating leading/trailing `\r\n \t`. Used to detect
/// `Transfer-Encoding: chunked` per `spec.md` §4.2.
pub fn is_chunked(val: &[u8]) -> bool {
    if val.len() < "chunked".len() {
        return false;
    }
    let mut iter = val.iter();
    for (idx, &ch) in iter.by_ref().enumerate() {
        match ch {
            b'\r' | b'\n' | b' ' | b'\t' => continue,
            b'c' | b'C' => {
                if idx + "chunked".len() > val.len() {
                    return false;
                }
                break;
            }
            _ => return false,
        }
    }
    for (idx, ch) in iter.by_ref().take(6).enumerate() {
        if b"hunked"[idx] != ch.to_ascii_lowercase() {
            return false;
        }
    }
    for &ch in iter {
        if !matches!(ch, b'\r' | b'\n' | b' ' | b'\t') {
            return false;
        }
    }
    true
}

/// Case-insensitive match of a header line's name against `name`,
/// e.g. does `b"Content-Length: 5"` start with the header `"content-length"`.
/// Per `spec.md` §4.2: after matching `name`, skip spaces, then require
/// `:`. Returns the byte offset right after the `:` if so.
pub fn header_name_prefix(line: &[u8], name: &str) -> Option<usize> {
    let name = name.as_bytes();
    if line.len() < name.len() {
        return None;
    }
    for (a, &b) in name.iter().zip(line.iter()) {
        if a.to_ascii_lowercase() != b.to_ascii_lowercase() {
            return None;
        }
    }
    let mut i = name.len();
    while i < line.len() && line[i] == b' ' {
        i += 1;
    }
    if i >= line.len() || line[i] != b':' {
        return None;
    }
    Some(i + 1)
}

/// Case-insensitive "starts with" for matching `Content-Type` values
/// against `application/x-www-form-urlencoded`.
pub fn starts_with_ignore_case(haystack: &[u8], prefix: &str) -> bool {
    let prefix = prefix.as_bytes();
    if haystack.len() < prefix.len() {
        return false;
    }
    haystack[..prefix.len()].iter().zip(prefix.iter())
        .all(|(&a, &b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
}
