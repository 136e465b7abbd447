//! Key → filename mapping
//!
//! Keys are opaque strings. Each character that cannot appear in a filename
//! on the host OS is replaced by `_`; nothing else is escaped, so the
//! mapping is lossy: `a/b` and `a_b` land in the same file. Callers pick
//! keys that stay distinct after substitution.
//!
//! The illegal set follows the host: Windows forbids `<>:"/\|?*` and
//! control characters, Unix only `/` and NUL.

/// Replacement for every illegal character
pub const REPLACEMENT: char = '_';

/// Characters never allowed in a record filename on this host
#[cfg(windows)]
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[cfg(not(windows))]
const ILLEGAL_CHARS: &[char] = &['/', '\0'];

/// Is `c` illegal in a filename on this host?
#[cfg(windows)]
pub fn is_illegal(c: char) -> bool {
    (c as u32) < 0x20 || ILLEGAL_CHARS.contains(&c)
}

#[cfg(not(windows))]
pub fn is_illegal(c: char) -> bool {
    ILLEGAL_CHARS.contains(&c)
}

/// Map a key to its on-disk filename
pub fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if is_illegal(c) { REPLACEMENT } else { c })
        .collect()
}

/// Can the sanitized name address a regular file inside the data directory?
///
/// Empty names and the `.`/`..` entries refer to directories.
pub fn is_addressable(file_name: &str) -> bool {
    !matches!(file_name, "" | "." | "..")
}
