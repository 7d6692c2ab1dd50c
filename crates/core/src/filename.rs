//! File name validation.
//!
//! Every name a client supplies (upload targets, download requests,
//! protection rules) passes through [`validate`] before it is joined onto
//! the files directory. Rejected names never touch the filesystem.

use crate::MAX_FILE_NAME_LEN;
use crate::error::{Error, Result};

/// Characters that are never allowed in a file name.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Device names Windows reserves regardless of extension.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Checks a client-supplied file name against the server's naming rules.
///
/// A valid name is a single path component: no separators, no parent
/// references, no control characters, no Windows-reserved device names,
/// and at most [`MAX_FILE_NAME_LEN`] bytes.
pub fn validate(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::MissingFileName);
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(Error::IllegalFileName(format!(
            "name exceeds {MAX_FILE_NAME_LEN} bytes"
        )));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(Error::PathTraversal(name.to_string()));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(Error::IllegalFileName(name.to_string()));
    }
    if name
        .chars()
        .any(|c| c.is_control() || ILLEGAL_CHARS.contains(&c))
    {
        return Err(Error::IllegalFileName(name.to_string()));
    }
    let stem = name.split('.').next().unwrap_or(name);
    if RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        return Err(Error::IllegalFileName(name.to_string()));
    }
    if name.eq_ignore_ascii_case("desktop.ini") {
        return Err(Error::IllegalFileName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for name in ["report.pdf", "archive.tar.gz", "video (1).mp4", "a"] {
            assert!(validate(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert!(matches!(validate(""), Err(Error::MissingFileName)));
        assert!(matches!(validate("   "), Err(Error::MissingFileName)));
    }

    #[test]
    fn rejects_traversal() {
        for name in ["../etc/passwd", "..", "a/b.txt", "a\\b.txt", "foo..bar"] {
            assert!(
                matches!(validate(name), Err(Error::PathTraversal(_))),
                "{name} should be blocked"
            );
        }
    }

    #[test]
    fn rejects_illegal_characters() {
        for name in ["a<b.txt", "a:b", "what?.png", "tab\there", "nul\0byte"] {
            assert!(
                matches!(validate(name), Err(Error::IllegalFileName(_))),
                "{name} should be illegal"
            );
        }
    }

    #[test]
    fn rejects_reserved_device_names() {
        for name in ["CON", "con.txt", "Lpt1.log", "NUL.tar.gz"] {
            assert!(
                matches!(validate(name), Err(Error::IllegalFileName(_))),
                "{name} should be illegal"
            );
        }
    }

    #[test]
    fn rejects_hidden_and_trailing_dot_names() {
        for name in [".bashrc", "trailing."] {
            assert!(matches!(validate(name), Err(Error::IllegalFileName(_))));
        }
    }

    #[test]
    fn rejects_desktop_ini() {
        assert!(matches!(
            validate("Desktop.INI"),
            Err(Error::IllegalFileName(_))
        ));
    }

    #[test]
    fn rejects_overlong_names() {
        let name = "a".repeat(MAX_FILE_NAME_LEN + 1);
        assert!(matches!(validate(&name), Err(Error::IllegalFileName(_))));
    }
}
