//! OCI repository-name grammar validation and the container-name slug.
//!
//! Grammar (from the OCI distribution spec's pulling-manifests section):
//! `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*(\/[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*)*`.

use anyhow::Result;

use crate::error::IngressError;

const MAX_NAME_LEN: usize = 255;
const MAX_VERSION_LEN: usize = 128;

/// One `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*` segment of the grammar.
fn fullmatches_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }

    let bytes = segment.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    let mut i = 0;
    // Leading `[a-z0-9]+`
    let start = i;
    while i < bytes.len() && is_alnum(bytes[i]) {
        i += 1;
    }
    if i == start {
        return false;
    }

    // Zero or more `(\.|_|__|-+)[a-z0-9]+` groups.
    while i < bytes.len() {
        let sep_start = i;
        match bytes[i] {
            b'.' => i += 1,
            b'_' => {
                // `_` or `__`: consume a second underscore if present.
                i += 1;
                if i < bytes.len() && bytes[i] == b'_' {
                    i += 1;
                }
            }
            b'-' => {
                while i < bytes.len() && bytes[i] == b'-' {
                    i += 1;
                }
            }
            _ => return false,
        }
        if i == sep_start {
            return false;
        }
        let alnum_start = i;
        while i < bytes.len() && is_alnum(bytes[i]) {
            i += 1;
        }
        if i == alnum_start {
            return false;
        }
    }

    true
}

/// Fullmatches the OCI repository-name grammar: one or more `/`-separated
/// segments, each matching `fullmatches_segment`.
fn fullmatches_repository_grammar(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value.split('/').all(fullmatches_segment)
}

/// Validate a project name against the grammar and the 255-char cap.
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN || !fullmatches_repository_grammar(name) {
        return Err(IngressError::new(format!("Invalid docker name: {name}")).into());
    }
    Ok(())
}

/// Validate a project version against the grammar and the 128-char cap.
pub fn validate_version(version: &str) -> Result<()> {
    if version.len() > MAX_VERSION_LEN || !fullmatches_repository_grammar(version) {
        return Err(IngressError::new(format!("Invalid docker version: {version}")).into());
    }
    Ok(())
}

/// Strip every character outside `[A-Za-z0-9-]`.
pub fn slug(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(validate_name("hello").is_ok());
        assert!(validate_version("1.0.0").is_ok());
        assert!(validate_version("latest").is_ok());
    }

    #[test]
    fn rejects_uppercase() {
        assert!(validate_name("Hello").is_err());
    }

    #[test]
    fn rejects_names_over_length_cap() {
        let long = "a".repeat(256);
        assert!(validate_name(&long).is_err());
        let long_version = "a".repeat(129);
        assert!(validate_version(&long_version).is_err());
    }

    #[test]
    fn accepts_namespaced_names() {
        assert!(validate_name("my-org/my-app").is_ok());
    }

    #[test]
    fn accepts_single_and_double_underscore_separators() {
        assert!(validate_name("my_app").is_ok());
        assert!(validate_name("my__app").is_ok());
        assert!(validate_name("my___app").is_err());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(validate_name("").is_err());
        assert!(validate_name("/leading").is_err());
        assert!(validate_name("trailing/").is_err());
    }

    #[test]
    fn slug_strips_punctuation() {
        assert_eq!(slug("hello1.0.0"), "hello100");
        assert_eq!(slug("my_app:v1"), "myappv1");
    }
}
