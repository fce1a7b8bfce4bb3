//! Ref name validation following git-style conventions.
//!
//! Valid ref names:
//! - Are exactly `HEAD`, or start with `refs/`
//! - Must not contain whitespace, control characters, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` or `@{`
//! - Must not end with `/`, `.` or `.lock`
//! - Components between slashes must be non-empty and not start with `.`

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a full ref name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use stratus_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("HEAD").is_ok());
/// assert!(validate_ref_name("refs/heads/feature/auth").is_ok());
/// assert!(validate_ref_name("main").is_err());
/// assert!(validate_ref_name("refs/heads/bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name == "HEAD" {
        return Ok(());
    }
    let rest = name
        .strip_prefix("refs/")
        .ok_or_else(|| invalid(name, "must be HEAD or start with 'refs/'"))?;
    if rest.is_empty() {
        return Err(invalid(name, "missing name after 'refs/'"));
    }

    if let Some(ch) = name
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name.ends_with('/') || name.ends_with('.') {
        return Err(invalid(name, "must not end with '/' or '.'"));
    }
    if name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.lock'"));
    }
    for component in rest.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_names() {
        for name in [
            "HEAD",
            "refs/heads/main",
            "refs/heads/feature/deep/nested",
            "refs/tags/v1.0.0",
            "refs/remotes/origin/main",
            "refs/notes/commits",
        ] {
            assert!(validate_ref_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn requires_refs_prefix() {
        assert!(validate_ref_name("main").is_err());
        assert!(validate_ref_name("heads/main").is_err());
        assert!(validate_ref_name("refs/").is_err());
        assert!(validate_ref_name("").is_err());
    }

    #[test]
    fn rejects_forbidden_characters() {
        for name in [
            "refs/heads/a b",
            "refs/heads/a~1",
            "refs/heads/a^",
            "refs/heads/a:b",
            "refs/heads/a?",
            "refs/heads/a*",
            "refs/heads/a[0]",
            "refs/heads/a\\b",
            "refs/heads/a\tb",
            "refs/heads/a\u{7f}",
        ] {
            assert!(validate_ref_name(name).is_err(), "{name:?} should be invalid");
        }
    }

    #[test]
    fn rejects_git_reserved_sequences() {
        assert!(validate_ref_name("refs/heads/a..b").is_err());
        assert!(validate_ref_name("refs/heads/a@{1}").is_err());
        assert!(validate_ref_name("refs/heads/main.lock").is_err());
        assert!(validate_ref_name("refs/heads/main/").is_err());
        assert!(validate_ref_name("refs/heads/main.").is_err());
    }

    #[test]
    fn rejects_bad_components() {
        assert!(validate_ref_name("refs/heads//main").is_err());
        assert!(validate_ref_name("refs/heads/.hidden").is_err());
    }

    #[test]
    fn error_names_the_ref() {
        let err = validate_ref_name("refs/heads/x..y").unwrap_err();
        match err {
            RefError::InvalidName { name, reason } => {
                assert_eq!(name, "refs/heads/x..y");
                assert!(reason.contains(".."));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
