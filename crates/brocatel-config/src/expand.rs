//! Environment variable expansion for configuration strings.
//!
//! Supports:
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default

use crate::ConfigError;

/// Expand environment variable references in a string.
///
/// Bare `$VAR` syntax is not expanded (only `${VAR}` with braces).
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, LookupError> {
        match std::env::var(var) {
            Ok(val) => Ok(Some(val)),
            Err(_) => Err(LookupError {
                var_name: var.to_owned(),
            }),
        }
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{0}}} not set", e.cause.var_name),
    })
}

/// Error returned when environment variable lookup fails.
struct LookupError {
    var_name: String,
}

/// Expands an optional field in place.
pub(crate) fn expand_opt(value: &mut Option<String>, field: &str) -> Result<(), ConfigError> {
    if let Some(v) = value.as_deref() {
        *value = Some(expand_env(v, field)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_expand_with_default_uses_value() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("BROCATEL_TEST_STORY_DIR", "chapters");
        }
        let result = expand_env("${BROCATEL_TEST_STORY_DIR:-story}", "story.source_dir").unwrap();
        assert_eq!(result, "chapters");
        unsafe {
            std::env::remove_var("BROCATEL_TEST_STORY_DIR");
        }
    }

    #[test]
    fn test_expand_with_default_uses_default() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("BROCATEL_TEST_UNSET");
        }
        let result = expand_env("${BROCATEL_TEST_UNSET:-main}", "story.entry").unwrap();
        assert_eq!(result, "main");
    }

    #[test]
    fn test_expand_missing_var_error() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("BROCATEL_TEST_MISSING");
        }
        let err = expand_env("out/${BROCATEL_TEST_MISSING}.lua", "story.output").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("BROCATEL_TEST_MISSING"));
        assert!(err.to_string().contains("story.output"));
    }

    #[test]
    fn test_bare_dollar_not_expanded() {
        assert_eq!(expand_env("$HOME/story", "story.source_dir").unwrap(), "$HOME/story");
    }

    #[test]
    fn test_expand_opt() {
        let mut value = None;
        expand_opt(&mut value, "gettext.output").unwrap();
        assert_eq!(value, None);

        let mut value = Some("${BROCATEL_TEST_POT:-main.pot}".to_owned());
        expand_opt(&mut value, "gettext.output").unwrap();
        assert_eq!(value.as_deref(), Some("main.pot"));
    }
}
