//! Error types.
//!
//! Problems in story sources are reported as diagnostics, never as errors.
//! These types cover failures of the machinery itself.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

/// Location prefix Lua puts on errors raised inside a named chunk.
static CHUNK_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:\[string "[^"]*"\]|[^:\s]+):\d+: "#).unwrap());

/// Failure inside the embedded script runtime.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("{}", lua_message(.0))]
    Lua(#[from] mlua::Error),

    /// A macro returned something that is not a document node.
    #[error("malformed node: {0}")]
    MalformedNode(String),
}

/// Failure to fetch a story file.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no such file: {0}")]
    NotFound(String),
}

/// Fatal failure compiling one file.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("script engine: {0}")]
    Script(#[from] ScriptError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// The first line of a Lua error, without tracebacks or chunk location.
pub(crate) fn lua_message(error: &mlua::Error) -> String {
    let message = match error {
        mlua::Error::SyntaxError { message, .. } | mlua::Error::RuntimeError(message) => {
            message.clone()
        }
        mlua::Error::CallbackError { cause, .. } => return lua_message(cause),
        other => other.to_string(),
    };
    let first = message.lines().next().unwrap_or_default();
    CHUNK_PREFIX_RE.replace(first, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lua_message_drops_traceback() {
        let error = mlua::Error::RuntimeError("boom\nstack traceback:\n\t[C]: in ?".to_owned());
        assert_eq!(ScriptError::from(error).to_string(), "boom");
    }

    #[test]
    fn test_lua_message_drops_chunk_location() {
        let error = mlua::Error::RuntimeError("[string \"macro-1\"]:3: bad".to_owned());
        assert_eq!(ScriptError::from(error).to_string(), "bad");
        let error = mlua::Error::RuntimeError("builtin:12: bad".to_owned());
        assert_eq!(ScriptError::from(error).to_string(), "bad");
        let error = mlua::Error::RuntimeError("unknown macro: x".to_owned());
        assert_eq!(ScriptError::from(error).to_string(), "unknown macro: x");
    }

    #[test]
    fn test_fetch_error_display() {
        let error = FetchError::NotFound("chapter".to_owned());
        assert_eq!(error.to_string(), "no such file: chapter");
    }
}
