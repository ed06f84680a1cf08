//! Rich diagnostic error types for the chat-friend decision core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Most of these are recoverable inside a
//! session: only startup failures (config, paths) ever reach `main`.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for chat-friend.
#[derive(Debug, Error, Diagnostic)]
pub enum ChatError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Preference(#[from] PreferenceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] crate::paths::PathError),
}

/// Convenience alias for top-level operations.
pub type ChatResult<T> = std::result::Result<T, ChatError>;

// ---------------------------------------------------------------------------
// Action-value table errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TableError {
    #[error("action-value table needs at least one state and one action, got {states}x{actions}")]
    #[diagnostic(
        code(chat::table::empty_dimension),
        help("Construct the table with a non-empty state set and a non-empty action set.")
    )]
    EmptyDimension { states: usize, actions: usize },

    #[error("catalog mismatch: {phrases} phrases but {responses} responses")]
    #[diagnostic(
        code(chat::table::catalog_mismatch),
        help(
            "The offline bootstrap pairs phrase i with response i, so both catalogs \
             must have the same length."
        )
    )]
    CatalogMismatch { phrases: usize, responses: usize },
}

pub type TableResult<T> = std::result::Result<T, TableError>;

// ---------------------------------------------------------------------------
// Preference store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PreferenceError {
    #[error("preference file not found: {path}")]
    #[diagnostic(
        code(chat::preference::not_found),
        help("Nothing has been remembered yet. The file is created on the first new preference.")
    )]
    NotFound { path: String },

    #[error("malformed preference file {path}: {message}")]
    #[diagnostic(
        code(chat::preference::parse),
        help(
            "Expected a JSON document like {{\"preferences\": [\"pizza\"]}}. \
             Fix or delete the file; the session starts with an empty store meanwhile."
        )
    )]
    Parse { path: String, message: String },

    #[error("failed to write preference file {path}")]
    #[diagnostic(
        code(chat::preference::io),
        help(
            "Check that the data directory exists and is writable. The preference is \
             kept in memory for the rest of the session."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty preference text")]
    #[diagnostic(
        code(chat::preference::empty),
        help("A preference must contain at least one non-whitespace character.")
    )]
    Empty,
}

pub type PreferenceResult<T> = std::result::Result<T, PreferenceError>;

// ---------------------------------------------------------------------------
// Content fetch errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("transport error talking to {provider}: {message}")]
    #[diagnostic(
        code(chat::fetch::transport),
        help("The provider could not be reached. Check network connectivity or run with --offline.")
    )]
    Transport { provider: String, message: String },

    #[error("{provider} answered HTTP {status}")]
    #[diagnostic(
        code(chat::fetch::status),
        help("The provider rejected the request. It may be rate limiting or temporarily down.")
    )]
    Status { provider: String, status: u16 },

    #[error("could not decode {provider} response: {message}")]
    #[diagnostic(
        code(chat::fetch::decode),
        help("The provider changed its response format or returned an error page.")
    )]
    Decode { provider: String, message: String },

    #[error("{provider} has nothing about \"{term}\"")]
    #[diagnostic(code(chat::fetch::empty), help("Try rephrasing the search term."))]
    Empty { provider: String, term: String },

    #[error("content fetching is disabled")]
    #[diagnostic(
        code(chat::fetch::offline),
        help("Remove --offline (or set fetch.offline = false) to enable searches.")
    )]
    Offline,
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("failed to read console input")]
    #[diagnostic(
        code(chat::session::input),
        help("The input stream was closed or is not valid UTF-8.")
    )]
    Input {
        #[source]
        source: std::io::Error,
    },
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_error_converts_to_chat_error() {
        let err: ChatError = PreferenceError::Empty.into();
        assert!(matches!(err, ChatError::Preference(PreferenceError::Empty)));
    }

    #[test]
    fn diagnostic_codes_are_namespaced() {
        let err = TableError::EmptyDimension {
            states: 0,
            actions: 2,
        };
        let code = err.code().map(|c| c.to_string()).unwrap_or_default();
        assert_eq!(code, "chat::table::empty_dimension");
        assert!(err.to_string().contains("0x2"));
    }
}
