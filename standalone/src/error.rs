//! Definitions of the errors this crate can surface to callers

use std::backtrace::{Backtrace, BacktraceStatus};
use std::str::Utf8Error;

/// A [`std::result::Result`] that has the crate [`Error`] as the error variant
pub type DeltaResult<T, E = Error> = std::result::Result<T, E>;

/// All the types of errors that can occur while reading a table
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// This is an error that includes a backtrace. To have a particular type of error include
    /// such backtrace (when RUST_BACKTRACE=1), annotate the error with `#[error(transparent)]`
    /// and add the error type and enum variant to the `from_with_backtrace!` macro invocation
    /// below. See IOError for an example.
    #[error("{source}\n{backtrace}")]
    Backtraced {
        source: Box<Self>,
        backtrace: Box<Backtrace>,
    },

    /// An error performing operations on arrow data
    #[error(transparent)]
    Arrow(arrow_schema::ArrowError),

    /// A generic error with a message
    #[error("Generic delta error: {0}")]
    Generic(String),

    /// A generic error wrapping another error
    #[error("Generic error: {source}")]
    GenericError {
        /// Source error
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Some kind of [`std::io::Error`]
    #[error(transparent)]
    IOError(std::io::Error),

    /// An internal invariant was violated, which is a bug in this crate or in the calling code
    #[error("Internal error {0}. This is a bug, please report.")]
    InternalError(String),

    /// An error encountered while working with parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// A specified file could not be found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A column was requested, but not found in the record
    #[error("No such column: {0}")]
    MissingColumn(String),

    /// A column was accessed through a getter of the wrong type
    #[error("Unexpected column type: {0}")]
    UnexpectedColumnType(String),

    /// A value's type cannot be represented by the scalar model
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// The requested version of the table could not be found in the log
    #[error("No table version found.")]
    MissingVersion,

    /// No commits and no checkpoint exist at the given location
    #[error("No delta log found at {0}")]
    TableNotFound(String),

    /// A specified URL was invalid
    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// serde encountered malformed json
    #[error(transparent)]
    MalformedJson(serde_json::Error),

    /// A log record was valid JSON but not a valid action
    #[error("Invalid action record: {0}")]
    InvalidAction(String),

    /// A schema string could not be parsed, or a type tree was malformed
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A file in the log directory has a malformed versioned name
    #[error("Invalid log path: {0}")]
    InvalidLogPath(String),

    /// The set of log files found cannot be replayed into a snapshot
    #[error("Invalid log segment: {0}")]
    InvalidLogSegment(String),

    /// The configured parquet time zone id is not a known zone
    #[error("Invalid time zone id: {0}")]
    InvalidTimeZone(String),

    /// There was no metadata action in the log
    #[error("No table metadata found in delta log.")]
    MissingMetadata,

    /// Could not convert to string from utf-8
    #[error("Could not convert to string from utf-8: {0}")]
    Utf8Error(#[from] Utf8Error),
}

// Convenience constructors for Error types that take a String argument
impl Error {
    pub fn generic_err(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::GenericError {
            source: source.into(),
        }
    }
    pub fn generic(msg: impl ToString) -> Self {
        Self::Generic(msg.to_string())
    }
    pub fn file_not_found(path: impl ToString) -> Self {
        Self::FileNotFound(path.to_string())
    }
    pub fn missing_column(name: impl ToString) -> Self {
        Self::MissingColumn(name.to_string())
    }
    pub fn unexpected_column_type(msg: impl ToString) -> Self {
        Self::UnexpectedColumnType(msg.to_string())
    }
    pub fn unsupported_type(msg: impl ToString) -> Self {
        Self::UnsupportedType(msg.to_string())
    }
    pub fn table_not_found(location: impl ToString) -> Self {
        Self::TableNotFound(location.to_string())
    }
    pub fn invalid_action(msg: impl ToString) -> Self {
        Self::InvalidAction(msg.to_string())
    }
    pub fn invalid_schema(msg: impl ToString) -> Self {
        Self::InvalidSchema(msg.to_string())
    }
    pub fn invalid_log_path(location: impl ToString) -> Self {
        Self::InvalidLogPath(location.to_string())
    }
    pub fn invalid_log_segment(msg: impl ToString) -> Self {
        Self::InvalidLogSegment(msg.to_string())
    }
    pub fn invalid_time_zone(id: impl ToString) -> Self {
        Self::InvalidTimeZone(id.to_string())
    }

    pub fn internal_error(msg: impl ToString) -> Self {
        Self::InternalError(msg.to_string()).with_backtrace()
    }

    // Capture a backtrace when the error is constructed.
    #[must_use]
    pub fn with_backtrace(self) -> Self {
        let backtrace = Backtrace::capture();
        match backtrace.status() {
            BacktraceStatus::Captured => Self::Backtraced {
                source: Box::new(self),
                backtrace: Box::new(backtrace),
            },
            _ => self,
        }
    }
}

macro_rules! from_with_backtrace(
    ( $(($error_type: ty, $error_variant: ident)), * ) => {
        $(
            impl From<$error_type> for Error {
                fn from(value: $error_type) -> Self {
                    Self::$error_variant(value).with_backtrace()
                }
            }
        )*
    };
);

from_with_backtrace!(
    (serde_json::Error, MalformedJson),
    (std::io::Error, IOError)
);

impl From<arrow_schema::ArrowError> for Error {
    fn from(value: arrow_schema::ArrowError) -> Self {
        Self::Arrow(value).with_backtrace()
    }
}
