use derive_more::Display;
use thiserror::Error;

/// The error type returned by the line parser.
#[derive(Debug, Error)]
#[error("parse error: {kind}")]
pub struct ParseError {
    kind: ParseErrorKind,
}

/// A list specifying categories of parse errors.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The client issued a command that we don't recognize.
    #[display("unknown command: {}", command)]
    UnknownCommand {
        /// The command that we don't recognize.
        command: String,
    },
    /// The client issued an invalid command (e.g. missing parameter where one is required).
    #[display("invalid command")]
    InvalidCommand,
    /// A token (e.g. the command token) contained invalid UTF-8 characters.
    #[display("invalid UTF-8 in token")]
    InvalidUtf8,
    /// An invalid end-of-line was encountered.
    #[display("invalid end-of-line")]
    InvalidEol,
    /// A token contained an invalid character.
    #[display("invalid character in token: {:#x}", token)]
    InvalidToken {
        /// The offending byte.
        token: u8,
    },
}

impl ParseError {
    /// Returns the category of this parse error.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

impl From<ParseErrorKind> for ParseError {
    fn from(kind: ParseErrorKind) -> ParseError {
        ParseError { kind }
    }
}

impl From<std::str::Utf8Error> for ParseError {
    fn from(_: std::str::Utf8Error) -> ParseError {
        ParseError {
            kind: ParseErrorKind::InvalidUtf8,
        }
    }
}

/// The Result type used by the parser.
pub type Result<T> = std::result::Result<T, ParseError>;
