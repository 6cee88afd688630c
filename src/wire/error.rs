use std::{fmt, io};

/// Errors raised while decoding a message or constructing names and record
/// payloads.
///
/// [`Message::decode`](super::Message::decode) never surfaces this type
/// directly: every variant is caught at the top level, rendered into the
/// message's [`last_error`](super::Message::last_error) field, and parsing
/// stops there.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum Error {
    /// The end of the message was reached while more data was expected.
    Eof,
    /// A name pointer did not point strictly backwards in the message.
    PointerLoop,
    /// A label length prefix used the reserved `01`/`10` bit patterns.
    InvalidLabelType,
    /// An empty label was encountered where it is not allowed.
    InvalidEmptyLabel,
    /// A label exceeded the maximum length of 63 octets.
    LabelTooLong,
    /// A name exceeded the maximum encoded length of 255 octets.
    NameTooLong,
    /// A TXT character string exceeded 255 octets.
    StringTooLong,
    /// The four section counts of a header add up to more than
    /// [`MAX_RECORDS_PER_MESSAGE`](crate::wire::MAX_RECORDS_PER_MESSAGE).
    TooManyRecords,
}

impl Error {
    fn description(&self) -> &str {
        match self {
            Error::Eof => "unexpected end of message",
            Error::PointerLoop => "name pointer does not point strictly backwards",
            Error::InvalidLabelType => "reserved label type bits",
            Error::InvalidEmptyLabel => "invalid empty label",
            Error::LabelTooLong => "label exceeds 63 octets",
            Error::NameTooLong => "name exceeds 255 octets",
            Error::StringTooLong => "character string exceeds 255 octets",
            Error::TooManyRecords => "too many records in message",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        let kind = match e {
            Error::Eof => io::ErrorKind::UnexpectedEof,
            Error::PointerLoop
            | Error::InvalidLabelType
            | Error::TooManyRecords => io::ErrorKind::InvalidData,
            Error::InvalidEmptyLabel
            | Error::LabelTooLong
            | Error::NameTooLong
            | Error::StringTooLong => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, e.description())
    }
}
