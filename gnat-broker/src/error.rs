use std::fmt::Display;

use gnat_core::err::{DecodeError, EncodeError};
use tokio::io;
use tokio::sync::mpsc::error::SendError;

#[derive(Debug)]
pub struct BrokerError {
    kind: ErrorKind,
    message: String,
}

#[derive(Debug)]
pub enum ErrorKind {
    IoError(io::Error),
    DecodeError,
    EncodeError,
    ProtocolError,
    ChannelError,
}

impl BrokerError {
    pub fn new(kind: ErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> &ErrorKind {
        return &self.kind;
    }

    pub fn message(&self) -> &str {
        return &self.message;
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{:?}", self);
    }
}

impl Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}. {}", self.kind, self.message);
    }
}

impl std::error::Error for BrokerError {}

impl From<DecodeError> for BrokerError {
    fn from(value: DecodeError) -> Self {
        return Self {
            kind: ErrorKind::DecodeError,
            message: value.message().to_owned(),
        };
    }
}

impl From<EncodeError> for BrokerError {
    fn from(value: EncodeError) -> Self {
        return Self {
            kind: ErrorKind::EncodeError,
            message: value.message().to_owned(),
        };
    }
}

impl From<io::Error> for BrokerError {
    fn from(value: io::Error) -> Self {
        return Self {
            kind: ErrorKind::IoError(value),
            message: String::new(),
        };
    }
}

impl<T> From<SendError<T>> for BrokerError {
    fn from(_: SendError<T>) -> Self {
        return Self {
            kind: ErrorKind::ChannelError,
            message: String::from("The receiving task is gone."),
        };
    }
}
