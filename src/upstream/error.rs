//! Error type for managing upstreams.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use super::addr::AddrError;
use std::collections::TryReserveError;
use std::error;
use std::fmt::{Display, Formatter};

/// Error type for managing upstreams.
///
/// Whenever one of these is returned, the upstream forest has been left
/// unchanged.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The address of a new upstream could not be parsed.
    AddressFormat(AddrError),

    /// The configured maximum number of upstreams has been reached.
    ResourceExhausted,

    /// Memory for a new upstream or record could not be allocated.
    OutOfMemory,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::AddressFormat(err) => {
                write!(f, "bad upstream address: {}", err)
            }
            Error::ResourceExhausted => {
                write!(f, "too many upstreams")
            }
            Error::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::AddressFormat(err) => Some(err),
            Error::ResourceExhausted => None,
            Error::OutOfMemory => None,
        }
    }
}

impl From<AddrError> for Error {
    fn from(err: AddrError) -> Self {
        Error::AddressFormat(err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}
