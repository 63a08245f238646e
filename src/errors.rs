// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::SessionId;
use std::error;
use std::{cmp, io, result};

quick_error! {
    /// The base error type for the vote ledger.
    #[derive(Debug)]
    pub enum Error {
        /// An IO error occurred
        Io(err: io::Error) {
            from()
            cause(err)
            display("{}", err)
        }
        /// A JSON (de)serialization error occurred.
        Json(err: serde_json::Error) {
            from()
            cause(err)
            display("{}", err)
        }
        /// The HTTP server failed.
        Http(err: hyper::Error) {
            from()
            cause(err)
            display("{}", err)
        }
        /// A storage error occurred.
        Store(err: StorageError) {
            from()
            cause(err)
            display("{}", err)
        }
        /// The address has already voted in the session.
        DuplicateVote(session_id: SessionId, address: String) {
            display("address {} has already voted in session {}", address, session_id)
        }
        /// The voter address is empty.
        InvalidAddress {
            display("voter address must not be empty")
        }
        /// The config is invalid.
        ConfigInvalid(desc: String) {
            display("{}", desc)
        }
        /// A request to the ledger is malformed.
        RequestInvalid(desc: String) {
            display("{}", desc)
        }
    }
}

impl cmp::PartialEq for Error {
    #[allow(clippy::match_same_arms)]
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (&Error::Store(ref e1), &Error::Store(ref e2)) => e1 == e2,
            (&Error::Io(ref e1), &Error::Io(ref e2)) => e1.kind() == e2.kind(),
            (&Error::DuplicateVote(s1, ref a1), &Error::DuplicateVote(s2, ref a2)) => {
                s1 == s2 && a1 == a2
            }
            (&Error::InvalidAddress, &Error::InvalidAddress) => true,
            (&Error::ConfigInvalid(ref e1), &Error::ConfigInvalid(ref e2)) => e1 == e2,
            (&Error::RequestInvalid(ref e1), &Error::RequestInvalid(ref e2)) => e1 == e2,
            _ => false,
        }
    }
}

quick_error! {
    /// An error with the storage.
    #[derive(Debug)]
    pub enum StorageError {
        /// The persisted votes cannot be trusted, e.g. a line failed to parse
        /// or a voter appears twice in one session.
        Corrupted(desc: String) {
            display("storage corrupted: {}", desc)
        }
        /// The storage refused the write and nothing was persisted.
        Unavailable {
            display("storage is temporarily unavailable")
        }
        /// Some other error occurred.
        Other(err: Box<dyn error::Error + Sync + Send>) {
            from()
            cause(err.as_ref())
            display("unknown error {:?}", err)
        }
    }
}

impl cmp::PartialEq for StorageError {
    #[allow(clippy::match_same_arms)]
    fn eq(&self, other: &StorageError) -> bool {
        matches!(
            (self, other),
            (StorageError::Corrupted(_), StorageError::Corrupted(_))
                | (StorageError::Unavailable, StorageError::Unavailable)
        )
    }
}

impl Error {
    /// Whether the error was caused by the caller rather than the ledger.
    ///
    /// The HTTP layer maps these to `400 Bad Request`, everything else is a
    /// `500`.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateVote(..) | Error::InvalidAddress | Error::RequestInvalid(_)
        )
    }
}

/// A result type that wraps up the vote ledger errors.
pub type Result<T> = result::Result<T, Error>;
