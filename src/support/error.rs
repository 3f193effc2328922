//-
// Copyright (c) 2026, The Kestrel Authors
//
// This file is part of Kestrel.
//
// Kestrel is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Kestrel is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Kestrel. If not, see <http://www.gnu.org/licenses/>.

use std::io;

use thiserror::Error;

use super::interrupt::InterruptKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Timed out waiting for client input")]
    TimedOut,
    #[error("Client disconnected")]
    Eof,
    #[error("Command line too long")]
    CommandLineTooLong,
    #[error("Literal of {0} octets exceeds the limit of {1}")]
    LiteralTooLarge(u32, u32),
    #[error("Too many literals in one command")]
    TooManyLiterals,
    #[error("Interrupted: {0}")]
    Interrupted(InterruptKind),
    #[error("Mailbox does not exist")]
    NxMailbox,
    #[error("Mailbox already exists")]
    MailboxExists,
    #[error("Mailbox is read-only")]
    MailboxReadOnly,
    #[error("Operation not allowed on INBOX")]
    BadOperationOnInbox,
    #[error("Mailbox has inferior mailboxes")]
    MailboxHasInferiors,
    #[error("No such message")]
    NxMessage,
    #[error("Unknown content-transfer-encoding")]
    UnknownCte,
    #[error("Unsupported charset")]
    BadCharset,
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("{0}")]
    Storage(String),
    #[error("Fatal mailbox error: {0}")]
    FatalStorage(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error means the client connection itself is unusable.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            *self,
            Error::Eof | Error::Io(..) | Error::Interrupted(..)
        )
    }
}
