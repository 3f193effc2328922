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

//! The boundary between the protocol engine and mailbox storage.
//!
//! The engine never touches storage directly. It opens mailboxes through a
//! `MailStore`, operates on the resulting `MailStream`, and learns about
//! asynchronous changes through the `MailEvents` callbacks it passes into
//! every operation that may produce them.

use std::time::Duration;

use chrono::prelude::*;

use crate::support::error::Error;
use crate::support::interrupt::CriticalGuard;
use crate::support::passwd::Identity;

pub mod memory;
pub mod model;

pub use self::model::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    /// The stream cannot continue; the session must end.
    Fatal,
}

/// What the storage layer should do about a failed write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskErrorAction {
    Retry(Duration),
    Abort,
}

/// Callbacks from the storage layer into the protocol engine.
pub trait MailEvents {
    /// The mailbox now holds `count` messages.
    fn exists(&mut self, count: u32);
    /// The message with sequence number `seqnum` is gone. Later messages
    /// have already been renumbered by the time this returns.
    ///
    /// Only `ping`, `check` and `expunge` report expunges. Elsewhere a
    /// message removed by another session keeps its sequence number, and
    /// operations on it behave as if it did not exist.
    fn expunged(&mut self, seqnum: u32);
    /// The flags of `seqnum` changed behind the session's back.
    fn flags_changed(&mut self, seqnum: u32);
    fn log(&mut self, level: LogLevel, text: &str);
    /// The mailbox that was just opened has no messages.
    fn mailbox_empty(&mut self);
    /// A write failed. `serious` is set when giving up would risk leaving
    /// the mailbox corrupt.
    fn disk_error(&mut self, error: &Error, serious: bool) -> DiskErrorAction;
    /// COPY assigned `dest` in the destination mailbox for `source`.
    fn copy_uid(&mut self, uid_validity: u32, source: SeqRange, dest: SeqRange);
    /// APPEND assigned `dest` in the destination mailbox.
    fn append_uid(&mut self, uid_validity: u32, dest: SeqRange);
    /// Enter a section which must not be interrupted.
    fn enter_critical(&mut self) -> CriticalGuard;
}

/// A user's collection of mailboxes.
pub trait MailStore {
    fn hierarchy_delimiter(&self) -> char;

    fn open(
        &mut self,
        name: &str,
        options: OpenOptions,
        events: &mut dyn MailEvents,
    ) -> Result<Box<dyn MailStream>, Error>;

    fn create(&mut self, name: &str) -> Result<(), Error>;
    fn delete(&mut self, name: &str) -> Result<(), Error>;
    fn rename(&mut self, from: &str, to: &str) -> Result<(), Error>;
    fn subscribe(&mut self, name: &str) -> Result<(), Error>;
    fn unsubscribe(&mut self, name: &str) -> Result<(), Error>;

    fn list(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<ListEntry>, Error>;
    fn lsub(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<ListEntry>, Error>;

    fn status(
        &mut self,
        name: &str,
        items: &[StatusItem],
    ) -> Result<Vec<(StatusItem, u32)>, Error>;

    /// Append a message, returning its UID.
    fn append(
        &mut self,
        name: &str,
        flags: &[Flag],
        internal_date: Option<DateTime<FixedOffset>>,
        data: &[u8],
        events: &mut dyn MailEvents,
    ) -> Result<u32, Error>;
}

/// An open mailbox.
///
/// Messages are addressed by sequence number; `uid()` and `seqnum()`
/// translate to and from persistent identifiers.
pub trait MailStream {
    fn name(&self) -> &str;
    fn read_only(&self) -> bool;

    fn exists(&self) -> u32;
    fn recent(&self) -> u32;
    fn uid_validity(&self) -> u32;
    fn uid_next(&self) -> u32;
    /// Sequence number of the first message without `\Seen`.
    fn first_unseen(&self) -> Option<u32>;
    /// Flags defined in this mailbox.
    fn defined_flags(&self) -> Vec<Flag>;
    /// Flags which may be changed permanently, and whether new keywords
    /// may be created.
    fn permanent_flags(&self) -> (Vec<Flag>, bool);

    fn uid(&self, seqnum: u32) -> Option<u32>;
    fn seqnum(&self, uid: u32) -> Option<u32>;

    /// Check for new messages and changes made elsewhere.
    fn ping(&mut self, events: &mut dyn MailEvents) -> Result<(), Error>;
    fn check(&mut self, events: &mut dyn MailEvents) -> Result<(), Error>;
    /// Expunge `\Deleted` messages, restricted to `uids` if given.
    fn expunge(
        &mut self,
        uids: Option<&SeqRange>,
        events: &mut dyn MailEvents,
    ) -> Result<(), Error>;
    fn close(
        &mut self,
        expunge: bool,
        events: &mut dyn MailEvents,
    ) -> Result<(), Error>;

    fn flags(
        &mut self,
        seqnum: u32,
        events: &mut dyn MailEvents,
    ) -> Result<Vec<Flag>, Error>;
    fn is_recent(&self, seqnum: u32) -> bool;
    fn internal_date(
        &mut self,
        seqnum: u32,
    ) -> Result<DateTime<FixedOffset>, Error>;
    fn size(&mut self, seqnum: u32) -> Result<u32, Error>;
    fn envelope(&mut self, seqnum: u32) -> Result<Envelope, Error>;
    fn body_structure(&mut self, seqnum: u32) -> Result<BodyStructure, Error>;
    fn section(
        &mut self,
        seqnum: u32,
        section: &Section,
    ) -> Result<Vec<u8>, Error>;
    /// The decoded content of the given part.
    fn binary(&mut self, seqnum: u32, part: &[u32]) -> Result<Vec<u8>, Error>;

    fn store_flags(
        &mut self,
        seqnums: &SeqRange,
        op: FlagOp,
        flags: &[Flag],
        events: &mut dyn MailEvents,
    ) -> Result<(), Error>;

    /// Return the sequence numbers matching `key`, ascending.
    fn search(
        &mut self,
        key: &SearchKey,
        events: &mut dyn MailEvents,
    ) -> Result<Vec<u32>, Error>;
    fn sort(
        &mut self,
        program: &[SortKey],
        key: &SearchKey,
        events: &mut dyn MailEvents,
    ) -> Result<Vec<u32>, Error>;
    fn thread(
        &mut self,
        algorithm: ThreadAlgorithm,
        key: &SearchKey,
        events: &mut dyn MailEvents,
    ) -> Result<Vec<ThreadNode>, Error>;

    fn copy(
        &mut self,
        seqnums: &SeqRange,
        dest: &str,
        events: &mut dyn MailEvents,
    ) -> Result<(), Error>;
}

/// Gives authenticated users access to their mailboxes.
pub trait StoreProvider {
    fn open_store(
        &self,
        identity: &Identity,
    ) -> Result<Box<dyn MailStore>, Error>;
}
