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

//! A complete mail store held entirely in memory.
//!
//! Nothing is persisted. This backs the test suite and `dev imap-test`, and
//! serves as the reference for how a storage driver is expected to drive
//! the `MailEvents` callbacks.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::prelude::*;
use log::warn;

use self::search::Candidate;
use super::*;

mod header;
mod message;
mod quoted_printable;
mod search;

const DELIMITER: char = '/';

#[derive(Clone, Debug)]
struct StoredMessage {
    uid: u32,
    flags: Vec<Flag>,
    /// Not yet claimed by any session.
    recent: bool,
    internal_date: DateTime<FixedOffset>,
    data: Arc<Vec<u8>>,
    modseq: u64,
}

#[derive(Clone, Debug)]
struct Mailbox {
    uid_validity: u32,
    uid_next: u32,
    messages: Vec<StoredMessage>,
    keywords: Vec<Flag>,
    modseq: u64,
}

impl Mailbox {
    fn new(uid_validity: u32) -> Self {
        Mailbox {
            uid_validity,
            uid_next: 1,
            messages: vec![],
            keywords: vec![],
            modseq: 1,
        }
    }

    fn message(&self, uid: u32) -> Option<&StoredMessage> {
        self.messages
            .binary_search_by_key(&uid, |m| m.uid)
            .ok()
            .map(|ix| &self.messages[ix])
    }

    fn message_mut(&mut self, uid: u32) -> Option<&mut StoredMessage> {
        match self.messages.binary_search_by_key(&uid, |m| m.uid) {
            Ok(ix) => Some(&mut self.messages[ix]),
            Err(_) => None,
        }
    }

    fn learn_keywords(&mut self, flags: &[Flag]) {
        for flag in flags {
            if let Flag::Keyword(..) = *flag {
                if !self.keywords.contains(flag) {
                    self.keywords.push(flag.clone());
                }
            }
        }
    }

    fn add(
        &mut self,
        flags: &[Flag],
        internal_date: DateTime<FixedOffset>,
        data: Arc<Vec<u8>>,
    ) -> u32 {
        let uid = self.uid_next;
        self.uid_next += 1;
        self.modseq += 1;
        self.learn_keywords(flags);
        self.messages.push(StoredMessage {
            uid,
            flags: flags.to_vec(),
            recent: true,
            internal_date,
            data,
            modseq: self.modseq,
        });
        uid
    }
}

/// Something another session does while this one is fetching flags.
#[derive(Debug)]
enum FetchSideEffect {
    Deliver(String, Vec<u8>),
    Expunge(String, u32),
}

#[derive(Debug)]
struct StoreData {
    mailboxes: BTreeMap<String, Mailbox>,
    subscriptions: BTreeSet<String>,
    next_uid_validity: u32,
    calls: usize,
    on_fetch: Vec<FetchSideEffect>,
    pending_write_failure: Option<bool>,
}

impl StoreData {
    fn mailbox(&self, name: &str) -> Result<&Mailbox, Error> {
        self.mailboxes.get(name).ok_or(Error::NxMailbox)
    }

    fn mailbox_mut(&mut self, name: &str) -> Result<&mut Mailbox, Error> {
        self.mailboxes.get_mut(name).ok_or(Error::NxMailbox)
    }

    fn new_mailbox(&mut self, name: String) {
        let uid_validity = self.next_uid_validity;
        self.next_uid_validity += 1;
        self.mailboxes.insert(name, Mailbox::new(uid_validity));
    }

    fn has_inferiors(&self, name: &str) -> bool {
        let prefix = format!("{}{}", name, DELIMITER);
        self.mailboxes.keys().any(|k| k.starts_with(&prefix))
    }
}

/// Simulate a write, consulting the disk error policy if a failure has
/// been injected.
fn write_barrier(
    data: &mut StoreData,
    events: &mut dyn MailEvents,
) -> Result<(), Error> {
    if let Some(serious) = data.pending_write_failure.take() {
        let error = Error::Storage("Simulated write failure".to_owned());
        match events.disk_error(&error, serious) {
            // The retry always succeeds
            DiskErrorAction::Retry(_) => (),
            DiskErrorAction::Abort => {
                return Err(Error::FatalStorage(error.to_string()));
            }
        }
    }

    Ok(())
}

fn lock(inner: &Mutex<StoreData>) -> MutexGuard<'_, StoreData> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The in-memory store.
///
/// Clones share the same mailboxes.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreData>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store holding an empty INBOX.
    pub fn new() -> Self {
        let mut data = StoreData {
            mailboxes: BTreeMap::new(),
            subscriptions: BTreeSet::new(),
            next_uid_validity: 1,
            calls: 0,
            on_fetch: vec![],
            pending_write_failure: None,
        };
        data.new_mailbox("INBOX".to_owned());

        MemoryStore {
            inner: Arc::new(Mutex::new(data)),
        }
    }

    fn data(&self) -> MutexGuard<'_, StoreData> {
        lock(&self.inner)
    }

    /// Deliver a message from outside any session.
    pub fn deliver(
        &self,
        mailbox: &str,
        flags: &[Flag],
        data: &[u8],
    ) -> Result<u32, Error> {
        let mut store = self.data();
        let mailbox = store.mailbox_mut(&normalise_inbox(mailbox))?;
        Ok(mailbox.add(
            flags,
            Utc::now().with_timezone(&FixedOffset::east(0)),
            Arc::new(data.to_vec()),
        ))
    }

    /// Remove a message from outside any session.
    pub fn expunge_externally(
        &self,
        mailbox: &str,
        uid: u32,
    ) -> Result<(), Error> {
        let mut store = self.data();
        let mailbox = store.mailbox_mut(&normalise_inbox(mailbox))?;
        mailbox.messages.retain(|m| m.uid != uid);
        mailbox.modseq += 1;
        Ok(())
    }

    /// Change flags from outside any session.
    pub fn set_flags_externally(
        &self,
        mailbox: &str,
        uid: u32,
        flags: &[Flag],
    ) -> Result<(), Error> {
        let mut store = self.data();
        let mailbox = store.mailbox_mut(&normalise_inbox(mailbox))?;
        mailbox.modseq += 1;
        let modseq = mailbox.modseq;
        let message = mailbox.message_mut(uid).ok_or(Error::NxMessage)?;
        message.flags = flags.to_vec();
        message.modseq = modseq;
        Ok(())
    }

    /// Arrange for `data` to be delivered to `mailbox` the next time a
    /// session fetches message flags, so that the arrival is reported in
    /// the middle of a FETCH response.
    pub fn deliver_during_fetch(&self, mailbox: &str, data: &[u8]) {
        self.data().on_fetch.push(FetchSideEffect::Deliver(
            normalise_inbox(mailbox),
            data.to_vec(),
        ));
    }

    /// Like `deliver_during_fetch`, but removes the message with `uid`
    /// instead.
    pub fn expunge_during_fetch(&self, mailbox: &str, uid: u32) {
        self.data()
            .on_fetch
            .push(FetchSideEffect::Expunge(normalise_inbox(mailbox), uid));
    }

    /// Make the next write fail once.
    pub fn fail_next_write(&self, serious: bool) {
        self.data().pending_write_failure = Some(serious);
    }

    /// The number of storage operations performed so far.
    pub fn calls(&self) -> usize {
        self.data().calls
    }

    fn touch(&self) -> MutexGuard<'_, StoreData> {
        let mut data = self.data();
        data.calls += 1;
        data
    }

    fn entries(
        &self,
        data: &StoreData,
        names: impl Iterator<Item = String>,
        reference: &str,
        pattern: &str,
    ) -> Vec<ListEntry> {
        if pattern.is_empty() {
            return vec![ListEntry {
                attributes: vec!["\\Noselect"],
                delimiter: Some(DELIMITER),
                name: String::new(),
            }];
        }

        let full_pattern = format!("{}{}", reference, pattern);
        names
            .filter(|name| pattern_matches(&full_pattern, name, DELIMITER))
            .map(|name| {
                let attributes = if !data.mailboxes.contains_key(&name) {
                    vec!["\\Noselect"]
                } else if data.has_inferiors(&name) {
                    vec!["\\HasChildren"]
                } else {
                    vec!["\\HasNoChildren"]
                };

                ListEntry {
                    attributes,
                    delimiter: Some(DELIMITER),
                    name,
                }
            })
            .collect()
    }
}

impl StoreProvider for MemoryStore {
    fn open_store(
        &self,
        _identity: &Identity,
    ) -> Result<Box<dyn MailStore>, Error> {
        Ok(Box::new(self.clone()))
    }
}

impl MailStore for MemoryStore {
    fn hierarchy_delimiter(&self) -> char {
        DELIMITER
    }

    fn open(
        &mut self,
        name: &str,
        options: OpenOptions,
        events: &mut dyn MailEvents,
    ) -> Result<Box<dyn MailStream>, Error> {
        let name = normalise_inbox(name);
        let mut data = self.touch();
        let read_only = options.read_only || options.anonymous;
        let mailbox = data.mailbox_mut(&name)?;

        let mut recent = HashSet::new();
        for message in &mut mailbox.messages {
            if message.recent {
                recent.insert(message.uid);
                if !read_only {
                    message.recent = false;
                }
            }
        }

        let stream = MemoryStream {
            store: self.clone(),
            uid_validity: mailbox.uid_validity,
            uid_next: mailbox.uid_next,
            uids: mailbox.messages.iter().map(|m| m.uid).collect(),
            recent,
            synced_modseq: mailbox.modseq,
            name,
            read_only,
        };

        if stream.uids.is_empty() {
            events.mailbox_empty();
        }

        Ok(Box::new(stream))
    }

    fn create(&mut self, name: &str) -> Result<(), Error> {
        let name = normalise_inbox(name.trim_end_matches(DELIMITER));
        let mut data = self.touch();
        if name.is_empty() || data.mailboxes.contains_key(&name) {
            return Err(Error::MailboxExists);
        }

        // Create missing superiors along the way
        let mut prefix = String::new();
        for (ix, part) in name.split(DELIMITER).enumerate() {
            if part.is_empty() {
                return Err(Error::Storage("Bad mailbox name".to_owned()));
            }
            if ix > 0 {
                prefix.push(DELIMITER);
            }
            prefix.push_str(part);
            if !data.mailboxes.contains_key(&prefix) {
                data.new_mailbox(prefix.clone());
            }
        }

        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<(), Error> {
        let name = normalise_inbox(name);
        let mut data = self.touch();
        if "INBOX" == name {
            return Err(Error::BadOperationOnInbox);
        }
        data.mailbox(&name)?;
        if data.has_inferiors(&name) {
            return Err(Error::MailboxHasInferiors);
        }
        data.mailboxes.remove(&name);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        let (from, to) = (normalise_inbox(from), normalise_inbox(to));
        let mut data = self.touch();
        data.mailbox(&from)?;
        if "INBOX" == to {
            return Err(Error::BadOperationOnInbox);
        }
        if data.mailboxes.contains_key(&to) {
            return Err(Error::MailboxExists);
        }

        if "INBOX" == from {
            // Renaming INBOX moves its messages and leaves it empty
            data.new_mailbox(to.clone());
            let inbox = data.mailbox_mut("INBOX")?;
            let messages = std::mem::replace(&mut inbox.messages, vec![]);
            inbox.modseq += 1;
            let dest = data.mailbox_mut(&to)?;
            for message in messages {
                dest.add(&message.flags, message.internal_date, message.data);
            }
            return Ok(());
        }

        let prefix = format!("{}{}", from, DELIMITER);
        let moving: Vec<String> = data
            .mailboxes
            .keys()
            .filter(|k| **k == from || k.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moving {
            if let Some(mailbox) = data.mailboxes.remove(&old) {
                let new = format!("{}{}", to, &old[from.len()..]);
                data.mailboxes.insert(new, mailbox);
            }
        }

        Ok(())
    }

    fn subscribe(&mut self, name: &str) -> Result<(), Error> {
        self.touch().subscriptions.insert(normalise_inbox(name));
        Ok(())
    }

    fn unsubscribe(&mut self, name: &str) -> Result<(), Error> {
        self.touch().subscriptions.remove(&normalise_inbox(name));
        Ok(())
    }

    fn list(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<ListEntry>, Error> {
        let data = self.touch();
        let names = data.mailboxes.keys().cloned().collect::<Vec<_>>();
        Ok(self.entries(&data, names.into_iter(), reference, pattern))
    }

    fn lsub(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<ListEntry>, Error> {
        let data = self.touch();
        let names = data.subscriptions.iter().cloned().collect::<Vec<_>>();
        Ok(self.entries(&data, names.into_iter(), reference, pattern))
    }

    fn status(
        &mut self,
        name: &str,
        items: &[StatusItem],
    ) -> Result<Vec<(StatusItem, u32)>, Error> {
        let data = self.touch();
        let mailbox = data.mailbox(&normalise_inbox(name))?;
        let count = |f: &dyn Fn(&StoredMessage) -> bool| {
            mailbox.messages.iter().filter(|m| f(m)).count() as u32
        };

        Ok(items
            .iter()
            .map(|&item| {
                let value = match item {
                    StatusItem::Messages => mailbox.messages.len() as u32,
                    StatusItem::Recent => count(&|m: &StoredMessage| m.recent),
                    StatusItem::UidNext => mailbox.uid_next,
                    StatusItem::UidValidity => mailbox.uid_validity,
                    StatusItem::Unseen => {
                        count(&|m: &StoredMessage| {
                            !m.flags.contains(&Flag::Seen)
                        })
                    }
                };
                (item, value)
            })
            .collect())
    }

    fn append(
        &mut self,
        name: &str,
        flags: &[Flag],
        internal_date: Option<DateTime<FixedOffset>>,
        data: &[u8],
        events: &mut dyn MailEvents,
    ) -> Result<u32, Error> {
        let name = normalise_inbox(name);
        let _critical = events.enter_critical();
        let mut store = self.touch();
        store.mailbox(&name)?;
        write_barrier(&mut store, events)?;

        let mailbox = store.mailbox_mut(&name)?;
        let uid = mailbox.add(
            flags,
            internal_date.unwrap_or_else(|| {
                Utc::now().with_timezone(&FixedOffset::east(0))
            }),
            Arc::new(data.to_vec()),
        );
        events.append_uid(mailbox.uid_validity, SeqRange::just(uid));
        Ok(uid)
    }
}

/// A mailbox opened from a `MemoryStore`.
#[derive(Debug)]
pub struct MemoryStream {
    store: MemoryStore,
    name: String,
    read_only: bool,
    uid_validity: u32,
    uid_next: u32,
    /// The session's view: UIDs by sequence number.
    ///
    /// This includes messages expunged elsewhere until the session is in a
    /// position to announce the expunge.
    uids: Vec<u32>,
    recent: HashSet<u32>,
    synced_modseq: u64,
}

impl MemoryStream {
    /// Bring the session's view up to date, reporting what changed.
    ///
    /// Unless `expunge` is set, messages which have gone away keep their
    /// place in the view so that sequence numbers do not shift.
    fn sync(
        &mut self,
        data: &mut StoreData,
        events: &mut dyn MailEvents,
        expunge: bool,
    ) -> Result<(), Error> {
        let mailbox = data.mailboxes.get_mut(&self.name).ok_or_else(|| {
            Error::FatalStorage("Mailbox deleted out from under us".to_owned())
        })?;

        if expunge {
            let present: HashSet<u32> =
                mailbox.messages.iter().map(|m| m.uid).collect();
            for ix in (0..self.uids.len()).rev() {
                let uid = self.uids[ix];
                if !present.contains(&uid) {
                    self.uids.remove(ix);
                    self.recent.remove(&uid);
                    events.expunged(ix as u32 + 1);
                }
            }
        }

        for (ix, &uid) in self.uids.iter().enumerate() {
            if mailbox
                .message(uid)
                .map_or(false, |m| m.modseq > self.synced_modseq)
            {
                events.flags_changed(ix as u32 + 1);
            }
        }

        let last_known = self.uids.last().copied().unwrap_or(0);
        let before = self.uids.len();
        for message in &mut mailbox.messages {
            if message.uid <= last_known {
                continue;
            }
            self.uids.push(message.uid);
            if message.recent {
                self.recent.insert(message.uid);
                if !self.read_only {
                    message.recent = false;
                }
            }
        }
        if self.uids.len() != before {
            events.exists(self.uids.len() as u32);
        }

        self.uid_next = mailbox.uid_next;
        self.synced_modseq = mailbox.modseq;
        Ok(())
    }

    fn with_message<T>(
        &self,
        seqnum: u32,
        f: impl FnOnce(&StoredMessage) -> T,
    ) -> Result<T, Error> {
        let uid = self.uid(seqnum).ok_or(Error::NxMessage)?;
        let data = self.store.touch();
        let message = data
            .mailbox(&self.name)?
            .message(uid)
            .ok_or(Error::NxMessage)?;
        Ok(f(message))
    }

    fn candidates<'a>(&self, mailbox: &'a Mailbox) -> Vec<Candidate<'a>> {
        self.uids
            .iter()
            .enumerate()
            .filter_map(|(ix, &uid)| {
                mailbox.message(uid).map(|m| Candidate {
                    seqnum: ix as u32 + 1,
                    uid,
                    flags: &m.flags,
                    recent: self.recent.contains(&uid),
                    internal_date: m.internal_date,
                    data: &m.data,
                })
            })
            .collect()
    }

    fn matching<'a>(
        &self,
        mailbox: &'a Mailbox,
        key: &SearchKey,
    ) -> Vec<Candidate<'a>> {
        let now = Utc::now();
        let mut candidates = self.candidates(mailbox);
        candidates.retain(|c| search::matches(key, c, now));
        candidates
    }

    fn require_writable(&self) -> Result<(), Error> {
        if self.read_only {
            Err(Error::MailboxReadOnly)
        } else {
            Ok(())
        }
    }
}

impl MailStream for MemoryStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn exists(&self) -> u32 {
        self.uids.len() as u32
    }

    fn recent(&self) -> u32 {
        self.recent.len() as u32
    }

    fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    fn uid_next(&self) -> u32 {
        self.uid_next
    }

    fn first_unseen(&self) -> Option<u32> {
        let data = self.store.data();
        let mailbox = data.mailbox(&self.name).ok()?;
        self.uids
            .iter()
            .position(|&uid| {
                mailbox
                    .message(uid)
                    .map_or(false, |m| !m.flags.contains(&Flag::Seen))
            })
            .map(|ix| ix as u32 + 1)
    }

    fn defined_flags(&self) -> Vec<Flag> {
        let data = self.store.data();
        let mut flags = Flag::SYSTEM.to_vec();
        if let Ok(mailbox) = data.mailbox(&self.name) {
            flags.extend(mailbox.keywords.iter().cloned());
        }
        flags
    }

    fn permanent_flags(&self) -> (Vec<Flag>, bool) {
        if self.read_only {
            (vec![], false)
        } else {
            (self.defined_flags(), true)
        }
    }

    fn uid(&self, seqnum: u32) -> Option<u32> {
        seqnum
            .checked_sub(1)
            .and_then(|ix| self.uids.get(ix as usize))
            .copied()
    }

    fn seqnum(&self, uid: u32) -> Option<u32> {
        self.uids
            .binary_search(&uid)
            .ok()
            .map(|ix| ix as u32 + 1)
    }

    fn ping(&mut self, events: &mut dyn MailEvents) -> Result<(), Error> {
        let store = self.store.clone();
        let mut data = store.touch();
        self.sync(&mut data, events, true)
    }

    fn check(&mut self, events: &mut dyn MailEvents) -> Result<(), Error> {
        let _critical = events.enter_critical();
        let store = self.store.clone();
        let mut data = store.touch();
        write_barrier(&mut data, events)?;
        self.sync(&mut data, events, true)
    }

    fn expunge(
        &mut self,
        uids: Option<&SeqRange>,
        events: &mut dyn MailEvents,
    ) -> Result<(), Error> {
        self.require_writable()?;
        let _critical = events.enter_critical();
        let store = self.store.clone();
        let mut data = store.touch();
        write_barrier(&mut data, events)?;

        let view: HashSet<u32> = self.uids.iter().copied().collect();
        let mailbox = data.mailbox_mut(&self.name)?;
        let before = mailbox.messages.len();
        mailbox.messages.retain(|m| {
            !(view.contains(&m.uid)
                && m.flags.contains(&Flag::Deleted)
                && uids.map_or(true, |u| u.contains(m.uid)))
        });
        if mailbox.messages.len() != before {
            mailbox.modseq += 1;
        }

        self.sync(&mut data, events, true)
    }

    fn close(
        &mut self,
        expunge: bool,
        events: &mut dyn MailEvents,
    ) -> Result<(), Error> {
        if expunge && !self.read_only {
            self.expunge(None, events)
        } else {
            drop(self.store.touch());
            Ok(())
        }
    }

    fn flags(
        &mut self,
        seqnum: u32,
        events: &mut dyn MailEvents,
    ) -> Result<Vec<Flag>, Error> {
        let side_effect = {
            let mut data = self.store.data();
            if data.on_fetch.is_empty() {
                None
            } else {
                Some(data.on_fetch.remove(0))
            }
        };

        if let Some(side_effect) = side_effect {
            match side_effect {
                FetchSideEffect::Deliver(mailbox, message) => {
                    self.store.deliver(&mailbox, &[], &message)?;
                }
                FetchSideEffect::Expunge(mailbox, uid) => {
                    self.store.expunge_externally(&mailbox, uid)?;
                }
            }
            let store = self.store.clone();
            let mut data = store.data();
            self.sync(&mut data, events, false)?;
        }

        self.with_message(seqnum, |m| m.flags.clone())
    }

    fn is_recent(&self, seqnum: u32) -> bool {
        self.uid(seqnum)
            .map_or(false, |uid| self.recent.contains(&uid))
    }

    fn internal_date(
        &mut self,
        seqnum: u32,
    ) -> Result<DateTime<FixedOffset>, Error> {
        self.with_message(seqnum, |m| m.internal_date)
    }

    fn size(&mut self, seqnum: u32) -> Result<u32, Error> {
        self.with_message(seqnum, |m| m.data.len() as u32)
    }

    fn envelope(&mut self, seqnum: u32) -> Result<Envelope, Error> {
        self.with_message(seqnum, |m| {
            message::envelope(&message::Entity::parse(&m.data))
        })
    }

    fn body_structure(&mut self, seqnum: u32) -> Result<BodyStructure, Error> {
        self.with_message(seqnum, |m| {
            message::body_structure(&message::Entity::parse(&m.data))
        })
    }

    fn section(
        &mut self,
        seqnum: u32,
        section: &Section,
    ) -> Result<Vec<u8>, Error> {
        self.with_message(seqnum, |m| message::section(&m.data, section))
    }

    fn binary(&mut self, seqnum: u32, part: &[u32]) -> Result<Vec<u8>, Error> {
        self.with_message(seqnum, |m| message::binary(&m.data, part))?
    }

    fn store_flags(
        &mut self,
        seqnums: &SeqRange,
        op: FlagOp,
        flags: &[Flag],
        events: &mut dyn MailEvents,
    ) -> Result<(), Error> {
        self.require_writable()?;
        let _critical = events.enter_critical();
        let store = self.store.clone();
        let mut data = store.touch();
        write_barrier(&mut data, events)?;
        // Report what others did first, so our own changes are not echoed
        self.sync(&mut data, events, false)?;

        let targets: Vec<u32> = seqnums
            .items(self.exists())
            .filter_map(|seqnum| self.uid(seqnum))
            .collect();

        let mailbox = data.mailbox_mut(&self.name)?;
        mailbox.learn_keywords(flags);
        for uid in targets {
            let modseq = mailbox.modseq + 1;
            let message = match mailbox.message_mut(uid) {
                Some(message) => message,
                None => continue,
            };

            let before = message.flags.clone();
            match op {
                FlagOp::Replace => message.flags = flags.to_vec(),
                FlagOp::Add => {
                    for flag in flags {
                        if !message.flags.contains(flag) {
                            message.flags.push(flag.clone());
                        }
                    }
                }
                FlagOp::Remove => message.flags.retain(|f| !flags.contains(f)),
            }

            if before != message.flags {
                message.modseq = modseq;
                mailbox.modseq = modseq;
            }
        }

        self.synced_modseq = mailbox.modseq;
        Ok(())
    }

    fn search(
        &mut self,
        key: &SearchKey,
        _events: &mut dyn MailEvents,
    ) -> Result<Vec<u32>, Error> {
        let data = self.store.touch();
        let mailbox = data.mailbox(&self.name)?;
        Ok(self
            .matching(mailbox, key)
            .into_iter()
            .map(|c| c.seqnum)
            .collect())
    }

    fn sort(
        &mut self,
        program: &[SortKey],
        key: &SearchKey,
        _events: &mut dyn MailEvents,
    ) -> Result<Vec<u32>, Error> {
        let data = self.store.touch();
        let mailbox = data.mailbox(&self.name)?;
        let mut candidates = self.matching(mailbox, key);
        search::sort(&mut candidates, program);
        Ok(candidates.into_iter().map(|c| c.seqnum).collect())
    }

    fn thread(
        &mut self,
        algorithm: ThreadAlgorithm,
        key: &SearchKey,
        _events: &mut dyn MailEvents,
    ) -> Result<Vec<ThreadNode>, Error> {
        let data = self.store.touch();
        let mailbox = data.mailbox(&self.name)?;
        let candidates = self.matching(mailbox, key);
        Ok(search::thread(&candidates, algorithm))
    }

    fn copy(
        &mut self,
        seqnums: &SeqRange,
        dest: &str,
        events: &mut dyn MailEvents,
    ) -> Result<(), Error> {
        let dest = normalise_inbox(dest);
        let _critical = events.enter_critical();
        let store = self.store.clone();
        let mut data = store.touch();
        data.mailbox(&dest)?;
        write_barrier(&mut data, events)?;

        let source = data.mailbox(&self.name)?;
        let copies: Vec<StoredMessage> = seqnums
            .items(self.exists())
            .filter_map(|seqnum| self.uid(seqnum))
            .filter_map(|uid| source.message(uid).cloned())
            .collect();
        if copies.is_empty() {
            warn!("COPY found nothing to copy in {}", self.name);
        }

        let dest = data.mailbox_mut(&dest)?;
        let mut source_uids = SeqRange::new();
        let mut dest_uids = SeqRange::new();
        for message in copies {
            source_uids.append(message.uid);
            dest_uids.append(dest.add(
                &message.flags,
                message.internal_date,
                message.data,
            ));
        }

        if !source_uids.is_empty() {
            events.copy_uid(dest.uid_validity, source_uids, dest_uids);
        }
        Ok(())
    }
}
