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

//! Receives callbacks from the mail store and holds them until the session
//! is in a position to report them.

use std::collections::BTreeSet;
use std::time::Duration;

use log::{error, info, warn};

use super::response::Cond;
use crate::store::{DiskErrorAction, LogLevel, MailEvents, SeqRange};
use crate::support::error::Error;
use crate::support::interrupt::{CriticalGuard, Interrupts};
use crate::support::log_prefix::LogPrefix;

const FIRST_RETRY: Duration = Duration::from_millis(50);
const MAX_RETRY: Duration = Duration::from_secs(30);

/// Changes to the selected mailbox which have not been reported yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingChanges {
    /// Expunged sequence numbers, in the order the store reported them.
    pub expunged: Vec<u32>,
    /// The most recent message count the store reported.
    pub exists: Option<u32>,
    /// Messages whose flags changed elsewhere.
    pub dirty: BTreeSet<u32>,
}

/// The session's implementation of `MailEvents`.
///
/// Nothing is written from inside a callback. Everything is buffered here
/// and written out by the command processor between response lines, which
/// keeps unsolicited data from landing inside a parenthesised list.
pub struct EventBridge {
    log_prefix: LogPrefix,
    interrupts: Interrupts,
    suppress_empty_mailbox_warning: bool,

    quell_depth: u32,
    quell_begins: u64,
    quell_ends: u64,

    changes: PendingChanges,
    notices: Vec<(Cond, String)>,
    last_error: Option<String>,
    fatal: Option<String>,
    copy_uid: Option<(u32, SeqRange, SeqRange)>,
    append_uid: Option<(u32, SeqRange)>,
    retry_delay: Duration,
}

impl EventBridge {
    pub fn new(
        log_prefix: LogPrefix,
        interrupts: Interrupts,
        suppress_empty_mailbox_warning: bool,
    ) -> Self {
        EventBridge {
            log_prefix,
            interrupts,
            suppress_empty_mailbox_warning,
            quell_depth: 0,
            quell_begins: 0,
            quell_ends: 0,
            changes: PendingChanges::default(),
            notices: vec![],
            last_error: None,
            fatal: None,
            copy_uid: None,
            append_uid: None,
            retry_delay: FIRST_RETRY,
        }
    }

    /// Reset the per-command state at the top of the command loop.
    pub fn start_command(&mut self) {
        self.last_error = None;
        self.copy_uid = None;
        self.append_uid = None;
        self.retry_delay = FIRST_RETRY;
    }

    /// Start composing a structured response.
    pub fn quell_begin(&mut self) {
        self.quell_depth += 1;
        self.quell_begins += 1;
    }

    pub fn quell_end(&mut self) {
        debug_assert!(self.quell_depth > 0);
        self.quell_depth = self.quell_depth.saturating_sub(1);
        self.quell_ends += 1;
    }

    pub fn is_quelled(&self) -> bool {
        self.quell_depth > 0
    }

    /// The total number of `quell_begin()` and `quell_end()` calls.
    pub fn quell_counts(&self) -> (u64, u64) {
        (self.quell_begins, self.quell_ends)
    }

    /// Take the pending mailbox changes.
    ///
    /// Returns nothing while quelled. If `allow_expunge` is false and there
    /// are pending expunges, everything stays pending, since the store has
    /// already renumbered messages the client has not seen expunged.
    pub fn take_changes(&mut self, allow_expunge: bool) -> PendingChanges {
        if self.is_quelled()
            || (!allow_expunge && !self.changes.expunged.is_empty())
        {
            PendingChanges::default()
        } else {
            std::mem::take(&mut self.changes)
        }
    }

    pub fn has_pending_expunge(&self) -> bool {
        !self.changes.expunged.is_empty()
    }

    /// Forget everything about the selected mailbox.
    pub fn clear_changes(&mut self) {
        self.changes = PendingChanges::default();
    }

    pub fn take_notices(&mut self) -> Vec<(Cond, String)> {
        if self.is_quelled() {
            vec![]
        } else {
            std::mem::take(&mut self.notices)
        }
    }

    pub fn take_last_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// If the store reported a condition the session cannot survive, the
    /// text for the `BYE`.
    pub fn fatal(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    /// The first fatal condition is the one the client is told about.
    fn set_fatal(&mut self, why: String) {
        if self.fatal.is_none() {
            self.fatal = Some(why);
        }
    }

    pub fn take_copy_uid(&mut self) -> Option<(u32, SeqRange, SeqRange)> {
        self.copy_uid.take()
    }

    pub fn take_append_uid(&mut self) -> Option<(u32, SeqRange)> {
        self.append_uid.take()
    }
}

impl MailEvents for EventBridge {
    fn exists(&mut self, count: u32) {
        self.changes.exists = Some(count);
    }

    fn expunged(&mut self, seqnum: u32) {
        self.changes.expunged.push(seqnum);
        // Later dirty messages slide down by one
        self.changes.dirty = self
            .changes
            .dirty
            .iter()
            .filter(|&&s| s != seqnum)
            .map(|&s| if s > seqnum { s - 1 } else { s })
            .collect();
    }

    fn flags_changed(&mut self, seqnum: u32) {
        self.changes.dirty.insert(seqnum);
    }

    fn log(&mut self, level: LogLevel, text: &str) {
        match level {
            LogLevel::Info => {
                info!("{} {}", self.log_prefix, text);
                self.notices.push((Cond::Ok, text.to_owned()));
            }
            LogLevel::Warning => {
                warn!("{} {}", self.log_prefix, text);
                self.notices.push((Cond::No, text.to_owned()));
            }
            LogLevel::Error => {
                error!("{} {}", self.log_prefix, text);
                self.last_error = Some(text.to_owned());
            }
            LogLevel::Fatal => {
                error!("{} Fatal: {}", self.log_prefix, text);
                self.set_fatal(text.to_owned());
            }
        }
    }

    fn mailbox_empty(&mut self) {
        if !self.suppress_empty_mailbox_warning {
            self.notices.push((Cond::Ok, "Mailbox is empty".to_owned()));
        }
    }

    fn disk_error(&mut self, err: &Error, serious: bool) -> DiskErrorAction {
        if serious {
            let delay = self.retry_delay;
            warn!(
                "{} Disk error ({}); retrying in {:?} to avoid corruption",
                self.log_prefix, err, delay
            );
            self.retry_delay = (delay * 2).min(MAX_RETRY);
            DiskErrorAction::Retry(delay)
        } else {
            error!("{} Disk error, giving up: {}", self.log_prefix, err);
            self.set_fatal(format!("Disk error: {}", err));
            DiskErrorAction::Abort
        }
    }

    fn copy_uid(
        &mut self,
        uid_validity: u32,
        source: SeqRange,
        dest: SeqRange,
    ) {
        self.copy_uid = Some((uid_validity, source, dest));
    }

    fn append_uid(&mut self, uid_validity: u32, dest: SeqRange) {
        self.append_uid = Some((uid_validity, dest));
    }

    fn enter_critical(&mut self) -> CriticalGuard {
        self.interrupts.critical()
    }
}
