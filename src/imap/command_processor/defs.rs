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
use std::sync::Arc;

use bitflags::bitflags;
use log::error;

use crate::imap::events::EventBridge;
use crate::imap::lex::LexWriter;
pub(super) use crate::imap::response::*;
pub(super) use crate::imap::syntax::{self as s, ArgError, Args};
use crate::store::{
    LogLevel, MailEvents, MailStore, MailStream, StoreProvider,
};
use crate::support::error::Error;
use crate::support::interrupt::Interrupts;
use crate::support::log_prefix::LogPrefix;
use crate::support::passwd::{Authenticator, Identity};
use crate::support::system_config::SystemConfig;

pub(super) static CAPABILITIES: &[&str] = &[
    "IMAP4rev1",
    "LITERAL+",
    "SASL-IR",
    "IDLE",
    "NAMESPACE",
    "UIDPLUS",
    "UNSELECT",
    "CHILDREN",
    "BINARY",
    "SORT",
    "THREAD=ORDEREDSUBJECT",
    "THREAD=REFERENCES",
];

pub(super) static TAGLINE: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " ",
    env!("CARGO_PKG_VERSION_MAJOR"),
    ".",
    env!("CARGO_PKG_VERSION_MINOR"),
    ".",
    env!("CARGO_PKG_VERSION_PATCH"),
    " IMAP4rev1 server ready"
);

pub(super) static BYE_TEXT: &str =
    "Kestrel IMAP server terminating connection";

/// The connection state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    NotAuthenticated,
    Authenticated,
    Selected,
    LoggingOut,
}

bitflags! {
    /// A set of `State`s in which a command is legal.
    pub(super) struct States: u8 {
        const NOT_AUTHENTICATED = 1 << 0;
        const AUTHENTICATED = 1 << 1;
        const SELECTED = 1 << 2;

        const ANY = Self::NOT_AUTHENTICATED.bits
            | Self::AUTHENTICATED.bits
            | Self::SELECTED.bits;
        const LOGGED_IN = Self::AUTHENTICATED.bits | Self::SELECTED.bits;
    }
}

impl State {
    pub(super) fn mask(self) -> States {
        match self {
            State::NotAuthenticated => States::NOT_AUTHENTICATED,
            State::Authenticated => States::AUTHENTICATED,
            State::Selected => States::SELECTED,
            State::LoggingOut => States::empty(),
        }
    }
}

/// The counters last sent to the client for the selected mailbox.
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct Reported {
    pub(super) exists: u32,
    pub(super) recent: u32,
}

/// Executes commands against the mail store on behalf of one client.
///
/// All output other than continuation prompts is produced here, into an
/// in-memory buffer which the server sends once the command completes.
pub struct CommandProcessor {
    pub(super) log_prefix: LogPrefix,
    pub(super) config: Arc<SystemConfig>,
    pub(super) provider: Arc<dyn StoreProvider>,
    pub(super) authenticator: Arc<dyn Authenticator>,

    pub(super) state: State,
    pub(super) identity: Option<Identity>,
    pub(super) store: Option<Box<dyn MailStore>>,
    pub(super) selected: Option<Box<dyn MailStream>>,
    pub(super) events: EventBridge,
    pub(super) reported: Reported,

    /// Whether the current command was prefixed with `UID`.
    pub(super) uid_mode: bool,
}

/// Untagged responses accumulated while executing a command.
///
/// Writing to memory cannot fail, so callers don't need to handle the
/// `io::Result`s of the serialisers.
pub(super) struct Output {
    pub(super) lex: LexWriter<Vec<u8>>,
}

impl Output {
    pub(super) fn new() -> Self {
        Output {
            lex: LexWriter::new(Vec::new()),
        }
    }

    /// Write one untagged response, produced by `f`.
    pub(super) fn untagged(
        &mut self,
        f: impl FnOnce(&mut LexWriter<Vec<u8>>) -> io::Result<()>,
    ) {
        let _ = self.lex.verbatim("* ");
        let _ = f(&mut self.lex);
        let _ = self.lex.verbatim("\r\n");
    }

    pub(super) fn text(&mut self, text: &str) {
        self.untagged(|w| w.verbatim(text));
    }

    pub(super) fn cond(
        &mut self,
        cond: Cond,
        code: Option<RespCode>,
        text: &str,
    ) {
        self.untagged(|w| {
            w.verbatim(&cond.to_string())?;
            w.verbatim(" ")?;
            if let Some(code) = code {
                w.verbatim(&format!("[{}] ", code))?;
            }
            w.verbatim(text)
        });
    }

    pub(super) fn append(&mut self, raw: &[u8]) {
        let _ = self.lex.verbatim_bytes(raw);
    }

    pub(super) fn into_inner(self) -> Vec<u8> {
        self.lex.into_inner()
    }
}

impl CommandProcessor {
    pub fn new(
        log_prefix: LogPrefix,
        config: Arc<SystemConfig>,
        provider: Arc<dyn StoreProvider>,
        authenticator: Arc<dyn Authenticator>,
        interrupts: Interrupts,
    ) -> Self {
        let events = EventBridge::new(
            log_prefix.clone(),
            interrupts,
            config.policy.suppress_empty_mailbox_warning,
        );

        CommandProcessor {
            log_prefix,
            config,
            provider,
            authenticator,

            state: State::NotAuthenticated,
            identity: None,
            store: None,
            selected: None,
            events,
            reported: Reported::default(),

            uid_mode: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn logged_out(&self) -> bool {
        State::LoggingOut == self.state
    }

    /// If the store reported an unrecoverable condition, the reason.
    pub fn fatal(&self) -> Option<&str> {
        self.events.fatal()
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    /// How many quell begin and end calls have been made.
    pub fn quell_counts(&self) -> (u64, u64) {
        self.events.quell_counts()
    }

    /// The capabilities to advertise in the current state.
    pub fn capability_string(&self) -> String {
        let mut caps = CAPABILITIES.join(" ");
        if State::NotAuthenticated == self.state {
            let security = &self.config.security;
            if security.starttls_available {
                caps.push_str(" STARTTLS");
            }
            if security.disable_plaintext {
                caps.push_str(" LOGINDISABLED");
            } else {
                caps.push_str(" AUTH=PLAIN AUTH=LOGIN");
            }
            if security.allow_anonymous {
                caps.push_str(" AUTH=ANONYMOUS");
            }
        }
        caps
    }

    /// The greeting line, including line ending.
    pub fn greet(&self) -> Vec<u8> {
        format!(
            "* OK [{}] {}\r\n",
            RespCode::Capability(self.capability_string()),
            TAGLINE
        )
        .into_bytes()
    }

    /// What `*` stands for in a sequence set of the current command.
    pub(super) fn max_id(&self) -> u32 {
        self.selected.as_ref().map_or(0, |s| {
            if self.uid_mode {
                s.uid(s.exists())
                    .unwrap_or_else(|| s.uid_next().saturating_sub(1))
            } else {
                s.exists()
            }
        })
    }
}

/// Turn an argument error into the response for `command`.
pub(super) fn arg_error(e: ArgError) -> Completion {
    match e {
        ArgError::Missing => Completion::bad(Template::MissingArgument),
        ArgError::Excess => Completion::bad(Template::ExcessArgument),
        ArgError::Invalid(text) => {
            Completion::bad(Template::Text(text)).with_code(RespCode::Parse)
        }
    }
}

/// Turn a storage error into a tagged `NO`.
///
/// Text the store logged at error level during the command takes the place
/// of the error's own description.
pub(super) fn error_completion(
    log_prefix: &LogPrefix,
    events: &mut EventBridge,
    e: Error,
) -> Completion {
    let text = events.take_last_error().unwrap_or_else(|| e.to_string());
    match e {
        Error::BadCharset => Completion::no_code(RespCode::BadCharset, text),
        Error::UnknownCte => Completion::no_code(RespCode::UnknownCte, text),
        Error::FatalStorage(ref why) => {
            events.log(LogLevel::Fatal, why);
            Completion::no(text)
        }
        Error::Io(ref io) => {
            error!("{} I/O error in storage: {}", log_prefix, io);
            Completion::no(text)
        }
        _ => Completion::no(text),
    }
}
