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

use log::{error, info};

use super::defs::*;
use crate::imap::request_reader::RawCommand;
use crate::imap::sasl::Negotiation;
use crate::store::{LogLevel, MailEvents};
use crate::support::error::Error;

/// Every command the processor knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CommandName {
    Capability,
    Noop,
    Logout,
    StartTls,
    Authenticate,
    Login,
    Select,
    Examine,
    Create,
    Delete,
    Rename,
    Subscribe,
    Unsubscribe,
    List,
    Lsub,
    Status,
    Append,
    Namespace,
    Idle,
    Check,
    Close,
    Unselect,
    Expunge,
    Search,
    Sort,
    Thread,
    Fetch,
    Store,
    Copy,
}

impl CommandName {
    pub(super) const ALL: &'static [CommandName] = &[
        CommandName::Capability,
        CommandName::Noop,
        CommandName::Logout,
        CommandName::StartTls,
        CommandName::Authenticate,
        CommandName::Login,
        CommandName::Select,
        CommandName::Examine,
        CommandName::Create,
        CommandName::Delete,
        CommandName::Rename,
        CommandName::Subscribe,
        CommandName::Unsubscribe,
        CommandName::List,
        CommandName::Lsub,
        CommandName::Status,
        CommandName::Append,
        CommandName::Namespace,
        CommandName::Idle,
        CommandName::Check,
        CommandName::Close,
        CommandName::Unselect,
        CommandName::Expunge,
        CommandName::Search,
        CommandName::Sort,
        CommandName::Thread,
        CommandName::Fetch,
        CommandName::Store,
        CommandName::Copy,
    ];

    pub(super) fn name(self) -> &'static str {
        match self {
            CommandName::Capability => "CAPABILITY",
            CommandName::Noop => "NOOP",
            CommandName::Logout => "LOGOUT",
            CommandName::StartTls => "STARTTLS",
            CommandName::Authenticate => "AUTHENTICATE",
            CommandName::Login => "LOGIN",
            CommandName::Select => "SELECT",
            CommandName::Examine => "EXAMINE",
            CommandName::Create => "CREATE",
            CommandName::Delete => "DELETE",
            CommandName::Rename => "RENAME",
            CommandName::Subscribe => "SUBSCRIBE",
            CommandName::Unsubscribe => "UNSUBSCRIBE",
            CommandName::List => "LIST",
            CommandName::Lsub => "LSUB",
            CommandName::Status => "STATUS",
            CommandName::Append => "APPEND",
            CommandName::Namespace => "NAMESPACE",
            CommandName::Idle => "IDLE",
            CommandName::Check => "CHECK",
            CommandName::Close => "CLOSE",
            CommandName::Unselect => "UNSELECT",
            CommandName::Expunge => "EXPUNGE",
            CommandName::Search => "SEARCH",
            CommandName::Sort => "SORT",
            CommandName::Thread => "THREAD",
            CommandName::Fetch => "FETCH",
            CommandName::Store => "STORE",
            CommandName::Copy => "COPY",
        }
    }

    pub(super) fn from_name(name: &str) -> Option<Self> {
        CommandName::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// The states in which the command may be used.
    pub(super) fn legal_in(self) -> States {
        match self {
            CommandName::Capability
            | CommandName::Noop
            | CommandName::Logout => States::ANY,

            CommandName::StartTls
            | CommandName::Authenticate
            | CommandName::Login => States::NOT_AUTHENTICATED,

            CommandName::Select
            | CommandName::Examine
            | CommandName::Create
            | CommandName::Delete
            | CommandName::Rename
            | CommandName::Subscribe
            | CommandName::Unsubscribe
            | CommandName::List
            | CommandName::Lsub
            | CommandName::Status
            | CommandName::Append
            | CommandName::Namespace => States::LOGGED_IN,

            CommandName::Idle
            | CommandName::Check
            | CommandName::Close
            | CommandName::Unselect
            | CommandName::Expunge
            | CommandName::Search
            | CommandName::Sort
            | CommandName::Thread
            | CommandName::Fetch
            | CommandName::Store
            | CommandName::Copy => States::SELECTED,
        }
    }

    /// Whether the command has a `UID` form.
    pub(super) fn allows_uid(self) -> bool {
        match self {
            CommandName::Copy
            | CommandName::Fetch
            | CommandName::Store
            | CommandName::Search
            | CommandName::Sort
            | CommandName::Thread
            | CommandName::Expunge => true,
            _ => false,
        }
    }

    /// Whether EXPUNGE responses may be sent after the command.
    ///
    /// RFC 3501 forbids this after FETCH, STORE and SEARCH since the client
    /// may be relying on sequence numbers staying put.
    fn allows_expunge(self, uid_mode: bool) -> bool {
        match self {
            CommandName::Fetch | CommandName::Store | CommandName::Search => {
                uid_mode
            }
            _ => true,
        }
    }
}

/// Further interaction with the client which a command needs before it can
/// complete.
pub enum Interaction {
    None,
    /// The client has entered IDLE. The server sends the continuation line
    /// and calls `idle_poll()` and `idle_done()`.
    Idle { tag: String },
    /// An AUTHENTICATE exchange has started. The server drives it and
    /// finishes with `authenticate_finish()`.
    Authenticate {
        tag: String,
        negotiation: Negotiation,
        initial_response: Option<Vec<u8>>,
    },
}

impl CommandProcessor {
    /// Execute one command, writing every response it produces to `out`.
    pub fn handle_command(
        &mut self,
        raw: &RawCommand,
        out: &mut Vec<u8>,
    ) -> Interaction {
        let mut output = Output::new();
        self.events.start_command();
        self.uid_mode = false;

        let (tag, name, rest) = match s::command_header(&raw.text) {
            Some(header) => header,
            None => {
                match s::command_tag(&raw.text) {
                    Some(tag) => {
                        let _ = Completion::bad(Template::Text(
                            "Missing or invalid command name".to_owned(),
                        ))
                        .write_to(&mut output.lex, tag, "");
                    }
                    None => output.cond(Cond::Bad, None, "Missing tag"),
                }
                out.extend_from_slice(&output.into_inner());
                return Interaction::None;
            }
        };

        let mut args = Args::new(rest);
        let mut display = name.to_ascii_uppercase();
        if "UID" == display {
            self.uid_mode = true;
            match args.arg(s::atom) {
                Ok(sub) => {
                    display = format!("UID {}", sub.to_ascii_uppercase())
                }
                Err(_) => {
                    self.complete(
                        Err(Completion::bad(Template::Unrecognised)),
                        tag,
                        &display,
                        None,
                        &mut output,
                    );
                    out.extend_from_slice(&output.into_inner());
                    return Interaction::None;
                }
            }
        }

        let base_name = display.trim_start_matches("UID ");
        let command = CommandName::from_name(base_name).filter(|c| {
            c.legal_in().contains(self.state.mask())
                && (!self.uid_mode || c.allows_uid())
        });
        let command = match command {
            Some(c) => c,
            None => {
                self.complete(
                    Err(Completion::bad(Template::Unrecognised)),
                    tag,
                    &display,
                    None,
                    &mut output,
                );
                out.extend_from_slice(&output.into_inner());
                return Interaction::None;
            }
        };

        let mut interaction = Interaction::None;
        let res = match command {
            CommandName::Capability => self.cmd_capability(args, &mut output),
            CommandName::Noop => self.cmd_noop(args),
            CommandName::Logout => self.cmd_logout(args, &mut output),
            CommandName::StartTls => self.cmd_start_tls(args),
            CommandName::Namespace => self.cmd_namespace(args, &mut output),
            CommandName::Check => self.cmd_check(args),
            CommandName::Idle => args.end().map_err(arg_error).map(|_| {
                interaction = Interaction::Idle {
                    tag: tag.to_owned(),
                };
                Completion::ok()
            }),
            CommandName::Authenticate => {
                self.cmd_authenticate(args).map(|(negotiation, ir)| {
                    interaction = Interaction::Authenticate {
                        tag: tag.to_owned(),
                        negotiation,
                        initial_response: ir,
                    };
                    Completion::ok()
                })
            }
            CommandName::Login => self.cmd_login(args, &mut output),

            CommandName::Select => self.cmd_select(args, false, &mut output),
            CommandName::Examine => self.cmd_select(args, true, &mut output),
            CommandName::Create => self.cmd_create(args),
            CommandName::Delete => self.cmd_delete(args),
            CommandName::Rename => self.cmd_rename(args),
            CommandName::Subscribe => self.cmd_subscribe(args),
            CommandName::Unsubscribe => self.cmd_unsubscribe(args),
            CommandName::List => self.cmd_list(args, false, &mut output),
            CommandName::Lsub => self.cmd_list(args, true, &mut output),
            CommandName::Status => self.cmd_status(args, &mut output),
            CommandName::Append => self.cmd_append(args),

            CommandName::Close => self.cmd_close(args),
            CommandName::Unselect => self.cmd_unselect(args),
            CommandName::Expunge => self.cmd_expunge(args, &mut output),
            CommandName::Search => self.cmd_search(args, &mut output),
            CommandName::Sort => self.cmd_sort(args, &mut output),
            CommandName::Thread => self.cmd_thread(args, &mut output),
            CommandName::Fetch => self.cmd_fetch(args, &mut output),
            CommandName::Store => self.cmd_store(args, &mut output),
            CommandName::Copy => self.cmd_copy(args),
        };

        match interaction {
            Interaction::None => {
                let allow_expunge = command.allows_expunge(self.uid_mode);
                self.complete(
                    res,
                    tag,
                    &display,
                    Some(allow_expunge),
                    &mut output,
                );
            }
            // The tagged response comes at the end of the interaction
            _ => (),
        }

        out.extend_from_slice(&output.into_inner());
        interaction
    }

    /// Send the unsolicited responses owed after a command, followed by its
    /// tagged response.
    ///
    /// `poll` is `None` if the command never reached a handler, and
    /// otherwise whether the poll may report expunges.
    pub(super) fn complete(
        &mut self,
        res: CmdResult,
        tag: &str,
        command: &str,
        poll: Option<bool>,
        output: &mut Output,
    ) {
        let completion = match res {
            Ok(completion) => {
                if let Some(allow_expunge) = poll {
                    self.poll(allow_expunge, output);
                }
                completion
            }
            Err(completion) => {
                if poll.is_some() {
                    self.flush_notices(output);
                }
                completion
            }
        };

        let _ = completion.write_to(&mut output.lex, tag, command);

        if let Some(why) = self.events.fatal().map(str::to_owned) {
            output.cond(Cond::Bye, None, &why);
            self.close_selected(false);
            self.state = State::LoggingOut;
        }
    }

    fn cmd_capability(
        &mut self,
        args: Args<'_>,
        out: &mut Output,
    ) -> CmdResult {
        args.end().map_err(arg_error)?;
        let caps = self.capability_string();
        out.text(&format!("CAPABILITY {}", caps));
        Ok(Completion::ok())
    }

    fn cmd_noop(&mut self, args: Args<'_>) -> CmdResult {
        // The poll after every command does all the work
        args.end().map_err(arg_error)?;
        Ok(Completion::ok())
    }

    fn cmd_logout(&mut self, args: Args<'_>, out: &mut Output) -> CmdResult {
        args.end().map_err(arg_error)?;
        self.close_selected(false);
        self.store = None;
        self.state = State::LoggingOut;
        info!("{} Logged out", self.log_prefix);

        // RFC 3501 wants the BYE before the tagged OK
        out.cond(Cond::Bye, None, BYE_TEXT);
        Ok(Completion::ok())
    }

    fn cmd_start_tls(&mut self, args: Args<'_>) -> CmdResult {
        args.end().map_err(arg_error)?;
        if self.config.security.starttls_available {
            Err(Completion::no("TLS is negotiated by the transport layer"))
        } else {
            Err(Completion::bad(Template::Text(
                "STARTTLS not available".to_owned(),
            )))
        }
    }

    fn cmd_namespace(
        &mut self,
        args: Args<'_>,
        out: &mut Output,
    ) -> CmdResult {
        args.end().map_err(arg_error)?;
        let delimiter = store!(self)?.hierarchy_delimiter();
        out.untagged(|w| {
            w.verbatim("NAMESPACE ((\"\" ")?;
            w.string(delimiter.to_string().as_bytes())?;
            w.verbatim(")) NIL NIL")
        });
        Ok(Completion::ok())
    }

    fn cmd_check(&mut self, args: Args<'_>) -> CmdResult {
        args.end().map_err(arg_error)?;
        selected!(self)?
            .check(&mut self.events)
            .map_err(map_error!(self))?;
        Ok(Completion::ok())
    }

    /// Check the selected mailbox for changes and report them.
    pub(super) fn poll(&mut self, allow_expunge: bool, out: &mut Output) {
        if allow_expunge {
            if let Some(selected) = self.selected.as_mut() {
                if let Err(e) = selected.ping(&mut self.events) {
                    error!("{} Poll failed: {}", self.log_prefix, e);
                    if let Error::FatalStorage(why) = e {
                        self.events.log(LogLevel::Fatal, &why);
                    }
                }
            }
        }

        self.flush_changes(allow_expunge, out);
    }

    pub(super) fn flush_notices(&mut self, out: &mut Output) {
        for (cond, text) in self.events.take_notices() {
            out.cond(cond, None, &text);
        }
    }

    /// Report whatever the event bridge has collected.
    ///
    /// Nothing about the mailbox is reported while the bridge is quelled or
    /// while expunges are being held back.
    pub(super) fn flush_changes(
        &mut self,
        allow_expunge: bool,
        out: &mut Output,
    ) {
        self.flush_notices(out);

        let selected = match self.selected.as_mut() {
            Some(selected) => selected,
            None => {
                self.events.clear_changes();
                return;
            }
        };

        if self.events.is_quelled() {
            return;
        }

        let changes = self.events.take_changes(allow_expunge);
        for seqnum in changes.expunged {
            out.text(&format!("{} EXPUNGE", seqnum));
            self.reported.exists = self.reported.exists.saturating_sub(1);
        }

        if self.events.has_pending_expunge() {
            return;
        }

        let exists = changes.exists.unwrap_or_else(|| selected.exists());
        if exists != self.reported.exists {
            out.text(&format!("{} EXISTS", exists));
            self.reported.exists = exists;
        }
        let recent = selected.recent();
        if recent != self.reported.recent {
            out.text(&format!("{} RECENT", recent));
            self.reported.recent = recent;
        }

        for seqnum in changes.dirty {
            if seqnum > exists {
                continue;
            }

            match selected.flags(seqnum, &mut self.events) {
                Ok(flags) => {
                    let uid = selected.uid(seqnum).unwrap_or(0);
                    let recent = selected.is_recent(seqnum);
                    let uid_mode = self.uid_mode;
                    out.untagged(|w| {
                        w.verbatim(&format!("{} FETCH (", seqnum))?;
                        if uid_mode {
                            w.verbatim(&format!("UID {} ", uid))?;
                        }
                        w.verbatim("FLAGS ")?;
                        write_flags(w, &flags, recent)?;
                        w.verbatim(")")
                    });
                }
                Err(e) => error!(
                    "{} Failed to fetch changed flags of {}: {}",
                    self.log_prefix, seqnum, e
                ),
            }
        }
    }

    /// Close the selected mailbox, if any, and return to the authenticated
    /// state.
    ///
    /// Errors are logged and otherwise ignored, since the mailbox is gone
    /// from the session's perspective either way.
    pub(super) fn close_selected(&mut self, expunge: bool) {
        if let Some(mut selected) = self.selected.take() {
            if let Err(e) = selected.close(expunge, &mut self.events) {
                error!(
                    "{} Error closing {}: {}",
                    self.log_prefix,
                    selected.name(),
                    e
                );
            }
            self.state = State::Authenticated;
        }
        self.events.clear_changes();
        self.reported = Reported::default();
    }

    /// Close everything down without sending anything, as when the
    /// connection is lost or the session is interrupted.
    pub fn shutdown(&mut self) {
        self.close_selected(false);
        self.store = None;
        self.state = State::LoggingOut;
    }

    /// One round of IDLE: check the mailbox and return what changed.
    pub fn idle_poll(&mut self) -> Vec<u8> {
        let mut output = Output::new();
        self.poll(true, &mut output);
        if let Some(why) = self.events.fatal().map(str::to_owned) {
            output.cond(Cond::Bye, None, &why);
            self.close_selected(false);
            self.state = State::LoggingOut;
        }
        output.into_inner()
    }

    /// End IDLE because the client sent `line`.
    pub fn idle_done(&mut self, tag: &str, line: &[u8]) -> Vec<u8> {
        let mut output = Output::new();
        let res = if line.eq_ignore_ascii_case(b"DONE") {
            Ok(Completion::ok())
        } else {
            Err(Completion::bad(Template::Text(
                "IDLE terminated by something other than DONE".to_owned(),
            )))
        };
        self.complete(res, tag, "IDLE", Some(true), &mut output);
        output.into_inner()
    }
}
