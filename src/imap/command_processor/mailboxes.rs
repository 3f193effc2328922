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

use log::info;
use nom::{
    bytes::complete::{tag, tag_no_case as kw},
    branch::alt,
    combinator::map,
    multi::separated_nonempty_list,
    sequence::delimited,
    IResult,
};

use super::defs::*;
use crate::store::{OpenOptions, StatusItem};
use crate::support::error::Error;

impl CommandProcessor {
    pub(super) fn cmd_select(
        &mut self,
        mut args: Args<'_>,
        read_only: bool,
        out: &mut Output,
    ) -> CmdResult {
        let name = args.mailbox().map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        // Any previous mailbox is closed even if the new one can't be opened
        self.close_selected(false);

        let options = OpenOptions {
            read_only,
            anonymous: self.identity.as_ref().map_or(false, |i| i.anonymous),
        };
        let stream = store!(self)?
            .open(&name, options, &mut self.events)
            .map_err(map_error!(self))?;

        info!("{} Selected {}", self.log_prefix, stream.name());

        let exists = stream.exists();
        let recent = stream.recent();
        out.text(&format!("{} EXISTS", exists));
        out.text(&format!("{} RECENT", recent));
        let defined = stream.defined_flags();
        out.untagged(|w| {
            w.verbatim("FLAGS ")?;
            write_flags(w, &defined, false)
        });
        if let Some(unseen) = stream.first_unseen() {
            out.cond(
                Cond::Ok,
                Some(RespCode::Unseen(unseen)),
                "First unseen message",
            );
        }
        out.cond(
            Cond::Ok,
            Some(RespCode::UidValidity(stream.uid_validity())),
            "UIDs valid",
        );
        out.cond(
            Cond::Ok,
            Some(RespCode::UidNext(stream.uid_next())),
            "Predicted next UID",
        );
        let (permanent, keywords) = if stream.read_only() {
            (vec![], false)
        } else {
            stream.permanent_flags()
        };
        out.cond(
            Cond::Ok,
            Some(RespCode::PermanentFlags(permanent, keywords)),
            "Flags permitted",
        );

        let code = if stream.read_only() {
            RespCode::ReadOnly
        } else {
            RespCode::ReadWrite
        };

        self.reported = Reported { exists, recent };
        self.selected = Some(stream);
        self.state = State::Selected;
        Ok(Completion::ok_code(code))
    }

    pub(super) fn cmd_create(&mut self, mut args: Args<'_>) -> CmdResult {
        let name = args.mailbox().map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        store!(self)?.create(&name).map_err(map_error!(self))?;
        Ok(Completion::ok())
    }

    pub(super) fn cmd_delete(&mut self, mut args: Args<'_>) -> CmdResult {
        let name = args.mailbox().map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        if self
            .selected
            .as_ref()
            .map_or(false, |s| s.name() == name)
        {
            return Err(Completion::no("Mailbox is currently selected"));
        }

        store!(self)?.delete(&name).map_err(map_error!(self))?;
        Ok(Completion::ok())
    }

    pub(super) fn cmd_rename(&mut self, mut args: Args<'_>) -> CmdResult {
        let from = args.mailbox().map_err(arg_error)?;
        let to = args.mailbox().map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        store!(self)?.rename(&from, &to).map_err(map_error!(self))?;
        Ok(Completion::ok())
    }

    pub(super) fn cmd_subscribe(&mut self, mut args: Args<'_>) -> CmdResult {
        let name = args.mailbox().map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        store!(self)?.subscribe(&name).map_err(map_error!(self))?;
        Ok(Completion::ok())
    }

    pub(super) fn cmd_unsubscribe(
        &mut self,
        mut args: Args<'_>,
    ) -> CmdResult {
        let name = args.mailbox().map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        store!(self)?.unsubscribe(&name).map_err(map_error!(self))?;
        Ok(Completion::ok())
    }

    /// LIST, or LSUB if `subscribed`.
    pub(super) fn cmd_list(
        &mut self,
        mut args: Args<'_>,
        subscribed: bool,
        out: &mut Output,
    ) -> CmdResult {
        let reference = args.astring().map_err(arg_error)?;
        let pattern = args.list_mailbox().map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        let store = store!(self)?;
        let entries = if subscribed {
            store.lsub(&reference, &pattern)
        } else {
            store.list(&reference, &pattern)
        }
        .map_err(map_error!(self))?;

        let response = if subscribed { "LSUB" } else { "LIST" };
        for entry in entries {
            out.untagged(|w| {
                w.verbatim(response)?;
                w.verbatim(" (")?;
                w.verbatim(&entry.attributes.join(" "))?;
                w.verbatim(") ")?;
                match entry.delimiter {
                    Some(delimiter) => {
                        w.string(delimiter.to_string().as_bytes())?
                    }
                    None => w.nil()?,
                }
                w.verbatim(" ")?;
                w.mailbox(&entry.name)
            });
        }

        Ok(Completion::ok())
    }

    pub(super) fn cmd_status(
        &mut self,
        mut args: Args<'_>,
        out: &mut Output,
    ) -> CmdResult {
        let name = args.mailbox().map_err(arg_error)?;
        let items = args.arg(status_items).map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        let values = store!(self)?
            .status(&name, &items)
            .map_err(map_error!(self))?;

        out.untagged(|w| {
            w.verbatim("STATUS ")?;
            w.mailbox(&name)?;
            w.verbatim(" (")?;
            for (ix, (item, value)) in values.iter().enumerate() {
                if ix > 0 {
                    w.verbatim(" ")?;
                }
                w.verbatim(item.name())?;
                w.verbatim(" ")?;
                w.num(*value)?;
            }
            w.verbatim(")")
        });

        Ok(Completion::ok())
    }

    /// Resolve an error of an operation that targets a mailbox by name,
    /// suggesting `TRYCREATE` if it does not exist.
    pub(super) fn try_create_error(&mut self, e: Error) -> Completion {
        match e {
            Error::NxMailbox => {
                let text = self
                    .events
                    .take_last_error()
                    .unwrap_or_else(|| e.to_string());
                Completion::no_code(RespCode::TryCreate, text)
            }
            e => error_completion(&self.log_prefix, &mut self.events, e),
        }
    }
}

fn status_item(i: &[u8]) -> IResult<&[u8], StatusItem> {
    alt((
        map(kw("MESSAGES"), |_| StatusItem::Messages),
        map(kw("RECENT"), |_| StatusItem::Recent),
        map(kw("UIDNEXT"), |_| StatusItem::UidNext),
        map(kw("UIDVALIDITY"), |_| StatusItem::UidValidity),
        map(kw("UNSEEN"), |_| StatusItem::Unseen),
    ))(i)
}

fn status_items(i: &[u8]) -> IResult<&[u8], Vec<StatusItem>> {
    delimited(
        tag("("),
        separated_nonempty_list(tag(" "), status_item),
        tag(")"),
    )(i)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_status_items() {
        assert_eq!(
            vec![StatusItem::Messages, StatusItem::UidNext],
            status_items(b"(messages UIDNEXT)").unwrap().1
        );
        assert!(status_items(b"()").is_err());
        assert!(status_items(b"(BOGUS)").is_err());
    }
}
