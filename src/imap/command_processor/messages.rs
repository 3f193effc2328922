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

use super::defs::*;
use crate::store::SeqRange;

impl CommandProcessor {
    pub(super) fn cmd_append(&mut self, mut args: Args<'_>) -> CmdResult {
        let name = args.mailbox().map_err(arg_error)?;
        let flags = args.opt_arg(s::flag_list).unwrap_or_default();
        let internal_date = args.opt_arg(s::date_time);
        let data = args.arg(s::literal).map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        let res = store!(self)?.append(
            &name,
            &flags,
            internal_date,
            data,
            &mut self.events,
        );
        if let Err(e) = res {
            return Err(self.try_create_error(e));
        }

        Ok(match self.events.take_append_uid() {
            Some((uid_validity, uids)) => {
                Completion::ok_code(RespCode::AppendUid(uid_validity, uids))
            }
            None => Completion::ok(),
        })
    }

    pub(super) fn cmd_copy(&mut self, mut args: Args<'_>) -> CmdResult {
        let seqnums = self.seqnums(&mut args)?;
        let dest = args.mailbox().map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        let res = selected!(self)?.copy(&seqnums, &dest, &mut self.events);
        if let Err(e) = res {
            return Err(self.try_create_error(e));
        }

        Ok(match self.events.take_copy_uid() {
            Some((uid_validity, from, to)) => {
                Completion::ok_code(RespCode::CopyUid(uid_validity, from, to))
            }
            None => Completion::ok(),
        })
    }

    /// EXPUNGE, or UID EXPUNGE.
    ///
    /// The EXPUNGE responses themselves come from the poll at the end of
    /// the command.
    pub(super) fn cmd_expunge(
        &mut self,
        mut args: Args<'_>,
        _out: &mut Output,
    ) -> CmdResult {
        let uids = if self.uid_mode {
            Some(args.seq_set(self.max_id()).map_err(arg_error)?)
        } else {
            None
        };
        args.end().map_err(arg_error)?;

        selected!(self)?
            .expunge(uids.as_ref(), &mut self.events)
            .map_err(map_error!(self))?;
        Ok(Completion::ok())
    }

    pub(super) fn cmd_close(&mut self, args: Args<'_>) -> CmdResult {
        args.end().map_err(arg_error)?;
        let name = selected!(self)?.name().to_owned();
        self.close_selected(true);
        info!("{} Closed {}", self.log_prefix, name);
        Ok(Completion::ok())
    }

    pub(super) fn cmd_unselect(&mut self, args: Args<'_>) -> CmdResult {
        args.end().map_err(arg_error)?;
        let name = selected!(self)?.name().to_owned();
        self.close_selected(false);
        info!("{} Unselected {}", self.log_prefix, name);
        Ok(Completion::ok())
    }

    /// Parse a sequence set argument and resolve it to sequence numbers.
    ///
    /// In UID mode, UIDs which don't name a message are silently dropped.
    /// Otherwise, any sequence number past the end of the mailbox fails the
    /// command.
    pub(super) fn seqnums(
        &mut self,
        args: &mut Args<'_>,
    ) -> Result<SeqRange, Completion> {
        let max = self.max_id();
        let set = args.seq_set(max).map_err(arg_error)?;
        let uid_mode = self.uid_mode;
        let stream = selected!(self)?;

        if uid_mode {
            Ok((1..=stream.exists())
                .filter(|&seqnum| {
                    stream.uid(seqnum).map_or(false, |uid| set.contains(uid))
                })
                .collect())
        } else if set.max().map_or(false, |m| m > stream.exists()) {
            Err(Completion {
                cond: Cond::No,
                code: None,
                template: Template::BadSequence,
            })
        } else {
            Ok(set)
        }
    }
}
