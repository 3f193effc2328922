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

use log::error;

use super::defs::*;
use crate::imap::fetch_att::store_request;

impl CommandProcessor {
    pub(super) fn cmd_store(
        &mut self,
        mut args: Args<'_>,
        out: &mut Output,
    ) -> CmdResult {
        let seqnums = self.seqnums(&mut args)?;
        let request = args.arg(store_request).map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        selected!(self)?
            .store_flags(&seqnums, request.op, &request.flags, &mut self.events)
            .map_err(map_error!(self))?;

        if request.silent {
            return Ok(Completion::ok());
        }

        let uid_mode = self.uid_mode;
        let stream = selected!(self)?;
        for seqnum in seqnums.items(stream.exists()) {
            let flags = match stream.flags(seqnum, &mut self.events) {
                Ok(flags) => flags,
                Err(e) => {
                    error!(
                        "{} Failed to read back flags of {}: {}",
                        self.log_prefix, seqnum, e
                    );
                    continue;
                }
            };
            let uid = stream.uid(seqnum).unwrap_or(0);
            let recent = stream.is_recent(seqnum);

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

        Ok(Completion::ok())
    }
}
