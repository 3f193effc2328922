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

use nom::bytes::complete::tag;

use super::defs::*;
use crate::imap::criteria::{
    search_program, sort_program, thread_algorithm, SeqContext,
};
use crate::store::SearchKey;

/// Character sets which SEARCH, SORT and THREAD accept.
static CHARSETS: &[&str] = &["US-ASCII", "UTF-8"];

impl CommandProcessor {
    pub(super) fn cmd_search(
        &mut self,
        mut args: Args<'_>,
        out: &mut Output,
    ) -> CmdResult {
        let charset = args.arg(s::charset_prefix).map_err(arg_error)?;
        if let Some(charset) = charset {
            check_charset(&charset)?;
        }
        let key = self.search_key(&mut args)?;
        args.end().map_err(arg_error)?;

        let hits = selected!(self)?
            .search(&key, &mut self.events)
            .map_err(map_error!(self))?;
        let hits = self.to_response_ids(hits);

        out.untagged(|w| {
            w.verbatim("SEARCH")?;
            for id in hits {
                w.verbatim(&format!(" {}", id))?;
            }
            Ok(())
        });
        Ok(Completion::ok())
    }

    pub(super) fn cmd_sort(
        &mut self,
        mut args: Args<'_>,
        out: &mut Output,
    ) -> CmdResult {
        let program = args.arg(sort_program).map_err(arg_error)?;
        let charset = args.arg(s::astring).map_err(arg_error)?;
        check_charset(&charset)?;
        args.next(tag(" ")).map_err(arg_error)?;
        let key = self.search_key(&mut args)?;
        args.end().map_err(arg_error)?;

        let sorted = selected!(self)?
            .sort(&program, &key, &mut self.events)
            .map_err(map_error!(self))?;
        let sorted = self.to_response_ids(sorted);

        out.untagged(|w| {
            w.verbatim("SORT")?;
            for id in sorted {
                w.verbatim(&format!(" {}", id))?;
            }
            Ok(())
        });
        Ok(Completion::ok())
    }

    pub(super) fn cmd_thread(
        &mut self,
        mut args: Args<'_>,
        out: &mut Output,
    ) -> CmdResult {
        let algorithm = args.arg(thread_algorithm).map_err(arg_error)?;
        let charset = args.arg(s::astring).map_err(arg_error)?;
        check_charset(&charset)?;
        args.next(tag(" ")).map_err(arg_error)?;
        let key = self.search_key(&mut args)?;
        args.end().map_err(arg_error)?;

        let mut threads = selected!(self)?
            .thread(algorithm, &key, &mut self.events)
            .map_err(map_error!(self))?;
        if self.uid_mode {
            let stream = selected!(self)?;
            for thread in &mut threads {
                thread.map_ids(&mut |seqnum| stream.uid(seqnum).unwrap_or(0));
            }
        }

        out.untagged(|w| {
            w.verbatim("THREAD ")?;
            write_threads(w, &threads)
        });
        Ok(Completion::ok())
    }

    /// Parse the criteria which make up the rest of the command.
    fn search_key(
        &mut self,
        args: &mut Args<'_>,
    ) -> Result<SearchKey, Completion> {
        let stream = selected!(self)?;
        let ctx = SeqContext {
            max_seqnum: stream.exists(),
            max_uid: stream
                .uid(stream.exists())
                .unwrap_or_else(|| stream.uid_next().saturating_sub(1)),
        };
        let max_depth = self.config.limits.max_search_depth;

        args.next(|i| search_program(i, &ctx, max_depth))
            .map_err(arg_error)
    }

    /// Convert sequence numbers from the store to what the client asked
    /// for.
    fn to_response_ids(&self, seqnums: Vec<u32>) -> Vec<u32> {
        match self.selected.as_ref() {
            Some(stream) if self.uid_mode => seqnums
                .into_iter()
                .filter_map(|seqnum| stream.uid(seqnum))
                .collect(),
            _ => seqnums,
        }
    }
}

fn check_charset(charset: &[u8]) -> Result<(), Completion> {
    if CHARSETS
        .iter()
        .any(|c| c.as_bytes().eq_ignore_ascii_case(charset))
    {
        Ok(())
    } else {
        Err(Completion::no_code(
            RespCode::BadCharset,
            "Unsupported character set",
        ))
    }
}
