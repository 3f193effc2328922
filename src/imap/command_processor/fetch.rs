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

use log::warn;

use super::defs::*;
use crate::imap::events::EventBridge;
use crate::imap::fetch_att::{fetch_atts, FetchAtt};
use crate::imap::lex::LexWriter;
use crate::store::{Flag, FlagOp, MailStream, Section, SectionText, SeqRange};
use crate::support::error::Error;

impl CommandProcessor {
    pub(super) fn cmd_fetch(
        &mut self,
        mut args: Args<'_>,
        out: &mut Output,
    ) -> CmdResult {
        let seqnums = self.seqnums(&mut args)?;
        let max_atts = self.config.limits.max_fetch_attributes;
        let mut atts = args
            .arg(|i| fetch_atts(i, max_atts))
            .map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        if self.uid_mode && !atts.contains(&FetchAtt::Uid) {
            atts.insert(0, FetchAtt::Uid);
        }

        let read_only = selected!(self)?.read_only();
        let sets_seen = !read_only && atts.iter().any(FetchAtt::sets_seen);
        let allow_expunge = self.uid_mode;

        for seqnum in seqnums.items(u32::MAX) {
            // Nothing the store reports may land inside the FETCH line
            self.events.quell_begin();
            let res = match self.selected.as_mut() {
                Some(stream) => fetch_message(
                    &mut **stream,
                    &mut self.events,
                    seqnum,
                    &atts,
                    sets_seen,
                ),
                None => Err(Error::NxMessage),
            };
            self.events.quell_end();

            match res {
                Ok(line) => out.append(&line),
                Err(Error::NxMessage) => {
                    warn!(
                        "{} Message {} vanished during FETCH",
                        self.log_prefix, seqnum
                    );
                }
                Err(e) => return Err(error_completion(
                    &self.log_prefix,
                    &mut self.events,
                    e,
                )),
            }

            self.flush_changes(allow_expunge, out);
        }

        Ok(Completion::ok())
    }
}

/// Build the complete `* n FETCH (...)` line for one message.
fn fetch_message(
    stream: &mut dyn MailStream,
    events: &mut EventBridge,
    seqnum: u32,
    atts: &[FetchAtt],
    sets_seen: bool,
) -> Result<Vec<u8>, Error> {
    let mut flags = None;
    let mut report_flags = atts.contains(&FetchAtt::Flags);

    if sets_seen {
        let current = stream.flags(seqnum, events)?;
        if !current.contains(&Flag::Seen) {
            stream.store_flags(
                &SeqRange::just(seqnum),
                FlagOp::Add,
                &[Flag::Seen],
                events,
            )?;
            // The client must learn about the implicit change
            report_flags = true;
        } else {
            flags = Some(current);
        }
    }

    let mut w = LexWriter::new(Vec::new());
    w.verbatim(&format!("* {} FETCH (", seqnum))?;

    let mut first = true;
    for att in atts {
        if FetchAtt::Flags == *att {
            continue;
        }
        if !first {
            w.verbatim(" ")?;
        }
        first = false;
        write_att(&mut w, stream, seqnum, att)?;
    }

    if report_flags {
        let flags = match flags {
            Some(flags) => flags,
            None => stream.flags(seqnum, events)?,
        };
        if !first {
            w.verbatim(" ")?;
        }
        w.verbatim("FLAGS ")?;
        write_flags(&mut w, &flags, stream.is_recent(seqnum))?;
    }

    w.verbatim(")\r\n")?;
    Ok(w.into_inner())
}

fn write_att(
    w: &mut LexWriter<Vec<u8>>,
    stream: &mut dyn MailStream,
    seqnum: u32,
    att: &FetchAtt,
) -> Result<(), Error> {
    match *att {
        FetchAtt::Uid => {
            let uid = stream.uid(seqnum).ok_or(Error::NxMessage)?;
            w.verbatim(&format!("UID {}", uid))?;
        }
        // Written last by the caller
        FetchAtt::Flags => (),
        FetchAtt::InternalDate => {
            let date = stream.internal_date(seqnum)?;
            w.verbatim("INTERNALDATE ")?;
            w.datetime(&date)?;
        }
        FetchAtt::Rfc822Size => {
            let size = stream.size(seqnum)?;
            w.verbatim(&format!("RFC822.SIZE {}", size))?;
        }
        FetchAtt::Envelope => {
            let envelope = stream.envelope(seqnum)?;
            w.verbatim("ENVELOPE ")?;
            write_envelope(w, &envelope)?;
        }
        FetchAtt::Body | FetchAtt::BodyStructure => {
            let extended = FetchAtt::BodyStructure == *att;
            let body = stream.body_structure(seqnum)?;
            w.verbatim(if extended { "BODYSTRUCTURE " } else { "BODY " })?;
            write_body_structure(w, &body, extended)?;
        }
        FetchAtt::Rfc822 => {
            let data = stream.section(seqnum, &Section::default())?;
            w.verbatim("RFC822 ")?;
            w.string(&data)?;
        }
        FetchAtt::Rfc822Header | FetchAtt::Rfc822Text => {
            let (name, text) = if FetchAtt::Rfc822Header == *att {
                ("RFC822.HEADER ", SectionText::Header)
            } else {
                ("RFC822.TEXT ", SectionText::Text)
            };
            let section = Section {
                part: vec![],
                text: Some(text),
            };
            let data = stream.section(seqnum, &section)?;
            w.verbatim(name)?;
            w.string(&data)?;
        }
        FetchAtt::BodySection {
            ref section,
            partial,
            ..
        } => {
            let data = stream.section(seqnum, section)?;
            w.verbatim(&att.response_name())?;
            w.verbatim(" ")?;
            w.string(apply_partial(&data, partial))?;
        }
        FetchAtt::Binary {
            ref part, partial, ..
        } => {
            let data = stream.binary(seqnum, part)?;
            w.verbatim(&att.response_name())?;
            w.verbatim(" ")?;
            write_binary(w, apply_partial(&data, partial))?;
        }
        FetchAtt::BinarySize { ref part } => {
            let data = stream.binary(seqnum, part)?;
            w.verbatim(&att.response_name())?;
            w.verbatim(&format!(" {}", data.len()))?;
        }
    }

    Ok(())
}

/// Select the `<start.length>` window of `data`.
///
/// A window starting past the end is empty.
fn apply_partial(data: &[u8], partial: Option<(u32, u32)>) -> &[u8] {
    match partial {
        None => data,
        Some((start, len)) => {
            let start = (start as usize).min(data.len());
            let end = start.saturating_add(len as usize).min(data.len());
            &data[start..end]
        }
    }
}

/// Decoded content with NULs must go out as a `literal8`.
fn write_binary(w: &mut LexWriter<Vec<u8>>, data: &[u8]) -> io::Result<()> {
    if data.contains(&0) {
        w.verbatim("~")?;
        w.literal(data)
    } else {
        w.string(data)
    }
}
