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

//! Utilities for *writing* values under IMAP's "lexical rules".
//!
//! This is write-only since IMAP's lexical syntax is not separable from its
//! grammar.
//!
//! # Encoding Decisions
//!
//! Given the choice between encoding a string as an atom-like value or some
//! other form, we only use atom if all characters are in the set
//! `a-zA-Z0-9?=+/_.-` and the string is not "NIL".
//!
//! Given the choice between encoding a string as a quoted string or a
//! literal, the quoted string is only chosen if it is shorter than 100 bytes
//! and contains no controls, 8-bit bytes, double-quote, backslash, brace or
//! percent sign. Everything else goes out as a literal, so arbitrary bytes
//! survive the trip unchanged.

use std::io::{self, Write};

use chrono::prelude::*;

use crate::store::model::Flag;

#[derive(Clone, Copy, Debug)]
pub struct LexWriter<W> {
    writer: W,
}

impl<W: Write> Write for LexWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<W: Write> LexWriter<W> {
    pub fn new(writer: W) -> Self {
        LexWriter { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn verbatim(&mut self, s: &str) -> io::Result<()> {
        self.writer.write_all(s.as_bytes())
    }

    pub fn verbatim_bytes(&mut self, s: &[u8]) -> io::Result<()> {
        self.writer.write_all(s)
    }

    pub fn nil(&mut self) -> io::Result<()> {
        self.verbatim("NIL")
    }

    pub fn literal(&mut self, data: &[u8]) -> io::Result<()> {
        write!(self.writer, "{{{}}}\r\n", data.len())?;
        self.writer.write_all(data)
    }

    pub fn flag(&mut self, flag: &Flag) -> io::Result<()> {
        write!(self.writer, "{}", flag)
    }

    pub fn datetime(
        &mut self,
        datetime: &DateTime<FixedOffset>,
    ) -> io::Result<()> {
        write!(
            self.writer,
            "\"{}\"",
            datetime.format("%d-%b-%Y %H:%M:%S %z")
        )
    }

    pub fn num(&mut self, value: u32) -> io::Result<()> {
        write!(self.writer, "{}", value)
    }

    /// Write an astring, preferring atom form.
    pub fn astring(&mut self, s: &[u8]) -> io::Result<()> {
        if is_conservative_atom(s) {
            self.writer.write_all(s)
        } else {
            self.string(s)
        }
    }

    /// Write a string as quoted or literal.
    pub fn string(&mut self, s: &[u8]) -> io::Result<()> {
        if is_quotable(s) {
            self.writer.write_all(b"\"")?;
            self.writer.write_all(s)?;
            self.writer.write_all(b"\"")
        } else {
            self.literal(s)
        }
    }

    pub fn nstring(&mut self, s: Option<&[u8]>) -> io::Result<()> {
        match s {
            None => self.nil(),
            Some(s) => self.string(s),
        }
    }

    pub fn nstr(&mut self, s: &Option<impl AsRef<str>>) -> io::Result<()> {
        self.nstring(s.as_ref().map(|s| s.as_ref().as_bytes()))
    }

    /// Write a mailbox name.
    ///
    /// INBOX is always sent in its canonical form.
    pub fn mailbox(&mut self, name: &str) -> io::Result<()> {
        if "INBOX".eq_ignore_ascii_case(name) {
            self.verbatim("INBOX")
        } else {
            self.astring(name.as_bytes())
        }
    }
}

fn is_conservative_atom(s: &[u8]) -> bool {
    !b"nil".eq_ignore_ascii_case(s)
        && !s.is_empty()
        && s.iter().copied().all(|b| {
            matches!(
                b,
                b'a'..=b'z'
                    | b'A'..=b'Z'
                    | b'0'..=b'9'
                    | b'='
                    | b'?'
                    | b'/'
                    | b'+'
                    | b'_'
                    | b'.'
                    | b'-'
            )
        })
}

fn is_quotable(s: &[u8]) -> bool {
    s.len() < 100
        && s.iter().copied().all(|b| match b {
            0..=31 | 127..=255 => false,
            b'\\' | b'"' | b'{' | b'}' | b'%' => false,
            _ => true,
        })
}
