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

//! Primitive parsers for IMAP requests.
//!
//! IMAP's grammar is mostly context-free at the token level but needs
//! context (the size of the mailbox, the command being processed) to
//! interpret anything interesting. The `nom` parsers here recognise tokens;
//! `Args` walks the argument list of one command and turns parser failures
//! into the response the client should see.
//!
//! Literals are parsed in place: the request reader leaves the `{N}` header
//! and CRLF in the command text, and `literal()` simply takes the following
//! `N` bytes.

use std::borrow::Cow;
use std::str;

use chrono::prelude::*;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, tag, tag_no_case as kw, take, take_while1},
    character::complete::digit1,
    combinator::{map, map_opt, opt},
    error::ErrorKind,
    multi::{fold_many0, separated_nonempty_list},
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::store::model::{is_atom_char, normalise_inbox, Flag, SeqRange};

/// Why the arguments of a command could not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgError {
    /// An argument is absent or malformed.
    Missing,
    /// Input remains after the last argument.
    Excess,
    /// A specific problem, described to the client verbatim.
    Invalid(String),
}

/// A cursor over the arguments of one command.
///
/// Every method either consumes what it parsed or leaves the cursor
/// untouched.
#[derive(Clone, Copy, Debug)]
pub struct Args<'a> {
    rest: &'a [u8],
}

impl<'a> Args<'a> {
    pub fn new(rest: &'a [u8]) -> Self {
        Args { rest }
    }

    pub fn rest(&self) -> &'a [u8] {
        self.rest
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// Apply `parser` at the current position.
    pub fn next<T>(
        &mut self,
        parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], T>,
    ) -> Result<T, ArgError> {
        match parser(self.rest) {
            Ok((rest, value)) => {
                self.rest = rest;
                Ok(value)
            }
            Err(nom::Err::Failure((_, ErrorKind::TooLarge))) => {
                Err(ArgError::Invalid("Arguments nested too deeply".to_owned()))
            }
            Err(nom::Err::Failure((_, ErrorKind::Count))) => {
                Err(ArgError::Invalid("Too many items in list".to_owned()))
            }
            Err(_) => Err(ArgError::Missing),
        }
    }

    /// Expect a space then apply `parser`.
    pub fn arg<T>(
        &mut self,
        parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], T>,
    ) -> Result<T, ArgError> {
        let saved = *self;
        let result = self.next(tag(" ")).and_then(|_| self.next(parser));
        if result.is_err() {
            *self = saved;
        }
        result
    }

    /// If the next argument matches `parser`, consume it.
    pub fn opt_arg<T>(
        &mut self,
        parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], T>,
    ) -> Option<T> {
        self.arg(parser).ok()
    }

    /// Assert that all arguments have been consumed.
    pub fn end(&self) -> Result<(), ArgError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(ArgError::Excess)
        }
    }

    pub fn astring(&mut self) -> Result<String, ArgError> {
        self.arg(astring).map(|s| String::from_utf8_lossy(&s).into_owned())
    }

    pub fn mailbox(&mut self) -> Result<String, ArgError> {
        self.arg(astring)
            .map(|s| normalise_inbox(&String::from_utf8_lossy(&s)))
    }

    pub fn list_mailbox(&mut self) -> Result<String, ArgError> {
        self.arg(list_mailbox)
            .map(|s| String::from_utf8_lossy(&s).into_owned())
    }

    pub fn number(&mut self) -> Result<u32, ArgError> {
        self.arg(number)
    }

    /// Parse a sequence set, with `*` standing for `max`.
    pub fn seq_set(&mut self, max: u32) -> Result<SeqRange, ArgError> {
        let raw = self.arg(sequence_set)?;
        SeqRange::parse(raw, max).ok_or_else(|| {
            ArgError::Invalid(format!("Invalid sequence set: {}", raw))
        })
    }
}

/// Split a command line into its tag, command name, and arguments.
///
/// The arguments still begin with the space separating them from the
/// command name, if any.
pub fn command_header(i: &[u8]) -> Option<(&str, &str, &[u8])> {
    let (i, tag_part) = tag_atom(i).ok()?;
    let i = i.strip_prefix(b" ")?;
    let (i, name) = command_name(i).ok()?;
    if !i.is_empty() && !i.starts_with(b" ") {
        return None;
    }

    Some((tag_part, name, i))
}

/// Extract just the tag of a command line, if it has one.
pub fn command_tag(i: &[u8]) -> Option<&str> {
    tag_atom(i).ok().map(|(_, t)| t)
}

fn tag_atom(i: &[u8]) -> IResult<&[u8], &str> {
    map_opt(
        take_while1(|b: u8| is_astring_char(b) && b'+' != b),
        |s: &[u8]| str::from_utf8(s).ok(),
    )(i)
}

fn command_name(i: &[u8]) -> IResult<&[u8], &str> {
    map_opt(take_while1(|b: u8| b.is_ascii_alphanumeric()), |s: &[u8]| {
        str::from_utf8(s).ok()
    })(i)
}

fn is_astring_char(b: u8) -> bool {
    is_atom_char(b) || b']' == b
}

fn is_list_char(b: u8) -> bool {
    is_astring_char(b) || b'%' == b || b'*' == b
}

pub fn atom(i: &[u8]) -> IResult<&[u8], &str> {
    map_opt(take_while1(is_atom_char), |s: &[u8]| str::from_utf8(s).ok())(i)
}

pub fn number(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(digit1, |s: &[u8]| {
        str::from_utf8(s).ok().and_then(|s| s.parse::<u32>().ok())
    })(i)
}

pub fn nz_number(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(number, |n| if 0 == n { None } else { Some(n) })(i)
}

pub fn literal(i: &[u8]) -> IResult<&[u8], &[u8]> {
    let (i, len) = delimited(
        tag("{"),
        number,
        alt((tag("+}\r\n"), tag("}\r\n"))),
    )(i)?;
    take(len)(i)
}

fn quoted_char(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(tag("\\"), alt((tag("\\"), tag("\""))))(i)
}

fn quoted_string_content(i: &[u8]) -> IResult<&[u8], &[u8]> {
    alt((quoted_char, is_not("\r\n\"\\")))(i)
}

pub fn quoted(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    delimited(
        tag("\""),
        fold_many0(
            quoted_string_content,
            Cow::Borrowed(&[][..]),
            |mut accum: Cow<[u8]>, piece: &[u8]| {
                if accum.is_empty() {
                    Cow::Borrowed(piece)
                } else {
                    accum.to_mut().extend_from_slice(piece);
                    accum
                }
            },
        ),
        tag("\""),
    )(i)
}

pub fn string(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    alt((quoted, map(literal, Cow::Borrowed)))(i)
}

pub fn astring(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    alt((map(take_while1(is_astring_char), Cow::Borrowed), string))(i)
}

pub fn nstring(i: &[u8]) -> IResult<&[u8], Option<Cow<[u8]>>> {
    alt((map(kw("NIL"), |_| None), map(string, Some)))(i)
}

pub fn list_mailbox(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    alt((map(take_while1(is_list_char), Cow::Borrowed), string))(i)
}

pub fn sequence_set(i: &[u8]) -> IResult<&[u8], &str> {
    map_opt(is_a("0123456789:*,"), |s: &[u8]| str::from_utf8(s).ok())(i)
}

/// A flag, including the leading backslash of system flags.
pub fn flag(i: &[u8]) -> IResult<&[u8], Flag> {
    map_opt(
        alt((
            map(preceded(tag("\\"), atom), |a| (true, a)),
            map(atom, |a| (false, a)),
        )),
        |(backslash, a): (bool, &str)| {
            if backslash {
                format!("\\{}", a).parse().ok()
            } else {
                a.parse().ok()
            }
        },
    )(i)
}

pub fn flag_list(i: &[u8]) -> IResult<&[u8], Vec<Flag>> {
    alt((
        map(tag("()"), |_| vec![]),
        delimited(tag("("), separated_nonempty_list(tag(" "), flag), tag(")")),
    ))(i)
}

fn month(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(take(3usize), |s: &[u8]| {
        const MONTHS: [&[u8]; 12] = [
            b"jan", b"feb", b"mar", b"apr", b"may", b"jun", b"jul", b"aug",
            b"sep", b"oct", b"nov", b"dec",
        ];
        MONTHS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(s))
            .map(|ix| ix as u32 + 1)
    })(i)
}

fn date_text(i: &[u8]) -> IResult<&[u8], NaiveDate> {
    map_opt(
        tuple((number, tag("-"), month, tag("-"), number)),
        |(day, _, month, _, year)| {
            if year < 1000 || year > 9999 {
                None
            } else {
                NaiveDate::from_ymd_opt(year as i32, month, day)
            }
        },
    )(i)
}

/// A `date`, as used by SEARCH.
pub fn date(i: &[u8]) -> IResult<&[u8], NaiveDate> {
    alt((date_text, delimited(tag("\""), date_text, tag("\""))))(i)
}

/// A `date-time`, as used by APPEND.
pub fn date_time(i: &[u8]) -> IResult<&[u8], DateTime<FixedOffset>> {
    map_opt(
        delimited(tag("\""), is_not("\"\r\n"), tag("\"")),
        |s: &[u8]| {
            let s = str::from_utf8(s).ok()?;
            DateTime::parse_from_str(s.trim_start(), "%d-%b-%Y %H:%M:%S %z")
                .ok()
        },
    )(i)
}

/// An optional `CHARSET` prefix, as used by SEARCH.
pub fn charset_prefix(i: &[u8]) -> IResult<&[u8], Option<Cow<[u8]>>> {
    opt(delimited(kw("CHARSET "), astring, tag(" ")))(i)
}
