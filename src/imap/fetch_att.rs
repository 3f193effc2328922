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

//! FETCH attribute lists and STORE arguments.

use std::borrow::Cow;
use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case as kw, take_while1},
    combinator::{map, opt},
    error::ErrorKind,
    multi::separated_nonempty_list,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use super::syntax::{astring, flag, flag_list, number, nz_number};
use crate::store::model::{Flag, FlagOp, Section, SectionText};

/// One data item requested by FETCH.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchAtt {
    Envelope,
    Flags,
    InternalDate,
    Rfc822,
    Rfc822Header,
    Rfc822Size,
    Rfc822Text,
    /// `BODY` without a section, i.e., the non-extensible structure.
    Body,
    BodyStructure,
    Uid,
    BodySection {
        peek: bool,
        section: Section,
        partial: Option<(u32, u32)>,
    },
    Binary {
        peek: bool,
        part: Vec<u32>,
        partial: Option<(u32, u32)>,
    },
    BinarySize {
        part: Vec<u32>,
    },
}

impl FetchAtt {
    /// Whether fetching this item implicitly sets `\Seen`.
    pub fn sets_seen(&self) -> bool {
        match *self {
            FetchAtt::Rfc822 | FetchAtt::Rfc822Text => true,
            FetchAtt::BodySection { peek, .. }
            | FetchAtt::Binary { peek, .. } => !peek,
            _ => false,
        }
    }

    /// The name of this item in a FETCH response.
    pub fn response_name(&self) -> String {
        match *self {
            FetchAtt::BodySection {
                ref section,
                partial,
                ..
            } => format!("BODY[{}]{}", section, Origin(partial)),
            FetchAtt::Binary {
                ref part, partial, ..
            } => format!("BINARY[{}]{}", Part(part), Origin(partial)),
            FetchAtt::BinarySize { ref part } => {
                format!("BINARY.SIZE[{}]", Part(part))
            }
            ref simple => simple.to_string(),
        }
    }
}

struct Part<'a>(&'a [u32]);

impl fmt::Display for Part<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, p) in self.0.iter().enumerate() {
            if ix > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

struct Origin(Option<(u32, u32)>);

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some((start, _)) => write!(f, "<{}>", start),
            None => Ok(()),
        }
    }
}

struct Partial(Option<(u32, u32)>);

impl fmt::Display for Partial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some((start, len)) => write!(f, "<{}.{}>", start, len),
            None => Ok(()),
        }
    }
}

/// The request form of the item, which parses back to the same value.
impl fmt::Display for FetchAtt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FetchAtt::Envelope => write!(f, "ENVELOPE"),
            FetchAtt::Flags => write!(f, "FLAGS"),
            FetchAtt::InternalDate => write!(f, "INTERNALDATE"),
            FetchAtt::Rfc822 => write!(f, "RFC822"),
            FetchAtt::Rfc822Header => write!(f, "RFC822.HEADER"),
            FetchAtt::Rfc822Size => write!(f, "RFC822.SIZE"),
            FetchAtt::Rfc822Text => write!(f, "RFC822.TEXT"),
            FetchAtt::Body => write!(f, "BODY"),
            FetchAtt::BodyStructure => write!(f, "BODYSTRUCTURE"),
            FetchAtt::Uid => write!(f, "UID"),
            FetchAtt::BodySection {
                peek,
                ref section,
                partial,
            } => write!(
                f,
                "BODY{}[{}]{}",
                if peek { ".PEEK" } else { "" },
                section,
                Partial(partial)
            ),
            FetchAtt::Binary {
                peek,
                ref part,
                partial,
            } => write!(
                f,
                "BINARY{}[{}]{}",
                if peek { ".PEEK" } else { "" },
                Part(part),
                Partial(partial)
            ),
            FetchAtt::BinarySize { ref part } => {
                write!(f, "BINARY.SIZE[{}]", Part(part))
            }
        }
    }
}

fn all_macro() -> Vec<FetchAtt> {
    vec![
        FetchAtt::Flags,
        FetchAtt::InternalDate,
        FetchAtt::Rfc822Size,
        FetchAtt::Envelope,
    ]
}

fn fetch_macro(i: &[u8]) -> IResult<&[u8], Vec<FetchAtt>> {
    let (rest, word) = take_while1(|b: u8| b.is_ascii_alphabetic())(i)?;
    let word = String::from_utf8_lossy(word).to_ascii_uppercase();
    let expansion = match &word[..] {
        "ALL" => all_macro(),
        "FAST" => vec![
            FetchAtt::Flags,
            FetchAtt::InternalDate,
            FetchAtt::Rfc822Size,
        ],
        "FULL" => {
            let mut atts = all_macro();
            atts.push(FetchAtt::Body);
            atts
        }
        _ => return Err(nom::Err::Error((i, ErrorKind::Tag))),
    };

    // A macro is a complete word, not the prefix of an attribute
    if rest.first().map_or(false, |&b| b'.' == b || b'[' == b) {
        return Err(nom::Err::Error((i, ErrorKind::Tag)));
    }

    Ok((rest, expansion))
}

fn part_path(i: &[u8]) -> IResult<&[u8], Vec<u32>> {
    separated_nonempty_list(tag("."), nz_number)(i)
}

fn header_list(i: &[u8]) -> IResult<&[u8], Vec<String>> {
    delimited(
        tag("("),
        separated_nonempty_list(
            tag(" "),
            map(astring, |s: Cow<[u8]>| {
                String::from_utf8_lossy(&s).into_owned()
            }),
        ),
        tag(")"),
    )(i)
}

fn section_text(i: &[u8]) -> IResult<&[u8], SectionText> {
    alt((
        map(
            tuple((
                kw("HEADER.FIELDS"),
                opt(kw(".NOT")),
                preceded(tag(" "), header_list),
            )),
            |(_, negate, fields): (_, Option<&[u8]>, _)| {
                SectionText::HeaderFields {
                    negate: negate.is_some(),
                    fields,
                }
            },
        ),
        map(kw("HEADER"), |_| SectionText::Header),
        map(kw("TEXT"), |_| SectionText::Text),
        map(kw("MIME"), |_| SectionText::Mime),
    ))(i)
}

fn section_spec(i: &[u8]) -> IResult<&[u8], Section> {
    let (i, part) = opt(part_path)(i)?;
    let part = part.unwrap_or_default();
    let (i, text) = if part.is_empty() {
        opt(section_text)(i)?
    } else {
        opt(preceded(tag("."), section_text))(i)?
    };

    if part.is_empty() && Some(SectionText::Mime) == text {
        return Err(nom::Err::Error((i, ErrorKind::Verify)));
    }

    Ok((i, Section { part, text }))
}

fn section(i: &[u8]) -> IResult<&[u8], Section> {
    delimited(tag("["), section_spec, tag("]"))(i)
}

fn binary_section(i: &[u8]) -> IResult<&[u8], Vec<u32>> {
    map(delimited(tag("["), opt(part_path), tag("]")), |p: Option<_>| {
        p.unwrap_or_default()
    })(i)
}

fn partial(i: &[u8]) -> IResult<&[u8], Option<(u32, u32)>> {
    opt(map(
        tuple((tag("<"), number, tag("."), nz_number, tag(">"))),
        |(_, start, _, len, _)| (start, len),
    ))(i)
}

fn fetch_att(i: &[u8]) -> IResult<&[u8], FetchAtt> {
    let (rest, word) =
        take_while1(|b: u8| b.is_ascii_alphanumeric() || b'.' == b)(i)?;
    let word = String::from_utf8_lossy(word).to_ascii_uppercase();

    let simple = match &word[..] {
        "ENVELOPE" => Some(FetchAtt::Envelope),
        "FLAGS" => Some(FetchAtt::Flags),
        "INTERNALDATE" => Some(FetchAtt::InternalDate),
        "RFC822" => Some(FetchAtt::Rfc822),
        "RFC822.HEADER" => Some(FetchAtt::Rfc822Header),
        "RFC822.SIZE" => Some(FetchAtt::Rfc822Size),
        "RFC822.TEXT" => Some(FetchAtt::Rfc822Text),
        "BODYSTRUCTURE" => Some(FetchAtt::BodyStructure),
        "UID" => Some(FetchAtt::Uid),
        "BODY" if !rest.starts_with(b"[") => Some(FetchAtt::Body),
        _ => None,
    };
    if let Some(simple) = simple {
        return Ok((rest, simple));
    }

    match &word[..] {
        "BODY" | "BODY.PEEK" => {
            let (rest, (section, partial)) = tuple((section, partial))(rest)?;
            Ok((
                rest,
                FetchAtt::BodySection {
                    peek: word.ends_with(".PEEK"),
                    section,
                    partial,
                },
            ))
        }
        "BINARY" | "BINARY.PEEK" => {
            let (rest, (part, partial)) =
                tuple((binary_section, partial))(rest)?;
            Ok((
                rest,
                FetchAtt::Binary {
                    peek: word.ends_with(".PEEK"),
                    part,
                    partial,
                },
            ))
        }
        "BINARY.SIZE" => {
            let (rest, part) = binary_section(rest)?;
            Ok((rest, FetchAtt::BinarySize { part }))
        }
        _ => Err(nom::Err::Error((i, ErrorKind::Tag))),
    }
}

/// Parse the attribute argument of FETCH.
///
/// Macros are expanded. More than `max` attributes is a `Failure` with
/// `ErrorKind::Count`.
pub fn fetch_atts(i: &[u8], max: usize) -> IResult<&[u8], Vec<FetchAtt>> {
    let (rest, atts) = alt((
        fetch_macro,
        map(fetch_att, |att| vec![att]),
        delimited(
            tag("("),
            separated_nonempty_list(tag(" "), fetch_att),
            tag(")"),
        ),
    ))(i)?;

    if atts.len() > max {
        return Err(nom::Err::Failure((i, ErrorKind::Count)));
    }

    Ok((rest, atts))
}

/// The arguments of STORE after the sequence set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreRequest {
    pub op: FlagOp,
    pub silent: bool,
    pub flags: Vec<Flag>,
}

pub fn store_request(i: &[u8]) -> IResult<&[u8], StoreRequest> {
    map(
        tuple((
            opt(alt((tag("+"), tag("-")))),
            kw("FLAGS"),
            opt(kw(".SILENT")),
            tag(" "),
            alt((flag_list, separated_nonempty_list(tag(" "), flag))),
        )),
        |(sign, _, silent, _, flags): (Option<&[u8]>, _, _, _, _)| {
            StoreRequest {
                op: match sign {
                    None => FlagOp::Replace,
                    Some(b"+") => FlagOp::Add,
                    Some(_) => FlagOp::Remove,
                },
                silent: silent.is_some(),
                flags,
            }
        },
    )(i)
}
