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

//! Parsers for SEARCH criteria and the SORT and THREAD programs built on
//! them.

use nom::{
    bytes::complete::tag,
    error::ErrorKind,
    multi::separated_nonempty_list,
    sequence::{delimited, preceded},
    IResult,
};

use super::syntax::{astring, atom, date, flag, number, sequence_set};
use crate::store::model::{
    SearchKey, SeqRange, SortCriterion, SortKey, ThreadAlgorithm,
};

/// What `*` stands for while parsing criteria.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeqContext {
    pub max_seqnum: u32,
    pub max_uid: u32,
}

/// Parse one or more space-separated search keys, which are implicitly
/// ANDed together.
///
/// Nesting through parentheses, `NOT` and `OR` may not go deeper than
/// `max_depth`; exceeding it is a `Failure` with `ErrorKind::TooLarge`.
pub fn search_program<'a>(
    i: &'a [u8],
    ctx: &SeqContext,
    max_depth: u32,
) -> IResult<&'a [u8], SearchKey> {
    let (i, keys) = key_list(i, ctx, max_depth)?;
    Ok((i, conjunction(keys)))
}

fn conjunction(mut keys: Vec<SearchKey>) -> SearchKey {
    if 1 == keys.len() {
        keys.remove(0)
    } else {
        SearchKey::And(keys)
    }
}

fn key_list<'a>(
    i: &'a [u8],
    ctx: &SeqContext,
    depth: u32,
) -> IResult<&'a [u8], Vec<SearchKey>> {
    let (mut i, first) = search_key(i, ctx, depth)?;
    let mut keys = vec![first];

    while i.starts_with(b" ") {
        match search_key(&i[1..], ctx, depth) {
            Ok((rest, key)) => {
                keys.push(key);
                i = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }

    Ok((i, keys))
}

fn text_arg(i: &[u8]) -> IResult<&[u8], String> {
    let (i, s) = preceded(tag(" "), astring)(i)?;
    Ok((i, String::from_utf8_lossy(&s).into_owned()))
}

fn search_key<'a>(
    i: &'a [u8],
    ctx: &SeqContext,
    depth: u32,
) -> IResult<&'a [u8], SearchKey> {
    if 0 == depth {
        return Err(nom::Err::Failure((i, ErrorKind::TooLarge)));
    }

    match i.first().copied() {
        Some(b'(') => {
            let (i, keys) =
                delimited(tag("("), |i| key_list(i, ctx, depth - 1), tag(")"))(
                    i,
                )?;
            return Ok((i, conjunction(keys)));
        }
        Some(b'0'..=b'9') | Some(b'*') => {
            let (rest, raw) = sequence_set(i)?;
            return match SeqRange::parse(raw, ctx.max_seqnum) {
                Some(set) => Ok((rest, SearchKey::SequenceSet(set))),
                None => Err(nom::Err::Error((i, ErrorKind::MapOpt))),
            };
        }
        _ => (),
    }

    let start = i;
    let (i, word) = atom(i)?;
    let word = word.to_ascii_uppercase();

    macro_rules! text {
        ($variant:ident) => {{
            let (i, s) = text_arg(i)?;
            (i, SearchKey::$variant(s))
        }};
    }
    macro_rules! date {
        ($variant:ident) => {{
            let (i, d) = preceded(tag(" "), date)(i)?;
            (i, SearchKey::$variant(d))
        }};
    }
    macro_rules! num {
        ($variant:ident) => {{
            let (i, n) = preceded(tag(" "), number)(i)?;
            (i, SearchKey::$variant(n))
        }};
    }

    Ok(match &word[..] {
        "ALL" => (i, SearchKey::All),
        "ANSWERED" => (i, SearchKey::Answered),
        "DELETED" => (i, SearchKey::Deleted),
        "DRAFT" => (i, SearchKey::Draft),
        "FLAGGED" => (i, SearchKey::Flagged),
        "NEW" => (i, SearchKey::New),
        "OLD" => (i, SearchKey::Old),
        "RECENT" => (i, SearchKey::Recent),
        "SEEN" => (i, SearchKey::Seen),
        "UNANSWERED" => (i, SearchKey::Unanswered),
        "UNDELETED" => (i, SearchKey::Undeleted),
        "UNDRAFT" => (i, SearchKey::Undraft),
        "UNFLAGGED" => (i, SearchKey::Unflagged),
        "UNSEEN" => (i, SearchKey::Unseen),
        "KEYWORD" => {
            let (i, f) = preceded(tag(" "), flag)(i)?;
            (i, SearchKey::Keyword(f))
        }
        "UNKEYWORD" => {
            let (i, f) = preceded(tag(" "), flag)(i)?;
            (i, SearchKey::Unkeyword(f))
        }
        "BCC" => text!(Bcc),
        "BODY" => text!(Body),
        "CC" => text!(Cc),
        "FROM" => text!(From),
        "SUBJECT" => text!(Subject),
        "TEXT" => text!(Text),
        "TO" => text!(To),
        "HEADER" => {
            let (i, name) = text_arg(i)?;
            let (i, value) = text_arg(i)?;
            (i, SearchKey::Header(name, value))
        }
        "BEFORE" => date!(Before),
        "ON" => date!(On),
        "SINCE" => date!(Since),
        "SENTBEFORE" => date!(SentBefore),
        "SENTON" => date!(SentOn),
        "SENTSINCE" => date!(SentSince),
        "LARGER" => num!(Larger),
        "SMALLER" => num!(Smaller),
        "OLDER" => num!(Older),
        "YOUNGER" => num!(Younger),
        "NOT" => {
            let (i, key) =
                preceded(tag(" "), |i| search_key(i, ctx, depth - 1))(i)?;
            (i, SearchKey::Not(Box::new(key)))
        }
        "OR" => {
            let (i, a) =
                preceded(tag(" "), |i| search_key(i, ctx, depth - 1))(i)?;
            let (i, b) =
                preceded(tag(" "), |i| search_key(i, ctx, depth - 1))(i)?;
            (i, SearchKey::Or(Box::new(a), Box::new(b)))
        }
        "UID" => {
            let (rest, raw) = preceded(tag(" "), sequence_set)(i)?;
            match SeqRange::parse(raw, ctx.max_uid) {
                Some(set) => (rest, SearchKey::Uid(set)),
                None => return Err(nom::Err::Error((i, ErrorKind::MapOpt))),
            }
        }
        _ => return Err(nom::Err::Error((start, ErrorKind::Tag))),
    })
}

fn sort_key(i: &[u8]) -> IResult<&[u8], SortKey> {
    let (i, first) = atom(i)?;
    let (i, reverse, name) = if first.eq_ignore_ascii_case("REVERSE") {
        let (i, name) = preceded(tag(" "), atom)(i)?;
        (i, true, name)
    } else {
        (i, false, first)
    };

    let criterion = match &name.to_ascii_uppercase()[..] {
        "ARRIVAL" => SortCriterion::Arrival,
        "CC" => SortCriterion::Cc,
        "DATE" => SortCriterion::Date,
        "FROM" => SortCriterion::From,
        "SIZE" => SortCriterion::Size,
        "SUBJECT" => SortCriterion::Subject,
        "TO" => SortCriterion::To,
        _ => return Err(nom::Err::Error((i, ErrorKind::Tag))),
    };

    Ok((i, SortKey { criterion, reverse }))
}

/// The parenthesised list of sort criteria of a SORT command.
pub fn sort_program(i: &[u8]) -> IResult<&[u8], Vec<SortKey>> {
    delimited(
        tag("("),
        separated_nonempty_list(tag(" "), sort_key),
        tag(")"),
    )(i)
}

pub fn thread_algorithm(i: &[u8]) -> IResult<&[u8], ThreadAlgorithm> {
    let (rest, name) = atom(i)?;
    if name.eq_ignore_ascii_case("ORDEREDSUBJECT") {
        Ok((rest, ThreadAlgorithm::OrderedSubject))
    } else if name.eq_ignore_ascii_case("REFERENCES") {
        Ok((rest, ThreadAlgorithm::References))
    } else {
        Err(nom::Err::Error((i, ErrorKind::Tag)))
    }
}
