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

//! Parsers for the structured RFC 5322 and RFC 2045 header fields the
//! in-memory store needs to understand.
//!
//! Header values reach these functions already unfolded.

use chrono::prelude::*;
use nom::branch::alt;
use nom::bytes::complete::{is_a, is_not, tag, take, take_while1};
use nom::combinator::{map, opt, recognize};
use nom::multi::{fold_many0, many0, many1, separated_nonempty_list};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

use crate::store::model::{Address, RealAddress};

fn is_atext(b: u8) -> bool {
    match b {
        b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => true,
        b'!' | b'#'..=b'\'' | b'*' | b'+' | b'-' | b'/' | b'=' | b'?' => true,
        b'^' | b'_' | b'`' | b'{'..=b'~' => true,
        // RFC 6532
        0x80..=0xFF => true,
        _ => false,
    }
}

fn fws(i: &[u8]) -> IResult<&[u8], ()> {
    map(is_a(" \t\r\n"), |_| ())(i)
}

fn quoted_pair(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(tag("\\"), take(1usize))(i)
}

// Comments nest.
fn comment(i: &[u8]) -> IResult<&[u8], ()> {
    map(
        delimited(
            tag("("),
            many0(alt((
                map(is_not("()\\"), |_| ()),
                map(quoted_pair, |_| ()),
                comment,
            ))),
            tag(")"),
        ),
        |_| (),
    )(i)
}

fn cfws(i: &[u8]) -> IResult<&[u8], ()> {
    fold_many0(alt((fws, comment)), (), |_, _| ())(i)
}

fn atom(i: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(cfws, take_while1(is_atext), cfws)(i)
}

fn quoted_string(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    delimited(
        pair(cfws, tag("\"")),
        fold_many0(
            alt((is_not("\\\""), quoted_pair)),
            Vec::new(),
            |mut acc: Vec<u8>, item| {
                acc.extend_from_slice(item);
                acc
            },
        ),
        pair(tag("\""), cfws),
    )(i)
}

fn word(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    alt((map(atom, |a| a.to_vec()), quoted_string))(i)
}

// Includes the obsolete syntax with unquoted '.', as in "J. Smith".
fn phrase(i: &[u8]) -> IResult<&[u8], String> {
    map(
        many1(alt((
            quoted_string,
            map(
                delimited(
                    cfws,
                    take_while1(|b| is_atext(b) || b'.' == b),
                    cfws,
                ),
                |a: &[u8]| a.to_vec(),
            ),
        ))),
        |words| {
            words
                .iter()
                .map(|w| String::from_utf8_lossy(w).into_owned())
                .collect::<Vec<_>>()
                .join(" ")
        },
    )(i)
}

fn local_part(i: &[u8]) -> IResult<&[u8], String> {
    map(separated_nonempty_list(tag("."), word), |words| {
        words
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect::<Vec<_>>()
            .join(".")
    })(i)
}

fn domain_literal(i: &[u8]) -> IResult<&[u8], String> {
    map(
        delimited(pair(cfws, tag("[")), is_not("[]\\"), pair(tag("]"), cfws)),
        |d: &[u8]| format!("[{}]", String::from_utf8_lossy(d).trim()),
    )(i)
}

fn domain(i: &[u8]) -> IResult<&[u8], String> {
    alt((
        map(separated_nonempty_list(tag("."), atom), |parts| {
            parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect::<Vec<_>>()
                .join(".")
        }),
        domain_literal,
    ))(i)
}

fn addr_spec(i: &[u8]) -> IResult<&[u8], (String, String)> {
    pair(local_part, preceded(tag("@"), domain))(i)
}

// RFC 5322 obsolete source route, "@a,@b:".
fn route(i: &[u8]) -> IResult<&[u8], String> {
    map(
        terminated(recognize(pair(tag("@"), is_not(":<>"))), tag(":")),
        |r: &[u8]| String::from_utf8_lossy(r).into_owned(),
    )(i)
}

fn angle_addr(i: &[u8]) -> IResult<&[u8], (Option<String>, (String, String))> {
    delimited(
        pair(cfws, tag("<")),
        pair(opt(route), addr_spec),
        pair(tag(">"), cfws),
    )(i)
}

fn mailbox(i: &[u8]) -> IResult<&[u8], RealAddress> {
    alt((
        map(
            pair(opt(phrase), angle_addr),
            |(display_name, (routing, (local_part, domain)))| RealAddress {
                display_name,
                routing,
                local_part,
                domain,
            },
        ),
        map(addr_spec, |(local_part, domain)| RealAddress {
            display_name: None,
            routing: None,
            local_part,
            domain,
        }),
    ))(i)
}

fn list_delim(i: &[u8]) -> IResult<&[u8], ()> {
    map(many1(tuple((cfws, tag(","), cfws))), |_| ())(i)
}

fn mailbox_list(i: &[u8]) -> IResult<&[u8], Vec<RealAddress>> {
    delimited(
        opt(list_delim),
        separated_nonempty_list(list_delim, mailbox),
        opt(list_delim),
    )(i)
}

fn group(i: &[u8]) -> IResult<&[u8], Vec<Address>> {
    map(
        pair(
            terminated(phrase, tag(":")),
            terminated(opt(mailbox_list), tuple((cfws, tag(";"), cfws))),
        ),
        |(name, boxes)| {
            let mut addresses = vec![Address::GroupDelim(Some(name))];
            addresses.extend(
                boxes.unwrap_or_default().into_iter().map(Address::Real),
            );
            addresses.push(Address::GroupDelim(None));
            addresses
        },
    )(i)
}

fn address(i: &[u8]) -> IResult<&[u8], Vec<Address>> {
    alt((map(mailbox, |m| vec![Address::Real(m)]), group))(i)
}

fn address_list(i: &[u8]) -> IResult<&[u8], Vec<Address>> {
    map(
        delimited(
            opt(list_delim),
            separated_nonempty_list(list_delim, address),
            opt(list_delim),
        ),
        |lists| lists.into_iter().flatten().collect(),
    )(i)
}

/// Parse an address-list header value.
///
/// Anything after the first syntax error is dropped.
pub fn parse_address_list(value: &[u8]) -> Vec<Address> {
    match address_list(value) {
        Ok((_, addresses)) => addresses,
        Err(_) => vec![],
    }
}

/// Parse the value of a `Date` header.
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value).ok().or_else(|| {
        // Tolerate a trailing zone comment, as in "+0000 (UTC)"
        value
            .rfind('(')
            .and_then(|ix| {
                DateTime::parse_from_rfc2822(value[..ix].trim()).ok()
            })
    })
}

/// Parse a MIME header value of the form `token; name=value; ...`.
///
/// The token and parameter names are upper-cased. Quoted values are
/// unquoted.
pub fn parse_mime_value(value: &str) -> (String, Vec<(String, String)>) {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if in_quote && '\\' == c {
            escaped = true;
        } else if '"' == c {
            in_quote = !in_quote;
            // Mark that this value was quoted so it is not trimmed away
            current.push('\u{0}');
        } else if ';' == c && !in_quote {
            parts.push(std::mem::replace(&mut current, String::new()));
        } else {
            current.push(c);
        }
    }
    parts.push(current);

    let mut parts = parts.into_iter();
    let token = parts
        .next()
        .map(|t| t.replace('\u{0}', "").trim().to_uppercase())
        .unwrap_or_default();

    let params = parts
        .filter_map(|p| {
            let eq = p.find('=')?;
            let name = p[..eq].trim().to_uppercase();
            let value = p[eq + 1..].trim().replace('\u{0}', "");
            if name.is_empty() {
                None
            } else {
                Some((name, value))
            }
        })
        .collect();

    (token, params)
}
