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

//! Data shared between the protocol engine and the mail store.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::str::FromStr;

use chrono::prelude::*;

use crate::support::error::Error;

/// A "sequence set range" of sequence numbers or UIDs.
///
/// Internally, this is maintained as a minimal sorted set of inclusive ranges.
/// It does not maintain information on the original fragmentation, ordering,
/// or duplication.
///
/// The `Display` format puts this into minimal IMAP wire format. IMAP cannot
/// represent an empty sequence set; `Display` produces an empty string in
/// that case.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SeqRange {
    parts: BTreeMap<u32, u32>,
}

impl SeqRange {
    pub fn new() -> Self {
        SeqRange::default()
    }

    pub fn just(item: u32) -> Self {
        let mut this = SeqRange::new();
        this.insert(item, item);
        this
    }

    pub fn range(start: u32, end: u32) -> Self {
        let mut this = SeqRange::new();
        this.insert(start, end);
        this
    }

    /// Append a single item, which must be strictly greater than every item
    /// already present.
    pub fn append(&mut self, item: u32) {
        if let Some(end) = self.parts.values_mut().next_back() {
            debug_assert!(item > *end);

            if item == *end + 1 {
                *end = item;
                return;
            }
        }

        self.parts.insert(item, item);
    }

    /// Insert the inclusive range between `a` and `b`, in either order.
    pub fn insert(&mut self, a: u32, b: u32) {
        self.insert_raw(a.min(b), a.max(b));
    }

    fn insert_raw(&mut self, start_incl: u32, mut end_incl: u32) {
        // If this range overlaps or abuts any later ranges, fuse them.
        loop {
            let following = self
                .parts
                .range((Excluded(start_incl), Unbounded))
                .next()
                .map(|(&start, &end)| (start, end));

            if let Some((following_start, following_end)) = following {
                if following_start - 1 <= end_incl {
                    end_incl = end_incl.max(following_end);
                    self.parts.remove(&following_start);
                    continue;
                }
            }

            break;
        }

        let preceding = self
            .parts
            .range((Unbounded, Included(end_incl)))
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((preceding_start, preceding_end)) = preceding {
            if preceding_end.saturating_add(1) >= start_incl {
                if start_incl < preceding_start {
                    self.parts.remove(&preceding_start);
                    self.parts.insert(start_incl, end_incl.max(preceding_end));
                } else {
                    self.parts
                        .insert(preceding_start, end_incl.max(preceding_end));
                }
                return;
            }
        }

        self.parts.insert(start_incl, end_incl);
    }

    pub fn contains(&self, v: u32) -> bool {
        self.parts
            .range(..=v)
            .next_back()
            .filter(|&(_, &end)| end >= v)
            .is_some()
    }

    /// Iterate the items in this set in strictly ascending order, skipping
    /// anything greater than `max`.
    pub fn items<'a>(&'a self, max: u32) -> impl Iterator<Item = u32> + 'a {
        self.parts
            .iter()
            .map(|(&start, &end)| (start, end))
            .filter(move |&(start, _)| start <= max)
            .flat_map(move |(start, end)| start..=end.min(max))
    }

    /// Iterate the inclusive ranges making up this set.
    pub fn ranges<'a>(&'a self) -> impl Iterator<Item = (u32, u32)> + 'a {
        self.parts.iter().map(|(&start, &end)| (start, end))
    }

    /// Parse the IMAP format of a sequence set.
    ///
    /// `splat` is the value of `*`. 0 is not a valid element.
    pub fn parse(raw: &str, splat: u32) -> Option<Self> {
        fn do_parse(r: &str, splat: u32) -> Option<u32> {
            if "*" == r {
                Some(splat)
            } else if r.is_empty() || !r.bytes().all(|b| b.is_ascii_digit())
            {
                None
            } else {
                r.parse().ok().filter(|&n| n > 0)
            }
        }

        let mut this = Self::new();
        for part in raw.split(',') {
            let mut subs = part.split(':');
            match (subs.next(), subs.next(), subs.next()) {
                (Some(only), None, None) => {
                    let only = do_parse(only, splat)?;
                    this.insert_raw(only, only);
                }
                (Some(start), Some(end), None) => {
                    let start = do_parse(start, splat)?;
                    let end = do_parse(end, splat)?;
                    // RFC 3501 allows the endpoints in either order
                    this.insert(start, end);
                }
                _ => return None,
            }
        }

        Some(this)
    }

    pub fn len(&self) -> usize {
        self.parts
            .iter()
            .map(|(start, end)| (end - start) as usize + 1)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn max(&self) -> Option<u32> {
        self.parts.values().next_back().copied()
    }
}

impl std::iter::FromIterator<u32> for SeqRange {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut this = SeqRange::new();
        for item in iter {
            this.insert(item, item);
        }
        this
    }
}

impl fmt::Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, (&start, &end)) in self.parts.iter().enumerate() {
            let delim = if 0 == ix { "" } else { "," };

            if start == end {
                write!(f, "{}{}", delim, start)?;
            } else {
                write!(f, "{}{}:{}", delim, start, end)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self)
    }
}

/// A message flag.
///
/// The `Display` format is the exact wire format. `FromStr` does the reverse
/// and also understands non-standard casing of the system flags.
///
/// `\Recent` is not represented here since clients cannot set it.
#[derive(Clone)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Keyword(String),
}

impl Flag {
    pub const SYSTEM: [Flag; 5] = [
        Flag::Answered,
        Flag::Flagged,
        Flag::Deleted,
        Flag::Seen,
        Flag::Draft,
    ];
}

impl PartialEq for Flag {
    fn eq(&self, other: &Flag) -> bool {
        match (self, other) {
            (&Flag::Keyword(ref a), &Flag::Keyword(ref b)) => {
                a.eq_ignore_ascii_case(b)
            }
            (a, b) => {
                std::mem::discriminant(a) == std::mem::discriminant(b)
            }
        }
    }
}

impl Eq for Flag {}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Keyword(ref kw) => write!(f, "{}", kw),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if !s.is_empty() && s.bytes().all(is_atom_char) {
            Ok(Flag::Keyword(s.to_owned()))
        } else {
            Err(Error::Storage(format!("Invalid flag: {}", s)))
        }
    }
}

pub fn is_atom_char(b: u8) -> bool {
    match b {
        0..=b' ' | 127..=255 => false,
        b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']' => false,
        _ => true,
    }
}

/// How a `STORE` changes the flags of the selected messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagOp {
    Replace,
    Add,
    Remove,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Real(RealAddress),
    /// Start (`Some(name)`) or end (`None`) of an RFC 5322 group.
    GroupDelim(Option<String>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RealAddress {
    pub display_name: Option<String>,
    pub routing: Option<String>,
    pub local_part: String,
    pub domain: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disposition {
    pub kind: String,
    pub params: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BodyStructure {
    Multipart(MultipartBody),
    Single(SinglePartBody),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartBody {
    pub parts: Vec<BodyStructure>,
    pub subtype: String,
    pub params: Vec<(String, String)>,
    pub disposition: Option<Disposition>,
    pub language: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinglePartBody {
    pub media_type: String,
    pub subtype: String,
    pub params: Vec<(String, String)>,
    pub id: Option<String>,
    pub description: Option<String>,
    pub encoding: String,
    pub size_octets: u32,
    pub kind: SinglePartKind,
    pub md5: Option<String>,
    pub disposition: Option<Disposition>,
    pub language: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinglePartKind {
    Basic,
    Text {
        lines: u32,
    },
    Message {
        envelope: Box<Envelope>,
        body: Box<BodyStructure>,
        lines: u32,
    },
}

/// A `BODY[...]` section specifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Section {
    /// Dotted part path; empty for the whole message.
    pub part: Vec<u32>,
    pub text: Option<SectionText>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionText {
    Header,
    HeaderFields { negate: bool, fields: Vec<String> },
    Text,
    Mime,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, p) in self.part.iter().enumerate() {
            if ix > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", p)?;
        }

        if let Some(ref text) = self.text {
            if !self.part.is_empty() {
                write!(f, ".")?;
            }

            match *text {
                SectionText::Header => write!(f, "HEADER")?,
                SectionText::Text => write!(f, "TEXT")?,
                SectionText::Mime => write!(f, "MIME")?,
                SectionText::HeaderFields { negate, ref fields } => {
                    write!(
                        f,
                        "HEADER.FIELDS{} (",
                        if negate { ".NOT" } else { "" }
                    )?;
                    for (ix, field) in fields.iter().enumerate() {
                        if ix > 0 {
                            write!(f, " ")?;
                        }
                        write!(f, "{}", field)?;
                    }
                    write!(f, ")")?;
                }
            }
        }

        Ok(())
    }
}

/// A parsed SEARCH criteria tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchKey {
    All,
    Answered,
    Deleted,
    Draft,
    Flagged,
    New,
    Old,
    Recent,
    Seen,
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unseen,
    Keyword(Flag),
    Unkeyword(Flag),
    Bcc(String),
    Body(String),
    Cc(String),
    From(String),
    Subject(String),
    Text(String),
    To(String),
    Header(String, String),
    Before(NaiveDate),
    On(NaiveDate),
    Since(NaiveDate),
    SentBefore(NaiveDate),
    SentOn(NaiveDate),
    SentSince(NaiveDate),
    Larger(u32),
    Smaller(u32),
    /// Internal date at least this many seconds ago.
    Older(u32),
    /// Internal date at most this many seconds ago.
    Younger(u32),
    /// Always by sequence number, already resolved against the mailbox.
    SequenceSet(SeqRange),
    Uid(SeqRange),
    Not(Box<SearchKey>),
    Or(Box<SearchKey>, Box<SearchKey>),
    And(Vec<SearchKey>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortCriterion {
    Arrival,
    Cc,
    Date,
    From,
    Size,
    Subject,
    To,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub criterion: SortCriterion,
    pub reverse: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadAlgorithm {
    OrderedSubject,
    References,
}

/// One message in a thread tree, identified by sequence number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadNode {
    pub id: u32,
    pub children: Vec<ThreadNode>,
}

impl ThreadNode {
    pub fn leaf(id: u32) -> Self {
        ThreadNode {
            id,
            children: vec![],
        }
    }

    /// Apply `f` to every id in this tree.
    pub fn map_ids(&mut self, f: &mut impl FnMut(u32) -> u32) {
        self.id = f(self.id);
        for child in &mut self.children {
            child.map_ids(f);
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read_only: bool,
    pub anonymous: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListEntry {
    pub attributes: Vec<&'static str>,
    pub delimiter: Option<char>,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusItem {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
}

impl StatusItem {
    pub fn name(self) -> &'static str {
        match self {
            StatusItem::Messages => "MESSAGES",
            StatusItem::Recent => "RECENT",
            StatusItem::UidNext => "UIDNEXT",
            StatusItem::UidValidity => "UIDVALIDITY",
            StatusItem::Unseen => "UNSEEN",
        }
    }
}

/// Match a LIST pattern against a mailbox name.
///
/// `*` matches anything; `%` matches anything but the hierarchy delimiter.
/// The `INBOX` part of a name is matched case-insensitively.
pub fn pattern_matches(pattern: &str, name: &str, delimiter: char) -> bool {
    // `fold` is how many trailing chars of `name` are outside INBOX
    fn inner(
        pattern: &[char],
        name: &[char],
        delimiter: char,
        fold: usize,
    ) -> bool {
        match pattern.split_first() {
            None => name.is_empty(),
            Some((&'*', rest)) => (0..=name.len())
                .any(|n| inner(rest, &name[n..], delimiter, fold)),
            Some((&'%', rest)) => {
                let limit = name
                    .iter()
                    .position(|&c| c == delimiter)
                    .unwrap_or_else(|| name.len());
                (0..=limit).any(|n| inner(rest, &name[n..], delimiter, fold))
            }
            Some((&c, rest)) => match name.split_first() {
                Some((&n, name_rest))
                    if n == c
                        || (name.len() > fold
                            && n.eq_ignore_ascii_case(&c)) =>
                {
                    inner(rest, name_rest, delimiter, fold)
                }
                _ => false,
            },
        }
    }

    let (pattern, name) = (normalise_inbox(pattern), normalise_inbox(name));
    let in_inbox = "INBOX" == name
        || name.starts_with(&format!("INBOX{}", delimiter));
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let fold = if in_inbox { name.len() - 5 } else { name.len() };
    inner(&pattern, &name, delimiter, fold)
}

/// Rewrite a leading `inbox` in any case to `INBOX`.
pub fn normalise_inbox(name: &str) -> String {
    if name.len() >= 5
        && name.is_char_boundary(5)
        && name[..5].eq_ignore_ascii_case("inbox")
        && (name.len() == 5 || !name[5..].starts_with(char::is_alphanumeric))
    {
        format!("INBOX{}", &name[5..])
    } else {
        name.to_owned()
    }
}
