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

//! SEARCH, SORT and THREAD over in-memory messages.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::prelude::*;

use super::header::{parse_address_list, parse_date};
use super::message::{text_parts, Entity};
use crate::store::model::*;

/// A message as seen by the criteria evaluator.
pub struct Candidate<'a> {
    pub seqnum: u32,
    pub uid: u32,
    pub flags: &'a [Flag],
    pub recent: bool,
    pub internal_date: DateTime<FixedOffset>,
    pub data: &'a [u8],
}

impl<'a> Candidate<'a> {
    fn has(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    fn entity(&self) -> Entity<'a> {
        Entity::parse(self.data)
    }

    fn sent_date(&self) -> Option<DateTime<FixedOffset>> {
        self.entity().field("Date").and_then(parse_date)
    }

    fn sort_date(&self) -> DateTime<FixedOffset> {
        self.sent_date().unwrap_or(self.internal_date)
    }
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }

    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

fn header_contains(m: &Candidate<'_>, name: &str, needle: &str) -> bool {
    m.entity()
        .fields
        .iter()
        .filter(|f| f.name.eq_ignore_ascii_case(name))
        .any(|f| contains_ignore_case(f.value.as_bytes(), needle.as_bytes()))
}

/// Evaluate `key` against one message.
pub fn matches(key: &SearchKey, m: &Candidate<'_>, now: DateTime<Utc>) -> bool {
    match *key {
        SearchKey::All => true,
        SearchKey::Answered => m.has(&Flag::Answered),
        SearchKey::Deleted => m.has(&Flag::Deleted),
        SearchKey::Draft => m.has(&Flag::Draft),
        SearchKey::Flagged => m.has(&Flag::Flagged),
        SearchKey::Seen => m.has(&Flag::Seen),
        SearchKey::Unanswered => !m.has(&Flag::Answered),
        SearchKey::Undeleted => !m.has(&Flag::Deleted),
        SearchKey::Undraft => !m.has(&Flag::Draft),
        SearchKey::Unflagged => !m.has(&Flag::Flagged),
        SearchKey::Unseen => !m.has(&Flag::Seen),
        SearchKey::Recent => m.recent,
        SearchKey::New => m.recent && !m.has(&Flag::Seen),
        SearchKey::Old => !m.recent,
        SearchKey::Keyword(ref flag) => m.has(flag),
        SearchKey::Unkeyword(ref flag) => !m.has(flag),

        SearchKey::Bcc(ref s) => header_contains(m, "Bcc", s),
        SearchKey::Cc(ref s) => header_contains(m, "Cc", s),
        SearchKey::From(ref s) => header_contains(m, "From", s),
        SearchKey::To(ref s) => header_contains(m, "To", s),
        SearchKey::Subject(ref s) => header_contains(m, "Subject", s),
        SearchKey::Header(ref name, ref s) => header_contains(m, name, s),
        SearchKey::Body(ref s) => text_parts(m.data)
            .iter()
            .any(|part| contains_ignore_case(part, s.as_bytes())),
        SearchKey::Text(ref s) => {
            contains_ignore_case(m.entity().header, s.as_bytes())
                || text_parts(m.data)
                    .iter()
                    .any(|part| contains_ignore_case(part, s.as_bytes()))
        }

        SearchKey::Before(date) => m.internal_date.naive_local().date() < date,
        SearchKey::On(date) => m.internal_date.naive_local().date() == date,
        SearchKey::Since(date) => {
            m.internal_date.naive_local().date() >= date
        }
        SearchKey::SentBefore(date) => m
            .sent_date()
            .map_or(false, |d| d.naive_local().date() < date),
        SearchKey::SentOn(date) => m
            .sent_date()
            .map_or(false, |d| d.naive_local().date() == date),
        SearchKey::SentSince(date) => m
            .sent_date()
            .map_or(false, |d| d.naive_local().date() >= date),

        SearchKey::Larger(n) => m.data.len() as u64 > u64::from(n),
        SearchKey::Smaller(n) => (m.data.len() as u64) < u64::from(n),
        SearchKey::Older(secs) => {
            now.signed_duration_since(m.internal_date).num_seconds()
                >= i64::from(secs)
        }
        SearchKey::Younger(secs) => {
            now.signed_duration_since(m.internal_date).num_seconds()
                <= i64::from(secs)
        }

        SearchKey::SequenceSet(ref set) => set.contains(m.seqnum),
        SearchKey::Uid(ref set) => set.contains(m.uid),

        SearchKey::Not(ref inner) => !matches(inner, m, now),
        SearchKey::Or(ref a, ref b) => matches(a, m, now) || matches(b, m, now),
        SearchKey::And(ref keys) => keys.iter().all(|k| matches(k, m, now)),
    }
}

/// Reduce a subject to its RFC 5256 base subject, upper-cased.
pub fn base_subject(subject: &str) -> String {
    fn strip_blob(s: &str) -> Option<&str> {
        let s = s.trim_start();
        if !s.starts_with('[') {
            return None;
        }
        let close = s.find(']')?;
        if s[1..close].contains('[') {
            return None;
        }
        Some(s[close + 1..].trim_start())
    }

    fn strip_leader(s: &str) -> Option<&str> {
        let upper = s.to_ascii_uppercase();
        let tag_len = ["RE", "FWD", "FW"]
            .iter()
            .find(|t| upper.starts_with(*t))
            .map(|t| t.len())?;
        let mut rest = s[tag_len..].trim_start();
        if let Some(after_blob) = strip_blob(rest) {
            rest = after_blob;
        }
        if rest.starts_with(':') {
            Some(rest[1..].trim_start())
        } else {
            None
        }
    }

    let mut s = subject.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let before = s.clone();

        while s.to_ascii_uppercase().ends_with("(FWD)") {
            let len = s.len() - 5;
            s.truncate(len);
            s = s.trim_end().to_owned();
        }

        loop {
            if let Some(rest) = strip_leader(&s) {
                s = rest.to_owned();
                continue;
            }
            match strip_blob(&s) {
                Some(rest) if !rest.is_empty() => s = rest.to_owned(),
                _ => break,
            }
        }

        let upper = s.to_ascii_uppercase();
        if upper.starts_with("[FWD:") && s.ends_with(']') {
            s = s[5..s.len() - 1].trim().to_owned();
        }

        if s == before {
            break;
        }
    }

    s.to_ascii_uppercase()
}

fn first_mailbox(m: &Candidate<'_>, field: &str) -> String {
    m.entity()
        .field(field)
        .map(|v| parse_address_list(v.as_bytes()))
        .unwrap_or_default()
        .into_iter()
        .find_map(|a| match a {
            Address::Real(real) => Some(real.local_part.to_ascii_uppercase()),
            Address::GroupDelim(_) => None,
        })
        .unwrap_or_default()
}

fn subject(m: &Candidate<'_>) -> String {
    base_subject(m.entity().field("Subject").unwrap_or(""))
}

fn compare(a: &Candidate<'_>, b: &Candidate<'_>, key: SortKey) -> Ordering {
    let ordering = match key.criterion {
        SortCriterion::Arrival => a.internal_date.cmp(&b.internal_date),
        SortCriterion::Date => a.sort_date().cmp(&b.sort_date()),
        SortCriterion::Size => a.data.len().cmp(&b.data.len()),
        SortCriterion::Subject => subject(a).cmp(&subject(b)),
        SortCriterion::From => {
            first_mailbox(a, "From").cmp(&first_mailbox(b, "From"))
        }
        SortCriterion::To => {
            first_mailbox(a, "To").cmp(&first_mailbox(b, "To"))
        }
        SortCriterion::Cc => {
            first_mailbox(a, "Cc").cmp(&first_mailbox(b, "Cc"))
        }
    };

    if key.reverse {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Order the candidates by `program`, ties broken by sequence number.
pub fn sort(candidates: &mut [Candidate<'_>], program: &[SortKey]) {
    candidates.sort_by(|a, b| {
        program
            .iter()
            .map(|&key| compare(a, b, key))
            .find(|&o| o != Ordering::Equal)
            .unwrap_or_else(|| a.seqnum.cmp(&b.seqnum))
    });
}

fn by_date(candidates: &[Candidate<'_>], a: usize, b: usize) -> Ordering {
    candidates[a]
        .sort_date()
        .cmp(&candidates[b].sort_date())
        .then(candidates[a].seqnum.cmp(&candidates[b].seqnum))
}

/// Group the candidates into threads.
pub fn thread(
    candidates: &[Candidate<'_>],
    algorithm: ThreadAlgorithm,
) -> Vec<ThreadNode> {
    match algorithm {
        ThreadAlgorithm::OrderedSubject => ordered_subject(candidates),
        ThreadAlgorithm::References => references(candidates),
    }
}

fn ordered_subject(candidates: &[Candidate<'_>]) -> Vec<ThreadNode> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (ix, candidate) in candidates.iter().enumerate() {
        let subject = subject(candidate);
        match groups.iter_mut().find(|g| g.0 == subject) {
            Some(group) => group.1.push(ix),
            None => groups.push((subject, vec![ix])),
        }
    }

    for group in &mut groups {
        group.1.sort_by(|&a, &b| by_date(candidates, a, b));
    }
    groups.sort_by(|a, b| by_date(candidates, a.1[0], b.1[0]));

    groups
        .into_iter()
        .map(|(_, members)| ThreadNode {
            id: candidates[members[0]].seqnum,
            children: members[1..]
                .iter()
                .map(|&ix| ThreadNode::leaf(candidates[ix].seqnum))
                .collect(),
        })
        .collect()
}

fn message_ids(value: &str) -> Vec<String> {
    value
        .split('<')
        .skip(1)
        .filter_map(|s| s.find('>').map(|end| s[..end].trim().to_owned()))
        .filter(|s| !s.is_empty())
        .collect()
}

fn references(candidates: &[Candidate<'_>]) -> Vec<ThreadNode> {
    let entities: Vec<Entity<'_>> =
        candidates.iter().map(Candidate::entity).collect();

    let mut by_id: HashMap<String, usize> = HashMap::new();
    for (ix, entity) in entities.iter().enumerate() {
        if let Some(id) = entity
            .field("Message-ID")
            .and_then(|v| message_ids(v).into_iter().next())
        {
            by_id.entry(id).or_insert(ix);
        }
    }

    let mut parent: Vec<Option<usize>> = vec![None; candidates.len()];
    for (ix, entity) in entities.iter().enumerate() {
        let mut refs = entity
            .field("References")
            .map(message_ids)
            .unwrap_or_default();
        if refs.is_empty() {
            refs = entity
                .field("In-Reply-To")
                .map(message_ids)
                .unwrap_or_default();
        }

        // Nearest ancestor present in the set, refusing to form a loop
        for id in refs.iter().rev() {
            let candidate_parent = match by_id.get(id) {
                Some(&p) if p != ix => p,
                _ => continue,
            };

            let mut cursor = Some(candidate_parent);
            let mut creates_loop = false;
            while let Some(c) = cursor {
                if c == ix {
                    creates_loop = true;
                    break;
                }
                cursor = parent[c];
            }

            if !creates_loop {
                parent[ix] = Some(candidate_parent);
                break;
            }
        }
    }

    // Roots which share a base subject are gathered under the earliest
    let mut roots: Vec<usize> =
        (0..candidates.len()).filter(|&ix| parent[ix].is_none()).collect();
    roots.sort_by(|&a, &b| by_date(candidates, a, b));
    let mut first_by_subject: HashMap<String, usize> = HashMap::new();
    for &root in &roots {
        let subject = subject(&candidates[root]);
        if subject.is_empty() {
            continue;
        }
        match first_by_subject.get(&subject) {
            Some(&first) => parent[root] = Some(first),
            None => {
                first_by_subject.insert(subject, root);
            }
        }
    }

    fn build(
        ix: usize,
        candidates: &[Candidate<'_>],
        parent: &[Option<usize>],
    ) -> ThreadNode {
        let mut children: Vec<usize> = (0..candidates.len())
            .filter(|&c| parent[c] == Some(ix))
            .collect();
        children.sort_by(|&a, &b| by_date(candidates, a, b));
        ThreadNode {
            id: candidates[ix].seqnum,
            children: children
                .into_iter()
                .map(|c| build(c, candidates, parent))
                .collect(),
        }
    }

    roots
        .into_iter()
        .filter(|&r| parent[r].is_none())
        .map(|r| build(r, candidates, &parent))
        .collect()
}
