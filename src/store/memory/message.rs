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

//! Structural access to raw RFC 5322 messages.

use std::borrow::Cow;

use super::header::{parse_address_list, parse_mime_value};
use super::quoted_printable::qp_decode;
use crate::store::model::*;
use crate::support::error::Error;

/// One header field, borrowed from the raw message.
#[derive(Clone, Debug)]
pub struct Field<'a> {
    pub name: &'a str,
    /// The complete raw field, including folded lines and the final line
    /// ending.
    pub raw: &'a [u8],
    /// The unfolded value, without leading or trailing whitespace.
    pub value: String,
}

/// A message or MIME body part, split into header and body.
#[derive(Clone, Debug)]
pub struct Entity<'a> {
    /// The header, including the blank line which ends it.
    pub header: &'a [u8],
    pub body: &'a [u8],
    pub fields: Vec<Field<'a>>,
}

impl<'a> Entity<'a> {
    pub fn parse(data: &'a [u8]) -> Self {
        let split = find_header_end(data);
        let header = &data[..split];
        Entity {
            header,
            body: &data[split..],
            fields: parse_fields(header),
        }
    }

    /// The unfolded value of the first field called `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| &f.value[..])
    }

    /// The media type and parameters, upper-cased, with the RFC 2045
    /// defaults filled in.
    pub fn content_type(&self, default: (&str, &str)) -> ContentType {
        let (token, params) = self
            .field("Content-Type")
            .map(parse_mime_value)
            .unwrap_or_default();

        let mut parts = token.splitn(2, '/');
        match (parts.next(), parts.next()) {
            (Some(t), Some(s)) if !t.is_empty() && !s.is_empty() => {
                ContentType {
                    media_type: t.trim().to_owned(),
                    subtype: s.trim().to_owned(),
                    params,
                }
            }
            _ => ContentType {
                media_type: default.0.to_owned(),
                subtype: default.1.to_owned(),
                params: if "TEXT" == default.0 {
                    vec![("CHARSET".to_owned(), "US-ASCII".to_owned())]
                } else {
                    vec![]
                },
            },
        }
    }

    pub fn encoding(&self) -> String {
        self.field("Content-Transfer-Encoding")
            .map(|e| e.trim().to_uppercase())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "7BIT".to_owned())
    }

    /// The body parts of this entity if it is a multipart.
    pub fn children(&self, ct: &ContentType) -> Vec<Entity<'a>> {
        if "MULTIPART" != ct.media_type {
            return vec![];
        }

        match ct.param("BOUNDARY") {
            Some(boundary) => split_multipart(self.body, boundary.as_bytes())
                .into_iter()
                .map(Entity::parse)
                .collect(),
            None => vec![],
        }
    }

    /// Resolve a section part path, where part numbers descend into
    /// multiparts and through encapsulated messages.
    pub fn subpart(&self, path: &[u32]) -> Option<Entity<'a>> {
        let mut current = self.clone();
        for &n in path {
            current = current.child(n)?;
        }
        Some(current)
    }

    fn child(&self, n: u32) -> Option<Entity<'a>> {
        let ct = self.content_type(("TEXT", "PLAIN"));
        if "MULTIPART" == ct.media_type {
            let default = default_child_type(&ct);
            let mut children = self.children(&ct);
            if n == 0 || n as usize > children.len() {
                return None;
            }
            let child = children.swap_remove(n as usize - 1);
            // Carry the digest default down
            Some(Entity {
                fields: if child.field("Content-Type").is_none()
                    && default == ("MESSAGE", "RFC822")
                {
                    let mut fields = child.fields;
                    fields.push(Field {
                        name: "Content-Type",
                        raw: b"",
                        value: "message/rfc822".to_owned(),
                    });
                    fields
                } else {
                    child.fields
                },
                ..child
            })
        } else if is_message_rfc822(&ct) {
            Entity::parse(self.body).child(n)
        } else if 1 == n {
            Some(self.clone())
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentType {
    pub media_type: String,
    pub subtype: String,
    pub params: Vec<(String, String)>,
}

impl ContentType {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|&&(ref n, _)| n == name)
            .map(|&(_, ref v)| &v[..])
    }
}

fn is_message_rfc822(ct: &ContentType) -> bool {
    "MESSAGE" == ct.media_type && "RFC822" == ct.subtype
}

fn default_child_type(parent: &ContentType) -> (&'static str, &'static str) {
    if "DIGEST" == parent.subtype {
        ("MESSAGE", "RFC822")
    } else {
        ("TEXT", "PLAIN")
    }
}

/// Find the offset of the first body byte.
fn find_header_end(data: &[u8]) -> usize {
    let mut ix = 0;
    while ix < data.len() {
        let line_end = memchr::memchr(b'\n', &data[ix..])
            .map(|n| ix + n + 1)
            .unwrap_or_else(|| data.len());
        let line = &data[ix..line_end];
        if b"\r\n" == line || b"\n" == line {
            return line_end;
        }
        ix = line_end;
    }

    data.len()
}

fn parse_fields(header: &[u8]) -> Vec<Field<'_>> {
    let mut fields: Vec<Field<'_>> = Vec::new();
    let mut start = 0;

    while start < header.len() {
        // Extend over continuation lines
        let mut end = start;
        loop {
            end = memchr::memchr(b'\n', &header[end..])
                .map(|n| end + n + 1)
                .unwrap_or_else(|| header.len());
            match header.get(end) {
                Some(b' ') | Some(b'\t') => continue,
                _ => break,
            }
        }

        let raw = &header[start..end];
        start = end;

        let colon = match memchr::memchr(b':', raw) {
            Some(colon) => colon,
            None => continue,
        };
        let name = match std::str::from_utf8(&raw[..colon]) {
            Ok(name) if !name.is_empty() && !name.contains(' ') => name,
            _ => continue,
        };

        let value = String::from_utf8_lossy(&raw[colon + 1..])
            .replace("\r\n", "")
            .replace('\n', "")
            .trim()
            .to_owned();
        fields.push(Field { name, raw, value });
    }

    fields
}

/// Split a multipart body into the raw content of each part.
fn split_multipart<'a>(body: &'a [u8], boundary: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut ix = 0;

    while ix < body.len() {
        let line_end = memchr::memchr(b'\n', &body[ix..])
            .map(|n| ix + n + 1)
            .unwrap_or_else(|| body.len());
        let line = &body[ix..line_end];

        if line.starts_with(b"--") && line[2..].starts_with(boundary) {
            let tail = &line[2 + boundary.len()..];
            if let Some(start) = part_start.take() {
                // The line ending before the delimiter belongs to it
                let mut end = ix.max(start);
                if end > start && b'\n' == body[end - 1] {
                    end -= 1;
                    if end > start && b'\r' == body[end - 1] {
                        end -= 1;
                    }
                }
                parts.push(&body[start..end]);
            }

            if tail.starts_with(b"--") {
                return parts;
            }

            part_start = Some(line_end);
        }

        ix = line_end;
    }

    // Unterminated final part
    if let Some(start) = part_start {
        parts.push(&body[start..]);
    }

    parts
}

fn count_lines(data: &[u8]) -> u32 {
    let newlines = memchr::memchr_iter(b'\n', data).count();
    if data.last().map_or(false, |&b| b'\n' != b) {
        newlines as u32 + 1
    } else {
        newlines as u32
    }
}

/// Build the IMAP envelope of a message.
pub fn envelope(entity: &Entity<'_>) -> Envelope {
    let addresses = |name: &str| {
        entity
            .field(name)
            .map(|v| parse_address_list(v.as_bytes()))
            .unwrap_or_default()
    };
    let string = |name: &str| entity.field(name).map(str::to_owned);

    let from = addresses("From");
    let mut sender = addresses("Sender");
    if sender.is_empty() {
        sender = from.clone();
    }
    let mut reply_to = addresses("Reply-To");
    if reply_to.is_empty() {
        reply_to = from.clone();
    }

    Envelope {
        date: string("Date"),
        subject: string("Subject"),
        from,
        sender,
        reply_to,
        to: addresses("To"),
        cc: addresses("Cc"),
        bcc: addresses("Bcc"),
        in_reply_to: string("In-Reply-To"),
        message_id: string("Message-ID"),
    }
}

/// Build the IMAP body structure of an entity.
pub fn body_structure(entity: &Entity<'_>) -> BodyStructure {
    body_structure_with_default(entity, ("TEXT", "PLAIN"))
}

fn body_structure_with_default(
    entity: &Entity<'_>,
    default: (&str, &str),
) -> BodyStructure {
    let ct = entity.content_type(default);
    let string = |name: &str| entity.field(name).map(str::to_owned);
    let disposition = entity.field("Content-Disposition").map(|d| {
        let (kind, params) = parse_mime_value(d);
        Disposition { kind, params }
    });

    if "MULTIPART" == ct.media_type {
        let child_default = default_child_type(&ct);
        let parts = entity
            .children(&ct)
            .iter()
            .map(|child| body_structure_with_default(child, child_default))
            .collect();

        return BodyStructure::Multipart(MultipartBody {
            parts,
            subtype: ct.subtype,
            params: ct.params,
            disposition,
            language: string("Content-Language"),
            location: string("Content-Location"),
        });
    }

    let kind = if is_message_rfc822(&ct) {
        let inner = Entity::parse(entity.body);
        SinglePartKind::Message {
            envelope: Box::new(envelope(&inner)),
            body: Box::new(body_structure(&inner)),
            lines: count_lines(entity.body),
        }
    } else if "TEXT" == ct.media_type {
        SinglePartKind::Text {
            lines: count_lines(entity.body),
        }
    } else {
        SinglePartKind::Basic
    };

    BodyStructure::Single(SinglePartBody {
        media_type: ct.media_type,
        subtype: ct.subtype,
        params: ct.params,
        id: string("Content-ID"),
        description: string("Content-Description"),
        encoding: entity.encoding(),
        size_octets: entity.body.len() as u32,
        kind,
        md5: string("Content-MD5"),
        disposition,
        language: string("Content-Language"),
        location: string("Content-Location"),
    })
}

/// Extract the content of a `BODY[section]`.
///
/// Sections which name a part that does not exist are empty, as RFC 3501
/// permits.
pub fn section(data: &[u8], section: &Section) -> Vec<u8> {
    let top = Entity::parse(data);
    let entity = match top.subpart(&section.part) {
        Some(entity) => entity,
        None => return vec![],
    };

    // HEADER, HEADER.FIELDS and TEXT of a nested part refer to the
    // encapsulated message.
    let message = || {
        if section.part.is_empty() {
            Some(entity.clone())
        } else if is_message_rfc822(&entity.content_type(("TEXT", "PLAIN")))
        {
            Some(Entity::parse(entity.body))
        } else {
            None
        }
    };

    match section.text {
        None if section.part.is_empty() => data.to_vec(),
        None => entity.body.to_vec(),
        Some(SectionText::Mime) => entity.header.to_vec(),
        Some(SectionText::Header) => {
            message().map(|m| m.header.to_vec()).unwrap_or_default()
        }
        Some(SectionText::Text) => {
            message().map(|m| m.body.to_vec()).unwrap_or_default()
        }
        Some(SectionText::HeaderFields { negate, ref fields }) => {
            let message = match message() {
                Some(m) => m,
                None => return vec![],
            };

            let mut out = Vec::new();
            for field in &message.fields {
                let listed =
                    fields.iter().any(|f| f.eq_ignore_ascii_case(field.name));
                if listed != negate {
                    out.extend_from_slice(field.raw);
                }
            }
            out.extend_from_slice(b"\r\n");
            out
        }
    }
}

/// Decode the content of the given part per its content transfer encoding.
pub fn binary(data: &[u8], part: &[u32]) -> Result<Vec<u8>, Error> {
    let top = Entity::parse(data);
    let entity = top.subpart(part).ok_or(Error::NxMessage)?;
    decode(&entity.encoding(), entity.body).map(Cow::into_owned)
}

pub fn decode<'a>(
    encoding: &str,
    body: &'a [u8],
) -> Result<Cow<'a, [u8]>, Error> {
    match encoding {
        "7BIT" | "8BIT" | "BINARY" => Ok(Cow::Borrowed(body)),
        "QUOTED-PRINTABLE" => Ok(Cow::Owned(qp_decode(body))),
        "BASE64" => {
            let cleaned: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            base64::decode(&cleaned).map(Cow::Owned).map_err(|_| {
                Error::Storage("Corrupt base64 content".to_owned())
            })
        }
        _ => Err(Error::UnknownCte),
    }
}

/// The decoded text of every leaf part of a message, for body searches.
pub fn text_parts(data: &[u8]) -> Vec<Vec<u8>> {
    fn collect(entity: &Entity<'_>, out: &mut Vec<Vec<u8>>) {
        let ct = entity.content_type(("TEXT", "PLAIN"));
        if "MULTIPART" == ct.media_type {
            for child in entity.children(&ct) {
                collect(&child, out);
            }
        } else if is_message_rfc822(&ct) {
            collect(&Entity::parse(entity.body), out);
        } else if let Ok(decoded) = decode(&entity.encoding(), entity.body) {
            out.push(decoded.into_owned());
        }
    }

    let mut out = Vec::new();
    collect(&Entity::parse(data), &mut out);
    out
}
