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

//! Tagged completions and the serialisation of structured response data.

use std::fmt;
use std::io::{self, Write};

use super::lex::LexWriter;
use crate::store::model::*;

/// The condition of a status response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Ok,
    No,
    Bad,
    Bye,
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Cond::Ok => write!(f, "OK"),
            Cond::No => write!(f, "NO"),
            Cond::Bad => write!(f, "BAD"),
            Cond::Bye => write!(f, "BYE"),
        }
    }
}

/// A bracketed response code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RespCode {
    Alert,
    Parse,
    TryCreate,
    ReadOnly,
    ReadWrite,
    UidNotSticky,
    BadCharset,
    UnknownCte,
    UidValidity(u32),
    UidNext(u32),
    Unseen(u32),
    /// The flags, and whether new keywords may be created.
    PermanentFlags(Vec<Flag>, bool),
    Capability(String),
    Referral(String),
    CopyUid(u32, SeqRange, SeqRange),
    AppendUid(u32, SeqRange),
}

impl fmt::Display for RespCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RespCode::Alert => write!(f, "ALERT"),
            RespCode::Parse => write!(f, "PARSE"),
            RespCode::TryCreate => write!(f, "TRYCREATE"),
            RespCode::ReadOnly => write!(f, "READ-ONLY"),
            RespCode::ReadWrite => write!(f, "READ-WRITE"),
            RespCode::UidNotSticky => write!(f, "UIDNOTSTICKY"),
            RespCode::BadCharset => write!(f, "BADCHARSET (US-ASCII UTF-8)"),
            RespCode::UnknownCte => write!(f, "UNKNOWN-CTE"),
            RespCode::UidValidity(v) => write!(f, "UIDVALIDITY {}", v),
            RespCode::UidNext(v) => write!(f, "UIDNEXT {}", v),
            RespCode::Unseen(v) => write!(f, "UNSEEN {}", v),
            RespCode::PermanentFlags(ref flags, keywords) => {
                write!(f, "PERMANENTFLAGS (")?;
                for (ix, flag) in flags.iter().enumerate() {
                    if ix > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", flag)?;
                }
                if keywords {
                    if !flags.is_empty() {
                        write!(f, " ")?;
                    }
                    write!(f, "\\*")?;
                }
                write!(f, ")")
            }
            RespCode::Capability(ref caps) => write!(f, "CAPABILITY {}", caps),
            RespCode::Referral(ref url) => write!(f, "REFERRAL {}", url),
            RespCode::CopyUid(validity, ref src, ref dst) => {
                write!(f, "COPYUID {} {} {}", validity, src, dst)
            }
            RespCode::AppendUid(validity, ref dst) => {
                write!(f, "APPENDUID {} {}", validity, dst)
            }
        }
    }
}

/// The fixed set of texts a tagged response can carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Template {
    Completed,
    Failed(String),
    MissingArgument,
    ExcessArgument,
    Unrecognised,
    /// A sequence number refers to no message.
    BadSequence,
    Text(String),
}

impl Template {
    pub fn render(&self, command: &str) -> String {
        match *self {
            Template::Completed => format!("{} completed", command),
            Template::Failed(ref why) => {
                format!("{} failed: {}", command, why)
            }
            Template::MissingArgument => {
                format!("Missing or invalid argument to {}", command)
            }
            Template::ExcessArgument => {
                format!("Argument given to {} when none expected", command)
            }
            Template::Unrecognised => {
                format!("Command unrecognized: {}", command)
            }
            Template::BadSequence => {
                format!("Invalid message sequence number in {}", command)
            }
            Template::Text(ref text) => text.clone(),
        }
    }
}

/// The tagged response which ends a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub cond: Cond,
    pub code: Option<RespCode>,
    pub template: Template,
}

/// The outcome of a command handler.
///
/// Both sides carry the response to send; `Err` exists so that handlers
/// can bail out with `?`.
pub type CmdResult = Result<Completion, Completion>;

impl Completion {
    pub fn ok() -> Self {
        Completion {
            cond: Cond::Ok,
            code: None,
            template: Template::Completed,
        }
    }

    pub fn ok_code(code: RespCode) -> Self {
        Completion {
            code: Some(code),
            ..Completion::ok()
        }
    }

    pub fn no(why: impl Into<String>) -> Self {
        Completion {
            cond: Cond::No,
            code: None,
            template: Template::Failed(why.into()),
        }
    }

    pub fn no_code(code: RespCode, why: impl Into<String>) -> Self {
        Completion {
            code: Some(code),
            ..Completion::no(why)
        }
    }

    pub fn bad(template: Template) -> Self {
        Completion {
            cond: Cond::Bad,
            code: None,
            template,
        }
    }

    pub fn with_code(mut self, code: RespCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.template = Template::Text(text.into());
        self
    }

    /// Write the full tagged response line.
    pub fn write_to(
        &self,
        w: &mut impl Write,
        tag: &str,
        command: &str,
    ) -> io::Result<()> {
        write!(w, "{} {} ", tag, self.cond)?;
        if let Some(ref code) = self.code {
            write!(w, "[{}] ", code)?;
        }
        write!(w, "{}\r\n", self.template.render(command))
    }
}

/// Write a parenthesised flag list, with `\Recent` at the end if `recent`.
pub fn write_flags<W: Write>(
    w: &mut LexWriter<W>,
    flags: &[Flag],
    recent: bool,
) -> io::Result<()> {
    w.verbatim("(")?;
    for (ix, flag) in flags.iter().enumerate() {
        if ix > 0 {
            w.verbatim(" ")?;
        }
        w.flag(flag)?;
    }
    if recent {
        if !flags.is_empty() {
            w.verbatim(" ")?;
        }
        w.verbatim("\\Recent")?;
    }
    w.verbatim(")")
}

pub fn write_envelope<W: Write>(
    w: &mut LexWriter<W>,
    env: &Envelope,
) -> io::Result<()> {
    w.verbatim("(")?;
    w.nstr(&env.date)?;
    w.verbatim(" ")?;
    w.nstr(&env.subject)?;
    for addresses in &[
        &env.from,
        &env.sender,
        &env.reply_to,
        &env.to,
        &env.cc,
        &env.bcc,
    ] {
        w.verbatim(" ")?;
        write_address_list(w, addresses)?;
    }
    w.verbatim(" ")?;
    w.nstr(&env.in_reply_to)?;
    w.verbatim(" ")?;
    w.nstr(&env.message_id)?;
    w.verbatim(")")
}

pub fn write_address_list<W: Write>(
    w: &mut LexWriter<W>,
    addresses: &[Address],
) -> io::Result<()> {
    if addresses.is_empty() {
        return w.nil();
    }

    w.verbatim("(")?;
    for address in addresses {
        match *address {
            Address::Real(ref real) => {
                w.verbatim("(")?;
                w.nstr(&real.display_name)?;
                w.verbatim(" ")?;
                w.nstr(&real.routing)?;
                w.verbatim(" ")?;
                w.string(real.local_part.as_bytes())?;
                w.verbatim(" ")?;
                w.string(real.domain.as_bytes())?;
                w.verbatim(")")?;
            }
            Address::GroupDelim(ref name) => {
                w.verbatim("(NIL NIL ")?;
                w.nstr(name)?;
                w.verbatim(" NIL)")?;
            }
        }
    }
    w.verbatim(")")
}

fn write_params<W: Write>(
    w: &mut LexWriter<W>,
    params: &[(String, String)],
) -> io::Result<()> {
    if params.is_empty() {
        return w.nil();
    }

    w.verbatim("(")?;
    for (ix, (name, value)) in params.iter().enumerate() {
        if ix > 0 {
            w.verbatim(" ")?;
        }
        w.string(name.as_bytes())?;
        w.verbatim(" ")?;
        w.string(value.as_bytes())?;
    }
    w.verbatim(")")
}

fn write_extension<W: Write>(
    w: &mut LexWriter<W>,
    disposition: &Option<Disposition>,
    language: &Option<String>,
    location: &Option<String>,
) -> io::Result<()> {
    w.verbatim(" ")?;
    match *disposition {
        None => w.nil()?,
        Some(ref disposition) => {
            w.verbatim("(")?;
            w.string(disposition.kind.as_bytes())?;
            w.verbatim(" ")?;
            write_params(w, &disposition.params)?;
            w.verbatim(")")?;
        }
    }
    w.verbatim(" ")?;
    w.nstr(language)?;
    w.verbatim(" ")?;
    w.nstr(location)
}

/// Write a body structure.
///
/// `extended` selects the `BODYSTRUCTURE` form over the `BODY` form.
pub fn write_body_structure<W: Write>(
    w: &mut LexWriter<W>,
    body: &BodyStructure,
    extended: bool,
) -> io::Result<()> {
    w.verbatim("(")?;
    match *body {
        BodyStructure::Multipart(ref multi) => {
            for part in &multi.parts {
                write_body_structure(w, part, extended)?;
            }
            w.verbatim(" ")?;
            w.string(multi.subtype.as_bytes())?;
            if extended {
                w.verbatim(" ")?;
                write_params(w, &multi.params)?;
                write_extension(
                    w,
                    &multi.disposition,
                    &multi.language,
                    &multi.location,
                )?;
            }
        }

        BodyStructure::Single(ref single) => {
            w.string(single.media_type.as_bytes())?;
            w.verbatim(" ")?;
            w.string(single.subtype.as_bytes())?;
            w.verbatim(" ")?;
            write_params(w, &single.params)?;
            w.verbatim(" ")?;
            w.nstr(&single.id)?;
            w.verbatim(" ")?;
            w.nstr(&single.description)?;
            w.verbatim(" ")?;
            w.string(single.encoding.as_bytes())?;
            w.verbatim(" ")?;
            w.num(single.size_octets)?;

            match single.kind {
                SinglePartKind::Basic => (),
                SinglePartKind::Text { lines } => {
                    w.verbatim(" ")?;
                    w.num(lines)?;
                }
                SinglePartKind::Message {
                    ref envelope,
                    ref body,
                    lines,
                } => {
                    w.verbatim(" ")?;
                    write_envelope(w, envelope)?;
                    w.verbatim(" ")?;
                    write_body_structure(w, body, extended)?;
                    w.verbatim(" ")?;
                    w.num(lines)?;
                }
            }

            if extended {
                w.verbatim(" ")?;
                w.nstr(&single.md5)?;
                write_extension(
                    w,
                    &single.disposition,
                    &single.language,
                    &single.location,
                )?;
            }
        }
    }
    w.verbatim(")")
}

/// Write the thread list of a THREAD response.
pub fn write_threads<W: Write>(
    w: &mut LexWriter<W>,
    threads: &[ThreadNode],
) -> io::Result<()> {
    fn members<W: Write>(
        w: &mut LexWriter<W>,
        node: &ThreadNode,
    ) -> io::Result<()> {
        w.num(node.id)?;
        match node.children.len() {
            0 => Ok(()),
            1 => {
                w.verbatim(" ")?;
                members(w, &node.children[0])
            }
            _ => {
                w.verbatim(" ")?;
                for child in &node.children {
                    w.verbatim("(")?;
                    members(w, child)?;
                    w.verbatim(")")?;
                }
                Ok(())
            }
        }
    }

    for thread in threads {
        w.verbatim("(")?;
        members(w, thread)?;
        w.verbatim(")")?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn render(
        f: impl FnOnce(&mut LexWriter<Vec<u8>>) -> io::Result<()>,
    ) -> String {
        let mut w = LexWriter::new(Vec::new());
        f(&mut w).unwrap();
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn completions() {
        let mut out = Vec::new();
        Completion::ok().write_to(&mut out, "a1", "NOOP").unwrap();
        Completion::no("Mailbox does not exist")
            .write_to(&mut out, "a2", "SELECT")
            .unwrap();
        Completion::bad(Template::MissingArgument)
            .write_to(&mut out, "a3", "FETCH")
            .unwrap();
        Completion::no_code(RespCode::TryCreate, "Mailbox does not exist")
            .write_to(&mut out, "a4", "COPY")
            .unwrap();
        Completion::ok_code(RespCode::CopyUid(
            7,
            SeqRange::range(1, 3),
            SeqRange::range(10, 12),
        ))
        .write_to(&mut out, "a5", "COPY")
        .unwrap();
        assert_eq!(
            "a1 OK NOOP completed\r\n\
             a2 NO SELECT failed: Mailbox does not exist\r\n\
             a3 BAD Missing or invalid argument to FETCH\r\n\
             a4 NO [TRYCREATE] COPY failed: Mailbox does not exist\r\n\
             a5 OK [COPYUID 7 1:3 10:12] COPY completed\r\n",
            String::from_utf8(out).unwrap()
        );

        assert_eq!(
            "PERMANENTFLAGS (\\Seen \\Deleted \\*)",
            RespCode::PermanentFlags(vec![Flag::Seen, Flag::Deleted], true)
                .to_string()
        );
    }

    #[test]
    fn envelopes() {
        let env = Envelope {
            date: Some("Mon, 3 Feb 2020 04:05:06 +0000".to_owned()),
            subject: Some("Quote \" me".to_owned()),
            from: vec![Address::Real(RealAddress {
                display_name: Some("Bob".to_owned()),
                routing: None,
                local_part: "bob".to_owned(),
                domain: "example.com".to_owned(),
            })],
            to: vec![
                Address::GroupDelim(Some("team".to_owned())),
                Address::GroupDelim(None),
            ],
            ..Envelope::default()
        };

        assert_eq!(
            "(\"Mon, 3 Feb 2020 04:05:06 +0000\" {10}\r\nQuote \" me \
             ((\"Bob\" NIL \"bob\" \"example.com\")) NIL NIL \
             ((NIL NIL \"team\" NIL)(NIL NIL NIL NIL)) NIL NIL NIL NIL)",
            render(|w| write_envelope(w, &env))
        );
    }

    #[test]
    fn body_structures() {
        let text = |subtype: &str, size, lines| {
            BodyStructure::Single(SinglePartBody {
                media_type: "TEXT".to_owned(),
                subtype: subtype.to_owned(),
                params: vec![("CHARSET".to_owned(), "utf-8".to_owned())],
                id: None,
                description: None,
                encoding: "7BIT".to_owned(),
                size_octets: size,
                kind: SinglePartKind::Text { lines },
                md5: None,
                disposition: None,
                language: None,
                location: None,
            })
        };
        let body = BodyStructure::Multipart(MultipartBody {
            parts: vec![text("PLAIN", 10, 1), text("HTML", 20, 2)],
            subtype: "ALTERNATIVE".to_owned(),
            params: vec![("BOUNDARY".to_owned(), "xyz".to_owned())],
            disposition: Some(Disposition {
                kind: "INLINE".to_owned(),
                params: vec![],
            }),
            language: None,
            location: None,
        });

        assert_eq!(
            "((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\") NIL NIL \"7BIT\" \
             10 1)(\"TEXT\" \"HTML\" (\"CHARSET\" \"utf-8\") NIL NIL \
             \"7BIT\" 20 2) \"ALTERNATIVE\")",
            render(|w| write_body_structure(w, &body, false))
        );
        assert_eq!(
            "((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\") NIL NIL \"7BIT\" \
             10 1 NIL NIL NIL NIL)(\"TEXT\" \"HTML\" (\"CHARSET\" \"utf-8\") \
             NIL NIL \"7BIT\" 20 2 NIL NIL NIL NIL) \"ALTERNATIVE\" \
             (\"BOUNDARY\" \"xyz\") (\"INLINE\" NIL) NIL NIL)",
            render(|w| write_body_structure(w, &body, true))
        );
    }

    #[test]
    fn threads() {
        let threads = vec![
            ThreadNode::leaf(2),
            ThreadNode {
                id: 3,
                children: vec![ThreadNode {
                    id: 6,
                    children: vec![
                        ThreadNode {
                            id: 4,
                            children: vec![ThreadNode::leaf(23)],
                        },
                        ThreadNode {
                            id: 44,
                            children: vec![ThreadNode {
                                id: 7,
                                children: vec![ThreadNode::leaf(96)],
                            }],
                        },
                    ],
                }],
            },
        ];
        assert_eq!(
            "(2)(3 6 (4 23)(44 7 96))",
            render(|w| write_threads(w, &threads))
        );
    }

    #[test]
    fn flag_lists() {
        assert_eq!("()", render(|w| write_flags(w, &[], false)));
        assert_eq!("(\\Recent)", render(|w| write_flags(w, &[], true)));
        assert_eq!(
            "(\\Seen $Junk \\Recent)",
            render(|w| write_flags(
                w,
                &[Flag::Seen, Flag::Keyword("$Junk".to_owned())],
                true
            ))
        );
    }
}
