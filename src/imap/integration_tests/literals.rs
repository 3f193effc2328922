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

use super::defs::*;
use crate::imap::server::SessionEnd;
use crate::support::sysexits::*;

#[test]
fn synchronising_append() {
    let setup = set_up();
    let mut client = setup.logged_in("syncappend");
    let data = message("appended");

    client.send(&format!("a1 APPEND INBOX (\\Seen) {{{}}}", data.len()));
    assert_eq!("+ go", client.read_line());
    client.write_raw(&data);
    client.send("");
    assert_eq!(
        vec!["a1 OK [APPENDUID 1 1] APPEND completed"],
        client.read_until_tagged("a1")
    );

    let responses = client.ok("a2 SELECT INBOX");
    assert_eq!("* 1 EXISTS", responses[0]);
    assert_eq!(
        vec!["* 1 FETCH (FLAGS (\\Seen \\Recent))", "a3 OK FETCH completed"],
        client.command("a3 FETCH 1 FLAGS")
    );
}

#[test]
fn non_synchronising_append() {
    let setup = set_up();
    let mut client = setup.selected("literalplus", "INBOX");

    let mut command =
        b"a1 APPEND INBOX \"16-Oct-2026 12:00:00 +0000\" {5+}\r\n".to_vec();
    command.extend_from_slice(b"hello\r\n");
    client.write_raw(&command);

    // No continuation line, and the new message is reported right away
    let responses = client.read_until_tagged("a1");
    assert!(!has(&responses, "+"), "{:#?}", responses);
    assert!(has(&responses, "* 1 EXISTS"), "{:#?}", responses);
    assert_eq!(
        "a1 OK [APPENDUID 1 1] APPEND completed",
        responses.last().unwrap()
    );

    assert_eq!(
        vec![
            "* 1 FETCH (INTERNALDATE \"16-Oct-2026 12:00:00 +0000\" \
             BODY[] \"hello\")",
            "a2 OK FETCH completed",
        ],
        client.command("a2 FETCH 1 (INTERNALDATE BODY.PEEK[])")
    );
}

#[test]
fn append_to_missing_mailbox() {
    let setup = set_up();
    let mut client = setup.logged_in("appendmissing");

    client.write_raw(b"a1 APPEND Nowhere {5+}\r\nhello\r\n");
    assert_eq!(
        vec!["a1 NO [TRYCREATE] APPEND failed: Mailbox does not exist"],
        client.read_until_tagged("a1")
    );

    client.ok("a2 CREATE Nowhere");
    client.write_raw(b"a3 APPEND Nowhere {5+}\r\nhello\r\n");
    let responses = client.read_until_tagged("a3");
    assert_tagged(&responses, "OK");
}

#[test]
fn oversized_synchronising_literal_is_refused() {
    let mut setup = set_up();
    setup.config.limits.max_append_literal = 10;
    let mut client = setup.logged_in("biglit");
    let calls = setup.store.calls();

    client.send("a1 APPEND INBOX {100}");
    let responses = client.read_until_tagged("a1");
    assert_eq!(1, responses.len(), "{:#?}", responses);
    assert!(responses[0].starts_with("a1 BAD "));
    assert_eq!(calls, setup.store.calls());

    // The client never sent the literal, so the session carries on
    client.ok("a2 NOOP");
    client.send("a3 APPEND INBOX {10}");
    assert_eq!("+ go", client.read_line());
    client.send("0123456789");
    let responses = client.read_until_tagged("a3");
    assert_tagged(&responses, "OK");
}

#[test]
fn oversized_non_synchronising_literal_ends_session() {
    let mut setup = set_up();
    setup.config.limits.max_literal = 16;
    let mut client = setup.logged_in("biglitplus");

    client.write_raw(b"a1 SELECT {100+}\r\n");
    let bye = client.read_line();
    assert!(bye.starts_with("* BYE "), "Got {}", bye);
    client.expect_eof();

    let end = client.finish().end.unwrap();
    assert_eq!(SessionEnd::ProtocolViolation, end);
    assert_eq!(EX_PROTOCOL, end.exit_code());
}

#[test]
fn literals_in_ordinary_arguments() {
    let setup = set_up();
    let mut client = setup.logged_in("litargs");

    client.write_raw(b"a1 CREATE {10+}\r\nWith Space\r\n");
    let responses = client.read_until_tagged("a1");
    assert_tagged(&responses, "OK");

    let responses = client.ok("a2 LIST \"\" \"With*\"");
    assert_eq!(
        "* LIST (\\HasNoChildren) \"/\" \"With Space\"",
        responses[0]
    );

    client.send("a3 SELECT {10}");
    assert_eq!("+ go", client.read_line());
    client.send("With Space");
    let responses = client.read_until_tagged("a3");
    assert_tagged(&responses, "OK");
}
