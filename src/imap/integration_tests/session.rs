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
use crate::support::interrupt::InterruptKind;
use crate::support::sysexits::*;

/// Commands which need a logged-in session, with plausible arguments.
static LOGGED_IN_ONLY: &[&str] = &[
    "SELECT INBOX",
    "EXAMINE INBOX",
    "CREATE Stuff",
    "DELETE Stuff",
    "RENAME Stuff Things",
    "SUBSCRIBE Stuff",
    "UNSUBSCRIBE Stuff",
    "LIST \"\" *",
    "LSUB \"\" *",
    "STATUS INBOX (MESSAGES)",
    "APPEND INBOX {1+}",
    "NAMESPACE",
];

/// Commands which need a selected mailbox, with plausible arguments.
static SELECTED_ONLY: &[&str] = &[
    "IDLE",
    "CHECK",
    "CLOSE",
    "UNSELECT",
    "EXPUNGE",
    "SEARCH ALL",
    "SORT (DATE) UTF-8 ALL",
    "THREAD REFERENCES UTF-8 ALL",
    "FETCH 1 FLAGS",
    "STORE 1 +FLAGS (\\Seen)",
    "COPY 1 INBOX",
    "UID FETCH 1 FLAGS",
    "UID STORE 1 +FLAGS (\\Seen)",
    "UID COPY 1 INBOX",
    "UID SEARCH ALL",
    "UID EXPUNGE 1",
];

/// Commands which are only valid before authentication.
static NOT_AUTHENTICATED_ONLY: &[&str] = &[
    "LOGIN azure hunter2",
    "AUTHENTICATE PLAIN",
    "STARTTLS",
];

fn assert_all_rejected(
    setup: &Setup,
    client: &mut Client,
    commands: &[&str],
) {
    let calls = setup.store.calls();
    for (ix, command) in commands.iter().enumerate() {
        let tag = format!("x{}", ix);
        // The literal of APPEND never gets as far as being prompted for
        let line = format!("{} {}", tag, command.trim_end_matches(" {1+}"));
        let name = command
            .split(' ')
            .take(if command.starts_with("UID ") { 2 } else { 1 })
            .collect::<Vec<_>>()
            .join(" ");

        assert_eq!(
            vec![format!("{} BAD Command unrecognized: {}", tag, name)],
            client.command(&line),
            "{} was accepted",
            command
        );
    }
    assert_eq!(calls, setup.store.calls());
}

#[test]
fn commands_gated_by_state() {
    let setup = set_up();
    setup.deliver(&[], "one");

    let mut client = setup.connect("gate");
    client.greeting();
    assert_all_rejected(&setup, &mut client, LOGGED_IN_ONLY);
    assert_all_rejected(&setup, &mut client, SELECTED_ONLY);

    client.ok("a1 LOGIN azure hunter2");
    assert_all_rejected(&setup, &mut client, NOT_AUTHENTICATED_ONLY);
    assert_all_rejected(&setup, &mut client, SELECTED_ONLY);

    client.ok("a2 SELECT INBOX");
    assert_all_rejected(&setup, &mut client, NOT_AUTHENTICATED_ONLY);

    // UID applies only to commands which take message numbers
    assert_all_rejected(
        &setup,
        &mut client,
        &["UID SELECT INBOX", "UID CHECK", "UID CLOSE"],
    );
}

#[test]
fn pipelined_commands() {
    let setup = set_up();
    let mut client = setup.logged_in("pipeline");

    client.write_raw(b"a1 NOOP\r\na2 SELECT INBOX\r\na3 CHECK\r\n");
    assert_eq!(
        vec!["a1 OK NOOP completed"],
        client.read_until_tagged("a1")
    );
    let responses = client.read_until_tagged("a2");
    assert_tagged(&responses, "OK");
    assert_eq!(
        vec!["a3 OK CHECK completed"],
        client.read_until_tagged("a3")
    );
}

#[test]
fn nothing_read_after_logout() {
    let setup = set_up();
    let mut client = setup.selected("afterlogout", "INBOX");

    client.write_raw(b"a1 LOGOUT\r\na2 NOOP\r\n");
    let rest = client.read_rest();
    assert!(rest.contains("\r\na1 OK LOGOUT completed\r\n"), "{:?}", rest);
    assert!(!rest.contains("a2 "), "{:?}", rest);

    assert_eq!(SessionEnd::LoggedOut, client.finish().end.unwrap());
}

#[test]
fn autologout_after_login() {
    let mut setup = set_up();
    setup.config.timeouts.autologout_secs = 1;
    let mut client = setup.selected("autologout", "INBOX");

    let rest = client.read_rest();
    assert!(rest.starts_with("* BYE Autologout"), "{:?}", rest);

    assert_eq!(
        SessionEnd::Interrupted(InterruptKind::IdleTimeout),
        client.finish().end.unwrap()
    );
}

#[test]
fn killed_session_says_bye() {
    let setup = set_up();
    let mut client = setup.selected("killed", "INBOX");

    client.interrupts.request(InterruptKind::Kill);
    // Wake the server up so it notices
    client.send("a1 NOOP");
    let rest = client.read_rest();
    assert!(
        rest.ends_with("* BYE Killed (lost mailbox lock)\r\n"),
        "{:?}",
        rest
    );

    let end = client.finish().end.unwrap();
    assert_eq!(SessionEnd::Interrupted(InterruptKind::Kill), end);
    assert_eq!(EX_TEMPFAIL, end.exit_code());
}

#[test]
fn hangup_closes_silently() {
    let setup = set_up();
    let mut client = setup.selected("hangup", "INBOX");

    client.interrupts.request(InterruptKind::Hangup);
    client.send("a1 NOOP");
    let rest = client.read_rest();
    assert!(!rest.contains("BYE"), "{:?}", rest);

    assert_eq!(
        SessionEnd::Interrupted(InterruptKind::Hangup),
        client.finish().end.unwrap()
    );
}

#[test]
fn sessions_see_each_others_changes() {
    let setup = set_up();
    setup.deliver(&[], "one");
    let mut first = setup.selected("first", "INBOX");
    let mut second = setup.selected("second", "INBOX");

    first.ok("a1 STORE 1 +FLAGS.SILENT (\\Answered)");
    assert_eq!(
        vec!["* 1 FETCH (FLAGS (\\Answered))", "b1 OK NOOP completed"],
        second.command("b1 NOOP")
    );

    second.write_raw(b"b2 APPEND INBOX {5+}\r\nhello\r\n");
    let responses = second.read_until_tagged("b2");
    assert_tagged(&responses, "OK");
    let responses = first.ok("a2 NOOP");
    assert_eq!("* 2 EXISTS", responses[0]);
}
