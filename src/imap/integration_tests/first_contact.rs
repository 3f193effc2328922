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

#[test]
fn greeting_advertises_capabilities() {
    let setup = set_up();
    let mut client = setup.connect("greeting");

    let greeting = client.greeting();
    assert!(greeting.starts_with("* OK [CAPABILITY IMAP4rev1 "));
    assert!(greeting.contains(" LITERAL+ "));
    assert!(greeting.contains(" AUTH=PLAIN"));
    assert!(!greeting.contains("LOGINDISABLED"));
    assert!(greeting.ends_with("IMAP4rev1 server ready"));
}

#[test]
fn commands_in_any_state() {
    let setup = set_up();
    let mut client = setup.connect("anystate");
    client.greeting();

    let responses = client.ok("a1 CAPABILITY");
    assert_eq!(2, responses.len());
    assert!(responses[0].starts_with("* CAPABILITY IMAP4rev1 "));
    assert_eq!("a1 OK CAPABILITY completed", responses[1]);

    assert_eq!(vec!["a2 OK NOOP completed"], client.ok("a2 NOOP"));

    let responses = client.command("a3 NOOP extra");
    assert_eq!(
        vec!["a3 BAD Argument given to NOOP when none expected"],
        responses
    );
}

#[test]
fn logout_says_bye_first() {
    let setup = set_up();
    let mut client = setup.connect("logout");
    client.greeting();

    let responses = client.ok("a1 LOGOUT");
    assert_eq!(2, responses.len());
    assert!(responses[0].starts_with("* BYE "));
    assert_eq!("a1 OK LOGOUT completed", responses[1]);
    client.expect_eof();

    let finished = client.finish();
    let end = finished.end.unwrap();
    assert_eq!(SessionEnd::LoggedOut, end);
    assert_eq!(EX_OK, end.exit_code());
}

#[test]
fn unknown_and_malformed_commands() {
    let setup = set_up();
    let mut client = setup.connect("unknown");
    client.greeting();

    assert_eq!(
        vec!["a1 BAD Command unrecognized: FROBNICATE"],
        client.command("a1 FROBNICATE")
    );
    assert_eq!(
        vec!["a2 BAD Command unrecognized: UID NOOP"],
        client.command("a2 UID NOOP")
    );

    // The session is still usable
    client.ok("a3 NOOP");
}

#[test]
fn overlong_command_line() {
    let mut setup = set_up();
    setup.config.limits.max_command_line = 64;
    let mut client = setup.logged_in("overlong");
    let calls = setup.store.calls();

    let long = format!("a1 SELECT {}", "x".repeat(200));
    client.send(&long);
    assert_eq!("* BAD Command line too long", client.read_line());
    assert_eq!(calls, setup.store.calls());

    client.ok("a2 NOOP");
}

#[test]
fn login_timeout() {
    let mut setup = set_up();
    setup.config.timeouts.login_secs = 1;
    let mut client = setup.connect("timeout");
    client.greeting();

    let bye = client.read_line();
    assert!(bye.starts_with("* BYE Autologout"), "Got {}", bye);
    client.expect_eof();

    let end = client.finish().end.unwrap();
    assert_eq!(SessionEnd::Interrupted(InterruptKind::IdleTimeout), end);
    assert_eq!(EX_TEMPFAIL, end.exit_code());
}

#[test]
fn client_hangs_up() {
    let setup = set_up();
    setup.deliver(&[], "hello");
    let mut client = setup.selected("hangup", "INBOX");
    client.write_raw(b"a1 NOO");

    let end = client.finish().end.unwrap();
    assert_eq!(SessionEnd::Disconnected, end);
    assert_eq!(EX_OK, end.exit_code());
}
