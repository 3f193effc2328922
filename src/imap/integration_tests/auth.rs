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

#[test]
fn login_reports_capabilities() {
    let setup = set_up();
    let mut client = setup.connect("login");
    client.greeting();

    let responses = client.ok("a001 LOGIN azure hunter2");
    assert_eq!(1, responses.len());
    let tagged = &responses[0];
    assert!(tagged.starts_with("a001 OK [CAPABILITY IMAP4rev1 "));
    assert!(tagged.ends_with("] User azure authenticated"));
    // Authentication mechanisms are no longer of interest
    assert!(!tagged.contains("AUTH="));

    // LOGIN is only valid before authentication
    assert_eq!(
        vec!["a002 BAD Command unrecognized: LOGIN"],
        client.command("a002 LOGIN azure hunter2")
    );
}

#[test]
fn login_with_quoted_and_literal_arguments() {
    let setup = set_up();
    let mut client = setup.connect("loginlit");
    client.greeting();

    client.send("a1 LOGIN \"azure\" {7}");
    assert_eq!("+ go", client.read_line());
    client.send("hunter2");
    let responses = client.read_until_tagged("a1");
    assert_tagged(&responses, "OK");
}

#[test]
fn login_rejects_bad_credentials() {
    let setup = set_up();
    let mut client = setup.connect("badlogin");
    client.greeting();

    assert_eq!(
        vec!["a1 NO LOGIN failed: Bad user id or password"],
        client.command("a1 LOGIN azure hunter3")
    );
    assert_eq!(
        vec!["a2 NO LOGIN failed: Bad user id or password"],
        client.command("a2 LOGIN nobody hunter2")
    );
    assert_eq!(
        vec!["a3 BAD Missing or invalid argument to LOGIN"],
        client.command("a3 LOGIN azure")
    );
    assert_eq!(0, setup.store.calls());

    client.ok("a4 LOGIN azure hunter2");
}

#[test]
fn plaintext_can_be_disabled() {
    let mut setup = set_up();
    setup.config.security.disable_plaintext = true;
    let mut client = setup.connect("noplain");

    let greeting = client.greeting();
    assert!(greeting.contains(" LOGINDISABLED"));
    assert!(!greeting.contains("AUTH=PLAIN"));

    let responses = client.command("a1 LOGIN azure hunter2");
    assert_tagged(&responses, "NO");
    let responses = client.command("a2 AUTHENTICATE PLAIN");
    assert_tagged(&responses, "NO");
}

#[test]
fn authenticate_plain_with_initial_response() {
    let setup = set_up();
    let mut client = setup.connect("saslir");
    client.greeting();

    let ir = base64::encode(b"\0azure\0hunter2");
    let responses = client.ok(&format!("a1 AUTHENTICATE PLAIN {}", ir));
    assert!(responses[0].starts_with("a1 OK [CAPABILITY "));

    client.ok("a2 SELECT INBOX");
}

#[test]
fn authenticate_plain_with_challenge() {
    let setup = set_up();
    let mut client = setup.connect("plain");
    client.greeting();

    client.send("a1 AUTHENTICATE PLAIN");
    assert_eq!("+ ", client.read_line());
    client.send(&base64::encode(b"\0azure\0hunter2"));
    let responses = client.read_until_tagged("a1");
    assert_tagged(&responses, "OK");
}

#[test]
fn authenticate_login() {
    let setup = set_up();
    let mut client = setup.connect("saslogin");
    client.greeting();

    client.send("a1 AUTHENTICATE LOGIN");
    assert_eq!(
        format!("+ {}", base64::encode(b"Username:")),
        client.read_line()
    );
    client.send(&base64::encode(USER));
    assert_eq!(
        format!("+ {}", base64::encode(b"Password:")),
        client.read_line()
    );
    client.send(&base64::encode("wrong"));
    assert_eq!(
        vec!["a1 NO AUTHENTICATE failed: Bad user id or password"],
        client.read_until_tagged("a1")
    );
}

#[test]
fn authenticate_cancel_and_garbage() {
    let setup = set_up();
    let mut client = setup.connect("cancel");
    client.greeting();

    client.send("a1 AUTHENTICATE PLAIN");
    assert_eq!("+ ", client.read_line());
    client.send("*");
    assert_eq!(
        vec!["a1 BAD AUTHENTICATE cancelled"],
        client.read_until_tagged("a1")
    );

    client.send("a2 AUTHENTICATE PLAIN");
    assert_eq!("+ ", client.read_line());
    client.send("!!not base64!!");
    let responses = client.read_until_tagged("a2");
    assert!(responses[0].starts_with("a2 BAD [PARSE] "));

    assert_eq!(
        vec!["a3 NO AUTHENTICATE failed: Unsupported authentication mechanism"],
        client.command("a3 AUTHENTICATE GSSAPI")
    );

    // Still not logged in
    assert_eq!(
        vec!["a4 BAD Command unrecognized: SELECT"],
        client.command("a4 SELECT INBOX")
    );
}

#[test]
fn anonymous_login_when_permitted() {
    let setup = set_up();
    let mut client = setup.connect("noanon");
    let greeting = client.greeting();
    assert!(!greeting.contains("AUTH=ANONYMOUS"));
    let ir = base64::encode(b"tester@example.com");
    let responses =
        client.command(&format!("a1 AUTHENTICATE ANONYMOUS {}", ir));
    assert_tagged(&responses, "NO");

    let mut setup = set_up();
    setup.config.security.allow_anonymous = true;
    let mut client = setup.connect("anon");
    let greeting = client.greeting();
    assert!(greeting.contains("AUTH=ANONYMOUS"));
    let responses =
        client.ok(&format!("a1 AUTHENTICATE ANONYMOUS {}", ir));
    assert!(responses[0].ends_with("User anonymous authenticated"));
}

#[test]
fn referral_after_login() {
    let mut setup = set_up();
    setup.config.policy.login_referral =
        Some("imap://azure@other.example/".to_owned());
    let mut client = setup.connect("referral");
    client.greeting();

    let responses = client.ok("a1 LOGIN azure hunter2");
    assert_eq!(2, responses.len());
    assert_eq!(
        "* OK [REFERRAL imap://azure@other.example/] \
         Mailbox available at another server",
        responses[0]
    );
}

#[test]
fn starttls_is_refused() {
    let setup = set_up();
    let mut client = setup.connect("notls");
    client.greeting();
    assert_eq!(
        vec!["a1 BAD STARTTLS not available"],
        client.command("a1 STARTTLS")
    );

    let mut setup = set_up();
    setup.config.security.starttls_available = true;
    let mut client = setup.connect("tls");
    assert!(client.greeting().contains(" STARTTLS"));
    let responses = client.command("a1 STARTTLS");
    assert_tagged(&responses, "NO");
}
