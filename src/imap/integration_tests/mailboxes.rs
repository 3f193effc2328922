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
fn select_reports_mailbox_state() {
    let setup = set_up();
    setup.deliver(&[Flag::Seen], "first");
    setup.deliver(&[], "second");
    let mut client = setup.logged_in("select");

    let responses = client.ok("a002 SELECT INBOX");
    assert_eq!("* 2 EXISTS", responses[0]);
    assert_eq!("* 2 RECENT", responses[1]);
    assert!(responses[2].starts_with("* FLAGS (\\Answered "));
    assert!(has(&responses, "* OK [UNSEEN 2] "));
    assert!(has(&responses, "* OK [UIDVALIDITY 1] "));
    assert!(has(&responses, "* OK [UIDNEXT 3] "));
    assert!(has(&responses, "* OK [PERMANENTFLAGS ("));
    assert_eq!(
        "a002 OK [READ-WRITE] SELECT completed",
        responses.last().unwrap()
    );

    // Another session sees the messages as no longer recent
    let mut other = setup.logged_in("select2");
    let responses = other.ok("a1 EXAMINE INBOX");
    assert_eq!("* 0 RECENT", responses[1]);
    assert!(has(&responses, "* OK [PERMANENTFLAGS ()] "));
    assert_eq!(
        "a1 OK [READ-ONLY] EXAMINE completed",
        responses.last().unwrap()
    );
}

#[test]
fn select_failure_leaves_nothing_selected() {
    let setup = set_up();
    let mut client = setup.selected("selfail", "INBOX");

    assert_eq!(
        vec!["a1 NO SELECT failed: Mailbox does not exist"],
        client.command("a1 SELECT Nowhere")
    );
    assert_eq!(
        vec!["a2 BAD Command unrecognized: CHECK"],
        client.command("a2 CHECK")
    );
}

#[test]
fn empty_mailbox_notice_follows_policy() {
    let setup = set_up();
    let mut client = setup.logged_in("quiet");
    let responses = client.ok("a1 SELECT INBOX");
    assert!(!has(&responses, "* OK Mailbox is empty"));

    let mut setup = set_up();
    setup.config.policy.suppress_empty_mailbox_warning = false;
    let mut client = setup.logged_in("chatty");
    let responses = client.ok("a1 SELECT INBOX");
    assert!(has(&responses, "* OK Mailbox is empty"));
}

#[test]
fn create_rename_delete() {
    let setup = set_up();
    let mut client = setup.logged_in("crud");

    client.ok("a1 CREATE Archive/2026");
    assert_eq!(
        vec!["a2 NO CREATE failed: Mailbox already exists"],
        client.command("a2 CREATE Archive/2026")
    );

    let responses = client.ok("a3 LIST \"\" \"*\"");
    for expected in &[
        "* LIST (\\HasNoChildren) \"/\" INBOX",
        "* LIST (\\HasChildren) \"/\" Archive",
        "* LIST (\\HasNoChildren) \"/\" Archive/2026",
    ] {
        assert!(
            responses.iter().any(|r| r == expected),
            "Missing {} in {:#?}",
            expected,
            responses
        );
    }

    let responses = client.ok("a4 LIST \"\" \"\"");
    assert_eq!("* LIST (\\Noselect) \"/\" \"\"", responses[0]);

    client.ok("a5 RENAME Archive/2026 Archive/Old");
    let responses = client.ok("a6 LIST Archive/ %");
    assert_eq!(
        vec![
            "* LIST (\\HasNoChildren) \"/\" Archive/Old".to_owned(),
            "a6 OK LIST completed".to_owned(),
        ],
        responses
    );

    client.ok("a7 DELETE Archive/Old");
    let responses = client.command("a8 DELETE Archive/Old");
    assert_tagged(&responses, "NO");
    let responses = client.command("a9 DELETE INBOX");
    assert_tagged(&responses, "NO");
}

#[test]
fn subscriptions() {
    let setup = set_up();
    let mut client = setup.logged_in("lsub");

    client.ok("a1 CREATE Lists");
    client.ok("a2 SUBSCRIBE Lists");
    let responses = client.ok("a3 LSUB \"\" *");
    assert!(has(&responses, "* LSUB "));
    assert!(responses[0].ends_with(" Lists"));

    client.ok("a4 UNSUBSCRIBE Lists");
    let responses = client.ok("a5 LSUB \"\" *");
    assert_eq!(1, responses.len());
}

#[test]
fn status_of_unselected_mailbox() {
    let setup = set_up();
    setup.deliver(&[Flag::Seen], "read");
    setup.deliver(&[], "unread");
    let mut client = setup.logged_in("status");

    let responses = client.ok("a1 STATUS INBOX (MESSAGES UNSEEN UIDNEXT)");
    assert_eq!(
        "* STATUS INBOX (MESSAGES 2 UNSEEN 1 UIDNEXT 3)",
        responses[0]
    );

    assert_eq!(
        vec!["a2 BAD Missing or invalid argument to STATUS"],
        client.command("a2 STATUS INBOX (BOGUS)")
    );
    let responses = client.command("a3 STATUS Nowhere (MESSAGES)");
    assert_tagged(&responses, "NO");
}

#[test]
fn namespace() {
    let setup = set_up();
    let mut client = setup.logged_in("namespace");
    let responses = client.ok("a1 NAMESPACE");
    assert_eq!("* NAMESPACE ((\"\" \"/\")) NIL NIL", responses[0]);
}
