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

use regex::Regex;

use super::defs::*;
use crate::imap::server::SessionEnd;
use crate::support::sysexits::*;

/// Deliver messages with the given subjects, make them non-recent, and
/// select INBOX.
fn with_messages(name: &str, subjects: &[&str]) -> (Setup, Client) {
    let setup = set_up();
    for subject in subjects {
        setup.deliver(&[], subject);
    }
    setup.claim_recent();
    let client = setup.selected(name, "INBOX");
    (setup, client)
}

#[test]
fn fetch_flags() {
    let setup = set_up();
    setup.deliver(&[Flag::Seen], "hello");
    setup.claim_recent();
    let mut client = setup.selected("fetchflags", "INBOX");

    assert_eq!(
        vec!["* 1 FETCH (FLAGS (\\Seen))", "a003 OK FETCH completed"],
        client.command("a003 FETCH 1 (FLAGS)")
    );
}

#[test]
fn fetch_body_sets_seen() {
    let (_setup, mut client) = with_messages("fetchbody", &["unread"]);

    let responses = client.ok("a1 FETCH 1 BODY.PEEK[HEADER.FIELDS (SUBJECT)]");
    assert_eq!(
        "* 1 FETCH (BODY[HEADER.FIELDS (SUBJECT)] {19}\r\n\
         Subject: unread\r\n\r\n)",
        responses[0]
    );

    let responses = client.ok("a2 FETCH 1 BODY[]");
    assert_eq!(2, responses.len());
    assert!(responses[0].starts_with("* 1 FETCH (BODY[] {"));
    assert!(responses[0].contains("\r\nSubject: unread\r\n"));
    assert!(responses[0].ends_with("Body of unread\r\n FLAGS (\\Seen))"));

    // Already seen, so the flags aren't repeated
    let responses = client.ok("a3 FETCH 1 BODY[TEXT]");
    assert_eq!(
        vec![
            "* 1 FETCH (BODY[TEXT] {16}\r\nBody of unread\r\n)".to_owned(),
            "a3 OK FETCH completed".to_owned(),
        ],
        responses
    );
}

#[test]
fn fetch_macros_and_uid() {
    let (_setup, mut client) = with_messages("fetchmacro", &["one", "two"]);

    let responses = client.ok("a1 FETCH 2 FAST");
    assert!(responses[0].starts_with("* 2 FETCH (INTERNALDATE \""));
    assert!(responses[0].contains(" RFC822.SIZE "));
    assert!(responses[0].ends_with(" FLAGS ())"));

    let responses = client.ok("a2 FETCH 1 ENVELOPE");
    assert!(responses[0].starts_with(
        "* 1 FETCH (ENVELOPE (\"Fri, 16 Oct 2026 12:00:00 +0000\" \"one\" "
    ));

    assert_eq!(
        vec!["* 2 FETCH (UID 2 FLAGS ())", "a3 OK UID FETCH completed"],
        client.command("a3 UID FETCH 2:* (FLAGS)")
    );
    // Nonexistent UIDs are ignored
    assert_eq!(
        vec!["a4 OK UID FETCH completed"],
        client.command("a4 UID FETCH 100 (FLAGS)")
    );
}

#[test]
fn fetch_bad_sequence_sets() {
    let (setup, mut client) = with_messages("fetchbad", &["one", "two"]);
    let calls = setup.store.calls();

    assert_eq!(
        vec!["a1 NO Invalid message sequence number in FETCH"],
        client.command("a1 FETCH 3 (FLAGS)")
    );
    assert_eq!(
        vec!["a2 BAD [PARSE] Invalid sequence set: 1::2"],
        client.command("a2 FETCH 1::2 (FLAGS)")
    );
    assert_eq!(
        vec!["a3 BAD Missing or invalid argument to FETCH"],
        client.command("a3 FETCH x (FLAGS)")
    );
    assert_eq!(
        vec!["a4 BAD Missing or invalid argument to FETCH"],
        client.command("a4 FETCH 1 (FLAGS BOGUS)")
    );
    assert_eq!(calls, setup.store.calls());

    // Ranges may be given backwards
    let responses = client.ok("a5 FETCH 2:1 (UID)");
    assert_eq!("* 1 FETCH (UID 1)", responses[0]);
    assert_eq!("* 2 FETCH (UID 2)", responses[1]);
}

#[test]
fn fetch_never_interrupted_by_status_updates() {
    let (setup, mut client) = with_messages("quell", &["one", "two"]);
    setup.store.deliver_during_fetch("INBOX", &message("three"));

    let responses = client.ok("a1 FETCH 1:2 (FLAGS)");
    let first = find(&responses, "* 1 FETCH ").unwrap();
    let exists = find(&responses, "* 3 EXISTS").unwrap();
    let second = find(&responses, "* 2 FETCH ").unwrap();
    assert!(first < exists, "{:#?}", responses);
    assert!(exists < second, "{:#?}", responses);
    for response in &responses {
        if response.contains(" FETCH (") {
            assert!(response.ends_with(')'), "{:#?}", responses);
        }
    }

    client.ok("a2 LOGOUT");
    let finished = client.finish();
    let (begins, ends) = finished.quell_counts;
    assert_eq!(2, begins);
    assert_eq!(begins, ends);
}

#[test]
fn fetch_skips_message_expunged_mid_fetch() {
    let (setup, mut client) =
        with_messages("fetchexpunge", &["one", "two", "three"]);
    setup.store.expunge_during_fetch("INBOX", 2);

    // Sequence numbers must not move while the FETCH is running
    assert_eq!(
        vec![
            "* 1 FETCH (FLAGS ())",
            "* 3 FETCH (FLAGS ())",
            "a1 OK FETCH completed",
        ],
        client.command("a1 FETCH 1:3 (FLAGS)")
    );
    assert_eq!(
        vec!["* 2 EXPUNGE", "a2 OK NOOP completed"],
        client.command("a2 NOOP")
    );

    // UID FETCH may report the expunge, but only after the FETCH lines
    setup.store.expunge_during_fetch("INBOX", 3);
    assert_eq!(
        vec![
            "* 1 FETCH (UID 1 FLAGS ())",
            "* 2 EXPUNGE",
            "a3 OK UID FETCH completed",
        ],
        client.command("a3 UID FETCH 1:* (FLAGS)")
    );

    client.ok("a4 LOGOUT");
    let (begins, ends) = client.finish().quell_counts;
    assert_eq!(begins, ends);
}

#[test]
fn search_subject() {
    let subjects = [
        "one", "two", "hello", "four", "five", "six", "Hello world", "eight",
    ];
    let (_setup, mut client) = with_messages("search", &subjects);

    assert_eq!(
        vec!["* SEARCH 3 7", "a004 OK SEARCH completed"],
        client.command("a004 SEARCH SUBJECT \"hello\"")
    );
    assert_eq!(
        vec!["* SEARCH 3 7", "a005 OK UID SEARCH completed"],
        client.command("a005 UID SEARCH CHARSET UTF-8 SUBJECT hello")
    );
    assert_eq!(
        vec!["* SEARCH 1 2 4 5 6 8", "a006 OK SEARCH completed"],
        client.command("a006 SEARCH NOT SUBJECT hello")
    );
    assert_eq!(
        vec!["* SEARCH", "a007 OK SEARCH completed"],
        client.command("a007 SEARCH SUBJECT nothing")
    );
    assert_eq!(
        vec![
            "a008 NO [BADCHARSET (US-ASCII UTF-8)] \
             SEARCH failed: Unsupported character set"
        ],
        client.command("a008 SEARCH CHARSET KOI8-R ALL")
    );
    let responses = client.command("a009 SEARCH BOGUS");
    assert_tagged(&responses, "BAD");
}

#[test]
fn uid_search_after_expunge() {
    let (setup, mut client) =
        with_messages("uidsearch", &["one", "two", "three"]);
    setup.store.expunge_externally("INBOX", 1).unwrap();

    assert_eq!(
        vec!["* 1 EXPUNGE", "a1 OK NOOP completed"],
        client.command("a1 NOOP")
    );
    assert_eq!(
        vec!["* SEARCH 1 2", "a2 OK SEARCH completed"],
        client.command("a2 SEARCH ALL")
    );
    assert_eq!(
        vec!["* SEARCH 2 3", "a3 OK UID SEARCH completed"],
        client.command("a3 UID SEARCH ALL")
    );
    assert_eq!(
        vec!["* SEARCH 3", "a4 OK UID SEARCH completed"],
        client.command("a4 UID SEARCH UID 3:*")
    );
}

#[test]
fn sort_and_thread() {
    let (_setup, mut client) =
        with_messages("sort", &["charlie", "alpha", "bravo", "Re: alpha"]);

    assert_eq!(
        vec!["* SORT 2 4 3 1", "a1 OK SORT completed"],
        client.command("a1 SORT (SUBJECT) UTF-8 ALL")
    );
    assert_eq!(
        vec!["* SORT 1 3 2 4", "a2 OK SORT completed"],
        client.command("a2 SORT (REVERSE SUBJECT) UTF-8 ALL")
    );

    let responses = client.ok("a3 THREAD ORDEREDSUBJECT UTF-8 ALL");
    assert!(responses[0].starts_with("* THREAD ("), "{:#?}", responses);

    let responses = client.command("a4 SORT (SUBJECT) KOI8-R ALL");
    assert_tagged(&responses, "NO");
}

#[test]
fn store_flags() {
    let (_setup, mut client) = with_messages("store", &["one", "two"]);

    assert_eq!(
        vec!["* 1 FETCH (FLAGS (\\Flagged))", "a1 OK STORE completed"],
        client.command("a1 STORE 1 +FLAGS (\\Flagged)")
    );
    assert_eq!(
        vec![
            "* 1 FETCH (FLAGS (\\Flagged \\Seen))",
            "* 2 FETCH (FLAGS (\\Seen))",
            "a2 OK STORE completed",
        ],
        client.command("a2 STORE 1:2 +FLAGS (\\Seen)")
    );
    assert_eq!(
        vec!["a3 OK STORE completed"],
        client.command("a3 STORE 1 -FLAGS.SILENT (\\Flagged)")
    );
    assert_eq!(
        vec!["* 2 FETCH (UID 2 FLAGS ($Junk))", "a4 OK UID STORE completed"],
        client.command("a4 UID STORE 2 FLAGS ($Junk)")
    );
    assert_eq!(
        vec!["* 1 FETCH (FLAGS (\\Seen))", "a5 OK FETCH completed"],
        client.command("a5 FETCH 1 FLAGS")
    );
}

#[test]
fn external_flag_changes_reported() {
    let (setup, mut client) = with_messages("extflags", &["one"]);
    setup
        .store
        .set_flags_externally("INBOX", 1, &[Flag::Answered])
        .unwrap();

    assert_eq!(
        vec!["* 1 FETCH (FLAGS (\\Answered))", "a1 OK NOOP completed"],
        client.command("a1 NOOP")
    );
}

#[test]
fn expunge_held_back_while_sequence_numbers_matter() {
    let (setup, mut client) =
        with_messages("holdback", &["one", "two", "three"]);
    setup.store.expunge_externally("INBOX", 3).unwrap();

    // STORE learns about the expunge but may not report it
    assert_eq!(
        vec!["a1 OK STORE completed"],
        client.command("a1 STORE 1 +FLAGS.SILENT (\\Flagged)")
    );
    assert_eq!(
        vec!["* SEARCH 1", "a2 OK SEARCH completed"],
        client.command("a2 SEARCH FLAGGED")
    );
    assert_eq!(
        vec!["* 3 EXPUNGE", "a3 OK NOOP completed"],
        client.command("a3 NOOP")
    );
}

#[test]
fn sequence_numbers_stable_after_external_expunge() {
    let (setup, mut client) =
        with_messages("stableseq", &["one", "two", "three"]);
    setup.store.expunge_externally("INBOX", 1).unwrap();

    assert_eq!(
        vec!["* 2 FETCH (FLAGS (\\Flagged))", "a1 OK STORE completed"],
        client.command("a1 STORE 2 +FLAGS (\\Flagged)")
    );
    assert_eq!(
        vec!["* 2 FETCH (UID 2 FLAGS (\\Flagged))", "a2 OK FETCH completed"],
        client.command("a2 FETCH 2 (UID FLAGS)")
    );
    assert_eq!(
        vec!["* 3 FETCH (UID 3 FLAGS ())", "a3 OK FETCH completed"],
        client.command("a3 FETCH 3 (UID FLAGS)")
    );
    // The message is gone, but its number is still reserved
    assert_eq!(
        vec!["a4 OK FETCH completed"],
        client.command("a4 FETCH 1 (FLAGS)")
    );
    assert_eq!(
        vec!["* SEARCH 2", "a5 OK SEARCH completed"],
        client.command("a5 SEARCH FLAGGED")
    );

    assert_eq!(
        vec!["* 1 EXPUNGE", "a6 OK NOOP completed"],
        client.command("a6 NOOP")
    );
    assert_eq!(
        vec!["* SEARCH 1", "a7 OK SEARCH completed"],
        client.command("a7 SEARCH FLAGGED")
    );
    assert_eq!(
        vec!["* 2 FETCH (UID 3 FLAGS ())", "a8 OK UID FETCH completed"],
        client.command("a8 UID FETCH 3 (FLAGS)")
    );
}

#[test]
fn expunge_close_and_unselect() {
    let (setup, mut client) =
        with_messages("expunge", &["one", "two", "three"]);

    client.ok("a1 STORE 1:3 +FLAGS.SILENT (\\Deleted)");
    assert_eq!(
        vec!["* 2 EXPUNGE", "a2 OK UID EXPUNGE completed"],
        client.command("a2 UID EXPUNGE 2")
    );
    client.ok("a3 STORE 2 -FLAGS.SILENT (\\Deleted)");
    assert_eq!(
        vec!["* 1 EXPUNGE", "a3 OK EXPUNGE completed"],
        client.command("a3 EXPUNGE")
    );

    // The remaining message stays deleted but UNSELECT doesn't expunge
    client.ok("a4 STORE 1 +FLAGS.SILENT (\\Deleted)");
    assert_eq!(
        vec!["a5 OK UNSELECT completed"],
        client.command("a5 UNSELECT")
    );
    let responses = client.ok("a6 STATUS INBOX (MESSAGES)");
    assert_eq!("* STATUS INBOX (MESSAGES 1)", responses[0]);

    client.ok("a7 SELECT INBOX");
    assert_eq!(
        vec!["a8 OK CLOSE completed"],
        client.command("a8 CLOSE")
    );
    let responses = client.ok("a9 STATUS INBOX (MESSAGES)");
    assert_eq!("* STATUS INBOX (MESSAGES 0)", responses[0]);
    assert!(setup.store.calls() > 0);

    assert_eq!(
        vec!["b1 BAD Command unrecognized: EXPUNGE"],
        client.command("b1 EXPUNGE")
    );
}

#[test]
fn read_only_mailbox() {
    let setup = set_up();
    setup.deliver(&[], "one");
    setup.claim_recent();
    let mut client = setup.logged_in("readonly");
    client.ok("a1 EXAMINE INBOX");

    assert_eq!(
        vec!["a2 NO STORE failed: Mailbox is read-only"],
        client.command("a2 STORE 1 +FLAGS (\\Seen)")
    );
    // No implicit \Seen either
    let responses = client.ok("a3 FETCH 1 BODY[TEXT]");
    assert!(!responses[0].contains("FLAGS"));
    assert_eq!(
        vec!["* 1 FETCH (FLAGS ())", "a4 OK FETCH completed"],
        client.command("a4 FETCH 1 FLAGS")
    );
}

#[test]
fn copy_reports_uids() {
    let (setup, mut client) = with_messages("copy", &["one", "two"]);
    client.ok("a1 CREATE Archive");

    let responses = client.ok("a2 COPY 1:2 Archive");
    let copyuid =
        Regex::new(r"^a2 OK \[COPYUID [0-9]+ 1:2 1:2\] COPY completed$")
            .unwrap();
    assert!(copyuid.is_match(&responses[0]), "{:#?}", responses);

    let responses = client.ok("a3 UID COPY 2 Archive");
    let copyuid =
        Regex::new(r"^a3 OK \[COPYUID [0-9]+ 2 3\] UID COPY completed$")
            .unwrap();
    assert!(copyuid.is_match(&responses[0]), "{:#?}", responses);

    assert_eq!(
        vec!["a4 NO [TRYCREATE] COPY failed: Mailbox does not exist"],
        client.command("a4 COPY 1 Nowhere")
    );

    let responses = client.ok("a5 STATUS Archive (MESSAGES)");
    assert_eq!("* STATUS Archive (MESSAGES 3)", responses[0]);
    assert!(setup.store.calls() > 0);
}

#[test]
fn storage_failures() {
    let (setup, mut client) = with_messages("diskerr", &["one"]);

    // A failure that might corrupt the mailbox is retried
    setup.store.fail_next_write(true);
    client.ok("a1 STORE 1 +FLAGS.SILENT (\\Flagged)");

    setup.store.fail_next_write(false);
    let responses = client.command("a2 STORE 1 +FLAGS.SILENT (\\Seen)");
    assert_eq!(1, responses.len(), "{:#?}", responses);
    assert!(responses[0].starts_with("a2 NO STORE failed: "));
    assert_eq!(
        "* BYE Disk error: Simulated write failure",
        client.read_line()
    );
    client.expect_eof();

    let end = client.finish().end.unwrap();
    assert_matches!(SessionEnd::Fatal(_), end);
    assert_eq!(EX_IOERR, end.exit_code());
}

#[test]
fn disk_error_text_survives_later_failures() {
    let (setup, mut client) = with_messages("diskerrcopy", &["one"]);
    client.ok("a1 CREATE Archive");

    setup.store.fail_next_write(false);
    let responses = client.command("a2 COPY 1 Archive");
    assert_eq!(
        vec!["a2 NO COPY failed: Fatal mailbox error: Simulated write failure"],
        responses
    );
    assert_eq!(
        "* BYE Disk error: Simulated write failure",
        client.read_line()
    );
    client.expect_eof();

    assert_eq!(
        SessionEnd::Fatal("Disk error: Simulated write failure".to_owned()),
        client.finish().end.unwrap()
    );
}
