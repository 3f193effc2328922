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
fn idle_reports_new_mail() {
    let mut setup = set_up();
    setup.config.timeouts.idle_poll_secs = 1;
    setup.deliver(&[], "one");
    setup.claim_recent();
    let mut client = setup.selected("idle", "INBOX");

    client.send("a1 IDLE");
    assert_eq!("+ idling", client.read_line());

    setup.deliver(&[], "two");
    let responses = client.read_until_prefix("* 2 EXISTS");
    assert_eq!(1, responses.len(), "{:#?}", responses);
    assert_eq!("* 1 RECENT", client.read_line());

    setup.store.expunge_externally("INBOX", 1).unwrap();
    assert_eq!("* 1 EXPUNGE", client.read_line());

    client.send("DONE");
    assert_eq!(
        vec!["a1 OK IDLE completed"],
        client.read_until_tagged("a1")
    );
    client.ok("a2 NOOP");
}

#[test]
fn idle_must_end_with_done() {
    let setup = set_up();
    let mut client = setup.selected("idlebad", "INBOX");

    client.send("a1 IDLE");
    assert_eq!("+ idling", client.read_line());
    client.send("a2 NOOP");
    assert_eq!(
        vec!["a1 BAD IDLE terminated by something other than DONE"],
        client.read_until_tagged("a1")
    );

    client.ok("a3 NOOP");
}

#[test]
fn idle_requires_selected_mailbox() {
    let setup = set_up();
    let mut client = setup.logged_in("idlestate");

    assert_eq!(
        vec!["a1 BAD Command unrecognized: IDLE"],
        client.command("a1 IDLE")
    );
}
