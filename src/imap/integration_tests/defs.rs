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

use std::io::{BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::imap::command_processor::CommandProcessor;
use crate::imap::server::{Server, SessionEnd};
use crate::store::memory::MemoryStore;
use crate::support::error::Error;
use crate::support::interrupt::Interrupts;
use crate::support::log_prefix::LogPrefix;
use crate::support::passwd::{hash_password, PasswordTable};
use crate::support::system_config::SystemConfig;

pub use crate::store::Flag;

pub const USER: &str = "azure";
pub const PASSWORD: &str = "hunter2";

lazy_static! {
    // Hashing is slow, so every test shares one hash
    static ref PASSWORD_HASH: String =
        hash_password(PASSWORD.as_bytes()).unwrap();
    static ref LITERAL_AT_EOL: Regex =
        Regex::new(r#"~?\{([0-9]+)\}\r\n$"#).unwrap();
}

/// A store and configuration from which sessions can be started.
pub struct Setup {
    pub store: MemoryStore,
    pub config: SystemConfig,
}

pub fn set_up() -> Setup {
    crate::init_test_log();

    let mut config = SystemConfig::default();
    config
        .users
        .insert(USER.to_owned(), PASSWORD_HASH.clone());

    Setup {
        store: MemoryStore::new(),
        config,
    }
}

/// What the server thread reports once the session is over.
pub struct Finished {
    pub end: Result<SessionEnd, Error>,
    pub quell_counts: (u64, u64),
}

impl Setup {
    /// Start a new session. The greeting has not been read.
    pub fn connect(&self, name: &str) -> Client {
        let (client_sock, server_sock) = UnixStream::pair().unwrap();
        client_sock
            .set_read_timeout(Some(Duration::from_secs(15)))
            .unwrap();

        let store = self.store.clone();
        let config = Arc::new(self.config.clone());
        let interrupts = Interrupts::new();
        let server_interrupts = interrupts.clone();
        let name = name.to_owned();

        let server = thread::spawn(move || {
            let processor = CommandProcessor::new(
                LogPrefix::new("imap", name),
                Arc::clone(&config),
                Arc::new(store),
                Arc::new(PasswordTable::new(config.users.clone())),
                server_interrupts.clone(),
            );
            let read = server_sock.try_clone().unwrap();
            let mut server = Server::new(
                read,
                server_sock,
                processor,
                config,
                server_interrupts,
            );
            let end = server.run();
            Finished {
                end,
                quell_counts: server.processor().quell_counts(),
            }
        });

        Client {
            reader: BufReader::new(client_sock.try_clone().unwrap()),
            writer: client_sock,
            interrupts,
            server: Some(server),
        }
    }

    /// Start a session and log in.
    pub fn logged_in(&self, name: &str) -> Client {
        let mut client = self.connect(name);
        client.greeting();
        client.ok(&format!("L LOGIN {} {}", USER, PASSWORD));
        client
    }

    /// Start a session, log in, and select `mailbox`.
    pub fn selected(&self, name: &str, mailbox: &str) -> Client {
        let mut client = self.logged_in(name);
        client.ok(&format!("S SELECT {}", mailbox));
        client
    }

    /// Deliver a simple message with the given subject to INBOX.
    pub fn deliver(&self, flags: &[Flag], subject: &str) -> u32 {
        self.store
            .deliver("INBOX", flags, &message(subject))
            .unwrap()
    }

    /// Have another session select INBOX so that nothing there is recent
    /// any more.
    pub fn claim_recent(&self) {
        let mut client = self.selected("claim", "INBOX");
        client.ok("Z LOGOUT");
        client.finish();
    }
}

pub fn message(subject: &str) -> Vec<u8> {
    format!(
        "From: Sender <sender@example.com>\r\n\
         To: Recipient <azure@example.com>\r\n\
         Subject: {}\r\n\
         Date: Fri, 16 Oct 2026 12:00:00 +0000\r\n\
         \r\n\
         Body of {}\r\n",
        subject, subject
    )
    .into_bytes()
}

/// The client end of a session.
pub struct Client {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    pub interrupts: Interrupts,
    server: Option<JoinHandle<Finished>>,
}

impl Client {
    pub fn write_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).unwrap();
    }

    /// Send `line` followed by CRLF.
    pub fn send(&mut self, line: &str) {
        self.write_raw(format!("{}\r\n", line).as_bytes());
    }

    /// Read one response line without its line ending.
    ///
    /// Literals within the response are read along with it.
    pub fn read_line(&mut self) -> String {
        let mut line = Vec::new();
        loop {
            let start = line.len();
            let n = self.reader.read_until(b'\n', &mut line).unwrap();
            assert!(
                n > 0,
                "Unexpected EOF after {:?}",
                String::from_utf8_lossy(&line)
            );

            let len = LITERAL_AT_EOL.captures(&line[start..]).and_then(|c| {
                std::str::from_utf8(&c[1]).ok()?.parse::<usize>().ok()
            });
            match len {
                Some(len) => {
                    let mut literal = vec![0u8; len];
                    self.reader.read_exact(&mut literal).unwrap();
                    line.extend_from_slice(&literal);
                }
                None => break,
            }
        }

        while line.ends_with(b"\n") || line.ends_with(b"\r") {
            line.pop();
        }
        String::from_utf8_lossy(&line).into_owned()
    }

    pub fn greeting(&mut self) -> String {
        let greeting = self.read_line();
        assert!(greeting.starts_with("* OK "), "Bad greeting: {}", greeting);
        greeting
    }

    /// Read responses up to and including the tagged response for `tag`.
    pub fn read_until_tagged(&mut self, tag: &str) -> Vec<String> {
        let prefix = format!("{} ", tag);
        let mut lines = Vec::new();
        loop {
            let line = self.read_line();
            let done = line.starts_with(&prefix);
            lines.push(line);
            if done {
                return lines;
            }
        }
    }

    /// Read responses until one starts with `prefix`.
    pub fn read_until_prefix(&mut self, prefix: &str) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line();
            let done = line.starts_with(prefix);
            lines.push(line);
            if done {
                return lines;
            }
        }
    }

    /// Send a complete command line and return every response to it.
    pub fn command(&mut self, line: &str) -> Vec<String> {
        let tag = line.split(' ').next().unwrap_or("").to_owned();
        self.send(line);
        self.read_until_tagged(&tag)
    }

    /// Like `command()`, but asserts that the command succeeded.
    pub fn ok(&mut self, line: &str) -> Vec<String> {
        let responses = self.command(line);
        assert_tagged(&responses, "OK");
        responses
    }

    /// Read everything the server sends until it closes the connection.
    pub fn read_rest(&mut self) -> String {
        let mut rest = Vec::new();
        self.reader.read_to_end(&mut rest).unwrap();
        String::from_utf8_lossy(&rest).into_owned()
    }

    /// Assert that the server has closed the connection.
    pub fn expect_eof(&mut self) {
        let rest = self.read_rest();
        assert!(rest.is_empty(), "Expected EOF, got {:?}", rest);
    }

    /// Close our side of the connection and wait for the server to finish.
    pub fn finish(mut self) -> Finished {
        let _ = self.writer.shutdown(Shutdown::Write);
        self.server.take().unwrap().join().unwrap()
    }
}

/// Assert that the last response is tagged with the given condition.
pub fn assert_tagged(responses: &[String], cond: &str) {
    let last = responses.last().map(String::as_str).unwrap_or("");
    let mut parts = last.splitn(3, ' ');
    parts.next();
    assert_eq!(
        Some(cond),
        parts.next(),
        "Unexpected responses: {:#?}",
        responses
    );
}

/// The index of the first response starting with `prefix`.
pub fn find(responses: &[String], prefix: &str) -> Option<usize> {
    responses.iter().position(|r| r.starts_with(prefix))
}

pub fn has(responses: &[String], prefix: &str) -> bool {
    find(responses, prefix).is_some()
}
