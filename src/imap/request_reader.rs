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

use std::io::{self, Read, Write};
use std::ops::Range;
use std::os::unix::io::AsRawFd;
use std::str;
use std::time::Instant;

use lazy_static::lazy_static;
use memchr::memchr;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::socket::{shutdown, Shutdown};
use regex::bytes::Regex;

use crate::support::error::Error;
use crate::support::interrupt::Interrupts;
use crate::support::system_config::LimitConfig;

lazy_static! {
    static ref LITERAL_AT_EOL: Regex =
        Regex::new(r#"\{([0-9]+)(\+?)\}\r?\n$"#).unwrap();
    static ref APPEND_START: Regex =
        Regex::new(r#"(?i-u)^[^ ]+ APPEND "#).unwrap();
}

/// A complete command as received from the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCommand {
    /// The full text of the command without its final line ending.
    ///
    /// Literals appear in place, each still preceded by its `{N}` header and
    /// a CRLF, so the grammar parsers see exactly what the client sent.
    pub text: Vec<u8>,
    /// Where the content of each literal lies within `text`.
    pub literals: Vec<Range<usize>>,
}

#[derive(Debug)]
pub enum ReadOutcome {
    Command(RawCommand),
    /// The command line exceeded the limit and has been skipped through the
    /// next line feed.
    TooLong,
    /// A literal could not be accepted. Nothing after its header has been
    /// consumed.
    LiteralRefused {
        tag: String,
        error: Error,
        /// If false, the client is already sending the literal, so the
        /// stream can no longer be resynchronised.
        synchronising: bool,
    },
}

/// Reads requests from the client under a deadline.
///
/// Waiting uses `poll()` on the underlying descriptor, so anything with a
/// file descriptor can be used, including the process's standard input.
pub struct RequestReader<R> {
    io: R,
    /// Bytes received but not yet consumed.
    buf: Vec<u8>,
    interrupts: Interrupts,
}

impl<R: Read + AsRawFd> RequestReader<R> {
    pub fn new(io: R, interrupts: Interrupts) -> Self {
        RequestReader {
            io,
            buf: Vec::new(),
            interrupts,
        }
    }

    /// Read one complete command, including any literals.
    ///
    /// Continuation prompts for synchronising literals are written to
    /// `prompt`.
    pub fn read_command(
        &mut self,
        deadline: Option<Instant>,
        limits: &LimitConfig,
        prompt: &mut dyn Write,
    ) -> Result<ReadOutcome, Error> {
        let mut text = Vec::new();
        let mut literals = Vec::new();
        let mut line_bytes = 0usize;

        loop {
            let max = limits.max_command_line.saturating_sub(line_bytes);
            let line = match self.read_line(deadline, max)? {
                Some(line) => line,
                None => return Ok(ReadOutcome::TooLong),
            };
            line_bytes += line.len();

            let header = LITERAL_AT_EOL.captures(&line).map(|c| {
                let len = str::from_utf8(&c[1])
                    .ok()
                    .and_then(|s| s.parse::<u32>().ok());
                (len, !c[2].is_empty())
            });
            text.extend_from_slice(strip_eol(&line));

            let (len, plus) = match header {
                None => {
                    return Ok(ReadOutcome::Command(RawCommand {
                        text,
                        literals,
                    }))
                }
                Some(header) => header,
            };

            let limit = if APPEND_START.is_match(&text) {
                limits.max_append_literal
            } else {
                limits.max_literal
            };

            let refusal = if literals.len() >= limits.max_literals_per_command
            {
                Some(Error::TooManyLiterals)
            } else {
                match len {
                    Some(len) if len <= limit => None,
                    _ => Some(Error::LiteralTooLarge(
                        len.unwrap_or(u32::MAX),
                        limit,
                    )),
                }
            };

            if let Some(error) = refusal {
                return Ok(ReadOutcome::LiteralRefused {
                    tag: tag_of(&text),
                    error,
                    synchronising: !plus,
                });
            }

            if !plus {
                prompt.write_all(b"+ go\r\n")?;
                prompt.flush()?;
            }

            let len = len.unwrap_or(0) as usize;
            text.extend_from_slice(b"\r\n");
            let start = text.len();
            self.read_literal(len, deadline, &mut text)?;
            literals.push(start..text.len());
        }
    }

    /// Read one line, including its line ending, of at most `max` bytes.
    ///
    /// Returns `Ok(None)` if the line was too long, in which case it has been
    /// discarded through the next line feed.
    pub fn read_line(
        &mut self,
        deadline: Option<Instant>,
        max: usize,
    ) -> Result<Option<Vec<u8>>, Error> {
        let mut scanned = 0;
        loop {
            if let Some(ix) = memchr(b'\n', &self.buf[scanned..]) {
                let end = scanned + ix + 1;
                let line = self.buf.drain(..end).collect::<Vec<u8>>();
                return Ok(if line.len() > max { None } else { Some(line) });
            }

            scanned = self.buf.len();
            if scanned > max {
                self.discard_line(deadline)?;
                return Ok(None);
            }

            self.fill(deadline)?;
        }
    }

    fn discard_line(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<(), Error> {
        loop {
            if let Some(ix) = memchr(b'\n', &self.buf) {
                self.buf.drain(..=ix);
                return Ok(());
            }

            self.buf.clear();
            self.fill(deadline)?;
        }
    }

    fn read_literal(
        &mut self,
        len: usize,
        deadline: Option<Instant>,
        into: &mut Vec<u8>,
    ) -> Result<(), Error> {
        let mut remaining = len;
        loop {
            let take = remaining.min(self.buf.len());
            into.extend(self.buf.drain(..take));
            remaining -= take;
            if 0 == remaining {
                return Ok(());
            }

            self.fill(deadline)?;
        }
    }

    fn fill(&mut self, deadline: Option<Instant>) -> Result<(), Error> {
        let mut chunk = [0u8; 4096];
        loop {
            self.wait_readable(deadline)?;
            match self.io.read(&mut chunk) {
                Ok(0) => return Err(Error::Eof),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(e) if io::ErrorKind::Interrupted == e.kind() => {
                    self.check_interrupt()?
                }
                Err(e) if io::ErrorKind::WouldBlock == e.kind() => (),
                Err(e) if io::ErrorKind::TimedOut == e.kind() => {
                    return Err(Error::TimedOut)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn wait_readable(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<(), Error> {
        loop {
            self.check_interrupt()?;

            let timeout_ms = match deadline {
                None => -1,
                Some(deadline) => {
                    millis_until(deadline).ok_or(Error::TimedOut)?
                }
            };

            let mut fds =
                [PollFd::new(self.io.as_raw_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, timeout_ms) {
                // Timed out; the next iteration notices the deadline
                Ok(0) => (),
                Ok(_) => return Ok(()),
                Err(nix::Error::Sys(Errno::EINTR)) => (),
                Err(nix::Error::Sys(errno)) => {
                    return Err(Error::Io(io::Error::from_raw_os_error(
                        errno as i32,
                    )))
                }
                Err(e) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::Other,
                        e.to_string(),
                    )))
                }
            }
        }
    }

    /// Stop sending to the client, then throw away whatever it sends until
    /// it closes its side or `deadline` passes.
    ///
    /// Closing a socket with unread input resets the connection, which can
    /// destroy the last responses before the client reads them.
    pub fn hang_up(&mut self, deadline: Instant) {
        // Fails harmlessly if the descriptor is not a socket
        let _ = shutdown(self.io.as_raw_fd(), Shutdown::Write);
        self.buf.clear();

        let mut chunk = [0u8; 4096];
        while let Some(timeout_ms) = millis_until(deadline) {
            let mut fds =
                [PollFd::new(self.io.as_raw_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, timeout_ms) {
                Ok(0) => return,
                Ok(_) => (),
                Err(nix::Error::Sys(Errno::EINTR)) => continue,
                Err(_) => return,
            }

            match self.io.read(&mut chunk) {
                Ok(0) => return,
                Ok(_) => (),
                Err(e) if io::ErrorKind::Interrupted == e.kind() => (),
                Err(e) if io::ErrorKind::WouldBlock == e.kind() => (),
                Err(_) => return,
            }
        }
    }

    fn check_interrupt(&self) -> Result<(), Error> {
        match self.interrupts.check() {
            Some(kind) => Err(Error::Interrupted(kind)),
            None => Ok(()),
        }
    }
}

/// The `poll()` timeout for `deadline`, or `None` if it has passed.
fn millis_until(deadline: Instant) -> Option<nix::libc::c_int> {
    let now = Instant::now();
    if now >= deadline {
        None
    } else {
        Some(
            (deadline - now).as_millis().max(1).min(i32::MAX as u128)
                as nix::libc::c_int,
        )
    }
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn tag_of(text: &[u8]) -> String {
    let end = memchr(b' ', text).unwrap_or_else(|| text.len());
    String::from_utf8_lossy(&text[..end]).into_owned()
}
