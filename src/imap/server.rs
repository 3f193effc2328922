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

use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::command_processor::{CommandProcessor, Interaction};
use super::request_reader::{ReadOutcome, RequestReader};
use super::sasl::{self, Negotiation, SaslError, Step};
use crate::support::error::Error;
use crate::support::interrupt::{InterruptKind, Interrupts, Timer, TimerKind};
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

/// How long to wait for the client to go away after ending a session.
const HANG_UP_GRACE: Duration = Duration::from_secs(5);

/// How a session came to an end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent LOGOUT.
    LoggedOut,
    /// The client went away without logging out.
    Disconnected,
    /// An interrupt or the autologout timer ended the session.
    Interrupted(InterruptKind),
    /// The client broke the protocol in a way that cannot be recovered.
    ProtocolViolation,
    /// The mail store failed irrecoverably.
    Fatal(String),
}

impl SessionEnd {
    pub fn exit_code(&self) -> Sysexit {
        match *self {
            SessionEnd::LoggedOut | SessionEnd::Disconnected => EX_OK,
            SessionEnd::Interrupted(_) => EX_TEMPFAIL,
            SessionEnd::ProtocolViolation => EX_PROTOCOL,
            SessionEnd::Fatal(_) => EX_IOERR,
        }
    }
}

/// Drives one IMAP session over a byte stream.
///
/// The server owns the transport: it reads requests, hands them to the
/// `CommandProcessor`, sends the responses, and carries out the
/// interactions (literal prompts, IDLE, AUTHENTICATE) which need more
/// input before a command can complete.
pub struct Server<R, W> {
    reader: RequestReader<R>,
    write: W,
    processor: CommandProcessor,
    config: Arc<SystemConfig>,
    timer: Timer,
}

impl<R: Read + AsRawFd, W: Write> Server<R, W> {
    pub fn new(
        read: R,
        write: W,
        processor: CommandProcessor,
        config: Arc<SystemConfig>,
        interrupts: Interrupts,
    ) -> Self {
        Server {
            reader: RequestReader::new(read, interrupts),
            write,
            processor,
            config,
            timer: Timer::default(),
        }
    }

    pub fn processor(&self) -> &CommandProcessor {
        &self.processor
    }

    /// Run the session to completion.
    ///
    /// Returns `Err` only if the transport itself fails.
    pub fn run(&mut self) -> Result<SessionEnd, Error> {
        info!("{} Connection established", self.processor.log_prefix());
        let greeting = self.processor.greet();
        self.send(&greeting)?;

        loop {
            match self.step() {
                Ok(Some(end)) => return Ok(end),
                Ok(None) => (),
                Err(Error::TimedOut) => {
                    info!("{} Autologout", self.processor.log_prefix());
                    return self.abort(InterruptKind::IdleTimeout);
                }
                Err(Error::Interrupted(kind)) => {
                    info!(
                        "{} Interrupted: {}",
                        self.processor.log_prefix(),
                        kind
                    );
                    return self.abort(kind);
                }
                Err(Error::Eof) => {
                    warn!(
                        "{} Client disconnected without LOGOUT",
                        self.processor.log_prefix()
                    );
                    self.processor.shutdown();
                    return Ok(SessionEnd::Disconnected);
                }
                Err(e) => {
                    warn!(
                        "{} Connection failed: {}",
                        self.processor.log_prefix(),
                        e
                    );
                    self.processor.shutdown();
                    return Err(e);
                }
            }
        }
    }

    /// Process one command.
    ///
    /// Returns the reason the session ended, if it did.
    fn step(&mut self) -> Result<Option<SessionEnd>, Error> {
        let timeout = if self.processor.is_authenticated() {
            self.config.timeouts.autologout()
        } else {
            self.config.timeouts.login()
        };
        self.timer.arm(TimerKind::Autologout, timeout);

        let outcome = self.reader.read_command(
            self.timer.deadline(),
            &self.config.limits,
            &mut self.write,
        )?;

        match outcome {
            ReadOutcome::TooLong => {
                self.send(b"* BAD Command line too long\r\n")?;
            }
            ReadOutcome::LiteralRefused {
                tag,
                error,
                synchronising: true,
            } => {
                self.send(format!("{} BAD {}\r\n", tag, error).as_bytes())?;
            }
            ReadOutcome::LiteralRefused {
                error,
                synchronising: false,
                ..
            } => {
                // The literal is already on its way and can't be skipped
                self.send(format!("* BYE {}\r\n", error).as_bytes())?;
                self.processor.shutdown();
                self.reader.hang_up(Instant::now() + HANG_UP_GRACE);
                return Ok(Some(SessionEnd::ProtocolViolation));
            }
            ReadOutcome::Command(raw) => {
                let mut out = Vec::new();
                let interaction = self.processor.handle_command(&raw, &mut out);
                self.send(&out)?;

                match interaction {
                    Interaction::None => (),
                    Interaction::Idle { tag } => self.idle(&tag)?,
                    Interaction::Authenticate {
                        tag,
                        negotiation,
                        initial_response,
                    } => {
                        self.authenticate(&tag, negotiation, initial_response)?
                    }
                }
            }
        }

        if self.processor.logged_out() {
            Ok(Some(match self.processor.fatal() {
                Some(why) => SessionEnd::Fatal(why.to_owned()),
                None => SessionEnd::LoggedOut,
            }))
        } else {
            Ok(None)
        }
    }

    fn idle(&mut self, tag: &str) -> Result<(), Error> {
        self.send(b"+ idling\r\n")?;

        let autologout = Instant::now() + self.config.timeouts.autologout();
        loop {
            let now = Instant::now();
            let idle_poll = self.config.timeouts.idle_poll();
            if now + idle_poll < autologout {
                self.timer.arm(TimerKind::IdlePoll, idle_poll);
            } else {
                self.timer.arm(
                    TimerKind::Autologout,
                    autologout.saturating_duration_since(now),
                );
            }

            let max = self.config.limits.max_command_line;
            match self.reader.read_line(self.timer.deadline(), max) {
                Ok(line) => {
                    let line = line.unwrap_or_default();
                    let out = self.processor.idle_done(tag, trim_eol(&line));
                    return self.send(&out);
                }
                Err(Error::TimedOut) => {
                    match self.timer.fired(Instant::now()) {
                        Some(TimerKind::IdlePoll) => (),
                        _ => return Err(Error::TimedOut),
                    }

                    let out = self.processor.idle_poll();
                    self.send(&out)?;
                    if self.processor.logged_out() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn authenticate(
        &mut self,
        tag: &str,
        mut negotiation: Negotiation,
        initial_response: Option<Vec<u8>>,
    ) -> Result<(), Error> {
        let deadline = self.timer.deadline();
        let mut challenge = negotiation.first_challenge();
        let mut next = initial_response;

        let outcome = loop {
            let response = match next.take() {
                Some(response) => response,
                None => {
                    let prompt = format!(
                        "+ {}\r\n",
                        sasl::encode_challenge(challenge)
                    );
                    self.send(prompt.as_bytes())?;

                    let max = self.config.limits.max_command_line;
                    let line = self.reader.read_line(deadline, max)?;
                    let decoded = match line {
                        Some(line) => sasl::decode_response(trim_eol(&line)),
                        None => Err(SaslError::BadEncoding),
                    };
                    match decoded {
                        Ok(response) => response,
                        Err(e) => break Err(e),
                    }
                }
            };

            match negotiation.step(&response) {
                Ok(Step::Challenge(c)) => challenge = c,
                Ok(Step::Done(credentials)) => break Ok(credentials),
                Err(e) => break Err(e),
            }
        };

        let out = self.processor.authenticate_finish(tag, outcome);
        self.send(&out)
    }

    /// End the session because of `kind`, telling the client why if the
    /// transport still works.
    fn abort(&mut self, kind: InterruptKind) -> Result<SessionEnd, Error> {
        if InterruptKind::Hangup != kind {
            let bye = format!("* BYE {}\r\n", kind.bye_text());
            let _ = self.send(bye.as_bytes());
        }
        self.processor.shutdown();
        self.reader.hang_up(Instant::now() + HANG_UP_GRACE);
        Ok(SessionEnd::Interrupted(kind))
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }

        self.write.write_all(data)?;
        self.write.flush()?;
        Ok(())
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
