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

//! Cooperative handling of timeouts and out-of-band interrupts.
//!
//! Nothing here ever unwinds the command loop directly. Signal handlers only
//! record which interrupt arrived; the server checks for it at safe points
//! (the top of the command loop and after every blocking read) and performs
//! the close-then-exit sequence itself.
//!
//! Storage operations which must not be abandoned half way hold a
//! `CriticalGuard`. While any guard is alive, `Interrupts::check()` reports
//! nothing, so the interrupt is acted on at the first safe point after the
//! guard is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptKind {
    /// No command arrived within the permitted interval.
    IdleTimeout,
    /// Another actor revoked our mailbox or asked us to go away.
    Kill,
    /// The peer hung up.
    Hangup,
    /// The process was asked to terminate.
    Terminate,
}

impl InterruptKind {
    fn encode(self) -> u8 {
        match self {
            InterruptKind::IdleTimeout => 1,
            InterruptKind::Kill => 2,
            InterruptKind::Hangup => 3,
            InterruptKind::Terminate => 4,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(InterruptKind::IdleTimeout),
            2 => Some(InterruptKind::Kill),
            3 => Some(InterruptKind::Hangup),
            4 => Some(InterruptKind::Terminate),
            _ => None,
        }
    }

    /// The text of the `BYE` sent when this interrupt ends the session.
    pub fn bye_text(self) -> &'static str {
        match self {
            InterruptKind::IdleTimeout => "Autologout; idle for too long",
            InterruptKind::Kill => "Killed (lost mailbox lock)",
            InterruptKind::Hangup => "Hangup",
            InterruptKind::Terminate => "Server shutting down",
        }
    }
}

impl fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            InterruptKind::IdleTimeout => write!(f, "autologout"),
            InterruptKind::Kill => write!(f, "kill"),
            InterruptKind::Hangup => write!(f, "hangup"),
            InterruptKind::Terminate => write!(f, "terminate"),
        }
    }
}

// Signal handlers cannot reach anything but statics.
static SIGNALLED: AtomicU8 = AtomicU8::new(0);

extern "C" fn on_signal(signum: nix::libc::c_int) {
    let kind = match signum {
        nix::libc::SIGHUP => InterruptKind::Hangup,
        nix::libc::SIGUSR2 => InterruptKind::Kill,
        _ => InterruptKind::Terminate,
    };
    let _ = SIGNALLED.compare_exchange(
        0,
        kind.encode(),
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
}

/// Install handlers for SIGHUP, SIGTERM, SIGINT and SIGUSR2.
///
/// `SA_RESTART` is deliberately not set so that a blocking read returns
/// `EINTR` and the reader gets a chance to look at the interrupt.
pub fn install_signal_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    for &sig in &[
        Signal::SIGHUP,
        Signal::SIGTERM,
        Signal::SIGINT,
        Signal::SIGUSR2,
    ] {
        // SAFETY: The handler only performs an atomic store.
        unsafe {
            signal::sigaction(sig, &action)?;
        }
    }

    Ok(())
}

struct Shared {
    requested: AtomicU8,
    critical: AtomicUsize,
    deferred: AtomicBool,
}

/// Handle to the interrupt state of one session.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Interrupts {
    shared: Arc<Shared>,
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupts {
    pub fn new() -> Self {
        Interrupts {
            shared: Arc::new(Shared {
                requested: AtomicU8::new(0),
                critical: AtomicUsize::new(0),
                deferred: AtomicBool::new(false),
            }),
        }
    }

    /// Request an interrupt of the given kind.
    ///
    /// The first request wins; later ones are ignored.
    pub fn request(&self, kind: InterruptKind) {
        let _ = self.shared.requested.compare_exchange(
            0,
            kind.encode(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Return the pending interrupt, if any, regardless of critical sections.
    pub fn pending(&self) -> Option<InterruptKind> {
        let signalled = SIGNALLED.load(Ordering::SeqCst);
        if 0 != signalled {
            let _ = self.shared.requested.compare_exchange(
                0,
                signalled,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }

        InterruptKind::decode(self.shared.requested.load(Ordering::SeqCst))
    }

    /// Check for an interrupt at a safe point.
    ///
    /// Returns `None` while a critical section is active, even if an
    /// interrupt is pending; the interrupt is then reported by the first
    /// check after the section ends.
    pub fn check(&self) -> Option<InterruptKind> {
        let pending = self.pending()?;
        if self.in_critical() {
            if !self.shared.deferred.swap(true, Ordering::SeqCst) {
                warn!(
                    "Deferring {} interrupt until critical section ends",
                    pending
                );
            }
            None
        } else {
            Some(pending)
        }
    }

    pub fn in_critical(&self) -> bool {
        self.shared.critical.load(Ordering::SeqCst) > 0
    }

    /// Enter a critical section, which lasts until the guard is dropped.
    pub fn critical(&self) -> CriticalGuard {
        self.shared.critical.fetch_add(1, Ordering::SeqCst);
        CriticalGuard {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Keeps a critical section open while alive.
#[must_use]
pub struct CriticalGuard {
    shared: Arc<Shared>,
}

impl Drop for CriticalGuard {
    fn drop(&mut self) {
        self.shared.critical.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Ends the session when it fires.
    Autologout,
    /// Re-pings the mailbox while in IDLE.
    IdlePoll,
}

/// The single timer of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timer {
    Disarmed,
    Armed { kind: TimerKind, deadline: Instant },
}

impl Default for Timer {
    fn default() -> Self {
        Timer::Disarmed
    }
}

impl Timer {
    pub fn arm(&mut self, kind: TimerKind, after: Duration) {
        *self = Timer::Armed {
            kind,
            deadline: Instant::now() + after,
        };
    }

    pub fn deadline(&self) -> Option<Instant> {
        match *self {
            Timer::Disarmed => None,
            Timer::Armed { deadline, .. } => Some(deadline),
        }
    }

    /// If the timer has fired by `now`, return its kind.
    pub fn fired(&self, now: Instant) -> Option<TimerKind> {
        match *self {
            Timer::Armed { kind, deadline } if now >= deadline => Some(kind),
            _ => None,
        }
    }
}
