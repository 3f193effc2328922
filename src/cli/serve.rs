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
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use log::{error, info, warn};
use nix::sys::time::TimeValLike;

use crate::imap::command_processor::CommandProcessor;
use crate::imap::server::Server;
use crate::store::memory::MemoryStore;
use crate::support::interrupt::{install_signal_handlers, Interrupts};
use crate::support::log_prefix::LogPrefix;
use crate::support::passwd::PasswordTable;
use crate::support::system_config::SystemConfig;

const STDIN: RawFd = 0;
const STDOUT: RawFd = 1;

// Need to use a this and not die! so that errors go to syslog/etc
macro_rules! fatal {
    ($ex:ident, $($stuff:tt)*) => {{
        error!($($stuff)*);
        crate::support::sysexits::$ex.exit()
    }}
}

pub fn imap(system_config: SystemConfig) {
    let system_config = Arc::new(system_config);

    match (nix::unistd::isatty(STDIN), nix::unistd::isatty(STDOUT)) {
        (Ok(true), _) | (_, Ok(true)) => {
            // In this case, we *do* want to use die!() since we're on a
            // terminal.
            die!(EX_USAGE, "stdin and stdout must not be a terminal")
        }
        _ => (),
    }

    if let Err(e) = install_signal_handlers() {
        fatal!(EX_OSERR, "Unable to install signal handlers: {}", e);
    }

    let peer_name = configure_socket();
    let interrupts = Interrupts::new();
    let processor = CommandProcessor::new(
        LogPrefix::new("imap", peer_name),
        Arc::clone(&system_config),
        Arc::new(MemoryStore::new()),
        Arc::new(PasswordTable::new(system_config.users.clone())),
        interrupts.clone(),
    );
    let log_prefix = processor.log_prefix().clone();

    let mut server = Server::new(
        Stdio,
        io::BufWriter::new(Stdio),
        processor,
        system_config,
        interrupts,
    );

    match server.run() {
        Ok(end) => {
            info!("{} Session ended: {:?}", log_prefix, end);
            end.exit_code().exit()
        }
        Err(e) => {
            fatal!(EX_IOERR, "{} Abnormal client disconnect: {}", log_prefix, e)
        }
    }
}

fn configure_socket() -> String {
    // stdio is often a pipe when testing by hand
    let mut peer_name = match nix::sys::socket::getpeername(STDIN) {
        Ok(addr) => addr.to_string(),
        Err(e) => {
            warn!("Unable to determine peer name: {}", e);
            "stdio".to_owned()
        }
    };

    // On FreeBSD, getpeername() on a UNIX socket returns "@\0", which breaks
    // syslog if we log that.
    if peer_name.contains('\0') {
        peer_name = "unknown-socket".to_owned();
    }

    // The session enforces its own idle timeouts; these only catch a
    // transport which has stalled outright.
    if let Err(e) = nix::sys::socket::setsockopt(
        STDOUT,
        nix::sys::socket::sockopt::SendTimeout,
        &nix::sys::time::TimeVal::minutes(30),
    ) {
        warn!("{} Unable to configure timeouts: {}", peer_name, e);
    }

    // It is not unusual for stdio to be UNIX sockets instead of TCP, so don't
    // complain if setting TCP_NODELAY fails.
    let _ = nix::sys::socket::setsockopt(
        STDOUT,
        nix::sys::socket::sockopt::TcpNoDelay,
        &true,
    );

    peer_name
}

// Read and write to the stdio FDs without buffering
#[derive(Debug)]
struct Stdio;

impl Read for Stdio {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(STDIN, buf).map_err(nix_to_io)
    }
}

impl Write for Stdio {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        nix::unistd::write(STDOUT, buf).map_err(nix_to_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for Stdio {
    fn as_raw_fd(&self) -> RawFd {
        STDIN
    }
}

fn nix_to_io(e: nix::Error) -> io::Error {
    match e.as_errno() {
        Some(errno) => io::Error::from_raw_os_error(errno as i32),
        None => io::Error::new(io::ErrorKind::Other, e),
    }
}
