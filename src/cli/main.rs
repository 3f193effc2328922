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

use std::fs;
use std::io::Read;
use std::mem;
use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Commands to be run on the Kestrel server system.
    Server(ServerSubcommand),
    /// Commands used in the development or testing of Kestrel.
    #[cfg(feature = "dev-tools")]
    Dev(DevSubcommand),
}

#[cfg(feature = "dev-tools")]
#[derive(StructOpt)]
enum DevSubcommand {
    /// Run Kestrel in a scratch environment for testing.
    ///
    /// This subcommand is intended only for use in running IMAP compliance
    /// testers or poking at the server by hand on a developer machine.
    ///
    /// In this mode, Kestrel will listen for TCP connections on port 14143.
    /// All connections will be handled in one process and share a single
    /// in-memory store, unlike the intended production environment, which
    /// starts with a single test user.
    ///
    /// There is no way to configure this.
    ImapTest,
}

#[derive(StructOpt, Default)]
pub(super) struct ServerCommonOptions {
    /// The directory containing `kestrel.toml` etc
    /// [default: /etc/kestrel or /usr/local/etc/kestrel]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,
}

#[derive(StructOpt)]
enum ServerSubcommand {
    /// Serve a single IMAP session over standard IO.
    ///
    /// This is intended to be used with inetd, xinetd, etc. It is the main way
    /// to run Kestrel in production.
    ServeImap(ServerCommonOptions),
    /// Hash a password for the `[users]` table of `kestrel.toml`.
    ///
    /// The password is read from the terminal and the hash is written to
    /// standard output.
    HashPassword,
}

impl ServerSubcommand {
    fn common_options(&mut self) -> ServerCommonOptions {
        match *self {
            ServerSubcommand::ServeImap(ref mut c) => mem::take(c),
            ServerSubcommand::HashPassword => ServerCommonOptions::default(),
        }
    }
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    match cmd {
        #[cfg(feature = "dev-tools")]
        Command::Dev(DevSubcommand::ImapTest) => super::imap_test::imap_test(),
        Command::Server(ServerSubcommand::HashPassword) => {
            super::hash_password::main()
        }
        Command::Server(cmd) => server(cmd),
    }
}

fn server(mut cmd: ServerSubcommand) {
    let common = cmd.common_options();
    let root = common.root.unwrap_or_else(|| {
        if Path::new("/etc/kestrel/kestrel.toml").is_file() {
            "/etc/kestrel".to_owned().into()
        } else if Path::new("/usr/local/etc/kestrel/kestrel.toml").is_file() {
            "/usr/local/etc/kestrel".to_owned().into()
        } else {
            die!(
                EX_CONFIG,
                "Neither /etc/kestrel nor /usr/local/etc/kestrel looks like\n\
                 the Kestrel root; use --root=/path/to/kestrel if your\n\
                 installation is elsewhere."
            )
        }
    });

    let system_config = read_system_config(&root);
    init_logging(&root);

    match cmd {
        ServerSubcommand::ServeImap(_) => super::serve::imap(system_config),
        ServerSubcommand::HashPassword => super::hash_password::main(),
    }
}

fn read_system_config(root: &Path) -> SystemConfig {
    let system_config_path = root.join("kestrel.toml");
    let mut system_config_toml = Vec::new();
    if let Err(e) = fs::File::open(&system_config_path)
        .and_then(|mut f| f.read_to_end(&mut system_config_toml))
    {
        die!(
            EX_CONFIG,
            "Error reading '{}': {}",
            system_config_path.display(),
            e
        );
    }

    match toml::from_slice(&system_config_toml) {
        Ok(config) => config,
        Err(e) => die!(
            EX_CONFIG,
            "Error in config file at '{}': {}",
            system_config_path.display(),
            e
        ),
    }
}

fn init_logging(root: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        crate::init_simple_log();
        return;
    }

    // inetd sends even stderr back to the client, so there's nowhere to
    // complain to if this goes wrong.
    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if log4rs::init_file(
            log_config_file,
            log4rs::file::Deserializers::new(),
        )
        .is_err()
        {
            EX_CONFIG.exit();
        }
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        let logger = match syslog::unix(formatter) {
            Ok(logger) => logger,
            Err(_) => EX_OSERR.exit(),
        };
        if log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map(|_| log::set_max_level(log::LevelFilter::Info))
            .is_err()
        {
            EX_SOFTWARE.exit();
        }
    }
}
