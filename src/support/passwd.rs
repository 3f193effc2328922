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

use std::collections::BTreeMap;

use log::{error, warn};
use rand::Rng;
use secstr::SecStr;

/// The authenticated identity of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub anonymous: bool,
}

/// Verifies user credentials.
///
/// This is the boundary to whatever user database the installation has.
pub trait Authenticator {
    fn verify(&self, user: &str, password: &SecStr) -> Option<Identity>;
}

/// An `Authenticator` backed by the `[users]` table of the system
/// configuration.
#[derive(Clone, Debug, Default)]
pub struct PasswordTable {
    users: BTreeMap<String, String>,
}

impl PasswordTable {
    pub fn new(users: BTreeMap<String, String>) -> Self {
        PasswordTable { users }
    }
}

impl Authenticator for PasswordTable {
    fn verify(&self, user: &str, password: &SecStr) -> Option<Identity> {
        let encoded = self.users.get(user)?;
        match argon2::verify_encoded(encoded, password.unsecure()) {
            Ok(true) => Some(Identity {
                user: user.to_owned(),
                anonymous: false,
            }),
            Ok(false) => None,
            Err(e) => {
                error!("Password hash for '{}' is unusable: {}", user, e);
                None
            }
        }
    }
}

/// Hash `password` for storage in the `[users]` table.
pub fn hash_password(password: &[u8]) -> Result<String, argon2::Error> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    argon2::hash_encoded(password, &salt, &argon2::Config::default())
}

/// Reject user names that cannot be safely logged or used as identities.
pub fn is_plausible_user_name(user: &str) -> bool {
    if user.is_empty() || user.len() > 256 {
        return false;
    }

    let ok = !user.chars().any(|c| c.is_control() || c.is_whitespace());
    if !ok {
        warn!("Rejecting implausible user name");
    }
    ok
}
