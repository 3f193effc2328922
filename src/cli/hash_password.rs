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

use crate::support::passwd::hash_password;

/// Prompt for a password and print its hash, ready to be pasted into the
/// `[users]` table of `kestrel.toml`.
pub(super) fn main() {
    let password = match rpassword::prompt_password_stderr("Password: ")
        .and_then(|a| {
            rpassword::prompt_password_stderr("Confirm: ").map(|b| (a, b))
        }) {
        Err(e) => die!(EX_NOINPUT, "Failed to read password: {}", e),
        Ok((a, b)) if a != b => die!(EX_DATAERR, "Passwords don't match"),
        Ok((a, _)) if a.is_empty() => die!(EX_NOINPUT, "No password given"),
        Ok((a, _)) => a,
    };

    match hash_password(password.as_bytes()) {
        Ok(hash) => println!("{}", hash),
        Err(e) => die!(EX_SOFTWARE, "Failed to hash password: {}", e),
    }
}
