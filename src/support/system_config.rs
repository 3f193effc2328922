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
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The system-wide configuration for Kestrel.
///
/// This is stored in a file named `kestrel.toml` under the Kestrel system
/// root, which is typically `/usr/local/etc/kestrel` or `/etc/kestrel`.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub limits: LimitConfig,

    /// Options relating to how clients may authenticate.
    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    /// Map of user names to Argon2-encoded password hashes, as produced by
    /// `kestrel server hash-password`.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long an unauthenticated client may stay silent.
    pub login_secs: u64,
    /// How long an authenticated client may stay silent.
    ///
    /// RFC 3501 requires at least 30 minutes.
    pub autologout_secs: u64,
    /// How often the mailbox is re-checked while the client is in IDLE.
    pub idle_poll_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            login_secs: 60,
            autologout_secs: 30 * 60,
            idle_poll_secs: 120,
        }
    }
}

impl TimeoutConfig {
    pub fn login(&self) -> Duration {
        Duration::from_secs(self.login_secs)
    }

    pub fn autologout(&self) -> Duration {
        Duration::from_secs(self.autologout_secs)
    }

    /// The IDLE poll interval, clamped to be shorter than autologout.
    pub fn idle_poll(&self) -> Duration {
        Duration::from_secs(
            self.idle_poll_secs
                .min(self.autologout_secs.saturating_sub(1))
                .max(1),
        )
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitConfig {
    pub max_command_line: usize,
    /// Maximum size of a literal in anything but APPEND.
    pub max_literal: u32,
    pub max_append_literal: u32,
    pub max_fetch_attributes: usize,
    /// Maximum nesting of parentheses, `NOT` and `OR` in SEARCH criteria.
    pub max_search_depth: u32,
    pub max_literals_per_command: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        LimitConfig {
            max_command_line: 65536,
            max_literal: 65536,
            max_append_literal: 64 * 1024 * 1024,
            max_fetch_attributes: 100,
            max_search_depth: 50,
            max_literals_per_command: 64,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// If true, `LOGIN` and the plaintext SASL mechanisms are refused and
    /// `LOGINDISABLED` is advertised.
    pub disable_plaintext: bool,
    /// If true, `AUTHENTICATE ANONYMOUS` is accepted.
    pub allow_anonymous: bool,
    /// The identity given to anonymous sessions.
    ///
    /// Defaults to `anonymous` if empty.
    pub anonymous_user: String,
    /// Whether the transport can be upgraded with `STARTTLS`.
    pub starttls_available: bool,
}

impl SecurityConfig {
    pub fn anonymous_user(&self) -> &str {
        if self.anonymous_user.is_empty() {
            "anonymous"
        } else {
            &self.anonymous_user
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// If true, the storage layer's "Mailbox is empty" notice is not passed
    /// on to the client.
    pub suppress_empty_mailbox_warning: bool,
    /// If set, an IMAP URL sent as a `[REFERRAL]` after authentication.
    pub login_referral: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            suppress_empty_mailbox_warning: true,
            login_referral: None,
        }
    }
}
