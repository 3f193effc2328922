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

//! Server side of the SASL mechanisms usable with `AUTHENTICATE`.
//!
//! The negotiator knows nothing about the wire beyond the base64 framing of
//! a single challenge or response. The session drives the exchange and
//! verifies whatever credentials come out of it.

use secstr::SecStr;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
    Anonymous,
}

impl Mechanism {
    pub fn from_name(name: &str) -> Option<Self> {
        if "PLAIN".eq_ignore_ascii_case(name) {
            Some(Mechanism::Plain)
        } else if "LOGIN".eq_ignore_ascii_case(name) {
            Some(Mechanism::Login)
        } else if "ANONYMOUS".eq_ignore_ascii_case(name) {
            Some(Mechanism::Anonymous)
        } else {
            None
        }
    }

    /// Whether the mechanism sends a password in the clear.
    pub fn is_plaintext(self) -> bool {
        match self {
            Mechanism::Plain | Mechanism::Login => true,
            Mechanism::Anonymous => false,
        }
    }
}

/// What a completed exchange yielded.
#[derive(Debug)]
pub enum Credentials {
    Password { user: String, password: SecStr },
    /// `trace` is the optional text the client sent along, which is only
    /// ever logged.
    Anonymous { trace: String },
}

#[derive(Debug)]
pub enum Step {
    /// Send this challenge and feed the response to `step()`.
    Challenge(&'static [u8]),
    Done(Credentials),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SaslError {
    #[error("AUTHENTICATE cancelled")]
    Cancelled,
    #[error("Bad base64 or UTF-8")]
    BadEncoding,
    #[error("Malformed AUTHENTICATE PLAIN string")]
    MalformedPlain,
    #[error("Authorising as a different user is not supported")]
    ForeignAuthzid,
}

/// One client response line, decoded.
///
/// `*` cancels the exchange and `=` stands for an empty response.
pub fn decode_response(line: &[u8]) -> Result<Vec<u8>, SaslError> {
    match line {
        b"*" => Err(SaslError::Cancelled),
        b"=" => Ok(vec![]),
        _ => base64::decode(line).map_err(|_| SaslError::BadEncoding),
    }
}

/// Format a challenge as the text of a `+` continuation line.
pub fn encode_challenge(challenge: &[u8]) -> String {
    base64::encode(challenge)
}

enum State {
    Plain,
    LoginUser,
    LoginPassword(String),
    Anonymous,
}

/// An exchange in progress.
pub struct Negotiation {
    state: State,
}

impl Negotiation {
    pub fn new(mechanism: Mechanism) -> Self {
        Negotiation {
            state: match mechanism {
                Mechanism::Plain => State::Plain,
                Mechanism::Login => State::LoginUser,
                Mechanism::Anonymous => State::Anonymous,
            },
        }
    }

    /// The challenge to send when the client gave no initial response.
    pub fn first_challenge(&self) -> &'static [u8] {
        match self.state {
            State::LoginUser => b"Username:",
            _ => b"",
        }
    }

    /// Feed one decoded client response into the exchange.
    pub fn step(&mut self, response: &[u8]) -> Result<Step, SaslError> {
        match std::mem::replace(&mut self.state, State::Anonymous) {
            State::Plain => plain(response).map(Step::Done),
            State::LoginUser => {
                self.state = State::LoginPassword(utf8(response)?);
                Ok(Step::Challenge(b"Password:"))
            }
            State::LoginPassword(user) => {
                Ok(Step::Done(Credentials::Password {
                    user,
                    password: SecStr::new(response.to_vec()),
                }))
            }
            State::Anonymous => Ok(Step::Done(Credentials::Anonymous {
                trace: utf8(response)?,
            })),
        }
    }
}

fn utf8(data: &[u8]) -> Result<String, SaslError> {
    String::from_utf8(data.to_vec()).map_err(|_| SaslError::BadEncoding)
}

// RFC 4616: [authzid] NUL authcid NUL passwd
fn plain(response: &[u8]) -> Result<Credentials, SaslError> {
    let mut parts = response.split(|&b| 0 == b);
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(authzid), Some(authcid), Some(password), None) => {
            if authcid.is_empty() {
                return Err(SaslError::MalformedPlain);
            }
            if !authzid.is_empty() && authzid != authcid {
                return Err(SaslError::ForeignAuthzid);
            }

            Ok(Credentials::Password {
                user: utf8(authcid)?,
                password: SecStr::new(password.to_vec()),
            })
        }
        _ => Err(SaslError::MalformedPlain),
    }
}
