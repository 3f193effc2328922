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

use log::{error, info, warn};
use secstr::SecStr;

use super::defs::*;
use crate::imap::sasl::{self, Credentials, Mechanism, Negotiation};
use crate::support::passwd::{is_plausible_user_name, Identity};

impl CommandProcessor {
    pub(super) fn cmd_login(
        &mut self,
        mut args: Args<'_>,
        out: &mut Output,
    ) -> CmdResult {
        let user = args.astring().map_err(arg_error)?;
        let password = args.arg(s::astring).map_err(arg_error)?;
        args.end().map_err(arg_error)?;

        if self.config.security.disable_plaintext {
            return Err(Completion::no("Plaintext login is disabled"));
        }

        self.verify_password(&user, SecStr::new(password.into_owned()), out)
    }

    /// Parse the arguments of AUTHENTICATE and start the exchange.
    ///
    /// Returns the negotiation and the decoded initial response, if the
    /// client sent one.
    pub(super) fn cmd_authenticate(
        &mut self,
        mut args: Args<'_>,
    ) -> Result<(Negotiation, Option<Vec<u8>>), Completion> {
        let name = args.arg(s::atom).map_err(arg_error)?;
        let initial = args.opt_arg(s::atom);
        args.end().map_err(arg_error)?;

        let mechanism = Mechanism::from_name(name).ok_or_else(|| {
            Completion::no("Unsupported authentication mechanism")
        })?;
        if mechanism.is_plaintext() && self.config.security.disable_plaintext
        {
            return Err(Completion::no("Plaintext authentication is disabled"));
        }
        if Mechanism::Anonymous == mechanism
            && !self.config.security.allow_anonymous
        {
            return Err(Completion::no("Anonymous access is not permitted"));
        }

        let initial = match initial {
            None => None,
            Some(ir) => Some(
                sasl::decode_response(ir.as_bytes()).map_err(|e| {
                    Completion::bad(Template::Text(e.to_string()))
                })?,
            ),
        };

        Ok((Negotiation::new(mechanism), initial))
    }

    /// Complete an AUTHENTICATE exchange.
    ///
    /// `outcome` is the result of the SASL exchange itself.
    pub fn authenticate_finish(
        &mut self,
        tag: &str,
        outcome: Result<Credentials, sasl::SaslError>,
    ) -> Vec<u8> {
        let mut output = Output::new();
        let res = match outcome {
            Err(sasl::SaslError::Cancelled) => Err(Completion::bad(
                Template::Text("AUTHENTICATE cancelled".to_owned()),
            )),
            Err(e) => Err(Completion::bad(Template::Text(e.to_string()))
                .with_code(RespCode::Parse)),
            Ok(Credentials::Password { user, password }) => {
                self.verify_password(&user, password, &mut output)
            }
            Ok(Credentials::Anonymous { trace }) => {
                info!(
                    "{} Anonymous login, trace: {:?}",
                    self.log_prefix, trace
                );
                let identity = Identity {
                    user: self.config.security.anonymous_user().to_owned(),
                    anonymous: true,
                };
                self.log_in(identity, &mut output)
            }
        };

        self.complete(res, tag, "AUTHENTICATE", Some(true), &mut output);
        output.into_inner()
    }

    fn verify_password(
        &mut self,
        user: &str,
        password: SecStr,
        out: &mut Output,
    ) -> CmdResult {
        if !is_plausible_user_name(user) {
            return Err(Completion::no("Bad user id or password"));
        }

        match self.authenticator.verify(user, &password) {
            Some(identity) => self.log_in(identity, out),
            None => {
                // A missing password is not remarkable, nor is an attempt
                // that put the password in the user field.
                if !password.unsecure().is_empty()
                    && password.unsecure() != user.as_bytes()
                {
                    warn!(
                        "{} Rejected login for user '{}'",
                        self.log_prefix, user
                    );
                }
                Err(Completion::no("Bad user id or password"))
            }
        }
    }

    fn log_in(&mut self, identity: Identity, out: &mut Output) -> CmdResult {
        let store = self.provider.open_store(&identity).map_err(|e| {
            error!(
                "{} Failed to open mail store for '{}': {}",
                self.log_prefix, identity.user, e
            );
            Completion::no("Mail store unavailable")
        })?;

        self.log_prefix.set_user(identity.user.clone());
        info!("{} Login successful", self.log_prefix);

        let text = format!("User {} authenticated", identity.user);
        self.store = Some(store);
        self.identity = Some(identity);
        self.state = State::Authenticated;

        if let Some(ref referral) = self.config.policy.login_referral {
            out.cond(
                Cond::Ok,
                Some(RespCode::Referral(referral.clone())),
                "Mailbox available at another server",
            );
        }

        Ok(Completion::ok_code(RespCode::Capability(
            self.capability_string(),
        ))
        .with_text(text))
    }
}
