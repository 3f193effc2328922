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

macro_rules! map_error {
    ($this:expr) => {{
        let log_prefix = &$this.log_prefix;
        let events = &mut $this.events;
        move |e| error_completion(log_prefix, events, e)
    }};

    ($this:expr, $($($kind:ident)|+ => $code:expr,)+) => {{
        let log_prefix = &$this.log_prefix;
        let events = &mut $this.events;
        move |e| match e {
            $($(Error::$kind)|* => {
                let text = events
                    .take_last_error()
                    .unwrap_or_else(|| e.to_string());
                Completion::no_code($code, text)
            })*
            e => error_completion(log_prefix, events, e),
        }
    }};
}

macro_rules! store {
    ($this:expr) => {
        $this
            .store
            .as_mut()
            .ok_or_else(|| Completion::bad(Template::Text(
                "Not logged in".to_owned(),
            )))
    };
}

macro_rules! selected {
    ($this:expr) => {
        $this
            .selected
            .as_mut()
            .ok_or_else(|| Completion::bad(Template::Text(
                "No mailbox selected".to_owned(),
            )))
    };
}

mod auth;
mod commands;
mod defs;
mod fetch;
mod flags;
mod mailboxes;
mod messages;
mod search;

pub use self::commands::Interaction;
pub use self::defs::{CommandProcessor, State};
