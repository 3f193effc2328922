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

//! Tests which run complete IMAP sessions.
//!
//! Each test talks to a real `Server` running on its own thread over a Unix
//! socket pair, backed by an in-memory store which the test can also
//! manipulate directly to simulate other sessions and deliveries.

mod defs;

mod auth;
mod first_contact;
mod idle;
mod literals;
mod mailboxes;
mod messages;
mod session;
