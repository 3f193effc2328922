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

/// Decode RFC 2045 quoted-printable content.
///
/// Soft line breaks are removed with either line ending. Malformed escapes
/// are passed through as-is, as is 8-bit content.
pub fn qp_decode(s: &[u8]) -> Vec<u8> {
    fn hex(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'A'..=b'F' => Some(b - b'A' + 10),
            b'a'..=b'f' => Some(b - b'a' + 10),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(s.len());
    let mut ix = 0;
    while ix < s.len() {
        if b'=' != s[ix] {
            out.push(s[ix]);
            ix += 1;
            continue;
        }

        match (s.get(ix + 1).copied(), s.get(ix + 2).copied()) {
            (Some(b'\n'), _) => ix += 2,
            (Some(b'\r'), Some(b'\n')) => ix += 3,
            (Some(hi), Some(lo)) => match (hex(hi), hex(lo)) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    ix += 3;
                }
                _ => {
                    out.push(b'=');
                    ix += 1;
                }
            },
            // Dangling '=' at the very end is a soft break without a line
            _ => ix = s.len(),
        }
    }

    out
}
