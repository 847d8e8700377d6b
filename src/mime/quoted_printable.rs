//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Pgpmime.
//
// Pgpmime is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Pgpmime is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Pgpmime. If not, see <http://www.gnu.org/licenses/>.

use std::fmt::Write as _;

/// RFC 2045 6.7 rule 5: encoded lines are at most 76 characters long, not
/// counting the line ending.
const MAX_LINE: usize = 76;

/// Encodes `data` with quoted-printable encoding, as described by RFC 2045.
///
/// Line breaks in the input, whether DOS or UNIX style, become CRLF hard line
/// breaks. A lone CR is encoded. Whitespace at the end of a line is encoded
/// so that transports which strip trailing whitespace don't alter the
/// content, and so is the `F` of a line starting with `From `, which mbox
/// based transports would otherwise escape. Long lines are split with soft
/// line breaks.
///
/// The output is always pure ASCII.
pub fn qp_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + data.len() / 8);
    let mut line_len = 0;

    for (ix, &b) in data.iter().enumerate() {
        if b'\r' == b && Some(&b'\n') == data.get(ix + 1) {
            // The LF emits the line break
            continue;
        }

        if b'\n' == b {
            out.push_str("\r\n");
            line_len = 0;
            continue;
        }

        let at_line_end = match data.get(ix + 1) {
            None | Some(&b'\n') => true,
            Some(&b'\r') => Some(&b'\n') == data.get(ix + 2),
            Some(_) => false,
        };

        let starts_from = data[ix..].starts_with(b"From ");
        let mut literal = ((b'!' <= b && b <= b'~' && b'=' != b)
            || ((b' ' == b || b'\t' == b) && !at_line_end))
            && !(0 == line_len && starts_from);
        let mut width = if literal { 1 } else { 3 };
        // Unless this is the last character of the line, room must be left
        // for the `=` of a soft line break.
        let limit = if at_line_end { MAX_LINE } else { MAX_LINE - 1 };

        if line_len + width > limit {
            out.push_str("=\r\n");
            line_len = 0;
            if starts_from {
                literal = false;
                width = 3;
            }
        }

        if literal {
            out.push(b as char);
        } else {
            // Infallible, writing into a String
            let _ = write!(out, "={:02X}", b);
        }
        line_len += width;
    }

    out
}
