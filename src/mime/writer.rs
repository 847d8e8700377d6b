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

//! Serialisation of `MimePart` trees to their wire form.
//!
//! Output always uses CRLF line endings between structural elements. Leaf
//! content is written according to its `TransferEncoding`; verbatim content
//! is never touched, which is what RFC 3156 needs for signed and armored
//! parts.

use std::io::{self, Write};

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::model::{Body, MimePart, TransferEncoding};
use super::quoted_printable::qp_encode;

/// RFC 2045 6.8: encoded lines must not exceed 76 characters.
const BASE64_LINE: usize = 76;

/// Generates a random multipart boundary.
///
/// The `=_` prefix can never occur in quoted-printable or base64 output, and
/// the random tail makes a collision with verbatim content implausible.
pub fn generate_boundary() -> String {
    let tail: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .collect();
    format!("=_{}", tail)
}

pub fn to_bytes(part: &MimePart) -> Vec<u8> {
    let mut out = Vec::new();
    // Infallible, writing into a Vec
    let _ = write_part(part, &mut out);
    out
}

pub fn write_part(part: &MimePart, out: &mut impl Write) -> io::Result<()> {
    for (name, value) in part.headers().iter() {
        write!(out, "{}: {}\r\n", name, value)?;
    }
    out.write_all(b"\r\n")?;

    match *part {
        MimePart::Leaf { ref body, .. } => write_body(body, out),
        MimePart::Container { ref children, .. } => {
            let boundary = match part.content_type().parm("boundary") {
                Some(boundary) => boundary.to_owned(),
                None => {
                    log::warn!(
                        "Writing multipart without boundary; \
                         output is not reproducible"
                    );
                    generate_boundary()
                },
            };

            for child in children {
                write!(out, "--{}\r\n", boundary)?;
                write_part(child, out)?;
                // RFC 2046 5.1.1: this CRLF is part of the delimiter, not of
                // the child's content.
                out.write_all(b"\r\n")?;
            }
            write!(out, "--{}--\r\n", boundary)
        },
    }
}

fn write_body(body: &Body, out: &mut impl Write) -> io::Result<()> {
    match body.encoding {
        TransferEncoding::Verbatim => out.write_all(&body.data),
        TransferEncoding::QuotedPrintable => {
            out.write_all(qp_encode(&body.data).as_bytes())
        },
        TransferEncoding::Base64 => {
            let encoded = base64::encode(&body.data);
            for line in encoded.as_bytes().chunks(BASE64_LINE) {
                out.write_all(line)?;
                out.write_all(b"\r\n")?;
            }
            Ok(())
        },
    }
}

#[cfg(test)]
mod test {
    use std::str;

    use super::*;
    use crate::mime::header::ContentType;

    #[test]
    fn write_text_leaf() {
        let part = MimePart::text("hello");
        assert_eq!(
            "Content-Type: text/plain; charset=\"us-ascii\"\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             hello",
            str::from_utf8(&part.to_bytes()).unwrap()
        );
    }

    #[test]
    fn write_multipart() {
        let mut part = MimePart::container(
            "mixed",
            vec![
                MimePart::text("one\n"),
                MimePart::attachment(
                    "b.bin",
                    "application/octet-stream",
                    vec![0xFF; 60],
                ),
            ],
        );
        part.set_content_type(
            &ContentType::new("multipart", "mixed").with_parm("boundary", "XX"),
        );

        let expected = format!(
            "Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
             \r\n\
             --XX\r\n\
             Content-Type: text/plain; charset=\"us-ascii\"\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             one\r\n\
             \r\n\
             --XX\r\n\
             Content-Type: application/octet-stream; name=\"b.bin\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment; filename=\"b.bin\"\r\n\
             \r\n\
             {}\r\n\
             {}\r\n\
             \r\n\
             --XX--\r\n",
            "/".repeat(76),
            "/".repeat(4),
        );
        assert_eq!(expected, str::from_utf8(&part.to_bytes()).unwrap());
    }

    #[test]
    fn quoted_printable_body() {
        let part = MimePart::text("caf\u{e9}");
        let bytes = part.to_bytes();
        assert!(str::from_utf8(&bytes).unwrap().ends_with("\r\n\r\ncaf=C3=A9"));
    }

    #[test]
    fn serialisation_is_stable() {
        let part = MimePart::container(
            "alternative",
            vec![MimePart::text("a"), MimePart::text("b")],
        );
        assert_eq!(part.to_bytes(), part.to_bytes());
    }

    #[test]
    fn boundaries_are_distinct() {
        let a = generate_boundary();
        assert!(a.starts_with("=_"));
        assert_eq!(34, a.len());
        assert_ne!(a, generate_boundary());
    }
}
