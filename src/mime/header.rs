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

//! Parsing and rendering of parameterised MIME header values, i.e.
//! `Content-Type` and `Content-Disposition`.

use std::fmt::{self, Write as _};

use nom::branch::alt;
use nom::bytes::complete::{is_not, take, take_while, take_while1};
use nom::character::complete::char;
use nom::combinator::{map, opt};
use nom::multi::{fold_many0, many0};
use nom::sequence::{pair, preceded, separated_pair, terminated, tuple};
use nom::IResult;

// RFC 2045 5.1 "tspecials"
fn is_token_char(ch: u8) -> bool {
    ch > b' ' && ch < 0x7F && !b"()<>@,;:\\\"/[]?=".contains(&ch)
}

// Folding white space. Unfolding is not performed before parsing, so the
// line-ending characters are simply treated as whitespace.
fn lws(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(|ch: u8| b" \t\r\n".contains(&ch))(i)
}

// RFC 2045 5.1 "token"
fn token(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_token_char)(i)
}

// RFC 2822 3.2.2 "quoted-pair"
fn quoted_pair(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

fn qtext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    is_not(&b"\\\""[..])(i)
}

// RFC 2822 3.2.5 "quoted-string", without the surrounding CFWS
fn quoted_string(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    preceded(
        char('"'),
        terminated(
            fold_many0(
                alt((qtext, quoted_pair)),
                Vec::new(),
                |mut acc: Vec<u8>, item: &[u8]| {
                    acc.extend_from_slice(item);
                    acc
                },
            ),
            char('"'),
        ),
    )(i)
}

fn parm_value(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    alt((quoted_string, map(token, |t: &[u8]| t.to_vec())))(i)
}

// RFC 2045 5.1 "parameter", including the leading semicolon
fn parm(i: &[u8]) -> IResult<&[u8], (&[u8], Vec<u8>)> {
    preceded(
        tuple((lws, char(';'), lws)),
        separated_pair(token, tuple((lws, char('='), lws)), parm_value),
    )(i)
}

// Some agents leave a dangling semicolon after the last parameter.
fn parms(i: &[u8]) -> IResult<&[u8], Vec<(&[u8], Vec<u8>)>> {
    terminated(many0(parm), tuple((lws, opt(char(';')), lws)))(i)
}

fn content_type(
    i: &[u8],
) -> IResult<&[u8], (&[u8], &[u8], Vec<(&[u8], Vec<u8>)>)> {
    tuple((
        preceded(lws, token),
        preceded(pair(lws, char('/')), preceded(lws, token)),
        parms,
    ))(i)
}

fn disposition(i: &[u8]) -> IResult<&[u8], (&[u8], Vec<(&[u8], Vec<u8>)>)> {
    pair(preceded(lws, token), parms)(i)
}

fn lower(s: &[u8]) -> String {
    String::from_utf8_lossy(s).to_ascii_lowercase()
}

/// The parameters of a MIME header value, in their original order.
///
/// Names are compared case-insensitively and stored lower-case.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parms(Vec<(String, String)>);

impl Parms {
    fn from_parsed(parsed: Vec<(&[u8], Vec<u8>)>) -> Self {
        Parms(
            parsed
                .into_iter()
                .map(|(name, value)| {
                    (lower(name), String::from_utf8_lossy(&value).into_owned())
                })
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|entry| entry.0.eq_ignore_ascii_case(name))
            .map(|entry| entry.1.as_str())
    }

    /// Sets `name` to `value`, replacing an existing parameter of that name
    /// in place, or appending a new one otherwise.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .0
            .iter_mut()
            .find(|entry| entry.0.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.1 = value,
            None => self.0.push((name.to_ascii_lowercase(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|&(ref n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|&(ref n, ref v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Parms {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Values are always quoted, which is never wrong and matches what
        // RFC 3156 shows for `protocol` and `micalg`.
        for (name, value) in self.iter() {
            write!(f, "; {}=\"", name)?;
            for ch in value.chars() {
                if '"' == ch || '\\' == ch {
                    f.write_char('\\')?;
                }
                f.write_char(ch)?;
            }
            f.write_char('"')?;
        }
        Ok(())
    }
}

/// A parsed `Content-Type` value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    /// The top-level type, lower-case.
    pub typ: String,
    /// The subtype, lower-case.
    pub subtype: String,
    pub parms: Parms,
}

impl ContentType {
    pub fn new(typ: &str, subtype: &str) -> Self {
        ContentType {
            typ: typ.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parms: Parms::default(),
        }
    }

    /// Parses a `Content-Type` header value.
    ///
    /// Anything trailing the last parseable parameter is ignored. Returns
    /// `None` if there is not even a `type/subtype` pair.
    pub fn parse(value: &str) -> Option<Self> {
        let (_, (typ, subtype, parms)) = content_type(value.as_bytes()).ok()?;
        Some(ContentType {
            typ: lower(typ),
            subtype: lower(subtype),
            parms: Parms::from_parsed(parms),
        })
    }

    pub fn with_parm(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parms.set(name, value);
        self
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn is_subtype(&self, subtype: &str) -> bool {
        self.subtype.eq_ignore_ascii_case(subtype)
    }

    pub fn parm(&self, name: &str) -> Option<&str> {
        self.parms.get(name)
    }
}

/// RFC 2045 5.2: absent or unparseable `Content-Type` means plain ASCII text.
impl Default for ContentType {
    fn default() -> Self {
        ContentType::new("text", "plain").with_parm("charset", "us-ascii")
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}{}", self.typ, self.subtype, self.parms)
    }
}

/// A parsed `Content-Disposition` value (RFC 2183).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDisposition {
    /// `inline`, `attachment`, or an extension token; lower-case.
    pub disposition: String,
    pub parms: Parms,
}

impl ContentDisposition {
    pub fn new(disposition: &str) -> Self {
        ContentDisposition {
            disposition: disposition.to_ascii_lowercase(),
            parms: Parms::default(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (_, (disposition, parms)) =
            self::disposition(value.as_bytes()).ok()?;
        Some(ContentDisposition {
            disposition: lower(disposition),
            parms: Parms::from_parsed(parms),
        })
    }

    pub fn with_parm(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parms.set(name, value);
        self
    }

    pub fn filename(&self) -> Option<&str> {
        self.parms.get("filename")
    }
}

impl fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.disposition, self.parms)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parse_simple_content_type() {
        let ct = ContentType::parse("text/plain").unwrap();
        assert_eq!("text", ct.typ);
        assert_eq!("plain", ct.subtype);
        assert!(ct.parms.is_empty());
    }

    #[test]
    fn parse_content_type_with_parms() {
        let ct = ContentType::parse(
            "Multipart/Signed; Protocol=\"application/pgp-signature\";\r\n\
             \tmicalg=pgp-sha256; boundary=\"=_a\\\"b\"",
        )
        .unwrap();
        assert!(ct.is_type("multipart"));
        assert!(ct.is_subtype("signed"));
        assert_eq!(Some("application/pgp-signature"), ct.parm("protocol"));
        assert_eq!(Some("pgp-sha256"), ct.parm("MICALG"));
        assert_eq!(Some("=_a\"b"), ct.parm("boundary"));
    }

    #[test]
    fn parse_tolerates_trailing_semicolon_and_junk() {
        let ct = ContentType::parse("text/html; charset=utf-8;").unwrap();
        assert_eq!(Some("utf-8"), ct.parm("charset"));

        let ct = ContentType::parse("text/html; charset=utf-8 (junk)").unwrap();
        assert_eq!(Some("utf-8"), ct.parm("charset"));
    }

    #[test]
    fn parse_rejects_missing_subtype() {
        assert_eq!(None, ContentType::parse("text"));
        assert_eq!(None, ContentType::parse(""));
    }

    #[test]
    fn set_parm_replaces_in_place() {
        let mut ct =
            ContentType::parse("multipart/mixed; boundary=x; foo=bar").unwrap();
        ct.parms.set("BOUNDARY", "y");
        ct.parms.set("protocol", "application/pgp-encrypted");
        assert_eq!(
            "multipart/mixed; boundary=\"y\"; foo=\"bar\"; \
             protocol=\"application/pgp-encrypted\"",
            ct.to_string()
        );

        ct.parms.remove("foo");
        assert_eq!(None, ct.parm("foo"));
    }

    #[test]
    fn render_escapes_quotes() {
        let ct = ContentType::new("text", "plain").with_parm("name", "a\"b\\c");
        assert_eq!("text/plain; name=\"a\\\"b\\\\c\"", ct.to_string());
        let reparsed = ContentType::parse(&ct.to_string()).unwrap();
        assert_eq!(Some("a\"b\\c"), reparsed.parm("name"));
    }

    #[test]
    fn parse_content_disposition() {
        let cd =
            ContentDisposition::parse("Attachment; filename=\"signature.asc\"")
                .unwrap();
        assert_eq!("attachment", cd.disposition);
        assert_eq!(Some("signature.asc"), cd.filename());

        let cd = ContentDisposition::parse("inline").unwrap();
        assert_eq!("inline", cd.disposition);
        assert_eq!(None, cd.filename());
    }

    proptest! {
        #[test]
        fn content_type_parse_never_panics(s in ".*") {
            ContentType::parse(&s);
            ContentDisposition::parse(&s);
        }
    }
}
