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

//! The in-memory representation of an outgoing MIME message tree.

use std::borrow::Cow;

use super::header::{ContentDisposition, ContentType};
use super::writer;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const CONTENT_DESCRIPTION: &str = "Content-Description";
pub const MIME_VERSION: &str = "MIME-Version";

/// Lines longer than this are sent quoted-printable so that they are never
/// wrapped in transit.
const MAX_7BIT_LINE: usize = 76;

/// An ordered list of headers.
///
/// Names are compared case-insensitively but kept in the case they were
/// given. Duplicates are permitted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the first header called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.0.eq_ignore_ascii_case(name))
            .map(|entry| entry.1.as_str())
    }

    pub fn get_all<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.0.eq_ignore_ascii_case(name))
            .map(|entry| entry.1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Appends a header, even if one of the same name already exists.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets the header called `name` to `value`.
    ///
    /// The first existing header of that name is replaced in place and any
    /// later duplicates removed; if there is none, the header is appended.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let mut value = Some(value.into());
        self.entries.retain_mut(|entry| {
            if !entry.0.eq_ignore_ascii_case(name) {
                true
            } else if let Some(value) = value.take() {
                entry.1 = value;
                true
            } else {
                false
            }
        });

        if let Some(value) = value {
            self.entries.push((name.to_owned(), value));
        }
    }

    /// Removes every header called `name`, returning whether there were any.
    pub fn remove(&mut self, name: &str) -> bool {
        let len = self.entries.len();
        self.entries.retain(|entry| !entry.0.eq_ignore_ascii_case(name));
        len != self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|&(ref name, ref value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How the writer emits the content of a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferEncoding {
    /// The content is written exactly as stored. Used for 7bit/8bit text and
    /// for content which must never be re-encoded, such as armored OpenPGP
    /// data.
    Verbatim,
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    /// The `Content-Transfer-Encoding` value implied by this encoding, if
    /// any.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            TransferEncoding::Verbatim => None,
            TransferEncoding::QuotedPrintable => Some("quoted-printable"),
            TransferEncoding::Base64 => Some("base64"),
        }
    }
}

/// The content of a leaf part.
///
/// `data` is always the decoded content; `encoding` tells the writer how to
/// put it on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Body {
    pub data: Vec<u8>,
    pub encoding: TransferEncoding,
}

impl Body {
    pub fn verbatim(data: impl Into<Vec<u8>>) -> Self {
        Body {
            data: data.into(),
            encoding: TransferEncoding::Verbatim,
        }
    }

    pub fn quoted_printable(data: impl Into<Vec<u8>>) -> Self {
        Body {
            data: data.into(),
            encoding: TransferEncoding::QuotedPrintable,
        }
    }

    pub fn base64(data: impl Into<Vec<u8>>) -> Self {
        Body {
            data: data.into(),
            encoding: TransferEncoding::Base64,
        }
    }
}

/// A node in a MIME tree.
///
/// A leaf always carries a body and a container always carries children;
/// there is no way to express a part with both or neither.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MimePart {
    Leaf { headers: Headers, body: Body },
    Container {
        headers: Headers,
        children: Vec<MimePart>,
    },
}

impl MimePart {
    /// Creates a leaf with the given content type and body.
    ///
    /// `Content-Transfer-Encoding` is set for quoted-printable and base64
    /// bodies and left absent for verbatim ones.
    pub fn leaf(content_type: &ContentType, body: Body) -> Self {
        let mut headers = Headers::new();
        headers.add(CONTENT_TYPE, content_type.to_string());
        if let Some(cte) = body.encoding.header_value() {
            headers.add(CONTENT_TRANSFER_ENCODING, cte);
        }

        MimePart::Leaf { headers, body }
    }

    /// Creates a minimal `text/plain` leaf holding `text`.
    ///
    /// This carries only `Content-Type` and `Content-Transfer-Encoding`;
    /// in particular there is no `MIME-Version`.
    pub fn text(text: &str) -> Self {
        Self::text_with_charset(text, "plain", "utf-8")
    }

    /// Creates a `text/<subtype>` leaf holding `text`.
    ///
    /// Line endings are canonicalised to CRLF. Pure ASCII text is labelled
    /// `us-ascii` and sent as 7bit, unless some line would be altered by
    /// transport (see `survives_transport`), in which case it is sent
    /// quoted-printable. Otherwise the text is encoded into `charset` (or
    /// UTF-8 if `charset` is unknown or can't represent the text) and sent
    /// quoted-printable.
    pub fn text_with_charset(text: &str, subtype: &str, charset: &str) -> Self {
        let text = canonicalise_line_endings(text);

        if text.is_ascii() {
            let content_type = ContentType::new("text", subtype)
                .with_parm("charset", "us-ascii");
            if !survives_transport(&text) {
                return MimePart::leaf(
                    &content_type,
                    Body::quoted_printable(text.into_owned()),
                );
            }

            let mut part = MimePart::leaf(
                &content_type,
                Body::verbatim(text.into_owned()),
            );
            part.headers_mut().add(CONTENT_TRANSFER_ENCODING, "7bit");
            return part;
        }

        let encoding =
            encoding_rs::Encoding::for_label_no_replacement(charset.as_bytes())
                .unwrap_or(encoding_rs::UTF_8);
        let (encoded, actual, had_errors) = encoding.encode(&text);
        let (data, charset) = if had_errors {
            log::warn!(
                "{} cannot represent the message text, using UTF-8",
                actual.name()
            );
            (text.as_bytes().to_vec(), "utf-8".to_owned())
        } else {
            (encoded.into_owned(), actual.name().to_ascii_lowercase())
        };

        MimePart::leaf(
            &ContentType::new("text", subtype).with_parm("charset", charset),
            Body::quoted_printable(data),
        )
    }

    /// Creates a base64-encoded attachment leaf.
    pub fn attachment(filename: &str, content_type: &str, data: Vec<u8>) -> Self {
        let (typ, subtype) = ContentType::parse(content_type)
            .map(|ct| (ct.typ, ct.subtype))
            .unwrap_or_else(|| {
                ("application".to_owned(), "octet-stream".to_owned())
            });
        let mut part = MimePart::leaf(
            &ContentType::new(&typ, &subtype).with_parm("name", filename),
            Body::base64(data),
        );
        part.headers_mut().add(
            CONTENT_DISPOSITION,
            ContentDisposition::new("attachment")
                .with_parm("filename", filename)
                .to_string(),
        );
        part
    }

    /// Creates a `multipart/<subtype>` container with a fresh boundary.
    pub fn container(subtype: &str, children: Vec<MimePart>) -> Self {
        let mut headers = Headers::new();
        headers.add(
            CONTENT_TYPE,
            ContentType::new("multipart", subtype)
                .with_parm("boundary", writer::generate_boundary())
                .to_string(),
        );
        MimePart::Container { headers, children }
    }

    pub fn headers(&self) -> &Headers {
        match *self {
            MimePart::Leaf { ref headers, .. }
            | MimePart::Container { ref headers, .. } => headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        match *self {
            MimePart::Leaf {
                ref mut headers, ..
            }
            | MimePart::Container {
                ref mut headers, ..
            } => headers,
        }
    }

    /// Returns the parsed `Content-Type`.
    ///
    /// Absent or unparseable values give the RFC 2045 default for leaves and
    /// `multipart/mixed` for containers.
    pub fn content_type(&self) -> ContentType {
        match self.headers().get(CONTENT_TYPE).and_then(ContentType::parse) {
            Some(ct) => ct,
            None if self.is_container() => {
                ContentType::new("multipart", "mixed")
            },
            None => ContentType::default(),
        }
    }

    pub fn set_content_type(&mut self, content_type: &ContentType) {
        self.headers_mut()
            .set(CONTENT_TYPE, content_type.to_string());
    }

    pub fn is_container(&self) -> bool {
        match *self {
            MimePart::Leaf { .. } => false,
            MimePart::Container { .. } => true,
        }
    }

    /// The children of a container; empty for a leaf.
    pub fn children(&self) -> &[MimePart] {
        match *self {
            MimePart::Leaf { .. } => &[],
            MimePart::Container { ref children, .. } => children,
        }
    }

    pub fn body(&self) -> Option<&Body> {
        match *self {
            MimePart::Leaf { ref body, .. } => Some(body),
            MimePart::Container { .. } => None,
        }
    }

    /// The file name of this part, from `Content-Disposition` or, failing
    /// that, the `name` parameter of `Content-Type`.
    pub fn filename(&self) -> Option<String> {
        self.headers()
            .get(CONTENT_DISPOSITION)
            .and_then(ContentDisposition::parse)
            .and_then(|cd| cd.filename().map(str::to_owned))
            .or_else(|| self.content_type().parm("name").map(str::to_owned))
    }

    /// Gives every container in the tree which lacks a `boundary` parameter
    /// a fresh one, so that serialising the tree twice yields the same bytes.
    pub fn assign_missing_boundaries(&mut self) {
        if let MimePart::Container { .. } = *self {
            let mut ct = self.content_type();
            if ct.parm("boundary").is_none() {
                ct.parms.set("boundary", writer::generate_boundary());
                self.set_content_type(&ct);
            }
        }

        if let MimePart::Container {
            ref mut children, ..
        } = *self
        {
            for child in children {
                child.assign_missing_boundaries();
            }
        }
    }

    /// Serialises the part, headers included, in canonical CRLF form.
    pub fn to_bytes(&self) -> Vec<u8> {
        writer::to_bytes(self)
    }
}

impl From<&str> for MimePart {
    fn from(text: &str) -> Self {
        MimePart::text(text)
    }
}

impl From<String> for MimePart {
    fn from(text: String) -> Self {
        MimePart::text(&text)
    }
}

/// Whether CRLF-terminated ASCII `text` can be sent as 7bit without a
/// transport changing it.
///
/// RFC 3156 3: trailing whitespace may be stripped, a line starting with
/// `From ` may be escaped, and overlong lines may be wrapped, any of which
/// breaks a signature.
fn survives_transport(text: &str) -> bool {
    text.split("\r\n").all(|line| {
        line.len() <= MAX_7BIT_LINE
            && !line.ends_with(' ')
            && !line.ends_with('\t')
            && !line.starts_with("From ")
            && !line.contains('\0')
    })
}

fn canonicalise_line_endings(text: &str) -> Cow<str> {
    if !text.contains('\n') && !text.contains('\r') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if Some(&'\n') == chars.peek() {
                    chars.next();
                }
                out.push_str("\r\n");
            },
            '\n' => out.push_str("\r\n"),
            ch => out.push(ch),
        }
    }
    Cow::Owned(out)
}
