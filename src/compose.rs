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

//! Composition of complete outgoing messages.
//!
//! `OutgoingMessage` plays the part of a mail framework's message object:
//! it gathers the envelope, the body, alternative renderings, attachments,
//! and the requested protection, and produces the final MIME tree.

use chrono::{DateTime, FixedOffset, Local};
use log::debug;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::mime::encoded_word::ew_encode;
use crate::mime::model::{MimePart, MIME_VERSION};
use crate::pgp::{
    protect, Backend, CryptoContext, Error, Operation, Protection,
};

/// Headers which `OutgoingMessage` computes itself but which an extra header
/// of the same name replaces.
const OVERRIDABLE: &[&str] = &["From", "To", "Reply-To"];

/// Another rendering of the body, e.g. `text/html`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alternative {
    /// The subtype of `text`.
    pub subtype: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct OutgoingMessage<K> {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub reply_to: Vec<String>,
    pub subject: String,
    /// The `text/plain` body.
    pub body: String,
    /// The charset text parts are encoded in when they are not pure ASCII.
    pub charset: String,
    pub alternatives: Vec<Alternative>,
    pub attachments: Vec<Attachment>,
    /// Additional headers, added in order after the computed ones.
    ///
    /// `From`, `To`, and `Reply-To` here replace the computed values;
    /// `Date` and `Message-ID` here suppress generation of those headers.
    pub extra_headers: Vec<(String, String)>,
    /// The date to put in the `Date` header. If `None`, the current time.
    pub date: Option<DateTime<FixedOffset>>,
    pub protection: Protection<K>,
}

impl<K> Default for OutgoingMessage<K> {
    fn default() -> Self {
        OutgoingMessage {
            from: String::new(),
            to: Vec::new(),
            cc: Vec::new(),
            reply_to: Vec::new(),
            subject: String::new(),
            body: String::new(),
            charset: "utf-8".to_owned(),
            alternatives: Vec::new(),
            attachments: Vec::new(),
            extra_headers: Vec::new(),
            date: None,
            protection: Protection::new(),
        }
    }
}

impl<K> OutgoingMessage<K> {
    pub fn new(subject: &str, body: &str, from: &str, to: &[&str]) -> Self {
        OutgoingMessage {
            from: from.to_owned(),
            to: to.iter().map(|&s| s.to_owned()).collect(),
            subject: subject.to_owned(),
            body: body.to_owned(),
            ..Self::default()
        }
    }

    pub fn attach_alternative(&mut self, content: &str, subtype: &str) {
        self.alternatives.push(Alternative {
            subtype: subtype.to_owned(),
            content: content.to_owned(),
        });
    }

    pub fn attach(&mut self, filename: &str, content_type: &str, data: Vec<u8>) {
        self.attachments.push(Attachment {
            filename: filename.to_owned(),
            content_type: content_type.to_owned(),
            data,
        });
    }

    /// The operation `protected_message` will apply under `context`, if
    /// any.
    pub fn operation(&self, context: &CryptoContext<K>) -> Option<Operation> {
        self.protection.operation(context)
    }

    /// Builds the message without any protection.
    ///
    /// The result is a single text part if there are neither alternatives
    /// nor attachments. Otherwise, the body and its alternatives are grouped
    /// in `multipart/alternative`, and that (or the lone body) is grouped
    /// with the attachments in `multipart/mixed`.
    pub fn message(&self) -> MimePart {
        let mut content =
            MimePart::text_with_charset(&self.body, "plain", &self.charset);

        if !self.alternatives.is_empty() {
            let mut parts = vec![content];
            for alternative in &self.alternatives {
                parts.push(MimePart::text_with_charset(
                    &alternative.content,
                    &alternative.subtype,
                    &self.charset,
                ));
            }
            content = MimePart::container("alternative", parts);
        }

        if !self.attachments.is_empty() {
            let mut parts = vec![content];
            for attachment in &self.attachments {
                parts.push(MimePart::attachment(
                    &attachment.filename,
                    &attachment.content_type,
                    attachment.data.clone(),
                ));
            }
            content = MimePart::container("mixed", parts);
        }

        self.add_headers(&mut content);
        content
    }

    /// Builds the message and applies the requested protection.
    ///
    /// If neither signing nor encryption is requested, by `protection` or by
    /// signers in `context`, this is the same as `message()`.
    pub fn protected_message<B>(
        &self,
        backend: &B,
        context: &CryptoContext<K>,
    ) -> Result<MimePart, Error>
    where
        B: Backend<Key = K> + ?Sized,
    {
        let message = self.message();
        match self.operation(context) {
            None => Ok(message),
            Some(operation) => {
                debug!("Applying {:?} to outgoing message", operation);
                protect(backend, message, &self.protection, context)
            },
        }
    }

    fn add_headers(&self, part: &mut MimePart) {
        let extra = |name: &str| {
            self.extra_headers
                .iter()
                .find(|entry| entry.0.eq_ignore_ascii_case(name))
                .map(|entry| entry.1.clone())
        };

        let headers = part.headers_mut();
        headers.add("Subject", ew_encode(&self.subject).into_owned());

        let from = extra("From").unwrap_or_else(|| encode_address(&self.from));
        if !from.is_empty() {
            headers.add("From", from);
        }
        if let Some(to) = extra("To").or_else(|| address_list(&self.to)) {
            headers.add("To", to);
        }
        if let Some(cc) = address_list(&self.cc) {
            headers.add("Cc", cc);
        }
        if let Some(reply_to) =
            extra("Reply-To").or_else(|| address_list(&self.reply_to))
        {
            headers.add("Reply-To", reply_to);
        }

        if extra("Date").is_none() {
            let date = match self.date {
                Some(date) => date.to_rfc2822(),
                None => Local::now().to_rfc2822(),
            };
            headers.add("Date", date);
        }
        if extra("Message-ID").is_none() {
            headers.add("Message-ID", generate_message_id(&self.from));
        }
        headers.add(MIME_VERSION, "1.0");

        for &(ref name, ref value) in &self.extra_headers {
            if !OVERRIDABLE.iter().any(|o| o.eq_ignore_ascii_case(name)) {
                headers.add(name.as_str(), value.as_str());
            }
        }
    }
}

fn address_list(addresses: &[String]) -> Option<String> {
    if addresses.is_empty() {
        None
    } else {
        Some(
            addresses
                .iter()
                .map(|a| encode_address(a))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

/// Encodes the display name of `Name <addr>` if it is not plain ASCII.
fn encode_address(address: &str) -> String {
    if address.is_ascii() {
        return address.to_owned();
    }

    match address.rfind('<') {
        Some(lt) => {
            let name = address[..lt].trim().trim_matches('"');
            format!("{} {}", ew_encode(name), &address[lt..])
        },
        None => address.to_owned(),
    }
}

fn generate_message_id(from: &str) -> String {
    let domain = from
        .rsplit('@')
        .next()
        .filter(|_| from.contains('@'))
        .map(|d| d.trim_end_matches('>').trim())
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost");
    let unique: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .collect();
    format!(
        "<{}.{}@{}>",
        Local::now().format("%Y%m%d%H%M%S"),
        unique,
        domain
    )
}
