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

//! Splicing a protected sub-tree back into a complete message.
//!
//! The message a host hands over already carries the envelope headers
//! (`From`, `Subject`, ...) and possibly attachments or alternative bodies.
//! Only the content is protected; the envelope headers stay outside the
//! RFC 3156 structure where transport can see them.

use log::debug;

use super::backend::{Backend, CryptoContext, HashAlgorithm};
use super::builder::build;
use super::model::{Operation, Protection};
use super::Error;
use crate::mime::model::{
    Headers, MimePart, CONTENT_TRANSFER_ENCODING, CONTENT_TYPE,
};

const CONTENT_PREFIX: &str = "content-";

/// Extracts the part of `original` which gets signed or encrypted.
///
/// The children of a container are re-rooted under a fresh
/// `multipart/alternative` container. A leaf is reduced to its body and its
/// own `Content-*` headers, dropping the message-level headers.
pub fn plaintext_input(original: &MimePart) -> MimePart {
    match *original {
        MimePart::Container { ref children, .. } => {
            MimePart::container("alternative", children.clone())
        },
        MimePart::Leaf {
            ref headers,
            ref body,
        } => {
            let mut content_headers = Headers::new();
            for (name, value) in headers.iter() {
                if is_content_header(name) {
                    content_headers.add(name, value);
                }
            }

            MimePart::Leaf {
                headers: content_headers,
                body: body.clone(),
            }
        },
    }
}

/// Merges `protected`, the output of `build` for `operation`, into
/// `original`.
///
/// A container keeps its headers; its children are replaced by those of
/// `protected` and its `Content-Type` becomes the RFC 3156 one, keeping the
/// existing boundary. A leaf is replaced by a new container carrying every
/// header of the original other than `Content-Type` and
/// `Content-Transfer-Encoding`.
pub fn merge(
    original: MimePart,
    protected: MimePart,
    operation: Operation,
) -> MimePart {
    let protected_type = protected.content_type();
    let children = match protected {
        MimePart::Container { children, .. } => children,
        leaf @ MimePart::Leaf { .. } => vec![leaf],
    };

    let micalg = if Operation::Sign == operation {
        Some(
            protected_type
                .parm("micalg")
                .map(str::to_owned)
                .unwrap_or_else(|| {
                    HashAlgorithm::default().micalg().to_owned()
                }),
        )
    } else {
        None
    };

    match original {
        MimePart::Container { headers, .. } => {
            let mut merged = MimePart::Container { headers, children };
            let mut content_type = merged.content_type();
            content_type.subtype = operation.multipart_subtype().to_owned();
            content_type.parms.set("protocol", operation.protocol());
            match micalg {
                Some(micalg) => content_type.parms.set("micalg", micalg),
                None => {
                    content_type.parms.remove("micalg");
                },
            }
            if content_type.parm("boundary").is_none() {
                if let Some(boundary) = protected_type.parm("boundary") {
                    content_type.parms.set("boundary", boundary);
                }
            }
            merged.set_content_type(&content_type);

            debug!(
                "Merged protected content into existing container: {}",
                content_type
            );
            merged
        },

        MimePart::Leaf { headers, .. } => {
            let mut merged_headers = Headers::new();
            for (name, value) in headers.iter() {
                if !name.eq_ignore_ascii_case(CONTENT_TYPE)
                    && !name.eq_ignore_ascii_case(CONTENT_TRANSFER_ENCODING)
                {
                    merged_headers.add(name, value);
                }
            }

            let mut merged = MimePart::Container {
                headers: merged_headers,
                children,
            };
            let mut content_type = protected_type;
            content_type.subtype = operation.multipart_subtype().to_owned();
            content_type.parms.set("protocol", operation.protocol());
            if let Some(micalg) = micalg {
                content_type.parms.set("micalg", micalg);
            }
            merged.set_content_type(&content_type);

            debug!("Wrapped single-part message: {}", content_type);
            merged
        },
    }
}

/// Protects the content of `original` and merges the result back in.
///
/// Errors from `build` are returned unchanged. Once `build` succeeds the
/// merge cannot fail.
pub fn protect<B: Backend + ?Sized>(
    backend: &B,
    original: MimePart,
    protection: &Protection<B::Key>,
    context: &CryptoContext<B::Key>,
) -> Result<MimePart, Error> {
    let operation = protection
        .operation(context)
        .ok_or(Error::Configuration)?;
    let input = plaintext_input(&original);
    let protected = build(backend, input, protection, context)?;
    Ok(merge(original, protected, operation))
}

fn is_content_header(name: &str) -> bool {
    name.len() > CONTENT_PREFIX.len()
        && name
            .get(..CONTENT_PREFIX.len())
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case(CONTENT_PREFIX))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mime::header::ContentType;
    use crate::mime::model::{Body, MIME_VERSION};
    use crate::pgp::{PGP_ENCRYPTED, PGP_SIGNATURE};
    use crate::test_data::*;

    fn single_part() -> MimePart {
        let mut part = MimePart::text("Hi Bob");
        let headers = part.headers_mut();
        headers.add("Subject", "Greetings");
        headers.add("From", "alice@example.com");
        headers.add("To", "bob@example.com");
        headers.add(MIME_VERSION, "1.0");
        part
    }

    fn with_attachments() -> MimePart {
        let mut part = MimePart::container(
            "mixed",
            vec![
                MimePart::text("See attached"),
                MimePart::attachment("a.txt", "text/plain", b"aaa".to_vec()),
                MimePart::attachment("b.png", "image/png", vec![0x89, 0x50]),
            ],
        );
        let headers = part.headers_mut();
        headers.add("Subject", "Files");
        headers.add(MIME_VERSION, "1.0");
        part
    }

    #[test]
    fn plaintext_input_of_leaf() {
        let input = plaintext_input(&single_part());
        assert_eq!(MimePart::text("Hi Bob"), input);
        assert!(!input.headers().contains("Subject"));
        assert!(!input.headers().contains(MIME_VERSION));
    }

    #[test]
    fn plaintext_input_of_container() {
        let original = with_attachments();
        let input = plaintext_input(&original);
        assert!(input.content_type().is_subtype("alternative"));
        assert!(input.content_type().parm("boundary").is_some());
        assert_eq!(original.children(), input.children());
        assert!(!input.headers().contains("Subject"));
    }

    #[test]
    fn content_headers() {
        assert!(is_content_header("Content-Type"));
        assert!(is_content_header("CONTENT-language"));
        assert!(!is_content_header("Content-"));
        assert!(!is_content_header("Subject"));
        assert!(!is_content_header("X-Content-Type"));
    }

    #[test]
    fn sign_single_part() {
        let backend = FakeBackend::new();
        let result = protect(
            &backend,
            single_part(),
            &Protection::new().sign_as("A"),
            &CryptoContext::new(),
        )
        .unwrap();

        let ct = result.content_type();
        assert!(ct.is_subtype("signed"));
        assert_eq!(Some(PGP_SIGNATURE), ct.parm("protocol"));
        assert_eq!(Some("pgp-sha256"), ct.parm("micalg"));
        assert!(ct.parm("boundary").is_some());

        assert_eq!(
            vec![
                ("Subject", "Greetings"),
                ("From", "alice@example.com"),
                ("To", "bob@example.com"),
                (MIME_VERSION, "1.0"),
            ],
            result
                .headers()
                .iter()
                .filter(|&(name, _)| name != CONTENT_TYPE)
                .collect::<Vec<_>>()
        );
        assert!(!result.headers().contains(CONTENT_TRANSFER_ENCODING));

        let children = result.children();
        assert_eq!(2, children.len());
        assert_eq!(MimePart::text("Hi Bob"), children[0]);
        assert_eq!(Some("signature.asc".to_owned()), children[1].filename());
    }

    #[test]
    fn encrypt_single_part() {
        let backend = FakeBackend::new();
        let result = protect(
            &backend,
            single_part(),
            &Protection::new().encrypt_to("B"),
            &CryptoContext::new(),
        )
        .unwrap();

        let ct = result.content_type();
        assert!(ct.is_subtype("encrypted"));
        assert_eq!(Some(PGP_ENCRYPTED), ct.parm("protocol"));
        assert_eq!(None, ct.parm("micalg"));
        assert_eq!(Some("Greetings"), result.headers().get("Subject"));

        let data = &result.children()[1];
        assert_eq!(
            MimePart::text("Hi Bob").to_bytes(),
            fake_decrypt(&data.body().unwrap().data)
        );
    }

    #[test]
    fn sign_container_keeps_attachments() {
        let original = with_attachments();
        let original_boundary = original
            .content_type()
            .parm("boundary")
            .map(str::to_owned);

        let backend = FakeBackend::new();
        let result = protect(
            &backend,
            original.clone(),
            &Protection::new().sign_as("A"),
            &CryptoContext::new(),
        )
        .unwrap();

        let ct = result.content_type();
        assert!(ct.is_subtype("signed"));
        assert_eq!(Some(PGP_SIGNATURE), ct.parm("protocol"));
        assert_eq!(Some("pgp-sha256"), ct.parm("micalg"));
        assert_eq!(original_boundary.as_deref(), ct.parm("boundary"));
        assert_eq!(Some("Files"), result.headers().get("Subject"));

        let signed = &result.children()[0];
        assert!(signed.content_type().is_subtype("alternative"));
        assert_eq!(original.children(), signed.children());
        assert_eq!(
            vec![None, Some("a.txt".to_owned()), Some("b.png".to_owned())],
            signed
                .children()
                .iter()
                .map(MimePart::filename)
                .collect::<Vec<_>>()
        );

        match backend.calls().pop() {
            Some(Call::Sign { input, .. }) => {
                assert_eq!(signed.to_bytes(), input)
            },
            call => panic!("unexpected call: {:?}", call),
        }
    }

    #[test]
    fn encrypt_container_keeps_attachments() {
        let original = with_attachments();
        let backend = FakeBackend::new();
        let result = protect(
            &backend,
            original.clone(),
            &Protection::new().sign_as("A").encrypt_to("B"),
            &CryptoContext::new(),
        )
        .unwrap();

        let ct = result.content_type();
        assert!(ct.is_subtype("encrypted"));
        assert_eq!(Some(PGP_ENCRYPTED), ct.parm("protocol"));
        assert_eq!(2, result.children().len());

        let plaintext =
            fake_decrypt(&result.children()[1].body().unwrap().data);
        let plaintext = String::from_utf8(plaintext).unwrap();
        assert!(plaintext.contains("multipart/alternative"));
        assert!(plaintext.contains("filename=\"a.txt\""));
        assert!(plaintext.contains("filename=\"b.png\""));

        assert_matches!(
            [Call::EncryptAndSign { .. }],
            backend.calls().as_slice()
        );
    }

    #[test]
    fn merge_uses_reported_micalg() {
        let protected = MimePart::Container {
            headers: {
                let mut headers = Headers::new();
                headers.add(
                    CONTENT_TYPE,
                    ContentType::new("multipart", "signed")
                        .with_parm("boundary", "b")
                        .with_parm("micalg", "pgp-sha512")
                        .to_string(),
                );
                headers
            },
            children: vec![
                MimePart::text("x"),
                MimePart::leaf(
                    &ContentType::new("application", "pgp-signature"),
                    Body::verbatim(FAKE_SIGNATURE),
                ),
            ],
        };

        let merged =
            merge(with_attachments(), protected.clone(), Operation::Sign);
        assert_eq!(Some("pgp-sha512"), merged.content_type().parm("micalg"));

        let merged = merge(single_part(), protected, Operation::Sign);
        assert_eq!(Some("pgp-sha512"), merged.content_type().parm("micalg"));
        assert_eq!(Some("b"), merged.content_type().parm("boundary"));
    }

    #[test]
    fn merge_defaults_micalg_for_signing() {
        let protected = MimePart::container(
            "signed",
            vec![MimePart::text("x"), MimePart::text("y")],
        );
        let merged = merge(single_part(), protected, Operation::Sign);
        assert_eq!(Some("pgp-sha256"), merged.content_type().parm("micalg"));
    }

    #[test]
    fn errors_propagate() {
        let backend = FakeBackend::failing("gpg exploded");
        assert_matches!(
            Err(Error::CryptoOperation(_)),
            protect(
                &backend,
                with_attachments(),
                &Protection::new().encrypt_to("B"),
                &CryptoContext::new(),
            )
        );

        let backend = FakeBackend::new();
        assert_matches!(
            Err(Error::Configuration),
            protect(
                &backend,
                single_part(),
                &Protection::new(),
                &CryptoContext::new(),
            )
        );
        assert_matches!(
            Err(Error::KeyResolution { .. }),
            protect(
                &backend,
                single_part(),
                &Protection::new().encrypt_to("nobody"),
                &CryptoContext::new(),
            )
        );
    }
}
