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

//! Construction of the RFC 3156 sub-tree for a plaintext part.

use log::debug;

use super::backend::{
    Backend, CryptoContext, EncryptFlags, HashAlgorithm, Signature,
    SignatureMode,
};
use super::model::{
    KeyRef, Operation, Protection, PGP_ENCRYPTED, PGP_SIGNATURE,
};
use super::Error;
use crate::mime::header::{ContentDisposition, ContentType};
use crate::mime::model::{
    Body, MimePart, CONTENT_DESCRIPTION, CONTENT_DISPOSITION,
};

/// RFC 3156 4: the body of the `application/pgp-encrypted` control part.
pub const VERSION_IDENTIFICATION: &[u8] = b"Version: 1\n";

const ENCRYPTED_FILENAME: &str = "encrypted.asc";
const SIGNATURE_FILENAME: &str = "signature.asc";

/// Protects `plaintext` as described by `protection`.
///
/// If there are recipients, the result is a `multipart/encrypted` container
/// holding the version identification part and the armored ciphertext of the
/// whole `plaintext` part (headers included); it is also signed if there are
/// signers, either in `protection` or pre-configured in `context`.
/// Otherwise, the result is a `multipart/signed` container holding
/// `plaintext` itself followed by a detached signature.
///
/// Explicit signers take the place of the signers of `context`. Output is
/// always requested ASCII-armored, whatever `context` says.
///
/// Containers within `plaintext` which lack a boundary are given one, since
/// the bytes that are signed or encrypted must be exactly those that are
/// eventually sent. The plaintext is otherwise not altered.
pub fn build<B: Backend + ?Sized>(
    backend: &B,
    plaintext: impl Into<MimePart>,
    protection: &Protection<B::Key>,
    context: &CryptoContext<B::Key>,
) -> Result<MimePart, Error> {
    let operation = protection
        .operation(context)
        .ok_or(Error::Configuration)?;

    let mut plaintext = plaintext.into();
    plaintext.assign_missing_boundaries();

    let signers = resolve_all(backend, &protection.signers)?;
    let recipients = resolve_all(backend, &protection.recipients)?;

    let mut context = context.clone().with_armor(true);
    if !signers.is_empty() {
        context = context.with_signers(signers);
    }

    let input = plaintext.to_bytes();

    match operation {
        Operation::Sign => {
            debug!(
                "Signing {} bytes as {:?}",
                input.len(),
                context.signers()
            );
            let signature =
                backend.sign(&input, SignatureMode::Detached, &context)?;
            Ok(signed(plaintext, signature, context.digest()))
        },

        Operation::Encrypt | Operation::SignAndEncrypt => {
            let mut flags = EncryptFlags::empty();
            if protection.always_trust {
                flags |= EncryptFlags::ALWAYS_TRUST;
            }

            let ciphertext = if Operation::SignAndEncrypt == operation {
                debug!(
                    "Encrypting {} bytes to {:?}, signed as {:?}",
                    input.len(),
                    recipients,
                    context.signers()
                );
                backend.encrypt_and_sign(&input, &recipients, flags, &context)?
            } else {
                debug!(
                    "Encrypting {} bytes to {:?}",
                    input.len(),
                    recipients
                );
                backend.encrypt(&input, &recipients, flags, &context)?
            };

            Ok(encrypted(ciphertext))
        },
    }
}

fn resolve_all<B: Backend + ?Sized>(
    backend: &B,
    keys: &[KeyRef<B::Key>],
) -> Result<Vec<B::Key>, Error> {
    keys.iter()
        .map(|key| match *key {
            KeyRef::Handle(ref handle) => Ok(handle.clone()),
            KeyRef::Id(ref id) => backend.resolve_key(id),
        })
        .collect()
}

fn signed(
    plaintext: MimePart,
    signature: Signature,
    fallback_digest: HashAlgorithm,
) -> MimePart {
    let mut signature_part = MimePart::leaf(
        &ContentType::new("application", "pgp-signature")
            .with_parm("name", SIGNATURE_FILENAME),
        Body::verbatim(signature.data),
    );
    signature_part
        .headers_mut()
        .add(CONTENT_DESCRIPTION, "OpenPGP digital signature");
    signature_part.headers_mut().add(
        CONTENT_DISPOSITION,
        ContentDisposition::new("attachment")
            .with_parm("filename", SIGNATURE_FILENAME)
            .to_string(),
    );

    let mut container =
        MimePart::container("signed", vec![plaintext, signature_part]);
    let content_type = container
        .content_type()
        .with_parm("protocol", PGP_SIGNATURE)
        .with_parm(
            "micalg",
            signature.digest.unwrap_or(fallback_digest).micalg(),
        );
    container.set_content_type(&content_type);
    container
}

fn encrypted(ciphertext: Vec<u8>) -> MimePart {
    let mut control = MimePart::leaf(
        &ContentType::new("application", "pgp-encrypted"),
        Body::verbatim(VERSION_IDENTIFICATION),
    );
    control
        .headers_mut()
        .add(CONTENT_DESCRIPTION, "PGP/MIME version identification");

    let mut data = MimePart::leaf(
        &ContentType::new("application", "octet-stream")
            .with_parm("name", ENCRYPTED_FILENAME),
        Body::verbatim(ciphertext),
    );
    data.headers_mut()
        .add(CONTENT_DESCRIPTION, "OpenPGP encrypted message");
    data.headers_mut().add(
        CONTENT_DISPOSITION,
        ContentDisposition::new("inline")
            .with_parm("filename", ENCRYPTED_FILENAME)
            .to_string(),
    );

    let mut container = MimePart::container("encrypted", vec![control, data]);
    let content_type = container
        .content_type()
        .with_parm("protocol", PGP_ENCRYPTED);
    container.set_content_type(&content_type);
    container
}
