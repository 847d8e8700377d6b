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

//! Fixtures shared by the unit tests.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::pgp::{
    Backend, CryptoContext, EncryptFlags, Error, HashAlgorithm, KeyProblem,
    Signature, SignatureMode,
};

pub static FAKE_SIGNATURE: &[u8] = b"-----BEGIN PGP SIGNATURE-----\n\
\n\
iQEzBAABCAAdFiEEZmFrZSBzaWduYXR1cmUgZm9yIHRlc3Rz\n\
=fake\n\
-----END PGP SIGNATURE-----\n";

const MESSAGE_HEADER: &str = "-----BEGIN PGP MESSAGE-----\n\n";
const MESSAGE_FOOTER: &str = "\n-----END PGP MESSAGE-----\n";

/// A key known to `FakeBackend`, identified by a fake fingerprint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeKey(pub String);

/// A call made into `FakeBackend`, with the context it saw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Sign {
        input: Vec<u8>,
        signers: Vec<FakeKey>,
        armor: bool,
    },
    Encrypt {
        input: Vec<u8>,
        recipients: Vec<FakeKey>,
        flags: EncryptFlags,
        armor: bool,
    },
    EncryptAndSign {
        input: Vec<u8>,
        recipients: Vec<FakeKey>,
        signers: Vec<FakeKey>,
        flags: EncryptFlags,
        armor: bool,
    },
}

/// A `Backend` which records what it is asked to do.
///
/// "Encryption" base64-encodes the input inside PGP message armor, so tests
/// can recover the plaintext with `fake_decrypt`.
#[derive(Debug)]
pub struct FakeBackend {
    keys: BTreeMap<String, Vec<FakeKey>>,
    /// Reported as the digest of every signature.
    pub digest: Option<HashAlgorithm>,
    /// If set, every signing or encryption operation fails with this.
    pub failure: Option<String>,
    calls: RefCell<Vec<Call>>,
}

impl FakeBackend {
    /// A backend with keys `A`, `B`, `alice@example.com` (which is `A`
    /// again), and `dup` (which matches both).
    pub fn new() -> Self {
        let a = FakeKey("AAAA".to_owned());
        let b = FakeKey("BBBB".to_owned());
        let mut keys = BTreeMap::new();
        keys.insert("A".to_owned(), vec![a.clone()]);
        keys.insert("B".to_owned(), vec![b.clone()]);
        keys.insert("alice@example.com".to_owned(), vec![a.clone()]);
        keys.insert("dup".to_owned(), vec![a, b]);

        FakeBackend {
            keys,
            digest: None,
            failure: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        FakeBackend {
            failure: Some(message.to_owned()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn check_failure(&self) -> Result<(), Error> {
        match self.failure {
            Some(ref message) => Err(Error::CryptoOperation(message.clone())),
            None => Ok(()),
        }
    }
}

impl Backend for FakeBackend {
    type Key = FakeKey;

    fn resolve_key(&self, identifier: &str) -> Result<FakeKey, Error> {
        let problem = match self.keys.get(identifier).map(Vec::as_slice) {
            Some(&[ref key]) => return Ok(key.clone()),
            None | Some(&[]) => KeyProblem::NotFound,
            Some(keys) => KeyProblem::Ambiguous(keys.len()),
        };

        Err(Error::KeyResolution {
            identifier: identifier.to_owned(),
            problem,
        })
    }

    fn sign(
        &self,
        input: &[u8],
        mode: SignatureMode,
        context: &CryptoContext<FakeKey>,
    ) -> Result<Signature, Error> {
        assert_eq!(SignatureMode::Detached, mode);
        self.calls.borrow_mut().push(Call::Sign {
            input: input.to_vec(),
            signers: context.signers().to_vec(),
            armor: context.armor(),
        });
        self.check_failure()?;

        Ok(Signature {
            data: FAKE_SIGNATURE.to_vec(),
            digest: self.digest,
        })
    }

    fn encrypt(
        &self,
        input: &[u8],
        recipients: &[FakeKey],
        flags: EncryptFlags,
        context: &CryptoContext<FakeKey>,
    ) -> Result<Vec<u8>, Error> {
        self.calls.borrow_mut().push(Call::Encrypt {
            input: input.to_vec(),
            recipients: recipients.to_vec(),
            flags,
            armor: context.armor(),
        });
        self.check_failure()?;
        Ok(fake_encrypt(input))
    }

    fn encrypt_and_sign(
        &self,
        input: &[u8],
        recipients: &[FakeKey],
        flags: EncryptFlags,
        context: &CryptoContext<FakeKey>,
    ) -> Result<Vec<u8>, Error> {
        self.calls.borrow_mut().push(Call::EncryptAndSign {
            input: input.to_vec(),
            recipients: recipients.to_vec(),
            signers: context.signers().to_vec(),
            flags,
            armor: context.armor(),
        });
        self.check_failure()?;
        Ok(fake_encrypt(input))
    }
}

fn fake_encrypt(input: &[u8]) -> Vec<u8> {
    format!("{}{}{}", MESSAGE_HEADER, base64::encode(input), MESSAGE_FOOTER)
        .into_bytes()
}

/// Inverts the "encryption" of `FakeBackend`.
pub fn fake_decrypt(armored: &[u8]) -> Vec<u8> {
    let armored = std::str::from_utf8(armored).unwrap();
    let payload = armored
        .strip_prefix(MESSAGE_HEADER)
        .and_then(|s| s.strip_suffix(MESSAGE_FOOTER))
        .expect("not a fake PGP message");
    base64::decode(payload).unwrap()
}
