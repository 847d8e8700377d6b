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

//! The interface to the OpenPGP implementation which does the actual
//! cryptography.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use super::Error;

bitflags! {
    /// Modifiers for an encryption request.
    pub struct EncryptFlags: u32 {
        /// Use recipient keys even if they are not trusted.
        const ALWAYS_TRUST = 1 << 0;
    }
}

/// How a signature relates to the data it signs.
///
/// PGP/MIME only ever uses detached signatures; the mode is still passed
/// explicitly so a backend never falls back to an inline or clear-signed
/// default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureMode {
    Detached,
}

/// Hash algorithms which may be named in the `micalg` parameter of
/// `multipart/signed` (RFC 3156 5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Ripemd160,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// The value of the `micalg` parameter for this algorithm.
    pub fn micalg(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "pgp-md5",
            HashAlgorithm::Sha1 => "pgp-sha1",
            HashAlgorithm::Ripemd160 => "pgp-ripemd160",
            HashAlgorithm::Sha224 => "pgp-sha224",
            HashAlgorithm::Sha256 => "pgp-sha256",
            HashAlgorithm::Sha384 => "pgp-sha384",
            HashAlgorithm::Sha512 => "pgp-sha512",
        }
    }

    /// Maps an RFC 4880 9.4 hash algorithm number.
    pub fn from_openpgp_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(HashAlgorithm::Md5),
            2 => Some(HashAlgorithm::Sha1),
            3 => Some(HashAlgorithm::Ripemd160),
            8 => Some(HashAlgorithm::Sha256),
            9 => Some(HashAlgorithm::Sha384),
            10 => Some(HashAlgorithm::Sha512),
            11 => Some(HashAlgorithm::Sha224),
            _ => None,
        }
    }
}

/// SHA-256 is what GnuPG has defaulted to for a long time.
impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.micalg()["pgp-".len()..])
    }
}

/// Accepts both the bare name (`sha256`) and the `micalg` form
/// (`pgp-sha256`), case-insensitively.
impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        let lower = s.to_ascii_lowercase();
        let name = lower.strip_prefix("pgp-").unwrap_or(lower.as_str());
        match name {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "ripemd160" => Ok(HashAlgorithm::Ripemd160),
            "sha224" => Ok(HashAlgorithm::Sha224),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(format!("unknown hash algorithm: {}", s)),
        }
    }
}

/// A detached signature as produced by a `Backend`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// The armored signature.
    pub data: Vec<u8>,
    /// The digest the backend used, if it is able to tell.
    pub digest: Option<HashAlgorithm>,
}

/// Configuration for a single call into a `Backend`.
///
/// This is an immutable value: deriving a modified context produces a new
/// one, so a context shared between callers is never changed underneath
/// them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CryptoContext<K> {
    armor: bool,
    signers: Vec<K>,
    digest: HashAlgorithm,
}

impl<K> Default for CryptoContext<K> {
    fn default() -> Self {
        CryptoContext {
            armor: false,
            signers: Vec::new(),
            digest: HashAlgorithm::default(),
        }
    }
}

impl<K> CryptoContext<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a context which requests ASCII-armored output iff `armor`.
    pub fn with_armor(self, armor: bool) -> Self {
        CryptoContext { armor, ..self }
    }

    /// Returns a context with the given pre-configured signers.
    pub fn with_signers(self, signers: Vec<K>) -> Self {
        CryptoContext { signers, ..self }
    }

    /// Returns a context advertising `digest` when the backend does not
    /// report the digest it used.
    pub fn with_digest(self, digest: HashAlgorithm) -> Self {
        CryptoContext { digest, ..self }
    }

    pub fn armor(&self) -> bool {
        self.armor
    }

    pub fn signers(&self) -> &[K] {
        &self.signers
    }

    pub fn digest(&self) -> HashAlgorithm {
        self.digest
    }
}

/// An OpenPGP implementation.
///
/// All operations block until complete. Output is ASCII-armored whenever the
/// context asks for it.
pub trait Backend {
    /// A concrete key, compared with the backend's own notion of identity.
    type Key: Clone + PartialEq + fmt::Debug;

    /// Looks up the single key matching `identifier`.
    ///
    /// Fails with `Error::KeyResolution` if there is no such key or more
    /// than one.
    fn resolve_key(&self, identifier: &str) -> Result<Self::Key, Error>;

    /// Signs `input` with the context's signers.
    fn sign(
        &self,
        input: &[u8],
        mode: SignatureMode,
        context: &CryptoContext<Self::Key>,
    ) -> Result<Signature, Error>;

    /// Encrypts `input` to `recipients`.
    fn encrypt(
        &self,
        input: &[u8],
        recipients: &[Self::Key],
        flags: EncryptFlags,
        context: &CryptoContext<Self::Key>,
    ) -> Result<Vec<u8>, Error>;

    /// Signs `input` with the context's signers and encrypts the result to
    /// `recipients` in one pass.
    fn encrypt_and_sign(
        &self,
        input: &[u8],
        recipients: &[Self::Key],
        flags: EncryptFlags,
        context: &CryptoContext<Self::Key>,
    ) -> Result<Vec<u8>, Error>;
}
