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

use super::backend::CryptoContext;

/// `protocol` of `multipart/encrypted` (RFC 3156 4).
pub const PGP_ENCRYPTED: &str = "application/pgp-encrypted";
/// `protocol` of `multipart/signed` (RFC 3156 5).
pub const PGP_SIGNATURE: &str = "application/pgp-signature";

/// What is done to a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Sign,
    Encrypt,
    /// Sign and encrypt in one pass. On the wire this is indistinguishable
    /// from `Encrypt`; the signature is inside the ciphertext.
    SignAndEncrypt,
}

impl Operation {
    /// Determines the operation from whether there is anyone to sign as and
    /// anyone to encrypt to. Returns `None` if there is neither.
    pub fn select(has_signers: bool, has_recipients: bool) -> Option<Self> {
        match (has_signers, has_recipients) {
            (true, true) => Some(Operation::SignAndEncrypt),
            (false, true) => Some(Operation::Encrypt),
            (true, false) => Some(Operation::Sign),
            (false, false) => None,
        }
    }

    /// The RFC 3156 `protocol` parameter of the root container.
    pub fn protocol(self) -> &'static str {
        match self {
            Operation::Sign => PGP_SIGNATURE,
            Operation::Encrypt | Operation::SignAndEncrypt => PGP_ENCRYPTED,
        }
    }

    /// The subtype of the `multipart` root container.
    pub fn multipart_subtype(self) -> &'static str {
        match self {
            Operation::Sign => "signed",
            Operation::Encrypt | Operation::SignAndEncrypt => "encrypted",
        }
    }
}

/// A reference to a key, either already resolved or still to be looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyRef<K> {
    Handle(K),
    Id(String),
}

impl<K> From<&str> for KeyRef<K> {
    fn from(id: &str) -> Self {
        KeyRef::Id(id.to_owned())
    }
}

impl<K> From<String> for KeyRef<K> {
    fn from(id: String) -> Self {
        KeyRef::Id(id)
    }
}

/// Who a message is signed as and encrypted to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Protection<K> {
    pub signers: Vec<KeyRef<K>>,
    pub recipients: Vec<KeyRef<K>>,
    /// Passed through to the backend; never interpreted here.
    pub always_trust: bool,
}

impl<K> Default for Protection<K> {
    fn default() -> Self {
        Protection {
            signers: Vec::new(),
            recipients: Vec::new(),
            always_trust: false,
        }
    }
}

impl<K> Protection<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_as(mut self, key: impl Into<KeyRef<K>>) -> Self {
        self.signers.push(key.into());
        self
    }

    pub fn encrypt_to(mut self, key: impl Into<KeyRef<K>>) -> Self {
        self.recipients.push(key.into());
        self
    }

    pub fn always_trust(mut self, always_trust: bool) -> Self {
        self.always_trust = always_trust;
        self
    }

    /// The operation this protection calls for under `context`, whose
    /// pre-configured signers count as signers.
    pub fn operation(&self, context: &CryptoContext<K>) -> Option<Operation> {
        Operation::select(
            !self.signers.is_empty() || !context.signers().is_empty(),
            !self.recipients.is_empty(),
        )
    }
}
