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

//! RFC 3156 OpenPGP/MIME protection of outgoing messages.
//!
//! `builder::build` turns a plaintext part into a `multipart/signed` or
//! `multipart/encrypted` sub-tree; `merge::protect` does the same for a
//! complete message and splices the result back into it.

pub mod backend;
pub mod builder;
pub mod error;
pub mod gpg;
pub mod merge;
pub mod model;

pub use self::backend::{
    Backend, CryptoContext, EncryptFlags, HashAlgorithm, Signature,
    SignatureMode,
};
pub use self::builder::build;
pub use self::error::{Error, KeyProblem};
pub use self::merge::{merge, plaintext_input, protect};
pub use self::model::{
    KeyRef, Operation, Protection, PGP_ENCRYPTED, PGP_SIGNATURE,
};
