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

use std::fmt;

use thiserror::Error;

/// Why protecting a message failed.
///
/// Every variant is terminal for the message being built: nothing is retried
/// and no partial MIME tree is ever returned.
#[derive(Error, Debug)]
pub enum Error {
    /// Neither signing nor encryption was requested.
    #[error("no signers or recipients given")]
    Configuration,
    /// A key identifier did not resolve to exactly one key.
    #[error("key {identifier:?} {problem}")]
    KeyResolution {
        identifier: String,
        problem: KeyProblem,
    },
    /// The OpenPGP backend failed to sign or encrypt.
    #[error("OpenPGP operation failed: {0}")]
    CryptoOperation(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyProblem {
    NotFound,
    /// The identifier matched this many keys.
    Ambiguous(usize),
}

impl fmt::Display for KeyProblem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            KeyProblem::NotFound => write!(f, "does not match any key"),
            KeyProblem::Ambiguous(n) => {
                write!(f, "is ambiguous: it matches {} keys", n)
            },
        }
    }
}
