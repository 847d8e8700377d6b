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

//! A `Backend` which runs the GnuPG executable.
//!
//! Every operation is a single `gpg --batch` invocation. The input is fed
//! through stdin from a separate thread so that a large message cannot
//! deadlock against gpg filling its stdout pipe. Status lines are requested
//! on stderr (`--status-fd 2`) and separated from the human-readable
//! diagnostics there.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use log::{debug, warn};

use super::backend::{
    Backend, CryptoContext, EncryptFlags, HashAlgorithm, Signature,
    SignatureMode,
};
use super::error::{Error, KeyProblem};

const STATUS_PREFIX: &str = "[GNUPG:] ";

/// A key, identified by the fingerprint of its primary key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Gpg {
    program: PathBuf,
    homedir: Option<PathBuf>,
}

/// What a gpg run produced.
#[derive(Debug)]
struct Output {
    exit: ExitStatus,
    stdout: Vec<u8>,
    /// `[GNUPG:]` status lines, without the prefix.
    status: Vec<String>,
    /// The remaining non-blank lines of stderr.
    diagnostics: Vec<String>,
}

impl Default for Gpg {
    fn default() -> Self {
        Gpg::new("gpg")
    }
}

impl Gpg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Gpg {
            program: program.into(),
            homedir: None,
        }
    }

    /// Use the keyrings under `homedir` instead of gpg's default.
    pub fn with_homedir(self, homedir: impl Into<PathBuf>) -> Self {
        Gpg {
            homedir: Some(homedir.into()),
            ..self
        }
    }

    /// Runs gpg and requires it to succeed.
    fn run(&self, args: &[String], input: &[u8]) -> Result<Output, Error> {
        let output = self.run_unchecked(args, input)?;

        if !output.exit.success() {
            return Err(Error::CryptoOperation(format!(
                "gpg failed (exit {}): {}",
                exit_code(output.exit),
                output.diagnostics.join("; ")
            )));
        }

        for line in &output.diagnostics {
            warn!("gpg: {}", line);
        }

        Ok(output)
    }

    /// Runs gpg, failing only if it could not be run at all.
    fn run_unchecked(
        &self,
        args: &[String],
        input: &[u8],
    ) -> Result<Output, Error> {
        let mut command = Command::new(&self.program);
        command
            .arg("--batch")
            .arg("--no-tty")
            .arg("--status-fd")
            .arg("2");
        if let Some(ref homedir) = self.homedir {
            command.arg("--homedir").arg(homedir);
        }
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running {} {:?}", self.program.display(), args);
        let mut child = command.spawn().map_err(|e| {
            Error::CryptoOperation(format!(
                "failed to run {}: {}",
                self.program.display(),
                e
            ))
        })?;

        let writer = child.stdin.take().map(|mut stdin| {
            let input = input.to_vec();
            // A write error means gpg exited early; its exit status and
            // stderr say why
            thread::spawn(move || {
                let _ = stdin.write_all(&input);
            })
        });

        let output = child.wait_with_output().map_err(|e| {
            Error::CryptoOperation(format!(
                "failed to read output of {}: {}",
                self.program.display(),
                e
            ))
        })?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }

        let (status, diagnostics) =
            split_stderr(&String::from_utf8_lossy(&output.stderr));

        Ok(Output {
            exit: output.status,
            stdout: output.stdout,
            status,
            diagnostics,
        })
    }
}

fn exit_code(exit: ExitStatus) -> String {
    exit.code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_owned())
}

impl Backend for Gpg {
    type Key = Fingerprint;

    fn resolve_key(&self, identifier: &str) -> Result<Fingerprint, Error> {
        let args = vec![
            "--with-colons".to_owned(),
            "--fixed-list-mode".to_owned(),
            "--list-keys".to_owned(),
            "--".to_owned(),
            identifier.to_owned(),
        ];

        let output = self.run_unchecked(&args, &[])?;
        let mut keys =
            parse_primary_fingerprints(&String::from_utf8_lossy(&output.stdout));

        // gpg exits non-zero when nothing matches, but also when the
        // keyring itself is unusable
        if !output.exit.success()
            && keys.is_empty()
            && !is_no_match(&output.diagnostics)
        {
            return Err(Error::CryptoOperation(format!(
                "listing keys for {:?} failed (exit {}): {}",
                identifier,
                exit_code(output.exit),
                output.diagnostics.join("; ")
            )));
        }

        match keys.len() {
            1 => Ok(keys.remove(0)),
            0 => Err(Error::KeyResolution {
                identifier: identifier.to_owned(),
                problem: KeyProblem::NotFound,
            }),
            n => Err(Error::KeyResolution {
                identifier: identifier.to_owned(),
                problem: KeyProblem::Ambiguous(n),
            }),
        }
    }

    fn sign(
        &self,
        input: &[u8],
        mode: SignatureMode,
        context: &CryptoContext<Fingerprint>,
    ) -> Result<Signature, Error> {
        let output = self.run(&sign_args(mode, context), input)?;
        Ok(Signature {
            data: output.stdout,
            digest: signature_digest(&output.status),
        })
    }

    fn encrypt(
        &self,
        input: &[u8],
        recipients: &[Fingerprint],
        flags: EncryptFlags,
        context: &CryptoContext<Fingerprint>,
    ) -> Result<Vec<u8>, Error> {
        let args = encrypt_args(recipients, flags, context, false);
        Ok(self.run(&args, input)?.stdout)
    }

    fn encrypt_and_sign(
        &self,
        input: &[u8],
        recipients: &[Fingerprint],
        flags: EncryptFlags,
        context: &CryptoContext<Fingerprint>,
    ) -> Result<Vec<u8>, Error> {
        let args = encrypt_args(recipients, flags, context, true);
        Ok(self.run(&args, input)?.stdout)
    }
}

fn sign_args(
    mode: SignatureMode,
    context: &CryptoContext<Fingerprint>,
) -> Vec<String> {
    let mut args = Vec::new();
    match mode {
        SignatureMode::Detached => args.push("--detach-sign".to_owned()),
    }
    if context.armor() {
        args.push("--armor".to_owned());
    }
    push_signers(&mut args, context);
    args
}

fn encrypt_args(
    recipients: &[Fingerprint],
    flags: EncryptFlags,
    context: &CryptoContext<Fingerprint>,
    sign: bool,
) -> Vec<String> {
    let mut args = vec!["--encrypt".to_owned()];
    if sign {
        args.push("--sign".to_owned());
        push_signers(&mut args, context);
    }
    if context.armor() {
        args.push("--armor".to_owned());
    }
    if flags.contains(EncryptFlags::ALWAYS_TRUST) {
        args.push("--trust-model".to_owned());
        args.push("always".to_owned());
    }
    for recipient in recipients {
        args.push("--recipient".to_owned());
        args.push(recipient.0.clone());
    }
    args
}

fn push_signers(args: &mut Vec<String>, context: &CryptoContext<Fingerprint>) {
    for signer in context.signers() {
        args.push("--local-user".to_owned());
        args.push(signer.0.clone());
    }
}

/// Splits gpg's stderr into status lines and everything else.
/// Whether the diagnostics of a failed `--list-keys` run only say that
/// nothing matched.
fn is_no_match(diagnostics: &[String]) -> bool {
    !diagnostics.is_empty()
        && diagnostics.iter().all(|line| {
            let line = line.to_ascii_lowercase();
            line.contains("no public key") || line.contains("not found")
        })
}

fn split_stderr(stderr: &str) -> (Vec<String>, Vec<String>) {
    let mut status = Vec::new();
    let mut diagnostics = Vec::new();

    for line in stderr.lines() {
        if let Some(s) = line.strip_prefix(STATUS_PREFIX) {
            status.push(s.to_owned());
        } else if !line.trim().is_empty() {
            diagnostics.push(line.trim().to_owned());
        }
    }

    (status, diagnostics)
}

/// Extracts the fingerprint of every primary key from `--with-colons`
/// output.
///
/// Each `pub` record is followed by an `fpr` record for the primary key;
/// `fpr` records following `sub` records belong to subkeys.
fn parse_primary_fingerprints(listing: &str) -> Vec<Fingerprint> {
    let mut keys = Vec::new();
    let mut in_primary = false;

    for line in listing.lines() {
        let fields = line.split(':').collect::<Vec<_>>();
        match fields.first().copied() {
            Some("pub") => in_primary = true,
            Some("fpr") if in_primary => {
                in_primary = false;
                if let Some(fpr) = fields.get(9).filter(|f| !f.is_empty()) {
                    keys.push(Fingerprint((*fpr).to_owned()));
                }
            },
            Some("sub") | Some("ssb") | Some("sec") => in_primary = false,
            _ => (),
        }
    }

    keys
}

/// Determines the digest from `SIG_CREATED` status lines.
///
/// The format is `SIG_CREATED <type> <pk_algo> <hash_algo> <class>
/// <timestamp> <fpr>`.
fn signature_digest(status: &[String]) -> Option<HashAlgorithm> {
    let mut digests = status.iter().filter_map(|line| {
        let mut fields = line.split_whitespace();
        if Some("SIG_CREATED") != fields.next() {
            return None;
        }

        fields
            .nth(2)
            .and_then(|id| id.parse::<u8>().ok())
            .and_then(HashAlgorithm::from_openpgp_id)
    });

    let first = digests.next()?;
    if digests.any(|d| d != first) {
        warn!("Signers used different digests; advertising {}", first);
    }
    Some(first)
}
