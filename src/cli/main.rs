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

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use structopt::StructOpt;

use pgpmime::compose::OutgoingMessage;
use pgpmime::mime::writer::write_part;
use pgpmime::pgp::gpg::{Fingerprint, Gpg};
use pgpmime::pgp::{Backend, CryptoContext, Error, Protection};
use pgpmime::support::config::Config;
use pgpmime::support::sysexits::*;

/// Compose an email and protect it with OpenPGP/MIME (RFC 3156).
///
/// The body is read from BODY, or standard input if BODY is omitted or "-".
/// The finished message, headers included, is written to standard output
/// with CRLF line endings, ready to be handed to sendmail or similar.
///
/// With --sign-as, the message is `multipart/signed`. With --encrypt-to, it
/// is `multipart/encrypted`, and signed inside the encryption if there are
/// also signers. Signers from `default_signers` in the configuration file
/// apply when --sign-as is not given. Without any signers or recipients the
/// message is written unprotected.
///
/// Keys are located with gpg, so any identifier gpg understands can be used,
/// but each must match exactly one key.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
pub(super) struct Options {
    /// Read configuration from this TOML file.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Configure logging with this log4rs TOML file instead of logging to
    /// standard error.
    #[structopt(long, parse(from_os_str))]
    log_config: Option<PathBuf>,

    /// Log what is being done to standard error.
    #[structopt(short, long)]
    verbose: bool,

    /// Sign as this key. Can be passed multiple times.
    #[structopt(short, long, number_of_values(1))]
    sign_as: Vec<String>,

    /// Encrypt to this key. Can be passed multiple times.
    #[structopt(short, long, number_of_values(1))]
    encrypt_to: Vec<String>,

    /// Encrypt even to keys gpg does not consider trusted.
    #[structopt(long)]
    always_trust: bool,

    /// The value of the From header.
    #[structopt(long, default_value = "")]
    from: String,

    /// Add an address to the To header. Can be passed multiple times.
    #[structopt(long, number_of_values(1))]
    to: Vec<String>,

    /// Add an address to the Cc header. Can be passed multiple times.
    #[structopt(long, number_of_values(1))]
    cc: Vec<String>,

    /// Add an address to the Reply-To header. Can be passed multiple times.
    #[structopt(long, number_of_values(1))]
    reply_to: Vec<String>,

    /// The subject of the message.
    #[structopt(long, default_value = "")]
    subject: String,

    /// The charset for text which is not plain ASCII.
    #[structopt(long, default_value = "utf-8")]
    charset: String,

    /// Also include the contents of this file as a text/html alternative.
    #[structopt(long, parse(from_os_str))]
    html: Option<PathBuf>,

    /// Attach this file. Can be passed multiple times.
    #[structopt(long, parse(from_os_str), number_of_values(1))]
    attach: Vec<PathBuf>,

    /// Add a header, given as "Name: value". Can be passed multiple times.
    #[structopt(short = "H", long, number_of_values(1))]
    header: Vec<String>,

    /// The file holding the plain text body. "-" reads standard input.
    #[structopt(parse(from_os_str), default_value = "-")]
    body: PathBuf,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options =
        Options::from_clap(&match Options::clap().get_matches_safe() {
            Ok(matches) => matches,
            Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::HelpDisplayed,
                    ..
                },
            )
            | Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::VersionDisplayed,
                    ..
                },
            ) => {
                println!("{}", e.message);
                return;
            },
            Err(e) => {
                eprintln!("{}", e.message);
                EX_USAGE.exit()
            },
        });

    if let Some(ref log_config) = options.log_config {
        if let Err(e) = log4rs::init_file(
            log_config,
            log4rs::file::Deserializers::default(),
        ) {
            eprintln!(
                "Error in logging config at '{}': {}",
                log_config.display(),
                e
            );
            EX_CONFIG.exit();
        }
    } else {
        super::init_simple_log(if options.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        });
    }

    let config = match options.config {
        Some(ref path) => Config::load(path).unwrap_or_else(|e| {
            eprintln!("{}", e);
            EX_CONFIG.exit()
        }),
        None => Config::default(),
    };

    let backend = config.backend();
    let context = default_context(&config, &backend);
    let message = compose(&options, &config);

    if let Some(operation) = message.operation(&context) {
        info!("Protecting message: {:?}", operation);
    }

    let part = match message.protected_message(&backend, &context) {
        Ok(part) => part,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            match e {
                Error::Configuration => EX_USAGE.exit(),
                Error::KeyResolution { .. } => EX_DATAERR.exit(),
                Error::CryptoOperation(_) => EX_SOFTWARE.exit(),
            }
        },
    };

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    if let Err(e) = write_part(&part, &mut stdout).and_then(|_| stdout.flush())
    {
        eprintln!("Error writing message: {}", e);
        EX_IOERR.exit();
    }
}

fn default_context(
    config: &Config,
    backend: &Gpg,
) -> CryptoContext<Fingerprint> {
    let signers = config
        .signing
        .default_signers
        .iter()
        .map(|id| backend.resolve_key(id))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|e| {
            eprintln!("Bad default_signers in configuration: {}", e);
            EX_CONFIG.exit()
        });

    debug!("Default signers: {:?}", signers);
    config.context().with_signers(signers)
}

fn compose(
    options: &Options,
    config: &Config,
) -> OutgoingMessage<Fingerprint> {
    let body = read_text(&options.body);

    let mut message = OutgoingMessage {
        from: options.from.clone(),
        to: options.to.clone(),
        cc: options.cc.clone(),
        reply_to: options.reply_to.clone(),
        subject: options.subject.clone(),
        body,
        charset: options.charset.clone(),
        ..OutgoingMessage::default()
    };

    if let Some(ref html) = options.html {
        message.attach_alternative(&read_text(html), "html");
    }

    for path in &options.attach {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_owned());
        message.attach(
            &filename,
            "application/octet-stream",
            read_input(path),
        );
    }

    for header in &options.header {
        match header.find(':') {
            Some(colon) if colon > 0 => message.extra_headers.push((
                header[..colon].trim().to_owned(),
                header[colon + 1..].trim().to_owned(),
            )),
            _ => {
                eprintln!(
                    "Malformed header (expected 'Name: value'): {}",
                    header
                );
                EX_USAGE.exit()
            },
        }
    }

    let mut protection = Protection::new()
        .always_trust(options.always_trust || config.gpg.always_trust);
    for signer in &options.sign_as {
        protection = protection.sign_as(signer.as_str());
    }
    for recipient in &options.encrypt_to {
        protection = protection.encrypt_to(recipient.as_str());
    }
    message.protection = protection;

    message
}

fn read_input(path: &Path) -> Vec<u8> {
    let mut data = Vec::new();
    let result = if Path::new("-") == path {
        io::stdin().read_to_end(&mut data)
    } else {
        fs::File::open(path).and_then(|mut f| f.read_to_end(&mut data))
    };

    match result {
        Ok(_) => data,
        Err(e) if io::ErrorKind::NotFound == e.kind() => {
            eprintln!("'{}' does not exist", path.display());
            EX_NOINPUT.exit()
        },
        Err(e) => {
            eprintln!("Error reading '{}': {}", path.display(), e);
            EX_IOERR.exit()
        },
    }
}

fn read_text(path: &Path) -> String {
    String::from_utf8(read_input(path)).unwrap_or_else(|_| {
        eprintln!("'{}' is not valid UTF-8", path.display());
        EX_DATAERR.exit()
    })
}
