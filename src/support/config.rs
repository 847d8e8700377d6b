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
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pgp::gpg::Gpg;
use crate::pgp::{CryptoContext, HashAlgorithm};

mod hash_name {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::pgp::HashAlgorithm;

    pub fn serialize<S: Serializer>(
        hash: &HashAlgorithm,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.collect_str(hash)
    }

    pub fn deserialize<'a, D: Deserializer<'a>>(
        de: D,
    ) -> Result<HashAlgorithm, D::Error> {
        use serde::de::Error;
        String::deserialize(de)
            .and_then(|s| s.parse().map_err(|err: String| Error::custom(err)))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error reading '{}': {}", path.display(), source)]
    Io { path: PathBuf, source: io::Error },
    #[error("error in config file at '{}': {}", path.display(), source)]
    Syntax {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// The configuration of the `pgpmime` command.
///
/// This is a TOML file passed with `--config`. Every section and every
/// option within it may be omitted.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// How to run GnuPG.
    pub gpg: GpgConfig,
    /// Options for signed messages.
    pub signing: SigningConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GpgConfig {
    /// The gpg executable, looked up in `PATH` if not absolute.
    pub program: PathBuf,
    /// If set, passed to gpg as `--homedir` so that it uses the keyrings
    /// there instead of the user's default.
    pub homedir: Option<PathBuf>,
    /// If true, encrypt to recipient keys even if they are not trusted.
    ///
    /// Can also be enabled per invocation with `--always-trust`.
    pub always_trust: bool,
}

impl Default for GpgConfig {
    fn default() -> Self {
        GpgConfig {
            program: "gpg".into(),
            homedir: None,
            always_trust: false,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SigningConfig {
    /// The hash algorithm to name in `micalg` if gpg does not report the one
    /// it actually used, e.g. `sha256` or `pgp-sha512`.
    #[serde(with = "hash_name")]
    pub micalg: HashAlgorithm,
    /// Keys every message is signed with, even if `--sign-as` is not given.
    ///
    /// Any identifier gpg accepts works, but fingerprints are strongly
    /// recommended since an identifier matching more than one key is an
    /// error.
    pub default_signers: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        toml::from_slice(&data).map_err(|source| ConfigError::Syntax {
            path: path.to_owned(),
            source,
        })
    }

    pub fn backend(&self) -> Gpg {
        let gpg = Gpg::new(&self.gpg.program);
        match self.gpg.homedir {
            Some(ref homedir) => gpg.with_homedir(homedir),
            None => gpg,
        }
    }

    /// The context every message starts from, before any default signers
    /// are resolved.
    pub fn context<K>(&self) -> CryptoContext<K> {
        CryptoContext::new().with_digest(self.signing.micalg)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_config_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(Config::default(), config);
        assert_eq!(Path::new("gpg"), config.gpg.program);
        assert_eq!(HashAlgorithm::Sha256, config.signing.micalg);
        assert!(config.signing.default_signers.is_empty());
    }

    #[test]
    fn full_config() {
        let config: Config = toml::from_str(
            r#"
[gpg]
program = "/usr/bin/gpg2"
homedir = "/var/lib/mailer/gnupg"
always_trust = true

[signing]
micalg = "pgp-sha512"
default_signers = ["0123456789ABCDEF0123456789ABCDEF01234567"]
"#,
        )
        .unwrap();

        assert_eq!(Path::new("/usr/bin/gpg2"), config.gpg.program);
        assert_eq!(
            Some(Path::new("/var/lib/mailer/gnupg")),
            config.gpg.homedir.as_deref()
        );
        assert!(config.gpg.always_trust);
        assert_eq!(HashAlgorithm::Sha512, config.signing.micalg);
        assert_eq!(
            vec!["0123456789ABCDEF0123456789ABCDEF01234567"],
            config.signing.default_signers
        );
        assert_eq!(
            HashAlgorithm::Sha512,
            config.context::<String>().digest()
        );
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config::default();
        config.signing.micalg = HashAlgorithm::Sha384;
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("micalg = \"sha384\""));
        assert_eq!(config, toml::from_str::<Config>(&text).unwrap());
    }

    #[test]
    fn bad_micalg_is_rejected() {
        assert!(
            toml::from_str::<Config>("[signing]\nmicalg = \"crc32\"\n")
                .is_err()
        );
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gpg]\nalways_trust = true").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert!(config.gpg.always_trust);

        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert_matches!(Err(ConfigError::Io { .. }), Config::load(&missing));

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[gpg\n").unwrap();
        assert_matches!(Err(ConfigError::Syntax { .. }), Config::load(&bad));
    }
}
