use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::EncodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{info, warn};

pub const RSA_KEY_BITS: usize = 4096;

const PRIVATE_KEY_MODE: u32 = 0o600;
const PUBLIC_KEY_MODE: u32 = 0o644;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("check {path}: {source}")]
    Stat { path: PathBuf, source: io::Error },
    #[error("write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("generate rsa key: {0}")]
    Generate(#[from] rsa::Error),
    #[error("encode private key: {0}")]
    EncodePrivate(#[from] rsa::pkcs1::Error),
    #[error("encode public key: {0}")]
    EncodePublic(#[from] rsa::pkcs8::spki::Error),
    #[error("parse signing key: {0}")]
    Parse(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Reused,
    Generated,
}

/// Makes sure a matched RSA keypair exists at the given paths.
///
/// Both files present means nothing is touched. Otherwise any leftover half
/// is deleted and a fresh 4096-bit pair is written: private key as PKCS#1 PEM
/// (owner-only), public key as SPKI PEM (world-readable). Must run before the
/// server accepts traffic.
pub fn ensure_keys(private_path: &Path, public_path: &Path) -> Result<KeyStatus, KeyError> {
    let has_private = present(private_path)?;
    let has_public = present(public_path)?;
    if has_private && has_public {
        return Ok(KeyStatus::Reused);
    }

    if has_private || has_public {
        warn!(
            private = %private_path.display(),
            public = %public_path.display(),
            "found half of a keypair; regenerating both"
        );
    }
    remove_if_present(private_path)?;
    remove_if_present(public_path)?;

    let (private_pem, public_pem) = generate_pem_pair(RSA_KEY_BITS)?;
    write_key(private_path, private_pem.as_bytes(), PRIVATE_KEY_MODE)?;
    if let Err(e) = write_key(public_path, public_pem.as_bytes(), PUBLIC_KEY_MODE) {
        let _ = fs::remove_file(private_path);
        return Err(e);
    }

    info!(
        private = %private_path.display(),
        public = %public_path.display(),
        bits = RSA_KEY_BITS,
        "generated signing keypair"
    );
    Ok(KeyStatus::Generated)
}

/// Returns `(private PKCS#1 PEM, public SPKI PEM)`.
pub(crate) fn generate_pem_pair(bits: usize) -> Result<(String, String), KeyError> {
    let private = RsaPrivateKey::new(&mut OsRng, bits)?;
    let public = RsaPublicKey::from(&private);
    let private_pem = private.to_pkcs1_pem(LineEnding::LF)?.to_string();
    let public_pem = public.to_public_key_pem(LineEnding::LF)?;
    Ok((private_pem, public_pem))
}

/// Parsed keypair used to sign and verify tokens. Read-only after startup.
#[derive(Clone)]
pub struct SigningKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
}

impl SigningKeys {
    pub fn load(private_path: &Path, public_path: &Path) -> Result<Self, KeyError> {
        let private = read(private_path)?;
        let public = read(public_path)?;
        Self::from_pem(&private, &public)
    }

    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, KeyError> {
        Ok(Self {
            encoding: EncodingKey::from_rsa_pem(private_pem)?,
            decoding: DecodingKey::from_rsa_pem(public_pem)?,
        })
    }
}

fn present(path: &Path) -> Result<bool, KeyError> {
    path.try_exists().map_err(|source| KeyError::Stat {
        path: path.to_path_buf(),
        source,
    })
}

fn read(path: &Path) -> Result<Vec<u8>, KeyError> {
    fs::read(path).map_err(|source| KeyError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_if_present(path: &Path) -> Result<(), KeyError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(KeyError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_key(path: &Path, contents: &[u8], mode: u32) -> Result<(), KeyError> {
    let wrap = |source| KeyError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(wrap)?;
    }

    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode);
    }
    let mut file = opts.open(path).map_err(wrap)?;
    file.write_all(contents).map_err(wrap)?;
    file.sync_all().map_err(wrap)?;

    // open() is subject to the umask
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(wrap)?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}
