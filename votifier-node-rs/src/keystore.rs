//! On-disk RSA key pair
//!
//! Keys live in `<data-dir>/rsa/` as `public.key` (base64 X.509
//! SubjectPublicKeyInfo) and `private.key` (base64 PKCS#8), the layout
//! vote-reporting services expect when an admin copies the public key.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::info;
use votifier_core::crypto::{self, KeyPair};
use votifier_core::RsaPublicKey;

use crate::error::NodeError;

const PUBLIC_KEY_FILE: &str = "public.key";
const PRIVATE_KEY_FILE: &str = "private.key";

/// Key pair storage in one directory
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_KEY_FILE)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    pub fn exists(&self) -> bool {
        self.public_key_path().exists() && self.private_key_path().exists()
    }

    /// Load the stored key pair, generating and saving one if absent
    pub fn load_or_generate(&self) -> Result<KeyPair, NodeError> {
        if self.exists() {
            return self.load();
        }

        info!("Generating RSA key pair in {}", self.dir.display());
        let keys = KeyPair::generate()?;
        self.save(&keys)?;
        Ok(keys)
    }

    pub fn load(&self) -> Result<KeyPair, NodeError> {
        let private = read_base64(&self.private_key_path())?;
        let public = read_base64(&self.public_key_path())?;
        Ok(KeyPair::from_der(&private, &public)?)
    }

    /// Write both key files, replacing existing ones
    pub fn save(&self, keys: &KeyPair) -> Result<(), NodeError> {
        fs::create_dir_all(&self.dir).map_err(|source| NodeError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let public = BASE64.encode(keys.public_key_der()?);
        write_file(&self.public_key_path(), public.as_bytes(), false)?;

        let private = BASE64.encode(keys.private_key_der()?);
        write_file(&self.private_key_path(), private.as_bytes(), true)?;
        Ok(())
    }
}

/// Read a base64 public key file as distributed to vote-reporting services
pub fn read_public_key(path: &Path) -> Result<RsaPublicKey, NodeError> {
    let der = read_base64(path)?;
    Ok(crypto::public_key_from_der(&der)?)
}

fn read_base64(path: &Path) -> Result<Vec<u8>, NodeError> {
    let text = fs::read_to_string(path).map_err(|source| NodeError::KeyRead {
        path: path.to_path_buf(),
        source,
    })?;

    // Tolerate line wrapping from copy-paste
    let compact: String = text.split_whitespace().collect();
    BASE64
        .decode(compact)
        .map_err(|source| NodeError::KeyEncoding {
            path: path.to_path_buf(),
            source,
        })
}

fn write_file(path: &Path, contents: &[u8], secret: bool) -> Result<(), NodeError> {
    let write_err = |source| NodeError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    if secret {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = secret;

    let mut file = options.open(path).map_err(write_err)?;
    file.write_all(contents).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("rsa"));
        assert!(!store.exists());

        let keys = KeyPair::generate_with_bits(1024).unwrap();
        store.save(&keys).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.public_key(), keys.public_key());
        assert_eq!(loaded.block_size(), 128);

        let public = read_public_key(&store.public_key_path()).unwrap();
        assert_eq!(&public, keys.public_key());
    }

    #[test]
    fn test_load_or_generate_reuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());

        let keys = KeyPair::generate_with_bits(1024).unwrap();
        store.save(&keys).unwrap();

        let loaded = store.load_or_generate().unwrap();
        assert_eq!(loaded.public_key(), keys.public_key());
    }

    #[test]
    fn test_wrapped_public_key_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let keys = KeyPair::generate_with_bits(1024).unwrap();
        store.save(&keys).unwrap();

        let encoded = fs::read_to_string(store.public_key_path()).unwrap();
        let wrapped: Vec<String> = encoded
            .as_bytes()
            .chunks(64)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        let path = dir.path().join("wrapped.key");
        fs::write(&path, wrapped.join("\n")).unwrap();

        assert_eq!(&read_public_key(&path).unwrap(), keys.public_key());
    }

    #[test]
    fn test_corrupt_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        fs::write(store.public_key_path(), "not base64 at all!").unwrap();
        fs::write(store.private_key_path(), "AAAA").unwrap();

        assert!(matches!(store.load(), Err(NodeError::KeyEncoding { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        store.save(&KeyPair::generate_with_bits(1024).unwrap()).unwrap();

        let mode = fs::metadata(store.private_key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
