//! RSA key material and payload decryption
//!
//! Votes arrive as a single RSA block encrypted with PKCS#1 v1.5 padding
//! against the receiver's public key. Key files are the host's business;
//! this module only converts keys to and from DER.

use std::fmt;
use std::sync::Arc;

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::{DecryptionError, KeyError};

/// Modulus size for freshly generated keys
pub const DEFAULT_KEY_BITS: usize = 2048;

/// RSA key pair held by the receiver
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a 2048-bit key pair from the OS random source
    pub fn generate() -> Result<Self, KeyError> {
        Self::generate_with_bits(DEFAULT_KEY_BITS)
    }

    /// Generate a key pair with a custom modulus size
    pub fn generate_with_bits(bits: usize) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits).map_err(KeyError::Generation)?;
        Ok(Self::from_private_key(private))
    }

    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self { private, public }
    }

    /// Rebuild a key pair from PKCS#8 (private) and SubjectPublicKeyInfo
    /// (public) DER, checking that both halves belong together
    pub fn from_der(private_der: &[u8], public_der: &[u8]) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::from_pkcs8_der(private_der)
            .map_err(|e| KeyError::Decoding(e.to_string()))?;
        let public = RsaPublicKey::from_public_key_der(public_der)
            .map_err(|e| KeyError::Decoding(e.to_string()))?;

        if private.to_public_key() != public {
            return Err(KeyError::Mismatch);
        }
        Ok(Self { private, public })
    }

    /// PKCS#8 DER encoding of the private key
    pub fn private_key_der(&self) -> Result<Vec<u8>, KeyError> {
        let doc = self
            .private
            .to_pkcs8_der()
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// X.509 SubjectPublicKeyInfo DER encoding of the public key
    pub fn public_key_der(&self) -> Result<Vec<u8>, KeyError> {
        public_key_der(&self.public)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Ciphertext block length in bytes
    pub fn block_size(&self) -> usize {
        self.public.size()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &(self.block_size() * 8))
            .finish_non_exhaustive()
    }
}

/// SubjectPublicKeyInfo DER encoding of a public key
pub fn public_key_der(key: &RsaPublicKey) -> Result<Vec<u8>, KeyError> {
    let doc = key
        .to_public_key_der()
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    Ok(doc.as_bytes().to_vec())
}

/// Parse a SubjectPublicKeyInfo DER public key
pub fn public_key_from_der(der: &[u8]) -> Result<RsaPublicKey, KeyError> {
    RsaPublicKey::from_public_key_der(der).map_err(|e| KeyError::Decoding(e.to_string()))
}

/// Encrypt a plaintext into one block for `key`
pub fn encrypt(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, rsa::Error> {
    key.encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
}

/// Turns one ciphertext block into plaintext
pub trait PayloadDecryptor: Send + Sync {
    /// Exact ciphertext length accepted by [`PayloadDecryptor::decrypt`]
    fn block_size(&self) -> usize;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError>;
}

/// RSA decryption against the receiver's private key.
///
/// Cheap to clone; every connection handler shares the same key pair.
#[derive(Debug, Clone)]
pub struct CryptoCodec {
    keys: Arc<KeyPair>,
}

impl CryptoCodec {
    pub fn new(keys: Arc<KeyPair>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }
}

impl PayloadDecryptor for CryptoCodec {
    fn block_size(&self) -> usize {
        self.keys.block_size()
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let expected = self.block_size();
        if ciphertext.len() != expected {
            return Err(DecryptionError::LengthMismatch {
                expected,
                actual: ciphertext.len(),
            });
        }

        Ok(self.keys.private.decrypt(Pkcs1v15Encrypt, ciphertext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::shared_keys;

    #[test]
    fn test_block_size_2048() {
        let keys = shared_keys();
        assert_eq!(keys.block_size(), 256);
    }

    #[test]
    fn test_round_trip() {
        let keys = shared_keys();
        let codec = CryptoCodec::new(keys.clone());

        for plaintext in [
            b"VOTIFIER\nExampleService\nalice\n203.0.113.5\n1700000000\n".to_vec(),
            Vec::new(),
            vec![0u8; 200],
            (0..=244u8).collect(),
        ] {
            let block = encrypt(keys.public_key(), &plaintext).unwrap();
            assert_eq!(block.len(), 256);
            assert_eq!(codec.decrypt(&block).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_length_mismatch() {
        let codec = CryptoCodec::new(shared_keys());

        for len in [0, 1, 255, 257, 512] {
            let err = codec.decrypt(&vec![7u8; len]).unwrap_err();
            assert!(matches!(
                err,
                DecryptionError::LengthMismatch { expected: 256, actual } if actual == len
            ));
        }
    }

    #[test]
    fn test_garbage_block_fails() {
        let codec = CryptoCodec::new(shared_keys());
        // Block of 0xff is larger than the modulus
        assert!(matches!(
            codec.decrypt(&[0xffu8; 256]),
            Err(DecryptionError::Rsa(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let keys = shared_keys();
        let other = KeyPair::generate_with_bits(2048).unwrap();
        let block = encrypt(other.public_key(), b"VOTIFIER\nsvc\nbob\n1.2.3.4\n1\n").unwrap();

        // PKCS#1 v1.5 may occasionally "succeed" with garbage; it must never yield the plaintext
        match CryptoCodec::new(keys).decrypt(&block) {
            Err(_) => {}
            Ok(plain) => assert_ne!(plain, b"VOTIFIER\nsvc\nbob\n1.2.3.4\n1\n".to_vec()),
        }
    }

    #[test]
    fn test_der_round_trip() {
        let keys = shared_keys();
        let private = keys.private_key_der().unwrap();
        let public = keys.public_key_der().unwrap();

        let restored = KeyPair::from_der(&private, &public).unwrap();
        assert_eq!(restored.public_key(), keys.public_key());
        assert_eq!(public_key_from_der(&public).unwrap(), *keys.public_key());
    }

    #[test]
    fn test_der_mismatch() {
        let keys = shared_keys();
        let other = KeyPair::generate_with_bits(1024).unwrap();

        let err = KeyPair::from_der(
            &keys.private_key_der().unwrap(),
            &other.public_key_der().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, KeyError::Mismatch));

        assert!(matches!(
            KeyPair::from_der(b"junk", b"junk"),
            Err(KeyError::Decoding(_))
        ));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let rendered = format!("{:?}", shared_keys());
        assert!(rendered.contains("2048"));
        assert!(!rendered.contains("private"));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(48))]

            /// Anything up to the PKCS#1 v1.5 capacity of a 2048-bit key survives
            #[test]
            fn decrypt_inverts_encrypt(plaintext in proptest::collection::vec(any::<u8>(), 0..=245)) {
                let keys = shared_keys();
                let block = encrypt(keys.public_key(), &plaintext).unwrap();
                prop_assert_eq!(block.len(), 256);
                prop_assert_eq!(CryptoCodec::new(keys).decrypt(&block).unwrap(), plaintext);
            }

            #[test]
            fn wrong_length_never_decrypted(len in (0usize..1024).prop_filter("one full block", |l| *l != 256)) {
                let err = CryptoCodec::new(shared_keys()).decrypt(&vec![1u8; len]).unwrap_err();
                let mismatch = matches!(
                    err,
                    DecryptionError::LengthMismatch { expected: 256, actual } if actual == len
                );
                prop_assert!(mismatch);
            }
        }
    }
}
