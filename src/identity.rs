//! The operator's signing identity. Loaded once at startup from an
//! environment variable or keyfile, never from `Settings` (SPEC_FULL.md §6).

use crate::error::FatalError;
use ed25519_dalek::{Signer, SigningKey};

pub struct OperatorIdentity {
    signing_key: SigningKey,
}

impl OperatorIdentity {
    /// Load a hex-encoded 32-byte seed from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self, FatalError> {
        let hex_seed = std::env::var(var)
            .map_err(|_| FatalError::Config(format!("{var} is not set")))?;
        Self::from_hex_seed(&hex_seed)
    }

    /// Load a hex-encoded 32-byte seed from a keyfile (one line, no whitespace).
    pub fn from_keyfile(path: &str) -> Result<Self, FatalError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FatalError::Config(format!("cannot read keyfile {path}: {e}")))?;
        Self::from_hex_seed(contents.trim())
    }

    fn from_hex_seed(hex_seed: &str) -> Result<Self, FatalError> {
        let bytes = hex::decode(hex_seed)
            .map_err(|e| FatalError::Config(format!("operator key is not valid hex: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FatalError::Config("operator key must be exactly 32 bytes".into()))?;
        Ok(OperatorIdentity { signing_key: SigningKey::from_bytes(&seed) })
    }

    /// The operator's ledger address: lowercase-hex of the public key.
    pub fn address(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_hex() -> String {
        hex::encode([7u8; 32])
    }

    #[test]
    fn address_is_stable_for_same_seed() {
        let a = OperatorIdentity::from_hex_seed(&seed_hex()).unwrap();
        let b = OperatorIdentity::from_hex_seed(&seed_hex()).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn rejects_non_hex_seed() {
        assert!(OperatorIdentity::from_hex_seed("not hex").is_err());
    }

    #[test]
    fn rejects_wrong_length_seed() {
        assert!(OperatorIdentity::from_hex_seed(&hex::encode([1u8; 16])).is_err());
    }

    #[test]
    fn signature_verifies_under_the_matching_key() {
        use ed25519_dalek::{Verifier, VerifyingKey};
        let identity = OperatorIdentity::from_hex_seed(&seed_hex()).unwrap();
        let sig_bytes = identity.sign(b"hello");
        let vk_bytes: [u8; 32] = hex::decode(identity.address()).unwrap().try_into().unwrap();
        let vk = VerifyingKey::from_bytes(&vk_bytes).unwrap();
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        assert!(vk.verify(b"hello", &sig).is_ok());
    }
}
