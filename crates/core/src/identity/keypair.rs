use dirnet_common::NodeId;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

/// An ed25519 keypair, used both as the gossip node identity and by
/// clients signing directory requests
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut rng = OsRng;
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);

        Self::from_secret_bytes(&secret_bytes)
    }

    /// Create a keypair from a 32 byte secret
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create a keypair from a hex encoded 32 byte seed
    pub fn from_seed_hex(seed: &str) -> Result<Self, KeyPairError> {
        let bytes = hex::decode(seed.trim()).map_err(|_| KeyPairError::InvalidSecretKey)?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyPairError::InvalidSecretKey)?;
        Ok(Self::from_secret_bytes(&secret))
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.verifying_key,
        }
    }

    /// Hex encoding of the public key, as carried in signed requests
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_bytes())
    }

    /// Node identifier derived from the public key
    pub fn node_id(&self) -> NodeId {
        self.public_key().node_id()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Sign a message and hex encode the signature
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.sign(message))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A public key for verifying signatures
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Create a public key from bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyPairError> {
        let key = VerifyingKey::from_bytes(bytes).map_err(|_| KeyPairError::InvalidPublicKey)?;
        Ok(Self { key })
    }

    /// Decode a hex encoded public key
    pub fn from_hex(encoded: &str) -> Result<Self, KeyPairError> {
        let bytes = hex::decode(encoded).map_err(|_| KeyPairError::InvalidPublicKey)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyPairError::InvalidPublicKey)?;
        Self::from_bytes(&bytes)
    }

    /// Get the public key bytes
    pub fn as_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Node identifier: blake3 hash of the key bytes
    pub fn node_id(&self) -> NodeId {
        NodeId::from_bytes(*blake3::hash(&self.as_bytes()).as_bytes())
    }

    /// Verify a signature on a message
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        self.key
            .verify(message, &Signature::from_bytes(signature))
            .is_ok()
    }

    /// Verify a hex encoded signature on a message
    pub fn verify_hex(&self, message: &[u8], signature: &str) -> Result<(), KeyPairError> {
        let bytes = hex::decode(signature).map_err(|_| KeyPairError::InvalidSignature)?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| KeyPairError::InvalidSignature)?;

        if self.verify(message, &bytes) {
            Ok(())
        } else {
            Err(KeyPairError::InvalidSignature)
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.as_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_bytes()))
    }
}

/// Errors related to keypair operations
#[derive(Debug, thiserror::Error)]
pub enum KeyPairError {
    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid signature")]
    InvalidSignature,
}
