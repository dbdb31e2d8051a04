//! Signer identities and the identity-provider interface.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Identity type tag used by the default ed25519 provider.
pub const DEFAULT_IDENTITY_TYPE: &str = "eddy";

/// Public descriptor of a signer.
///
/// Travels inside every entry so that replicas can verify signatures without
/// any out-of-band key exchange. The `id` is the hex encoding of the public
/// key and doubles as the handle access controllers match against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Hex-encoded public key.
    pub id: String,
    /// Raw ed25519 public key bytes.
    pub pub_key: Vec<u8>,
    /// Provider type tag.
    pub id_type: String,
}

/// Signs entries on behalf of an identity and verifies foreign signatures.
///
/// The verification half is key-agnostic so that a single provider instance
/// can check entries authored by any peer.
pub trait IdentityProvider: Send + Sync {
    /// Sign `data` for the given identity.
    ///
    /// Fails when the provider does not hold the matching private key.
    fn sign(&self, identity: &Identity, data: &[u8]) -> Result<Vec<u8>, LogError>;

    /// Verify `sig` over `data` against a raw public key.
    fn verify(&self, sig: &[u8], pub_key: &[u8], data: &[u8]) -> Result<(), LogError>;
}

/// An ed25519 keypair implementing [`IdentityProvider`] for its own identity.
#[derive(Debug, Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate<R: CryptoRngCore + ?Sized>(rng: &mut R) -> Self {
        Self {
            signing: SigningKey::generate(rng),
        }
    }

    /// Reconstruct a keypair from its 32 secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(bytes),
        }
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// The public identity descriptor for this keypair.
    pub fn identity(&self) -> Identity {
        let pub_key = self.public_key();
        Identity {
            id: hex::encode(pub_key),
            pub_key: pub_key.to_vec(),
            id_type: DEFAULT_IDENTITY_TYPE.to_string(),
        }
    }
}

impl IdentityProvider for Keypair {
    fn sign(&self, identity: &Identity, data: &[u8]) -> Result<Vec<u8>, LogError> {
        if identity.pub_key != self.public_key() {
            return Err(LogError::IdentityMismatch);
        }
        let sig: Signature = self.signing.sign(data);
        Ok(sig.to_bytes().to_vec())
    }

    fn verify(&self, sig: &[u8], pub_key: &[u8], data: &[u8]) -> Result<(), LogError> {
        verify_signature(sig, pub_key, data)
    }
}

/// Stateless ed25519 signature check.
pub fn verify_signature(sig: &[u8], pub_key: &[u8], data: &[u8]) -> Result<(), LogError> {
    let key_bytes: [u8; 32] = pub_key.try_into().map_err(|_| LogError::InvalidKey)?;
    let verifying = VerifyingKey::from_bytes(&key_bytes).map_err(|_| LogError::InvalidKey)?;
    let signature = Signature::from_slice(sig).map_err(|_| LogError::InvalidSignature)?;
    verifying
        .verify(data, &signature)
        .map_err(|_| LogError::InvalidSignature)
}
