//! Pairing crypto: key generation (X25519, Ed25519), the pairing token shown
//! as a QR code, device identity verification (HMAC) and the signed identity
//! persisted after a successful pair.

use crate::error::{Error, PairingError};
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

/// HMAC-SHA256 tag length in bytes.
const HMAC_LEN: usize = 32;

/// Verified device identity from the server payload (after HMAC check).
#[derive(Clone, Debug)]
pub struct VerifiedIdentity {
    /// Raw payload that was verified (excluding the HMAC tag).
    pub payload: Vec<u8>,
}

/// Keys generated for a new device: Noise key, identity key, and adv secret.
#[derive(Clone, Debug)]
pub struct PairingKeys {
    pub noise_public: [u8; 32],
    pub noise_private: [u8; 32],
    pub identity_public: [u8; 32],
    pub identity_private: [u8; 32],
    pub adv_secret: [u8; 32],
    /// Signal registration id (14 bits).
    pub registration_id: u32,
}

/// Generate fresh keys: Noise (X25519), identity (Ed25519), and adv secret.
pub fn generate_pairing_keys() -> PairingKeys {
    let mut rng = rand::thread_rng();

    let mut noise_private = [0u8; 32];
    rng.fill_bytes(&mut noise_private);
    let secret = StaticSecret::from(noise_private);
    let noise_public = PublicKey::from(&secret).to_bytes();

    let identity_signing = SigningKey::generate(&mut rng);
    let identity_public = identity_signing.verifying_key().to_bytes();
    let identity_private = identity_signing.to_bytes();

    let mut adv_secret = [0u8; 32];
    rng.fill_bytes(&mut adv_secret);

    PairingKeys {
        noise_public,
        noise_private,
        identity_public,
        identity_private,
        adv_secret,
        registration_id: rng.gen_range(1..=16380),
    }
}

/// Build the string encoded into the pairing QR:
/// `ref,base64(noise_pub),base64(identity_pub),base64(adv_secret)`.
pub fn pairing_token(
    reference: &str,
    noise_public: &[u8; 32],
    identity_public: &[u8; 32],
    adv_secret: &[u8; 32],
) -> String {
    format!(
        "{},{},{},{}",
        reference,
        STANDARD.encode(noise_public),
        STANDARD.encode(identity_public),
        STANDARD.encode(adv_secret)
    )
}

/// Verify device identity payload: last HMAC_LEN bytes are HMAC-SHA256 of the rest with the given key.
/// Returns the payload without the tag, or error if verification fails.
pub fn verify_device_identity(
    payload_with_tag: &[u8],
    hmac_key: &[u8],
) -> Result<VerifiedIdentity> {
    if payload_with_tag.len() < HMAC_LEN {
        return Err(Error::Pairing(PairingError::InvalidDeviceIdentityHmac));
    }
    let split = payload_with_tag.len() - HMAC_LEN;
    let payload = &payload_with_tag[..split];
    let tag = &payload_with_tag[split..];

    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|_| Error::Pairing(PairingError::Protocol("invalid HMAC key length".into())))?;
    mac.update(payload);
    mac.verify_slice(tag)
        .map_err(|_| Error::Pairing(PairingError::InvalidDeviceIdentityHmac))?;

    Ok(VerifiedIdentity {
        payload: payload.to_vec(),
    })
}

/// Build a signed device identity blob for storage: verifying_key (32) || signature (64) || payload.
pub fn sign_device_identity(payload: &[u8], identity_private: &[u8; 32]) -> Vec<u8> {
    let signing_key = SigningKey::from_bytes(identity_private);
    let verifying_key = signing_key.verifying_key();
    let signature = signing_key.sign(payload);

    let mut out = Vec::with_capacity(32 + 64 + payload.len());
    out.extend_from_slice(verifying_key.as_bytes());
    out.extend_from_slice(&signature.to_bytes());
    out.extend_from_slice(payload);
    out
}

/// Verify a stored signed device identity blob (verifying_key || signature || payload).
/// Returns the inner payload on success.
pub fn verify_signed_identity(signed_blob: &[u8]) -> Result<Vec<u8>> {
    if signed_blob.len() < 32 + 64 {
        return Err(Error::Pairing(PairingError::InvalidDeviceSignature));
    }
    let key_bytes: [u8; 32] = signed_blob[..32]
        .try_into()
        .map_err(|_| Error::Pairing(PairingError::InvalidDeviceSignature))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| Error::Pairing(PairingError::InvalidDeviceSignature))?;
    let sig_bytes: [u8; 64] = signed_blob[32..96]
        .try_into()
        .map_err(|_| Error::Pairing(PairingError::InvalidDeviceSignature))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    let payload = &signed_blob[96..];
    verifying_key
        .verify_strict(payload, &signature)
        .map_err(|_| Error::Pairing(PairingError::InvalidDeviceSignature))?;
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(key: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
        mac.update(payload);
        let tag = mac.finalize().into_bytes();
        let mut with_tag = payload.to_vec();
        with_tag.extend_from_slice(&tag);
        with_tag
    }

    #[test]
    fn hmac_verify_accepts_valid_tag() {
        let key = b"test-hmac-key-32-bytes-long!!!!!!";
        let verified = verify_device_identity(&tagged(key, b"identity"), key).unwrap();
        assert_eq!(verified.payload, b"identity");
    }

    #[test]
    fn hmac_reject_tampered() {
        let key = b"test-hmac-key-32-bytes-long!!!!!!";
        let mut with_tag = tagged(key, b"identity");
        with_tag[0] ^= 1;
        assert!(verify_device_identity(&with_tag, key).is_err());
        assert!(verify_device_identity(b"short", key).is_err());
    }

    #[test]
    fn generated_keys_are_distinct() {
        let a = generate_pairing_keys();
        let b = generate_pairing_keys();
        assert_ne!(a.noise_public, b.noise_public);
        assert_ne!(a.identity_public, b.identity_public);
        assert!((1..=16380).contains(&a.registration_id));
    }

    #[test]
    fn pairing_token_layout() {
        let keys = generate_pairing_keys();
        let token = pairing_token(
            "2@abc",
            &keys.noise_public,
            &keys.identity_public,
            &keys.adv_secret,
        );
        let parts: Vec<&str> = token.split(',').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "2@abc");
        assert_eq!(STANDARD.decode(parts[1]).unwrap(), keys.noise_public);
        assert_eq!(STANDARD.decode(parts[3]).unwrap(), keys.adv_secret);
    }

    #[test]
    fn signed_identity_verifies() {
        let keys = generate_pairing_keys();
        let signed = sign_device_identity(b"account", &keys.identity_private);
        assert_eq!(verify_signed_identity(&signed).unwrap(), b"account");

        let mut tampered = signed.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 1;
        assert!(verify_signed_identity(&tampered).is_err());
    }
}
