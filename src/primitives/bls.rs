use alloy::primitives::B256;
use blst::{
    min_pk::{PublicKey as BlsPublicKey, SecretKey as BlsSecretKey, Signature as BlsSignature},
    BLST_ERROR,
};
use rand::{thread_rng, RngCore};

/// The BLS Domain Separator used in Ethereum 2.0.
pub const BLS_DST_PREFIX: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Sign the given data with the given BLS secret key.
/// Returns the BLS signature.
#[inline]
pub fn sign_with_prefix(key: &BlsSecretKey, data: impl AsRef<[u8]>) -> BlsSignature {
    key.sign(data.as_ref(), BLS_DST_PREFIX, &[])
}

/// Verify the given BLS signature against the given message digest and the public key.
/// Returns `true` if the signature is valid, `false` otherwise.
///
/// Both the signature and the public key are group checked.
#[inline]
pub fn verify_signature(
    signature: &BlsSignature,
    pubkey: &BlsPublicKey,
    digest: impl AsRef<[u8]>,
) -> bool {
    signature.verify(true, digest.as_ref(), BLS_DST_PREFIX, &[], pubkey, true) ==
        BLST_ERROR::BLST_SUCCESS
}

/// Parses a compressed public key, returning `None` for malformed bytes.
#[inline]
pub fn parse_pubkey(bytes: &[u8]) -> Option<BlsPublicKey> {
    BlsPublicKey::from_bytes(bytes).ok()
}

/// Parses a compressed signature, returning `None` for malformed bytes.
#[inline]
pub fn parse_signature(bytes: &[u8]) -> Option<BlsSignature> {
    BlsSignature::from_bytes(bytes).ok()
}

/// Verifies raw key and signature bytes against a signing root. Bytes that do not parse
/// never verify.
pub fn verify_raw(pubkey: &[u8], root: B256, signature: &[u8]) -> bool {
    match (parse_pubkey(pubkey), parse_signature(signature)) {
        (Some(pubkey), Some(signature)) => verify_signature(&signature, &pubkey, root),
        _ => false,
    }
}

/// Generate a random BLS secret key.
pub fn random_bls_secret() -> BlsSecretKey {
    let mut rng = thread_rng();
    let mut ikm = [0u8; 32];
    rng.fill_bytes(&mut ikm);
    bls_secret_from_seed(ikm)
}

/// Derive a BLS secret key from 32 bytes of input key material.
pub fn bls_secret_from_seed(ikm: [u8; 32]) -> BlsSecretKey {
    // key_gen only fails for less than 32 bytes of key material
    match BlsSecretKey::key_gen(&ikm, &[]) {
        Ok(key) => key,
        Err(_) => unreachable!("32 bytes of key material"),
    }
}
