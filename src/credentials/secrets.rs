// ABOUTME: Secret generation, hashing, and verification primitives
// ABOUTME: CSPRNG byte strings stored only as SHA-256 hex, compared constant-time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::error;

use crate::errors::AppResult;

/// Generate a secret of `length` random bytes, hex-encoded. The plaintext
/// is handed to the caller exactly once; only its hash is persisted.
///
/// # Errors
/// Returns an error if the system RNG fails — the server cannot operate
/// securely without a working RNG.
pub fn generate_secret(length: usize) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        error!("CRITICAL: SystemRandom failed - cannot generate secure random bytes: {e}");
        anyhow::anyhow!("System RNG failure - server cannot operate securely")
    })?;

    Ok(hex::encode(bytes))
}

/// SHA-256 of a plaintext secret, hex-encoded. The only form that ever
/// reaches durable state.
#[must_use]
pub fn hash_secret(plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plain.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compare a plaintext secret against a stored hash in constant time.
#[must_use]
pub fn verify_secret(plain: &str, stored_hash: &str) -> bool {
    let computed = hash_secret(plain);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
