//! SHA-256 digest stores for authorizer tokens and API keys.
//!
//! Only digests are kept in memory; raw credentials from the configuration
//! are hashed at construction and dropped.
use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::ports::credential_verifier::CredentialVerifier;

/// Hex-encoded SHA-256 of `value`.
pub fn hash_credential(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Default)]
struct DigestSet {
    digests: HashSet<String>,
}

impl DigestSet {
    fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            digests: values
                .into_iter()
                .filter(|v| !v.as_ref().is_empty())
                .map(|v| hash_credential(v.as_ref()))
                .collect(),
        }
    }

    fn contains(&self, value: &str) -> bool {
        !value.is_empty() && self.digests.contains(&hash_credential(value))
    }
}

/// Authorizer credential verifier backed by configured tokens.
#[derive(Debug, Clone, Default)]
pub struct DigestTokenVerifier {
    tokens: DigestSet,
}

impl DigestTokenVerifier {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: DigestSet::new(tokens),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.digests.is_empty()
    }
}

impl CredentialVerifier for DigestTokenVerifier {
    fn verify(&self, credential: &str) -> bool {
        self.tokens.contains(credential)
    }
}

/// Usage-plan API keys accepted on key-protected methods.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: DigestSet,
}

impl ApiKeyStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: DigestSet::new(keys),
        }
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}
