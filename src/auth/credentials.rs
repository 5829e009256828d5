use std::sync::Arc;

/// Password hashing boundary.
pub trait CredentialService: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, bcrypt::BcryptError>;

    /// Constant-time check of `plaintext` against a stored credential.
    /// A malformed stored credential verifies as `false`.
    fn verify(&self, plaintext: &str, credential: &str) -> bool;
}

pub type DynCredentialService = Arc<dyn CredentialService>;

#[derive(Debug, Clone, Copy)]
pub struct BcryptCredentials {
    cost: u32,
}

impl BcryptCredentials {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptCredentials {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl CredentialService for BcryptCredentials {
    fn hash(&self, plaintext: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(plaintext, self.cost)
    }

    fn verify(&self, plaintext: &str, credential: &str) -> bool {
        bcrypt::verify(plaintext, credential).unwrap_or(false)
    }
}
