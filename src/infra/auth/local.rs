use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::application::session::{AuthBackend, AuthError, AuthSession};

/// A single configured account, for running without a hosted auth service.
///
/// The password is stored as a lowercase hex SHA-256 digest
/// (see the `hash-password` command).
#[derive(Clone, Debug)]
pub struct LocalAuthBackend {
    email: String,
    password_digest: Vec<u8>,
    user_id: String,
}

impl LocalAuthBackend {
    pub fn new(email: &str, password_sha256_hex: &str) -> Self {
        let email = email.trim().to_lowercase();
        let password_digest = hex::decode(password_sha256_hex.trim()).unwrap_or_default();

        let email_digest = Self::hash(&email);
        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&email_digest[..16]);
        let user_id = Uuid::from_bytes(id_bytes).to_string();

        Self {
            email,
            password_digest,
            user_id,
        }
    }

    /// Hex SHA-256 of `password`, the format [`LocalAuthBackend::new`] expects.
    pub fn digest(password: &str) -> String {
        hex::encode(Self::hash(password))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn hash(password: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hasher.finalize().to_vec()
    }
}

#[async_trait]
impl AuthBackend for LocalAuthBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let email_matches = email.trim().to_lowercase() == self.email;
        let password_matches = Self::hash(password)
            .ct_eq(&self.password_digest)
            .unwrap_u8()
            == 1;
        if !(email_matches && password_matches) {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(AuthSession {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            access_token: Uuid::new_v4().simple().to_string(),
        })
    }

    async fn sign_out(&self, _session: &AuthSession) -> Result<(), AuthError> {
        Ok(())
    }
}
