//! The two-step authoring dialog: secret key first, credentials second.
//!
//! The secret key is compared in this process against a configured string and
//! the lockouts live in per-browser storage. Both are a cosmetic delay, not a
//! security boundary.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::application::session::AuthClient;
use crate::util::clock::Clock;

use super::limiter::{
    AttemptLimiter, FailureOutcome, LimitStatus, LimiterError, LimiterKeys, LockoutPolicy,
};
use super::storage::ClientStorage;

const SOURCE: &str = "application::gate::flow";

pub const MISSING_SECRET: &str = "Lütfen gizli anahtarı giriniz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStep {
    Secret,
    Credentials,
    /// Signed in; the dialog should close.
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateView {
    pub step: GateStep,
    pub error: Option<String>,
    /// Inputs of the current step are disabled while its limiter is locked.
    pub locked: bool,
}

pub struct AuthGate {
    secret_digest: Vec<u8>,
    secret_limiter: AttemptLimiter,
    credential_limiter: AttemptLimiter,
    secret_verified: bool,
    client: Arc<AuthClient>,
    policy: LockoutPolicy,
    storage: Arc<dyn ClientStorage>,
    clock: Arc<dyn Clock>,
}

impl AuthGate {
    pub async fn load(
        secret_key: &str,
        policy: LockoutPolicy,
        storage: Arc<dyn ClientStorage>,
        clock: Arc<dyn Clock>,
        client: Arc<AuthClient>,
    ) -> Result<Self, LimiterError> {
        let (secret_limiter, credential_limiter) =
            load_limiters(policy, storage.clone(), clock.clone()).await?;
        Ok(Self {
            secret_digest: digest(secret_key),
            secret_limiter,
            credential_limiter,
            secret_verified: false,
            client,
            policy,
            storage,
            clock,
        })
    }

    pub fn step(&self) -> GateStep {
        if self.secret_verified {
            GateStep::Credentials
        } else {
            GateStep::Secret
        }
    }

    /// Re-read both limiters from storage, as when the dialog is opened.
    pub async fn open(&mut self) -> Result<GateView, LimiterError> {
        let (secret_limiter, credential_limiter) =
            load_limiters(self.policy, self.storage.clone(), self.clock.clone()).await?;
        self.secret_limiter = secret_limiter;
        self.credential_limiter = credential_limiter;
        self.view(None).await
    }

    /// Closing the dialog forgets a verified secret.
    pub fn close(&mut self) {
        self.secret_verified = false;
    }

    pub async fn verify_secret(&mut self, input: &str) -> Result<GateView, LimiterError> {
        if let LimitStatus::Locked { remaining } = self.secret_limiter.check().await? {
            return self
                .view(Some(format!(
                    "Çok fazla başarısız deneme. Lütfen {remaining} sonra tekrar deneyin."
                )))
                .await;
        }

        if input.is_empty() {
            return self.view(Some(MISSING_SECRET.to_string())).await;
        }

        if digest(input).ct_eq(&self.secret_digest).unwrap_u8() == 1 {
            self.secret_limiter.record_success().await?;
            self.secret_verified = true;
            return self.view(None).await;
        }

        let message = match self.secret_limiter.record_failure().await? {
            FailureOutcome::AttemptsRemaining(left) => {
                format!("Gizli anahtar doğru değil. {left} deneme hakkınız kaldı.")
            }
            FailureOutcome::Locked { duration_seconds } => format!(
                "Çok fazla başarısız deneme. Giriş {} dakika kilitlendi.",
                duration_seconds / 60
            ),
        };
        self.view(Some(message)).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<GateView, LimiterError> {
        if !self.secret_verified {
            return self.view(Some(MISSING_SECRET.to_string())).await;
        }

        if let LimitStatus::Locked { remaining } = self.credential_limiter.check().await? {
            return self
                .view(Some(format!(
                    "Çok fazla başarısız giriş denemesi. Lütfen {remaining} sonra tekrar deneyin."
                )))
                .await;
        }

        match self.client.sign_in_with_password(email, password).await {
            Ok(session) => {
                self.credential_limiter.record_success().await?;
                self.secret_verified = false;
                info!(target = SOURCE, user_id = %session.user_id, "signed in");
                Ok(GateView {
                    step: GateStep::Done,
                    error: None,
                    locked: false,
                })
            }
            Err(err) => {
                warn!(target = SOURCE, error = %err, "sign-in failed");
                let message = match self.credential_limiter.record_failure().await? {
                    FailureOutcome::AttemptsRemaining(left) => {
                        format!("Giriş başarısız oldu. {left} deneme hakkınız kaldı.")
                    }
                    FailureOutcome::Locked { duration_seconds } => format!(
                        "Çok fazla başarısız giriş denemesi. Hesabınız {} dakika kilitlendi.",
                        duration_seconds / 60
                    ),
                };
                self.view(Some(message)).await
            }
        }
    }

    pub async fn logout(&mut self) {
        self.secret_verified = false;
        self.client.sign_out().await;
    }

    async fn view(&mut self, error: Option<String>) -> Result<GateView, LimiterError> {
        let step = self.step();
        let limiter = match step {
            GateStep::Credentials => &mut self.credential_limiter,
            _ => &mut self.secret_limiter,
        };
        let locked = matches!(limiter.check().await?, LimitStatus::Locked { .. });
        Ok(GateView {
            step,
            error,
            locked,
        })
    }
}

async fn load_limiters(
    policy: LockoutPolicy,
    storage: Arc<dyn ClientStorage>,
    clock: Arc<dyn Clock>,
) -> Result<(AttemptLimiter, AttemptLimiter), LimiterError> {
    let secret =
        AttemptLimiter::load(LimiterKeys::SECRET, policy, storage.clone(), clock.clone()).await?;
    let credentials = AttemptLimiter::load(LimiterKeys::CREDENTIALS, policy, storage, clock).await?;
    Ok((secret, credentials))
}

fn digest(value: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().to_vec()
}
