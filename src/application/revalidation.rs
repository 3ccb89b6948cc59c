//! Cache revalidation: the token-checked service behind `POST /api/revalidate`
//! and the [`Revalidator`] seam content writes call afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::info;

const SOURCE: &str = "application::revalidation";

/// Paths evicted when a revalidation names none.
pub const DEFAULT_PATHS: [&str; 2] = ["/", "/blog"];

#[derive(Debug, Error)]
pub enum InvalidateError {
    #[error("`{path}` is not an absolute site path")]
    InvalidPath { path: String },
}

/// Something that holds rendered pages keyed by path.
pub trait PathInvalidator: Send + Sync {
    /// Drop everything cached for `path`, returning how many entries went away.
    fn invalidate_path(&self, path: &str) -> Result<usize, InvalidateError>;
}

#[derive(Debug, Error)]
pub enum RevalidationError {
    #[error("revalidation token mismatch")]
    Unauthorized,
    #[error(transparent)]
    Invalidate(#[from] InvalidateError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RevalidationOutcome {
    Path { revalidated: bool, path: String },
    Paths { revalidated: bool, paths: Vec<String> },
}

pub struct RevalidationService {
    token_digest: Vec<u8>,
    invalidator: Arc<dyn PathInvalidator>,
}

impl RevalidationService {
    pub fn new(token: &str, invalidator: Arc<dyn PathInvalidator>) -> Self {
        Self {
            token_digest: hash_token(token),
            invalidator,
        }
    }

    pub fn revalidate(
        &self,
        token: &str,
        path: Option<&str>,
    ) -> Result<RevalidationOutcome, RevalidationError> {
        if hash_token(token).ct_eq(&self.token_digest).unwrap_u8() == 0 {
            return Err(RevalidationError::Unauthorized);
        }

        match path.filter(|path| !path.is_empty()) {
            Some(path) => {
                let evicted = self.invalidator.invalidate_path(path)?;
                info!(target = SOURCE, path, evicted, "path revalidated");
                counter!("kubinet_revalidated_paths_total").increment(1);
                Ok(RevalidationOutcome::Path {
                    revalidated: true,
                    path: path.to_string(),
                })
            }
            None => {
                for path in DEFAULT_PATHS {
                    let evicted = self.invalidator.invalidate_path(path)?;
                    info!(target = SOURCE, path, evicted, "path revalidated");
                }
                counter!("kubinet_revalidated_paths_total").increment(DEFAULT_PATHS.len() as u64);
                Ok(RevalidationOutcome::Paths {
                    revalidated: true,
                    paths: DEFAULT_PATHS.iter().map(|path| path.to_string()).collect(),
                })
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RevalidateError {
    #[error("revalidation rejected: {message}")]
    Rejected { message: String },
    #[error("revalidation request failed: {message}")]
    Transport { message: String },
}

/// Asks whatever serves the site to drop cached copies of `path`, or of
/// [`DEFAULT_PATHS`] when `path` is `None`.
#[async_trait]
pub trait Revalidator: Send + Sync {
    async fn revalidate(&self, path: Option<&str>) -> Result<(), RevalidateError>;
}

fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
