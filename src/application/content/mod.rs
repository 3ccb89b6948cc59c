//! Read/write services over posts and page contents.
//!
//! Reads degrade to empty results and log. Writes return [`ContentError`] and,
//! once the row is stored, ask the [`Revalidator`] to refresh affected paths.

mod pages;
mod posts;

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::warn;

use crate::application::repos::RepoError;
use crate::application::revalidation::Revalidator;
use crate::domain::error::DomainError;

pub use pages::PageContentService;
pub use posts::BlogService;

const SOURCE: &str = "application::content";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ContentError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ContentError::Repo(RepoError::NotFound)
                | ContentError::Domain(DomainError::NotFound { .. })
        )
    }
}

/// Revalidation after a committed write. Bounded by `timeout`; failures are logged.
#[derive(Clone)]
pub struct RevalidationHook {
    revalidator: Arc<dyn Revalidator>,
    timeout: Duration,
}

impl RevalidationHook {
    pub fn new(revalidator: Arc<dyn Revalidator>, timeout: Duration) -> Self {
        Self {
            revalidator,
            timeout,
        }
    }

    pub async fn run(&self, path: Option<&str>) {
        match tokio::time::timeout(self.timeout, self.revalidator.revalidate(path)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(target = SOURCE, path = ?path, error = %err, "revalidation failed");
            }
            Err(_) => {
                warn!(
                    target = SOURCE,
                    path = ?path,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "revalidation timed out"
                );
            }
        }
    }
}
