//! [`Revalidator`] implementations.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;

use crate::application::revalidation::{
    RevalidateError, RevalidationError, RevalidationService, Revalidator,
};

#[derive(Serialize)]
struct RevalidateBody<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
}

/// Posts `{token, path}` to a revalidation endpoint, ours or another deployment's.
#[derive(Clone, Debug)]
pub struct HttpRevalidator {
    client: Client,
    endpoint: Url,
    token: String,
}

impl HttpRevalidator {
    pub fn new(endpoint: Url, token: impl Into<String>) -> Result<Self, RevalidateError> {
        let client = Client::builder()
            .user_agent(concat!("kubinet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| RevalidateError::Transport {
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint,
            token: token.into(),
        })
    }
}

#[async_trait]
impl Revalidator for HttpRevalidator {
    async fn revalidate(&self, path: Option<&str>) -> Result<(), RevalidateError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&RevalidateBody {
                token: &self.token,
                path,
            })
            .send()
            .await
            .map_err(|err| RevalidateError::Transport {
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RevalidateError::Rejected {
                message: format!("status {status} body {text}"),
            });
        }
        Ok(())
    }
}

/// Calls the in-process revalidation service directly.
#[derive(Clone)]
pub struct LocalRevalidator {
    service: Arc<RevalidationService>,
    token: String,
}

impl LocalRevalidator {
    pub fn new(service: Arc<RevalidationService>, token: impl Into<String>) -> Self {
        Self {
            service,
            token: token.into(),
        }
    }
}

#[async_trait]
impl Revalidator for LocalRevalidator {
    async fn revalidate(&self, path: Option<&str>) -> Result<(), RevalidateError> {
        self.service
            .revalidate(&self.token, path)
            .map(|_| ())
            .map_err(|err| match err {
                RevalidationError::Unauthorized => RevalidateError::Rejected {
                    message: err.to_string(),
                },
                RevalidationError::Invalidate(inner) => RevalidateError::Rejected {
                    message: inner.to_string(),
                },
            })
    }
}
