//! HTTP access to instance endpoints.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use super::Instance;
use crate::error::{AppError, Result};

/// Shared HTTP client applying each instance's base URL and credentials.
#[derive(Debug, Clone)]
pub struct InstanceClient {
    client: Client,
}

impl InstanceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn url(instance: &Instance, path: &str) -> String {
        format!("{}{}", instance.http_url(), path)
    }

    pub async fn get(&self, instance: &Instance, path: &str) -> Result<Response> {
        self.get_with_timeout(instance, path, None).await
    }

    pub async fn get_with_timeout(
        &self,
        instance: &Instance,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let url = Self::url(instance, path);
        let creds = instance.credentials();
        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", "aem-fleet")
            .basic_auth(&creds.user, Some(&creds.password));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        request
            .send()
            .await
            .map_err(|e| AppError::network_with_url(&url, e.to_string()).with_instance(instance.id()))
    }

    /// GET and decode a JSON body, failing on non-success statuses.
    pub async fn get_json<T: DeserializeOwned>(&self, instance: &Instance, path: &str) -> Result<T> {
        let resp = self.get(instance, path).await?;
        let url = Self::url(instance, path);
        if !resp.status().is_success() {
            return Err(AppError::network_with_url(&url, resp.status().to_string())
                .with_instance(instance.id()));
        }
        resp.json::<T>()
            .await
            .map_err(|e| AppError::network_with_url(&url, e.to_string()).with_instance(instance.id()))
    }
}
