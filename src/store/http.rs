use super::{ResultStore, StoreError};
use crate::publisher::PublisherStatus;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

/// Remote slot reached through the backend's `/api/data` route.
#[derive(Debug, Clone)]
pub struct HttpStore {
    http: Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("hairscan/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn data_url(&self) -> String {
        format!("{}/api/data", self.base_url)
    }

    fn status_url(&self) -> String {
        format!("{}/api/status", self.base_url)
    }

    /// Best-effort publish of the operator-facing status line.
    pub async fn post_status(&self, status: &PublisherStatus) -> Result<(), StoreError> {
        let resp = self.http.post(self.status_url()).json(status).send().await?;
        check_status(resp).map(|_| ())
    }

    pub async fn fetch_status(&self) -> Result<Option<PublisherStatus>, StoreError> {
        let resp = check_status(self.http.get(self.status_url()).send().await?)?;
        Ok(resp.json().await?)
    }
}

fn check_status(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(StoreError::Status(status.as_u16()))
    }
}

#[async_trait]
impl ResultStore for HttpStore {
    async fn get(&self) -> Result<Option<Value>, StoreError> {
        let resp = check_status(self.http.get(self.data_url()).send().await?)?;
        let value: Value = resp.json().await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn put(&self, value: &Value) -> Result<(), StoreError> {
        let resp = self.http.post(self.data_url()).json(value).send().await?;
        check_status(resp).map(|_| ())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let resp = self.http.delete(self.data_url()).send().await?;
        check_status(resp).map(|_| ())
    }
}
