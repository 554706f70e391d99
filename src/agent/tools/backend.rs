use std::time::Duration;

use serde_json::Value;

use crate::settings::BackendUrls;

/// Outcome of a backend GET, already reduced to what the model should see.
#[derive(Debug)]
pub enum Fetch {
    Ok(Value),
    /// Non-success status from the backend, logged with the URL.
    Status,
    /// Transport or decoding failure.
    Failed(String),
}

/// Shared HTTP client for the weather, pest and market services.
#[derive(Clone, Debug)]
pub struct BackendClient {
    pub urls: BackendUrls,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(urls: BackendUrls, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { urls, client })
    }

    pub async fn get_json(&self, base: &str, path: &str, params: &[(&str, &str)]) -> Fetch {
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        let resp = match self.client.get(&url).query(params).send().await {
            Ok(resp) => resp,
            Err(e) => return Fetch::Failed(e.to_string()),
        };
        if !resp.status().is_success() {
            tracing::warn!(%url, status = %resp.status(), "backend returned error status");
            return Fetch::Status;
        }
        match resp.json::<Value>().await {
            Ok(v) => Fetch::Ok(v),
            Err(e) => Fetch::Failed(e.to_string()),
        }
    }

    #[cfg(test)]
    pub fn unreachable() -> Self {
        Self::at("http://127.0.0.1:9")
    }

    #[cfg(test)]
    pub fn at(base: &str) -> Self {
        let urls = BackendUrls { weather: base.into(), pest: base.into(), market: base.into() };
        Self::new(urls, Duration::from_secs(5)).expect("client")
    }
}
