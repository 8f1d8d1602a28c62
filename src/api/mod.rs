use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::fmt;

use crate::api::model::{Campus, Collection, Document, Donation, DonationsPage, Label, Person};

pub mod model;

const PCO_API_BASE: &str = "https://api.planningcenteronline.com/";

/// Read-only operations on the documented REST API. The pipeline talks to
/// this trait so tests can script responses without a network.
#[async_trait]
pub trait GivingApi: Send + Sync {
    /// One page of donations received after the given timestamp, plus the
    /// offset cursor for the next page when more remain.
    async fn donations_page(
        &self,
        offset: u64,
        per_page: u64,
        received_after: &str,
    ) -> Result<DonationsPage>;

    async fn person(&self, id: &str) -> Result<Person>;

    async fn labels(&self, per_page: u64) -> Result<Vec<Label>>;

    async fn campuses(&self, per_page: u64) -> Result<Vec<Campus>>;
}

#[derive(Clone)]
pub struct PcoClient {
    http: Client,
    base_url: Url,
    app_id: String,
    secret: String,
}

impl fmt::Debug for PcoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcoClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PcoClient {
    pub fn new(app_id: String, secret: String) -> Self {
        let base_url = Url::parse(PCO_API_BASE).expect("valid default API URL");
        Self::with_base_url(app_id, secret, base_url)
    }

    pub fn with_base_url(app_id: String, secret: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("giving-labeler/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            app_id,
            secret,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.base_url.join(path).context("invalid API URL")?;
        let res = self
            .http
            .get(url)
            .basic_auth(&self.app_id, Some(&self.secret))
            .query(query)
            .send()
            .await
            .with_context(|| format!("failed to reach {path}"))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("api error {status} on {path}: {body}"));
        }
        res.json::<T>()
            .await
            .with_context(|| format!("invalid JSON from {path}"))
    }
}

#[async_trait]
impl GivingApi for PcoClient {
    async fn donations_page(
        &self,
        offset: u64,
        per_page: u64,
        received_after: &str,
    ) -> Result<DonationsPage> {
        let payload: Collection<Donation> = self
            .get(
                "giving/v2/donations",
                &[
                    ("offset", offset.to_string()),
                    ("per_page", per_page.to_string()),
                    ("where[received_at][gt]", received_after.to_string()),
                ],
            )
            .await?;
        Ok(DonationsPage {
            donations: payload.data,
            next_offset: payload.meta.next.map(|n| n.offset),
        })
    }

    async fn person(&self, id: &str) -> Result<Person> {
        let payload: Document<Person> = self.get(&format!("people/v2/people/{id}"), &[]).await?;
        Ok(payload.data)
    }

    async fn labels(&self, per_page: u64) -> Result<Vec<Label>> {
        let payload: Collection<Label> = self
            .get("giving/v2/labels", &[("per_page", per_page.to_string())])
            .await?;
        Ok(payload.data)
    }

    async fn campuses(&self, per_page: u64) -> Result<Vec<Campus>> {
        let payload: Collection<Campus> = self
            .get("people/v2/campuses", &[("per_page", per_page.to_string())])
            .await?;
        Ok(payload.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_joins_resource_paths() {
        let client = PcoClient::new("app".into(), "secret".into());
        let url = client.base_url.join("giving/v2/donations").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.planningcenteronline.com/giving/v2/donations"
        );
        let url = client.base_url.join("people/v2/people/P7").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.planningcenteronline.com/people/v2/people/P7"
        );
    }
}
