//! The one mutation this tool performs: attaching a label to a donation
//! through the web form endpoint, since the documented API rejects label
//! edits for donations outside a batch or not created by an external
//! payment source.
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{COOKIE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode, Url};
use tokio::sync::OnceCell;
use tracing::error;

use crate::session::{AuthStrategy, Session, GIVING_BASE};

/// Seam for the pipeline: anything that can attach a label to a donation.
#[async_trait]
pub trait LabelWriter: Send + Sync {
    async fn attach_label(&self, donation_id: &str, label_id: &str) -> Result<()>;
}

/// Form-posting mutator over the giving web UI. Authenticates lazily on
/// the first attach and keeps the session for the rest of the run.
pub struct WebMutator {
    http: Client,
    base_url: Url,
    auth: AuthStrategy,
    session: OnceCell<Session>,
}

impl WebMutator {
    pub fn new(auth: AuthStrategy) -> Self {
        let base_url = Url::parse(GIVING_BASE).expect("valid giving base URL");
        Self::with_base_url(auth, base_url)
    }

    pub fn with_base_url(auth: AuthStrategy, base_url: Url) -> Self {
        // Redirects stay unfollowed so an expired session surfaces as a
        // non-200 with an observable Location header.
        let http = Client::builder()
            .user_agent("giving-labeler/0.1")
            .redirect(Policy::none())
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            auth,
            session: OnceCell::new(),
        }
    }

    async fn session(&self) -> Result<&Session> {
        self.session
            .get_or_try_init(|| self.auth.authenticate())
            .await
    }
}

/// Form body for the label attach, a PATCH smuggled through a POST. The
/// trailing empty assignment id matches what the UI itself submits for a
/// new label row.
pub fn encode_attach_body(donation_id: &str, label_id: &str) -> Vec<(String, String)> {
    vec![
        ("_method".into(), "PATCH".into()),
        ("donation[id]".into(), donation_id.into()),
        ("section".into(), "labels".into()),
        (
            "donation[donations_labels_attributes][][label_id]".into(),
            label_id.into(),
        ),
        (
            "donation[donations_labels_attributes][][id]".into(),
            String::new(),
        ),
    ]
}

#[async_trait]
impl LabelWriter for WebMutator {
    async fn attach_label(&self, donation_id: &str, label_id: &str) -> Result<()> {
        let session = self.session().await?;
        let url = self
            .base_url
            .join(&format!("donations/{donation_id}"))
            .context("invalid donation URL")?;
        let body = encode_attach_body(donation_id, label_id);

        let res = self
            .http
            .post(url)
            .header(COOKIE, session.cookie.as_str())
            .header("X-CSRF-Token", session.csrf_token.as_str())
            .form(&body)
            .send()
            .await
            .context("failed to reach donation form endpoint")?;

        if res.status() != StatusCode::OK {
            let status = res.status();
            let location = res
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("<none>")
                .to_owned();
            let text = res.text().await.unwrap_or_default();
            let encoded = body
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            error!("label attach failed for donation {donation_id}");
            error!("csrf token: {}", session.csrf_token);
            error!("request body: {encoded}");
            error!("response status: {status}, location: {location}");
            error!("response body: {text}");
            bail!("donation {donation_id}: label attach returned {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_body_matches_the_web_form() {
        let body = encode_attach_body("D1", "L9");
        assert_eq!(
            body,
            vec![
                ("_method".to_string(), "PATCH".to_string()),
                ("donation[id]".to_string(), "D1".to_string()),
                ("section".to_string(), "labels".to_string()),
                (
                    "donation[donations_labels_attributes][][label_id]".to_string(),
                    "L9".to_string()
                ),
                (
                    "donation[donations_labels_attributes][][id]".to_string(),
                    String::new()
                ),
            ]
        );
    }

    #[test]
    fn donation_url_is_keyed_by_id() {
        let base = Url::parse(GIVING_BASE).unwrap();
        let url = base.join("donations/D1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://giving.planningcenteronline.com/donations/D1"
        );
    }
}
