//! End-to-end labeling pass: paginate recent donations, resolve each
//! donor's campus, map it to a giving label, attach the label when it is
//! missing. Already-labeled donations are skipped, which is what makes
//! repeated runs idempotent.
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

use crate::api::model::{Campus, Donation, Label};
use crate::api::GivingApi;
use crate::mutator::LabelWriter;

/// How far back to look for donations. The window bounds the per-run
/// workload; anything older has been covered by earlier runs.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

const PAGE_SIZE: u64 = 100;

pub struct Labeler<'a> {
    api: &'a dyn GivingApi,
    writer: &'a dyn LabelWriter,
    mappings: HashMap<String, String>,
    window_days: i64,
    labels: OnceCell<LabelIndex>,
    campuses: OnceCell<HashMap<String, Campus>>,
}

struct LabelIndex {
    by_id: HashMap<String, Label>,
    by_slug: HashMap<String, Label>,
}

impl<'a> Labeler<'a> {
    pub fn new(
        api: &'a dyn GivingApi,
        writer: &'a dyn LabelWriter,
        mappings: HashMap<String, String>,
        window_days: i64,
    ) -> Self {
        Self {
            api,
            writer,
            mappings,
            window_days,
            labels: OnceCell::new(),
            campuses: OnceCell::new(),
        }
    }

    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<()> {
        let received_after = received_after(self.window_days);
        let mut offset = 0;
        loop {
            let page = self
                .api
                .donations_page(offset, PAGE_SIZE, &received_after)
                .await?;
            for donation in &page.donations {
                self.process_donation(donation).await?;
            }
            match page.next_offset {
                Some(next) => offset = next,
                None => break,
            }
        }
        Ok(())
    }

    async fn process_donation(&self, donation: &Donation) -> Result<()> {
        if donation.is_failed() {
            return Ok(());
        }

        let labels = self.labels().await?;
        let existing: Vec<&Label> = donation
            .label_ids()
            .filter_map(|id| labels.by_id.get(id))
            .collect();
        if !existing.is_empty() {
            let slugs: Vec<&str> = existing.iter().map(|l| l.slug()).collect();
            info!(
                "donation {}: already has label {}",
                donation.id,
                slugs.join(", ")
            );
            return Ok(());
        }

        let Some(person_id) = donation.person_id() else {
            info!("donation {}: no linked person", donation.id);
            return Ok(());
        };
        let person = self.api.person(person_id).await?;
        let Some(campus_id) = person.primary_campus_id() else {
            info!(
                "donation {}: no campus for {}",
                donation.id,
                person.display_name()
            );
            return Ok(());
        };

        // From here on, absence means misconfiguration or bad platform
        // data; halting loudly beats silently leaving donations unlabeled.
        let campuses = self.campuses().await?;
        let campus = campuses.get(campus_id).ok_or_else(|| {
            anyhow!(
                "donation {}: campus {campus_id} not found among known campuses",
                donation.id
            )
        })?;
        let slug = self.mappings.get(campus.name()).ok_or_else(|| {
            anyhow!("no label mapping configured for campus '{}'", campus.name())
        })?;
        let label = labels
            .by_slug
            .get(slug.as_str())
            .ok_or_else(|| anyhow!("label slug '{slug}' not found among giving labels"))?;

        info!(
            "donation {}: applying label {} for {}...",
            donation.id,
            slug,
            person.display_name()
        );
        self.writer.attach_label(&donation.id, &label.id).await?;
        Ok(())
    }

    async fn labels(&self) -> Result<&LabelIndex> {
        self.labels
            .get_or_try_init(|| async {
                let labels = self
                    .api
                    .labels(PAGE_SIZE)
                    .await
                    .context("failed to list giving labels")?;
                let mut by_id = HashMap::new();
                let mut by_slug = HashMap::new();
                for label in labels {
                    by_slug.insert(label.slug().to_owned(), label.clone());
                    by_id.insert(label.id.clone(), label);
                }
                Ok(LabelIndex { by_id, by_slug })
            })
            .await
    }

    async fn campuses(&self) -> Result<&HashMap<String, Campus>> {
        self.campuses
            .get_or_try_init(|| async {
                let campuses = self
                    .api
                    .campuses(PAGE_SIZE)
                    .await
                    .context("failed to list campuses")?;
                Ok(campuses.into_iter().map(|c| (c.id.clone(), c)).collect())
            })
            .await
    }
}

/// Midnight-truncated UTC timestamp `window_days` ago, in the format the
/// donations filter expects.
pub fn received_after(window_days: i64) -> String {
    (Utc::now() - Duration::days(window_days))
        .format("%Y-%m-%dT00:00:00Z")
        .to_string()
}
