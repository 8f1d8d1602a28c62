//! Typed views of the Planning Center JSON:API payloads. Every
//! relationship that can legitimately be absent is an `Option` so callers
//! handle absence explicitly instead of digging through raw JSON.
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Collection envelope: `data` plus pagination metadata.
#[derive(Deserialize, Debug)]
pub struct Collection<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Deserialize, Debug, Default)]
pub struct Meta {
    pub next: Option<NextPage>,
}

/// Present only while further pages exist.
#[derive(Deserialize, Debug)]
pub struct NextPage {
    pub offset: u64,
}

/// Single-resource envelope.
#[derive(Deserialize, Debug)]
pub struct Document<T> {
    pub data: T,
}

/// Bare resource identifier as it appears under `relationships`.
#[derive(Deserialize, Debug, Clone)]
pub struct ResourceRef {
    pub id: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ToMany {
    #[serde(default)]
    pub data: Vec<ResourceRef>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ToOne {
    pub data: Option<ResourceRef>,
}

/// One page of donations with the cursor for the next one, if any.
#[derive(Debug)]
pub struct DonationsPage {
    pub donations: Vec<Donation>,
    pub next_offset: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Donation {
    pub id: String,
    #[serde(default)]
    pub attributes: DonationAttributes,
    #[serde(default)]
    pub relationships: DonationRelationships,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct DonationAttributes {
    pub payment_status: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct DonationRelationships {
    #[serde(default)]
    pub labels: ToMany,
    #[serde(default)]
    pub person: ToOne,
}

impl Donation {
    pub fn label_ids(&self) -> impl Iterator<Item = &str> {
        self.relationships.labels.data.iter().map(|r| r.id.as_str())
    }

    pub fn person_id(&self) -> Option<&str> {
        self.relationships.person.data.as_ref().map(|r| r.id.as_str())
    }

    pub fn is_failed(&self) -> bool {
        self.attributes.payment_status.as_deref() == Some("failed")
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Person {
    pub id: String,
    #[serde(default)]
    pub attributes: PersonAttributes,
    #[serde(default)]
    pub relationships: PersonRelationships,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PersonAttributes {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PersonRelationships {
    #[serde(default)]
    pub primary_campus: ToOne,
}

impl Person {
    pub fn primary_campus_id(&self) -> Option<&str> {
        self.relationships
            .primary_campus
            .data
            .as_ref()
            .map(|r| r.id.as_str())
    }

    pub fn display_name(&self) -> String {
        let first = self.attributes.first_name.as_deref().unwrap_or_default();
        let last = self.attributes.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_string()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Label {
    pub id: String,
    pub attributes: LabelAttributes,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LabelAttributes {
    pub slug: String,
}

impl Label {
    pub fn slug(&self) -> &str {
        &self.attributes.slug
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Campus {
    pub id: String,
    pub attributes: CampusAttributes,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CampusAttributes {
    pub name: String,
}

impl Campus {
    pub fn name(&self) -> &str {
        &self.attributes.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn donation_page_parses_relationships_and_cursor() {
        let payload = json!({
            "data": [{
                "type": "Donation",
                "id": "101",
                "attributes": {
                    "payment_status": "succeeded",
                    "received_at": "2026-07-20T14:03:00Z"
                },
                "relationships": {
                    "labels": { "data": [{ "type": "Label", "id": "L1" }] },
                    "person": { "data": { "type": "Person", "id": "P7" } }
                }
            }],
            "meta": { "next": { "offset": 100 }, "total_count": 250 }
        });
        let page: Collection<Donation> = serde_json::from_value(payload).unwrap();
        assert_eq!(page.meta.next.as_ref().unwrap().offset, 100);
        let donation = &page.data[0];
        assert_eq!(donation.id, "101");
        assert!(!donation.is_failed());
        assert_eq!(donation.person_id(), Some("P7"));
        assert_eq!(donation.label_ids().collect::<Vec<_>>(), vec!["L1"]);
    }

    #[test]
    fn final_page_has_no_cursor() {
        let payload = json!({ "data": [] });
        let page: Collection<Donation> = serde_json::from_value(payload).unwrap();
        assert!(page.meta.next.is_none());
    }

    #[test]
    fn donation_without_person_or_labels() {
        let payload = json!({
            "id": "102",
            "attributes": { "payment_status": "failed" },
            "relationships": { "person": { "data": null } }
        });
        let donation: Donation = serde_json::from_value(payload).unwrap();
        assert!(donation.is_failed());
        assert!(donation.person_id().is_none());
        assert_eq!(donation.label_ids().count(), 0);
    }

    #[test]
    fn person_campus_is_optional() {
        let payload = json!({
            "data": {
                "id": "P7",
                "attributes": { "first_name": "Ada", "last_name": "Lovelace" },
                "relationships": {
                    "primary_campus": { "data": { "id": "C3" } }
                }
            }
        });
        let person: Document<Person> = serde_json::from_value(payload).unwrap();
        assert_eq!(person.data.primary_campus_id(), Some("C3"));
        assert_eq!(person.data.display_name(), "Ada Lovelace");

        let payload = json!({ "data": { "id": "P8", "attributes": { "first_name": "Sol" } } });
        let person: Document<Person> = serde_json::from_value(payload).unwrap();
        assert!(person.data.primary_campus_id().is_none());
        assert_eq!(person.data.display_name(), "Sol");
    }

    #[test]
    fn label_and_campus_accessors() {
        let label: Label = serde_json::from_value(json!({
            "id": "L9",
            "attributes": { "slug": "giving-downtown" }
        }))
        .unwrap();
        assert_eq!(label.slug(), "giving-downtown");

        let campus: Campus = serde_json::from_value(json!({
            "id": "C3",
            "attributes": { "name": "Downtown" }
        }))
        .unwrap();
        assert_eq!(campus.name(), "Downtown");
    }
}
