//! JSON:API documents returned by the provider
//!
//! Only the attributes the scheduler reads are modelled; unknown fields are
//! ignored and missing ones fall back to their defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

use crate::models::{Assignment, AssignmentStatus, ServiceTime};
use crate::utils::error::FetchError;

/// Top-level response document
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "A: Deserialize<'de> + Default"))]
pub struct Document<A> {
    #[serde(default)]
    pub data: Vec<Resource<A>>,

    #[serde(default)]
    pub included: Vec<Resource<NamedAttributes>>,
}

/// A single resource object
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "A: Deserialize<'de> + Default"))]
pub struct Resource<A> {
    pub id: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: A,

    #[serde(default)]
    pub relationships: HashMap<String, Relationship>,
}

/// Relationship linkage; `data` is an identifier object, an array or null
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Relationship {
    /// `(type, id)` of a to-one linkage
    pub fn identifier(&self) -> Option<(&str, &str)> {
        let data = self.data.as_ref()?;
        let kind = data.get("type")?.as_str()?;
        let id = data.get("id")?.as_str()?;
        Some((kind, id))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanAttributes {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub dates: String,

    #[serde(default)]
    pub sort_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanTimeAttributes {
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub time_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamMemberAttributes {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub team_position_name: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
}

/// Attributes shared by people, teams and team positions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedAttributes {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub full_name: Option<String>,
}

impl NamedAttributes {
    pub fn display_name(&self) -> Option<&str> {
        [self.name.as_deref(), self.full_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a response body into a document
pub fn parse_document<A>(body: &str) -> Result<Document<A>, FetchError>
where
    A: for<'de> Deserialize<'de> + Default,
{
    serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Service times with a start timestamp; entries without one are dropped
pub fn service_times_from_document(doc: Document<PlanTimeAttributes>) -> Vec<ServiceTime> {
    doc.data
        .into_iter()
        .filter_map(|item| {
            let starts_at = item.attributes.starts_at?;
            Some(ServiceTime {
                starts_at,
                name: item.attributes.name,
            })
        })
        .collect()
}

fn included_key(kind: &str, id: &str) -> String {
    format!("{kind}-{id}")
}

/// Assignments from a team members document with `person` and
/// `team_position` included
///
/// The position name comes from the member's `team_position_name`, falling
/// back to the included team position. The person name comes from the
/// included person, falling back to the member's own `name`.
pub fn assignments_from_document(doc: Document<TeamMemberAttributes>) -> Vec<Assignment> {
    let included: HashMap<String, &NamedAttributes> = doc
        .included
        .iter()
        .map(|item| (included_key(&item.kind, &item.id), &item.attributes))
        .collect();

    let lookup = |member: &Resource<TeamMemberAttributes>, relation: &str| -> Option<String> {
        let (kind, id) = member.relationships.get(relation)?.identifier()?;
        let attributes = included.get(&included_key(kind, id))?;
        attributes.display_name().map(str::to_string)
    };

    doc.data
        .iter()
        .map(|member| {
            let position_name = member
                .attributes
                .team_position_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or_else(|| lookup(member, "team_position"))
                .unwrap_or_default();

            let person_name = lookup(member, "person")
                .or_else(|| {
                    member
                        .attributes
                        .name
                        .as_deref()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
                .unwrap_or_default();

            Assignment {
                person_name,
                position_name,
                status: member
                    .attributes
                    .status
                    .as_deref()
                    .and_then(AssignmentStatus::from_code),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEAM_MEMBERS: &str = r#"{
        "data": [
            {
                "id": "1",
                "type": "PlanPerson",
                "attributes": { "name": "Jane D.", "team_position_name": "Worship Leader", "status": "C" },
                "relationships": {
                    "person": { "data": { "type": "Person", "id": "p1" } },
                    "team_position": { "data": { "type": "TeamPosition", "id": "tp1" } }
                }
            },
            {
                "id": "2",
                "type": "PlanPerson",
                "attributes": { "name": "Sam Smith", "team_position_name": null, "status": "U" },
                "relationships": {
                    "person": { "data": null },
                    "team_position": { "data": { "type": "TeamPosition", "id": "tp2" } }
                }
            }
        ],
        "included": [
            { "id": "p1", "type": "Person", "attributes": { "name": "Jane Doe" } },
            { "id": "tp1", "type": "TeamPosition", "attributes": { "name": "Leader" } },
            { "id": "tp2", "type": "TeamPosition", "attributes": { "name": "Mic 3" } }
        ]
    }"#;

    #[test]
    fn test_assignments_prefer_included_person_and_member_position() {
        let doc: Document<TeamMemberAttributes> = parse_document(TEAM_MEMBERS).unwrap();
        let assignments = assignments_from_document(doc);

        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].person_name, "Jane Doe");
        assert_eq!(assignments[0].position_name, "Worship Leader");
        assert_eq!(assignments[0].status, Some(AssignmentStatus::Confirmed));

        assert_eq!(assignments[1].person_name, "Sam Smith");
        assert_eq!(assignments[1].position_name, "Mic 3");
        assert_eq!(assignments[1].status, Some(AssignmentStatus::Unconfirmed));
    }

    #[test]
    fn test_service_times_skip_missing_start() {
        let body = r#"{
            "data": [
                { "id": "t1", "type": "PlanTime", "attributes": { "starts_at": "2026-03-01T15:00:00Z", "name": "First" } },
                { "id": "t2", "type": "PlanTime", "attributes": { "starts_at": null } }
            ]
        }"#;
        let doc: Document<PlanTimeAttributes> = parse_document(body).unwrap();
        let times = service_times_from_document(doc);

        assert_eq!(times.len(), 1);
        assert_eq!(times[0].name.as_deref(), Some("First"));
    }

    #[test]
    fn test_null_title_becomes_empty() {
        let body = r#"{ "data": [ { "id": "9", "type": "Plan", "attributes": { "title": null, "dates": "March 1, 2026" } } ] }"#;
        let doc: Document<PlanAttributes> = parse_document(body).unwrap();

        assert_eq!(doc.data[0].attributes.title, "");
        assert_eq!(doc.data[0].attributes.dates, "March 1, 2026");
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        let result = parse_document::<PlanAttributes>("<html>");
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }
}
