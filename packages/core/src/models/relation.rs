//! Relation Rows and Links
//!
//! A relation row is a persisted directed edge between two resource ids.
//! Rows are the only schema the backing store needs besides the resource
//! records themselves; the whole reference graph is rebuilt from them.
//!
//! [`RelationRecord`] is the stored shape. [`RelationLink`] is one
//! resource's view of a record: the partner endpoint and the role that
//! partner occupies. Matching reference fields against rows always works
//! on links, never on raw records.

use serde::{Deserialize, Serialize};

use super::resource::ResourceId;

/// Identity of a stored relation row. 0 means the row was not stored yet.
pub type RelationRowId = i64;

/// Kind of a relation row.
///
/// `Custom` rows carry their meaning in the row name; all other kinds are
/// self-describing and use the name only to disambiguate multiple relations
/// of the same kind between the same types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    ParentChild,
    Driver,
    TransportRoute,
    Extension,
    PossiblePart,
    CurrentPart,
    Custom,
}

/// Which endpoint of a relation row a referenced resource occupies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceRole {
    Source,
    #[default]
    Target,
}

/// Persisted directed edge between two resource ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationRecord {
    /// Row identity, 0 until stored.
    pub id: RelationRowId,
    pub kind: RelationKind,
    /// Required for `Custom` rows, optional disambiguator otherwise.
    pub name: Option<String>,
    pub source_id: ResourceId,
    pub target_id: ResourceId,
}

/// One resource's view of a relation row.
///
/// `role` is the role of the *partner*: for a row where the owner is the
/// source, the partner sits at the target end and the link role is
/// [`ReferenceRole::Target`].
#[derive(Debug, Clone, PartialEq)]
pub struct RelationLink {
    pub row_id: RelationRowId,
    pub kind: RelationKind,
    pub name: Option<String>,
    pub role: ReferenceRole,
    pub partner_id: ResourceId,
}

impl RelationLink {
    /// Builds the per-resource view of all records touching `owner`.
    /// Records that do not touch `owner` are skipped.
    pub fn from_records(owner: ResourceId, records: &[RelationRecord]) -> Vec<RelationLink> {
        records
            .iter()
            .filter_map(|record| {
                if record.source_id == owner {
                    Some(RelationLink {
                        row_id: record.id,
                        kind: record.kind,
                        name: record.name.clone(),
                        role: ReferenceRole::Target,
                        partner_id: record.target_id,
                    })
                } else if record.target_id == owner {
                    Some(RelationLink {
                        row_id: record.id,
                        kind: record.kind,
                        name: record.name.clone(),
                        role: ReferenceRole::Source,
                        partner_id: record.source_id,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: RelationRowId, source: ResourceId, target: ResourceId) -> RelationRecord {
        RelationRecord {
            id,
            kind: RelationKind::Driver,
            name: None,
            source_id: source,
            target_id: target,
        }
    }

    #[test]
    fn link_role_is_the_partner_role() {
        let records = vec![record(1, 10, 20), record(2, 30, 10)];

        let links = RelationLink::from_records(10, &records);
        assert_eq!(links.len(), 2);

        // Owner is the source of row 1, so the partner is the target.
        assert_eq!(links[0].row_id, 1);
        assert_eq!(links[0].role, ReferenceRole::Target);
        assert_eq!(links[0].partner_id, 20);

        // Owner is the target of row 2, so the partner is the source.
        assert_eq!(links[1].row_id, 2);
        assert_eq!(links[1].role, ReferenceRole::Source);
        assert_eq!(links[1].partner_id, 30);
    }

    #[test]
    fn unrelated_records_are_skipped() {
        let records = vec![record(1, 20, 30)];
        assert!(RelationLink::from_records(10, &records).is_empty());
    }

    #[test]
    fn default_role_is_target() {
        assert_eq!(ReferenceRole::default(), ReferenceRole::Target);
    }
}
