//! Splits a closure record into per-year writes.
//!
//! The transformation is pure: it decides where every checkin copy and the
//! reduced closure go, and builds the reduced closure once the set of
//! successfully migrated checkins is known.

use bson::Document;

use crate::partition::{destination_name, EntityKind, Partition};
use crate::record::{ClosureRecord, MigratedClosure, Venue};

/// One checkin copy and its destination.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckinWrite {
    /// Checkin identifier.
    pub checkin_id: String,
    /// Destination collection (`checkins_<year>`).
    pub collection: String,
    /// Document to insert, identical to the embedded source.
    pub document: Document,
}

/// All writes derived from one closure record.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    /// Closure identifier.
    pub closure_id: String,
    /// Checkin copies, in the record's original order.
    pub checkins: Vec<CheckinWrite>,
    /// Destination collection for the reduced closure (`cierres_<year>`).
    pub closure_collection: String,
    submitted_at: Option<bson::DateTime>,
    received_at: Option<bson::DateTime>,
    venue: Option<Venue>,
    origin: Option<String>,
    class: Option<String>,
}

impl MigrationPlan {
    /// Plans the migration of `record`.
    #[must_use]
    pub fn from_record(record: ClosureRecord) -> Self {
        let checkins = record
            .checkins
            .into_iter()
            .map(|checkin| {
                let partition = Partition::from_timestamp(checkin.entered_at());
                CheckinWrite {
                    checkin_id: checkin.id().to_string(),
                    collection: destination_name(EntityKind::Checkin, partition),
                    document: checkin.into_document(),
                }
            })
            .collect();

        let closure_partition = Partition::from_timestamp(record.submitted_at);

        Self {
            closure_id: record.id,
            checkins,
            closure_collection: destination_name(EntityKind::Closure, closure_partition),
            submitted_at: record.submitted_at,
            received_at: record.received_at,
            venue: record.venue,
            origin: record.origin,
            class: record.class,
        }
    }

    /// Builds the reduced closure referencing `checkin_ids`.
    #[must_use]
    pub fn reduced(&self, checkin_ids: Vec<String>) -> MigratedClosure {
        MigratedClosure {
            id: self.closure_id.clone(),
            checkin_ids,
            submitted_at: self.submitted_at,
            received_at: self.received_at,
            venue: self.venue.clone(),
            origin: self.origin.clone(),
            class: self.class.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, DateTime};

    fn ts(rfc3339: &str) -> DateTime {
        DateTime::parse_rfc3339_str(rfc3339).unwrap()
    }

    fn closure(checkins: Vec<Document>) -> ClosureRecord {
        ClosureRecord::from_document(doc! {
            "_id": "c-1",
            "envio": ts("2022-06-01T00:00:00Z"),
            "recepcion": ts("2022-06-01T00:01:00Z"),
            "origin": "kiosk",
            "_class": "cl.svip.Cierre",
            "lstCheckins": checkins,
        })
        .unwrap()
    }

    #[test]
    fn test_plan_routes_checkins_by_year() {
        // Arrange
        let record = closure(vec![
            doc! { "_id": "k-1", "fechaIngreso": ts("2021-03-01T00:00:00Z") },
            doc! { "_id": "k-2", "fechaIngreso": ts("2021-11-01T00:00:00Z") },
            doc! { "_id": "k-3", "fechaIngreso": ts("2022-01-01T00:00:00Z") },
        ]);

        // Act
        let plan = MigrationPlan::from_record(record);

        // Assert
        let routed: Vec<(&str, &str)> = plan
            .checkins
            .iter()
            .map(|w| (w.checkin_id.as_str(), w.collection.as_str()))
            .collect();
        assert_eq!(
            routed,
            vec![
                ("k-1", "checkins_2021"),
                ("k-2", "checkins_2021"),
                ("k-3", "checkins_2022"),
            ]
        );
        assert_eq!(plan.closure_collection, "cierres_2022");
    }

    #[test]
    fn test_plan_undated_records() {
        let record = ClosureRecord::from_document(doc! {
            "_id": "c-2",
            "lstCheckins": [ { "_id": "k-1" } ],
        })
        .unwrap();

        let plan = MigrationPlan::from_record(record);

        assert_eq!(plan.checkins[0].collection, "checkins_undated");
        assert_eq!(plan.closure_collection, "cierres_undated");
    }

    #[test]
    fn test_plan_keeps_checkin_document() {
        let original = doc! {
            "_id": "k-1",
            "fechaIngreso": ts("2021-03-01T00:00:00Z"),
            "numeroTarjeta": "****1234",
        };
        let plan = MigrationPlan::from_record(closure(vec![original.clone()]));
        assert_eq!(plan.checkins[0].document, original);
    }

    #[test]
    fn test_reduced_closure() {
        let plan = MigrationPlan::from_record(closure(vec![]));

        let reduced = plan.reduced(vec!["k-1".to_string(), "k-3".to_string()]);

        assert_eq!(reduced.id, "c-1");
        assert_eq!(reduced.checkin_ids, vec!["k-1", "k-3"]);
        assert_eq!(reduced.submitted_at, Some(ts("2022-06-01T00:00:00Z")));
        assert_eq!(reduced.received_at, Some(ts("2022-06-01T00:01:00Z")));
        assert_eq!(reduced.origin.as_deref(), Some("kiosk"));
        assert_eq!(reduced.class.as_deref(), Some("cl.svip.Cierre"));
    }
}
