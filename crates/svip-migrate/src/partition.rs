//! Year partitioning and destination collection naming.

use bson::DateTime;
use chrono::Datelike;
use std::fmt;

/// Suffix used for records whose partitioning timestamp is missing.
pub const UNDATED_SUFFIX: &str = "undated";

/// `0001-01-01T00:00:00Z`, stored by some upstream writers for an unset time.
const ZERO_TIME_MILLIS: i64 = -62_135_596_800_000;

/// Kind of document written to a per-year collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Migrated checkin copies (`checkins_<year>`).
    Checkin,
    /// Reduced closure documents (`cierres_<year>`).
    Closure,
}

impl EntityKind {
    /// Collection name prefix for this kind.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Checkin => "checkins",
            EntityKind::Closure => "cierres",
        }
    }
}

/// Partition key derived from a record timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Calendar year (UTC) of the timestamp.
    Year(i32),
    /// The timestamp was absent or zero-valued.
    Undated,
}

impl Partition {
    /// Derives the partition from an optional timestamp.
    ///
    /// A zero-value timestamp is treated the same as a missing one.
    #[must_use]
    pub fn from_timestamp(ts: Option<DateTime>) -> Self {
        match ts {
            Some(ts) if ts.timestamp_millis() != ZERO_TIME_MILLIS => {
                Partition::Year(ts.to_chrono().year())
            }
            _ => Partition::Undated,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Year(year) => write!(f, "{year}"),
            Partition::Undated => f.write_str(UNDATED_SUFFIX),
        }
    }
}

/// Name of the destination collection for `kind` in `partition`.
#[must_use]
pub fn destination_name(kind: EntityKind, partition: Partition) -> String {
    format!("{}_{}", kind.prefix(), partition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(rfc3339: &str) -> DateTime {
        DateTime::parse_rfc3339_str(rfc3339).unwrap()
    }

    #[test]
    fn test_destination_name_year() {
        assert_eq!(
            destination_name(EntityKind::Checkin, Partition::Year(2021)),
            "checkins_2021"
        );
        assert_eq!(
            destination_name(EntityKind::Closure, Partition::Year(2022)),
            "cierres_2022"
        );
    }

    #[test]
    fn test_destination_name_undated() {
        assert_eq!(
            destination_name(EntityKind::Checkin, Partition::Undated),
            "checkins_undated"
        );
        assert_eq!(
            destination_name(EntityKind::Closure, Partition::Undated),
            "cierres_undated"
        );
    }

    #[test]
    fn test_partition_uses_utc_year() {
        // 23:30 on new year's eve UTC stays in the old year.
        let p = Partition::from_timestamp(Some(ts("2021-12-31T23:30:00Z")));
        assert_eq!(p, Partition::Year(2021));

        let p = Partition::from_timestamp(Some(ts("2021-12-31T22:30:00-03:00")));
        assert_eq!(p, Partition::Year(2022));
    }

    #[test]
    fn test_partition_missing_timestamp() {
        assert_eq!(Partition::from_timestamp(None), Partition::Undated);
    }

    #[test]
    fn test_partition_zero_value_timestamp() {
        let zero = ts("0001-01-01T00:00:00Z");
        assert_eq!(Partition::from_timestamp(Some(zero)), Partition::Undated);
    }

    #[test]
    fn test_partition_pre_epoch() {
        let p = Partition::from_timestamp(Some(ts("1969-07-20T20:17:00Z")));
        assert_eq!(p, Partition::Year(1969));
    }
}
