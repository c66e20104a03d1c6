//! Source and target document shapes.
//!
//! Closure (`cierre`) records are decoded with serde. Embedded checkins keep
//! their original BSON document so that the migrated copy is written back
//! field-for-field; only the id and the entry timestamp are lifted out.
//!
//! Identifiers may be stored as strings or as ObjectIds. Both are read as
//! strings, ObjectIds in their 24-digit hex form.

use bson::{Bson, DateTime, Document};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// Field holding a checkin's entry timestamp.
pub const CHECKIN_ENTERED_AT_FIELD: &str = "fechaIngreso";

/// Lounge descriptor embedded in a closure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    /// Venue identifier.
    #[serde(
        rename = "_id",
        default,
        deserialize_with = "optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Display name.
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Country code.
    #[serde(rename = "pais", default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Airport terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<i64>,
}

/// A checkin embedded in a closure record.
///
/// The engine only reads `_id` and `fechaIngreso`; every other field is
/// opaque and travels with `document`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Document", into = "Document")]
pub struct CheckinRecord {
    id: String,
    entered_at: Option<DateTime>,
    document: Document,
}

impl CheckinRecord {
    /// Checkin identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Entry timestamp, if present.
    #[must_use]
    pub fn entered_at(&self) -> Option<DateTime> {
        self.entered_at
    }

    /// The full source document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Consumes the record, returning the full source document.
    #[must_use]
    pub fn into_document(self) -> Document {
        self.document
    }
}

impl TryFrom<Document> for CheckinRecord {
    type Error = Error;

    fn try_from(document: Document) -> Result<Self, Self::Error> {
        let id = match document.get("_id") {
            Some(raw) => id_string(raw).map_err(|msg| Error::Decode(format!("checkin {msg}")))?,
            None => return Err(Error::Decode("checkin without _id".to_string())),
        };

        let entered_at = match document.get(CHECKIN_ENTERED_AT_FIELD) {
            Some(Bson::DateTime(ts)) => Some(*ts),
            Some(Bson::Null) | None => None,
            Some(other) => {
                return Err(Error::Decode(format!(
                    "checkin {id}: {CHECKIN_ENTERED_AT_FIELD} must be a date, got {:?}",
                    other.element_type()
                )))
            }
        };

        Ok(Self {
            id,
            entered_at,
            document,
        })
    }
}

impl From<CheckinRecord> for Document {
    fn from(record: CheckinRecord) -> Self {
        record.document
    }
}

/// A closure record as stored in the source collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureRecord {
    /// Closure identifier.
    #[serde(rename = "_id", deserialize_with = "required_id")]
    pub id: String,
    /// Submission timestamp; drives the closure's partition.
    #[serde(rename = "envio", default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime>,
    /// Receipt timestamp.
    #[serde(rename = "recepcion", default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime>,
    /// Venue the closure belongs to.
    #[serde(rename = "salon", default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<Venue>,
    /// Embedded checkins, in original order.
    #[serde(rename = "lstCheckins", default, deserialize_with = "null_as_empty")]
    pub checkins: Vec<CheckinRecord>,
    /// Upstream origin tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Schema class tag.
    #[serde(rename = "_class", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl ClosureRecord {
    /// Decodes a closure record from a raw source document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the document does not match the expected shape.
    pub fn from_document(document: Document) -> crate::error::Result<Self> {
        let id_hint = document
            .get("_id")
            .map_or_else(|| "<no _id>".to_string(), ToString::to_string);
        bson::from_document(document).map_err(|e| Error::Decode(format!("closure {id_hint}: {e}")))
    }
}

/// A closure reduced to checkin references, as written to `cierres_<year>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigratedClosure {
    /// Closure identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Ids of the checkins migrated for this closure, in original order.
    #[serde(rename = "checkins")]
    pub checkin_ids: Vec<String>,
    /// Submission timestamp.
    #[serde(rename = "envio", default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime>,
    /// Receipt timestamp.
    #[serde(rename = "recepcion", default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime>,
    /// Venue the closure belongs to.
    #[serde(rename = "salon", default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<Venue>,
    /// Upstream origin tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Schema class tag.
    #[serde(rename = "_class", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl MigratedClosure {
    /// Serializes into a BSON document ready for insertion.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_document(&self) -> crate::error::Result<Document> {
        Ok(bson::to_document(self)?)
    }
}

fn id_string(raw: &Bson) -> Result<String, String> {
    match raw {
        Bson::String(id) => Ok(id.clone()),
        Bson::ObjectId(oid) => Ok(oid.to_hex()),
        other => Err(format!(
            "_id must be a string or ObjectId, got {:?}",
            other.element_type()
        )),
    }
}

fn required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    id_string(&Bson::deserialize(deserializer)?).map_err(<D::Error as serde::de::Error>::custom)
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Bson::deserialize(deserializer)? {
        Bson::Null => Ok(None),
        raw => id_string(&raw).map(Some).map_err(<D::Error as serde::de::Error>::custom),
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
