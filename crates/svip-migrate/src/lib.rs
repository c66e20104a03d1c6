// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # svip-migrate
//!
//! `svip-migrate` is a one-shot CLI tool and library that re-partitions
//! closure (`cierre`) records and their embedded checkins into per-year
//! collections.
//!
//! For every closure read from the source collection:
//!
//! | Write | Destination | Content |
//! |-------|-------------|---------|
//! | one per embedded checkin | `checkins_<year of fechaIngreso>` | the checkin, unchanged |
//! | one per closure | `cierres_<year of envio>` | the closure with `lstCheckins` replaced by `checkins: [ids]` |
//!
//! Records without a timestamp go to the `*_undated` collections. Source
//! documents are never modified; running twice writes everything twice.
//!
//! ## Quick Start
//!
//! ```bash
//! svip-migrate --uri mongodb://localhost:27017 --database server_svip
//!
//! # Dry run (read and transform only)
//! svip-migrate --config migration.yaml --dry-run
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   uri: mongodb://localhost:27017
//!   database: server_svip
//!   collection: cierre
//!
//! options:
//!   concurrency: 20
//!   insert_timeout_secs: 30
//!   report_path: ./migration-report.json
//! ```

#![warn(missing_docs)]

pub mod admission;
pub mod config;
pub mod error;
pub mod partition;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod report;
pub mod retry;
pub mod store;
pub mod transform;
pub mod worker;

pub use config::{MigrationConfig, MigrationOptions, SourceConfig};
pub use error::{Error, Result};
pub use partition::{destination_name, EntityKind, Partition};
pub use pipeline::Pipeline;
pub use record::{CheckinRecord, ClosureRecord, MigratedClosure, Venue};
pub use report::{FailedInsert, MigrationReport};
pub use store::{DocumentStore, MemoryStore, MongoStore};
