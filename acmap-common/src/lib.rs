//! # acmap common library
//!
//! Account alias mapping core shared by the service and command-line tools:
//! - Mapping document model (current and legacy shapes)
//! - Alias store trait with CouchDB, SQLite and in-memory backends
//! - Mapping resolver (strict-uniqueness and merge-with-history policies)
//! - Alias lookup and listing
//! - CSV ingestion of mapping exports
//! - Configuration loading

pub mod config;
pub mod error;
pub mod ingest;
pub mod lookup;
pub mod model;
pub mod resolver;
pub mod store;

pub use error::{Error, Result};
pub use lookup::LookupService;
pub use model::{MappingDocument, MappingRecord};
pub use resolver::{MappingResolver, MappingUpdate, ResolutionPolicy, ResolveOutcome};
pub use store::{open_store, AliasStore, SharedStore};
