//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` DTO for inserts or upserts

pub mod tenant;
pub mod track;
pub mod track_request;
