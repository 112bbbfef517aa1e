//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod tenant_repo;
pub mod track_repo;
pub mod track_request_repo;

pub use tenant_repo::TenantRepo;
pub use track_repo::TrackRepo;
pub use track_request_repo::TrackRequestRepo;
