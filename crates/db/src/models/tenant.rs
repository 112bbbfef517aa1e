//! Tenant (community) configuration rows.

use serde::{Deserialize, Serialize};
use shanty_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `tenants` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tenant {
    pub id: String,
    pub display_name: String,
    pub music_text_channel_id: Option<String>,
    pub music_voice_channel_id: Option<String>,
    /// Playback gain in `0.0..=2.0`; `None` uses the service default.
    pub music_volume: Option<f32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating or refreshing a tenant when the gateway reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertTenant {
    pub id: String,
    pub display_name: String,
    pub music_text_channel_id: Option<String>,
    pub music_voice_channel_id: Option<String>,
    pub music_volume: Option<f32>,
}
