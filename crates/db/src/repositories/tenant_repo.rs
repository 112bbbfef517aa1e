//! Repository for the `tenants` table.

use sqlx::PgPool;

use crate::models::tenant::{Tenant, UpsertTenant};

const COLUMNS: &str = "\
    id, display_name, music_text_channel_id, music_voice_channel_id, \
    music_volume, created_at, updated_at";

pub struct TenantRepo;

impl TenantRepo {
    /// Create a tenant or refresh its name and music settings.
    pub async fn upsert(pool: &PgPool, input: &UpsertTenant) -> Result<Tenant, sqlx::Error> {
        let query = format!(
            "INSERT INTO tenants \
                (id, display_name, music_text_channel_id, music_voice_channel_id, music_volume) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                display_name = EXCLUDED.display_name, \
                music_text_channel_id = EXCLUDED.music_text_channel_id, \
                music_voice_channel_id = EXCLUDED.music_voice_channel_id, \
                music_volume = EXCLUDED.music_volume, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&query)
            .bind(&input.id)
            .bind(&input.display_name)
            .bind(&input.music_text_channel_id)
            .bind(&input.music_voice_channel_id)
            .bind(input.music_volume)
            .fetch_one(pool)
            .await
    }

    /// Record a tenant the first time it queues something, or refresh its
    /// display name. Channel and volume settings are left untouched.
    pub async fn ensure(
        pool: &PgPool,
        id: &str,
        display_name: &str,
    ) -> Result<Tenant, sqlx::Error> {
        let query = format!(
            "INSERT INTO tenants (id, display_name) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET \
                display_name = EXCLUDED.display_name, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&query)
            .bind(id)
            .bind(display_name)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Tenant>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tenants WHERE id = $1");
        sqlx::query_as::<_, Tenant>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All known tenants, oldest first. Used at startup to spawn workers.
    pub async fn list(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tenants ORDER BY created_at ASC, id ASC");
        sqlx::query_as::<_, Tenant>(&query).fetch_all(pool).await
    }
}
