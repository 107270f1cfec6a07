use sqlx::SqlitePool;

use super::models::KvEntry;

/// Get the raw value stored under `key`.
pub async fn get_value(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await
}

/// Insert or overwrite the value stored under `key`.
pub async fn upsert_value(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO kv_store (key, value, updated_at)
         VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete the value stored under `key`. Deleting a missing key is not an error.
pub async fn delete_value(pool: &SqlitePool, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM kv_store WHERE key = ?1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// List every entry whose key starts with `prefix`, ordered by key.
///
/// Uses `substr` rather than `LIKE` so `%` and `_` inside location names
/// are matched literally.
pub async fn list_entries_with_prefix(
    pool: &SqlitePool,
    prefix: &str,
) -> Result<Vec<KvEntry>, sqlx::Error> {
    sqlx::query_as::<_, KvEntry>(
        "SELECT key, value FROM kv_store
         WHERE substr(key, 1, length(?1)) = ?1
         ORDER BY key",
    )
    .bind(prefix)
    .fetch_all(pool)
    .await
}

/// Connectivity probe used by the health endpoint.
pub async fn ping(pool: &SqlitePool) -> bool {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok()
}
