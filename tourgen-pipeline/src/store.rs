//! Guide persistence
//!
//! Guides are keyed by `(normalized location name, language)`. Saving the same
//! key again replaces the previous guide.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tourgen_common::text::normalize_name;
use uuid::Uuid;

use crate::types::{GuideStop, LanguageCode, ResolvedLocation};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuideKey {
    pub normalized_name: String,
    pub language: LanguageCode,
}

impl GuideKey {
    pub fn new(location_name: &str, language: LanguageCode) -> Self {
        Self {
            normalized_name: normalize_name(location_name),
            language,
        }
    }

    pub fn for_location(resolved: &ResolvedLocation) -> Self {
        Self::new(resolved.name(), resolved.query.language.clone())
    }
}

/// Persisted pipeline output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredGuide {
    pub run_id: Uuid,
    pub resolved_location: ResolvedLocation,
    pub stops: Vec<GuideStop>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Guide payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

#[async_trait]
pub trait GuideStore: Send + Sync {
    /// Insert or replace the guide stored under `key`
    async fn save(&self, key: &GuideKey, guide: &StoredGuide) -> Result<(), StoreError>;

    async fn load(&self, key: &GuideKey) -> Result<Option<StoredGuide>, StoreError>;
}

/// Process-local store
#[derive(Default)]
pub struct MemoryGuideStore {
    guides: RwLock<HashMap<GuideKey, StoredGuide>>,
}

impl MemoryGuideStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GuideStore for MemoryGuideStore {
    async fn save(&self, key: &GuideKey, guide: &StoredGuide) -> Result<(), StoreError> {
        self.guides.write().await.insert(key.clone(), guide.clone());
        Ok(())
    }

    async fn load(&self, key: &GuideKey) -> Result<Option<StoredGuide>, StoreError> {
        Ok(self.guides.read().await.get(key).cloned())
    }
}

/// SQLite-backed store (`guides` table, JSON payload)
pub struct SqliteGuideStore {
    pool: SqlitePool,
}

impl SqliteGuideStore {
    /// Connect to `url` and create the `guides` table if missing
    ///
    /// # Errors
    /// Returns `StoreError::Database` if the connection or schema creation fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(url).await?;
        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the `guides` table if missing
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guides (
                normalized_name TEXT NOT NULL,
                language TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (normalized_name, language)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl GuideStore for SqliteGuideStore {
    async fn save(&self, key: &GuideKey, guide: &StoredGuide) -> Result<(), StoreError> {
        let payload = serde_json::to_string(guide)?;

        sqlx::query(
            r#"
            INSERT INTO guides (normalized_name, language, payload, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(normalized_name, language) DO UPDATE SET
                payload = excluded.payload,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&key.normalized_name)
        .bind(key.language.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        tracing::debug!(name = %key.normalized_name, language = %key.language, "Guide saved");
        Ok(())
    }

    async fn load(&self, key: &GuideKey) -> Result<Option<StoredGuide>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT payload
            FROM guides
            WHERE normalized_name = ? AND language = ?
            "#,
        )
        .bind(&key.normalized_name)
        .bind(key.language.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: String = row.get("payload");
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateCoordinate, LocationQuery, SourceId};
    use sqlx::sqlite::SqlitePoolOptions;

    fn guide(name: &str, stops: usize) -> StoredGuide {
        let query = LocationQuery::new(name, LanguageCode::parse("ko").unwrap());
        StoredGuide {
            run_id: Uuid::new_v4(),
            resolved_location: ResolvedLocation {
                query,
                coordinate: CandidateCoordinate::new(37.5796, 126.977, SourceId::from("plus-code"), 0.95).unwrap(),
                country_code: "KOR".to_string(),
                region_name: "Seoul".to_string(),
                resolution_tier: 0,
                alternates: Vec::new(),
            },
            stops: (0..stops).map(|i| GuideStop::new(i, format!("stop {i}"), "text")).collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_key_normalizes_name() {
        let ko = LanguageCode::parse("ko").unwrap();
        assert_eq!(GuideKey::new("  N Seoul-Tower ", ko.clone()), GuideKey::new("n seoul tower", ko));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryGuideStore::new();
        let saved = guide("경복궁", 3);
        let key = GuideKey::for_location(&saved.resolved_location);

        assert!(store.load(&key).await.unwrap().is_none());
        store.save(&key, &saved).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_sqlite_store_upserts() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        let store = SqliteGuideStore::with_pool(pool).await.unwrap();

        let first = guide("경복궁", 2);
        let key = GuideKey::for_location(&first.resolved_location);
        store.save(&key, &first).await.unwrap();

        let second = guide("경복궁", 5);
        store.save(&key, &second).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.run_id, second.run_id);
        assert_eq!(loaded.stops.len(), 5);

        let other = GuideKey::new("경복궁", LanguageCode::parse("en").unwrap());
        assert!(store.load(&other).await.unwrap().is_none());
    }
}
