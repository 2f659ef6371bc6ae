//! Dashboard snapshot repository
//!
//! The dashboard cache is a snapshot, not a merge target: every refresh
//! replaces the entire card set inside one transaction, so readers see either
//! the old snapshot or the new one, never a mix.

use crate::error::Result;
use crate::models::DashboardCard;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for the dashboard card snapshot
#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// Replace the entire dashboard snapshot with a new card set
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; on error the
    /// previous snapshot is left intact
    async fn replace_all(&self, cards: &[DashboardCard]) -> Result<()>;

    /// Get the current snapshot ordered by card position
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn all(&self) -> Result<Vec<DashboardCard>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of DashboardRepository
pub struct SqliteDashboardRepository {
    pool: SqlitePool,
}

impl SqliteDashboardRepository {
    /// Create a new SQLite dashboard repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct DashboardCardRow {
    id: i64,
    course_id: i64,
    position: i64,
    title: String,
    image_url: Option<String>,
}

impl From<DashboardCardRow> for DashboardCard {
    fn from(row: DashboardCardRow) -> Self {
        DashboardCard {
            id: row.id,
            course_id: row.course_id,
            position: row.position,
            title: row.title,
            image_url: row.image_url,
        }
    }
}

#[async_trait]
impl DashboardRepository for SqliteDashboardRepository {
    async fn replace_all(&self, cards: &[DashboardCard]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM dashboard_cards")
            .execute(&mut *tx)
            .await?;

        for card in cards {
            sqlx::query(
                r#"
                INSERT INTO dashboard_cards (id, course_id, position, title, image_url)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(card.id)
            .bind(card.course_id)
            .bind(card.position)
            .bind(&card.title)
            .bind(card.image_url.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<DashboardCard>> {
        let rows: Vec<DashboardCardRow> = sqlx::query_as(
            "SELECT id, course_id, position, title, image_url FROM dashboard_cards \
             ORDER BY position, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DashboardCard::from).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
