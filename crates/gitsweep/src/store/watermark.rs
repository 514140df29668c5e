//! Incremental sync watermarks.
//!
//! One row per `{target_id}:{sweep}`. A sweep reads its own watermark to
//! compute `since`, and only a completed sweep moves it forward.

use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Set, sea_query::OnConflict};

use crate::entity::sync_watermark::{ActiveModel, Column, Entity as SyncWatermark};

/// When the sweep keyed `sync_target_id` last completed, if ever.
pub async fn last_synced<C: ConnectionTrait>(
    db: &C,
    sync_target_id: &str,
) -> Result<Option<DateTime<Utc>>, DbErr> {
    let row = SyncWatermark::find_by_id(sync_target_id.to_string())
        .one(db)
        .await?;
    Ok(row.map(|r| r.last_synced_at.to_utc()))
}

/// Move the watermark of `sync_target_id` to `at`.
pub async fn record_synced<C: ConnectionTrait>(
    db: &C,
    sync_target_id: &str,
    at: DateTime<Utc>,
) -> Result<(), DbErr> {
    let model = ActiveModel {
        sync_target_id: Set(sync_target_id.to_string()),
        last_synced_at: Set(at.fixed_offset()),
    };
    SyncWatermark::insert(model)
        .on_conflict(
            OnConflict::column(Column::SyncTargetId)
                .update_column(Column::LastSyncedAt)
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}

/// Forget the watermark so the next sweep runs unbounded.
pub async fn clear<C: ConnectionTrait>(db: &C, sync_target_id: &str) -> Result<(), DbErr> {
    SyncWatermark::delete_by_id(sync_target_id.to_string())
        .exec(db)
        .await?;
    Ok(())
}

#[cfg(all(test, feature = "migrate"))]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn watermarks_are_independent_per_key() {
        let db = crate::db::connect_and_migrate("sqlite::memory:")
            .await
            .unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();

        record_synced(&db, "r1:issues", t1).await.unwrap();
        assert_eq!(last_synced(&db, "r1:issues").await.unwrap(), Some(t1));
        assert_eq!(last_synced(&db, "r1:pulls").await.unwrap(), None);

        record_synced(&db, "r1:issues", t2).await.unwrap();
        assert_eq!(last_synced(&db, "r1:issues").await.unwrap(), Some(t2));

        clear(&db, "r1:issues").await.unwrap();
        assert_eq!(last_synced(&db, "r1:issues").await.unwrap(), None);
        // Clearing twice is harmless.
        clear(&db, "r1:issues").await.unwrap();
    }
}
