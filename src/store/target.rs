use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::error::HubError;
use crate::models::{Criticality, TargetEntry};

use super::Store;

impl Store {
    /// Insert or update a target from the catalog sync feed, keyed on
    /// `external_id`. Preserves GVM ids, schedule and `last_scan_id`
    /// across re-syncs.
    pub async fn upsert_target(&self, entry: &TargetEntry) -> Result<(), sqlx::Error> {
        let ports = entry
            .ports
            .as_ref()
            .map(|p| serde_json::to_string(p).unwrap_or_default());
        let tags = serde_json::to_string(&entry.tags).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO targets
                (external_id, host, ports, scan_type, scan_config, criticality,
                 criticality_weight, scan_frequency_hours, enabled, tags,
                 next_scan_at, synced_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                host = excluded.host,
                ports = excluded.ports,
                scan_type = excluded.scan_type,
                scan_config = excluded.scan_config,
                criticality = excluded.criticality,
                criticality_weight = excluded.criticality_weight,
                scan_frequency_hours = excluded.scan_frequency_hours,
                enabled = excluded.enabled,
                tags = excluded.tags,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&entry.external_id)
        .bind(&entry.host)
        .bind(ports)
        .bind(entry.scan_type.as_str())
        .bind(&entry.scan_config)
        .bind(entry.criticality.as_str())
        .bind(entry.criticality.weight())
        .bind(entry.scan_frequency_hours)
        .bind(entry.enabled as i32)
        .bind(tags)
        .bind(entry.next_scan_at.map(|dt| dt.to_rfc3339()))
        .bind(entry.synced_at.to_rfc3339())
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a manually-registered target. Fails with
    /// `TargetAlreadyExists` rather than silently upserting — manual
    /// registration is not a sync operation.
    pub async fn insert_manual_target(&self, entry: &TargetEntry) -> Result<(), HubError> {
        if self.get_target(&entry.external_id).await?.is_some() {
            return Err(HubError::TargetAlreadyExists(entry.external_id.clone()));
        }
        self.upsert_target(entry).await?;
        Ok(())
    }

    /// Disable every enabled target whose `external_id` is absent from the
    /// latest sync response.
    pub async fn deactivate_missing(&self, active_ids: &HashSet<String>) -> Result<u64, sqlx::Error> {
        let enabled_rows = sqlx::query("SELECT external_id FROM targets WHERE enabled = 1")
            .fetch_all(&self.pool)
            .await?;

        let mut deactivated = 0u64;
        for row in enabled_rows {
            let external_id: String = row.get("external_id");
            if !active_ids.contains(&external_id) {
                sqlx::query("UPDATE targets SET enabled = 0 WHERE external_id = ?")
                    .bind(&external_id)
                    .execute(&self.pool)
                    .await?;
                deactivated += 1;
            }
        }

        Ok(deactivated)
    }

    /// Targets due for a scan, most critical first, skipping any target that
    /// already has an active (uncompleted) scan — the anti-duplicate-scan
    /// predicate lives in the query, not a post-filter.
    pub async fn get_due_targets(&self, now: DateTime<Utc>) -> Result<Vec<TargetEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT t.* FROM targets t
            WHERE t.enabled = 1
              AND t.next_scan_at IS NOT NULL
              AND t.next_scan_at <= ?
              AND NOT EXISTS (
                  SELECT 1 FROM scans s
                  WHERE s.external_target_id = t.external_id
                    AND s.completed_at IS NULL
              )
            ORDER BY t.criticality_weight DESC, t.next_scan_at ASC
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_target).collect())
    }

    pub async fn update_target_gvm_ids(
        &self,
        external_id: &str,
        gvm_target_id: Option<&str>,
        gvm_port_list_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE targets SET gvm_target_id = ?, gvm_port_list_id = ? WHERE external_id = ?",
        )
        .bind(gvm_target_id)
        .bind(gvm_port_list_id)
        .bind(external_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Advance a target's schedule after a scan is created:
    /// `last_scan_at = now`, `next_scan_at = now + scan_frequency_hours`.
    pub async fn update_target_schedule(
        &self,
        external_id: &str,
        scan_id: uuid::Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let target = self.get_target(external_id).await?;
        let Some(target) = target else {
            return Ok(());
        };
        let next = now + chrono::Duration::hours(target.scan_frequency_hours);

        sqlx::query(
            "UPDATE targets SET last_scan_at = ?, next_scan_at = ?, last_scan_id = ? WHERE external_id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(next.to_rfc3339())
        .bind(scan_id.to_string())
        .bind(external_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_targets(&self) -> Result<Vec<TargetEntry>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM targets ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_target).collect())
    }

    pub async fn get_target(&self, external_id: &str) -> Result<Option<TargetEntry>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM targets WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| row_to_target(&r)))
    }
}

fn row_to_target(row: &sqlx::sqlite::SqliteRow) -> TargetEntry {
    let ports: Option<String> = row.get("ports");
    let tags: String = row.get("tags");
    let last_scan_at: Option<String> = row.get("last_scan_at");
    let next_scan_at: Option<String> = row.get("next_scan_at");
    let last_scan_id: Option<String> = row.get("last_scan_id");
    let scan_type: String = row.get("scan_type");
    let criticality: String = row.get("criticality");
    let synced_at: String = row.get("synced_at");
    let created_at: String = row.get("created_at");

    TargetEntry {
        external_id: row.get("external_id"),
        host: row.get("host"),
        ports: ports.and_then(|p| serde_json::from_str(&p).ok()),
        scan_type: scan_type.parse().unwrap_or(crate::models::ScanType::Full),
        scan_config: row.get("scan_config"),
        criticality: criticality.parse().unwrap_or(Criticality::Medium),
        scan_frequency_hours: row.get("scan_frequency_hours"),
        enabled: row.get::<i32, _>("enabled") != 0,
        tags: serde_json::from_str(&tags).unwrap_or(serde_json::Value::Null),
        last_scan_at: last_scan_at.as_deref().map(parse_dt),
        next_scan_at: next_scan_at.as_deref().map(parse_dt),
        last_scan_id: last_scan_id.and_then(|s| uuid::Uuid::parse_str(&s).ok()),
        gvm_target_id: row.get("gvm_target_id"),
        gvm_port_list_id: row.get("gvm_port_list_id"),
        synced_at: parse_dt(&synced_at),
        created_at: parse_dt(&created_at),
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_store;
    use super::*;
    use crate::models::ScanType;

    fn sample(id: &str, criticality: Criticality) -> TargetEntry {
        TargetEntry::new(
            id.to_string(),
            "10.0.0.1".to_string(),
            None,
            ScanType::Full,
            None,
            criticality,
            24,
            true,
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn insert_manual_target_rejects_duplicate() {
        let store = test_store().await;
        let entry = sample("ext-1", Criticality::High);
        store.insert_manual_target(&entry).await.unwrap();

        let err = store.insert_manual_target(&entry).await.unwrap_err();
        assert!(matches!(err, HubError::TargetAlreadyExists(_)));
    }

    #[tokio::test]
    async fn due_targets_ordered_by_criticality_weight() {
        let store = test_store().await;
        store.upsert_target(&sample("low", Criticality::Low)).await.unwrap();
        store
            .upsert_target(&sample("critical", Criticality::Critical))
            .await
            .unwrap();
        store.upsert_target(&sample("medium", Criticality::Medium)).await.unwrap();

        let due = store.get_due_targets(Utc::now()).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|t| t.external_id.as_str()).collect();
        assert_eq!(ids, vec!["critical", "medium", "low"]);
    }

    #[tokio::test]
    async fn due_targets_skip_target_with_active_scan() {
        let store = test_store().await;
        let entry = sample("ext-2", Criticality::High);
        store.upsert_target(&entry).await.unwrap();

        let record = crate::models::ScanRecord::new(
            "p1".to_string(),
            entry.host.clone(),
            ScanType::Full,
            None,
            None,
            Some(entry.external_id.clone()),
        );
        store.insert_scan(&record).await.unwrap();

        let due = store.get_due_targets(Utc::now()).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn deactivate_missing_disables_absent_targets() {
        let store = test_store().await;
        store.upsert_target(&sample("keep", Criticality::Low)).await.unwrap();
        store.upsert_target(&sample("drop", Criticality::Low)).await.unwrap();

        let mut active = HashSet::new();
        active.insert("keep".to_string());
        let n = store.deactivate_missing(&active).await.unwrap();
        assert_eq!(n, 1);

        let dropped = store.get_target("drop").await.unwrap().unwrap();
        assert!(!dropped.enabled);
        let kept = store.get_target("keep").await.unwrap().unwrap();
        assert!(kept.enabled);
    }

    #[tokio::test]
    async fn update_target_schedule_advances_next_scan_at() {
        let store = test_store().await;
        let entry = sample("ext-3", Criticality::Medium);
        store.upsert_target(&entry).await.unwrap();

        let now = Utc::now();
        let scan_id = uuid::Uuid::new_v4();
        store
            .update_target_schedule(&entry.external_id, scan_id, now)
            .await
            .unwrap();

        let updated = store.get_target(&entry.external_id).await.unwrap().unwrap();
        assert_eq!(updated.last_scan_id, Some(scan_id));
        assert!(updated.next_scan_at.unwrap() > now);
    }
}
