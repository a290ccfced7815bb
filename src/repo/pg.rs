#![cfg(feature = "db")]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};
use std::str::FromStr;

use super::{AvailableOutcome, LaunchOutcome, MergeStateStore, ReplaceOutcome};
use crate::domain::{
    ArtifactRef, FragmentKey, FragmentRecord, FragmentStatus, MergeKey, MergeRecord, MergeStatus,
    ProcessId, RawCaseRef,
};
use crate::error::{OrchestratorError, Result};

const FRAGMENT_COLUMNS: &str = "process_id, scenario_time, source_id, status, business_process_tag, \
     artifact_ref, source_artifact_ref, replacing_time, replacing_business_process_tag, updated_at";

const MERGE_COLUMNS: &str = "process_id, scenario_time, status, launched_at, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
struct MergeRow {
    process_id: String,
    scenario_time: DateTime<Utc>,
    status: Option<String>,
    launched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MergeRow> for MergeRecord {
    type Error = OrchestratorError;

    fn try_from(row: MergeRow) -> Result<Self> {
        let status = row
            .status
            .as_deref()
            .map(MergeStatus::from_str)
            .transpose()
            .map_err(|e| OrchestratorError::storage(format!("bad merge status: {e}")))?;
        Ok(MergeRecord {
            process_id: ProcessId::new(row.process_id),
            scenario_time: row.scenario_time,
            status,
            launched_at: row.launched_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct FragmentRow {
    process_id: String,
    scenario_time: DateTime<Utc>,
    source_id: String,
    status: String,
    business_process_tag: String,
    artifact_ref: Option<String>,
    source_artifact_ref: Option<String>,
    replacing_time: Option<DateTime<Utc>>,
    replacing_business_process_tag: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FragmentRow> for FragmentRecord {
    type Error = OrchestratorError;

    fn try_from(row: FragmentRow) -> Result<Self> {
        let status = FragmentStatus::from_str(&row.status)
            .map_err(|e| OrchestratorError::storage(format!("bad fragment status: {e}")))?;
        Ok(FragmentRecord {
            process_id: ProcessId::new(row.process_id),
            scenario_time: row.scenario_time,
            source_id: row.source_id.into(),
            status,
            business_process_tag: row.business_process_tag,
            artifact_ref: row.artifact_ref.map(ArtifactRef::new),
            source_artifact_ref: row.source_artifact_ref.map(RawCaseRef::new),
            replacing_time: row.replacing_time,
            replacing_business_process_tag: row.replacing_business_process_tag,
            updated_at: row.updated_at,
        })
    }
}

pub struct PgMergeStateStore {
    pub pool: PgPool,
}

impl PgMergeStateStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    async fn insert_merge_if_absent<'e, E>(executor: E, key: &MergeKey) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO merges (process_id, scenario_time, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (process_id, scenario_time) DO NOTHING
            "#,
        )
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn fetch_merge(&self, key: &MergeKey) -> Result<Option<MergeRecord>> {
        let row: Option<MergeRow> = sqlx::query_as(&format!(
            "SELECT {MERGE_COLUMNS} FROM merges WHERE process_id = $1 AND scenario_time = $2"
        ))
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MergeRecord::try_from).transpose()
    }

    async fn fetch_fragment<'e, E>(executor: E, key: &FragmentKey) -> Result<Option<FragmentRecord>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row: Option<FragmentRow> = sqlx::query_as(&format!(
            "SELECT {FRAGMENT_COLUMNS} FROM fragments \
             WHERE process_id = $1 AND scenario_time = $2 AND source_id = $3"
        ))
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .bind(key.source_id.as_str())
        .fetch_optional(executor)
        .await?;
        row.map(FragmentRecord::try_from).transpose()
    }

    async fn mark_one_available(
        conn: &mut PgConnection,
        key: &FragmentKey,
        business_process_tag: &str,
        raw_case: &RawCaseRef,
    ) -> Result<AvailableOutcome> {
        Self::insert_merge_if_absent(&mut *conn, &key.merge_key()).await?;

        let inserted: Option<FragmentRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO fragments (process_id, scenario_time, source_id, status, business_process_tag,
                                   source_artifact_ref, updated_at)
            VALUES ($1, $2, $3, 'AVAILABLE', $4, $5, NOW())
            ON CONFLICT (process_id, scenario_time, source_id) DO NOTHING
            RETURNING {FRAGMENT_COLUMNS}
            "#
        ))
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .bind(key.source_id.as_str())
        .bind(business_process_tag)
        .bind(raw_case.as_str())
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(row) = inserted {
            return Ok(AvailableOutcome::Created(row.try_into()?));
        }

        let refreshed: Option<FragmentRow> = sqlx::query_as(&format!(
            r#"
            UPDATE fragments SET business_process_tag = $4, source_artifact_ref = $5, updated_at = NOW()
            WHERE process_id = $1 AND scenario_time = $2 AND source_id = $3 AND status = 'AVAILABLE'
            RETURNING {FRAGMENT_COLUMNS}
            "#
        ))
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .bind(key.source_id.as_str())
        .bind(business_process_tag)
        .bind(raw_case.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        match refreshed {
            Some(row) => Ok(AvailableOutcome::Pending(row.try_into()?)),
            None => {
                let current = Self::fetch_fragment(&mut *conn, key)
                    .await?
                    .ok_or_else(|| missing("fragment", key))?;
                Ok(AvailableOutcome::AlreadyValidated(current))
            }
        }
    }
}

fn missing(what: &str, key: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::storage(format!("{what} {key} vanished during conditional write"))
}

#[async_trait]
impl MergeStateStore for PgMergeStateStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_merge(&self, key: &MergeKey) -> Result<MergeRecord> {
        Self::insert_merge_if_absent(&self.pool, key).await?;
        self.fetch_merge(key).await?.ok_or_else(|| missing("merge", key))
    }

    async fn get_merge(&self, key: &MergeKey) -> Result<Option<MergeRecord>> {
        self.fetch_merge(key).await
    }

    async fn list_merges(&self, process_id: &ProcessId) -> Result<Vec<MergeRecord>> {
        let rows: Vec<MergeRow> = sqlx::query_as(&format!(
            "SELECT {MERGE_COLUMNS} FROM merges WHERE process_id = $1 ORDER BY scenario_time DESC"
        ))
        .bind(process_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MergeRecord::try_from).collect()
    }

    async fn try_launch_merge(&self, key: &MergeKey, at: DateTime<Utc>) -> Result<LaunchOutcome> {
        Self::insert_merge_if_absent(&self.pool, key).await?;

        let claimed: Option<MergeRow> = sqlx::query_as(&format!(
            r#"
            UPDATE merges SET launched_at = $3, updated_at = $3
            WHERE process_id = $1 AND scenario_time = $2 AND launched_at IS NULL
            RETURNING {MERGE_COLUMNS}
            "#
        ))
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match claimed {
            Some(row) => Ok(LaunchOutcome::Launched(row.try_into()?)),
            None => {
                let current = self.fetch_merge(key).await?.ok_or_else(|| missing("merge", key))?;
                Ok(LaunchOutcome::AlreadyLaunched(current))
            }
        }
    }

    async fn complete_merge(&self, key: &MergeKey, status: MergeStatus) -> Result<MergeRecord> {
        let row: Option<MergeRow> = sqlx::query_as(&format!(
            r#"
            UPDATE merges SET status = $3, updated_at = NOW()
            WHERE process_id = $1 AND scenario_time = $2
            RETURNING {MERGE_COLUMNS}
            "#
        ))
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .bind(status.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| missing("merge", key))?.try_into()
    }

    async fn release_launch(&self, key: &MergeKey) -> Result<bool> {
        let released = sqlx::query(
            r#"
            UPDATE merges SET launched_at = NULL, updated_at = NOW()
            WHERE process_id = $1 AND scenario_time = $2
              AND launched_at IS NOT NULL AND status IS NULL
            "#,
        )
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .execute(&self.pool)
        .await?;
        Ok(released.rows_affected() == 1)
    }

    async fn mark_available(
        &self,
        keys: &[FragmentKey],
        business_process_tag: &str,
        raw_case: &RawCaseRef,
    ) -> Result<Vec<AvailableOutcome>> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            outcomes.push(Self::mark_one_available(&mut *tx, key, business_process_tag, raw_case).await?);
        }
        tx.commit().await?;
        Ok(outcomes)
    }

    async fn record_validation(
        &self,
        key: &FragmentKey,
        status: FragmentStatus,
        artifact: &ArtifactRef,
        raw_case: &RawCaseRef,
    ) -> Result<Option<FragmentRecord>> {
        let row: Option<FragmentRow> = sqlx::query_as(&format!(
            r#"
            UPDATE fragments
            SET status = $4, artifact_ref = $5, source_artifact_ref = $6, replacing_time = NULL,
                replacing_business_process_tag = NULL, updated_at = NOW()
            WHERE process_id = $1 AND scenario_time = $2 AND source_id = $3
            RETURNING {FRAGMENT_COLUMNS}
            "#
        ))
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .bind(key.source_id.as_str())
        .bind(status.to_string())
        .bind(artifact.as_str())
        .bind(raw_case.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(FragmentRecord::try_from).transpose()
    }

    async fn get_fragment(&self, key: &FragmentKey) -> Result<Option<FragmentRecord>> {
        Self::fetch_fragment(&self.pool, key).await
    }

    async fn list_fragments(&self, key: &MergeKey) -> Result<Vec<FragmentRecord>> {
        let rows: Vec<FragmentRow> = sqlx::query_as(&format!(
            "SELECT {FRAGMENT_COLUMNS} FROM fragments \
             WHERE process_id = $1 AND scenario_time = $2 ORDER BY source_id"
        ))
        .bind(key.process_id.as_str())
        .bind(key.scenario_time)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FragmentRecord::try_from).collect()
    }

    async fn replace_fragment_unless_validated(
        &self,
        record: &FragmentRecord,
    ) -> Result<ReplaceOutcome> {
        let key = record.key();
        let mut tx = self.pool.begin().await?;
        Self::insert_merge_if_absent(&mut *tx, &key.merge_key()).await?;

        let written: Option<FragmentRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO fragments ({FRAGMENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (process_id, scenario_time, source_id) DO UPDATE SET
                status = EXCLUDED.status,
                business_process_tag = EXCLUDED.business_process_tag,
                artifact_ref = EXCLUDED.artifact_ref,
                source_artifact_ref = EXCLUDED.source_artifact_ref,
                replacing_time = EXCLUDED.replacing_time,
                replacing_business_process_tag = EXCLUDED.replacing_business_process_tag,
                updated_at = EXCLUDED.updated_at
            WHERE NOT (fragments.status = 'VALIDATION_SUCCEEDED' AND fragments.artifact_ref IS NOT NULL)
            RETURNING {FRAGMENT_COLUMNS}
            "#
        ))
        .bind(record.process_id.as_str())
        .bind(record.scenario_time)
        .bind(record.source_id.as_str())
        .bind(record.status.to_string())
        .bind(&record.business_process_tag)
        .bind(record.artifact_ref.as_ref().map(|a| a.as_str().to_string()))
        .bind(record.source_artifact_ref.as_ref().map(|r| r.as_str().to_string()))
        .bind(record.replacing_time)
        .bind(record.replacing_business_process_tag.clone())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match written {
            Some(row) => ReplaceOutcome::Replaced(row.try_into()?),
            None => {
                let current = Self::fetch_fragment(&mut *tx, &key)
                    .await?
                    .ok_or_else(|| missing("fragment", &key))?;
                ReplaceOutcome::AlreadyValidated(current)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}
