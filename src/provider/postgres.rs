//! PostgreSQL provider built on sqlx. Batched upserts keep each entity kind
//! to a single statement per save, and chunk pages are cursored on
//! `chunk_index` so aggregation never loads a step's chunks all at once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::budget::ResourceUsage;
use crate::constants::system::MAX_JOB_STEPS;
use crate::error::{Result, SagaError};
use crate::models::{ChunkState, JobRequest, JobState, StepState};
use crate::provider::{ChunkPage, SagaProvider};
use crate::state_machine::{Direction, JobStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS saga_jobs (
    job_id UUID PRIMARY KEY,
    status TEXT NOT NULL,
    direction TEXT NOT NULL,
    current_step_index INT NOT NULL,
    total_steps INT NOT NULL,
    finalizer_name TEXT,
    finalizer_executed BOOLEAN NOT NULL DEFAULT FALSE,
    final_error_details JSONB,
    version BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS saga_steps (
    step_id UUID PRIMARY KEY,
    parent_job_id UUID NOT NULL REFERENCES saga_jobs(job_id) ON DELETE CASCADE,
    step_index INT NOT NULL,
    status TEXT NOT NULL,
    step_executor_name TEXT NOT NULL,
    payload JSONB NOT NULL,
    result JSONB,
    progress_state TEXT,
    current_chunk_index INT NOT NULL,
    total_chunks INT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS saga_chunks (
    chunk_id UUID PRIMARY KEY,
    parent_step_id UUID NOT NULL,
    chunk_index INT NOT NULL,
    status TEXT NOT NULL,
    result JSONB,
    previous_values JSONB,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_saga_steps_job ON saga_steps (parent_job_id, step_index);
CREATE UNIQUE INDEX IF NOT EXISTS idx_saga_chunks_step ON saga_chunks (parent_step_id, chunk_index);
"#;

/// Provider over a PostgreSQL pool with the standard per-transaction cache.
#[derive(Clone)]
pub struct PostgresSagaProvider {
    pool: PgPool,
    cache: Arc<Mutex<HashMap<Uuid, JobState>>>,
    usage: Arc<Mutex<Option<Arc<ResourceUsage>>>>,
}

impl PostgresSagaProvider {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Arc::new(Mutex::new(HashMap::new())),
            usage: Arc::new(Mutex::new(None)),
        }
    }

    /// Create the saga tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    fn record_query(&self) {
        if let Ok(guard) = self.usage.lock() {
            if let Some(usage) = guard.as_ref() {
                usage.record_query();
            }
        }
    }

    fn record_mutation(&self) {
        if let Ok(guard) = self.usage.lock() {
            if let Some(usage) = guard.as_ref() {
                usage.record_mutation();
            }
        }
    }

    fn cache_put(&self, job: JobState) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(job.job_id, job);
        }
    }

    fn job_from_row(row: &PgRow) -> Result<JobState> {
        let status: String = row.try_get("status")?;
        let direction: String = row.try_get("direction")?;
        let error_details: Option<Value> = row.try_get("final_error_details")?;
        let final_error_details = match error_details {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };
        Ok(JobState {
            job_id: row.try_get("job_id")?,
            status: status.parse::<JobStatus>().map_err(SagaError::Provider)?,
            direction: direction.parse::<Direction>().map_err(SagaError::Provider)?,
            current_step_index: row.try_get("current_step_index")?,
            total_steps: row.try_get::<i32, _>("total_steps")? as u32,
            finalizer_name: row.try_get("finalizer_name")?,
            finalizer_executed: row.try_get("finalizer_executed")?,
            final_error_details,
            version: row.try_get("version")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            steps: Vec::new(),
        })
    }

    fn step_from_row(row: &PgRow) -> Result<StepState> {
        let status: String = row.try_get("status")?;
        Ok(StepState {
            step_id: row.try_get("step_id")?,
            parent_job_id: row.try_get("parent_job_id")?,
            step_index: row.try_get::<i32, _>("step_index")? as u32,
            status: status.parse().map_err(SagaError::Provider)?,
            step_executor_name: row.try_get("step_executor_name")?,
            payload: row.try_get("payload")?,
            result: row.try_get("result")?,
            progress_state: row.try_get("progress_state")?,
            current_chunk_index: row.try_get::<i32, _>("current_chunk_index")? as u32,
            total_chunks: row.try_get::<i32, _>("total_chunks")? as u32,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn chunk_from_row(row: &PgRow) -> Result<ChunkState> {
        let status: String = row.try_get("status")?;
        Ok(ChunkState {
            chunk_id: row.try_get("chunk_id")?,
            parent_step_id: row.try_get("parent_step_id")?,
            chunk_index: row.try_get::<i32, _>("chunk_index")? as u32,
            status: status.parse().map_err(SagaError::Provider)?,
            result: row.try_get("result")?,
            previous_values: row.try_get("previous_values")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    fn push_job_values<'a>(builder: &mut QueryBuilder<'a, Postgres>, jobs: &'a [JobState]) -> Result<()> {
        let mut details: Vec<Option<Value>> = Vec::with_capacity(jobs.len());
        for job in jobs {
            details.push(match &job.final_error_details {
                Some(err) => Some(serde_json::to_value(err)?),
                None => None,
            });
        }
        let mut iter = details.into_iter();
        builder.push_values(jobs, |mut b, job| {
            b.push_bind(job.job_id)
                .push_bind(job.status.to_string())
                .push_bind(job.direction.to_string())
                .push_bind(job.current_step_index)
                .push_bind(job.total_steps as i32)
                .push_bind(job.finalizer_name.clone())
                .push_bind(job.finalizer_executed)
                .push_bind(iter.next().flatten())
                .push_bind(job.version)
                .push_bind(job.created_at)
                .push_bind(job.updated_at);
        });
        Ok(())
    }

    fn push_step_values<'a>(builder: &mut QueryBuilder<'a, Postgres>, steps: &'a [StepState]) {
        builder.push_values(steps, |mut b, step| {
            b.push_bind(step.step_id)
                .push_bind(step.parent_job_id)
                .push_bind(step.step_index as i32)
                .push_bind(step.status.to_string())
                .push_bind(step.step_executor_name.clone())
                .push_bind(step.payload.clone())
                .push_bind(step.result.clone())
                .push_bind(step.progress_state.clone())
                .push_bind(step.current_chunk_index as i32)
                .push_bind(step.total_chunks as i32)
                .push_bind(step.created_at)
                .push_bind(step.updated_at);
        });
    }

    fn push_chunk_values<'a>(builder: &mut QueryBuilder<'a, Postgres>, chunks: &'a [ChunkState]) {
        builder.push_values(chunks, |mut b, chunk| {
            b.push_bind(chunk.chunk_id)
                .push_bind(chunk.parent_step_id)
                .push_bind(chunk.chunk_index as i32)
                .push_bind(chunk.status.to_string())
                .push_bind(chunk.result.clone())
                .push_bind(chunk.previous_values.clone())
                .push_bind(chunk.created_at);
        });
    }
}

const JOB_COLUMNS: &str = "(job_id, status, direction, current_step_index, total_steps, \
     finalizer_name, finalizer_executed, final_error_details, version, created_at, updated_at) ";
const STEP_COLUMNS: &str = "(step_id, parent_job_id, step_index, status, step_executor_name, \
     payload, result, progress_state, current_chunk_index, total_chunks, created_at, updated_at) ";
const CHUNK_COLUMNS: &str =
    "(chunk_id, parent_step_id, chunk_index, status, result, previous_values, created_at) ";

const JOB_UPSERT: &str = " ON CONFLICT (job_id) DO UPDATE SET \
     status = EXCLUDED.status, direction = EXCLUDED.direction, \
     current_step_index = EXCLUDED.current_step_index, \
     finalizer_executed = EXCLUDED.finalizer_executed, \
     final_error_details = EXCLUDED.final_error_details, \
     version = EXCLUDED.version, updated_at = EXCLUDED.updated_at";
const STEP_UPSERT: &str = " ON CONFLICT (step_id) DO UPDATE SET \
     status = EXCLUDED.status, result = EXCLUDED.result, \
     progress_state = EXCLUDED.progress_state, \
     current_chunk_index = EXCLUDED.current_chunk_index, \
     total_chunks = EXCLUDED.total_chunks, updated_at = EXCLUDED.updated_at";
const CHUNK_UPSERT: &str = " ON CONFLICT (chunk_id) DO UPDATE SET \
     status = EXCLUDED.status, result = EXCLUDED.result, \
     previous_values = EXCLUDED.previous_values";

#[async_trait]
impl SagaProvider for PostgresSagaProvider {
    async fn create_jobs(&self, requests: Vec<JobRequest>) -> Result<Vec<JobState>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        for request in &requests {
            if request.steps.is_empty() {
                return Err(SagaError::Validation(
                    "A job must declare at least one step".to_string(),
                ));
            }
            if request.steps.len() > MAX_JOB_STEPS {
                return Err(SagaError::Validation(format!(
                    "A job may declare at most {MAX_JOB_STEPS} steps"
                )));
            }
        }

        let now = Utc::now();
        let jobs: Vec<JobState> = requests
            .into_iter()
            .map(|request| {
                let job_id = Uuid::now_v7();
                let steps: Vec<StepState> = request
                    .steps
                    .into_iter()
                    .enumerate()
                    .map(|(index, step)| {
                        StepState::new(job_id, index as u32, step.executor_name, step.payload)
                    })
                    .collect();
                JobState {
                    job_id,
                    status: JobStatus::New,
                    direction: Direction::Down,
                    current_step_index: 0,
                    total_steps: steps.len() as u32,
                    finalizer_name: request.finalizer_name,
                    finalizer_executed: false,
                    final_error_details: None,
                    version: 0,
                    created_at: now,
                    updated_at: now,
                    steps,
                }
            })
            .collect();

        let all_steps: Vec<StepState> = jobs.iter().flat_map(|job| job.steps.clone()).collect();
        let mut tx = self.pool.begin().await?;
        let mut job_insert: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO saga_jobs {JOB_COLUMNS}"));
        Self::push_job_values(&mut job_insert, &jobs)?;
        job_insert.build().execute(&mut *tx).await?;

        let mut step_insert: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO saga_steps {STEP_COLUMNS}"));
        Self::push_step_values(&mut step_insert, &all_steps);
        step_insert.build().execute(&mut *tx).await?;
        tx.commit().await?;

        self.record_mutation();
        self.record_mutation();
        for job in &jobs {
            self.cache_put(job.clone());
        }
        Ok(jobs)
    }

    async fn get_job_states(&self, ids: &[Uuid]) -> Result<Vec<JobState>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut found: HashMap<Uuid, JobState> = HashMap::new();
        let mut missing: Vec<Uuid> = Vec::new();
        {
            let cache = match self.cache.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for id in ids {
                match cache.get(id) {
                    Some(job) => {
                        found.insert(*id, job.clone());
                    }
                    None => missing.push(*id),
                }
            }
        }

        if !missing.is_empty() {
            self.record_query();
            let job_rows = sqlx::query("SELECT * FROM saga_jobs WHERE job_id = ANY($1)")
                .bind(missing.clone())
                .fetch_all(&self.pool)
                .await?;
            self.record_query();
            let step_rows = sqlx::query(
                "SELECT * FROM saga_steps WHERE parent_job_id = ANY($1) ORDER BY step_index",
            )
            .bind(missing.clone())
            .fetch_all(&self.pool)
            .await?;

            let mut steps_by_job: HashMap<Uuid, Vec<StepState>> = HashMap::new();
            for row in &step_rows {
                let step = Self::step_from_row(row)?;
                steps_by_job.entry(step.parent_job_id).or_default().push(step);
            }
            for row in &job_rows {
                let mut job = Self::job_from_row(row)?;
                job.steps = steps_by_job.remove(&job.job_id).unwrap_or_default();
                self.cache_put(job.clone());
                found.insert(job.job_id, job);
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn save_jobs(&self, jobs: &[JobState]) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO saga_jobs {JOB_COLUMNS}"));
        Self::push_job_values(&mut builder, jobs)?;
        builder.push(JOB_UPSERT);
        builder.build().execute(&self.pool).await?;
        self.record_mutation();
        for job in jobs {
            self.cache_put(job.clone());
        }
        Ok(())
    }

    async fn save_steps(&self, steps: &[StepState]) -> Result<()> {
        if steps.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO saga_steps {STEP_COLUMNS}"));
        Self::push_step_values(&mut builder, steps);
        builder.push(STEP_UPSERT);
        builder.build().execute(&self.pool).await?;
        self.record_mutation();
        if let Ok(mut cache) = self.cache.lock() {
            for step in steps {
                if let Some(job) = cache.get_mut(&step.parent_job_id) {
                    if let Some(slot) = job
                        .steps
                        .iter_mut()
                        .find(|candidate| candidate.step_id == step.step_id)
                    {
                        *slot = step.clone();
                    }
                }
            }
        }
        Ok(())
    }

    async fn save_chunks(&self, chunks: &[ChunkState]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO saga_chunks {CHUNK_COLUMNS}"));
        Self::push_chunk_values(&mut builder, chunks);
        builder.push(CHUNK_UPSERT);
        builder.build().execute(&self.pool).await?;
        self.record_mutation();
        Ok(())
    }

    async fn insert_chunks(&self, chunks: Vec<ChunkState>) -> Result<Vec<ChunkState>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO saga_chunks {CHUNK_COLUMNS}"));
        Self::push_chunk_values(&mut builder, &chunks);
        builder.build().execute(&self.pool).await?;
        self.record_mutation();
        Ok(chunks)
    }

    async fn chunks_for_step(
        &self,
        step_id: Uuid,
        cursor: Option<u32>,
        page_size: usize,
    ) -> Result<ChunkPage> {
        if page_size == 0 {
            return Err(SagaError::Validation("Page size must be positive".to_string()));
        }
        self.record_query();
        let start = cursor.unwrap_or(0) as i32;
        // Fetch one row past the page to learn whether another page exists.
        let rows = sqlx::query(
            "SELECT * FROM saga_chunks \
             WHERE parent_step_id = $1 AND chunk_index >= $2 \
             ORDER BY chunk_index ASC LIMIT $3",
        )
        .bind(step_id)
        .bind(start)
        .bind((page_size + 1) as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len().min(page_size));
        for row in rows.iter().take(page_size) {
            chunks.push(Self::chunk_from_row(row)?);
        }
        let next_cursor = if rows.len() > page_size {
            chunks.last().map(|chunk| chunk.chunk_index + 1)
        } else {
            None
        };
        Ok(ChunkPage { chunks, next_cursor })
    }

    fn invalidate_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn attach_usage(&self, usage: Arc<ResourceUsage>) {
        if let Ok(mut guard) = self.usage.lock() {
            *guard = Some(usage);
        }
    }
}
