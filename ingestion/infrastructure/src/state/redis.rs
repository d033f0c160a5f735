use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use media_ingestion_application::{
    ClaimOutcome, RunId, TaskRunRepository, TaskRunState, TaskRunStateError,
};
use media_ingestion_domain::{TaskReport, TaskStatus};
use redis::aio::MultiplexedConnection;
use redis::Script;
use shaku::Component;

use crate::connection::RedisConnection;

const FIELD_STATUS: &str = "status";
const FIELD_RUN_ID: &str = "run_id";
const FIELD_STARTED_AT: &str = "started_at";
const FIELD_HEARTBEAT_AT: &str = "heartbeat_at";
const FIELD_LAST_ERROR: &str = "last_error";
const FIELD_REPORT: &str = "report";

lazy_static! {
    static ref CHECK_AND_SET_SCRIPT: Script = Script::new(
        r#"
        local expected = ARGV[1]
        local current = redis.call('HGET', KEYS[1], 'run_id')
        if not current then
            return -1
        end
        if current ~= expected then
            return 0
        end
        for i = 2, #ARGV, 2 do
            redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
        end
        return 1
    "#
    );

    // ARGV: now_ms, stale_after_ms, then field/value pairs of the new run.
    // Returns {0, owner} when held, {1, ''} when claimed, {2, previous} on takeover.
    static ref TRY_CLAIM_SCRIPT: Script = Script::new(
        r#"
        local status = redis.call('HGET', KEYS[1], 'status')
        local previous = ''
        if status == 'RUNNING' then
            local owner = redis.call('HGET', KEYS[1], 'run_id') or ''
            local heartbeat = tonumber(redis.call('HGET', KEYS[1], 'heartbeat_at') or '0')
            if tonumber(ARGV[1]) - heartbeat < tonumber(ARGV[2]) then
                return {0, owner}
            end
            previous = owner
        end
        redis.call('DEL', KEYS[1])
        for i = 3, #ARGV, 2 do
            redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
        end
        if previous ~= '' then
            return {2, previous}
        end
        return {1, ''}
    "#
    );
}

pub fn run_key(task_name: &str) -> String {
    format!("task:run:{}", task_name)
}

#[derive(Component)]
#[shaku(interface = TaskRunRepository)]
pub struct RedisTaskRunRepository {
    #[shaku(inject)]
    redis: Arc<dyn RedisConnection>,
}

impl RedisTaskRunRepository {
    pub fn new(redis: Arc<dyn RedisConnection>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl TaskRunRepository for RedisTaskRunRepository {
    async fn get(&self, task_name: &str) -> Result<Option<TaskRunState>, TaskRunStateError> {
        let mut conn = self.connection().await?;
        let (status, run_id, started_at, heartbeat_at, last_error, report): (
            Option<String>,
            Option<String>,
            Option<i64>,
            Option<i64>,
            Option<String>,
            Option<String>,
        ) = redis::cmd("HMGET")
            .arg(run_key(task_name))
            .arg(FIELD_STATUS)
            .arg(FIELD_RUN_ID)
            .arg(FIELD_STARTED_AT)
            .arg(FIELD_HEARTBEAT_AT)
            .arg(FIELD_LAST_ERROR)
            .arg(FIELD_REPORT)
            .query_async(&mut conn)
            .await
            .map_err(|e| TaskRunStateError::Backend(e.to_string()))?;

        let (Some(status), Some(run_id), Some(started_at), Some(heartbeat_at)) =
            (status, run_id, started_at, heartbeat_at)
        else {
            return Ok(None);
        };

        Ok(Some(TaskRunState {
            task_name: task_name.to_string(),
            run_id,
            status: parse_status(&status)?,
            started_at: parse_timestamp(started_at)?,
            heartbeat_at: parse_timestamp(heartbeat_at)?,
            last_error: non_empty(last_error),
            report: parse_report(report)?,
        }))
    }

    async fn upsert(&self, task_name: &str, state: &TaskRunState) -> Result<(), TaskRunStateError> {
        let mut conn = self.connection().await?;
        let key = run_key(task_name);

        // A takeover replaces the whole hash so no field of the old run survives.
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("DEL").arg(&key).ignore();
        let hset = pipe.cmd("HSET").arg(&key);
        for (field, value) in state_field_values(state)? {
            hset.arg(field.as_ref()).arg(value);
        }
        hset.ignore();

        pipe.query_async(&mut conn)
            .await
            .map_err(|e| TaskRunStateError::Backend(e.to_string()))
    }

    async fn try_claim(
        &self,
        task_name: &str,
        state: &TaskRunState,
        stale_after: Duration,
    ) -> Result<ClaimOutcome, TaskRunStateError> {
        let mut conn = self.connection().await?;
        let mut script_invocation = TRY_CLAIM_SCRIPT.prepare_invoke();
        script_invocation
            .key(run_key(task_name))
            .arg(Utc::now().timestamp_millis())
            .arg(stale_after.num_milliseconds());
        for (field, value) in state_field_values(state)? {
            script_invocation.arg(field.as_ref());
            script_invocation.arg(value);
        }

        let (code, run_id): (i32, String) = script_invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| TaskRunStateError::Backend(e.to_string()))?;

        match code {
            0 => Ok(ClaimOutcome::Held { run_id }),
            1 => Ok(ClaimOutcome::Claimed),
            2 => Ok(ClaimOutcome::TakenOver {
                previous_run_id: run_id,
            }),
            _ => Err(TaskRunStateError::Backend(format!(
                "Unexpected claim result {}",
                code
            ))),
        }
    }

    async fn heartbeat(
        &self,
        task_name: &str,
        run_id: &RunId,
        heartbeat_at: DateTime<Utc>,
    ) -> Result<(), TaskRunStateError> {
        self.check_and_set(
            task_name,
            run_id,
            vec![(
                Cow::from(FIELD_HEARTBEAT_AT),
                heartbeat_at.timestamp_millis().to_string(),
            )],
        )
        .await
    }

    async fn finish(
        &self,
        task_name: &str,
        run_id: &RunId,
        report: &TaskReport,
    ) -> Result<(), TaskRunStateError> {
        let heartbeat_at = report.finished_at.unwrap_or_else(Utc::now);
        self.check_and_set(
            task_name,
            run_id,
            vec![
                (Cow::from(FIELD_STATUS), report.status.as_str().to_string()),
                (
                    Cow::from(FIELD_HEARTBEAT_AT),
                    heartbeat_at.timestamp_millis().to_string(),
                ),
                (
                    Cow::from(FIELD_LAST_ERROR),
                    report.error.clone().unwrap_or_default(),
                ),
                (Cow::from(FIELD_REPORT), encode_report(report)?),
            ],
        )
        .await
    }
}

impl RedisTaskRunRepository {
    async fn connection(&self) -> Result<MultiplexedConnection, TaskRunStateError> {
        self.redis
            .get_connection()
            .await
            .map_err(|e| TaskRunStateError::Backend(e.to_string()))
    }

    async fn check_and_set(
        &self,
        task_name: &str,
        run_id: &RunId,
        fields: Vec<(Cow<'static, str>, String)>,
    ) -> Result<(), TaskRunStateError> {
        let mut conn = self.connection().await?;
        let mut script_invocation = CHECK_AND_SET_SCRIPT.prepare_invoke();
        script_invocation.key(run_key(task_name)).arg(run_id);

        for (field, value) in fields {
            script_invocation.arg(field.as_ref());
            script_invocation.arg(value);
        }

        let result: i32 = script_invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| TaskRunStateError::Backend(e.to_string()))?;

        match result {
            1 => Ok(()),
            0 => Err(TaskRunStateError::StaleInstance(task_name.to_string())),
            -1 => Err(TaskRunStateError::NotFound(task_name.to_string())),
            _ => Err(TaskRunStateError::Backend(format!(
                "Unexpected script result {}",
                result
            ))),
        }
    }
}

fn state_field_values(
    state: &TaskRunState,
) -> Result<Vec<(Cow<'static, str>, String)>, TaskRunStateError> {
    let mut fields = vec![
        (Cow::from(FIELD_STATUS), state.status.as_str().to_string()),
        (Cow::from(FIELD_RUN_ID), state.run_id.clone()),
        (
            Cow::from(FIELD_STARTED_AT),
            state.started_at.timestamp_millis().to_string(),
        ),
        (
            Cow::from(FIELD_HEARTBEAT_AT),
            state.heartbeat_at.timestamp_millis().to_string(),
        ),
        (
            Cow::from(FIELD_LAST_ERROR),
            state.last_error.clone().unwrap_or_default(),
        ),
    ];
    if let Some(report) = &state.report {
        fields.push((Cow::from(FIELD_REPORT), encode_report(report)?));
    }
    Ok(fields)
}

fn encode_report(report: &TaskReport) -> Result<String, TaskRunStateError> {
    serde_json::to_string(report).map_err(|e| TaskRunStateError::Backend(e.to_string()))
}

fn parse_status(raw: &str) -> Result<TaskStatus, TaskRunStateError> {
    TaskStatus::from_str(raw).ok_or_else(|| {
        TaskRunStateError::Backend(format!("Unrecognized task status value '{}'", raw))
    })
}

fn parse_timestamp(value: i64) -> Result<DateTime<Utc>, TaskRunStateError> {
    DateTime::<Utc>::from_timestamp_millis(value)
        .ok_or_else(|| TaskRunStateError::Backend(format!("Invalid timestamp '{}'", value)))
}

fn parse_report(payload: Option<String>) -> Result<Option<TaskReport>, TaskRunStateError> {
    match non_empty(payload) {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| TaskRunStateError::Backend(format!("Invalid report: {}", e))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|raw| !raw.is_empty())
}
