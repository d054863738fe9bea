//! Multi-key atomic operations the gateway can't express as a single Redis
//! command. Loaded once via [`lazy_static`] the same way the rest of this
//! corpus wraps [`redis::Script`].

use chrono::{DateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use redis::aio::ConnectionLike;

use crate::error::Error;
use crate::keys;

// KEYS:
//  1. schedule sorted set
// ARGV:
//  1. now (ms since epoch)
//  2. job key prefix
//  3. queue key prefix
//
// Schedule is global across queues, so each due job's own hash record is
// consulted for its target queue rather than assuming one destination list.
const PROMOTE_SCHEDULED_SCRIPT: &str = r##"
    local due = redis.call("ZRANGEBYSCORE", KEYS[1], 0, ARGV[1])
    if #due == 0 then
        return 0
    end

    local moved = 0
    for _, id in ipairs(due) do
        local target = redis.call("HGET", ARGV[2] .. id, "qn")
        redis.call("ZREM", KEYS[1], id)
        if target then
            redis.call("LPUSH", ARGV[3] .. target, id)
            redis.call("HSET", ARGV[2] .. id, "stt", "enqueued")
            moved = moved + 1
        end
    end
    return moved
"##;

// KEYS:
//  1. job hash
//  2. schedule sorted set
// ARGV:
//  1. job id
//  2. now (ms since epoch)
//  3. error message
//
// Unlike the teacher's equivalent script, there is no ZSCORE ownership check:
// the processing structure here is a list the caller already popped the job
// out of (via BRPOPLPUSH), so by the time RecordFailed runs the caller is the
// sole owner of the job already.
const RECORD_FAILED_SCRIPT: &str = r##"
    local fields = redis.call("HMGET", KEYS[1], "cr", "mr", "bo")
    local retry = tonumber(fields[1]) or 0
    local max_retries = tonumber(fields[2]) or 0
    local backoff = tonumber(fields[3]) or 0

    if retry >= max_retries then
        redis.call("HSET", KEYS[1], "err", ARGV[3], "end", ARGV[2], "suc", "false", "stt", "failed")
        return {retry, -1}
    end

    local next_run = tonumber(ARGV[2]) + (2 ^ retry) * backoff
    retry = retry + 1
    redis.call("HSET", KEYS[1], "err", ARGV[3], "cr", retry, "stt", "scheduled")
    redis.call("ZADD", KEYS[2], next_run, ARGV[1])
    return {retry, next_run}
"##;

lazy_static! {
    static ref PROMOTE_SCHEDULED: redis::Script = redis::Script::new(PROMOTE_SCHEDULED_SCRIPT);
    static ref RECORD_FAILED: redis::Script = redis::Script::new(RECORD_FAILED_SCRIPT);
}

pub(crate) struct PromoteScheduledScript;

impl PromoteScheduledScript {
    pub async fn run<C: ConnectionLike + Send>(
        conn: &mut C,
        now: &DateTime<Utc>,
    ) -> Result<usize, Error> {
        let moved: usize = PROMOTE_SCHEDULED
            .key(keys::SCHEDULE_SET)
            .arg(now.timestamp_millis())
            .arg(keys::JOB_KEY_PREFIX)
            .arg(keys::QUEUE_KEY_PREFIX)
            .invoke_async(conn)
            .await?;
        Ok(moved)
    }
}

/// Outcome of recording a job failure: either it will retry at `next_run`, or
/// it has exhausted its retries and is now terminally failed.
pub(crate) enum FailureOutcome {
    WillRetry { attempt: u32, next_run: DateTime<Utc> },
    Exhausted { attempts: u32 },
}

pub(crate) struct RecordFailedScript;

impl RecordFailedScript {
    pub async fn run<C: ConnectionLike + Send>(
        conn: &mut C,
        job_id: &str,
        now: &DateTime<Utc>,
        error: &str,
    ) -> Result<FailureOutcome, Error> {
        let job_key = keys::job_hash(job_id);
        let (attempt, next_run): (u32, i64) = RECORD_FAILED
            .key(&job_key)
            .key(keys::SCHEDULE_SET)
            .arg(job_id)
            .arg(now.timestamp_millis())
            .arg(error)
            .invoke_async(conn)
            .await?;

        Ok(if next_run < 0 {
            FailureOutcome::Exhausted { attempts: attempt }
        } else {
            FailureOutcome::WillRetry {
                attempt,
                next_run: Utc.timestamp_millis(next_run),
            }
        })
    }
}
