//! Integration tests for [`stoker_queue::RedisGateway`], gated on a live
//! `REDIS_URL`. Mirrors the teacher's own `run_queue_test` harness: a
//! dotenv-loaded connection, a uuid-randomized queue/server name so tests
//! never collide, and a SCAN+DEL cleanup pass that runs even if the test body
//! panics.

use std::borrow::Cow;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;

use stoker_queue::{Job, JobId, RedisGateway, StorageGateway};
use stoker_shutdown::Shutdown;
use stoker_storage::RedisPool;

async fn run_gateway_test<T, Fut>(test: T)
where
    T: FnOnce(RedisGateway, String, String) -> Fut,
    Fut: Future<Output = ()>,
{
    dotenv::dotenv().ok();
    let redis_url = match std::env::var("REDIS_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping gateway test: REDIS_URL is not set");
            return;
        }
    };

    let queue_name = format!("test-{}", uuid::Uuid::new_v4());
    let server_name = format!("test-server-{}", uuid::Uuid::new_v4());
    let pool = RedisPool::new(Some(redis_url)).expect("creating connection pool");
    let gateway = RedisGateway::new(pool.clone(), 0, Duration::from_secs(30));

    let result = AssertUnwindSafe(test(gateway, server_name.clone(), queue_name.clone()))
        .catch_unwind()
        .await;

    let mut conn = pool.get().await.expect("cleanup: acquiring connection");
    for pattern in [
        format!("queue:{}", queue_name),
        format!("processing:{}:{}", server_name, queue_name),
        format!("server:{}", server_name),
        "job:test-*".to_string(),
    ] {
        let mut cmd = redis::cmd("SCAN");
        let mut iter: redis::AsyncIter<String> = cmd
            .cursor_arg(0)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(100)
            .clone()
            .iter_async(&mut *conn)
            .await
            .expect("cleanup: scanning keyspace");

        let mut del_cmd = redis::cmd("DEL");
        let mut any = false;
        while let Some(key) = iter.next_item().await {
            del_cmd.arg(&key);
            any = true;
        }
        if any {
            del_cmd
                .query_async::<_, ()>(&mut conn)
                .await
                .expect("cleanup: deleting keys");
        }
    }
    redis::cmd("ZREM")
        .arg("servers")
        .arg(&server_name)
        .query_async::<_, ()>(&mut conn)
        .await
        .expect("cleanup: removing server from registry");

    result.expect("gateway test panicked");
}

#[tokio::test]
async fn happy_path_enqueue_dequeue_succeed() {
    run_gateway_test(|gateway, server_name, queue_name| async move {
        let mut cancel = Shutdown::new().consumer();
        let job_id = format!("test-{}", uuid::Uuid::new_v4());

        let job = Job::new(
            JobId::Value(&job_id),
            queue_name.clone(),
            "demo",
            "run",
            Cow::Borrowed(b"payload".as_slice()),
        );
        gateway.enqueue_job(&job, &mut cancel).await.expect("enqueue");

        let dequeued = gateway
            .dequeue_job_id(&server_name, &queue_name, Duration::from_secs(2))
            .await
            .expect("dequeue");
        assert_eq!(dequeued.as_deref(), Some(job_id.as_str()));

        let descriptor = gateway
            .get_job_descriptor(&job_id, &mut cancel)
            .await
            .expect("get descriptor");
        assert_eq!(descriptor.target_type, "demo");
        assert_eq!(descriptor.method, "run");
        assert_eq!(descriptor.payload, b"payload");

        gateway
            .record_processing(&job_id, &server_name, &queue_name, &mut cancel)
            .await
            .expect("record processing");
        gateway
            .record_succeeded(&job_id, &mut cancel)
            .await
            .expect("record succeeded");
        gateway
            .remove_processing_job(&server_name, &queue_name, &job_id, &mut cancel)
            .await
            .expect("remove processing job");

        // Job already consumed: the queue should now be empty.
        let nothing = gateway
            .dequeue_job_id(&server_name, &queue_name, Duration::from_millis(200))
            .await
            .expect("dequeue after completion");
        assert!(nothing.is_none());
    })
    .await;
}

#[tokio::test]
async fn due_scheduled_job_is_promoted_and_dequeued() {
    run_gateway_test(|gateway, server_name, queue_name| async move {
        let mut cancel = Shutdown::new().consumer();
        let job_id = format!("test-{}", uuid::Uuid::new_v4());

        let job = Job::new(
            JobId::Value(&job_id),
            queue_name.clone(),
            "demo",
            "run",
            Cow::Borrowed(b"payload".as_slice()),
        )
        .scheduled_for(Utc::now() - chrono::Duration::seconds(1));
        gateway.schedule_job(&job, &mut cancel).await.expect("schedule job");

        let promoted = gateway
            .promote_scheduled_jobs(&mut cancel)
            .await
            .expect("promote scheduled jobs");
        assert!(promoted >= 1);

        let dequeued = gateway
            .dequeue_job_id(&server_name, &queue_name, Duration::from_secs(2))
            .await
            .expect("dequeue");
        assert_eq!(dequeued.as_deref(), Some(job_id.as_str()));
    })
    .await;
}

#[tokio::test]
async fn failed_job_retries_then_exhausts() {
    run_gateway_test(|gateway, server_name, queue_name| async move {
        let mut cancel = Shutdown::new().consumer();
        let job_id = format!("test-{}", uuid::Uuid::new_v4());

        let job = Job::new(
            JobId::Value(&job_id),
            queue_name.clone(),
            "demo",
            "run",
            Cow::Borrowed(b"payload".as_slice()),
        )
        .with_retries(1, Duration::from_millis(10));
        gateway.enqueue_job(&job, &mut cancel).await.expect("enqueue");

        gateway
            .dequeue_job_id(&server_name, &queue_name, Duration::from_secs(2))
            .await
            .expect("dequeue")
            .expect("job present");
        gateway
            .record_processing(&job_id, &server_name, &queue_name, &mut cancel)
            .await
            .expect("record processing");
        gateway
            .record_failed(&job_id, "boom", &mut cancel)
            .await
            .expect("record first failure");

        // First failure has a retry left: it should reappear once its backoff elapses.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let promoted = gateway
            .promote_scheduled_jobs(&mut cancel)
            .await
            .expect("promote after first failure");
        assert_eq!(promoted, 1);

        let requeued = gateway
            .dequeue_job_id(&server_name, &queue_name, Duration::from_secs(2))
            .await
            .expect("dequeue retried job");
        assert_eq!(requeued.as_deref(), Some(job_id.as_str()));

        gateway
            .record_processing(&job_id, &server_name, &queue_name, &mut cancel)
            .await
            .expect("record second processing");
        gateway
            .record_failed(&job_id, "boom again", &mut cancel)
            .await
            .expect("record second failure");

        // Retries are exhausted: the job must not be rescheduled again.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let promoted_again = gateway
            .promote_scheduled_jobs(&mut cancel)
            .await
            .expect("promote after exhaustion");
        assert_eq!(promoted_again, 0);

        let nothing = gateway
            .dequeue_job_id(&server_name, &queue_name, Duration::from_millis(200))
            .await
            .expect("dequeue after exhaustion");
        assert!(nothing.is_none());
    })
    .await;
}
