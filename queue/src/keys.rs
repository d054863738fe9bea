//! Redis key naming. Centralized so storage layout changes happen in one place;
//! the shapes below match the persisted-state layout a deployment depends on,
//! but the exact strings are not a public contract.

pub fn queue_list(queue: &str) -> String {
    format!("queue:{}", queue)
}

pub fn processing_list(server: &str, queue: &str) -> String {
    format!("processing:{}:{}", server, queue)
}

pub fn job_hash(id: &str) -> String {
    format!("job:{}", id)
}

pub fn server_meta(server: &str) -> String {
    format!("server:{}", server)
}

pub const SCHEDULE_SET: &str = "schedule";
pub const SERVERS_SET: &str = "servers";
pub const JOB_KEY_PREFIX: &str = "job:";
pub const QUEUE_KEY_PREFIX: &str = "queue:";
