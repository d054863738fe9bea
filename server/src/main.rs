mod tracing_config;

use std::env;
use std::sync::Arc;

use stoker_queue::activator::{Instance, RegistryActivator, RegistryInvoker};
use stoker_queue::{Config, Manager};
use stoker_storage::RedisPool;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_config::configure("stoker-server");

    let server_name = env::var("SERVER_NAME").expect("SERVER_NAME is required");
    let config = Config::from_env(server_name)?;
    config.validate()?;

    let pool = RedisPool::new(None)?;

    let mut activator = RegistryActivator::new();
    activator.register("echo", || Box::new(()) as Instance);
    let mut invoker = RegistryInvoker::new();
    invoker.register("echo", "run", |_instance, payload| {
        let payload = payload.to_vec();
        Box::pin(async move {
            tracing::info!(bytes = payload.len(), "echo job ran");
            Ok(())
        })
    });

    let manager = Manager::new(config, pool, Arc::new(activator), Arc::new(invoker))?;

    // `Manager` owns its own `Shutdown` and already listens for SIGINT; `run`
    // returns once the full STOPPING sequence has completed.
    manager.run().await?;

    Ok(())
}
