//! Activator and invoker traits. The server runtime never constructs targets
//! or calls methods itself; these are the seams an embedder plugs concrete
//! implementations into (see the out-of-scope list at the top of this crate).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Error;

/// A type-erased activated target instance.
pub type Instance = Box<dyn Any + Send + Sync>;

#[async_trait]
pub trait JobActivator: Send + Sync {
    async fn activate(&self, target_type: &str) -> Result<Instance, Error>;
}

#[async_trait]
pub trait JobInvoker: Send + Sync {
    async fn invoke(
        &self,
        instance: &Instance,
        target_type: &str,
        method: &str,
        payload: &[u8],
    ) -> Result<(), Error>;
}

type Factory = dyn Fn() -> Instance + Send + Sync;
type MethodFn = dyn Fn(&Instance, &[u8]) -> BoxFuture<'static, Result<(), Error>> + Send + Sync;

/// Default activator: looks up a zero-argument constructor registered under
/// the target type name. Rust has no reflective default-construct-by-name, so
/// this registry is the idiomatic stand-in for it.
#[derive(Default)]
pub struct RegistryActivator {
    // TODO: replace with a real collection once more than one caller needs to
    // register factories concurrently; a Mutex<HashMap<..>> would do.
    factories: HashMap<String, Arc<Factory>>,
}

impl RegistryActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, target_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Instance + Send + Sync + 'static,
    {
        self.factories.insert(target_type.into(), Arc::new(factory));
    }
}

#[async_trait]
impl JobActivator for RegistryActivator {
    async fn activate(&self, target_type: &str) -> Result<Instance, Error> {
        let factory = self
            .factories
            .get(target_type)
            .ok_or_else(|| Error::UnknownTargetType(target_type.to_string()))?;
        Ok(factory())
    }
}

/// Default invoker: looks up a registered method by `(target_type, method)`.
#[derive(Default)]
pub struct RegistryInvoker {
    methods: HashMap<(String, String), Arc<MethodFn>>,
}

impl RegistryInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        &mut self,
        target_type: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) where
        F: Fn(&Instance, &[u8]) -> BoxFuture<'static, Result<(), Error>> + Send + Sync + 'static,
    {
        self.methods
            .insert((target_type.into(), method.into()), Arc::new(handler));
    }
}

#[async_trait]
impl JobInvoker for RegistryInvoker {
    async fn invoke(
        &self,
        instance: &Instance,
        target_type: &str,
        method: &str,
        payload: &[u8],
    ) -> Result<(), Error> {
        let handler = self
            .methods
            .get(&(target_type.to_string(), method.to_string()))
            .ok_or_else(|| Error::UnknownMethod(target_type.to_string(), method.to_string()))?;
        handler(instance, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    #[tokio::test]
    async fn activator_returns_registered_instance() {
        let mut registry = RegistryActivator::new();
        registry.register("counter", || Box::new(Counter(0)) as Instance);

        let instance = registry.activate("counter").await.expect("activate");
        assert_eq!(instance.downcast_ref::<Counter>().unwrap().0, 0);
    }

    #[tokio::test]
    async fn activator_rejects_unknown_target_type() {
        let registry = RegistryActivator::new();
        let err = registry.activate("missing").await.unwrap_err();
        assert!(matches!(err, Error::UnknownTargetType(t) if t == "missing"));
    }

    #[tokio::test]
    async fn invoker_dispatches_to_registered_target_type_and_method() {
        let mut registry = RegistryInvoker::new();
        registry.register("counter", "increment", |instance, _payload| {
            let seen = instance.downcast_ref::<Counter>().unwrap().0;
            Box::pin(async move {
                assert_eq!(seen, 0);
                Ok(())
            })
        });

        let instance: Instance = Box::new(Counter(0));
        registry
            .invoke(&instance, "counter", "increment", &[])
            .await
            .expect("invoke");
    }

    #[tokio::test]
    async fn invoker_rejects_matching_method_on_wrong_target_type() {
        let mut registry = RegistryInvoker::new();
        registry.register("counter", "increment", |_instance, _payload| {
            Box::pin(async move { Ok(()) })
        });

        let instance: Instance = Box::new(Counter(0));
        let err = registry
            .invoke(&instance, "other", "increment", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMethod(t, m) if t == "other" && m == "increment"));
    }
}
