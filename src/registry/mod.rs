//! # Step and Finalizer Registries
//!
//! Step implementations are looked up by the name persisted on the step
//! record. Lookup goes through an explicit registry of factory closures
//! populated at process start; there is no reflective resolution. The
//! registry is the only process-wide state in the crate.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::error::{Result, SagaError};
use crate::orchestration::Finalizable;
use crate::step::SagaStep;

type FactoryError = Box<dyn std::error::Error + Send + Sync + 'static>;
type StepFactory = dyn Fn() -> std::result::Result<Arc<dyn SagaStep>, FactoryError> + Send + Sync;
type FinalizerFactory =
    dyn Fn() -> std::result::Result<Arc<dyn Finalizable>, FactoryError> + Send + Sync;

/// Maps step executor names to factory closures.
#[derive(Default)]
pub struct StepRegistry {
    factories: RwLock<HashMap<String, Arc<StepFactory>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an infallible factory under `name`. Re-registration
    /// replaces the previous factory; latest registration wins.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn SagaStep> + Send + Sync + 'static,
    {
        self.register_fallible(name, move || Ok(factory()));
    }

    /// Register a factory that may refuse to construct an instance, e.g.
    /// when required collaborators are missing.
    pub fn register_fallible<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> std::result::Result<Arc<dyn SagaStep>, FactoryError> + Send + Sync + 'static,
    {
        let name = name.into();
        info!(step = %name, "Registered step executor");
        let mut factories = match self.factories.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        factories.insert(name, Arc::new(factory));
    }

    /// Resolve a step implementation by name. Unknown names and factory
    /// refusals both surface as step-initialization failures, telling them
    /// apart through the cause chain.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SagaStep>> {
        let factory = {
            let factories = match self.factories.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            factories.get(name).cloned()
        };
        let factory = factory.ok_or_else(|| SagaError::unknown_step(name))?;
        debug!(step = %name, "Resolving step executor");
        factory().map_err(|cause| SagaError::step_construction(name, cause))
    }

    pub fn contains(&self, name: &str) -> bool {
        match self.factories.read() {
            Ok(guard) => guard.contains_key(name),
            Err(poisoned) => poisoned.into_inner().contains_key(name),
        }
    }
}

/// Maps finalizer names to factory closures.
#[derive(Default)]
pub struct FinalizerRegistry {
    factories: RwLock<HashMap<String, Arc<FinalizerFactory>>>,
}

impl FinalizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Finalizable> + Send + Sync + 'static,
    {
        let name = name.into();
        info!(finalizer = %name, "Registered finalizer");
        let mut factories = match self.factories.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        factories.insert(name, Arc::new(move || Ok(factory())));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Finalizable>> {
        let factory = {
            let factories = match self.factories.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            factories.get(name).cloned()
        };
        let factory = factory.ok_or_else(|| SagaError::unknown_step(name))?;
        factory().map_err(|cause| SagaError::step_construction(name, cause))
    }
}
