//! Component wiring for the orchestrator.
//!
//! Mandatory initializers always run, in order, and any failure aborts
//! construction. Optional initializers run afterwards; their failures are
//! logged and leave the component in its degraded default.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capability::{CapabilityHandle, HttpGenerator};
use crate::command::CommandExecutor;
use crate::config::{BackendKind, WorkConfig};
use crate::error::{Result, WorkError};
use crate::governor::{GenerativeEstimator, TurnGovernor};
use crate::model::EntityStore;
use crate::nlp::InterpretationPipeline;

pub(crate) struct Components {
    pub capability: Arc<CapabilityHandle>,
    pub pipeline: InterpretationPipeline,
    pub executor: CommandExecutor,
    pub governor: TurnGovernor,
}

/// Partially wired state passed through the initializer lists.
pub(crate) struct Wiring<'a> {
    config: &'a WorkConfig,
    store: Arc<dyn EntityStore>,
    capability: Option<Arc<CapabilityHandle>>,
    pipeline: Option<InterpretationPipeline>,
    executor: Option<CommandExecutor>,
    governor: Option<TurnGovernor>,
}

type Initializer = fn(&mut Wiring<'_>) -> Result<()>;

const MANDATORY: &[(&str, Initializer)] = &[
    ("capability_handle", init_capability),
    ("pipeline", init_pipeline),
    ("executor", init_executor),
    ("governor", init_governor),
];

const OPTIONAL: &[(&str, Initializer)] = &[
    ("backend", init_backend),
    ("complexity_estimator", init_estimator),
];

impl<'a> Wiring<'a> {
    pub fn new(config: &'a WorkConfig, store: Arc<dyn EntityStore>) -> Self {
        Self {
            config,
            store,
            capability: None,
            pipeline: None,
            executor: None,
            governor: None,
        }
    }

    pub fn run(mut self) -> Result<Components> {
        for (name, init) in MANDATORY {
            init(&mut self)
                .map_err(|e| WorkError::Config(format!("initializer '{}' failed: {}", name, e)))?;
            debug!(initializer = name, "Mandatory initializer done");
        }
        for (name, init) in OPTIONAL {
            match init(&mut self) {
                Ok(()) => debug!(initializer = name, "Optional initializer done"),
                Err(e) => warn!(initializer = name, error = %e, "Optional initializer failed"),
            }
        }
        self.finish()
    }

    fn finish(self) -> Result<Components> {
        Ok(Components {
            capability: required(self.capability, "capability_handle")?,
            pipeline: required(self.pipeline, "pipeline")?,
            executor: required(self.executor, "executor")?,
            governor: required(self.governor, "governor")?,
        })
    }

    fn capability(&self) -> Result<Arc<CapabilityHandle>> {
        self.capability
            .clone()
            .ok_or_else(|| missing("capability_handle"))
    }
}

fn required<T>(component: Option<T>, name: &str) -> Result<T> {
    component.ok_or_else(|| missing(name))
}

fn missing(name: &str) -> WorkError {
    WorkError::Config(format!("component '{}' was not initialized", name))
}

fn init_capability(w: &mut Wiring<'_>) -> Result<()> {
    w.capability = Some(Arc::new(CapabilityHandle::unavailable(
        "no backend installed",
        w.config.generation.timeout(),
    )));
    Ok(())
}

fn init_pipeline(w: &mut Wiring<'_>) -> Result<()> {
    w.pipeline = Some(InterpretationPipeline::new(
        w.capability()?,
        &w.config.pipeline,
        &w.config.generation,
    ));
    Ok(())
}

fn init_executor(w: &mut Wiring<'_>) -> Result<()> {
    w.executor = Some(CommandExecutor::new(
        Arc::clone(&w.store),
        w.config.bulk.clone(),
    ));
    Ok(())
}

/// The governor computes budgets whether or not an estimator is wired later.
fn init_governor(w: &mut Wiring<'_>) -> Result<()> {
    w.governor = Some(TurnGovernor::new(w.config.turns.clone()));
    Ok(())
}

fn init_backend(w: &mut Wiring<'_>) -> Result<()> {
    let capability = w.capability()?;
    if w.config.generation.backend == BackendKind::None {
        capability.mark_unavailable("backend disabled in configuration");
        info!("No generation backend configured; only the fast path is available");
        return Ok(());
    }
    match HttpGenerator::from_config(&w.config.generation) {
        Ok(generator) => {
            capability.install(Arc::new(generator));
            Ok(())
        }
        Err(e) => {
            capability.mark_unavailable(e.to_string());
            Err(e.into())
        }
    }
}

fn init_estimator(w: &mut Wiring<'_>) -> Result<()> {
    if !w.config.turns.complexity_estimation {
        debug!("Complexity estimation disabled");
        return Ok(());
    }
    let capability = w.capability()?;
    let governor = w.governor.as_mut().ok_or_else(|| missing("governor"))?;
    governor.set_estimator(Some(Arc::new(GenerativeEstimator::new(capability))));
    info!("Complexity estimator enabled");
    Ok(())
}
