//! Lifecycle Controller
//!
//! Drives initialize, start and stop across the whole graph. Bulk calls
//! fan out one task per resource and isolate failures: a faulty device
//! must never keep the rest of the plant from coming online. Failed
//! initialization or start demotes the resource from the externally
//! visible subset; every fault goes to the warning sink and the bulk call
//! itself always completes.

use std::sync::Arc;

use tokio::task::JoinSet;

use super::error::ResourceError;
use super::graph::ResourceGraph;
use super::reporting::ErrorReporting;
use crate::models::{LifecycleState, SharedResource};
use crate::registry::ResourceTypeRegistry;

const COMPONENT: &str = "lifecycle";

pub(crate) struct LifecycleController {
    registry: Arc<ResourceTypeRegistry>,
    graph: Arc<ResourceGraph>,
    reporting: Arc<dyn ErrorReporting>,
}

impl LifecycleController {
    pub(crate) fn new(
        registry: Arc<ResourceTypeRegistry>,
        graph: Arc<ResourceGraph>,
        reporting: Arc<dyn ErrorReporting>,
    ) -> Self {
        Self {
            registry,
            graph,
            reporting,
        }
    }

    /// Initializes every loaded resource concurrently. Failing resources
    /// are demoted from the externally visible subset and reported; the
    /// call itself never fails.
    pub(crate) async fn initialize_all(&self) {
        self.fan_out(Phase::Initialize).await;
    }

    /// Starts every loaded resource concurrently, isolating failures like
    /// [`LifecycleController::initialize_all`].
    pub(crate) async fn start_all(&self) {
        self.fan_out(Phase::Start).await;
    }

    /// Stops every loaded resource concurrently. Stop failures are
    /// reported but do not demote, teardown continues regardless.
    pub(crate) async fn stop_all(&self) {
        self.fan_out(Phase::Stop).await;
    }

    /// Starts a single resource, reporting a failure instead of raising it.
    pub(crate) async fn start(&self, resource: &SharedResource) -> bool {
        match run_phase(&self.registry, resource, Phase::Start).await {
            Ok(()) => true,
            Err(error) => {
                self.reporting.report_warning(COMPONENT, &error);
                false
            }
        }
    }

    /// Stops a single resource, reporting a failure instead of raising it.
    pub(crate) async fn stop(&self, resource: &SharedResource) -> bool {
        match run_phase(&self.registry, resource, Phase::Stop).await {
            Ok(()) => true,
            Err(error) => {
                self.reporting.report_warning(COMPONENT, &error);
                false
            }
        }
    }

    async fn fan_out(&self, phase: Phase) {
        let mut tasks = JoinSet::new();
        for resource in self.graph.all() {
            let registry = self.registry.clone();
            let graph = self.graph.clone();
            let reporting = self.reporting.clone();
            tasks.spawn(async move {
                if let Err(error) = run_phase(&registry, &resource, phase).await {
                    if phase.demotes_on_failure() {
                        let id = resource.read().await.id();
                        graph.remove_public(id);
                    }
                    reporting.report_warning(COMPONENT, &error);
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialize,
    Start,
    Stop,
}

impl Phase {
    fn demotes_on_failure(self) -> bool {
        matches!(self, Phase::Initialize | Phase::Start)
    }
}

/// Runs one lifecycle phase on one resource, enforcing the state machine:
/// Constructed, Initialized, Running, Stopped, with no way back except
/// Running to Stopped. Stopping a resource that never ran is a quiet
/// no-op so that teardown after a partial boot stays silent.
async fn run_phase(
    registry: &ResourceTypeRegistry,
    resource: &SharedResource,
    phase: Phase,
) -> anyhow::Result<()> {
    let mut guard = resource.write().await;
    let state = guard.state();

    let target = match phase {
        Phase::Initialize => {
            if state != LifecycleState::Constructed {
                return Err(invalid(state, "initialize"));
            }
            LifecycleState::Initialized
        }
        Phase::Start => {
            if state != LifecycleState::Initialized {
                return Err(invalid(state, "start"));
            }
            LifecycleState::Running
        }
        Phase::Stop => match state {
            LifecycleState::Running => LifecycleState::Stopped,
            // Never ran or already stopped, nothing to tear down.
            _ => return Ok(()),
        },
    };

    let behavior = registry.get(guard.type_name()).map(|def| def.behavior())?;
    match phase {
        Phase::Initialize => behavior.initialize(&mut guard).await?,
        Phase::Start => behavior.start(&mut guard).await?,
        Phase::Stop => behavior.stop(&mut guard).await?,
    }
    guard.set_state(target);
    Ok(())
}

fn invalid(from: LifecycleState, operation: &'static str) -> anyhow::Error {
    anyhow::Error::new(ResourceError::InvalidTransition { from, operation })
}
