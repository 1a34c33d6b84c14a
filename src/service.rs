//! Request-level facade: plan, execute, stamp.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::config::{AtlasConfig, Guardrails};
use crate::error::Result;
use crate::query::{ExecMeta, Plan, PlanBuilder, PlanExecutor, RequestDescriptor};
use crate::storage::{AdapterRegistry, Row};

/// Answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    /// `<epoch-ms>-<8 hex>` identifier.
    pub request_id: String,
    /// Plan that was executed.
    pub plan: Plan,
    /// Column order of `rows`.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Row>,
    /// Execution metadata.
    pub meta: ExecMeta,
}

/// Shared entry point for callers; cheap to clone and safe to use from many
/// threads at once.
#[derive(Debug, Clone)]
pub struct AtlasService {
    registry: Arc<AdapterRegistry>,
    executor: PlanExecutor,
}

impl AtlasService {
    /// Builds the service over an existing registry.
    pub fn new(registry: Arc<AdapterRegistry>, guardrails: Guardrails) -> Self {
        let executor = PlanExecutor::new(Arc::clone(&registry), guardrails);
        Self { registry, executor }
    }

    /// Builds the registry from `config` and wraps it.
    pub fn from_config(config: &AtlasConfig) -> Result<Self> {
        let registry = AdapterRegistry::from_config(config)?;
        Ok(Self::new(Arc::new(registry), config.guardrails))
    }

    /// Registry backing this service.
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Plans `request` without executing it.
    pub fn plan(&self, question: &str, request: &RequestDescriptor) -> Plan {
        PlanBuilder::new(self.registry.as_ref()).build(request, question)
    }

    /// Plans and executes `request`.
    pub fn answer(&self, question: &str, request: &RequestDescriptor) -> QueryResponse {
        let request_id = new_request_id();
        let plan = self.plan(question, request);
        let output = self.executor.execute(&plan);
        info!(
            request_id = %request_id,
            intent = %plan.intent,
            steps = plan.steps.len(),
            rows = output.rows.len(),
            failed = output.meta.failure().is_some(),
            elapsed_ms = output.meta.elapsed_ms,
            "atlas.request.answered"
        );
        QueryResponse {
            request_id,
            plan,
            columns: output.columns,
            rows: output.rows,
            meta: output.meta,
        }
    }
}

fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let suffix: u32 = rand::thread_rng().gen();
    format!("{millis}-{suffix:08x}")
}
