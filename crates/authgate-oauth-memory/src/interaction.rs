//! A scripted interaction-graph engine.
//!
//! Outcomes are registered per request JWT. Unknown JWTs are rejected as
//! invalid credentials.

use async_trait::async_trait;
use authgate_oauth::interaction::{
    Graph, GraphError, GraphInput, GraphOutcome, Intent, InteractionGraphService,
};
use dashmap::DashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct ScriptedInteractionGraph {
    outcomes: DashMap<String, Result<GraphOutcome, GraphError>>,
    dry_runs: RwLock<Vec<(Intent, GraphInput)>>,
    committed: RwLock<Vec<Graph>>,
}

impl ScriptedInteractionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `jwt` resolve to a complete graph signing in `user_id`.
    pub fn complete(&self, jwt: &str, user_id: &str, identity_id: &str, amr: &[&str]) {
        self.script(
            jwt,
            Ok(GraphOutcome {
                graph: Graph {
                    user_id: Some(user_id.to_string()),
                    amr: amr.iter().map(|s| (*s).to_string()).collect(),
                    last_identity_id: Some(identity_id.to_string()),
                    ..Graph::default()
                },
                pending_edges: Vec::new(),
            }),
        );
    }

    /// Registers the result of a dry run for `jwt`.
    pub fn script(&self, jwt: &str, outcome: Result<GraphOutcome, GraphError>) {
        self.outcomes.insert(jwt.to_string(), outcome);
    }

    /// Intents and inputs seen by `dry_run`, in order.
    pub async fn dry_runs(&self) -> Vec<(Intent, GraphInput)> {
        self.dry_runs.read().await.clone()
    }

    /// Graphs committed by `run`, in order.
    pub async fn committed(&self) -> Vec<Graph> {
        self.committed.read().await.clone()
    }
}

#[async_trait]
impl InteractionGraphService for ScriptedInteractionGraph {
    async fn dry_run(&self, intent: Intent, input: GraphInput) -> Result<GraphOutcome, GraphError> {
        let jwt = match &input {
            GraphInput::AnonymousRequest { jwt } | GraphInput::BiometricRequest { jwt } => {
                jwt.clone()
            }
        };
        self.dry_runs.write().await.push((intent, input));

        self.outcomes
            .get(&jwt)
            .map(|o| o.clone())
            .unwrap_or(Err(GraphError::InvalidCredentials))
    }

    async fn run(&self, graph: &Graph) -> Result<(), GraphError> {
        self.committed.write().await.push(graph.clone());
        Ok(())
    }
}
