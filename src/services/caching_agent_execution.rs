//! Standard execution for caching agents: load a snapshot, write it to a
//! cache.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;

use crate::domain::ports::{Agent, AgentExecution, WriteableCache};

/// [`AgentExecution`] that writes each loaded snapshot to one cache.
pub struct CachingAgentExecution {
    cache: Arc<dyn WriteableCache>,
}

impl CachingAgentExecution {
    /// Execution writing into `cache`.
    pub fn new(cache: Arc<dyn WriteableCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl AgentExecution for CachingAgentExecution {
    async fn execute_agent(&self, agent: &dyn Agent) -> anyhow::Result<()> {
        let agent_type = agent.agent_type();
        let caching_agent = agent
            .as_caching_agent()
            .ok_or_else(|| anyhow!("Agent {agent_type} is not a caching agent"))?;

        let result = caching_agent
            .load_data()
            .await
            .with_context(|| format!("Failed to load data for agent {agent_type}"))?;

        let types: BTreeSet<&String> = result
            .cache_results
            .keys()
            .chain(result.evictions.keys())
            .collect();

        for type_name in types {
            if let Some(items) = result.cache_results.get(type_name) {
                self.cache
                    .merge_all(type_name, items)
                    .await
                    .with_context(|| format!("Failed to merge {type_name} for agent {agent_type}"))?;
            }
            if let Some(ids) = result.evictions.get(type_name) {
                self.cache
                    .evict_all(type_name, ids)
                    .await
                    .with_context(|| format!("Failed to evict {type_name} for agent {agent_type}"))?;
            }
        }

        tracing::debug!(
            agent_type,
            types = result.cache_results.len(),
            items = result.cache_results.values().map(Vec::len).sum::<usize>(),
            evictions = result.evictions.values().map(Vec::len).sum::<usize>(),
            "Caching agent data written"
        );
        Ok(())
    }
}
