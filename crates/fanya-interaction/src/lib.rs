//! Agent endpoint adapters.
//!
//! [`WebhookAgent`] posts each user message to an HTTP webhook; [`EchoAgent`]
//! answers locally for offline use and demos.

pub mod echo_agent;
pub mod webhook_agent;

pub use echo_agent::EchoAgent;
pub use webhook_agent::WebhookAgent;

use fanya_core::agent::AgentEndpoint;
use fanya_core::config::AgentConfig;
use fanya_core::error::Result;
use std::sync::Arc;

/// Picks the webhook agent when a URL is configured, otherwise the echo agent.
pub fn agent_from_config(config: &AgentConfig) -> Result<Arc<dyn AgentEndpoint>> {
    if config.url.is_some() {
        let agent = WebhookAgent::from_config(config)?;
        tracing::info!("[Agent] Using webhook at {}", agent.url());
        Ok(Arc::new(agent))
    } else {
        tracing::info!("[Agent] No webhook configured, using the echo agent");
        Ok(Arc::new(EchoAgent::new()))
    }
}
