//! Research tools for Themis agents.
//!
//! Two tools back the delegated workers: `bash` for exploring the case
//! data directory, and `search_cases` for semantic retrieval against the
//! external search service.

mod bash;
mod case_search;

pub use bash::BashTool;
pub use case_search::CaseSearchTool;

use std::sync::Arc;
use themis_config::AppConfig;
use themis_core::tool::ToolRegistry;
use tracing::info;

/// Build the registry handed to delegated workers.
pub fn default_registry(config: &AppConfig) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(BashTool::from_config(&config.tools)));
    registry.register(Box::new(CaseSearchTool::from_config(&config.search)));
    info!(tools = ?registry.names(), "Registered worker tools");
    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_both_tools() {
        let config = AppConfig::default();
        let registry = default_registry(&config);
        assert!(registry.get("bash").is_some());
        assert!(registry.get("search_cases").is_some());
        assert_eq!(registry.definitions().len(), 2);
    }
}
