//! Source health listing for `dqh sources` and `GET /sources`.

use serde::Serialize;

use crate::connector::ConnectorRegistry;

/// One registered source and whether it answered a probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub kind: String,
    pub aliases: Vec<String>,
    pub healthy: bool,
}

/// Probe every registered connector with `test_connection`.
pub async fn source_statuses(registry: &ConnectorRegistry) -> Vec<SourceStatus> {
    let mut statuses = Vec::with_capacity(registry.len());
    for connector in registry.connectors() {
        statuses.push(SourceStatus {
            name: connector.name().to_string(),
            kind: connector.kind().as_str().to_string(),
            aliases: connector.aliases().to_vec(),
            healthy: connector.test_connection().await,
        });
    }
    statuses
}

pub fn print_sources(statuses: &[SourceStatus]) {
    if statuses.is_empty() {
        println!("No sources configured. Add a [sources.<name>] table to the config.");
        return;
    }
    println!("{:<16} {:<12} {:<8} ALIASES", "SOURCE", "KIND", "HEALTHY");
    for s in statuses {
        println!(
            "{:<16} {:<12} {:<8} {}",
            s.name,
            s.kind,
            s.healthy,
            s.aliases.join(",")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectorKind, MemoryConnector};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_statuses_reflect_reachability() {
        let down = Arc::new(MemoryConnector::new("snowflake", ConnectorKind::Warehouse, "PROD", "PUBLIC"));
        down.set_reachable(false);
        let mut registry = ConnectorRegistry::new();
        registry.register(Arc::new(
            MemoryConnector::new("postgres", ConnectorKind::Relational, "stage", "public")
                .with_alias("pg"),
        ));
        registry.register(down);

        let statuses = source_statuses(&registry).await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].healthy);
        assert_eq!(statuses[0].aliases, vec!["pg"]);
        assert_eq!(statuses[1].kind, "warehouse");
        assert!(!statuses[1].healthy);
    }
}
