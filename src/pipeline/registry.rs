//! Node registry: which node kinds the capability can actually create.
//!
//! The registry is populated once at startup by asking the capability about
//! each kind's factory. Graph construction checks every kind it needs against
//! the registry before instantiating anything.

use crate::backend::MediaBackend;
use crate::config::ElementFactories;
use crate::pipeline::error::BuildError;
use crate::pipeline::node_type::NodeKind;
use std::collections::{BTreeSet, HashMap};

/// Factory names and availability for every node kind.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    factories: HashMap<NodeKind, String>,
    available: BTreeSet<NodeKind>,
}

impl NodeRegistry {
    /// Resolve factory names from config and probe the capability for each.
    pub fn discover(elements: &ElementFactories, backend: &dyn MediaBackend) -> Self {
        let factories: HashMap<NodeKind, String> = NodeKind::all()
            .iter()
            .map(|&kind| (kind, elements.factory_for(kind).to_string()))
            .collect();

        let available = factories
            .iter()
            .filter(|(_, factory)| backend.has_factory(factory))
            .map(|(&kind, _)| kind)
            .collect::<BTreeSet<_>>();

        let registry = Self {
            factories,
            available,
        };
        let missing = registry.missing();
        if missing.is_empty() {
            tracing::debug!("All {} node kinds available", NodeKind::all().len());
        } else {
            tracing::debug!("Node kinds unavailable: {:?}", missing);
        }
        registry
    }

    /// Build a registry with an explicit availability set.
    pub fn with_available(
        elements: &ElementFactories,
        available: impl IntoIterator<Item = NodeKind>,
    ) -> Self {
        Self {
            factories: NodeKind::all()
                .iter()
                .map(|&kind| (kind, elements.factory_for(kind).to_string()))
                .collect(),
            available: available.into_iter().collect(),
        }
    }

    /// Factory name a kind is created from.
    pub fn factory(&self, kind: NodeKind) -> &str {
        self.factories
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_factory())
    }

    pub fn is_available(&self, kind: NodeKind) -> bool {
        self.available.contains(&kind)
    }

    /// Kinds the capability cannot create, in declaration order.
    pub fn missing(&self) -> Vec<NodeKind> {
        NodeKind::all()
            .iter()
            .copied()
            .filter(|k| !self.available.contains(k))
            .collect()
    }

    /// Fail with the first kind in `kinds` that is not available.
    pub fn require(&self, kinds: &[NodeKind]) -> Result<(), BuildError> {
        match kinds.iter().find(|k| !self.is_available(**k)) {
            Some(&kind) => Err(BuildError::MissingCapability {
                kind,
                factory: self.factory(kind).to_string(),
            }),
            None => Ok(()),
        }
    }
}
