//! Registry of configured engine adapters and their static metadata.

use std::sync::Arc;

use super::EngineAdapter;
use crate::models::EngineKind;

/// How an engine's cost per document is estimated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostModel {
    /// No cost model; the scorer substitutes the run's median cost.
    None,
    /// Flat declared price per page, in dollars.
    PerPage(f64),
    /// Self-hosted compute estimate derived from elapsed time.
    Compute,
}

/// Dollars per second of compute for self-hosted engines.
const COMPUTE_COST_PER_SECOND: f64 = 0.0001;

impl CostModel {
    /// Estimate the cost of a call that processed `pages` pages in
    /// `elapsed_ms`. Returns `None` when no model applies.
    pub fn estimate(&self, pages: u32, elapsed_ms: u64) -> Option<f64> {
        match self {
            CostModel::None => None,
            CostModel::PerPage(per_page) => Some(per_page * pages.max(1) as f64),
            CostModel::Compute => Some(elapsed_ms as f64 / 1000.0 * COMPUTE_COST_PER_SECOND),
        }
    }
}

/// Static metadata declared for a registered engine.
#[derive(Debug, Clone)]
pub struct EngineMetadata {
    pub kind: EngineKind,
    /// Languages the backend declares support for.
    pub languages: Vec<String>,
    pub cost_model: CostModel,
}

impl EngineMetadata {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            languages: vec!["eng".to_string()],
            cost_model: CostModel::None,
        }
    }

    pub fn with_cost_model(mut self, cost_model: CostModel) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }
}

/// Ordered set of engine adapters.
///
/// Registration order is significant: it is the final tie-break when
/// ranking engines with identical scores. Re-registering a kind replaces
/// the adapter and metadata but keeps the original position.
#[derive(Default)]
pub struct EngineRegistry {
    entries: Vec<(EngineMetadata, Arc<dyn EngineAdapter>)>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter with its metadata.
    pub fn register(&mut self, metadata: EngineMetadata, adapter: Arc<dyn EngineAdapter>) {
        debug_assert_eq!(metadata.kind, adapter.kind());
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(m, _)| m.kind == metadata.kind)
        {
            *entry = (metadata, adapter);
        } else {
            self.entries.push((metadata, adapter));
        }
    }

    /// Get the adapter for an engine.
    pub fn get(&self, kind: EngineKind) -> Option<Arc<dyn EngineAdapter>> {
        self.entries
            .iter()
            .find(|(m, _)| m.kind == kind)
            .map(|(_, a)| Arc::clone(a))
    }

    /// Get the declared metadata for an engine.
    pub fn metadata(&self, kind: EngineKind) -> Option<&EngineMetadata> {
        self.entries
            .iter()
            .map(|(m, _)| m)
            .find(|m| m.kind == kind)
    }

    /// Position of an engine in registration order.
    pub fn order_index(&self, kind: EngineKind) -> Option<usize> {
        self.entries.iter().position(|(m, _)| m.kind == kind)
    }

    /// Registered engine kinds, in registration order.
    pub fn kinds(&self) -> Vec<EngineKind> {
        self.entries.iter().map(|(m, _)| m.kind).collect()
    }

    /// Kinds of engines that can actually run right now.
    pub fn available_kinds(&self) -> Vec<EngineKind> {
        self.entries
            .iter()
            .filter(|(_, a)| a.is_available())
            .map(|(m, _)| m.kind)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DocumentInput, EngineFailure, Recognition};
    use async_trait::async_trait;

    struct DummyAdapter(EngineKind);

    #[async_trait]
    impl EngineAdapter for DummyAdapter {
        fn kind(&self) -> EngineKind {
            self.0
        }
        fn is_available(&self) -> bool {
            true
        }
        fn availability_hint(&self) -> String {
            "always available".to_string()
        }
        async fn recognize(&self, _input: &DocumentInput) -> Result<Recognition, EngineFailure> {
            Err(EngineFailure::new("dummy", 0))
        }
    }

    #[test]
    fn test_registration_order_preserved_on_replace() {
        let mut registry = EngineRegistry::new();
        registry.register(
            EngineMetadata::new(EngineKind::Tesseract),
            Arc::new(DummyAdapter(EngineKind::Tesseract)),
        );
        registry.register(
            EngineMetadata::new(EngineKind::EasyOcr),
            Arc::new(DummyAdapter(EngineKind::EasyOcr)),
        );

        // Replacing tesseract keeps it first.
        registry.register(
            EngineMetadata::new(EngineKind::Tesseract).with_cost_model(CostModel::Compute),
            Arc::new(DummyAdapter(EngineKind::Tesseract)),
        );

        assert_eq!(registry.order_index(EngineKind::Tesseract), Some(0));
        assert_eq!(registry.order_index(EngineKind::EasyOcr), Some(1));
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.metadata(EngineKind::Tesseract).unwrap().cost_model,
            CostModel::Compute
        );
    }

    #[test]
    fn test_cost_models() {
        assert_eq!(CostModel::None.estimate(3, 1000), None);
        assert_eq!(CostModel::PerPage(0.01).estimate(3, 1000), Some(0.03));
        // Zero pages still bills one page.
        assert_eq!(CostModel::PerPage(0.01).estimate(0, 1000), Some(0.01));
        let compute = CostModel::Compute.estimate(2000, 2000).unwrap();
        assert!((compute - 0.0002).abs() < 1e-12);
    }
}
