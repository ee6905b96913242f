//! Metric registration for a single run.
//!
//! The registry maps a metric's [`Label`] to a dense [`MetricIndex`]. Indices
//! are allocated lazily, the first time a label is seen, in first-seen order.
//! The registry owns copies of the descriptor and names it was given so
//! callers can keep mutating their own values between samples.
//!
//! # Example
//!
//! ```rust
//! use coalesce::registry::MetricRegistry;
//! use coalesce::metric::{MetricDescriptor, MetricNames};
//!
//! let mut registry = MetricRegistry::new();
//! let desc = MetricDescriptor::new("ovs", "packets-sec");
//! let names = MetricNames::new().with("interface", "p2p1");
//!
//! let idx = registry.resolve_or_create(&desc, &names);
//! assert_eq!(idx.0, 0);
//! assert_eq!(registry.resolve_or_create(&desc, &names), idx);
//! ```

use std::collections::HashMap;

use crate::metric::{Label, MetricDescriptor, MetricIndex, MetricNames};

/// Information about a registered metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricInfo {
    /// The index assigned to this metric.
    pub index: MetricIndex,
    /// The rendered label.
    pub label: Label,
    /// The descriptor as it was first seen.
    pub desc: MetricDescriptor,
    /// The discriminator names as they were first seen.
    pub names: MetricNames,
}

/// Registry of the metrics seen in one run.
///
/// # Thread Safety
///
/// The registry is designed for single-threaded access. Runs shared between
/// producers go through [`crate::SharedRecorder`].
#[derive(Debug, Default)]
pub struct MetricRegistry {
    /// Map from label to assigned index.
    by_label: HashMap<Label, MetricIndex>,
    /// Metric info, indexed by `MetricIndex`.
    metrics: Vec<MetricInfo>,
}

impl MetricRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for a metric, allocating the next one if it is new.
    ///
    /// The same descriptor and names always yield the same index within this
    /// registry.
    pub fn resolve_or_create(&mut self, desc: &MetricDescriptor, names: &MetricNames) -> MetricIndex {
        let label = Label::new(desc, names);
        if let Some(&index) = self.by_label.get(&label) {
            return index;
        }

        // Distinct metrics per run are bounded by what a benchmark host can emit,
        // far below u32::MAX.
        #[allow(clippy::cast_possible_truncation)]
        let index = MetricIndex(self.metrics.len() as u32);

        self.by_label.insert(label.clone(), index);
        self.metrics.push(MetricInfo {
            index,
            label,
            desc: desc.clone(),
            names: names.clone(),
        });

        index
    }

    /// Looks up an index by label without allocating.
    pub fn lookup(&self, label: &Label) -> Option<MetricIndex> {
        self.by_label.get(label).copied()
    }

    /// Returns information about a registered metric.
    pub fn get(&self, index: MetricIndex) -> Option<&MetricInfo> {
        self.metrics.get(index.as_usize())
    }

    /// Iterates over registered metrics in index order.
    pub fn iter(&self) -> impl Iterator<Item = &MetricInfo> {
        self.metrics.iter()
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns true if no metric has been registered.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> MetricDescriptor {
        MetricDescriptor::new("ovs", "packets-sec").with_class("throughput")
    }

    #[test]
    fn test_sequential_indices() {
        let mut registry = MetricRegistry::new();
        let a = registry.resolve_or_create(&desc(), &MetricNames::new().with("interface", "p2p1"));
        let b = registry.resolve_or_create(&desc(), &MetricNames::new().with("interface", "p2p2"));
        let c = registry.resolve_or_create(&desc(), &MetricNames::new().with("interface", "eno1"));

        assert_eq!((a.0, b.0, c.0), (0, 1, 2));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_same_label_same_index() {
        let mut registry = MetricRegistry::new();
        let names = MetricNames::new().with("interface", "p2p1");
        let first = registry.resolve_or_create(&desc(), &names);
        let second = registry.resolve_or_create(&desc(), &names);

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stores_owned_copy() {
        let mut registry = MetricRegistry::new();
        let mut names = MetricNames::new().with("interface", "p2p1");
        let index = registry.resolve_or_create(&desc(), &names);

        names.set("interface", Some("changed".to_string()));

        let info = registry.get(index).unwrap();
        assert_eq!(info.names.get("interface"), Some(Some("p2p1")));
        assert_eq!(info.label.as_str(), "ovs:packets-sec:<interface:p2p1>");
    }

    #[test]
    fn test_lookup_and_iter_order() {
        let mut registry = MetricRegistry::new();
        assert!(registry.is_empty());

        let names = MetricNames::new().with("interface", "p2p2");
        let index = registry.resolve_or_create(&desc(), &names);
        registry.resolve_or_create(&MetricDescriptor::new("ovs", "bytes-sec"), &names);

        assert_eq!(registry.lookup(&Label::new(&desc(), &names)), Some(index));
        let labels: Vec<_> = registry.iter().map(|m| m.label.to_string()).collect();
        assert_eq!(
            labels,
            vec!["ovs:packets-sec:<interface:p2p2>", "ovs:bytes-sec:<interface:p2p2>"]
        );
        assert!(registry.get(MetricIndex(2)).is_none());
    }
}
