//! Metric identity and sample types.
//!
//! A metric stream is identified by a [`MetricDescriptor`] (where the value
//! comes from and what it measures) plus a set of [`MetricNames`]
//! discriminators (which bridge, which interface, which direction, ...).
//! Together they render to a [`Label`] that is unique within a run.
//!
//! # Label format
//!
//! ```text
//! source:type:<name1:value1><name2:value2>...
//! ```
//!
//! Discriminators keep the order the caller supplied them in. A discriminator
//! whose value is unset renders as `x`.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DataShapeError, Result};

/// Placeholder used in labels for a discriminator that has no value.
const UNSET_LABEL_VALUE: &str = "x";

/// Dense, zero-based index of a metric within a run.
///
/// Indices are handed out in first-seen order of distinct labels and join the
/// sample stream (first column) to the metadata side-car (`idx` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricIndex(pub u32);

impl MetricIndex {
    /// Returns the index as a `usize` for table lookups.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MetricIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-shape description of what a metric measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// The tool or subsystem that produced the metric (e.g. `"ovs"`, `"mpstat"`).
    pub source: String,
    /// What is measured (e.g. `"packets-sec"`, `"Busy-CPU"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional aggregation class (e.g. `"throughput"`, `"count"`).
    ///
    /// Persisted in the metadata side-car but not part of the label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl MetricDescriptor {
    /// Creates a descriptor without a class.
    pub fn new(source: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: kind.into(),
            class: None,
        }
    }

    /// Sets the aggregation class.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Checks that the fields forming the label are present.
    ///
    /// # Errors
    ///
    /// Returns [`DataShapeError::EmptyDescriptorField`] if `source` or `type`
    /// is empty.
    pub fn validate(&self) -> Result<()> {
        if self.source.is_empty() {
            return Err(DataShapeError::EmptyDescriptorField { field: "source" }.into());
        }
        if self.kind.is_empty() {
            return Err(DataShapeError::EmptyDescriptorField { field: "type" }.into());
        }
        Ok(())
    }
}

/// Ordered discriminator names for a metric.
///
/// Keeps insertion order, both in the label and when serialized to the
/// metadata side-car. Setting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MetricNames {
    entries: Vec<(String, Option<String>)>,
}

impl MetricNames {
    /// Creates an empty set of names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`MetricNames::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, Some(value.into()));
        self
    }

    /// Builder-style [`MetricNames::set`] with an unset value.
    pub fn with_unset(mut self, name: impl Into<String>) -> Self {
        self.set(name, None);
        self
    }

    /// Sets `name` to `value`, keeping the original position if it exists.
    pub fn set(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Returns the value for `name`, `Some(None)` if it is present but unset.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_deref())
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }

    /// Number of discriminators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no discriminators.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetricNames {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut names = Self::new();
        for (k, v) in iter {
            names.set(k, Some(v.into()));
        }
        names
    }
}

impl Serialize for MetricNames {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MetricNames {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct NamesVisitor;

        impl<'de> Visitor<'de> for NamesVisitor {
            type Value = MetricNames;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of discriminator names to string or null values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut names = MetricNames::new();
                while let Some((name, value)) = access.next_entry::<String, Option<String>>()? {
                    names.set(name, value);
                }
                Ok(names)
            }
        }

        deserializer.deserialize_map(NamesVisitor)
    }
}

/// Composite key identifying one metric stream within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    /// Renders the label for a descriptor and its discriminators.
    pub fn new(desc: &MetricDescriptor, names: &MetricNames) -> Self {
        let mut label = format!("{}:{}:", desc.source, desc.kind);
        for (name, value) in names.iter() {
            label.push('<');
            label.push_str(name);
            label.push(':');
            label.push_str(value.unwrap_or(UNSET_LABEL_VALUE));
            label.push('>');
        }
        Self(label)
    }

    /// Returns the label text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One periodic measurement.
///
/// `end` is a caller-supplied integer clock reading (commonly milliseconds
/// since the epoch); the unit only has to be consistent within a run.
/// `begin` is usually omitted and is then inferred from neighbouring samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Start of the measured period, inclusive, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<i64>,
    /// End of the measured period, inclusive.
    pub end: i64,
    /// The measured value.
    pub value: f64,
}

impl Sample {
    /// Creates a sample with no explicit begin.
    pub fn new(end: i64, value: f64) -> Self {
        Self {
            begin: None,
            end,
            value,
        }
    }

    /// Creates a sample covering `begin..=end`.
    pub fn with_begin(begin: i64, end: i64, value: f64) -> Self {
        Self {
            begin: Some(begin),
            end,
            value,
        }
    }
}
