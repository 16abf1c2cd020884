//! Metrics Registry
//!
//! Label-aware store of gauge and counter families backed by a
//! `prometheus::Registry`. Families are created once at startup by the
//! diagnostics that own them and written on every pass.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::{Counter, CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

// =============================================================================
// Family Types
// =============================================================================

/// Kind of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Last write wins
    Gauge,
    /// Monotonic accumulator
    Counter,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

/// Cheap handle to a registered family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyHandle {
    name: Arc<str>,
    kind: MetricKind,
    label_keys: Arc<[String]>,
}

impl FamilyHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn label_keys(&self) -> &[String] {
        &self.label_keys
    }
}

#[derive(Clone)]
enum Series {
    Gauge(Gauge),
    Counter(Counter),
}

enum FamilyVec {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

struct Family {
    handle: FamilyHandle,
    vec: FamilyVec,
    /// Series created so far, keyed by label values in schema order
    series: DashMap<Vec<String>, Series>,
}

impl Family {
    /// Look up a series, creating it on first write.
    fn series(&self, label_values: &[&str]) -> Option<Series> {
        if label_values.len() != self.handle.label_keys.len() {
            warn!(
                family = %self.handle.name,
                expected = self.handle.label_keys.len(),
                got = label_values.len(),
                "Label value count does not match family schema"
            );
            return None;
        }

        let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();
        if let Some(series) = self.series.get(&key) {
            return Some(series.clone());
        }

        let created = match &self.vec {
            FamilyVec::Gauge(vec) => vec.get_metric_with_label_values(label_values).map(Series::Gauge),
            FamilyVec::Counter(vec) => {
                vec.get_metric_with_label_values(label_values).map(Series::Counter)
            }
        };

        match created {
            Ok(series) => Some(self.series.entry(key).or_insert(series).clone()),
            Err(e) => {
                warn!(family = %self.handle.name, "Failed to create series: {}", e);
                None
            }
        }
    }

    fn existing(&self, label_values: &[&str]) -> Option<Series> {
        let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();
        self.series.get(&key).map(|s| s.clone())
    }
}

// =============================================================================
// Metrics Registry
// =============================================================================

/// Process-wide registry of metric families.
///
/// All operations take `&self` and may be called concurrently from every
/// diagnostic loop and from the scrape endpoint. Family lookup goes through a
/// sharded map and each series is an atomic, so unrelated series never
/// contend on a common lock.
pub struct MetricsRegistry {
    registry: Registry,
    families: DashMap<String, Arc<Family>>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            families: DashMap::new(),
        }
    }

    /// Register a family, or return the existing one with the same schema.
    ///
    /// Fails with [`Error::SchemaConflict`] when `name` is already registered
    /// with different label keys or a different kind.
    pub fn create_series_family(
        &self,
        name: &str,
        help: &str,
        label_keys: &[&str],
        kind: MetricKind,
    ) -> Result<FamilyHandle> {
        let keys: Vec<String> = label_keys.iter().map(|k| k.to_string()).collect();

        match self.families.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let existing = &entry.get().handle;
                if existing.label_keys.as_ref() != keys.as_slice() || existing.kind != kind {
                    return Err(Error::SchemaConflict {
                        name: name.to_string(),
                        expected: existing.label_keys.to_vec(),
                        found: keys,
                    });
                }
                trace!(family = name, "Family already registered");
                Ok(existing.clone())
            }
            Entry::Vacant(entry) => {
                let opts = Opts::new(name, help);
                let vec = match kind {
                    MetricKind::Gauge => {
                        let vec = GaugeVec::new(opts, label_keys)?;
                        self.registry.register(Box::new(vec.clone()))?;
                        FamilyVec::Gauge(vec)
                    }
                    MetricKind::Counter => {
                        let vec = CounterVec::new(opts, label_keys)?;
                        self.registry.register(Box::new(vec.clone()))?;
                        FamilyVec::Counter(vec)
                    }
                };

                let handle = FamilyHandle {
                    name: Arc::from(name),
                    kind,
                    label_keys: keys.into(),
                };
                debug!(family = name, kind = %kind, "Registered metric family");

                entry.insert(Arc::new(Family {
                    handle: handle.clone(),
                    vec,
                    series: DashMap::new(),
                }));
                Ok(handle)
            }
        }
    }

    fn family(&self, name: &str) -> Option<Arc<Family>> {
        let family = self.families.get(name).map(|f| Arc::clone(f.value()));
        if family.is_none() {
            trace!(family = name, "Write to unknown family ignored");
        }
        family
    }

    /// Family of the requested kind; a kind mismatch is rejected before any
    /// series is created.
    fn family_of_kind(&self, name: &str, kind: MetricKind) -> Option<Arc<Family>> {
        let family = self.family(name)?;
        if family.handle.kind != kind {
            warn!(
                family = name,
                expected = %family.handle.kind,
                requested = %kind,
                "Operation on a family of a different kind ignored"
            );
            return None;
        }
        Some(family)
    }

    fn gauge(&self, name: &str, label_values: &[&str]) -> Option<Gauge> {
        match self.family_of_kind(name, MetricKind::Gauge)?.series(label_values)? {
            Series::Gauge(g) => Some(g),
            Series::Counter(_) => None,
        }
    }

    /// Set a gauge series. No-op if the family is unknown.
    pub fn set_gauge(&self, name: &str, label_values: &[&str], value: f64) {
        if let Some(g) = self.gauge(name, label_values) {
            g.set(value);
        }
    }

    /// Add to a gauge series. No-op if the family is unknown.
    pub fn inc_gauge(&self, name: &str, label_values: &[&str], delta: f64) {
        if let Some(g) = self.gauge(name, label_values) {
            g.add(delta);
        }
    }

    /// Subtract from a gauge series. No-op if the family is unknown.
    pub fn dec_gauge(&self, name: &str, label_values: &[&str], delta: f64) {
        if let Some(g) = self.gauge(name, label_values) {
            g.sub(delta);
        }
    }

    /// Increment a counter series by a non-negative delta.
    ///
    /// No-op if the family is unknown; negative or non-finite deltas are
    /// rejected with a warning.
    pub fn inc_counter(&self, name: &str, label_values: &[&str], delta: f64) {
        if !(delta >= 0.0 && delta.is_finite()) {
            warn!(family = name, delta, "Counter delta must be non-negative");
            return;
        }

        let Some(family) = self.family_of_kind(name, MetricKind::Counter) else {
            return;
        };
        if let Some(Series::Counter(c)) = family.series(label_values) {
            c.inc_by(delta);
        }
    }

    /// Current value of a gauge series, if it has been written.
    pub fn gauge_value(&self, name: &str, label_values: &[&str]) -> Option<f64> {
        match self.families.get(name)?.existing(label_values)? {
            Series::Gauge(g) => Some(g.get()),
            Series::Counter(_) => None,
        }
    }

    /// Current value of a counter series, if it has been written.
    pub fn counter_value(&self, name: &str, label_values: &[&str]) -> Option<f64> {
        match self.families.get(name)?.existing(label_values)? {
            Series::Counter(c) => Some(c.get()),
            Series::Gauge(_) => None,
        }
    }

    /// Number of series written so far in a family.
    pub fn series_count(&self, name: &str) -> usize {
        self.families.get(name).map(|f| f.series.len()).unwrap_or(0)
    }

    pub fn contains_family(&self, name: &str) -> bool {
        self.families.contains_key(name)
    }

    /// Names of every registered family, sorted.
    pub fn family_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.families.iter().map(|f| f.key().clone()).collect();
        names.sort();
        names
    }

    /// Encode every family in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("Exposition is not valid UTF-8: {}", e)))
    }

    /// Content type of [`MetricsRegistry::encode_text`] output.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("families", &self.family_names())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
