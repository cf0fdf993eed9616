use crate::tags::TagSet;
use std::sync::Mutex;

/// Destination for collected metrics, modelled on statsd: counters and
/// gauges with `key:value` tags and a sample rate.
pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &str, tags: &TagSet, rate: f64);

    fn count(&self, name: &str, value: i64, tags: &TagSet, rate: f64);

    fn gauge(&self, name: &str, value: f64, tags: &TagSet, rate: f64);
}

/// How the values of a metric combine: a counter accumulates increments, a
/// gauge holds the latest reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// A metric name together with every tag key its emissions may carry,
/// base tags excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDef {
    pub name: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EmissionKind {
    Incr,
    Count,
    Gauge,
}

/// A single recorded sink call.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub kind: EmissionKind,
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    pub rate: f64,
}

impl Emission {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Sink that keeps every call in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    emissions: Mutex<Vec<Emission>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn named(&self, name: &str) -> Vec<Emission> {
        self.emissions()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    /// Emissions sorted into a canonical order, for comparing passes as
    /// multisets.
    pub fn sorted(&self) -> Vec<Emission> {
        let mut emissions = self.emissions();
        emissions.sort_by(|a, b| {
            (a.kind, &a.name, &a.tags)
                .cmp(&(b.kind, &b.name, &b.tags))
                .then(a.value.total_cmp(&b.value))
        });
        emissions
    }

    pub fn clear(&self) {
        self.emissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn record(&self, kind: EmissionKind, name: &str, value: f64, tags: &TagSet, rate: f64) {
        self.emissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Emission {
                kind,
                name: name.to_string(),
                value,
                tags: tags.as_slice().to_vec(),
                rate,
            });
    }
}

impl MetricsSink for RecordingSink {
    fn incr(&self, name: &str, tags: &TagSet, rate: f64) {
        self.record(EmissionKind::Incr, name, 1.0, tags, rate);
    }

    fn count(&self, name: &str, value: i64, tags: &TagSet, rate: f64) {
        self.record(EmissionKind::Count, name, value as f64, tags, rate);
    }

    fn gauge(&self, name: &str, value: f64, tags: &TagSet, rate: f64) {
        self.record(EmissionKind::Gauge, name, value, tags, rate);
    }
}
