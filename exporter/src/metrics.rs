use crate::collector::COLLECTED_METRICS;
use crate::sink::{MetricDef, MetricKind, MetricsSink};
use crate::tags::TagSet;
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use tracing::{debug, error, warn};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref PASSES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fireboard_exporter_passes_total",
        "Total collection passes started"
    ))
    .unwrap();
    pub static ref PASS_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fireboard_exporter_pass_failures_total",
        "Total collection passes that ended with an error"
    ))
    .unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fireboard_exporter_rate_limited_total",
        "Total passes aborted by a rate-limited response"
    ))
    .unwrap();
    pub static ref TOKEN_RENEWALS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fireboard_exporter_token_renewals_total",
        "Total successful token renewals"
    ))
    .unwrap();
    pub static ref TOKEN_RENEWAL_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fireboard_exporter_token_renewal_failures_total",
        "Total failed token renewals"
    ))
    .unwrap();
    pub static ref PASS_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "fireboard_exporter_pass_duration_seconds",
            "Time taken by one collection pass"
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0])
    )
    .unwrap();
    pub static ref LAST_PASS_SAMPLES: Gauge = Gauge::with_opts(Opts::new(
        "fireboard_exporter_last_pass_samples",
        "Chart samples emitted by the most recent pass"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(PASSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PASS_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMITED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TOKEN_RENEWALS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TOKEN_RENEWAL_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PASS_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(LAST_PASS_SAMPLES.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    render(&REGISTRY)
}

/// Renders a registry in the prometheus text format.
pub fn render(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

enum Family {
    Counter(CounterVec),
    Gauge(GaugeVec),
}

impl Family {
    fn kind(&self) -> MetricKind {
        match self {
            Family::Counter(_) => MetricKind::Counter,
            Family::Gauge(_) => MetricKind::Gauge,
        }
    }
}

struct Registered {
    family: Family,
    labels: Vec<String>,
}

/// [`MetricsSink`] backed by a prometheus registry.
///
/// Dotted statsd names become underscored metric names and `key:value` tags
/// become labels. Metrics declared up front (see [`PrometheusSink::declare`])
/// carry every label their emissions can use, and a declared gauge absorbs
/// `count` calls as absolute values. Undeclared metrics take their label set
/// from their first emission: later emissions leave missing labels empty and
/// drop unknown ones. Sample rates are ignored since prometheus counters are
/// never sampled.
pub struct PrometheusSink {
    registry: Registry,
    families: Mutex<HashMap<String, Registered>>,
}

impl PrometheusSink {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            families: Mutex::new(HashMap::new()),
        }
    }

    /// A sink writing into the process-wide [`REGISTRY`], with every metric
    /// of a collection pass declared for the given base tags.
    pub fn global(base: &TagSet) -> prometheus::Result<Self> {
        let sink = Self::new(REGISTRY.clone());
        for def in COLLECTED_METRICS {
            sink.declare(def, base)?;
        }
        Ok(sink)
    }

    /// Registers `def` with the label keys of `base` plus its own.
    pub fn declare(&self, def: &MetricDef, base: &TagSet) -> prometheus::Result<()> {
        let metric_name = sanitize(def.name, true);
        let labels: BTreeSet<String> = base
            .pairs()
            .map(|(key, _)| key)
            .chain(def.labels.iter().copied())
            .map(|key| sanitize(key, false))
            .collect();

        let registered = self.register(&metric_name, def.name, def.kind, labels.into_iter().collect())?;
        self.families
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(metric_name, registered);
        Ok(())
    }

    fn observe<F>(&self, name: &str, tags: &TagSet, kind: MetricKind, apply: F)
    where
        F: FnOnce(&Family, &[&str]) -> bool,
    {
        let metric_name = sanitize(name, true);
        let labels: BTreeMap<String, &str> = tags
            .pairs()
            .map(|(key, value)| (sanitize(key, false), value))
            .collect();

        let mut families = self.families.lock().unwrap_or_else(|e| e.into_inner());
        if !families.contains_key(&metric_name) {
            match self.register(&metric_name, name, kind, labels.keys().cloned().collect()) {
                Ok(registered) => {
                    families.insert(metric_name.clone(), registered);
                }
                Err(e) => {
                    warn!("Failed to register metric {}: {}", metric_name, e);
                    return;
                }
            }
        }
        let Some(registered) = families.get(&metric_name) else {
            return;
        };

        let unknown: Vec<&str> = labels
            .keys()
            .filter(|key| !registered.labels.contains(*key))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            warn!("Dropping labels {:?} not registered for {}", unknown, metric_name);
        }

        let values: Vec<&str> = registered
            .labels
            .iter()
            .map(|label| labels.get(label).copied().unwrap_or(""))
            .collect();
        if !apply(&registered.family, &values) {
            warn!(
                "Metric {} already registered as {:?}, dropping {:?} emission",
                metric_name,
                registered.family.kind(),
                kind
            );
        }
    }

    fn register(
        &self,
        metric_name: &str,
        source_name: &str,
        kind: MetricKind,
        labels: Vec<String>,
    ) -> prometheus::Result<Registered> {
        let help = format!("Fireboard metric {source_name}");
        let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let family = match kind {
            MetricKind::Counter => {
                let vec = CounterVec::new(Opts::new(metric_name, help), &label_refs)?;
                self.registry.register(Box::new(vec.clone()))?;
                Family::Counter(vec)
            }
            MetricKind::Gauge => {
                let vec = GaugeVec::new(Opts::new(metric_name, help), &label_refs)?;
                self.registry.register(Box::new(vec.clone()))?;
                Family::Gauge(vec)
            }
        };
        debug!("Registered {:?} {} with labels {:?}", kind, metric_name, labels);
        Ok(Registered { family, labels })
    }
}

impl MetricsSink for PrometheusSink {
    fn incr(&self, name: &str, tags: &TagSet, _rate: f64) {
        self.observe(name, tags, MetricKind::Counter, |family, values| match family {
            Family::Counter(vec) => {
                vec.with_label_values(values).inc();
                true
            }
            Family::Gauge(_) => false,
        });
    }

    fn count(&self, name: &str, value: i64, tags: &TagSet, _rate: f64) {
        self.observe(name, tags, MetricKind::Counter, |family, values| {
            match family {
                Family::Counter(_) if value < 0 => {
                    warn!("Ignoring negative count {} for {}", value, name);
                }
                Family::Counter(vec) => vec.with_label_values(values).inc_by(value as f64),
                Family::Gauge(vec) => vec.with_label_values(values).set(value as f64),
            }
            true
        });
    }

    fn gauge(&self, name: &str, value: f64, tags: &TagSet, _rate: f64) {
        self.observe(name, tags, MetricKind::Gauge, |family, values| match family {
            Family::Gauge(vec) => {
                vec.with_label_values(values).set(value);
                true
            }
            Family::Counter(_) => false,
        });
    }
}

/// Maps an arbitrary string onto the prometheus name alphabet. Colons are
/// only legal in metric names, not label names.
fn sanitize(raw: &str, allow_colon: bool) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => c,
            ':' if allow_colon => c,
            _ => '_',
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
