//! Polls the Fireboard cloud API and republishes device, session and
//! chart telemetry as metrics.

pub mod client;
pub mod collector;
pub mod config;
pub mod convert;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod tags;
pub mod token;

pub use collector::{ChartFailurePolicy, CollectionPolicy, Collector, PassReport};
pub use errors::{Call, Error, Result};
pub use sink::MetricsSink;
pub use source::RemoteDataSource;
pub use tags::TagSet;
pub use token::TokenCache;
