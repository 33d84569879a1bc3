pub mod agent_service;
pub mod metrics;
pub mod sweeper;

pub use agent_service::{AgentService, NetworkReport, TokenOverview, WhaleActivity};
pub use metrics::{Metrics, MetricsSnapshot};
pub use sweeper::{run_network_sampler, SweepReport, Sweeper};
