//! Agent manifest and the background task orchestrator

pub mod orchestrator;
pub mod registry;

pub use orchestrator::{
    AgentTask, Orchestrator, QueueStats, TaskExecutor, TaskPriority, TaskQueue, TaskStatus,
};
pub use registry::{builtin_agents, AgentDescriptor, AgentRegistry};
