// Workflow Engine - template-driven task automation for the CRM
//
// Events enter through the trigger matcher, instances are materialized by
// the instance manager, the scheduler stamps due times, and the engine
// claims and runs executions through typed per-industry executors.

pub mod catalog;
pub mod conditions;
pub mod engine;
pub mod executors;
pub mod instances;
pub mod matcher;
pub mod scheduler;
pub mod triggers;

pub use engine::WorkflowEngine;
pub use executors::{ActionExecutor, EntityContext, ExecutionOutcome, ExecutorRegistry};
pub use instances::InstanceManager;
pub use matcher::TriggerMatcher;
pub use triggers::{TriggerEvent, TriggerType};
