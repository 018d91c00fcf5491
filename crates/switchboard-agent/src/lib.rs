pub mod approval;
pub mod blueprint;
pub mod graph;
pub mod run_log;
pub mod session;
pub mod tool_executor;

pub use approval::ApprovalBroker;
pub use graph::{
    AgentNode, Delegation, DialogGraph, GraphBuilder, GraphDefinition, Route, StepInput, StepOutcome,
    StepStatus,
};
pub use run_log::RunLogger;
pub use session::SessionLocks;
pub use tool_executor::ToolExecutor;
