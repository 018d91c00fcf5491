//! Dialog graph: skills as agent nodes, tool calls as edges.
//!
//! A `GraphDefinition` is built once from `AgentNode`s and validated
//! against the tool registry. `DialogGraph` runs it one step at a time over
//! persisted sessions, following the route each agent response selects
//! (`edge::route`) and announcing skill changes with synthetic tool
//! messages (`handoff`).

pub mod definition;
pub mod edge;
pub mod executor;
pub mod handoff;
pub mod node;

pub use definition::{GraphBuilder, GraphDefinition};
pub use edge::{route, Route};
pub use executor::{DialogGraph, StepInput, StepOutcome, StepStatus};
pub use node::{AgentNode, Delegation, EscalationArgs, ESCALATION_MARKER};
