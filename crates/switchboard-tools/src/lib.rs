pub mod builtin;
pub mod directory;
pub mod registry;

pub use directory::{HttpCustomerDirectory, InMemoryCustomerDirectory};
pub use registry::ToolRegistry;
