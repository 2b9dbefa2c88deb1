pub mod catalog;
pub mod executor;
pub mod filesystem;

pub use catalog::{all_tools, ToolDeclaration};
pub use executor::{ExecutorConfig, ToolExecutor, ToolResult};
pub use filesystem::{OutsideRoot, SafeFs};
