//! Built-in local tools: shell execution, file operations, content search,
//! and the model-maintained scratchpad.

pub mod file;
pub mod grep;
pub mod notes;
pub mod shell;

pub use file::{EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
pub use grep::GrepTool;
pub use notes::{NotesTool, Scratchpad};
pub use shell::ShellTool;
