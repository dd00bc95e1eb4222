//! The agent core: conversation ownership, context-budget enforcement,
//! the Plan/Act/Observe turn engine, and the operator command registry.

pub mod approval;
pub mod commands;
pub mod compact;
pub mod conversation;
pub mod memory;
pub mod turn;

pub use approval::ApprovalDecision;
pub use commands::{Command, CommandAction, CommandOutcome, CommandRegistry};
pub use conversation::Conversation;
pub use memory::{MemoryEntry, MemoryStore};
pub use turn::{Agent, AgentBuilder, TurnEvent};
