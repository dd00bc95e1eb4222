//! Name-unique tool registry.
//!
//! Concurrent reads are cheap (shared lock); registration takes the lock
//! exclusively. `all()` returns a name-sorted snapshot so prompt assembly
//! is deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use tl_domain::error::{Error, Result};
use tl_domain::tool::ToolDefinition;

use crate::tool::Tool;

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails on a duplicate name.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.definition().name;
        let mut tools = self.tools.write();
        if tools.contains_key(&name) {
            return Err(Error::ToolDuplicate(name));
        }
        tracing::debug!(tool = %name, "tool registered");
        tools.insert(name, tool);
        Ok(())
    }

    /// Remove a tool. Fails when the name is unknown.
    pub fn unregister(&self, name: &str) -> Result<()> {
        if self.tools.write().remove(name).is_none() {
            return Err(Error::ToolNotFound(name.to_string()));
        }
        tracing::debug!(tool = %name, "tool unregistered");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Snapshot of all tools, sorted by name.
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.read().values().cloned().collect();
        tools.sort_by(|a, b| a.definition().name.cmp(&b.definition().name));
        tools
    }

    /// Snapshot of all definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.all().iter().map(|t| t.definition()).collect()
    }
}
