//! The conversation: one system prompt plus an append-only message log.
//!
//! The log is mutated only by the turn engine's driver task; everything
//! else gets snapshots. The system prompt is rebuilt on demand, never
//! mutated in place, so scratchpad notes and skill fragments always
//! reflect current state.

use tl_domain::message::Message;

use crate::memory::MemoryEntry;

#[derive(Default)]
pub struct Conversation {
    base_instructions: String,
    /// Prior-session insights loaded at start.
    insights: Vec<MemoryEntry>,
    project_notes: Option<String>,
    log: Vec<Message>,
}

impl Conversation {
    pub fn new(base_instructions: impl Into<String>) -> Self {
        Self {
            base_instructions: base_instructions.into(),
            insights: Vec::new(),
            project_notes: None,
            log: Vec::new(),
        }
    }

    pub fn with_insights(mut self, insights: Vec<MemoryEntry>) -> Self {
        self.insights = insights;
        self
    }

    pub fn with_project_notes(mut self, notes: Option<String>) -> Self {
        self.project_notes = notes;
        self
    }

    pub fn append(&mut self, message: Message) {
        self.log.push(message);
    }

    /// Replace the whole log (used by compaction, which must preserve the
    /// tool_use/tool_result pairing).
    pub fn replace_log(&mut self, log: Vec<Message>) {
        self.log = log;
    }

    /// A copy of the log. Callers never get an alias into the live log.
    pub fn snapshot(&self) -> Vec<Message> {
        self.log.clone()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Rebuild the system prompt: base instructions, then loaded insights,
    /// then project notes, then the scratchpad, then skill fragments in
    /// order.
    pub fn build_system_prompt(
        &self,
        scratchpad: &str,
        skill_fragments: &[String],
        extra: Option<&str>,
    ) -> String {
        let mut sections = vec![self.base_instructions.clone()];

        if !self.insights.is_empty() {
            let mut block = String::from("Insights from earlier sessions:\n");
            for entry in &self.insights {
                block.push_str(&format!("- [{}] {}\n", entry.tag, entry.content));
            }
            sections.push(block);
        }
        if let Some(notes) = &self.project_notes {
            sections.push(format!("Project notes:\n{notes}"));
        }
        if !scratchpad.is_empty() {
            sections.push(scratchpad.to_string());
        }
        for fragment in skill_fragments {
            sections.push(fragment.clone());
        }
        if let Some(extra) = extra {
            if !extra.is_empty() {
                sections.push(extra.to_string());
            }
        }

        sections.join("\n\n")
    }

    /// Check invariant: every `tool_use` id is matched by exactly one later
    /// `tool_result` before any reuse of the id. Returns offending ids.
    pub fn dangling_tool_uses(&self) -> Vec<String> {
        let mut dangling = Vec::new();
        let mut open: Vec<String> = Vec::new();
        for msg in &self.log {
            for id in msg.tool_use_ids() {
                open.push(id.to_string());
            }
            for id in msg.tool_result_ids() {
                if let Some(pos) = open.iter().position(|open_id| open_id == id) {
                    open.remove(pos);
                } else {
                    dangling.push(format!("orphan result {id}"));
                }
            }
        }
        dangling.extend(open);
        dangling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_domain::message::{ContentBlock, Role};

    #[test]
    fn system_prompt_section_order() {
        let conversation = Conversation::new("You are a coding assistant.")
            .with_insights(vec![MemoryEntry {
                tag: "style".into(),
                content: "prefers small diffs".into(),
            }])
            .with_project_notes(Some("Monorepo, build with make.".into()));

        let prompt = conversation.build_system_prompt(
            "Scratchpad notes:\n- plan: step 2\n",
            &["Changelog skill: draft entries tersely.".into()],
            Some("hook-added line"),
        );

        let base = prompt.find("coding assistant").unwrap();
        let insight = prompt.find("small diffs").unwrap();
        let notes = prompt.find("Monorepo").unwrap();
        let pad = prompt.find("step 2").unwrap();
        let skill = prompt.find("Changelog skill").unwrap();
        let extra = prompt.find("hook-added").unwrap();
        assert!(base < insight && insight < notes && notes < pad && pad < skill && skill < extra);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let conversation = Conversation::new("base");
        let prompt = conversation.build_system_prompt("", &[], None);
        assert_eq!(prompt, "base");
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut conversation = Conversation::new("base");
        conversation.append(Message::user("one"));
        let snap = conversation.snapshot();
        conversation.append(Message::user("two"));
        assert_eq!(snap.len(), 1);
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn dangling_detection() {
        let mut conversation = Conversation::new("base");
        conversation.append(Message {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "T1".into(),
                name: "shell".into(),
                input: serde_json::json!({}),
            }],
        });
        assert_eq!(conversation.dangling_tool_uses(), vec!["T1"]);

        conversation.append(Message::tool_result("T1", "ok", "", false));
        assert!(conversation.dangling_tool_uses().is_empty());
    }
}
