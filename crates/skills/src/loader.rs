//! Skill loader — scans the skills root, drives the lifecycle
//! `declared → loaded → active → unloaded`, and wires contributions into
//! the tool registry and lifecycle manager.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use tl_domain::error::{Error, Result};
use tl_lifecycle::{HookPhase, LifecycleManager};
use tl_tools::ToolRegistry;

use crate::backend::{create_backend, InProcessSkill, SkillBackend};
use crate::manifest::{parse_frontmatter, SkillManifest};
use crate::permission::PermissionChecker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillState {
    Declared,
    Loaded,
    Active,
    Unloaded,
}

struct SkillEntry {
    manifest: SkillManifest,
    dir: PathBuf,
    /// Markdown body of SKILL.md; injected into the system prompt while
    /// the skill is active.
    doc_fragment: Option<String>,
    state: SkillState,
    tool_names: Vec<String>,
    prompt_fragment: Option<String>,
    backend: Option<Box<dyn SkillBackend>>,
}

pub struct SkillLoader {
    registry: Arc<ToolRegistry>,
    lifecycle: Arc<LifecycleManager>,
    adapters: HashMap<String, Arc<dyn InProcessSkill>>,
    cancel: CancellationToken,
    skills: Mutex<HashMap<String, SkillEntry>>,
}

impl SkillLoader {
    pub fn new(
        registry: Arc<ToolRegistry>,
        lifecycle: Arc<LifecycleManager>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            adapters: HashMap::new(),
            cancel,
            skills: Mutex::new(HashMap::new()),
        }
    }

    /// Register an in-process adapter under an entrypoint name. Must happen
    /// before loading skills that reference it.
    pub fn register_adapter(&mut self, entrypoint: impl Into<String>, adapter: Arc<dyn InProcessSkill>) {
        self.adapters.insert(entrypoint.into(), adapter);
    }

    /// Scan the skills root for `<dir>/SKILL.md` packages. Each valid
    /// manifest becomes a declared skill. Returns the declared names.
    pub fn scan(&self, skills_root: &Path) -> Result<Vec<String>> {
        let mut declared = Vec::new();
        if !skills_root.exists() {
            return Ok(declared);
        }
        for entry in std::fs::read_dir(skills_root)? {
            let entry = entry?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let md_path = dir.join("SKILL.md");
            if !md_path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&md_path)?;
            let (manifest, body) = parse_frontmatter(&content);
            let Some(manifest) = manifest else {
                tracing::warn!(dir = %dir.display(), "SKILL.md without frontmatter, skipping");
                continue;
            };
            let name = match manifest.skill_name() {
                Ok(n) => n.to_string(),
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "skipping invalid skill");
                    continue;
                }
            };
            let doc_fragment = if body.trim().is_empty() {
                None
            } else {
                Some(body.trim().to_string())
            };
            self.skills.lock().insert(
                name.clone(),
                SkillEntry {
                    manifest,
                    dir,
                    doc_fragment,
                    state: SkillState::Declared,
                    tool_names: Vec::new(),
                    prompt_fragment: None,
                    backend: None,
                },
            );
            declared.push(name);
        }
        declared.sort();
        Ok(declared)
    }

    /// Instantiate a declared skill's backend and wire its contribution in.
    pub async fn load(&self, name: &str) -> Result<()> {
        let (manifest, dir) = {
            let skills = self.skills.lock();
            let entry = skills
                .get(name)
                .ok_or_else(|| Error::SkillNotFound(name.to_string()))?;
            if entry.state != SkillState::Declared {
                return Err(Error::Config(format!(
                    "skill '{name}' is not in the declared state"
                )));
            }
            (entry.manifest.clone(), entry.dir.clone())
        };

        let permissions = manifest.declared_permissions()?;
        let checker = Arc::new(PermissionChecker::new(name, permissions));
        let backend = create_backend(&manifest, &dir, &self.adapters, self.cancel.clone())?;
        let contribution = backend.load(&manifest, checker).await?;

        // Commit: register tools and hooks, then record the entry.
        let mut tool_names = Vec::new();
        for tool in &contribution.tools {
            let tool_name = tool.definition().name;
            self.registry.register(tool.clone())?;
            tool_names.push(tool_name);
        }
        for hook in contribution.hooks {
            self.lifecycle
                .register(hook.phase, name, hook.priority, hook.handler);
        }

        let mut skills = self.skills.lock();
        if let Some(entry) = skills.get_mut(name) {
            entry.state = SkillState::Loaded;
            entry.tool_names = tool_names;
            entry.prompt_fragment = contribution.prompt_fragment;
            entry.backend = Some(backend);
        }
        tracing::info!(skill = name, "skill loaded");
        Ok(())
    }

    /// Loaded → active. Dispatches `OnActivate`.
    pub async fn activate(&self, name: &str) -> Result<()> {
        {
            let mut skills = self.skills.lock();
            let entry = skills
                .get_mut(name)
                .ok_or_else(|| Error::SkillNotFound(name.to_string()))?;
            if entry.state != SkillState::Loaded {
                return Err(Error::Config(format!("skill '{name}' is not loaded")));
            }
            entry.state = SkillState::Active;
        }
        let mut data = HashMap::new();
        data.insert("skill".to_string(), serde_json::json!(name));
        self.lifecycle.dispatch(HookPhase::OnActivate, data).await?;
        Ok(())
    }

    /// Active → loaded. Dispatches `OnDeactivate`.
    pub async fn deactivate(&self, name: &str) -> Result<()> {
        {
            let mut skills = self.skills.lock();
            let entry = skills
                .get_mut(name)
                .ok_or_else(|| Error::SkillNotFound(name.to_string()))?;
            if entry.state != SkillState::Active {
                return Err(Error::Config(format!("skill '{name}' is not active")));
            }
            entry.state = SkillState::Loaded;
        }
        let mut data = HashMap::new();
        data.insert("skill".to_string(), serde_json::json!(name));
        self.lifecycle
            .dispatch(HookPhase::OnDeactivate, data)
            .await?;
        Ok(())
    }

    /// Tear a skill down: unregister its tools and hooks, stop its backend.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let (tool_names, backend) = {
            let mut skills = self.skills.lock();
            let entry = skills
                .get_mut(name)
                .ok_or_else(|| Error::SkillNotFound(name.to_string()))?;
            entry.state = SkillState::Unloaded;
            (std::mem::take(&mut entry.tool_names), entry.backend.take())
        };

        for tool_name in &tool_names {
            if let Err(e) = self.registry.unregister(tool_name) {
                tracing::warn!(tool = %tool_name, error = %e, "unregister during unload");
            }
        }
        self.lifecycle.unregister_skill(name);
        if let Some(backend) = backend {
            backend.unload().await;
        }
        tracing::info!(skill = name, "skill unloaded");
        Ok(())
    }

    pub fn state(&self, name: &str) -> Option<SkillState> {
        self.skills.lock().get(name).map(|e| e.state)
    }

    /// Prompt fragments of active skills, name-ordered: the backend's
    /// fragment when it provided one, otherwise the SKILL.md body.
    pub fn prompt_fragments(&self) -> Vec<String> {
        let skills = self.skills.lock();
        let mut names: Vec<_> = skills
            .iter()
            .filter(|(_, e)| e.state == SkillState::Active)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|n| {
                let entry = &skills[&n];
                entry
                    .prompt_fragment
                    .clone()
                    .or_else(|| entry.doc_fragment.clone())
            })
            .collect()
    }

    /// Declared skills whose trigger predicates match the given context.
    pub fn triggered(
        &self,
        recent_text: &str,
        files: &[String],
        mode: Option<&str>,
    ) -> Vec<String> {
        let skills = self.skills.lock();
        let mut names: Vec<_> = skills
            .iter()
            .filter(|(_, e)| e.state == SkillState::Declared)
            .filter(|(_, e)| e.manifest.triggered_by(recent_text, files, mode))
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, name: &str, frontmatter_extra: &str, body: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {name}\n{frontmatter_extra}---\n{body}"),
        )
        .unwrap();
    }

    fn loader() -> (Arc<ToolRegistry>, Arc<LifecycleManager>, SkillLoader) {
        let registry = Arc::new(ToolRegistry::new());
        let lifecycle = Arc::new(LifecycleManager::new());
        let loader = SkillLoader::new(
            registry.clone(),
            lifecycle.clone(),
            CancellationToken::new(),
        );
        (registry, lifecycle, loader)
    }

    #[tokio::test]
    async fn full_lifecycle_for_script_skill() {
        let root = tempfile::tempdir().unwrap();
        write_skill(
            root.path(),
            "upper",
            "description: Uppercase text\nbackend: sandboxed-script\nentrypoint: run.sh\npermissions: [shell:exec]\n",
            "Run this to uppercase things.\n",
        );
        std::fs::write(root.path().join("upper/run.sh"), "tr 'a-z' 'A-Z'").unwrap();

        let (registry, _lifecycle, loader) = loader();
        let declared = loader.scan(root.path()).unwrap();
        assert_eq!(declared, vec!["upper"]);
        assert_eq!(loader.state("upper"), Some(SkillState::Declared));

        loader.load("upper").await.unwrap();
        assert_eq!(loader.state("upper"), Some(SkillState::Loaded));
        assert!(registry.contains("skill_upper"));

        loader.activate("upper").await.unwrap();
        assert_eq!(loader.state("upper"), Some(SkillState::Active));
        let fragments = loader.prompt_fragments();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("uppercase things"));

        loader.deactivate("upper").await.unwrap();
        assert_eq!(loader.state("upper"), Some(SkillState::Loaded));

        loader.unload("upper").await.unwrap();
        assert_eq!(loader.state("upper"), Some(SkillState::Unloaded));
        assert!(!registry.contains("skill_upper"));
    }

    #[tokio::test]
    async fn load_requires_declared_state() {
        let root = tempfile::tempdir().unwrap();
        write_skill(
            root.path(),
            "upper",
            "backend: sandboxed-script\nentrypoint: run.sh\npermissions: [shell:exec]\n",
            "",
        );
        std::fs::write(root.path().join("upper/run.sh"), "true").unwrap();

        let (_registry, _lifecycle, loader) = loader();
        loader.scan(root.path()).unwrap();
        loader.load("upper").await.unwrap();
        assert!(loader.load("upper").await.is_err());
    }

    #[tokio::test]
    async fn unknown_skill_is_a_typed_error() {
        let (_registry, _lifecycle, loader) = loader();
        assert!(matches!(
            loader.load("ghost").await.unwrap_err(),
            Error::SkillNotFound(_)
        ));
    }

    #[test]
    fn scan_skips_invalid_packages() {
        let root = tempfile::tempdir().unwrap();
        // No SKILL.md at all.
        std::fs::create_dir_all(root.path().join("not-a-skill")).unwrap();
        // Bad name.
        write_skill(root.path(), "ok-skill", "", "");
        std::fs::write(
            root.path().join("ok-skill/SKILL.md"),
            "---\nname: ok-skill\n---\n",
        )
        .unwrap();
        let bad = root.path().join("badname");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join("SKILL.md"), "---\nname: BadName\n---\n").unwrap();

        let (_registry, _lifecycle, loader) = loader();
        let declared = loader.scan(root.path()).unwrap();
        assert_eq!(declared, vec!["ok-skill"]);
    }

    #[test]
    fn triggered_reports_matching_declared_skills() {
        let root = tempfile::tempdir().unwrap();
        write_skill(
            root.path(),
            "release",
            "triggers:\n  keywords: [changelog]\n",
            "",
        );
        write_skill(root.path(), "other", "", "");

        let (_registry, _lifecycle, loader) = loader();
        loader.scan(root.path()).unwrap();
        assert_eq!(
            loader.triggered("draft the changelog", &[], None),
            vec!["release"]
        );
        assert!(loader.triggered("hello", &[], None).is_empty());
    }
}
