//! Skill manifest — parsed from SKILL.md YAML frontmatter.
//!
//! Only SKILL.md is required per skill directory. The frontmatter is a YAML
//! block delimited by `---` at the top of the file; the markdown body below
//! it becomes the skill's prompt fragment.
//!
//! ```yaml
//! ---
//! name: changelog
//! version: 0.2.0
//! description: Draft changelog entries from recent commits
//! backend: sandboxed-script
//! entrypoint: scripts/changelog.sh
//! permissions: [file:read, shell:exec]
//! triggers:
//!   globs: ["CHANGELOG.md"]
//!   keywords: [changelog, release notes]
//! ---
//! ```

use serde::{Deserialize, Serialize};

use tl_domain::error::{Error, Result};
use tl_domain::permission::Permission;

/// Validates a skill name: `^[a-z0-9]+(-[a-z0-9]+)*$`
pub fn is_valid_skill_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let mut expect_alnum = true;
    for ch in name.chars() {
        if expect_alnum {
            if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() {
                return false;
            }
            expect_alnum = false;
        } else if ch == '-' {
            expect_alnum = true;
        } else if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() {
            return false;
        }
    }
    !expect_alnum || name.len() == 1
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SkillManifest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    InProcess,
    SubprocessRpc,
    SandboxedScript,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Trigger description — tells the operator (and the model, via the
    /// prompt fragment header) what this skill is for.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub backend: BackendKind,
    /// Backend-specific entrypoint: a registered adapter name, a server
    /// command line, or a script path inside the skill directory.
    #[serde(default)]
    pub entrypoint: Option<String>,
    /// Capabilities this skill may use. Anything outside this list is
    /// denied at call time.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub triggers: Triggers,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Triggers {
    /// File globs whose presence in the working set activates the skill.
    #[serde(default)]
    pub globs: Vec<String>,
    /// Keywords matched against recent conversation text.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Operator modes (e.g. "review") that activate the skill.
    #[serde(default)]
    pub modes: Vec<String>,
}

impl SkillManifest {
    /// The validated name. Errors if missing or malformed.
    pub fn skill_name(&self) -> Result<&str> {
        match self.name.as_deref() {
            Some(n) if is_valid_skill_name(n) => Ok(n),
            Some(n) => Err(Error::Config(format!(
                "invalid skill name '{n}': must match ^[a-z0-9]+(-[a-z0-9]+)*$"
            ))),
            None => Err(Error::Config("skill manifest missing name".into())),
        }
    }

    /// Declared permissions, rejecting anything outside the closed set.
    pub fn declared_permissions(&self) -> Result<Vec<Permission>> {
        self.permissions
            .iter()
            .map(|p| {
                Permission::parse(p)
                    .ok_or_else(|| Error::Config(format!("unknown permission '{p}'")))
            })
            .collect()
    }

    /// Whether any trigger predicate matches the given context.
    pub fn triggered_by(&self, recent_text: &str, files: &[String], mode: Option<&str>) -> bool {
        let text = recent_text.to_lowercase();
        if self
            .triggers
            .keywords
            .iter()
            .any(|k| text.contains(&k.to_lowercase()))
        {
            return true;
        }
        if let Some(mode) = mode {
            if self.triggers.modes.iter().any(|m| m == mode) {
                return true;
            }
        }
        for pattern in &self.triggers.globs {
            if let Ok(matcher) = glob::Pattern::new(pattern) {
                if files.iter().any(|f| matcher.matches(f)) {
                    return true;
                }
            }
        }
        false
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frontmatter parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Split SKILL.md into (manifest, markdown body).
///
/// Returns `(None, full content)` when there is no frontmatter block.
pub fn parse_frontmatter(content: &str) -> (Option<SkillManifest>, String) {
    let trimmed = content.trim_start();
    let Some(rest) = trimmed.strip_prefix("---") else {
        return (None, content.to_string());
    };
    let Some(end) = rest.find("\n---") else {
        return (None, content.to_string());
    };
    let yaml = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('\n').to_string();

    match serde_yaml::from_str::<SkillManifest>(yaml) {
        Ok(manifest) => (Some(manifest), body),
        Err(e) => {
            tracing::warn!(error = %e, "unparseable SKILL.md frontmatter");
            (None, content.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"---
name: changelog
version: 0.2.0
description: Draft changelog entries
backend: sandboxed-script
entrypoint: scripts/changelog.sh
permissions: [file:read, shell:exec]
triggers:
  globs: ["CHANGELOG.md", "docs/*.md"]
  keywords: [changelog]
  modes: [review]
---
Use this skill when drafting release notes.
"#;

    #[test]
    fn parses_full_manifest() {
        let (manifest, body) = parse_frontmatter(FULL);
        let manifest = manifest.unwrap();
        assert_eq!(manifest.skill_name().unwrap(), "changelog");
        assert_eq!(manifest.backend, BackendKind::SandboxedScript);
        assert_eq!(
            manifest.declared_permissions().unwrap(),
            vec![Permission::FileRead, Permission::ShellExec]
        );
        assert!(body.starts_with("Use this skill"));
    }

    #[test]
    fn no_frontmatter_returns_full_body() {
        let (manifest, body) = parse_frontmatter("just markdown");
        assert!(manifest.is_none());
        assert_eq!(body, "just markdown");
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let manifest = SkillManifest {
            name: Some("x".into()),
            permissions: vec!["file:read".into(), "root:all".into()],
            ..Default::default()
        };
        assert!(manifest.declared_permissions().is_err());
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_skill_name("changelog"));
        assert!(is_valid_skill_name("apple-notes-2"));
        assert!(!is_valid_skill_name(""));
        assert!(!is_valid_skill_name("Bad"));
        assert!(!is_valid_skill_name("trailing-"));
        assert!(!is_valid_skill_name("-leading"));
        assert!(!is_valid_skill_name("two--dashes"));
    }

    #[test]
    fn trigger_keyword_match_is_case_insensitive() {
        let (manifest, _) = parse_frontmatter(FULL);
        let manifest = manifest.unwrap();
        assert!(manifest.triggered_by("update the CHANGELOG please", &[], None));
        assert!(!manifest.triggered_by("unrelated", &[], None));
    }

    #[test]
    fn trigger_glob_match() {
        let (manifest, _) = parse_frontmatter(FULL);
        let manifest = manifest.unwrap();
        assert!(manifest.triggered_by("", &["docs/notes.md".into()], None));
        assert!(!manifest.triggered_by("", &["src/main.rs".into()], None));
    }

    #[test]
    fn trigger_mode_match() {
        let (manifest, _) = parse_frontmatter(FULL);
        let manifest = manifest.unwrap();
        assert!(manifest.triggered_by("", &[], Some("review")));
        assert!(!manifest.triggered_by("", &[], Some("chat")));
    }

    #[test]
    fn default_backend_is_in_process() {
        let (manifest, _) = parse_frontmatter("---\nname: tiny\n---\nbody");
        assert_eq!(manifest.unwrap().backend, BackendKind::InProcess);
    }
}
