//! Permission enforcement for skill code.
//!
//! Every capability call a skill makes crosses a [`PermissionChecker`]
//! built from its manifest. A denial is a typed error that callers turn
//! into a tool-level error result; it never crashes the host and never
//! touches the external resource.

use std::collections::HashSet;

use tl_domain::permission::Permission;

#[derive(Debug, thiserror::Error)]
#[error("skill '{skill}' denied: permission '{permission}' not declared in manifest")]
pub struct PermissionError {
    pub skill: String,
    pub permission: Permission,
}

#[derive(Debug)]
pub struct PermissionChecker {
    skill: String,
    declared: HashSet<Permission>,
}

impl PermissionChecker {
    pub fn new(skill: impl Into<String>, declared: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            skill: skill.into(),
            declared: declared.into_iter().collect(),
        }
    }

    pub fn skill(&self) -> &str {
        &self.skill
    }

    /// Gate a capability. The caller must consult this *before* touching
    /// the resource.
    pub fn check(&self, permission: Permission) -> Result<(), PermissionError> {
        if self.declared.contains(&permission) {
            Ok(())
        } else {
            tracing::debug!(
                skill = %self.skill,
                permission = %permission,
                "capability denied"
            );
            Err(PermissionError {
                skill: self.skill.clone(),
                permission,
            })
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.declared.contains(&permission)
    }
}
