use serde::{Deserialize, Serialize};

/// Closed set of capabilities a skill may declare.
///
/// Every capability call made by skill code is mapped to one of these and
/// checked against the skill's manifest before it touches any resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "file:read")]
    FileRead,
    #[serde(rename = "file:write")]
    FileWrite,
    #[serde(rename = "shell:exec")]
    ShellExec,
    #[serde(rename = "net:fetch")]
    NetFetch,
    #[serde(rename = "llm:call")]
    LlmCall,
    #[serde(rename = "git:read")]
    GitRead,
    #[serde(rename = "git:write")]
    GitWrite,
    #[serde(rename = "env:read")]
    EnvRead,
    #[serde(rename = "env:write")]
    EnvWrite,
    #[serde(rename = "skill:invoke")]
    SkillInvoke,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::FileRead => "file:read",
            Permission::FileWrite => "file:write",
            Permission::ShellExec => "shell:exec",
            Permission::NetFetch => "net:fetch",
            Permission::LlmCall => "llm:call",
            Permission::GitRead => "git:read",
            Permission::GitWrite => "git:write",
            Permission::EnvRead => "env:read",
            Permission::EnvWrite => "env:write",
            Permission::SkillInvoke => "skill:invoke",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "file:read" => Permission::FileRead,
            "file:write" => Permission::FileWrite,
            "shell:exec" => Permission::ShellExec,
            "net:fetch" => Permission::NetFetch,
            "llm:call" => Permission::LlmCall,
            "git:read" => Permission::GitRead,
            "git:write" => Permission::GitWrite,
            "env:read" => Permission::EnvRead,
            "env:write" => Permission::EnvWrite,
            "skill:invoke" => Permission::SkillInvoke,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
