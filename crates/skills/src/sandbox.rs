//! Filesystem sandbox for script-backend skills.
//!
//! A skill sees one root directory and nothing else. Containment is judged
//! on *canonical* paths — both the root and the candidate are canonicalized
//! before comparison, so a traversal that only becomes an escape through a
//! symlink is still caught. Operations that create a new file canonicalize
//! the nearest existing ancestor instead.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Hard ceiling on a sandboxed file read.
pub const MAX_READ_BYTES: u64 = 1024 * 1024;

/// Wall-clock cap on sandboxed executions.
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("path escapes the sandbox root: {0}")]
    Escape(PathBuf),

    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("execution exceeded {0}s")]
    Timeout(u64),

    #[error("invalid glob pattern: {0}")]
    InvalidPattern(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// The root must exist; it is canonicalized once here.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        Ok(Self {
            root: root.as_ref().canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn contains(&self, canonical: &Path) -> bool {
        canonical == self.root || canonical.starts_with(&self.root)
    }

    /// Resolve a path that must already exist.
    ///
    /// Joins relative input to the root, canonicalizes (resolving every
    /// symlink), and rejects any result outside the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let path = path.as_ref();
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let canonical = candidate.canonicalize()?;
        if !self.contains(&canonical) {
            return Err(SandboxError::Escape(path.to_path_buf()));
        }
        Ok(canonical)
    }

    /// Resolve a path that may not exist yet (for writes).
    ///
    /// The nearest existing ancestor is canonicalized and must sit inside
    /// the root; the not-yet-existing remainder must not traverse upward.
    pub fn resolve_for_create(&self, path: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let path = path.as_ref();
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(SandboxError::Escape(path.to_path_buf()));
        }
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        // Walk up to the nearest existing ancestor.
        let mut existing = candidate.as_path();
        while !existing.exists() {
            existing = match existing.parent() {
                Some(parent) => parent,
                None => return Err(SandboxError::Escape(path.to_path_buf())),
            };
        }
        let canonical_ancestor = existing.canonicalize()?;
        if !self.contains(&canonical_ancestor) {
            return Err(SandboxError::Escape(path.to_path_buf()));
        }

        let remainder = candidate
            .strip_prefix(existing)
            .map_err(|_| SandboxError::Escape(path.to_path_buf()))?;
        Ok(canonical_ancestor.join(remainder))
    }

    /// Read a file inside the sandbox, enforcing [`MAX_READ_BYTES`].
    pub fn read(&self, path: impl AsRef<Path>) -> Result<String, SandboxError> {
        let resolved = self.resolve(path)?;
        let size = std::fs::metadata(&resolved)?.len();
        if size > MAX_READ_BYTES {
            return Err(SandboxError::TooLarge {
                size,
                limit: MAX_READ_BYTES,
            });
        }
        Ok(std::fs::read_to_string(&resolved)?)
    }

    /// Write a file inside the sandbox, creating parent directories.
    pub fn write(&self, path: impl AsRef<Path>, content: &str) -> Result<(), SandboxError> {
        let resolved = self.resolve_for_create(path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::write(resolved, content)?)
    }

    /// Expand a glob pattern relative to the root. Matches whose canonical
    /// form escapes the root (symlinks again) are filtered out, not errors.
    pub fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>, SandboxError> {
        if Path::new(pattern).is_absolute()
            || Path::new(pattern)
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(SandboxError::InvalidPattern(pattern.to_string()));
        }
        let full = self.root.join(pattern);
        let full = full.to_string_lossy();
        let paths = glob::glob(&full)
            .map_err(|e| SandboxError::InvalidPattern(e.to_string()))?;

        let mut matches = Vec::new();
        for entry in paths.flatten() {
            match entry.canonicalize() {
                Ok(canonical) if self.contains(&canonical) => matches.push(canonical),
                Ok(outside) => {
                    tracing::debug!(path = %outside.display(), "glob match outside sandbox, dropped");
                }
                Err(_) => {}
            }
        }
        matches.sort();
        Ok(matches)
    }

    /// Run a shell command with the root as working directory, capped at
    /// [`EXEC_TIMEOUT`]. `stdin` bytes, when given, are written before the
    /// pipe closes. Returns combined output regardless of exit status,
    /// along with success.
    pub async fn exec(
        &self,
        command: &str,
        stdin: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(String, bool), SandboxError> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(if stdin.is_some() {
                std::process::Stdio::piped()
            } else {
                std::process::Stdio::null()
            })
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                use tokio::io::AsyncWriteExt;
                let _ = pipe.write_all(input.as_bytes()).await;
                // pipe drops here, closing the child's stdin
            }
        }
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
            _ = tokio::time::sleep(EXEC_TIMEOUT) => {
                return Err(SandboxError::Timeout(EXEC_TIMEOUT.as_secs()));
            }
            output = child.wait_with_output() => output?,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok((combined, output.status.success()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("inside.txt"), "data").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        (dir, sandbox)
    }

    #[test]
    fn resolves_paths_inside_root() {
        let (_dir, sandbox) = sandbox();
        assert!(sandbox.resolve("inside.txt").is_ok());
        assert!(sandbox.resolve("sub").is_ok());
    }

    #[test]
    fn rejects_dotdot_traversal() {
        let (_dir, sandbox) = sandbox();
        let err = sandbox.resolve("../outside.txt");
        assert!(matches!(
            err,
            Err(SandboxError::Escape(_)) | Err(SandboxError::Io(_))
        ));
        // And for creates, where the target does not exist at all.
        assert!(matches!(
            sandbox.resolve_for_create("../new.txt"),
            Err(SandboxError::Escape(_))
        ));
    }

    #[test]
    fn rejects_absolute_path_outside_root() {
        let (_dir, sandbox) = sandbox();
        assert!(matches!(
            sandbox.resolve("/etc/passwd"),
            Err(SandboxError::Escape(_))
        ));
    }

    #[test]
    fn accepts_absolute_path_inside_root() {
        let (dir, sandbox) = sandbox();
        let abs = dir.path().join("inside.txt");
        assert!(sandbox.resolve(&abs).is_ok());
    }

    #[test]
    fn rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();

        let (dir, sandbox) = sandbox();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        // Lexically inside the root, but the symlink resolves outside.
        assert!(matches!(
            sandbox.resolve("link/secret.txt"),
            Err(SandboxError::Escape(_))
        ));
    }

    #[test]
    fn rejects_create_through_symlinked_dir() {
        let outside = tempfile::tempdir().unwrap();
        let (dir, sandbox) = sandbox();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        // The nearest existing ancestor (the symlink) canonicalizes outside.
        assert!(matches!(
            sandbox.resolve_for_create("link/new.txt"),
            Err(SandboxError::Escape(_))
        ));
    }

    #[test]
    fn create_resolves_through_missing_directories() {
        let (dir, sandbox) = sandbox();
        let resolved = sandbox.resolve_for_create("sub/deep/new.txt").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (_dir, sandbox) = sandbox();
        sandbox.write("sub/out.txt", "written").unwrap();
        assert_eq!(sandbox.read("sub/out.txt").unwrap(), "written");
    }

    #[test]
    fn read_enforces_size_ceiling() {
        let (dir, sandbox) = sandbox();
        let big = "x".repeat((MAX_READ_BYTES + 1) as usize);
        std::fs::write(dir.path().join("big.txt"), big).unwrap();
        assert!(matches!(
            sandbox.read("big.txt"),
            Err(SandboxError::TooLarge { .. })
        ));
    }

    #[test]
    fn glob_filters_matches_outside_root() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("leak.txt"), "x").unwrap();

        let (dir, sandbox) = sandbox();
        std::fs::write(dir.path().join("ok.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let matches = sandbox.glob("**/*.txt").unwrap();
        assert!(matches.iter().any(|p| p.ends_with("ok.txt")));
        assert!(!matches.iter().any(|p| p.ends_with("leak.txt")));
    }

    #[test]
    fn glob_rejects_upward_patterns() {
        let (_dir, sandbox) = sandbox();
        assert!(matches!(
            sandbox.glob("../*.txt"),
            Err(SandboxError::InvalidPattern(_))
        ));
    }

    #[tokio::test]
    async fn exec_runs_in_root_and_caps_output_status() {
        let (_dir, sandbox) = sandbox();
        let (out, ok) = sandbox
            .exec("ls inside.txt", None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(ok);
        assert!(out.contains("inside.txt"));

        let (_, ok) = sandbox
            .exec("exit 2", None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn exec_feeds_stdin() {
        let (_dir, sandbox) = sandbox();
        let (out, ok) = sandbox
            .exec("cat", Some("piped input"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(out, "piped input");
    }

    #[tokio::test]
    async fn exec_observes_cancellation() {
        let (_dir, sandbox) = sandbox();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            sandbox.exec("sleep 5", None, &cancel).await,
            Err(SandboxError::Cancelled)
        ));
    }
}
