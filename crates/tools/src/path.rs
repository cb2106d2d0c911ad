//! Path validation — keeps file tools inside their workspace.

use std::path::{Component, Path, PathBuf};
use mindthread_core::error::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the workspace")]
    OutsideWorkspace { path: String },

    #[error("Path '{path}' matches forbidden prefix '{prefix}'")]
    Forbidden { path: String, prefix: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to resolve path '{path}': {reason}")]
    ResolveFailed { path: String, reason: String },
}

/// Resolve `path` for file access.
///
/// Relative paths are joined onto `workspace` when one is set. `..`
/// components are rejected outright. The resolved path must stay under
/// `workspace` and must not start with any `forbidden` prefix.
pub fn validate_path(
    path: &str,
    workspace: Option<&Path>,
    forbidden: &[PathBuf],
) -> Result<PathBuf, PathValidationError> {
    let raw = Path::new(path);

    if raw.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    let joined = match workspace {
        Some(root) if raw.is_relative() => root.join(raw),
        _ => raw.to_path_buf(),
    };

    let resolved = resolve(&joined).map_err(|e| PathValidationError::ResolveFailed {
        path: path.into(),
        reason: e.to_string(),
    })?;

    for prefix in forbidden {
        if resolved.starts_with(prefix) {
            return Err(PathValidationError::Forbidden {
                path: path.into(),
                prefix: prefix.display().to_string(),
            });
        }
    }

    if let Some(root) = workspace {
        let root = resolve(root).map_err(|e| PathValidationError::ResolveFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if !resolved.starts_with(&root) {
            return Err(PathValidationError::OutsideWorkspace { path: path.into() });
        }
    }

    Ok(resolved)
}

/// Where a file tool may read or write.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceScope {
    /// Relative paths resolve against this root, and access must stay in it
    pub root: Option<PathBuf>,
    pub forbidden: Vec<PathBuf>,
}

impl WorkspaceScope {
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            forbidden: Vec::new(),
        }
    }

    pub fn forbid(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.forbidden.push(prefix.into());
        self
    }

    /// Resolve `path` for `tool`, mapping violations to `PermissionDenied`.
    pub fn resolve(&self, tool: &str, path: &str) -> Result<PathBuf, ToolError> {
        validate_path(path, self.root.as_deref(), &self.forbidden).map_err(|e| {
            ToolError::PermissionDenied {
                tool_name: tool.into(),
                reason: e.to_string(),
            }
        })
    }

    /// `path` relative to the root for display, falling back to the full path.
    pub fn display(&self, path: &Path) -> String {
        self.root
            .as_deref()
            .and_then(|root| root.canonicalize().ok())
            .and_then(|root| path.strip_prefix(root).ok().map(Path::to_path_buf))
            .unwrap_or_else(|| path.to_path_buf())
            .display()
            .to_string()
    }
}

/// Canonicalize the deepest existing ancestor and re-append the rest, so
/// files that do not exist yet still resolve to a comparable path.
fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(path.to_path_buf()),
        }
    }
    let mut resolved = existing.canonicalize()?;
    resolved.extend(rest.iter().rev());
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_rejected() {
        let err = validate_path("../../etc/passwd", None, &[]).unwrap_err();
        assert!(matches!(err, PathValidationError::PathTraversal { .. }));
    }

    #[test]
    fn relative_paths_join_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = validate_path("notes.txt", Some(dir.path()), &[]).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("notes.txt"));
    }

    #[test]
    fn absolute_path_outside_workspace_is_rejected() {
        let workspace = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let target = other.path().join("secret.txt");
        let err = validate_path(target.to_str().unwrap(), Some(workspace.path()), &[]).unwrap_err();
        assert!(matches!(err, PathValidationError::OutsideWorkspace { .. }));
    }

    #[test]
    fn forbidden_prefix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let forbidden = vec![dir.path().canonicalize().unwrap()];
        let target = dir.path().join("x.txt");
        let err = validate_path(target.to_str().unwrap(), None, &forbidden).unwrap_err();
        assert!(matches!(err, PathValidationError::Forbidden { .. }));
    }

    #[test]
    fn scope_maps_violations_to_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let scope = WorkspaceScope::rooted(dir.path());
        let err = scope.resolve("file_read", "../x").unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { ref tool_name, .. } if tool_name == "file_read"));

        let inside = scope.resolve("file_read", "a/b.txt").unwrap();
        assert_eq!(scope.display(&inside), Path::new("a/b.txt").display().to_string());

        let scope = scope.forbid(dir.path().canonicalize().unwrap().join("private"));
        let err = scope.resolve("file_write", "private/key.pem").unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}
