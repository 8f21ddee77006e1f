pub mod command;

pub use command::{ExternalTool, ToolError};

use std::path::{Path, PathBuf};

/// File name up to its first `.`, e.g. `reference_tree.tree` -> `reference_tree`.
pub fn file_stem_before_dot(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

/// Appends `suffix` to the full path, e.g. a tool prefix plus `.treefile`.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}
