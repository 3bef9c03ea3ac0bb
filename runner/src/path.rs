//! Path helper functions

use std::path::{Path, PathBuf};

/// Return the root of the workspace.
///
/// Falls back to the current directory when the runner is not launched through cargo.
pub fn get_workspace_path() -> PathBuf {
    let Ok(runner_manifest) = std::env::var("CARGO_MANIFEST_DIR") else {
        return PathBuf::from(".");
    };
    let path = PathBuf::from(runner_manifest);
    path.parent().map(Path::to_path_buf).unwrap_or(path)
}

/// Return the path of the default configuration file.
pub fn get_default_config_path() -> PathBuf {
    let mut path = get_workspace_path();
    path.push("config.toml");
    path
}
