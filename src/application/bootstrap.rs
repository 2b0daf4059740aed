use crate::infrastructure::config::{ensure_default_configs, load_settings, AppSettings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATABASE_FILE: &str = "mawaqit.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: AppSettings,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let settings = load_settings(&config_dir)?;
    initialize_database(&database_path)?;

    tracing::debug!(
        workspace = %workspace_root.display(),
        database = %database_path.display(),
        "workspace ready"
    );

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        database_path,
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn creates_layout_and_default_settings() {
        let root = std::env::temp_dir().join(format!(
            "mawaqit-bootstrap-{}-{}",
            std::process::id(),
            NEXT_WORKSPACE.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = fs::remove_dir_all(&root);

        let result = bootstrap_workspace(&root).expect("bootstrap");
        assert!(root.join("config/app.json").exists());
        assert!(root.join("config/location.json").exists());
        assert!(root.join("config/calculation.json").exists());
        assert!(root.join("logs").is_dir());
        assert!(result.database_path.ends_with("state/mawaqit.sqlite"));
        assert_eq!(result.settings.calculation.method, 4);

        // second run keeps existing files
        bootstrap_workspace(&root).expect("bootstrap again");
        let _ = fs::remove_dir_all(&root);
    }
}
