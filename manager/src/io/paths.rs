//! Canonical file locations under the manager home directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;

/// All canonical paths for one manager home.
#[derive(Debug, Clone)]
pub struct ManagerPaths {
    pub home: PathBuf,
    pub config_path: PathBuf,
    pub tasks_path: PathBuf,
    pub run_log_path: PathBuf,
    pub logs_dir: PathBuf,
    pub executor_stdout_path: PathBuf,
    pub executor_stderr_path: PathBuf,
}

impl ManagerPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let logs_dir = home.join("logs");
        Self {
            home: home.clone(),
            config_path: home.join("config.toml"),
            tasks_path: home.join("tasks_data.csv"),
            run_log_path: home.join("runs.jsonl"),
            logs_dir: logs_dir.clone(),
            executor_stdout_path: logs_dir.join("executor.out.log"),
            executor_stderr_path: logs_dir.join("executor.log"),
        }
    }

    /// Use `home` when given, otherwise the platform data directory.
    pub fn resolve(home: Option<&Path>) -> Result<Self> {
        match home {
            Some(home) => Ok(Self::new(home)),
            None => {
                let dirs = ProjectDirs::from("com", "life_manager", "Life Manager")
                    .ok_or_else(|| anyhow!("cannot determine a home directory for Life Manager"))?;
                Ok(Self::new(dirs.data_dir()))
            }
        }
    }

    /// Create the home and logs directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.home, &self.logs_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ManagerPaths::new(temp.path());

        assert!(paths.config_path.ends_with("config.toml"));
        assert!(paths.tasks_path.ends_with("tasks_data.csv"));
        assert!(paths.run_log_path.ends_with("runs.jsonl"));
        assert!(paths.executor_stderr_path.ends_with(Path::new("logs/executor.log")));
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ManagerPaths::resolve(Some(&temp.path().join("home"))).expect("resolve");
        paths.ensure_dirs().expect("ensure");
        assert!(paths.home.is_dir());
        assert!(paths.logs_dir.is_dir());
    }
}
