//! Filesystem workspace
//!
//! A temporary root owned by the orchestrator for its whole lifetime:
//!
//! ```text
//! shipyard-XXXXXX/
//!   repository/<name>   bare repository clients push to
//!   workspace/          working tree the pipeline builds from
//!   execs/              artifacts and captured release output
//! ```

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{error, info};

pub struct Store {
    root: TempDir,
    repository: PathBuf,
    workspace: PathBuf,
    execs: PathBuf,
}

impl Store {
    /// Creates the directory layout under the system temporary directory
    pub fn create(repository: &str) -> io::Result<Self> {
        let root = tempfile::Builder::new().prefix("shipyard-").tempdir()?;
        Self::layout(root, repository)
    }

    /// Creates the directory layout under `parent`
    pub fn create_in(parent: impl AsRef<Path>, repository: &str) -> io::Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("shipyard-")
            .tempdir_in(parent)?;
        Self::layout(root, repository)
    }

    fn layout(root: TempDir, repository: &str) -> io::Result<Self> {
        let repository_dir = root.path().join("repository");
        let workspace = root.path().join("workspace");
        let execs = root.path().join("execs");

        std::fs::create_dir_all(&repository_dir)?;
        std::fs::create_dir_all(&workspace)?;
        std::fs::create_dir_all(&execs)?;

        info!("Store created at {}", root.path().display());

        Ok(Self {
            repository: repository_dir.join(repository),
            workspace,
            execs,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Path of the bare repository
    pub fn repository(&self) -> &Path {
        &self.repository
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn execs(&self) -> &Path {
        &self.execs
    }

    /// Removes the whole tree; failures are logged
    pub fn delete(self) {
        let path = self.root.path().to_path_buf();
        match self.root.close() {
            Ok(()) => info!("Store {} deleted", path.display()),
            Err(e) => error!("Failed to delete store {}: {}", path.display(), e),
        }
    }
}
