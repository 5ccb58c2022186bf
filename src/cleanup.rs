//! Interruption cleanup for partially written staging paths.

use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::runtime::Runtime;

/// Tracks paths that need cleanup on interruption
#[derive(Default, Debug)]
pub struct CleanupContext {
    #[cfg(test)]
    pub paths: Vec<PathBuf>,
    #[cfg(not(test))]
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path to be cleaned up on interruption
    pub fn add(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Remove a path from cleanup list (e.g., when operation succeeds)
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Best-effort removal of every registered path.
    pub fn cleanup<R: Runtime + ?Sized>(&mut self, runtime: &R) {
        for path in self.paths.drain(..) {
            debug!("Cleaning up: {:?}", path);
            let result = if runtime.is_dir(&path) {
                runtime.remove_dir_all(&path)
            } else if runtime.exists(&path) {
                runtime.remove_file(&path)
            } else {
                Ok(())
            };
            if let Err(e) = result {
                warn!("Failed to clean up {:?}: {:#}", path, e);
            }
        }
    }
}

/// Type alias for shared cleanup context
pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

/// Create a new shared cleanup context
pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Locks the context, recovering it if a panicking thread poisoned the mutex.
pub fn lock(ctx: &SharedCleanupContext) -> MutexGuard<'_, CleanupContext> {
    ctx.lock().unwrap_or_else(|e| e.into_inner())
}

/// RAII guard that registers a path for cleanup until marked successful
pub struct CleanupGuard {
    ctx: SharedCleanupContext,
    path: PathBuf,
}

impl CleanupGuard {
    /// Create a new cleanup guard and register the path
    pub fn new(ctx: SharedCleanupContext, path: PathBuf) -> Self {
        lock(&ctx).add(path.clone());
        Self { ctx, path }
    }

    /// Mark the operation as successful, removing the path from cleanup
    pub fn success(self) {
        lock(&self.ctx).remove(&self.path);
    }
}

/// Spawns a task that removes everything registered in `ctx` and exits
/// with status 130 when Ctrl-C arrives. Abort the handle once the guarded
/// operation finishes.
pub fn spawn_interrupt_handler<R: Runtime + 'static>(
    runtime: Arc<R>,
    ctx: SharedCleanupContext,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cleaning up...");
            lock(&ctx).cleanup(runtime.as_ref());
            std::process::exit(130); // Standard exit code for Ctrl-C
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_cleanup_context_add_remove() {
        let mut ctx = CleanupContext::new();
        let path = PathBuf::from("/tmp/.staging/pkg-1.0.0");

        ctx.add(path.clone());
        ctx.add(path.clone());
        assert_eq!(ctx.paths.len(), 1);

        ctx.remove(&path);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_cleanup_removes_files_and_dirs() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("pkg-1.0.0.tgz");
        let staging = dir.path().join(".staging").join("pkg-1.0.0");
        fs::write(&file_path, "partial").unwrap();
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("package.json"), "{}").unwrap();

        let mut ctx = CleanupContext::new();
        ctx.add(file_path.clone());
        ctx.add(staging.clone());
        ctx.add(dir.path().join("never-created"));

        ctx.cleanup(&RealRuntime);

        assert!(!file_path.exists());
        assert!(!staging.exists());
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_cleanup_continues_after_failure() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| true);
        runtime
            .expect_remove_dir_all()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("permission denied")));

        let mut ctx = CleanupContext::new();
        ctx.add(PathBuf::from("/a"));
        ctx.add(PathBuf::from("/b"));
        ctx.cleanup(&runtime);

        assert!(ctx.is_empty());
    }

    #[test]
    fn test_cleanup_guard_success() {
        let ctx = new_shared();
        let path = PathBuf::from("/tmp/.staging/pkg");

        let guard = CleanupGuard::new(Arc::clone(&ctx), path);
        assert_eq!(lock(&ctx).paths.len(), 1);
        guard.success();

        assert!(lock(&ctx).is_empty());
    }

    #[test]
    fn test_cleanup_guard_drop_without_success() {
        let ctx = new_shared();

        {
            let _guard = CleanupGuard::new(Arc::clone(&ctx), PathBuf::from("/tmp/x"));
        }

        // Path stays registered so an interrupt can still remove it
        assert_eq!(lock(&ctx).paths.len(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_handler_can_be_aborted() {
        let handle = spawn_interrupt_handler(Arc::new(RealRuntime), new_shared());
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
