/// Policy file hot reload
///
/// Polls the policy file's modification time and swaps a freshly parsed
/// table into the registry whenever it changes. A file that fails to parse
/// leaves the previous table in place.

use super::{PolicyError, PolicyRegistry, PolicyTable};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct PolicyWatcher {
    path: PathBuf,
    registry: PolicyRegistry,
    interval: Duration,
    last_modified: Option<SystemTime>,
}

impl PolicyWatcher {
    pub fn new(path: PathBuf, registry: PolicyRegistry, interval: Duration) -> Self {
        Self {
            path,
            registry,
            interval,
            last_modified: None,
        }
    }

    /// Read and install the policy file immediately
    pub async fn load(&mut self) -> Result<usize, PolicyError> {
        let modified = self.modified().await?;
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PolicyError::Read(e.to_string()))?;
        let table = PolicyTable::from_toml(&contents)?;
        let count = table.len();

        self.registry.replace(table);
        self.last_modified = Some(modified);

        info!("Loaded {} namespace policies from {:?}", count, self.path);
        Ok(count)
    }

    /// Reload the file if its modification time moved since the last load
    ///
    /// Returns `true` when a new table was installed.
    pub async fn reload_if_changed(&mut self) -> Result<bool, PolicyError> {
        let modified = self.modified().await?;
        if self.last_modified == Some(modified) {
            return Ok(false);
        }

        self.load().await?;
        Ok(true)
    }

    /// Poll until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reload_if_changed().await {
                        Ok(true) => debug!("Policy table reloaded"),
                        Ok(false) => {}
                        Err(e) => warn!("Keeping previous policy table: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Policy watcher stopped");
                        return;
                    }
                }
            }
        }
    }

    async fn modified(&self) -> Result<SystemTime, PolicyError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| PolicyError::Read(e.to_string()))?;
        metadata
            .modified()
            .map_err(|e| PolicyError::Read(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SECURE: &str = r#"
[namespaces."secure"]
algorithm = "ed25519"
public_key = "aa"
read_only = true
"#;

    #[tokio::test]
    async fn test_load_installs_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SECURE.as_bytes()).unwrap();

        let registry = PolicyRegistry::empty();
        let mut watcher = PolicyWatcher::new(
            file.path().to_path_buf(),
            registry.clone(),
            Duration::from_secs(1),
        );

        assert_eq!(watcher.load().await.unwrap(), 1);
        assert!(registry.lookup("secure", "").read_only);

        // Unchanged file is not reloaded
        assert!(!watcher.reload_if_changed().await.unwrap());
    }

    #[tokio::test]
    async fn test_bad_file_keeps_previous_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SECURE.as_bytes()).unwrap();

        let registry = PolicyRegistry::empty();
        let mut watcher = PolicyWatcher::new(
            file.path().to_path_buf(),
            registry.clone(),
            Duration::from_secs(1),
        );
        watcher.load().await.unwrap();

        std::fs::write(file.path(), "this is [not toml").unwrap();
        watcher.last_modified = None;

        assert!(watcher.reload_if_changed().await.is_err());
        assert!(registry.lookup("secure", "").read_only);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let mut watcher = PolicyWatcher::new(
            PathBuf::from("/nonexistent/dirnet-policy.toml"),
            PolicyRegistry::empty(),
            Duration::from_secs(1),
        );

        assert!(matches!(watcher.load().await, Err(PolicyError::Read(_))));
    }
}
