//! Hot-reloadable handle→domain mapping registry.
//!
//! The registry owns an in-memory table mapping lowercased handles to
//! ordered sets of lowercased domains, sourced from a comma-separated
//! text file. A timer-driven task reloads the file on an interval.
//!
//! # Snapshot swap
//!
//! Lookups must observe either the pre-reload or the post-reload table in
//! full, never a partially-populated intermediate. The table lives behind
//! `RwLock<Arc<..>>`: readers clone the `Arc` (the lock is held only for
//! the pointer copy) and a successful reload replaces the whole pointer.
//! A failed reload leaves the previous table untouched.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// The mapping table: lowercased handle → ordered lowercased domain set.
pub type DomainTable = HashMap<String, BTreeSet<String>>;

/// Configuration for the domain registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Path to the mapping source file.
    pub path: PathBuf,

    /// How often the periodic task reloads the file.
    pub reload_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/domains.csv"),
            reload_interval: Duration::from_secs(300),
        }
    }
}

/// Hot-reloadable handle→domain mapping registry.
///
/// Thread-safe: share via `Arc<DomainRegistry>`. The classifier reads,
/// the reload task writes; neither blocks the other beyond a pointer swap.
pub struct DomainRegistry {
    config: RegistryConfig,
    table: RwLock<Arc<DomainTable>>,
    reload_task: Mutex<Option<JoinHandle<()>>>,
}

impl DomainRegistry {
    /// Create a registry with an empty table. Call [`load`](Self::load) or
    /// [`start_periodic_reload`](Self::start_periodic_reload) to populate it.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            table: RwLock::new(Arc::new(DomainTable::new())),
            reload_task: Mutex::new(None),
        }
    }

    /// Reload the mapping table from the source file.
    ///
    /// On success the whole table is swapped atomically and the number of
    /// handles is returned. On any I/O failure the previous table is kept
    /// and the condition is logged, not raised; malformed rows are skipped
    /// with a warning and never abort the load.
    pub fn load(&self) -> usize {
        let contents = match std::fs::read_to_string(&self.config.path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(
                    path = %self.config.path.display(),
                    error = %e,
                    "mapping file unreadable, keeping previous table"
                );
                metrics::counter!("registry_reload_failures_total").increment(1);
                return self.len();
            }
        };

        let table = parse_table(&contents);
        let entries = table.len();
        *self.table.write() = Arc::new(table);

        metrics::counter!("registry_reloads_total").increment(1);
        metrics::gauge!("registry_entries").set(entries as f64);
        tracing::debug!(entries, "mapping table reloaded");
        entries
    }

    /// Look up the domain set for a handle. Case-insensitive; unknown
    /// handles get an empty set.
    pub fn lookup(&self, handle: &str) -> BTreeSet<String> {
        let snapshot = self.snapshot();
        snapshot
            .get(&handle.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Capture the current table snapshot.
    pub fn snapshot(&self) -> Arc<DomainTable> {
        self.table.read().clone()
    }

    /// Number of handles in the current table.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the timer-driven reload task.
    ///
    /// Performs an immediate load, then reloads on the configured interval.
    /// Failures inside one cycle never stop subsequent cycles. Calling this
    /// twice replaces the previous task.
    pub fn start_periodic_reload(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        let interval = self.config.reload_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.load();
            }
        });

        if let Some(previous) = self.reload_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the periodic reload task. Safe to call when never started.
    pub fn stop(&self) {
        if let Some(handle) = self.reload_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for DomainRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Parse mapping-file contents into a fresh table.
///
/// Format: comma-separated rows, first column handle, second column domain,
/// both case-folded on load. `#` comment lines, blank lines, and an
/// optional `handle,domain` header row are skipped. Rows with fewer than
/// two non-empty fields are skipped with a warning.
fn parse_table(contents: &str) -> DomainTable {
    let mut table = DomainTable::new();

    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split(',').map(str::trim).filter(|f| !f.is_empty());
        let (Some(handle), Some(domain)) = (fields.next(), fields.next()) else {
            tracing::warn!(line = line_num + 1, "mapping row has fewer than two fields, skipping");
            continue;
        };

        let handle = handle.to_ascii_lowercase();
        let domain = domain.to_ascii_lowercase();

        // Optional header row
        if handle == "handle" && domain == "domain" {
            continue;
        }

        table.entry(handle).or_default().insert(domain);
    }

    table
}
