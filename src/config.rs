//! Configuration for a [`crate::reader::DirDataReader`].

use serde::Deserialize;

fn default_dht_threads() -> usize {
    4
}

fn default_dht_queue_size() -> usize {
    256
}

fn default_max_batch_size() -> usize {
    32
}

fn default_update_interval_ms() -> u64 {
    10_000
}

fn default_dir_namespace() -> String {
    "dir".to_string()
}

/// Configuration for the directory cache pipeline.
///
/// This type is immutable once constructed. Build one with
/// [`DirCacheConfigBuilder`], `Default::default()`, or by deserializing it
/// with `serde`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DirCacheConfig {
    /// Worker thread count for the batch queue processor.
    #[serde(default = "default_dht_threads")]
    pub dht_threads: usize,

    /// Bounded queue capacity for fetch requests awaiting a batch.
    #[serde(default = "default_dht_queue_size")]
    pub dht_queue_size: usize,

    /// Upper bound on the number of keys fetched in a single multi-get.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// How long a cached entry may go without a remote refresh before
    /// [`crate::reader::DirDataReader::get_dir_data`] schedules one.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// The key-value store namespace directory blobs are stored under.
    #[serde(default = "default_dir_namespace")]
    pub dir_namespace: String,
}

impl Default for DirCacheConfig {
    fn default() -> Self {
        Self {
            dht_threads: default_dht_threads(),
            dht_queue_size: default_dht_queue_size(),
            max_batch_size: default_max_batch_size(),
            update_interval_ms: default_update_interval_ms(),
            dir_namespace: default_dir_namespace(),
        }
    }
}

impl DirCacheConfig {
    /// Start building a config from defaults.
    pub fn builder() -> DirCacheConfigBuilder {
        DirCacheConfigBuilder::default()
    }
}

/// A builder for [`DirCacheConfig`].
#[derive(Debug, Default, Clone)]
pub struct DirCacheConfigBuilder {
    config: DirCacheConfigOverrides,
}

#[derive(Debug, Default, Clone)]
struct DirCacheConfigOverrides {
    dht_threads: Option<usize>,
    dht_queue_size: Option<usize>,
    max_batch_size: Option<usize>,
    update_interval_ms: Option<u64>,
    dir_namespace: Option<String>,
}

impl DirCacheConfigBuilder {
    /// Override the worker thread count.
    pub fn dht_threads(mut self, n: usize) -> Self {
        self.config.dht_threads = Some(n);
        self
    }

    /// Override the bounded queue capacity.
    pub fn dht_queue_size(mut self, n: usize) -> Self {
        self.config.dht_queue_size = Some(n);
        self
    }

    /// Override the per-batch key limit.
    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.config.max_batch_size = Some(n);
        self
    }

    /// Override the refresh threshold, in milliseconds.
    pub fn update_interval_ms(mut self, n: u64) -> Self {
        self.config.update_interval_ms = Some(n);
        self
    }

    /// Override the key-value store namespace.
    pub fn dir_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.dir_namespace = Some(namespace.into());
        self
    }

    /// Finish building, falling back to defaults for anything not set.
    pub fn build(self) -> DirCacheConfig {
        let defaults = DirCacheConfig::default();
        DirCacheConfig {
            dht_threads: self.config.dht_threads.unwrap_or(defaults.dht_threads),
            dht_queue_size: self
                .config
                .dht_queue_size
                .unwrap_or(defaults.dht_queue_size),
            max_batch_size: self
                .config
                .max_batch_size
                .unwrap_or(defaults.max_batch_size),
            update_interval_ms: self
                .config
                .update_interval_ms
                .unwrap_or(defaults.update_interval_ms),
            dir_namespace: self
                .config
                .dir_namespace
                .unwrap_or(defaults.dir_namespace),
        }
    }
}
