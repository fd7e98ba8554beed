use crate::error::{Error, Result};
use crate::executor::PanicStrategy;

/// How a pooled node that finished on a foreign worker gets back to the
/// pool it was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStrategy {
    /// Send a small release job to the owning worker's targeted lane.
    Request,
    /// Deliver the finished item itself to the owning worker, which retires
    /// it locally.
    Resubmit,
}

impl Default for ReleaseStrategy {
    fn default() -> Self {
        ReleaseStrategy::Request
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: Option<usize>,
    pub max_queue_capacity: usize,
    pub pool_capacity_per_thread: usize,

    /// Children at recursion depth below this run inline.
    pub fork_depth_threshold: usize,
    /// Children smaller than this run inline.
    pub min_fork_size: usize,
    pub batch_submission: bool,
    pub release_strategy: ReleaseStrategy,
    pub panic_strategy: PanicStrategy,

    pub pin_workers: bool,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: None,
            max_queue_capacity: 10_000,
            pool_capacity_per_thread: 1024,
            fork_depth_threshold: 0,
            min_fork_size: 0,
            batch_submission: true,
            release_strategy: ReleaseStrategy::default(),
            panic_strategy: PanicStrategy::default(),
            pin_workers: false,
            stack_size: Some(8 * 1024 * 1024),
            thread_name_prefix: "forkbound-worker".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_threads {
            if n == 0 {
                return Err(Error::config("num_threads must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("num_threads too large (max 1024)"));
            }
        }

        if self.max_queue_capacity == 0 {
            return Err(Error::config("max_queue_capacity must be > 0"));
        }

        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        if let Some(size) = self.stack_size {
            if size < 64 * 1024 {
                return Err(Error::config("stack_size must be at least 64 KiB"));
            }
        }

        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get)
    }

    /// Whether a child at `depth` with `size` should go to the executor
    /// rather than recurse on the current thread.
    pub fn should_fork(&self, depth: usize, size: usize) -> bool {
        depth >= self.fork_depth_threshold && size >= self.min_fork_size
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.config.num_threads = Some(n);
        self
    }

    pub fn max_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.max_queue_capacity = capacity;
        self
    }

    pub fn pool_capacity_per_thread(mut self, capacity: usize) -> Self {
        self.config.pool_capacity_per_thread = capacity;
        self
    }

    pub fn fork_depth_threshold(mut self, depth: usize) -> Self {
        self.config.fork_depth_threshold = depth;
        self
    }

    /// Keep every child on the thread that created it.
    pub fn never_fork(mut self) -> Self {
        self.config.fork_depth_threshold = usize::MAX;
        self
    }

    pub fn min_fork_size(mut self, size: usize) -> Self {
        self.config.min_fork_size = size;
        self
    }

    pub fn batch_submission(mut self, enable: bool) -> Self {
        self.config.batch_submission = enable;
        self
    }

    pub fn release_strategy(mut self, strategy: ReleaseStrategy) -> Self {
        self.config.release_strategy = strategy;
        self
    }

    pub fn panic_strategy(mut self, strategy: PanicStrategy) -> Self {
        self.config.panic_strategy = strategy;
        self
    }

    pub fn pin_workers(mut self, pin: bool) -> Self {
        self.config.pin_workers = pin;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
