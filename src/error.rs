use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("invalid problem instance: {0}")]
    Instance(String),

    #[error("search aborted: {panics} node(s) panicked, explored tree is incomplete")]
    SearchAborted { panics: u64 },
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn instance<S: Into<String>>(msg: S) -> Self {
        Error::Instance(msg.into())
    }
}

/// Items handed back by a batch submission that did not fit in the queue.
///
/// This is backpressure, not a failure: the submitter is expected to run
/// the items itself.
pub struct Unsubmitted<W> {
    items: Vec<W>,
}

impl<W> Unsubmitted<W> {
    pub(crate) fn new(items: Vec<W>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The rejected items, in submission order.
    pub fn into_inner(self) -> Vec<W> {
        self.items
    }
}

impl<W> fmt::Debug for Unsubmitted<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubmitted")
            .field("items", &self.items.len())
            .finish()
    }
}

impl<W> fmt::Display for Unsubmitted<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} item(s) could not be submitted", self.items.len())
    }
}

impl<W> std::error::Error for Unsubmitted<W> {}
