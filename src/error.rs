//! Error types for queue operations.
//!
//! Store backends report failures as `anyhow::Error`; the queue layer wraps
//! them into [`Error::Store`] and adds the typed failures callers are
//! expected to match on.

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Queue errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The queue was created by an incompatible protocol version.
    #[error(
        "protocol version mismatch for queue '{queue}': expected {expected}, found {actual}"
    )]
    VersionMismatch {
        queue: String,
        expected: i64,
        actual: i64,
    },

    /// No queue registered with this name.
    #[error("no queue registered with this name: {name}")]
    QueueNotFound { name: String },

    /// No message with this identifier.
    #[error("no message with ID {id} in queue '{queue}'")]
    MessageNotFound { queue: String, id: u64 },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A consumer handler failed with an error that is not a retryable
    /// failure. The message stays in the processing subqueue.
    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    /// The backing store failed.
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl Error {
    /// Create a queue not found error.
    pub fn queue_not_found(name: impl Into<String>) -> Self {
        Self::QueueNotFound { name: name.into() }
    }

    /// Create a message not found error.
    pub fn message_not_found(queue: impl Into<String>, id: u64) -> Self {
        Self::MessageNotFound {
            queue: queue.into(),
            id,
        }
    }

    /// Returns true for lookup failures the administrative layer can report
    /// and move past.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::QueueNotFound { .. } | Self::MessageNotFound { .. }
        )
    }
}

/// Failure returned by a consumer handler.
///
/// Only [`HandlerError::Failed`] is handed to the retry strategy. Any other
/// error propagates out of `pop` as [`Error::Handler`].
///
/// `?` converts any `std::error::Error` into [`HandlerError::Other`].
/// `anyhow::Error` is not one, so map it with [`HandlerError::other`].
///
/// # Example
///
/// ```
/// use relq::{HandlerError, Queue, QueueOptions, store::Store};
///
/// fn validate(data: &[u8]) -> anyhow::Result<u32> {
///     Ok(std::str::from_utf8(data)?.trim().parse()?)
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> relq::Result<()> {
/// let queue = Queue::open(Store::memory(), "jobs", QueueOptions::default()).await?;
/// queue.push_many(["7", "0", "x"]).await?;
///
/// for _ in 0..3 {
///     let _ = queue
///         .pop_with(|data| async move {
///             let text = std::str::from_utf8(&data)?; // std error: `?` works
///             let n = validate(text.as_bytes()).map_err(HandlerError::other)?;
///             if n == 0 {
///                 return Err(HandlerError::failed("zero is not a job")); // retried
///             }
///             Ok::<(), HandlerError>(())
///         })
///         .await;
/// }
///
/// // "7" was consumed, "0" went back to pending, "x" stayed in processing
/// assert_eq!(queue.pending().size().await?, 1);
/// assert_eq!(queue.processing().size().await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub enum HandlerError {
    /// The message could not be processed; apply the retry strategy.
    Failed(String),

    /// Anything else.
    Other(anyhow::Error),
}

impl HandlerError {
    /// Create a retryable failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wrap an arbitrary error as an unrecognized failure.
    pub fn other(error: impl Into<anyhow::Error>) -> Self {
        Self::Other(error.into())
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(message) => f.write_str(message),
            Self::Other(error) => write!(f, "{error:#}"),
        }
    }
}

// No `std::error::Error` impl for `HandlerError`: it would overlap this one.
impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Other(anyhow::Error::new(error))
    }
}
