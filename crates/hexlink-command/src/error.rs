//! Error types for the command layer.

/// Errors that can occur while executing or queueing tasks.
///
/// Stale references are deliberately absent: a task naming an entity that
/// no longer exists is a no-op, not an error.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The simulation could not write a quick save.
    #[error("quick save failed: {0}")]
    SaveFailed(String),

    /// The executor side of the task queue is gone.
    #[error("task queue is closed")]
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            CommandError::SaveFailed("disk full".into()).to_string(),
            "quick save failed: disk full"
        );
        assert_eq!(CommandError::QueueClosed.to_string(), "task queue is closed");
    }
}
