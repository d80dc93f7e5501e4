use std::fmt;

/// Lifecycle state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    Preparing,
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
    /// The background task was lost (panicked or cancelled by the runtime).
    Aborted,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Stopped
                | TransferStatus::Completed
                | TransferStatus::Failed
                | TransferStatus::Aborted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Preparing => "PREPARING",
            TransferStatus::Running => "RUNNING",
            TransferStatus::Paused => "PAUSED",
            TransferStatus::Stopped => "STOPPED",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
            TransferStatus::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
