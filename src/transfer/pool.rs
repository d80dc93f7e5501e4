use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{Error, Result};

/// Bounded worker pool shared by every transfer of one [`Api`](crate::Api).
#[derive(Debug, Clone)]
pub struct TransferPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl TransferPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub(crate) async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("transfer pool closed".to_string()))
    }
}
