use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::control::Control;
use super::{PARTS_IN_FLIGHT, Part, TransferPool};
use crate::{Error, Result};

/// Run `work` for every part with at most [`PARTS_IN_FLIGHT`] parts in
/// flight, each part holding one permit of `pool`.
///
/// `work` resolves to the number of bytes to credit for the part. The first
/// failure stops submission; on a stop request in-flight parts are drained,
/// on any other failure they are cancelled.
pub(crate) async fn run_parts<F, Fut>(
    control: &Arc<Control>,
    pool: &TransferPool,
    parts: Vec<Part>,
    work: F,
) -> Result<()>
where
    F: Fn(Part) -> Fut,
    Fut: Future<Output = Result<u64>> + Send + 'static,
{
    let mut pending = parts.into_iter();
    let mut in_flight: FuturesUnordered<JoinHandle<Result<u64>>> = FuturesUnordered::new();
    let mut failure: Option<Error> = None;

    loop {
        while failure.is_none() && in_flight.len() < PARTS_IN_FLIGHT {
            let Some(part) = pending.next() else {
                break;
            };
            if let Err(e) = control.checkpoint().await {
                failure = Some(e);
                break;
            }
            let job = work(part);
            let pool = pool.clone();
            let control = control.clone();
            in_flight.push(tokio::spawn(async move {
                let _permit = pool.acquire().await?;
                control.checkpoint().await?;
                job.await
            }));
        }

        let Some(joined) = in_flight.next().await else {
            break;
        };
        let outcome = joined
            .map_err(|e| Error::Internal(format!("transfer worker lost: {}", e)))
            .and_then(|result| result);
        match outcome {
            Ok(bytes) => control.part_done(bytes),
            Err(e) => {
                if !matches!(e, Error::TransferStopped) {
                    for handle in in_flight.iter() {
                        handle.abort();
                    }
                }
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None if control.stop_requested() => Err(Error::TransferStopped),
        None => Ok(()),
    }
}
