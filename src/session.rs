//! Session open/close around a traversal.

use tracing::{info, warn};

use crate::client::{BoardClient, BoardSession};
use crate::crawler::CrawlError;
use crate::retry::{with_retry, RetryPolicy};

/// Authenticate with the board archive, retrying per `policy`.
///
/// Exhaustion here is fatal: no traversal is attempted without a session.
pub async fn open<C: BoardClient>(
    client: &C,
    username: &str,
    password: &str,
    policy: RetryPolicy,
) -> Result<BoardSession, CrawlError> {
    let session = with_retry(policy, "authenticate", || {
        client.authenticate(username, password)
    })
    .await
    .map_err(CrawlError::Authentication)?;
    info!("Authenticated with board archive");
    Ok(session)
}

/// Close the session, best-effort.
///
/// A close failure is logged and dropped so it cannot mask whatever outcome
/// the traversal already produced.
pub async fn close<C: BoardClient>(client: &C, session: &BoardSession) {
    match client.end_session(session).await {
        Ok(()) => info!("Board session closed"),
        Err(e) => warn!(error = %e, "Failed to close board session"),
    }
}
