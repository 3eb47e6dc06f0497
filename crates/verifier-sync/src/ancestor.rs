//! Common-ancestor search
//!
//! The requester walks its own chain for one signer from the tip backwards,
//! `page_size` pointers at a time, and asks the peer which of them it also
//! holds. The first hit is the newest shared record; an exhausted chain means
//! the peers share nothing for that signer.
//!
//! ```text
//!   requester                       responder
//!      | FindCommon{locals: p1..p50}    |
//!      |------------------------------->|
//!      |            FindCommon{found: -}|
//!      |<-------------------------------|
//!      | FindCommon{locals: p51..p100}  |
//!      |------------------------------->|
//!      |          FindCommon{found: p73}|
//!      |<-------------------------------|
//! ```

use tokio::io::{AsyncRead, AsyncWrite};
use verifier_core::{Address, SignaturePointer};
use verifier_network::{Envelope, EnvelopeStream, FindCommonSignature};
use verifier_storage::SignatureLog;

use crate::context::SyncContext;
use crate::error::{Result, SyncError};

/// Find the newest record of `signer` held by both sides
pub async fn find_common_ancestor<S>(
    stream: &mut EnvelopeStream<S>,
    ctx: &SyncContext,
    signer: &Address,
) -> Result<Option<SignaturePointer>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let page_size = ctx.config.finder_page_size.max(1);
    let timeout = ctx.config.stream_timeout();
    let mut offset = 0;

    loop {
        let page = ctx.log.latest_by_signer(signer, page_size, offset);
        if page.is_empty() {
            tracing::debug!("No common ancestor for {} after {} records", signer, offset);
            return Ok(None);
        }
        offset += page.len();

        let locals = page.iter().map(|r| r.pointer()).collect();
        stream.send(&Envelope::find_request(locals)).await?;
        ctx.stats.write().find_requests_sent += 1;

        match stream.recv_timeout(timeout).await? {
            Envelope::FindCommonSignature(FindCommonSignature {
                found: Some(found), ..
            }) => {
                tracing::debug!("Common ancestor for {}: {}", signer, found.id);
                return Ok(Some(found));
            }
            Envelope::FindCommonSignature(_) => continue,
            other => return Err(SyncError::unexpected("FindCommonSignature", other.kind())),
        }
    }
}

/// Responder side: the first of `locals` this log also holds, as stored here
pub fn find_common(log: &SignatureLog, locals: &[SignaturePointer]) -> Option<SignaturePointer> {
    locals
        .iter()
        .find_map(|pointer| log.find_by_id(&pointer.id))
        .map(|record| record.pointer())
}
