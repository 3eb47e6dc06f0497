//! Paged bulk exchange with ack backpressure
//!
//! ```text
//!   requester                         responder
//!      | Exchange{requests}               |
//!      |--------------------------------->|
//!      |          Exchange{responses: p1} |
//!      |<---------------------------------|
//!      | Misc{SIG_RECEIVED}               |
//!      |--------------------------------->|   next page only after the ack
//!      |          Exchange{responses: p2} |
//!      |<---------------------------------|
//!      | Misc{SIG_RECEIVED}               |
//!      |--------------------------------->|
//!      |                              Eom |
//!      |<---------------------------------|
//! ```
//!
//! Received pages are replayed in causal order and saved with the sender's
//! ids and links, so both logs end up holding the same chain.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use verifier_core::OptimismSignature;
use verifier_network::{Envelope, EnvelopeStream, ExchangeRequest, NetworkError, SignatureExchange};
use verifier_storage::{CausalBatch, LogError, NewSignature, SequentialFinder, SignatureQuery};

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::stats::ApplyOutcome;

/// Responder: stream every requested record, one acked page at a time, then Eom
pub async fn serve_exchange<S>(
    stream: &mut EnvelopeStream<S>,
    ctx: &SyncContext,
    requests: &[ExchangeRequest],
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let page_size = ctx.config.exchange_page_size.max(1);
    let timeout = ctx.config.stream_timeout();
    let max_send = ctx.config.inbound.max_send_time();
    let mut sent = 0;

    for request in requests {
        let mut after = request.id_after;
        loop {
            let query = SignatureQuery::new()
                .signer(request.signer)
                .id_after(after)
                .limit(page_size);
            let page = ctx.log.find(&query);
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);
            let full = page.len() == page_size;
            sent += page.len();

            send_bounded(stream, &Envelope::exchange_response(page), max_send).await?;
            ctx.stats.write().pages_sent += 1;

            let ack = stream.recv_timeout(timeout).await?;
            if !ack.is_received_ack() {
                return Err(SyncError::unexpected("Misc", ack.kind()));
            }
            if !full {
                break;
            }
        }
    }

    send_bounded(stream, &Envelope::Eom, max_send).await?;
    tracing::debug!("Served {} records for {} requests", sent, requests.len());
    Ok(sent)
}

async fn send_bounded<S>(stream: &mut EnvelopeStream<S>, envelope: &Envelope, limit: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(limit, stream.send(envelope)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(NetworkError::Timeout(limit).into()),
    }
}

/// Requester: send `requests`, apply and ack each page until Eom
pub async fn request_exchange<S>(
    stream: &mut EnvelopeStream<S>,
    ctx: &SyncContext,
    requests: Vec<ExchangeRequest>,
) -> Result<ApplyOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let timeout = ctx.config.stream_timeout();
    let mut outcome = ApplyOutcome::default();

    stream.send(&Envelope::exchange_request(requests)).await?;
    loop {
        match stream.recv_timeout(timeout).await? {
            Envelope::SignatureExchange(SignatureExchange {
                responses: Some(page),
                ..
            }) => {
                outcome.merge(apply_records(ctx, page));
                ctx.stats.write().pages_received += 1;
                stream.send(&Envelope::received_ack()).await?;
            }
            Envelope::Eom => break,
            other => return Err(SyncError::unexpected("SignatureExchange", other.kind())),
        }
    }
    Ok(outcome)
}

/// Verify and save remote records, parents before children.
///
/// Records that fail verification or whose link does not match the local
/// tip are logged and skipped; the rest of the batch is still applied. A
/// record identical to the stored one is only counted as known; a changed
/// record with a known id is saved so the tuple update replicates.
pub fn apply_records(ctx: &SyncContext, records: Vec<OptimismSignature>) -> ApplyOutcome {
    let batch = CausalBatch::new(records);
    let mut outcome = ApplyOutcome::default();

    for level in SequentialFinder::new(&batch, None) {
        for record in level {
            if ctx.log.find_by_id(&record.id).as_ref() == Some(&record) {
                outcome.known += 1;
                continue;
            }
            if let Err(e) = ctx.verifier.verify(&record) {
                tracing::warn!("Rejected signature {} from {}: {}", record.id, record.signer, e);
                outcome.rejected += 1;
                continue;
            }
            let id = record.id;
            match ctx.log.save(NewSignature::from_remote(record)) {
                Ok(_) => outcome.applied += 1,
                Err(e @ LogError::Overtaking { .. }) => {
                    tracing::debug!("Skipped signature {}: {}", id, e);
                    outcome.overtaken += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to save signature {}: {}", id, e);
                    outcome.rejected += 1;
                }
            }
        }
    }

    outcome.record(&mut ctx.stats.write());
    outcome
}
