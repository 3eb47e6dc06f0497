//! Outbound sync session with one peer

use verifier_core::Address;
use verifier_network::{Envelope, EnvelopeStream, ExchangeRequest, PeerId, StreamTransport};

use crate::ancestor::find_common_ancestor;
use crate::context::SyncContext;
use crate::error::Result;
use crate::exchange::request_exchange;
use crate::stats::ApplyOutcome;

/// Pull everything `peer` has for `signers` that this node lacks.
///
/// One stream carries the whole session: a common-ancestor search per
/// signer, then a single exchange covering all of them, then Eom.
pub async fn sync_with_peer<T: StreamTransport>(
    ctx: &SyncContext,
    transport: &T,
    peer: PeerId,
    signers: &[Address],
) -> Result<ApplyOutcome> {
    let io = transport.open_stream(peer).await?;
    let mut stream = EnvelopeStream::new(io);
    ctx.stats.write().sessions_started += 1;

    let result = run_session(ctx, &mut stream, signers).await;

    let mut stats = ctx.stats.write();
    match &result {
        Ok(_) => stats.sessions_completed += 1,
        Err(_) => stats.sessions_failed += 1,
    }
    result
}

async fn run_session<S>(
    ctx: &SyncContext,
    stream: &mut EnvelopeStream<S>,
    signers: &[Address],
) -> Result<ApplyOutcome>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let margin = ctx.config.id_after_margin();
    let mut requests = Vec::with_capacity(signers.len());
    for signer in signers {
        let ancestor = find_common_ancestor(stream, ctx, signer).await?;
        requests.push(ExchangeRequest {
            signer: *signer,
            id_after: ancestor.map(|found| found.id.rewind(margin)),
        });
    }

    let outcome = request_exchange(stream, ctx, requests).await?;

    // the responder answers with its own Eom; nothing left to read
    let _ = stream.send(&Envelope::Eom).await;
    let _ = stream.close().await;
    Ok(outcome)
}
