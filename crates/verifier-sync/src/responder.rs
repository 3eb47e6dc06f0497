//! Inbound stream handling
//!
//! A peer may send any number of find-common requests, one exchange request
//! or an unsolicited page of records on a single stream; `Eom` ends it.

use tokio::io::{AsyncRead, AsyncWrite};
use verifier_network::{
    Envelope, EnvelopeStream, FindCommonSignature, NetworkError, PeerId, SignatureExchange,
};

use crate::ancestor::find_common;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::exchange::{apply_records, serve_exchange};

/// Serve one inbound stream until the peer sends Eom or goes away
pub async fn handle_stream<S>(ctx: &SyncContext, peer: PeerId, io: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = EnvelopeStream::new(io);
    let timeout = ctx.config.stream_timeout();

    loop {
        let envelope = match stream.recv_timeout(timeout).await {
            Ok(envelope) => envelope,
            Err(NetworkError::StreamClosed) => {
                tracing::trace!("Stream from {} closed", peer);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match envelope {
            Envelope::FindCommonSignature(FindCommonSignature {
                locals: Some(locals),
                ..
            }) => {
                let found = find_common(&ctx.log, &locals);
                ctx.stats.write().find_requests_served += 1;
                stream.send(&Envelope::find_response(found)).await?;
            }
            Envelope::SignatureExchange(SignatureExchange {
                requests: Some(requests),
                ..
            }) => {
                tracing::debug!("Exchange request from {} for {} signers", peer, requests.len());
                serve_exchange(&mut stream, ctx, &requests).await?;
            }
            Envelope::SignatureExchange(SignatureExchange {
                responses: Some(records),
                ..
            }) => {
                let outcome = apply_records(ctx, records);
                tracing::debug!("Pushed records from {}: {:?}", peer, outcome);
            }
            Envelope::Eom => {
                // peer may already have hung up
                let _ = stream.send(&Envelope::Eom).await;
                let _ = stream.close().await;
                return Ok(());
            }
            other => {
                return Err(SyncError::Protocol(format!(
                    "{} is not a valid request from {}",
                    other.kind(),
                    peer
                )))
            }
        }
    }
}
