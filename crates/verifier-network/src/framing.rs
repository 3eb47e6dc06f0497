//! Length-delimited envelope framing over any ordered byte stream
//!
//! Wraps a bidirectional stream in tokio-util's `LengthDelimitedCodec` so
//! callers exchange whole [`Envelope`]s without manual buffer management.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::{NetworkError, Result};
use crate::message::Envelope;

/// Largest accepted frame
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

pub struct EnvelopeStream<S> {
    inner: Framed<S, LengthDelimitedCodec>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> EnvelopeStream<S> {
    pub fn new(io: S) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_LENGTH)
            .new_codec();
        Self {
            inner: Framed::new(io, codec),
        }
    }

    /// Send one envelope and flush it
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let bytes = envelope.encode()?;
        SinkExt::<Bytes>::send(&mut self.inner, Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Next envelope, or `None` when the peer closed its side cleanly
    pub async fn recv(&mut self) -> Result<Option<Envelope>> {
        match self.inner.next().await {
            Some(Ok(frame)) => Envelope::decode(&frame).map(Some),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Next envelope within `timeout`; a closed stream is an error here
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Envelope> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Ok(Some(envelope))) => Ok(envelope),
            Ok(Ok(None)) => Err(NetworkError::StreamClosed),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(NetworkError::Timeout(timeout)),
        }
    }

    /// Flush and shut down the write side
    pub async fn close(&mut self) -> Result<()> {
        SinkExt::<Bytes>::close(&mut self.inner).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MISC_SIG_RECEIVED;

    #[tokio::test]
    async fn test_envelopes_cross_duplex() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = EnvelopeStream::new(a);
        let mut right = EnvelopeStream::new(b);

        left.send(&Envelope::received_ack()).await.unwrap();
        left.send(&Envelope::Eom).await.unwrap();

        let first = right.recv().await.unwrap().unwrap();
        assert!(matches!(first, Envelope::Misc(m) if m.code == MISC_SIG_RECEIVED));
        assert_eq!(right.recv().await.unwrap(), Some(Envelope::Eom));
    }

    #[tokio::test]
    async fn test_close_yields_none_then_closed_error() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = EnvelopeStream::new(a);
        let mut right = EnvelopeStream::new(b);

        left.close().await.unwrap();
        drop(left);
        assert_eq!(right.recv().await.unwrap(), None);

        let (c, d) = tokio::io::duplex(1024);
        let mut writer = EnvelopeStream::new(c);
        writer.close().await.unwrap();
        let mut reader = EnvelopeStream::new(d);
        assert!(matches!(
            reader.recv_timeout(Duration::from_secs(1)).await,
            Err(NetworkError::StreamClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_on_silent_peer() {
        let (a, _b) = tokio::io::duplex(1024);
        let mut stream = EnvelopeStream::new(a);
        let result = stream.recv_timeout(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(NetworkError::Timeout(_))));
    }
}
