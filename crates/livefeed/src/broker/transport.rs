use livefeed_protocol::{PushPayload, codec};
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a push transport could not be opened.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The platform has no push primitive at all. Not a failure: callers
    /// must fall back to polling.
    #[error("push transport unsupported")]
    Unsupported,

    #[error("connect failed: {0}")]
    Failed(String),
}

/// Opens the long-lived push stream. This is the capability seam: a real
/// implementation issues a streaming HTTP request and hands back its body
/// reader; an unsupported platform reports so before any attach happens.
pub trait PushConnector: Send + Sync + 'static {
    type Stream: AsyncBufRead + Unpin + Send + 'static;

    /// Cheap capability probe, checked before opening.
    fn supported(&self) -> bool;

    fn open(&self, url: &str)
    -> impl Future<Output = Result<Self::Stream, ConnectError>> + Send;
}

impl<C: PushConnector> PushConnector for std::sync::Arc<C> {
    type Stream = C::Stream;

    fn supported(&self) -> bool {
        (**self).supported()
    }

    fn open(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Stream, ConnectError>> + Send {
        (**self).open(url)
    }
}

/// What the stream reader task reports back to the broker.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    Payload(PushPayload),
    /// Transport-level failure. The reader exits; no automatic retry.
    Error(String),
    /// Server closed the stream (EOF).
    Closed,
}

/// Spawn the background task that decodes the push stream into payloads.
///
/// Malformed lines are logged and skipped; they must never tear the stream
/// down for every attached tab. The task exits on EOF, IO error, reader
/// cancellation, or a gone broker.
pub(crate) fn spawn_stream_reader<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(event = "feed.transport.reader_cancelled");
                    return;
                }
                next = codec::read_payload_skipping::<_, PushPayload, _>(&mut reader, |e| {
                    warn!(event = "feed.transport.payload_skipped", error = %e);
                }) => next,
            };

            match next {
                Ok(Some(payload)) => {
                    if tx.send(TransportEvent::Payload(payload)).is_err() {
                        return; // broker gone
                    }
                }
                Ok(None) => {
                    debug!(event = "feed.transport.stream_closed");
                    let _ = tx.send(TransportEvent::Closed);
                    return;
                }
                Err(e) => {
                    warn!(event = "feed.transport.stream_failed", error = %e);
                    let _ = tx.send(TransportEvent::Error(e.to_string()));
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use livefeed_protocol::{NotificationCount, write_payload};
    use tokio::io::{AsyncWriteExt, BufReader};

    use super::*;

    #[tokio::test]
    async fn test_reader_decodes_payloads_in_order() {
        let (server, client) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_stream_reader(BufReader::new(client), tx, CancellationToken::new());

        let mut server = server;
        for new in [1u64, 2, 3] {
            write_payload(
                &mut server,
                &PushPayload::NotificationCount {
                    data: NotificationCount { new },
                },
            )
            .await
            .unwrap();
        }

        for expected in [1u64, 2, 3] {
            match rx.recv().await.unwrap() {
                TransportEvent::Payload(PushPayload::NotificationCount { data }) => {
                    assert_eq!(data.new, expected);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_reader_skips_garbage_lines() {
        let (mut server, client) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_stream_reader(BufReader::new(client), tx, CancellationToken::new());

        server.write_all(b"{ nonsense\n\n").await.unwrap();
        write_payload(
            &mut server,
            &PushPayload::NotificationCount {
                data: NotificationCount { new: 7 },
            },
        )
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            TransportEvent::Payload(PushPayload::NotificationCount { data }) => {
                assert_eq!(data.new, 7);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reader_reports_eof_as_closed() {
        let (server, client) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_stream_reader(BufReader::new(client), tx, CancellationToken::new());

        drop(server);

        match rx.recv().await.unwrap() {
            TransportEvent::Closed => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reader_stops_on_cancel() {
        let (_server, client) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn_stream_reader(BufReader::new(client), tx, cancel.clone());

        cancel.cancel();
        handle.await.unwrap();
        // No terminal event on deliberate teardown.
        assert!(rx.try_recv().is_err());
    }
}
