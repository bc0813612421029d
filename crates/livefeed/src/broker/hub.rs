use std::collections::HashMap;
use std::sync::Arc;

use livefeed_protocol::{ControlMessage, FeedEvent, PushPayload};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::transport::{ConnectError, PushConnector, TransportEvent, spawn_stream_reader};
use crate::errors::FeedError;

/// Identifies one attached tab port within a session broker.
pub type PortId = u64;

/// Performs the post-logout redirect. The one outward-facing side effect
/// of the broker; everything else flows through ports.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, url: &str);
}

pub(crate) enum BrokerRequest {
    Attach { reply: oneshot::Sender<Port> },
    Control { port: PortId, message: ControlMessage },
}

/// Cheap, cloneable handle for attaching new tab ports to the session
/// broker. One handle per tab is the expected shape.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<BrokerRequest>,
}

impl BrokerHandle {
    /// Register a new port with the broker.
    ///
    /// Fails only if the broker task is gone, in which case the caller
    /// falls back to polling.
    pub async fn attach(&self) -> Result<Port, FeedError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BrokerRequest::Attach { reply: reply_tx })
            .map_err(|_| FeedError::BrokerUnavailable)?;
        reply_rx.await.map_err(|_| FeedError::BrokerUnavailable)
    }
}

/// One tab's endpoint of the session push channel.
///
/// Receives typed [`FeedEvent`]s; sends `start`/`close` control messages.
/// Dropping the port sends `close` (the unload hook), so the broker's
/// reference counting stays accurate even on abrupt teardown.
pub struct Port {
    id: PortId,
    events: mpsc::UnboundedReceiver<FeedEvent>,
    control: mpsc::UnboundedSender<BrokerRequest>,
    closed: bool,
}

impl Port {
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Next event from the broker. `None` once the broker has dropped this
    /// port (after `close`, logout teardown, or broker exit).
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Ask the broker to open the push transport. The first `start` of a
    /// session opens the shared connection; later ones reuse it.
    pub fn start(&self, url: &str) -> Result<(), FeedError> {
        self.send_control(ControlMessage::Start {
            url: url.to_string(),
        })
    }

    /// Detach from the broker. When the last port closes, the broker
    /// tears the shared transport down.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.send_control(ControlMessage::Close);
        }
    }

    fn send_control(&self, message: ControlMessage) -> Result<(), FeedError> {
        self.control
            .send(BrokerRequest::Control {
                port: self.id,
                message,
            })
            .map_err(|_| FeedError::BrokerUnavailable)
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.close();
    }
}

/// Spawn the session broker task and return the handle tabs attach with.
///
/// `landing_url` is where the navigator is pointed after a remote logout
/// observed with the `here` flag set.
pub fn spawn_broker<C>(connector: C, navigator: Arc<dyn Navigator>, landing_url: String) -> BrokerHandle
where
    C: PushConnector,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let broker = SessionBroker {
        connector,
        navigator,
        landing_url,
        requests: rx,
        request_tx: tx.clone(),
        ports: HashMap::new(),
        next_port_id: 1,
        transport: None,
    };
    tokio::spawn(broker.run());
    BrokerHandle { tx }
}

struct Transport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    cancel: CancellationToken,
}

/// The per-session broker: sole owner of the transport lifecycle and of
/// the attached-port set. Lives as long as any handle or port can still
/// reach it; the transport itself is opened on first `start` and closed
/// when the last port detaches (a later `start` reopens it).
struct SessionBroker<C: PushConnector> {
    connector: C,
    navigator: Arc<dyn Navigator>,
    landing_url: String,
    requests: mpsc::UnboundedReceiver<BrokerRequest>,
    /// Handed to every new port so its control messages land here too.
    request_tx: mpsc::UnboundedSender<BrokerRequest>,
    ports: HashMap<PortId, mpsc::UnboundedSender<FeedEvent>>,
    next_port_id: PortId,
    transport: Option<Transport>,
}

async fn next_transport_event(transport: &mut Option<Transport>) -> Option<TransportEvent> {
    match transport {
        Some(t) => t.events.recv().await,
        None => std::future::pending().await,
    }
}

impl<C: PushConnector> SessionBroker<C> {
    async fn run(mut self) {
        info!(event = "feed.broker.started");
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(BrokerRequest::Attach { reply }) => self.handle_attach(reply),
                    Some(BrokerRequest::Control { port, message }) => {
                        self.handle_control(port, message).await;
                    }
                    None => break, // every handle and port is gone
                },
                event = next_transport_event(&mut self.transport) => {
                    match event {
                        Some(event) => self.handle_transport_event(event),
                        None => self.transport = None,
                    }
                }
            }
        }
        self.close_transport();
        info!(event = "feed.broker.stopped");
    }

    fn handle_attach(&mut self, reply: oneshot::Sender<Port>) {
        let id = self.next_port_id;
        self.next_port_id += 1;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let port = Port {
            id,
            events: event_rx,
            control: self.request_tx.clone(),
            closed: false,
        };

        if reply.send(port).is_ok() {
            self.ports.insert(id, event_tx);
            debug!(
                event = "feed.broker.port_attached",
                port_id = id,
                port_count = self.ports.len(),
            );
        }
    }

    async fn handle_control(&mut self, port: PortId, message: ControlMessage) {
        match message {
            ControlMessage::Start { url } => {
                if self.transport.is_some() {
                    debug!(event = "feed.broker.transport_reused", port_id = port);
                    return;
                }
                self.open_transport(&url).await;
            }
            ControlMessage::Close => {
                if self.ports.remove(&port).is_some() {
                    debug!(
                        event = "feed.broker.port_detached",
                        port_id = port,
                        port_count = self.ports.len(),
                    );
                }
                if self.ports.is_empty() && self.transport.is_some() {
                    info!(event = "feed.broker.transport_closed_last_detach");
                    self.close_transport();
                }
            }
            other => {
                debug!(event = "feed.broker.control_ignored", message = ?other);
            }
        }
    }

    async fn open_transport(&mut self, url: &str) {
        if !self.connector.supported() {
            info!(event = "feed.broker.push_unsupported");
            self.fan_out(FeedEvent::NoEventSource);
            return;
        }

        match self.connector.open(url).await {
            Ok(reader) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let cancel = CancellationToken::new();
                spawn_stream_reader(reader, tx, cancel.clone());
                self.transport = Some(Transport { events: rx, cancel });
                info!(event = "feed.broker.transport_opened", url = url);
            }
            Err(ConnectError::Unsupported) => {
                info!(event = "feed.broker.push_unsupported");
                self.fan_out(FeedEvent::NoEventSource);
            }
            Err(e) => {
                warn!(event = "feed.broker.connect_failed", url = url, error = %e);
                self.fan_out(FeedEvent::Error {
                    data: e.to_string(),
                });
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Payload(PushPayload::NotificationCount { data }) => {
                self.fan_out(FeedEvent::NotificationCount { data });
            }
            TransportEvent::Payload(PushPayload::Stopwatches { data }) => {
                self.fan_out(FeedEvent::Stopwatches { data });
            }
            TransportEvent::Payload(PushPayload::Logout { data }) => {
                if data.here {
                    self.handle_logout();
                } else {
                    debug!(event = "feed.broker.logout_elsewhere_ignored");
                }
            }
            TransportEvent::Payload(PushPayload::Close) => {
                info!(event = "feed.broker.server_close");
                self.fan_out(FeedEvent::Close);
                self.close_transport();
            }
            TransportEvent::Payload(other) => {
                debug!(event = "feed.broker.payload_ignored", payload = ?other);
            }
            TransportEvent::Error(message) => {
                warn!(event = "feed.broker.transport_error", error = %message);
                self.fan_out(FeedEvent::Error { data: message });
                self.transport = None; // reader already exited; no auto-retry
            }
            TransportEvent::Closed => {
                info!(event = "feed.broker.transport_eof");
                self.fan_out(FeedEvent::Close);
                self.transport = None;
            }
        }
    }

    /// Remote logout observed for this session: tell every port, drop them
    /// all, tear the transport down, then navigate exactly once. Ports must
    /// be gone before navigation so nothing reopens the connection
    /// mid-redirect.
    fn handle_logout(&mut self) {
        info!(
            event = "feed.broker.logout",
            port_count = self.ports.len(),
        );
        self.fan_out(FeedEvent::Logout);
        self.ports.clear();
        self.close_transport();
        self.navigator.navigate(&self.landing_url);
    }

    fn fan_out(&mut self, event: FeedEvent) {
        self.ports
            .retain(|port_id, tx| match tx.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(event = "feed.broker.port_gone", port_id = port_id);
                    false
                }
            });
    }

    fn close_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.cancel.cancel();
        }
    }
}
