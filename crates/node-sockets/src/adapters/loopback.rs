//! # Loopback Transport
//!
//! Connections that never leave the process. The node side of each link is
//! driven through a `LoopbackHandle`: push inbound payloads, drop the link,
//! script what the node sends on connect and how it answers emits.
//!
//! Persistent subscriptions survive reconnects. One-shot waits are
//! cancelled whenever the link goes down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_types::Node;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};

use crate::domain::{
    channels, ConnectionId, ConnectionState, DisconnectReason, LifecycleEvent, PayloadStream,
    PendingEvent,
};
use crate::ports::{Connection, Transport};

const LIFECYCLE_CAPACITY: usize = 64;

/// One payload on a named channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub topic: String,
    pub payload: Value,
}

impl Frame {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// What the node side does without being told each time.
#[derive(Debug, Clone, Default)]
struct Script {
    on_connect: Vec<Frame>,
    responses: HashMap<String, Value>,
}

struct Link {
    id: ConnectionId,
    node: Node,
    wallet: Option<String>,
    state: Mutex<ConnectionState>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
    pending: Mutex<HashMap<String, Vec<oneshot::Sender<Value>>>>,
    sent: Mutex<Vec<Frame>>,
    script: Mutex<Script>,
}

impl Link {
    fn is_connected(&self) -> bool {
        *self.state.lock() == ConnectionState::Connected
    }

    fn deliver(&self, topic: &str, payload: Value) {
        if !self.is_connected() {
            trace!(operator = %self.node.operator, topic, "Inbound dropped, link down");
            return;
        }
        let waiters = self.pending.lock().remove(topic).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(payload.clone());
        }
        if let Some(subscribers) = self.subscribers.lock().get_mut(topic) {
            subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        }
    }

    fn go_up(&self) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Connected {
                return;
            }
            *state = ConnectionState::Connected;
        }
        let _ = self.lifecycle.send(LifecycleEvent::Connected);
        let greetings = self.script.lock().on_connect.clone();
        for frame in greetings {
            self.deliver(&frame.topic, frame.payload);
        }
    }

    fn go_down(&self, reason: DisconnectReason) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnected;
        }
        // Dropping the senders fails every pending wait.
        self.pending.lock().clear();
        let _ = self.lifecycle.send(LifecycleEvent::Disconnected(reason));
        debug!(operator = %self.node.operator, ?reason, "Loopback link down");
    }
}

/// Client side of a loopback link.
pub struct LoopbackConnection {
    link: Arc<Link>,
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn id(&self) -> ConnectionId {
        self.link.id
    }

    fn node(&self) -> &Node {
        &self.link.node
    }

    fn state(&self) -> ConnectionState {
        *self.link.state.lock()
    }

    async fn connect(&self) {
        self.link.go_up();
    }

    async fn disconnect(&self) {
        self.link.go_down(DisconnectReason::Requested);
    }

    fn emit(&self, topic: &str, payload: Value) {
        if !self.link.is_connected() {
            debug!(operator = %self.link.node.operator, topic, "Emit dropped, link down");
            return;
        }
        self.link.sent.lock().push(Frame::new(topic, payload));
        let response = self.link.script.lock().responses.get(topic).cloned();
        if let Some(response) = response {
            self.link.deliver(topic, response);
        }
    }

    fn subscribe(&self, event: &str) -> PayloadStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.link
            .subscribers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn subscribe_once(&self, event: &str) -> PendingEvent {
        let (tx, rx) = oneshot::channel();
        self.link
            .pending
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(tx);
        PendingEvent::new(event, rx)
    }

    fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.link.lifecycle.subscribe()
    }
}

/// Node side of a loopback link.
#[derive(Clone)]
pub struct LoopbackHandle {
    link: Arc<Link>,
}

impl LoopbackHandle {
    pub fn id(&self) -> ConnectionId {
        self.link.id
    }

    /// Account the client opened the link for.
    pub fn wallet(&self) -> Option<String> {
        self.link.wallet.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Push a payload to the client.
    pub fn push(&self, topic: &str, payload: Value) {
        self.link.deliver(topic, payload);
    }

    /// Drop the link from the node side.
    pub fn drop_link(&self) {
        self.link.go_down(DisconnectReason::Transport);
    }

    /// Bring a dropped link back.
    pub fn restore_link(&self) {
        self.link.go_up();
    }

    /// Send `payload` on `topic` every time the client connects.
    pub fn on_connect(&self, topic: &str, payload: Value) {
        self.link
            .script
            .lock()
            .on_connect
            .push(Frame::new(topic, payload));
    }

    /// Answer every emit on `topic` with `payload` on the same topic.
    pub fn respond(&self, topic: &str, payload: Value) {
        self.link
            .script
            .lock()
            .responses
            .insert(topic.to_string(), payload);
    }

    /// Everything the client emitted while connected.
    pub fn sent(&self) -> Vec<Frame> {
        self.link.sent.lock().clone()
    }

    /// Payloads the client emitted on `topic`.
    pub fn sent_on(&self, topic: &str) -> Vec<Value> {
        self.link
            .sent
            .lock()
            .iter()
            .filter(|f| f.topic == topic)
            .map(|f| f.payload.clone())
            .collect()
    }
}

#[derive(Default)]
struct TransportInner {
    handles: Mutex<HashMap<String, LoopbackHandle>>,
    scripts: Mutex<HashMap<String, Script>>,
    opened: AtomicUsize,
}

/// Factory of loopback connections. Clones share state.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<TransportInner>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the latest connection opened to `operator`.
    pub fn handle(&self, operator: &str) -> Option<LoopbackHandle> {
        self.inner.handles.lock().get(operator).cloned()
    }

    /// Number of connections opened so far.
    pub fn opened_count(&self) -> usize {
        self.inner.opened.load(Ordering::Relaxed)
    }

    /// Script every future connection to `operator` to push a frame on
    /// connect.
    pub fn script_on_connect(&self, operator: &str, topic: &str, payload: Value) {
        self.inner
            .scripts
            .lock()
            .entry(operator.to_string())
            .or_default()
            .on_connect
            .push(Frame::new(topic, payload));
    }

    /// Script every future connection to `operator` to answer emits on
    /// `topic`.
    pub fn script_response(&self, operator: &str, topic: &str, payload: Value) {
        self.inner
            .scripts
            .lock()
            .entry(operator.to_string())
            .or_default()
            .responses
            .insert(topic.to_string(), payload);
    }

    /// Make `operator` challenge on every connect and answer every
    /// credential with the given verdict.
    pub fn serve_handshake(&self, operator: &str, accept: bool) {
        self.script_on_connect(operator, channels::AUTHENTICATION, challenge_for(operator));
        self.script_response(
            operator,
            channels::AUTHENTICATE,
            json!({ "isValidSignature": accept }),
        );
    }
}

impl Transport for LoopbackTransport {
    fn open(&self, node: &Node, wallet: Option<&str>) -> Arc<dyn Connection> {
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        let script = self
            .inner
            .scripts
            .lock()
            .get(&node.operator)
            .cloned()
            .unwrap_or_default();
        let link = Arc::new(Link {
            id: ConnectionId::new(),
            node: node.clone(),
            wallet: wallet.map(str::to_string),
            state: Mutex::new(ConnectionState::Disconnected),
            lifecycle,
            subscribers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(script),
        });

        self.inner
            .handles
            .lock()
            .insert(node.operator.clone(), LoopbackHandle { link: link.clone() });
        self.inner.opened.fetch_add(1, Ordering::Relaxed);
        Arc::new(LoopbackConnection { link })
    }
}

/// A challenge as `operator` would sign it.
pub fn challenge_for(operator: &str) -> Value {
    json!({
        "signedData": {
            "signature": [1, 2, 3, 4],
            "serverSigningAccount": operator,
        },
        "payload": {
            "url": format!("{operator}.loopback"),
            "data": { "token": format!("challenge-{operator}") },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn open(transport: &LoopbackTransport, operator: &str) -> Arc<dyn Connection> {
        transport.open(&Node::new(operator, format!("ws://{operator}")), Some("0.0.9"))
    }

    #[tokio::test]
    async fn test_lifecycle_once_per_transition() {
        let transport = LoopbackTransport::new();
        let conn = open(&transport, "a");
        let mut lifecycle = conn.lifecycle();

        conn.connect().await;
        conn.connect().await;
        conn.disconnect().await;
        conn.disconnect().await;

        assert!(matches!(lifecycle.try_recv(), Ok(LifecycleEvent::Connected)));
        assert!(matches!(
            lifecycle.try_recv(),
            Ok(LifecycleEvent::Disconnected(DisconnectReason::Requested))
        ));
        assert!(lifecycle.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscription_survives_reconnect() {
        let transport = LoopbackTransport::new();
        let conn = open(&transport, "a");
        let handle = transport.handle("a").expect("opened");
        let mut events = conn.subscribe(channels::EVENTS);

        conn.connect().await;
        handle.push(channels::EVENTS, json!(1));
        conn.disconnect().await;
        handle.push(channels::EVENTS, json!("dropped"));
        conn.connect().await;
        handle.push(channels::EVENTS, json!(2));

        assert_eq!(events.next().await, Some(json!(1)));
        assert_eq!(events.next().await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_once_resolves_a_single_payload() {
        let transport = LoopbackTransport::new();
        let conn = open(&transport, "a");
        conn.connect().await;
        let handle = transport.handle("a").expect("opened");

        let pending = conn.subscribe_once(channels::RESERVE_NFT);
        handle.push(channels::RESERVE_NFT, json!(11));
        handle.push(channels::RESERVE_NFT, json!(12));

        assert_eq!(pending.wait().await, Ok(json!(11)));
    }

    #[tokio::test]
    async fn test_once_is_cancelled_by_disconnect() {
        let transport = LoopbackTransport::new();
        let conn = open(&transport, "a");
        conn.connect().await;

        let pending = conn.subscribe_once(channels::MINT_LP_NFT);
        transport.handle("a").expect("opened").drop_link();

        assert!(pending.wait().await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_node() {
        let transport = LoopbackTransport::new();
        transport.serve_handshake("a", true);
        let conn = open(&transport, "a");
        let mut challenges = conn.subscribe(channels::AUTHENTICATION);
        let verdict = conn.subscribe_once(channels::AUTHENTICATE);

        conn.connect().await;
        let challenge = challenges.next().await.expect("challenge");
        assert_eq!(challenge["signedData"]["serverSigningAccount"], "a");

        conn.emit(channels::AUTHENTICATE, json!({"walletId": "0.0.9"}));
        assert_eq!(
            verdict.wait().await,
            Ok(json!({"isValidSignature": true}))
        );

        let handle = transport.handle("a").expect("opened");
        assert_eq!(handle.sent_on(channels::AUTHENTICATE).len(), 1);
        assert_eq!(handle.wallet().as_deref(), Some("0.0.9"));
    }

    #[tokio::test]
    async fn test_emit_while_down_is_dropped() {
        let transport = LoopbackTransport::new();
        let conn = open(&transport, "a");
        conn.emit(channels::EVENTS, json!(1));
        assert!(transport.handle("a").expect("opened").sent().is_empty());
        assert_eq!(transport.opened_count(), 1);
    }
}
