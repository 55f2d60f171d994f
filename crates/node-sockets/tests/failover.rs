//! Integration tests: registry, handshake and failover over loopback links.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use node_sockets::adapters::{LoopbackTransport, MockWalletProvider, SigningOutcome, StaticDirectory};
use node_sockets::{
    channels, AuthState, NodeDirectory, NodeSockets, NodeSocketsApi, Readiness, SocketsConfig,
    SocketsError, WalletSessionProvider,
};
use serde_json::json;
use shared_bus::{
    AuthMethod, EventFilter, EventPublisher, EventTopic, InMemoryEventBus, NotificationKind, SdkEvent,
    Subscription,
};
use shared_types::{DirectoryError, NetworkEnv, Node, WalletSession};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WALLET: &str = "0.0.1001";

struct Harness {
    bus: Arc<InMemoryEventBus>,
    transport: LoopbackTransport,
    directory: Arc<StaticDirectory>,
    wallet: Arc<MockWalletProvider>,
    sockets: Arc<NodeSockets>,
    events: Subscription,
    _signer: JoinHandle<()>,
}

fn nodes(operators: &[&str]) -> Vec<Node> {
    operators
        .iter()
        .map(|op| Node::new(*op, format!("ws://{op}.test")))
        .collect()
}

fn session() -> WalletSession {
    WalletSession::new(vec![WALLET.to_string()])
}

/// Answer every challenge the way the orchestration root does.
fn spawn_signer(
    bus: &InMemoryEventBus,
    sockets: Arc<NodeSockets>,
    wallet: Arc<MockWalletProvider>,
) -> JoinHandle<()> {
    let mut auth = bus.subscribe(EventFilter::topics(vec![EventTopic::Auth]));
    tokio::spawn(async move {
        while let Some(event) = auth.recv().await {
            let SdkEvent::Auth(notification) = event else {
                continue;
            };
            let Some(data) = notification.data else {
                continue;
            };
            let signed = wallet
                .authenticate(
                    &data.wallet,
                    &data.auth_response.signed_data,
                    &data.auth_response.payload,
                )
                .await;
            match signed {
                Ok(result) => {
                    sockets
                        .orchestrator()
                        .submit_credential(data.attempt, result)
                        .await
                }
                Err(e) => {
                    sockets
                        .orchestrator()
                        .signing_failed(data.attempt, "Authentication Error", e.to_string())
                        .await
                }
            }
        }
    })
}

async fn harness(operators: &[&str]) -> Harness {
    harness_with(operators, true).await
}

/// Nodes that answer every credential with `accept`.
async fn harness_with(operators: &[&str], accept: bool) -> Harness {
    harness_serving(operators, operators, accept).await
}

/// Only the `served` nodes run the handshake; the others never challenge.
async fn harness_serving(operators: &[&str], served: &[&str], accept: bool) -> Harness {
    let bus = Arc::new(InMemoryEventBus::new());
    let events = bus.subscribe(EventFilter::all());
    let transport = LoopbackTransport::new();
    for op in served {
        transport.serve_handshake(op, accept);
    }
    let directory =
        Arc::new(StaticDirectory::new().with_network(NetworkEnv::Testnet, nodes(operators)));
    directory
        .set_network(NetworkEnv::Testnet)
        .await
        .expect("testnet configured");
    let wallet = Arc::new(MockWalletProvider::new().with_account(WALLET));

    let sockets = NodeSockets::new(
        Arc::new(transport.clone()),
        directory.clone(),
        wallet.clone(),
        bus.clone(),
        SocketsConfig::for_testing(),
    );
    let signer = spawn_signer(&bus, sockets.clone(), wallet.clone());

    Harness {
        bus,
        transport,
        directory,
        wallet,
        sockets,
        events,
        _signer: signer,
    }
}

async fn ready(h: &Harness) -> String {
    h.sockets
        .orchestrator()
        .wait_ready(Duration::from_secs(2))
        .await
        .expect("primary authenticated")
}

/// Drain auth notifications until one of `kind` arrives.
async fn auth_until(events: &mut Subscription, kind: NotificationKind) -> Vec<(AuthMethod, NotificationKind, Option<String>)> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("notification in time")
            .expect("bus open");
        if let SdkEvent::Auth(n) = event {
            let done = n.kind == kind;
            seen.push((n.method, n.kind, n.node.clone()));
            if done {
                return seen;
            }
        }
    }
}

// =============================================================================
// TEST GROUP 1: Initialisation
// =============================================================================

#[tokio::test]
async fn test_initialize_authenticates_directory_primary() {
    let mut h = harness(&["a", "b"]).await;
    h.sockets
        .init(Some(&session()), nodes(&["a", "b"]))
        .await
        .expect("init");

    assert_eq!(ready(&h).await, "a");
    assert_eq!(h.sockets.primary_node().map(|n| n.operator), Some("a".into()));

    let seen = auth_until(&mut h.events, NotificationKind::Success).await;
    assert_eq!(seen[0], (AuthMethod::Authentication, NotificationKind::Loading, Some("a".into())));
    assert_eq!(seen.last().map(|s| s.0), Some(AuthMethod::Authenticate));

    let status = h.sockets.nodes_online();
    assert_eq!(status.len(), 2);
    assert!(status.values().all(|s| s.online));

    // The credential went to the primary, scoped to the wallet.
    let frames = h.transport.handle("a").expect("a").sent_on(channels::AUTHENTICATE);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["walletId"], WALLET);
    assert!(h.transport.handle("b").expect("b").sent_on(channels::AUTHENTICATE).is_empty());
}

#[tokio::test]
async fn test_empty_directory_fails_fast() {
    let h = harness(&[]).await;
    assert_eq!(
        h.sockets.init(Some(&session()), Vec::new()).await,
        Err(SocketsError::NoNodes)
    );

    let started = tokio::time::Instant::now();
    let err = h
        .sockets
        .send_message(channels::EVENTS, json!({}))
        .await
        .expect_err("no primary");
    assert!(err.is_configuration());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_directory_registry_divergence_is_reported() {
    let h = harness(&["a", "b"]).await;
    // Directory says "a", registry only holds "b".
    let err = h
        .sockets
        .init(Some(&session()), nodes(&["b"]))
        .await
        .expect_err("diverged");
    assert_eq!(err, SocketsError::PrimaryNotFound { operator: "a".into() });
    assert_eq!(h.sockets.readiness(), Readiness::Unconfigured);
}

#[tokio::test]
async fn test_reinitialize_replaces_connections() {
    let h = harness(&["a", "b"]).await;
    h.sockets.init(Some(&session()), nodes(&["a", "b"])).await.expect("init");
    ready(&h).await;
    let first = h.transport.handle("a").expect("a");

    h.sockets.init(Some(&session()), nodes(&["a", "b"])).await.expect("re-init");
    ready(&h).await;

    assert!(!first.is_connected());
    assert_eq!(h.transport.opened_count(), 4);
    // Dropping the released link must not trigger a failover.
    first.drop_link();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.sockets.primary_node().map(|n| n.operator), Some("a".into()));
    assert!(h.sockets.readiness().is_ready());
}

// =============================================================================
// TEST GROUP 2: Failover
// =============================================================================

#[tokio::test]
async fn test_primary_drop_fails_over_and_reauthenticates() {
    let mut h = harness(&["a", "b"]).await;
    h.sockets.init(Some(&session()), nodes(&["a", "b"])).await.expect("init");
    ready(&h).await;
    auth_until(&mut h.events, NotificationKind::Success).await;

    h.transport.handle("a").expect("a").drop_link();

    // The next message waits for the new primary to authenticate.
    h.sockets
        .send_message("ping", json!({"n": 1}))
        .await
        .expect("sent after failover");

    let b = h.transport.handle("b").expect("b");
    assert_eq!(b.sent_on("ping"), vec![json!({"n": 1})]);
    assert!(h.transport.handle("a").expect("a").sent_on("ping").is_empty());
    assert_eq!(h.directory.current_node().map(|n| n.operator), Some("b".into()));

    let seen = auth_until(&mut h.events, NotificationKind::Success).await;
    assert_eq!(seen.first().map(|s| s.1), Some(NotificationKind::Loading));
    assert_eq!(seen.last().map(|s| s.2.clone()), Some(Some("b".into())));
    assert_eq!(h.sockets.orchestrator().state().await, AuthState::Authenticated);
    assert!(!h.sockets.nodes_online()["a"].online);
}

#[tokio::test]
async fn test_non_primary_drop_keeps_primary() {
    let h = harness(&["a", "b"]).await;
    h.sockets.init(Some(&session()), nodes(&["a", "b"])).await.expect("init");
    ready(&h).await;

    h.transport.handle("b").expect("b").drop_link();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.sockets.primary_node().map(|n| n.operator), Some("a".into()));
    assert!(!h.sockets.nodes_online()["b"].online);
    assert!(h.sockets.readiness().is_ready());
}

#[tokio::test]
async fn test_failover_without_candidate_reports_error() {
    let mut h = harness(&["solo"]).await;
    h.sockets.init(Some(&session()), nodes(&["solo"])).await.expect("init");
    ready(&h).await;

    h.transport.handle("solo").expect("solo").drop_link();

    let error = loop {
        let event = timeout(Duration::from_secs(2), h.events.recv())
            .await
            .expect("in time")
            .expect("open");
        if let SdkEvent::Errors(e) = event {
            break e;
        }
    };
    assert_eq!(error.title, "Failover Failed");

    let err = h
        .sockets
        .send_message("ping", json!(null))
        .await
        .expect_err("no primary");
    assert!(matches!(err, SocketsError::NotAuthenticated { .. }));
    assert!(h.sockets.primary_node().is_none());
}

#[tokio::test]
async fn test_silent_primary_after_failover_fails_readiness() {
    let mut h = harness_serving(&["a", "b"], &["a"], true).await;
    h.sockets.init(Some(&session()), nodes(&["a", "b"])).await.expect("init");
    ready(&h).await;
    auth_until(&mut h.events, NotificationKind::Success).await;

    h.transport.handle("a").expect("a").drop_link();

    // "b" never challenges, so the next message sees a failed handshake
    // instead of waiting out the readiness timeout.
    let err = h
        .sockets
        .send_message("ping", json!(null))
        .await
        .expect_err("b never authenticates");
    assert!(matches!(err, SocketsError::NotAuthenticated { .. }));
    assert_eq!(h.sockets.primary_node().map(|n| n.operator), Some("b".into()));

    let timed_out = loop {
        let event = timeout(Duration::from_secs(2), h.events.recv())
            .await
            .expect("in time")
            .expect("open");
        if let SdkEvent::Auth(n) = event {
            if n.kind == NotificationKind::Error {
                break n;
            }
        }
    };
    assert_eq!(timed_out.title.as_deref(), Some("Authentication Timeout"));
    assert_eq!(timed_out.node.as_deref(), Some("b"));
    assert_eq!(h.sockets.orchestrator().state().await, AuthState::Unauthenticated);
    assert!(matches!(h.sockets.readiness(), Readiness::Failed { .. }));
    assert!(h.transport.handle("b").expect("b").sent_on(channels::AUTHENTICATE).is_empty());
}

#[tokio::test]
async fn test_silent_primary_on_init_fails_readiness() {
    let h = harness_serving(&["a"], &[], true).await;
    h.sockets.init(Some(&session()), nodes(&["a"])).await.expect("init");
    assert_eq!(h.sockets.readiness(), Readiness::Pending);

    let err = h
        .sockets
        .orchestrator()
        .wait_ready(Duration::from_secs(2))
        .await
        .expect_err("never challenged");
    assert!(matches!(err, SocketsError::NotAuthenticated { .. }));
}

/// Directory whose shuffle always lands on one node.
struct PinnedDirectory {
    inner: StaticDirectory,
    pinned: &'static str,
}

#[async_trait]
impl NodeDirectory for PinnedDirectory {
    fn current_node(&self) -> Option<Node> {
        self.inner.current_node()
    }

    async fn set_network(&self, env: NetworkEnv) -> Result<(), DirectoryError> {
        self.inner.set_network(env).await
    }

    async fn network(&self) -> Result<Vec<Node>, DirectoryError> {
        self.inner.network().await
    }

    fn shuffle_node(&self) {
        self.inner.set_current(self.pinned);
    }

    fn select_node(&self, operator: &str) -> bool {
        self.inner.select_node(operator)
    }
}

#[tokio::test]
async fn test_failover_prefers_online_registry_entry_over_offline_shuffle() {
    let bus = Arc::new(InMemoryEventBus::new());
    let transport = LoopbackTransport::new();
    for op in ["a", "b", "c"] {
        transport.serve_handshake(op, true);
    }
    let directory = Arc::new(PinnedDirectory {
        inner: StaticDirectory::new().with_network(NetworkEnv::Testnet, nodes(&["a", "b", "c"])),
        pinned: "c",
    });
    directory
        .set_network(NetworkEnv::Testnet)
        .await
        .expect("testnet configured");
    let wallet = Arc::new(MockWalletProvider::new().with_account(WALLET));
    let sockets = NodeSockets::new(
        Arc::new(transport.clone()),
        directory.clone(),
        wallet.clone(),
        bus.clone(),
        SocketsConfig::for_testing(),
    );
    let _signer = spawn_signer(&bus, sockets.clone(), wallet);

    sockets.init(Some(&session()), nodes(&["a", "b", "c"])).await.expect("init");
    sockets
        .orchestrator()
        .wait_ready(Duration::from_secs(2))
        .await
        .expect("a authenticated");

    // The only node the shuffle will ever name goes offline first.
    transport.handle("c").expect("c").drop_link();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!sockets.nodes_online()["c"].online);

    transport.handle("a").expect("a").drop_link();
    sockets
        .send_message("ping", json!({"n": 1}))
        .await
        .expect("sent after failover");

    assert_eq!(sockets.primary_node().map(|n| n.operator), Some("b".into()));
    assert_eq!(directory.current_node().map(|n| n.operator), Some("b".into()));
    assert_eq!(transport.handle("b").expect("b").sent_on("ping"), vec![json!({"n": 1})]);
    assert!(transport.handle("c").expect("c").sent_on("ping").is_empty());
}

// =============================================================================
// TEST GROUP 3: Authentication failures
// =============================================================================

#[tokio::test]
async fn test_signing_failure_emits_one_error_and_resets() {
    let mut h = harness(&["a"]).await;
    h.wallet.set_outcome(SigningOutcome::Fail("wallet unreachable".into()));
    h.sockets.init(Some(&session()), nodes(&["a"])).await.expect("init");

    let seen = auth_until(&mut h.events, NotificationKind::Error).await;
    assert_eq!(seen.iter().filter(|s| s.1 == NotificationKind::Error).count(), 1);
    assert_eq!(h.sockets.orchestrator().state().await, AuthState::Unauthenticated);
    assert!(matches!(h.sockets.readiness(), Readiness::Failed { .. }));

    // Reconnecting retries with a fresh challenge.
    h.wallet.set_outcome(SigningOutcome::Sign);
    h.sockets.authorize_wallet().await.expect("primary");
    assert_eq!(ready(&h).await, "a");
}

#[tokio::test]
async fn test_rejected_signature_clears_cache() {
    let mut h = harness_with(&["a"], false).await;
    h.sockets.init(Some(&session()), nodes(&["a"])).await.expect("init");

    let seen = auth_until(&mut h.events, NotificationKind::Warning).await;
    assert_eq!(seen.last().map(|s| s.0), Some(AuthMethod::Authenticate));
    assert!(h.wallet.cached().is_none());
    assert_eq!(h.wallet.cleared_count(), 1);
    assert_eq!(h.sockets.orchestrator().state().await, AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_node_errors_pass_through_verbatim() {
    let mut h = harness(&["a"]).await;
    h.sockets.init(Some(&session()), nodes(&["a"])).await.expect("init");
    ready(&h).await;

    let payload = json!({"message": "pool closed", "code": 7});
    h.transport.handle("a").expect("a").push(channels::ERRORS, payload.clone());
    h.transport.handle("a").expect("a").push(channels::EVENTS, json!({"type": "swap"}));

    let mut saw_error = false;
    loop {
        let event = timeout(Duration::from_secs(2), h.events.recv())
            .await
            .expect("in time")
            .expect("open");
        match event {
            SdkEvent::Errors(e) => {
                assert_eq!(e.payload, Some(payload.clone()));
                assert_eq!(e.node.as_deref(), Some("a"));
                saw_error = true;
            }
            SdkEvent::Events(e) => {
                assert!(saw_error, "events arrive in push order");
                assert_eq!(e.payload["type"], "swap");
                break;
            }
            SdkEvent::Auth(_) => {}
        }
    }
    assert!(h.bus.events_published() >= 4);
}

// =============================================================================
// TEST GROUP 4: Requests
// =============================================================================

#[tokio::test]
async fn test_reserve_and_mint() {
    let h = harness(&["a"]).await;
    h.transport.script_response("a", channels::RESERVE_NFT, json!(17));
    h.transport.script_response(
        "a",
        channels::MINT_LP_NFT,
        json!({"status": "success", "payload": {"serial": 3}}),
    );
    h.sockets.init(Some(&session()), nodes(&["a"])).await.expect("init");

    assert_eq!(h.sockets.reserve_nft("0.0.42", WALLET).await, Ok(17));
    assert_eq!(
        h.sockets.mint_lp_nft(json!({"pool": "p1"})).await,
        Ok(json!({"serial": 3}))
    );

    let handle = h.transport.handle("a").expect("a");
    assert_eq!(
        handle.sent_on(channels::RESERVE_NFT),
        vec![json!({"tokenId": "0.0.42", "walletId": WALLET})]
    );
    assert_eq!(
        handle.sent_on(channels::MINT_LP_NFT),
        vec![json!({"joinPool": {"pool": "p1"}})]
    );
}

#[tokio::test]
async fn test_failed_mint_surfaces_node_error() {
    let h = harness(&["a"]).await;
    h.transport.script_response(
        "a",
        channels::MINT_LP_NFT,
        json!({"status": "error", "error": "insufficient liquidity"}),
    );
    h.sockets.init(Some(&session()), nodes(&["a"])).await.expect("init");

    assert_eq!(
        h.sockets.mint_lp_nft(json!({})).await,
        Err(SocketsError::Request {
            topic: channels::MINT_LP_NFT.into(),
            message: "insufficient liquidity".into(),
        })
    );
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let h = harness(&["a"]).await;
    h.sockets.init(Some(&session()), nodes(&["a"])).await.expect("init");

    assert_eq!(
        h.sockets.request("quote", json!({})).await,
        Err(SocketsError::RequestTimeout {
            topic: "quote".into()
        })
    );
}

#[tokio::test]
async fn test_shutdown_disconnects_everything() {
    let h = harness(&["a", "b"]).await;
    h.sockets.init(Some(&session()), nodes(&["a", "b"])).await.expect("init");
    ready(&h).await;

    h.sockets.shutdown().await;

    assert!(!h.transport.handle("a").expect("a").is_connected());
    assert!(!h.transport.handle("b").expect("b").is_connected());
    assert!(h.sockets.nodes_online().is_empty());
    assert_eq!(
        h.sockets.send_message("ping", json!(null)).await,
        Err(SocketsError::NoPrimary)
    );
}
