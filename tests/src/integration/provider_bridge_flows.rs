//! # Provider Bridge Flows
//!
//! Drives qc-18-provider-bridge end to end through in-process connections:
//! page → Channel Multiplexer → Request Router → Approval Gate → engine.
//!
//! ## Properties Tested:
//!
//! 1. **One prompt per round**: concurrent privileged calls from one origin share a round
//! 2. **Correlation**: responses reach only the issuing connection, under the issuing id
//! 3. **Decision scoping**: grant/deny affect only the decided origin; stale decisions are no-ops
//! 4. **Failure semantics**: UI failure and round expiry deny instead of hanging

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use qc_18_provider_bridge::test_utils::{RecordingApprovalUi, ScriptedEngine};
    use qc_18_provider_bridge::{
        codes, create_approval_channel, ApprovalUi, BridgeConfig, ConnectRequest,
        ConnectionHandle, InMemoryPermissionPersistence, JsonFilePermissionPersistence, Origin,
        PermissionState, ProviderBridge, RequestId, RpcResponse,
    };

    const DAPP: &str = "https://dapp.example";
    const OTHER: &str = "https://other.example";

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Harness {
        bridge: Arc<ProviderBridge>,
        ui: Arc<RecordingApprovalUi>,
        engine: Arc<ScriptedEngine>,
    }

    fn harness_with(config: BridgeConfig) -> Harness {
        let ui = Arc::new(RecordingApprovalUi::new());
        let engine = Arc::new(
            ScriptedEngine::new()
                .with_result("wallet_listAccounts", json!(["0x00000000000000000000000000000000000000a1"]))
                .with_result("chain_getId", json!("0x1"))
                .with_result("node_getClientVersion", json!("QuantumChain/v0.1.0")),
        );
        let bridge = ProviderBridge::new(
            config,
            engine.clone(),
            ui.clone(),
            Arc::new(InMemoryPermissionPersistence::new()),
        )
        .expect("bridge");
        Harness {
            bridge: Arc::new(bridge),
            ui,
            engine,
        }
    }

    fn harness() -> Harness {
        harness_with(BridgeConfig::default())
    }

    fn origin(s: &str) -> Origin {
        Origin::parse(s).unwrap()
    }

    impl Harness {
        fn connect(&self, origin: &str) -> ConnectionHandle {
            self.bridge
                .multiplexer()
                .on_connect(&ConnectRequest::new(origin))
                .expect("connect")
        }

        async fn call(&self, conn: &ConnectionHandle, id: Value, method: &str) {
            let frame = json!({"id": id, "method": method, "params": []}).to_string();
            self.bridge
                .multiplexer()
                .on_message(conn.id, &frame)
                .await;
        }
    }

    async fn recv(conn: &mut ConnectionHandle) -> RpcResponse {
        timeout(Duration::from_secs(2), conn.responses.recv())
            .await
            .expect("response timed out")
            .expect("connection closed")
    }

    /// Yield until `cond` holds (the test runtime is single threaded)
    async fn wait_until(mut cond: impl FnMut() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn string_id(s: &str) -> Option<RequestId> {
        Some(RequestId::String(s.to_string()))
    }

    // =============================================================================
    // APPROVAL ROUNDS
    // =============================================================================

    #[tokio::test]
    async fn test_first_privileged_request_prompts_once_then_grant() {
        let h = harness();
        let mut conn = h.connect(DAPP);

        h.call(&conn, json!("a"), "eth_requestAccounts").await;
        wait_until(|| h.ui.prompt_count() == 1).await;

        let prompt = &h.ui.prompts()[0];
        assert_eq!(prompt.origin, origin(DAPP));
        assert!(!prompt.purpose.is_empty());
        assert_eq!(h.engine.call_count(), 0);

        assert!(h.bridge.grant(&origin(DAPP)));

        let resp = recv(&mut conn).await;
        assert_eq!(resp.id, string_id("a"));
        assert_eq!(
            resp.result(),
            Some(&json!(["0x00000000000000000000000000000000000000a1"]))
        );
        assert_eq!(
            h.bridge.permission(&origin(DAPP)).map(|r| r.state),
            Some(PermissionState::Allowed)
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_round() {
        let h = harness();
        let mut first = h.connect(DAPP);
        // Same origin, second tab
        let mut second = h.connect(DAPP);

        h.call(&first, json!("a"), "eth_requestAccounts").await;
        h.call(&first, json!("b"), "eth_requestAccounts").await;
        h.call(&second, json!(7), "eth_sendTransaction").await;
        wait_until(|| h.bridge.snapshot().rounds_joined == 2).await;

        assert_eq!(h.ui.prompt_count(), 1);
        assert!(h.bridge.grant(&origin(DAPP)));

        let mut ids = vec![recv(&mut first).await, recv(&mut first).await];
        ids.sort_by_key(|r| r.id.as_ref().map(|i| i.to_string()));
        assert_eq!(ids[0].id, string_id("a"));
        assert_eq!(ids[1].id, string_id("b"));
        assert!(ids.iter().all(|r| r.result().is_some()));

        let resp = recv(&mut second).await;
        assert_eq!(resp.id, Some(RequestId::Number(7)));
        assert!(resp.result().is_some());
        assert_eq!(h.ui.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_all_fail_on_deny() {
        let h = harness();
        let mut conn = h.connect(DAPP);

        for id in ["a", "b", "c"] {
            h.call(&conn, json!(id), "eth_requestAccounts").await;
        }
        wait_until(|| h.bridge.snapshot().rounds_joined == 2).await;
        assert!(h.bridge.deny(&origin(DAPP)));

        for _ in 0..3 {
            let resp = recv(&mut conn).await;
            let error = resp.error().expect("denied");
            assert_eq!(error.code, codes::CAPABILITY_DENIED);
            assert_eq!(error.data, Some(json!({"reason": "denied"})));
        }
        assert_eq!(h.engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_granted_origin_needs_no_new_prompt() {
        let h = harness();
        let mut conn = h.connect(DAPP);

        h.call(&conn, json!("a"), "eth_requestAccounts").await;
        wait_until(|| h.bridge.is_pending(&origin(DAPP))).await;
        h.bridge.grant(&origin(DAPP));
        recv(&mut conn).await;

        h.call(&conn, json!("b"), "eth_requestAccounts").await;
        let resp = recv(&mut conn).await;
        assert_eq!(resp.id, string_id("b"));
        assert!(resp.result().is_some());
        assert_eq!(h.ui.prompt_count(), 1);
        assert_eq!(h.bridge.snapshot().rounds_opened, 1);
    }

    #[tokio::test]
    async fn test_deny_records_and_next_request_opens_fresh_round() {
        let h = harness();
        let mut conn = h.connect(DAPP);

        h.call(&conn, json!("a"), "eth_requestAccounts").await;
        wait_until(|| h.bridge.is_pending(&origin(DAPP))).await;
        h.bridge.deny(&origin(DAPP));

        let resp = recv(&mut conn).await;
        assert_eq!(resp.id, string_id("a"));
        assert_eq!(resp.error().unwrap().code, codes::CAPABILITY_DENIED);
        assert_eq!(
            h.bridge.permission(&origin(DAPP)).map(|r| r.state),
            Some(PermissionState::Denied)
        );

        h.call(&conn, json!("b"), "eth_requestAccounts").await;
        wait_until(|| h.ui.prompt_count() == 2).await;
        h.bridge.grant(&origin(DAPP));
        let resp = recv(&mut conn).await;
        assert_eq!(resp.id, string_id("b"));
        assert!(resp.result().is_some());
    }

    #[tokio::test]
    async fn test_stale_decision_is_noop_for_every_origin() {
        let h = harness();
        let mut other = h.connect(OTHER);

        h.call(&other, json!(1), "eth_requestAccounts").await;
        wait_until(|| h.bridge.is_pending(&origin(OTHER))).await;

        // No round for DAPP: both decisions are stale
        assert!(!h.bridge.grant(&origin(DAPP)));
        assert!(!h.bridge.deny(&origin(DAPP)));
        assert!(h.bridge.permission(&origin(DAPP)).is_none());

        // OTHER's round is untouched
        assert!(h.bridge.is_pending(&origin(OTHER)));
        assert!(
            timeout(Duration::from_millis(50), other.responses.recv())
                .await
                .is_err()
        );
        assert_eq!(h.bridge.snapshot().stale_decisions, 2);

        h.bridge.grant(&origin(OTHER));
        assert!(recv(&mut other).await.result().is_some());
    }

    #[tokio::test]
    async fn test_decision_for_one_origin_does_not_release_another() {
        let h = harness();
        let mut a = h.connect(DAPP);
        let mut b = h.connect(OTHER);

        h.call(&a, json!(1), "eth_requestAccounts").await;
        h.call(&b, json!(1), "eth_requestAccounts").await;
        wait_until(|| h.ui.prompt_count() == 2).await;

        h.bridge.grant(&origin(DAPP));
        assert!(recv(&mut a).await.result().is_some());
        assert!(h.bridge.is_pending(&origin(OTHER)));
        assert!(
            timeout(Duration::from_millis(50), b.responses.recv())
                .await
                .is_err()
        );
    }

    // =============================================================================
    // CORRELATION
    // =============================================================================

    #[tokio::test]
    async fn test_same_id_on_two_connections_never_cross_delivered() {
        let h = harness();
        let mut a = h.connect(DAPP);
        let mut b = h.connect(OTHER);

        h.call(&a, json!("1"), "eth_chainId").await;
        h.call(&b, json!("1"), "web3_clientVersion").await;

        let ra = recv(&mut a).await;
        let rb = recv(&mut b).await;
        assert_eq!(ra.id, string_id("1"));
        assert_eq!(rb.id, string_id("1"));
        assert_eq!(ra.result(), Some(&json!("0x1")));
        assert_eq!(rb.result(), Some(&json!("QuantumChain/v0.1.0")));

        assert!(timeout(Duration::from_millis(50), a.responses.recv())
            .await
            .is_err());
        assert!(timeout(Duration::from_millis(50), b.responses.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_open_method_resolves_without_round() {
        let h = harness();
        let mut conn = h.connect(DAPP);

        h.call(&conn, json!("c"), "eth_chainId").await;
        let resp = recv(&mut conn).await;
        assert_eq!(resp.id, string_id("c"));
        assert_eq!(resp.result(), Some(&json!("0x1")));

        assert_eq!(h.ui.prompt_count(), 0);
        assert!(h.bridge.permission(&origin(DAPP)).is_none());
        assert_eq!(h.bridge.snapshot().rounds_opened, 0);
    }

    #[tokio::test]
    async fn test_open_calls_not_blocked_by_pending_round() {
        let h = harness();
        let mut conn = h.connect(DAPP);

        h.call(&conn, json!("slow"), "eth_requestAccounts").await;
        h.call(&conn, json!("fast"), "eth_chainId").await;

        let resp = recv(&mut conn).await;
        assert_eq!(resp.id, string_id("fast"));
        assert!(h.bridge.is_pending(&origin(DAPP)));
    }

    #[tokio::test]
    async fn test_unknown_method_answered_with_same_id() {
        let h = harness();
        let mut conn = h.connect(DAPP);

        h.call(&conn, json!(42), "wallet_listAccounts").await;
        let resp = recv(&mut conn).await;
        assert_eq!(resp.id, Some(RequestId::Number(42)));
        assert_eq!(resp.error().unwrap().code, codes::METHOD_NOT_FOUND);
        assert_eq!(h.engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_while_pending_then_decision() {
        let h = harness();
        let conn = h.connect(DAPP);
        let mut survivor = h.connect(DAPP);

        h.call(&conn, json!("gone"), "eth_requestAccounts").await;
        h.call(&survivor, json!("here"), "eth_requestAccounts").await;
        wait_until(|| h.bridge.snapshot().rounds_joined == 1).await;

        let mux = h.bridge.multiplexer();
        mux.on_disconnect(conn.id);
        drop(conn);

        assert!(h.bridge.grant(&origin(DAPP)));
        let resp = recv(&mut survivor).await;
        assert_eq!(resp.id, string_id("here"));
        wait_until(|| h.bridge.snapshot().dropped_sends == 1).await;
    }

    // =============================================================================
    // FAILURE SEMANTICS
    // =============================================================================

    #[tokio::test]
    async fn test_unavailable_ui_denies_immediately() {
        let (ui, prompts) = create_approval_channel(4);
        drop(prompts);
        let bridge = ProviderBridge::new(
            BridgeConfig::default(),
            Arc::new(ScriptedEngine::new()),
            Arc::new(ui),
            Arc::new(InMemoryPermissionPersistence::new()),
        )
        .unwrap();
        let mux = bridge.multiplexer();
        let mut conn = mux.on_connect(&ConnectRequest::new(DAPP)).unwrap();

        mux.on_message(conn.id, r#"{"id":1,"method":"eth_sendTransaction","params":[{}]}"#)
            .await;
        let resp = recv(&mut conn).await;
        let error = resp.error().unwrap();
        assert_eq!(error.code, codes::CAPABILITY_DENIED);
        assert_eq!(error.data, Some(json!({"reason": "unavailable"})));
        assert!(!bridge.is_pending(&origin(DAPP)));
    }

    #[tokio::test]
    async fn test_eth_accounts_denial_is_empty_success() {
        let h = harness();
        let mut conn = h.connect(DAPP);

        h.call(&conn, json!(1), "eth_accounts").await;
        wait_until(|| h.bridge.is_pending(&origin(DAPP))).await;
        h.bridge.deny(&origin(DAPP));

        let resp = recv(&mut conn).await;
        assert_eq!(resp.result(), Some(&json!([])));
    }

    #[tokio::test]
    async fn test_expired_round_denies_and_keeps_record() {
        let mut config = BridgeConfig::default();
        config.approval.round_ttl = Duration::from_millis(30);
        config.approval.sweep_interval = Duration::from_millis(10);
        let h = harness_with(config);
        let sweeper = h.bridge.spawn_sweeper();
        let mut conn = h.connect(DAPP);

        h.call(&conn, json!("x"), "eth_requestAccounts").await;
        let resp = recv(&mut conn).await;
        sweeper.abort();

        let error = resp.error().unwrap();
        assert_eq!(error.code, codes::CAPABILITY_DENIED);
        assert_eq!(error.data, Some(json!({"reason": "expired"})));
        assert_eq!(
            h.bridge.permission(&origin(DAPP)).map(|r| r.state),
            Some(PermissionState::Requested)
        );
        // Late decision finds no round
        assert!(!h.bridge.grant(&origin(DAPP)));
    }

    #[tokio::test]
    async fn test_channel_ui_round_trip() {
        let (ui, mut prompts) = create_approval_channel(4);
        let bridge = Arc::new(
            ProviderBridge::new(
                BridgeConfig::default(),
                Arc::new(ScriptedEngine::new().with_result("wallet_listAccounts", json!(["0xabc"]))),
                Arc::new(ui) as Arc<dyn ApprovalUi>,
                Arc::new(InMemoryPermissionPersistence::new()),
            )
            .unwrap(),
        );

        // Trusted UI task: approve everything it is shown
        let ui_task = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                while let Some(prompt) = prompts.recv().await {
                    bridge.grant(&prompt.origin);
                }
            })
        };

        let mux = bridge.multiplexer();
        let mut conn = mux
            .on_connect(&ConnectRequest::new(DAPP).with_favicon("https://dapp.example/favicon.ico"))
            .unwrap();
        mux.on_message(conn.id, r#"{"id":"a","method":"eth_requestAccounts"}"#)
            .await;

        let resp = recv(&mut conn).await;
        ui_task.abort();
        assert_eq!(resp.result(), Some(&json!(["0xabc"])));

        let record = bridge.permission(&origin(DAPP)).unwrap();
        assert_eq!(record.state, PermissionState::Allowed);
        assert_eq!(
            record.favicon_hint.map(|h| h.as_str().to_string()),
            Some("https://dapp.example/favicon.ico".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_permissions_reflects_own_origin() {
        let h = harness();
        let mut a = h.connect(DAPP);
        let mut b = h.connect(OTHER);

        h.call(&a, json!(1), "eth_requestAccounts").await;
        wait_until(|| h.bridge.is_pending(&origin(DAPP))).await;
        h.bridge.grant(&origin(DAPP));
        recv(&mut a).await;

        h.call(&a, json!(2), "wallet_getPermissions").await;
        h.call(&b, json!(2), "wallet_getPermissions").await;
        assert_eq!(
            recv(&mut a).await.result(),
            Some(&json!([{"parentCapability": "eth_accounts", "invoker": DAPP}]))
        );
        assert_eq!(recv(&mut b).await.result(), Some(&json!([])));

        // Host revokes: the next privileged call prompts again
        h.bridge.revoke(&origin(DAPP)).unwrap();
        h.call(&a, json!(3), "eth_requestAccounts").await;
        wait_until(|| h.ui.prompt_count() == 2).await;
    }

    // =============================================================================
    // DURABILITY
    // =============================================================================

    #[tokio::test]
    async fn test_grant_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.json");

        {
            let ui = Arc::new(RecordingApprovalUi::new());
            let bridge = ProviderBridge::new(
                BridgeConfig::default(),
                Arc::new(ScriptedEngine::new()),
                ui.clone(),
                Arc::new(JsonFilePermissionPersistence::open(path.clone()).unwrap()),
            )
            .unwrap();
            let mux = bridge.multiplexer();
            let mut conn = mux.on_connect(&ConnectRequest::new(DAPP)).unwrap();
            mux.on_message(conn.id, r#"{"id":1,"method":"eth_requestAccounts"}"#)
                .await;
            wait_until(|| ui.prompt_count() == 1).await;
            bridge.grant(&origin(DAPP));
            assert!(recv(&mut conn).await.result().is_some());
        }

        let ui = Arc::new(RecordingApprovalUi::new());
        let bridge = ProviderBridge::new(
            BridgeConfig::default(),
            Arc::new(ScriptedEngine::new()),
            ui.clone(),
            Arc::new(JsonFilePermissionPersistence::open(path.clone()).unwrap()),
        )
        .unwrap();
        let mux = bridge.multiplexer();
        let mut conn = mux.on_connect(&ConnectRequest::new(DAPP)).unwrap();
        mux.on_message(conn.id, r#"{"id":2,"method":"eth_requestAccounts"}"#)
            .await;

        assert!(recv(&mut conn).await.result().is_some());
        assert_eq!(ui.prompt_count(), 0);
    }
}
