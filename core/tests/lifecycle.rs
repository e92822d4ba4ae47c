//! End-to-end lifecycle tests against the in-memory network.
//!
//! Each test builds its own two-peer network, orderer and event source, so
//! nothing is shared between tests. Timing-sensitive tests run on a paused
//! clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use hfc_core::config::{ClientConfig, EndpointConfig, NetworkConfig};
use hfc_core::events::{EventHub, TxValidationCode};
use hfc_core::identity::{derive_transaction_id, SigningIdentity, TransactionId};
use hfc_core::crypto::Nonce;
use hfc_core::transaction::{
    validate, ProposalBuilder, ProposalKind, ProposalResponse, SignedProposal, SubmissionOutcome,
    TransactionRequest,
};
use hfc_core::transport::{MemoryOrderer, MemoryPeerNetwork, PeerRef};
use hfc_core::{Channel, Client, ClientError};

const CHAINCODE: &str = "end2end";

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Harness {
    client: Client,
    channel: Channel,
    peers: Arc<MemoryPeerNetwork>,
    orderer: Arc<MemoryOrderer>,
}

fn peer_refs() -> Vec<PeerRef> {
    vec![
        PeerRef::new("peer1", "grpcs://localhost:7051"),
        PeerRef::new("peer2", "grpcs://localhost:8051"),
    ]
}

fn config() -> ClientConfig {
    ClientConfig {
        proposal_timeout_ms: 2_000,
        event_timeout_ms: 5_000,
        network: NetworkConfig {
            channel: "mychannel".into(),
            orderer: Some(EndpointConfig::new("orderer0", "grpcs://localhost:7050")),
            peers: peer_refs()
                .iter()
                .map(|p| EndpointConfig::new(p.name.clone(), p.url.clone()))
                .collect(),
        },
        ..ClientConfig::default()
    }
}

async fn setup() -> Harness {
    let peers = Arc::new(MemoryPeerNetwork::new());
    peers.add_peer(&peer_refs()[0], "Org1MSP");
    peers.add_peer(&peer_refs()[1], "Org2MSP");
    let orderer = Arc::new(MemoryOrderer::new());
    orderer.add_organization("Org1MSP");
    orderer.add_organization("Org2MSP");

    let client = Client::new(config(), peers.clone(), orderer.clone());
    client.set_event_transport(Arc::new(orderer.event_source()));
    client
        .set_user_context(SigningIdentity::generate("admin", "Org1MSP"))
        .await
        .unwrap();
    let channel = client.channel_from_config().unwrap();

    Harness {
        client,
        channel,
        peers,
        orderer,
    }
}

/// Deploys `version` of the test chaincode on both peers through proposals.
async fn deploy(h: &Harness, version: &str) {
    for kind in [ProposalKind::Install, ProposalKind::Instantiate] {
        let request = h
            .channel
            .build_request(
                ProposalBuilder::new(kind)
                    .chaincode(CHAINCODE)
                    .version(version)
                    .path("github.com/example_cc"),
            )
            .unwrap();
        let results = h.channel.send_proposal(&request).await.unwrap();
        assert!(validate(&results.responses), "{kind} failed: {:?}", results.responses);
    }
}

async fn connected_hub(h: &Harness) -> EventHub {
    let hub = h.client.new_event_hub();
    hub.connect(peer_refs()[0].clone()).await.unwrap();
    assert!(hub.is_connected());
    hub
}

fn upgrade_request(h: &Harness, chaincode: &str, version: &str) -> hfc_core::transaction::ProposalRequest {
    h.channel
        .build_request(
            ProposalBuilder::new(ProposalKind::Upgrade)
                .chaincode(chaincode)
                .version(version)
                .function("init")
                .args(["a", "100", "b", "200"]),
        )
        .unwrap()
}

// ---------------------------------------------------------------------------
// 1. Transaction ids
// ---------------------------------------------------------------------------

#[test]
fn transaction_ids_are_deterministic_per_nonce() {
    let identity = SigningIdentity::generate("admin", "Org1MSP");
    let nonce = Nonce::generate();
    assert_eq!(
        derive_transaction_id(&nonce, &identity).unwrap(),
        derive_transaction_id(&nonce, &identity).unwrap()
    );
    assert_ne!(
        derive_transaction_id(&Nonce::generate(), &identity).unwrap(),
        derive_transaction_id(&Nonce::generate(), &identity).unwrap()
    );
}

// ---------------------------------------------------------------------------
// 2. Happy path: propose, submit, observe commit and chaincode event
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invoke_is_endorsed_submitted_and_committed() {
    let h = setup().await;
    deploy(&h, "v0").await;
    let hub = connected_hub(&h).await;

    let request = h
        .channel
        .create_request(CHAINCODE, Vec::new(), "move", ["a", "b", "100"])
        .unwrap();
    let tx_id = request.tx_id().clone();

    let (commit_tx, commit_rx) = oneshot::channel();
    hub.register_tx_event(tx_id.clone(), Duration::from_secs(5), move |res| {
        let _ = commit_tx.send(res);
    })
    .unwrap();
    let (event_tx, event_rx) = oneshot::channel();
    hub.register_chaincode_event(CHAINCODE, "^move$", Duration::from_secs(5), move |res| {
        let _ = event_tx.send(res);
    })
    .unwrap();

    let results = h.channel.send_proposal(&request).await.unwrap();
    assert_eq!(results.responses.len(), 2);
    assert!(results.is_valid());
    assert_eq!(results.header.tx_id(), &tx_id);

    let outcome = h.channel.send_transaction(Some(results.into())).await.unwrap();
    assert_eq!(
        outcome,
        SubmissionOutcome::Accepted {
            tx_id: tx_id.clone(),
            status: 200
        }
    );

    let commit = commit_rx.await.unwrap().unwrap();
    assert_eq!(commit.tx_id, tx_id);
    assert_eq!(commit.validation_code, TxValidationCode::Valid);

    let event = event_rx.await.unwrap().unwrap();
    assert_eq!(event.tx_id, tx_id);
    assert_eq!(event.payload, b"a,b,100".to_vec());
    assert_eq!(hub.pending_count(), 0);
}

// ---------------------------------------------------------------------------
// 3. Fan-out keeps one aligned entry per target
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fan_out_returns_one_entry_per_target_in_order() {
    let h = setup().await;
    deploy(&h, "v0").await;
    h.peers.set_online("peer2", false);

    let targets = vec![
        peer_refs()[0].clone(),
        peer_refs()[1].clone(),
        PeerRef::new("peer9", "grpcs://localhost:9051"),
    ];
    let request = h
        .channel
        .create_request(CHAINCODE, targets, "query", ["a"])
        .unwrap();
    let results = h.channel.send_proposal(&request).await.unwrap();

    let peers: Vec<&str> = results.responses.iter().map(ProposalResponse::peer).collect();
    assert_eq!(peers, vec!["peer1", "peer2", "peer9"]);
    assert!(results.responses[0].is_success());
    assert!(matches!(
        &results.responses[1],
        ProposalResponse::Failed { error: ClientError::TransportError { message, .. }, .. }
            if message.contains("ECONNREFUSED")
    ));
    assert!(!results.is_valid());
}

#[tokio::test(start_paused = true)]
async fn slow_peer_is_bounded_by_proposal_timeout() {
    let h = setup().await;
    deploy(&h, "v0").await;
    h.peers.set_latency("peer1", Duration::from_secs(60));

    let start = tokio::time::Instant::now();
    let request = h
        .channel
        .create_request(CHAINCODE, Vec::new(), "query", ["a"])
        .unwrap();
    let results = h.channel.send_proposal(&request).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(60));
    assert!(!results.responses[0].is_success());
    assert!(results.responses[1].is_success());
}

// ---------------------------------------------------------------------------
// 4. Validation guards submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_chaincode_blocks_submission() {
    let h = setup().await;
    deploy(&h, "v0").await;

    let request = h
        .channel
        .create_request(CHAINCODE, Vec::new(), "fail", Vec::<String>::new())
        .unwrap();
    let results = h.channel.send_proposal(&request).await.unwrap();
    assert_eq!(results.responses[0].status(), Some(500));
    assert!(!validate(&results.responses));

    match h.channel.send_transaction(Some(results.into())).await.unwrap() {
        SubmissionOutcome::Rejected { code, message } => {
            assert_eq!(code, 500);
            assert!(message.contains("returned an error"), "{message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.orderer.height(), 0);
}

#[tokio::test]
async fn invoke_of_unknown_chaincode_is_rejected_with_not_found() {
    let h = setup().await;
    deploy(&h, "v0").await;

    let request = h
        .channel
        .create_request("dummy", Vec::new(), "move", ["a", "b", "1"])
        .unwrap();
    let results = h.channel.send_proposal(&request).await.unwrap();

    match h.channel.send_transaction(Some(results.into())).await.unwrap() {
        SubmissionOutcome::Rejected { code, message } => {
            assert_ne!(code, 0);
            assert_eq!(message, "chaincode dummy not found");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.orderer.height(), 0);
}

#[tokio::test]
async fn tampered_request_is_rejected_before_the_orderer() {
    let h = setup().await;
    deploy(&h, "v0").await;

    let request = h
        .channel
        .create_request(CHAINCODE, Vec::new(), "move", ["a", "b", "1"])
        .unwrap();
    let results = h.channel.send_proposal(&request).await.unwrap();
    assert!(results.is_valid());

    let mut wrong_tx_id = TransactionRequest::from(results.clone());
    wrong_tx_id.header.channel_header.tx_id = TransactionId::from_string("forged");

    let mut garbage_proposal = TransactionRequest::from(results);
    garbage_proposal.proposal = SignedProposal {
        proposal_bytes: b"not a proposal".to_vec(),
        signature: garbage_proposal.proposal.signature.clone(),
    };

    for tampered in [wrong_tx_id, garbage_proposal] {
        match h.channel.send_transaction(Some(tampered)).await.unwrap() {
            SubmissionOutcome::Rejected { code, .. } => assert_eq!(code, 400),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(h.orderer.height(), 0);
}

#[tokio::test]
async fn missing_orderer_and_missing_body() {
    let h = setup().await;
    let bare = h.client.new_channel("mychannel");
    assert!(matches!(
        bare.send_transaction(None).await.unwrap(),
        SubmissionOutcome::OrdererUnreachable { .. }
    ));

    match h.channel.send_transaction(None).await.unwrap() {
        SubmissionOutcome::Rejected { code, message } => {
            assert_ne!(code, 0);
            assert_eq!(message, "missing transaction request");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn offline_orderer_is_unreachable() {
    let h = setup().await;
    deploy(&h, "v0").await;
    h.orderer.set_online(false);

    let request = h
        .channel
        .create_request(CHAINCODE, Vec::new(), "move", ["a", "b", "1"])
        .unwrap();
    let results = h.channel.send_proposal(&request).await.unwrap();
    let outcome = h.channel.send_transaction(Some(results.into())).await.unwrap();
    assert!(matches!(outcome, SubmissionOutcome::OrdererUnreachable { .. }));
}

// ---------------------------------------------------------------------------
// 5. Chaincode upgrade failures
// ---------------------------------------------------------------------------

async fn upgrade_failure(h: &Harness, chaincode: &str, version: &str) -> String {
    let results = h
        .channel
        .send_upgrade_proposal(&upgrade_request(h, chaincode, version))
        .await
        .unwrap();
    match h.channel.send_transaction(Some(results.into())).await {
        Ok(SubmissionOutcome::Rejected { message, .. }) => message,
        other => panic!("upgrade should have been rejected: {other:?}"),
    }
}

#[tokio::test]
async fn upgrade_to_running_version_fails_with_exists() {
    let h = setup().await;
    deploy(&h, "v0").await;
    assert!(upgrade_failure(&h, CHAINCODE, "v0").await.contains("exists"));
}

#[tokio::test]
async fn upgrade_of_unknown_chaincode_fails_with_not_found() {
    let h = setup().await;
    deploy(&h, "v0").await;
    assert!(upgrade_failure(&h, "dummy", "v1").await.contains("not found"));
}

#[tokio::test]
async fn upgrade_to_uninstalled_version_fails_with_missing_package() {
    let h = setup().await;
    deploy(&h, "v0").await;
    assert!(upgrade_failure(&h, CHAINCODE, "v333333999")
        .await
        .contains("no such file or directory"));
}

#[tokio::test]
async fn upgrade_to_installed_version_succeeds() {
    let h = setup().await;
    deploy(&h, "v0").await;
    for peer in peer_refs() {
        h.peers.install_chaincode(&peer.name, CHAINCODE, "v1");
    }

    let results = h
        .channel
        .send_upgrade_proposal(&upgrade_request(&h, CHAINCODE, "v1"))
        .await
        .unwrap();
    assert!(results.is_valid());
    let outcome = h.channel.send_transaction(Some(results.into())).await.unwrap();
    assert!(outcome.is_accepted());
    assert_eq!(
        h.peers.instantiated_version("peer2", CHAINCODE).as_deref(),
        Some("v1")
    );
}

// ---------------------------------------------------------------------------
// 6. Commit-time rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resubmitted_transaction_is_invalid_duplicate() {
    let h = setup().await;
    deploy(&h, "v0").await;
    let hub = connected_hub(&h).await;

    let request = h
        .channel
        .create_request(CHAINCODE, Vec::new(), "move", ["a", "b", "5"])
        .unwrap();
    let tx_id = request.tx_id().clone();
    let results = h.channel.send_proposal(&request).await.unwrap();

    let first = hub.wait_for_tx_event(tx_id.clone(), Duration::from_secs(5));
    let (commit, outcome) = tokio::join!(
        first,
        h.channel.send_transaction(Some(results.clone().into()))
    );
    assert!(outcome.unwrap().is_accepted());
    assert!(commit.is_ok());

    let second = hub.wait_for_tx_event(tx_id.clone(), Duration::from_secs(5));
    let (commit, outcome) = tokio::join!(
        second,
        h.channel.send_transaction(Some(results.into()))
    );
    assert!(outcome.unwrap().is_accepted());
    assert_eq!(
        commit.unwrap_err(),
        ClientError::InvalidTransaction {
            tx_id: tx_id.to_string(),
            code: "DUPLICATE_TXID".into(),
        }
    );
}

// ---------------------------------------------------------------------------
// 7. Event timeouts and cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn chaincode_event_without_emission_times_out_after_deadline() {
    let h = setup().await;
    let hub = connected_hub(&h).await;

    let start = tokio::time::Instant::now();
    let result = hub
        .wait_for_chaincode_event(CHAINCODE, "^never$", Duration::from_millis(1_500))
        .await;

    assert_eq!(result, Err(ClientError::Timeout { waited_ms: 1_500 }));
    assert!(start.elapsed() >= Duration::from_millis(1_500));
}

#[tokio::test]
async fn unregistered_listener_misses_commit() {
    let h = setup().await;
    deploy(&h, "v0").await;
    let hub = connected_hub(&h).await;

    let request = h
        .channel
        .create_request(CHAINCODE, Vec::new(), "move", ["a", "b", "7"])
        .unwrap();
    let (tx, mut rx) = oneshot::channel::<()>();
    let handle = hub
        .register_tx_event(request.tx_id().clone(), Duration::from_secs(5), move |_| {
            let _ = tx.send(());
        })
        .unwrap();
    assert!(hub.unregister(&handle));

    let results = h.channel.send_proposal(&request).await.unwrap();
    h.channel
        .send_transaction(Some(results.into()))
        .await
        .unwrap();
    // Wait for the commit to go through the hub using a second listener.
    hub.wait_for_tx_event(request.tx_id().clone(), Duration::from_millis(200))
        .await
        .ok();

    assert!(rx.try_recv().is_err());
    assert!(!hub.unregister(&handle));
}

// ---------------------------------------------------------------------------
// 8. Channel configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initialize_reads_organizations_from_orderer() {
    let h = setup().await;
    assert!(!h.channel.is_initialized());
    assert!(h.channel.organization_units().is_empty());

    let config = h.channel.initialize().await.unwrap();
    assert_eq!(config.channel_id, "mychannel");

    let orgs = h.channel.organization_units();
    assert_eq!(orgs.len(), 2);
    assert!(orgs[0].starts_with("Org"), "{orgs:?}");
    assert!(h.channel.is_initialized());
}

#[tokio::test]
async fn initialize_without_reachable_orderer_fails() {
    let h = setup().await;
    let bare = h.client.new_channel("mychannel");
    assert!(matches!(
        bare.initialize().await,
        Err(ClientError::OrdererUnreachable(_))
    ));

    h.orderer.set_online(false);
    assert!(matches!(
        h.channel.initialize().await,
        Err(ClientError::OrdererUnreachable(_))
    ));
    assert!(h.channel.organization_units().is_empty());
}

// ---------------------------------------------------------------------------
// 9. Identity requirements
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_need_a_user() {
    let client = Client::new(
        config(),
        Arc::new(MemoryPeerNetwork::new()),
        Arc::new(MemoryOrderer::new()),
    );
    let channel = client.channel_from_config().unwrap();
    let err = channel
        .create_request(CHAINCODE, Vec::new(), "move", ["a"])
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidIdentity(_)));
}
