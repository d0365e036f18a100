#[cfg(test)]
mod signing_test {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use tokio::time::Instant;
    use tracing::info;
    use types::{network_event::SelfResponse, payload::Command};

    use crate::{mocks::network::MockCluster, util::setup};

    async fn group_key(cluster: &MockCluster) -> Vec<u8> {
        let key = cluster
            .protocol(0)
            .group_public_key_hex()
            .await
            .expect("cluster has a key");
        hex::decode(key).unwrap()
    }

    fn signature_of(response: SelfResponse) -> Vec<u8> {
        assert_matches!(response, SelfResponse::SigningFinished { signature, .. } => signature)
    }

    fn failure_of(response: SelfResponse) -> String {
        assert_matches!(response, SelfResponse::Failed { reason } => reason)
    }

    #[tokio::test(start_paused = true)]
    async fn all_peers_online_sign_without_waiting() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let key = group_key(&cluster).await;

        let started = Instant::now();
        let response = cluster.sign(0, b"example").await;
        let elapsed = started.elapsed();

        assert_matches!(&response, SelfResponse::SigningFinished { message, .. } => {
            assert_eq!(message, b"example");
        });
        let signature = signature_of(response);
        assert_eq!(signature.len(), 65);
        assert!(node::verifier::verify(b"example", &signature, &key));
        assert!(elapsed < Duration::from_secs(5));
        info!("Signed in {elapsed:?}");

        cluster.settle().await;
        assert_eq!(cluster.delivered(Command::Commitment).len(), 1);
        assert_eq!(cluster.delivered(Command::CommitmentShare).len(), 2);
        assert_eq!(cluster.delivered(Command::Sign).len(), 1);
        assert_eq!(cluster.delivered(Command::SignatureShare).len(), 2);
        for index in 0..3 {
            assert_eq!(cluster.protocol(index).pending_nonces().await, 0);
            assert!(!cluster.protocol(index).session_counts().await.participant_open);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_peer_offline_signs_after_commitment_timeout() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let key = group_key(&cluster).await;
        cluster.set_offline(2, true);

        let started = Instant::now();
        let signature = signature_of(cluster.sign(0, b"example").await);

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(node::verifier::verify(b"example", &signature, &key));
        assert_eq!(cluster.delivered(Command::SignatureShare).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn below_threshold_fails_in_commitment_phase() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        cluster.set_offline(1, true);
        cluster.set_offline(2, true);

        let reason = failure_of(cluster.sign(0, b"example").await);

        assert_eq!(
            reason,
            "Quorum timeout in commitment phase: collected 0, required 1"
        );
        assert!(cluster.delivered(Command::Sign).is_empty());
        assert_eq!(cluster.protocol(0).pending_nonces().await, 0);
        assert!(!cluster.protocol(0).session_counts().await.coordinator_open);
    }

    #[tokio::test(start_paused = true)]
    async fn any_surviving_pair_can_sign() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let key = group_key(&cluster).await;

        cluster.set_offline(2, true);
        let first = signature_of(cluster.sign(0, b"rotate").await);
        assert!(node::verifier::verify(b"rotate", &first, &key));

        cluster.set_offline(2, false);
        cluster.set_offline(1, true);
        let second = signature_of(cluster.sign(0, b"rotate").await);
        assert!(node::verifier::verify(b"rotate", &second, &key));

        cluster.set_offline(2, true);
        let reason = failure_of(cluster.sign(0, b"rotate").await);
        assert!(reason.starts_with("Quorum timeout in commitment phase"));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_signing_uses_fresh_nonces() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let key = group_key(&cluster).await;

        let first = signature_of(cluster.sign(0, b"same message").await);
        let second = signature_of(cluster.sign(0, b"same message").await);

        assert_ne!(first, second);
        assert!(node::verifier::verify(b"same message", &first, &key));
        assert!(node::verifier::verify(b"same message", &second, &key));
    }

    #[tokio::test(start_paused = true)]
    async fn every_node_can_coordinate() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let key = group_key(&cluster).await;

        for index in 0..3 {
            let message = format!("from node {index}");
            let signature = signature_of(cluster.sign(index, message.as_bytes()).await);
            assert!(node::verifier::verify(message.as_bytes(), &signature, &key));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn participant_lost_after_commitment_fails_signature_phase() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        cluster.set_offline(2, true);
        cluster.leave_after(1, Command::CommitmentShare);

        let started = Instant::now();
        let reason = failure_of(cluster.sign(0, b"example").await);

        assert_eq!(
            reason,
            "Quorum timeout in signature phase: collected 0, required 1"
        );
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert_eq!(cluster.delivered(Command::Sign).len(), 1);
        assert_eq!(cluster.protocol(0).pending_nonces().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn signing_without_a_key_fails() {
        setup();
        let cluster = MockCluster::without_keys(2, 3);

        let reason = failure_of(cluster.sign(0, b"example").await);

        assert_eq!(reason, "No threshold key loaded");
        assert!(cluster.delivered(Command::Commitment).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn three_of_five_tolerates_two_offline() {
        setup();
        let cluster = MockCluster::with_keys(3, 5);
        let key = group_key(&cluster).await;
        cluster.set_offline(3, true);
        cluster.set_offline(4, true);

        let signature = signature_of(cluster.sign(1, b"quorum").await);
        assert!(node::verifier::verify(b"quorum", &signature, &key));

        cluster.set_offline(2, true);
        let reason = failure_of(cluster.sign(1, b"quorum").await);
        assert_eq!(
            reason,
            "Quorum timeout in commitment phase: collected 1, required 2"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_quorum_timeout_collects_held_commitments() {
        setup();
        let cluster = MockCluster::with_keys(3, 3);
        let key = group_key(&cluster).await;
        cluster.set_offline(2, true);

        let reason = failure_of(cluster.sign(0, b"retry").await);
        assert_eq!(
            reason,
            "Quorum timeout in commitment phase: collected 1, required 2"
        );
        // node 1 still holds its commitment for the abandoned attempt
        assert!(cluster.protocol(1).session_counts().await.participant_open);

        cluster.set_offline(2, false);
        let started = Instant::now();
        let signature = signature_of(cluster.sign(0, b"retry").await);

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(node::verifier::verify(b"retry", &signature, &key));
        cluster.settle().await;
        for index in 0..3 {
            assert_eq!(cluster.protocol(index).pending_nonces().await, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn newer_request_replaces_unfinished_session() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let key = group_key(&cluster).await;

        let (first, second) = tokio::join!(cluster.sign(0, b"first"), cluster.sign(0, b"second"));

        // participants follow the coordinator to its newest request
        let (message, signature, reason) = match (first, second) {
            (SelfResponse::SigningFinished { message, signature }, other)
            | (other, SelfResponse::SigningFinished { message, signature }) => {
                (message, signature, failure_of(other))
            }
            (first, second) => panic!("neither request signed: {first:?}, {second:?}"),
        };
        assert_eq!(
            reason,
            "Coordinator session replaced by a newer signing request"
        );
        assert!(node::verifier::verify(&message, &signature, &key));

        cluster.settle().await;
        for index in 0..3 {
            assert_eq!(cluster.protocol(index).pending_nonces().await, 0);
            assert!(!cluster.protocol(index).session_counts().await.participant_open);
        }
    }
}
