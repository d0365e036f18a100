#[cfg(test)]
mod protocol_test {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use node::signer::{Commitment, CommitmentList, Signer};
    use types::{
        errors::TssError,
        network::Network,
        network_event::{SelfRequest, SelfResponse},
        payload::{Command, Payload},
    };

    use crate::{mocks::network::MockCluster, util::setup};

    fn encode(sender: &str, command: Command, message: &[u8], package: Vec<u8>) -> Vec<u8> {
        Payload::new(sender, command, message, package)
            .encode()
            .unwrap()
    }

    /// A genuine commitment from node `index`, produced outside of its running node.
    async fn commitment_of(cluster: &MockCluster, index: usize) -> Commitment {
        let key_set = cluster.protocol(index).key_set().await.unwrap();
        let mut signer = Signer::new(cluster.identity(index), 2, 3).unwrap();
        signer.install_key_set(&key_set).unwrap();
        signer.commit().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn forged_commitments_are_dropped() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        cluster.set_offline(1, true);
        cluster.set_offline(2, true);

        let coordinator = cluster.protocol(0).clone();
        let signing = tokio::spawn(async move { coordinator.start_signing(b"example").await });
        cluster.settle().await;
        assert!(cluster.protocol(0).session_counts().await.coordinator_open);

        let genuine = commitment_of(&cluster, 2).await.encode().unwrap();

        // sender field does not match the publishing peer
        let claims_other = encode(
            cluster.identity(2),
            Command::CommitmentShare,
            b"example",
            genuine.clone(),
        );
        assert_matches!(
            cluster.protocol(0).handle_inbound(cluster.identity(1), &claims_other).await,
            Err(TssError::Impersonation { .. })
        );

        // package identifier does not match the publishing peer
        let foreign_package = encode(
            cluster.identity(1),
            Command::CommitmentShare,
            b"example",
            genuine.clone(),
        );
        assert_matches!(
            cluster.protocol(0).handle_inbound(cluster.identity(1), &foreign_package).await,
            Err(TssError::Impersonation { .. })
        );
        assert_eq!(cluster.protocol(0).session_counts().await.commitments, 0);

        let honest = encode(cluster.identity(2), Command::CommitmentShare, b"example", genuine);
        cluster
            .protocol(0)
            .handle_inbound(cluster.identity(2), &honest)
            .await
            .unwrap();
        assert_eq!(cluster.protocol(0).session_counts().await.commitments, 1);

        // nobody online answers SIGN
        assert_matches!(
            signing.await.unwrap(),
            Err(TssError::QuorumTimeout { collected: 0, required: 1, .. })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_session_does_not_commit_after_quorum() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        cluster.set_offline(1, true);
        cluster.set_offline(2, true);

        let coordinator = cluster.protocol(0).clone();
        let first = tokio::spawn(async move { coordinator.start_signing(b"first").await });
        cluster.settle().await;

        // reach quorum for the first session, then replace it before it runs again
        for index in [1, 2] {
            let share = encode(
                cluster.identity(index),
                Command::CommitmentShare,
                b"first",
                commitment_of(&cluster, index).await.encode().unwrap(),
            );
            cluster
                .protocol(0)
                .handle_inbound(cluster.identity(index), &share)
                .await
                .unwrap();
        }
        let mut second = Box::pin(cluster.protocol(0).start_signing(b"second"));
        std::future::poll_fn(|cx| {
            let _ = std::future::Future::poll(second.as_mut(), cx);
            std::task::Poll::Ready(())
        })
        .await;

        assert_matches!(first.await.unwrap(), Err(TssError::SessionReplaced));
        assert_eq!(cluster.protocol(0).pending_nonces().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn impersonation_through_the_node_loop_does_not_count() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        cluster.set_offline(1, true);
        cluster.set_offline(2, true);

        let pending = cluster.nodes[0]
            .network
            .send_self_request(
                SelfRequest::StartSigning {
                    message: b"example".to_vec(),
                },
                true,
            )
            .unwrap()
            .unwrap();
        cluster.settle().await;

        let forged = encode(
            cluster.identity(1),
            Command::CommitmentShare,
            b"example",
            commitment_of(&cluster, 1).await.encode().unwrap(),
        );
        cluster.inject(0, cluster.identity(2), forged);
        cluster.settle().await;

        assert_eq!(cluster.protocol(0).session_counts().await.commitments, 0);
        assert_matches!(pending.await.unwrap(), SelfResponse::Failed { reason } => {
            assert!(reason.starts_with("Quorum timeout in commitment phase"));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_requests_do_not_stop_the_node_loop() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);

        for request in [SelfRequest::ListPeers, SelfRequest::GroupPublicKey] {
            let pending = cluster.nodes[0]
                .network
                .send_self_request(request, true)
                .unwrap();
            drop(pending);
        }
        cluster.settle().await;

        assert_matches!(
            cluster.sign(0, b"still running").await,
            SelfResponse::SigningFinished { .. }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payloads_are_dropped() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let origin = cluster.identity(0);

        assert_matches!(
            cluster.protocol(1).handle_inbound(origin, b"not json").await,
            Err(TssError::Decode(_))
        );

        let bad_hex = format!(
            r#"{{"sender":"{origin}","command":"COMMITMENT","message":"zz","package":""}}"#
        );
        assert_matches!(
            cluster.protocol(1).handle_inbound(origin, bad_hex.as_bytes()).await,
            Err(TssError::Decode(_))
        );

        let unknown_command = format!(
            r#"{{"sender":"{origin}","command":"SHUTDOWN","message":"","package":""}}"#
        );
        assert_matches!(
            cluster.protocol(1).handle_inbound(origin, unknown_command.as_bytes()).await,
            Err(TssError::Decode(_))
        );
        assert!(!cluster.protocol(1).session_counts().await.participant_open);
    }

    #[tokio::test(start_paused = true)]
    async fn participant_serves_one_session_at_a_time() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let participant = cluster.protocol(1);
        let (first, second) = (cluster.identity(0), cluster.identity(2));

        let request = encode(first, Command::Commitment, b"first", Vec::new());
        participant.handle_inbound(first, &request).await.unwrap();
        assert!(participant.session_counts().await.participant_open);
        assert_eq!(participant.pending_nonces().await, 1);

        // the same request again resends the held commitment
        participant.handle_inbound(first, &request).await.unwrap();
        assert_eq!(participant.pending_nonces().await, 1);
        cluster.settle().await;
        let shares = cluster.delivered(Command::CommitmentShare);
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].package, shares[1].package);

        let competing = encode(second, Command::Commitment, b"second", Vec::new());
        assert_matches!(
            participant.handle_inbound(second, &competing).await,
            Err(TssError::SessionBusy)
        );

        let wrong_coordinator = encode(second, Command::Sign, b"first", Vec::new());
        assert_matches!(
            participant.handle_inbound(second, &wrong_coordinator).await,
            Err(TssError::SessionMismatch(_))
        );

        tokio::time::advance(Duration::from_secs(16)).await;

        participant.handle_inbound(second, &competing).await.unwrap();
        assert!(participant.session_counts().await.participant_open);
        assert_eq!(participant.pending_nonces().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn coordinator_moving_on_replaces_its_participant_session() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        cluster.set_offline(0, true);
        let participant = cluster.protocol(1);
        let coordinator = cluster.identity(0);

        let stale = encode(coordinator, Command::Commitment, b"stale", Vec::new());
        participant.handle_inbound(coordinator, &stale).await.unwrap();
        let fresh = encode(coordinator, Command::Commitment, b"fresh", Vec::new());
        participant.handle_inbound(coordinator, &fresh).await.unwrap();

        assert!(participant.session_counts().await.participant_open);
        assert_eq!(participant.pending_nonces().await, 1);

        // the stale session is gone, so its SIGN no longer matches
        let sign_stale = encode(coordinator, Command::Sign, b"stale", Vec::new());
        assert_matches!(
            participant.handle_inbound(coordinator, &sign_stale).await,
            Err(TssError::SessionMismatch(_))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn list_without_own_commitment_closes_the_session() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let participant = cluster.protocol(1);
        let coordinator = cluster.identity(0);

        let request = encode(coordinator, Command::Commitment, b"example", Vec::new());
        participant.handle_inbound(coordinator, &request).await.unwrap();

        let mut list = CommitmentList::new();
        list.insert(commitment_of(&cluster, 0).await);
        list.insert(commitment_of(&cluster, 2).await);
        let sign = encode(coordinator, Command::Sign, b"example", list.encode().unwrap());

        assert_matches!(
            participant.handle_inbound(coordinator, &sign).await,
            Err(TssError::SessionMismatch(_))
        );
        assert!(!participant.session_counts().await.participant_open);
        assert_eq!(participant.pending_nonces().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn strays_without_a_session_are_ignored() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let origin = cluster.identity(2);
        let share = encode(
            origin,
            Command::CommitmentShare,
            b"example",
            commitment_of(&cluster, 2).await.encode().unwrap(),
        );

        assert_matches!(
            cluster.protocol(0).handle_inbound(origin, &share).await,
            Err(TssError::SessionMismatch(_))
        );
        assert_matches!(
            cluster
                .protocol(0)
                .handle_inbound(origin, &encode(origin, Command::Sign, b"example", Vec::new()))
                .await,
            Err(TssError::SessionMismatch(_))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn own_payloads_are_ignored() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let me = cluster.identity(0);
        let request = encode(me, Command::Commitment, b"echo", Vec::new());

        cluster.protocol(0).handle_inbound(me, &request).await.unwrap();

        assert!(!cluster.protocol(0).session_counts().await.participant_open);
        assert_eq!(cluster.protocol(0).pending_nonces().await, 0);
    }
}
