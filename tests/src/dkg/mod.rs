#[cfg(test)]
mod dkg_test {
    use assert_matches::assert_matches;
    use node::{key_manager::load_threshold_key, signer::Signer};
    use tracing::info;
    use types::{
        errors::TssError,
        network_event::SelfResponse,
        payload::{Command, Payload},
    };

    use crate::{mocks::network::MockCluster, util::setup};

    async fn group_keys(cluster: &MockCluster) -> Vec<Option<String>> {
        let mut keys = Vec::new();
        for index in 0..cluster.nodes.len() {
            keys.push(cluster.protocol(index).group_public_key_hex().await);
        }
        keys
    }

    #[tokio::test(start_paused = true)]
    async fn ceremony_over_gossip_gives_every_node_the_same_key() {
        setup();
        let cluster = MockCluster::without_keys(2, 3);

        assert_matches!(
            cluster.start_dkg(0).await,
            SelfResponse::DkgStarted { started: true }
        );
        cluster.settle().await;

        let keys = group_keys(&cluster).await;
        let first = keys[0].clone().expect("node 0 finished DKG");
        info!("Group key {first}");
        assert!(keys.iter().all(|key| key.as_deref() == Some(first.as_str())));

        for node in &cluster.nodes {
            let stored = load_threshold_key(node.storage.as_ref())
                .unwrap()
                .expect("key persisted");
            assert_eq!(stored.group_public_key_hex().unwrap(), first);
            assert_eq!((stored.threshold, stored.participants), (2, 3));
            assert!(stored.public_key_package.is_some());
        }
        assert_eq!(cluster.delivered(Command::DkgRound2).len(), 3);
        for index in 0..3 {
            assert_eq!(cluster.protocol(index).dkg_status().await, (false, 0, 0));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn generated_key_signs() {
        setup();
        let cluster = MockCluster::without_keys(2, 3);
        cluster.start_dkg(1).await;
        cluster.settle().await;

        let key = hex::decode(cluster.protocol(2).group_public_key_hex().await.unwrap()).unwrap();
        let response = cluster.sign(2, b"after dkg").await;

        assert_matches!(response, SelfResponse::SigningFinished { signature, .. } => {
            assert!(node::verifier::verify(b"after dkg", &signature, &key));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_completes_the_ceremony() {
        setup();
        let cluster = MockCluster::without_keys(2, 3);
        cluster.set_offline(2, true);

        cluster.start_dkg(0).await;
        cluster.settle().await;

        assert_eq!(cluster.protocol(0).dkg_status().await, (true, 2, 0));
        assert_eq!(cluster.protocol(1).dkg_status().await, (true, 2, 0));
        assert_eq!(cluster.protocol(2).dkg_status().await, (false, 0, 0));
        assert!(cluster.delivered(Command::DkgRound2).is_empty());

        cluster.reconnect(2);
        cluster.settle().await;

        let keys = group_keys(&cluster).await;
        assert!(keys[0].is_some());
        assert!(keys.iter().all(|key| *key == keys[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_refused_while_running() {
        setup();
        let cluster = MockCluster::without_keys(2, 3);
        cluster.set_offline(2, true);

        assert_matches!(
            cluster.start_dkg(0).await,
            SelfResponse::DkgStarted { started: true }
        );
        cluster.settle().await;

        assert_matches!(
            cluster.start_dkg(0).await,
            SelfResponse::DkgStarted { started: false }
        );
        // node 1 joined when it saw the first round 1 message
        assert_matches!(
            cluster.start_dkg(1).await,
            SelfResponse::DkgStarted { started: false }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn existing_key_is_kept() {
        setup();
        let cluster = MockCluster::with_keys(2, 3);
        let before = cluster.protocol(0).group_public_key_hex().await;

        assert_matches!(
            cluster.start_dkg(0).await,
            SelfResponse::DkgStarted { started: false }
        );
        cluster.settle().await;

        assert!(cluster.delivered(Command::DkgRound1).is_empty());
        assert_eq!(cluster.protocol(0).group_public_key_hex().await, before);
    }

    #[tokio::test(start_paused = true)]
    async fn surplus_round1_sender_is_dropped() {
        setup();
        let cluster = MockCluster::without_keys(2, 3);
        // node 2 announces itself and then disappears, so round 2 stalls
        cluster.leave_after(2, Command::DkgRound1);

        cluster.start_dkg(0).await;
        cluster.settle().await;
        let before = cluster.protocol(0).dkg_status().await;
        assert_eq!((before.0, before.1), (true, 3));

        let outsider = libp2p::PeerId::random().to_base58();
        let mut signer = Signer::new(&outsider, 2, 3).unwrap();
        let stray = Payload::new(&outsider, Command::DkgRound1, &[], signer.dkg_round1().unwrap())
            .encode()
            .unwrap();

        assert_matches!(
            cluster.protocol(0).handle_inbound(&outsider, &stray).await,
            Err(TssError::DkgInconsistent(_))
        );
        assert_eq!(cluster.protocol(0).dkg_status().await, before);
    }
}
