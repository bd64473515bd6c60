//! Voting engine scenarios: solo commit, 4-peer commit, reject and
//! future-round handling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use takara_common::crypto::KeyPair;
use takara_common::transaction::SignatureOf;
use takara_daemon::consensus::messages::{Answer, VoteMessage, YacHash};
use takara_daemon::consensus::supermajority::{ConsistencyModel, SupermajorityChecker};
use takara_daemon::consensus::vote_storage::YacVoteStorage;
use takara_daemon::consensus::{ClusterOrdering, Round, VoteCryptoProvider, Yac};
use takara_daemon::event_bus::EventBus;
use takara_daemon::network::local::RecordingNetwork;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::timeout;

const LONG_DELAY: Duration = Duration::from_secs(600);

fn vote_of(keypair: &KeyPair, hash: &YacHash) -> VoteMessage {
    VoteMessage {
        hash: hash.clone(),
        signature: SignatureOf::produce(keypair, &hash.signable_bytes()),
    }
}

struct Cluster {
    keys: Vec<KeyPair>,
    order: ClusterOrdering,
    yac: Arc<Yac>,
    network: Arc<RecordingNetwork>,
    bus: Arc<EventBus>,
}

fn cluster(size: usize, round: Round) -> Cluster {
    let keys = keypairs(size);
    let order = ClusterOrdering::create(peers_of(&keys)).unwrap();
    let network = RecordingNetwork::new();
    let bus = Arc::new(EventBus::new());
    let yac = Yac::new(
        YacVoteStorage::new(SupermajorityChecker::new(ConsistencyModel::Bft)),
        network.clone(),
        Arc::new(VoteCryptoProvider::new(Arc::new(keys[0].clone()))),
        LONG_DELAY,
        10,
        order.clone(),
        round,
        bus.clone(),
    );
    Cluster {
        keys,
        order,
        yac,
        network,
        bus,
    }
}

async fn settle() {
    // let the spawned network sends land
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_solo_commit_is_emitted_once() {
    let cluster = cluster(1, Round::new(1, 0));
    let mut outcomes = cluster.bus.subscribe_outcomes_from_yac();

    let hash = YacHash::new(Round::new(1, 0), "proposal", "block");
    cluster
        .yac
        .vote(hash.clone(), cluster.order.clone(), None);

    let own_vote = vote_of(&cluster.keys[0], &hash);
    cluster.yac.on_state(vec![own_vote.clone()]);

    let outcome = timeout(Duration::from_secs(1), outcomes.recv())
        .await
        .expect("an outcome within a second")
        .unwrap();
    match outcome {
        Answer::Commit { votes } => {
            assert_eq!(votes.len(), 1);
            assert_eq!(votes[0].hash, hash);
        }
        other => panic!("expected a commit, got {:?}", other),
    }

    // an identical state changes nothing
    cluster.yac.on_state(vec![own_vote]);
    assert!(matches!(outcomes.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_four_peer_commit_broadcasts_then_emits() {
    let cluster = cluster(4, Round::new(1, 0));
    let mut outcomes = cluster.bus.subscribe_outcomes_from_yac();
    let mut applied = cluster.bus.subscribe_apply_state();

    let hash = YacHash::new(Round::new(1, 0), "proposal", "block");
    cluster
        .yac
        .vote(hash.clone(), cluster.order.clone(), None);
    settle().await;

    // the own vote went to the first leader in order
    let sends = cluster.network.take_sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, cluster.order.peers()[0].public_key);
    assert_eq!(sends[0].1.len(), 1);

    cluster.yac.on_state(vec![vote_of(&cluster.keys[1], &hash)]);
    settle().await;
    assert!(cluster.network.take_sends().is_empty());
    assert!(matches!(outcomes.try_recv(), Err(TryRecvError::Empty)));

    // the third vote is the supermajority: a 3-vote state goes to everyone
    cluster.yac.on_state(vec![vote_of(&cluster.keys[2], &hash)]);
    settle().await;
    let sends = cluster.network.take_sends();
    assert_eq!(sends.len(), 4);
    let recipients: Vec<_> = sends.iter().map(|(to, _)| *to).collect();
    let expected: Vec<_> = cluster
        .order
        .peers()
        .iter()
        .map(|peer| peer.public_key)
        .collect();
    assert_eq!(recipients, expected);
    for (_, state) in &sends {
        assert_eq!(state.len(), 3);
    }
    assert!(matches!(outcomes.try_recv(), Err(TryRecvError::Empty)));

    // the fourth vote completes the commit certificate
    cluster.yac.on_state(vec![vote_of(&cluster.keys[3], &hash)]);
    match outcomes.try_recv().unwrap() {
        Answer::Commit { votes } => {
            assert_eq!(votes.len(), 4);
            assert!(votes.iter().all(|vote| vote.hash == hash));
        }
        other => panic!("expected a commit, got {:?}", other),
    }
    assert_eq!(applied.try_recv().unwrap(), Round::new(1, 0));
}

#[tokio::test]
async fn test_split_votes_reject_without_commit() {
    let cluster = cluster(4, Round::new(1, 0));
    let mut outcomes = cluster.bus.subscribe_outcomes_from_yac();

    let round = Round::new(1, 0);
    let hash_1 = YacHash::new(round, "proposal", "block_one");
    let hash_2 = YacHash::new(round, "proposal", "block_two");

    cluster
        .yac
        .vote(hash_1.clone(), cluster.order.clone(), None);
    settle().await;
    cluster.network.take_sends();

    cluster.yac.on_state(vec![vote_of(&cluster.keys[1], &hash_1)]);
    cluster.yac.on_state(vec![vote_of(&cluster.keys[2], &hash_2)]);
    assert!(matches!(outcomes.try_recv(), Err(TryRecvError::Empty)));

    // 2-2: nothing can reach three votes anymore
    cluster.yac.on_state(vec![vote_of(&cluster.keys[3], &hash_2)]);
    settle().await;

    let sends = cluster.network.take_sends();
    assert_eq!(sends.len(), 4, "a reject state goes to every peer");
    for (_, state) in &sends {
        assert_eq!(state.len(), 4);
    }
    // no commit was produced
    assert!(matches!(outcomes.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_future_round_votes_surface_as_future_outcome() {
    let cluster = cluster(4, Round::new(1, 1));
    let mut outcomes = cluster.bus.subscribe_outcomes_from_yac();
    let mut applied = cluster.bus.subscribe_apply_state();

    let hash = YacHash::new(Round::new(1, 1), "proposal", "block");
    cluster
        .yac
        .vote(hash.clone(), cluster.order.clone(), None);
    settle().await;
    cluster.network.take_sends();

    let future_hash = YacHash::new(Round::new(2, 0), "future_proposal", "future_block");
    let future_votes: Vec<_> = cluster.keys[1..]
        .iter()
        .map(|key| vote_of(key, &future_hash))
        .collect();
    cluster.yac.on_state(future_votes.clone());

    match outcomes.try_recv().unwrap() {
        Answer::Future { votes } => {
            assert_eq!(votes.len(), 3);
            assert!(votes.iter().all(|vote| vote.round() == Round::new(2, 0)));
        }
        other => panic!("expected a future outcome, got {:?}", other),
    }
    // the local round did not move
    assert!(matches!(applied.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_round_switch_returns_cached_outcome() {
    let cluster = cluster(1, Round::new(1, 0));
    let hash = YacHash::new(Round::new(1, 0), "proposal", "block");
    cluster
        .yac
        .vote(hash.clone(), cluster.order.clone(), None);
    cluster
        .yac
        .on_state(vec![vote_of(&cluster.keys[0], &hash)]);

    let cached = cluster.yac.process_round_switch(
        Round::new(1, 0),
        cluster.order.peers(),
        &[],
    );
    assert!(matches!(cached, Some(Answer::Commit { .. })));

    let fresh = cluster
        .yac
        .process_round_switch(Round::new(2, 0), cluster.order.peers(), &[]);
    assert!(fresh.is_none());
}

#[tokio::test]
async fn test_votes_from_unknown_peers_are_dropped() {
    let cluster = cluster(4, Round::new(1, 0));
    let mut outcomes = cluster.bus.subscribe_outcomes_from_yac();

    let hash = YacHash::new(Round::new(1, 0), "proposal", "block");
    cluster
        .yac
        .vote(hash.clone(), cluster.order.clone(), None);

    let stranger = KeyPair::generate();
    for _ in 0..3 {
        cluster.yac.on_state(vec![vote_of(&stranger, &hash)]);
    }
    assert!(matches!(outcomes.try_recv(), Err(TryRecvError::Empty)));
}
