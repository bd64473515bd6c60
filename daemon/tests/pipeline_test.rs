//! Ledger pipeline: genesis bootstrap, mutable storage semantics, the
//! prepared-commit fast path and commit event ordering.

mod common;

use std::sync::Arc;

use common::*;
use takara_common::block::Block;
use takara_common::command::Command;
use takara_common::transaction::Transaction;
use takara_daemon::event_bus::EventBus;
use takara_daemon::storage::{insert_genesis, BlockStore, MemoryBlockStore, MutableStorage};

#[tokio::test]
async fn test_genesis_bootstraps_ledger_state() {
    let keys = keypairs(4);
    let alice = keys[0].clone();
    let bob = keypairs(1).remove(0);
    let bus = Arc::new(EventBus::new());
    let storage = make_storage(bus.clone(), false);

    let genesis = genesis_block(&keys, &alice, &bob);
    let state = insert_genesis(&storage, &genesis).unwrap();

    assert_eq!(state.top_block_info.height, 1);
    assert_eq!(state.top_block_info.hash, genesis.hash());
    assert_eq!(state.ledger_peers.len(), 4);
    assert_eq!(storage.top_height().unwrap(), 1);

    // replaying the genesis is refused
    assert!(insert_genesis(&storage, &genesis).is_err());
}

#[tokio::test]
async fn test_mutable_storage_commit_is_not_repeatable() {
    let keys = keypairs(4);
    let alice = keys[0].clone();
    let bob = keypairs(1).remove(0);
    let bus = Arc::new(EventBus::new());
    let storage = make_storage(bus, false);

    let genesis = genesis_block(&keys, &alice, &bob);
    let mut mutable =
        MutableStorage::new(None, storage.create_command_executor()).unwrap();
    assert!(mutable.apply(&genesis));

    let mut store = MemoryBlockStore::new();
    let state = mutable.commit(&mut store).unwrap();
    assert_eq!(state.top_block_info.height, 1);
    assert_eq!(store.size().unwrap(), 1);

    // the second commit must fail without touching anything
    let error = mutable.commit(&mut store).unwrap_err();
    assert!(error.to_string().contains("twice"));
    assert_eq!(store.size().unwrap(), 1);
}

#[tokio::test]
async fn test_failed_block_rolls_back_cleanly() {
    let keys = keypairs(4);
    let alice = keys[0].clone();
    let bob = keypairs(1).remove(0);
    let bus = Arc::new(EventBus::new());
    let storage = make_storage(bus, false);
    let genesis = genesis_block(&keys, &alice, &bob);
    insert_genesis(&storage, &genesis).unwrap();

    // bob has no funds: the transfer fails, the whole block must not apply
    let bad_tx = Transaction::new(
        BOB.parse().unwrap(),
        3,
        vec![Command::TransferAsset {
            src_account_id: BOB.parse().unwrap(),
            dest_account_id: ALICE.parse().unwrap(),
            asset_id: COIN.parse().unwrap(),
            description: String::new(),
            amount: "1.00".parse().unwrap(),
        }],
    )
    .sign(&bob);
    let bad_block = Block::new(2, genesis.hash(), 3, vec![bad_tx], Vec::new());

    let mut mutable = storage.create_mutable_storage().unwrap();
    assert!(!mutable.apply(&bad_block));
    drop(mutable);

    // the chain is unchanged
    assert_eq!(storage.top_height().unwrap(), 1);
    assert_eq!(
        storage.top_block_info().unwrap().unwrap().height,
        1
    );
}

#[tokio::test]
async fn test_commit_publishes_blocks_in_height_order() {
    let keys = keypairs(4);
    let alice = keys[0].clone();
    let bob = keypairs(1).remove(0);
    let bus = Arc::new(EventBus::new());
    let storage = make_storage(bus.clone(), false);
    let mut commits = storage.on_commit();

    let genesis = genesis_block(&keys, &alice, &bob);
    let block_2 = Block::new(2, genesis.hash(), 2, Vec::new(), Vec::new());
    let block_3 = Block::new(3, block_2.hash(), 3, Vec::new(), Vec::new());

    let mut mutable = storage.create_mutable_storage().unwrap();
    assert!(mutable.apply(&genesis));
    assert!(mutable.apply(&block_2));
    assert!(mutable.apply(&block_3));
    storage.commit(mutable).unwrap();

    for expected in 1..=3u64 {
        let block = commits.recv().await.unwrap();
        assert_eq!(block.height, expected);
    }
    assert_eq!(storage.top_height().unwrap(), 3);
}

#[tokio::test]
async fn test_prepared_commit_fast_path() {
    let keys = keypairs(4);
    let alice = keys[0].clone();
    let bob = keypairs(1).remove(0);
    let bus = Arc::new(EventBus::new());
    let storage = make_storage(bus, true);
    let genesis = genesis_block(&keys, &alice, &bob);
    insert_genesis(&storage, &genesis).unwrap();

    let tx = Transaction::new(
        ALICE.parse().unwrap(),
        5,
        vec![Command::SetAccountDetail {
            account_id: ALICE.parse().unwrap(),
            key: "phone".to_string(),
            value: "123".to_string(),
        }],
    )
    .sign(&alice);

    let mut temp_wsv = storage.create_temporary_wsv().unwrap();
    temp_wsv.apply(&tx).unwrap();
    storage.prepare_block(temp_wsv);

    let block_2 = Block::new(2, genesis.hash(), 5, vec![tx], Vec::new());
    let state = storage.commit_prepared(&block_2).unwrap();
    assert_eq!(state.top_block_info.height, 2);
    assert_eq!(storage.top_height().unwrap(), 2);

    // the fast path is one-shot
    let error = storage.commit_prepared(&block_2).unwrap_err();
    assert!(error
        .to_string()
        .to_lowercase()
        .contains("no prepared blocks"));
    assert_eq!(storage.top_height().unwrap(), 2);
}

#[tokio::test]
async fn test_temporary_wsv_signature_rules() {
    let keys = keypairs(4);
    let alice = keys[0].clone();
    let bob = keypairs(1).remove(0);
    let stranger = keypairs(1).remove(0);
    let bus = Arc::new(EventBus::new());
    let storage = make_storage(bus, false);
    insert_genesis(&storage, &genesis_block(&keys, &alice, &bob)).unwrap();

    let detail = |n: u64| {
        Transaction::new(
            ALICE.parse().unwrap(),
            n,
            vec![Command::SetAccountDetail {
                account_id: ALICE.parse().unwrap(),
                key: "k".to_string(),
                value: "v".to_string(),
            }],
        )
    };

    let mut temp_wsv = storage.create_temporary_wsv().unwrap();

    // unsigned: zero matching signatures is below any quorum
    let error = temp_wsv.apply(&detail(10)).unwrap_err();
    assert_eq!(error.command_name, "signatures_validation");
    assert_eq!(error.error_code, 2);

    // signed by a key that is no signatory of alice
    let error = temp_wsv.apply(&detail(11).sign(&stranger)).unwrap_err();
    assert_eq!(error.error_code, 2);

    // properly signed
    temp_wsv.apply(&detail(12).sign(&alice)).unwrap();
}
