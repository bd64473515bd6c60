//! Command executor semantics: permissions, balances, peers, quorums and
//! account details.

mod common;

use std::sync::Arc;

use common::*;
use takara_common::amount::Amount;
use takara_common::command::Command;
use takara_common::crypto::KeyPair;
use takara_common::model::Peer;
use takara_common::permission::GrantablePermission;
use takara_common::transaction::Transaction;
use takara_daemon::event_bus::EventBus;
use takara_daemon::storage::executor::{error_code, CommandExecutor};
use takara_daemon::storage::kv::KvSession;
use takara_daemon::storage::wsv::query;
use takara_daemon::storage::insert_genesis;

struct Fixture {
    executor: CommandExecutor,
    alice_key: KeyPair,
    peer_keys: Vec<KeyPair>,
}

fn fixture() -> Fixture {
    let peer_keys = keypairs(4);
    let alice_key = peer_keys[0].clone();
    let bob_key = keypairs(1).remove(0);
    let storage = make_storage(Arc::new(EventBus::new()), false);
    insert_genesis(&storage, &genesis_block(&peer_keys, &alice_key, &bob_key)).unwrap();

    let mut executor = storage.create_command_executor();
    executor.session().begin().unwrap();
    Fixture {
        executor,
        alice_key,
        peer_keys,
    }
}

fn balance_of(session: &mut KvSession, account: &str, asset: &str) -> Option<Amount> {
    query::get_account_asset(
        session,
        &account.parse().unwrap(),
        &asset.parse().unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_permission_denied_without_role() {
    let mut f = fixture();
    // bob's role cannot create domains
    let error = f
        .executor
        .execute(
            &Command::CreateDomain {
                domain_id: "elsewhere".parse().unwrap(),
                default_role: "user".parse().unwrap(),
            },
            &BOB.parse().unwrap(),
            true,
        )
        .unwrap_err();
    assert_eq!(error.error_code, error_code::PERMISSION_DENIED);
}

#[tokio::test]
async fn test_transfer_moves_balance() {
    let mut f = fixture();
    f.executor
        .execute(
            &Command::TransferAsset {
                src_account_id: ALICE.parse().unwrap(),
                dest_account_id: BOB.parse().unwrap(),
                asset_id: COIN.parse().unwrap(),
                description: "rent".to_string(),
                amount: "10.50".parse().unwrap(),
            },
            &ALICE.parse().unwrap(),
            true,
        )
        .unwrap();

    let session = f.executor.session();
    assert_eq!(
        balance_of(session, ALICE, COIN).unwrap().to_string(),
        "89.50"
    );
    assert_eq!(
        balance_of(session, BOB, COIN).unwrap().to_string(),
        "10.50"
    );
}

#[tokio::test]
async fn test_transfer_requires_funds() {
    let mut f = fixture();
    let error = f
        .executor
        .execute(
            &Command::TransferAsset {
                src_account_id: BOB.parse().unwrap(),
                dest_account_id: ALICE.parse().unwrap(),
                asset_id: COIN.parse().unwrap(),
                description: String::new(),
                amount: "0.01".parse().unwrap(),
            },
            &BOB.parse().unwrap(),
            true,
        )
        .unwrap_err();
    assert_eq!(error.error_code, error_code::INSUFFICIENT_BALANCE);
}

#[tokio::test]
async fn test_transfer_by_grantable_permission() {
    let mut f = fixture();
    let alice: takara_common::model::AccountId = ALICE.parse().unwrap();
    let bob: takara_common::model::AccountId = BOB.parse().unwrap();

    // without the grant bob may not move alice's assets
    let transfer = Command::TransferAsset {
        src_account_id: alice.clone(),
        dest_account_id: bob.clone(),
        asset_id: COIN.parse().unwrap(),
        description: String::new(),
        amount: "1.00".parse().unwrap(),
    };
    let error = f.executor.execute(&transfer, &bob, true).unwrap_err();
    assert_eq!(error.error_code, error_code::PERMISSION_DENIED);

    // alice grants, bob retries
    f.executor
        .execute(
            &Command::GrantPermission {
                account_id: bob.clone(),
                permission: GrantablePermission::TransferMyAssets,
            },
            &alice,
            true,
        )
        .unwrap();
    f.executor.execute(&transfer, &bob, true).unwrap();
    assert_eq!(
        balance_of(f.executor.session(), BOB, COIN)
            .unwrap()
            .to_string(),
        "1.00"
    );

    // revoking closes the door again
    f.executor
        .execute(
            &Command::RevokePermission {
                account_id: bob.clone(),
                permission: GrantablePermission::TransferMyAssets,
            },
            &alice,
            true,
        )
        .unwrap();
    let error = f.executor.execute(&transfer, &bob, true).unwrap_err();
    assert_eq!(error.error_code, error_code::PERMISSION_DENIED);
}

#[tokio::test]
async fn test_amount_precision_is_strict() {
    let mut f = fixture();
    let error = f
        .executor
        .execute(
            &Command::AddAssetQuantity {
                asset_id: COIN.parse().unwrap(),
                // coin has precision 2
                amount: "5.5".parse().unwrap(),
            },
            &ALICE.parse().unwrap(),
            true,
        )
        .unwrap_err();
    assert_eq!(error.error_code, error_code::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_balance_overflow_detected() {
    let mut f = fixture();
    let alice: takara_common::model::AccountId = ALICE.parse().unwrap();
    // alice already holds 100.00, adding the maximum overflows
    let error = f
        .executor
        .execute(
            &Command::AddAssetQuantity {
                asset_id: COIN.parse().unwrap(),
                amount: Amount::max(2),
            },
            &alice,
            true,
        )
        .unwrap_err();
    assert_eq!(error.error_code, error_code::OVERFLOW);

    let error = f
        .executor
        .execute(
            &Command::SubtractAssetQuantity {
                asset_id: COIN.parse().unwrap(),
                amount: Amount::max(2),
            },
            &alice,
            true,
        )
        .unwrap_err();
    assert_eq!(error.error_code, error_code::INSUFFICIENT_BALANCE);
}

#[tokio::test]
async fn test_unknown_asset_is_not_found() {
    let mut f = fixture();
    let error = f
        .executor
        .execute(
            &Command::AddAssetQuantity {
                asset_id: "ghost#takara".parse().unwrap(),
                amount: "1.00".parse().unwrap(),
            },
            &ALICE.parse().unwrap(),
            true,
        )
        .unwrap_err();
    assert_eq!(error.error_code, error_code::NOT_FOUND);
}

#[tokio::test]
async fn test_last_consensus_peer_is_protected() {
    let mut f = fixture();
    let alice: takara_common::model::AccountId = ALICE.parse().unwrap();
    for key in &f.peer_keys[1..] {
        f.executor
            .execute(
                &Command::RemovePeer {
                    public_key: key.public_key(),
                },
                &alice,
                true,
            )
            .unwrap();
    }
    let error = f
        .executor
        .execute(
            &Command::RemovePeer {
                public_key: f.peer_keys[0].public_key(),
            },
            &alice,
            true,
        )
        .unwrap_err();
    assert_eq!(error.error_code, error_code::PRECONDITION_FAILED);

    // a syncing peer can always go
    let syncing = KeyPair::generate();
    f.executor
        .execute(
            &Command::AddPeer {
                peer: Peer::syncing(syncing.public_key(), "sync:50541"),
            },
            &alice,
            true,
        )
        .unwrap();
    f.executor
        .execute(
            &Command::RemovePeer {
                public_key: syncing.public_key(),
            },
            &alice,
            true,
        )
        .unwrap();
}

#[tokio::test]
async fn test_quorum_and_signatory_bounds() {
    let mut f = fixture();
    let alice: takara_common::model::AccountId = ALICE.parse().unwrap();
    let second = KeyPair::generate();

    // quorum above the signatory count is refused
    let error = f
        .executor
        .execute(
            &Command::SetQuorum {
                account_id: alice.clone(),
                quorum: 2,
            },
            &alice,
            true,
        )
        .unwrap_err();
    assert_eq!(error.error_code, error_code::PRECONDITION_FAILED);

    f.executor
        .execute(
            &Command::AddSignatory {
                account_id: alice.clone(),
                public_key: second.public_key(),
            },
            &alice,
            true,
        )
        .unwrap();
    f.executor
        .execute(
            &Command::SetQuorum {
                account_id: alice.clone(),
                quorum: 2,
            },
            &alice,
            true,
        )
        .unwrap();

    // removing a signatory may not break the quorum
    let error = f
        .executor
        .execute(
            &Command::RemoveSignatory {
                account_id: alice.clone(),
                public_key: second.public_key(),
            },
            &alice,
            true,
        )
        .unwrap_err();
    assert_eq!(error.error_code, error_code::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_compare_and_set_detail_modes() {
    let mut f = fixture();
    let alice: takara_common::model::AccountId = ALICE.parse().unwrap();
    let cas = |old_value: Option<&str>, value: &str, check_empty: bool| {
        Command::CompareAndSetAccountDetail {
            account_id: ALICE.parse().unwrap(),
            key: "color".to_string(),
            value: value.to_string(),
            old_value: old_value.map(str::to_string),
            check_empty,
        }
    };

    // strict mode: expectation about an absent value fails
    let error = f
        .executor
        .execute(&cas(Some("red"), "blue", true), &alice, true)
        .unwrap_err();
    assert_eq!(error.error_code, error_code::PRECONDITION_FAILED);

    // legacy mode writes regardless
    f.executor
        .execute(&cas(Some("red"), "blue", false), &alice, true)
        .unwrap();

    // matching expectation succeeds, stale expectation fails
    f.executor
        .execute(&cas(Some("blue"), "green", true), &alice, true)
        .unwrap();
    let error = f
        .executor
        .execute(&cas(Some("blue"), "yellow", true), &alice, true)
        .unwrap_err();
    assert_eq!(error.error_code, error_code::PRECONDITION_FAILED);

    let detail = query::get_account_detail(
        f.executor.session(),
        &alice,
        &alice,
        "color",
    )
    .unwrap();
    assert_eq!(detail.unwrap(), "green");
}

#[tokio::test]
async fn test_settings_are_visible_within_the_transaction() {
    let mut f = fixture();
    let alice: takara_common::model::AccountId = ALICE.parse().unwrap();
    // alice's admin role carries root, so the reserved keyspace is open
    f.executor
        .execute(
            &Command::SetSettingValue {
                key: "max_description_size".to_string(),
                value: "64".to_string(),
            },
            &alice,
            true,
        )
        .unwrap();
    let value = query::get_setting(f.executor.session(), "max_description_size").unwrap();
    assert_eq!(value.unwrap(), "64");
}

#[tokio::test]
async fn test_transaction_rolls_back_at_first_error() {
    let mut f = fixture();
    let tx = Transaction::new(
        ALICE.parse().unwrap(),
        9,
        vec![
            Command::TransferAsset {
                src_account_id: ALICE.parse().unwrap(),
                dest_account_id: BOB.parse().unwrap(),
                asset_id: COIN.parse().unwrap(),
                description: String::new(),
                amount: "30.00".parse().unwrap(),
            },
            // fails: not enough funds remain
            Command::TransferAsset {
                src_account_id: ALICE.parse().unwrap(),
                dest_account_id: BOB.parse().unwrap(),
                asset_id: COIN.parse().unwrap(),
                description: String::new(),
                amount: "90.00".parse().unwrap(),
            },
        ],
    )
    .sign(&f.alice_key);

    let error =
        takara_daemon::storage::executor::execute_transaction(&mut f.executor, &tx, true)
            .unwrap_err();
    assert_eq!(error.command_index, 1);
    assert_eq!(
        error.command_error.error_code,
        error_code::INSUFFICIENT_BALANCE
    );

    // the first command was rolled back with the second
    assert_eq!(
        balance_of(f.executor.session(), ALICE, COIN)
            .unwrap()
            .to_string(),
        "100.00"
    );
    assert!(balance_of(f.executor.session(), BOB, COIN).is_none());
}
