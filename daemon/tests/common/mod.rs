//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::sync::Arc;

use takara_common::block::Block;
use takara_common::command::Command;
use takara_common::crypto::{Hash, KeyPair};
use takara_common::model::Peer;
use takara_common::permission::{PermissionSet, RolePermission};
use takara_common::transaction::Transaction;
use takara_daemon::event_bus::EventBus;
use takara_daemon::storage::kv::MemoryBackend;
use takara_daemon::storage::{MemoryBlockStore, Storage, StorageOptions};

pub const DOMAIN: &str = "takara";
pub const ALICE: &str = "alice@takara";
pub const BOB: &str = "bob@takara";
pub const COIN: &str = "coin#takara";

pub fn keypairs(count: usize) -> Vec<KeyPair> {
    (0..count).map(|_| KeyPair::generate()).collect()
}

pub fn peers_of(keys: &[KeyPair]) -> Vec<Peer> {
    keys.iter()
        .enumerate()
        .map(|(i, key)| Peer::new(key.public_key(), format!("127.0.0.1:{}", 50541 + i)))
        .collect()
}

pub fn make_storage(bus: Arc<EventBus>, prepared_commits: bool) -> Arc<Storage> {
    Arc::new(
        Storage::new(
            Arc::new(MemoryBackend::new()),
            Box::new(MemoryBlockStore::new()),
            bus,
            StorageOptions {
                prepared_commits_enabled: prepared_commits,
                cacheable_paths: vec!["wsv/r/".to_string(), "wsv/network/peers/".to_string()],
            },
        )
        .expect("storage opens"),
    )
}

/// Genesis: an admin role holding everything, a user role that can move
/// assets, two accounts, one asset, and the consensus peers. A second
/// transaction funds alice.
pub fn genesis_block(peer_keys: &[KeyPair], alice_key: &KeyPair, bob_key: &KeyPair) -> Block {
    let mut commands = vec![
        Command::CreateRole {
            role_id: "admin".parse().unwrap(),
            permissions: PermissionSet::all(),
        },
        Command::CreateRole {
            role_id: "user".parse().unwrap(),
            permissions: PermissionSet::from_iter([
                RolePermission::Transfer,
                RolePermission::Receive,
            ]),
        },
        Command::CreateDomain {
            domain_id: DOMAIN.parse().unwrap(),
            default_role: "admin".parse().unwrap(),
        },
        Command::CreateAccount {
            account_name: "alice".to_string(),
            domain_id: DOMAIN.parse().unwrap(),
            public_key: alice_key.public_key(),
        },
        Command::CreateAsset {
            asset_name: "coin".to_string(),
            domain_id: DOMAIN.parse().unwrap(),
            precision: 2,
        },
    ];
    // bob gets the limited role: detach the default, append user
    commands.push(Command::CreateAccount {
        account_name: "bob".to_string(),
        domain_id: DOMAIN.parse().unwrap(),
        public_key: bob_key.public_key(),
    });
    commands.push(Command::DetachRole {
        account_id: BOB.parse().unwrap(),
        role_id: "admin".parse().unwrap(),
    });
    commands.push(Command::AppendRole {
        account_id: BOB.parse().unwrap(),
        role_id: "user".parse().unwrap(),
    });
    for peer in peers_of(peer_keys) {
        commands.push(Command::AddPeer { peer });
    }

    let bootstrap = Transaction::new(ALICE.parse().unwrap(), 1, commands).sign(alice_key);
    let funding = Transaction::new(
        ALICE.parse().unwrap(),
        2,
        vec![Command::AddAssetQuantity {
            asset_id: COIN.parse().unwrap(),
            amount: "100.00".parse().unwrap(),
        }],
    )
    .sign(alice_key);

    Block::new(1, Hash::zero(), 1, vec![bootstrap, funding], Vec::new())
}
