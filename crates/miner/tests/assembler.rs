//! Template assembly against a live regtest chain and pool.

use std::sync::Arc;

use basaltd_chainstate::ChainState;
use basaltd_consensus::money::COIN;
use basaltd_consensus::params::{chain_params, ChainParams, Network};
use basaltd_mempool::{accept_to_memory_pool, Mempool, MempoolConfig};
use basaltd_miner::{create_new_block, solve_block};
use basaltd_primitives::outpoint::OutPoint;
use basaltd_primitives::transaction::{Transaction, TxIn, TxOut};
use basaltd_storage::memory::MemoryStore;

const SUBSIDY: i64 = 50 * COIN;

fn spend(prevout: OutPoint, value: i64) -> Transaction {
    Transaction {
        version: 1,
        vin: vec![TxIn {
            prevout,
            script_sig: Vec::new(),
            sequence: 0xffff_ffff,
        }],
        vout: vec![TxOut {
            value,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    }
}

struct Setup {
    params: ChainParams,
    chain: ChainState<MemoryStore>,
    pool: Mempool,
    mature: Vec<OutPoint>,
}

/// Mine enough empty blocks for the first three coinbases to mature,
/// using the assembler itself.
fn setup_with(params: ChainParams) -> Setup {
    let chain =
        ChainState::new(Arc::new(MemoryStore::new()), params.clone()).expect("open chain");
    let pool = Mempool::new(MempoolConfig::default());
    let mut mature = Vec::new();
    for _ in 0..103 {
        let template =
            create_new_block(&chain, &pool, vec![0x51], 0).expect("template");
        let mut block = template.block;
        solve_block(&mut block, params.consensus.pow_limit_bits);
        if template.height <= 3 {
            mature.push(OutPoint::new(block.transactions[0].txid(), 0));
        }
        chain.process_new_block(&block).expect("mine");
    }
    Setup {
        params,
        chain,
        pool,
        mature,
    }
}

fn setup() -> Setup {
    setup_with(chain_params(Network::Regtest))
}

#[test]
fn empty_pool_yields_coinbase_only_template() {
    let setup = setup();
    let template = create_new_block(&setup.chain, &setup.pool, vec![0x51], 0).expect("template");
    assert_eq!(template.block.transactions.len(), 1);
    assert_eq!(template.total_fees, 0);
    assert_eq!(template.height, 104);
    assert_eq!(template.block.transactions[0].vout[0].value, SUBSIDY);

    // The template, once solved, is a valid next block.
    let mut block = template.block;
    solve_block(&mut block, setup.params.consensus.pow_limit_bits);
    setup.chain.process_new_block(&block).expect("connect");
    assert_eq!(setup.chain.best_tip().expect("tip").height, 104);
}

#[test]
fn packages_are_included_atomically_in_dependency_order() {
    let mut setup = setup();

    // Low-fee parent, high-fee child, and an independent transaction
    // whose rate sits between the parent's own rate and the package's.
    let parent = spend(setup.mature[0], SUBSIDY - 5_000);
    let parent_id =
        accept_to_memory_pool(&setup.chain, &mut setup.pool, parent, 0).expect("parent");
    let child = spend(OutPoint::new(parent_id, 0), SUBSIDY - 105_000);
    let child_id = accept_to_memory_pool(&setup.chain, &mut setup.pool, child, 0).expect("child");
    let loner = spend(setup.mature[1], SUBSIDY - 20_000);
    let loner_id = accept_to_memory_pool(&setup.chain, &mut setup.pool, loner, 0).expect("loner");

    let template = create_new_block(&setup.chain, &setup.pool, vec![0x51], 0).expect("template");
    let txids: Vec<_> = template.block.transactions[1..]
        .iter()
        .map(Transaction::txid)
        .collect();
    assert_eq!(txids.len(), 3);
    // The parent+child package rate beats the loner's.
    assert_eq!(txids[0], parent_id);
    assert_eq!(txids[1], child_id);
    assert_eq!(txids[2], loner_id);
    assert_eq!(template.total_fees, 5_000 + 100_000 + 20_000);
    assert_eq!(
        template.block.transactions[0].vout[0].value,
        SUBSIDY + 125_000
    );

    // The full template connects cleanly.
    let mut block = template.block;
    solve_block(&mut block, setup.params.consensus.pow_limit_bits);
    setup.chain.process_new_block(&block).expect("connect");
}

#[test]
fn oversized_packages_are_skipped_not_fatal() {
    let mut params = chain_params(Network::Regtest);
    // Room for the coinbase reserve plus a single small transaction.
    params.consensus.max_block_size = 240;
    let mut setup = setup_with(params);

    let keeper = spend(setup.mature[0], SUBSIDY - 90_000);
    let keeper_id =
        accept_to_memory_pool(&setup.chain, &mut setup.pool, keeper, 0).expect("keeper");
    let spare = spend(setup.mature[1], SUBSIDY - 10_000);
    let spare_id = accept_to_memory_pool(&setup.chain, &mut setup.pool, spare, 0).expect("spare");

    let template = create_new_block(&setup.chain, &setup.pool, vec![0x51], 0).expect("template");
    let txids: Vec<_> = template.block.transactions[1..]
        .iter()
        .map(Transaction::txid)
        .collect();
    // Only the better-paying transaction fits.
    assert_eq!(txids, vec![keeper_id]);
    assert!(setup.pool.contains(&spare_id));
    assert!(template.size <= 240);
}

#[test]
fn assembly_is_deterministic() {
    let mut setup = setup();
    for outpoint in [setup.mature[0], setup.mature[1], setup.mature[2]] {
        let tx = spend(outpoint, SUBSIDY - 10_000);
        accept_to_memory_pool(&setup.chain, &mut setup.pool, tx, 0).expect("accept");
    }
    let first = create_new_block(&setup.chain, &setup.pool, vec![0x51], 0).expect("first");
    let second = create_new_block(&setup.chain, &setup.pool, vec![0x51], 0).expect("second");
    assert_eq!(first.block, second.block);
}
