use ll_primitives::address::Address;
use ll_primitives::amount::Amount;
use ll_primitives::chain::ChainId;
use ll_primitives::coin_data::{Asset, CoinData, CoinFrom, CoinTo};
use ll_primitives::nonce::Nonce;
use ll_primitives::payload::{CrossChainData, TxPayload};
use ll_primitives::transaction::{Transaction, TransactionHash, TxType};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const CHAIN_ID: ChainId = ChainId::new(2);
const MAIN: Asset = Asset::main(CHAIN_ID);
const ALICE: Address = Address::new([1; Address::SIZE]);
const BOB: Address = Address::new([2; Address::SIZE]);

fn transfer(nonce: Nonce, amount: u64) -> Transaction {
    Transaction::builder(TxType::TRANSFER)
        .coin_data(&CoinData {
            from: vec![CoinFrom {
                address: ALICE,
                asset: MAIN,
                amount: Amount::from(amount + 1),
                nonce,
                locked: 0,
            }],
            to: vec![CoinTo {
                address: BOB,
                asset: MAIN,
                amount: Amount::from(amount),
                lock_time: 0,
            }],
        })
        .build()
}

fn cross_chain(nonce: Nonce) -> Transaction {
    Transaction::builder(TxType::CROSS_CHAIN)
        .tx_data(
            TxPayload::CrossChain(CrossChainData {
                anchor_hash: TransactionHash::new([7; TransactionHash::SIZE]),
                origin_chain_id: ChainId::new(3),
                contract_call: None,
            })
            .to_tx_data(),
        )
        .coin_data(&CoinData {
            from: vec![CoinFrom {
                address: ALICE,
                asset: MAIN,
                amount: Amount::from(11_u64),
                nonce,
                locked: 0,
            }],
            to: vec![CoinTo {
                address: BOB,
                asset: MAIN,
                amount: Amount::from(10_u64),
                lock_time: 0,
            }],
        })
        .build()
}

fn write_inputs(dir: &Path, blocks: &[(u64, Vec<Transaction>)]) {
    let genesis = serde_json::json!({
        "time": 0,
        "allocations": [
            { "address": ALICE.to_string(), "amount": "1000" },
        ],
    });
    fs::write(dir.join("genesis.json"), genesis.to_string()).unwrap();

    let blocks = blocks
        .iter()
        .map(|(height, txs)| {
            serde_json::json!({
                "height": height,
                "time": height * 1_000,
                "txs": txs.iter().map(Transaction::to_hex).collect::<Vec<_>>(),
            })
        })
        .collect::<Vec<_>>();
    fs::write(
        dir.join("blocks.json"),
        serde_json::Value::Array(blocks).to_string(),
    )
    .unwrap();
}

fn apply_blocks(dir: &Path, extra_args: &[&str]) -> (Output, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_ll-node"))
        .arg("apply-blocks")
        .args(["--chain-id", "2", "--protocol-version", "5"])
        .arg("--genesis")
        .arg(dir.join("genesis.json"))
        .arg("--blocks")
        .arg(dir.join("blocks.json"))
        .arg("--skip-signatures")
        .args(extra_args)
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    (output, stderr)
}

fn blocks_with_orphan() -> Vec<(u64, Vec<Transaction>)> {
    let first = transfer(Nonce::ZERO, 100);
    let second = cross_chain(Nonce::from_hash(first.hash()));
    let orphan = transfer(Nonce::new([9; Nonce::SIZE]), 1);
    vec![(1, vec![first, orphan]), (2, vec![second])]
}

#[test]
fn build_excludes_invalid_transactions() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path(), &blocks_with_orphan());

    let (output, stderr) = apply_blocks(dir.path(), &[]);
    assert!(output.status.success(), "{stderr}");

    assert!(stderr.contains("Genesis applied"), "{stderr}");
    assert!(stderr.contains("rejected=1"), "{stderr}");
    // 1000 - 101 - 11
    assert!(stderr.contains("available=888"), "{stderr}");
    assert!(stderr.contains("available=110"), "{stderr}");
    assert!(stderr.contains("entries=1"), "{stderr}");
}

#[test]
fn verify_fails_on_invalid_block() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path(), &blocks_with_orphan());

    let (output, stderr) = apply_blocks(dir.path(), &["--verify"]);
    assert!(!output.status.success());
    assert!(stderr.contains("InvalidBlock"), "{stderr}");
}

#[test]
fn non_sequential_heights() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path(), &[(2, vec![transfer(Nonce::ZERO, 100)])]);

    let (output, stderr) = apply_blocks(dir.path(), &[]);
    assert!(!output.status.success());
    assert!(stderr.contains("NonSequentialHeight"), "{stderr}");
}

#[test]
fn missing_input_file() {
    let dir = TempDir::new().unwrap();

    let (output, stderr) = apply_blocks(dir.path(), &[]);
    assert!(!output.status.success());
    assert!(stderr.contains("ReadFile"), "{stderr}");
}
