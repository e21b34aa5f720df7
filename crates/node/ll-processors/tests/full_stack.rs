use ll_commit_log::CommittedCrossChainTxLog;
use ll_kv_store::MemoryKvStore;
use ll_ledger::{LedgerService, NonceChainLedger, PermissiveSpendAuthorizer};
use ll_primitives::address::Address;
use ll_primitives::amount::Amount;
use ll_primitives::chain::{BlockHeader, BlockHeight, ChainId, ProtocolVersion};
use ll_primitives::coin_data::{Asset, CoinData, CoinFrom, CoinTo};
use ll_primitives::nonce::Nonce;
use ll_primitives::payload::{AliasData, CallContractData, CrossChainData, TxPayload};
use ll_primitives::transaction::{Transaction, TransactionHash, TxType};
use ll_processors::{
    AliasConfig, AliasProcessor, CoinBaseProcessor, ContractCallConfig, ContractCallProcessor,
    CrossChainProcessor, KvContractState, TransferProcessor,
};
use ll_tx_processor::{
    BatchMode, BatchOrchestrator, CommitStage, ErrorCode, OrchestratorError, ProcessorRegistry,
    StaticProtocolVersions,
};
use std::sync::Arc;

const CHAIN_ID: ChainId = ChainId::new(2);
const ORIGIN_CHAIN_ID: ChainId = ChainId::new(3);
const MAIN: Asset = Asset::main(CHAIN_ID);
const ALICE: Address = Address::new([1; Address::SIZE]);
const BOB: Address = Address::new([2; Address::SIZE]);
const CAROL: Address = Address::new([3; Address::SIZE]);
const CONTRACT: Address = Address::new([0xc0; Address::SIZE]);

type Ledger = Arc<NonceChainLedger<MemoryKvStore, PermissiveSpendAuthorizer>>;
type Contracts = ContractCallProcessor<KvContractState<MemoryKvStore>, Arc<StaticProtocolVersions>>;
type CrossChain =
    CrossChainProcessor<MemoryKvStore, KvContractState<MemoryKvStore>, Arc<StaticProtocolVersions>>;

struct Node {
    log_store: MemoryKvStore,
    versions: Arc<StaticProtocolVersions>,
    ledger: Ledger,
    aliases: Arc<AliasProcessor<MemoryKvStore>>,
    contracts: Arc<Contracts>,
    cross_chain: Arc<CrossChain>,
    orchestrator: BatchOrchestrator<Ledger>,
}

impl Node {
    fn new(protocol_version: u16) -> Self {
        let store = MemoryKvStore::new();
        // Separate store so that commit log failures can be injected on their own
        let log_store = MemoryKvStore::new();
        let versions = Arc::new(StaticProtocolVersions::new(ProtocolVersion::new(
            protocol_version,
        )));
        let ledger = Arc::new(NonceChainLedger::new(
            store.clone(),
            PermissiveSpendAuthorizer,
        ));
        let aliases = Arc::new(AliasProcessor::new(
            store.clone(),
            AliasConfig {
                fee: Amount::from(100_u64),
            },
        ));
        let contracts = Arc::new(ContractCallProcessor::new(
            KvContractState::new(store.clone()),
            Arc::clone(&versions),
            ContractCallConfig::default(),
        ));
        contracts
            .contracts()
            .register_contract(CHAIN_ID, &CONTRACT)
            .unwrap();
        let cross_chain = Arc::new(CrossChainProcessor::new(
            CommittedCrossChainTxLog::new(log_store.clone()),
            Arc::clone(&contracts),
        ));

        let registry = ProcessorRegistry::builder()
            .with_processor(CoinBaseProcessor)
            .with_processor(TransferProcessor)
            .with_processor(Arc::clone(&aliases))
            .with_processor(Arc::clone(&contracts))
            .with_processor(Arc::clone(&cross_chain))
            .build()
            .unwrap();

        Self {
            log_store,
            versions,
            orchestrator: BatchOrchestrator::new(Arc::clone(&ledger), registry),
            ledger,
            aliases,
            contracts,
            cross_chain,
        }
    }

    fn balance(&self, address: Address) -> Amount {
        self.ledger
            .get_balance(CHAIN_ID, &address, MAIN)
            .unwrap()
            .available
    }

    fn nonce(&self, address: Address) -> Nonce {
        self.ledger.get_nonce(CHAIN_ID, &address, MAIN).unwrap()
    }

    fn build_block(&self, height: u64, txs: &[Transaction]) -> Vec<Transaction> {
        let mut session = self
            .orchestrator
            .begin(CHAIN_ID, BatchMode::BlockBuild, header(height))
            .unwrap();
        let outcome = session.validate(txs).unwrap();
        assert!(outcome.is_empty(), "{outcome:?}");
        session.commit().unwrap().txs
    }

    /// Observable state of the node
    fn snapshot(&self) -> Vec<String> {
        let mut snapshot = Vec::new();
        for address in [ALICE, BOB, CAROL, CONTRACT, Address::BLACK_HOLE] {
            snapshot.push(format!(
                "{address}: {} {}",
                self.balance(address),
                self.nonce(address)
            ));
        }
        snapshot.push(format!(
            "alias: {:?}",
            self.aliases.alias_of(CHAIN_ID, &ALICE).unwrap()
        ));
        snapshot.push(format!(
            "log: {:?}",
            self.cross_chain.log().get_list(CHAIN_ID).unwrap()
        ));
        snapshot
    }
}

fn header(height: u64) -> BlockHeader {
    BlockHeader {
        height: BlockHeight::new(height),
        time: height * 1_000,
    }
}

fn coin_from(address: Address, amount: u64, nonce: Nonce) -> CoinFrom {
    CoinFrom {
        address,
        asset: MAIN,
        amount: Amount::from(amount),
        nonce,
        locked: 0,
    }
}

fn coin_to(address: Address, amount: u64) -> CoinTo {
    CoinTo {
        address,
        asset: MAIN,
        amount: Amount::from(amount),
        lock_time: 0,
    }
}

fn genesis() -> Transaction {
    Transaction::builder(TxType::COIN_BASE)
        .coin_data(&CoinData {
            from: Vec::new(),
            to: vec![
                coin_to(ALICE, 1_000),
                coin_to(BOB, 1_000),
                coin_to(CAROL, 1_000),
            ],
        })
        .build()
}

fn transfer(from: Address, nonce: Nonce, to: Address, amount: u64) -> Transaction {
    Transaction::builder(TxType::TRANSFER)
        .coin_data(&CoinData {
            from: vec![coin_from(from, amount + 1, nonce)],
            to: vec![coin_to(to, amount)],
        })
        .build()
}

fn alias(address: Address, nonce: Nonce, alias: &str) -> Transaction {
    Transaction::builder(TxType::ACCOUNT_ALIAS)
        .tx_data(
            TxPayload::Alias(AliasData {
                address,
                alias: alias.to_string(),
            })
            .to_tx_data(),
        )
        .coin_data(&CoinData {
            from: vec![coin_from(address, 101, nonce)],
            to: vec![coin_to(Address::BLACK_HOLE, 100)],
        })
        .build()
}

fn call(sender: Address) -> CallContractData {
    CallContractData {
        sender,
        contract_address: CONTRACT,
        value: Amount::from(5_u64),
        gas_limit: 50_000,
        price: 25,
        method_name: "deposit".to_string(),
        method_desc: String::new(),
        args: Vec::new(),
    }
}

fn contract_call(sender: Address, nonce: Nonce) -> Transaction {
    Transaction::builder(TxType::CALL_CONTRACT)
        .tx_data(TxPayload::CallContract(call(sender)).to_tx_data())
        .coin_data(&CoinData {
            from: vec![coin_from(sender, 15, nonce)],
            to: vec![coin_to(CONTRACT, 5)],
        })
        .build()
}

fn cross_chain(anchor: u8, nonce: Nonce, wrapped_call: bool) -> Transaction {
    Transaction::builder(TxType::CROSS_CHAIN)
        .tx_data(
            TxPayload::CrossChain(CrossChainData {
                anchor_hash: TransactionHash::new([anchor; TransactionHash::SIZE]),
                origin_chain_id: ORIGIN_CHAIN_ID,
                contract_call: wrapped_call.then(|| call(Address::new([9; Address::SIZE]))),
            })
            .to_tx_data(),
        )
        .coin_data(&CoinData {
            from: vec![coin_from(CAROL, 20, nonce)],
            to: vec![coin_to(CONTRACT, 5), coin_to(ALICE, 10)],
        })
        .build()
}

fn next(tx: &Transaction) -> Nonce {
    Nonce::from_hash(tx.hash())
}

fn block_two(node: &Node) -> Vec<Transaction> {
    let transfer = transfer(ALICE, node.nonce(ALICE), BOB, 100);
    let alias = alias(ALICE, next(&transfer), "alice");
    let call = contract_call(BOB, node.nonce(BOB));
    let cross_chain = cross_chain(7, node.nonce(CAROL), true);
    vec![transfer, alias, call, cross_chain]
}

#[test]
fn block_commit_and_rollback() {
    let node = Node::new(5);
    node.build_block(1, &[genesis()]);
    let before = node.snapshot();

    let txs = block_two(&node);
    let mut session = node
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    assert!(session.validate(&txs).unwrap().is_empty());
    let committed = session.commit().unwrap();
    assert_eq!(committed.txs, txs);
    assert_eq!(committed.batch_info.contract_results_len(), 2);

    // Transfer and alias are chained through Alice's nonce
    assert_eq!(node.nonce(ALICE), next(&txs[1]));
    assert_eq!(node.balance(ALICE), Amount::from(1_000_u64 - 101 - 101 + 10));
    assert_eq!(node.balance(BOB), Amount::from(1_000_u64 + 100 - 15));
    assert_eq!(node.balance(Address::BLACK_HOLE), Amount::from(100_u64));
    assert_eq!(
        node.aliases.alias_of(CHAIN_ID, &ALICE).unwrap().as_deref(),
        Some("alice")
    );
    for tx in &txs[2..] {
        assert!(
            node.contracts
                .contracts()
                .contract_result(CHAIN_ID, tx.hash())
                .unwrap()
                .is_some_and(|result| result.success && result.height == BlockHeight::new(2))
        );
    }
    let anchor = TransactionHash::new([7; TransactionHash::SIZE]);
    assert_eq!(
        node.cross_chain.log().get(&anchor, CHAIN_ID).as_ref(),
        Some(&txs[3])
    );

    // Stale nonce after commit
    let mut session = node
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(3))
        .unwrap();
    let replayed = transfer(ALICE, Nonce::ZERO, BOB, 100);
    let outcome = session.validate(&[replayed.clone()]).unwrap();
    assert_eq!(outcome.code_of(replayed.hash()), Some(ErrorCode::DoubleSpend));
    session.abort();

    node.orchestrator
        .rollback_block(CHAIN_ID, &header(2), &txs)
        .unwrap();
    assert_eq!(node.snapshot(), before);
    for tx in &txs[2..] {
        assert_eq!(
            node.contracts
                .contracts()
                .contract_result(CHAIN_ID, tx.hash())
                .unwrap(),
            None
        );
    }
}

#[test]
fn verify_replays_built_block() {
    let builder = Node::new(5);
    let first_block = builder.build_block(1, &[genesis()]);
    let second_block = builder.build_block(2, &block_two(&builder));

    let verifier = Node::new(5);
    for (height, txs) in [(1, &first_block), (2, &second_block)] {
        let mut session = verifier
            .orchestrator
            .begin(CHAIN_ID, BatchMode::BlockVerify, header(height))
            .unwrap();
        assert!(session.validate(txs).unwrap().is_empty());
        session.commit().unwrap();
    }

    assert_eq!(verifier.snapshot(), builder.snapshot());
}

#[test]
fn insufficient_funds() {
    let node = Node::new(5);
    let funding = Transaction::builder(TxType::COIN_BASE)
        .coin_data(&CoinData {
            from: Vec::new(),
            to: vec![coin_to(ALICE, 100)],
        })
        .build();
    node.build_block(1, &[funding]);

    let mut session = node
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    let overspend = transfer(ALICE, Nonce::ZERO, BOB, 149);
    let outcome = session.validate(&[overspend.clone()]).unwrap();
    assert_eq!(
        outcome.code_of(overspend.hash()),
        Some(ErrorCode::InsufficientBalance)
    );
    assert!(session.candidates().is_empty());

    let committed = session.commit().unwrap();
    assert!(committed.txs.is_empty());
    assert_eq!(node.balance(ALICE), Amount::from(100_u64));
    assert_eq!(node.balance(BOB), Amount::zero());
}

#[test]
fn aborted_block_restores_state() {
    let node = Node::new(5);
    node.build_block(1, &[genesis()]);
    let before = node.snapshot();

    let txs = block_two(&node);
    let mut session = node
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    assert!(session.validate(&txs).unwrap().is_empty());

    // Ledger, alias and contract call stages commit, cross-chain stage fails
    node.log_store.set_available(false);
    let error = session.commit().unwrap_err();
    node.log_store.set_available(true);
    assert!(matches!(
        error,
        OrchestratorError::CommitFailed {
            stage: CommitStage::Processor(TxType::CROSS_CHAIN),
            ..
        }
    ));

    assert_eq!(node.snapshot(), before);
    for tx in &txs[2..] {
        assert_eq!(
            node.contracts
                .contracts()
                .contract_result(CHAIN_ID, tx.hash())
                .unwrap(),
            None
        );
    }

    // Slot is released and the same block can be built again
    assert_eq!(node.build_block(2, &txs), txs);
}

#[test]
fn cross_chain_calls_are_version_gated() {
    let node = Node::new(4);
    node.build_block(1, &[genesis()]);

    let wrapped = cross_chain(1, node.nonce(CAROL), true);
    let mut session = node
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    let outcome = session.validate(&[wrapped.clone()]).unwrap();
    assert_eq!(
        outcome.code_of(wrapped.hash()),
        Some(ErrorCode::UnsupportedProtocolVersion)
    );
    session.abort();

    node.versions.set(CHAIN_ID, ProtocolVersion::new(5));
    assert_eq!(node.build_block(2, &[wrapped.clone()]), vec![wrapped]);
}

#[test]
fn same_anchor_is_applied_once() {
    let node = Node::new(5);
    node.build_block(1, &[genesis()]);

    let first = cross_chain(1, node.nonce(CAROL), false);
    node.build_block(2, &[first.clone()]);

    let second = cross_chain(1, next(&first), false);
    let mut session = node
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(3))
        .unwrap();
    let outcome = session.validate(&[second.clone()]).unwrap();
    assert_eq!(
        outcome.code_of(second.hash()),
        Some(ErrorCode::AnchorAlreadyCommitted)
    );
}
