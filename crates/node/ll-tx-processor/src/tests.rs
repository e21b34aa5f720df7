use crate::{
    BatchInfo, BatchMode, BatchOrchestrator, CommitStage, ContractResult, ErrorCode,
    OrchestratorError, ProcessorError, ProcessorRegistry, ProtocolVersionSource, RegistryError,
    StaticProtocolVersions, TransactionProcessor, ValidateOutcome,
};
use ll_kv_store::MemoryKvStore;
use ll_ledger::{LedgerService, LedgerServiceExt, NonceChainLedger, PermissiveSpendAuthorizer};
use ll_primitives::address::Address;
use ll_primitives::amount::Amount;
use ll_primitives::chain::{BlockHeader, BlockHeight, ChainId, ProtocolVersion};
use ll_primitives::coin_data::{Asset, CoinData, CoinFrom, CoinTo};
use ll_primitives::nonce::Nonce;
use ll_primitives::transaction::{Transaction, TxType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

const CHAIN_ID: ChainId = ChainId::new(2);
const ASSET: Asset = Asset::main(CHAIN_ID);
const ALICE: Address = Address::new([1; Address::SIZE]);
const BOB: Address = Address::new([2; Address::SIZE]);
const BAD_REMARK: &[u8] = b"bad";

type TestLedger = Arc<NonceChainLedger<MemoryKvStore, PermissiveSpendAuthorizer>>;

#[derive(Debug)]
struct RecordingProcessor {
    tx_type: TxType,
    fail_commit: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl TransactionProcessor for RecordingProcessor {
    fn tx_type(&self) -> TxType {
        self.tx_type
    }

    fn validate(
        &self,
        _chain_id: ChainId,
        txs: &[Transaction],
        _txs_by_type: &HashMap<TxType, Vec<Transaction>>,
        _block_header: Option<&BlockHeader>,
    ) -> ValidateOutcome {
        let mut outcome = ValidateOutcome::default();
        for tx in txs {
            if tx.remark() == BAD_REMARK {
                outcome.reject(*tx.hash(), ErrorCode::Malformed);
            }
        }
        outcome
    }

    fn execute(
        &self,
        _chain_id: ChainId,
        txs: &[Transaction],
        _block_header: &BlockHeader,
        batch_info: &mut BatchInfo,
    ) -> Result<(), ProcessorError> {
        for tx in txs {
            batch_info.insert_contract_result(ContractResult {
                tx_hash: *tx.hash(),
                success: true,
                gas_used: 1,
                fee: Amount::zero(),
                error_message: None,
                state_changes: Vec::new(),
            });
        }
        Ok(())
    }

    fn commit(
        &self,
        _chain_id: ChainId,
        txs: &[Transaction],
        _block_header: &BlockHeader,
        batch_info: &BatchInfo,
    ) -> Result<(), ProcessorError> {
        assert!(
            txs.iter()
                .all(|tx| batch_info.contract_result(tx.hash()).is_some())
        );
        if self.fail_commit {
            return Err(anyhow::anyhow!("Commit failure").into());
        }
        self.log
            .lock()
            .push(format!("commit {} {}", self.tx_type, txs.len()));
        Ok(())
    }

    fn rollback(
        &self,
        _chain_id: ChainId,
        txs: &[Transaction],
        _block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        self.log
            .lock()
            .push(format!("rollback {} {}", self.tx_type, txs.len()));
        Ok(())
    }
}

struct Setup {
    ledger: TestLedger,
    orchestrator: BatchOrchestrator<TestLedger>,
    log: Arc<Mutex<Vec<String>>>,
}

fn setup(fail_transfer_commit: bool) -> Setup {
    let ledger = Arc::new(NonceChainLedger::new(
        MemoryKvStore::new(),
        PermissiveSpendAuthorizer,
    ));
    let log = Arc::default();
    let registry = ProcessorRegistry::builder()
        .with_processor(RecordingProcessor {
            tx_type: TxType::COIN_BASE,
            fail_commit: false,
            log: Arc::clone(&log),
        })
        .with_processor(RecordingProcessor {
            tx_type: TxType::TRANSFER,
            fail_commit: fail_transfer_commit,
            log: Arc::clone(&log),
        })
        .build()
        .unwrap();

    Setup {
        orchestrator: BatchOrchestrator::new(Arc::clone(&ledger), registry),
        ledger,
        log,
    }
}

fn header(height: u64) -> BlockHeader {
    BlockHeader {
        height: BlockHeight::new(height),
        time: height * 1_000,
    }
}

fn coinbase(amount: u64) -> Transaction {
    Transaction::builder(TxType::COIN_BASE)
        .time(amount)
        .coin_data(&CoinData {
            from: Vec::new(),
            to: vec![CoinTo {
                address: ALICE,
                asset: ASSET,
                amount: Amount::from(amount),
                lock_time: 0,
            }],
        })
        .build()
}

fn transfer(nonce: Nonce, amount: u64, remark: &[u8]) -> Transaction {
    Transaction::builder(TxType::TRANSFER)
        .remark(remark.to_vec())
        .coin_data(&CoinData {
            from: vec![CoinFrom {
                address: ALICE,
                asset: ASSET,
                amount: Amount::from(amount),
                nonce,
                locked: 0,
            }],
            to: vec![CoinTo {
                address: BOB,
                asset: ASSET,
                amount: Amount::from(amount),
                lock_time: 0,
            }],
        })
        .build()
}

fn balance(ledger: &TestLedger, address: Address) -> Amount {
    ledger
        .get_balance(CHAIN_ID, &address, ASSET)
        .unwrap()
        .available
}

/// Commit a block funding Alice
fn fund(setup: &Setup, amount: u64) {
    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(1))
        .unwrap();
    assert!(session.validate(&[coinbase(amount)]).unwrap().is_empty());
    session.commit().unwrap();
    setup.log.lock().clear();
}

#[test]
fn registry_rejects_duplicate_types() {
    let log = Arc::default();
    let result = ProcessorRegistry::builder()
        .with_processor(RecordingProcessor {
            tx_type: TxType::TRANSFER,
            fail_commit: false,
            log: Arc::clone(&log),
        })
        .with_processor(RecordingProcessor {
            tx_type: TxType::TRANSFER,
            fail_commit: false,
            log,
        })
        .build();

    assert!(matches!(
        result,
        Err(RegistryError::DuplicateType { tx_type }) if tx_type == TxType::TRANSFER
    ));
}

#[test]
fn session_exclusivity() {
    let setup = setup(false);

    let session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(1))
        .unwrap();
    assert!(matches!(
        setup
            .orchestrator
            .begin(CHAIN_ID, BatchMode::BlockBuild, header(1)),
        Err(OrchestratorError::SessionInProgress { .. })
    ));
    // Other chains are independent
    let other = setup
        .orchestrator
        .begin(ChainId::new(3), BatchMode::BlockVerify, header(1))
        .unwrap();
    // Reorg path competes for the same slot
    assert!(matches!(
        setup.orchestrator.rollback_block(CHAIN_ID, &header(1), &[]),
        Err(OrchestratorError::SessionInProgress { .. })
    ));

    // Dropping aborts and releases the slot
    drop(session);
    other.abort();
    let session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(1))
        .unwrap();
    session.abort();
    setup
        .orchestrator
        .begin(ChainId::new(3), BatchMode::BlockBuild, header(1))
        .unwrap();
}

#[test]
fn build_excludes_rejected() {
    let setup = setup(false);
    fund(&setup, 100);

    let good = transfer(Nonce::ZERO, 10, b"");
    let bad = transfer(Nonce::from_hash(good.hash()), 10, BAD_REMARK);
    let insufficient = transfer(Nonce::from_hash(good.hash()), 1_000, b"");
    let unknown = Transaction::builder(TxType::new(99)).build();

    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    let outcome = session
        .validate(&[
            good.clone(),
            bad.clone(),
            insufficient.clone(),
            unknown.clone(),
            good.clone(),
        ])
        .unwrap();

    assert_eq!(outcome.code_of(bad.hash()), Some(ErrorCode::Malformed));
    assert_eq!(
        outcome.code_of(insufficient.hash()),
        Some(ErrorCode::InsufficientBalance)
    );
    assert_eq!(
        outcome.code_of(unknown.hash()),
        Some(ErrorCode::UnsupportedTxType)
    );
    assert_eq!(
        outcome.code_of(good.hash()),
        Some(ErrorCode::DuplicateTransaction)
    );
    assert_eq!(session.candidates(), &[good.clone()]);

    // Nonce chains continue across validate calls
    let next = transfer(Nonce::from_hash(good.hash()), 20, b"");
    assert!(session.validate(&[next.clone()]).unwrap().is_empty());

    let committed = session.commit().unwrap();
    assert_eq!(committed.txs, vec![good, next]);
    assert_eq!(committed.batch_info.contract_results_len(), 2);
    assert_eq!(balance(&setup.ledger, ALICE), Amount::from(70_u64));
    assert_eq!(balance(&setup.ledger, BOB), Amount::from(30_u64));
    assert_eq!(*setup.log.lock(), vec!["commit 2 2".to_string()]);
}

#[test]
fn aborted_block_leaves_no_trace() {
    let setup = setup(true);
    fund(&setup, 100);

    let block_coinbase = coinbase(50);
    let tx = transfer(Nonce::ZERO, 10, b"");
    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    assert!(
        session
            .validate(&[block_coinbase, tx.clone()])
            .unwrap()
            .is_empty()
    );

    let result = session.commit();
    assert!(matches!(
        result,
        Err(OrchestratorError::CommitFailed {
            stage: CommitStage::Processor(tx_type),
            ..
        }) if tx_type == TxType::TRANSFER
    ));

    // Failed transfer processor and committed coinbase processor are rolled back in reverse
    // order, ledger was rolled back too
    assert_eq!(
        *setup.log.lock(),
        vec![
            "commit 1 1".to_string(),
            "rollback 2 1".to_string(),
            "rollback 1 1".to_string()
        ]
    );
    assert_eq!(balance(&setup.ledger, ALICE), Amount::from(100_u64));
    assert_eq!(balance(&setup.ledger, BOB), Amount::zero());
    assert_eq!(
        setup.ledger.get_nonce(CHAIN_ID, &ALICE, ASSET).unwrap(),
        Nonce::ZERO
    );

    // Slot is released
    setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
}

#[test]
fn abort_discards_staged_frontier() {
    let setup = setup(false);
    fund(&setup, 100);

    let first = transfer(Nonce::ZERO, 10, b"");
    let second = transfer(Nonce::from_hash(first.hash()), 10, b"");
    let conflicting = transfer(Nonce::ZERO, 30, b"");

    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    assert!(
        session
            .validate(&[first.clone(), second.clone()])
            .unwrap()
            .is_empty()
    );
    session.abort();

    // Frontier no longer holds the spends of aborted session
    assert!(
        setup
            .ledger
            .verify_tx(CHAIN_ID, &conflicting, true)
            .unwrap()
            .is_success()
    );
    assert!(
        setup
            .ledger
            .rollback_validate_status(CHAIN_ID, &conflicting)
            .unwrap()
    );

    // Same for a session that is dropped
    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    assert!(session.validate(&[first]).unwrap().is_empty());
    drop(session);
    assert!(
        setup
            .ledger
            .verify_tx(CHAIN_ID, &conflicting, true)
            .unwrap()
            .is_success()
    );
}

#[test]
fn rejected_transaction_can_be_offered_again() {
    let setup = setup(false);
    fund(&setup, 100);

    let first = transfer(Nonce::ZERO, 10, b"");
    let second = transfer(Nonce::from_hash(first.hash()), 10, b"");

    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    // Nonce chain predecessor is not there yet
    let outcome = session.validate(&[second.clone()]).unwrap();
    assert_eq!(outcome.rejected.len(), 1);
    assert_ne!(
        outcome.code_of(second.hash()),
        Some(ErrorCode::DuplicateTransaction)
    );

    // Once predecessor is accepted, the same transaction is accepted as well
    assert!(session.validate(&[first.clone()]).unwrap().is_empty());
    assert!(session.validate(&[second.clone()]).unwrap().is_empty());

    // Accepted transactions are still deduplicated
    assert_eq!(
        session.validate(&[first.clone()]).unwrap().code_of(first.hash()),
        Some(ErrorCode::DuplicateTransaction)
    );

    let committed = session.commit().unwrap();
    assert_eq!(committed.txs, vec![first, second]);
    assert_eq!(balance(&setup.ledger, BOB), Amount::from(20_u64));
}

#[test]
fn verify_mode_rejects_whole_block() {
    let setup = setup(false);
    fund(&setup, 100);

    let first = transfer(Nonce::ZERO, 10, b"");
    let second = transfer(Nonce::from_hash(first.hash()), 20, b"");

    // Valid block, nonces chain within the block
    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockVerify, header(2))
        .unwrap();
    assert!(
        session
            .validate(&[first.clone(), second.clone()])
            .unwrap()
            .is_empty()
    );
    drop(session);

    // Wrong order
    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockVerify, header(2))
        .unwrap();
    let outcome = session.validate(&[second, first]).unwrap();
    assert_eq!(outcome.rejected.len(), 2);
    assert!(
        outcome
            .rejected
            .iter()
            .all(|rejected| rejected.code == ErrorCode::InvalidBlockCoinData)
    );
    assert!(matches!(
        session.commit(),
        Err(OrchestratorError::InvalidBlock { rejected: 2, .. })
    ));

    // Any processor rejection invalidates the block as well
    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockVerify, header(2))
        .unwrap();
    session
        .validate(&[transfer(Nonce::ZERO, 10, BAD_REMARK)])
        .unwrap();
    assert!(matches!(
        session.commit(),
        Err(OrchestratorError::InvalidBlock { rejected: 1, .. })
    ));
    assert_eq!(balance(&setup.ledger, ALICE), Amount::from(100_u64));
}

#[test]
fn rollback_block() {
    let setup = setup(false);
    fund(&setup, 100);

    let tx = transfer(Nonce::ZERO, 10, b"");
    let mut session = setup
        .orchestrator
        .begin(CHAIN_ID, BatchMode::BlockBuild, header(2))
        .unwrap();
    session.validate(&[coinbase(5), tx.clone()]).unwrap();
    let committed = session.commit().unwrap();
    assert_eq!(balance(&setup.ledger, ALICE), Amount::from(95_u64));
    setup.log.lock().clear();

    setup
        .orchestrator
        .rollback_block(CHAIN_ID, &header(2), &committed.txs)
        .unwrap();
    // Reverse registration order
    assert_eq!(
        *setup.log.lock(),
        vec!["rollback 2 1".to_string(), "rollback 1 1".to_string()]
    );
    assert_eq!(balance(&setup.ledger, ALICE), Amount::from(100_u64));
    assert_eq!(balance(&setup.ledger, BOB), Amount::zero());
}

#[test]
fn unconfirmed_validation() {
    let setup = setup(false);

    let good = transfer(Nonce::ZERO, 10, b"");
    let bad = transfer(Nonce::ZERO, 10, BAD_REMARK);
    let outcome = setup
        .orchestrator
        .validate_unconfirmed(CHAIN_ID, &[good.clone(), bad.clone(), good.clone()]);

    assert_eq!(outcome.rejected.len(), 2);
    assert_eq!(outcome.code_of(bad.hash()), Some(ErrorCode::Malformed));
    assert_eq!(
        outcome.code_of(good.hash()),
        Some(ErrorCode::DuplicateTransaction)
    );
}

#[test]
fn protocol_versions() {
    let versions = StaticProtocolVersions::new(ProtocolVersion::new(1));
    assert_eq!(versions.protocol_version(CHAIN_ID), ProtocolVersion::new(1));

    versions.set(CHAIN_ID, ProtocolVersion::new(5));
    versions.set(CHAIN_ID, ProtocolVersion::new(3));
    assert_eq!(versions.protocol_version(CHAIN_ID), ProtocolVersion::new(5));
    assert_eq!(
        versions.protocol_version(ChainId::new(3)),
        ProtocolVersion::new(1)
    );
}
