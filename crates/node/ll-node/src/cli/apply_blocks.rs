use crate::Error;
use crate::cli::CliCommand;
use clap::Parser;
use ll_commit_log::CommittedCrossChainTxLog;
use ll_kv_store::{KvStoreError, MemoryKvStore};
use ll_ledger::{
    Ed25519SpendAuthorizer, LedgerError, LedgerService, NonceChainLedger,
    PermissiveSpendAuthorizer, SpendAuthorizer,
};
use ll_primitives::address::{Address, AddressError};
use ll_primitives::amount::Amount;
use ll_primitives::chain::{BlockHeader, BlockHeight, ChainId, ProtocolVersion};
use ll_primitives::coin_data::{Asset, CoinData, CoinTo};
use ll_primitives::transaction::{Transaction, TransactionError, TxType};
use ll_processors::{
    AliasConfig, AliasProcessor, CoinBaseProcessor, ContractCallConfig, ContractCallProcessor,
    CrossChainProcessor, KvContractState, TransferProcessor,
};
use ll_tx_processor::{
    BatchMode, BatchOrchestrator, ErrorCode, OrchestratorError, ProcessorRegistry, RegistryError,
    StaticProtocolVersions,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::{fs, io};
use tracing::{info, warn};

const GENESIS_HEIGHT: BlockHeight = BlockHeight::ZERO;

type Ledger<A> = Arc<NonceChainLedger<MemoryKvStore, A>>;
type Contracts =
    ContractCallProcessor<KvContractState<MemoryKvStore>, Arc<StaticProtocolVersions>>;
type CrossChain =
    CrossChainProcessor<MemoryKvStore, KvContractState<MemoryKvStore>, Arc<StaticProtocolVersions>>;

/// Error for [`ApplyBlocks`]
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApplyBlocksError {
    /// Failed to read input file
    #[error("Failed to read {}: {error}", .path.display())]
    ReadFile {
        /// Path to the file
        path: PathBuf,
        /// Low-level error
        error: io::Error,
    },
    /// Failed to parse input file
    #[error("Failed to parse {}: {error}", .path.display())]
    ParseFile {
        /// Path to the file
        path: PathBuf,
        /// Low-level error
        error: serde_json::Error,
    },
    /// Invalid address
    #[error("Invalid address: {error}")]
    InvalidAddress {
        /// Low-level error
        #[from]
        error: AddressError,
    },
    /// Invalid amount
    #[error("Invalid amount {amount}: {error}")]
    InvalidAmount {
        /// Amount as it appears in the file
        amount: String,
        /// Low-level error
        error: <Amount as FromStr>::Err,
    },
    /// Invalid transaction
    #[error("Invalid transaction {index} of block {height}: {error}")]
    InvalidTransaction {
        /// Block height
        height: BlockHeight,
        /// Index of the transaction within the block
        index: usize,
        /// Low-level error
        error: TransactionError,
    },
    /// Blocks are not sequential
    #[error("Block {height} doesn't follow block {previous}")]
    NonSequentialHeight {
        /// Height of the previous block
        previous: BlockHeight,
        /// Height of the block
        height: BlockHeight,
    },
    /// Genesis allocations were rejected
    #[error("Genesis allocations were rejected with {code}")]
    GenesisRejected {
        /// Rejection reason
        code: ErrorCode,
    },
    /// Storage error
    #[error("Storage error: {error}")]
    Storage {
        /// Low-level error
        #[from]
        error: KvStoreError,
    },
    /// Ledger error
    #[error("Ledger error: {error}")]
    Ledger {
        /// Low-level error
        #[from]
        error: LedgerError,
    },
    /// Failed to assemble processor registry
    #[error("Failed to assemble processor registry: {error}")]
    Registry {
        /// Low-level error
        #[from]
        error: RegistryError,
    },
    /// Batch processing error
    #[error("Batch processing error: {error}")]
    Orchestrator {
        /// Low-level error
        #[from]
        error: OrchestratorError,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GenesisFile {
    /// Timestamp of the genesis coinbase transaction
    #[serde(default)]
    time: u64,
    allocations: Vec<Allocation>,
    /// Addresses of deployed contracts, hex-encoded
    #[serde(default)]
    contracts: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Allocation {
    address: String,
    #[serde(default = "main_asset_id")]
    asset_id: u16,
    /// Decimal string, amounts don't fit into JSON numbers
    amount: String,
}

fn main_asset_id() -> u16 {
    Asset::MAIN_ASSET_ID
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockFile {
    height: u64,
    time: u64,
    /// Hex-encoded transactions
    txs: Vec<String>,
}

fn read_json<T>(path: &Path) -> Result<T, ApplyBlocksError>
where
    T: for<'de> Deserialize<'de>,
{
    let contents = fs::read(path).map_err(|error| ApplyBlocksError::ReadFile {
        path: path.to_path_buf(),
        error,
    })?;
    serde_json::from_slice(&contents).map_err(|error| ApplyBlocksError::ParseFile {
        path: path.to_path_buf(),
        error,
    })
}

fn parse_amount(amount: &str) -> Result<Amount, ApplyBlocksError> {
    Amount::from_str(amount).map_err(|error| ApplyBlocksError::InvalidAmount {
        amount: amount.to_string(),
        error,
    })
}

/// Apply genesis and a sequence of blocks to a fresh in-memory ledger
#[derive(Debug, Parser)]
pub(crate) struct ApplyBlocks {
    /// Chain ID
    #[arg(long)]
    chain_id: u16,
    /// Protocol version of the chain
    #[arg(long)]
    protocol_version: u16,
    /// Path to genesis JSON file with initial allocations and contracts
    #[arg(long)]
    genesis: PathBuf,
    /// Path to JSON file with an array of blocks
    #[arg(long)]
    blocks: PathBuf,
    /// Verify blocks instead of building them: any invalid transaction invalidates the whole
    /// block instead of being excluded from it
    #[arg(long)]
    verify: bool,
    /// Accept spends without checking signatures
    #[arg(long)]
    skip_signatures: bool,
    /// Amount of the main asset that must be burned to register an alias
    #[arg(long)]
    alias_fee: Option<Amount>,
    /// Protocol version starting with which contract calls triggered by cross-chain transactions
    /// are accepted
    #[arg(long)]
    cross_chain_call_version: Option<u16>,
}

impl CliCommand for ApplyBlocks {
    fn run(self) -> Result<(), Error> {
        Ok(self.run()?)
    }
}

impl ApplyBlocks {
    fn run(self) -> Result<(), ApplyBlocksError> {
        let genesis = read_json::<GenesisFile>(&self.genesis)?;
        let blocks = read_json::<Vec<BlockFile>>(&self.blocks)?;

        if self.skip_signatures {
            Node::new(&self, PermissiveSpendAuthorizer)?.apply(genesis, blocks)
        } else {
            Node::new(&self, Ed25519SpendAuthorizer)?.apply(genesis, blocks)
        }
    }
}

#[derive(Debug)]
struct Node<A>
where
    A: SpendAuthorizer,
{
    chain_id: ChainId,
    mode: BatchMode,
    ledger: Ledger<A>,
    aliases: Arc<AliasProcessor<MemoryKvStore>>,
    contracts: Arc<Contracts>,
    cross_chain: Arc<CrossChain>,
    orchestrator: BatchOrchestrator<Ledger<A>>,
}

impl<A> Node<A>
where
    A: SpendAuthorizer,
{
    fn new(cmd: &ApplyBlocks, authorizer: A) -> Result<Self, ApplyBlocksError> {
        let chain_id = ChainId::new(cmd.chain_id);
        let store = MemoryKvStore::new();
        let versions = Arc::new(StaticProtocolVersions::new(ProtocolVersion::new(
            cmd.protocol_version,
        )));

        let mut alias_config = AliasConfig::default();
        if let Some(fee) = &cmd.alias_fee {
            alias_config.fee = fee.clone();
        }
        let mut contract_call_config = ContractCallConfig::default();
        if let Some(version) = cmd.cross_chain_call_version {
            contract_call_config.cross_chain_call_version = ProtocolVersion::new(version);
        }

        let ledger = Arc::new(NonceChainLedger::new(store.clone(), authorizer));
        let aliases = Arc::new(AliasProcessor::new(store.clone(), alias_config));
        let contracts = Arc::new(ContractCallProcessor::new(
            KvContractState::new(store.clone()),
            versions,
            contract_call_config,
        ));
        let cross_chain = Arc::new(CrossChainProcessor::new(
            CommittedCrossChainTxLog::new(store),
            Arc::clone(&contracts),
        ));

        let registry = ProcessorRegistry::builder()
            .with_processor(CoinBaseProcessor)
            .with_processor(TransferProcessor)
            .with_processor(Arc::clone(&aliases))
            .with_processor(Arc::clone(&contracts))
            .with_processor(Arc::clone(&cross_chain))
            .build()?;

        Ok(Self {
            chain_id,
            mode: if cmd.verify {
                BatchMode::BlockVerify
            } else {
                BatchMode::BlockBuild
            },
            orchestrator: BatchOrchestrator::new(Arc::clone(&ledger), registry),
            ledger,
            aliases,
            contracts,
            cross_chain,
        })
    }

    fn apply(self, genesis: GenesisFile, blocks: Vec<BlockFile>) -> Result<(), ApplyBlocksError> {
        let mut accounts = BTreeSet::new();

        self.apply_genesis(genesis, &mut accounts)?;

        let mut previous = GENESIS_HEIGHT;
        for block in blocks {
            let height = BlockHeight::new(block.height);
            if height != previous.saturating_add(BlockHeight::ONE) {
                return Err(ApplyBlocksError::NonSequentialHeight { previous, height });
            }

            let txs = block
                .txs
                .iter()
                .enumerate()
                .map(|(index, tx)| {
                    Transaction::from_hex(tx).map_err(|error| {
                        ApplyBlocksError::InvalidTransaction {
                            height,
                            index,
                            error,
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let committed = self.apply_block(
                BlockHeader {
                    height,
                    time: block.time,
                },
                &txs,
            )?;
            for tx in &committed {
                if let Ok(coin_data) = tx.coin_data() {
                    collect_accounts(&coin_data, &mut accounts);
                }
            }

            previous = height;
        }

        self.report(&accounts)
    }

    fn apply_genesis(
        &self,
        genesis: GenesisFile,
        accounts: &mut BTreeSet<(Address, Asset)>,
    ) -> Result<(), ApplyBlocksError> {
        for contract in &genesis.contracts {
            let address = Address::from_hex(contract)?;
            self.contracts
                .contracts()
                .register_contract(self.chain_id, &address)?;
            info!(chain_id = %self.chain_id, %address, "Contract registered");
        }

        if genesis.allocations.is_empty() {
            return Ok(());
        }

        let to = genesis
            .allocations
            .iter()
            .map(|allocation| -> Result<CoinTo, ApplyBlocksError> {
                Ok(CoinTo {
                    address: Address::from_hex(&allocation.address)?,
                    asset: Asset::new(self.chain_id, allocation.asset_id),
                    amount: parse_amount(&allocation.amount)?,
                    lock_time: 0,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let coin_data = CoinData {
            from: Vec::new(),
            to,
        };
        collect_accounts(&coin_data, accounts);

        let coinbase = Transaction::builder(TxType::COIN_BASE)
            .time(genesis.time)
            .coin_data(&coin_data)
            .build();

        let header = BlockHeader {
            height: GENESIS_HEIGHT,
            time: genesis.time,
        };
        let mut session = self
            .orchestrator
            .begin(self.chain_id, BatchMode::BlockBuild, header)?;
        let outcome = session.validate(std::slice::from_ref(&coinbase))?;
        if let Some(rejected) = outcome.rejected.first() {
            return Err(ApplyBlocksError::GenesisRejected {
                code: rejected.code,
            });
        }
        session.commit()?;

        info!(
            chain_id = %self.chain_id,
            allocations = genesis.allocations.len(),
            "Genesis applied"
        );

        Ok(())
    }

    /// Returns transactions that were committed
    fn apply_block(
        &self,
        header: BlockHeader,
        txs: &[Transaction],
    ) -> Result<Vec<Transaction>, ApplyBlocksError> {
        let chain_id = self.chain_id;
        let mut session = self.orchestrator.begin(chain_id, self.mode, header)?;
        let outcome = session.validate(txs)?;
        for rejected in &outcome.rejected {
            warn!(
                %chain_id,
                height = %header.height,
                tx_hash = %rejected.tx_hash,
                code = %rejected.code,
                "Transaction rejected"
            );
        }

        let committed = session.commit()?;

        info!(
            %chain_id,
            height = %header.height,
            txs = committed.txs.len(),
            rejected = outcome.rejected.len(),
            contract_calls = committed.batch_info.contract_results_len(),
            "Block applied"
        );

        Ok(committed.txs)
    }

    fn report(&self, accounts: &BTreeSet<(Address, Asset)>) -> Result<(), ApplyBlocksError> {
        let chain_id = self.chain_id;

        for (address, asset) in accounts {
            let balance = self.ledger.get_balance(chain_id, address, *asset)?;
            let nonce = self.ledger.get_nonce(chain_id, address, *asset)?;
            info!(
                %address,
                %asset,
                available = %balance.available,
                locked = %balance.locked,
                %nonce,
                "Balance"
            );
        }

        let addresses = accounts
            .iter()
            .map(|(address, _asset)| *address)
            .collect::<BTreeSet<_>>();
        for address in addresses {
            if let Some(alias) = self.aliases.alias_of(chain_id, &address)? {
                info!(%address, %alias, "Alias");
            }
        }

        match self.cross_chain.log().get_list(chain_id) {
            Some(txs) => {
                info!(%chain_id, entries = txs.len(), "Committed cross-chain transactions");
                for tx in txs {
                    info!(tx_hash = %tx.hash(), "Committed cross-chain transaction");
                }
            }
            None => {
                warn!(%chain_id, "Failed to list committed cross-chain transactions");
            }
        }

        Ok(())
    }
}

fn collect_accounts(coin_data: &CoinData, accounts: &mut BTreeSet<(Address, Asset)>) {
    for coin_from in &coin_data.from {
        accounts.insert((coin_from.address, coin_from.asset));
    }
    for coin_to in &coin_data.to {
        accounts.insert((coin_to.address, coin_to.asset));
    }
}
