use ll_kv_store::{KeyValueStore, KvStoreError, WriteOp};
use ll_primitives::address::Address;
use ll_primitives::amount::Amount;
use ll_primitives::chain::{BlockHeader, ChainId};
use ll_primitives::coin_data::Asset;
use ll_primitives::payload::{AliasData, PayloadError, TxPayload};
use ll_primitives::transaction::{Transaction, TxType};
use ll_tx_processor::{
    BatchInfo, ErrorCode, ProcessorError, TransactionProcessor, ValidateOutcome,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

/// Max alias length in bytes
const MAX_ALIAS_LENGTH: usize = 20;
/// Key prefix of alias -> address entries
const BY_ALIAS_PREFIX: u8 = b'a';
/// Key prefix of address -> alias entries
const BY_ADDRESS_PREFIX: u8 = b'd';

fn table_name(chain_id: ChainId) -> String {
    format!("account_alias_{chain_id}")
}

fn alias_key(alias: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + alias.len());
    key.push(BY_ALIAS_PREFIX);
    key.extend_from_slice(alias.as_bytes());
    key
}

fn address_key(address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + Address::SIZE);
    key.push(BY_ADDRESS_PREFIX);
    key.extend_from_slice(address.as_ref());
    key
}

fn alias_data(tx: &Transaction) -> Result<AliasData, PayloadError> {
    match TxPayload::decode(tx)? {
        TxPayload::Alias(data) => Ok(data),
        _ => Err(PayloadError::UnsupportedType {
            tx_type: tx.tx_type(),
        }),
    }
}

/// Whether alias satisfies format rules: 1 to 20 characters out of `a-z`, `0-9` and `_`, not
/// starting or ending with `_`
pub fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty()
        && alias.len() <= MAX_ALIAS_LENGTH
        && !alias.starts_with('_')
        && !alias.ends_with('_')
        && alias
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'_')
}

/// Alias registration options
#[derive(Debug, Clone)]
pub struct AliasConfig {
    /// Amount of the main asset that must be burned to register an alias.
    ///
    /// Default: 100 000 000.
    pub fee: Amount,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            fee: Amount::from(100_000_000_u64),
        }
    }
}

/// Processor of [`TxType::ACCOUNT_ALIAS`] transactions, maintains a two-way mapping between
/// aliases and addresses
#[derive(Debug)]
pub struct AliasProcessor<S> {
    store: S,
    config: AliasConfig,
}

impl<S> TransactionProcessor for AliasProcessor<S>
where
    S: KeyValueStore,
{
    #[inline(always)]
    fn tx_type(&self) -> TxType {
        TxType::ACCOUNT_ALIAS
    }

    fn validate(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        txs_by_type: &HashMap<TxType, Vec<Transaction>>,
        _block_header: Option<&BlockHeader>,
    ) -> ValidateOutcome {
        let mut outcome = ValidateOutcome::default();
        let mut batch_aliases = HashSet::new();
        let mut batch_addresses = HashSet::new();
        for data in txs_by_type
            .get(&TxType::ACCOUNT_ALIAS)
            .into_iter()
            .flatten()
            .filter_map(|tx| alias_data(tx).ok())
        {
            batch_aliases.insert(data.alias);
            batch_addresses.insert(data.address);
        }

        for tx in txs {
            let tx_hash = *tx.hash();
            match self.check(chain_id, tx, &batch_aliases, &batch_addresses) {
                Ok(data) => {
                    batch_aliases.insert(data.alias);
                    batch_addresses.insert(data.address);
                }
                Err(code) => {
                    debug!(%chain_id, %tx_hash, %code, "Alias transaction rejected");
                    outcome.reject(tx_hash, code);
                }
            }
        }

        outcome
    }

    fn commit(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
        _batch_info: &BatchInfo,
    ) -> Result<(), ProcessorError> {
        let table = table_name(chain_id);
        let mut ops = Vec::with_capacity(txs.len() * 2);
        for tx in txs {
            let AliasData { address, alias } = alias_data(tx)?;
            ops.push(WriteOp::Put {
                table: table.clone(),
                key: alias_key(&alias),
                value: address.as_ref().to_vec(),
            });
            ops.push(WriteOp::Put {
                table: table.clone(),
                key: address_key(&address),
                value: alias.into_bytes(),
            });
        }
        self.store.write(ops)?;

        trace!(
            %chain_id,
            height = %block_header.height,
            txs = txs.len(),
            "Aliases committed"
        );

        Ok(())
    }

    fn rollback(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        let table = table_name(chain_id);
        let mut ops = Vec::with_capacity(txs.len() * 2);
        for tx in txs.iter().rev() {
            let AliasData { address, alias } = alias_data(tx)?;
            if self.address_of(chain_id, &alias)? != Some(address) {
                warn!(
                    %chain_id,
                    tx_hash = %tx.hash(),
                    %alias,
                    "Alias to roll back is not registered for the address"
                );
                continue;
            }
            ops.push(WriteOp::Delete {
                table: table.clone(),
                key: alias_key(&alias),
            });
            ops.push(WriteOp::Delete {
                table: table.clone(),
                key: address_key(&address),
            });
        }
        self.store.write(ops)?;

        trace!(
            %chain_id,
            height = %block_header.height,
            txs = txs.len(),
            "Aliases rolled back"
        );

        Ok(())
    }
}

impl<S> AliasProcessor<S>
where
    S: KeyValueStore,
{
    /// Create new instance
    pub fn new(store: S, config: AliasConfig) -> Self {
        Self { store, config }
    }

    /// Alias registered for an address
    pub fn alias_of(
        &self,
        chain_id: ChainId,
        address: &Address,
    ) -> Result<Option<String>, KvStoreError> {
        Ok(self
            .store
            .get(&table_name(chain_id), &address_key(address))?
            .and_then(|bytes| String::from_utf8(bytes).ok()))
    }

    /// Address an alias is registered for
    pub fn address_of(
        &self,
        chain_id: ChainId,
        alias: &str,
    ) -> Result<Option<Address>, KvStoreError> {
        Ok(self
            .store
            .get(&table_name(chain_id), &alias_key(alias))?
            .and_then(|bytes| <[u8; Address::SIZE]>::try_from(bytes.as_slice()).ok())
            .map(Address::new))
    }

    fn check(
        &self,
        chain_id: ChainId,
        tx: &Transaction,
        batch_aliases: &HashSet<String>,
        batch_addresses: &HashSet<Address>,
    ) -> Result<AliasData, ErrorCode> {
        let data = alias_data(tx).map_err(|_error| ErrorCode::Malformed)?;
        if !is_valid_alias(&data.alias) {
            return Err(ErrorCode::AliasInvalid);
        }

        let coin_data = tx.coin_data().map_err(|_error| ErrorCode::Malformed)?;
        if !coin_data.is_spender(&data.address) {
            return Err(ErrorCode::Unauthorized);
        }

        let main_asset = Asset::main(chain_id);
        let mut burned = Amount::zero();
        for coin_to in &coin_data.to {
            if coin_to.address == Address::BLACK_HOLE && coin_to.asset == main_asset {
                burned += &coin_to.amount;
            }
        }
        if burned < self.config.fee {
            return Err(ErrorCode::InsufficientAliasBurn);
        }

        if batch_aliases.contains(&data.alias) {
            return Err(ErrorCode::AliasTaken);
        }
        if batch_addresses.contains(&data.address) {
            return Err(ErrorCode::AddressAlreadyAliased);
        }

        let collaborator_fault = |error: KvStoreError| {
            warn!(%chain_id, tx_hash = %tx.hash(), %error, "Failed to read alias table");
            ErrorCode::CollaboratorFault
        };
        if self
            .address_of(chain_id, &data.alias)
            .map_err(collaborator_fault)?
            .is_some()
        {
            return Err(ErrorCode::AliasTaken);
        }
        if self
            .alias_of(chain_id, &data.address)
            .map_err(collaborator_fault)?
            .is_some()
        {
            return Err(ErrorCode::AddressAlreadyAliased);
        }

        Ok(data)
    }
}
