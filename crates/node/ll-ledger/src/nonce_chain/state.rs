//! Account state and layered views over it

#[cfg(test)]
mod tests;

use crate::LedgerError;
use ll_kv_store::{KeyValueStore, WriteOp};
use ll_primitives::address::Address;
use ll_primitives::amount::Amount;
use ll_primitives::chain::{BlockHeight, ChainId};
use ll_primitives::coin_data::{Asset, CoinTo};
use ll_primitives::nonce::Nonce;
use ll_primitives::transaction::TransactionHash;
use parity_scale_codec::{Decode, Encode};
use std::collections::HashMap;
use tracing::error;

const HEIGHT_KEY: &[u8] = b"height";

/// Table names of a chain
#[derive(Debug)]
pub(super) struct Tables {
    pub(super) accounts: String,
    pub(super) committed: String,
    pub(super) spent: String,
    meta: String,
}

impl Tables {
    pub(super) fn new(chain_id: ChainId) -> Self {
        Self {
            accounts: format!("ledger_account_{chain_id}"),
            committed: format!("ledger_committed_tx_{chain_id}"),
            spent: format!("ledger_spent_nonce_{chain_id}"),
            meta: format!("ledger_meta_{chain_id}"),
        }
    }
}

/// Address/asset pair, the unit nonce chains are tracked for
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Encode, Decode)]
pub(super) struct AccountKey {
    pub(super) address: Address,
    pub(super) asset: Asset,
}

impl AccountKey {
    #[inline(always)]
    pub(super) fn new(address: Address, asset: Asset) -> Self {
        Self { address, asset }
    }

    fn spent_key(&self, nonce: &Nonce) -> Vec<u8> {
        (self, nonce).encode()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub(super) struct LockedEntry {
    amount: Amount,
    lock_time: u64,
}

/// State of an address/asset pair.
///
/// Receipts and spends are accumulated separately so that applying and reverting transactions
/// are exact inverses regardless of maturation of locked funds in between.
#[derive(Debug, Default, Clone, Eq, PartialEq, Encode, Decode)]
pub(super) struct AccountState {
    pub(super) nonce: Nonce,
    credited: Amount,
    debited: Amount,
    locked: Vec<LockedEntry>,
}

impl AccountState {
    fn matured(&self, height: BlockHeight) -> Amount {
        self.locked
            .iter()
            .filter(|entry| entry.lock_time <= height.as_u64())
            .fold(Amount::zero(), |total, entry| total + &entry.amount)
    }

    /// Balance that can be spent at the given height.
    ///
    /// Debits never exceed receipts in a consistent ledger, zero is returned if they do.
    pub(super) fn spendable(&self, height: BlockHeight) -> Amount {
        let received = self.matured(height) + &self.credited;
        match received.checked_sub(&self.debited) {
            Some(spendable) => spendable,
            None => {
                error!(
                    nonce = %self.nonce,
                    %received,
                    debited = %self.debited,
                    %height,
                    "Account debited beyond its receipts, ledger state is corrupted"
                );
                Amount::zero()
            }
        }
    }

    /// Funds locked beyond the given height
    pub(super) fn locked(&self, height: BlockHeight) -> Amount {
        self.locked
            .iter()
            .filter(|entry| entry.lock_time > height.as_u64())
            .fold(Amount::zero(), |total, entry| total + &entry.amount)
    }

    pub(super) fn debit(&mut self, next_nonce: Nonce, amount: &Amount) {
        self.nonce = next_nonce;
        self.debited += amount;
    }

    /// Returns `false` if debited amount is smaller than `amount`
    #[must_use]
    pub(super) fn undo_debit(&mut self, previous_nonce: Nonce, amount: &Amount) -> bool {
        let Some(debited) = self.debited.checked_sub(amount) else {
            return false;
        };
        self.nonce = previous_nonce;
        self.debited = debited;
        true
    }

    pub(super) fn credit(&mut self, coin_to: &CoinTo) {
        if coin_to.lock_time == 0 {
            self.credited += &coin_to.amount;
        } else {
            self.locked.push(LockedEntry {
                amount: coin_to.amount.clone(),
                lock_time: coin_to.lock_time,
            });
        }
    }

    /// Returns `false` if the receipt is not present
    #[must_use]
    pub(super) fn undo_credit(&mut self, coin_to: &CoinTo) -> bool {
        if coin_to.lock_time == 0 {
            let Some(credited) = self.credited.checked_sub(&coin_to.amount) else {
                return false;
            };
            self.credited = credited;
            true
        } else {
            let position = self.locked.iter().rposition(|entry| {
                entry.amount == coin_to.amount && entry.lock_time == coin_to.lock_time
            });
            match position {
                Some(position) => {
                    self.locked.remove(position);
                    true
                }
                None => false,
            }
        }
    }
}

/// Read access to nonce chains
pub(super) trait StateView {
    fn account(&self, key: &AccountKey) -> Result<AccountState, LedgerError>;

    /// Whether nonce was already consumed by a spend
    fn is_consumed(&self, key: &AccountKey, nonce: &Nonce) -> Result<bool, LedgerError>;
}

/// Confirmed state persisted in the store
#[derive(Debug)]
pub(super) struct ConfirmedView<'a, S> {
    store: &'a S,
    tables: Tables,
}

impl<S> StateView for ConfirmedView<'_, S>
where
    S: KeyValueStore,
{
    fn account(&self, key: &AccountKey) -> Result<AccountState, LedgerError> {
        match self.store.get(&self.tables.accounts, &key.encode())? {
            Some(bytes) => AccountState::decode(&mut bytes.as_slice()).map_err(|error| {
                LedgerError::CorruptedState {
                    table: self.tables.accounts.clone(),
                    error,
                }
            }),
            None => Ok(AccountState::default()),
        }
    }

    fn is_consumed(&self, key: &AccountKey, nonce: &Nonce) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .get(&self.tables.spent, &key.spent_key(nonce))?
            .is_some())
    }
}

impl<'a, S> ConfirmedView<'a, S>
where
    S: KeyValueStore,
{
    pub(super) fn new(store: &'a S, chain_id: ChainId) -> Self {
        Self {
            store,
            tables: Tables::new(chain_id),
        }
    }

    pub(super) fn is_committed(&self, tx_hash: &TransactionHash) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .get(&self.tables.committed, tx_hash.as_ref())?
            .is_some())
    }

    /// Height of the last committed block
    pub(super) fn height(&self) -> Result<BlockHeight, LedgerError> {
        match self.store.get(&self.tables.meta, HEIGHT_KEY)? {
            Some(bytes) => u64::decode(&mut bytes.as_slice())
                .map(BlockHeight::new)
                .map_err(|error| LedgerError::CorruptedState {
                    table: self.tables.meta.clone(),
                    error,
                }),
            None => Ok(BlockHeight::ZERO),
        }
    }

    /// Persist delta together with commit markers and new height atomically
    pub(super) fn write(
        &self,
        delta: Delta,
        committed: Vec<(TransactionHash, bool)>,
        height: BlockHeight,
    ) -> Result<(), LedgerError> {
        let mut ops = Vec::with_capacity(delta.accounts.len() + delta.consumed.len() + 1);

        for (key, state) in delta.accounts {
            ops.push(WriteOp::Put {
                table: self.tables.accounts.clone(),
                key: key.encode(),
                value: state.encode(),
            });
        }
        for ((key, nonce), consumed) in delta.consumed {
            let spent_key = key.spent_key(&nonce);
            ops.push(if consumed {
                WriteOp::Put {
                    table: self.tables.spent.clone(),
                    key: spent_key,
                    value: Vec::new(),
                }
            } else {
                WriteOp::Delete {
                    table: self.tables.spent.clone(),
                    key: spent_key,
                }
            });
        }
        for (tx_hash, is_committed) in committed {
            ops.push(if is_committed {
                WriteOp::Put {
                    table: self.tables.committed.clone(),
                    key: tx_hash.as_ref().to_vec(),
                    value: height.as_u64().encode(),
                }
            } else {
                WriteOp::Delete {
                    table: self.tables.committed.clone(),
                    key: tx_hash.as_ref().to_vec(),
                }
            });
        }
        ops.push(WriteOp::Put {
            table: self.tables.meta.clone(),
            key: HEIGHT_KEY.to_vec(),
            value: height.as_u64().encode(),
        });

        self.store.write(ops)?;

        Ok(())
    }
}

/// Changes accumulated on top of another view
#[derive(Debug, Default)]
pub(super) struct Delta {
    accounts: HashMap<AccountKey, AccountState>,
    /// `true` for consumed nonces, `false` for nonces released by reverts
    consumed: HashMap<(AccountKey, Nonce), bool>,
}

/// [`Delta`] layered over a base view
#[derive(Debug)]
pub(super) struct Overlay<'a, V> {
    base: &'a V,
    delta: &'a mut Delta,
}

impl<V> StateView for Overlay<'_, V>
where
    V: StateView,
{
    fn account(&self, key: &AccountKey) -> Result<AccountState, LedgerError> {
        match self.delta.accounts.get(key) {
            Some(state) => Ok(state.clone()),
            None => self.base.account(key),
        }
    }

    fn is_consumed(&self, key: &AccountKey, nonce: &Nonce) -> Result<bool, LedgerError> {
        match self.delta.consumed.get(&(*key, *nonce)) {
            Some(&consumed) => Ok(consumed),
            None => self.base.is_consumed(key, nonce),
        }
    }
}

impl<'a, V> Overlay<'a, V>
where
    V: StateView,
{
    pub(super) fn new(base: &'a V, delta: &'a mut Delta) -> Self {
        Self { base, delta }
    }

    pub(super) fn set(&mut self, key: AccountKey, state: AccountState) {
        self.delta.accounts.insert(key, state);
    }

    pub(super) fn consume(&mut self, key: AccountKey, nonce: Nonce) {
        self.delta.consumed.insert((key, nonce), true);
    }

    pub(super) fn release(&mut self, key: AccountKey, nonce: Nonce) {
        self.delta.consumed.insert((key, nonce), false);
    }
}

/// Spend of an unconfirmed transaction
#[derive(Debug, Clone)]
pub(super) struct UnconfirmedSpend {
    pub(super) key: AccountKey,
    pub(super) previous_nonce: Nonce,
    pub(super) next_nonce: Nonce,
    pub(super) amount: Amount,
}

/// Transaction accepted into the unconfirmed set
#[derive(Debug, Clone)]
pub(super) struct UnconfirmedTx {
    pub(super) tx_hash: TransactionHash,
    pub(super) spends: Vec<UnconfirmedSpend>,
}

/// Confirmed state with unconfirmed spends applied in acceptance order.
///
/// Receipts of unconfirmed transactions are not credited.
#[derive(Debug)]
pub(super) struct ShadowView<'a, V> {
    base: &'a V,
    unconfirmed: &'a [UnconfirmedTx],
}

impl<V> StateView for ShadowView<'_, V>
where
    V: StateView,
{
    fn account(&self, key: &AccountKey) -> Result<AccountState, LedgerError> {
        let mut state = self.base.account(key)?;
        // Spends that no longer extend the chain (conflicting with confirmed state) are ignored
        for spend in self.spends_of(key) {
            if spend.previous_nonce == state.nonce {
                state.debit(spend.next_nonce, &spend.amount);
            }
        }
        Ok(state)
    }

    fn is_consumed(&self, key: &AccountKey, nonce: &Nonce) -> Result<bool, LedgerError> {
        if self
            .spends_of(key)
            .any(|spend| &spend.previous_nonce == nonce)
        {
            return Ok(true);
        }
        self.base.is_consumed(key, nonce)
    }
}

impl<'a, V> ShadowView<'a, V> {
    pub(super) fn new(base: &'a V, unconfirmed: &'a [UnconfirmedTx]) -> Self {
        Self { base, unconfirmed }
    }

    fn spends_of<'b>(&'b self, key: &'b AccountKey) -> impl Iterator<Item = &'b UnconfirmedSpend> {
        self.unconfirmed
            .iter()
            .flat_map(|tx| &tx.spends)
            .filter(move |spend| &spend.key == key)
    }
}
