mod state;

use crate::nonce_chain::state::{
    AccountKey, AccountState, ConfirmedView, Delta, Overlay, ShadowView, StateView,
    UnconfirmedSpend, UnconfirmedTx,
};
use crate::{
    AccountBalance, BalanceNonce, LedgerCode, LedgerError, LedgerService, SpendAuthorizer,
    VerifyCoinDataResult,
};
use ll_kv_store::KeyValueStore;
use ll_primitives::address::Address;
use ll_primitives::chain::{BlockHeight, ChainId};
use ll_primitives::coin_data::{Asset, CoinData};
use ll_primitives::nonce::Nonce;
use ll_primitives::transaction::{Transaction, TransactionError, TransactionHash, TxType};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
struct BatchFrontier {
    delta: Delta,
    staged: HashSet<TransactionHash>,
}

#[derive(Debug, Default)]
struct ChainState {
    /// In acceptance order
    unconfirmed: Vec<UnconfirmedTx>,
    batch: Option<BatchFrontier>,
}

fn decode_txs(txs_hex: &[String]) -> Result<Vec<Transaction>, TransactionError> {
    txs_hex
        .iter()
        .map(|tx_hex| Transaction::from_hex(tx_hex))
        .collect()
}

/// Account state read through pending changes first
fn pending_account<V>(
    view: &V,
    changes: &mut HashMap<AccountKey, AccountState>,
    key: AccountKey,
) -> Result<AccountState, LedgerError>
where
    V: StateView,
{
    match changes.remove(&key) {
        Some(state) => Ok(state),
        None => view.account(&key),
    }
}

/// Reference [`LedgerService`] implementation.
///
/// Confirmed state lives in a [`KeyValueStore`], unconfirmed set and batch frontier are kept in
/// memory. Locked receipts (`lock_time != 0`) mature at block height `lock_time`, verification
/// outside of a block uses the height following the last committed block.
#[derive(Debug)]
pub struct NonceChainLedger<S, A> {
    store: S,
    authorizer: A,
    chains: Mutex<HashMap<ChainId, ChainState>>,
}

impl<S, A> LedgerService for NonceChainLedger<S, A>
where
    S: KeyValueStore,
    A: SpendAuthorizer,
{
    fn verify_coin_data(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
        is_batch: bool,
    ) -> Result<VerifyCoinDataResult, LedgerError> {
        let tx = match Transaction::from_hex(tx_hex) {
            Ok(tx) => tx,
            Err(error) => {
                return Ok(VerifyCoinDataResult::rejected(
                    LedgerCode::Malformed,
                    error.to_string(),
                ));
            }
        };

        let mut chains = self.chains.lock();
        let chain = chains.entry(chain_id).or_default();
        let confirmed = ConfirmedView::new(&self.store, chain_id);
        let height = confirmed.height()?.saturating_add(BlockHeight::ONE);

        if is_batch {
            let batch = chain.batch.get_or_insert_with(|| {
                debug!(%chain_id, "Opening batch frontier implicitly");
                BatchFrontier::default()
            });
            if batch.staged.contains(tx.hash()) {
                return Ok(VerifyCoinDataResult::success());
            }

            let mut overlay = Overlay::new(&confirmed, &mut batch.delta);
            let result = self.apply_tx(&mut overlay, &tx, height)?;
            if result.is_success() {
                batch.staged.insert(*tx.hash());
            }

            Ok(result)
        } else {
            let shadow = ShadowView::new(&confirmed, &chain.unconfirmed);
            let mut delta = Delta::default();
            self.apply_tx(&mut Overlay::new(&shadow, &mut delta), &tx, height)
        }
    }

    fn verify_block_txs_coin_data(
        &self,
        chain_id: ChainId,
        txs_hex: &[String],
        height: BlockHeight,
    ) -> Result<bool, LedgerError> {
        let txs = match decode_txs(txs_hex) {
            Ok(txs) => txs,
            Err(error) => {
                debug!(%chain_id, %height, %error, "Failed to decode block transaction");
                return Ok(false);
            }
        };

        let _chains = self.chains.lock();
        let confirmed = ConfirmedView::new(&self.store, chain_id);
        let mut delta = Delta::default();
        let mut overlay = Overlay::new(&confirmed, &mut delta);

        for tx in &txs {
            let result = self.apply_tx(&mut overlay, tx, height)?;
            if !result.is_success() {
                debug!(
                    %chain_id,
                    %height,
                    tx_hash = %tx.hash(),
                    code = %result.code,
                    description = %result.description,
                    "Block transaction rejected by ledger"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn get_nonce(
        &self,
        chain_id: ChainId,
        address: &Address,
        asset: Asset,
    ) -> Result<Nonce, LedgerError> {
        let chains = self.chains.lock();
        let confirmed = ConfirmedView::new(&self.store, chain_id);
        let unconfirmed = chains
            .get(&chain_id)
            .map(|chain| chain.unconfirmed.as_slice())
            .unwrap_or_default();

        Ok(ShadowView::new(&confirmed, unconfirmed)
            .account(&AccountKey::new(*address, asset))?
            .nonce)
    }

    fn get_balance(
        &self,
        chain_id: ChainId,
        address: &Address,
        asset: Asset,
    ) -> Result<AccountBalance, LedgerError> {
        let _chains = self.chains.lock();
        let confirmed = ConfirmedView::new(&self.store, chain_id);
        let height = confirmed.height()?.saturating_add(BlockHeight::ONE);
        let state = confirmed.account(&AccountKey::new(*address, asset))?;

        Ok(AccountBalance {
            available: state.spendable(height),
            locked: state.locked(height),
        })
    }

    fn get_balance_nonce(
        &self,
        chain_id: ChainId,
        address: &Address,
        asset: Asset,
    ) -> Result<BalanceNonce, LedgerError> {
        let chains = self.chains.lock();
        let confirmed = ConfirmedView::new(&self.store, chain_id);
        let height = confirmed.height()?.saturating_add(BlockHeight::ONE);
        let unconfirmed = chains
            .get(&chain_id)
            .map(|chain| chain.unconfirmed.as_slice())
            .unwrap_or_default();
        let state =
            ShadowView::new(&confirmed, unconfirmed).account(&AccountKey::new(*address, asset))?;

        Ok(BalanceNonce {
            available: state.spendable(height),
            nonce: state.nonce,
        })
    }

    fn coin_data_batch_notify(&self, chain_id: ChainId) -> Result<bool, LedgerError> {
        self.chains.lock().entry(chain_id).or_default().batch = Some(BatchFrontier::default());

        debug!(%chain_id, "Batch frontier opened");

        Ok(true)
    }

    fn commit_unconfirmed_tx(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
    ) -> Result<VerifyCoinDataResult, LedgerError> {
        let tx = match Transaction::from_hex(tx_hex) {
            Ok(tx) => tx,
            Err(error) => {
                return Ok(VerifyCoinDataResult::rejected(
                    LedgerCode::Malformed,
                    error.to_string(),
                ));
            }
        };
        let coin_data = match self.check_coin_data(&tx) {
            Ok(coin_data) => coin_data,
            Err(result) => {
                return Ok(result);
            }
        };

        let mut chains = self.chains.lock();
        let chain = chains.entry(chain_id).or_default();
        if chain
            .unconfirmed
            .iter()
            .any(|unconfirmed| &unconfirmed.tx_hash == tx.hash())
        {
            return Ok(VerifyCoinDataResult::success());
        }

        let confirmed = ConfirmedView::new(&self.store, chain_id);
        let height = confirmed.height()?.saturating_add(BlockHeight::ONE);
        let result = {
            let shadow = ShadowView::new(&confirmed, &chain.unconfirmed);
            let mut delta = Delta::default();
            self.apply_coin_data(
                &mut Overlay::new(&shadow, &mut delta),
                tx.hash(),
                &coin_data,
                height,
            )?
        };

        if result.is_success() {
            let next_nonce = Nonce::from_hash(tx.hash());
            chain.unconfirmed.push(UnconfirmedTx {
                tx_hash: *tx.hash(),
                spends: coin_data
                    .from
                    .into_iter()
                    .map(|coin_from| UnconfirmedSpend {
                        key: AccountKey::new(coin_from.address, coin_from.asset),
                        previous_nonce: coin_from.nonce,
                        next_nonce,
                        amount: coin_from.amount,
                    })
                    .collect(),
            });

            trace!(%chain_id, tx_hash = %tx.hash(), "Unconfirmed transaction accepted");
        }

        Ok(result)
    }

    fn commit_txs_ledger(
        &self,
        chain_id: ChainId,
        txs_hex: &[String],
        height: BlockHeight,
    ) -> Result<bool, LedgerError> {
        let txs = decode_txs(txs_hex)?;

        let mut chains = self.chains.lock();
        let confirmed = ConfirmedView::new(&self.store, chain_id);
        let mut delta = Delta::default();
        let mut committed = HashSet::with_capacity(txs.len());

        {
            let mut overlay = Overlay::new(&confirmed, &mut delta);
            for tx in &txs {
                if committed.contains(tx.hash()) || confirmed.is_committed(tx.hash())? {
                    trace!(%chain_id, tx_hash = %tx.hash(), "Skipping already committed transaction");
                    continue;
                }

                let result = self.apply_tx(&mut overlay, tx, height)?;
                if !result.is_success() {
                    warn!(
                        %chain_id,
                        %height,
                        tx_hash = %tx.hash(),
                        code = %result.code,
                        description = %result.description,
                        "Failed to commit transaction to ledger"
                    );
                    return Ok(false);
                }
                committed.insert(*tx.hash());
            }
        }

        let new_height = confirmed.height()?.max(height);
        confirmed.write(
            delta,
            committed.iter().map(|tx_hash| (*tx_hash, true)).collect(),
            new_height,
        )?;

        let chain = chains.entry(chain_id).or_default();
        chain.batch = None;
        chain
            .unconfirmed
            .retain(|unconfirmed| !committed.contains(&unconfirmed.tx_hash));

        debug!(
            %chain_id,
            %height,
            committed = committed.len(),
            skipped = txs.len() - committed.len(),
            "Committed transactions to ledger"
        );

        Ok(true)
    }

    fn rollback_tx_validate_status(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
    ) -> Result<bool, LedgerError> {
        let tx = Transaction::from_hex(tx_hex)?;

        let mut chains = self.chains.lock();
        let Some(batch) = chains
            .get_mut(&chain_id)
            .and_then(|chain| chain.batch.as_mut())
        else {
            return Ok(false);
        };
        if !batch.staged.contains(tx.hash()) {
            return Ok(false);
        }

        let confirmed = ConfirmedView::new(&self.store, chain_id);
        let reverted = self.revert_tx(&mut Overlay::new(&confirmed, &mut batch.delta), &tx)?;
        if reverted {
            batch.staged.remove(tx.hash());
        } else {
            debug!(
                %chain_id,
                tx_hash = %tx.hash(),
                "Staged transaction is not the tip of its nonce chains"
            );
        }

        Ok(reverted)
    }

    fn roll_back_unconfirm_tx(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
    ) -> Result<Vec<TransactionHash>, LedgerError> {
        let tx = Transaction::from_hex(tx_hex)?;

        let mut chains = self.chains.lock();
        let Some(chain) = chains.get_mut(&chain_id) else {
            return Ok(Vec::new());
        };
        let Some(position) = chain
            .unconfirmed
            .iter()
            .position(|unconfirmed| &unconfirmed.tx_hash == tx.hash())
        else {
            return Ok(Vec::new());
        };

        let removed_tx = chain.unconfirmed.remove(position);
        let mut released = removed_tx
            .spends
            .iter()
            .map(|spend| (spend.key, spend.next_nonce))
            .collect::<HashSet<_>>();
        let mut removed = vec![removed_tx.tx_hash];

        // Later transactions building on released nonces are removed as well, transitively
        let mut index = position;
        while index < chain.unconfirmed.len() {
            let depends = chain.unconfirmed[index]
                .spends
                .iter()
                .any(|spend| released.contains(&(spend.key, spend.previous_nonce)));
            if depends {
                let dependent = chain.unconfirmed.remove(index);
                released.extend(
                    dependent
                        .spends
                        .iter()
                        .map(|spend| (spend.key, spend.next_nonce)),
                );
                removed.push(dependent.tx_hash);
            } else {
                index += 1;
            }
        }

        debug!(%chain_id, removed = removed.len(), "Rolled back unconfirmed transactions");

        Ok(removed)
    }

    fn rollback_txs_ledger(
        &self,
        chain_id: ChainId,
        txs_hex: &[String],
        height: BlockHeight,
    ) -> Result<bool, LedgerError> {
        let txs = decode_txs(txs_hex)?;

        let mut chains = self.chains.lock();
        let confirmed = ConfirmedView::new(&self.store, chain_id);
        let mut delta = Delta::default();
        let mut reverted = Vec::with_capacity(txs.len());

        {
            let mut overlay = Overlay::new(&confirmed, &mut delta);
            for tx in txs.iter().rev() {
                if reverted.contains(&(*tx.hash(), false)) || !confirmed.is_committed(tx.hash())? {
                    trace!(%chain_id, tx_hash = %tx.hash(), "Skipping transaction that is not committed");
                    continue;
                }

                if !self.revert_tx(&mut overlay, tx)? {
                    warn!(
                        %chain_id,
                        %height,
                        tx_hash = %tx.hash(),
                        "Failed to roll back transaction, it is not the tip of its nonce chains"
                    );
                    return Ok(false);
                }
                reverted.push((*tx.hash(), false));
            }
        }

        let new_height = confirmed
            .height()?
            .min(height.saturating_sub(BlockHeight::ONE));
        let reverted_count = reverted.len();
        confirmed.write(delta, reverted, new_height)?;

        chains.entry(chain_id).or_default().batch = None;

        debug!(
            %chain_id,
            %height,
            reverted = reverted_count,
            "Rolled back transactions from ledger"
        );

        Ok(true)
    }
}

impl<S, A> NonceChainLedger<S, A>
where
    S: KeyValueStore,
    A: SpendAuthorizer,
{
    /// Create new instance
    pub fn new(store: S, authorizer: A) -> Self {
        Self {
            store,
            authorizer,
            chains: Mutex::default(),
        }
    }

    /// Decode coin data and check everything that doesn't depend on ledger state
    fn check_coin_data(&self, tx: &Transaction) -> Result<CoinData, VerifyCoinDataResult> {
        let coin_data = tx.coin_data().map_err(|error| {
            VerifyCoinDataResult::rejected(LedgerCode::Malformed, error.to_string())
        })?;

        if tx.tx_type() == TxType::COIN_BASE {
            if !coin_data.from.is_empty() {
                return Err(VerifyCoinDataResult::rejected(
                    LedgerCode::Malformed,
                    "Coinbase transaction must not spend",
                ));
            }
            if coin_data.to.iter().any(|coin_to| coin_to.amount.is_zero()) {
                return Err(VerifyCoinDataResult::rejected(
                    LedgerCode::Malformed,
                    "Zero amount in coin data",
                ));
            }
        } else {
            coin_data.check_well_formed().map_err(|error| {
                VerifyCoinDataResult::rejected(LedgerCode::Malformed, error.to_string())
            })?;
        }

        self.authorizer
            .authorize(tx, &coin_data)
            .map_err(|error| {
                VerifyCoinDataResult::rejected(LedgerCode::Unauthorized, error.to_string())
            })?;

        Ok(coin_data)
    }

    fn apply_tx<V>(
        &self,
        overlay: &mut Overlay<'_, V>,
        tx: &Transaction,
        height: BlockHeight,
    ) -> Result<VerifyCoinDataResult, LedgerError>
    where
        V: StateView,
    {
        match self.check_coin_data(tx) {
            Ok(coin_data) => self.apply_coin_data(overlay, tx.hash(), &coin_data, height),
            Err(result) => Ok(result),
        }
    }

    /// Check nonces and balances and on success apply coin data to the overlay.
    ///
    /// Overlay is left untouched unless verification succeeds.
    fn apply_coin_data<V>(
        &self,
        overlay: &mut Overlay<'_, V>,
        tx_hash: &TransactionHash,
        coin_data: &CoinData,
        height: BlockHeight,
    ) -> Result<VerifyCoinDataResult, LedgerError>
    where
        V: StateView,
    {
        let next_nonce = Nonce::from_hash(tx_hash);
        let mut changes = HashMap::with_capacity(coin_data.from.len() + coin_data.to.len());

        for coin_from in &coin_data.from {
            let key = AccountKey::new(coin_from.address, coin_from.asset);
            let mut state = pending_account(&*overlay, &mut changes, key)?;

            if state.nonce != coin_from.nonce {
                let result = if overlay.is_consumed(&key, &coin_from.nonce)? {
                    VerifyCoinDataResult::rejected(
                        LedgerCode::DoubleSpend,
                        format!(
                            "Nonce {} of {} (asset {}) was already spent",
                            coin_from.nonce, coin_from.address, coin_from.asset
                        ),
                    )
                } else {
                    VerifyCoinDataResult::rejected(
                        LedgerCode::Orphan,
                        format!(
                            "Nonce {} of {} (asset {}) doesn't match current nonce {}",
                            coin_from.nonce, coin_from.address, coin_from.asset, state.nonce
                        ),
                    )
                };
                return Ok(result);
            }

            let spendable = state.spendable(height);
            if spendable < coin_from.amount {
                return Ok(VerifyCoinDataResult::rejected(
                    LedgerCode::InsufficientBalance,
                    format!(
                        "{} (asset {}) has {spendable} spendable, {} required",
                        coin_from.address, coin_from.asset, coin_from.amount
                    ),
                ));
            }

            state.debit(next_nonce, &coin_from.amount);
            changes.insert(key, state);
        }

        for coin_to in &coin_data.to {
            let key = AccountKey::new(coin_to.address, coin_to.asset);
            let mut state = pending_account(&*overlay, &mut changes, key)?;
            state.credit(coin_to);
            changes.insert(key, state);
        }

        for coin_from in &coin_data.from {
            overlay.consume(
                AccountKey::new(coin_from.address, coin_from.asset),
                coin_from.nonce,
            );
        }
        for (key, state) in changes {
            overlay.set(key, state);
        }

        Ok(VerifyCoinDataResult::success())
    }

    /// Exact inverse of [`Self::apply_coin_data()`].
    ///
    /// Returns `false` and leaves overlay untouched if the transaction is not the tip of every
    /// nonce chain it spends from.
    fn revert_tx<V>(&self, overlay: &mut Overlay<'_, V>, tx: &Transaction) -> Result<bool, LedgerError>
    where
        V: StateView,
    {
        let Ok(coin_data) = tx.coin_data() else {
            return Ok(false);
        };
        let next_nonce = Nonce::from_hash(tx.hash());
        let mut changes = HashMap::with_capacity(coin_data.from.len() + coin_data.to.len());

        for coin_to in coin_data.to.iter().rev() {
            let key = AccountKey::new(coin_to.address, coin_to.asset);
            let mut state = pending_account(&*overlay, &mut changes, key)?;
            if !state.undo_credit(coin_to) {
                return Ok(false);
            }
            changes.insert(key, state);
        }

        for coin_from in &coin_data.from {
            let key = AccountKey::new(coin_from.address, coin_from.asset);
            let mut state = pending_account(&*overlay, &mut changes, key)?;
            if state.nonce != next_nonce || !state.undo_debit(coin_from.nonce, &coin_from.amount)
            {
                return Ok(false);
            }
            changes.insert(key, state);
        }

        for coin_from in &coin_data.from {
            overlay.release(
                AccountKey::new(coin_from.address, coin_from.asset),
                coin_from.nonce,
            );
        }
        for (key, state) in changes {
            overlay.set(key, state);
        }

        Ok(true)
    }
}
