use super::AccountState;
use ll_primitives::address::Address;
use ll_primitives::amount::Amount;
use ll_primitives::chain::{BlockHeight, ChainId};
use ll_primitives::coin_data::{Asset, CoinTo};
use ll_primitives::nonce::Nonce;

const ASSET: Asset = Asset::main(ChainId::new(2));
const ALICE: Address = Address::new([1; Address::SIZE]);

fn coin_to(amount: u64, lock_time: u64) -> CoinTo {
    CoinTo {
        address: ALICE,
        asset: ASSET,
        amount: Amount::from(amount),
        lock_time,
    }
}

#[test]
fn spendable_includes_matured_locks() {
    let mut state = AccountState::default();
    state.credit(&coin_to(10, 0));
    state.credit(&coin_to(5, 3));

    assert_eq!(state.spendable(BlockHeight::new(2)), Amount::from(10_u64));
    assert_eq!(state.locked(BlockHeight::new(2)), Amount::from(5_u64));
    assert_eq!(state.spendable(BlockHeight::new(3)), Amount::from(15_u64));
    assert_eq!(state.locked(BlockHeight::new(3)), Amount::zero());

    state.debit(Nonce::new([1; Nonce::SIZE]), &Amount::from(12_u64));
    assert_eq!(state.spendable(BlockHeight::new(3)), Amount::from(3_u64));
}

#[test]
fn overdrawn_account_is_not_spendable() {
    let mut state = AccountState::default();
    state.credit(&coin_to(10, 0));
    state.credit(&coin_to(5, 3));
    state.debit(Nonce::new([1; Nonce::SIZE]), &Amount::from(12_u64));

    // Only possible with corrupted state, reported as zero rather than wrapping around
    assert_eq!(state.spendable(BlockHeight::new(2)), Amount::zero());

    assert!(state.undo_debit(Nonce::ZERO, &Amount::from(12_u64)));
    assert_eq!(state.spendable(BlockHeight::new(2)), Amount::from(10_u64));
    assert!(!state.undo_debit(Nonce::ZERO, &Amount::from(1_u64)));
}
