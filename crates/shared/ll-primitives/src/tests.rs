use crate::address::Address;
use crate::amount::Amount;
use crate::chain::ChainId;
use crate::coin_data::{Asset, CoinData, CoinDataError, CoinFrom, CoinTo};
use crate::nonce::Nonce;
use crate::payload::{AliasData, CallContractData, CrossChainData, PayloadError, TxPayload};
use crate::transaction::{Transaction, TransactionSignature, TxType};

const CHAIN_ID: ChainId = ChainId::new(2);

fn transfer_coin_data(amount_from: u64, amount_to: u64) -> CoinData {
    let asset = Asset::main(CHAIN_ID);
    CoinData {
        from: vec![CoinFrom {
            address: Address::new([1; Address::SIZE]),
            asset,
            amount: Amount::from(amount_from),
            nonce: Nonce::ZERO,
            locked: 0,
        }],
        to: vec![CoinTo {
            address: Address::new([2; Address::SIZE]),
            asset,
            amount: Amount::from(amount_to),
            lock_time: 0,
        }],
    }
}

#[test]
fn hash_ignores_signatures() {
    let tx = Transaction::builder(TxType::TRANSFER)
        .time(1_000)
        .coin_data(&transfer_coin_data(10, 9))
        .build();
    let hash = *tx.hash();

    let signed = tx.clone().with_signatures(vec![TransactionSignature {
        public_key: [3; 32],
        signature: [4; 64],
    }]);
    assert_eq!(signed.hash(), &hash);
    assert_ne!(signed.to_bytes(), tx.to_bytes());

    let other = Transaction::builder(TxType::TRANSFER)
        .time(1_001)
        .coin_data(&transfer_coin_data(10, 9))
        .build();
    assert_ne!(other.hash(), &hash);
}

#[test]
fn hex_decoding_recomputes_hash() {
    let tx = Transaction::builder(TxType::TRANSFER)
        .time(5)
        .remark(b"hello".to_vec())
        .coin_data(&transfer_coin_data(10, 9))
        .build();

    let decoded = Transaction::from_hex(&tx.to_hex()).unwrap();
    assert_eq!(decoded, tx);
    assert_eq!(decoded.coin_data().unwrap(), transfer_coin_data(10, 9));

    assert!(Transaction::from_hex("zz").is_err());
    let mut bytes = tx.to_bytes();
    bytes.push(0);
    assert!(Transaction::from_bytes(&bytes).is_err());
}

#[test]
fn nonce_is_hash_suffix() {
    let tx = Transaction::builder(TxType::TRANSFER).time(7).build();
    let nonce = Nonce::from_hash(tx.hash());
    assert_eq!(nonce.as_ref(), &tx.hash().as_bytes()[24..]);
    assert_ne!(nonce, Nonce::ZERO);
}

#[test]
fn coin_data_invariants() {
    let coin_data = transfer_coin_data(10, 9);
    coin_data.check_well_formed().unwrap();
    assert_eq!(coin_data.fee(Asset::main(CHAIN_ID)), Amount::from(1_u64));
    assert_eq!(
        coin_data.fee(Asset::new(ChainId::new(5), 1)),
        Amount::zero()
    );

    assert!(matches!(
        transfer_coin_data(9, 10).check_well_formed(),
        Err(CoinDataError::AmountMismatch { .. })
    ));
    assert!(matches!(
        transfer_coin_data(0, 0).check_well_formed(),
        Err(CoinDataError::ZeroAmount)
    ));

    let mut duplicate = transfer_coin_data(10, 9);
    duplicate.from.push(duplicate.from[0].clone());
    assert!(matches!(
        duplicate.check_well_formed(),
        Err(CoinDataError::DuplicateFrom { .. })
    ));

    let mut locked = transfer_coin_data(10, 9);
    locked.from[0].locked = 1;
    assert!(matches!(
        locked.check_well_formed(),
        Err(CoinDataError::LockedSpend { .. })
    ));
}

#[test]
fn amounts_beyond_u128() {
    let big = "340282366920938463463374607431768211456000"
        .parse::<Amount>()
        .unwrap();
    let coin_data = CoinData {
        from: Vec::new(),
        to: vec![CoinTo {
            address: Address::BLACK_HOLE,
            asset: Asset::main(CHAIN_ID),
            amount: big.clone(),
            lock_time: 0,
        }],
    };

    let decoded = CoinData::from_bytes(&coin_data.to_bytes()).unwrap();
    assert_eq!(decoded.to[0].amount, big);
    assert_eq!(
        big.checked_sub(&Amount::from(1_u64)).unwrap() + Amount::from(1_u64),
        big
    );
    assert!(Amount::from(1_u64).checked_sub(&big).is_none());
}

#[test]
fn payload_decoding() {
    let alias = AliasData {
        address: Address::new([1; Address::SIZE]),
        alias: "alice".to_string(),
    };
    let tx = Transaction::builder(TxType::ACCOUNT_ALIAS)
        .tx_data(TxPayload::Alias(alias.clone()).to_tx_data())
        .build();
    assert_eq!(TxPayload::decode(&tx).unwrap(), TxPayload::Alias(alias));

    let call = CallContractData {
        sender: Address::new([1; Address::SIZE]),
        contract_address: Address::new([9; Address::SIZE]),
        value: Amount::zero(),
        gas_limit: 100_000,
        price: 25,
        method_name: "transfer".to_string(),
        method_desc: String::new(),
        args: vec![vec!["1".to_string()]],
    };
    let cross_chain = TxPayload::CrossChain(CrossChainData {
        anchor_hash: *tx.hash(),
        origin_chain_id: ChainId::new(1),
        contract_call: Some(call),
    });
    let tx = Transaction::builder(TxType::CROSS_CHAIN)
        .tx_data(cross_chain.to_tx_data())
        .build();
    assert_eq!(TxPayload::decode(&tx).unwrap(), cross_chain);
    assert_eq!(cross_chain.tx_type(), TxType::CROSS_CHAIN);

    let tx = Transaction::builder(TxType::TRANSFER)
        .tx_data(vec![1])
        .build();
    assert!(matches!(
        TxPayload::decode(&tx),
        Err(PayloadError::UnexpectedData { .. })
    ));

    let tx = Transaction::builder(TxType::CALL_CONTRACT)
        .tx_data(vec![1, 2, 3])
        .build();
    assert!(matches!(
        TxPayload::decode(&tx),
        Err(PayloadError::Decode { .. })
    ));

    let tx = Transaction::builder(TxType::new(200)).build();
    assert!(matches!(
        TxPayload::decode(&tx),
        Err(PayloadError::UnsupportedType { .. })
    ));
}

#[test]
fn address_from_hex() {
    let address = Address::new([0xab; Address::SIZE]);
    assert_eq!(Address::from_hex(&address.to_string()).unwrap(), address);
    assert!(Address::from_hex("abab").is_err());
    assert!(Address::from_hex("xyz").is_err());
}
