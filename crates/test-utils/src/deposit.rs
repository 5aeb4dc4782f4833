//! Deposit fixtures.

use rand::{thread_rng, Rng};
use tss_bridge_primitives::{
    amount::Amount,
    chain::ChainId,
    deposit::{Deposit, DepositIdentifier, WithdrawalStatus},
};

/// Generates a random `0x`-prefixed 32-byte transaction hash.
pub fn generate_tx_hash() -> String {
    let bytes: [u8; 32] = thread_rng().gen();
    format!("0x{}", hex::encode(bytes))
}

/// Generates a random identifier of a deposit made on `chain`.
pub fn generate_deposit_identifier(chain: &str) -> DepositIdentifier {
    DepositIdentifier::new(generate_tx_hash(), thread_rng().gen_range(0..4), ChainId::from(chain))
}

/// Generates a pending, undistributed deposit from `source` to `destination`.
///
/// Addresses and tokens are EVM shaped, which every family of the tests accepts.
pub fn generate_deposit(source: &str, destination: &str) -> Deposit {
    let mut rng = thread_rng();
    let address = |rng: &mut rand::rngs::ThreadRng| {
        let bytes: [u8; 20] = rng.gen();
        format!("0x{}", hex::encode(bytes))
    };
    let amount = Amount::from(rng.gen_range(100_000u64..1_000_000_000));

    Deposit {
        identifier: generate_deposit_identifier(source),
        source_address: address(&mut rng),
        deposit_amount: amount,
        deposit_token: address(&mut rng),
        deposit_block: rng.gen_range(1..1_000_000),
        destination_address: address(&mut rng),
        destination_chain_id: ChainId::from(destination),
        withdrawal_amount: amount,
        withdrawal_token: address(&mut rng),
        is_wrapped_token: rng.gen(),
        referral_id: 0,
        status: WithdrawalStatus::Pending,
        signature: None,
        withdrawal_tx_hash: None,
        distributed: false,
    }
}
