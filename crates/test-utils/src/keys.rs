//! Key and party fixtures.

use secp256k1::{rand::thread_rng, SecretKey, SECP256K1};
use tss_bridge_primitives::party::{Account, PartySet};

/// Generates a random secret key.
pub fn generate_secret_key() -> SecretKey {
    SECP256K1.generate_keypair(&mut thread_rng()).0
}

/// Generates a random account.
pub fn generate_account() -> Account {
    Account::new(generate_secret_key())
}

/// Generates `n` accounts and the party set they form.
///
/// The accounts are returned in party order.
pub fn generate_parties(n: usize) -> (Vec<Account>, PartySet) {
    let mut accounts: Vec<Account> = (0..n).map(|_| generate_account()).collect();
    accounts.sort_by(|a, b| a.address().cmp(b.address()));

    let parties = PartySet::new(accounts.iter().map(|a| a.party().clone()))
        .expect("random keys must not collide");

    (accounts, parties)
}
