//! Protocol constants shared across the workspace.

/// Human readable prefix of party addresses.
pub const ADDRESS_HRP: &str = "bridge";

/// Any bitcoin withdrawal below this many satoshis is invalid.
pub const BITCOIN_DUST_THRESHOLD: u64 = 547;

/// Allowed deviation of a proposed transaction's fee rate from the target, in percent.
pub const FEE_RATE_TOLERANCE_PERCENT: u64 = 10;

/// Decimals of native bitcoin amounts.
pub const BITCOIN_DECIMALS: u8 = 8;

/// Prefix used when hashing an EVM withdrawal for `personal_sign` style verification.
pub const EIP191_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Offset added to the recovery id in EVM signature encodings.
pub const EVM_RECOVERY_OFFSET: u8 = 27;
