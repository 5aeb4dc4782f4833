//! Bitcoin withdrawal transactions spent from the group key.
//!
//! The bridge holds its bitcoin in P2WPKH outputs of the group public key. A withdrawal spends
//! some of them to the receiver and returns the change to the same script, so every input is
//! signed separately with a segwit v0 sighash. Consolidations spend many small outputs back to
//! the group script.

use std::{collections::HashSet, io};

use bitcoin::{
    absolute::LockTime,
    consensus,
    hashes::Hash,
    sighash::{EcdsaSighashType, SighashCache},
    transaction::{self, Sequence},
    Amount, CompressedPublicKey, OutPoint, ScriptBuf, Transaction, TxIn, TxOut, Txid, Witness,
};
use borsh::{BorshDeserialize, BorshSerialize};
use secp256k1::PublicKey;
use tss_bridge_primitives::{
    constants::{BITCOIN_DUST_THRESHOLD, FEE_RATE_TOLERANCE_PERCENT},
    signature::SignatureData,
};

use crate::errors::ChainError;

/// Spendable outputs above which a round consolidates instead of withdrawing.
pub const CONSOLIDATION_THRESHOLD: usize = 50;

/// Inputs spent by one consolidation.
pub const CONSOLIDATION_MAX_INPUTS: usize = 20;

/// Inputs a single withdrawal may spend.
pub const MAX_WITHDRAWAL_INPUTS: usize = 10;

// virtual sizes of the transaction parts, with signatures at their maximum length
const TX_OVERHEAD_VBYTES: u64 = 11;
const P2WPKH_INPUT_VBYTES: u64 = 68;
const OUTPUT_BASE_VBYTES: u64 = 9;

/// An output the bridge can spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Where the output is.
    pub outpoint: OutPoint,

    /// Its value.
    pub amount: Amount,

    /// The script it pays to.
    pub script_pubkey: ScriptBuf,
}

impl Utxo {
    fn prevout(&self) -> TxOut {
        TxOut {
            value: self.amount,
            script_pubkey: self.script_pubkey.clone(),
        }
    }
}

/// The P2WPKH script of the group key.
pub fn group_script(group_key: &PublicKey) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&CompressedPublicKey(*group_key).wpubkey_hash())
}

/// A transaction waiting for one signature per input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTx {
    /// The transaction with empty witnesses.
    pub tx: Transaction,

    /// The outputs spent by each input, in input order.
    pub prevouts: Vec<TxOut>,
}

impl UnsignedTx {
    /// Number of signatures the transaction needs.
    pub fn input_count(&self) -> usize {
        self.tx.input.len()
    }

    /// The digest to sign for each input.
    pub fn sighashes(&self) -> Result<Vec<[u8; 32]>, ChainError> {
        let mut cache = SighashCache::new(&self.tx);
        self.prevouts
            .iter()
            .enumerate()
            .map(|(idx, prevout)| {
                cache
                    .p2wpkh_signature_hash(
                        idx,
                        &prevout.script_pubkey,
                        prevout.value,
                        EcdsaSighashType::All,
                    )
                    .map(|sighash| sighash.to_byte_array())
                    .map_err(|e| ChainError::InvalidResponse(format!("sighash {idx}: {e}")))
            })
            .collect()
    }

    /// Value of the inputs minus value of the outputs, in satoshis.
    pub fn fee(&self) -> Option<u64> {
        let inputs: u64 = self.prevouts.iter().map(|o| o.value.to_sat()).sum();
        let outputs: u64 = self.tx.output.iter().map(|o| o.value.to_sat()).sum();
        inputs.checked_sub(outputs)
    }

    /// Fee rate of the signed transaction in sat/vB.
    pub fn fee_rate(&self) -> Option<u64> {
        let vsize = estimate_vsize(self.tx.input.len(), &self.tx.output);
        self.fee().map(|fee| fee / vsize.max(1))
    }

    /// Fills in the witness of every input, returning the signed transaction.
    pub fn sign(
        &self,
        signatures: &[SignatureData],
        group_key: &PublicKey,
    ) -> Result<Transaction, ChainError> {
        if signatures.len() != self.tx.input.len() {
            return Err(ChainError::InvalidResponse(format!(
                "{} signatures for {} inputs",
                signatures.len(),
                self.tx.input.len()
            )));
        }

        let mut tx = self.tx.clone();
        for (input, signature) in tx.input.iter_mut().zip(signatures) {
            let mut signature = signature
                .to_ecdsa()
                .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
            signature.normalize_s();

            let signature = bitcoin::ecdsa::Signature {
                signature,
                sighash_type: EcdsaSighashType::All,
            };
            let mut witness = Witness::new();
            witness.push(signature.to_vec());
            witness.push(group_key.serialize());
            input.witness = witness;
        }

        Ok(tx)
    }

    /// Outpoints spent by the transaction.
    pub fn outpoints(&self) -> Vec<OutPoint> {
        self.tx.input.iter().map(|i| i.previous_output).collect()
    }

    /// Id of the transaction. Witnesses do not change it.
    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }
}

impl BorshSerialize for UnsignedTx {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        consensus::serialize(&self.tx).serialize(writer)?;
        consensus::serialize(&self.prevouts).serialize(writer)
    }
}

impl BorshDeserialize for UnsignedTx {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let invalid = |e: consensus::encode::Error| io::Error::new(io::ErrorKind::InvalidData, e);

        let tx = Vec::<u8>::deserialize_reader(reader)?;
        let prevouts = Vec::<u8>::deserialize_reader(reader)?;

        Ok(Self {
            tx: consensus::deserialize(&tx).map_err(invalid)?,
            prevouts: consensus::deserialize(&prevouts).map_err(invalid)?,
        })
    }
}

fn estimate_vsize(inputs: usize, outputs: &[TxOut]) -> u64 {
    let outputs: u64 = outputs
        .iter()
        .map(|o| OUTPUT_BASE_VBYTES + o.script_pubkey.len() as u64)
        .sum();
    TX_OVERHEAD_VBYTES + P2WPKH_INPUT_VBYTES * inputs as u64 + outputs
}

fn create_tx(inputs: &[Utxo], outputs: Vec<TxOut>) -> UnsignedTx {
    let input = inputs
        .iter()
        .map(|utxo| TxIn {
            previous_output: utxo.outpoint,
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            script_sig: ScriptBuf::default(),
            witness: Witness::new(),
        })
        .collect();

    UnsignedTx {
        tx: Transaction {
            version: transaction::Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output: outputs,
        },
        prevouts: inputs.iter().map(Utxo::prevout).collect(),
    }
}

fn sorted(utxos: &[Utxo], largest_first: bool) -> Vec<Utxo> {
    let mut utxos = utxos.to_vec();
    utxos.sort_by(|a, b| {
        let by_amount = if largest_first {
            b.amount.cmp(&a.amount)
        } else {
            a.amount.cmp(&b.amount)
        };
        by_amount.then_with(|| a.outpoint.cmp(&b.outpoint))
    });
    utxos
}

/// Builds a withdrawal paying `amount` satoshis to `recipient`, funded largest output first.
///
/// The bridge pays the fee. Change below the dust threshold is left to the miner.
pub fn build_withdrawal(
    utxos: &[Utxo],
    recipient: ScriptBuf,
    amount: u64,
    change: ScriptBuf,
    fee_rate: u64,
) -> Result<UnsignedTx, ChainError> {
    let payment = TxOut {
        value: Amount::from_sat(amount),
        script_pubkey: recipient,
    };
    let change_template = TxOut {
        value: Amount::ZERO,
        script_pubkey: change,
    };
    let available: u64 = utxos.iter().map(|u| u.amount.to_sat()).sum();

    let mut selected = Vec::new();
    let mut total = 0u64;
    for utxo in sorted(utxos, true).into_iter().take(MAX_WITHDRAWAL_INPUTS) {
        total += utxo.amount.to_sat();
        selected.push(utxo);

        let outputs = [payment.clone(), change_template.clone()];
        let fee = fee_rate * estimate_vsize(selected.len(), &outputs);
        if total < amount + fee {
            continue;
        }

        let mut outputs = vec![payment.clone()];
        let change_value = total - amount - fee;
        if change_value >= BITCOIN_DUST_THRESHOLD {
            outputs.push(TxOut {
                value: Amount::from_sat(change_value),
                script_pubkey: change_template.script_pubkey.clone(),
            });
        }

        return Ok(create_tx(&selected, outputs));
    }

    let fee = fee_rate * estimate_vsize(selected.len().max(1), &[payment, change_template]);
    Err(ChainError::InsufficientFunds {
        needed: amount + fee,
        available,
    })
}

/// Builds a consolidation of the smallest outputs back to `change`.
pub fn build_consolidation(
    utxos: &[Utxo],
    change: ScriptBuf,
    fee_rate: u64,
) -> Result<UnsignedTx, ChainError> {
    let selected: Vec<_> = sorted(utxos, false)
        .into_iter()
        .take(CONSOLIDATION_MAX_INPUTS)
        .collect();
    let total: u64 = selected.iter().map(|u| u.amount.to_sat()).sum();

    let mut output = TxOut {
        value: Amount::ZERO,
        script_pubkey: change,
    };
    let fee = fee_rate * estimate_vsize(selected.len(), std::slice::from_ref(&output));
    if selected.len() < 2 || total < fee + BITCOIN_DUST_THRESHOLD {
        return Err(ChainError::InsufficientFunds {
            needed: fee + BITCOIN_DUST_THRESHOLD,
            available: total,
        });
    }

    output.value = Amount::from_sat(total - fee);
    Ok(create_tx(&selected, vec![output]))
}

/// Whether a fee rate is within the tolerance around the target.
pub fn fee_rate_within_tolerance(actual: u64, target: u64) -> bool {
    actual.abs_diff(target) * 100 <= target * FEE_RATE_TOLERANCE_PERCENT
}

/// Why a proposed transaction was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxCheckError {
    /// An input is not an unspent output of the bridge.
    #[error("input {0} is not spendable by the bridge")]
    ForeignInput(OutPoint),

    /// An input is spent twice.
    #[error("input {0} is spent twice")]
    DuplicateInput(OutPoint),

    /// The prevouts do not match the inputs.
    #[error("prevouts do not match the inputs")]
    Prevouts,

    /// The outputs are not the expected payment and change.
    #[error("unexpected outputs: {0}")]
    Outputs(String),

    /// The fee rate is off target.
    #[error("fee rate {actual} sat/vB is too far from {target} sat/vB")]
    FeeRate {
        /// Rate of the proposal.
        actual: u64,

        /// Local target.
        target: u64,
    },
}

/// What a proposed transaction must pay.
#[derive(Debug, Clone)]
pub struct ExpectedOutputs {
    /// The receiver and amount of a withdrawal. `None` for a consolidation.
    pub payment: Option<(ScriptBuf, u64)>,

    /// The group script every other output must pay to.
    pub change: ScriptBuf,
}

/// Checks a transaction proposed by the leader against the local view of the bridge wallet.
pub fn check_proposed_tx(
    proposal: &UnsignedTx,
    spendable: &[Utxo],
    expected: &ExpectedOutputs,
    target_fee_rate: u64,
) -> Result<(), TxCheckError> {
    if proposal.prevouts.len() != proposal.tx.input.len() {
        return Err(TxCheckError::Prevouts);
    }

    let mut seen = HashSet::new();
    for (input, prevout) in proposal.tx.input.iter().zip(&proposal.prevouts) {
        let outpoint = input.previous_output;
        if !seen.insert(outpoint) {
            return Err(TxCheckError::DuplicateInput(outpoint));
        }

        let utxo = spendable
            .iter()
            .find(|u| u.outpoint == outpoint)
            .ok_or(TxCheckError::ForeignInput(outpoint))?;
        if utxo.prevout() != *prevout {
            return Err(TxCheckError::Prevouts);
        }
    }

    let mut outputs = proposal.tx.output.iter();
    if let Some((script, amount)) = &expected.payment {
        match outputs.next() {
            Some(o) if &o.script_pubkey == script && o.value.to_sat() == *amount => {}
            _ => return Err(TxCheckError::Outputs("first output is not the payment".into())),
        }
    }
    let rest: Vec<_> = outputs.collect();
    if rest.iter().any(|o| o.script_pubkey != expected.change) {
        return Err(TxCheckError::Outputs("output to a foreign script".into()));
    }
    if expected.payment.is_none() && rest.len() != 1 {
        return Err(TxCheckError::Outputs("consolidation must have one output".into()));
    }

    let actual = proposal.fee_rate().ok_or(TxCheckError::FeeRate {
        actual: 0,
        target: target_fee_rate,
    })?;
    if !fee_rate_within_tolerance(actual, target_fee_rate) {
        return Err(TxCheckError::FeeRate {
            actual,
            target: target_fee_rate,
        });
    }

    Ok(())
}
