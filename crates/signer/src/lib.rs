//! The sessions a signer node runs.
//!
//! Every destination chain gets a [`SigningSession`](session::SigningSession) that proposes,
//! signs and finalizes one withdrawal per round with the mechanism and finalizer of its chain
//! family. Next to them, the [`DepositDistribution`](distribution::DepositDistribution) session
//! gossips newly submitted deposits between the parties.

pub mod context;
pub mod data;
pub mod distribution;
pub mod errors;
pub mod finalizer;
pub mod keygen;
pub mod mechanism;
pub mod router;
pub mod schedule;
pub mod session;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use tss_bridge_consensus::Mechanism;
use tss_bridge_p2p::transport::Transport;
use tss_bridge_primitives::chain::ChainType;

use crate::{
    context::SignerContext,
    data::WithdrawalData,
    distribution::DepositDistribution,
    finalizer::{ClaimFinalizer, Finalizer, UtxoFinalizer, ZanoFinalizer},
    mechanism::{ClaimMechanism, UtxoMechanism, ZanoMechanism},
    session::SigningSession,
};

/// Spawns the signing session of every configured chain, with round 0 at `start_ms`.
pub fn spawn_signing_sessions<T: Transport>(
    ctx: Arc<SignerContext<T>>,
    start_ms: u64,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    for (chain_id, family) in ctx.chains.chains() {
        let span = info_span!("signing", chain = %chain_id);
        let task = match family {
            ChainType::Evm | ChainType::Ton | ChainType::Solana => {
                let mechanism = ClaimMechanism::new(
                    chain_id.clone(),
                    family,
                    ctx.db.clone(),
                    ctx.fetcher.clone(),
                );
                let finalizer = ClaimFinalizer::new(ctx.db.clone(), ctx.core.clone());
                let session =
                    SigningSession::new(ctx.clone(), chain_id, mechanism, finalizer, start_ms);
                spawn_session(session, span)
            }
            ChainType::Bitcoin => {
                let Some(client) = ctx.chains.utxo(&chain_id) else {
                    warn!(chain = %chain_id, "bitcoin chain without a wallet, not signing for it");
                    continue;
                };
                let group_key = ctx.share.public_key;
                let mechanism = UtxoMechanism::new(
                    client.clone(),
                    group_key,
                    ctx.db.clone(),
                    ctx.fetcher.clone(),
                );
                let finalizer =
                    UtxoFinalizer::new(client, group_key, ctx.db.clone(), ctx.core.clone());
                let session =
                    SigningSession::new(ctx.clone(), chain_id, mechanism, finalizer, start_ms);
                spawn_session(session, span)
            }
            ChainType::Zano => {
                let Some(client) = ctx.chains.zano(&chain_id) else {
                    warn!(chain = %chain_id, "zano chain without a wallet, not signing for it");
                    continue;
                };
                let mechanism =
                    ZanoMechanism::new(client.clone(), ctx.db.clone(), ctx.fetcher.clone());
                let finalizer = ZanoFinalizer::new(client, ctx.db.clone(), ctx.core.clone());
                let session =
                    SigningSession::new(ctx.clone(), chain_id, mechanism, finalizer, start_ms);
                spawn_session(session, span)
            }
        };
        tasks.push(task);
    }

    info!(sessions = tasks.len(), "signing sessions spawned");
    tasks
}

fn spawn_session<M, F, T>(
    session: SigningSession<M, F, T>,
    span: tracing::Span,
) -> JoinHandle<()>
where
    M: Mechanism,
    M::Data: WithdrawalData,
    F: Finalizer<Data = M::Data>,
    T: Transport,
{
    tokio::spawn(
        async move {
            if let Err(e) = session.run().await {
                error!("signing session stopped: {e}");
            }
        }
        .instrument(span),
    )
}

/// Spawns the deposit distribution session.
pub fn spawn_deposit_distribution<T: Transport>(ctx: Arc<SignerContext<T>>) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            if let Err(e) = DepositDistribution::new(ctx).run().await {
                error!("deposit distribution stopped: {e}");
            }
        }
        .instrument(info_span!("distribution")),
    )
}
