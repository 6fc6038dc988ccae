use std::sync::Arc;

use bitcoin::{
    Address, Amount, Network, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
    absolute::LockTime,
    transaction::{InputWeightPrediction, Version, predict_weight},
};
use db::Db;
use oracle::oracle::Oracle;
use tracing::{debug, info, warn};
use types::{
    asset::Asset,
    errors::NodeError,
    pending_build::PendingBuild,
    utxo::{Utxo, checked_sum, total_value},
};
use uuid::Uuid;

use crate::handlers::balance::BalanceReconciler;

use super::{
    address::parse_address,
    context::{SignableContext, SpentInput},
    fee::FeePolicy,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub operation_id: Uuid,
    pub asset_id: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Amount,
    /// When set the fee is taken out of `amount` instead of being added on top.
    pub include_fee: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    pub selected: Vec<Utxo>,
    pub recipient_value: Amount,
    pub fee: Amount,
    pub change: Option<Amount>,
}

impl CoinSelection {
    pub fn total_in(&self) -> Result<Amount, NodeError> {
        total_value(&self.selected)
    }

    /// Unsigned transaction paying the recipient first and the change, if any, second.
    #[must_use]
    pub fn assemble(&self, recipient: &Script, change: &Script) -> Transaction {
        let input = self
            .selected
            .iter()
            .map(|utxo| TxIn {
                previous_output: utxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect();

        let mut output = vec![TxOut {
            value: self.recipient_value,
            script_pubkey: recipient.to_owned(),
        }];
        if let Some(value) = self.change {
            output.push(TxOut {
                value,
                script_pubkey: change.to_owned(),
            });
        }

        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        }
    }
}

fn input_prediction(script: &Script) -> InputWeightPrediction {
    if script.is_p2wpkh() {
        InputWeightPrediction::P2WPKH_MAX
    } else if script.is_p2tr() {
        InputWeightPrediction::P2TR_KEY_DEFAULT_SIGHASH
    } else if script.is_p2sh() {
        // Upstream `InputWeightPrediction::NESTED_P2WPKH_MAX`, not available in bitcoin 0.32.
        InputWeightPrediction::from_slice(23, &[72, 33])
    } else {
        InputWeightPrediction::P2PKH_COMPRESSED_MAX
    }
}

fn add_to_amount(amount: Amount, fee: Amount) -> Result<Amount, NodeError> {
    amount
        .checked_add(fee)
        .ok_or_else(|| NodeError::InvalidAmount(format!("{amount} plus fee {fee} overflows")))
}

/// Greedy, deterministic coin selection without backtracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinSelector {
    pub fee_policy: FeePolicy,
    pub min_confirmations: u32,
}

impl CoinSelector {
    pub fn select(
        &self,
        utxos: Vec<Utxo>,
        amount: Amount,
        include_fee: bool,
        recipient: &Script,
        change: &Script,
    ) -> Result<CoinSelection, NodeError> {
        let mut candidates: Vec<Utxo> = utxos
            .into_iter()
            .filter(|u| u.is_spendable(self.min_confirmations))
            .collect();
        candidates.sort_by(Utxo::selection_order);

        let available = total_value(&candidates)?;
        let output_lens = [recipient.len(), change.len()];
        let recipient_dust = recipient.minimal_non_dust();

        let mut required = if include_fee {
            amount
        } else {
            add_to_amount(amount, self.fee_policy.min_fee)?
        };
        let mut selected = Vec::new();
        let mut total_in = Amount::ZERO;

        for utxo in candidates {
            // bounded by `available`, which already summed without overflow
            total_in += utxo.value;
            selected.push(utxo);

            let weight = predict_weight(
                selected.iter().map(|u| input_prediction(&u.script_pubkey)),
                output_lens,
            );
            let fee = self.fee_policy.fee_for_vsize(weight.to_vbytes_ceil());

            let recipient_value = if include_fee {
                amount
                    .checked_sub(fee)
                    .filter(|value| *value >= recipient_dust)
                    .ok_or_else(|| {
                        NodeError::InvalidAmount(format!(
                            "Fee {fee} leaves nothing spendable out of {amount}"
                        ))
                    })?
            } else {
                amount
            };
            required = add_to_amount(recipient_value, fee)?;

            if total_in >= required {
                let leftover = total_in - required;
                let (change_value, fee) = if leftover >= change.minimal_non_dust() {
                    (Some(leftover), fee)
                } else {
                    (None, fee + leftover)
                };

                return Ok(CoinSelection {
                    selected,
                    recipient_value,
                    fee,
                    change: change_value,
                });
            }
        }

        Err(NodeError::InsufficientFunds {
            available,
            required,
        })
    }
}

#[derive(Clone)]
pub struct TransactionBuilder {
    pub db: Arc<dyn Db>,
    pub oracle: Box<dyn Oracle>,
    pub balances: BalanceReconciler,
    pub network: Network,
    pub asset: Asset,
    pub selector: CoinSelector,
}

impl TransactionBuilder {
    #[must_use]
    pub fn new(
        db: Arc<dyn Db>,
        oracle: Box<dyn Oracle>,
        balances: BalanceReconciler,
        network: Network,
        asset: Asset,
        selector: CoinSelector,
    ) -> Self {
        Self {
            db,
            oracle,
            balances,
            network,
            asset,
            selector,
        }
    }

    fn validate(&self, request: &BuildRequest) -> Result<(Address, Address), NodeError> {
        if request.asset_id != self.asset.id {
            return Err(NodeError::AssetMismatch(request.asset_id.clone()));
        }

        let from = parse_address(&request.from_address, self.network)?;
        let to = parse_address(&request.to_address, self.network)?;

        if request.amount == Amount::ZERO {
            return Err(NodeError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        if request.amount > Amount::MAX_MONEY {
            return Err(NodeError::InvalidAmount(format!(
                "{} exceeds the money supply",
                request.amount
            )));
        }
        let dust = to.script_pubkey().minimal_non_dust();
        if request.amount < dust {
            return Err(NodeError::InvalidAmount(format!(
                "{} is below the dust limit of {dust}",
                request.amount
            )));
        }

        Ok((from, to))
    }

    /// Returns the JSON signable context for the request. A context already built for
    /// the operation id is returned verbatim without touching the chain.
    pub async fn build(&self, request: &BuildRequest) -> Result<String, NodeError> {
        let (from, to) = self.validate(request)?;

        if let Some(pending) = self.db.get_pending_build(request.operation_id)? {
            debug!(
                "Replaying build for operation {}",
                request.operation_id
            );
            return Ok(pending.transaction_context);
        }

        let utxos = self
            .oracle
            .get_unspent_outputs(&from, self.selector.min_confirmations)
            .await?;
        let available = checked_sum(
            utxos
                .iter()
                .filter(|u| u.is_spendable(self.selector.min_confirmations))
                .map(|u| u.value),
        )?;

        let recipient_script = to.script_pubkey();
        let change_script = from.script_pubkey();
        let selection = self.selector.select(
            utxos,
            request.amount,
            request.include_fee,
            &recipient_script,
            &change_script,
        )?;
        let tx = selection.assemble(&recipient_script, &change_script);

        let context = SignableContext {
            operation_id: request.operation_id,
            network: self.network,
            unsigned_tx: SignableContext::unsigned_tx_hex(&tx),
            inputs: selection.selected.iter().map(SpentInput::from).collect(),
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount: selection.recipient_value,
            fee: selection.fee,
            change: selection.change,
        }
        .to_json()?;

        self.db.insert_pending_build(&PendingBuild {
            operation_id: request.operation_id,
            transaction_context: context.clone(),
        })?;

        info!(
            "Built transaction for operation {}: {} inputs, fee {}, change {:?}",
            request.operation_id,
            selection.selected.len(),
            selection.fee,
            selection.change
        );

        if let Err(e) = self.record_funding_balance(&from, available).await {
            warn!("Failed to record balance of {from} after build: {e}");
        }

        Ok(context)
    }

    async fn record_funding_balance(&self, from: &Address, available: Amount) -> Result<(), NodeError> {
        let address = from.to_string();
        if available == Amount::ZERO
            || self.db.get_observed_address(&address)?.is_none()
            || self.db.get_positive_balance(&address)?.is_some()
        {
            return Ok(());
        }

        let as_of_block = self.oracle.get_latest_block_height().await?;
        self.balances.seed_balance(&address, available, as_of_block)?;
        Ok(())
    }
}
