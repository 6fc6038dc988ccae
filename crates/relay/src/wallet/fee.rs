use bitcoin::Amount;

/// Flat fee rate clamped into a `[min_fee, max_fee]` band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub fee_per_vbyte: u64,
    pub min_fee: Amount,
    pub max_fee: Amount,
}

impl FeePolicy {
    #[must_use]
    pub fn fee_for_vsize(&self, vsize: u64) -> Amount {
        Amount::from_sat(self.fee_per_vbyte.saturating_mul(vsize))
            .max(self.min_fee)
            .min(self.max_fee)
    }
}
