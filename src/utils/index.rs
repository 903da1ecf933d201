use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places shown for coin balances
pub const BALANCE_DECIMALS: u32 = 8;

pub fn format_balance(amount: Decimal, decimals: u32) -> String {
    let rounded = amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", decimals as usize, rounded)
}
