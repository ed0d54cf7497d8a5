//! Q64.64 square-root price conversions used by the CLMM decoders.
//!
//! Prices are encoded on-chain as `sqrt(price) * 2^64` in a u128. Tick
//! indices relate to prices through `sqrt_price = 1.0001^(tick / 2)`.

const Q64: f64 = 18_446_744_073_709_551_616.0; // 2^64
const TICK_BASE: f64 = 1.0001;

/// Converts a Q64.64 sqrt price to a plain price: `(sqrt_price / 2^64)^2`.
pub fn sqrt_price_q64_to_float(sqrt_price: u128) -> f64 {
    let scaled = sqrt_price as f64 / Q64;
    scaled * scaled
}

/// Converts a price to its Q64.64 sqrt representation.
pub fn float_to_sqrt_price_q64(price: f64) -> u128 {
    if price <= 0.0 || !price.is_finite() {
        return 0;
    }
    (price.sqrt() * Q64) as u128
}

/// Sqrt price at a tick index: `1.0001^(tick / 2) * 2^64`.
pub fn tick_index_to_sqrt_price(tick: i32) -> u128 {
    (TICK_BASE.powf(tick as f64 / 2.0) * Q64) as u128
}

/// Nearest tick at or below the given sqrt price.
pub fn sqrt_price_to_tick_index(sqrt_price: u128) -> i32 {
    if sqrt_price == 0 {
        return 0;
    }
    let scaled = sqrt_price as f64 / Q64;
    (scaled.ln() / TICK_BASE.ln() * 2.0).floor() as i32
}

/// Scales a raw token amount by its decimals.
pub fn scale_amount(amount: u64, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

/// Converts a scaled amount back to raw token units.
pub fn unscale_amount(amount: f64, decimals: u8) -> u64 {
    (amount * 10f64.powi(decimals as i32)) as u64
}

/// Effective quote/base price implied by a pair of swap amounts.
pub fn price_from_amounts(base_amount: u64, quote_amount: u64, dec_base: u8, dec_quote: u8) -> f64 {
    if base_amount == 0 {
        return 0.0;
    }
    scale_amount(quote_amount, dec_quote) / scale_amount(base_amount, dec_base)
}
