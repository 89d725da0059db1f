//! Numeric types for coins and item quantities, and overflow-safe products.
//!
//! All consensus numerics are integral.  Products of two quantity-like
//! values must go through [`QuantityProduct`], which accumulates in 128 bits
//! and enforces a hard 60-bit ceiling so results always fit comfortably into
//! the 64-bit fields they end up in.

/// Coin amount (vCHI) in integral coins.
pub type Amount = i64;

/// CHI amounts attached to moves, in satoshi.
pub type ChiAmount = i64;

/// Item quantity.
pub type Quantity = i64;

/// Maximum valid item quantity (and unit price).  Consensus relevant: any
/// larger number in a move makes the sub-command invalid.
pub const MAX_QUANTITY: Quantity = 1 << 50;

/// Maximum valid coin balance / coin amount in a move.
pub const MAX_COIN_AMOUNT: Amount = 100_000_000_000;

/// Hard ceiling on any quantity product, as a defensive bound below what
/// fits into 64 bits.
const PRODUCT_CEILING: u128 = 1 << 60;

/// Returns true if the value is a valid quantity, i.e. in (0, MAX_QUANTITY].
pub fn is_valid_quantity(val: i64) -> bool {
    val > 0 && val <= MAX_QUANTITY
}

/// Returns true if the value is a valid coin amount in a move.
pub fn is_valid_coin_amount(val: i64) -> bool {
    val >= 0 && val <= MAX_COIN_AMOUNT
}

/// Running sum of products of two quantity-like values.  Overflowing the
/// 60-bit ceiling is a programming fault (inputs are range-checked upstream),
/// so it panics rather than erroring.
#[derive(Default)]
pub struct QuantityProduct {
    total: u128,
}

impl QuantityProduct {
    pub fn new(a: Quantity, b: Quantity) -> Self {
        let mut res = Self::default();
        res.add_product(a, b);
        res
    }

    pub fn add_product(&mut self, a: Quantity, b: Quantity) {
        assert!(a >= 0 && b >= 0, "negative quantity in product: {a} * {b}");
        self.total += (a as u128) * (b as u128);
        assert!(
            self.total <= PRODUCT_CEILING,
            "quantity product exceeds ceiling: {}",
            self.total
        );
    }

    pub fn le(&self, limit: u64) -> bool {
        self.total <= u128::from(limit)
    }

    pub fn gt(&self, limit: u64) -> bool {
        !self.le(limit)
    }

    /// Extracts the value as i64.  Only valid when the value is known to
    /// fit, e.g. after a `le` check against a 64-bit limit.
    pub fn extract(&self) -> i64 {
        i64::try_from(self.total).expect("quantity product does not fit into i64")
    }
}
