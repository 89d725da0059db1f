//! Strict JSON value helpers for move parsing.
//!
//! Consensus demands strictness: only plain integers count as numbers
//! (no floats, no strings), and all amounts are range checked at parse
//! time.

use serde_json::Value;

use crate::amounts::{Amount, ChiAmount, Quantity, MAX_COIN_AMOUNT, MAX_QUANTITY};
use crate::db::records::IdT;

/// Extracts an entity ID: a positive integer.
pub fn id_from_json(val: &Value) -> Option<IdT> {
    let id = val.as_i64()?;
    if val.is_u64() || val.is_i64() {
        if id > 0 {
            return Some(id);
        }
    }
    None
}

/// Extracts an item quantity in (0, MAX_QUANTITY].
pub fn quantity_from_json(val: &Value) -> Option<Quantity> {
    let q = val.as_i64()?;
    if q > 0 && q <= MAX_QUANTITY {
        Some(q)
    } else {
        None
    }
}

/// Extracts a vCHI amount in [0, MAX_COIN_AMOUNT].
pub fn coin_amount_from_json(val: &Value) -> Option<Amount> {
    let a = val.as_i64()?;
    if (0..=MAX_COIN_AMOUNT).contains(&a) {
        Some(a)
    } else {
        None
    }
}

/// Extracts a CHI satoshi amount attached to a move output.
pub fn chi_amount_from_json(val: &Value) -> Option<ChiAmount> {
    let a = val.as_i64()?;
    if a >= 0 {
        Some(a)
    } else {
        None
    }
}
