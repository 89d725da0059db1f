//! The CHI burnsale: minting vCHI from burnt CHI.
//!
//! The schedule is tiered: each tier offers a fixed number of coins at an
//! increasing CHI price.  A mint consumes the burnt amount greedily across
//! tiers; burnt CHI below one coin's price is ignored.

use crate::amounts::{Amount, ChiAmount};
use crate::context::Context;

/// Computes the vCHI minted for the given burnt CHI, based on how many
/// coins were sold before.  Returns the minted coins and reduces `burnt`
/// by the CHI actually used.
pub fn compute_burnsale_amount(
    burnt: &mut ChiAmount,
    sold_before: Amount,
    ctx: &Context<'_>,
) -> Amount {
    let mut sold = sold_before;
    let mut minted: Amount = 0;

    let mut tier_start: Amount = 0;
    for (tier_coins, price) in ctx.params().burnsale_tiers {
        let tier_end = tier_start + tier_coins;
        if sold < tier_end {
            let left_in_tier = tier_end - sold;
            let affordable = *burnt / price;
            let bought = affordable.min(left_in_tier);
            if bought == 0 {
                break;
            }

            *burnt -= bought * price;
            sold += bought;
            minted += bought;
        }
        tier_start = tier_end;
    }

    minted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Chain, Params};
    use crate::map::BaseMap;

    fn with_ctx(f: impl FnOnce(&Context<'_>)) {
        let params = Params::for_chain(Chain::Regtest);
        let map = BaseMap::new();
        let ctx = Context::new(Chain::Regtest, &params, &map, 10, 0);
        f(&ctx);
    }

    #[test]
    fn first_tier_price() {
        with_ctx(|ctx| {
            let mut burnt = 100_000;
            assert_eq!(compute_burnsale_amount(&mut burnt, 0, ctx), 10);
            assert_eq!(burnt, 0);
        });
    }

    #[test]
    fn leftover_chi_below_price_is_ignored() {
        with_ctx(|ctx| {
            let mut burnt = 25_000;
            assert_eq!(compute_burnsale_amount(&mut burnt, 0, ctx), 2);
            assert_eq!(burnt, 5_000);
        });
    }

    #[test]
    fn price_rises_across_tiers() {
        with_ctx(|ctx| {
            // Sold out the first tier already: price is now 20'000.
            let mut burnt = 100_000;
            assert_eq!(compute_burnsale_amount(&mut burnt, 10_000_000, ctx), 5);
            assert_eq!(burnt, 0);
        });
    }

    #[test]
    fn mint_straddling_a_tier_boundary() {
        with_ctx(|ctx| {
            // One coin left in tier one, then tier-two pricing.
            let mut burnt = 50_000;
            let minted = compute_burnsale_amount(&mut burnt, 9_999_999, ctx);
            assert_eq!(minted, 3);
            assert_eq!(burnt, 0);
        });
    }

    #[test]
    fn sold_out_mints_nothing() {
        with_ctx(|ctx| {
            let total: Amount = 40_000_000;
            let mut burnt = 1_000_000;
            assert_eq!(compute_burnsale_amount(&mut burnt, total, ctx), 0);
            assert_eq!(burnt, 1_000_000);
        });
    }
}
