//! Building-scoped item market (DEX): transfers, bids, asks, cancels.
//!
//! Items sold through an ask are escrowed in the order at placement time;
//! coins backing a bid are deducted when the bid is placed.  A match pays
//! the seller minus fees: the protocol fee (rounded up to the next coin)
//! is burnt, the building owner's fee (rounded down) goes to the owner.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::amounts::{Amount, Quantity, QuantityProduct};
use crate::context::Context;
use crate::db::accounts::{Account, AccountsTable};
use crate::db::buildings::BuildingsTable;
use crate::db::dex::{DexHistoryTable, DexOrderTable, OrderType};
use crate::db::inventories::BuildingInventoriesTable;
use crate::db::records::{Faction, IdT};
use crate::db::Database;
use crate::moves::json::{coin_amount_from_json, id_from_json, quantity_from_json};

/// A parsed DEX sub-command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DexOperation {
    Transfer {
        building: IdT,
        item: String,
        quantity: Quantity,
        recipient: String,
    },
    Bid {
        building: IdT,
        item: String,
        quantity: Quantity,
        price: Amount,
    },
    Ask {
        building: IdT,
        item: String,
        quantity: Quantity,
        price: Amount,
    },
    Cancel {
        order_id: IdT,
    },
}

impl DexOperation {
    /// Parses a DEX sub-command.  Returns None for anything malformed.
    pub fn parse(data: &Value) -> Option<DexOperation> {
        let obj = data.as_object()?;

        // Order cancellation is the special single-member form.
        if obj.len() == 1 {
            let order_id = id_from_json(obj.get("c")?)?;
            return Some(DexOperation::Cancel { order_id });
        }

        if obj.len() != 4 {
            return None;
        }
        let building = id_from_json(obj.get("b")?)?;
        let item = obj.get("i")?.as_str()?.to_owned();
        let quantity = quantity_from_json(obj.get("n")?)?;

        // Exactly one of the operation keys can be present since the
        // member count is fixed at four.
        if let Some(recv) = obj.get("t").and_then(Value::as_str) {
            return Some(DexOperation::Transfer {
                building,
                item,
                quantity,
                recipient: recv.to_owned(),
            });
        }
        if let Some(price) = obj.get("bp").and_then(coin_amount_from_json) {
            return Some(DexOperation::Bid {
                building,
                item,
                quantity,
                price,
            });
        }
        if let Some(price) = obj.get("ap").and_then(coin_amount_from_json) {
            return Some(DexOperation::Ask {
                building,
                item,
                quantity,
                price,
            });
        }

        None
    }
}

/// Executes all validated DEX operations for one account.
pub struct DexProcessor<'a, 'c> {
    db: &'a Database,
    ctx: &'c Context<'c>,
}

impl<'a, 'c> DexProcessor<'a, 'c> {
    pub fn new(db: &'a Database, ctx: &'c Context<'c>) -> Self {
        Self { db, ctx }
    }

    /// Shared validity checks for building/item/quantity operations.
    fn is_item_operation_valid(&self, building: IdT, item: &str, raw: &Value) -> bool {
        let buildings = BuildingsTable::new(self.db);
        let b = match buildings.get_by_id(building) {
            Some(b) => b,
            None => {
                warn!(building, %raw, "invalid building in DEX operation");
                return false;
            }
        };
        if b.is_foundation() {
            warn!(building, %raw, "DEX operation in foundation");
            return false;
        }

        if self.ctx.roconfig().item_or_null(item).is_none() {
            warn!(item, %raw, "invalid item in DEX operation");
            return false;
        }

        true
    }

    /// Pays coins to a named account, handling the case that it is the
    /// account executing the operation (whose handle is already open).
    fn pay_coins(&self, account: &mut Account<'_>, recipient: &str, amount: Amount) {
        if amount == 0 {
            return;
        }
        if recipient == account.name() {
            account.add_balance(amount);
            return;
        }
        let accounts = AccountsTable::new(self.db);
        let mut a = accounts.get_or_create(recipient);
        a.add_balance(amount);
    }

    /// Pays a sale's proceeds to the seller, splitting off the protocol
    /// fee (burnt) and the building owner's fee.
    fn pay_to_seller_and_fee(
        &self,
        account: &mut Account<'_>,
        building: IdT,
        recipient: &str,
        cost: Amount,
    ) {
        assert!(cost >= 0);
        let buildings = BuildingsTable::new(self.db);
        let b = buildings.get_by_id(building).expect("matched in missing building");

        let base_bps = i64::from(self.ctx.params().dex_fee_bps);
        let owner_bps = i64::from(b.data().config.dex_fee_bps);
        let total_bps = base_bps + owner_bps;

        if b.faction() == Faction::Ancient {
            assert_eq!(owner_bps, 0, "ancient building with owner fee");
        }

        // The total fee is rounded up to the next coin so fees cannot be
        // dodged by splitting orders; the owner share is rounded down so
        // splitting does not gain anything from rounding either.
        let total = (cost * total_bps + 9_999) / 10_000;
        let owner = (cost * owner_bps) / 10_000;
        let payout = cost - total;
        assert!(payout >= 0);
        assert!(owner + payout <= cost);

        let owner_name = if owner > 0 {
            Some(b.owner().to_owned())
        } else {
            None
        };
        drop(b);

        if let Some(owner_account) = owner_name {
            self.pay_coins(account, &owner_account, owner);
        }
        self.pay_coins(account, recipient, payout);
    }

    fn validate(&self, account: &Account<'_>, op: &DexOperation, raw: &Value) -> bool {
        let inventories = BuildingInventoriesTable::new(self.db);
        match op {
            DexOperation::Transfer {
                building,
                item,
                quantity,
                ..
            }
            | DexOperation::Ask {
                building,
                item,
                quantity,
                ..
            } => {
                if !self.is_item_operation_valid(*building, item, raw) {
                    return false;
                }
                let got = inventories.get(*building, account.name()).inventory().get(item);
                if got < *quantity {
                    warn!(
                        account = account.name(),
                        %item,
                        got,
                        needed = quantity,
                        "insufficient items for DEX operation"
                    );
                    return false;
                }
                true
            }

            DexOperation::Bid {
                building,
                item,
                quantity,
                price,
            } => {
                if !self.is_item_operation_valid(*building, item, raw) {
                    return false;
                }
                if QuantityProduct::new(*quantity, *price).gt(account.balance() as u64) {
                    warn!(
                        account = account.name(),
                        balance = account.balance(),
                        "insufficient coins for bid"
                    );
                    return false;
                }
                true
            }

            DexOperation::Cancel { order_id } => {
                let orders = DexOrderTable::new(self.db);
                let o = match orders.get_by_id(*order_id) {
                    Some(o) => o,
                    None => {
                        warn!(order_id, "invalid order to cancel");
                        return false;
                    }
                };
                if o.account() != account.name() {
                    warn!(
                        order_id,
                        owner = o.account(),
                        by = account.name(),
                        "order cancel by non-owner"
                    );
                    return false;
                }
                true
            }
        }
    }

    fn execute_transfer(
        &self,
        account: &mut Account<'_>,
        building: IdT,
        item: &str,
        quantity: Quantity,
        recipient: &str,
    ) {
        info!(
            from = account.name(),
            recipient, item, quantity, building, "DEX transfer"
        );
        let accounts = AccountsTable::new(self.db);
        if recipient != account.name() && accounts.get_by_name(recipient).is_none() {
            let _ = accounts.create_new(recipient);
        }

        let inventories = BuildingInventoriesTable::new(self.db);
        {
            let mut from = inventories.get(building, account.name());
            from.mutate_inventory().add(item, -quantity);
        }
        let mut to = inventories.get(building, recipient);
        to.mutate_inventory().add(item, quantity);
    }

    fn execute_bid(
        &self,
        account: &mut Account<'_>,
        building: IdT,
        item: &str,
        quantity: Quantity,
        price: Amount,
    ) {
        let orders = DexOrderTable::new(self.db);
        let history = DexHistoryTable::new(self.db);
        let inventories = BuildingInventoriesTable::new(self.db);

        let mut remaining = quantity;
        for order_id in orders.query_to_match_bid(building, item, price) {
            if remaining == 0 {
                break;
            }
            let mut o = orders.get_by_id(order_id).unwrap();
            let cur = remaining.min(o.quantity());

            // The sold items were escrowed when the ask was placed; credit
            // them to the buyer and move the coin payment.
            {
                let mut inv = inventories.get(building, account.name());
                inv.mutate_inventory().add(item, cur);
            }

            let cost = QuantityProduct::new(cur, o.price()).extract();
            let seller = o.account().to_owned();
            self.pay_to_seller_and_fee(account, building, &seller, cost);
            account.add_balance(-cost);

            history.record_trade(
                self.ctx.height(),
                self.ctx.timestamp(),
                building,
                item,
                cur,
                o.price(),
                &seller,
                account.name(),
            );

            o.reduce_quantity(cur);
            remaining -= cur;
        }

        assert!(remaining >= 0);
        if remaining == 0 {
            return;
        }

        let o = orders.create_new(building, account.name(), OrderType::Bid, item, remaining, price);
        debug!(id = o.id(), remaining, "bid goes onto the book");
        drop(o);
        account.add_balance(-QuantityProduct::new(remaining, price).extract());
    }

    fn execute_ask(
        &self,
        account: &mut Account<'_>,
        building: IdT,
        item: &str,
        quantity: Quantity,
        price: Amount,
    ) {
        let orders = DexOrderTable::new(self.db);
        let history = DexHistoryTable::new(self.db);
        let inventories = BuildingInventoriesTable::new(self.db);

        let mut remaining = quantity;
        for order_id in orders.query_to_match_ask(building, item, price) {
            if remaining == 0 {
                break;
            }
            let mut o = orders.get_by_id(order_id).unwrap();
            let cur = remaining.min(o.quantity());

            // The buyer's coins were deducted when the bid was placed, so
            // only the seller payout and the item transfer happen now.
            let buyer = o.account().to_owned();
            {
                let mut to = inventories.get(building, &buyer);
                to.mutate_inventory().add(item, cur);
            }
            {
                let mut from = inventories.get(building, account.name());
                from.mutate_inventory().add(item, -cur);
            }

            let cost = QuantityProduct::new(cur, o.price()).extract();
            let seller = account.name().to_owned();
            self.pay_to_seller_and_fee(account, building, &seller, cost);

            history.record_trade(
                self.ctx.height(),
                self.ctx.timestamp(),
                building,
                item,
                cur,
                o.price(),
                &seller,
                &buyer,
            );

            o.reduce_quantity(cur);
            remaining -= cur;
        }

        assert!(remaining >= 0);
        if remaining == 0 {
            return;
        }

        let o = orders.create_new(building, account.name(), OrderType::Ask, item, remaining, price);
        debug!(id = o.id(), remaining, "ask goes onto the book");
        drop(o);
        let mut inv = inventories.get(building, account.name());
        inv.mutate_inventory().add(item, -remaining);
    }

    fn execute_cancel(&self, account: &mut Account<'_>, order_id: IdT) {
        let orders = DexOrderTable::new(self.db);
        let mut o = orders.get_by_id(order_id).expect("cancelled order vanished");
        info!(
            order_id,
            account = o.account(),
            building = o.building(),
            "cancelling DEX order"
        );

        match o.order_type() {
            OrderType::Bid => {
                let cost = QuantityProduct::new(o.quantity(), o.price()).extract();
                account.add_balance(cost);
            }
            OrderType::Ask => {
                let inventories = BuildingInventoriesTable::new(self.db);
                let mut inv = inventories.get(o.building(), o.account());
                inv.mutate_inventory().add(o.item(), o.quantity());
            }
        }

        o.delete();
    }

    /// Parses, validates and executes one DEX sub-command.  Invalid input
    /// is logged and dropped.
    pub fn process(&self, account: &mut Account<'_>, raw: &Value) {
        let op = match DexOperation::parse(raw) {
            Some(op) => op,
            None => {
                warn!(%raw, "malformed DEX operation");
                return;
            }
        };
        if !self.validate(account, &op, raw) {
            return;
        }

        match op {
            DexOperation::Transfer {
                building,
                item,
                quantity,
                recipient,
            } => self.execute_transfer(account, building, &item, quantity, &recipient),
            DexOperation::Bid {
                building,
                item,
                quantity,
                price,
            } => self.execute_bid(account, building, &item, quantity, price),
            DexOperation::Ask {
                building,
                item,
                quantity,
                price,
            } => self.execute_ask(account, building, &item, quantity, price),
            DexOperation::Cancel { order_id } => self.execute_cancel(account, order_id),
        }
    }
}
