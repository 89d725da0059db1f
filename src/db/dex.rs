//! DEX order rows and the append-only trade history.
//!
//! Orders are mostly immutable: only the quantity changes during partial
//! fills, and a quantity of zero means the row is deleted on write-back.
//! Trade history rows draw their IDs from the separate log pool.

use std::collections::BTreeMap;

use rusqlite::Row;
use tracing::debug;

use super::records::{IdT, Inventory};
use super::tracker::TrackerGuard;
use super::Database;
use crate::amounts::{Amount, Quantity, MAX_QUANTITY};

/// Side of a DEX order.  The numeric values are stored in the database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderType {
    Bid = 1,
    Ask = 2,
}

impl OrderType {
    pub fn to_db(self) -> i64 {
        self as i64
    }

    pub fn from_db(val: i64) -> Self {
        match val {
            1 => OrderType::Bid,
            2 => OrderType::Ask,
            _ => panic!("invalid order type in database: {val}"),
        }
    }
}

/// Write-back handle for one DEX order.
pub struct DexOrder<'a> {
    db: &'a Database,
    _tracker: TrackerGuard<'a>,
    id: IdT,
    building: IdT,
    account: String,
    order_type: OrderType,
    item: String,
    quantity: Quantity,
    price: Amount,
    is_new: bool,
    dirty: bool,
}

impl<'a> DexOrder<'a> {
    fn from_row(db: &'a Database, row: &Row<'_>) -> DexOrder<'a> {
        let id: IdT = row.get(0).unwrap();
        let tracker = db.track_handle("dex order", id);
        DexOrder {
            db,
            _tracker: tracker,
            id,
            building: row.get(1).unwrap(),
            account: row.get(2).unwrap(),
            order_type: OrderType::from_db(row.get(3).unwrap()),
            item: row.get(4).unwrap(),
            quantity: row.get(5).unwrap(),
            price: row.get(6).unwrap(),
            is_new: false,
            dirty: false,
        }
    }

    pub fn id(&self) -> IdT {
        self.id
    }

    pub fn building(&self) -> IdT {
        self.building
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn item(&self) -> &str {
        &self.item
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn price(&self) -> Amount {
        self.price
    }

    /// Subtracts the given amount from the quantity.  Reaching zero deletes
    /// the order from the database.
    pub fn reduce_quantity(&mut self, q: Quantity) {
        assert!(q <= self.quantity, "over-filling order {}", self.id);
        self.quantity -= q;
        self.dirty = true;
    }

    /// Marks the row for deletion.
    pub fn delete(&mut self) {
        self.quantity = 0;
        self.dirty = true;
    }
}

impl Drop for DexOrder<'_> {
    fn drop(&mut self) {
        if self.is_new && self.quantity == 0 {
            debug!(id = self.id, "not inserting immediately deleted order");
            return;
        }

        if self.is_new {
            assert!(
                self.quantity > 0 && self.quantity <= MAX_QUANTITY,
                "invalid quantity for new order {}",
                self.id
            );
            assert!(self.price >= 0, "negative price for order {}", self.id);
            assert!(!self.item.is_empty(), "no item for order {}", self.id);
            self.db
                .prepare(
                    r#"
                    INSERT INTO `dex_orders`
                        (`id`, `building`, `account`, `type`, `item`, `quantity`, `price`)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .execute(rusqlite::params![
                    self.id,
                    self.building,
                    &self.account,
                    self.order_type.to_db(),
                    &self.item,
                    self.quantity,
                    self.price,
                ])
                .expect("failed to insert order");
            return;
        }

        if !self.dirty {
            return;
        }

        if self.quantity == 0 {
            debug!(id = self.id, "deleting used-up order");
            self.db
                .prepare("DELETE FROM `dex_orders` WHERE `id` = ?1")
                .execute((self.id,))
                .expect("failed to delete order");
            return;
        }

        self.db
            .prepare("UPDATE `dex_orders` SET `quantity` = ?2 WHERE `id` = ?1")
            .execute((self.id, self.quantity))
            .expect("failed to update order");
    }
}

pub struct DexOrderTable<'a> {
    db: &'a Database,
}

const COLUMNS: &str = "`id`, `building`, `account`, `type`, `item`, `quantity`, `price`";

impl<'a> DexOrderTable<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create_new(
        &self,
        building: IdT,
        account: &str,
        order_type: OrderType,
        item: &str,
        quantity: Quantity,
        price: Amount,
    ) -> DexOrder<'a> {
        let id = self.db.next_id();
        debug!(id, building, account, "creating DEX order");
        DexOrder {
            db: self.db,
            _tracker: self.db.track_handle("dex order", id),
            id,
            building,
            account: account.to_owned(),
            order_type,
            item: item.to_owned(),
            quantity,
            price,
            is_new: true,
            dirty: false,
        }
    }

    pub fn get_by_id(&self, id: IdT) -> Option<DexOrder<'a>> {
        let mut stmt = self
            .db
            .prepare(&format!("SELECT {COLUMNS} FROM `dex_orders` WHERE `id` = ?1"));
        let mut rows = stmt.query((id,)).expect("order query failed");
        rows.next()
            .expect("order row read failed")
            .map(|row| DexOrder::from_row(self.db, row))
    }

    fn query_ids(&self, sql: &str, params: impl rusqlite::Params) -> Vec<IdT> {
        let mut stmt = self.db.prepare(sql);
        let rows = stmt
            .query_map(params, |row| row.get::<_, IdT>(0))
            .expect("order query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    pub fn query_all(&self) -> Vec<IdT> {
        self.query_ids("SELECT `id` FROM `dex_orders` ORDER BY `id`", ())
    }

    pub fn query_for_building(&self, building: IdT) -> Vec<IdT> {
        self.query_ids(
            r#"
            SELECT `id` FROM `dex_orders`
                WHERE `building` = ?1
                ORDER BY `item`, `type`, `price`, `id`
            "#,
            (building,),
        )
    }

    /// Asks matching a new bid: same building and item, price at or below
    /// the limit, cheapest first with ID as tie breaker.
    pub fn query_to_match_bid(&self, building: IdT, item: &str, limit_price: Amount) -> Vec<IdT> {
        self.query_ids(
            r#"
            SELECT `id` FROM `dex_orders`
                WHERE `building` = ?1 AND `item` = ?2 AND `type` = ?3
                    AND `price` <= ?4
                ORDER BY `price`, `id`
            "#,
            rusqlite::params![building, item, OrderType::Ask.to_db(), limit_price],
        )
    }

    /// Bids matching a new ask: highest price first, ID as tie breaker.
    pub fn query_to_match_ask(&self, building: IdT, item: &str, limit_price: Amount) -> Vec<IdT> {
        self.query_ids(
            r#"
            SELECT `id` FROM `dex_orders`
                WHERE `building` = ?1 AND `item` = ?2 AND `type` = ?3
                    AND `price` >= ?4
                ORDER BY `price` DESC, `id`
            "#,
            rusqlite::params![building, item, OrderType::Bid.to_db(), limit_price],
        )
    }

    /// Coins reserved in open bids per account, for the given building or
    /// the whole world if `None`.  Consensus-invariant bookkeeping used by
    /// validation and the state projection.
    pub fn reserved_coins(&self, building: Option<IdT>) -> BTreeMap<String, Amount> {
        let mut sql = String::from(
            r#"
            SELECT `account`, SUM(`quantity` * `price`) AS `cost`
                FROM `dex_orders`
                WHERE `type` = ?1
            "#,
        );
        if building.is_some() {
            sql.push_str(" AND `building` = ?2");
        }
        sql.push_str(" GROUP BY `account`");

        let mut stmt = self.db.prepare(&sql);
        let mut res = BTreeMap::new();
        let closure = |row: &Row<'_>| -> rusqlite::Result<(String, Amount)> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let rows: Vec<(String, Amount)> = match building {
            Some(b) => stmt
                .query_map((OrderType::Bid.to_db(), b), closure)
                .expect("reserved-coins query failed")
                .map(|r| r.unwrap())
                .collect(),
            None => stmt
                .query_map((OrderType::Bid.to_db(),), closure)
                .expect("reserved-coins query failed")
                .map(|r| r.unwrap())
                .collect(),
        };
        for (account, cost) in rows {
            res.insert(account, cost);
        }
        res
    }

    /// Item quantities reserved in open asks per account in a building.
    pub fn reserved_quantities(&self, building: IdT) -> BTreeMap<String, Inventory> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT `account`, `item`, SUM(`quantity`) AS `quantity`
                FROM `dex_orders`
                WHERE `building` = ?1 AND `type` = ?2
                GROUP BY `account`, `item`
                ORDER BY `account`
            "#,
        );
        let rows = stmt
            .query_map((building, OrderType::Ask.to_db()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .expect("reserved-quantities query failed");

        let mut res: BTreeMap<String, Inventory> = BTreeMap::new();
        for r in rows {
            let (account, item, quantity) = r.unwrap();
            res.entry(account).or_default().add(&item, quantity);
        }
        res
    }

    pub fn delete_for_building(&self, building: IdT) {
        self.db
            .prepare("DELETE FROM `dex_orders` WHERE `building` = ?1")
            .execute((building,))
            .expect("failed to delete building orders");
    }
}

/* ************************************************************************ */

/// Append-only log of executed trades.
pub struct DexHistoryTable<'a> {
    db: &'a Database,
}

/// One historic trade row (read-only).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DexTrade {
    pub id: IdT,
    pub height: u64,
    pub time: i64,
    pub building: IdT,
    pub item: String,
    pub quantity: Quantity,
    pub price: Amount,
    pub seller: String,
    pub buyer: String,
}

impl<'a> DexHistoryTable<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_trade(
        &self,
        height: u64,
        time: i64,
        building: IdT,
        item: &str,
        quantity: Quantity,
        price: Amount,
        seller: &str,
        buyer: &str,
    ) {
        assert!(quantity > 0 && quantity <= MAX_QUANTITY);
        assert!(price >= 0);
        let id = self.db.next_log_id();
        self.db
            .prepare(
                r#"
                INSERT INTO `dex_trade_history`
                    (`id`, `height`, `time`, `building`, `item`,
                     `quantity`, `price`, `seller`, `buyer`)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .execute(rusqlite::params![
                id, height, time, building, item, quantity, price, seller, buyer,
            ])
            .expect("failed to insert trade");
    }

    pub fn query_for_item(&self, item: &str, building: IdT) -> Vec<DexTrade> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT `id`, `height`, `time`, `building`, `item`,
                   `quantity`, `price`, `seller`, `buyer`
                FROM `dex_trade_history`
                WHERE `item` = ?1 AND `building` = ?2
                ORDER BY `id`
            "#,
        );
        let rows = stmt
            .query_map((item, building), |row| {
                Ok(DexTrade {
                    id: row.get(0)?,
                    height: row.get(1)?,
                    time: row.get(2)?,
                    building: row.get(3)?,
                    item: row.get(4)?,
                    quantity: row.get(5)?,
                    price: row.get(6)?,
                    seller: row.get(7)?,
                    buyer: row.get(8)?,
                })
            })
            .expect("trade query failed");
        rows.map(|r| r.unwrap()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.setup_schema().unwrap();
        db
    }

    #[test]
    fn order_lifecycle() {
        let db = test_db();
        let tbl = DexOrderTable::new(&db);

        let id = {
            let o = tbl.create_new(10, "domob", OrderType::Ask, "raw a", 5, 3);
            o.id()
        };

        {
            let mut o = tbl.get_by_id(id).unwrap();
            assert_eq!(o.order_type(), OrderType::Ask);
            assert_eq!(o.quantity(), 5);
            o.reduce_quantity(2);
        }
        assert_eq!(tbl.get_by_id(id).unwrap().quantity(), 3);

        {
            let mut o = tbl.get_by_id(id).unwrap();
            o.reduce_quantity(3);
        }
        assert!(tbl.get_by_id(id).is_none(), "empty orders are deleted");
    }

    #[test]
    fn immediately_deleted_order_is_not_inserted() {
        let db = test_db();
        let tbl = DexOrderTable::new(&db);
        {
            let mut o = tbl.create_new(10, "domob", OrderType::Bid, "raw a", 5, 3);
            o.delete();
        }
        assert!(tbl.query_all().is_empty());
    }

    #[test]
    fn matching_queries_order_by_price_then_id() {
        let db = test_db();
        let tbl = DexOrderTable::new(&db);

        let a1 = tbl.create_new(1, "x", OrderType::Ask, "raw a", 1, 5).id();
        let a2 = tbl.create_new(1, "y", OrderType::Ask, "raw a", 1, 3).id();
        let a3 = tbl.create_new(1, "z", OrderType::Ask, "raw a", 1, 5).id();
        let _other_building = tbl.create_new(2, "w", OrderType::Ask, "raw a", 1, 1).id();
        let _other_item = tbl.create_new(1, "w", OrderType::Ask, "raw b", 1, 1).id();

        assert_eq!(tbl.query_to_match_bid(1, "raw a", 5), vec![a2, a1, a3]);
        assert_eq!(tbl.query_to_match_bid(1, "raw a", 4), vec![a2]);

        let b1 = tbl.create_new(1, "x", OrderType::Bid, "raw a", 1, 4).id();
        let b2 = tbl.create_new(1, "y", OrderType::Bid, "raw a", 1, 7).id();
        assert_eq!(tbl.query_to_match_ask(1, "raw a", 4), vec![b2, b1]);
        assert_eq!(tbl.query_to_match_ask(1, "raw a", 5), vec![b2]);
    }

    #[test]
    fn reserved_balances() {
        let db = test_db();
        let tbl = DexOrderTable::new(&db);

        tbl.create_new(1, "domob", OrderType::Bid, "raw a", 10, 2);
        tbl.create_new(1, "domob", OrderType::Bid, "raw b", 5, 4);
        tbl.create_new(2, "domob", OrderType::Bid, "raw a", 1, 100);
        tbl.create_new(1, "andy", OrderType::Ask, "raw a", 7, 1);
        tbl.create_new(1, "andy", OrderType::Ask, "raw a", 3, 2);

        let coins = tbl.reserved_coins(Some(1));
        assert_eq!(coins.get("domob"), Some(&40));
        assert!(coins.get("andy").is_none());

        let all_coins = tbl.reserved_coins(None);
        assert_eq!(all_coins.get("domob"), Some(&140));

        let quantities = tbl.reserved_quantities(1);
        assert_eq!(quantities.get("andy").unwrap().get("raw a"), 10);
        assert!(quantities.get("domob").is_none());
    }

    #[test]
    fn trade_history() {
        let db = test_db();
        let history = DexHistoryTable::new(&db);
        history.record_trade(100, 123456, 1, "raw a", 10, 3, "seller", "buyer");
        history.record_trade(101, 123457, 1, "raw a", 2, 4, "seller", "other");

        let trades = history.query_for_item("raw a", 1);
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].quantity, 10);
        assert_eq!(trades[1].buyer, "other");
        // Log IDs come from their own pool and do not disturb entity IDs.
        assert_eq!(db.next_id(), 1);
    }
}
