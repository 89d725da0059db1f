//! Database schema bootstrap.
//!
//! One table per entity kind, one per log kind, small key-value tables for
//! process-wide counters and the ID allocator.  Absent-iff-empty and
//! deletion invariants are enforced by the handle write-back, not here.

use rusqlite::Connection;

use crate::errors::StoreResult;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS `accounts` (
    `name` TEXT PRIMARY KEY,
    `faction` INTEGER NOT NULL,
    `balance` INTEGER NOT NULL,
    `fame` INTEGER NOT NULL,
    `kills` INTEGER NOT NULL,
    `proto` BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS `accounts_faction` ON `accounts` (`faction`);

CREATE TABLE IF NOT EXISTS `characters` (
    `id` INTEGER PRIMARY KEY,
    `owner` TEXT NOT NULL,
    `faction` INTEGER NOT NULL,
    `x` INTEGER NULL,
    `y` INTEGER NULL,
    `inbuilding` INTEGER NULL,
    `volatilemv` BLOB NOT NULL,
    `hp` BLOB NOT NULL,
    `regendata` BLOB NOT NULL,
    `busy` INTEGER NOT NULL,
    `inventory` BLOB NOT NULL,
    `proto` BLOB NOT NULL,
    `attackrange` INTEGER NOT NULL,
    `canregen` INTEGER NOT NULL,
    `hastarget` INTEGER NOT NULL,
    `ismoving` INTEGER NOT NULL,
    `ismining` INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS `characters_owner` ON `characters` (`owner`);
CREATE INDEX IF NOT EXISTS `characters_pos` ON `characters` (`x`, `y`);
CREATE INDEX IF NOT EXISTS `characters_inbuilding` ON `characters` (`inbuilding`);
CREATE INDEX IF NOT EXISTS `characters_attackrange` ON `characters` (`attackrange`);
CREATE INDEX IF NOT EXISTS `characters_canregen` ON `characters` (`canregen`);
CREATE INDEX IF NOT EXISTS `characters_hastarget` ON `characters` (`hastarget`);
CREATE INDEX IF NOT EXISTS `characters_ismoving` ON `characters` (`ismoving`);
CREATE INDEX IF NOT EXISTS `characters_ismining` ON `characters` (`ismining`);

CREATE TABLE IF NOT EXISTS `buildings` (
    `id` INTEGER PRIMARY KEY,
    `type` TEXT NOT NULL,
    `owner` TEXT NOT NULL,
    `faction` INTEGER NOT NULL,
    `x` INTEGER NOT NULL,
    `y` INTEGER NOT NULL,
    `hp` BLOB NOT NULL,
    `regendata` BLOB NOT NULL,
    `proto` BLOB NOT NULL,
    `attackrange` INTEGER NOT NULL,
    `friendlyrange` INTEGER NOT NULL,
    `canregen` INTEGER NOT NULL,
    `hastarget` INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS `buildings_owner` ON `buildings` (`owner`);
CREATE INDEX IF NOT EXISTS `buildings_attackrange` ON `buildings` (`attackrange`);
CREATE INDEX IF NOT EXISTS `buildings_canregen` ON `buildings` (`canregen`);
CREATE INDEX IF NOT EXISTS `buildings_hastarget` ON `buildings` (`hastarget`);

CREATE TABLE IF NOT EXISTS `ground_loot` (
    `x` INTEGER NOT NULL,
    `y` INTEGER NOT NULL,
    `inventory` BLOB NOT NULL,
    PRIMARY KEY (`x`, `y`)
);

CREATE TABLE IF NOT EXISTS `building_inventories` (
    `building` INTEGER NOT NULL,
    `account` TEXT NOT NULL,
    `inventory` BLOB NOT NULL,
    PRIMARY KEY (`building`, `account`)
);

CREATE TABLE IF NOT EXISTS `regions` (
    `id` INTEGER PRIMARY KEY,
    `modifiedheight` INTEGER NOT NULL,
    `resourceleft` INTEGER NOT NULL,
    `proto` BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS `regions_modifiedheight` ON `regions` (`modifiedheight`);

CREATE TABLE IF NOT EXISTS `ongoing_operations` (
    `id` INTEGER PRIMARY KEY,
    `height` INTEGER NOT NULL,
    `character` INTEGER NULL,
    `building` INTEGER NULL,
    `proto` BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS `ongoing_height` ON `ongoing_operations` (`height`, `id`);
CREATE INDEX IF NOT EXISTS `ongoing_character` ON `ongoing_operations` (`character`);
CREATE INDEX IF NOT EXISTS `ongoing_building` ON `ongoing_operations` (`building`);

CREATE TABLE IF NOT EXISTS `dex_orders` (
    `id` INTEGER PRIMARY KEY,
    `building` INTEGER NOT NULL,
    `account` TEXT NOT NULL,
    `type` INTEGER NOT NULL,
    `item` TEXT NOT NULL,
    `quantity` INTEGER NOT NULL,
    `price` INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS `dex_orders_book`
    ON `dex_orders` (`building`, `item`, `type`, `price`, `id`);
CREATE INDEX IF NOT EXISTS `dex_orders_account` ON `dex_orders` (`account`);

CREATE TABLE IF NOT EXISTS `dex_trade_history` (
    `id` INTEGER PRIMARY KEY,
    `height` INTEGER NOT NULL,
    `time` INTEGER NOT NULL,
    `building` INTEGER NOT NULL,
    `item` TEXT NOT NULL,
    `quantity` INTEGER NOT NULL,
    `price` INTEGER NOT NULL,
    `seller` TEXT NOT NULL,
    `buyer` TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS `dex_trade_history_item`
    ON `dex_trade_history` (`building`, `item`, `id`);

CREATE TABLE IF NOT EXISTS `damage_lists` (
    `victim` INTEGER NOT NULL,
    `attacker` INTEGER NOT NULL,
    `height` INTEGER NOT NULL,
    PRIMARY KEY (`victim`, `attacker`)
);
CREATE INDEX IF NOT EXISTS `damage_lists_height` ON `damage_lists` (`height`);
CREATE INDEX IF NOT EXISTS `damage_lists_attacker` ON `damage_lists` (`attacker`);

CREATE TABLE IF NOT EXISTS `item_counts` (
    `name` TEXT PRIMARY KEY,
    `found` INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS `money_supply` (
    `name` TEXT PRIMARY KEY,
    `amount` INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS `id_pool` (
    `name` TEXT PRIMARY KEY,
    `next` INTEGER NOT NULL
);
INSERT OR IGNORE INTO `id_pool` (`name`, `next`) VALUES ('entity', 1);
INSERT OR IGNORE INTO `id_pool` (`name`, `next`) VALUES ('log', 1);
"#;

pub fn setup(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
