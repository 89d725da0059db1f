//! Per-block processing context: chain, height, timestamp and references to
//! the immutable configuration and map data.

use crate::config::{Chain, Params, RoConfig};
use crate::forks::{Fork, Forks};
use crate::map::BaseMap;

pub struct Context<'a> {
    chain: Chain,
    params: &'a Params,
    map: &'a BaseMap,
    height: u64,
    timestamp: i64,
}

impl<'a> Context<'a> {
    pub fn new(
        chain: Chain,
        params: &'a Params,
        map: &'a BaseMap,
        height: u64,
        timestamp: i64,
    ) -> Self {
        assert_eq!(params.chain, chain);
        Self {
            chain,
            params,
            map,
            height,
            timestamp,
        }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn params(&self) -> &Params {
        self.params
    }

    pub fn map(&self) -> &BaseMap {
        self.map
    }

    pub fn roconfig(&self) -> &'static RoConfig {
        RoConfig::get()
    }

    pub fn forks(&self) -> Forks<'_> {
        Forks::new(self.params, self.height)
    }

    pub fn fork_active(&self, fork: Fork) -> bool {
        self.forks().is_active(fork)
    }
}
