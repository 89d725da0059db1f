//! Height-gated behaviour switches.
//!
//! Forks activate at a chain-specific height and stay active.  Keeping them
//! behind one enum makes every gated branch searchable and exhaustive.

use crate::config::Params;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fork {
    /// The game world exists; before this, only coin operations process.
    GameStart,
}

pub struct Forks<'a> {
    params: &'a Params,
    height: u64,
}

impl<'a> Forks<'a> {
    pub fn new(params: &'a Params, height: u64) -> Self {
        Self { params, height }
    }

    pub fn is_active(&self, fork: Fork) -> bool {
        match fork {
            Fork::GameStart => self.height >= self.params.game_start_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Chain, Params};

    #[test]
    fn game_start_gating() {
        let params = Params::for_chain(Chain::Main);
        assert!(!Forks::new(&params, 0).is_active(Fork::GameStart));
        assert!(!Forks::new(&params, params.game_start_height - 1).is_active(Fork::GameStart));
        assert!(Forks::new(&params, params.game_start_height).is_active(Fork::GameStart));

        let regtest = Params::for_chain(Chain::Regtest);
        assert!(Forks::new(&regtest, 0).is_active(Fork::GameStart));
    }
}
