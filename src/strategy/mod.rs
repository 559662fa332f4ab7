/// Casting strategies: pluggable policies the simulator asks "what do I cast
/// on a unit missing this much health?".
///
/// Each strategy lives in its own file and owns everything it needs (spell
/// numbers are resolved once at construction), so the simulator only ever
/// sees the `CastingStrategy` trait.
pub mod fixed_spell;
pub mod greedy_rank;

pub use fixed_spell::FixedSpellStrategy;
pub use greedy_rank::GreedyRankStrategy;

use crate::spells::{SpellTable, Talents};
use serde::{Deserialize, Serialize};

/// A strategy's answer for one decision point. `SpellChoice::NONE` means no
/// affordable, useful spell exists right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellChoice {
    pub spell_id:  u32,
    pub heal:      f64,
    pub mana_cost: f64,
    /// Seconds.
    pub cast_time: f64,
}

impl SpellChoice {
    pub const NONE: SpellChoice = SpellChoice { spell_id: 0, heal: 0.0, mana_cost: 0.0, cast_time: 0.0 };

    /// Castable with `available_mana`: heals something, costs no more than
    /// what is in the pool, and takes time to cast.
    pub fn is_castable(&self, available_mana: f64) -> bool {
        self.heal > 0.0 && self.cast_time > 0.0 && self.mana_cost <= available_mana
    }
}

pub trait CastingStrategy {
    /// Label used in logs and reports.
    fn name(&self) -> String;

    /// `deficit` is the target's effective deficit (≤ 0).
    fn pick_spell(&self, deficit: f64, available_mana: f64, heal_power: f64) -> SpellChoice;
}

impl<S: CastingStrategy + ?Sized> CastingStrategy for Box<S> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn pick_spell(&self, deficit: f64, available_mana: f64, heal_power: f64) -> SpellChoice {
        (**self).pick_spell(deficit, available_mana, heal_power)
    }
}

// ---------------------------------------------------------------------------
// Config-driven construction
// ---------------------------------------------------------------------------

/// Strategy selection as stored in `config.toml`:
///
/// ```toml
/// [strategy]
/// kind = "greedy_rank"
/// spell_ids = [10917, 9474]
/// overheal_slack = 0.2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    GreedyRank {
        spell_ids:      Vec<u32>,
        #[serde(default = "default_overheal_slack")]
        overheal_slack: f64,
    },
    FixedSpell {
        spell_id: u32,
    },
}

fn default_overheal_slack() -> f64 {
    greedy_rank::DEFAULT_OVERHEAL_SLACK
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::GreedyRank {
            spell_ids:      greedy_rank::DEFAULT_SPELL_IDS.to_vec(),
            overheal_slack: greedy_rank::DEFAULT_OVERHEAL_SLACK,
        }
    }
}

impl StrategyConfig {
    pub fn build(&self, table: &SpellTable, talents: &Talents) -> Box<dyn CastingStrategy> {
        match self {
            StrategyConfig::GreedyRank { spell_ids, overheal_slack } => {
                Box::new(GreedyRankStrategy::new(table, spell_ids, talents, *overheal_slack))
            }
            StrategyConfig::FixedSpell { spell_id } => Box::new(FixedSpellStrategy::new(table, *spell_id, talents)),
        }
    }
}
