/// Picks the biggest heal from a rank list that is affordable and does not
/// overshoot the target's deficit by more than a slack factor.
///
/// With the default Flash Heal ranks 7 and 4 this is the classic "max rank on
/// big deficits, downrank on small ones" rotation.
use super::{CastingStrategy, SpellChoice};
use crate::spells::{short_name, SpellTable, Talents};

pub const DEFAULT_SPELL_IDS: &[u32] = &[10917, 9474];
pub const DEFAULT_OVERHEAL_SLACK: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    spell_id:    u32,
    label:       String,
    base_heal:   f64,
    coefficient: f64,
    mana_cost:   f64,
    cast_time:   f64,
}

#[derive(Debug, Clone)]
pub struct GreedyRankStrategy {
    candidates:     Vec<Candidate>,
    overheal_slack: f64,
}

impl GreedyRankStrategy {
    /// Unknown spell ids are dropped with a warning.
    pub fn new(table: &SpellTable, spell_ids: &[u32], talents: &Talents, overheal_slack: f64) -> Self {
        let candidates = spell_ids
            .iter()
            .filter_map(|&id| {
                let Some(spell) = table.get(id) else {
                    tracing::warn!("Greedy strategy ignoring unknown spell id {}", id);
                    return None;
                };
                Some(Candidate {
                    spell_id:    id,
                    label:       short_name(&spell.name),
                    base_heal:   spell.base_heal,
                    coefficient: spell.coefficient,
                    mana_cost:   table.mana_cost(id, talents),
                    cast_time:   spell.cast_time,
                })
            })
            .collect();

        Self { candidates, overheal_slack: overheal_slack.clamp(0.0, 1.0) }
    }
}

impl CastingStrategy for GreedyRankStrategy {
    fn name(&self) -> String {
        let labels: Vec<&str> = self.candidates.iter().map(|c| c.label.as_str()).collect();
        format!("Greedy [{}]", labels.join(", "))
    }

    fn pick_spell(&self, deficit: f64, available_mana: f64, heal_power: f64) -> SpellChoice {
        let keep = 1.0 - self.overheal_slack;

        self.candidates
            .iter()
            .filter(|c| c.mana_cost < available_mana)
            .map(|c| SpellChoice {
                spell_id:  c.spell_id,
                heal:      c.base_heal + c.coefficient * heal_power,
                mana_cost: c.mana_cost,
                cast_time: c.cast_time,
            })
            .filter(|choice| keep * choice.heal < -deficit)
            .max_by(|a, b| a.heal.total_cmp(&b.heal))
            .unwrap_or(SpellChoice::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> GreedyRankStrategy {
        GreedyRankStrategy::new(
            SpellTable::builtin(),
            DEFAULT_SPELL_IDS,
            &Talents::default(),
            DEFAULT_OVERHEAL_SLACK,
        )
    }

    #[test]
    fn big_deficit_takes_max_rank() {
        let choice = strategy().pick_spell(-3_000.0, 8_000.0, 800.0);
        assert_eq!(choice.spell_id, 10917);
        assert!((choice.cast_time - 1.5).abs() < 1e-9);
        assert!((choice.mana_cost - 380.0).abs() < 1e-9);
    }

    #[test]
    fn small_deficit_downranks() {
        // FH7 ≈ 1228 (0.8 × 1228 > 900), FH4 ≈ 782 (0.8 × 782 < 900)
        let choice = strategy().pick_spell(-900.0, 8_000.0, 800.0);
        assert_eq!(choice.spell_id, 9474);
    }

    #[test]
    fn tiny_deficit_casts_nothing() {
        assert_eq!(strategy().pick_spell(-100.0, 8_000.0, 800.0), SpellChoice::NONE);
    }

    #[test]
    fn falls_back_to_cheaper_rank_when_low_on_mana() {
        let choice = strategy().pick_spell(-3_000.0, 300.0, 800.0);
        assert_eq!(choice.spell_id, 9474);

        // Mana must be strictly greater than the cost.
        let choice = strategy().pick_spell(-3_000.0, 215.0, 800.0);
        assert_eq!(choice, SpellChoice::NONE);
    }

    #[test]
    fn unknown_ids_are_dropped() {
        let s = GreedyRankStrategy::new(SpellTable::builtin(), &[1, 10917], &Talents::default(), 0.2);
        assert_eq!(s.name(), "Greedy [FH7]");
    }
}
