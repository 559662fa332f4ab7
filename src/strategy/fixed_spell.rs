/// Always proposes the same spell, whatever the deficit. Used to compare
/// "spam rank X" rotations against each other.
use super::{CastingStrategy, SpellChoice};
use crate::spells::{SpellTable, Talents};

#[derive(Debug, Clone, PartialEq)]
pub struct FixedSpellStrategy {
    spell_id:    u32,
    name:        String,
    base_heal:   f64,
    coefficient: f64,
    mana_cost:   f64,
    cast_time:   f64,
}

impl FixedSpellStrategy {
    pub fn new(table: &SpellTable, spell_id: u32, talents: &Talents) -> Self {
        Self {
            spell_id,
            name:        table.name(spell_id),
            base_heal:   table.base_heal(spell_id),
            coefficient: table.coefficient(spell_id),
            mana_cost:   table.mana_cost(spell_id, talents),
            cast_time:   table.cast_time(spell_id),
        }
    }

    pub fn spell_id(&self) -> u32 {
        self.spell_id
    }
}

impl CastingStrategy for FixedSpellStrategy {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn pick_spell(&self, _deficit: f64, available_mana: f64, heal_power: f64) -> SpellChoice {
        if self.mana_cost > available_mana {
            return SpellChoice::NONE;
        }
        SpellChoice {
            spell_id:  self.spell_id,
            heal:      self.base_heal + self.coefficient * heal_power,
            mana_cost: self.mana_cost,
            cast_time: self.cast_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_deficit() {
        let s = FixedSpellStrategy::new(SpellTable::builtin(), 10965, &Talents::default());
        let small = s.pick_spell(-10.0, 8_000.0, 0.0);
        let big = s.pick_spell(-10_000.0, 8_000.0, 0.0);
        assert_eq!(small, big);
        assert!((small.heal - 1902.0).abs() < 1e-9);
        assert!((small.cast_time - 2.5).abs() < 1e-9);
    }

    #[test]
    fn unaffordable_returns_none() {
        let s = FixedSpellStrategy::new(SpellTable::builtin(), 10965, &Talents::default());
        assert_eq!(s.pick_spell(-1_000.0, 654.0, 0.0), SpellChoice::NONE);
        assert_ne!(s.pick_spell(-1_000.0, 655.0, 0.0), SpellChoice::NONE);
    }

    #[test]
    fn talents_reduce_cost() {
        let s = FixedSpellStrategy::new(SpellTable::builtin(), 10965, &Talents { improved_healing: 3, ..Default::default() });
        let choice = s.pick_spell(-1_000.0, 8_000.0, 0.0);
        assert!((choice.mana_cost - 655.0 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn unknown_spell_never_heals() {
        let s = FixedSpellStrategy::new(SpellTable::builtin(), 1, &Talents::default());
        assert!(!s.pick_spell(-1_000.0, 8_000.0, 1_000.0).is_castable(8_000.0));
    }
}
