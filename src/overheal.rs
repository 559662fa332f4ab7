/// Per-spell overheal statistics.
///
/// Heals are grouped by spell id, direct and periodic separately. With a
/// `spell_power` above zero the +healing contribution (`coefficient × spell
/// power`, ×1.5 on crits) is taken off both the heal and the overheal first,
/// which answers "how much would I overheal with this much less gear".
use crate::event::{CombatEvent, EventKind};
use crate::spells::SpellTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CRIT_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Default)]
pub struct OverhealFilter<'a> {
    /// Only heals cast by this character.
    pub source:      Option<&'a str>,
    /// Only this spell.
    pub spell_id:    Option<u32>,
    pub ignore_crit: bool,
    pub spell_power: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverhealStats {
    pub heals:             u32,
    /// Heals with any overheal.
    pub any_overheals:     u32,
    /// Overheal ≥ half the heal.
    pub half_overheals:    u32,
    /// Nothing landed.
    pub full_overheals:    u32,
    pub amount_healed:     f64,
    pub amount_overhealed: f64,
    /// Heals dropped because the spell power adjustment made them negative.
    pub skipped:           u32,
}

impl OverhealStats {
    fn add(&mut self, heal: f64, overheal: f64) {
        self.heals += 1;
        if overheal == heal {
            self.full_overheals += 1;
            self.half_overheals += 1;
            self.any_overheals += 1;
        } else if overheal >= 0.5 * heal {
            self.half_overheals += 1;
            self.any_overheals += 1;
        } else if overheal > 0.0 {
            self.any_overheals += 1;
        }
        self.amount_healed += heal;
        self.amount_overhealed += overheal;
    }

    fn merge(&mut self, other: &OverhealStats) {
        self.heals += other.heals;
        self.any_overheals += other.any_overheals;
        self.half_overheals += other.half_overheals;
        self.full_overheals += other.full_overheals;
        self.amount_healed += other.amount_healed;
        self.amount_overhealed += other.amount_overhealed;
        self.skipped += other.skipped;
    }

    fn fraction(&self, count: u32) -> f64 {
        if self.heals == 0 { 0.0 } else { count as f64 / self.heals as f64 }
    }

    pub fn under_heals(&self) -> u32 {
        self.heals - self.any_overheals
    }

    pub fn no_overheal_fraction(&self) -> f64 {
        self.fraction(self.under_heals())
    }

    pub fn any_overheal_fraction(&self) -> f64 {
        self.fraction(self.any_overheals)
    }

    pub fn half_overheal_fraction(&self) -> f64 {
        self.fraction(self.half_overheals)
    }

    pub fn full_overheal_fraction(&self) -> f64 {
        self.fraction(self.full_overheals)
    }

    /// Share of healing done that was overheal.
    pub fn overheal_fraction(&self) -> f64 {
        if self.amount_healed > 0.0 {
            self.amount_overhealed / self.amount_healed
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellOverheal {
    pub spell_id:   u32,
    pub name:       String,
    pub short_name: String,
    pub stats:      OverhealStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverhealTable {
    pub spells: Vec<SpellOverheal>,
    pub total:  OverhealStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverhealReport {
    pub direct:   OverhealTable,
    pub periodic: OverhealTable,
}

/// (heal, overheal, crit)
type HealSample = (f64, f64, bool);

fn aggregate(grouped: BTreeMap<u32, Vec<HealSample>>, table: &SpellTable, spell_power: f64) -> OverhealTable {
    let mut result = OverhealTable::default();

    for (spell_id, samples) in grouped {
        let coefficient = table.coefficient(spell_id);
        let mut stats = OverhealStats::default();

        for (heal, overheal, crit) in samples {
            let mut bonus = coefficient * spell_power;
            if crit {
                bonus *= CRIT_MULTIPLIER;
            }
            let heal = heal - bonus;
            let overheal = (overheal - bonus).max(0.0);

            // Healing-reduced targets can end up here.
            if heal < 0.0 {
                stats.skipped += 1;
                continue;
            }
            stats.add(heal, overheal);
        }

        result.total.merge(&stats);
        let name = table.name(spell_id);
        result.spells.push(SpellOverheal {
            spell_id,
            short_name: crate::spells::short_name(&name),
            name,
            stats,
        });
    }

    result
}

pub fn overheal_report(events: &[CombatEvent], table: &SpellTable, filter: &OverhealFilter) -> OverhealReport {
    let mut direct: BTreeMap<u32, Vec<HealSample>> = BTreeMap::new();
    let mut periodic: BTreeMap<u32, Vec<HealSample>> = BTreeMap::new();

    for event in events {
        if filter.source.map_or(false, |s| event.source != s) {
            continue;
        }
        if filter.spell_id.map_or(false, |id| event.spell_id != id) {
            continue;
        }
        let (bucket, info) = match &event.kind {
            EventKind::Heal(info) => (&mut direct, info),
            EventKind::PeriodicHeal(info) => (&mut periodic, info),
            _ => continue,
        };
        if filter.ignore_crit && info.is_crit {
            continue;
        }
        bucket
            .entry(event.spell_id)
            .or_default()
            .push((info.gross_amount as f64, info.over_amount as f64, info.is_crit));
    }

    OverhealReport {
        direct:   aggregate(direct, table, filter.spell_power),
        periodic: aggregate(periodic, table, filter.spell_power),
    }
}
