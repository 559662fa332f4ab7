/// Per-spell cast efficiency and a +healing estimate for one character.
///
/// `spell_usage` lines completed casts up against the heals the character
/// landed: mana per cast, net heal per cast, heal per mana, crit rate.
/// `estimate_spell_power` works backwards from heal sizes: the median
/// non-crit heal minus the spell's base heal, divided by its coefficient, is
/// the +healing the character was wearing. That number is what
/// `CharacterProfile::heal_power` wants.
use crate::correlator::Correlation;
use crate::event::{CombatEvent, EventKind};
use crate::spells::{short_name, SpellTable, Talents};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CRIT_MULTIPLIER: f64 = 1.5;

/// Heals under this share of the spell's largest heal are taken to have
/// landed on a healing-reduced target and left out of the estimate.
const REDUCED_HEALING_CUTOFF: f64 = 0.75;

/// Holy Nova heals carry a different id from the cast.
const HEAL_TO_CAST_ID: &[(u32, u32)] = &[(27805, 27801)];

fn cast_id(heal_spell_id: u32) -> u32 {
    HEAL_TO_CAST_ID
        .iter()
        .find(|(heal, _)| *heal == heal_spell_id)
        .map_or(heal_spell_id, |(_, cast)| *cast)
}

// ---------------------------------------------------------------------------
// Spell usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellUsage {
    pub spell_id:      u32,
    pub name:          String,
    pub short_name:    String,
    pub casts:         u32,
    pub heals:         u32,
    pub crits:         u32,
    /// Direct heals can crit, periodic ticks cannot.
    pub can_crit:      bool,
    pub mana_per_cast: f64,
    pub gross_heal:    f64,
    pub overheal:      f64,
    pub net_heal:      f64,
}

impl SpellUsage {
    /// Heals without a cast (pre-casts before the slice) count as one cast.
    pub fn net_per_cast(&self) -> f64 {
        if self.casts > 0 { self.net_heal / self.casts as f64 } else { self.net_heal }
    }

    /// Net heal per point of mana; `None` for spells without a known cost.
    pub fn hpm(&self) -> Option<f64> {
        if self.mana_per_cast > 0.0 {
            Some(self.net_per_cast() / self.mana_per_cast)
        } else {
            None
        }
    }

    pub fn crit_rate(&self) -> f64 {
        if self.casts > 0 { self.crits as f64 / self.casts as f64 } else { 0.0 }
    }

    pub fn overheal_fraction(&self) -> f64 {
        if self.gross_heal > 0.0 { self.overheal / self.gross_heal } else { 0.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub casts:      u32,
    pub crits:      u32,
    /// Casts of spells that can crit.
    pub crit_casts: u32,
    pub mana:       f64,
    pub gross_heal: f64,
    pub overheal:   f64,
    pub net_heal:   f64,
}

impl UsageTotals {
    pub fn hpm(&self) -> f64 {
        if self.mana > 0.0 { self.net_heal / self.mana } else { 0.0 }
    }

    pub fn crit_rate(&self) -> f64 {
        if self.crit_casts > 0 { self.crits as f64 / self.crit_casts as f64 } else { 0.0 }
    }

    pub fn hps(&self, duration_secs: f64) -> f64 {
        if duration_secs > 0.0 { self.net_heal / duration_secs } else { 0.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellUsageReport {
    pub source: String,
    /// Sorted by spell name.
    pub spells: Vec<SpellUsage>,
    pub total:  UsageTotals,
}

/// Casts and heals of `source`, grouped by spell.
///
/// `spell_power` is taken off every heal and overheal first (×1.5 on crits),
/// the same adjustment the overheal table makes. Spells with neither healing
/// nor a known mana cost (buffs, trinkets) are left out.
pub fn spell_usage(
    correlation: &Correlation,
    events: &[CombatEvent],
    table: &SpellTable,
    talents: &Talents,
    source: &str,
    spell_power: f64,
) -> SpellUsageReport {
    let mut by_spell: BTreeMap<u32, SpellUsage> = BTreeMap::new();

    for cast in correlation.casts_by(source).filter(|c| c.is_completed()) {
        by_spell.entry(cast.spell_id).or_default().casts += 1;
    }

    for event in events.iter().filter(|e| e.source == source) {
        let (info, can_crit) = match &event.kind {
            EventKind::Heal(info) => (info, true),
            EventKind::PeriodicHeal(info) => (info, false),
            _ => continue,
        };
        let spell_id = cast_id(event.spell_id);
        let usage = by_spell.entry(spell_id).or_default();
        usage.heals += 1;
        usage.can_crit |= can_crit;

        let mut bonus = spell_power * table.coefficient(spell_id);
        if info.is_crit {
            usage.crits += 1;
            bonus *= CRIT_MULTIPLIER;
        }
        let heal = (info.gross_amount as f64 - bonus).max(0.0);
        let over = (info.over_amount as f64 - bonus).max(0.0);
        usage.gross_heal += heal;
        usage.overheal += over;
        usage.net_heal += heal - over;
    }

    let mut report = SpellUsageReport { source: source.to_owned(), ..Default::default() };

    for (spell_id, mut usage) in by_spell {
        let mana = match table.get(spell_id) {
            Some(_) => table.mana_cost(spell_id, talents),
            None => 0.0,
        };
        if usage.gross_heal == 0.0 && mana == 0.0 {
            continue;
        }

        let name = table.name(spell_id);
        usage.spell_id = spell_id;
        usage.short_name = short_name(&name);
        usage.name = name;
        usage.mana_per_cast = mana;

        let total = &mut report.total;
        total.casts += usage.casts;
        total.crits += usage.crits;
        if usage.can_crit {
            total.crit_casts += usage.casts;
        }
        total.mana += usage.casts as f64 * mana;
        total.gross_heal += usage.gross_heal;
        total.overheal += usage.overheal;
        total.net_heal += usage.net_heal;

        report.spells.push(usage);
    }

    report.spells.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!("{}: {} spells, {} casts", source, report.spells.len(), report.total.casts);
    report
}

// ---------------------------------------------------------------------------
// Spell power estimate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellPowerEstimate {
    pub spell_id:    u32,
    pub name:        String,
    pub short_name:  String,
    pub heals:       u32,
    pub crits:       u32,
    /// Heals kept after dropping healing-reduced ones.
    pub samples:     usize,
    /// After Spiritual Healing.
    pub base_heal:   f64,
    pub median_heal: f64,
    /// 0 when the base heal is unknown.
    pub extra_heal:  f64,
    /// 0 when the base heal or the coefficient is unknown.
    pub spell_power: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellPowerReport {
    pub spells:      Vec<SpellPowerEstimate>,
    /// Crit share over all direct heals.
    pub crit_rate:   f64,
    /// Sample-weighted mean over the spells with a usable estimate.
    pub spell_power: Option<f64>,
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Estimate the +healing of `source` from its direct heals.
///
/// Crits are scaled back down by 1.5 before taking the median. Periodic
/// ticks are not used: the spell table holds their total, not the tick.
pub fn estimate_spell_power(
    events: &[CombatEvent],
    table: &SpellTable,
    source: &str,
    talents: &Talents,
) -> SpellPowerReport {
    let mut by_spell: BTreeMap<u32, (Vec<f64>, u32)> = BTreeMap::new();

    for event in events.iter().filter(|e| e.source == source) {
        let EventKind::Heal(info) = &event.kind else { continue };
        let (heals, crits) = by_spell.entry(event.spell_id).or_default();
        let mut heal = info.gross_amount as f64;
        if info.is_crit {
            heal /= CRIT_MULTIPLIER;
            *crits += 1;
        }
        heals.push(heal);
    }

    let mut report = SpellPowerReport::default();
    let (mut total_heals, mut total_crits) = (0u32, 0u32);
    let (mut weighted, mut weight) = (0.0, 0usize);

    for (spell_id, (heals, crits)) in by_spell {
        total_heals += heals.len() as u32;
        total_crits += crits;

        let largest = heals.iter().copied().fold(0.0, f64::max);
        let mut kept: Vec<f64> = heals.iter().copied().filter(|h| *h > REDUCED_HEALING_CUTOFF * largest).collect();
        if kept.is_empty() {
            continue;
        }
        kept.sort_by(|a, b| a.total_cmp(b));
        let median_heal = median(&kept);

        let base_heal = table.base_heal(spell_id) * talents.heal_multiplier();
        let coefficient = table.coefficient(spell_id);
        let extra_heal = if base_heal > 0.0 { median_heal - base_heal } else { 0.0 };
        let spell_power = if base_heal > 0.0 && coefficient > 0.0 { extra_heal / coefficient } else { 0.0 };

        if base_heal > 0.0 && coefficient > 0.0 {
            weighted += spell_power * kept.len() as f64;
            weight += kept.len();
        }

        let name = table.name(spell_id);
        report.spells.push(SpellPowerEstimate {
            spell_id,
            short_name: short_name(&name),
            name,
            heals: heals.len() as u32,
            crits,
            samples: kept.len(),
            base_heal,
            median_heal,
            extra_heal,
            spell_power,
        });
    }

    if total_heals > 0 {
        report.crit_rate = total_crits as f64 / total_heals as f64;
    }
    if weight > 0 {
        report.spell_power = Some(weighted / weight as f64);
    }
    report
}
