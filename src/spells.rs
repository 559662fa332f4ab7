/// Spell attribute library: embedded at compile time from `data/spells/*.toml`.
///
/// Combat logs routinely reference spells outside the maintained table (other
/// classes, trinkets, consumables), so every lookup degrades to a sentinel
/// value and a warning instead of failing. Embedding the files at compile time
/// means no runtime path resolution is needed.
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Embedded TOML data
// ---------------------------------------------------------------------------

const PRIEST: &str = include_str!("../data/spells/priest.toml");

static ALL_SPELL_DATA: &[&str] = &[PRIEST];

static BUILTIN: Lazy<SpellTable> = Lazy::new(|| {
    let mut table = SpellTable::default();
    for toml_str in ALL_SPELL_DATA {
        match SpellTable::from_toml(toml_str) {
            Ok(parsed) => table.spells.extend(parsed.spells),
            Err(e) => tracing::warn!("Failed to parse spell TOML: {}", e),
        }
    }
    tracing::debug!("Loaded {} spells", table.spells.len());
    table
});

/// Families whose mana cost Improved Healing reduces.
const IMPROVED_HEALING_FAMILIES: &[&str] = &["Lesser Heal", "Heal", "Greater Heal"];
const IMPROVED_HEALING_PER_POINT: f64 = 0.05;
const IMPROVED_HEALING_MAX_POINTS: u8 = 3;
const SPIRITUAL_HEALING_PER_POINT: f64 = 0.02;
const SPIRITUAL_HEALING_MAX_POINTS: u8 = 5;

// ---------------------------------------------------------------------------
// TOML deserialization structs (private)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TomlFile {
    #[allow(dead_code)]
    class: Option<TomlClass>,
    #[serde(default)]
    spell: Vec<SpellInfo>,
}

#[derive(Deserialize)]
struct TomlClass {
    #[allow(dead_code)]
    name: String,
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellInfo {
    pub id:          u32,
    pub name:        String,
    pub family:      String,
    pub base_heal:   f64,
    pub coefficient: f64,
    pub mana:        f64,
    /// Seconds; 0 for instants.
    pub cast_time:   f64,
}

/// Talent points that change spell costs and heal sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talents {
    /// Improved Healing, 0–3 points.
    #[serde(default)]
    pub improved_healing:  u8,
    /// Spiritual Healing, 0–5 points.
    #[serde(default)]
    pub spiritual_healing: u8,
}

impl Talents {
    /// Multiplier Spiritual Healing puts on base heals (+2 % per point).
    pub fn heal_multiplier(&self) -> f64 {
        let points = self.spiritual_healing.min(SPIRITUAL_HEALING_MAX_POINTS);
        1.0 + SPIRITUAL_HEALING_PER_POINT * points as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpellTable {
    spells: HashMap<u32, SpellInfo>,
}

impl SpellTable {
    /// The table built from the embedded spell files.
    pub fn builtin() -> &'static SpellTable {
        &BUILTIN
    }

    pub fn from_toml(raw: &str) -> Result<SpellTable, toml::de::Error> {
        let file: TomlFile = toml::from_str(raw)?;
        Ok(SpellTable {
            spells: file.spell.into_iter().map(|s| (s.id, s)).collect(),
        })
    }

    pub fn get(&self, spell_id: u32) -> Option<&SpellInfo> {
        self.spells.get(&spell_id)
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }

    fn lookup(&self, spell_id: u32, what: &str) -> Option<&SpellInfo> {
        let found = self.get(spell_id);
        if found.is_none() {
            tracing::warn!("No {} for spell id {}", what, spell_id);
        }
        found
    }

    /// Spell name including rank, or `"[Unknown <id>]"`.
    pub fn name(&self, spell_id: u32) -> String {
        self.lookup(spell_id, "name")
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("[Unknown {}]", spell_id))
    }

    /// Share of +healing the spell receives; 0 when unknown.
    pub fn coefficient(&self, spell_id: u32) -> f64 {
        self.lookup(spell_id, "coefficient").map(|s| s.coefficient).unwrap_or(0.0)
    }

    pub fn base_heal(&self, spell_id: u32) -> f64 {
        self.lookup(spell_id, "base heal").map(|s| s.base_heal).unwrap_or(0.0)
    }

    /// Mana cost after talents; 0 when unknown.
    pub fn mana_cost(&self, spell_id: u32, talents: &Talents) -> f64 {
        let Some(spell) = self.lookup(spell_id, "mana cost") else {
            return 0.0;
        };
        if IMPROVED_HEALING_FAMILIES.contains(&spell.family.as_str()) {
            let points = talents.improved_healing.min(IMPROVED_HEALING_MAX_POINTS);
            spell.mana * (1.0 - IMPROVED_HEALING_PER_POINT * points as f64)
        } else {
            spell.mana
        }
    }

    /// Cast time in seconds; 0 when unknown, which strategies treat as uncastable.
    pub fn cast_time(&self, spell_id: u32) -> f64 {
        self.lookup(spell_id, "cast time").map(|s| s.cast_time).unwrap_or(0.0)
    }

    /// Average heal before crits: base heal plus the +healing contribution.
    pub fn expected_heal(&self, spell_id: u32, heal_power: f64) -> f64 {
        self.base_heal(spell_id) + self.coefficient(spell_id) * heal_power
    }
}

/// Compact label for charts and tables.
///
///   "Flash Heal (Rank 7)" → "FH7"
///   "Renew"               → "R"
///   "[Unknown 12345]"     → "12345"
pub fn short_name(spell_name: &str) -> String {
    let parts: Vec<&str> = spell_name.split_whitespace().collect();
    if spell_name.contains('[') {
        let tag = parts.get(1).copied().unwrap_or(spell_name);
        tag.trim_end_matches(']').to_owned()
    } else if spell_name.contains('(') && parts.len() >= 2 {
        let initials: String = parts[..parts.len() - 2].iter().filter_map(|p| p.chars().next()).collect();
        let rank = parts[parts.len() - 1].trim_end_matches(')');
        format!("{}{}", initials, rank)
    } else {
        parts.iter().filter_map(|p| p.chars().next()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_loads() {
        let table = SpellTable::builtin();
        assert!(table.len() >= 20);
        assert_eq!(table.name(10917), "Flash Heal (Rank 7)");
        assert!((table.coefficient(2060) - 0.857).abs() < 1e-9);
        assert!((table.cast_time(10917) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_spell_degrades_to_sentinels() {
        let table = SpellTable::builtin();
        assert_eq!(table.name(1), "[Unknown 1]");
        assert_eq!(table.coefficient(1), 0.0);
        assert_eq!(table.base_heal(1), 0.0);
        assert_eq!(table.mana_cost(1, &Talents::default()), 0.0);
        assert_eq!(table.cast_time(1), 0.0);
    }

    #[test]
    fn improved_healing_discounts_heal_families_only() {
        let table = SpellTable::builtin();
        let talents = Talents { improved_healing: 3, ..Default::default() };
        assert!((table.mana_cost(2060, &talents) - 370.0 * 0.85).abs() < 1e-9);
        assert!((table.mana_cost(10917, &talents) - 380.0).abs() < 1e-9);

        let overspent = Talents { improved_healing: 9, ..Default::default() };
        assert!((table.mana_cost(2060, &overspent) - 370.0 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn spiritual_healing_scales_base_heals() {
        assert_eq!(Talents::default().heal_multiplier(), 1.0);
        let talents = Talents { spiritual_healing: 5, ..Default::default() };
        assert!((talents.heal_multiplier() - 1.1).abs() < 1e-9);
        let overspent = Talents { spiritual_healing: 8, ..Default::default() };
        assert!((overspent.heal_multiplier() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn expected_heal_adds_heal_power() {
        let table = SpellTable::builtin();
        let heal = table.expected_heal(10917, 1000.0);
        assert!((heal - (885.0 + 429.0)).abs() < 1e-9);
    }

    #[test]
    fn parses_custom_table() {
        let raw = r#"
            [[spell]]
            id = 1
            name = "Test Heal (Rank 1)"
            family = "Test Heal"
            base_heal = 100.0
            coefficient = 0.5
            mana = 50.0
            cast_time = 2.0
        "#;
        let table = SpellTable::from_toml(raw).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.expected_heal(1, 100.0), 150.0);
    }

    #[test]
    fn short_names() {
        assert_eq!(short_name("Flash Heal (Rank 7)"), "FH7");
        assert_eq!(short_name("Greater Heal (Rank 4)"), "GH4");
        assert_eq!(short_name("Renew"), "R");
        assert_eq!(short_name("[Unknown 12345]"), "12345");
    }
}
