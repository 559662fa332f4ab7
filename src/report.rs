/// Serializable per-encounter summary: what presentation layers (charts,
/// tables, the JSON dump written by the binary) consume.
use crate::correlator::{CastOutcome, Correlation, CorrelatorDiagnostics};
use crate::overheal::OverhealReport;
use crate::simulator::SimulationResult;
use crate::spell_stats::{SpellPowerReport, SpellUsageReport};
use crate::spells::{short_name, SpellTable};
use crate::tracker::{RaidTimeline, TrackerDiagnostics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Healer,
    Tank,
}

/// Known healers and tanks of the raid, by character name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Roster {
    pub healers: Vec<String>,
    pub tanks:   Vec<String>,
}

impl Roster {
    pub fn role(&self, name: &str) -> Option<Role> {
        if self.tanks.iter().any(|t| t == name) {
            Some(Role::Tank)
        } else if self.healers.iter().any(|h| h == name) {
            Some(Role::Healer)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub completed:           u32,
    pub cancelled:           u32,
    pub interrupted:         u32,
    pub target_already_dead: u32,
    pub source_died:         u32,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: &CastOutcome) {
        match outcome {
            CastOutcome::Completed { .. } => self.completed += 1,
            CastOutcome::Cancelled => self.cancelled += 1,
            CastOutcome::Interrupted => self.interrupted += 1,
            CastOutcome::TargetAlreadyDead => self.target_already_dead += 1,
            CastOutcome::SourceDied => self.source_died += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.completed + self.cancelled + self.interrupted + self.target_already_dead + self.source_died
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceCastSummary {
    pub source:          String,
    pub role:            Option<Role>,
    pub outcomes:        OutcomeCounts,
    /// Completed casts per spell, keyed by short spell name.
    pub spells:          BTreeMap<String, u32>,
    pub matched_heals:   u32,
    pub matched_healing: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDeficitSummary {
    pub unit_id: String,
    pub name:    String,
    pub role:    Option<Role>,
    pub deficit: i64,
    pub is_dead: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeficitSummary {
    pub units:                   Vec<UnitDeficitSummary>,
    pub worst_aggregate_deficit: i64,
    pub final_aggregate_deficit: i64,
    pub final_min_deficit:       i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub strategy:         String,
    pub casts:            u32,
    pub casts_per_minute: f64,
    pub net_healing:      f64,
    pub gross_healing:    f64,
    pub hps:              f64,
    pub regen_mana:       f64,
    pub regen_mp5:        f64,
    pub end_mana:         f64,
}

impl From<&SimulationResult> for SimulationSummary {
    fn from(r: &SimulationResult) -> Self {
        Self {
            strategy:         r.strategy.clone(),
            casts:            r.casts,
            casts_per_minute: r.casts_per_minute(),
            net_healing:      r.net_healing,
            gross_healing:    r.gross_healing,
            hps:              r.hps(),
            regen_mana:       r.regen_mana,
            regen_mp5:        r.regen_mp5(),
            end_mana:         r.end_mana,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub correlator: CorrelatorDiagnostics,
    pub tracker:    TrackerDiagnostics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncounterReport {
    pub boss:          String,
    pub duration_secs: f64,
    /// Character left out of the deficit timeline and simulated instead.
    pub healer:        Option<String>,
    pub casts:         Vec<SourceCastSummary>,
    pub deficits:      DeficitSummary,
    pub simulation:    Option<SimulationSummary>,
    pub sweep:         Vec<SimulationSummary>,
    pub overheal:      OverhealReport,
    /// Per-spell efficiency of `healer`.
    pub spell_usage:   Option<SpellUsageReport>,
    /// +healing of `healer` estimated from its heals.
    pub spell_power:   Option<SpellPowerReport>,
    pub diagnostics:   Diagnostics,
}

impl EncounterReport {
    pub fn new(boss: &str, duration_secs: f64, healer: Option<&str>) -> Self {
        Self {
            boss: boss.to_owned(),
            duration_secs,
            healer: healer.map(str::to_owned),
            ..Default::default()
        }
    }

    pub fn with_casts(mut self, correlation: &Correlation, table: &SpellTable, roster: &Roster) -> Self {
        self.casts = summarize_casts(correlation, table, roster);
        self.diagnostics.correlator = correlation.diagnostics.clone();
        self
    }

    pub fn with_deficits(mut self, timeline: &RaidTimeline, roster: &Roster) -> Self {
        self.deficits = summarize_deficits(timeline, roster);
        self.diagnostics.tracker = timeline.diagnostics.clone();
        self
    }

    pub fn with_simulation(mut self, result: &SimulationResult) -> Self {
        self.simulation = Some(result.into());
        self
    }

    pub fn with_sweep(mut self, results: &[(u32, SimulationResult)]) -> Self {
        self.sweep = results.iter().map(|(_, r)| r.into()).collect();
        self
    }

    pub fn with_overheal(mut self, overheal: OverhealReport) -> Self {
        self.overheal = overheal;
        self
    }

    pub fn with_spell_stats(mut self, usage: SpellUsageReport, spell_power: SpellPowerReport) -> Self {
        self.spell_usage = Some(usage);
        self.spell_power = Some(spell_power);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn summarize_casts(correlation: &Correlation, table: &SpellTable, roster: &Roster) -> Vec<SourceCastSummary> {
    let mut by_source: BTreeMap<&str, SourceCastSummary> = BTreeMap::new();

    for cast in &correlation.casts {
        let summary = by_source.entry(cast.source.as_str()).or_insert_with(|| SourceCastSummary {
            source: cast.source.clone(),
            role: roster.role(&cast.source),
            ..Default::default()
        });
        summary.outcomes.record(&cast.outcome);
        if cast.is_completed() {
            *summary.spells.entry(short_name(&table.name(cast.spell_id))).or_insert(0) += 1;
        }
    }

    for application in &correlation.heal_applications {
        let cast = correlation.cast(application);
        if let Some(summary) = by_source.get_mut(cast.source.as_str()) {
            summary.matched_heals += 1;
            summary.matched_healing += application.net_heal;
        }
    }

    by_source.into_values().collect()
}

pub fn summarize_deficits(timeline: &RaidTimeline, roster: &Roster) -> DeficitSummary {
    let units = timeline
        .final_state
        .iter()
        .map(|(id, state)| {
            let name = timeline.name(id).to_owned();
            UnitDeficitSummary {
                unit_id: id.clone(),
                role: roster.role(&name),
                name,
                deficit: state.deficit,
                is_dead: state.is_dead,
            }
        })
        .collect();

    let last = timeline.entries.last();
    DeficitSummary {
        units,
        worst_aggregate_deficit: timeline.worst_aggregate_deficit(),
        final_aggregate_deficit: last.map(|e| e.aggregate_deficit).unwrap_or(0),
        final_min_deficit:       last.map(|e| e.min_deficit).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::correlate;
    use crate::event::fixtures::*;
    use crate::tracker::track;

    fn roster() -> Roster {
        Roster { healers: vec!["Saintis".into()], tanks: vec!["Tank".into()] }
    }

    #[test]
    fn cast_summary_per_source() {
        let events = vec![
            cast_start(0, "Saintis", 10917),
            cast_success(1500, "Saintis", 10917, "Tank"),
            heal(1520, "Saintis", "Tank", 10917, 1000, 250),
            cast_start(2000, "Saintis", 10965),
            cast_start(2000, "Olive", 10965),
            cast_failed(2400, "Saintis", 10965, "Interrupted"),
        ];

        let correlation = correlate(&events, None).unwrap();
        let summary = summarize_casts(&correlation, SpellTable::builtin(), &roster());

        assert_eq!(summary.len(), 2);
        let olive = &summary[0];
        assert_eq!(olive.source, "Olive");
        assert_eq!(olive.role, None);
        assert_eq!(olive.outcomes.cancelled, 1);

        let saintis = &summary[1];
        assert_eq!(saintis.role, Some(Role::Healer));
        assert_eq!(saintis.outcomes.completed, 1);
        assert_eq!(saintis.outcomes.interrupted, 1);
        assert_eq!(saintis.outcomes.total(), 2);
        assert_eq!(saintis.spells.get("FH7"), Some(&1));
        assert_eq!(saintis.matched_heals, 1);
        assert_eq!(saintis.matched_healing, 750);
    }

    #[test]
    fn deficit_summary_and_json() {
        let events = vec![
            damage(0, "Boss", "Tank", -3000, 0, 0),
            damage(100, "Boss", "Mage", -1000, 0, -10),
        ];
        let timeline = track(&events, None).unwrap();
        let report = EncounterReport::new("Patchwerk", 120.0, Some("Saintis")).with_deficits(&timeline, &roster());

        let deficits = &report.deficits;
        assert_eq!(deficits.units.len(), 2);
        assert_eq!(deficits.final_aggregate_deficit, -3000);
        assert_eq!(deficits.final_min_deficit, -990);
        let tank = deficits.units.iter().find(|u| u.name == "Tank").unwrap();
        assert_eq!(tank.role, Some(Role::Tank));
        assert_eq!(report.diagnostics.tracker.deaths, 1);

        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["boss"], "Patchwerk");
        assert_eq!(value["deficits"]["units"][0]["role"], serde_json::Value::Null);
        assert_eq!(value["deficits"]["units"][1]["role"], "tank");
    }
}
