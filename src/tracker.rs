/// Raid health-deficit tracker: replays heal and damage events into a
/// per-unit "health missing" timeline.
///
/// Deficits are ≤ 0 (0 = full health). Each heal or damage event moves the
/// target's deficit by a net amount bounded so the unit never goes above full.
/// An overheal in the log proves the unit was topped off, so the deficit snaps
/// back to 0. Killing blows freeze the unit's deficit until it shows up again
/// at a later timestamp (soulstone, ankh, battle rez).
///
/// Passing `exclude_source` discards every heal from that character, which
/// gives the raid damage profile "as if this healer wasn't there" for the
/// simulator to heal against.
use crate::error::TrackError;
use crate::event::{ensure_ordered, CombatEvent, EventKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDeficitState {
    pub deficit:  i64,
    pub is_dead:  bool,
    pub death_ms: Option<u64>,
}

/// One replayed event and the raid state right after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub time_ms:           u64,
    pub unit_id:           String,
    /// Deficit change actually applied to the unit by this event.
    pub net:               i64,
    /// The unit's deficit after the event (frozen value while dead).
    pub deficit:           i64,
    pub health_pct:        Option<u8>,
    /// Max-health estimate from deficit and health %, when below 100 %.
    pub health_estimate:   Option<f64>,
    /// Deficit per unit; dead units read 0.
    pub per_unit:          BTreeMap<String, i64>,
    /// Sum of live units' deficits.
    pub aggregate_deficit: i64,
    /// Sum of dead units' deficits.
    pub min_deficit:       i64,
}

impl TimelineEntry {
    pub fn seconds(&self) -> f64 {
        self.time_ms as f64 / 1_000.0
    }
}

/// A single unit's view of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSample {
    pub time_ms:         u64,
    pub net:             i64,
    pub deficit:         i64,
    pub health_pct:      Option<u8>,
    pub health_estimate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerDiagnostics {
    pub deaths:              usize,
    pub revivals:            usize,
    /// Events on a dead unit at or before its death time.
    pub frozen_events:       usize,
    pub stray_resurrections: usize,
    /// Health events without a target unit.
    pub skipped_events:      usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaidTimeline {
    pub entries:     Vec<TimelineEntry>,
    /// unit id -> display name
    pub names:       BTreeMap<String, String>,
    pub final_state: BTreeMap<String, UnitDeficitState>,
    pub diagnostics: TrackerDiagnostics,
}

impl RaidTimeline {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn name<'a>(&'a self, unit_id: &'a str) -> &'a str {
        self.names.get(unit_id).map(String::as_str).unwrap_or(unit_id)
    }

    pub fn unit_history(&self, unit_id: &str) -> Vec<UnitSample> {
        self.entries
            .iter()
            .filter(|e| e.unit_id == unit_id)
            .map(|e| UnitSample {
                time_ms:         e.time_ms,
                net:             e.net,
                deficit:         e.deficit,
                health_pct:      e.health_pct,
                health_estimate: e.health_estimate,
            })
            .collect()
    }

    /// Largest raid-wide deficit seen during the encounter (most negative).
    pub fn worst_aggregate_deficit(&self) -> i64 {
        self.entries.iter().map(|e| e.aggregate_deficit).min().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Signed amounts for one health-changing event.
struct HealthChange {
    gross:      i64,
    over:       i64,
    overkill:   i64,
    health_pct: u8,
}

impl HealthChange {
    fn from_event(event: &CombatEvent) -> Option<Self> {
        match &event.kind {
            EventKind::Heal(h) | EventKind::PeriodicHeal(h) => Some(Self {
                gross:      h.gross_amount,
                over:       h.over_amount,
                overkill:   0,
                health_pct: h.health_pct_after,
            }),
            EventKind::Damage(d) => Some(Self {
                gross:      d.gross_amount,
                over:       d.mitigated,
                overkill:   d.overkill,
                health_pct: d.health_pct,
            }),
            _ => None,
        }
    }

    fn is_overheal(&self) -> bool {
        self.gross > 0 && self.over > 0
    }

    /// Net change before exclusion and clamping. Overkill never counts
    /// against health; mitigated damage is removed.
    fn net(&self, deficit: i64) -> i64 {
        let mut gross = self.gross;
        if self.overkill < 0 {
            gross -= self.overkill;
        }
        if gross > 0 {
            gross.min(-deficit)
        } else {
            (gross - self.over).min(-deficit)
        }
    }
}

fn health_estimate(deficit: i64, health_pct: u8) -> Option<f64> {
    if health_pct < 100 {
        Some(-deficit as f64 / (1.0 - health_pct as f64 / 100.0))
    } else {
        None
    }
}

struct Tracker<'a> {
    exclude_source: Option<&'a str>,
    units:          BTreeMap<String, UnitDeficitState>,
    names:          BTreeMap<String, String>,
    /// Resurrections seen on units that were not dead, by unit id.
    stray_rez:      HashMap<String, u64>,
    entries:        Vec<TimelineEntry>,
    diagnostics:    TrackerDiagnostics,
}

impl<'a> Tracker<'a> {
    fn new(exclude_source: Option<&'a str>) -> Self {
        Self {
            exclude_source,
            units:       BTreeMap::new(),
            names:       BTreeMap::new(),
            stray_rez:   HashMap::new(),
            entries:     Vec::new(),
            diagnostics: TrackerDiagnostics::default(),
        }
    }

    fn register(&mut self, event: &CombatEvent) {
        self.units.entry(event.target_id.clone()).or_default();
        self.names
            .entry(event.target_id.clone())
            .or_insert_with(|| event.target.clone());
    }

    fn apply(&mut self, event: &CombatEvent) -> Result<(), TrackError> {
        if event.target_id.is_empty() {
            if event.touches_health() {
                self.diagnostics.skipped_events += 1;
            }
            return Ok(());
        }

        match &event.kind {
            EventKind::UnitDied => self.on_death(event),
            EventKind::Resurrect => {
                self.on_resurrect(event);
                Ok(())
            }
            _ => {
                if let Some(change) = HealthChange::from_event(event) {
                    self.on_health(event, change);
                }
                Ok(())
            }
        }
    }

    fn on_health(&mut self, event: &CombatEvent, change: HealthChange) {
        self.register(event);
        let t = event.timestamp_ms;
        let stray = self.stray_rez.remove(&event.target_id);

        let Some(state) = self.units.get_mut(&event.target_id) else {
            return;
        };

        if state.is_dead {
            match state.death_ms {
                Some(death_ms) if t > death_ms => {
                    tracing::debug!(
                        "{} active again at {}ms after dying at {}ms, assuming a resurrection",
                        event.target, t, death_ms
                    );
                    state.is_dead = false;
                    state.death_ms = None;
                    self.diagnostics.revivals += 1;
                }
                _ => {
                    self.diagnostics.frozen_events += 1;
                    let deficit = state.deficit;
                    self.push_entry(event, 0, deficit, Some(change.health_pct));
                    return;
                }
            }
        }

        let excluded = self.exclude_source.map_or(false, |s| event.source == s);
        let mut net = change.net(state.deficit);
        if excluded {
            net = net.min(0);
        }

        let before = state.deficit;
        let mut deficit = before + net;
        if change.is_overheal() && !excluded {
            deficit = 0;
        }
        deficit = deficit.min(0);
        state.deficit = deficit;

        if change.overkill < 0 {
            // A killing blow after a stray rez is a fresh death; the unit
            // most likely died before the slice started.
            if let Some(rez_ms) = stray {
                tracing::debug!("{} killed at {}ms after a stray rez at {}ms", event.target, t, rez_ms);
            }
            tracing::debug!("{} died at {}ms with {} deficit, {} overkill", event.target, t, deficit, -change.overkill);
            state.is_dead = true;
            state.death_ms = Some(t);
            self.diagnostics.deaths += 1;
        }

        self.push_entry(event, deficit - before, deficit, Some(change.health_pct));
    }

    fn on_death(&mut self, event: &CombatEvent) -> Result<(), TrackError> {
        self.register(event);
        let t = event.timestamp_ms;

        if let Some(rez_ms) = self.stray_rez.remove(&event.target_id) {
            return Err(TrackError::ResurrectBeforeDeath {
                unit:         event.target.clone(),
                resurrect_ms: rez_ms,
                death_ms:     t,
            });
        }

        let Some(state) = self.units.get_mut(&event.target_id) else {
            return Ok(());
        };
        // Already dead from the killing blow.
        if state.is_dead {
            return Ok(());
        }
        state.is_dead = true;
        state.death_ms = Some(t);
        self.diagnostics.deaths += 1;

        let deficit = state.deficit;
        self.push_entry(event, 0, deficit, None);
        Ok(())
    }

    fn on_resurrect(&mut self, event: &CombatEvent) {
        self.register(event);
        let t = event.timestamp_ms;
        let Some(state) = self.units.get_mut(&event.target_id) else {
            return;
        };

        match (state.is_dead, state.death_ms) {
            (true, Some(death_ms)) if t > death_ms => {
                state.is_dead = false;
                state.death_ms = None;
                self.diagnostics.revivals += 1;
                let deficit = state.deficit;
                self.push_entry(event, 0, deficit, None);
            }
            (true, _) => {
                // Same tick as the death; the next later event revives.
                self.diagnostics.frozen_events += 1;
            }
            _ => {
                tracing::warn!("{} resurrected at {}ms without a recorded death", event.target, t);
                self.diagnostics.stray_resurrections += 1;
                self.stray_rez.insert(event.target_id.clone(), t);
            }
        }
    }

    fn push_entry(&mut self, event: &CombatEvent, net: i64, deficit: i64, health_pct: Option<u8>) {
        let mut per_unit = BTreeMap::new();
        let mut aggregate_deficit = 0;
        let mut min_deficit = 0;
        for (id, state) in &self.units {
            if state.is_dead {
                min_deficit += state.deficit;
                per_unit.insert(id.clone(), 0);
            } else {
                aggregate_deficit += state.deficit;
                per_unit.insert(id.clone(), state.deficit);
            }
        }

        self.entries.push(TimelineEntry {
            time_ms: event.timestamp_ms,
            unit_id: event.target_id.clone(),
            net,
            deficit,
            health_pct,
            health_estimate: health_pct.and_then(|pct| health_estimate(deficit, pct)),
            per_unit,
            aggregate_deficit,
            min_deficit,
        });
    }
}

/// Replay `events` into a deficit timeline. The input is left untouched, so
/// the same events can be tracked again with a different `exclude_source`.
pub fn track(events: &[CombatEvent], exclude_source: Option<&str>) -> Result<RaidTimeline, TrackError> {
    ensure_ordered(events)?;

    let mut tracker = Tracker::new(exclude_source);
    for event in events {
        tracker.apply(event)?;
    }

    tracing::debug!(
        "Tracked {} units over {} entries ({:?})",
        tracker.units.len(),
        tracker.entries.len(),
        tracker.diagnostics
    );

    Ok(RaidTimeline {
        entries:     tracker.entries,
        names:       tracker.names,
        final_state: tracker.units,
        diagnostics: tracker.diagnostics,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::fixtures::*;

    const FH: u32 = 10917;

    #[test]
    fn overheal_snaps_deficit_to_zero() {
        let events = vec![
            damage(0, "Boss", "Tank", -1000, 0, 0),
            heal(1000, "Saintis", "Tank", FH, 1200, 300),
        ];
        let timeline = track(&events, None).unwrap();

        assert_eq!(timeline.entries[0].deficit, -1000);
        assert_eq!(timeline.entries[1].net, 1000);
        assert_eq!(timeline.entries[1].deficit, 0);
        assert_eq!(timeline.final_state["Player-Tank"].deficit, 0);
    }

    #[test]
    fn mitigated_damage_does_not_count() {
        let events = vec![damage(0, "Boss", "Tank", -1000, -400, 0)];
        let timeline = track(&events, None).unwrap();
        assert_eq!(timeline.entries[0].net, -600);
    }

    #[test]
    fn full_health_unit_cannot_gain() {
        let events = vec![heal(0, "Saintis", "Tank", FH, 900, 0)];
        let timeline = track(&events, None).unwrap();
        assert_eq!(timeline.entries[0].net, 0);
        assert_eq!(timeline.entries[0].deficit, 0);
    }

    #[test]
    fn deficits_stay_bounded_and_dead_units_read_zero() {
        let events = vec![
            damage(0, "Boss", "Tank", -3000, 0, 0),
            damage(100, "Boss", "Mage", -2000, 0, 0),
            heal(500, "Saintis", "Tank", FH, 5000, 0),
            damage(600, "Boss", "Mage", -4000, 0, -50),
            heal(600, "Saintis", "Mage", FH, 900, 0),
        ];
        let timeline = track(&events, None).unwrap();

        for entry in &timeline.entries {
            assert!(entry.per_unit.values().all(|d| *d <= 0));
            assert!(entry.deficit <= 0);
        }
        let last = timeline.entries.last().unwrap();
        assert_eq!(last.per_unit["Player-Mage"], 0);
        assert_eq!(last.min_deficit, -5950);
        assert_eq!(last.aggregate_deficit, 0);
        assert_eq!(timeline.diagnostics.frozen_events, 1);
    }

    #[test]
    fn net_sums_to_final_deficit_for_every_prefix() {
        let events = vec![
            damage(0, "Boss", "Tank", -3000, -500, 0),
            heal(500, "Saintis", "Tank", FH, 1200, 0),
            heal(900, "Olive", "Tank", FH, 2000, 600),
            damage(1000, "Boss", "Tank", -800, 0, 0),
            heal(1300, "Saintis", "Tank", FH, 300, 0),
            damage(1500, "Boss", "Tank", -9000, 0, -200),
        ];
        for n in 1..=events.len() {
            let timeline = track(&events[..n], None).unwrap();
            let net: i64 = timeline.entries.iter().map(|e| e.net).sum();
            assert_eq!(net, timeline.final_state["Player-Tank"].deficit, "prefix {}", n);
        }
    }

    #[test]
    fn overkill_excluded_from_gross() {
        let events = vec![damage(0, "Boss", "Mage", -1000, 0, -50)];
        let timeline = track(&events, None).unwrap();
        assert_eq!(timeline.entries[0].net, -950);
        assert!(timeline.final_state["Player-Mage"].is_dead);
        assert_eq!(timeline.entries[0].min_deficit, -950);
    }

    #[test]
    fn later_event_revives_dead_unit() {
        let events = vec![
            damage(0, "Boss", "Mage", -2000, 0, -50),
            damage(0, "Boss", "Mage", -300, 0, 0),
            heal(10_000, "Saintis", "Mage", FH, 500, 0),
        ];
        let timeline = track(&events, None).unwrap();

        // Same-tick damage is frozen.
        assert_eq!(timeline.entries[1].net, 0);
        assert_eq!(timeline.entries[1].min_deficit, -1950);

        let revived = &timeline.entries[2];
        assert_eq!(revived.min_deficit, 0);
        assert_eq!(revived.net, 500);
        assert_eq!(revived.per_unit["Player-Mage"], -1450);

        let state = &timeline.final_state["Player-Mage"];
        assert!(!state.is_dead);
        assert_eq!(timeline.diagnostics.revivals, 1);
        assert_eq!(timeline.diagnostics.frozen_events, 1);
    }

    #[test]
    fn unit_died_and_resurrect_toggle_dead_flag() {
        let events = vec![
            damage(0, "Boss", "Priest", -700, 0, 0),
            died(100, "Priest"),
            resurrect(5000, "Saintis", "Priest"),
        ];
        let timeline = track(&events, None).unwrap();
        assert_eq!(timeline.entries[1].min_deficit, -700);
        assert_eq!(timeline.entries[1].per_unit["Player-Priest"], 0);
        assert_eq!(timeline.entries[2].min_deficit, 0);
        assert_eq!(timeline.entries[2].aggregate_deficit, -700);
    }

    #[test]
    fn resurrect_before_death_is_rejected() {
        let events = vec![resurrect(1000, "Saintis", "Priest"), died(2000, "Priest")];
        let err = track(&events, None).unwrap_err();
        assert_eq!(
            err,
            TrackError::ResurrectBeforeDeath { unit: "Priest".into(), resurrect_ms: 1000, death_ms: 2000 }
        );
    }

    #[test]
    fn killing_blow_after_stray_resurrect_is_a_new_death() {
        let events = vec![
            damage(0, "Boss", "Tank", -500, 0, 0),
            resurrect(1000, "Saintis", "Priest"),
            damage(3000, "Boss", "Priest", -1000, 0, -200),
            died(3000, "Priest"),
        ];
        let timeline = track(&events, None).unwrap();
        assert_eq!(timeline.diagnostics.stray_resurrections, 1);
        assert_eq!(timeline.diagnostics.deaths, 1);
        let priest = &timeline.final_state["Player-Priest"];
        assert!(priest.is_dead);
        assert_eq!(priest.death_ms, Some(3000));
        assert_eq!(timeline.entries.last().unwrap().min_deficit, -800);
    }

    #[test]
    fn stray_resurrect_cleared_by_activity() {
        let events = vec![
            resurrect(1000, "Saintis", "Priest"),
            damage(1500, "Boss", "Priest", -300, 0, 0),
            died(2000, "Priest"),
        ];
        let timeline = track(&events, None).unwrap();
        assert_eq!(timeline.diagnostics.stray_resurrections, 1);
        assert!(timeline.final_state["Player-Priest"].is_dead);
    }

    #[test]
    fn excluded_healer_heals_are_discarded() {
        let events = vec![
            damage(0, "Boss", "Tank", -2000, 0, 0),
            heal(500, "Saintis", "Tank", FH, 1200, 0),
            heal(900, "Olive", "Tank", FH, 600, 0),
            heal(1200, "Saintis", "Tank", FH, 1200, 400),
        ];
        let with = track(&events, None).unwrap();
        let without = track(&events, Some("Saintis")).unwrap();

        assert_eq!(with.final_state["Player-Tank"].deficit, 0);
        assert_eq!(without.final_state["Player-Tank"].deficit, -1400);
        assert_eq!(without.entries[1].net, 0);
        assert_eq!(without.entries[3].net, 0);
    }

    #[test]
    fn unit_history_and_health_estimate() {
        let mut hit = damage(0, "Boss", "Tank", -2000, 0, 0);
        if let EventKind::Damage(d) = &mut hit.kind {
            d.health_pct = 80;
        }
        let events = vec![hit, damage(100, "Boss", "Mage", -100, 0, 0)];
        let timeline = track(&events, None).unwrap();

        let history = timeline.unit_history("Player-Tank");
        assert_eq!(history.len(), 1);
        let estimate = history[0].health_estimate.unwrap();
        assert!((estimate - 10_000.0).abs() < 1e-6);
        assert_eq!(timeline.name("Player-Mage"), "Mage");
        assert_eq!(timeline.name("Player-Nobody"), "Player-Nobody");
        assert_eq!(timeline.worst_aggregate_deficit(), -2100);
    }

    #[test]
    fn rerunning_does_not_depend_on_previous_runs() {
        let events = vec![damage(0, "Boss", "Tank", -2000, 0, 0), heal(500, "Saintis", "Tank", FH, 1200, 0)];
        let snapshot = events.clone();
        let first = track(&events, Some("Saintis")).unwrap();
        let _ = track(&events, None).unwrap();
        let again = track(&events, Some("Saintis")).unwrap();
        assert_eq!(first.entries, again.entries);
        assert_eq!(events, snapshot);
    }

    #[test]
    fn out_of_order_events_fail() {
        let events = vec![damage(1000, "Boss", "Tank", -10, 0, 0), damage(10, "Boss", "Tank", -10, 0, 0)];
        assert!(matches!(track(&events, None), Err(TrackError::OutOfOrder(_))));
    }
}
