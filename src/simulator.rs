/// Casting-strategy simulator: replays a raid deficit timeline against a
/// virtual healer and measures how much a strategy would have healed.
///
/// The loop advances in steps of `time_step`, shortened to land exactly on a
/// cast completion, the next timeline snapshot, or the end of the encounter:
///
///   resolve pending cast  → crit roll, apply net heal, pay mana
///   pick target           → most negative effective deficit
///   pick spell            → strategy decides, simulator checks affordability
///   advance time + regen  → out-of-combat rate after 5 s without a cast
///
/// Heals landed by the simulated healer are tracked separately from the
/// timeline (`applied_heals`), the timeline itself is never modified.
use crate::error::SimulationError;
use crate::spells::{SpellTable, Talents};
use crate::strategy::{CastingStrategy, FixedSpellStrategy, SpellChoice};
use crate::tracker::RaidTimeline;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_TIME_STEP: f64 = 0.1;
/// Smallest accepted step (1 ms); anything finer stops advancing the clock.
pub const MIN_TIME_STEP: f64 = 0.001;
const CRIT_MULTIPLIER: f64 = 1.5;
/// Seconds after the last completed cast before out-of-combat regen kicks in.
const FIVE_SECOND_RULE: f64 = 5.0;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterProfile {
    pub heal_power:        f64,
    /// Probability in [0, 1].
    pub crit_chance:       f64,
    pub mp5_in_combat:     f64,
    pub mp5_out_of_combat: f64,
    pub max_mana:          f64,
}

impl Default for CharacterProfile {
    fn default() -> Self {
        Self {
            heal_power:        800.0,
            crit_chance:       0.0,
            mp5_in_combat:     40.0,
            mp5_out_of_combat: 200.0,
            max_mana:          8_000.0,
        }
    }
}

impl CharacterProfile {
    pub fn validate(&self) -> Result<(), SimulationError> {
        let non_negative = [
            ("heal_power", self.heal_power),
            ("mp5_in_combat", self.mp5_in_combat),
            ("mp5_out_of_combat", self.mp5_out_of_combat),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0) {
                return Err(SimulationError::InvalidProfile(format!("{} must be non-negative, got {}", field, value)));
            }
        }
        if !(0.0..=1.0).contains(&self.crit_chance) {
            return Err(SimulationError::InvalidProfile(format!(
                "crit_chance must be within [0, 1], got {}",
                self.crit_chance
            )));
        }
        if !(self.max_mana > 0.0) {
            return Err(SimulationError::InvalidProfile(format!("max_mana must be positive, got {}", self.max_mana)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seconds.
    pub encounter_duration: f64,
    /// Seconds.
    pub time_step:          f64,
}

impl SimulationConfig {
    pub fn new(encounter_duration: f64) -> Self {
        Self { encounter_duration, time_step: DEFAULT_TIME_STEP }
    }

    fn validate(&self) -> Result<(), SimulationError> {
        if !(self.encounter_duration > 0.0) {
            return Err(SimulationError::NonPositiveDuration(self.encounter_duration));
        }
        if !(self.time_step > 0.0) {
            return Err(SimulationError::NonPositiveTimeStep(self.time_step));
        }
        if self.time_step < MIN_TIME_STEP {
            return Err(SimulationError::TimeStepTooSmall { step: self.time_step, min: MIN_TIME_STEP });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// State at the start of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationTick {
    pub time:           f64,
    pub available_mana: f64,
    pub net_healing:    f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedCast {
    pub finish_time: f64,
    pub spell_id:    u32,
    pub target:      String,
    /// Effective deficit of the target when the heal landed.
    pub deficit:     f64,
    pub gross:       f64,
    pub net:         f64,
    pub crit:        bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub strategy:      String,
    pub duration:      f64,
    pub casts:         u32,
    pub net_healing:   f64,
    pub gross_healing: f64,
    pub regen_mana:    f64,
    pub end_mana:      f64,
    pub trace:         Vec<SimulationTick>,
    pub cast_log:      Vec<SimulatedCast>,
}

impl SimulationResult {
    pub fn casts_per_minute(&self) -> f64 {
        self.casts as f64 / self.duration * 60.0
    }

    pub fn hps(&self) -> f64 {
        self.net_healing / self.duration
    }

    /// Average regen over the encounter in mana per 5 seconds.
    pub fn regen_mp5(&self) -> f64 {
        self.regen_mana / self.duration * 5.0
    }

    pub fn overheal_fraction(&self) -> f64 {
        if self.gross_healing > 0.0 {
            1.0 - self.net_healing / self.gross_healing
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PendingHeal {
    target:      String,
    choice:      SpellChoice,
    finish_time: f64,
}

/// Walks the timeline snapshots; snapshot k is in force on [t_k, t_{k+1}).
struct TimelineCursor<'a> {
    timeline: &'a RaidTimeline,
    next:     usize,
    current:  Option<&'a BTreeMap<String, i64>>,
}

impl<'a> TimelineCursor<'a> {
    fn new(timeline: &'a RaidTimeline) -> Self {
        Self { timeline, next: 0, current: None }
    }

    fn advance_to(&mut self, time: f64) {
        while let Some(entry) = self.timeline.entries.get(self.next) {
            if entry.seconds() > time {
                break;
            }
            self.current = Some(&entry.per_unit);
            self.next += 1;
        }
    }

    fn next_update(&self) -> Option<f64> {
        self.timeline.entries.get(self.next).map(|e| e.seconds())
    }

    fn deficit(&self, unit: &str) -> f64 {
        self.current.and_then(|d| d.get(unit)).copied().unwrap_or(0) as f64
    }
}

fn effective_deficit(timeline_deficit: f64, applied: f64) -> f64 {
    (timeline_deficit + applied).min(0.0)
}

/// Unit with the most negative effective deficit. Ties go to the smallest
/// unit id.
fn pick_target<'a>(cursor: &TimelineCursor<'a>, applied_heals: &HashMap<String, f64>) -> Option<(&'a str, f64)> {
    let deficits = cursor.current?;
    let mut best: Option<(&'a str, f64)> = None;
    for (unit, deficit) in deficits {
        let applied = applied_heals.get(unit).copied().unwrap_or(0.0);
        let effective = effective_deficit(*deficit as f64, applied);
        if best.map_or(true, |(_, d)| effective < d) {
            best = Some((unit.as_str(), effective));
        }
    }
    best
}

/// Run `strategy` against `timeline`. Crit rolls come from `rng`, so a seeded
/// generator gives a reproducible run.
pub fn simulate<S, R>(
    timeline: &RaidTimeline,
    profile: &CharacterProfile,
    strategy: &S,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<SimulationResult, SimulationError>
where
    S: CastingStrategy + ?Sized,
    R: Rng,
{
    config.validate()?;
    profile.validate()?;
    if timeline.is_empty() {
        return Err(SimulationError::EmptyTimeline);
    }

    let duration = config.encounter_duration;
    let step = config.time_step;

    let mut result = SimulationResult {
        strategy: strategy.name(),
        duration,
        end_mana: profile.max_mana,
        ..Default::default()
    };

    let mut cursor = TimelineCursor::new(timeline);
    let mut applied_heals: HashMap<String, f64> = HashMap::new();
    let mut pending: Option<PendingHeal> = None;
    let mut available_mana = profile.max_mana;
    let mut last_finish_time = -FIVE_SECOND_RULE;
    let mut finish_time = 0.0;
    let mut time = 0.0;

    cursor.advance_to(time);

    while time < duration {
        if time >= finish_time {
            if let Some(heal) = pending.take() {
                let crit = rng.gen::<f64>() < profile.crit_chance;
                let gross = if crit { heal.choice.heal * CRIT_MULTIPLIER } else { heal.choice.heal };

                let applied = applied_heals.entry(heal.target.clone()).or_insert(0.0);
                let deficit = effective_deficit(cursor.deficit(&heal.target), *applied);
                let net = (-deficit).min(gross);
                *applied += net;

                result.casts += 1;
                result.net_healing += net;
                result.gross_healing += gross;
                available_mana = (available_mana - heal.choice.mana_cost).max(0.0);
                last_finish_time = heal.finish_time;

                tracing::trace!(
                    "{:6.1}s healed {} ({:.0}) for {:.0}{}",
                    time, heal.target, deficit, net, if crit { " (crit)" } else { "" }
                );

                result.cast_log.push(SimulatedCast {
                    finish_time: heal.finish_time,
                    spell_id: heal.choice.spell_id,
                    target: heal.target,
                    deficit,
                    gross,
                    net,
                    crit,
                });
            }

            finish_time = time + step;

            if let Some((target, deficit)) = pick_target(&cursor, &applied_heals) {
                if deficit < 0.0 {
                    let choice = strategy.pick_spell(deficit, available_mana, profile.heal_power);
                    if choice.is_castable(available_mana) {
                        finish_time = time + choice.cast_time;
                        pending = Some(PendingHeal { target: target.to_owned(), choice, finish_time });
                    }
                }
            }
        }

        result.trace.push(SimulationTick { time, available_mana, net_healing: result.net_healing });

        let next_update = cursor.next_update().unwrap_or(duration + step);
        let next_time = (time + step).min(finish_time).min(next_update).min(duration);
        let elapsed = next_time - time;
        time = next_time;

        let mp5 = if next_time - last_finish_time > FIVE_SECOND_RULE {
            profile.mp5_out_of_combat
        } else {
            profile.mp5_in_combat
        };
        let regen = (elapsed / 5.0 * mp5).min(profile.max_mana - available_mana).max(0.0);
        available_mana += regen;
        result.regen_mana += regen;

        cursor.advance_to(time);
    }

    result.trace.push(SimulationTick { time: duration, available_mana, net_healing: result.net_healing });
    result.end_mana = available_mana;

    tracing::debug!(
        "{}: {:.0} healing in {} casts ({:.1} cpm, {:.1} hps), {:.0} mana regen, {:.0} end mana",
        result.strategy,
        result.net_healing,
        result.casts,
        result.casts_per_minute(),
        result.hps(),
        result.regen_mana,
        result.end_mana
    );

    Ok(result)
}

/// Simulate one fixed-spell strategy per spell id, each with a fresh
/// generator seeded from `seed` so the runs are comparable.
pub fn sweep_fixed_spells(
    timeline: &RaidTimeline,
    profile: &CharacterProfile,
    table: &SpellTable,
    talents: &Talents,
    spell_ids: &[u32],
    config: &SimulationConfig,
    seed: u64,
) -> Result<Vec<(u32, SimulationResult)>, SimulationError> {
    spell_ids
        .iter()
        .map(|&spell_id| {
            let strategy = FixedSpellStrategy::new(table, spell_id, talents);
            let mut rng = StdRng::seed_from_u64(seed);
            simulate(timeline, profile, &strategy, config, &mut rng).map(|r| (spell_id, r))
        })
        .collect()
}
