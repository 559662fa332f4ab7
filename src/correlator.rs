/// Cast/heal correlator: rebuilds logical spell casts from the start /
/// success / failure stream and pairs completed casts with the heals they
/// produced.
///
/// The log only records discrete events, so a cast is inferred:
///
///   SPELL_CAST_START    → opens a cast (at most one open cast per source)
///   SPELL_CAST_SUCCESS  → completes it, or is an instant cast
///   SPELL_CAST_FAILED   → closes it, but only for interrupts and dead targets
///   UNIT_DIED           → closes the dying unit's own cast
///   next CAST_START     → cancels whatever was still open
///
/// Events sharing a timestamp are "batched" by the server and can arrive in
/// any order, which is why a new start looks ahead for a same-tick success of
/// the cast it is about to cancel.
use crate::error::CorrelateError;
use crate::event::{ensure_ordered, CombatEvent, EventKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A heal may land up to this long after its cast's success line.
pub const HEAL_MATCH_TOLERANCE_MS: u64 = 100;

const REASON_INTERRUPTED: &str = "Interrupted";
const REASON_TARGET_DEAD: &str = "Your target is dead";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CastOutcome {
    Completed { target: String },
    Cancelled,
    Interrupted,
    TargetAlreadyDead,
    SourceDied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cast {
    pub source_id: String,
    pub source:    String,
    pub spell_id:  u32,
    pub start_ms:  u64,
    pub end_ms:    u64,
    pub outcome:   CastOutcome,
}

impl Cast {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, CastOutcome::Completed { .. })
    }

    pub fn target(&self) -> Option<&str> {
        match &self.outcome {
            CastOutcome::Completed { target } => Some(target),
            _ => None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// A completed cast matched to the heal it produced. `cast` indexes
/// `Correlation::casts`, `heal` indexes the input event slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealApplication {
    pub cast:     usize,
    pub heal:     usize,
    pub net_heal: i64,
}

/// Anomalies absorbed during a run. None of these stop processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatorDiagnostics {
    /// Same-tick success for a different spell than the one just started.
    pub spurious_successes: usize,
    /// Failures whose reason does not close a cast (out of range, no mana...).
    pub ignored_failures:   usize,
    /// Cast events without a source.
    pub skipped_events:     usize,
    pub unmatched_heals:    usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Correlation {
    pub casts:             Vec<Cast>,
    pub heal_applications: Vec<HealApplication>,
    pub diagnostics:       CorrelatorDiagnostics,
}

impl Correlation {
    pub fn cast(&self, application: &HealApplication) -> &Cast {
        &self.casts[application.cast]
    }

    pub fn casts_by<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Cast> + 'a {
        self.casts.iter().filter(move |c| c.source == source)
    }

    pub fn total_matched_healing(&self) -> i64 {
        self.heal_applications.iter().map(|a| a.net_heal).sum()
    }
}

// ---------------------------------------------------------------------------
// Correlator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct OpenCast {
    source:   String,
    spell_id: u32,
    start_ms: u64,
}

/// Single-use state for one pass over an event sequence.
pub struct Correlator<'a> {
    source_filter: Option<&'a str>,
    /// source_id -> cast in progress
    open:          HashMap<String, OpenCast>,
    /// Indices of successes already claimed by a batched look-ahead.
    consumed:      HashSet<usize>,
    casts:         Vec<Cast>,
    diagnostics:   CorrelatorDiagnostics,
}

impl<'a> Correlator<'a> {
    pub fn new(source_filter: Option<&'a str>) -> Self {
        Self {
            source_filter,
            open:        HashMap::new(),
            consumed:    HashSet::new(),
            casts:       Vec::new(),
            diagnostics: CorrelatorDiagnostics::default(),
        }
    }

    fn wants(&self, event: &CombatEvent) -> bool {
        self.source_filter.map_or(true, |s| event.source == s)
    }

    pub fn run(mut self, events: &[CombatEvent]) -> Result<Correlation, CorrelateError> {
        ensure_ordered(events)?;

        for (i, event) in events.iter().enumerate() {
            match &event.kind {
                EventKind::CastStart | EventKind::CastSuccess | EventKind::CastFailed { .. } => {
                    if !self.wants(event) {
                        continue;
                    }
                    if event.source_id.is_empty() {
                        self.diagnostics.skipped_events += 1;
                        continue;
                    }
                    match &event.kind {
                        EventKind::CastStart => self.on_start(events, i),
                        EventKind::CastSuccess => self.on_success(events, i),
                        EventKind::CastFailed { reason } => self.on_failed(event, reason),
                        _ => {}
                    }
                }
                EventKind::UnitDied => {
                    if let Some(open) = self.open.remove(&event.target_id) {
                        self.close(&event.target_id, open, event.timestamp_ms, CastOutcome::SourceDied);
                    }
                }
                _ => {}
            }
        }

        // Nothing stays open once the stream is exhausted.
        let last_ms = events.last().map(|e| e.timestamp_ms).unwrap_or(0);
        let mut leftover: Vec<(String, OpenCast)> = self.open.drain().collect();
        leftover.sort_by(|a, b| a.1.start_ms.cmp(&b.1.start_ms).then_with(|| a.0.cmp(&b.0)));
        for (source_id, open) in leftover {
            self.close(&source_id, open, last_ms, CastOutcome::Cancelled);
        }

        let heal_applications = self.match_heals(events);

        tracing::debug!(
            "Correlated {} casts, {} heal matches ({:?})",
            self.casts.len(),
            heal_applications.len(),
            self.diagnostics
        );

        Ok(Correlation {
            casts: self.casts,
            heal_applications,
            diagnostics: self.diagnostics,
        })
    }

    fn close(&mut self, source_id: &str, open: OpenCast, end_ms: u64, outcome: CastOutcome) {
        self.casts.push(Cast {
            source_id: source_id.to_owned(),
            source:    open.source,
            spell_id:  open.spell_id,
            start_ms:  open.start_ms,
            end_ms,
            outcome,
        });
    }

    fn push_instant(&mut self, event: &CombatEvent, outcome: CastOutcome) {
        self.casts.push(Cast {
            source_id: event.source_id.clone(),
            source:    event.source.clone(),
            spell_id:  event.spell_id,
            start_ms:  event.timestamp_ms,
            end_ms:    event.timestamp_ms,
            outcome,
        });
    }

    /// Look forward through events sharing `events[i]`'s timestamp for an
    /// unclaimed success that completes `open`.
    fn batched_success(&self, events: &[CombatEvent], i: usize, source_id: &str, open: &OpenCast) -> Option<usize> {
        let tick = events[i].timestamp_ms;
        events
            .iter()
            .enumerate()
            .skip(i + 1)
            .take_while(|(_, e)| e.timestamp_ms == tick)
            .find(|(j, e)| {
                e.kind == EventKind::CastSuccess
                    && e.source_id == source_id
                    && e.spell_id == open.spell_id
                    && !self.consumed.contains(j)
            })
            .map(|(j, _)| j)
    }

    fn on_start(&mut self, events: &[CombatEvent], i: usize) {
        let event = &events[i];

        if let Some(open) = self.open.remove(&event.source_id) {
            match self.batched_success(events, i, &event.source_id, &open) {
                Some(j) => {
                    self.consumed.insert(j);
                    let target = events[j].target.clone();
                    self.close(&event.source_id, open, event.timestamp_ms, CastOutcome::Completed { target });
                }
                None => self.close(&event.source_id, open, event.timestamp_ms, CastOutcome::Cancelled),
            }
        }

        self.open.insert(
            event.source_id.clone(),
            OpenCast {
                source:   event.source.clone(),
                spell_id: event.spell_id,
                start_ms: event.timestamp_ms,
            },
        );
    }

    fn on_success(&mut self, events: &[CombatEvent], i: usize) {
        if self.consumed.contains(&i) {
            return;
        }
        let event = &events[i];
        let completed = CastOutcome::Completed { target: event.target.clone() };

        match self.open.remove(&event.source_id) {
            Some(open) if open.spell_id == event.spell_id => {
                self.close(&event.source_id, open, event.timestamp_ms, completed);
            }
            Some(open) if open.start_ms == event.timestamp_ms => {
                tracing::debug!(
                    "Spurious success for spell {} from {} at {}ms while starting {}",
                    event.spell_id, event.source, event.timestamp_ms, open.spell_id
                );
                self.diagnostics.spurious_successes += 1;
                self.open.insert(event.source_id.clone(), open);
            }
            Some(open) => {
                self.close(&event.source_id, open, event.timestamp_ms, CastOutcome::Cancelled);
                self.push_instant(event, completed);
            }
            None => self.push_instant(event, completed),
        }
    }

    fn on_failed(&mut self, event: &CombatEvent, reason: &str) {
        let outcome = match reason {
            REASON_INTERRUPTED => CastOutcome::Interrupted,
            REASON_TARGET_DEAD => CastOutcome::TargetAlreadyDead,
            _ => {
                self.diagnostics.ignored_failures += 1;
                return;
            }
        };

        match self.open.remove(&event.source_id) {
            Some(open) => self.close(&event.source_id, open, event.timestamp_ms, outcome),
            None => self.push_instant(event, outcome),
        }
    }

    /// Greedy first-fit: each heal takes the first unconsumed completed cast of
    /// the same spell from the same source that ended no later than the heal
    /// (plus tolerance). Not necessarily the closest cast when casts overlap.
    fn match_heals(&mut self, events: &[CombatEvent]) -> Vec<HealApplication> {
        let mut pool: HashMap<(&str, u32), Vec<usize>> = HashMap::new();
        for (ci, cast) in self.casts.iter().enumerate() {
            if cast.is_completed() {
                pool.entry((cast.source_id.as_str(), cast.spell_id)).or_default().push(ci);
            }
        }

        let mut applications = Vec::new();
        let mut unmatched = 0;

        for (hi, event) in events.iter().enumerate() {
            let Some(info) = event.heal_info() else { continue };
            if !self.wants(event) {
                continue;
            }

            let matched = pool.get_mut(&(event.source_id.as_str(), event.spell_id)).and_then(|bucket| {
                let pos = bucket
                    .iter()
                    .position(|&ci| self.casts[ci].end_ms <= event.timestamp_ms + HEAL_MATCH_TOLERANCE_MS)?;
                Some(bucket.remove(pos))
            });

            match matched {
                Some(ci) => applications.push(HealApplication { cast: ci, heal: hi, net_heal: info.net_amount() }),
                None => unmatched += 1,
            }
        }

        self.diagnostics.unmatched_heals = unmatched;
        applications
    }
}

/// Resolve casts and match them to heals in one pass over `events`.
pub fn correlate(events: &[CombatEvent], source_filter: Option<&str>) -> Result<Correlation, CorrelateError> {
    Correlator::new(source_filter).run(events)
}
