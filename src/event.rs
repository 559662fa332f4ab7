/// Typed combat events, independent of where they were read from.
///
/// Every component downstream of ingestion consumes `CombatEvent` values whose
/// timestamps are already relative to the start of the encounter. Amounts keep
/// the sign convention of the log reader:
///
///   heals   → `gross_amount` ≥ 0, `over_amount` ≥ 0 (overheal)
///   damage  → `gross_amount` ≤ 0, `mitigated` ≤ 0, `overkill` < 0 on a killing blow
use crate::error::OrderError;
use serde::{Deserialize, Serialize};

/// Payload shared by direct and periodic heals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealInfo {
    pub gross_amount:     i64,
    pub over_amount:      i64,
    pub is_crit:          bool,
    /// Target health in percent after the heal landed.
    pub health_pct_after: u8,
}

impl HealInfo {
    /// Healing that actually landed.
    pub fn net_amount(&self) -> i64 {
        self.gross_amount - self.over_amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageInfo {
    pub gross_amount: i64,
    pub mitigated:    i64,
    pub overkill:     i64,
    pub health_pct:   u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    CastStart,
    CastSuccess,
    CastFailed { reason: String },
    Heal(HealInfo),
    PeriodicHeal(HealInfo),
    Damage(DamageInfo),
    UnitDied,
    Resurrect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEvent {
    pub timestamp_ms: u64,
    pub source_id:    String,
    pub source:       String,
    pub target_id:    String,
    pub target:       String,
    pub spell_id:     u32,
    pub kind:         EventKind,
}

impl CombatEvent {
    pub fn is_heal(&self) -> bool {
        matches!(self.kind, EventKind::Heal(_) | EventKind::PeriodicHeal(_))
    }

    pub fn heal_info(&self) -> Option<&HealInfo> {
        match &self.kind {
            EventKind::Heal(info) | EventKind::PeriodicHeal(info) => Some(info),
            _ => None,
        }
    }

    /// True for events that change a unit's health.
    pub fn touches_health(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Heal(_) | EventKind::PeriodicHeal(_) | EventKind::Damage(_)
        )
    }

    /// Timestamp in seconds, for the simulator and for display.
    pub fn seconds(&self) -> f64 {
        self.timestamp_ms as f64 / 1_000.0
    }
}

/// Fails on the first event whose timestamp is earlier than its predecessor's.
/// Equal timestamps are fine; the log batches events on the same tick.
pub fn ensure_ordered(events: &[CombatEvent]) -> Result<(), OrderError> {
    for (index, pair) in events.windows(2).enumerate() {
        let (previous, current) = (pair[0].timestamp_ms, pair[1].timestamp_ms);
        if current < previous {
            return Err(OrderError { index: index + 1, previous_ms: previous, timestamp_ms: current });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Constructors used across the crate's tests
// ---------------------------------------------------------------------------
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn event(t: u64, kind: EventKind, source: &str, target: &str, spell_id: u32) -> CombatEvent {
        CombatEvent {
            timestamp_ms: t,
            source_id:    format!("Player-{}", source),
            source:       source.to_owned(),
            target_id:    if target.is_empty() { String::new() } else { format!("Player-{}", target) },
            target:       target.to_owned(),
            spell_id,
            kind,
        }
    }

    pub fn cast_start(t: u64, source: &str, spell_id: u32) -> CombatEvent {
        event(t, EventKind::CastStart, source, "", spell_id)
    }

    pub fn cast_success(t: u64, source: &str, spell_id: u32, target: &str) -> CombatEvent {
        event(t, EventKind::CastSuccess, source, target, spell_id)
    }

    pub fn cast_failed(t: u64, source: &str, spell_id: u32, reason: &str) -> CombatEvent {
        event(t, EventKind::CastFailed { reason: reason.to_owned() }, source, "", spell_id)
    }

    pub fn heal(t: u64, source: &str, target: &str, spell_id: u32, gross: i64, over: i64) -> CombatEvent {
        let info = HealInfo { gross_amount: gross, over_amount: over, is_crit: false, health_pct_after: 100 };
        event(t, EventKind::Heal(info), source, target, spell_id)
    }

    pub fn periodic_heal(t: u64, source: &str, target: &str, spell_id: u32, gross: i64, over: i64) -> CombatEvent {
        let info = HealInfo { gross_amount: gross, over_amount: over, is_crit: false, health_pct_after: 100 };
        event(t, EventKind::PeriodicHeal(info), source, target, spell_id)
    }

    pub fn damage(t: u64, source: &str, target: &str, gross: i64, mitigated: i64, overkill: i64) -> CombatEvent {
        let info = DamageInfo { gross_amount: gross, mitigated, overkill, health_pct: 50 };
        event(t, EventKind::Damage(info), source, target, 0)
    }

    pub fn died(t: u64, unit: &str) -> CombatEvent {
        event(t, EventKind::UnitDied, "", unit, 0)
    }

    pub fn resurrect(t: u64, source: &str, unit: &str) -> CombatEvent {
        event(t, EventKind::Resurrect, source, unit, 20484)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn accepts_batched_timestamps() {
        let events = vec![
            cast_start(0, "Saintis", 10917),
            cast_success(1500, "Saintis", 10917, "Tank"),
            heal(1500, "Saintis", "Tank", 10917, 900, 0),
        ];
        assert!(ensure_ordered(&events).is_ok());
    }

    #[test]
    fn rejects_timestamp_going_backwards() {
        let events = vec![
            cast_start(1000, "Saintis", 10917),
            cast_start(900, "Saintis", 10917),
        ];
        let err = ensure_ordered(&events).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.previous_ms, 1000);
        assert_eq!(err.timestamp_ms, 900);
    }

    #[test]
    fn heal_net_amount_excludes_overheal() {
        let e = heal(0, "Saintis", "Tank", 10917, 1200, 300);
        assert_eq!(e.heal_info().unwrap().net_amount(), 900);
        assert!(e.is_heal());
        assert!(e.touches_health());
    }
}
