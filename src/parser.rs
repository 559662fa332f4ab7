/// Parses raw WoW Classic combat log lines into typed `CombatEvent` values.
///
/// WoW Classic advanced combat log format:
///
///   TIMESTAMP  SUBEVENT,SOURCEGUID,SOURCENAME,SOURCEFLAGS,SOURCERAIDFLAGS,
///              DESTGUID,DESTNAME,DESTFLAGS,DESTRAIDFLAGS,[subevent-specific fields...]
///
/// Field indices (0-based after splitting the payload on comma):
///   [0]  subevent name (e.g. "SPELL_HEAL")
///   [1]  source GUID
///   [2]  source name (quoted, "Name-Realm")
///   [5]  dest GUID
///   [6]  dest name (quoted)
///   [9]  spell ID       (prefix fields for SPELL_* events)
///   [10] spell name     (quoted)
///   [11] spell school
///   [12+] advanced unit info, then subevent-specific suffix
///
/// Heal suffix positions are fixed ([29] amount, [30] overheal, [32] crit).
/// Damage lines are read from the end because SWING_* lines have no spell
/// prefix: [-10] amount, [-9] raw amount, [-8] overkill, [-24] health %.
use crate::error::ParseError;
use crate::event::{CombatEvent, DamageInfo, EventKind, HealInfo};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENCOUNTER_START: &str = "ENCOUNTER_START";
const ENCOUNTER_END:   &str = "ENCOUNTER_END";
const REFERENCE_YEAR:  i32  = 2000;

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse the log timestamp prefix "M/D HH:MM:SS.mmm" into milliseconds since
/// the start of the year.
///
/// The log carries no year, so dates are placed in a leap reference year
/// (2/29 stays valid). Month and day are both folded in, which keeps a log
/// crossing midnight or a month boundary monotonic.
pub fn parse_timestamp(date_time: &str) -> Option<u64> {
    let mut parts = date_time.trim().splitn(2, ' ');
    let date = parts.next()?;
    let time = parts.next()?;

    let (month, day) = date.split_once('/')?;
    let date = NaiveDate::from_ymd_opt(REFERENCE_YEAR, month.parse().ok()?, day.parse().ok()?)?;

    let mut time_parts = time.splitn(3, ':');
    let h: u32 = time_parts.next()?.parse().ok()?;
    let m: u32 = time_parts.next()?.parse().ok()?;
    let sm: &str = time_parts.next()?;

    let (s_str, ms_str) = sm.split_once('.').unwrap_or((sm, "0"));
    let time = NaiveTime::from_hms_milli_opt(h, m, s_str.parse().ok()?, ms_str.parse().ok()?)?;

    let year_start = NaiveDate::from_ymd_opt(REFERENCE_YEAR, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let elapsed = date.and_time(time).signed_duration_since(year_start);
    u64::try_from(elapsed.num_milliseconds()).ok()
}

/// Strip surrounding double-quotes (and a trailing line break) from a field.
#[inline]
fn unquote(s: &str) -> &str {
    s.trim_end_matches(['\r', '\n']).trim_matches('"')
}

/// "Saintis-Dreadmist" → "Saintis"
fn player_name(field: &str) -> String {
    unquote(field).split('-').next().unwrap_or_default().to_owned()
}

/// Split a raw log line into (timestamp_ms, fields[]).
///
/// Lines look like:
///   "4/14 20:15:01.123  SPELL_HEAL,Player-4395-01C5EEA8,..."
///                     ^^  (two spaces between timestamp and payload)
fn split_line(raw: &str) -> Option<(u64, Vec<&str>)> {
    let sep     = raw.find("  ")?;
    let ts_ms   = parse_timestamp(&raw[..sep])?;
    let payload = raw[sep + 2..].trim_end_matches(['\r', '\n']);
    Some((ts_ms, payload.split(',').collect()))
}

fn from_end<'a>(f: &[&'a str], offset: usize) -> Option<&'a str> {
    f.len().checked_sub(offset).and_then(|i| f.get(i).copied())
}

fn parse_pct(field: &str) -> Option<u8> {
    let pct: i64 = field.trim().parse().ok()?;
    Some(pct.clamp(0, 100) as u8)
}

/// Parse one line. Returns `None` for subevents the analysis does not use,
/// for lines that are too short, and for units that are not players
/// (creature heals, damage to mobs, boss deaths).
pub fn parse_line(raw: &str) -> Option<CombatEvent> {
    let (ts, f) = split_line(raw)?;

    let subevent = *f.first()?;
    let src_guid = unquote(f.get(1)?).to_owned();
    let src_name = player_name(f.get(2)?);
    let dst_guid = unquote(f.get(5)?).to_owned();
    let dst_name = player_name(f.get(6)?);

    let kind = match subevent {
        "SPELL_CAST_START" | "SPELL_CAST_SUCCESS" | "SPELL_CAST_FAILED" => {
            if !src_guid.starts_with("Player") {
                return None;
            }
            match subevent {
                "SPELL_CAST_START"   => EventKind::CastStart,
                "SPELL_CAST_SUCCESS" => EventKind::CastSuccess,
                _ => EventKind::CastFailed { reason: unquote(f.get(12)?).to_owned() },
            }
        }
        "SPELL_HEAL" | "SPELL_PERIODIC_HEAL" => {
            if dst_guid.starts_with("Creature") {
                return None;
            }
            let info = HealInfo {
                gross_amount:     f.get(29)?.parse().ok()?,
                over_amount:      f.get(30)?.parse().unwrap_or(0),
                is_crit:          f.get(32).map(|c| c.contains('1')).unwrap_or(false),
                health_pct_after: parse_pct(f.get(14)?)?,
            };
            if subevent == "SPELL_HEAL" {
                EventKind::Heal(info)
            } else {
                EventKind::PeriodicHeal(info)
            }
        }
        "SPELL_DAMAGE" | "SPELL_PERIODIC_DAMAGE" | "SWING_DAMAGE_LANDED" => {
            if dst_guid.starts_with("Creature") {
                return None;
            }
            let amount:   i64 = from_end(&f, 10)?.parse().ok()?;
            let raw:      i64 = from_end(&f, 9)?.parse().ok()?;
            let overkill: i64 = from_end(&f, 8)?.parse().ok()?;
            EventKind::Damage(DamageInfo {
                gross_amount: -raw,
                mitigated:    -(raw - amount),
                overkill:     -overkill,
                health_pct:   parse_pct(from_end(&f, 24)?)?,
            })
        }
        "UNIT_DIED" | "SPELL_RESURRECT" => {
            if dst_guid.starts_with("Creature") {
                return None;
            }
            if subevent == "UNIT_DIED" {
                EventKind::UnitDied
            } else {
                EventKind::Resurrect
            }
        }
        _ => return None, // Unrecognised subevent, silently skip
    };

    let spell_id = if subevent.starts_with("SPELL") {
        f.get(9)?.parse().ok()?
    } else {
        0
    };

    Some(CombatEvent {
        timestamp_ms: ts,
        source_id:    src_guid,
        source:       src_name,
        target_id:    dst_guid,
        target:       dst_name,
        spell_id,
        kind,
    })
}

// ---------------------------------------------------------------------------
// Encounters
// ---------------------------------------------------------------------------

/// A boss fight, as delimited by ENCOUNTER_START / ENCOUNTER_END lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    pub boss:       String,
    /// Line range [start_line, end_line) in the log.
    pub start_line: usize,
    pub end_line:   usize,
    pub start_ms:   u64,
    pub end_ms:     u64,
}

impl Encounter {
    pub fn duration_secs(&self) -> f64 {
        self.end_ms.saturating_sub(self.start_ms) as f64 / 1_000.0
    }

    /// "The Prophet Skeram" → "Prophet", "Lucifron" → "Lucifron"
    pub fn short_name(&self) -> &str {
        let mut parts = self.boss.split_whitespace();
        match parts.next() {
            Some("The") => parts.next().unwrap_or(self.boss.as_str()),
            Some(first) => first,
            None => self.boss.as_str(),
        }
    }
}

fn line_timestamp(line: &str) -> Option<u64> {
    let sep = line.find("  ")?;
    parse_timestamp(&line[..sep])
}

fn boss_name(line: &str) -> String {
    line.split(',').nth(2).map(unquote).unwrap_or_default().to_owned()
}

pub fn list_encounters<S: AsRef<str>>(lines: &[S]) -> Result<Vec<Encounter>, ParseError> {
    let mut encounters = Vec::new();
    let mut open: Option<(String, usize, u64)> = None;

    for (i, line) in lines.iter().enumerate() {
        let line = line.as_ref();

        if line.contains(ENCOUNTER_START) {
            let ts = line_timestamp(line).unwrap_or(0);
            open = Some((boss_name(line), i, ts));
        } else if line.contains(ENCOUNTER_END) {
            let boss = boss_name(line);
            let Some((started, start_line, start_ms)) = open.take() else {
                return Err(ParseError::MismatchedEncounterEnd { started: String::new(), ended: boss });
            };
            if started != boss {
                return Err(ParseError::MismatchedEncounterEnd { started, ended: boss });
            }
            encounters.push(Encounter {
                boss,
                start_line,
                end_line: i + 1,
                start_ms,
                end_ms: line_timestamp(line).unwrap_or(start_ms),
            });
        }
    }

    tracing::debug!("Found {} encounters", encounters.len());
    Ok(encounters)
}

/// Pseudo-encounter covering every line of the log.
pub fn whole_log<S: AsRef<str>>(lines: &[S]) -> Result<Encounter, ParseError> {
    let mut stamps = lines.iter().filter_map(|l| line_timestamp(l.as_ref()));
    let start_ms   = stamps.next().ok_or(ParseError::EmptyLog)?;
    let end_ms     = stamps.last().unwrap_or(start_ms);
    Ok(Encounter {
        boss: "Whole log".to_owned(),
        start_line: 0,
        end_line: lines.len(),
        start_ms,
        end_ms,
    })
}

/// Pick an encounter by 1-based index; 0 selects the whole log.
pub fn select_encounter<S: AsRef<str>>(lines: &[S], index: usize) -> Result<Encounter, ParseError> {
    if index == 0 {
        return whole_log(lines);
    }
    let mut encounters = list_encounters(lines)?;
    if index > encounters.len() {
        return Err(ParseError::EncounterOutOfRange { requested: index, available: encounters.len() });
    }
    Ok(encounters.swap_remove(index - 1))
}

/// Parse the lines of one encounter into events relative to its start.
pub fn parse_encounter<S: AsRef<str>>(lines: &[S], encounter: &Encounter) -> Vec<CombatEvent> {
    let end = encounter.end_line.min(lines.len());
    let start = encounter.start_line.min(end);

    let events: Vec<CombatEvent> = lines[start..end]
        .iter()
        .filter_map(|l| parse_line(l.as_ref()))
        .map(|mut e| {
            e.timestamp_ms = e.timestamp_ms.saturating_sub(encounter.start_ms);
            e
        })
        .collect();

    tracing::info!(
        "Parsed {} events for {} ({:.1}s)",
        events.len(),
        encounter.boss,
        encounter.duration_secs()
    );
    events
}

pub fn read_lines(path: &Path) -> Result<Vec<String>, ParseError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw.lines().map(str::to_owned).collect())
}
