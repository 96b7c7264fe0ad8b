#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Decay sweep and collision system.
//!
//! On trigger the system spawns one falling decay front per grid column.
//! Every tick each front integrates its position, traverses every integer
//! row it crossed (so high fall speeds cannot tunnel past a letter), and
//! resolves each occupied cell through the decay state machine exactly once
//! per tick, no matter how many fronts reach the cell. The system owns the
//! wave store and the per-tick dedup state; all world mutation is expressed
//! as [`Command`] batches applied by the authoritative world.

use std::collections::HashSet;
use std::time::Duration;

use glyphfall_core::{
    CellCoord, Command, EntityId, Event, FadeLevel, Glyph, GridDims, LetterColor, LetterView,
    OccupancyView, WaveId,
};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;

const WAVE_SEED_LABEL: &str = "decay-wave";
const COLUMN_SEED_LABEL: &str = "decay-column";

/// Tuning knobs for the decay wave, supplied by external balance data.
#[derive(Clone, Debug)]
pub struct DecayTuning {
    /// Slowest fall speed a front may be assigned, in rows per second.
    pub min_speed: f32,
    /// Fastest fall speed a front may be assigned, in rows per second.
    pub max_speed: f32,
    /// Upper clamp on the per-tick delta time, bounding the worst-case swept
    /// distance when the host frame time spikes.
    pub max_tick: Duration,
    /// Chance of re-rolling a front's glyph when it enters a new row.
    pub churn_probability: f64,
    /// Alphabet the front glyphs are drawn from.
    pub glyph_alphabet: Vec<char>,
    /// Reserved capacity of the per-cell occupant scratch buffer.
    pub occupant_scratch: usize,
    /// Root seed for every per-wave random stream.
    pub global_seed: u64,
}

impl Default for DecayTuning {
    fn default() -> Self {
        Self {
            min_speed: 4.0,
            max_speed: 9.0,
            max_tick: Duration::from_millis(100),
            churn_probability: 0.2,
            glyph_alphabet: vec!['#', '%', '&', '*', '+', '=', '~', '?'],
            occupant_scratch: 8,
            global_seed: 0x676c_7970_6866_616c,
        }
    }
}

/// Reasons a wave trigger request is rejected before any front spawns.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum TriggerError {
    /// The grid has zero columns or zero rows.
    #[error("grid has no cells to sweep")]
    EmptyGrid,
    /// The configured speed range is empty, non-positive, or not finite.
    #[error("invalid fall speed range {min}..{max} rows per second")]
    InvalidSpeedRange {
        /// Configured minimum speed.
        min: f32,
        /// Configured maximum speed.
        max: f32,
    },
    /// The configured glyph alphabet is empty.
    #[error("glyph alphabet is empty")]
    EmptyAlphabet,
    /// A wave is already active; cancel it before triggering another.
    #[error("a decay wave is already active")]
    WaveActive,
}

/// Signals the decay system raises toward game-phase bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecaySignal {
    /// The triggered wave's fronts have all exited or been resolved.
    ///
    /// Raised exactly once per wave, never after a cancel.
    WaveCompleted {
        /// Identifier of the completed wave.
        wave: WaveId,
    },
}

/// Outcome of applying one decay contact to a letter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecayOutcome {
    /// The letter is immune and keeps its state.
    Unaffected,
    /// The letter survives with a dimmer level or a demoted color.
    Faded {
        /// Chain color after the transition.
        color: LetterColor,
        /// Fade level after the transition.
        level: FadeLevel,
    },
    /// The letter is destroyed.
    Destroyed,
}

/// Transition table of the decay state machine.
///
/// Deterministic over the full `{Blue, Green, Red} x {Bright, Normal, Dark}`
/// space: levels dim within a color, a color fading out of `Dark` demotes
/// along the chain at `Bright`, and `Red` at `Dark` is destroyed. `Gold` is
/// immune at every level.
#[must_use]
pub const fn transition(color: LetterColor, level: FadeLevel) -> DecayOutcome {
    use FadeLevel::{Bright, Dark, Normal};
    use LetterColor::{Blue, Gold, Green, Red};

    match (color, level) {
        (Gold, _) => DecayOutcome::Unaffected,
        (color, Bright) => DecayOutcome::Faded {
            color,
            level: Normal,
        },
        (color, Normal) => DecayOutcome::Faded { color, level: Dark },
        (Blue, Dark) => DecayOutcome::Faded {
            color: Green,
            level: Bright,
        },
        (Green, Dark) => DecayOutcome::Faded {
            color: Red,
            level: Bright,
        },
        (Red, Dark) => DecayOutcome::Destroyed,
    }
}

/// Immutable representation of a single decay front used for queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecayFrontSnapshot {
    /// Identifier of the front's entity in the occupancy index.
    pub entity: EntityId,
    /// Column the front sweeps.
    pub column: u32,
    /// Grid row currently occupied by the front.
    pub row: u32,
    /// Character currently displayed for the front.
    pub glyph: Glyph,
    /// Fall speed in rows per second, fixed at spawn.
    pub speed: f32,
}

/// Decay wave system owning the wave store and the per-tick dedup state.
#[derive(Debug)]
pub struct Decay {
    tuning: DecayTuning,
    phase: WavePhase,
    next_wave: u32,
    pending: Vec<PendingFront>,
    fronts: Vec<DecayFront>,
    front_ids: Vec<EntityId>,
    occupant_scratch: Vec<EntityId>,
    dedup: RwLock<TickDedup>,
}

impl Decay {
    /// Creates a new decay system with the provided tuning surface.
    #[must_use]
    pub fn new(tuning: DecayTuning) -> Self {
        let scratch = tuning.occupant_scratch;
        Self {
            tuning,
            phase: WavePhase::Idle,
            next_wave: 0,
            pending: Vec::new(),
            fronts: Vec::new(),
            front_ids: Vec::new(),
            occupant_scratch: Vec::with_capacity(scratch),
            dedup: RwLock::new(TickDedup::default()),
        }
    }

    /// Returns a mutable reference to the tuning knobs.
    pub fn tuning_mut(&mut self) -> &mut DecayTuning {
        &mut self.tuning
    }

    /// Reports whether a wave is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.phase, WavePhase::Active { .. })
    }

    /// Starts a decay wave over the provided grid.
    ///
    /// Validates the configuration before mutating anything and emits one
    /// `SpawnDecayFront` command per column; the fronts join the wave store
    /// once the world confirms them through `DecayFrontSpawned` events.
    /// Triggering while a wave is active is rejected with
    /// [`TriggerError::WaveActive`]; callers wanting a restart cancel first.
    pub fn trigger(
        &mut self,
        dims: GridDims,
        out: &mut Vec<Command>,
    ) -> Result<WaveId, TriggerError> {
        if self.is_active() {
            return Err(TriggerError::WaveActive);
        }
        if dims.columns() == 0 || dims.rows() == 0 {
            return Err(TriggerError::EmptyGrid);
        }
        let min = self.tuning.min_speed;
        let max = self.tuning.max_speed;
        if !min.is_finite() || !max.is_finite() || min <= 0.0 || max < min {
            return Err(TriggerError::InvalidSpeedRange { min, max });
        }
        if self.tuning.glyph_alphabet.is_empty() {
            return Err(TriggerError::EmptyAlphabet);
        }

        let wave = WaveId::new(self.next_wave);
        self.next_wave = self.next_wave.wrapping_add(1);
        let wave_seed = derive_wave_seed(self.tuning.global_seed, wave);

        self.pending.clear();
        self.fronts.clear();
        for column in 0..dims.columns() {
            let mut rng = SplitMix64::new(derive_column_seed(wave_seed, column));
            let span = f64::from(max - min);
            let speed = (f64::from(min) + span * rng.next_unit()) as f32;
            let glyph = sample_glyph(&mut rng, &self.tuning.glyph_alphabet);
            self.pending.push(PendingFront {
                column,
                speed,
                glyph,
                rng,
            });
            out.push(Command::SpawnDecayFront { column });
        }

        self.phase = WavePhase::Active { wave };
        Ok(wave)
    }

    /// Aborts the active wave.
    ///
    /// Safe to call between ticks at any time. Every outstanding front is
    /// converted into a deferred `MarkForDeath` request for the cull pass,
    /// the per-tick dedup state is cleared, and no completion signal is
    /// raised for the cancelled wave. A cancel while idle is a no-op.
    pub fn cancel(&mut self, out: &mut Vec<Command>) {
        if !self.is_active() {
            return;
        }

        for front in self.fronts.drain(..) {
            out.push(Command::MarkForDeath {
                entity: front.entity,
            });
        }
        self.pending.clear();
        self.phase = WavePhase::Idle;

        let mut dedup = self.dedup.write();
        dedup.decayed.clear();
        dedup.processed.clear();
    }

    /// Consumes world events and immutable views to advance the wave.
    ///
    /// `DecayFrontSpawned` events complete the wave store, `EntityDestroyed`
    /// events drop fronts destroyed externally, and each `TimeAdvanced`
    /// event runs one sweep. When the last front has gone the wave returns
    /// to idle and `WaveCompleted` is raised exactly once. While idle the
    /// call mutates nothing and raises nothing.
    pub fn handle(
        &mut self,
        events: &[Event],
        occupancy: OccupancyView<'_>,
        letters: &LetterView,
        out: &mut Vec<Command>,
        signals: &mut Vec<DecaySignal>,
    ) {
        for event in events {
            match event {
                Event::DecayFrontSpawned { entity, column } => self.adopt_front(*entity, *column),
                Event::EntityDestroyed { entity, .. } => self.forget_front(*entity),
                _ => {}
            }
        }

        for event in events {
            if let Event::TimeAdvanced { dt } = event {
                self.sweep(*dt, occupancy, letters, out);
            }
        }

        if let WavePhase::Active { wave } = self.phase {
            if self.fronts.is_empty() && self.pending.is_empty() {
                self.phase = WavePhase::Idle;
                signals.push(DecaySignal::WaveCompleted { wave });
            }
        }
    }

    /// Captures the live fronts in column order for renderers and tests.
    #[must_use]
    pub fn front_snapshots(&self) -> Vec<DecayFrontSnapshot> {
        let mut snapshots: Vec<DecayFrontSnapshot> = self
            .fronts
            .iter()
            .map(|front| DecayFrontSnapshot {
                entity: front.entity,
                column: front.column,
                row: front.precise_y.floor().max(0.0) as u32,
                glyph: front.glyph,
                speed: front.speed,
            })
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.column);
        snapshots
    }

    /// Lists the letters decayed so far this tick, in identifier order.
    ///
    /// Observation-only surface for diagnostics and tests; the sweep itself
    /// never relies on it.
    #[must_use]
    pub fn decayed_this_tick(&self) -> Vec<EntityId> {
        let dedup = self.dedup.read();
        let mut decayed: Vec<EntityId> = dedup.decayed.iter().copied().collect();
        decayed.sort_unstable();
        decayed
    }

    /// Counts the cells already resolved this tick.
    #[must_use]
    pub fn cells_processed_this_tick(&self) -> usize {
        self.dedup
            .read()
            .processed
            .iter()
            .filter(|claimed| **claimed)
            .count()
    }

    fn adopt_front(&mut self, entity: EntityId, column: u32) {
        if !self.is_active() {
            log::debug!("ignoring front {} spawned while idle", entity.get());
            return;
        }
        let Some(position) = self
            .pending
            .iter()
            .position(|pending| pending.column == column)
        else {
            log::debug!("no pending front for column {column}");
            return;
        };

        let pending = self.pending.remove(position);
        self.fronts.push(DecayFront {
            entity,
            column,
            precise_y: 0.0,
            prev_precise_y: 0.0,
            speed: pending.speed,
            glyph: pending.glyph,
            last_change_row: None,
            latch: None,
            rng: pending.rng,
        });
    }

    fn forget_front(&mut self, entity: EntityId) {
        self.fronts.retain(|front| front.entity != entity);
    }

    fn sweep(
        &mut self,
        dt: Duration,
        occupancy: OccupancyView<'_>,
        letters: &LetterView,
        out: &mut Vec<Command>,
    ) {
        if !self.is_active() {
            return;
        }

        let (columns, rows) = occupancy.dimensions();
        if columns == 0 || rows == 0 {
            return;
        }
        let dims = GridDims::new(columns, rows);
        let dt_secs = dt.min(self.tuning.max_tick).as_secs_f32();

        self.front_ids.clear();
        self.front_ids.extend(self.fronts.iter().map(|front| front.entity));
        self.front_ids.sort_unstable();

        let tuning = &self.tuning;
        let front_ids = &self.front_ids;
        let scratch = &mut self.occupant_scratch;
        let mut dedup = self.dedup.write();
        dedup.decayed.clear();
        dedup.processed.clear();
        dedup.processed.resize(dims.cell_count(), false);

        self.fronts.retain_mut(|front| {
            front.prev_precise_y = front.precise_y;
            front.precise_y += front.speed * dt_secs;

            if front.precise_y >= rows as f32 {
                out.push(Command::MarkForDeath {
                    entity: front.entity,
                });
                return false;
            }

            let first = (front.prev_precise_y.floor().max(0.0) as u32).min(rows - 1);
            let last = (front.precise_y.floor().max(0.0) as u32).min(rows - 1);

            for row in first..=last {
                let cell = CellCoord::new(front.column, row);
                if front.latch == Some(cell) {
                    continue;
                }
                if cell.column() >= columns {
                    break;
                }
                let Some(index) = dims.index_of(cell) else {
                    continue;
                };
                if dedup.processed[index] {
                    // First claim wins; the claiming front fully resolved
                    // this cell already.
                    continue;
                }

                scratch.clear();
                scratch.extend_from_slice(occupancy.occupants(cell));
                for position in 0..scratch.len() {
                    let occupant = scratch[position];
                    if front_ids.binary_search(&occupant).is_ok() {
                        continue;
                    }
                    if dedup.decayed.contains(&occupant) {
                        continue;
                    }
                    resolve_letter(occupant, letters, out);
                    let _ = dedup.decayed.insert(occupant);
                }

                dedup.processed[index] = true;
                front.latch = Some(cell);

                if front.last_change_row != Some(row) {
                    front.last_change_row = Some(row);
                    if row > 0 && front.rng.next_unit() < tuning.churn_probability {
                        front.glyph = sample_glyph(&mut front.rng, &tuning.glyph_alphabet);
                    }
                }
            }

            if last != first {
                out.push(Command::MoveDecayFront {
                    entity: front.entity,
                    cell: CellCoord::new(front.column, last),
                });
            }

            true
        });
    }
}

impl Default for Decay {
    fn default() -> Self {
        Self::new(DecayTuning::default())
    }
}

fn resolve_letter(entity: EntityId, letters: &LetterView, out: &mut Vec<Command>) {
    let Some(letter) = letters.get(entity) else {
        log::debug!("occupant {} has no letter state, skipping", entity.get());
        return;
    };

    if letter.nugget {
        out.push(Command::RequestFlash {
            cell: letter.cell,
            glyph: letter.glyph,
        });
        out.push(Command::MarkForDeath { entity });
        return;
    }

    if letter.shielded || matches!(letter.color, LetterColor::Gold) {
        return;
    }

    match transition(letter.color, letter.level) {
        DecayOutcome::Unaffected => {}
        DecayOutcome::Faded { color, level } => {
            out.push(Command::SetLetterState {
                entity,
                color,
                level,
            });
        }
        DecayOutcome::Destroyed => {
            out.push(Command::RequestFlash {
                cell: letter.cell,
                glyph: letter.glyph,
            });
            out.push(Command::MarkForDeath { entity });
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WavePhase {
    Idle,
    Active { wave: WaveId },
}

#[derive(Debug)]
struct PendingFront {
    column: u32,
    speed: f32,
    glyph: Glyph,
    rng: SplitMix64,
}

#[derive(Debug)]
struct DecayFront {
    entity: EntityId,
    column: u32,
    precise_y: f32,
    prev_precise_y: f32,
    speed: f32,
    glyph: Glyph,
    last_change_row: Option<u32>,
    latch: Option<CellCoord>,
    rng: SplitMix64,
}

#[derive(Debug, Default)]
struct TickDedup {
    decayed: HashSet<EntityId>,
    processed: Vec<bool>,
}

fn sample_glyph(rng: &mut SplitMix64, alphabet: &[char]) -> Glyph {
    let index = (rng.next_u64() % alphabet.len() as u64) as usize;
    Glyph::new(alphabet[index])
}

fn derive_wave_seed(global_seed: u64, wave: WaveId) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(global_seed.to_le_bytes());
    hasher.update(WAVE_SEED_LABEL.as_bytes());
    hasher.update(wave.get().to_le_bytes());
    finalize_seed(hasher)
}

fn derive_column_seed(wave_seed: u64, column: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(wave_seed.to_le_bytes());
    hasher.update(COLUMN_SEED_LABEL.as_bytes());
    hasher.update(column.to_le_bytes());
    finalize_seed(hasher)
}

fn finalize_seed(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let bytes: [u8; 8] = digest[0..8].try_into().expect("sha256 digest slice length");
    u64::from_le_bytes(bytes)
}

#[derive(Debug)]
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        let seed = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    fn next_unit(&mut self) -> f64 {
        const SCALE: f64 = 1.0 / ((1u64 << 53) as f64);
        let value = self.next_u64() >> 11;
        (value as f64) * SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_front(entity: u32, column: u32, speed: f32) -> DecayFront {
        DecayFront {
            entity: EntityId::new(entity),
            column,
            precise_y: 0.0,
            prev_precise_y: 0.0,
            speed,
            glyph: Glyph::new('#'),
            last_change_row: None,
            latch: None,
            rng: SplitMix64::new(1),
        }
    }

    fn active_decay_with_fronts(fronts: Vec<DecayFront>) -> Decay {
        let mut decay = Decay::default();
        decay.phase = WavePhase::Active {
            wave: WaveId::new(0),
        };
        decay.fronts = fronts;
        decay
    }

    fn letter_snapshot(entity: u32, cell: CellCoord) -> glyphfall_core::LetterSnapshot {
        glyphfall_core::LetterSnapshot {
            id: EntityId::new(entity),
            cell,
            color: LetterColor::Blue,
            level: FadeLevel::Bright,
            glyph: Glyph::new('q'),
            nugget: false,
            shielded: false,
        }
    }

    #[test]
    fn transition_table_covers_the_full_chain() {
        use FadeLevel::{Bright, Dark, Normal};
        use LetterColor::{Blue, Gold, Green, Red};

        for color in [Blue, Green, Red] {
            assert_eq!(
                transition(color, Bright),
                DecayOutcome::Faded {
                    color,
                    level: Normal
                }
            );
            assert_eq!(
                transition(color, Normal),
                DecayOutcome::Faded { color, level: Dark }
            );
        }
        assert_eq!(
            transition(Blue, Dark),
            DecayOutcome::Faded {
                color: Green,
                level: Bright
            }
        );
        assert_eq!(
            transition(Green, Dark),
            DecayOutcome::Faded {
                color: Red,
                level: Bright
            }
        );
        assert_eq!(transition(Red, Dark), DecayOutcome::Destroyed);
        for level in [Bright, Normal, Dark] {
            assert_eq!(transition(Gold, level), DecayOutcome::Unaffected);
        }
    }

    #[test]
    fn trigger_rejects_invalid_configuration() {
        let mut decay = Decay::default();
        let mut out = Vec::new();

        assert_eq!(
            decay.trigger(GridDims::new(0, 10), &mut out),
            Err(TriggerError::EmptyGrid)
        );

        decay.tuning_mut().min_speed = 0.0;
        assert_eq!(
            decay.trigger(GridDims::new(4, 10), &mut out),
            Err(TriggerError::InvalidSpeedRange { min: 0.0, max: 9.0 })
        );

        decay.tuning_mut().min_speed = 6.0;
        decay.tuning_mut().max_speed = 2.0;
        assert_eq!(
            decay.trigger(GridDims::new(4, 10), &mut out),
            Err(TriggerError::InvalidSpeedRange { min: 6.0, max: 2.0 })
        );

        decay.tuning_mut().max_speed = 6.0;
        decay.tuning_mut().glyph_alphabet.clear();
        assert_eq!(
            decay.trigger(GridDims::new(4, 10), &mut out),
            Err(TriggerError::EmptyAlphabet)
        );

        assert!(out.is_empty());
        assert!(!decay.is_active());
    }

    #[test]
    fn trigger_spawns_one_front_per_column_and_rejects_reentry() {
        let mut decay = Decay::default();
        let mut out = Vec::new();

        let wave = decay
            .trigger(GridDims::new(3, 8), &mut out)
            .expect("trigger");
        assert_eq!(wave, WaveId::new(0));
        assert_eq!(
            out,
            vec![
                Command::SpawnDecayFront { column: 0 },
                Command::SpawnDecayFront { column: 1 },
                Command::SpawnDecayFront { column: 2 },
            ],
        );
        assert!(decay.is_active());

        assert_eq!(
            decay.trigger(GridDims::new(3, 8), &mut out),
            Err(TriggerError::WaveActive)
        );
    }

    #[test]
    fn sampled_speeds_stay_within_the_configured_range() {
        let mut decay = Decay::default();
        let mut out = Vec::new();
        let _ = decay
            .trigger(GridDims::new(16, 8), &mut out)
            .expect("trigger");

        for pending in &decay.pending {
            assert!(pending.speed >= decay.tuning.min_speed);
            assert!(pending.speed <= decay.tuning.max_speed);
            assert!(decay.tuning.glyph_alphabet.contains(&pending.glyph.get()));
        }
    }

    #[test]
    fn converging_fronts_resolve_a_shared_cell_once() {
        // Two fronts erroneously share a column; the second must see the
        // cell claimed and leave the occupant alone.
        let mut decay = active_decay_with_fronts(vec![
            test_front(10, 0, 10.0),
            test_front(11, 0, 10.0),
        ]);

        let letter = letter_snapshot(5, CellCoord::new(0, 0));
        let letters = LetterView::from_snapshots(vec![letter]);
        let cells = vec![vec![EntityId::new(5), EntityId::new(10), EntityId::new(11)]];
        let occupancy = OccupancyView::new(&cells, 1, 1);

        let mut out = Vec::new();
        let mut signals = Vec::new();
        decay.handle(
            &[Event::TimeAdvanced {
                dt: Duration::from_millis(16),
            }],
            occupancy,
            &letters,
            &mut out,
            &mut signals,
        );

        let state_writes = out
            .iter()
            .filter(|command| matches!(command, Command::SetLetterState { .. }))
            .count();
        assert_eq!(state_writes, 1);
        assert_eq!(decay.decayed_this_tick(), vec![EntityId::new(5)]);
        assert_eq!(decay.cells_processed_this_tick(), 1);
    }

    #[test]
    fn fronts_exclude_each_other_from_collision() {
        let mut decay = active_decay_with_fronts(vec![
            test_front(10, 0, 10.0),
            test_front(11, 0, 10.0),
        ]);

        let letters = LetterView::from_snapshots(Vec::new());
        let cells = vec![vec![EntityId::new(10), EntityId::new(11)]];
        let occupancy = OccupancyView::new(&cells, 1, 1);

        let mut out = Vec::new();
        let mut signals = Vec::new();
        decay.handle(
            &[Event::TimeAdvanced {
                dt: Duration::from_millis(16),
            }],
            occupancy,
            &letters,
            &mut out,
            &mut signals,
        );

        assert!(decay.decayed_this_tick().is_empty());
        assert!(out
            .iter()
            .all(|command| !matches!(command, Command::SetLetterState { .. })));
    }

    #[test]
    fn latch_prevents_reprocessing_across_ticks_within_a_row() {
        // Slow front lingering inside row 0: the dedup sets reset every
        // tick, so only the latch keeps the letter from decaying twice.
        let mut decay = active_decay_with_fronts(vec![test_front(10, 0, 1.0)]);

        let letter = letter_snapshot(5, CellCoord::new(0, 0));
        let letters = LetterView::from_snapshots(vec![letter]);
        let cells = vec![vec![EntityId::new(5)], Vec::new(), Vec::new()];
        let occupancy = OccupancyView::new(&cells, 1, 3);

        let mut out = Vec::new();
        let mut signals = Vec::new();
        let tick = [Event::TimeAdvanced {
            dt: Duration::from_millis(50),
        }];
        decay.handle(&tick, occupancy, &letters, &mut out, &mut signals);
        decay.handle(&tick, occupancy, &letters, &mut out, &mut signals);
        decay.handle(&tick, occupancy, &letters, &mut out, &mut signals);

        let state_writes = out
            .iter()
            .filter(|command| matches!(command, Command::SetLetterState { .. }))
            .count();
        assert_eq!(state_writes, 1);
    }

    #[test]
    fn boundary_exit_marks_the_front_for_deferred_death() {
        let mut decay = active_decay_with_fronts(vec![test_front(10, 0, 40.0)]);

        let letters = LetterView::from_snapshots(Vec::new());
        let cells = vec![Vec::new(), Vec::new()];
        let occupancy = OccupancyView::new(&cells, 1, 2);

        let mut out = Vec::new();
        let mut signals = Vec::new();
        decay.handle(
            &[Event::TimeAdvanced {
                dt: Duration::from_millis(100),
            }],
            occupancy,
            &letters,
            &mut out,
            &mut signals,
        );

        assert_eq!(
            out,
            vec![Command::MarkForDeath {
                entity: EntityId::new(10),
            }],
        );
        assert_eq!(
            signals,
            vec![DecaySignal::WaveCompleted {
                wave: WaveId::new(0),
            }],
        );
        assert!(!decay.is_active());
    }

    #[test]
    fn dt_clamp_bounds_the_swept_distance() {
        // 2 rows/s over a spiked 10 s frame: the clamp holds the sweep to
        // max_tick, so the front stays inside the grid.
        let mut decay = active_decay_with_fronts(vec![test_front(10, 0, 2.0)]);

        let letters = LetterView::from_snapshots(Vec::new());
        let cells = vec![Vec::new(); 30];
        let occupancy = OccupancyView::new(&cells, 1, 30);

        let mut out = Vec::new();
        let mut signals = Vec::new();
        decay.handle(
            &[Event::TimeAdvanced {
                dt: Duration::from_secs(10),
            }],
            occupancy,
            &letters,
            &mut out,
            &mut signals,
        );

        assert!(signals.is_empty());
        assert_eq!(decay.front_snapshots().len(), 1);
        assert_eq!(decay.front_snapshots()[0].row, 0);
        assert_eq!(decay.cells_processed_this_tick(), 1);
    }

    #[test]
    fn externally_destroyed_fronts_are_dropped_from_the_store() {
        let mut decay = active_decay_with_fronts(vec![
            test_front(10, 0, 5.0),
            test_front(11, 1, 5.0),
        ]);

        let letters = LetterView::from_snapshots(Vec::new());
        let cells = vec![Vec::new(), Vec::new()];
        let occupancy = OccupancyView::new(&cells, 2, 1);

        let mut out = Vec::new();
        let mut signals = Vec::new();
        decay.handle(
            &[Event::EntityDestroyed {
                entity: EntityId::new(10),
                cell: CellCoord::new(0, 0),
            }],
            occupancy,
            &letters,
            &mut out,
            &mut signals,
        );

        assert_eq!(decay.front_snapshots().len(), 1);
        assert_eq!(decay.front_snapshots()[0].entity, EntityId::new(11));
        assert!(signals.is_empty());
    }

    #[test]
    fn idle_handle_is_a_strict_no_op() {
        let mut decay = Decay::default();
        let letters = LetterView::from_snapshots(vec![letter_snapshot(5, CellCoord::new(0, 0))]);
        let cells = vec![vec![EntityId::new(5)]];
        let occupancy = OccupancyView::new(&cells, 1, 1);

        let mut out = Vec::new();
        let mut signals = Vec::new();
        decay.handle(
            &[Event::TimeAdvanced {
                dt: Duration::from_millis(16),
            }],
            occupancy,
            &letters,
            &mut out,
            &mut signals,
        );

        assert!(out.is_empty());
        assert!(signals.is_empty());
        assert!(decay.decayed_this_tick().is_empty());
    }

    #[test]
    fn cancel_marks_fronts_for_death_and_suppresses_completion() {
        let mut decay = active_decay_with_fronts(vec![
            test_front(10, 0, 5.0),
            test_front(11, 1, 5.0),
        ]);

        let mut out = Vec::new();
        decay.cancel(&mut out);
        assert_eq!(
            out,
            vec![
                Command::MarkForDeath {
                    entity: EntityId::new(10),
                },
                Command::MarkForDeath {
                    entity: EntityId::new(11),
                },
            ],
        );
        assert!(!decay.is_active());

        let letters = LetterView::from_snapshots(Vec::new());
        let cells = vec![Vec::new(), Vec::new()];
        let occupancy = OccupancyView::new(&cells, 2, 1);
        let mut signals = Vec::new();
        out.clear();
        decay.handle(
            &[Event::TimeAdvanced {
                dt: Duration::from_millis(16),
            }],
            occupancy,
            &letters,
            &mut out,
            &mut signals,
        );
        assert!(signals.is_empty());
        assert!(out.is_empty());

        out.clear();
        decay.cancel(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn wave_seeds_differ_between_waves_and_columns() {
        let first = derive_wave_seed(7, WaveId::new(0));
        let second = derive_wave_seed(7, WaveId::new(1));
        assert_ne!(first, second);
        assert_ne!(derive_column_seed(first, 0), derive_column_seed(first, 1));
        assert_eq!(first, derive_wave_seed(7, WaveId::new(0)));
    }
}
