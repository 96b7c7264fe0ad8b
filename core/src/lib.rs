#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Glyphfall engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and the decay system. Callers submit [`Command`]
//! values describing desired mutations, the world executes those commands
//! via its `apply` entry point, and then broadcasts [`Event`] values for
//! systems to react to deterministically. Systems consume event streams,
//! query immutable snapshots, and respond exclusively with new command
//! batches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique identifier assigned to a grid entity.
///
/// Letters and decay fronts share one identifier space because both occupy
/// the same spatial index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier assigned to one triggered decay wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WaveId(u32);

impl WaveId {
    /// Creates a new wave identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the wave identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }
}

/// Dimensions of the character grid measured in whole cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridDims {
    columns: u32,
    rows: u32,
}

impl GridDims {
    /// Creates a new grid dimension descriptor.
    #[must_use]
    pub const fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    /// Number of columns laid out in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows laid out in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Total number of cells contained in the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        let count = u64::from(self.columns) * u64::from(self.rows);
        usize::try_from(count).unwrap_or(0)
    }

    /// Reports whether the provided cell lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.column() < self.columns && cell.row() < self.rows
    }

    /// Computes the flattened row-major index of the provided cell.
    #[must_use]
    pub fn index_of(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }
}

/// Color assigned to a letter, ordered along the decay demotion chain.
///
/// Decay demotes `Blue` to `Green` and `Green` to `Red`; a `Red` letter at
/// the darkest fade level is destroyed. `Gold` sits outside the chain and is
/// immune to decay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterColor {
    /// Freshest chain color; two full fades away from destruction.
    Blue,
    /// Middle chain color.
    Green,
    /// Final chain color; fading out of `Red` destroys the letter.
    Red,
    /// Protected terminal color, never demoted and never destroyed by decay.
    Gold,
}

impl LetterColor {
    /// Returns the next color along the demotion chain, if any.
    ///
    /// `Red` has no successor (the letter is destroyed instead) and `Gold`
    /// never participates in the chain.
    #[must_use]
    pub const fn demoted(self) -> Option<Self> {
        match self {
            Self::Blue => Some(Self::Green),
            Self::Green => Some(Self::Red),
            Self::Red | Self::Gold => None,
        }
    }
}

/// Three-step fade scale within a single letter color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FadeLevel {
    /// Freshest level.
    Bright,
    /// Intermediate level.
    Normal,
    /// Most decayed level; the next fade leaves the current color.
    Dark,
}

impl FadeLevel {
    /// Returns the next dimmer level, if any.
    #[must_use]
    pub const fn dimmer(self) -> Option<Self> {
        match self {
            Self::Bright => Some(Self::Normal),
            Self::Normal => Some(Self::Dark),
            Self::Dark => None,
        }
    }
}

/// Visual character displayed for a grid entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Glyph(char);

impl Glyph {
    /// Creates a new glyph wrapping the provided character.
    #[must_use]
    pub const fn new(value: char) -> Self {
        Self(value)
    }

    /// Retrieves the wrapped character.
    #[must_use]
    pub const fn get(&self) -> char {
        self.0
    }
}

/// Kind of entity registered in the spatial occupancy index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Stationary letter target.
    Letter,
    /// Falling decay wave front.
    DecayFront,
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Configures the world's character grid, clearing all entities.
    ConfigureGrid {
        /// Dimensions of the rebuilt grid.
        dims: GridDims,
    },
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Requests that a letter be created at the provided cell.
    SpawnLetter {
        /// Cell the letter should occupy.
        cell: CellCoord,
        /// Chain color assigned at spawn.
        color: LetterColor,
        /// Fade level assigned at spawn.
        level: FadeLevel,
        /// Character displayed for the letter.
        glyph: Glyph,
        /// Marks a nugget letter that decay destroys outright.
        nugget: bool,
    },
    /// Grants or extends a letter's time-bounded protection mask.
    ShieldLetter {
        /// Identifier of the letter to protect.
        entity: EntityId,
        /// Duration the protection mask should last from now.
        duration: Duration,
    },
    /// Requests that a decay front be created at the top of a column.
    ///
    /// The front's glyph and physics live in the decay system's wave store;
    /// the world only tracks the front's identity and occupancy.
    SpawnDecayFront {
        /// Column the front will sweep.
        column: u32,
    },
    /// Relocates a decay front's entry in the spatial occupancy index.
    MoveDecayFront {
        /// Identifier of the front being moved.
        entity: EntityId,
        /// Cell the front now occupies.
        cell: CellCoord,
    },
    /// Writes a decay-state-machine result into the letter store.
    SetLetterState {
        /// Identifier of the letter being rewritten.
        entity: EntityId,
        /// Chain color after the transition.
        color: LetterColor,
        /// Fade level after the transition.
        level: FadeLevel,
    },
    /// Tags an entity for deferred destruction by the cull pass.
    MarkForDeath {
        /// Identifier of the entity to destroy.
        entity: EntityId,
    },
    /// Requests a destruction flash for visual-effects adapters.
    RequestFlash {
        /// Cell the flash should appear at.
        cell: CellCoord,
        /// Character the flash should display.
        glyph: Glyph,
    },
    /// Destroys every death-tagged entity and vacates its occupancy.
    Cull,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Announces that the grid was rebuilt with new dimensions.
    GridConfigured {
        /// Dimensions of the rebuilt grid.
        dims: GridDims,
    },
    /// Confirms that a letter was created.
    LetterSpawned {
        /// Identifier assigned to the letter by the world.
        entity: EntityId,
        /// Cell the letter occupies.
        cell: CellCoord,
        /// Chain color assigned at spawn.
        color: LetterColor,
        /// Fade level assigned at spawn.
        level: FadeLevel,
        /// Character displayed for the letter.
        glyph: Glyph,
        /// Whether the letter is a nugget.
        nugget: bool,
    },
    /// Reports that a letter spawn request was rejected.
    LetterSpawnRejected {
        /// Cell provided in the spawn request.
        cell: CellCoord,
        /// Specific reason the spawn failed.
        reason: SpawnError,
    },
    /// Confirms that a letter's protection mask was granted or extended.
    LetterShielded {
        /// Identifier of the protected letter.
        entity: EntityId,
        /// Duration of the protection mask from now.
        duration: Duration,
    },
    /// Confirms that a decay front was created at the top of a column.
    DecayFrontSpawned {
        /// Identifier assigned to the front by the world.
        entity: EntityId,
        /// Column the front will sweep.
        column: u32,
    },
    /// Confirms that a decay front's occupancy entry moved.
    DecayFrontMoved {
        /// Identifier of the front that moved.
        entity: EntityId,
        /// Cell the front occupied before moving.
        from: CellCoord,
        /// Cell the front occupies after moving.
        to: CellCoord,
    },
    /// Confirms that a letter's color or fade level changed.
    LetterStateChanged {
        /// Identifier of the rewritten letter.
        entity: EntityId,
        /// Chain color after the transition.
        color: LetterColor,
        /// Fade level after the transition.
        level: FadeLevel,
    },
    /// Confirms that an entity was tagged for deferred destruction.
    MarkedForDeath {
        /// Identifier of the tagged entity.
        entity: EntityId,
    },
    /// Relays a destruction flash to visual-effects adapters.
    FlashRequested {
        /// Cell the flash should appear at.
        cell: CellCoord,
        /// Character the flash should display.
        glyph: Glyph,
    },
    /// Confirms that the cull pass destroyed an entity.
    EntityDestroyed {
        /// Identifier of the destroyed entity.
        entity: EntityId,
        /// Cell the entity occupied when destroyed.
        cell: CellCoord,
    },
}

/// Reasons a letter spawn request may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnError {
    /// The requested cell lies outside the configured grid.
    OutOfBounds,
    /// Another letter already occupies the requested cell.
    Occupied,
}

/// Immutable representation of a single letter's state used for queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LetterSnapshot {
    /// Unique identifier assigned to the letter.
    pub id: EntityId,
    /// Grid cell currently occupied by the letter.
    pub cell: CellCoord,
    /// Chain color currently assigned to the letter.
    pub color: LetterColor,
    /// Fade level currently assigned to the letter.
    pub level: FadeLevel,
    /// Character displayed for the letter.
    pub glyph: Glyph,
    /// Whether the letter is a nugget.
    pub nugget: bool,
    /// Whether an unexpired protection mask currently covers the letter.
    pub shielded: bool,
}

/// Read-only snapshot describing all letters on the grid.
#[derive(Clone, Debug, Default)]
pub struct LetterView {
    snapshots: Vec<LetterSnapshot>,
}

impl LetterView {
    /// Creates a new letter view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<LetterSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured letter snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &LetterSnapshot> {
        self.snapshots.iter()
    }

    /// Looks up the snapshot for the provided letter, if present.
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&LetterSnapshot> {
        self.snapshots
            .binary_search_by_key(&entity, |snapshot| snapshot.id)
            .ok()
            .map(|index| &self.snapshots[index])
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<LetterSnapshot> {
        self.snapshots
    }
}

/// Read-only view into the dense multi-occupant occupancy grid.
#[derive(Clone, Copy, Debug)]
pub struct OccupancyView<'a> {
    cells: &'a [Vec<EntityId>],
    columns: u32,
    rows: u32,
}

const NO_OCCUPANTS: &[EntityId] = &[];

impl<'a> OccupancyView<'a> {
    /// Captures a new occupancy view backed by the provided cell slice.
    #[must_use]
    pub fn new(cells: &'a [Vec<EntityId>], columns: u32, rows: u32) -> Self {
        Self {
            cells,
            columns,
            rows,
        }
    }

    /// Returns every entity occupying the provided cell, in insertion order.
    ///
    /// Out-of-bounds cells yield an empty slice. The returned slice borrows
    /// the underlying grid, so bulk lookups never allocate.
    #[must_use]
    pub fn occupants(&self, cell: CellCoord) -> &'a [EntityId] {
        match self.index(cell) {
            Some(index) => self.cells.get(index).map_or(NO_OCCUPANTS, Vec::as_slice),
            None => NO_OCCUPANTS,
        }
    }

    /// Provides the dimensions of the underlying occupancy grid.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        GridDims::new(self.columns, self.rows).index_of(cell)
    }
}
