#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state management for Glyphfall.
//!
//! The world owns the letter store, the multi-occupant spatial occupancy
//! index, and the deferred-destruction death row. All mutation flows through
//! [`apply`]; systems observe the results through [`query`] and the event
//! stream.

use std::time::Duration;

use glyphfall_core::{
    CellCoord, Command, EntityId, EntityKind, Event, FadeLevel, Glyph, GridDims, LetterColor,
    SpawnError,
};

const DEFAULT_GRID: GridDims = GridDims::new(32, 18);

/// Represents the authoritative Glyphfall world state.
#[derive(Debug)]
pub struct World {
    dims: GridDims,
    letters: Vec<Letter>,
    fronts: Vec<Front>,
    occupancy: OccupancyGrid,
    death_row: Vec<EntityId>,
    next_entity: u32,
}

impl World {
    /// Creates a new Glyphfall world with the default grid dimensions.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dims(DEFAULT_GRID)
    }

    fn with_dims(dims: GridDims) -> Self {
        Self {
            dims,
            letters: Vec::new(),
            fronts: Vec::new(),
            occupancy: OccupancyGrid::new(dims),
            death_row: Vec::new(),
            next_entity: 0,
        }
    }

    fn allocate_entity(&mut self) -> EntityId {
        let entity = EntityId::new(self.next_entity);
        self.next_entity = self.next_entity.wrapping_add(1);
        entity
    }

    fn letter_mut(&mut self, entity: EntityId) -> Option<&mut Letter> {
        self.letters.iter_mut().find(|letter| letter.id == entity)
    }

    fn letter_at(&self, cell: CellCoord) -> Option<&Letter> {
        self.letters.iter().find(|letter| letter.cell == cell)
    }

    fn kind_of(&self, entity: EntityId) -> Option<EntityKind> {
        if self.letters.iter().any(|letter| letter.id == entity) {
            return Some(EntityKind::Letter);
        }
        if self.fronts.iter().any(|front| front.id == entity) {
            return Some(EntityKind::DecayFront);
        }
        None
    }

    fn cull(&mut self, out_events: &mut Vec<Event>) {
        let condemned: Vec<EntityId> = self.death_row.drain(..).collect();
        for entity in condemned {
            if let Some(position) = self.letters.iter().position(|letter| letter.id == entity) {
                let letter = self.letters.remove(position);
                self.occupancy.vacate(entity, letter.cell);
                out_events.push(Event::EntityDestroyed {
                    entity,
                    cell: letter.cell,
                });
                continue;
            }

            if let Some(position) = self.fronts.iter().position(|front| front.id == entity) {
                let front = self.fronts.remove(position);
                self.occupancy.vacate(entity, front.cell);
                out_events.push(Event::EntityDestroyed {
                    entity,
                    cell: front.cell,
                });
                continue;
            }

            log::debug!("cull skipped unknown entity {}", entity.get());
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::ConfigureGrid { dims } => {
            *world = World::with_dims(dims);
            out_events.push(Event::GridConfigured { dims });
        }
        Command::Tick { dt } => {
            for letter in world.letters.iter_mut() {
                letter.shield = letter.shield.and_then(|remaining| {
                    let left = remaining.saturating_sub(dt);
                    (!left.is_zero()).then_some(left)
                });
            }
            out_events.push(Event::TimeAdvanced { dt });
        }
        Command::SpawnLetter {
            cell,
            color,
            level,
            glyph,
            nugget,
        } => {
            if !world.dims.contains(cell) {
                out_events.push(Event::LetterSpawnRejected {
                    cell,
                    reason: SpawnError::OutOfBounds,
                });
                return;
            }
            if world.letter_at(cell).is_some() {
                out_events.push(Event::LetterSpawnRejected {
                    cell,
                    reason: SpawnError::Occupied,
                });
                return;
            }

            let entity = world.allocate_entity();
            world.letters.push(Letter {
                id: entity,
                cell,
                color,
                level,
                glyph,
                nugget,
                shield: None,
            });
            world.occupancy.occupy(entity, cell);
            out_events.push(Event::LetterSpawned {
                entity,
                cell,
                color,
                level,
                glyph,
                nugget,
            });
        }
        Command::ShieldLetter { entity, duration } => {
            let Some(letter) = world.letter_mut(entity) else {
                log::debug!("shield skipped unknown letter {}", entity.get());
                return;
            };
            letter.shield = Some(match letter.shield {
                Some(remaining) => remaining.max(duration),
                None => duration,
            });
            out_events.push(Event::LetterShielded { entity, duration });
        }
        Command::SpawnDecayFront { column } => {
            let cell = CellCoord::new(column, 0);
            if !world.dims.contains(cell) {
                log::debug!("front spawn skipped out-of-range column {column}");
                return;
            }

            let entity = world.allocate_entity();
            world.fronts.push(Front { id: entity, cell });
            world.occupancy.occupy(entity, cell);
            out_events.push(Event::DecayFrontSpawned { entity, column });
        }
        Command::MoveDecayFront { entity, cell } => {
            if !world.dims.contains(cell) {
                log::debug!("front move skipped out-of-bounds cell for {}", entity.get());
                return;
            }
            let Some(front) = world.fronts.iter_mut().find(|front| front.id == entity) else {
                log::debug!("front move skipped unknown front {}", entity.get());
                return;
            };

            let from = front.cell;
            front.cell = cell;
            world.occupancy.relocate(entity, from, cell);
            out_events.push(Event::DecayFrontMoved { entity, from, to: cell });
        }
        Command::SetLetterState {
            entity,
            color,
            level,
        } => {
            let Some(letter) = world.letter_mut(entity) else {
                log::debug!("state write skipped unknown letter {}", entity.get());
                return;
            };
            letter.color = color;
            letter.level = level;
            out_events.push(Event::LetterStateChanged {
                entity,
                color,
                level,
            });
        }
        Command::MarkForDeath { entity } => {
            if world.kind_of(entity).is_none() {
                log::debug!("death mark skipped unknown entity {}", entity.get());
                return;
            }
            if let Err(position) = world.death_row.binary_search(&entity) {
                world.death_row.insert(position, entity);
                out_events.push(Event::MarkedForDeath { entity });
            }
        }
        Command::RequestFlash { cell, glyph } => {
            out_events.push(Event::FlashRequested { cell, glyph });
        }
        Command::Cull => {
            world.cull(out_events);
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use super::World;
    use glyphfall_core::{EntityId, EntityKind, GridDims, LetterSnapshot, LetterView, OccupancyView};

    /// Retrieves the dimensions of the configured grid.
    #[must_use]
    pub fn grid_dims(world: &World) -> GridDims {
        world.dims
    }

    /// Captures a read-only view of the letters on the grid.
    #[must_use]
    pub fn letter_view(world: &World) -> LetterView {
        let snapshots: Vec<LetterSnapshot> = world
            .letters
            .iter()
            .map(|letter| LetterSnapshot {
                id: letter.id,
                cell: letter.cell,
                color: letter.color,
                level: letter.level,
                glyph: letter.glyph,
                nugget: letter.nugget,
                shielded: letter.shield.is_some(),
            })
            .collect();
        LetterView::from_snapshots(snapshots)
    }

    /// Exposes a read-only view of the multi-occupant occupancy grid.
    #[must_use]
    pub fn occupancy_view(world: &World) -> OccupancyView<'_> {
        OccupancyView::new(
            world.occupancy.cells(),
            world.dims.columns(),
            world.dims.rows(),
        )
    }

    /// Reports the kind of the provided entity, if it is alive.
    #[must_use]
    pub fn entity_kind(world: &World, entity: EntityId) -> Option<EntityKind> {
        world.kind_of(entity)
    }

    /// Lists the entities currently tagged for deferred destruction.
    #[must_use]
    pub fn death_row(world: &World) -> &[EntityId] {
        &world.death_row
    }

    /// Reports the remaining protection-mask duration for a letter, if any.
    #[must_use]
    pub fn shield_remaining(world: &World, entity: EntityId) -> Option<Duration> {
        world
            .letters
            .iter()
            .find(|letter| letter.id == entity)
            .and_then(|letter| letter.shield)
    }
}

#[derive(Clone, Copy, Debug)]
struct Letter {
    id: EntityId,
    cell: CellCoord,
    color: LetterColor,
    level: FadeLevel,
    glyph: Glyph,
    nugget: bool,
    shield: Option<Duration>,
}

#[derive(Clone, Copy, Debug)]
struct Front {
    id: EntityId,
    cell: CellCoord,
}

#[derive(Debug)]
struct OccupancyGrid {
    dims: GridDims,
    cells: Vec<Vec<EntityId>>,
}

impl OccupancyGrid {
    fn new(dims: GridDims) -> Self {
        Self {
            dims,
            cells: vec![Vec::new(); dims.cell_count()],
        }
    }

    fn occupy(&mut self, entity: EntityId, cell: CellCoord) {
        if let Some(index) = self.dims.index_of(cell) {
            if let Some(slot) = self.cells.get_mut(index) {
                slot.push(entity);
            }
        }
    }

    fn vacate(&mut self, entity: EntityId, cell: CellCoord) {
        if let Some(index) = self.dims.index_of(cell) {
            if let Some(slot) = self.cells.get_mut(index) {
                slot.retain(|occupant| *occupant != entity);
            }
        }
    }

    fn relocate(&mut self, entity: EntityId, from: CellCoord, to: CellCoord) {
        self.vacate(entity, from);
        self.occupy(entity, to);
    }

    fn cells(&self) -> &[Vec<EntityId>] {
        &self.cells
    }
}
