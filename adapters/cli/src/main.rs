#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line harness that drives one decay wave headlessly.
//!
//! Plays the role of the external scheduler: it scatters letters across a
//! grid, triggers a wave, and pumps tick, decay, command, and cull phases
//! until the wave completes, then prints a survival summary.

use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use glyphfall_core::{
    CellCoord, Command, Event, FadeLevel, Glyph, GridDims, LetterColor,
};
use glyphfall_system_decay::{Decay, DecaySignal, DecayTuning};
use glyphfall_world::{self as world, query, World};

const LETTER_GLYPHS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const SPAWN_COLORS: [LetterColor; 4] = [
    LetterColor::Blue,
    LetterColor::Green,
    LetterColor::Red,
    LetterColor::Gold,
];

/// Command-line arguments for the headless decay run.
#[derive(Debug, Parser)]
#[command(name = "glyphfall", about = "Runs one decay wave over a scattered letter grid")]
struct Args {
    /// Number of grid columns.
    #[arg(long, default_value_t = 16)]
    columns: u32,
    /// Number of grid rows.
    #[arg(long, default_value_t = 12)]
    rows: u32,
    /// Number of letters scattered across the grid.
    #[arg(long, default_value_t = 40)]
    letters: usize,
    /// Number of scattered letters marked as nuggets.
    #[arg(long, default_value_t = 2)]
    nuggets: usize,
    /// Root seed for letter placement and wave randomness.
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
    /// Simulated milliseconds per tick.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,
    /// Upper bound on simulated ticks before giving up.
    #[arg(long, default_value_t = 10_000)]
    max_ticks: u64,
}

/// Entry point for the Glyphfall command-line harness.
fn main() -> anyhow::Result<()> {
    env_logger::init();
    run(Args::parse())
}

fn run(args: Args) -> anyhow::Result<()> {
    let dims = GridDims::new(args.columns, args.rows);
    let mut world = World::new();
    let mut events = Vec::new();
    world::apply(&mut world, Command::ConfigureGrid { dims }, &mut events);
    scatter_letters(&mut world, dims, &args, &mut events);
    let spawned = query::letter_view(&world).into_vec().len();

    let mut decay = Decay::new(DecayTuning {
        global_seed: args.seed,
        ..DecayTuning::default()
    });

    let mut commands = Vec::new();
    let wave = decay.trigger(dims, &mut commands)?;
    events.clear();
    for command in commands {
        world::apply(&mut world, command, &mut events);
    }
    {
        let letters = query::letter_view(&world);
        let occupancy = query::occupancy_view(&world);
        let mut follow_up = Vec::new();
        let mut signals = Vec::new();
        decay.handle(&events, occupancy, &letters, &mut follow_up, &mut signals);
    }

    let tick = Duration::from_millis(args.tick_ms);
    let mut flashes = 0usize;
    let mut ticks = 0u64;
    while decay.is_active() {
        if ticks >= args.max_ticks {
            bail!("wave failed to complete within {} ticks", args.max_ticks);
        }

        let mut tick_events = Vec::new();
        world::apply(&mut world, Command::Tick { dt: tick }, &mut tick_events);

        let mut tick_commands = Vec::new();
        let mut signals = Vec::new();
        {
            let letters = query::letter_view(&world);
            let occupancy = query::occupancy_view(&world);
            decay.handle(
                &tick_events,
                occupancy,
                &letters,
                &mut tick_commands,
                &mut signals,
            );
        }
        for command in tick_commands {
            world::apply(&mut world, command, &mut tick_events);
        }
        world::apply(&mut world, Command::Cull, &mut tick_events);

        flashes += tick_events
            .iter()
            .filter(|event| matches!(event, Event::FlashRequested { .. }))
            .count();
        for signal in signals {
            let DecaySignal::WaveCompleted { wave: completed } = signal;
            log::info!("wave {} completed after {} ticks", completed.get(), ticks + 1);
        }
        ticks += 1;
    }

    let mut survivors = [0usize; 4];
    for letter in query::letter_view(&world).iter() {
        let slot = match letter.color {
            LetterColor::Blue => 0,
            LetterColor::Green => 1,
            LetterColor::Red => 2,
            LetterColor::Gold => 3,
        };
        survivors[slot] += 1;
    }
    let surviving: usize = survivors.iter().sum();

    println!("wave {} swept a {}x{} grid in {ticks} ticks", wave.get(), args.columns, args.rows);
    println!("letters: {spawned} spawned, {surviving} surviving, {flashes} destroyed with a flash");
    println!(
        "survivors by color: blue {}, green {}, red {}, gold {}",
        survivors[0], survivors[1], survivors[2], survivors[3]
    );
    Ok(())
}

fn scatter_letters(world: &mut World, dims: GridDims, args: &Args, events: &mut Vec<Event>) {
    let mut cells: Vec<CellCoord> = Vec::with_capacity(dims.cell_count());
    for row in 0..dims.rows() {
        for column in 0..dims.columns() {
            cells.push(CellCoord::new(column, row));
        }
    }

    let mut rng_state = args.seed;
    for index in (1..cells.len()).rev() {
        rng_state = next_random(rng_state);
        let swap_index = (rng_state % (index as u64 + 1)) as usize;
        cells.swap(index, swap_index);
    }

    let count = args.letters.min(cells.len());
    for (index, cell) in cells.into_iter().take(count).enumerate() {
        rng_state = next_random(rng_state);
        let glyph = LETTER_GLYPHS[(rng_state % LETTER_GLYPHS.len() as u64) as usize] as char;
        world::apply(
            world,
            Command::SpawnLetter {
                cell,
                color: SPAWN_COLORS[index % SPAWN_COLORS.len()],
                level: FadeLevel::Bright,
                glyph: Glyph::new(glyph),
                nugget: index < args.nuggets,
            },
            events,
        );
    }
}

fn next_random(state: u64) -> u64 {
    state
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1)
}
