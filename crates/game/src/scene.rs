//! The built-in test arena.

use glam::Vec2;

use crate::cosmos::{Character, Cosmos, EntityId, SeededRandom, Vehicle};
use crate::error::CosmosError;
use crate::step::{GameIntent, PlayerEntropy};

const VEHICLE_ROWS: u32 = 2;
const VEHICLES_PER_ROW: u32 = 4;
const VEHICLE_SPACING: f32 = 260.0;
const PARKING_JITTER: f32 = 30.0;
const SPAWN_RING_RADIUS: f32 = 180.0;
const SPAWN_RING_SLOTS: u32 = 8;

/// Parks a few vehicles around the middle of the arena.
///
/// Placement jitter comes from the cosmos generator, so every peer that
/// populates the same seed ends up with the same scene.
pub fn populate_test_scene(cosmos: &mut Cosmos) -> Result<Vec<EntityId>, CosmosError> {
    let mut vehicles = Vec::new();
    let origin = Vec2::new(
        -VEHICLE_SPACING * (VEHICLES_PER_ROW - 1) as f32 / 2.0,
        -cosmos.settings().arena_half_extent.y / 2.0,
    );

    for row in 0..VEHICLE_ROWS {
        for column in 0..VEHICLES_PER_ROW {
            let jitter = Vec2::new(
                cosmos.rng_mut().next_signed(),
                cosmos.rng_mut().next_signed(),
            ) * PARKING_JITTER;
            let position = origin
                + Vec2::new(column as f32, row as f32 * 2.0) * VEHICLE_SPACING
                + jitter;
            vehicles.push(cosmos.spawn(Vehicle::at(position))?.id());
        }
    }

    log::debug!("test scene: {} vehicles", vehicles.len());
    Ok(vehicles)
}

/// Ring position for the `index`-th player to join.
pub fn spawn_point(index: u32) -> Vec2 {
    // Precomputed unit directions keep this free of trigonometry.
    const RING: [Vec2; SPAWN_RING_SLOTS as usize] = [
        Vec2::new(1.0, 0.0),
        Vec2::new(0.707_106_77, 0.707_106_77),
        Vec2::new(0.0, 1.0),
        Vec2::new(-0.707_106_77, 0.707_106_77),
        Vec2::new(-1.0, 0.0),
        Vec2::new(-0.707_106_77, -0.707_106_77),
        Vec2::new(0.0, -1.0),
        Vec2::new(0.707_106_77, -0.707_106_77),
    ];
    let lap = (index / SPAWN_RING_SLOTS) as f32 + 1.0;
    RING[(index % SPAWN_RING_SLOTS) as usize] * SPAWN_RING_RADIUS * lap
}

/// Spawns a character for a newly joined player.
pub fn spawn_player(cosmos: &mut Cosmos) -> Result<EntityId, CosmosError> {
    let index = cosmos.pool::<Character>().len() as u32;
    let id = cosmos.spawn(Character::at(spawn_point(index)))?.id();
    log::info!("spawned {id} at step {}", cosmos.step());
    Ok(id)
}

const BOT_MOVES: [GameIntent; 4] = [
    GameIntent::MoveForward,
    GameIntent::MoveRight,
    GameIntent::MoveBackward,
    GameIntent::MoveLeft,
];

/// Wanders around and shoots in bursts. Drives headless peers.
#[derive(Debug, Clone)]
pub struct ScriptedBot {
    rng: SeededRandom,
    heading: Option<GameIntent>,
    steps_left: u32,
    shooting: bool,
}

impl ScriptedBot {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: SeededRandom::new(seed),
            heading: None,
            steps_left: 0,
            shooting: false,
        }
    }

    /// Input for the next step.
    pub fn next_input(&mut self) -> PlayerEntropy {
        let mut input = PlayerEntropy::default();

        if self.steps_left == 0 {
            if let Some(previous) = self.heading.take() {
                input.release(previous);
            }
            let heading = BOT_MOVES[self.rng.next_below(BOT_MOVES.len() as u32) as usize];
            input.press(heading);
            self.heading = Some(heading);
            self.steps_left = 20 + self.rng.next_below(60);

            if self.shooting {
                input.release(GameIntent::Shoot);
                self.shooting = false;
            } else if self.rng.next_below(3) == 0 {
                input.press(GameIntent::Shoot);
                self.shooting = true;
            }
        }
        self.steps_left -= 1;

        let sweep = self.rng.next_below(9) as i16 - 4;
        input.add_motion(sweep, 0);
        input
    }
}
