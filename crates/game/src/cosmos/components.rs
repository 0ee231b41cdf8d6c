use glam::Vec2;
use rkyv::{Archive, Deserialize, Serialize};

use super::id::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    /// Unit vector. Kept as a direction so nothing in the step needs trigonometry.
    pub facing: Vec2,
}

impl Transform {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            facing: Vec2::Y,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::at(Vec2::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct RigidBody {
    pub velocity: Vec2,
    pub mass: f32,
    pub linear_damping: f32,
    pub radius: f32,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            velocity: Vec2::ZERO,
            mass: 1.0,
            linear_damping: 6.0,
            radius: 16.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct Movement {
    pub moving_forward: bool,
    pub moving_backward: bool,
    pub moving_left: bool,
    pub moving_right: bool,
    pub walking_enabled: bool,
    pub sprint_enabled: bool,
    pub acceleration: f32,
    pub max_speed: f32,
}

impl Movement {
    pub fn with_limits(acceleration: f32, max_speed: f32) -> Self {
        Self {
            moving_forward: false,
            moving_backward: false,
            moving_left: false,
            moving_right: false,
            walking_enabled: false,
            sprint_enabled: false,
            acceleration,
            max_speed,
        }
    }

    /// Unnormalized input direction. +Y is forward.
    pub fn input_direction(&self) -> Vec2 {
        let axis = |positive: bool, negative: bool| positive as i8 as f32 - negative as i8 as f32;
        Vec2::new(
            axis(self.moving_right, self.moving_left),
            axis(self.moving_forward, self.moving_backward),
        )
    }
}

impl Default for Movement {
    fn default() -> Self {
        Self::with_limits(2400.0, 320.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum OrbitMode {
    /// The owner turns toward the crosshair.
    Look,
    /// The crosshair moves freely without turning the owner.
    Angled,
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct Crosshair {
    pub base_offset: Vec2,
    pub sensitivity: f32,
    pub max_distance: f32,
    pub orbit_mode: OrbitMode,
}

impl Default for Crosshair {
    fn default() -> Self {
        Self {
            base_offset: Vec2::new(0.0, 100.0),
            sensitivity: 1.0,
            max_distance: 800.0,
            orbit_mode: OrbitMode::Look,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct Sentience {
    pub health: f32,
    pub max_health: f32,
    pub consciousness: f32,
    pub max_consciousness: f32,
}

impl Sentience {
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

impl Default for Sentience {
    fn default() -> Self {
        Self {
            health: 100.0,
            max_health: 100.0,
            consciousness: 100.0,
            max_consciousness: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct Driver {
    pub owned_vehicle: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct Seat {
    pub occupant: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct Gun {
    pub cooldown_steps: u32,
    pub remaining_cooldown: u32,
    pub muzzle_speed: f32,
    /// Lateral deviation per unit of travel at full spread.
    pub spread: f32,
    pub damage: f32,
    pub trigger_pressed: bool,
}

impl Default for Gun {
    fn default() -> Self {
        Self {
            cooldown_steps: 8,
            remaining_cooldown: 0,
            muzzle_speed: 1400.0,
            spread: 0.06,
            damage: 12.0,
            trigger_pressed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct Missile {
    pub sender: EntityId,
    pub damage: f32,
    pub remaining_steps: u32,
}
