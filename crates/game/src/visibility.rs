//! Which entities a camera can see, computed on the rayon pool.

use bitflags::bitflags;
use glam::Vec2;
use rayon::prelude::*;

use crate::cosmos::{Cosmos, EntityId, EntityType, RigidBody, Transform};
use crate::interpolation::InterpolationSystem;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VisibilityLayers: u8 {
        const CHARACTERS = 1 << 0;
        const VEHICLES = 1 << 1;
        const PROJECTILES = 1 << 2;
    }
}

impl VisibilityLayers {
    pub fn of(kind: EntityType) -> Self {
        match kind {
            EntityType::Character => Self::CHARACTERS,
            EntityType::Vehicle => Self::VEHICLES,
            EntityType::Projectile => Self::PROJECTILES,
        }
    }
}

/// Axis-aligned view rectangle around `eye`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraCone {
    pub eye: Vec2,
    pub half_extent: Vec2,
}

impl CameraCone {
    pub fn new(eye: Vec2, half_extent: Vec2) -> Self {
        Self { eye, half_extent }
    }

    /// True when a circle at `center` overlaps the view.
    pub fn contains(&self, center: Vec2, radius: f32) -> bool {
        let d = (center - self.eye).abs();
        d.x <= self.half_extent.x + radius && d.y <= self.half_extent.y + radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleEntity {
    pub id: EntityId,
    pub kind: EntityType,
    pub transform: Transform,
    pub radius: f32,
}

/// Entities overlapping `cone`, ordered by id.
///
/// When an interpolation system is given, its displayed transforms are used
/// instead of the raw simulation ones.
pub fn visible_entities(
    cosmos: &Cosmos,
    interpolation: Option<&InterpolationSystem>,
    cone: &CameraCone,
    layers: VisibilityLayers,
) -> Vec<VisibleEntity> {
    let ids: Vec<EntityId> = cosmos
        .entity_ids()
        .into_iter()
        .filter(|id| layers.contains(VisibilityLayers::of(id.kind)))
        .collect();

    ids.par_iter()
        .filter_map(|&id| {
            let transform = interpolation
                .and_then(|i| i.get_interpolated(id))
                .or_else(|| cosmos.component::<Transform>(id).copied())?;
            let radius = cosmos.component::<RigidBody>(id).map_or(0.0, |b| b.radius);

            cone.contains(transform.position, radius)
                .then_some(VisibleEntity {
                    id,
                    kind: id.kind,
                    transform,
                    radius,
                })
        })
        .collect()
}
