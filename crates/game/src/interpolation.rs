//! View-side smoothing of authoritative transforms.
//!
//! Runs outside the deterministic step, so it is free to use `exp` and
//! frame-rate dependent timing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cosmos::{Cosmos, DestructionObserver, EntityId, Transform};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Convergence rate per fixed step. Higher is snappier.
    pub speed: f32,
    /// A desired-position jump larger than this teleports instead of gliding.
    pub snap_threshold: f32,
    /// Closer than this the displayed transform snaps onto the desired one.
    pub epsilon: f32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            speed: 0.5,
            snap_threshold: 100.0,
            epsilon: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InterpolationCache {
    desired: Transform,
    previous_desired: Transform,
    displayed: Transform,
}

impl InterpolationCache {
    fn snapped(transform: Transform) -> Self {
        Self {
            desired: transform,
            previous_desired: transform,
            displayed: transform,
        }
    }
}

#[derive(Debug, Default)]
pub struct InterpolationSystem {
    caches: BTreeMap<EntityId, InterpolationCache>,
    config: InterpolationConfig,
}

impl InterpolationSystem {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            caches: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Takes a new authoritative sample. Call once per fresh cosmos state,
    /// not once per frame.
    pub fn update_desired_transforms(&mut self, cosmos: &Cosmos) {
        self.caches.retain(|&id, _| cosmos.alive(id));

        for id in cosmos.ids_with::<Transform>() {
            let Some(&transform) = cosmos.component::<Transform>(id) else {
                continue;
            };

            match self.caches.get_mut(&id) {
                Some(cache) => {
                    cache.previous_desired = cache.desired;
                    cache.desired = transform;
                    let jump = cache.previous_desired.position.distance(transform.position);
                    if jump > self.config.snap_threshold {
                        cache.displayed = transform;
                    }
                }
                None => {
                    self.caches.insert(id, InterpolationCache::snapped(transform));
                }
            }
        }
    }

    /// Moves every displayed transform toward its desired one.
    ///
    /// `frame_delta` and `fixed_delta` are seconds; the ratio makes the
    /// convergence rate independent of the frame rate.
    pub fn integrate_interpolated_transforms(
        &mut self,
        frame_delta: f32,
        fixed_delta: f32,
        speed_multiplier: f32,
    ) {
        approach(
            &mut self.caches,
            &self.config,
            frame_delta,
            fixed_delta,
            speed_multiplier,
        );
    }

    pub fn get_interpolated(&self, id: EntityId) -> Option<Transform> {
        self.caches.get(&id).map(|cache| cache.displayed)
    }

    /// Distance still to cover for `id`.
    pub fn remaining_distance(&self, id: EntityId) -> Option<f32> {
        self.caches
            .get(&id)
            .map(|cache| cache.displayed.position.distance(cache.desired.position))
    }

    pub fn clear(&mut self) {
        self.caches.clear();
    }
}

impl DestructionObserver for InterpolationSystem {
    fn on_destroy(&mut self, id: EntityId) {
        self.caches.remove(&id);
    }
}

/// Steps displayed transforms under an explicit `config`, which overrides
/// the system's own rate and epsilon. Entities no longer alive in `cosmos`
/// are forgotten first.
pub fn integrate_interpolated_transforms(
    config: &InterpolationConfig,
    interpolation: &mut InterpolationSystem,
    cosmos: &Cosmos,
    frame_delta: f32,
    fixed_delta: f32,
    speed_multiplier: f32,
) {
    interpolation.caches.retain(|&id, _| cosmos.alive(id));
    approach(
        &mut interpolation.caches,
        config,
        frame_delta,
        fixed_delta,
        speed_multiplier,
    );
}

fn approach(
    caches: &mut BTreeMap<EntityId, InterpolationCache>,
    config: &InterpolationConfig,
    frame_delta: f32,
    fixed_delta: f32,
    speed_multiplier: f32,
) {
    if fixed_delta <= 0.0 {
        return;
    }
    let t = 1.0 - (-config.speed * speed_multiplier * frame_delta / fixed_delta).exp();
    let t = t.clamp(0.0, 1.0);
    let epsilon = config.epsilon;

    for cache in caches.values_mut() {
        let displayed = &mut cache.displayed;
        let desired = cache.desired;

        displayed.position = displayed.position.lerp(desired.position, t);
        if displayed.position.distance(desired.position) < epsilon {
            displayed.position = desired.position;
        }

        displayed.facing = displayed
            .facing
            .lerp(desired.facing, t)
            .try_normalize()
            .unwrap_or(desired.facing);
        if displayed.facing.distance(desired.facing) < epsilon {
            displayed.facing = desired.facing;
        }
    }
}
