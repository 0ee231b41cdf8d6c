//! Stateless systems, run in a fixed order every step.
//!
//! Systems only communicate through the cosmos and the step's message queues.
//! A system later in [`PIPELINE`] sees everything earlier ones posted; nothing
//! flows backwards within a step.

pub mod crosshair;
pub mod destruction;
pub mod driver;
pub mod gun;
pub mod missile;
pub mod movement;
pub mod physics;
pub mod sentience;

use crate::step::LogicStep;

pub type System = fn(&mut LogicStep<'_>);

pub const PIPELINE: &[(&str, System)] = &[
    ("assign_drivers", driver::assign_drivers_from_intents),
    ("delegate_driver_intents", driver::delegate_movement_intents),
    ("movement_flags", movement::set_movement_flags_from_input),
    ("crosshair_intents", crosshair::handle_crosshair_intents),
    ("crosshair_motion", crosshair::update_base_offsets),
    ("trigger_intents", gun::handle_trigger_intents),
    ("fire_guns", gun::fire_guns),
    ("movement_forces", movement::apply_movement_forces),
    ("physics", physics::integrate),
    ("damage", sentience::apply_damage),
    ("consciousness", sentience::regenerate_consciousness),
    ("missile_expiry", missile::expire),
    ("destruction", destruction::flush),
];

pub fn run_pipeline(step: &mut LogicStep<'_>) {
    for (name, system) in PIPELINE {
        log::trace!("step {}: {}", step.cosmos.step(), name);
        system(step);
    }
}
