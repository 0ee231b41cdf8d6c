//! The three ways of running a cosmos: alone, as a predicting client, or as
//! the authority.

mod client;
mod local;
mod server;

pub use client::{ClientSetup, ClientSetupConfig, ClientState, ReconciliationStats};
pub use local::LocalSetup;
pub use server::{
    HitscanHit, LagCompensationConfig, ServerSetup, ServerSetupConfig, ShotConfirmation,
};

use crate::cosmos::{Cosmos, EntityId};
use crate::step::PlayerEntropy;

/// What the application loop needs from any setup.
pub trait Setup {
    /// Runs as many fixed steps as `frame_delta` seconds cover. Returns how
    /// many ran.
    fn advance(&mut self, frame_delta: f32) -> u32;

    /// Queues local input for the next step.
    fn control(&mut self, entropy: PlayerEntropy);

    /// The cosmos to draw.
    fn viewed_cosmos(&self) -> &Cosmos;

    fn viewed_character(&self) -> Option<EntityId>;

    /// Fraction of a step elapsed since the last one, in `[0, 1)`.
    fn interpolation_ratio(&self) -> f32;

    /// True once after each new authoritative sample.
    fn take_new_state_sample(&mut self) -> bool;
}

pub enum SetupVariant {
    Local(LocalSetup),
    Client(ClientSetup),
    Server(ServerSetup),
}

impl SetupVariant {
    pub fn name(&self) -> &'static str {
        match self {
            SetupVariant::Local(_) => "local",
            SetupVariant::Client(_) => "client",
            SetupVariant::Server(_) => "server",
        }
    }

    pub fn visit<R>(&self, f: impl FnOnce(&dyn Setup) -> R) -> R {
        match self {
            SetupVariant::Local(setup) => f(setup),
            SetupVariant::Client(setup) => f(setup),
            SetupVariant::Server(setup) => f(setup),
        }
    }

    pub fn visit_mut<R>(&mut self, f: impl FnOnce(&mut dyn Setup) -> R) -> R {
        match self {
            SetupVariant::Local(setup) => f(setup),
            SetupVariant::Client(setup) => f(setup),
            SetupVariant::Server(setup) => f(setup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::SimulationConfig;
    use crate::step::GameIntent;

    #[test]
    fn visitor_reaches_every_variant() {
        let mut variants = vec![
            SetupVariant::Local(LocalSetup::new(&SimulationConfig::default()).unwrap()),
            SetupVariant::Client(ClientSetup::new(ClientSetupConfig::default(), 60)),
            SetupVariant::Server(ServerSetup::new(ServerSetupConfig::default()).unwrap()),
        ];

        for variant in &mut variants {
            let mut entropy = PlayerEntropy::default();
            entropy.press(GameIntent::MoveRight);
            variant.visit_mut(|setup| {
                setup.control(entropy);
                setup.advance(0.1);
            });
            let ratio = variant.visit(|setup| setup.interpolation_ratio());
            assert!((0.0..1.0).contains(&ratio), "{}", variant.name());
        }
    }
}
