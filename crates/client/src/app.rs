//! Owns everything the running client needs and tears it down in order.

use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::Vec2;

use cosmic::cosmos::Transform;
use cosmic::interpolation::integrate_interpolated_transforms;
use cosmic::scene::ScriptedBot;
use cosmic::setup::{ClientSetup, LocalSetup, SetupVariant};
use cosmic::{
    CameraCone, FrameReader, FrameWriter, InterpolationConfig, InterpolationSystem, PacketType,
    SimulationConfig, VisibilityLayers, frame_buffer_swapper, visible_entities,
};

use crate::debug::DebugStats;
use crate::net::{ClientConfig, NetworkClient};

/// Half the visible area around the viewed character.
const VIEW_HALF_EXTENT: Vec2 = Vec2::new(640.0, 360.0);
const VIEWER_WAIT: Duration = Duration::from_millis(100);
const REPORT_INTERVAL: Duration = Duration::from_secs(2);

pub struct ApplicationContext {
    setup: SetupVariant,
    network: Option<NetworkClient>,
    config: ClientConfig,
    interpolation: InterpolationSystem,
    interpolation_config: InterpolationConfig,
    bot: Option<ScriptedBot>,
    frames: FrameWriter,
    viewer: Option<JoinHandle<()>>,
    last_frame: Instant,
}

impl ApplicationContext {
    /// Single player against a local cosmos.
    pub fn local(simulation: &SimulationConfig, bot: Option<ScriptedBot>) -> anyhow::Result<Self> {
        let setup = SetupVariant::Local(LocalSetup::new(simulation)?);
        Ok(Self::with_setup(setup, None, ClientConfig::default(), bot))
    }

    /// Predicting client of a remote server.
    pub fn remote(
        server: SocketAddr,
        config: ClientConfig,
        bot: Option<ScriptedBot>,
    ) -> anyhow::Result<Self> {
        let mut network = NetworkClient::new(config.clone())?;
        network.connect(server)?;
        let setup = SetupVariant::Client(ClientSetup::new(
            config.setup.clone(),
            cosmic::DEFAULT_TICK_RATE,
        ));
        Ok(Self::with_setup(setup, Some(network), config, bot))
    }

    fn with_setup(
        setup: SetupVariant,
        network: Option<NetworkClient>,
        config: ClientConfig,
        bot: Option<ScriptedBot>,
    ) -> Self {
        let (frames, reader) = frame_buffer_swapper();
        let viewer = thread::Builder::new()
            .name("viewer".into())
            .spawn(move || run_viewer(reader))
            .map_err(|e| log::error!("could not start the viewer thread: {e}"))
            .ok();

        log::info!("running {} setup", setup.name());
        Self {
            setup,
            network,
            config,
            interpolation: InterpolationSystem::new(InterpolationConfig::default()),
            interpolation_config: InterpolationConfig::default(),
            bot,
            frames,
            viewer,
            last_frame: Instant::now(),
        }
    }

    /// Runs the logic loop until `duration` elapses or the connection drops.
    pub fn run(&mut self, duration: Duration) -> anyhow::Result<()> {
        let started = Instant::now();
        while started.elapsed() < duration {
            if !self.frame()? {
                log::warn!("connection lost, stopping");
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    /// One pass of the logic thread. Returns false once the session is over.
    fn frame(&mut self) -> anyhow::Result<bool> {
        let now = Instant::now();
        let frame_delta = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        if !self.pump_network()? {
            return Ok(false);
        }

        if let Some(bot) = &mut self.bot {
            let input = bot.next_input();
            self.setup.visit_mut(|setup| setup.control(input));
        }
        self.setup.visit_mut(|setup| setup.advance(frame_delta));
        self.flush_outgoing()?;

        self.publish_frame(frame_delta);
        Ok(true)
    }

    fn pump_network(&mut self) -> anyhow::Result<bool> {
        let Some(network) = &mut self.network else {
            return Ok(true);
        };
        let was_connected = network.is_connected();
        let packets = network.poll()?;
        if was_connected && !network.is_connected() {
            return Ok(false);
        }

        for packet in packets {
            if let PacketType::ConnectionAccepted {
                steps_per_second, ..
            } = packet
            {
                self.setup = SetupVariant::Client(ClientSetup::new(
                    self.config.setup.clone(),
                    steps_per_second,
                ));
                self.interpolation.clear();
            }
            if let SetupVariant::Client(client) = &mut self.setup {
                if let Err(e) = client.handle_packet(packet) {
                    log::debug!("recovering from sync error: {e}");
                }
            }
        }
        Ok(true)
    }

    fn flush_outgoing(&mut self) -> anyhow::Result<()> {
        let (Some(network), SetupVariant::Client(client)) = (&mut self.network, &mut self.setup)
        else {
            return Ok(());
        };
        if !network.is_connected() {
            client.drain_outgoing();
            return Ok(());
        }
        for payload in client.drain_outgoing() {
            network.send(payload)?;
        }
        Ok(())
    }

    fn publish_frame(&mut self, frame_delta: f32) {
        let interpolation = &mut self.interpolation;
        let config = &self.interpolation_config;
        let frames = &mut self.frames;

        self.setup.visit_mut(|setup| {
            if setup.take_new_state_sample() {
                interpolation.update_desired_transforms(setup.viewed_cosmos());
            }
            let cosmos = setup.viewed_cosmos();
            integrate_interpolated_transforms(
                config,
                interpolation,
                cosmos,
                frame_delta,
                cosmos.fixed_delta_secs(),
                1.0,
            );

            let viewed = setup.viewed_character();
            let eye = viewed
                .and_then(|id| interpolation.get_interpolated(id))
                .or_else(|| viewed.and_then(|id| cosmos.component::<Transform>(id).copied()))
                .map_or(Vec2::ZERO, |t| t.position);

            let buffer = frames.buffer_mut();
            buffer.step = cosmos.step();
            buffer.interpolation_ratio = setup.interpolation_ratio();
            buffer.viewed_character = viewed;
            buffer.visible = visible_entities(
                cosmos,
                Some(&*interpolation),
                &CameraCone::new(eye, VIEW_HALF_EXTENT),
                VisibilityLayers::all(),
            );
        });
        self.frames.swap();
    }

    /// Stops the viewer, says goodbye to the server, then drops the setup.
    pub fn shutdown(mut self) {
        self.frames.close();
        if let Some(viewer) = self.viewer.take() {
            if viewer.join().is_err() {
                log::error!("viewer thread panicked");
            }
        }
        if let Some(network) = &mut self.network {
            let stats = network.stats();
            log::info!(
                "{} packets sent, {} received, {} malformed, rtt {:.1} ms",
                stats.packets_sent,
                stats.packets_received,
                stats.packets_malformed,
                stats.rtt_ms
            );
            network.disconnect();
        }
        if let SetupVariant::Client(client) = &self.setup {
            let stats = client.stats();
            log::info!(
                "{} reconciliations, {} mispredictions, {} resyncs, {} dropped states, {} confirmed hits",
                stats.reconciliations,
                stats.mispredictions,
                stats.resyncs,
                stats.dropped_packets,
                stats.confirmed_hits
            );
        }
    }
}

/// Consumes frames the way a renderer would, reporting instead of drawing.
fn run_viewer(mut reader: FrameReader) {
    let mut stats = DebugStats::new();
    let mut last_frame = Instant::now();
    let mut last_report = Instant::now();

    while !reader.is_closed() {
        let Some(frame) = reader.wait_for_frame(VIEWER_WAIT) else {
            continue;
        };
        let now = Instant::now();
        stats.record_frame((now - last_frame).as_secs_f32());
        last_frame = now;

        if last_report.elapsed() >= REPORT_INTERVAL {
            last_report = now;
            log::info!(
                "step {} | {} visible | ratio {:.2} | {:.0} fps",
                frame.step,
                frame.visible.len(),
                frame.interpolation_ratio,
                stats.fps()
            );
        }
    }
}
