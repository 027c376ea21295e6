//! MDA controller, classical traceroute subalgorithm, event loop and
//! scheduler (spec §2 components D–H). The public surface (spec §6):
//! build an [`Engine`] around a socket manager, [`Engine::add_instance`]
//! one or more algorithm runs, then [`Engine::run`] it to completion.

pub mod bound;
pub mod delay;
pub mod error;
pub mod event_loop;
pub mod flow;
pub mod interface;
pub mod lattice;
pub mod mda_algorithm;
pub mod options;
pub mod probe;
pub mod scheduler;
pub mod traceroute;
pub mod wire;

pub use bound::StoppingRuleTable;
pub use error::{Error, Result};
pub use event_loop::{EventLoop, LoopEvent};
pub use lattice::{Lattice, NodeId};
pub use mda_algorithm::{MdaAction, MdaAlgorithm};
pub use options::{MdaOptions, TracerouteOptions};
pub use probe::{FlowId, Probe, ProbeOutcome, ProbeTemplate, Protocol, Reply};
pub use scheduler::Scheduler;
pub use traceroute::{Traceroute, TracerouteAction};

use mda_net::SocketManager;
use mda_packet::Address;
use std::time::{Duration, SystemTime};

/// One registered algorithm run (spec §4.D "algorithm instance tree"):
/// a classical traceroute or an MDA enumeration, each independently fed
/// events by the engine.
pub enum Instance {
    Traceroute(Traceroute),
    Mda(MdaAlgorithm),
}

impl Instance {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match self {
            Instance::Traceroute(t) => t.is_finished(),
            Instance::Mda(m) => m.is_finished(),
        }
    }
}

/// Ties the socket manager, scheduler and event loop together and owns
/// the registered instance tree (spec §6).
pub struct Engine {
    sockets: SocketManager,
    scheduler: Scheduler,
    event_loop: EventLoop,
    instances: Vec<Instance>,
    src: Address,
    poll_timeout: Duration,
}

impl Engine {
    /// `src` is the source address every outbound packet is built with
    /// (spec §4.A: the codec needs it for pseudoheader checksums).
    pub fn new(
        sockets: SocketManager,
        src: Address,
        probe_timeout: Duration,
        poll_timeout: Duration,
    ) -> Result<Self> {
        let event_loop = EventLoop::new(&sockets)?;
        Ok(Self {
            sockets,
            scheduler: Scheduler::new(probe_timeout),
            event_loop,
            instances: Vec::new(),
            src,
            poll_timeout,
        })
    }

    pub fn add_instance(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Drives every registered instance with its initial actions,
    /// enqueuing whatever probes it asks to send.
    pub fn start(&mut self) -> Result<()> {
        let now = SystemTime::now();
        let mut starts = Vec::new();
        for instance in &mut self.instances {
            match instance {
                Instance::Traceroute(t) => starts.push(TracerouteStart::Traceroute(t.start(), t.template().clone())),
                Instance::Mda(m) => starts.push(TracerouteStart::Mda(m.start(), m.template().clone())),
            }
        }
        for start in starts {
            match start {
                TracerouteStart::Traceroute(actions, template) => {
                    for action in actions {
                        if let TracerouteAction::SendProbe { ttl } = action {
                            self.enqueue_traceroute_probe(&template, ttl, now);
                        }
                    }
                }
                TracerouteStart::Mda(actions, template) => {
                    for action in actions {
                        if let MdaAction::SendProbe { ttl, flow_id, .. } = action {
                            self.enqueue_mda_probe(&template, ttl, flow_id, now);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn enqueue_traceroute_probe(&mut self, template: &ProbeTemplate, ttl: u8, ready_at: SystemTime) {
        let flow_id = FlowId(u32::from(ttl));
        self.scheduler
            .enqueue(template.clone(), flow_id, ttl, 0, 0x1234, u16::from(ttl), ready_at);
    }

    /// Enqueues one MDA-driven probe. The controller's `SendProbe`
    /// action only carries the flow id it wants tuned into the wire
    /// (spec §4.G); the ICMP identifier is a constant distinguishing
    /// this engine's own probes from unrelated traffic, with the
    /// sequence number carrying the flow id for matching (spec §4.B).
    fn enqueue_mda_probe(&mut self, template: &ProbeTemplate, ttl: u8, flow_id: FlowId, ready_at: SystemTime) {
        const MDA_ICMP_IDENTIFIER: u16 = 0x4D44;
        self.scheduler
            .enqueue(template.clone(), flow_id, ttl, 0, MDA_ICMP_IDENTIFIER, flow_id.as_u16(), ready_at);
    }

    /// Runs one tick: release due probes, poll for replies, and fan the
    /// results out to every registered instance (spec §4.D fan-out).
    /// Returns the loop events produced, for a caller (e.g. the CLI)
    /// that wants to report hop-by-hop progress.
    pub fn run_tick(&mut self) -> Result<Vec<LoopEvent>> {
        let now = SystemTime::now();
        while let Some(probe) = self.scheduler.pop_ready(now)? {
            let packet = wire::build_packet(&probe, self.src);
            self.sockets.send(&packet, probe.template.dst.into())?;
        }

        let events = self
            .event_loop
            .tick(&mut self.sockets, &mut self.scheduler, self.poll_timeout)?;

        for event in &events {
            if let LoopEvent::Reply(reply) = event {
                tracing::debug!(
                    ttl = reply.probe.ttl,
                    responder = ?reply.outcome.responder(),
                    rtt_ms = reply.rtt.as_millis() as u64,
                    "probe answered"
                );
                for instance in &mut self.instances {
                    match instance {
                        Instance::Traceroute(t) => {
                            let template = t.template().clone();
                            for action in t.on_reply(reply) {
                                if let TracerouteAction::SendProbe { ttl } = action {
                                    self.enqueue_traceroute_probe(&template, ttl, SystemTime::now());
                                }
                            }
                        }
                        Instance::Mda(m) => {
                            let template = m.template().clone();
                            for action in m.on_reply(reply) {
                                if let MdaAction::SendProbe { ttl, flow_id, .. } = action {
                                    self.enqueue_mda_probe(&template, ttl, flow_id, SystemTime::now());
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(events)
    }

    /// Runs ticks until every registered instance reports finished.
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        while !self.all_finished() {
            self.run_tick()?;
        }
        Ok(())
    }

    fn all_finished(&self) -> bool {
        !self.instances.is_empty() && self.instances.iter().all(Instance::is_finished)
    }
}

enum TracerouteStart {
    Traceroute(Vec<TracerouteAction>, ProbeTemplate),
    Mda(Vec<MdaAction>, ProbeTemplate),
}
