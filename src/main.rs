//! `mda` — thin CLI front-end over [`mda_core::Engine`] (spec §13).
//!
//! Builds one algorithm instance (classical traceroute or full MDA
//! enumeration) for a single target and pumps the event loop to
//! completion, printing each resolved hop as a line to stdout. No JSON
//! output, no DNS resolution, no ASN lookups — all out of scope per the
//! Non-goals this CLI is a front-end for.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use mda_core::options::{MdaOptions, TracerouteOptions};
use mda_core::probe::{Protocol as ProbeProtocol, ProbeTemplate};
use mda_core::traceroute::Traceroute;
use mda_core::{Engine, Instance, LoopEvent};
use mda_packet::tcp::FlowIdentifierField;
use mda_packet::Address;
use mda_net::SocketManager;
use std::net::{IpAddr, UdpSocket};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Algorithm {
    Traceroute,
    Mda,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ProtocolArg {
    Icmp,
    Udp,
    Tcp,
}

/// Multipath-aware traceroute.
#[derive(Parser, Debug)]
#[command(name = "mda", about = "MDA multipath topology tracer")]
struct Cli {
    /// Target IP address (literal only — no DNS resolution).
    target: IpAddr,

    /// Which subalgorithm to run.
    #[arg(long, value_enum, default_value_t = Algorithm::Traceroute)]
    algorithm: Algorithm,

    /// Probing transport.
    #[arg(long, value_enum, default_value_t = ProtocolArg::Udp)]
    protocol: ProtocolArg,

    /// First TTL to probe.
    #[arg(long, default_value_t = mda_core::options::MIN_TTL_DEFAULT)]
    first_ttl: u8,

    /// Last TTL to probe.
    #[arg(long, default_value_t = mda_core::options::MAX_TTL_DEFAULT)]
    max_ttl: u8,

    /// Probes per hop (classical traceroute) or retries exhausted before
    /// giving up on a flow (MDA).
    #[arg(long, default_value_t = mda_core::options::NUM_QUERIES_DEFAULT)]
    queries: u8,

    /// Stopping-rule confidence (MDA only): probability of stopping at a
    /// hop with unenumerated interfaces.
    #[arg(long, default_value_t = 0.05)]
    confidence: f64,

    /// Maximum number of interfaces the stopping-rule table is built for
    /// (MDA only).
    #[arg(long, default_value_t = 10)]
    max_branching: u8,

    /// Force IPv4.
    #[arg(short = '4', long, conflicts_with = "ipv6")]
    ipv4: bool,

    /// Force IPv6.
    #[arg(short = '6', long, conflicts_with = "ipv4")]
    ipv6: bool,

    /// UDP/TCP destination port.
    #[arg(long, default_value_t = 33457)]
    dst_port: u16,

    /// Poll timeout for the event loop, in milliseconds.
    #[arg(long, default_value_t = 250, env = "MDA_POLL_TIMEOUT_MS")]
    poll_timeout_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let want_v6 = cli.ipv6 || (!cli.ipv4 && cli.target.is_ipv6());
    let want_v4 = !want_v6;
    if want_v4 != cli.target.is_ipv4() {
        bail!("target address family does not match the requested -4/-6 flag");
    }

    let src = determine_source(cli.target).context("could not determine a local source address")?;
    tracing::info!(target = %cli.target, src = %src, algorithm = ?cli.algorithm, "mda starting");

    let mut traceroute_opts = TracerouteOptions::default();
    traceroute_opts.min_ttl = cli.first_ttl;
    traceroute_opts.max_ttl = cli.max_ttl;
    traceroute_opts.num_probes = cli.queries;
    traceroute_opts.validate()?;

    let protocol = match cli.protocol {
        ProtocolArg::Icmp => ProbeProtocol::Icmp,
        ProtocolArg::Udp => ProbeProtocol::Udp,
        ProtocolArg::Tcp => ProbeProtocol::Tcp,
    };
    let template = ProbeTemplate {
        protocol,
        src,
        dst: Address::from(cli.target),
        src_port: 33434,
        dst_port: cli.dst_port,
        tcp_flow_field: FlowIdentifierField::SourcePort,
        payload_len: 12,
    };

    let sockets = SocketManager::with_families(want_v4, want_v6).context("acquiring raw sockets (requires CAP_NET_RAW)")?;
    let poll_timeout = Duration::from_millis(cli.poll_timeout_ms);
    let mut engine = Engine::new(sockets, src, Duration::from_secs(3), poll_timeout)?;

    match cli.algorithm {
        Algorithm::Traceroute => {
            engine.add_instance(Instance::Traceroute(Traceroute::new(traceroute_opts, template)));
        }
        Algorithm::Mda => {
            let mut mda_opts = MdaOptions::default();
            mda_opts.traceroute = traceroute_opts;
            mda_opts.confidence = cli.confidence;
            mda_opts.max_branching = cli.max_branching;
            mda_opts.validate()?;
            engine.add_instance(Instance::Mda(mda_core::MdaAlgorithm::new(mda_opts, template)));
        }
    }

    engine.start()?;
    loop {
        let events = engine.run_tick()?;
        for event in events {
            report_event(event);
        }
        if engine.instances().iter().all(Instance::is_finished) {
            break;
        }
    }

    tracing::info!("mda finished");
    Ok(())
}

fn report_event(event: LoopEvent) {
    match event {
        LoopEvent::Reply(reply) => {
            let responder = reply
                .outcome
                .responder()
                .map_or_else(|| "*".to_string(), |a| a.to_string());
            println!("{:>3}  {}  {:.1} ms", reply.probe.ttl, responder, reply.rtt.as_secs_f64() * 1000.0);
        }
        LoopEvent::Tick => {}
    }
}

/// No DNS, no routing-table introspection (out of scope) — the usual
/// trick of connecting a UDP socket and reading back its local address
/// lets the kernel pick the right source for us.
fn determine_source(target: IpAddr) -> std::io::Result<Address> {
    let bind_addr: IpAddr = if target.is_ipv4() {
        "0.0.0.0".parse().unwrap()
    } else {
        "::".parse().unwrap()
    };
    let socket = UdpSocket::bind((bind_addr, 0))?;
    socket.connect((target, 9))?;
    Ok(Address::from(socket.local_addr()?.ip()))
}
