//! Classical traceroute subalgorithm (spec §4.F, component F): the
//! per-hop primitive the MDA controller calls out to.
//!
//! Implemented as an explicit state machine rather than a blocking loop
//! (spec §9 design note: prefer an enum-driven state machine over
//! coroutine-style control flow) — `start` produces the first
//! instruction, then every completed probe is fed through `on_reply`,
//! which returns the next batch of instructions.

use crate::interface::Interface;
use crate::options::TracerouteOptions;
use crate::probe::{ProbeOutcome, ProbeTemplate, Reply};

/// One instruction the state machine hands back to its driver.
#[derive(Debug, Clone)]
pub enum TracerouteAction {
    SendProbe { ttl: u8 },
    HopResolved { ttl: u8, interface: Interface },
    Finished,
}

/// `replies` accumulates one outcome per probe sent at `ttl`; the hop is
/// resolved once it holds `num_probes` entries, never on the first reply
/// (spec §4.F: all probes of the burst must come back, answer or
/// timeout, before the hop advances).
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Probing { ttl: u8, replies: Vec<ProbeOutcome> },
    Done,
}

#[derive(Debug, Clone)]
pub struct Traceroute {
    options: TracerouteOptions,
    template: ProbeTemplate,
    state: State,
    consecutive_stars: u8,
}

impl Traceroute {
    #[must_use]
    pub fn new(options: TracerouteOptions, template: ProbeTemplate) -> Self {
        let min_ttl = options.min_ttl;
        Self {
            options,
            template,
            state: State::Probing {
                ttl: min_ttl,
                replies: Vec::new(),
            },
            consecutive_stars: 0,
        }
    }

    #[must_use]
    pub fn template(&self) -> &ProbeTemplate {
        &self.template
    }

    /// The first instructions to issue, before any reply has arrived:
    /// the full `num_probes` burst for the starting TTL, sent together
    /// rather than one-at-a-time.
    pub fn start(&mut self) -> Vec<TracerouteAction> {
        let State::Probing { ttl, .. } = self.state else {
            return Vec::new();
        };
        (0..self.options.num_probes)
            .map(|_| TracerouteAction::SendProbe { ttl })
            .collect()
    }

    /// Consumes one completed probe, returning the next instructions.
    /// Replies for a TTL other than the one currently under test are
    /// ignored (a straggler from a retried, already-resolved hop). The
    /// hop only resolves once every probe of the current burst has come
    /// back, answered or timed out.
    pub fn on_reply(&mut self, reply: &Reply) -> Vec<TracerouteAction> {
        let State::Probing { ttl, .. } = self.state else {
            return Vec::new();
        };
        if reply.probe.ttl != ttl {
            return Vec::new();
        }
        if let State::Probing { replies, .. } = &mut self.state {
            replies.push(reply.outcome);
        }
        let burst_complete = matches!(
            &self.state,
            State::Probing { replies, .. } if replies.len() >= self.options.num_probes as usize
        );
        if !burst_complete {
            return Vec::new();
        }

        let State::Probing { ttl, replies } = std::mem::replace(&mut self.state, State::Done) else {
            unreachable!("checked above")
        };
        let answer = replies
            .iter()
            .find(|outcome| outcome.is_destination_reached())
            .or_else(|| replies.iter().find(|outcome| outcome.is_answered()));
        match answer {
            Some(outcome) => {
                self.consecutive_stars = 0;
                self.resolve_hop(ttl, outcome.responder(), outcome.is_destination_reached())
            }
            None => {
                self.consecutive_stars += 1;
                let stop_for_stars = self.consecutive_stars >= self.options.max_undiscovered;
                self.resolve_hop(ttl, None, stop_for_stars)
            }
        }
    }

    fn resolve_hop(&mut self, ttl: u8, responder: Option<mda_packet::Address>, stop: bool) -> Vec<TracerouteAction> {
        let mut interface = Interface::new(responder, ttl);
        interface.enumeration_done = true;
        let mut actions = vec![TracerouteAction::HopResolved { ttl, interface }];

        if stop || ttl >= self.options.max_ttl {
            self.state = State::Done;
            actions.push(TracerouteAction::Finished);
        } else {
            let next_ttl = ttl + 1;
            self.state = State::Probing {
                ttl: next_ttl,
                replies: Vec::new(),
            };
            actions.extend((0..self.options.num_probes).map(|_| TracerouteAction::SendProbe { ttl: next_ttl }));
        }
        actions
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{FlowId, Probe, ProbeOutcome, Protocol};
    use mda_packet::tcp::FlowIdentifierField;
    use mda_packet::Address;
    use std::net::Ipv4Addr;
    use std::time::{Duration, SystemTime};

    fn tracer() -> Traceroute {
        let mut options = TracerouteOptions::default();
        options.min_ttl = 1;
        options.max_ttl = 4;
        options.num_probes = 2;
        options.max_undiscovered = 2;
        let template = ProbeTemplate {
            protocol: Protocol::Icmp,
            src: Address::V4(Ipv4Addr::new(192, 168, 0, 1)),
            dst: Address::V4(Ipv4Addr::new(8, 8, 8, 8)),
            src_port: 0,
            dst_port: 0,
            tcp_flow_field: FlowIdentifierField::SourcePort,
            payload_len: 32,
        };
        Traceroute::new(options, template)
    }

    fn reply_at(ttl: u8, outcome: ProbeOutcome) -> Reply {
        let probe = Probe {
            sequence: 1,
            template: ProbeTemplate {
                protocol: Protocol::Icmp,
                src: Address::V4(Ipv4Addr::new(192, 168, 0, 1)),
                dst: Address::V4(Ipv4Addr::new(8, 8, 8, 8)),
                src_port: 0,
                dst_port: 0,
                tcp_flow_field: FlowIdentifierField::SourcePort,
                payload_len: 32,
            },
            flow_id: FlowId(1),
            ttl,
            round: 0,
            icmp_identifier: 1,
            icmp_sequence: 1,
            sent: SystemTime::now(),
        };
        Reply {
            probe,
            outcome,
            received: SystemTime::now(),
            rtt: Duration::from_millis(10),
        }
    }

    #[test]
    fn start_sends_the_full_probe_burst_at_min_ttl() {
        let mut tr = tracer();
        let actions = tr.start();
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| matches!(a, TracerouteAction::SendProbe { ttl: 1 })));
    }

    #[test]
    fn hop_does_not_resolve_until_every_probe_in_the_burst_returns() {
        let mut tr = tracer();
        tr.start();
        let responder = Address::V4(Ipv4Addr::new(10, 0, 0, 1));
        let actions = tr.on_reply(&reply_at(1, ProbeOutcome::TimeExceeded { responder }));
        assert!(actions.is_empty());
    }

    #[test]
    fn answered_hop_advances_to_next_ttl_once_the_whole_burst_is_in() {
        let mut tr = tracer();
        tr.start();
        let responder = Address::V4(Ipv4Addr::new(10, 0, 0, 1));
        tr.on_reply(&reply_at(1, ProbeOutcome::TimeExceeded { responder }));
        let actions = tr.on_reply(&reply_at(1, ProbeOutcome::TimeExceeded { responder }));
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[0], TracerouteAction::HopResolved { ttl: 1, .. }));
        assert!(actions[1..]
            .iter()
            .all(|a| matches!(a, TracerouteAction::SendProbe { ttl: 2 })));
    }

    #[test]
    fn destination_reached_finishes_once_the_burst_completes() {
        let mut tr = tracer();
        tr.start();
        let dst = Address::V4(Ipv4Addr::new(8, 8, 8, 8));
        let pending = tr.on_reply(&reply_at(1, ProbeOutcome::EchoReply { responder: dst }));
        assert!(pending.is_empty());
        assert!(!tr.is_finished());
        let actions = tr.on_reply(&reply_at(1, ProbeOutcome::Timeout));
        assert!(matches!(
            actions.as_slice(),
            [TracerouteAction::HopResolved { ttl: 1, .. }, TracerouteAction::Finished]
        ));
        assert!(tr.is_finished());
    }

    #[test]
    fn a_fully_timed_out_burst_resolves_as_a_star_and_advances() {
        let mut tr = tracer();
        tr.start();
        tr.on_reply(&reply_at(1, ProbeOutcome::Timeout));
        let actions = tr.on_reply(&reply_at(1, ProbeOutcome::Timeout));
        assert_eq!(actions.len(), 3);
        assert!(matches!(
            actions[0],
            TracerouteAction::HopResolved { ttl: 1, .. }
        ));
        assert!(actions[1..]
            .iter()
            .all(|a| matches!(a, TracerouteAction::SendProbe { ttl: 2 })));
    }

    #[test]
    fn consecutive_stars_up_to_max_undiscovered_stops_the_trace() {
        let mut tr = tracer();
        tr.start();
        tr.on_reply(&reply_at(1, ProbeOutcome::Timeout));
        tr.on_reply(&reply_at(1, ProbeOutcome::Timeout)); // ttl 1 -> star, advances to ttl 2
        tr.on_reply(&reply_at(2, ProbeOutcome::Timeout));
        let actions = tr.on_reply(&reply_at(2, ProbeOutcome::Timeout));
        assert!(matches!(
            actions.as_slice(),
            [TracerouteAction::HopResolved { ttl: 2, .. }, TracerouteAction::Finished]
        ));
        assert!(tr.is_finished());
    }
}
