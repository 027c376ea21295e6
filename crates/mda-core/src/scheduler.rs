//! Scheduler & correlator (spec §4.E, component E): an outbound priority
//! queue of probes waiting for their send time, an in-flight table keyed
//! by sequence number, and a timeout sweep that turns overdue probes
//! into `Reply`s carrying `ProbeOutcome::Timeout`.

use crate::error::{Error, Result};
use crate::probe::{matches, FlowId, Probe, ProbeOutcome, ProbeTemplate, Reply};
use mda_net::DecodedReply;
use mda_packet::{icmpv4, icmpv6};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, SystemTime};

/// Bounds how many probes the scheduler will track in flight at once
/// (spec §5 "bounded concurrency"); `pop_ready` returns `QueueFull`
/// beyond this rather than growing unbounded while a path is slow.
pub const MAX_IN_FLIGHT: usize = 256;

#[derive(Debug, Clone)]
struct Scheduled {
    sequence: u32,
    template: ProbeTemplate,
    flow_id: FlowId,
    ttl: u8,
    round: u8,
    icmp_identifier: u16,
    icmp_sequence: u16,
    ready_at: SystemTime,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.sequence == other.sequence
    }
}

impl Eq for Scheduled {}

// `BinaryHeap` is a max-heap; reverse the comparison so the earliest
// `ready_at` (ties broken by sequence, for determinism) pops first.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct Scheduler {
    outbound: BinaryHeap<Scheduled>,
    in_flight: HashMap<u32, Probe>,
    next_sequence: u32,
    probe_timeout: Duration,
}

impl Scheduler {
    #[must_use]
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            outbound: BinaryHeap::new(),
            in_flight: HashMap::new(),
            next_sequence: 1,
            probe_timeout,
        }
    }

    /// Queues a probe to become eligible for sending at `ready_at`,
    /// returning the sequence number it will be sent under.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &mut self,
        template: ProbeTemplate,
        flow_id: FlowId,
        ttl: u8,
        round: u8,
        icmp_identifier: u16,
        icmp_sequence: u16,
        ready_at: SystemTime,
    ) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.outbound.push(Scheduled {
            sequence,
            template,
            flow_id,
            ttl,
            round,
            icmp_identifier,
            icmp_sequence,
            ready_at,
        });
        sequence
    }

    /// Pops and moves into flight the next probe ready at or before
    /// `now`. `Ok(None)` if the queue is empty or nothing is due yet.
    pub fn pop_ready(&mut self, now: SystemTime) -> Result<Option<Probe>> {
        if self.in_flight.len() >= MAX_IN_FLIGHT {
            return Err(Error::QueueFull);
        }
        match self.outbound.peek() {
            Some(peek) if peek.ready_at <= now => {}
            _ => return Ok(None),
        }
        let scheduled = self.outbound.pop().expect("peeked above");
        let probe = Probe {
            sequence: scheduled.sequence,
            template: scheduled.template,
            flow_id: scheduled.flow_id,
            ttl: scheduled.ttl,
            round: scheduled.round,
            icmp_identifier: scheduled.icmp_identifier,
            icmp_sequence: scheduled.icmp_sequence,
            sent: now,
        };
        self.in_flight.insert(probe.sequence, probe.clone());
        Ok(Some(probe))
    }

    /// The earliest still-pending `ready_at`, for the event loop to size
    /// its next poll timeout against.
    #[must_use]
    pub fn next_ready_at(&self) -> Option<SystemTime> {
        self.outbound.peek().map(|s| s.ready_at)
    }

    /// Matches `decoded` against every in-flight probe, removing and
    /// returning the match as a completed `Reply`. `None` if nothing
    /// in-flight corresponds to it (spec §4.E correlator).
    pub fn correlate(&mut self, decoded: &DecodedReply) -> Option<Reply> {
        let sequence = self
            .in_flight
            .iter()
            .find(|(_, probe)| matches(probe, decoded))
            .map(|(&seq, _)| seq)?;
        let probe = self.in_flight.remove(&sequence)?;
        let rtt = probe.elapsed_since_sent(decoded.received);
        Some(Reply {
            probe,
            outcome: classify(decoded),
            received: decoded.received,
            rtt,
        })
    }

    /// Removes every in-flight probe older than `probe_timeout` as of
    /// `now`, returning each as a `Reply` with `ProbeOutcome::Timeout`
    /// (spec §4.E "timeout wheel").
    pub fn expire_timeouts(&mut self, now: SystemTime) -> Vec<Reply> {
        let expired: Vec<u32> = self
            .in_flight
            .iter()
            .filter(|(_, probe)| {
                now.duration_since(probe.sent).unwrap_or_default() >= self.probe_timeout
            })
            .map(|(&seq, _)| seq)
            .collect();
        expired
            .into_iter()
            .filter_map(|seq| {
                let probe = self.in_flight.remove(&seq)?;
                let rtt = probe.elapsed_since_sent(now);
                Some(Reply {
                    probe,
                    outcome: ProbeOutcome::Timeout,
                    received: now,
                    rtt,
                })
            })
            .collect()
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }
}

/// Classifies a decoded ICMP message into the outcome its matching
/// probe should see, using the responder's address family to pick the
/// right type constants.
fn classify(decoded: &DecodedReply) -> ProbeOutcome {
    let is_v6 = decoded.responder.is_v6();
    let time_exceeded = if is_v6 {
        icmpv6::TYPE_TIME_EXCEEDED
    } else {
        icmpv4::TYPE_TIME_EXCEEDED
    };
    let destination_unreachable = if is_v6 {
        icmpv6::TYPE_DESTINATION_UNREACHABLE
    } else {
        icmpv4::TYPE_DESTINATION_UNREACHABLE
    };

    if decoded.icmp_type == destination_unreachable {
        ProbeOutcome::DestinationUnreachable {
            responder: decoded.responder,
            icmp_code: decoded.icmp_code,
        }
    } else if decoded.icmp_type == time_exceeded {
        ProbeOutcome::TimeExceeded {
            responder: decoded.responder,
        }
    } else {
        // The socket manager only ever decodes Time Exceeded,
        // Destination Unreachable or Echo Reply; Echo Reply never
        // reaches here since `correlate` matches it via `echo_*`
        // fields before falling back to a quotation lookup.
        ProbeOutcome::EchoReply {
            responder: decoded.responder,
        }
    }
}
