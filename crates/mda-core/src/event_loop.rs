//! Event loop (spec §4.D, component D): single-threaded and
//! readiness-based. Each tick services overdue timeouts, drains whatever
//! reply traffic `mio` says is readable, then releases outbound probes
//! whose send time has arrived — in that fixed order, so a burst of
//! incoming replies can never starve the timeout sweep.

use crate::error::Result;
use crate::probe::Reply;
use crate::scheduler::Scheduler;
use mda_net::SocketManager;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::time::{Duration, SystemTime};

const TOKEN_V4_SNIFF: Token = Token(0);
const TOKEN_V6_SNIFF: Token = Token(1);

/// One event the loop hands to the algorithm instance tree (spec §4.D
/// "event fan-out").
#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// A probe completed, answered or timed out.
    Reply(Reply),
    /// One full tick elapsed with nothing new to report; instances use
    /// this to check their own wall-clock deadlines.
    Tick,
}

/// Owns the `mio` poller registered against both sniffer file
/// descriptors. Does not own the sockets themselves (spec §5 "shared
/// resources": the socket manager is shared, the poller is not).
pub struct EventLoop {
    poll: Poll,
    events: Events,
}

impl EventLoop {
    pub fn new(sockets: &SocketManager) -> std::io::Result<Self> {
        let poll = Poll::new()?;
        if let Some(fd) = sockets.v4_sniff_fd() {
            poll.registry()
                .register(&mut SourceFd(&fd), TOKEN_V4_SNIFF, Interest::READABLE)?;
        }
        if let Some(fd) = sockets.v6_sniff_fd() {
            poll.registry()
                .register(&mut SourceFd(&fd), TOKEN_V6_SNIFF, Interest::READABLE)?;
        }
        Ok(Self {
            poll,
            events: Events::with_capacity(16),
        })
    }

    /// Runs one tick, blocking for at most `poll_timeout` waiting for
    /// sniffer readiness. Returns every event produced, in delivery
    /// order: expired timeouts, then correlated replies, then a
    /// trailing `Tick`.
    pub fn tick(
        &mut self,
        sockets: &mut SocketManager,
        scheduler: &mut Scheduler,
        poll_timeout: Duration,
    ) -> Result<Vec<LoopEvent>> {
        let mut out = Vec::new();
        let now = SystemTime::now();

        for reply in scheduler.expire_timeouts(now) {
            out.push(LoopEvent::Reply(reply));
        }

        self.poll.poll(&mut self.events, Some(poll_timeout))?;
        for event in self.events.iter() {
            let decoded = match event.token() {
                TOKEN_V4_SNIFF => sockets.sniff_v4(Duration::ZERO)?,
                TOKEN_V6_SNIFF => sockets.sniff_v6(Duration::ZERO)?,
                _ => None,
            };
            if let Some(decoded) = decoded {
                if let Some(reply) = scheduler.correlate(&decoded) {
                    out.push(LoopEvent::Reply(reply));
                }
            }
        }

        out.push(LoopEvent::Tick);
        Ok(out)
    }
}
