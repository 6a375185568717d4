//! Drone agent: a think cycle on the caller's thread plus a dispatcher thread
//! answering peers.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::behavior::BehaviorChain;
use crate::brain::Brain;
use crate::config::DroneConfig;
use crate::coordinates::GridCoord;
use crate::decision::{Decision, Outcome};
use crate::dispatch::{DefaultHooks, Dispatcher, DroneShared, InboundHooks};
use crate::grid::GridMap;
use crate::message::{
    AgentId, Envelope, MoveReport, PayloadError, Performative, Protocol, StatusReport, encode,
};
use crate::postbox::{Mailbox, PostError, Postbox};
use crate::trace::Trace;

#[derive(Debug, Error)]
pub enum DroneError {
    #[error(transparent)]
    Post(#[from] PostError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("no {protocol} reply within {timeout:?}")]
    ReplyTimeout { protocol: Protocol, timeout: Duration },
    #[error("reply queue closed")]
    Disconnected,
    #[error("status request refused: {reason}")]
    StatusRefused { reason: String },
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Coordinator's answer to a reported decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Accepted,
    Rejected { reason: Option<String> },
}

#[derive(Debug, Clone)]
pub struct DroneReport {
    pub id: AgentId,
    pub outcome: Outcome,
    pub position: GridCoord,
    pub moves: usize,
    pub rejected: u32,
    pub trace: Trace,
    pub peers_at_goal: Vec<AgentId>,
}

/// Called after every trace append.
pub type TraceUpdatedFn = Box<dyn FnMut(&Trace) + Send>;

/// Splits deliveries between the think cycle and the dispatcher.
struct DroneMailbox {
    replies: Sender<Envelope>,
    requests: Sender<Envelope>,
}

impl Mailbox for DroneMailbox {
    fn deliver(&self, envelope: Envelope) -> Result<(), PostError> {
        let is_reply = envelope.performative.is_response()
            && matches!(envelope.protocol, Protocol::SendMeMyStatus | Protocol::IMoved);
        if is_reply {
            self.replies.deliver(envelope)
        } else {
            self.requests.deliver(envelope)
        }
    }
}

pub struct Drone {
    id: AgentId,
    satellite: AgentId,
    postbox: Arc<Postbox>,
    config: DroneConfig,
    shared: Arc<DroneShared>,
    brain: Brain,
    hooks: Box<dyn InboundHooks>,
    trace_updated: Option<TraceUpdatedFn>,
    replies: Receiver<Envelope>,
    requests: Receiver<Envelope>,
}

impl Drone {
    /// Registers the drone's mailbox under `id`. `memory` is the drone's
    /// private map and fixes the size of the explored area.
    pub fn connect(
        id: AgentId,
        satellite: AgentId,
        postbox: Arc<Postbox>,
        memory: GridMap,
        config: DroneConfig,
    ) -> Result<Self, DroneError> {
        let (reply_tx, replies) = unbounded();
        let (request_tx, requests) = unbounded();
        postbox.register(
            id.clone(),
            Arc::new(DroneMailbox {
                replies: reply_tx,
                requests: request_tx,
            }),
        )?;

        let chain = BehaviorChain::from_config(&config, memory.width(), memory.height());
        Ok(Self {
            shared: Arc::new(DroneShared::new(id.clone())),
            id,
            satellite,
            postbox,
            config,
            brain: Brain::new(memory, chain),
            hooks: Box::new(DefaultHooks),
            trace_updated: None,
            replies,
            requests,
        })
    }

    pub fn with_hooks(mut self, hooks: impl InboundHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn with_chain(mut self, chain: BehaviorChain) -> Self {
        self.brain.set_chain(chain);
        self
    }

    pub fn on_trace_updated(mut self, callback: impl FnMut(&Trace) + Send + 'static) -> Self {
        self.trace_updated = Some(Box::new(callback));
        self
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn shared(&self) -> Arc<DroneShared> {
        Arc::clone(&self.shared)
    }

    /// Explores until the goal is reached or the drone gives up. The
    /// dispatcher thread is shut down before returning.
    pub fn run(self) -> Result<DroneReport, DroneError> {
        let Drone {
            id,
            satellite,
            postbox,
            config,
            shared,
            mut brain,
            hooks,
            trace_updated,
            replies,
            requests,
        } = self;

        let dispatcher = Dispatcher::new(Arc::clone(&shared), Arc::clone(&postbox), hooks);
        let handle = thread::Builder::new()
            .name(format!("{id}-dispatch"))
            .spawn(move || dispatcher.run(requests))
            .map_err(DroneError::Spawn)?;

        let mut cycle = ThinkCycle {
            link: Link {
                id: id.clone(),
                satellite,
                postbox: Arc::clone(&postbox),
                replies,
                timeout: config.reply_timeout(),
            },
            config,
            shared,
            trace_updated,
        };
        let result = cycle.explore(&mut brain);

        // Dropping the route closes the request queue and ends the dispatcher.
        postbox.unregister(&id);
        if handle.join().is_err() {
            warn!(drone = %id, "dispatcher thread panicked");
        }
        result
    }
}

struct Link {
    id: AgentId,
    satellite: AgentId,
    postbox: Arc<Postbox>,
    replies: Receiver<Envelope>,
    timeout: Option<Duration>,
}

impl Link {
    fn send(&self, protocol: Protocol, content: Value) -> Result<(), DroneError> {
        let envelope = Envelope::request(protocol, self.id.clone(), self.satellite.clone(), content);
        self.postbox.send(envelope)?;
        Ok(())
    }

    fn ask(&self, protocol: Protocol, content: Value) -> Result<Envelope, DroneError> {
        self.send(protocol.clone(), content)?;
        self.await_reply(&protocol)
    }

    fn await_reply(&self, protocol: &Protocol) -> Result<Envelope, DroneError> {
        loop {
            let reply = match self.timeout {
                Some(timeout) => self.replies.recv_timeout(timeout).map_err(|error| match error {
                    RecvTimeoutError::Timeout => DroneError::ReplyTimeout {
                        protocol: protocol.clone(),
                        timeout,
                    },
                    RecvTimeoutError::Disconnected => DroneError::Disconnected,
                })?,
                None => self.replies.recv().map_err(|_| DroneError::Disconnected)?,
            };
            if &reply.protocol == protocol {
                return Ok(reply);
            }
            debug!(drone = %self.id, expected = %protocol, got = %reply.protocol, "dropping stale reply");
        }
    }

    fn status(&self) -> Result<StatusReport, DroneError> {
        let reply = self.ask(Protocol::SendMeMyStatus, Value::Null)?;
        if reply.performative != Performative::Inform {
            let reason = reply
                .failure_reason()
                .unwrap_or_else(|| format!("{:?}", reply.performative));
            return Err(DroneError::StatusRefused { reason });
        }
        Ok(reply.decode()?)
    }

    fn report(&self, decision: Decision) -> Result<Ack, DroneError> {
        let payload = encode(&MoveReport {
            decision: decision.code(),
        })?;
        let reply = self.ask(Protocol::IMoved, payload)?;
        Ok(match reply.performative {
            Performative::Inform => Ack::Accepted,
            _ => Ack::Rejected {
                reason: reply.failure_reason(),
            },
        })
    }
}

struct ThinkCycle {
    link: Link,
    config: DroneConfig,
    shared: Arc<DroneShared>,
    trace_updated: Option<TraceUpdatedFn>,
}

impl ThinkCycle {
    fn explore(&mut self, brain: &mut Brain) -> Result<DroneReport, DroneError> {
        let id = self.link.id.clone();
        self.link.send(Protocol::Register, Value::Null)?;
        if self.config.subscribe_goal_notices {
            self.link.send(Protocol::DroneReachedGoalSubscription, Value::Null)?;
        }
        info!(drone = %id, "registered");

        let mut moves = 0;
        let mut rejected = 0;
        let mut consecutive = 0;
        loop {
            let mut status = self.link.status()?;
            self.shared.set_battery(status.battery);

            let decision = brain.think(&mut status, self.shared.standby());
            debug!(drone = %id, ?decision, position = ?status.gps, "decided");
            let ack = self.link.report(decision)?;

            match decision {
                Decision::End(outcome) => {
                    if let Ack::Rejected { reason } = ack {
                        warn!(drone = %id, ?reason, "end of exploration not acknowledged");
                    }
                    self.record(decision, status.gps);
                    info!(drone = %id, ?outcome, moves, "exploration finished");
                    return Ok(self.finish(outcome, status.gps, moves, rejected));
                }
                Decision::Move(direction) => match ack {
                    Ack::Accepted => {
                        consecutive = 0;
                        moves += 1;
                        self.record(decision, status.gps.step(direction));
                    }
                    Ack::Rejected { reason } => {
                        consecutive += 1;
                        rejected += 1;
                        warn!(drone = %id, ?direction, ?reason, consecutive, "move rejected");
                        if consecutive >= self.config.max_rejections {
                            warn!(drone = %id, "too many rejected moves, giving up");
                            let fail = Decision::End(Outcome::Fail);
                            self.link.report(fail)?;
                            self.record(fail, status.gps);
                            return Ok(self.finish(Outcome::Fail, status.gps, moves, rejected));
                        }
                    }
                },
            }
        }
    }

    fn record(&mut self, decision: Decision, location: GridCoord) {
        self.shared.record(decision, location);
        if let Some(callback) = self.trace_updated.as_mut() {
            callback(&*self.shared.trace());
        }
    }

    fn finish(&self, outcome: Outcome, position: GridCoord, moves: usize, rejected: u32) -> DroneReport {
        DroneReport {
            id: self.link.id.clone(),
            outcome,
            position,
            moves,
            rejected,
            trace: self.shared.trace().clone(),
            peers_at_goal: self.shared.peers_at_goal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Gonio;
    use crate::sensing::Surroundings;
    use serde_json::json;

    fn status(x: i32, y: i32, goal: bool) -> Value {
        encode(&StatusReport {
            connected: true,
            ready: true,
            gps: GridCoord::new(x, y),
            goal,
            gonio: Gonio { alpha: 0.0, dist: 2.0 },
            battery: 90,
            radar: Surroundings::default(),
        })
        .unwrap()
    }

    /// Answers the drone from the test thread in place of a coordinator.
    fn expect(satellite: &Receiver<Envelope>, postbox: &Postbox, protocol: Protocol, answer: Option<Envelope>) {
        let request = satellite.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(request.protocol, protocol);
        if let Some(answer) = answer {
            postbox.send(answer).unwrap();
        }
    }

    fn drone(postbox: &Arc<Postbox>, config: DroneConfig) -> Drone {
        Drone::connect(
            AgentId::new("drone-1"),
            AgentId::new("satellite"),
            Arc::clone(postbox),
            GridMap::new(6, 6),
            config,
        )
        .unwrap()
    }

    fn inform(protocol: Protocol, content: Value) -> Envelope {
        Envelope::inform(protocol, AgentId::new("satellite"), AgentId::new("drone-1"), content)
    }

    #[test]
    fn mailbox_routes_replies_and_requests() {
        let (reply_tx, replies) = unbounded();
        let (request_tx, requests) = unbounded();
        let mailbox = DroneMailbox {
            replies: reply_tx,
            requests: request_tx,
        };

        mailbox.deliver(inform(Protocol::IMoved, Value::Null)).unwrap();
        mailbox.deliver(inform(Protocol::SendMeMyStatus, Value::Null)).unwrap();
        mailbox.deliver(inform(Protocol::DroneReachedGoal, json!({"drone": "x"}))).unwrap();
        mailbox
            .deliver(Envelope::request(
                Protocol::IMoved,
                AgentId::new("peer"),
                AgentId::new("drone-1"),
                Value::Null,
            ))
            .unwrap();

        assert_eq!(replies.len(), 2);
        assert_eq!(requests.len(), 2);
    }

    #[test]
    fn explores_until_goal() {
        let postbox = Postbox::new();
        let satellite = postbox.open_inbox(AgentId::new("satellite")).unwrap();
        let drone = drone(
            &postbox,
            DroneConfig {
                subscribe_goal_notices: false,
                ..DroneConfig::default()
            },
        );
        let handle = thread::spawn(move || drone.run());

        expect(&satellite, &postbox, Protocol::Register, None);
        expect(
            &satellite,
            &postbox,
            Protocol::SendMeMyStatus,
            Some(inform(Protocol::SendMeMyStatus, status(1, 1, false))),
        );
        expect(&satellite, &postbox, Protocol::IMoved, Some(inform(Protocol::IMoved, Value::Null)));
        expect(
            &satellite,
            &postbox,
            Protocol::SendMeMyStatus,
            Some(inform(Protocol::SendMeMyStatus, status(2, 1, true))),
        );
        expect(&satellite, &postbox, Protocol::IMoved, Some(inform(Protocol::IMoved, Value::Null)));

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.outcome, Outcome::Success);
        assert_eq!(report.moves, 1);
        assert_eq!(report.trace.len(), 2);
        assert_eq!(report.trace.location(0), Some(GridCoord::new(2, 1)));
        assert!(!postbox.is_registered(&AgentId::new("drone-1")));
    }

    #[test]
    fn gives_up_after_repeated_rejections() {
        let postbox = Postbox::new();
        let satellite = postbox.open_inbox(AgentId::new("satellite")).unwrap();
        let drone = drone(
            &postbox,
            DroneConfig {
                max_rejections: 2,
                subscribe_goal_notices: false,
                ..DroneConfig::default()
            },
        );
        let handle = thread::spawn(move || drone.run());

        expect(&satellite, &postbox, Protocol::Register, None);
        for _ in 0..2 {
            expect(
                &satellite,
                &postbox,
                Protocol::SendMeMyStatus,
                Some(inform(Protocol::SendMeMyStatus, status(1, 1, false))),
            );
            let request = satellite.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(request.protocol, Protocol::IMoved);
            postbox.send(request.failure("blocked")).unwrap();
        }
        let request = satellite.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(request.decode::<MoveReport>().unwrap().decision, -2);
        postbox.send(request.reply(Performative::Inform, Value::Null)).unwrap();

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.outcome, Outcome::Fail);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.moves, 0);
        assert_eq!(report.trace.len(), 1);
    }

    #[test]
    fn times_out_without_coordinator() {
        let postbox = Postbox::new();
        let _satellite = postbox.open_inbox(AgentId::new("satellite")).unwrap();
        let drone = drone(
            &postbox,
            DroneConfig {
                reply_timeout_ms: Some(50),
                ..DroneConfig::default()
            },
        );
        assert!(matches!(
            drone.run(),
            Err(DroneError::ReplyTimeout {
                protocol: Protocol::SendMeMyStatus,
                ..
            })
        ));
    }
}
