//! Inbound side of a drone: answers peers while the think cycle runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::coordinates::GridCoord;
use crate::decision::Decision;
use crate::message::{
    AgentId, Envelope, GoalNotice, PayloadError, Performative, Protocol, RechargeNotice, encode,
};
use crate::postbox::Postbox;
use crate::standby::StandbyGate;
use crate::trace::Trace;

#[derive(Debug, Error)]
pub enum HookError {
    /// The payload could not be understood.
    #[error(transparent)]
    Malformed(#[from] PayloadError),
    /// The payload was fine but handling it failed.
    #[error("{0}")]
    Processing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// State a drone shares between its think cycle and its dispatcher. Nothing
/// here feeds the behavior chain.
#[derive(Debug)]
pub struct DroneShared {
    id: AgentId,
    battery: AtomicU32,
    trace: RwLock<Trace>,
    standby: StandbyGate,
    peers_at_goal: Mutex<Vec<AgentId>>,
    recharges: AtomicU32,
}

impl DroneShared {
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            battery: AtomicU32::new(0),
            trace: RwLock::new(Trace::new()),
            standby: StandbyGate::new(),
            peers_at_goal: Mutex::new(Vec::new()),
            recharges: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Last battery level reported by the coordinator.
    pub fn battery(&self) -> u32 {
        self.battery.load(Ordering::Relaxed)
    }

    pub fn set_battery(&self, level: u32) {
        self.battery.store(level, Ordering::Relaxed);
    }

    pub fn trace(&self) -> RwLockReadGuard<'_, Trace> {
        self.trace.read()
    }

    pub fn record(&self, decision: Decision, location: GridCoord) {
        self.trace.write().push(decision, location);
    }

    pub fn standby(&self) -> &StandbyGate {
        &self.standby
    }

    pub fn note_peer_at_goal(&self, peer: AgentId) {
        let mut peers = self.peers_at_goal.lock();
        if !peers.contains(&peer) {
            peers.push(peer);
        }
    }

    pub fn peers_at_goal(&self) -> Vec<AgentId> {
        self.peers_at_goal.lock().clone()
    }

    pub fn note_recharge(&self) {
        self.recharges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recharges(&self) -> u32 {
        self.recharges.load(Ordering::Relaxed)
    }
}

/// Per-protocol handlers of the dispatcher. Queries return the reply content;
/// notifications return nothing. The error policies decide, per message,
/// whether the dispatcher keeps running.
pub trait InboundHooks: Send {
    fn on_battery_queried(&mut self, shared: &DroneShared, _msg: &Envelope) -> Result<Value, HookError> {
        Ok(json!(shared.battery()))
    }

    fn on_trace_queried(&mut self, shared: &DroneShared, _msg: &Envelope) -> Result<Value, HookError> {
        Ok(encode(&*shared.trace())?)
    }

    fn on_drone_reached_goal(&mut self, shared: &DroneShared, msg: &Envelope) -> Result<(), HookError> {
        let notice: GoalNotice = msg.decode()?;
        info!(drone = %shared.id(), peer = %notice.drone, "peer reached the goal");
        shared.note_peer_at_goal(notice.drone);
        Ok(())
    }

    fn on_drone_recharged(&mut self, shared: &DroneShared, msg: &Envelope) -> Result<(), HookError> {
        let notice: RechargeNotice = msg.decode()?;
        debug!(drone = %shared.id(), peer = %notice.drone, battery = notice.battery, "peer recharged");
        shared.note_recharge();
        Ok(())
    }

    fn on_malformed(&mut self, _msg: &Envelope, _error: &PayloadError) -> Flow {
        Flow::Continue
    }

    fn on_processing_error(&mut self, _msg: &Envelope, _reason: &str) -> Flow {
        Flow::Continue
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl InboundHooks for DefaultHooks {}

pub struct Dispatcher {
    shared: Arc<DroneShared>,
    postbox: Arc<Postbox>,
    hooks: Box<dyn InboundHooks>,
}

impl Dispatcher {
    pub fn new(shared: Arc<DroneShared>, postbox: Arc<Postbox>, hooks: Box<dyn InboundHooks>) -> Self {
        Self {
            shared,
            postbox,
            hooks,
        }
    }

    /// Drains `requests` until every sender is gone or a policy says stop.
    pub fn run(mut self, requests: Receiver<Envelope>) {
        while let Ok(msg) = requests.recv() {
            if self.dispatch(msg) == Flow::Stop {
                info!(drone = %self.shared.id(), "dispatcher stopped by policy");
                return;
            }
        }
        debug!(drone = %self.shared.id(), "dispatcher finished");
    }

    pub fn dispatch(&mut self, msg: Envelope) -> Flow {
        trace!(drone = %self.shared.id(), protocol = %msg.protocol, from = %msg.sender, "inbound");
        if msg.performative.is_error() {
            warn!(
                drone = %self.shared.id(),
                protocol = %msg.protocol,
                from = %msg.sender,
                reason = ?msg.failure_reason(),
                "peer reported an error"
            );
            return Flow::Continue;
        }

        let shared = self.shared.as_ref();
        let outcome = match msg.protocol {
            Protocol::BatteryQuery => self.hooks.on_battery_queried(shared, &msg).map(Some),
            Protocol::TraceQuery => self.hooks.on_trace_queried(shared, &msg).map(Some),
            Protocol::DroneReachedGoal => self.hooks.on_drone_reached_goal(shared, &msg).map(|()| None),
            Protocol::DroneRecharged => self.hooks.on_drone_recharged(shared, &msg).map(|()| None),
            _ => {
                debug!(drone = %shared.id(), protocol = %msg.protocol, "protocol not understood");
                self.send(msg.not_understood());
                return Flow::Continue;
            }
        };

        match outcome {
            Ok(Some(content)) => {
                self.send(msg.reply(Performative::Inform, content));
                Flow::Continue
            }
            Ok(None) => Flow::Continue,
            Err(HookError::Malformed(error)) => {
                warn!(drone = %self.shared.id(), %error, "malformed inbound message");
                self.send(msg.not_understood());
                self.hooks.on_malformed(&msg, &error)
            }
            Err(HookError::Processing(reason)) => {
                warn!(drone = %self.shared.id(), protocol = %msg.protocol, %reason, "inbound message failed");
                self.send(msg.failure(&reason));
                self.hooks.on_processing_error(&msg, &reason)
            }
        }
    }

    fn send(&self, envelope: Envelope) {
        if let Err(error) = self.postbox.send(envelope) {
            warn!(drone = %self.shared.id(), %error, "could not answer peer");
        }
    }
}
