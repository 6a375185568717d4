//! The coordinator: holds the ground-truth map and serializes every drone
//! interaction on a single loop.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::cell::Cell;
use crate::config::SatelliteConfig;
use crate::coordinates::GridCoord;
use crate::decision::{Decision, Outcome};
use crate::grid::GridMap;
use crate::message::{
    AgentId, DistanceReply, DroneQuery, Envelope, GoalNotice, Gonio, MoveNotice, MoveReport,
    Performative, Protocol, StatusReport, encode,
};
use crate::postbox::{PostError, Postbox};
use crate::sensing::Surroundings;

#[derive(Debug, Error)]
pub enum SatelliteError {
    #[error("map has no goal cells")]
    NoGoal,
    #[error(transparent)]
    Post(#[from] PostError),
}

/// What the coordinator knows about one registered drone.
#[derive(Debug, Clone, PartialEq)]
pub struct DroneStatus {
    pub id: AgentId,
    pub position: GridCoord,
    pub battery: u32,
    pub goal_reached: bool,
    pub finished: Option<Outcome>,
    pub moves: usize,
}

#[derive(Debug, Clone)]
pub struct SatelliteReport {
    pub tracking: GridMap,
    /// Sorted by id.
    pub drones: Vec<DroneStatus>,
}

/// Angle in `[0, 2π)` of the vector `(dx, dy)`, measured from the x axis.
pub fn bearing(dx: f64, dy: f64) -> f64 {
    if dx > 0.0 && dy >= 0.0 {
        (dy / dx).atan()
    } else if dx > 0.0 {
        (dy / dx).atan() + 2.0 * PI
    } else if dx == 0.0 && dy > 0.0 {
        PI / 2.0
    } else if dx == 0.0 && dy < 0.0 {
        3.0 * PI / 2.0
    } else if dx < 0.0 {
        (dy / dx).atan() + PI
    } else {
        0.0
    }
}

pub struct Satellite {
    id: AgentId,
    postbox: Arc<Postbox>,
    inbox: Receiver<Envelope>,
    config: SatelliteConfig,
    truth: GridMap,
    tracking: GridMap,
    goal: (f64, f64),
    drones: HashMap<AgentId, DroneStatus>,
    goal_subscribers: Vec<AgentId>,
    move_subscribers: Vec<AgentId>,
    spawned: usize,
}

impl Satellite {
    pub fn new(
        id: AgentId,
        postbox: Arc<Postbox>,
        truth: GridMap,
        config: SatelliteConfig,
    ) -> Result<Self, SatelliteError> {
        let goal = truth.centroid_of(Cell::Goal).ok_or(SatelliteError::NoGoal)?;
        let inbox = postbox.open_inbox(id.clone())?;
        info!(satellite = %id, goal_x = goal.0, goal_y = goal.1, "coordinator ready");

        Ok(Self {
            id,
            postbox,
            inbox,
            config,
            tracking: truth.clone(),
            truth,
            goal,
            drones: HashMap::new(),
            goal_subscribers: Vec::new(),
            move_subscribers: Vec::new(),
            spawned: 0,
        })
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn goal(&self) -> (f64, f64) {
        self.goal
    }

    pub fn tracking(&self) -> &GridMap {
        &self.tracking
    }

    pub fn drone(&self, id: &AgentId) -> Option<&DroneStatus> {
        self.drones.get(id)
    }

    /// Every expected drone registered and all of them are done.
    pub fn is_done(&self) -> bool {
        self.drones.len() >= self.config.expected_drones
            && self.drones.values().all(|drone| drone.finished.is_some())
    }

    pub fn run(mut self) -> SatelliteReport {
        while !self.is_done() {
            let msg = match self.config.idle_timeout() {
                Some(timeout) => match self.inbox.recv_timeout(timeout) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => {
                        warn!(satellite = %self.id, ?timeout, "no traffic, shutting down");
                        break;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.inbox.recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                },
            };
            self.handle(msg);
        }

        self.postbox.unregister(&self.id);
        let mut drones: Vec<_> = self.drones.into_values().collect();
        drones.sort_by(|a, b| a.id.cmp(&b.id));
        info!(satellite = %self.id, drones = drones.len(), "coordinator finished");
        SatelliteReport {
            tracking: self.tracking,
            drones,
        }
    }

    pub fn handle(&mut self, msg: Envelope) {
        trace!(satellite = %self.id, protocol = %msg.protocol, from = %msg.sender, "inbound");
        match msg.performative {
            Performative::Failure | Performative::NotUnderstood => {
                warn!(
                    satellite = %self.id,
                    from = %msg.sender,
                    protocol = %msg.protocol,
                    performative = ?msg.performative,
                    "peer reported an error"
                );
                return;
            }
            Performative::Inform => {
                self.send(msg.not_understood());
                return;
            }
            Performative::Request => {}
        }

        match msg.protocol {
            Protocol::Register => self.on_register(&msg),
            Protocol::SendMeMyStatus => self.on_status_queried(&msg),
            Protocol::IMoved => self.on_moved(&msg),
            Protocol::DroneReachedGoalSubscription | Protocol::LetMeKnowWhenSomeoneMoves => {
                self.on_subscribe(&msg)
            }
            Protocol::SendOriginalMap | Protocol::SendSharedMap => self.on_map_queried(&msg),
            Protocol::SendAllDroneIds => self.on_ids_queried(&msg),
            Protocol::SendPositionOfDrone
            | Protocol::SendDistanceOfDrone
            | Protocol::SendBatteryOfDrone => self.on_drone_queried(&msg),
            _ => {
                debug!(satellite = %self.id, protocol = %msg.protocol, "protocol not understood");
                self.send(msg.not_understood());
            }
        }
    }

    /// Status snapshot for `drone` as it would be sent over the wire.
    pub fn status_of(&self, drone: &DroneStatus) -> StatusReport {
        let dx = self.goal.0 - f64::from(drone.position.x);
        let dy = self.goal.1 - f64::from(drone.position.y);
        StatusReport {
            connected: true,
            ready: true,
            gps: drone.position,
            goal: self.truth.get(drone.position) == Cell::Goal,
            gonio: Gonio {
                alpha: bearing(dx, dy),
                dist: dx.hypot(dy),
            },
            battery: drone.battery,
            radar: Surroundings::new(self.tracking.window(drone.position)),
        }
    }

    fn on_register(&mut self, msg: &Envelope) {
        if self.drones.contains_key(&msg.sender) {
            self.send(msg.failure(format!("{} is already registered", msg.sender)));
            return;
        }

        let spawn = if self.config.spawn_points.is_empty() {
            GridCoord::new(0, 0)
        } else {
            self.config.spawn_points[self.spawned % self.config.spawn_points.len()]
        };
        if self.truth.get(spawn) == Cell::Obstacle {
            self.send(msg.failure(format!("spawn point ({}, {}) is blocked", spawn.x, spawn.y)));
            return;
        }
        self.spawned += 1;
        if let Err(error) = self.tracking.set(spawn, Cell::Visited) {
            warn!(satellite = %self.id, %error, "could not mark spawn point");
        }

        info!(satellite = %self.id, drone = %msg.sender, x = spawn.x, y = spawn.y, "drone registered");
        self.drones.insert(
            msg.sender.clone(),
            DroneStatus {
                id: msg.sender.clone(),
                position: spawn,
                battery: self.config.battery_capacity,
                goal_reached: self.truth.get(spawn) == Cell::Goal,
                finished: None,
                moves: 0,
            },
        );
    }

    fn on_status_queried(&mut self, msg: &Envelope) {
        let Some(drone) = self.drones.get(&msg.sender) else {
            self.send(msg.failure(format!("{} is not registered", msg.sender)));
            return;
        };
        let reply = match encode(&self.status_of(drone)) {
            Ok(content) => msg.reply(Performative::Inform, content),
            Err(error) => msg.failure(error),
        };
        self.send(reply);
    }

    fn on_moved(&mut self, msg: &Envelope) {
        let Some(drone) = self.drones.get(&msg.sender) else {
            self.send(msg.failure(format!("{} is not registered", msg.sender)));
            return;
        };
        if drone.finished.is_some() {
            self.send(msg.failure(format!("{} already finished", msg.sender)));
            return;
        }

        // An unreadable payload is nobody's protocol violation.
        let report: MoveReport = match msg.decode() {
            Ok(report) => report,
            Err(error) => {
                debug!(satellite = %self.id, %error, "bad move report");
                self.send(msg.not_understood());
                return;
            }
        };
        let Some(decision) = Decision::from_code(report.decision) else {
            self.send(msg.failure(format!("unknown decision {}", report.decision)));
            return;
        };

        match decision {
            Decision::End(outcome) => self.finish(msg, outcome),
            Decision::Move(direction) => {
                let target = drone.position.step(direction);
                if self.truth.get(target) == Cell::Obstacle {
                    self.send(msg.failure(format!("cell ({}, {}) is blocked", target.x, target.y)));
                    return;
                }
                self.accept_move(msg, target);
            }
        }
    }

    fn accept_move(&mut self, msg: &Envelope, target: GridCoord) {
        if let Err(error) = self.tracking.set(target, Cell::Visited) {
            warn!(satellite = %self.id, %error, "tracking map out of sync");
        }
        let goal_reached = self.truth.get(target) == Cell::Goal;
        let per_move = self.config.battery_per_move;
        if let Some(drone) = self.drones.get_mut(&msg.sender) {
            drone.position = target;
            drone.battery = drone.battery.saturating_sub(per_move);
            drone.goal_reached = goal_reached;
            drone.moves += 1;
        }
        debug!(satellite = %self.id, drone = %msg.sender, x = target.x, y = target.y, "move accepted");
        self.send(msg.reply(Performative::Inform, Value::Null));

        let notice = MoveNotice {
            drone: msg.sender.clone(),
            x: target.x,
            y: target.y,
        };
        self.notify(
            &self.move_subscribers,
            &msg.sender,
            Protocol::LetMeKnowWhenSomeoneMoves,
            &notice,
        );
    }

    fn finish(&mut self, msg: &Envelope, outcome: Outcome) {
        if let Some(drone) = self.drones.get_mut(&msg.sender) {
            drone.finished = Some(outcome);
            info!(satellite = %self.id, drone = %msg.sender, ?outcome, moves = drone.moves, "drone finished");
        }
        self.send(msg.reply(Performative::Inform, Value::Null));

        if outcome == Outcome::Success {
            let notice = GoalNotice {
                drone: msg.sender.clone(),
            };
            self.notify(
                &self.goal_subscribers,
                &msg.sender,
                Protocol::DroneReachedGoal,
                &notice,
            );
        }
    }

    fn on_subscribe(&mut self, msg: &Envelope) {
        let subscribers = match msg.protocol {
            Protocol::DroneReachedGoalSubscription => &mut self.goal_subscribers,
            _ => &mut self.move_subscribers,
        };
        if !subscribers.contains(&msg.sender) {
            subscribers.push(msg.sender.clone());
        }
        debug!(satellite = %self.id, from = %msg.sender, protocol = %msg.protocol, "subscribed");
    }

    fn on_map_queried(&mut self, msg: &Envelope) {
        let map = match msg.protocol {
            Protocol::SendOriginalMap => &self.truth,
            _ => &self.tracking,
        };
        let reply = match encode(map) {
            Ok(content) => msg.reply(Performative::Inform, content),
            Err(error) => msg.failure(error),
        };
        self.send(reply);
    }

    fn on_ids_queried(&mut self, msg: &Envelope) {
        let mut ids: Vec<_> = self.drones.keys().cloned().collect();
        ids.sort();
        let reply = match encode(&ids) {
            Ok(content) => msg.reply(Performative::Inform, content),
            Err(error) => msg.failure(error),
        };
        self.send(reply);
    }

    fn on_drone_queried(&mut self, msg: &Envelope) {
        let query: DroneQuery = match msg.decode() {
            Ok(query) => query,
            Err(error) => {
                debug!(satellite = %self.id, %error, "bad drone query");
                self.send(msg.not_understood());
                return;
            }
        };
        let Some(drone) = self.drones.get(&query.drone) else {
            self.send(msg.failure(format!("unknown drone {}", query.drone)));
            return;
        };

        let content = match msg.protocol {
            Protocol::SendPositionOfDrone => encode(&drone.position),
            Protocol::SendDistanceOfDrone => encode(&DistanceReply {
                dist: self.status_of(drone).gonio.dist,
            }),
            _ => Ok(json!(drone.battery)),
        };
        let reply = match content {
            Ok(content) => msg.reply(Performative::Inform, content),
            Err(error) => msg.failure(error),
        };
        self.send(reply);
    }

    fn notify(&self, subscribers: &[AgentId], about: &AgentId, protocol: Protocol, notice: &impl serde::Serialize) {
        let content = match encode(notice) {
            Ok(content) => content,
            Err(error) => {
                warn!(satellite = %self.id, %error, "could not encode notice");
                return;
            }
        };
        for subscriber in subscribers.iter().filter(|subscriber| *subscriber != about) {
            self.send(Envelope::inform(
                protocol.clone(),
                self.id.clone(),
                subscriber.clone(),
                content.clone(),
            ));
        }
    }

    fn send(&self, envelope: Envelope) {
        if let Err(error) = self.postbox.send(envelope) {
            warn!(satellite = %self.id, %error, "could not deliver");
        }
    }
}
