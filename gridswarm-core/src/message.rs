//! Envelope and payload types exchanged between drones and the coordinator.
//!
//! Payloads travel as `serde_json::Value`; each protocol has a typed struct
//! that handlers decode into.

use std::fmt;

use serde::de::{DeserializeOwned, Error as _, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};
use thiserror::Error;

use crate::coordinates::GridCoord;
use crate::sensing::Surroundings;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed {protocol} payload: {source}")]
    Malformed {
        protocol: Protocol,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Performative {
    Request,
    Inform,
    Failure,
    NotUnderstood,
}

impl Performative {
    pub fn is_response(self) -> bool {
        !matches!(self, Performative::Request)
    }

    pub fn is_error(self) -> bool {
        matches!(self, Performative::Failure | Performative::NotUnderstood)
    }
}

/// Conversation tag. Parsed once from the wire string; unknown tags are kept
/// verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    Register,
    SendMeMyStatus,
    IMoved,
    BatteryQuery,
    TraceQuery,
    DroneReachedGoal,
    DroneRecharged,
    DroneReachedGoalSubscription,
    LetMeKnowWhenSomeoneMoves,
    SendOriginalMap,
    SendSharedMap,
    SendAllDroneIds,
    SendPositionOfDrone,
    SendDistanceOfDrone,
    SendBatteryOfDrone,
    Other(String),
}

impl Protocol {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "Register" => Protocol::Register,
            "SendMeMyStatus" => Protocol::SendMeMyStatus,
            "IMoved" => Protocol::IMoved,
            "BatteryQuery" => Protocol::BatteryQuery,
            "TraceQuery" => Protocol::TraceQuery,
            "DroneReachedGoal" => Protocol::DroneReachedGoal,
            "DroneRecharged" => Protocol::DroneRecharged,
            "DroneReachedGoalSubscription" => Protocol::DroneReachedGoalSubscription,
            "LetMeKnowWhenSomeoneMoves" => Protocol::LetMeKnowWhenSomeoneMoves,
            "SendOriginalMap" => Protocol::SendOriginalMap,
            "SendSharedMap" => Protocol::SendSharedMap,
            "SendAllDroneIDs" => Protocol::SendAllDroneIds,
            "SendPositionOfDrone" => Protocol::SendPositionOfDrone,
            "SendDistanceOfDrone" => Protocol::SendDistanceOfDrone,
            // Older peers spell it with one 't'.
            "SendBatteryOfDrone" | "SendBateryOfDrone" => Protocol::SendBatteryOfDrone,
            other => Protocol::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Register => "Register",
            Protocol::SendMeMyStatus => "SendMeMyStatus",
            Protocol::IMoved => "IMoved",
            Protocol::BatteryQuery => "BatteryQuery",
            Protocol::TraceQuery => "TraceQuery",
            Protocol::DroneReachedGoal => "DroneReachedGoal",
            Protocol::DroneRecharged => "DroneRecharged",
            Protocol::DroneReachedGoalSubscription => "DroneReachedGoalSubscription",
            Protocol::LetMeKnowWhenSomeoneMoves => "LetMeKnowWhenSomeoneMoves",
            Protocol::SendOriginalMap => "SendOriginalMap",
            Protocol::SendSharedMap => "SendSharedMap",
            Protocol::SendAllDroneIds => "SendAllDroneIDs",
            Protocol::SendPositionOfDrone => "SendPositionOfDrone",
            Protocol::SendDistanceOfDrone => "SendDistanceOfDrone",
            Protocol::SendBatteryOfDrone => "SendBatteryOfDrone",
            Protocol::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Protocol {
    fn from(tag: String) -> Self {
        Protocol::parse(&tag)
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.as_str().to_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub performative: Performative,
    pub protocol: Protocol,
    pub sender: AgentId,
    pub receiver: AgentId,
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    pub fn new(
        performative: Performative,
        protocol: Protocol,
        sender: AgentId,
        receiver: AgentId,
        content: Value,
    ) -> Self {
        Self {
            performative,
            protocol,
            sender,
            receiver,
            content,
        }
    }

    pub fn request(protocol: Protocol, sender: AgentId, receiver: AgentId, content: Value) -> Self {
        Self::new(Performative::Request, protocol, sender, receiver, content)
    }

    pub fn inform(protocol: Protocol, sender: AgentId, receiver: AgentId, content: Value) -> Self {
        Self::new(Performative::Inform, protocol, sender, receiver, content)
    }

    /// Answer on the same conversation, addressed back to the sender.
    pub fn reply(&self, performative: Performative, content: Value) -> Self {
        Self::new(
            performative,
            self.protocol.clone(),
            self.receiver.clone(),
            self.sender.clone(),
            content,
        )
    }

    pub fn failure(&self, reason: impl fmt::Display) -> Self {
        self.reply(Performative::Failure, json!({ "fail": reason.to_string() }))
    }

    pub fn not_understood(&self) -> Self {
        self.reply(Performative::NotUnderstood, Value::Null)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        T::deserialize(&self.content).map_err(|source| PayloadError::Malformed {
            protocol: self.protocol.clone(),
            source,
        })
    }

    /// Reason carried by a FAILURE, if there is one.
    pub fn failure_reason(&self) -> Option<String> {
        self.decode::<FailureReason>().ok().map(|reason| reason.fail)
    }
}

pub fn encode<T: Serialize>(payload: &T) -> Result<Value, PayloadError> {
    Ok(serde_json::to_value(payload)?)
}

/// Bearing and distance from a drone to the goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gonio {
    pub alpha: f64,
    pub dist: f64,
}

/// Answer to `SendMeMyStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(with = "yes_no")]
    pub connected: bool,
    #[serde(with = "yes_no")]
    pub ready: bool,
    pub gps: GridCoord,
    #[serde(with = "si_no")]
    pub goal: bool,
    pub gonio: Gonio,
    pub battery: u32,
    pub radar: Surroundings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveReport {
    pub decision: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroneQuery {
    pub drone: AgentId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceReply {
    pub dist: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveNotice {
    pub drone: AgentId,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalNotice {
    pub drone: AgentId,
}

/// A charger topped up `drone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargeNotice {
    pub drone: AgentId,
    pub battery: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub fail: String,
}

fn parse_flag<'de, D: Deserializer<'de>>(deserializer: D, yes: &'static str, no: &'static str) -> Result<bool, D::Error> {
    let text = String::deserialize(deserializer)?;
    if text == yes {
        Ok(true)
    } else if text == no {
        Ok(false)
    } else {
        Err(D::Error::invalid_value(Unexpected::Str(&text), &"a yes/no flag"))
    }
}

mod yes_no {
    use super::*;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "Yes" } else { "No" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        parse_flag(deserializer, "Yes", "No")
    }
}

mod si_no {
    use super::*;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "Si" } else { "No" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        parse_flag(deserializer, "Si", "No")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    fn status() -> StatusReport {
        StatusReport {
            connected: true,
            ready: true,
            gps: GridCoord::new(2, 3),
            goal: false,
            gonio: Gonio { alpha: 0.5, dist: 4.0 },
            battery: 97,
            radar: Surroundings::default().with(5, Cell::Obstacle),
        }
    }

    #[test]
    fn status_report_wire_shape() {
        let value = encode(&status()).unwrap();
        assert_eq!(
            value,
            json!({
                "connected": "Yes",
                "ready": "Yes",
                "gps": {"x": 2, "y": 3},
                "goal": "No",
                "gonio": {"alpha": 0.5, "dist": 4.0},
                "battery": 97,
                "radar": [0, 0, 0, 0, 0, 1, 0, 0, 0],
            })
        );
        let parsed: StatusReport = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, status());
    }

    #[test]
    fn goal_flag_uses_si() {
        let mut report = status();
        report.goal = true;
        assert_eq!(encode(&report).unwrap()["goal"], "Si");

        let mut value = encode(&report).unwrap();
        value["goal"] = json!("Yes");
        assert!(serde_json::from_value::<StatusReport>(value).is_err());
    }

    #[test]
    fn protocol_tags() {
        assert_eq!(Protocol::parse("SendAllDroneIDs"), Protocol::SendAllDroneIds);
        assert_eq!(Protocol::parse("SendBateryOfDrone"), Protocol::SendBatteryOfDrone);
        assert_eq!(Protocol::parse("Dance"), Protocol::Other("Dance".into()));
        assert_eq!(Protocol::Other("Dance".into()).as_str(), "Dance");
        assert_eq!(serde_json::to_value(Protocol::IMoved).unwrap(), json!("IMoved"));
    }

    #[test]
    fn reply_swaps_addresses() {
        let request = Envelope::request(
            Protocol::IMoved,
            AgentId::new("drone-1"),
            AgentId::new("satellite"),
            json!({"decision": 9}),
        );
        let failure = request.failure("unknown decision 9");

        assert_eq!(failure.performative, Performative::Failure);
        assert_eq!(failure.protocol, Protocol::IMoved);
        assert_eq!(failure.sender.as_str(), "satellite");
        assert_eq!(failure.receiver.as_str(), "drone-1");
        assert_eq!(failure.failure_reason().as_deref(), Some("unknown decision 9"));
        assert_eq!(
            serde_json::to_value(request.not_understood().performative).unwrap(),
            json!("NOT_UNDERSTOOD")
        );
    }

    #[test]
    fn decode_reports_protocol() {
        let request = Envelope::request(
            Protocol::IMoved,
            AgentId::new("drone-1"),
            AgentId::new("satellite"),
            json!({"direction": "east"}),
        );
        let error = request.decode::<MoveReport>().unwrap_err();
        assert!(matches!(error, PayloadError::Malformed { protocol: Protocol::IMoved, .. }));
    }
}
