//! JSON wire protocol.
//!
//! Every frame is a UTF-8 text websocket message holding one JSON object with
//! a `type` discriminator. Entity maps are keyed by numeric id, written as
//! JSON object keys (strings) on the wire.

use crate::{ChunkCoord, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary frames are not part of the protocol")]
    BinaryFrame,
}

/// Kinematic state of one fish as sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FishSnapshot {
    pub id: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    #[serde(rename = "chunkX")]
    pub chunk_x: i32,
    #[serde(rename = "chunkZ")]
    pub chunk_z: i32,
}

impl FishSnapshot {
    pub fn home_chunk(&self) -> ChunkCoord {
        ChunkCoord::new(self.chunk_x, self.chunk_z)
    }
}

/// Player entry of a `gameState` message. Velocity is optional on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vz: Option<f32>,
}

impl PlayerSnapshot {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z: position.z,
            vx: Some(velocity.x),
            vy: Some(velocity.y),
            vz: Some(velocity.z),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Reported velocity, zero on axes the sender left out.
    pub fn velocity(&self) -> Vec3 {
        Vec3::new(
            self.vx.unwrap_or(0.0),
            self.vy.unwrap_or(0.0),
            self.vz.unwrap_or(0.0),
        )
    }
}

/// Full world snapshot carried by `gameState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GameStateData {
    /// Milliseconds since the Unix epoch when the snapshot was built.
    pub timestamp: u64,
    #[serde(with = "id_map")]
    pub players: BTreeMap<u32, PlayerSnapshot>,
    #[serde(with = "id_map")]
    pub fish: BTreeMap<u32, FishSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Welcome {
        id: u32,
    },
    FishInit {
        #[serde(with = "id_map")]
        fish: BTreeMap<u32, FishSnapshot>,
    },
    FishSpawn {
        fish: FishSnapshot,
    },
    GameState {
        data: GameStateData,
    },
    ChunkUpdate {
        #[serde(rename = "chunkX")]
        chunk_x: i32,
        #[serde(rename = "chunkZ")]
        chunk_z: i32,
    },
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Movement {
        position: Vec3,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        velocity: Option<Vec3>,
    },
    KeyPress {
        key: String,
        pressed: bool,
    },
    /// Any frame whose `type` is not part of the catalogue.
    #[serde(other)]
    Unrecognized,
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// (De)serializes id-keyed maps through string keys. Internally tagged enums
/// buffer their content, which loses serde_json's string-to-integer key
/// coercion, so the keys are parsed here instead.
mod id_map {
    use serde::de::{DeserializeOwned, Error};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<T, S>(map: &BTreeMap<u32, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(id, value)| (id.to_string(), value)))
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<BTreeMap<u32, T>, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, T>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| {
                key.parse::<u32>()
                    .map(|id| (id, value))
                    .map_err(|_| D::Error::custom(format!("invalid entity id '{}'", key)))
            })
            .collect()
    }
}
