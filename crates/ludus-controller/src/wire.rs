//! Request and response bodies of the controller RPC surface.

use ludus_kernel::{ErrorKind, Frame, Game, GameId, LeaseToken};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopResponse {
    pub id: GameId,
    pub token: LeaseToken,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRequest {
    pub id: GameId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub game: Game,
    #[serde(rename = "lastFrame")]
    pub last_frame: Option<Frame>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: GameId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddGameFrameRequest {
    pub id: GameId,
    pub frame: Option<Frame>,
}

/// The refreshed game plus the rotated lease token to present next time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddGameFrameResponse {
    pub game: Game,
    pub token: LeaseToken,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListGameFramesRequest {
    pub id: GameId,
    /// Clamped to `1..=100`; zero means 100.
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: i64,
}

impl ListGameFramesRequest {
    pub fn new(id: GameId) -> Self {
        Self {
            id,
            limit: 0,
            offset: 0,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListGameFramesResponse {
    pub frames: Vec<Frame>,
    pub count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub version: String,
}

/// Error payload of a failed RPC.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}
