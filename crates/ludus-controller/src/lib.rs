//! Controller service for Ludus.
//!
//! Workers claim games, append frames and end games through the controller;
//! the gateway reads status and frames through it. Every mutating call is
//! validated against the game's lease token, which is rotated on each call.
//!
//! [Controller] holds the orchestration logic. It implements
//! [ControllerClient] directly for in-process use, and [ControllerServer] /
//! [HttpControllerClient] carry the same calls over HTTP.

pub mod client;
pub mod http_client;
pub mod server;
pub mod service;
pub mod wire;

pub use client::{with_deadline, ControllerClient};
pub use http_client::HttpControllerClient;
pub use server::{ControllerConfig, ControllerServer, LOCK_TOKEN_HEADER};
pub use service::{Controller, MAX_FRAMES_PER_PAGE, VERSION};
pub use wire::{
    AddGameFrameRequest, AddGameFrameResponse, CreateResponse, ErrorBody, ListGameFramesRequest,
    ListGameFramesResponse, PingResponse, PopResponse, StatusResponse,
};
