//! matchcast watches per-player game state and fans out Discord
//! notifications on change.
//!
//! A fixed-interval poller sweeps every tracked player, asks the game's
//! tracker for an opaque state string, and notifies every subscribed guild
//! when the string changes. Game-specific knowledge lives entirely behind
//! the [`game::Tracker`] trait; the poller only compares state strings.

pub mod api;
pub mod config;
pub mod game;
pub mod lol;
pub mod maplestory;
pub mod poller;
pub mod registry;
pub mod service;
pub mod sink;
pub mod storage;
