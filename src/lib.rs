//! Tile-based sprite and level editing core.
//!
//! A level is a stack of chunked [`tilemap::TileLayer`]s whose tiles reference
//! frames of one shared tile sheet. Pixel tools paint through tiles into the
//! sheet, tile tools place and erase tiles, and every edit is recorded in a
//! [`components::history::CommandChain`] so whole gestures undo as one step.

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod level;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;
pub mod tilemap;
