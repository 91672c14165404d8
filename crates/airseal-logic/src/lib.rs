//! Airtight-room safety controller.
//!
//! This crate keeps a structure's breathable atmosphere from leaking into
//! vacuum. It coordinates vents and doors across airtight rooms, treating
//! rooms with a depressurize command as airlocks, and falls back to an
//! emergency lockdown whenever a room cannot be kept sealed.
//!
//! Everything here is plain logic over the [`devices`] traits: no threads,
//! no I/O beyond the `log` facade, one synchronous pass per tick.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`command`] | Manual override switches from a run argument |
//! | [`controller`] | Entry point: re-initialization, override, ticks |
//! | [`devices`] | `Door`, `Vent` and `DeviceSource` traits |
//! | [`door`] | Emergency-gated door coordination and lock cycle |
//! | [`registry`] | Room topology generations and evaluation order |
//! | [`room`] | Per-room safety evaluation and hysteresis |
//! | [`settings`] | Tunable thresholds and switch names |
//! | [`sim`] | In-memory devices for tests and the harness |
//! | [`topology`] | Device-name classification into room roles |

pub mod command;
pub mod controller;
pub mod devices;
pub mod door;
pub mod registry;
pub mod room;
pub mod settings;
pub mod sim;
pub mod topology;
