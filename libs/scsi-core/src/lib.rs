#![cfg_attr(feature = "baremetal", no_std)]
//! Phase sequencer and CDB dispatch for one SCSI target. Ties `bus-phy`,
//! `accel-xfer` and `media` together into the command loop spec.md §4.8
//! describes; see each submodule's docs for what it's grounded on.

pub mod cdb;
pub mod command;
pub mod sense;
pub mod sequencer;
pub mod target;

pub use cdb::Cdb;
pub use command::Command;
pub use sequencer::{CommandLoop, LoopError};
pub use target::{Outcome, PostDataOut, Target};
