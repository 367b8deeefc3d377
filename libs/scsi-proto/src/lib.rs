#![cfg_attr(feature = "baremetal", no_std)]
//! CDB opcode, sense-key and related vocabulary shared by `scsi-core` and
//! `media::cdrom`, so neither duplicates the opcode/sense-key constants
//! spec.md §4.8 and §7 both reference.
//!
//! Grounded on `usbd_scsi::scsi::enums` (`op_code.rs`, `sense_key.rs`,
//! `additional_sense_code.rs`, `medium_type.rs`, `page_control.rs`): kept as
//! enums covering the same SPC-3 vocabulary, re-derived with
//! `num_derive::{FromPrimitive, ToPrimitive}` instead of `packing::Packed`
//! since this crate only needs byte<->enum conversion, not CDB struct
//! (de)serialization -- and extended with the parallel-SCSI opcodes
//! (`SEEK(6)`, `READ TOC`, `READ CD`, `READ(12)`) the USB mass-storage
//! subset never needed.

pub mod additional_sense_code;
pub mod cdb;
pub mod error;
pub mod medium_type;
pub mod op_code;
pub mod page_control;
pub mod sense_key;

pub use additional_sense_code::AdditionalSenseCode;
pub use cdb::cdb_length;
pub use error::Error;
pub use medium_type::MediumType;
pub use op_code::OpCode;
pub use page_control::PageControl;
pub use sense_key::SenseKey;
