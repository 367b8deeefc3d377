//! CDB length-by-opcode-group rule (spec.md §4.8): the command core reads
//! one CDB byte, derives the total length from its group, then reads the
//! remainder, all before it knows whether the opcode is one `scsi-core`
//! actually implements -- so this works off the raw group bits, not the
//! `OpCode` enum.

/// Total CDB length, in bytes, for the SCSI-2 opcode group encoded in the
/// top 3 bits of `opcode`. Group 3 and 6/7 are vendor-specific/reserved;
/// this target treats them as 6-byte CDBs like group 0, matching how an
/// unrecognized short command is safest to drain off the bus.
pub fn cdb_length(opcode: u8) -> usize {
    match opcode >> 5 {
        0 => 6,
        1 | 2 => 10,
        5 => 12,
        4 => 16,
        _ => 6,
    }
}
