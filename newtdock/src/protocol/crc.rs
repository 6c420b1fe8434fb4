//! CRC-16/ARC checksum used by the bisync link layer.
//!
//! Reflected polynomial `0xA001`, initial value `0`, no final XOR. The link
//! layer feeds it one byte at a time, so the running form is the primary API.

const POLY: u16 = 0xA001;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        #[allow(clippy::cast_possible_truncation)]
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Fold one byte into a running checksum.
#[inline]
pub fn crc16_update(crc: u16, byte: u8) -> u16 {
    (crc >> 8) ^ TABLE[usize::from((crc ^ u16::from(byte)) & 0xFF)]
}

/// Checksum a whole slice starting from zero.
pub fn crc16_arc(data: &[u8]) -> u16 {
    data.iter().fold(0, |crc, &b| crc16_update(crc, b))
}
