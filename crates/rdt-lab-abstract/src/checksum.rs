//! CRC-32 packet digest.
//!
//! The digest chains the big-endian seqnum, the big-endian acknum and the raw
//! payload through the IEEE 802.3 CRC (zlib compatible), so a single flipped
//! bit anywhere in those fields changes the result.

use crate::packet::Packet;

const POLYNOMIAL: u32 = 0xEDB8_8320;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
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

/// Continue a running CRC-32 over `data`. Start a fresh digest with `crc = 0`.
pub fn crc32(crc: u32, data: &[u8]) -> u32 {
    let mut crc = !crc;
    for &byte in data {
        crc = TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

pub fn compute(seqnum: u32, acknum: u32, payload: &[u8]) -> u32 {
    let crc = crc32(0, &seqnum.to_be_bytes());
    let crc = crc32(crc, &acknum.to_be_bytes());
    crc32(crc, payload)
}

pub fn verify(packet: &Packet) -> bool {
    compute(packet.seqnum, packet.acknum, &packet.payload) == packet.checksum
}
