//! Internet Checksum Implementation (RFC 1071)

/// Calculate the Internet checksum over `data`.
///
/// One's complement sum of big-endian 16-bit words with a 32-bit
/// accumulator; carries above bit 15 fold back into the low half until
/// none remain, and the result is complemented. An odd trailing byte is
/// zero-padded into a final word. IP, UDP and ARP-adjacent protocols all
/// depend on this exact arithmetic, so it must not be replaced by a
/// generic CRC.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;

    // Sum all 16-bit words
    while i + 1 < data.len() {
        let word = u16::from_be_bytes([data[i], data[i + 1]]);
        sum = sum.wrapping_add(word as u32);
        i += 2;
    }

    // Handle odd byte (pad with zero)
    if i < data.len() {
        sum = sum.wrapping_add((data[i] as u32) << 8);
    }

    // Fold 32-bit sum to 16-bit with carry
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    // One's complement
    !(sum as u16)
}

/// Verify a checksummed region.
///
/// Returns true when the sum over `data`, embedded checksum field
/// included, comes out zero.
pub fn verify_checksum(data: &[u8]) -> bool {
    internet_checksum(data) == 0
}
