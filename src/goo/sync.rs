//! MPEG-TS sync byte alignment.
//!
//! A lone `0x47` is a weak signal since the value shows up in payload all the
//! time. A candidate is only accepted when the sync byte recurs at every 188-byte
//! stride that still fits in the buffer, which finds the first TS packet behind a
//! header of unknown length (RTP, usually 12 bytes).

/// Value of the first byte of every TS packet.
pub const SYNC_BYTE: u8 = 0x47;

/// Length of one transport stream packet.
pub const TS_PACKET_SIZE: usize = 188;

/// Number of following strides checked for each candidate.
const CONFIRM_STRIDES: usize = 4;

/// Find the offset of the first aligned sync byte at or after `start`.
///
/// Strides that run past the end of the buffer are not checked, so a short buffer
/// only needs the candidate byte itself to match.
pub fn find_sync(data: &[u8], start: usize) -> Option<usize> {
    (start..data.len()).find(|&i| {
        data[i] == SYNC_BYTE
            && (1..=CONFIRM_STRIDES)
                .map(|n| i + n * TS_PACKET_SIZE)
                .take_while(|&pos| pos < data.len())
                .all(|pos| data[pos] == SYNC_BYTE)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_blocks(prefix: usize, count: usize) -> Vec<u8> {
        let mut data = vec![0xAA; prefix];
        for _ in 0..count {
            let mut block = vec![0x11; TS_PACKET_SIZE];
            block[0] = SYNC_BYTE;
            data.extend_from_slice(&block);
        }
        data
    }

    #[test]
    fn test_finds_sync_behind_rtp_header() {
        let data = ts_blocks(12, 5);
        assert_eq!(find_sync(&data, 0), Some(12));
    }

    #[test]
    fn test_seven_packet_datagram() {
        let data = ts_blocks(12, 7);
        assert_eq!(find_sync(&data, 0), Some(12));
        assert_eq!(find_sync(&data, 13), Some(12 + TS_PACKET_SIZE));
    }

    #[test]
    fn test_rejects_coincidental_sync_value() {
        let mut data = ts_blocks(12, 5);
        // Payload byte that happens to be 0x47 but does not recur at the stride
        data[3] = SYNC_BYTE;
        assert_eq!(find_sync(&data, 0), Some(12));
    }

    #[test]
    fn test_no_recurring_sync() {
        let mut data = vec![0u8; 5 * TS_PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[10] = SYNC_BYTE;
        assert_eq!(find_sync(&data, 0), None);

        let none = vec![0x12u8; 1316];
        assert_eq!(find_sync(&none, 0), None);
    }

    #[test]
    fn test_short_buffer_is_vacuously_aligned() {
        let data = [0x80, 0x21, SYNC_BYTE, 0x00, 0xFF];
        assert_eq!(find_sync(&data, 0), Some(2));
        assert_eq!(find_sync(&data, 3), None);
    }

    #[test]
    fn test_empty_and_out_of_range_start() {
        assert_eq!(find_sync(&[], 0), None);
        assert_eq!(find_sync(&[SYNC_BYTE], 5), None);
    }

    #[test]
    fn test_broken_stride_rejects_candidate() {
        let mut data = ts_blocks(0, 5);
        data[3 * TS_PACKET_SIZE] = 0x00;
        // Every candidate before the damaged packet sees it within four strides
        assert_eq!(find_sync(&data, 0), Some(4 * TS_PACKET_SIZE));
    }
}
