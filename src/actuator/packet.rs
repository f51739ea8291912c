//! Wire format of the hardware-emulation device
//!
//! Outbound movement/click traffic uses fixed 3-byte packets
//! `{opcode, dx, dy}` with each axis clamped to a signed byte. Inbound
//! unsolicited traffic carries button state: a 3-byte header, one bitmask
//! byte and two trailing bytes.

/// Header of an unsolicited button-state packet
pub const PACKET_HEADER: [u8; 3] = [0xAA, 0x55, 0x5A];

/// Trailing bytes after the mask byte, consumed and discarded
pub const PACKET_TRAILER_LEN: usize = 2;

/// Number of logical buttons carried in the mask byte
pub const BUTTON_COUNT: u8 = 5;

/// Outbound opcodes
pub const OP_PING: u8 = 0x7E;
pub const OP_MOVE: u8 = 0x01;
pub const OP_PRESS: u8 = 0x02;
pub const OP_RELEASE: u8 = 0x03;
pub const OP_SCROLL: u8 = 0x04;

/// Byte the device answers to a ping during discovery
pub const PING_ACK: u8 = 0xA5;

/// Logical button identity, one per mask bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

impl LogicalButton {
    pub fn from_bit(bit: u8) -> Option<Self> {
        match bit {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            2 => Some(Self::Middle),
            3 => Some(Self::Back),
            4 => Some(Self::Forward),
            _ => None,
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Middle => 2,
            Self::Back => 3,
            Self::Forward => 4,
        }
    }

    /// Name used by the general-purpose textual protocol
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
            Self::Back => "back",
            Self::Forward => "forward",
        }
    }
}

/// Edge-triggered notification that a logical button changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: LogicalButton,
    pub pressed: bool,
}

/// Incremental decoder for inbound button-state packets.
///
/// Fed one byte at a time; a byte that breaks an in-progress header match
/// restarts the search, re-testing that byte as a possible new header
/// start. Out-of-range mask bytes abandon the packet without touching the
/// button table.
#[derive(Debug)]
pub struct PacketDecoder {
    phase: Phase,
    last_mask: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Matched this many header bytes so far
    Header(usize),
    Mask,
    Trailer(usize),
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::Header(0),
            last_mask: 0,
        }
    }

    /// Mask from the last fully-parsed packet
    pub fn last_mask(&self) -> u8 {
        self.last_mask
    }

    /// Feed one byte; pushes one event per button bit that changed
    pub fn push(&mut self, byte: u8, events: &mut Vec<ButtonEvent>) {
        match self.phase {
            Phase::Header(matched) => {
                if byte == PACKET_HEADER[matched] {
                    self.phase = if matched + 1 == PACKET_HEADER.len() {
                        Phase::Mask
                    } else {
                        Phase::Header(matched + 1)
                    };
                } else if byte == PACKET_HEADER[0] {
                    self.phase = Phase::Header(1);
                } else {
                    self.phase = Phase::Header(0);
                }
            }
            Phase::Mask => {
                if byte < (1 << BUTTON_COUNT) {
                    let changed = byte ^ self.last_mask;
                    for bit in 0..BUTTON_COUNT {
                        if changed & (1 << bit) != 0 {
                            if let Some(button) = LogicalButton::from_bit(bit) {
                                events.push(ButtonEvent {
                                    button,
                                    pressed: byte & (1 << bit) != 0,
                                });
                            }
                        }
                    }
                    self.last_mask = byte;
                    self.phase = Phase::Trailer(PACKET_TRAILER_LEN);
                } else {
                    // Mask outside the button-bit range: abandon the packet
                    // and resync, re-testing this byte as a header start
                    log::debug!("discarding packet with out-of-range mask {byte:#04x}");
                    self.phase = if byte == PACKET_HEADER[0] {
                        Phase::Header(1)
                    } else {
                        Phase::Header(0)
                    };
                }
            }
            Phase::Trailer(remaining) => {
                self.phase = if remaining > 1 {
                    Phase::Trailer(remaining - 1)
                } else {
                    Phase::Header(0)
                };
            }
        }
    }
}

/// Split a movement delta into per-packet steps, each axis clamped to a
/// signed byte. The steps sum exactly to the requested delta.
pub fn chunk_delta(dx: i32, dy: i32) -> Vec<(i8, i8)> {
    let mut chunks = Vec::new();
    let (mut rx, mut ry) = (dx, dy);
    while rx != 0 || ry != 0 {
        let sx = rx.clamp(-127, 127);
        let sy = ry.clamp(-127, 127);
        chunks.push((sx as i8, sy as i8));
        rx -= sx;
        ry -= sy;
    }
    chunks
}

/// Encode one movement packet
pub fn encode_move(dx: i8, dy: i8) -> [u8; 3] {
    [OP_MOVE, dx as u8, dy as u8]
}

/// Encode a button press/release packet
pub fn encode_button(button: LogicalButton, pressed: bool) -> [u8; 3] {
    let op = if pressed { OP_PRESS } else { OP_RELEASE };
    [op, button.bit(), 0]
}

/// Encode a scroll packet; the amount is clamped to a signed byte
pub fn encode_scroll(amount: i32) -> [u8; 3] {
    [OP_SCROLL, amount.clamp(-127, 127) as i8 as u8, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut PacketDecoder, bytes: &[u8]) -> Vec<ButtonEvent> {
        let mut events = Vec::new();
        for &b in bytes {
            decoder.push(b, &mut events);
        }
        events
    }

    fn packet(mask: u8) -> Vec<u8> {
        let mut bytes = PACKET_HEADER.to_vec();
        bytes.push(mask);
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes
    }

    #[test]
    fn test_one_event_per_changed_bit() {
        let mut decoder = PacketDecoder::new();
        // Left (bit 0) and middle (bit 2) go down
        let events = feed(&mut decoder, &packet(0b0000_0101));
        assert_eq!(
            events,
            vec![
                ButtonEvent { button: LogicalButton::Left, pressed: true },
                ButtonEvent { button: LogicalButton::Middle, pressed: true },
            ]
        );

        // Left released, right pressed
        let events = feed(&mut decoder, &packet(0b0000_0110));
        assert_eq!(
            events,
            vec![
                ButtonEvent { button: LogicalButton::Left, pressed: false },
                ButtonEvent { button: LogicalButton::Right, pressed: true },
            ]
        );
    }

    #[test]
    fn test_unchanged_mask_emits_nothing() {
        let mut decoder = PacketDecoder::new();
        feed(&mut decoder, &packet(0b0000_0001));
        let events = feed(&mut decoder, &packet(0b0000_0001));
        assert!(events.is_empty());
        assert_eq!(decoder.last_mask(), 0b0000_0001);
    }

    #[test]
    fn test_out_of_range_mask_is_ignored() {
        let mut decoder = PacketDecoder::new();
        let events = feed(&mut decoder, &packet(0b1000_0000));
        assert!(events.is_empty());
        assert_eq!(decoder.last_mask(), 0);

        // Decoder recovers on the next valid packet
        let events = feed(&mut decoder, &packet(0b0000_0010));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_header_resync_retests_breaking_byte() {
        let mut decoder = PacketDecoder::new();
        // Partial header, then a byte that is itself a header start
        let mut bytes = vec![PACKET_HEADER[0], PACKET_HEADER[1]];
        bytes.extend_from_slice(&packet(0b0000_0001));
        let events = feed(&mut decoder, &bytes);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_garbage_between_packets() {
        let mut decoder = PacketDecoder::new();
        let mut bytes = vec![0x00, 0x13, 0xFF, PACKET_HEADER[0], 0x77];
        bytes.extend_from_slice(&packet(0b0000_0001));
        bytes.extend_from_slice(&[0x42, 0x42]);
        let events = feed(&mut decoder, &bytes);
        assert_eq!(
            events,
            vec![ButtonEvent { button: LogicalButton::Left, pressed: true }]
        );
    }

    #[test]
    fn test_trailer_bytes_are_not_parsed_as_header() {
        let mut decoder = PacketDecoder::new();
        // Trailer bytes that look like header starts must be discarded
        let mut bytes = PACKET_HEADER.to_vec();
        bytes.push(0b0000_0001);
        bytes.extend_from_slice(&[PACKET_HEADER[0], PACKET_HEADER[1]]);
        let events = feed(&mut decoder, &bytes);
        assert_eq!(events.len(), 1);
        // Next packet still decodes
        let events = feed(&mut decoder, &packet(0b0000_0011));
        assert_eq!(events.len(), 1); // only bit 1 changed
    }

    #[test]
    fn test_chunk_delta_sums_exactly() {
        let chunks = chunk_delta(300, -5);
        let (sx, sy): (i32, i32) = chunks
            .iter()
            .fold((0, 0), |(ax, ay), &(x, y)| (ax + x as i32, ay + y as i32));
        assert_eq!((sx, sy), (300, -5));
        for &(x, y) in &chunks {
            assert!(x.unsigned_abs() <= 127);
            assert!(y.unsigned_abs() <= 127);
        }
    }

    #[test]
    fn test_chunk_delta_zero_is_empty() {
        assert!(chunk_delta(0, 0).is_empty());
    }

    #[test]
    fn test_chunk_delta_negative_large() {
        let chunks = chunk_delta(-300, 300);
        let (sx, sy): (i32, i32) = chunks
            .iter()
            .fold((0, 0), |(ax, ay), &(x, y)| (ax + x as i32, ay + y as i32));
        assert_eq!((sx, sy), (-300, 300));
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_encode_move_two_complement() {
        assert_eq!(encode_move(-1, 127), [OP_MOVE, 0xFF, 0x7F]);
    }
}
