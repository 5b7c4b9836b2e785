//! Byte-vector transfer descriptor
//!
//! A transfer is an ordered list of up to [`MAX_SEGMENTS`] segments that
//! go over the bus back to back inside one START..STOP frame. Payload
//! segments borrow caller memory; the 1-2 byte header used for
//! register-addressed writes lives inside the descriptor.
//!
//! ```text
//!  write_header_request(0x3A, &[1, 2, 3])
//!
//!  ┌───────────────┬─────────────────────┐
//!  │ Header [3a]   │ Tx &[01, 02, 03]    │  end of list
//!  └───────────────┴─────────────────────┘
//! ```

use heapless::Vec;

use crate::error::TwiError;

/// Maximum number of segments in one descriptor
pub const MAX_SEGMENTS: usize = 4;

/// Register-address header sent in front of a write payload
///
/// Two-byte headers go out most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    bytes: [u8; 2],
    len: u8,
}

impl Header {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl From<u8> for Header {
    fn from(header: u8) -> Self {
        Self {
            bytes: [header, 0],
            len: 1,
        }
    }
}

impl From<u16> for Header {
    fn from(header: u16) -> Self {
        Self {
            bytes: header.to_be_bytes(),
            len: 2,
        }
    }
}

/// One contiguous piece of a transfer
#[derive(Debug)]
pub enum Segment<'b> {
    /// Header bytes owned by the descriptor
    Header(Header),
    /// Bytes to transmit
    Tx(&'b [u8]),
    /// Room for received bytes
    Rx(&'b mut [u8]),
}

impl Segment<'_> {
    pub fn len(&self) -> usize {
        match self {
            Segment::Header(header) => header.len as usize,
            Segment::Tx(buf) => buf.len(),
            Segment::Rx(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte at `pos`, for transmitting
    pub fn get(&self, pos: usize) -> Option<u8> {
        match self {
            Segment::Header(header) => header.as_bytes().get(pos).copied(),
            Segment::Tx(buf) => buf.get(pos).copied(),
            Segment::Rx(buf) => buf.get(pos).copied(),
        }
    }

    /// Store a received byte at `pos`
    ///
    /// Only receive segments accept data. Returns false if the byte was
    /// discarded.
    pub fn set(&mut self, pos: usize, byte: u8) -> bool {
        match self {
            Segment::Rx(buf) => match buf.get_mut(pos) {
                Some(slot) => {
                    *slot = byte;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

/// Scatter/gather transfer descriptor
#[derive(Debug, Default)]
pub struct Descriptor<'b> {
    segments: Vec<Segment<'b>, MAX_SEGMENTS>,
}

impl<'b> Descriptor<'b> {
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Append a segment
    pub fn push(&mut self, segment: Segment<'b>) -> Result<(), TwiError> {
        self.segments
            .push(segment)
            .map_err(|_| TwiError::DescriptorFull)
    }

    /// Append a header segment
    pub fn header(mut self, header: impl Into<Header>) -> Result<Self, TwiError> {
        self.push(Segment::Header(header.into()))?;
        Ok(self)
    }

    /// Append a transmit segment
    pub fn tx(mut self, buf: &'b [u8]) -> Result<Self, TwiError> {
        self.push(Segment::Tx(buf))?;
        Ok(self)
    }

    /// Append a receive segment
    pub fn rx(mut self, buf: &'b mut [u8]) -> Result<Self, TwiError> {
        self.push(Segment::Rx(buf))?;
        Ok(self)
    }

    /// Total length over all segments
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of segments
    pub fn count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Segment<'b>] {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut [Segment<'b>] {
        &mut self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_header_then_payload() {
        let payload = [0x01, 0x02, 0x03];
        let desc = Descriptor::new()
            .header(0x3Au8)
            .unwrap()
            .tx(&payload)
            .unwrap();

        assert_eq!(desc.count(), 2);
        assert_eq!(desc.len(), 4);
        assert_eq!(desc.segments()[0].get(0), Some(0x3A));
        assert_eq!(desc.segments()[1].get(2), Some(0x03));
    }

    #[test]
    fn test_wide_header_msb_first() {
        let header = Header::from(0x1234u16);
        assert_eq!(header.as_bytes(), &[0x12, 0x34]);
        assert_eq!(Header::from(0x7Fu8).as_bytes(), &[0x7F]);
    }

    #[test]
    fn test_header_only_probe() {
        let desc = Descriptor::new().header(0x00u8).unwrap().tx(&[]).unwrap();
        assert_eq!(desc.count(), 2);
        assert_eq!(desc.len(), 1);
        assert!(!desc.is_empty());
    }

    #[test]
    fn test_full_descriptor_rejected() {
        let buf = [0u8; 1];
        let desc = Descriptor::new()
            .tx(&buf)
            .and_then(|d| d.tx(&buf))
            .and_then(|d| d.tx(&buf))
            .and_then(|d| d.tx(&buf))
            .unwrap();
        assert_eq!(desc.count(), MAX_SEGMENTS);
        assert_eq!(desc.tx(&buf).unwrap_err(), TwiError::DescriptorFull);
    }

    #[test]
    fn test_only_rx_accepts_data() {
        let mut buf = [0u8; 2];
        let mut rx = Segment::Rx(&mut buf);
        assert!(rx.set(1, 0xAB));
        assert!(!rx.set(2, 0xCD));

        let mut tx = Segment::Tx(&[0x00]);
        assert!(!tx.set(0, 0xAB));
        drop(rx);
        assert_eq!(buf, [0x00, 0xAB]);
    }

    proptest! {
        #[test]
        fn test_len_is_sum_of_segments(
            header in proptest::option::of(any::<u16>()),
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            tail in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut desc = Descriptor::new();
            let mut expected = payload.len() + tail.len();
            if let Some(header) = header {
                desc = desc.header(header).unwrap();
                expected += 2;
            }
            let desc = desc.tx(&payload).unwrap().tx(&tail).unwrap();
            prop_assert_eq!(desc.len(), expected);
        }
    }
}
