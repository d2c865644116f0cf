//! Framed elementary-stream format understood by the simulated
//! decoder.
//!
//! Each frame is an 8-byte header (`SIMF` magic, little-endian u16
//! width and height) followed by an NV12 payload: the full luma plane,
//! then the interleaved half-resolution chroma plane.

use std::io::{self, Write};

pub const FRAME_MAGIC: [u8; 4] = *b"SIMF";
pub const HEADER_LEN: usize = 8;

/// NV12 payload size for the given dimensions.
pub fn payload_len(width: u16, height: u16) -> usize {
    let (w, h) = (width as usize, height as usize);
    w * h + 2 * w.div_ceil(2) * h.div_ceil(2)
}

/// Write one framed NV12 frame.
pub fn write_frame(
    sink: &mut dyn Write,
    width: u16,
    height: u16,
    y: &[u8],
    uv: &[u8],
) -> io::Result<()> {
    let (w, h) = (width as usize, height as usize);
    let expected_uv = 2 * w.div_ceil(2) * h.div_ceil(2);
    if y.len() != w * h || uv.len() != expected_uv {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "plane sizes {}/{} do not match {}x{} NV12",
                y.len(),
                uv.len(),
                width,
                height
            ),
        ));
    }
    sink.write_all(&FRAME_MAGIC)?;
    sink.write_all(&width.to_le_bytes())?;
    sink.write_all(&height.to_le_bytes())?;
    sink.write_all(y)?;
    sink.write_all(uv)
}

/// Write a deterministic gradient clip, for demos and tests.
pub fn write_sample_stream(
    sink: &mut dyn Write,
    width: u16,
    height: u16,
    frames: u32,
) -> io::Result<()> {
    let (w, h) = (width as usize, height as usize);
    let mut y = vec![0u8; w * h];
    let mut uv = vec![0u8; 2 * w.div_ceil(2) * h.div_ceil(2)];
    for n in 0..frames {
        for row in 0..h {
            for col in 0..w {
                y[row * w + col] = (row + col + n as usize) as u8;
            }
        }
        uv.fill(128u8.wrapping_add(n as u8));
        write_frame(sink, width, height, &y, &uv)?;
    }
    Ok(())
}

/// One attempt at splitting a frame off the front of buffered input.
pub(crate) enum Parsed {
    Frame {
        width: u16,
        height: u16,
        payload: Vec<u8>,
        consumed: usize,
    },
    NeedMore,
    Corrupt,
}

pub(crate) fn parse_frame(data: &[u8]) -> Parsed {
    if data.len() < HEADER_LEN {
        return Parsed::NeedMore;
    }
    if data[..4] != FRAME_MAGIC {
        return Parsed::Corrupt;
    }
    let width = u16::from_le_bytes([data[4], data[5]]);
    let height = u16::from_le_bytes([data[6], data[7]]);
    if width == 0 || height == 0 {
        return Parsed::Corrupt;
    }
    let payload = payload_len(width, height);
    let total = HEADER_LEN + payload;
    if data.len() < total {
        return Parsed::NeedMore;
    }
    Parsed::Frame {
        width,
        height,
        payload: data[HEADER_LEN..total].to_vec(),
        consumed: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_parse() {
        let mut buf = Vec::new();
        let y = vec![7u8; 4 * 2];
        let uv = vec![9u8; 4];
        write_frame(&mut buf, 4, 2, &y, &uv).unwrap();

        match parse_frame(&buf) {
            Parsed::Frame {
                width,
                height,
                payload,
                consumed,
            } => {
                assert_eq!((width, height), (4, 2));
                assert_eq!(consumed, buf.len());
                assert_eq!(&payload[..8], &y[..]);
                assert_eq!(&payload[8..], &uv[..]);
            }
            _ => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn partial_frames_ask_for_more() {
        let mut buf = Vec::new();
        write_sample_stream(&mut buf, 4, 4, 1).unwrap();
        assert!(matches!(parse_frame(&buf[..3]), Parsed::NeedMore));
        assert!(matches!(
            parse_frame(&buf[..buf.len() - 1]),
            Parsed::NeedMore
        ));
    }

    #[test]
    fn bad_magic_is_corrupt() {
        assert!(matches!(
            parse_frame(b"JUNK\x04\x00\x04\x00"),
            Parsed::Corrupt
        ));
    }

    #[test]
    fn mismatched_planes_are_rejected() {
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, 4, 2, &[0u8; 3], &[0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
