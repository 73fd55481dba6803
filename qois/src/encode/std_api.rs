use crate::{
    consts::ENCODE_HEADROOM,
    encode::{EncodeError, EncodeState, QoisEncodeContext},
};
use snafu::{ensure, ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
pub enum EncodeIoError {
    #[snafu(display(
        "image dimensions don't match the pixel data: {width}x{height} at {channels} channels, got {actual} bytes"
    ))]
    DimensionMismatch {
        width: u32,
        height: u32,
        channels: u8,
        actual: usize,
    },

    #[snafu(context(false))]
    Encode { source: EncodeError },

    WriteIo { source: std::io::Error },
}

impl QoisEncodeContext {
    /// Encodes a full image, writing the QOI stream to `w`.
    pub fn encode<W: Write>(
        width: u32,
        height: u32,
        channels: u8,
        colorspace: u8,
        pixels: &[u8],
        w: W,
    ) -> Result<(), EncodeIoError> {
        let mut state = QoisEncodeContext::new(width, height, channels, colorspace)?;
        state.encode_with_state(pixels, w)
    }

    /// Encodes a full image with the given state as starting state, writing
    /// the QOI stream to `w`. `pixels` must hold exactly
    /// `width * height * channels` bytes.
    ///
    /// The pixel bytes are pumped through [`encode_byte`] with a stack
    /// scratch buffer, so the full encoded stream never lives in memory.
    ///
    /// [`encode_byte`]: QoisEncodeContext::encode_byte
    pub fn encode_with_state<W: Write>(
        &mut self,
        pixels: &[u8],
        mut w: W,
    ) -> Result<(), EncodeIoError> {
        // Checked u64 math: u32 dimensions times the channel count can
        // overflow usize, and an overflowing size can never match anyway.
        let expected = (u64::from(self.desc.width) * u64::from(self.desc.height))
            .checked_mul(u64::from(self.desc.channels));
        ensure!(
            expected == Some(pixels.len() as u64),
            DimensionMismatchSnafu {
                width: self.desc.width,
                height: self.desc.height,
                channels: self.desc.channels,
                actual: pixels.len()
            }
        );

        let mut buf = [0u8; ENCODE_HEADROOM];

        if pixels.is_empty() {
            let mut n = self.emit_header(&mut buf)?;
            n += self.emit_end(&mut buf[n..])?;
            self.state = EncodeState::Done;
            return w.write_all(&buf[..n]).context(WriteIoSnafu);
        }

        for &byte in pixels {
            let n = self.encode_byte(byte, &mut buf)?;
            if n > 0 {
                w.write_all(&buf[..n]).context(WriteIoSnafu)?;
            }
        }

        Ok(())
    }
}
