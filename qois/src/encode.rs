use crate::{
    consts::{
        QOIS_END_MAGIC, QOIS_HEADER_SIZE, QOIS_MAGIC, QOIS_MAX_RUN, QOIS_OP_DIFF, QOIS_OP_INDEX,
        QOIS_OP_LUMA, QOIS_OP_RGB, QOIS_OP_RGBA, QOIS_OP_RUN,
    },
    utils::hash,
    Descriptor, Pixel,
};
use byteorder::{BigEndian, ByteOrder};
use snafu::{ensure, Snafu};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

#[cfg(feature = "std")]
mod std_api;
#[cfg(feature = "std")]
pub use std_api::*;

/// Byte-level encoder errors. All of them are terminal: once a call fails,
/// the stream must be abandoned.
#[derive(Debug, Snafu)]
pub enum EncodeError {
    #[snafu(display("invalid channel count {channels}, expected 3 or 4"))]
    InvalidChannels { channels: u8 },

    #[snafu(display("invalid colorspace {colorspace}, expected 0 or 1"))]
    InvalidColorspace { colorspace: u8 },

    #[snafu(display("output buffer too small: needed {needed} bytes, {available} available"))]
    OutputTooSmall { needed: usize, available: usize },
}

#[derive(Debug, Clone, Copy)]
enum EncodeState {
    Header,
    Encoding,
    Footer,
    Done,
}

/// Push-driven QOI encoder.
///
/// Feed raw pixel bytes (3 or 4 per pixel, RGBA order) in one at a time with
/// [`encode_byte`]; encoded bytes come out. The 14-byte header is emitted
/// together with the first call, the end marker together with the call that
/// completes the final pixel. The caller provides the output buffer and must
/// leave at least [`ENCODE_HEADROOM`] bytes of headroom per call.
///
/// [`encode_byte`]: QoisEncodeContext::encode_byte
/// [`ENCODE_HEADROOM`]: crate::consts::ENCODE_HEADROOM
#[derive(Debug)]
pub struct QoisEncodeContext {
    desc: Descriptor,
    state: EncodeState,
    pixel_position: u8,
    run_length: u8,
    pixels_in: usize,
    pixel_count: usize,
    current: Pixel,
    last: Pixel,
    cache: [Pixel; 64],
}

impl QoisEncodeContext {
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        colorspace: u8,
    ) -> Result<Self, EncodeError> {
        ensure!(
            channels == 3 || channels == 4,
            InvalidChannelsSnafu { channels }
        );
        ensure!(colorspace <= 1, InvalidColorspaceSnafu { colorspace });

        let desc = Descriptor {
            width,
            height,
            channels,
            colorspace,
        };
        Ok(Self {
            desc,
            state: EncodeState::Header,
            pixel_position: 0,
            run_length: 0,
            pixels_in: 0,
            pixel_count: desc.pixel_count(),
            current: Pixel::START,
            last: Pixel::START,
            cache: [Pixel::ZERO; 64],
        })
    }

    pub const fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    /// Full pixels consumed so far.
    pub const fn pixels_in(&self) -> usize {
        self.pixels_in
    }

    /// True once the final pixel and the end marker have been emitted.
    pub const fn is_done(&self) -> bool {
        matches!(self.state, EncodeState::Done)
    }

    /// Consumes one raw pixel byte and appends any encoded bytes to the start
    /// of `output`. Returns the number of bytes written.
    ///
    /// Bytes arriving after the final pixel are ignored and return `Ok(0)`.
    pub fn encode_byte(&mut self, byte: u8, output: &mut [u8]) -> Result<usize, EncodeError> {
        if matches!(self.state, EncodeState::Done) {
            return Ok(0);
        }

        let mut written = 0;

        if matches!(self.state, EncodeState::Header) {
            written += self.emit_header(output)?;
            self.state = EncodeState::Encoding;
        }

        written += self.pixel_byte(byte, &mut output[written..])?;

        if self.pixels_in == self.pixel_count {
            self.state = EncodeState::Footer;
        }
        if matches!(self.state, EncodeState::Footer) {
            written += self.emit_end(&mut output[written..])?;
            self.state = EncodeState::Done;
        }

        Ok(written)
    }

    fn emit_header(&self, output: &mut [u8]) -> Result<usize, EncodeError> {
        ensure!(
            output.len() >= QOIS_HEADER_SIZE,
            OutputTooSmallSnafu {
                needed: QOIS_HEADER_SIZE,
                available: output.len()
            }
        );

        output[..4].copy_from_slice(&QOIS_MAGIC);
        BigEndian::write_u32(&mut output[4..8], self.desc.width);
        BigEndian::write_u32(&mut output[8..12], self.desc.height);
        output[12] = self.desc.channels;
        output[13] = self.desc.colorspace;

        Ok(QOIS_HEADER_SIZE)
    }

    fn emit_end(&self, output: &mut [u8]) -> Result<usize, EncodeError> {
        push(output, &QOIS_END_MAGIC)
    }

    /// Buffers one input byte into the in-flight pixel; once the pixel is
    /// complete, picks an opcode for it.
    fn pixel_byte(&mut self, byte: u8, output: &mut [u8]) -> Result<usize, EncodeError> {
        match self.pixel_position {
            0 => self.current.r = byte,
            1 => self.current.g = byte,
            2 => self.current.b = byte,
            _ => self.current.a = byte,
        }
        self.pixel_position += 1;

        if self.pixel_position < self.desc.channels {
            return Ok(0);
        }
        self.pixel_position = 0;
        self.pixels_in += 1;

        if self.current == self.last {
            self.run_length += 1;
            if self.run_length < QOIS_MAX_RUN && self.pixels_in < self.pixel_count {
                return Ok(0);
            }
            let written = self.flush_run(output)?;
            self.finish_pixel();
            return Ok(written);
        }

        let mut written = 0;
        if self.run_length > 0 {
            written += self.flush_run(output)?;
        }
        let output = &mut output[written..];

        let slot = hash(self.current);
        written += if self.cache[usize::from(slot)] == self.current {
            push(output, &[QOIS_OP_INDEX | slot])?
        } else if self.desc.channels == 4 && self.current.a != self.last.a {
            push(
                output,
                &[
                    QOIS_OP_RGBA,
                    self.current.r,
                    self.current.g,
                    self.current.b,
                    self.current.a,
                ],
            )?
        } else {
            let r_diff = self.current.r.wrapping_sub(self.last.r) as i8;
            let g_diff = self.current.g.wrapping_sub(self.last.g) as i8;
            let b_diff = self.current.b.wrapping_sub(self.last.b) as i8;

            if matches!((r_diff, g_diff, b_diff), (-2..=1, -2..=1, -2..=1)) {
                push(
                    output,
                    &[QOIS_OP_DIFF
                        | ((r_diff + 2) as u8) << 4
                        | ((g_diff + 2) as u8) << 2
                        | (b_diff + 2) as u8],
                )?
            } else {
                let rg_diff = r_diff.wrapping_sub(g_diff);
                let bg_diff = b_diff.wrapping_sub(g_diff);

                if matches!((rg_diff, g_diff, bg_diff), (-8..=7, -32..=31, -8..=7)) {
                    push(
                        output,
                        &[
                            QOIS_OP_LUMA | (g_diff + 32) as u8,
                            ((rg_diff + 8) as u8) << 4 | (bg_diff + 8) as u8,
                        ],
                    )?
                } else {
                    push(
                        output,
                        &[QOIS_OP_RGB, self.current.r, self.current.g, self.current.b],
                    )?
                }
            }
        };

        self.finish_pixel();
        Ok(written)
    }

    /// Emits the outstanding run. A run of one is written as an INDEX op of
    /// the repeated pixel, which is one byte either way but matches what the
    /// reference encoder produces.
    fn flush_run(&mut self, output: &mut [u8]) -> Result<usize, EncodeError> {
        let byte = if self.run_length == 1 {
            QOIS_OP_INDEX | hash(self.last)
        } else {
            QOIS_OP_RUN | (self.run_length - 1)
        };

        let written = push(output, &[byte])?;
        self.run_length = 0;
        Ok(written)
    }

    fn finish_pixel(&mut self) {
        self.cache[usize::from(hash(self.current))] = self.current;
        self.last = self.current;
    }
}

fn push(output: &mut [u8], bytes: &[u8]) -> Result<usize, EncodeError> {
    ensure!(
        output.len() >= bytes.len(),
        OutputTooSmallSnafu {
            needed: bytes.len(),
            available: output.len()
        }
    );
    output[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

#[cfg(feature = "alloc")]
#[derive(Debug, Snafu)]
pub enum EncodeToVecError {
    #[snafu(display(
        "image dimensions don't match the pixel data: {width}x{height} at {channels} channels, got {actual} bytes"
    ))]
    InvalidDimensions {
        width: u32,
        height: u32,
        channels: u8,
        actual: usize,
    },

    #[snafu(context(false))]
    Encode { source: EncodeError },
}

#[cfg(feature = "alloc")]
impl QoisEncodeContext {
    /// Encodes a full image, appending the QOI stream to `w`.
    pub fn encode_to_vec(
        width: u32,
        height: u32,
        channels: u8,
        colorspace: u8,
        pixels: &[u8],
        w: &mut Vec<u8>,
    ) -> Result<(), EncodeToVecError> {
        let mut state = QoisEncodeContext::new(width, height, channels, colorspace)?;
        state.encode_to_vec_with_state(pixels, w)
    }

    /// Encodes a full image with the given state as starting state, appending
    /// the QOI stream to `w`. `pixels` must hold exactly
    /// `width * height * channels` bytes.
    pub fn encode_to_vec_with_state(
        &mut self,
        pixels: &[u8],
        w: &mut Vec<u8>,
    ) -> Result<(), EncodeToVecError> {
        // Checked u64 math: u32 dimensions times the channel count can
        // overflow usize, and an overflowing size can never match anyway.
        let expected = (u64::from(self.desc.width) * u64::from(self.desc.height))
            .checked_mul(u64::from(self.desc.channels));
        ensure!(
            expected == Some(pixels.len() as u64),
            InvalidDimensionsSnafu {
                width: self.desc.width,
                height: self.desc.height,
                channels: self.desc.channels,
                actual: pixels.len()
            }
        );

        // Worst case: every pixel as an RGB(A) op, plus header and end marker.
        let max_len = QOIS_HEADER_SIZE
            + self.pixel_count * (usize::from(self.desc.channels) + 1)
            + QOIS_END_MAGIC.len();
        let start = w.len();
        w.resize(start + max_len, 0);

        let mut written = 0;
        if pixels.is_empty() {
            // Zero-pixel image: no input bytes will ever arrive, so the
            // header and end marker are all there is.
            written += self.emit_header(&mut w[start..])?;
            written += self.emit_end(&mut w[start + written..])?;
            self.state = EncodeState::Done;
        }
        for &byte in pixels {
            written += self.encode_byte(byte, &mut w[start + written..])?;
        }
        w.truncate(start + written);

        Ok(())
    }
}
