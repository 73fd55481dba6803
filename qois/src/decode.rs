use crate::{
    consts::{
        QOIS_END_MAGIC, QOIS_MAGIC, QOIS_MASK_2, QOIS_OP_DIFF, QOIS_OP_INDEX, QOIS_OP_LUMA,
        QOIS_OP_RGB, QOIS_OP_RGBA,
    },
    decode::ops::{diff, luma},
    utils::{hash, unlikely},
    Descriptor, Pixel,
};
use snafu::{ensure, Snafu};

mod ops;

#[cfg(feature = "alloc")]
mod alloc_api;
#[cfg(feature = "alloc")]
pub use alloc_api::*;

/// Byte-level decoder errors. All of them are terminal: once a call fails,
/// the stream must be abandoned.
#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("header byte {offset} is {byte:#04x}, expected {expected:#04x} (`qoif`)"))]
    InvalidMagic { offset: u8, byte: u8, expected: u8 },

    #[snafu(display("channels byte is {channels}, expected 3 or 4"))]
    InvalidChannels { channels: u8 },

    #[snafu(display("colorspace byte is {colorspace}, expected 0 or 1"))]
    InvalidColorspace { colorspace: u8 },

    #[snafu(display("end marker byte {offset} is {byte:#04x}, expected {expected:#04x}"))]
    InvalidEndMarker { offset: u8, byte: u8, expected: u8 },

    #[snafu(display("output buffer too small: needed {needed} bytes, {available} available"))]
    OutputTooSmall { needed: usize, available: usize },
}

/// Decoder phase. Multi-byte op states are named after the payload byte they
/// are waiting for and carry the channel values received so far, so an opcode
/// can never be resumed at an inconsistent position.
#[derive(Debug, Clone, Copy)]
enum DecodeState {
    /// Awaiting header byte `n`.
    Header(u8),
    /// Awaiting the first byte of the next op.
    OpStart,
    RgbByte1,
    RgbByte2(u8),
    RgbByte3(u8, u8),
    RgbaByte1,
    RgbaByte2(u8),
    RgbaByte3(u8, u8),
    RgbaByte4(u8, u8, u8),
    LumaByte2(u8),
    /// Awaiting end-marker byte `n`.
    Footer(u8),
    Done,
}

/// Push-driven QOI decoder.
///
/// Feed encoded bytes in one at a time with [`decode_byte`]; raw pixel bytes
/// (3 or 4 per pixel, RGBA order) come out. The caller provides the output
/// buffer and must leave at least [`decode_headroom`] bytes of headroom per
/// call, or the call fails without consuming the byte stream position.
///
/// [`decode_byte`]: QoisDecodeContext::decode_byte
/// [`decode_headroom`]: crate::consts::decode_headroom
#[derive(Debug)]
pub struct QoisDecodeContext {
    desc: Descriptor,
    forced_channels: u8,
    state: DecodeState,
    pixel_count: usize,
    pixels_out: usize,
    last: Pixel,
    cache: [Pixel; 64],
}

impl Default for QoisDecodeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl QoisDecodeContext {
    pub const fn new() -> Self {
        Self {
            desc: Descriptor {
                width: 0,
                height: 0,
                channels: 0,
                colorspace: 0,
            },
            forced_channels: 0,
            state: DecodeState::Header(0),
            pixel_count: 0,
            pixels_out: 0,
            last: Pixel::START,
            cache: [Pixel::ZERO; 64],
        }
    }

    /// Creates a decoder that emits `channels` components per pixel no matter
    /// what the header declares. The header's channels byte is still
    /// validated, it just doesn't decide the output width.
    ///
    /// `channels` must be 3 or 4.
    pub fn with_forced_channels(channels: u8) -> Result<Self, DecodeError> {
        ensure!(
            channels == 3 || channels == 4,
            InvalidChannelsSnafu { channels }
        );
        Ok(Self {
            forced_channels: channels,
            ..Self::new()
        })
    }

    /// The image descriptor, available once all 14 header bytes have been
    /// consumed. With a forced channel count, `channels` reflects the forced
    /// value, not the header byte.
    pub fn descriptor(&self) -> Option<&Descriptor> {
        match self.state {
            DecodeState::Header(_) => None,
            _ => Some(&self.desc),
        }
    }

    /// Pixels emitted so far.
    pub const fn pixels_out(&self) -> usize {
        self.pixels_out
    }

    /// True once the full stream, end marker included, has been consumed.
    pub const fn is_done(&self) -> bool {
        matches!(self.state, DecodeState::Done)
    }

    /// Consumes one encoded byte and appends any decoded pixel bytes to the
    /// start of `output`. Returns the number of bytes written.
    ///
    /// Bytes arriving after the end marker are ignored and return `Ok(0)`.
    pub fn decode_byte(&mut self, byte: u8, output: &mut [u8]) -> Result<usize, DecodeError> {
        match self.state {
            DecodeState::Header(pos) => {
                self.header_byte(pos, byte)?;
                Ok(0)
            }
            DecodeState::Footer(pos) => {
                self.footer_byte(pos, byte)?;
                Ok(0)
            }
            DecodeState::Done => Ok(0),
            _ => self.op_byte(byte, output),
        }
    }

    /// Feeds a whole slice through [`decode_byte`], appending to the start of
    /// `output`. Returns the total number of bytes written.
    ///
    /// [`decode_byte`]: QoisDecodeContext::decode_byte
    pub fn decode(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, DecodeError> {
        let mut written = 0;
        for &byte in input {
            written += self.decode_byte(byte, &mut output[written..])?;
        }
        Ok(written)
    }

    fn header_byte(&mut self, pos: u8, byte: u8) -> Result<(), DecodeError> {
        match pos {
            0..=3 => {
                let expected = QOIS_MAGIC[usize::from(pos)];
                ensure!(
                    byte == expected,
                    InvalidMagicSnafu {
                        offset: pos,
                        byte,
                        expected
                    }
                );
            }
            4..=7 => self.desc.width = self.desc.width << 8 | u32::from(byte),
            8..=11 => self.desc.height = self.desc.height << 8 | u32::from(byte),
            12 => {
                ensure!(
                    byte == 3 || byte == 4,
                    InvalidChannelsSnafu { channels: byte }
                );
                self.desc.channels = if self.forced_channels != 0 {
                    self.forced_channels
                } else {
                    byte
                };
            }
            _ => {
                ensure!(byte <= 1, InvalidColorspaceSnafu { colorspace: byte });
                self.desc.colorspace = byte;
                self.pixel_count = self.desc.pixel_count();
                self.state = if self.pixel_count == 0 {
                    DecodeState::Footer(0)
                } else {
                    DecodeState::OpStart
                };
                return Ok(());
            }
        }

        self.state = DecodeState::Header(pos + 1);
        Ok(())
    }

    fn footer_byte(&mut self, pos: u8, byte: u8) -> Result<(), DecodeError> {
        let expected = QOIS_END_MAGIC[usize::from(pos)];
        ensure!(
            byte == expected,
            InvalidEndMarkerSnafu {
                offset: pos,
                byte,
                expected
            }
        );

        self.state = if usize::from(pos) + 1 == QOIS_END_MAGIC.len() {
            DecodeState::Done
        } else {
            DecodeState::Footer(pos + 1)
        };
        Ok(())
    }

    fn op_byte(&mut self, byte: u8, output: &mut [u8]) -> Result<usize, DecodeError> {
        match self.state {
            DecodeState::OpStart => {
                if unlikely(byte == QOIS_OP_RGB) {
                    self.state = DecodeState::RgbByte1;
                    Ok(0)
                } else if unlikely(byte == QOIS_OP_RGBA) {
                    self.state = DecodeState::RgbaByte1;
                    Ok(0)
                } else {
                    match byte & QOIS_MASK_2 {
                        QOIS_OP_INDEX => {
                            let pixel = self.cache[usize::from(byte)];
                            self.emit(pixel, output)
                        }
                        QOIS_OP_DIFF => self.emit(diff(self.last, byte), output),
                        QOIS_OP_LUMA => {
                            self.state = DecodeState::LumaByte2(byte);
                            Ok(0)
                        }
                        // QOIS_OP_RUN
                        _ => self.emit_run(usize::from(byte & 0b0011_1111) + 1, output),
                    }
                }
            }
            DecodeState::RgbByte1 => {
                self.state = DecodeState::RgbByte2(byte);
                Ok(0)
            }
            DecodeState::RgbByte2(r) => {
                self.state = DecodeState::RgbByte3(r, byte);
                Ok(0)
            }
            DecodeState::RgbByte3(r, g) => self.emit(
                Pixel {
                    r,
                    g,
                    b: byte,
                    a: self.last.a,
                },
                output,
            ),
            DecodeState::RgbaByte1 => {
                self.state = DecodeState::RgbaByte2(byte);
                Ok(0)
            }
            DecodeState::RgbaByte2(r) => {
                self.state = DecodeState::RgbaByte3(r, byte);
                Ok(0)
            }
            DecodeState::RgbaByte3(r, g) => {
                self.state = DecodeState::RgbaByte4(r, g, byte);
                Ok(0)
            }
            DecodeState::RgbaByte4(r, g, b) => self.emit(Pixel { r, g, b, a: byte }, output),
            DecodeState::LumaByte2(byte1) => self.emit(luma(self.last, byte1, byte), output),
            // Header, Footer, and Done are dispatched in `decode_byte`.
            _ => unreachable!(),
        }
    }

    /// Writes one pixel to `output`, stores it in its cache slot, and
    /// advances to the next op (or the footer once the image is complete).
    fn emit(&mut self, pixel: Pixel, output: &mut [u8]) -> Result<usize, DecodeError> {
        let channels = usize::from(self.desc.channels);
        ensure!(
            output.len() >= channels,
            OutputTooSmallSnafu {
                needed: channels,
                available: output.len()
            }
        );

        output[0] = pixel.r;
        output[1] = pixel.g;
        output[2] = pixel.b;
        if channels == 4 {
            output[3] = pixel.a;
        }

        self.cache[usize::from(hash(pixel))] = pixel;
        self.last = pixel;
        self.pixels_out += 1;
        self.state = if self.pixels_out >= self.pixel_count {
            DecodeState::Footer(0)
        } else {
            DecodeState::OpStart
        };
        Ok(channels)
    }

    /// Repeats the previous pixel `count` times.
    fn emit_run(&mut self, count: usize, output: &mut [u8]) -> Result<usize, DecodeError> {
        let channels = usize::from(self.desc.channels);
        let needed = count * channels;
        ensure!(
            output.len() >= needed,
            OutputTooSmallSnafu {
                needed,
                available: output.len()
            }
        );

        let pixel = self.last;
        for chunk in output[..needed].chunks_exact_mut(channels) {
            chunk[0] = pixel.r;
            chunk[1] = pixel.g;
            chunk[2] = pixel.b;
            if channels == 4 {
                chunk[3] = pixel.a;
            }
        }

        self.cache[usize::from(hash(pixel))] = pixel;
        self.pixels_out += count;
        self.state = if self.pixels_out >= self.pixel_count {
            DecodeState::Footer(0)
        } else {
            DecodeState::OpStart
        };
        Ok(needed)
    }
}
