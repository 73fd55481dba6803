use crate::{
    consts::{QOIS_END_MAGIC, QOIS_HEADER_SIZE},
    decode::{DecodeError, QoisDecodeContext},
    Descriptor,
};
use alloc::vec::Vec;
use snafu::{ensure, OptionExt, Snafu};

#[derive(Debug, Snafu)]
pub enum DecodeToVecError {
    /// The input ended before the stream did.
    UnexpectedEof,

    #[snafu(display("{width}x{height} at {channels} channels doesn't fit an in-memory buffer"))]
    ImageTooLarge {
        width: u32,
        height: u32,
        channels: u8,
    },

    #[snafu(context(false))]
    Decode { source: DecodeError },
}

impl QoisDecodeContext {
    /// Decodes a whole QOI stream, appending the raw pixel bytes to `w`.
    pub fn decode_to_vec(data: &[u8], w: &mut Vec<u8>) -> Result<Descriptor, DecodeToVecError> {
        let mut state = QoisDecodeContext::new();
        state.decode_to_vec_with_state(data, w)
    }

    /// Decodes a whole QOI stream with the given state as starting state,
    /// appending the raw pixel bytes to `w`.
    ///
    /// The header is pushed through the byte machine first, so the magic and
    /// the descriptor are fully validated before any output is sized, and
    /// all opcode validation applies to the rest of the stream.
    pub fn decode_to_vec_with_state(
        &mut self,
        data: &[u8],
        w: &mut Vec<u8>,
    ) -> Result<Descriptor, DecodeToVecError> {
        ensure!(
            data.len() >= QOIS_HEADER_SIZE + QOIS_END_MAGIC.len(),
            UnexpectedEofSnafu
        );

        // Header bytes emit nothing.
        let (header, body) = data.split_at(QOIS_HEADER_SIZE);
        self.decode(header, &mut [])?;
        let desc = self.desc;

        // u32 dimensions times the channel count can exceed usize; a stream
        // is not allowed to panic or wrap the buffer size.
        let max_len = (u64::from(desc.width) * u64::from(desc.height))
            .checked_mul(u64::from(desc.channels))
            .and_then(|len| usize::try_from(len).ok())
            .context(ImageTooLargeSnafu {
                width: desc.width,
                height: desc.height,
                channels: desc.channels,
            })?;

        let start = w.len();
        w.resize(start + max_len, 0);
        let written = self.decode(body, &mut w[start..])?;
        w.truncate(start + written);

        ensure!(self.is_done(), UnexpectedEofSnafu);
        Ok(desc)
    }
}
