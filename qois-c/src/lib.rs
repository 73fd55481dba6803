#![cfg_attr(not(test), no_std)]

use core::mem::{align_of, size_of};
use qois::{
    decode::{DecodeError, QoisDecodeContext},
    encode::{EncodeError, QoisEncodeContext},
};

#[cfg(not(test))]
#[panic_handler]
fn panic_handler(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}

const QOIS_ERR_FORMAT: isize = -1;
const QOIS_ERR_BUFFER: isize = -2;

fn decode_err(e: DecodeError) -> isize {
    match e {
        DecodeError::OutputTooSmall { .. } => QOIS_ERR_BUFFER,
        _ => QOIS_ERR_FORMAT,
    }
}

fn encode_err(e: EncodeError) -> isize {
    match e {
        EncodeError::OutputTooSmall { .. } => QOIS_ERR_BUFFER,
        _ => QOIS_ERR_FORMAT,
    }
}

/// Size of a decoder state, so the C side can allocate one.
#[no_mangle]
pub extern "C" fn qois_dec_state_size() -> usize {
    size_of::<QoisDecodeContext>()
}

/// Alignment of a decoder state.
#[no_mangle]
pub extern "C" fn qois_dec_state_align() -> usize {
    align_of::<QoisDecodeContext>()
}

/// Initializes a decoder state in caller-provided storage.
///
/// - `state`: pointer to at least `qois_dec_state_size()` bytes, aligned to
///   `qois_dec_state_align()`
/// - `channels`: 0 to take the channel count from the stream header, or 3/4
///   to force the output pixel width
///
/// Returns 0 on success, -1 if `channels` is invalid.
///
/// # Safety
///
/// `state` must be valid for writes of `qois_dec_state_size()` bytes.
#[no_mangle]
pub unsafe extern "C" fn qois_dec_state_init(state: *mut QoisDecodeContext, channels: u8) -> isize {
    let ctx = match channels {
        0 => QoisDecodeContext::new(),
        _ => match QoisDecodeContext::with_forced_channels(channels) {
            Ok(ctx) => ctx,
            Err(_) => return QOIS_ERR_FORMAT,
        },
    };
    state.write(ctx);
    0
}

/// Decodes one byte of a QOI stream, appending raw pixel bytes to `output`.
///
/// Returns the number of bytes written, or -1 on a malformed stream, or -2 if
/// the output buffer is too small for the emission (keep at least
/// `channels * 62` bytes available per call).
///
/// # Safety
///
/// `state` must have been initialized with `qois_dec_state_init` and `output`
/// must be valid for writes of `output_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn qois_decode_byte(
    state: *mut QoisDecodeContext,
    byte: u8,
    output: *mut u8,
    output_len: usize,
) -> isize {
    let output = core::slice::from_raw_parts_mut(output, output_len);
    match (*state).decode_byte(byte, output) {
        Ok(n) => n as isize,
        Err(e) => decode_err(e),
    }
}

/// Returns 1 once the decoder has consumed the end marker, 0 otherwise.
///
/// # Safety
///
/// `state` must have been initialized with `qois_dec_state_init`.
#[no_mangle]
pub unsafe extern "C" fn qois_dec_is_done(state: *const QoisDecodeContext) -> i32 {
    (*state).is_done() as i32
}

/// Size of an encoder state, so the C side can allocate one.
#[no_mangle]
pub extern "C" fn qois_enc_state_size() -> usize {
    size_of::<QoisEncodeContext>()
}

/// Alignment of an encoder state.
#[no_mangle]
pub extern "C" fn qois_enc_state_align() -> usize {
    align_of::<QoisEncodeContext>()
}

/// Initializes an encoder state in caller-provided storage.
///
/// Returns 0 on success, -1 if `channels` is not 3/4 or `colorspace` is not
/// 0/1.
///
/// # Safety
///
/// `state` must be valid for writes of `qois_enc_state_size()` bytes.
#[no_mangle]
pub unsafe extern "C" fn qois_enc_state_init(
    state: *mut QoisEncodeContext,
    width: u32,
    height: u32,
    channels: u8,
    colorspace: u8,
) -> isize {
    match QoisEncodeContext::new(width, height, channels, colorspace) {
        Ok(ctx) => {
            state.write(ctx);
            0
        }
        Err(_) => QOIS_ERR_FORMAT,
    }
}

/// Encodes one raw pixel byte, appending encoded bytes to `output`.
///
/// Returns the number of bytes written, or -2 if the output buffer is too
/// small for the emission (keep at least 28 bytes available per call).
///
/// # Safety
///
/// `state` must have been initialized with `qois_enc_state_init` and `output`
/// must be valid for writes of `output_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn qois_encode_byte(
    state: *mut QoisEncodeContext,
    byte: u8,
    output: *mut u8,
    output_len: usize,
) -> isize {
    let output = core::slice::from_raw_parts_mut(output, output_len);
    match (*state).encode_byte(byte, output) {
        Ok(n) => n as isize,
        Err(e) => encode_err(e),
    }
}

/// Returns 1 once the encoder has emitted the end marker, 0 otherwise.
///
/// # Safety
///
/// `state` must have been initialized with `qois_enc_state_init`.
#[no_mangle]
pub unsafe extern "C" fn qois_enc_is_done(state: *const QoisEncodeContext) -> i32 {
    (*state).is_done() as i32
}
