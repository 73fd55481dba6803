use qois::{
    consts::{decode_headroom, ENCODE_HEADROOM},
    decode::QoisDecodeContext,
    encode::QoisEncodeContext,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn encode(width: u32, height: u32, channels: u8, pixels: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(pixels.len() + 32);
    QoisEncodeContext::encode_to_vec(width, height, channels, 0, pixels, &mut encoded).unwrap();
    encoded
}

fn decode(encoded: &[u8]) -> Vec<u8> {
    let mut raw = Vec::new();
    QoisDecodeContext::decode_to_vec(encoded, &mut raw).unwrap();
    raw
}

/// Fully random pixels, so RGB/RGBA ops dominate.
fn noise_pixels(seed: u64, pixel_count: usize, channels: usize) -> Vec<u8> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..pixel_count * channels).map(|_| rng.gen()).collect()
}

fn jitter(channel: u8, delta: i8) -> u8 {
    channel.wrapping_add(delta as u8)
}

/// Pixels drawn from a small palette with small jitters, so runs, cache
/// hits, DIFF, and LUMA all show up.
fn palette_pixels(seed: u64, pixel_count: usize, channels: usize) -> Vec<u8> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut pixels = Vec::with_capacity(pixel_count * channels);
    let mut prev = [0u8, 0, 0, 255];

    for _ in 0..pixel_count {
        let px = match rng.gen_range(0..4) {
            // repeat for runs
            0 => prev,
            // small delta for DIFF
            1 => [
                jitter(prev[0], rng.gen_range(-2..2)),
                jitter(prev[1], rng.gen_range(-2..2)),
                jitter(prev[2], rng.gen_range(-2..2)),
                prev[3],
            ],
            // larger green-led delta for LUMA
            2 => {
                let dg: i8 = rng.gen_range(-32..32);
                [
                    jitter(prev[0], dg + rng.gen_range(-8..8)),
                    jitter(prev[1], dg),
                    jitter(prev[2], dg + rng.gen_range(-8..8)),
                    prev[3],
                ]
            }
            // fresh pixel from a small palette for cache hits
            _ => [
                rng.gen_range(0..8) * 32,
                rng.gen_range(0..8) * 32,
                rng.gen_range(0..8) * 32,
                if rng.gen_bool(0.9) { prev[3] } else { rng.gen() },
            ],
        };
        prev = px;
        pixels.extend_from_slice(&px[..channels]);
    }

    pixels
}

#[test]
fn roundtrip_noise_rgba() {
    let pixels = noise_pixels(0x5eed, 64 * 64, 4);
    let encoded = encode(64, 64, 4, &pixels);
    assert_eq!(decode(&encoded), pixels);
}

#[test]
fn roundtrip_noise_rgb() {
    let pixels = noise_pixels(0x5eed + 1, 64 * 64, 3);
    let encoded = encode(64, 64, 3, &pixels);
    assert_eq!(decode(&encoded), pixels);
}

#[test]
fn roundtrip_palette_rgba() {
    let pixels = palette_pixels(0xbeef, 128 * 37, 4);
    let encoded = encode(128, 37, 4, &pixels);
    assert_eq!(decode(&encoded), pixels);
}

#[test]
fn roundtrip_palette_rgb() {
    let pixels = palette_pixels(0xbeef + 1, 128 * 37, 3);
    let encoded = encode(128, 37, 3, &pixels);
    assert_eq!(decode(&encoded), pixels);
}

#[test]
fn reencode_is_byte_identical() {
    for channels in [3u8, 4] {
        let pixels = palette_pixels(0xcafe, 64 * 64, usize::from(channels));
        let encoded = encode(64, 64, channels, &pixels);
        let reencoded = encode(64, 64, channels, &decode(&encoded));
        assert_eq!(encoded, reencoded);
    }
}

#[test]
fn streaming_decode_matches_any_chunking() {
    let pixels = palette_pixels(0xd00d, 64 * 64, 4);
    let encoded = encode(64, 64, 4, &pixels);

    for chunk_len in [1, 3, 7, 64, 512, encoded.len()] {
        let mut state = QoisDecodeContext::new();
        let mut out = vec![0u8; pixels.len() + decode_headroom(4)];
        let mut written = 0;

        for chunk in encoded.chunks(chunk_len) {
            written += state.decode(chunk, &mut out[written..]).unwrap();
        }

        assert!(state.is_done(), "chunk_len {chunk_len}: not done");
        out.truncate(written);
        assert_eq!(out, pixels, "chunk_len {chunk_len}: pixel mismatch");
    }
}

#[test]
fn streaming_encode_matches_single_shot() {
    let pixels = palette_pixels(0xfeed, 64 * 64, 4);
    let encoded = encode(64, 64, 4, &pixels);

    let mut state = QoisEncodeContext::new(64, 64, 4, 0).unwrap();
    let mut buf = [0u8; ENCODE_HEADROOM];
    let mut streamed = Vec::with_capacity(encoded.len());

    for &byte in &pixels {
        let n = state.encode_byte(byte, &mut buf).unwrap();
        streamed.extend_from_slice(&buf[..n]);
    }

    assert!(state.is_done());
    assert_eq!(streamed, encoded);
}

#[test]
fn writer_encode_matches_vec_encode() {
    let pixels = palette_pixels(0xace, 48 * 48, 3);
    let encoded = encode(48, 48, 3, &pixels);

    let mut streamed = Vec::with_capacity(encoded.len());
    QoisEncodeContext::encode(48, 48, 3, 0, &pixels, &mut streamed).unwrap();

    assert_eq!(streamed, encoded);
}
