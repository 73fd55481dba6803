use argh::FromArgs;
use image::{ImageFormat, RgbImage, RgbaImage};
use qois::{
    consts::decode_headroom,
    decode::QoisDecodeContext,
    encode::QoisEncodeContext,
};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    num::NonZeroU32,
    str::FromStr,
};

/// QOI streaming cli encoder and decoder.
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Encode(Encode),
    EncodeRaw(EncodeRaw),
    Decode(Decode),
    DecodeRaw(DecodeRaw),
}

#[derive(Debug)]
enum Format {
    Png,
    Jpg,
    Bmp,
}

impl FromStr for Format {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        #[rustfmt::skip]
        let Some(format) = s.eq_ignore_ascii_case("png").then_some(Format::Png)
               .or_else(|| s.eq_ignore_ascii_case("jpg").then_some(Format::Jpg))
               .or_else(|| s.eq_ignore_ascii_case("bmp").then_some(Format::Bmp))
        else { return Err("invalid string"); };

        Ok(format)
    }
}

impl From<Format> for ImageFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Png => ImageFormat::Png,
            Format::Jpg => ImageFormat::Jpeg,
            Format::Bmp => ImageFormat::Bmp,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli { command } = argh::from_env();

    match command {
        Command::Encode(options) => encode(options),
        Command::EncodeRaw(options) => encode_raw(options),
        Command::Decode(options) => decode(options),
        Command::DecodeRaw(options) => decode_raw(options),
    }
}

/// Encodes an image as QOI.
#[derive(FromArgs)]
#[argh(subcommand, name = "encode")]
struct Encode {
    /// input format, optional (png, jpg, bmp)
    #[argh(option)]
    format: Option<Format>,

    /// number of channels to encode (3 or 4), defaults to whatever the input
    /// image has
    #[argh(option)]
    channels: Option<u8>,

    /// the input file (PNG, JPG, or BMP)
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

fn encode(options: Encode) -> Result<(), Box<dyn std::error::Error>> {
    let Encode {
        format,
        channels,
        input,
        output,
    } = options;

    let image = match format {
        Some(format) => image::io::Reader::with_format(
            BufReader::new(File::open(&input)?),
            ImageFormat::from(format),
        )
        .decode()?,
        None => image::io::Reader::open(input)?
            .with_guessed_format()?
            .decode()?,
    };

    let width = image.width();
    let height = image.height();
    let channels = match channels {
        Some(c @ (3 | 4)) => c,
        Some(c) => return Err(format!("invalid channel count {c}, expected 3 or 4").into()),
        None => {
            if image.color().has_alpha() {
                4
            } else {
                3
            }
        }
    };

    println!("Encoding {width}x{height} image at {channels} channels");

    let raw = if channels == 4 {
        image.into_rgba8().into_raw()
    } else {
        image.into_rgb8().into_raw()
    };

    let mut v = Vec::with_capacity(1024 * 1024);
    QoisEncodeContext::encode_to_vec(width, height, channels, 0, &raw, &mut v)?;

    std::fs::write(&output, &v)?;
    println!("Written {} bytes to `{output}`", v.len());

    Ok(())
}

/// Encodes a raw RGB(A) pixel file as QOI.
#[derive(FromArgs)]
#[argh(subcommand, name = "encode-raw")]
struct EncodeRaw {
    /// image width
    #[argh(option)]
    width: NonZeroU32,
    /// image height
    #[argh(option)]
    height: NonZeroU32,
    /// number of channels in the input (3 or 4)
    #[argh(option)]
    channels: u8,

    /// the input file, `width * height * channels` bytes in RGBA order
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

fn encode_raw(options: EncodeRaw) -> Result<(), Box<dyn std::error::Error>> {
    let EncodeRaw {
        width,
        height,
        channels,
        input,
        output,
    } = options;

    println!("Encoding {width}x{height} image at {channels} channels");

    let raw = std::fs::read(input)?;

    let w = BufWriter::new(File::create(&output)?);
    QoisEncodeContext::encode(width.get(), height.get(), channels, 0, &raw, w)?;

    println!("Written `{output}`");

    Ok(())
}

/// Decodes a QOI image into an image file.
#[derive(FromArgs)]
#[argh(subcommand, name = "decode")]
struct Decode {
    /// output format (png, jpg, bmp)
    #[argh(option)]
    format: Format,

    /// the input file
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

fn decode(options: Decode) -> Result<(), Box<dyn std::error::Error>> {
    let Decode {
        format,
        input,
        output,
    } = options;

    let data = std::fs::read(&input)?;

    println!("Decoding `{input}`");

    let mut state = QoisDecodeContext::new();
    let raw = pump_decode(&data, &mut state)?;
    let desc = *state.descriptor().expect("decoder finished without header");

    match desc.channels {
        3 => RgbImage::from_vec(desc.width, desc.height, raw)
            .ok_or("failed to create image")?
            .save_with_format(&output, ImageFormat::from(format))?,
        _ => RgbaImage::from_vec(desc.width, desc.height, raw)
            .ok_or("failed to create image")?
            .save_with_format(&output, ImageFormat::from(format))?,
    }

    println!("Written {}x{} image to `{output}`", desc.width, desc.height);

    Ok(())
}

/// Decodes a QOI image into a raw RGB(A) pixel file.
#[derive(FromArgs)]
#[argh(subcommand, name = "decode-raw")]
struct DecodeRaw {
    /// force the output pixel width (3 or 4) regardless of the stream header
    #[argh(option)]
    channels: Option<u8>,

    /// the input file
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

fn decode_raw(options: DecodeRaw) -> Result<(), Box<dyn std::error::Error>> {
    let DecodeRaw {
        channels,
        input,
        output,
    } = options;

    let data = std::fs::read(&input)?;

    println!("Decoding `{input}`");

    let mut state = match channels {
        Some(channels) => QoisDecodeContext::with_forced_channels(channels)?,
        None => QoisDecodeContext::new(),
    };
    let raw = pump_decode(&data, &mut state)?;
    let desc = *state.descriptor().expect("decoder finished without header");

    std::fs::write(&output, &raw)?;

    println!(
        "Written {}x{} image ({} channels) to `{output}`",
        desc.width, desc.height, desc.channels
    );

    Ok(())
}

/// Pushes an encoded stream through the decoder one byte at a time, growing
/// the output whenever the headroom for the next call runs out.
fn pump_decode(
    data: &[u8],
    state: &mut QoisDecodeContext,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    // Worst case for a single call, before the header says how wide pixels
    // actually are.
    let headroom = decode_headroom(4);

    let mut out = vec![0u8; 64 * 1024];
    let mut written = 0;

    for (offset, &byte) in data.iter().enumerate() {
        if out.len() - written < headroom {
            let len = out.len();
            out.resize(len * 2, 0);
        }

        written += state.decode_byte(byte, &mut out[written..]).map_err(|e| {
            format!("decode error at input offset {offset}, byte {byte:#04x}: {e}")
        })?;
    }

    if !state.is_done() {
        return Err("truncated stream: input ended before the end marker".into());
    }

    out.truncate(written);
    Ok(out)
}
