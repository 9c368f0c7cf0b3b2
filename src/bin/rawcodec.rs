//! rawcodec CLI - inspect and decode bare Lossless JPEG streams.
//!
//! A demonstration harness for the library: reads a file that starts
//! at the SOI marker, decodes the scan and writes the samples out.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use rawcodec_rs::{peek_frame_info, Grid2D, ImageSpec, LJpegDecoder, OutputLayout};

/// Bitstream codec core for RAW camera formats
#[derive(Parser)]
#[command(name = "rawcodec")]
#[command(author = "rawcodec-rs contributors")]
#[command(version)]
#[command(about = "Decode and inspect bare Lossless JPEG (SOF3) streams", long_about = None)]
#[command(after_help = "EXAMPLES:
    rawcodec decode -i tile.ljpeg -o tile.pgm
    rawcodec decode -i tile.ljpeg -o tile.raw -f raw
    rawcodec info -i tile.ljpeg

The input must begin at the SOI marker. Multi-component frames are
written interleaved; PGM output is limited to single-component frames.

For more information, visit: https://github.com/rad-medica/rawcodec-rs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a lossless JPEG stream to PGM or raw 16-bit samples
    #[command(visible_alias = "d")]
    Decode {
        /// Input file path (bare LJPEG stream, SOI first)
        #[arg(short, long, help = "Path to the input stream")]
        input: PathBuf,

        /// Output file path for decoded samples
        #[arg(short, long, help = "Path for the output file")]
        output: PathBuf,

        /// Output format: pgm (P5, big-endian) or raw (native-endian u16)
        #[arg(short, long, default_value = "pgm", value_enum)]
        format: OutputFormat,
    },

    /// Print the frame geometry without decoding
    #[command(visible_alias = "i")]
    Info {
        /// Input file path (bare LJPEG stream, SOI first)
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Pgm,
    Raw,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("rawcodec: {msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Info { input } => {
            let data = fs::read(&input).map_err(|e| format!("{}: {e}", input.display()))?;
            let info = peek_frame_info(&data).map_err(|e| e.to_string())?;
            println!(
                "{}: {} MCUs/row x {} rows, {} bits, {} component(s)",
                input.display(),
                info.width,
                info.height,
                info.bits_per_sample,
                info.component_count
            );
            Ok(())
        }
        Commands::Decode { input, output, format } => {
            let data = fs::read(&input).map_err(|e| format!("{}: {e}", input.display()))?;
            let info = peek_frame_info(&data).map_err(|e| e.to_string())?;

            let width = (info.width * info.component_count) as usize;
            let height = info.height as usize;
            let mut samples = vec![0u16; width * height];
            let mut grid = Grid2D::new(&mut samples, width, height, width)
                .map_err(|e| e.to_string())?;

            let mut decoder = LJpegDecoder::new(&data, ImageSpec::default())
                .map_err(|e| e.to_string())?;
            decoder
                .decode(
                    &mut grid,
                    OutputLayout::Tile { offset_x: 0, offset_y: 0, width, height },
                    false,
                )
                .map_err(|e| e.to_string())?;

            let bytes = match format {
                OutputFormat::Pgm => {
                    if info.component_count != 1 {
                        return Err("PGM output requires a single-component frame".into());
                    }
                    let maxval = (1u32 << info.bits_per_sample) - 1;
                    let mut out =
                        format!("P5\n{width} {height}\n{maxval}\n").into_bytes();
                    for &s in samples.iter() {
                        out.extend_from_slice(&s.to_be_bytes());
                    }
                    out
                }
                OutputFormat::Raw => {
                    let mut out = Vec::with_capacity(2 * samples.len());
                    for &s in samples.iter() {
                        out.extend_from_slice(&s.to_ne_bytes());
                    }
                    out
                }
            };
            fs::write(&output, bytes).map_err(|e| format!("{}: {e}", output.display()))?;
            log::info!("decoded {} -> {}", input.display(), output.display());
            Ok(())
        }
    }
}
