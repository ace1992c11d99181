use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use tonegram_core::{LinkConfig, MessageDecoder, PALETTE_SIZE};

#[derive(Parser)]
#[command(name = "tonegram")]
#[command(about = "Acoustic picture-message receiver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a recorded transmission from a WAV file
    Decode {
        /// Input WAV file (mono)
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Write the decoded image as a PPM file
        #[arg(short, long, value_name = "OUT.PPM")]
        image_out: Option<PathBuf>,

        /// Receiver tuning overrides (JSON)
        #[arg(short, long, value_name = "CFG.JSON")]
        config: Option<PathBuf>,
    },

    /// Print the active frequency plan for transmitter calibration
    Plan {
        /// Receiver tuning overrides (JSON)
        #[arg(short, long, value_name = "CFG.JSON")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            input,
            image_out,
            config,
        } => decode_command(&input, image_out.as_deref(), config.as_deref()),
        Commands::Plan { config } => plan_command(config.as_deref()),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<LinkConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let config: LinkConfig = serde_json::from_str(&text)?;
            Ok(config)
        }
        None => Ok(LinkConfig::default()),
    }
}

fn decode_command(
    input: &std::path::Path,
    image_out: Option<&std::path::Path>,
    config_path: Option<&std::path::Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (samples, sample_rate) = read_wav(input)?;
    info!("read {} samples at {} Hz", samples.len(), sample_rate);

    let mut config = load_config(config_path)?;
    // Decoding runs against the recording's own rate.
    config.sample_rate = sample_rate;

    let decoder = MessageDecoder::new(config)?;
    let message = decoder.decode(&samples, sample_rate)?;

    println!("Sender:    {}", message.header.sender);
    println!("Recipient: {}", message.header.recipient);
    println!("Mode:      {}", message.header.mode);
    println!("Avg SNR:   {:.1} dB", message.average_snr_db);
    println!("Errors:    {}", message.error_count);
    println!(
        "Quality:   {:.0}  Rarity: {:.0}",
        message.scores.quality, message.scores.rarity
    );

    if let Some(path) = image_out {
        let ppm = render_ppm(&message.grid, message.width, message.height);
        std::fs::write(path, ppm)?;
        println!("Image written to {}", path.display());
    }

    Ok(())
}

fn plan_command(config_path: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    println!("# candidate frequency plan");
    for freq in config.candidate_frequencies() {
        println!("{freq:.1}");
    }
    Ok(())
}

/// Read a WAV file as mono f32 samples in [-1, 1]. Multi-channel input is
/// averaged down to one channel.
fn read_wav(path: &std::path::Path) -> Result<(Vec<f32>, u32), Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((samples, spec.sample_rate))
}

/// Built-in display palette: 32 colors covering a grayscale ramp and two
/// brightness levels of twelve hues.
const PALETTE_RGB: [[u8; 3]; PALETTE_SIZE] = [
    [0, 0, 0],
    [36, 36, 36],
    [73, 73, 73],
    [109, 109, 109],
    [146, 146, 146],
    [182, 182, 182],
    [219, 219, 219],
    [255, 255, 255],
    [128, 0, 0],
    [128, 64, 0],
    [128, 128, 0],
    [64, 128, 0],
    [0, 128, 0],
    [0, 128, 64],
    [0, 128, 128],
    [0, 64, 128],
    [0, 0, 128],
    [64, 0, 128],
    [128, 0, 128],
    [128, 0, 64],
    [255, 0, 0],
    [255, 128, 0],
    [255, 255, 0],
    [128, 255, 0],
    [0, 255, 0],
    [0, 255, 128],
    [0, 255, 255],
    [0, 128, 255],
    [0, 0, 255],
    [128, 0, 255],
    [255, 0, 255],
    [255, 0, 128],
];

/// Render a palette-index grid as a plain-text PPM (P3).
fn render_ppm(grid: &[u8], width: usize, height: usize) -> String {
    let mut out = format!("P3\n{width} {height}\n255\n");
    for y in 0..height {
        for x in 0..width {
            let index = grid
                .get(y * width + x)
                .copied()
                .unwrap_or(0)
                .min(PALETTE_SIZE as u8 - 1) as usize;
            let [r, g, b] = PALETTE_RGB[index];
            out.push_str(&format!("{r} {g} {b}\n"));
        }
    }
    out
}

// Keep the palette tone table and display palette the same length.
const _: () = assert!(PALETTE_RGB.len() == PALETTE_SIZE);
