//! Segue: apply a GLSL transition to a video file or a still image.

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use segue::utils::ThroughputCounter;
use segue::video::{self, FrameDecoder, FrameEncoder};
use segue::{ConfigFile, HeadlessContextProvider, TransitionConfig, TransitionRenderer, VideoFrame};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// GPU shader transitions for video frames.
#[derive(Parser, Debug)]
#[command(name = "segue")]
#[command(about = "Render a GLSL transition over video frames on the GPU")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transition every frame of a video file
    Video {
        /// Input video
        #[arg(short, long)]
        input: PathBuf,

        /// Output video (H.264)
        #[arg(short, long)]
        output: PathBuf,

        /// Override the input frame rate, e.g. 25 or 30000/1001
        #[arg(long)]
        fps: Option<String>,

        #[command(flatten)]
        transition: TransitionArgs,
    },
    /// Transition a single image as if it were shown at `--time`
    Still {
        /// Input image
        #[arg(short, long)]
        input: PathBuf,

        /// Output image
        #[arg(short, long)]
        output: PathBuf,

        /// Presentation time in seconds
        #[arg(short, long, default_value = "0")]
        time: f64,

        #[command(flatten)]
        transition: TransitionArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct TransitionArgs {
    /// Transition length in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Seconds before the transition starts
    #[arg(long)]
    offset: Option<f64>,

    /// GLSL file defining `vec4 transition(vec2 uv)`; pass-through when omitted
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// YAML file with duration / offset / source
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Accept a software adapter when no hardware GPU is available
    #[arg(long)]
    allow_software: bool,
}

impl TransitionArgs {
    fn renderer(&self) -> Result<TransitionRenderer> {
        let (file, base_dir) = match &self.config {
            Some(path) => {
                info!("Loading config from {:?}", path);
                let file = ConfigFile::load(path).with_context(|| format!("failed to read config {:?}", path))?;
                (file, path.parent().map(|p| p.to_path_buf()))
            }
            None => (ConfigFile::default(), None),
        };
        let config: TransitionConfig =
            file.resolve(base_dir.as_deref(), self.duration, self.offset, self.source.clone())?;
        debug!("Transition config: {:?}", config);

        Ok(TransitionRenderer::with_provider(
            config,
            HeadlessContextProvider {
                allow_fallback: self.allow_software,
            },
        ))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    info!("Starting Segue...");

    match args.command {
        Command::Video {
            input,
            output,
            fps,
            transition,
        } => run_video(input, output, fps, transition),
        Command::Still {
            input,
            output,
            time,
            transition,
        } => run_still(input, output, time, transition),
    }
}

fn run_video(input: PathBuf, output: PathBuf, fps: Option<String>, transition: TransitionArgs) -> Result<()> {
    if !video::is_ffmpeg_on_path() {
        return Err(anyhow!("ffmpeg was not found on PATH"));
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, finishing the output file...");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut info = video::probe(&input)?;
    if let Some(rate) = fps {
        info.frame_rate = video::parse_rate(&rate).ok_or_else(|| anyhow!("invalid frame rate '{}'", rate))?;
        info!("Frame rate overridden to {}/{}", info.frame_rate.0, info.frame_rate.1);
    }

    let mut renderer = transition.renderer()?;
    renderer.configure(info.width, info.height)?;

    let mut decoder = FrameDecoder::open(&input, info)?;
    let mut encoder = FrameEncoder::new(&output, info.width, info.height, info.frame_rate)?;
    let mut rendered = VideoFrame::new(info.width, info.height);
    let mut counter = ThroughputCounter::default();

    while running.load(Ordering::SeqCst) {
        let Some(frame) = decoder.next_frame()? else {
            break;
        };
        let seconds = frame.pts.map_or(0.0, |pts| pts.seconds());
        let progress = renderer.render_into(&frame, seconds, &mut rendered)?;
        encoder.write_frame(&rendered)?;

        if let Some(fps) = counter.record() {
            info!("[Perf] {:.2} FPS at {:.2}s (progress {:.3})", fps, seconds, progress);
        }
    }

    if !running.load(Ordering::SeqCst) {
        warn!("Stopped early after {} frames", counter.total_frames());
    }
    renderer.teardown();
    encoder.finish()?;
    info!(
        "Rendered {} frames, {:.2} FPS average",
        counter.total_frames(),
        counter.average_fps()
    );
    Ok(())
}

fn run_still(input: PathBuf, output: PathBuf, time: f64, transition: TransitionArgs) -> Result<()> {
    let image = image::open(&input)
        .with_context(|| format!("failed to open image {:?}", input))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    info!("Loaded {:?} ({}x{})", input, width, height);

    let mut renderer = transition.renderer()?;
    renderer.configure(width, height)?;

    let frame = VideoFrame::from_data(width, height, image.into_raw());
    let rendered = renderer.render(&frame, time)?;
    info!(
        "Rendered at {:.3}s with progress {:.3}",
        time,
        renderer.progress().unwrap_or_default()
    );
    renderer.teardown();

    let result = image::RgbImage::from_raw(width, height, rendered.data)
        .ok_or_else(|| anyhow!("rendered frame does not fit a {}x{} image", width, height))?;
    result
        .save(&output)
        .with_context(|| format!("failed to write image {:?}", output))?;
    info!("Wrote {:?}", output);
    Ok(())
}
