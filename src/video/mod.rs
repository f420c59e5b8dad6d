//! Raw-frame video I/O through `ffprobe` / `ffmpeg` subprocesses.
//!
//! This is the media pipeline the CLI wraps around the renderer: frames come out of a
//! decoding `ffmpeg` as packed RGB24 in presentation order and go back into an encoding one.

use crate::frame::{TimeBase, Timestamp, VideoFrame};
use anyhow::{anyhow, Context, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Stream parameters reported by `ffprobe`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Frame rate as `num/den` frames per second.
    pub frame_rate: (i32, i32),
    /// Duration in seconds, when the container reports one.
    pub duration: Option<f64>,
}

impl VideoInfo {
    /// One tick per frame.
    pub fn time_base(&self) -> TimeBase {
        TimeBase::new(self.frame_rate.1, self.frame_rate.0)
    }

    pub fn fps(&self) -> f64 {
        if self.frame_rate.1 == 0 {
            0.0
        } else {
            self.frame_rate.0 as f64 / self.frame_rate.1 as f64
        }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Reads the first video stream's size, frame rate and duration.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate,duration",
            "-of", "default=noprint_wrappers=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| anyhow!("Failed to run ffprobe: {}", e))?;

    if !output.status.success() {
        return Err(anyhow!("ffprobe failed: {}", String::from_utf8_lossy(&output.stderr)));
    }

    let info = parse_probe(&String::from_utf8(output.stdout)?)?;
    info!(
        "Video: {}x{}, {:.3} fps, {}",
        info.width,
        info.height,
        info.fps(),
        info.duration.map_or("unknown duration".to_string(), |d| format!("{d:.2}s"))
    );
    Ok(info)
}

/// Parses `key=value` lines from `ffprobe -of default=noprint_wrappers=1`.
fn parse_probe(stdout: &str) -> Result<VideoInfo> {
    let mut width = None;
    let mut height = None;
    let mut frame_rate = None;
    let mut duration = None;

    for line in stdout.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse().ok(),
            "height" => height = value.parse().ok(),
            "r_frame_rate" => frame_rate = parse_rate(value),
            // "N/A" for many streams
            "duration" => duration = value.parse().ok(),
            _ => {}
        }
    }

    Ok(VideoInfo {
        width: width.ok_or_else(|| anyhow!("ffprobe reported no width"))?,
        height: height.ok_or_else(|| anyhow!("ffprobe reported no height"))?,
        frame_rate: frame_rate.ok_or_else(|| anyhow!("ffprobe reported no usable frame rate"))?,
        duration,
    })
}

/// Parses `30000/1001` or `25` into a non-zero rational.
pub fn parse_rate(s: &str) -> Option<(i32, i32)> {
    let (num, den) = match s.split_once('/') {
        Some((num, den)) => (num.trim().parse().ok()?, den.trim().parse().ok()?),
        None => (s.trim().parse().ok()?, 1),
    };
    (num > 0 && den > 0).then_some((num, den))
}

/// Decodes a video into RGB24 frames on a background thread.
pub struct FrameDecoder {
    frame_rx: Receiver<Result<Vec<u8>>>,
    info: VideoInfo,
    frame_index: i64,
    _thread: JoinHandle<()>,
}

impl FrameDecoder {
    pub fn open(path: &Path, info: VideoInfo) -> Result<Self> {
        info!("Opening video via ffmpeg CLI: {:?}", path);

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn ffmpeg: {}", e))?;

        forward_stderr(&mut child, "ffmpeg decode");

        // Bounded so decoding cannot run far ahead of rendering
        let (frame_tx, frame_rx) = mpsc::sync_channel(5);
        let frame_size = VideoFrame::byte_len(info.width, info.height);
        let thread = thread::spawn(move || Self::decode_loop(child, frame_size, frame_tx));

        Ok(Self {
            frame_rx,
            info,
            frame_index: 0,
            _thread: thread,
        })
    }

    fn decode_loop(mut child: Child, frame_size: usize, tx: SyncSender<Result<Vec<u8>>>) {
        let Some(mut stdout) = child.stdout.take() else {
            let _ = tx.send(Err(anyhow!("ffmpeg stdout was not captured")));
            return;
        };

        loop {
            let mut buffer = vec![0u8; frame_size];
            match stdout.read_exact(&mut buffer) {
                Ok(()) => {
                    if tx.send(Ok(buffer)).is_err() {
                        // Receiver dropped
                        let _ = child.kill();
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    let _ = tx.send(Err(anyhow!("Error reading from ffmpeg: {}", e)));
                    break;
                }
            }
        }

        match child.wait() {
            Ok(status) if !status.success() => {
                let _ = tx.send(Err(anyhow!("ffmpeg decoder exited with {}", status)));
            }
            Err(e) => warn!("Failed to wait for ffmpeg decoder: {}", e),
            _ => {}
        }
    }

    /// Next frame in presentation order, `None` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let data = match self.frame_rx.recv() {
            Ok(data) => data?,
            Err(_) => return Ok(None),
        };
        let pts = Timestamp::new(self.frame_index, self.info.time_base());
        self.frame_index += 1;
        Ok(Some(
            VideoFrame::from_data(self.info.width, self.info.height, data).with_pts(pts),
        ))
    }
}

/// Encodes RGB24 frames into a video file through `ffmpeg`.
pub struct FrameEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    out_path: PathBuf,
}

impl FrameEncoder {
    pub fn new(out_path: &Path, width: u32, height: u32, frame_rate: (i32, i32)) -> Result<Self> {
        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
        }

        let mut child = Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &format!("{}/{}", frame_rate.0, frame_rate.1)])
            .args(["-i", "pipe:0", "-an", "-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(out_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow!("failed to spawn ffmpeg (is it installed and on PATH?): {}", e))?;

        forward_stderr(&mut child, "ffmpeg encode");
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("failed to open ffmpeg stdin"))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            width,
            height,
            out_path: out_path.to_path_buf(),
        })
    }

    pub fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height || !frame.is_packed() {
            return Err(anyhow!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg encoder is already finalized"))?;
        stdin
            .write_all(&frame.data)
            .context("failed to write frame to ffmpeg stdin")
    }

    /// Closes the pipe and waits for ffmpeg to finish the file.
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdin.take());
        let status = self.child.wait().context("failed to wait for ffmpeg to finish")?;
        if !status.success() {
            return Err(anyhow!("ffmpeg encoder exited with {}", status));
        }
        info!("Wrote {:?}", self.out_path);
        Ok(())
    }
}

/// Logs a child's stderr lines from a background thread.
fn forward_stderr(child: &mut Child, name: &'static str) {
    let Some(mut stderr) = child.stderr.take() else {
        return;
    };
    thread::spawn(move || {
        let mut text = String::new();
        if stderr.read_to_string(&mut text).is_ok() {
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                error!("{}: {}", name, line);
            }
        }
    });
}
