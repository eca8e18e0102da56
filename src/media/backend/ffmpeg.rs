//! System `ffmpeg`/`ffprobe` backend.
//!
//! Each open track is one `ffmpeg` child process streaming raw frames (`rgba`) or PCM (`f32le`) to
//! stdout. Readers are positioned on the frame grid at or before the requested start, so the first
//! frame delivered always covers it.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use crate::foundation::core::{Fps, TrackKind};
use crate::foundation::error::{ClipfeedError, ClipfeedResult};
use crate::media::handle::{AudioChunk, VideoFrame};
use crate::media::track::{AudioFormat, MediaBackend, Pull, SourceInfo, TimedUnit, TrackReader};

/// Backend decoding through the `ffmpeg` command-line tools found on `PATH`.
#[derive(Debug, Default)]
pub struct FfmpegBackend {
    probes: Mutex<HashMap<String, SourceInfo>>,
}

impl FfmpegBackend {
    /// Create a backend with an empty probe cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn cached_probe(&self, asset: &str) -> ClipfeedResult<SourceInfo> {
        if let Ok(cache) = self.probes.lock()
            && let Some(info) = cache.get(asset)
        {
            return Ok(info.clone());
        }
        let info = probe_source(asset)?;
        if let Ok(mut cache) = self.probes.lock() {
            cache.insert(asset.to_owned(), info.clone());
        }
        Ok(info)
    }
}

impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn probe(&self, asset: &str) -> ClipfeedResult<SourceInfo> {
        self.cached_probe(asset)
    }

    fn open_video(
        &self,
        asset: &str,
        start_time: f64,
    ) -> ClipfeedResult<Box<dyn TrackReader<VideoFrame>>> {
        let info = self.cached_probe(asset)?;
        if !info.has_video {
            return Err(ClipfeedError::track_unavailable(TrackKind::Video));
        }
        let fps = info
            .fps
            .ok_or_else(|| ClipfeedError::open_failed("ffprobe reported no video frame rate"))?;
        Ok(Box::new(open_video_reader(asset, &info, fps, start_time)?))
    }

    fn open_audio(
        &self,
        asset: &str,
        start_time: f64,
        format: AudioFormat,
    ) -> ClipfeedResult<Box<dyn TrackReader<AudioChunk>>> {
        let info = self.cached_probe(asset)?;
        if !info.has_audio {
            return Err(ClipfeedError::track_unavailable(TrackKind::Audio));
        }
        Ok(Box::new(open_audio_reader(asset, start_time, format)?))
    }
}

/// Return `true` when `ffmpeg` and `ffprobe` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
fn parse_rational_fps(s: &str) -> Option<Fps> {
    let (num, den) = s.split_once('/').unwrap_or((s, "1"));
    Fps::new(num.trim().parse().ok()?, den.trim().parse().ok()?).ok()
}

#[cfg(feature = "media-ffmpeg")]
fn probe_source(asset: &str) -> ClipfeedResult<SourceInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        avg_frame_rate: Option<String>,
        sample_rate: Option<String>,
        channels: Option<u16>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(asset)
        .output()
        .map_err(|e| ClipfeedError::open_failed(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ClipfeedError::open_failed(format!(
            "ffprobe failed for '{asset}': {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ClipfeedError::serde(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let fps = video.and_then(|v| {
        v.r_frame_rate
            .as_deref()
            .and_then(parse_rational_fps)
            .or_else(|| v.avg_frame_rate.as_deref().and_then(parse_rational_fps))
    });
    let duration_secs = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    Ok(SourceInfo {
        has_video: video.is_some(),
        has_audio: audio.is_some(),
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        fps,
        duration_secs,
        audio_sample_rate: audio
            .and_then(|a| a.sample_rate.as_deref())
            .and_then(|r| r.parse().ok()),
        audio_channels: audio.and_then(|a| a.channels),
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
fn probe_source(_asset: &str) -> ClipfeedResult<SourceInfo> {
    Err(feature_disabled())
}

#[cfg(not(feature = "media-ffmpeg"))]
fn feature_disabled() -> ClipfeedError {
    ClipfeedError::open_failed("ffmpeg decoding requires the 'media-ffmpeg' feature")
}

/// Running `ffmpeg` child streaming decoded bytes on stdout.
#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
struct FfmpegPipe {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    closed: bool,
}

#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
impl FfmpegPipe {
    fn spawn(mut cmd: Command) -> ClipfeedResult<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            ClipfeedError::open_failed(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClipfeedError::open_failed("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClipfeedError::open_failed("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });
        Ok(Self {
            child,
            stdout: Some(stdout),
            stderr_drain: Some(stderr_drain),
            closed: false,
        })
    }

    /// Fill `buf` from stdout. Returns the number of bytes read, short only at end of stream.
    fn read_full(&mut self, buf: &mut [u8]) -> ClipfeedResult<usize> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(0);
        };
        let mut filled = 0;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(ClipfeedError::decode_failed(format!(
                        "failed to read ffmpeg output: {e}"
                    )));
                }
            }
        }
        Ok(filled)
    }

    fn take_stderr(&mut self) -> String {
        let bytes = self
            .stderr_drain
            .take()
            .and_then(|h| h.join().ok())
            .and_then(Result::ok)
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).trim().to_owned()
    }

    /// Wait for a child that reached end of stream and report a failing exit status.
    fn finish(&mut self) -> ClipfeedResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stdout = None;
        let status = self.child.wait().map_err(|e| {
            ClipfeedError::decode_failed(format!("failed to wait for ffmpeg: {e}"))
        })?;
        let stderr = self.take_stderr();
        if !status.success() {
            return Err(ClipfeedError::decode_failed(format!(
                "ffmpeg exited with status {status}: {stderr}"
            )));
        }
        Ok(())
    }

    fn kill(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stdout = None;
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = self.take_stderr();
    }
}

impl Drop for FfmpegPipe {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
struct FfmpegVideoReader {
    pipe: FfmpegPipe,
    fps: Fps,
    width: u32,
    height: u32,
    first_index: u64,
    emitted: u64,
    done: bool,
}

#[cfg(feature = "media-ffmpeg")]
fn open_video_reader(
    asset: &str,
    info: &SourceInfo,
    fps: Fps,
    start_time: f64,
) -> ClipfeedResult<FfmpegVideoReader> {
    if info.width == 0 || info.height == 0 {
        return Err(ClipfeedError::open_failed(format!(
            "video track of '{asset}' has zero dimensions"
        )));
    }
    let first_index = fps.frame_index_at(start_time);
    let snapped = fps.frame_time_secs(first_index);

    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-nostdin", "-ss", &format!("{snapped:.9}")])
        .arg("-i")
        .arg(asset)
        .args([
            "-map",
            "0:v:0",
            "-r",
            &format!("{}/{}", fps.num, fps.den),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ]);
    let pipe = FfmpegPipe::spawn(cmd)?;
    tracing::debug!(asset, snapped, first_index, "spawned ffmpeg video decoder");

    Ok(FfmpegVideoReader {
        pipe,
        fps,
        width: info.width,
        height: info.height,
        first_index,
        emitted: 0,
        done: false,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
fn open_video_reader(
    _asset: &str,
    _info: &SourceInfo,
    _fps: Fps,
    _start_time: f64,
) -> ClipfeedResult<FfmpegVideoReader> {
    Err(feature_disabled())
}

impl TrackReader<VideoFrame> for FfmpegVideoReader {
    fn pull_next(&mut self) -> ClipfeedResult<Pull<VideoFrame>> {
        if self.done {
            return Ok(Pull::EndOfTrack);
        }
        let expected = self.width as usize * self.height as usize * 4;
        let mut rgba8 = vec![0u8; expected];
        let got = self.pipe.read_full(&mut rgba8)?;
        if got < expected {
            self.done = true;
            self.pipe.finish()?;
            if got > 0 {
                return Err(ClipfeedError::decode_failed(format!(
                    "truncated video frame: got {got} bytes, expected {expected}"
                )));
            }
            return Ok(Pull::EndOfTrack);
        }

        let idx = self.first_index + self.emitted;
        self.emitted += 1;
        Ok(Pull::Unit(TimedUnit {
            source_time: self.fps.frame_time_secs(idx),
            duration: self.fps.frame_duration_secs(),
            payload: VideoFrame {
                width: self.width,
                height: self.height,
                rgba8,
            },
        }))
    }

    fn close(&mut self) {
        self.done = true;
        self.pipe.kill();
    }
}

#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
struct FfmpegAudioReader {
    pipe: FfmpegPipe,
    format: AudioFormat,
    start_time: f64,
    frames_read: u64,
    scratch: Vec<u8>,
    done: bool,
}

#[cfg(feature = "media-ffmpeg")]
fn open_audio_reader(
    asset: &str,
    start_time: f64,
    format: AudioFormat,
) -> ClipfeedResult<FfmpegAudioReader> {
    if format.sample_rate == 0 || format.channels == 0 {
        return Err(ClipfeedError::open_failed(
            "audio format must have non-zero sample rate and channels",
        ));
    }
    let start_time = start_time.max(0.0);
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-nostdin", "-ss", &format!("{start_time:.9}")])
        .arg("-i")
        .arg(asset)
        .args([
            "-vn",
            "-map",
            "0:a:0",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &format.channels.to_string(),
            "-ar",
            &format.sample_rate.to_string(),
            "pipe:1",
        ]);
    let pipe = FfmpegPipe::spawn(cmd)?;
    tracing::debug!(asset, start_time, "spawned ffmpeg audio decoder");

    let chunk_bytes =
        format.chunk_frames.max(1) as usize * usize::from(format.channels) * size_of::<f32>();
    Ok(FfmpegAudioReader {
        pipe,
        format,
        start_time,
        frames_read: 0,
        scratch: vec![0u8; chunk_bytes],
        done: false,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
fn open_audio_reader(
    _asset: &str,
    _start_time: f64,
    _format: AudioFormat,
) -> ClipfeedResult<FfmpegAudioReader> {
    Err(feature_disabled())
}

impl TrackReader<AudioChunk> for FfmpegAudioReader {
    fn pull_next(&mut self) -> ClipfeedResult<Pull<AudioChunk>> {
        if self.done {
            return Ok(Pull::EndOfTrack);
        }
        let got = self.pipe.read_full(&mut self.scratch)?;
        let frame_bytes = usize::from(self.format.channels) * size_of::<f32>();
        let usable = got - got % frame_bytes;
        if got < self.scratch.len() {
            self.done = true;
            self.pipe.finish()?;
        }
        if usable == 0 {
            self.done = true;
            return Ok(Pull::EndOfTrack);
        }

        let interleaved_f32: Vec<f32> = self.scratch[..usable]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let frames = (usable / frame_bytes) as u64;
        let rate = f64::from(self.format.sample_rate);
        let source_time = self.start_time + (self.frames_read as f64) / rate;
        self.frames_read += frames;

        Ok(Pull::Unit(TimedUnit {
            source_time,
            duration: (frames as f64) / rate,
            payload: AudioChunk {
                sample_rate: self.format.sample_rate,
                channels: self.format.channels,
                interleaved_f32,
            },
        }))
    }

    fn close(&mut self) {
        self.done = true;
        self.pipe.kill();
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/media/ffmpeg.rs"]
mod tests;
