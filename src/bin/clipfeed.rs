use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use clipfeed::{
    Composition, CompositionExtractor, DecodeMode, DecoderOpts, ExtractorOpts, FfmpegBackend, Fps,
    ItemDecoder, MediaBackend, SyntheticAsset, SyntheticBackend,
};

#[derive(Parser, Debug)]
#[command(name = "clipfeed", version)]
struct Cli {
    /// Log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tracks of a media file (requires `ffprobe` on PATH).
    Probe(ProbeArgs),
    /// Walk a composition at a fixed rate and print what every item shows.
    Scan(ScanArgs),
    /// Decode one item frame as a PNG.
    Frame(FrameArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Media file to inspect.
    path: PathBuf,
}

#[derive(clap::Args, Debug)]
struct BackendArgs {
    /// Decode generated test patterns instead of the referenced files.
    #[arg(long, default_value_t = false)]
    synthetic: bool,
}

#[derive(Parser, Debug)]
struct ScanArgs {
    /// Input composition JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output frame rate as `num` or `num/den`.
    #[arg(long, default_value = "30")]
    fps: String,

    /// Decode items in parallel.
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Override rayon worker threads (parallel mode only).
    #[arg(long)]
    threads: Option<usize>,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input composition JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Item id.
    #[arg(long)]
    item: String,

    /// Composition time in seconds.
    #[arg(long)]
    time: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    backend: BackendArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Probe(args) => cmd_probe(args),
        Command::Scan(args) => cmd_scan(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let path = args.path.to_string_lossy();
    let info = FfmpegBackend::new()
        .probe(&path)
        .with_context(|| format!("probe '{path}'"))?;
    let out = serde_json::json!({
        "path": path,
        "has_video": info.has_video,
        "has_audio": info.has_audio,
        "width": info.width,
        "height": info.height,
        "fps": info.fps.map(|f| format!("{}/{}", f.num, f.den)),
        "duration_secs": info.duration_secs,
        "audio_sample_rate": info.audio_sample_rate,
        "audio_channels": info.audio_channels,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_scan(args: ScanArgs) -> anyhow::Result<()> {
    let comp = Composition::from_path(&args.in_path)?;
    let fps = parse_fps(&args.fps)?;
    let backend = make_backend(&comp, &args.backend)?;

    let mut opts = ExtractorOpts::default().with_parallel(args.parallel);
    if let Some(n) = args.threads {
        opts = opts.with_threads(n);
    }
    let mut extractor = CompositionExtractor::new(comp, backend, opts)?;

    let stats = clipfeed::run_export(
        &mut extractor,
        fps,
        |frame| {
            let items: BTreeMap<_, _> = frame
                .frames
                .iter()
                .map(|(id, f)| (id.clone(), f.source_time()))
                .collect();
            let line = serde_json::json!({
                "index": frame.index,
                "time": frame.time,
                "items": items,
                "audio_frames": frame.audio.as_ref().map_or(0, |a| a.frame_count()),
            });
            println!("{line}");
            Ok(())
        },
        |p| tracing::debug!(done = p.frames_completed, total = p.frame_count, "scan progress"),
    )?;

    eprintln!(
        "scanned {} frames ({} with video, {} audio sample frames)",
        stats.frames_total, stats.frames_with_video, stats.audio_sample_frames
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let comp = Composition::from_path(&args.in_path)?;
    comp.validate()?;
    let item = comp
        .item(&args.item)
        .cloned()
        .with_context(|| format!("no item '{}' in composition", args.item))?;
    let backend = make_backend(&comp, &args.backend)?;

    let mut decoder = ItemDecoder::new(item, backend, DecoderOpts::for_mode(DecodeMode::Offline))?;
    decoder.seek_to(args.time)?;
    let frame = decoder
        .acquire_frame_for_time(args.time, true)
        .with_context(|| format!("item '{}' shows no frame at {}s", args.item, args.time))?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        frame.as_bytes(),
        frame.width(),
        frame.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} (source time {:.3}s)",
        args.out.display(),
        frame.source_time()
    );
    Ok(())
}

fn parse_fps(s: &str) -> anyhow::Result<Fps> {
    let (num, den) = match s.split_once('/') {
        Some((n, d)) => (n.trim().parse::<u32>()?, d.trim().parse::<u32>()?),
        None => (s.trim().parse::<u32>()?, 1),
    };
    Ok(Fps::new(num, den)?)
}

fn make_backend(comp: &Composition, args: &BackendArgs) -> anyhow::Result<Arc<dyn MediaBackend>> {
    if args.synthetic {
        let fps = Fps::new(30, 1)?;
        let mut lengths: BTreeMap<&str, f64> = BTreeMap::new();
        for item in comp.items() {
            let len = lengths.entry(item.path.as_str()).or_insert(0.0);
            *len = len.max(item.source_end());
        }
        let backend = lengths
            .into_iter()
            .fold(SyntheticBackend::new(), |b, (path, len)| {
                b.with_asset(path, SyntheticAsset::video(len, fps).with_audio(44_100, 2))
            });
        return Ok(Arc::new(backend));
    }
    if !cfg!(feature = "media-ffmpeg") {
        anyhow::bail!("built without the `media-ffmpeg` feature; pass --synthetic");
    }
    if !clipfeed::is_ffmpeg_on_path() {
        anyhow::bail!("ffmpeg and ffprobe are required but were not found on PATH");
    }
    Ok(Arc::new(FfmpegBackend::new()))
}
