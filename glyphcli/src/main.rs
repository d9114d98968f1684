use clap::{Parser, ValueEnum};
use glyphcast::config::Settings;
use glyphcast::encode::FfmpegEncoderFactory;
use glyphcast::error::Error;
use glyphcast::export::{ExportFormat, ExportOutcome, ExportRequest, FileSink, WriterSink};
use glyphcast::maps::CharMap;
use glyphcast::player::RefreshLoop;
use glyphcast::render::{RasterFactory, load_font};
use glyphcast::session::Session;
use std::path::{Path, PathBuf};

mod terminal_player;
use crate::terminal_player::TerminalPlayer;

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Play or Export
    #[arg(value_enum, required = true)]
    action: Action,
    /// Image or video to render
    #[arg(required = true)]
    input: PathBuf,
    /// Directory artifacts are written to
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Settings file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Step size in pixels
    #[arg(short, long)]
    fidelity: Option<u32>,
    /// Named character map
    #[arg(short, long)]
    char_map: Option<String>,
    /// Custom density ramp, overrides --char-map
    #[arg(short, long)]
    density: Option<String>,
    /// Export format
    #[arg(long, value_enum, default_value_t = Format::Png)]
    format: Format,
    /// Raster export scale factor
    #[arg(short, long)]
    scale: Option<u32>,
    /// Font used to draw glyphs
    #[arg(long)]
    font: Option<PathBuf>,
    /// Force the preview refresh rate. Recordings always use the configured
    /// capture fps
    #[arg(long)]
    fps: Option<f64>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[clap(rename_all = "lower")]
enum Action {
    Export,
    Play,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
#[clap(rename_all = "lower")]
enum Format {
    Png,
    Jpg,
    Text,
    Webm,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Png => ExportFormat::Png,
            Format::Jpg => ExportFormat::Jpeg,
            Format::Text => ExportFormat::Text,
            Format::Webm => ExportFormat::Webm,
        }
    }
}

fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::parse();

    let settings = settings(&args)?;

    match args.action {
        Action::Export => export(&args, &settings),
        Action::Play => play(&args, &settings),
    }
}

/// Settings file values with command line overrides applied.
fn settings(args: &Args) -> Result<Settings, Error> {
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(fidelity) = args.fidelity {
        settings.render.fidelity = fidelity;
    }
    if let Some(name) = &args.char_map {
        let map = CharMap::preset(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::Config(format!("unknown char map '{name}'")))?;
        settings.render.density = map.as_str().to_string();
    }
    if let Some(density) = &args.density {
        settings.render.density = density.clone();
    }
    if let Some(scale) = args.scale {
        settings.export.scale = scale;
    }
    if args.font.is_some() {
        settings.render.font = args.font.clone();
    }
    settings.validate()?;
    Ok(settings)
}

fn raster_factory(settings: &Settings) -> Result<RasterFactory, Error> {
    let font = load_font(settings.render.font.as_deref())?;
    Ok(RasterFactory::new(font, settings.render.palette()))
}

fn export(args: &Args, settings: &Settings) -> Result<(), Error> {
    let format = ExportFormat::from(args.format);
    let out_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let sink: Box<dyn glyphcast::export::TranscriptSink> = match &args.output {
        Some(dir) => Box::new(FileSink::new(dir, &settings.export.prefix)),
        None => Box::new(WriterSink::new(std::io::stdout())),
    };
    let mut session = Session::new(
        settings,
        raster_factory(settings)?,
        Box::new(FfmpegEncoderFactory),
        sink,
    );

    session.load_path(&args.input)?;
    if session.media_kind().is_none() {
        log::warn!("nothing to export from {}", args.input.display());
        return Ok(());
    }
    session.tick()?;

    let request = ExportRequest::new(format, settings.export.scale);
    match session.export(request)? {
        ExportOutcome::RecordingStarted => {
            log::info!("recording one pass of {}", args.input.display());
            loop {
                if let Some(artifact) = session.tick()?.artifact {
                    save(&artifact, &out_dir)?;
                    break;
                }
            }
        }
        ExportOutcome::Raster(artifact) | ExportOutcome::Video(artifact) => {
            save(&artifact, &out_dir)?;
        }
        ExportOutcome::TranscriptDelivered => {}
        ExportOutcome::Skipped => log::warn!("nothing rendered, export skipped"),
    }
    Ok(())
}

fn save(artifact: &glyphcast::export::Artifact, dir: &Path) -> Result<(), Error> {
    let path = artifact.save_in(dir)?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn play(args: &Args, settings: &Settings) -> Result<(), Error> {
    let out_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut session = Session::new(
        settings,
        raster_factory(settings)?,
        Box::new(FfmpegEncoderFactory),
        Box::new(FileSink::new(&out_dir, &settings.export.prefix)),
    );
    session.load_path(&args.input)?;
    if session.media_kind().is_none() {
        log::warn!("nothing to play from {}", args.input.display());
        return Ok(());
    }

    let refresh = RefreshLoop::for_session(&session, args.fps);
    let mut term = TerminalPlayer::new(
        format!("glyphcli - {}", args.input.display()),
        out_dir,
        settings.export.scale,
    );
    term.init()?;
    refresh.run(&mut session, term.callback());
    Ok(())
}
