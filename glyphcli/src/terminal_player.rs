use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, SetTitle},
};
use glyphcast::{
    capture::CaptureState,
    error::Error,
    export::{ExportFormat, ExportOutcome, ExportRequest},
    player::LoopState,
    render::RasterFactory,
    session::Session,
};
use std::{
    io::{Result as IOResult, Write, stdout},
    path::PathBuf,
    time::Duration,
};

/// Shows the live transcript in the terminal and maps keys to session
/// operations.
#[derive(Debug)]
pub struct TerminalPlayer {
    fg_color: Color,
    bg_color: Color,
    title: String,
    out_dir: PathBuf,
    scale: u32,
}

#[derive(PartialEq, Eq, Debug)]
enum Control {
    None,
    Exit,
    Redraw,
    Fidelity(i32),
    Export(ExportFormat),
}

impl TerminalPlayer {
    pub fn new(title: String, out_dir: PathBuf, scale: u32) -> Self {
        Self {
            fg_color: Color::White,
            bg_color: Color::Black,
            title,
            out_dir,
            scale,
        }
    }

    pub fn init(&mut self) -> Result<(), Error> {
        execute!(stdout(), EnterAlternateScreen, SetTitle(&self.title))?;
        terminal::enable_raw_mode()?;
        self.clear()?;
        Ok(())
    }

    pub fn callback(&self) -> impl FnMut(LoopState<'_, RasterFactory>) -> bool + '_ {
        let mut status = String::from("q quit  +/- fidelity  i png  t text  v record");
        move |LoopState { tick, session }| {
            match self.poll_events() {
                Control::Exit => {
                    match session.stop_recording() {
                        Ok(Some(artifact)) => log::info!("{}", self.save(&artifact)),
                        Ok(None) => {}
                        Err(err) => log::warn!("{err}"),
                    }
                    return false;
                }
                Control::Redraw => {
                    let _ = self.clear();
                    let _ = self.draw(session, &status);
                }
                Control::Fidelity(delta) => {
                    let step = session.fidelity().saturating_add_signed(delta).max(1);
                    session.set_fidelity(step);
                    status = format!("fidelity {step}");
                }
                Control::Export(format) => {
                    status = self.export(session, format);
                    let _ = self.draw(session, &status);
                }
                Control::None => {}
            }

            match tick {
                Some(Ok(report)) => {
                    if let Some(artifact) = report.artifact {
                        status = self.save(&artifact);
                    }
                    if report.rendered {
                        let _ = self.draw(session, &status);
                    }
                }
                Some(Err(err)) => {
                    log::error!("{err}");
                    status = err.to_string();
                }
                None => {}
            }

            true
        }
    }

    fn export(&self, session: &mut Session<RasterFactory>, format: ExportFormat) -> String {
        match session.export(ExportRequest::new(format, self.scale)) {
            Ok(ExportOutcome::Raster(artifact) | ExportOutcome::Video(artifact)) => {
                self.save(&artifact)
            }
            Ok(ExportOutcome::RecordingStarted) => "recording...".to_string(),
            Ok(ExportOutcome::TranscriptDelivered) => "transcript written".to_string(),
            Ok(ExportOutcome::Skipped) => "nothing to export yet".to_string(),
            Err(err) => err.to_string(),
        }
    }

    fn save(&self, artifact: &glyphcast::export::Artifact) -> String {
        match artifact.save_in(&self.out_dir) {
            Ok(path) => format!("wrote {}", path.display()),
            Err(err) => err.to_string(),
        }
    }

    fn clear(&self) -> IOResult<()> {
        execute!(
            stdout(),
            Clear(ClearType::All),
            Hide,
            SetForegroundColor(self.fg_color),
            SetBackgroundColor(self.bg_color),
            MoveTo(0, 0),
        )?;
        stdout().flush()?;
        Ok(())
    }

    fn cleanup(&self) -> IOResult<()> {
        // Restore terminal state
        execute!(
            stdout(),
            ResetColor,
            Clear(ClearType::All),
            Show,
            LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    fn poll_events(&self) -> Control {
        if event::poll(Duration::from_millis(1)).is_ok_and(|r| r) {
            let Ok(ev) = event::read() else {
                return Control::None;
            };

            return match ev {
                Event::Key(KeyEvent {
                    kind: KeyEventKind::Release,
                    ..
                }) => Control::None,
                Event::Key(KeyEvent {
                    code: KeyCode::Char('q') | KeyCode::Char('Q'),
                    ..
                })
                | Event::Key(KeyEvent {
                    code: KeyCode::Char('c') | KeyCode::Char('C'),
                    modifiers: event::KeyModifiers::CONTROL,
                    ..
                })
                | Event::Key(KeyEvent {
                    code: KeyCode::Esc, ..
                }) => Control::Exit,
                Event::Key(KeyEvent {
                    code: KeyCode::Char('+') | KeyCode::Char('='),
                    ..
                }) => Control::Fidelity(1),
                Event::Key(KeyEvent {
                    code: KeyCode::Char('-'),
                    ..
                }) => Control::Fidelity(-1),
                Event::Key(KeyEvent {
                    code: KeyCode::Char('i'),
                    ..
                }) => Control::Export(ExportFormat::Png),
                Event::Key(KeyEvent {
                    code: KeyCode::Char('t'),
                    ..
                }) => Control::Export(ExportFormat::Text),
                Event::Key(KeyEvent {
                    code: KeyCode::Char('v'),
                    ..
                }) => Control::Export(ExportFormat::Webm),
                Event::Resize(_, _) => Control::Redraw,
                _ => Control::None,
            };
        }

        Control::None
    }

    /// Prints the transcript clipped to the terminal, with a status line.
    fn draw(&self, session: &Session<RasterFactory>, status: &str) -> IOResult<()> {
        let (cols, rows) = terminal::size()?;
        let (cols, rows) = (cols as usize, rows.saturating_sub(1));
        let mut out = stdout();

        let mut drawn = 0;
        for (y, line) in session.transcript().lines().take(rows as usize).enumerate() {
            let line: String = line.chars().take(cols).collect();
            queue!(
                out,
                MoveTo(0, y as u16),
                Print(line),
                Clear(ClearType::UntilNewLine)
            )?;
            drawn = y as u16 + 1;
        }
        queue!(out, MoveTo(0, drawn), Clear(ClearType::FromCursorDown))?;

        let recording = if session.capture_state() == CaptureState::Recording {
            "[REC] "
        } else {
            ""
        };
        let status: String = format!("{recording}{status}").chars().take(cols).collect();
        queue!(
            out,
            MoveTo(0, rows),
            Clear(ClearType::CurrentLine),
            Print(status),
            MoveTo(0, 0)
        )?;
        out.flush()
    }
}

impl Drop for TerminalPlayer {
    fn drop(&mut self) {
        if let Err(err) = self.cleanup() {
            log::error!("failed to clean up terminal: {err}");
        }
    }
}
