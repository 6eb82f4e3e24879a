//! formula-overlay - typeset the formulas of a text file and show the result.
//!
//! # Usage
//!
//! ```bash
//! formula-overlay notes.md
//! formula-overlay --cursor 3:12 notes.md
//! formula-overlay --renderer threaded --perf notes.md
//! ```

use std::io::{Write, stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;

use formula_overlay::config::{
    ConfigFlags, OverlayConfig, RendererKind, clear_config_flags, global_config_path,
    load_config_flags, local_override_path, parse_flag_tokens, save_config_flags,
};
use formula_overlay::editor::{EditorBuffer, Segment};
use formula_overlay::host::Renderer;
use formula_overlay::overlay::{DisplayMode, MathOverlay};
use formula_overlay::perf;
use formula_overlay::position::Position;
use formula_overlay::render::{FifoRenderer, PlainTypesetter, ThreadedRenderer};

/// Give up on a renderer that stops making progress.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Typeset the formulas in a text file and print it with them substituted
#[derive(Parser, Debug)]
#[command(name = "formula-overlay", version, about, long_about = None)]
struct Cli {
    /// Text file to render
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Place the cursor before rendering (LINE:COL, zero-based)
    #[arg(long, value_name = "LINE:COL")]
    cursor: Option<Position>,

    /// Where typesetting runs
    #[arg(long, value_enum)]
    renderer: Option<RendererKind>,

    /// Watchdog interval in milliseconds
    #[arg(long, value_name = "MS")]
    watchdog_ms: Option<u64>,

    /// Log timing of scans and flushes
    #[arg(long)]
    perf: bool,

    /// Print without terminal styling
    #[arg(long)]
    no_color: bool,

    /// Write detailed render events to a file
    #[arg(long, value_name = "PATH")]
    render_debug_log: Option<PathBuf>,

    /// Save current command-line flags as defaults
    #[arg(long)]
    save: bool,

    /// Clear saved defaults
    #[arg(long)]
    clear: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    perf::set_enabled(effective.perf);
    if let Err(err) = perf::set_debug_log_path(effective.render_debug_log.as_deref()) {
        tracing::warn!(
            path = ?effective.render_debug_log,
            %err,
            "failed to open render debug log"
        );
    }

    let text = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let mut buffer = EditorBuffer::from_text(&text);
    if let Some(cursor) = cli.cursor {
        buffer.move_to(cursor.line, cursor.col);
    }

    let config = OverlayConfig::from_flags(&effective);
    let report = match effective.renderer.unwrap_or(RendererKind::Fifo) {
        RendererKind::Fifo => run(buffer, FifoRenderer::new(), &config, |renderer| {
            renderer.resolve_all();
        })?,
        RendererKind::Threaded => {
            let renderer = ThreadedRenderer::spawn(PlainTypesetter)
                .context("Failed to start render worker")?;
            run(buffer, renderer, &config, |renderer| {
                renderer.wait_idle(Duration::from_millis(50));
            })?
        }
    };

    print_overlay(&report, !effective.no_color).context("Failed to write output")
}

struct Report {
    buffer: EditorBuffer,
    rows: Vec<String>,
}

/// Render everything, then pump the engine until the renderer is idle.
fn run<R: Renderer>(
    buffer: EditorBuffer,
    renderer: R,
    config: &OverlayConfig,
    mut advance: impl FnMut(&mut R),
) -> Result<Report> {
    let mut engine = MathOverlay::initialize(buffer, renderer, config);
    engine.render_all();

    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        engine.pump(Instant::now());
        if engine.renderer().is_idle() {
            break;
        }
        if Instant::now() >= deadline {
            anyhow::bail!("renderer did not settle within {SETTLE_TIMEOUT:?}");
        }
        advance(engine.renderer_mut());
    }
    engine.flush();

    let rows = engine
        .regions()
        .map(|region| {
            let range = engine
                .region_range(region.id())
                .map_or_else(|| "-".to_string(), |range| range.to_string());
            format!(
                "{:<12} {:<12} {:<12} {}",
                region.id().to_string(),
                range,
                region.state().to_string(),
                region.source()
            )
        })
        .collect();
    let (buffer, _renderer) = engine.shutdown();
    Ok(Report { buffer, rows })
}

fn print_overlay(report: &Report, color: bool) -> std::io::Result<()> {
    let mut out = stdout().lock();
    for line in 0..report.buffer.line_count() {
        for segment in report.buffer.display_line(line) {
            match segment {
                Segment::Text(text) => write!(out, "{text}")?,
                Segment::Formula(formula) if !color => write!(out, "{}", formula.text)?,
                Segment::Formula(formula) => match formula.mode() {
                    DisplayMode::Inline => write!(out, "{}", formula.text.cyan())?,
                    DisplayMode::Display => write!(out, "{}", formula.text.cyan().bold())?,
                },
            }
        }
        writeln!(out)?;
    }

    writeln!(out)?;
    let header = format!("{:<12} {:<12} {:<12} {}", "REGION", "RANGE", "STATE", "SOURCE");
    if color {
        writeln!(out, "{}", header.bold())?;
    } else {
        writeln!(out, "{header}")?;
    }
    for row in &report.rows {
        writeln!(out, "{row}")?;
    }
    out.flush()
}
