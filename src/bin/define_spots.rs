//! define_spots - build the monitored spot list from pointer input
//!
//! Reads one command per line from stdin:
//!
//! ```text
//! down X Y            press at (X, Y)
//! up X Y              release at (X, Y); completes a spot
//! box X1 Y1 X2 Y2     press + release in one line
//! undo                remove the last spot
//! list                print the current spots
//! done                save and exit (EOF does the same)
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use parking_monitor::annotate::{annotate_frame, encode_jpeg};
use parking_monitor::config::SourceSettings;
use parking_monitor::ingest::open_source;
use parking_monitor::{OccupancyVector, PointerEvent, SpotDrawer, SpotSet};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Spots file to write.
    #[arg(long, env = "PARKING_SPOTS_PATH", default_value = "spots.json")]
    out: PathBuf,
    /// Start from the spots already in `--out`.
    #[arg(long)]
    append: bool,
    /// Frame source to draw a preview from (stub://, directory, http://).
    #[arg(long)]
    source: Option<String>,
    /// Where to write the preview JPEG when `--source` is given.
    #[arg(long, default_value = "spots_preview.jpg")]
    preview: PathBuf,
}

#[derive(Debug, PartialEq)]
enum Command {
    Pointer(PointerEvent),
    Box([f32; 4]),
    Undo,
    List,
    Done,
}

fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let numbers = parts
        .map(|p| p.parse::<f32>().map_err(|_| anyhow!("not a number: {}", p)))
        .collect::<Result<Vec<f32>>>()?;
    let command = match (verb, numbers.as_slice()) {
        ("down", [x, y]) => Command::Pointer(PointerEvent::Press { x: *x, y: *y }),
        ("up", [x, y]) => Command::Pointer(PointerEvent::Release { x: *x, y: *y }),
        ("box", [x1, y1, x2, y2]) => Command::Box([*x1, *y1, *x2, *y2]),
        ("undo", []) => Command::Undo,
        ("list", []) => Command::List,
        ("done", []) => Command::Done,
        _ => return Err(anyhow!("unrecognised command: {}", line.trim())),
    };
    Ok(Some(command))
}

fn print_spots(out: &mut impl Write, spots: &SpotSet) -> Result<()> {
    for spot in spots.iter() {
        writeln!(
            out,
            "#{}: [{}, {}, {}, {}]",
            spot.index, spot.bbox.x1, spot.bbox.y1, spot.bbox.x2, spot.bbox.y2
        )?;
    }
    writeln!(out, "{} spots", spots.len())?;
    Ok(())
}

fn write_preview(url: &str, spots: &SpotSet, path: &Path) -> Result<()> {
    let settings = SourceSettings {
        url: url.to_string(),
        ..SourceSettings::default()
    };
    let mut source = open_source(&settings)?;
    source.connect()?;
    let frame = source
        .next_frame()?
        .ok_or_else(|| anyhow!("source {} produced no frame", url))?;
    source.close()?;

    let vacant = OccupancyVector::new(vec![false; spots.len()]);
    let image = annotate_frame(&frame, spots, &vacant)?;
    std::fs::write(path, encode_jpeg(&image, 90)?)
        .with_context(|| format!("failed to write preview {}", path.display()))?;
    log::info!("preview written to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let initial = if args.append && args.out.exists() {
        SpotSet::load(&args.out)?
    } else {
        SpotSet::new()
    };
    log::info!("defining spots ({} existing)", initial.len());
    let mut drawer = SpotDrawer::new(initial);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("read stdin")?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("{}", e);
                continue;
            }
        };
        match command {
            Command::Pointer(event) => {
                if let Some(index) = drawer.handle(event) {
                    writeln!(stdout, "added spot #{}", index)?;
                }
            }
            Command::Box([x1, y1, x2, y2]) => {
                drawer.handle(PointerEvent::Press { x: x1, y: y1 });
                if let Some(index) = drawer.handle(PointerEvent::Release { x: x2, y: y2 }) {
                    writeln!(stdout, "added spot #{}", index)?;
                }
            }
            Command::Undo => match drawer.undo() {
                Some(spot) => writeln!(stdout, "removed spot #{}", spot.index)?,
                None => writeln!(stdout, "no spots to remove")?,
            },
            Command::List => print_spots(&mut stdout, drawer.spots())?,
            Command::Done => break,
        }
    }

    let spots = drawer.finish();
    spots.save(&args.out)?;
    log::info!("saved {} spots to {}", spots.len(), args.out.display());

    if let Some(url) = &args.source {
        write_preview(url, &spots, &args.preview)?;
    }
    Ok(())
}
