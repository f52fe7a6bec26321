use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::mpsc;
use tokio::sync::watch;
use tracing::info;

use vidupe::cache::{AnalysisCache, YearSource};
use vidupe::config::Config;
use vidupe::db::Database;
use vidupe::detect::{DetectionStatus, Detector, DuplicateGroup};
use vidupe::export::{export_groups, format_size, ExportFormat};
use vidupe::library::AssetStore;
use vidupe::media::{FfmpegSampler, PerceptualHashExtractor};
use vidupe::scanner::{ScanProgress, Scanner};
use vidupe::{logging, results};

enum Command {
    Scan(PathBuf),
    Detect { include_visual: Option<bool> },
    Groups,
    Export { path: PathBuf, format: Option<ExportFormat> },
    Delete(Vec<String>),
    Favorite { id: String, favorite: bool },
    SetDate { id: String, date: NaiveDate },
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut no_visual = false;
    let mut format = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("vidupe {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    fail("--config requires a path argument");
                }
            }
            "--format" | "-f" => {
                if i + 1 < args.len() {
                    match ExportFormat::parse(&args[i + 1]) {
                        Ok(f) => format = Some(f),
                        Err(e) => fail(&e.to_string()),
                    }
                    i += 1;
                } else {
                    fail("--format requires json or csv");
                }
            }
            "--no-visual" => no_visual = true,
            arg if arg.starts_with('-') => fail(&format!("Unknown argument: {}", arg)),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.split_first() {
        Some((cmd, rest)) => match (cmd.as_str(), rest) {
            ("scan", [dir]) => Command::Scan(PathBuf::from(dir)),
            ("detect", []) => Command::Detect {
                include_visual: no_visual.then_some(false),
            },
            ("groups", []) => Command::Groups,
            ("export", [path]) => Command::Export {
                path: PathBuf::from(path),
                format,
            },
            ("delete", ids) if !ids.is_empty() => Command::Delete(ids.to_vec()),
            ("favorite", [id, flag]) => match flag.as_str() {
                "on" | "true" | "yes" => Command::Favorite {
                    id: id.clone(),
                    favorite: true,
                },
                "off" | "false" | "no" => Command::Favorite {
                    id: id.clone(),
                    favorite: false,
                },
                other => fail(&format!("Expected on or off, got {}", other)),
            },
            ("set-date", [id, date]) => match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                Ok(date) => Command::SetDate { id: id.clone(), date },
                Err(_) => fail(&format!("Expected a YYYY-MM-DD date, got {}", date)),
            },
            _ => fail(&format!("Invalid usage of '{}'", cmd)),
        },
        None => {
            print_help();
            std::process::exit(1);
        }
    };

    Args { config_path, command }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("Run 'vidupe --help' for usage.");
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"vidupe - find duplicate videos in a library

USAGE:
    vidupe [OPTIONS] <COMMAND>

COMMANDS:
    scan DIR                   Catalog the videos under DIR
    detect [--no-visual]       Group duplicates and store the result
    groups                     Show the stored duplicate groups
    export PATH [--format F]   Write the stored groups as json or csv
    delete ID...               Delete videos from disk and the catalog
    favorite ID on|off         Mark or unmark a video as favorite
    set-date ID YYYY-MM-DD     Set a video's creation date

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    VIDUPE_CONFIG       Path to config file (overrides default location)
    VIDUPE_LOG          Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/vidupe/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(None);

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let mut db = open_database(&config)?;

    match args.command {
        Command::Scan(dir) => scan(config, db, dir).await,
        Command::Detect { include_visual } => {
            drop(db);
            let include_visual = include_visual.unwrap_or(config.detection.include_visual_similarity);
            detect(config, include_visual).await
        }
        Command::Groups => show_groups(&db),
        Command::Export { path, format } => {
            let Some(snapshot) = results::load(&db, &db)? else {
                bail!("No detection results yet; run 'vidupe detect' first");
            };
            let format = format.unwrap_or_else(|| ExportFormat::from_path(&path));
            let path = if path.extension().is_none() {
                path.with_extension(format.extension())
            } else {
                path
            };
            let count = export_groups(&snapshot, &db, &path, format)?;
            println!("Exported {} groups as {} to {}", count, format.name(), path.display());
            Ok(())
        }
        Command::Delete(ids) => delete(&mut db, &ids),
        Command::Favorite { id, favorite } => {
            db.set_favorite(&id, favorite)?;
            println!("{} {}", if favorite { "Favorited" } else { "Unfavorited" }, id);
            Ok(())
        }
        Command::SetDate { id, date } => set_date(&mut db, &id, date),
    }
}

fn open_database(config: &Config) -> Result<Database> {
    let db = Database::open(config.db_path())
        .with_context(|| format!("Failed to open {}", config.db_path().display()))?;
    db.initialize()?;
    Ok(db)
}

async fn scan(config: Config, db: Database, dir: PathBuf) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || {
        for progress in rx {
            match progress {
                ScanProgress::Started { total_files } => println!("Found {} videos", total_files),
                ScanProgress::Scanning { current, total, path } => println!("[{}/{}] {}", current, total, path),
                ScanProgress::Error { message } => eprintln!("{}", message),
                ScanProgress::Completed { .. } => {}
            }
        }
    });

    let result = tokio::task::spawn_blocking(move || -> Result<_> {
        let scanner = Scanner::new(config);
        let result = scanner.scan_directory(&dir, &db, Some(tx))?;
        if !result.removed.is_empty() {
            forget(&db, &result.removed)?;
        }
        Ok(result)
    })
    .await??;
    let _ = printer.join();

    println!(
        "Scanned {} videos: {} new, {} updated, {} unchanged, {} removed",
        result.total_found,
        result.new,
        result.updated,
        result.unchanged,
        result.removed.len()
    );
    Ok(())
}

async fn detect(config: Config, include_visual: bool) -> Result<()> {
    let (status_tx, mut status_rx) = watch::channel(DetectionStatus::default());

    let printer = tokio::spawn(async move {
        let mut last = String::new();
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            let line = format!("[{:>3}%] {}", status.percent(), status.step_description);
            if line != last {
                println!("{}", line);
                last = line;
            }
        }
    });

    let groups = tokio::task::spawn_blocking(move || -> Result<Vec<DuplicateGroup>> {
        let db = open_database(&config)?;
        let sampler = FfmpegSampler::new(&config.library.ffmpeg);
        let extractor = PerceptualHashExtractor::new(config.detection.hash_size);

        let mut cache = AnalysisCache::load(&db)?;
        let assets = db.list()?;
        let detector = Detector::new(config.detection.clone(), &db, &db, &sampler, &extractor)
            .with_results(&db)
            .with_status(status_tx);
        Ok(detector.detect(&mut cache, &assets, include_visual)?)
    })
    .await??;
    let _ = printer.await;

    print_groups(&groups);
    Ok(())
}

fn show_groups(db: &Database) -> Result<()> {
    match results::load(db, db)? {
        Some(snapshot) => {
            println!("Scan of {}", snapshot.scan_date.format("%Y-%m-%d %H:%M"));
            print_groups(&snapshot.groups);
            for group in &snapshot.groups {
                println!();
                println!("{} {} (score {:.1})", group.id, group.similarity_type.display_name(), group.score);
                for id in &group.members {
                    let size = db.metadata(id)?.map(|m| format_size(m.file_size)).unwrap_or_default();
                    println!("    {}  {}", id, size);
                }
            }
        }
        None => println!("No detection results yet; run 'vidupe detect' first"),
    }
    Ok(())
}

fn print_groups(groups: &[DuplicateGroup]) {
    let videos: usize = groups.iter().map(|g| g.len()).sum();
    println!("{} duplicate groups covering {} videos", groups.len(), videos);
}

fn delete(db: &mut Database, ids: &[String]) -> Result<()> {
    let deleted = db.delete(ids)?;
    forget(db, ids)?;
    info!("Deleted {} videos", deleted);
    println!("Deleted {} of {} videos", deleted, ids.len());
    Ok(())
}

/// Drop cached facts and stored group memberships of removed videos.
fn forget(db: &Database, ids: &[String]) -> Result<()> {
    let mut cache = AnalysisCache::load(db)?;
    cache.forget(ids);
    cache.flush(db)?;
    let dropped = results::remove_from_snapshot(db, ids)?;
    if dropped > 0 {
        info!("Dropped {} groups left with a single video", dropped);
    }
    Ok(())
}

fn set_date(db: &mut Database, id: &str, date: NaiveDate) -> Result<()> {
    let created_at = date.and_hms_opt(12, 0, 0).map(|dt| dt.and_utc()).unwrap_or_else(Utc::now);
    db.set_creation_date(id, created_at)?;

    let mut cache = AnalysisCache::load(db)?;
    let updated = cache.set(id, |facts| {
        facts.estimated_year = Some(created_at.year());
        facts.year_source = Some(YearSource::Metadata);
    });
    if updated {
        cache.flush(db)?;
    }

    println!("Set creation date of {} to {}", id, date);
    Ok(())
}
