use anyhow::{Context, Result};
use behavior_ingest::annotation::AnnotationOrigin;
use behavior_ingest::db::models::{Model, SessionBehaviorStat, SessionMetadata, SessionStatus};
use behavior_ingest::db::{Database, InsertMode, Persistence};
use behavior_ingest::import::{self, PopulateOptions};
use behavior_ingest::pose::PoseOrigin;
use behavior_ingest::scanner::{self, ImportOptions, Pairing};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "behavior-ingest", version, about = "Import pose-estimation and behavior-annotation files")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair label and pose files by name, register their sessions and import them
    Import {
        /// Directory of annotation files (defaults to config label_dir)
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Directory of pose files (defaults to config pose_dir)
        #[arg(long)]
        poses: Option<PathBuf>,

        /// Labeling tool that wrote the annotation files (BORIS, A-SOiD)
        #[arg(long)]
        label_origin: AnnotationOrigin,

        /// Tracking tool that wrote the pose files (SLEAP, DLC); must match the model
        #[arg(long)]
        pose_origin: Option<PoseOrigin>,

        /// Video frame rate (defaults to config fps)
        #[arg(long)]
        fps: Option<u32>,

        /// Experimenter name for a new experimenter row. An experimenter id already in the
        /// database keeps its stored name; a differing name is logged as a warning.
        #[arg(long)]
        experimenter: Option<String>,

        /// Pose model the files were produced with
        #[arg(long, default_value = "0")]
        model_id: i64,

        /// Leave rows that already exist instead of failing
        #[arg(long)]
        skip_duplicates: bool,

        /// Show the planned rows without writing to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Import annotation and pose data for registered sessions that lack them
    Populate {
        /// Leave rows that already exist instead of failing
        #[arg(long)]
        skip_duplicates: bool,
    },

    /// Manage pose-estimation models
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },

    /// List sessions and their import state
    Sessions,

    /// Show per-behavior statistics
    Stats {
        /// Only this mouse
        #[arg(long)]
        mouse: Option<i64>,

        /// Only this session id
        #[arg(long)]
        session: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ModelCommand {
    /// Register a pose-estimation model
    Add {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        name: String,

        /// Tracking tool (SLEAP, DLC)
        #[arg(long)]
        origin: PoseOrigin,

        /// Training date (YYYY-MM-DD)
        #[arg(long)]
        training_date: NaiveDate,

        /// Model architecture
        #[arg(long = "type", default_value = "SingleInstance")]
        model_type: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Leave an existing model with this id untouched
        #[arg(long)]
        skip_duplicates: bool,
    },

    /// List registered models
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = behavior_ingest::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(behavior_ingest::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::Import {
            labels,
            poses,
            label_origin,
            pose_origin,
            fps,
            experimenter,
            model_id,
            skip_duplicates,
            dry_run,
        } => {
            let label_dir = labels
                .or(config.label_dir.clone())
                .context("No label directory. Pass --labels or set label_dir in config.")?;
            let pose_dir = poses
                .or(config.pose_dir.clone())
                .context("No pose directory. Pass --poses or set pose_dir in config.")?;
            let fps = fps.unwrap_or(config.fps);
            anyhow::ensure!(fps > 0, "Frame rate must be positive");

            let model = db
                .get_model(model_id)?
                .with_context(|| format!("Model {model_id} is not registered. Add it with `model add`."))?;
            let model_origin: PoseOrigin = model
                .origin
                .parse()
                .with_context(|| format!("Model {model_id} has an unusable origin"))?;
            if let Some(requested) = pose_origin {
                anyhow::ensure!(
                    requested == model_origin,
                    "--pose-origin {} does not match model {} ({})",
                    requested,
                    model_id,
                    model_origin
                );
            }

            let pairing = scanner::scan_directories(&label_dir, &pose_dir, model_origin).context("Scan failed")?;
            report_unpaired(&pairing);

            let mut experimenter_row = config.experimenter.to_experimenter();
            if experimenter.is_some() {
                experimenter_row.name = experimenter;
            }
            let opts = ImportOptions {
                label_origin,
                fps,
                experimenter: experimenter_row,
                model_id,
                genotype: config.mouse.genotype.clone(),
                sex: config.mouse.sex,
            };
            let plan = scanner::plan_sessions(&db, &pairing.pairs, &opts).context("Planning sessions failed")?;

            if dry_run {
                println!("DRY RUN: no changes will be written to the database");
                println!();
                print_plan(&plan.sessions, &model);
                println!();
                println!(
                    "{} new sessions, {} already registered, {} files unpaired",
                    plan.sessions.len(),
                    plan.existing.len(),
                    unpaired_count(&pairing)
                );
                db.close()?;
                return Ok(());
            }

            let mode = InsertMode::from_flag(skip_duplicates);
            let registered = scanner::register_sessions(&db, &plan.sessions, mode);
            let result = import::populate(
                &db,
                &PopulateOptions {
                    background_label: config.annotation.background_label.clone(),
                    mode,
                },
            )
            .context("Import failed")?;
            println!(
                "Import complete: {} registered, {} imported, {} failed, {} skipped",
                registered.inserted,
                result.imported,
                result.failed + registered.failed,
                plan.existing.len() + unpaired_count(&pairing)
            );
        }

        Commands::Populate { skip_duplicates } => {
            let result = import::populate(
                &db,
                &PopulateOptions {
                    background_label: config.annotation.background_label.clone(),
                    mode: InsertMode::from_flag(skip_duplicates),
                },
            )
            .context("Import failed")?;
            println!("Populate complete: {} imported, {} failed", result.imported, result.failed);
        }

        Commands::Model { command } => match command {
            ModelCommand::Add {
                id,
                name,
                origin,
                training_date,
                model_type,
                description,
                skip_duplicates,
            } => {
                let model = Model {
                    model_id: id,
                    name,
                    model_type,
                    origin: origin.to_string(),
                    training_date,
                    description,
                };
                db.insert_model(&model, InsertMode::from_flag(skip_duplicates))
                    .context("Failed to add model")?;
                println!("Model {} ({}) registered", model.model_id, model.origin);
            }
            ModelCommand::List => {
                let models = db.list_models()?;
                if models.is_empty() {
                    println!("No models registered.");
                } else {
                    print_model_table(&models);
                }
            }
        },

        Commands::Sessions => {
            let sessions = db.list_sessions()?;
            if sessions.is_empty() {
                println!("No sessions registered.");
            } else {
                print_session_table(&sessions);
            }
        }

        Commands::Stats { mouse, session } => {
            let rows = db.query_behavior_stats(mouse, session)?;
            if rows.is_empty() {
                println!("No behavior statistics found.");
            } else {
                print_stats_table(&rows);
            }
        }
    }

    db.close()?;
    Ok(())
}

fn unpaired_count(pairing: &Pairing) -> usize {
    pairing.unmatched_labels.len() + pairing.unmatched_poses.len() + pairing.unparsed.len()
}

/// Warn about files that could not be paired.
fn report_unpaired(pairing: &Pairing) {
    for path in &pairing.unparsed {
        log::warn!("Skipping {}: name does not match {{prefix}}{{mouse}}-{{ddmmYYYY}}-{{HHMMSS}}", path.display());
    }
    for path in &pairing.unmatched_labels {
        log::warn!("Skipping {}: no pose file for this session", path.display());
    }
    for path in &pairing.unmatched_poses {
        log::warn!("Skipping {}: no label file for this session", path.display());
    }
}

/// Truncate long text from the left so the file name stays visible.
fn tail(text: &str, width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() > width {
        let keep: String = chars[chars.len() - (width - 3)..].iter().collect();
        format!("...{}", keep)
    } else {
        text.to_string()
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Print the rows an import would write.
fn print_plan(sessions: &[SessionMetadata], model: &Model) {
    println!("Mice:");
    println!("  {:>6} {:<8} {:<12} {}", "Mouse", "Sex", "DOB", "Genotype");
    let mut mice: Vec<_> = sessions.iter().map(|m| &m.mouse).collect();
    mice.sort_by_key(|m| m.mouse_id);
    mice.dedup_by_key(|m| m.mouse_id);
    for m in mice {
        let dob = m.dob.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
        println!("  {:>6} {:<8} {:<12} {}", m.mouse_id, m.sex, dob, m.genotype);
    }

    if let Some(meta) = sessions.first() {
        let e = &meta.experimenter;
        println!();
        println!("Experimenter:");
        println!(
            "  {:>6} {:<8} {}",
            e.experimenter_id,
            e.sex,
            e.name.as_deref().unwrap_or("-")
        );
    }

    println!();
    println!("Model:");
    println!(
        "  {:>6} {:<8} {:<12} {}",
        model.model_id,
        model.origin,
        model.training_date.to_string(),
        model.name
    );

    println!();
    println!("Sessions:");
    println!(
        "  {:>6} {:>7} {:<19} {:>4} {:<7} {:<30} {}",
        "Mouse", "Session", "Time", "FPS", "Origin", "Annotation", "Pose"
    );
    println!("  {}", "-".repeat(110));
    for meta in sessions {
        let s = &meta.session;
        println!(
            "  {:>6} {:>7} {:<19} {:>4} {:<7} {:<30} {}",
            s.key.mouse_id,
            s.key.session_id,
            s.session_time.format("%Y-%m-%d %H:%M:%S"),
            s.video_fps,
            s.annotation_origin,
            tail(&file_name(&s.annotation_path), 30),
            file_name(&s.pose_path),
        );
    }
}

fn print_model_table(models: &[Model]) {
    println!(
        "{:>5} {:<8} {:<12} {:<16} {}",
        "ID", "Origin", "Trained", "Type", "Name"
    );
    println!("{}", "-".repeat(70));
    for m in models {
        println!(
            "{:>5} {:<8} {:<12} {:<16} {}",
            m.model_id,
            m.origin,
            m.training_date.to_string(),
            m.model_type,
            m.name
        );
    }
}

fn print_session_table(sessions: &[SessionStatus]) {
    println!(
        "{:>6} {:>7} {:<19} {:>4} {:<7} {:>5}  {:<4} {:<4}",
        "Mouse", "Session", "Time", "FPS", "Origin", "Model", "Ann", "Pose"
    );
    println!("{}", "-".repeat(70));

    let mark = |done: bool| if done { "yes" } else { "-" };
    for st in sessions {
        let s = &st.session;
        println!(
            "{:>6} {:>7} {:<19} {:>4} {:<7} {:>5}  {:<4} {:<4}",
            s.key.mouse_id,
            s.key.session_id,
            s.session_time.format("%Y-%m-%d %H:%M:%S"),
            s.video_fps,
            s.annotation_origin,
            s.pose_model_id,
            mark(st.has_annotation),
            mark(st.has_pose),
        );
    }

    let pending = sessions.iter().filter(|s| !s.has_annotation || !s.has_pose).count();
    println!();
    println!("{} sessions, {} pending import", sessions.len(), pending);
}

fn print_stats_table(rows: &[SessionBehaviorStat]) {
    println!(
        "{:>6} {:>7} {:<24} {:>8} {:>7} {:>9}",
        "Mouse", "Session", "Behavior", "Frames", "Perc", "Time (s)"
    );
    println!("{}", "-".repeat(66));

    for r in rows {
        let behavior: String = if r.stat.behavior_id.chars().count() > 24 {
            let short: String = r.stat.behavior_id.chars().take(21).collect();
            format!("{}...", short)
        } else {
            r.stat.behavior_id.clone()
        };
        println!(
            "{:>6} {:>7} {:<24} {:>8} {:>6.1}% {:>9.2}",
            r.key.mouse_id,
            r.key.session_id,
            behavior,
            r.stat.total_frames,
            r.stat.total_perc * 100.0,
            r.stat.total_time,
        );
    }
}
