use albumrs::core::clustering::ClusterEngine;
use albumrs::core::selection::SelectionService;
use albumrs::database::connection::Database;
use albumrs::database::get_database_path;
use albumrs::database::models::{Cluster, Photo};
use albumrs::database::repositories::{ClusterStore, PhotoStore};
use albumrs::{EngineConfig, SelectionWeights};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "albumrs", version, about = "Face clustering and album photo selection")]
struct Cli {
    /// SQLite database (default: ~/Documents/Albumrs/albumrs.db)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// JSON engine config; missing keys use defaults
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import photos with detected faces from a JSON array
    Import {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },

    /// List imported sessions
    Sessions,

    /// Cluster the faces of a session's photos
    Cluster {
        #[arg(short, long)]
        session: String,
    },

    /// Inspect and edit clusters
    Clusters {
        #[command(subcommand)]
        command: ClustersCmd,
    },

    /// Pick photos for an album
    Select {
        #[command(subcommand)]
        command: SelectCmd,
    },
}

#[derive(Subcommand, Debug)]
enum ClustersCmd {
    /// List all clusters
    List,

    /// Create an empty cluster with a name
    Create {
        #[arg(short, long)]
        label: String,
    },

    /// Give a cluster a name
    Rename {
        #[arg(long)]
        id: String,
        #[arg(short, long)]
        label: String,
    },

    /// Move a photo to another cluster and confirm it there
    Move {
        #[arg(short, long)]
        photo: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },

    /// Merge one cluster into another
    Merge {
        /// Cluster that survives
        #[arg(long)]
        keep: String,
        /// Cluster that is absorbed and deleted
        #[arg(long)]
        remove: String,
    },

    /// Show pairs of clusters that may be the same person
    Suggest {
        /// Ask to merge each pair
        #[arg(short, long)]
        interactive: bool,
    },

    /// Rebuild a cluster centroid from its photos
    Recalc {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum SelectCmd {
    /// Balanced coverage of several people
    Balanced {
        #[arg(short, long)]
        session: String,
        /// Target cluster ids
        #[arg(long, value_delimiter = ',', required = true)]
        clusters: Vec<String>,
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
        #[command(flatten)]
        weights: WeightArgs,
        /// Print the selection as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evenly spaced photos of one person over time
    Growth {
        #[arg(short, long)]
        session: String,
        #[arg(long)]
        cluster: String,
        #[arg(short = 'n', long, default_value_t = 12)]
        count: usize,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct WeightArgs {
    #[arg(long)]
    smile: Option<f64>,
    #[arg(long)]
    confidence: Option<f64>,
    #[arg(long)]
    frontality: Option<f64>,
    #[arg(long)]
    centeredness: Option<f64>,
    #[arg(long)]
    blur: Option<f64>,
    /// 0 prefers solo shots, 1 prefers group shots
    #[arg(long)]
    group_balance: Option<f64>,
}

impl WeightArgs {
    fn resolve(&self) -> SelectionWeights {
        let defaults = SelectionWeights::default();
        SelectionWeights {
            smile: self.smile.unwrap_or(defaults.smile),
            confidence: self.confidence.unwrap_or(defaults.confidence),
            frontality: self.frontality.unwrap_or(defaults.frontality),
            centeredness: self.centeredness.unwrap_or(defaults.centeredness),
            blur: self.blur.unwrap_or(defaults.blur),
            group_balance: self.group_balance.unwrap_or(defaults.group_balance),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("albumrs=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => get_database_path()?,
    };
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match cli.command {
        Commands::Import { file } => import(&db, &file)?,

        Commands::Sessions => {
            let sessions = db.photos().list_sessions()?;
            if sessions.is_empty() {
                println!("No sessions imported.");
            }
            for (session_id, count) in sessions {
                println!("▶ {} ({} photos)", session_id, count);
            }
        }

        Commands::Cluster { session } => {
            let photos = db.get_photos_for_session(&session)?;
            if photos.is_empty() {
                anyhow::bail!("No photos in session {}", session);
            }

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            spinner.set_message(format!("Clustering {} photos…", photos.len()));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let start = Instant::now();
            let engine = ClusterEngine::new(&db, config);
            let clusters = engine.cluster(&photos)?;
            spinner.finish_with_message(format!("Clustering complete in {:.2?}", start.elapsed()));

            print_clusters(&clusters);
        }

        Commands::Clusters { command } => clusters(&db, config, command)?,

        Commands::Select { command } => select(&db, config, command)?,
    }

    Ok(())
}

fn import(db: &Database, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Could not read {}", file.display()))?;
    let photos: Vec<Photo> = serde_json::from_str(&content)
        .with_context(|| format!("Malformed photo list in {}", file.display()))?;

    let imported = db.photos().upsert_batch(&photos)?;
    let faces: usize = photos.iter().map(|p| p.faces.len()).sum();
    println!("✅ Imported {} photos ({} faces)", imported, faces);
    Ok(())
}

fn clusters(db: &Database, config: EngineConfig, command: ClustersCmd) -> Result<()> {
    let engine = ClusterEngine::new(db, config);

    match command {
        ClustersCmd::List => print_clusters(&db.get_clusters()?),

        ClustersCmd::Create { label } => {
            let cluster = engine.create_named_cluster(&label)?;
            println!("✅ Created {} ({})", cluster.label, cluster.id);
        }

        ClustersCmd::Rename { id, label } => {
            let cluster = engine.rename(&id, &label)?;
            println!("✅ Renamed {} → {}", cluster.id, cluster.label);
        }

        ClustersCmd::Move { photo, from, to } => {
            engine.move_photo(&photo, &from, &to)?;
            println!("📦 Moved {} → {}", photo, to);
        }

        ClustersCmd::Merge { keep, remove } => {
            let merged = engine.merge(&keep, &remove)?;
            println!(
                "✅ Merged into {} ({} photos)",
                merged.label,
                merged.photo_ids.len()
            );
        }

        ClustersCmd::Suggest { interactive } => {
            let all = db.get_clusters()?;
            let pairs = engine.find_similar_pairs(&all);
            if pairs.is_empty() {
                println!("No similar clusters found.");
                return Ok(());
            }

            let label_of = |id: &str| {
                all.iter()
                    .find(|c| c.id == id)
                    .map(|c| c.label.clone())
                    .unwrap_or_else(|| id.to_string())
            };
            let mut merged_away: Vec<String> = Vec::new();

            for pair in &pairs {
                println!(
                    "\n✨ {} ↔ {} (distance {:.3})",
                    label_of(&pair.first),
                    label_of(&pair.second),
                    pair.distance
                );
                if !interactive {
                    continue;
                }
                if merged_away.contains(&pair.first) || merged_away.contains(&pair.second) {
                    println!("   ⚠️  Skipping; one side was already merged");
                    continue;
                }

                let confirmed = Confirm::new()
                    .with_prompt("   Merge these clusters?")
                    .default(false)
                    .interact()?;
                if confirmed {
                    let merged = engine.merge(&pair.first, &pair.second)?;
                    merged_away.push(pair.second.clone());
                    println!("   ✅ Merged into {}", merged.label);
                }
            }
        }

        ClustersCmd::Recalc { id } => {
            let cluster = engine.recalculate(&id)?;
            println!("🔄 Recalculated {}", cluster.label);
        }
    }

    Ok(())
}

fn select(db: &Database, config: EngineConfig, command: SelectCmd) -> Result<()> {
    let service = SelectionService::new(config);

    let (selected, json) = match command {
        SelectCmd::Balanced {
            session,
            clusters,
            count,
            weights,
            json,
        } => {
            let pool = db.get_photos_for_session(&session)?;
            let targets = load_clusters(db, &clusters)?;
            let selected = service.select_group_balanced(&pool, &targets, count, &weights.resolve());
            (selected, json)
        }

        SelectCmd::Growth {
            session,
            cluster,
            count,
            json,
        } => {
            let pool = db.get_photos_for_session(&session)?;
            let target = load_clusters(db, std::slice::from_ref(&cluster))?;
            let selected = match target.first() {
                Some(target) => service.select_growth(&pool, target, count),
                None => Vec::new(),
            };
            (selected, json)
        }
    };

    if json {
        let ids: Vec<&str> = selected.iter().map(|p| p.id.as_str()).collect();
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    println!("🏆 Selected {} photo(s):", selected.len());
    for photo in &selected {
        let taken = chrono::DateTime::from_timestamp_millis(photo.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| photo.timestamp.to_string());
        println!("   ▶ {} ({})", photo.id, taken);
    }
    Ok(())
}

fn load_clusters(db: &Database, ids: &[String]) -> Result<Vec<Cluster>> {
    ids.iter()
        .map(|id| {
            db.get_cluster(id)?
                .with_context(|| format!("Cluster not found: {}", id))
        })
        .collect()
}

fn print_clusters(clusters: &[Cluster]) {
    if clusters.is_empty() {
        println!("No clusters.");
        return;
    }
    println!("🗂️  {} cluster(s):", clusters.len());
    for cluster in clusters {
        let placeholder = if cluster.is_placeholder() { " [empty]" } else { "" };
        println!(
            "   {} {}{}: {} photos, {} confirmed",
            cluster.id,
            cluster.label,
            placeholder,
            cluster.photo_ids.len(),
            cluster.confirmed_photo_ids.len()
        );
    }
}
