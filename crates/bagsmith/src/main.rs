//! bagsmith - Build and validate BagIt bags against profiles.

mod report;

use anyhow::{bail, Context, Result};
use bagsmith_common::hash::MultiHasher;
use bagsmith_common::{DigestAlgorithm, Error, SerializationFormat, Timestamp};
use bagsmith_engine::{
    build, serialize, validate_path, BuildOptions, CancelToken, SourceFile, TagValues,
    ValidationOptions,
};
use bagsmith_schema::{DirProfileStore, Profile, ProfileRepository, ValidationReport};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bagsmith")]
#[command(author, version, about = "Build and validate BagIt bags against profiles")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (json, text)
    #[arg(long, global = true, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a bag directory or serialized bag against a profile
    Validate {
        /// Bag directory, .tar or .tar.gz file
        bag: PathBuf,

        /// Profile JSON file
        #[arg(long, conflicts_with = "profile_id")]
        profile: Option<PathBuf>,

        /// Id of a profile in the profile store
        #[arg(long)]
        profile_id: Option<String>,

        /// Profile store directory
        #[arg(long, default_value = "./profiles")]
        store: PathBuf,

        /// Report undeclared tags and fail on untracked payload files
        #[arg(long)]
        strict: bool,

        /// Number of checksum workers (defaults to the number of CPUs)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Build a bag from a directory of payload files
    Build {
        /// Profile JSON file
        #[arg(long)]
        profile: PathBuf,

        /// Directory holding the payload files
        #[arg(long)]
        source: PathBuf,

        /// Output bag directory
        #[arg(long, short)]
        out: PathBuf,

        /// JSON file of tag values: {"bag-info.txt": {"Label": "value"}}
        #[arg(long)]
        tags: Option<PathBuf>,

        /// Tag value as [file:]Label=value (file defaults to bag-info.txt)
        #[arg(long = "tag")]
        tag: Vec<String>,

        /// Also write a serialized copy (tar, tar.gz)
        #[arg(long)]
        serialize: Option<String>,

        /// Number of hashing workers (defaults to the number of CPUs)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Check a profile description for errors
    CheckProfile {
        /// Profile JSON file
        profile: PathBuf,
    },

    /// Print digests of a file
    Hash {
        /// File to hash
        file: PathBuf,

        /// Algorithms (md4, md5, sha1, sha224, sha256, sha384, sha512)
        #[arg(long, short, default_value = "sha256", value_delimiter = ',')]
        algorithm: Vec<String>,
    },

    /// Manage stored profiles
    Profile {
        /// Profile store directory
        #[arg(long, default_value = "./profiles", global = true)]
        store: PathBuf,

        #[command(subcommand)]
        action: ProfileCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Store a profile and print its id
    Save {
        /// Profile JSON file
        profile: PathBuf,
    },

    /// Print a stored profile
    Show {
        /// Profile id
        id: String,
    },

    /// List stored profiles
    List,
}

fn load_profile(path: &Path) -> Result<Profile> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read profile {path:?}"))?;
    Profile::load(&bytes).with_context(|| format!("Invalid profile {path:?}"))
}

/// Parse `[file:]Label=value` into the tag values map.
fn parse_tag(spec: &str, values: &mut TagValues) -> Result<()> {
    let Some((key, value)) = spec.split_once('=') else {
        bail!("Tag {spec:?} is not in [file:]Label=value form");
    };
    let (file, label) = key.split_once(':').unwrap_or(("bag-info.txt", key));
    if label.trim().is_empty() {
        bail!("Tag {spec:?} has an empty label");
    }
    values
        .entry(file.trim().to_string())
        .or_default()
        .insert(label.trim().to_string(), value.trim().to_string());
    Ok(())
}

/// Cancel `token` when Ctrl-C is pressed.
fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing files in progress");
            token.cancel();
        }
    });
}

fn print_report(report: &ValidationReport, bag: &Path, format: &str) -> Result<()> {
    let rendered = report::render_report(report, &bag.display().to_string(), format)?;
    print!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Validate {
            bag,
            profile,
            profile_id,
            store,
            strict,
            workers,
        } => {
            let profile = match (profile, profile_id) {
                (Some(path), _) => load_profile(&path)?,
                (None, Some(id)) => DirProfileStore::open(&store)?
                    .load_profile(&id)
                    .with_context(|| format!("Failed to load profile {id}"))?,
                (None, None) => bail!("Either --profile or --profile-id is required"),
            };

            let cancel = CancelToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let mut options = ValidationOptions {
                strict,
                cancel,
                ..ValidationOptions::default()
            };
            if let Some(workers) = workers {
                options.workers = workers;
            }

            info!("Validating {:?} against profile {:?}", bag, profile.name);
            let started = Timestamp::now();
            let bag_path = bag.clone();
            let report =
                tokio::task::spawn_blocking(move || validate_path(&bag_path, &profile, options))
                    .await??;
            info!(
                "Validation took {} ms",
                started.elapsed().num_milliseconds()
            );

            print_report(&report, &bag, &cli.format)?;
            if report.cancelled || !report.passed {
                std::process::exit(1);
            }
        }

        Commands::Build {
            profile,
            source,
            out,
            tags,
            tag,
            serialize: serialize_as,
            workers,
        } => {
            let profile = load_profile(&profile)?;
            let format = serialize_as
                .as_deref()
                .map(|s| s.parse::<SerializationFormat>())
                .transpose()?;

            let mut tag_values: TagValues = match tags {
                Some(path) => {
                    let file = File::open(&path)
                        .with_context(|| format!("Failed to open tag values {path:?}"))?;
                    serde_json::from_reader(file)
                        .with_context(|| format!("Invalid tag values in {path:?}"))?
                }
                None => TagValues::new(),
            };
            for spec in &tag {
                parse_tag(spec, &mut tag_values)?;
            }

            let cancel = CancelToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let mut options = BuildOptions {
                cancel: cancel.clone(),
                ..BuildOptions::default()
            };
            if let Some(workers) = workers {
                options.workers = workers;
            }

            info!("Building bag from {:?} into {:?}", source, out);
            let out_dir = out.clone();
            let build_profile = profile.clone();
            let archive = tokio::task::spawn_blocking(move || -> bagsmith_common::Result<_> {
                let sources = SourceFile::collect_dir(&source)?;
                let built = build(&build_profile, &sources, &tag_values, options)?;
                built.write_to(&out_dir)?;
                match format {
                    Some(format) if format.is_serialized() => {
                        let archive = out_dir.with_file_name(format!(
                            "{}.{}",
                            out_dir
                                .file_name()
                                .map(|n| n.to_string_lossy().to_string())
                                .unwrap_or_else(|| "bag".to_string()),
                            format
                        ));
                        serialize(&out_dir, &archive, format)?;
                        Ok(Some(archive))
                    }
                    Some(format) => Err(Error::UnsupportedFormat(format.to_string())),
                    None => Ok(None),
                }
            })
            .await??;

            let written = archive.unwrap_or(out);
            info!("Bag written to {:?}, checking it against the profile", written);
            let check_path = written.clone();
            let options = ValidationOptions {
                cancel,
                ..ValidationOptions::default()
            };
            let report =
                tokio::task::spawn_blocking(move || validate_path(&check_path, &profile, options))
                    .await??;

            print_report(&report, &written, &cli.format)?;
            if report.cancelled || !report.passed {
                std::process::exit(1);
            }
        }

        Commands::CheckProfile { profile } => {
            let bytes = std::fs::read(&profile)
                .with_context(|| format!("Failed to read profile {profile:?}"))?;
            match Profile::load(&bytes) {
                Ok(loaded) => {
                    println!(
                        "Profile {:?} is valid: {} tag file(s), {} tag(s), algorithms {}",
                        loaded.name,
                        loaded.tag_files.len(),
                        loaded.tags().count(),
                        loaded
                            .manifest_algorithms
                            .iter()
                            .map(|a| a.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                Err(Error::Profile(errors)) => {
                    println!("Profile has errors:");
                    for error in errors.iter() {
                        println!("  - {}", error);
                    }
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Hash { file, algorithm } => {
            let algorithms = algorithm
                .iter()
                .map(|a| a.parse::<DigestAlgorithm>())
                .collect::<bagsmith_common::Result<Vec<_>>>()?;
            let reader =
                File::open(&file).with_context(|| format!("Failed to open {file:?}"))?;
            let mut hasher = MultiHasher::new(&algorithms);
            hasher.consume(reader)?;
            for (algorithm, digest) in hasher.finalize() {
                println!("{algorithm}  {digest}  {}", file.display());
            }
        }

        Commands::Profile { store, action } => {
            let store = DirProfileStore::open(&store)?;
            match action {
                ProfileCommands::Save { profile } => {
                    let loaded = load_profile(&profile)?;
                    let id = store.save_profile(&loaded)?;
                    info!("Saved profile {:?} to {:?}", loaded.name, store.root());
                    println!("{id}");
                }
                ProfileCommands::Show { id } => {
                    let profile = store
                        .load_profile(&id)
                        .with_context(|| format!("Failed to load profile {id}"))?;
                    println!("{}", profile.to_json_pretty()?);
                }
                ProfileCommands::List => {
                    let records = store.list_profiles()?;
                    if cli.format == "json" {
                        let summary: Vec<serde_json::Value> = records
                            .iter()
                            .map(|r| {
                                serde_json::json!({
                                    "id": r.id,
                                    "name": r.name,
                                    "description": r.description,
                                })
                            })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&summary)?);
                    } else {
                        for record in records {
                            println!("{}  {}", record.id, record.name);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let mut values = TagValues::new();
        parse_tag("Source-Organization=Example Org", &mut values).unwrap();
        parse_tag("aptrust-info.txt:Access=Institution", &mut values).unwrap();
        assert_eq!(
            values["bag-info.txt"]["Source-Organization"],
            "Example Org"
        );
        assert_eq!(values["aptrust-info.txt"]["Access"], "Institution");
        assert!(parse_tag("no-equals-sign", &mut values).is_err());
        assert!(parse_tag("=value", &mut values).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "bagsmith",
            "validate",
            "bag.tar.gz",
            "--profile",
            "profile.json",
            "--strict",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Validate { strict: true, .. }));

        let cli = Cli::try_parse_from(["bagsmith", "hash", "f", "-a", "md5,sha1"]).unwrap();
        match cli.command {
            Commands::Hash { algorithm, .. } => assert_eq!(algorithm, vec!["md5", "sha1"]),
            _ => panic!("expected hash command"),
        }
    }
}
