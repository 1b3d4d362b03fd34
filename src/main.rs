//! CLI entry point for `mailspace`.

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};

use mailspace::config::{self, ConfigFile, Configuration};
use mailspace::model::part::ExtractedPart;
use mailspace::parser::eml;
use mailspace::parser::mime::MimeExtractor;
use mailspace::routing::engine::SpaceRouter;

#[derive(Parser)]
#[command(
    name = "mailspace",
    version,
    about = "Extract publishable content from e-mail and route it to spaces"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to $MAILSPACE_CONFIG or the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract content parts and attachments from a message
    Extract {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the spaces a message is routed to
    Route {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    CheckConfig {
        path: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_file = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config(),
    };

    let log_level = match cli.verbose {
        0 => config_file.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config_file);

    match cli.command {
        Commands::Extract { path, json } => cmd_extract(&path, json, &config_file),
        Commands::Route { path, json } => cmd_route(&path, json, &config_file),
        Commands::CheckConfig { path } => cmd_check_config(path.as_deref(), &config_file),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &ConfigFile) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_path = config::log_file_path(config);
    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_name = log_path.file_name().unwrap_or_default();
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Validate the configuration against its own list of known spaces.
fn accept(config_file: &ConfigFile) -> anyhow::Result<Configuration> {
    let spaces = config_file.known_spaces();
    if spaces.is_empty() {
        tracing::warn!("No known spaces configured, every destination will be rejected");
    }
    Ok(Configuration::accept(config_file, &spaces)?)
}

/// Extract a message and print its parts.
fn cmd_extract(path: &Path, json: bool, config_file: &ConfigFile) -> anyhow::Result<()> {
    let config = accept(config_file)?;
    let file_types = config_file.file_type_bucket();

    let raw = eml::read_eml(path)?;
    let mail = eml::parse_eml(path, &raw)?;
    let root = mail.root();
    let parts = MimeExtractor::new(&config, &file_types).extract(&root);

    if json {
        let output = serde_json::json!({
            "file": path.to_string_lossy(),
            "sender": mail.sender_email(),
            "part_count": parts.len(),
            "parts": parts,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {} part(s)", parts.len());
    println!();
    if parts.is_empty() {
        return Ok(());
    }

    println!(
        "  {:<4} {:<10} {:<28} {:>10}  {}",
        "#", "Kind", "Content type", "Size", "Name"
    );
    println!("  {}", "-".repeat(80));
    for (i, part) in parts.iter().enumerate() {
        let (kind, size, name) = match part {
            ExtractedPart::Content { html, .. } => ("content", html.len() as u64, String::new()),
            ExtractedPart::Attachment {
                attachment,
                content_id,
                ..
            } => {
                let name = match content_id {
                    Some(cid) => format!("{} <{}>", attachment.filename, cid),
                    None => attachment.filename.clone(),
                };
                ("attachment", attachment.file_size, name)
            }
        };
        let ct: String = part.content_type().chars().take(27).collect();
        println!(
            "  {:<4} {:<10} {:<28} {:>10}  {}",
            i + 1,
            kind,
            ct,
            format_size(size, BINARY),
            name
        );
    }
    println!();
    Ok(())
}

/// Route a message and print its destinations.
fn cmd_route(path: &Path, json: bool, config_file: &ConfigFile) -> anyhow::Result<()> {
    let config = accept(config_file)?;
    let spaces = config_file.known_spaces();

    let raw = eml::read_eml(path)?;
    let mail = eml::parse_eml(path, &raw)?;
    let destinations = SpaceRouter::new(&spaces).get_spaces(&config, &mail);

    if json {
        let output = serde_json::json!({
            "file": path.to_string_lossy(),
            "destinations": destinations,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    if destinations.is_empty() {
        println!("  No destinations.");
    }
    for d in &destinations {
        println!("  {:<30} {}", d.space_key, d.content_type);
    }
    println!();
    Ok(())
}

/// Load and accept a configuration file, reporting the first invalid rule.
fn cmd_check_config(path: Option<&Path>, loaded: &ConfigFile) -> anyhow::Result<()> {
    let config_file = match path {
        Some(p) => config::load_config_from(p)?,
        None => loaded.clone(),
    };
    let config = accept(&config_file)?;

    println!();
    println!("  {:<25} {}", "Default space", config.default_space);
    println!("  {:<25} {}", "Default content type", config.default_content_type);
    println!("  {:<25} {}", "Rules", config.rules.len());
    println!(
        "  {:<25} {}",
        "Max attachment size",
        format_size(config.max_attachment_bytes, BINARY)
    );
    if config.max_attachment_count < 0 {
        println!("  {:<25} unlimited", "Max attachments");
    } else {
        println!("  {:<25} {}", "Max attachments", config.max_attachment_count);
    }
    println!("  Configuration OK");
    println!();
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailspace", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
