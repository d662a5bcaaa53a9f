use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use solidarc::archive::Archive;
use solidarc::archiver::{self, ManifestSink};
use solidarc::config::ReaderOptions;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "solidarc", about = "Read solid-block archives")]
struct Cli {
    /// Password for encrypted folders
    #[arg(short, long, global = true)]
    password: Option<String>,
    /// Fail on folders that cannot be decoded instead of reading them as empty
    #[arg(long, global = true)]
    strict: bool,
    /// JSON file with reader options
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List archive contents
    List {
        input: PathBuf,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show archive metadata
    Info {
        input: PathBuf,
    },
    /// Write one entry to stdout
    Cat {
        input: PathBuf,
        name:  String,
    },
    /// Extract every entry
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Print the entry manifest a directory would produce
    Manifest {
        directory: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let ar = open_archive(&cli, input)?;
            let entries = ar.list();
            if *json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("Archive: {}", input.display());
                println!("{:<32} {:>12} {:>7}  {:<25} Coders", "Name", "Size", "Folder", "Modified");
                for info in entries {
                    let name = if info.is_directory && !info.name.ends_with('/') {
                        format!("{}/", info.name)
                    } else {
                        info.name
                    };
                    let folder = info.folder.map(|f| f.to_string()).unwrap_or_else(|| "-".into());
                    println!("{:<32} {:>12} {:>7}  {:<25} {}",
                        name, info.size, folder,
                        info.modified.unwrap_or_else(|| "-".into()),
                        info.coders.join("+"));
                }
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let mut ar = open_archive(&cli, input)?;
            let sb = ar.reader().superblock().clone();
            let table = ar.reader().table();
            let total: u64 = table.entries().iter().map(|e| e.size()).sum();
            let packed: u64 = table.folders().iter().map(|f| f.pack_size).sum();

            println!("── Solid archive ────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Format version {}", sb.version);
            println!("  UUID           {}", sb.archive_uuid);
            println!("  Encrypted      {}", sb.is_encrypted() || table.has_encrypted_folders());
            println!("  Header offset  {} B", sb.header_offset);
            println!("  Header size    {} B", sb.header_size);
            println!("  Entries        {}", table.len());
            println!("  Folders        {}", table.folders().len());
            println!("  Unpacked       {} B", total);
            println!("  Packed         {} B", packed);
            for folder in table.folders() {
                println!("    folder {:<5} {:>10} -> {:>10} B  {}",
                    folder.id, folder.pack_size, folder.unpack_size,
                    folder.coder_names().join("+"));
            }
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { input, name } => {
            let mut ar = open_archive(&cli, input)?;
            let data = ar.read_file(name)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(&data)?;
            out.flush()?;
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir } => {
            let mut ar = open_archive(&cli, input)?;
            let report = ar.extract_all(output_dir)?;
            for name in &report.files {
                println!("  extracted  {}", name);
            }
            for skipped in &report.skipped {
                eprintln!("  skipped    {} ({})", skipped.name, skipped.reason);
            }
            println!("Extracted {} file(s), {} director(ies) to {}",
                report.files.len(), report.directories, output_dir.display());
            if !report.skipped.is_empty() {
                return Err(format!("{} entries could not be extracted", report.skipped.len()).into());
            }
        }

        // ── Manifest ─────────────────────────────────────────────────────────
        Commands::Manifest { directory } => {
            let mut sink = ManifestSink::new(io::stdout().lock());
            archiver::create(directory, &mut sink)?;
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn reader_options(cli: &Cli) -> Result<ReaderOptions, Box<dyn std::error::Error>> {
    let mut opts = match &cli.config {
        Some(path) => ReaderOptions::from_json_file(path)?,
        None       => ReaderOptions::default(),
    };
    if let Some(pw) = &cli.password {
        opts = opts.with_password(pw.clone());
    }
    if cli.strict {
        opts = opts.strict(true);
    }
    Ok(opts)
}

fn open_archive(cli: &Cli, path: &Path) -> Result<Archive, Box<dyn std::error::Error>> {
    Ok(Archive::open_with(path, reader_options(cli)?)?)
}
