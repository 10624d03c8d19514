//! CLI for durq queue files.
//!
//! Provides commands for inspecting a queue and pushing or consuming
//! records from the shell. Queues live as files inside a directory.

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use durq::header::{self, Header};
use durq::space;
use durq::{CircularQueue, DirVolume, ElemMode, FileMedium, Medium, QueueConfig, Volume};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

/// durq: durable circular queue CLI.
#[derive(Parser)]
#[command(name = "durq", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display the control block and occupancy of a queue.
    Info {
        /// Directory holding the queue files.
        dir: PathBuf,

        /// Queue name.
        name: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Append records, creating the queue on first use.
    Push {
        /// Directory holding the queue files.
        dir: PathBuf,

        /// Queue name.
        name: String,

        /// Records to append, in order.
        #[arg(required = true)]
        data: Vec<String>,

        /// Data region capacity in bytes for a new queue.
        #[arg(long)]
        max_size: Option<u32>,

        /// Fixed record size for a new queue.
        #[arg(long)]
        elem_size: Option<u16>,

        /// Exclusive upper bound on record length.
        #[arg(long)]
        max_elem_size: Option<u16>,

        /// JSON queue configuration; flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Records are hex strings.
        #[arg(long)]
        hex: bool,
    },

    /// Print the oldest record without removing it.
    Peek {
        /// Directory holding the queue files.
        dir: PathBuf,

        /// Queue name.
        name: String,

        /// Print records as hex.
        #[arg(long)]
        hex: bool,
    },

    /// Remove and print the oldest record.
    Pop {
        /// Directory holding the queue files.
        dir: PathBuf,

        /// Queue name.
        name: String,

        /// Print records as hex.
        #[arg(long)]
        hex: bool,
    },

    /// Remove and print every record, oldest first.
    Drain {
        /// Directory holding the queue files.
        dir: PathBuf,

        /// Queue name.
        name: String,

        /// Print records as hex.
        #[arg(long)]
        hex: bool,
    },

    /// Delete a queue and everything in it.
    Free {
        /// Directory holding the queue files.
        dir: PathBuf,

        /// Queue name.
        name: String,
    },
}

/// Settings for `push` that apply when the queue is created.
struct PushOptions {
    max_size: Option<u32>,
    elem_size: Option<u16>,
    max_elem_size: Option<u16>,
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { dir, name, json } => cmd_info(&dir, &name, json),
        Commands::Push {
            dir,
            name,
            data,
            max_size,
            elem_size,
            max_elem_size,
            config,
            hex,
        } => {
            let options = PushOptions {
                max_size,
                elem_size,
                max_elem_size,
                config,
            };
            cmd_push(&dir, &name, &data, &options, hex)
        }
        Commands::Peek { dir, name, hex } => cmd_peek(&dir, &name, hex),
        Commands::Pop { dir, name, hex } => cmd_pop(&dir, &name, hex),
        Commands::Drain { dir, name, hex } => cmd_drain(&dir, &name, hex),
        Commands::Free { dir, name } => cmd_free(&dir, &name),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Summary printed by `durq info`.
#[derive(Serialize)]
struct QueueInfo {
    name: String,
    path: PathBuf,
    medium: String,
    footprint: u64,
    data_offset: u32,
    max_size: u32,
    elem_size: Option<u16>,
    front_idx: u32,
    back_idx: u32,
    count: u16,
    size: u32,
    available_space: u32,
}

impl QueueInfo {
    fn new(name: &str, path: PathBuf, footprint: u64, header: &Header) -> Self {
        Self {
            name: name.to_string(),
            path,
            medium: format!("{:?}", header.kind).to_lowercase(),
            footprint,
            data_offset: header.data_offset(),
            max_size: header.max_size,
            elem_size: match header.elem_mode {
                ElemMode::Fixed(n) => Some(n),
                ElemMode::Variable => None,
            },
            front_idx: header.front_idx,
            back_idx: header.back_idx,
            count: header.count,
            size: space::occupied_net_bytes(header),
            available_space: space::available_space(header),
        }
    }
}

/// Mounts the volume at `dir` and checks that `name` exists there.
fn existing_volume(dir: &Path, name: &str) -> Result<DirVolume, Box<dyn Error>> {
    let mut volume = DirVolume::new(dir);
    volume.mount()?;
    if volume.stat(name)?.is_none() {
        return Err(format!("No queue '{name}' in '{}'", dir.display()).into());
    }
    Ok(volume)
}

/// The configuration a queue with this control block was created from.
fn persisted_config(header: &Header) -> QueueConfig {
    QueueConfig {
        max_size: header.max_size,
        elem_size: match header.elem_mode {
            ElemMode::Fixed(n) => Some(n),
            ElemMode::Variable => None,
        },
        max_elem_size: 0,
    }
}

/// Opens an existing queue with a configuration matching its control block.
fn open_existing(
    dir: &Path,
    name: &str,
) -> Result<(DirVolume, CircularQueue<FileMedium>), Box<dyn Error>> {
    let mut volume = existing_volume(dir, name)?;
    let header = header::read_header(&volume.open(name)?)?;

    let queue = CircularQueue::open(&mut volume, name, &persisted_config(&header))?;
    Ok((volume, queue))
}

/// Implements `durq info <dir> <name>`.
fn cmd_info(dir: &Path, name: &str, json: bool) -> CliResult {
    let mut volume = existing_volume(dir, name)?;
    let medium = volume.open(name)?;
    let header = header::read_header(&medium)?;
    let info = QueueInfo::new(name, medium.path().to_path_buf(), medium.len(), &header);

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Queue: {} ({})", info.name, info.path.display());
    println!("  Medium:       {}", info.medium);
    println!("  Footprint:    {} bytes", info.footprint);
    println!("  Data offset:  {}", info.data_offset);
    println!("  Capacity:     {} bytes", info.max_size);
    match info.elem_size {
        Some(n) => println!("  Records:      fixed, {n} bytes"),
        None => println!("  Records:      variable"),
    }
    println!();
    println!("  Front index:  {}", info.front_idx);
    println!("  Back index:   {}", info.back_idx);
    println!("  Count:        {}", info.count);
    println!("  Payload:      {} bytes", info.size);
    println!("  Available:    {} bytes", info.available_space);

    Ok(())
}

/// Resolves the configuration `push` opens a queue with.
///
/// An existing queue starts from its persisted control block, a new one from
/// the defaults. A config file or flags override either.
fn push_config(
    volume: &mut DirVolume,
    name: &str,
    options: &PushOptions,
) -> Result<QueueConfig, Box<dyn Error>> {
    let mut config = match &options.config {
        Some(path) => QueueConfig::load(path)?,
        None => match volume.stat(name)? {
            Some(len) if len > 0 => persisted_config(&header::read_header(&volume.open(name)?)?),
            _ => QueueConfig::default(),
        },
    };
    if let Some(n) = options.max_size {
        config.max_size = n;
    }
    if let Some(n) = options.elem_size {
        config.elem_size = Some(n);
    }
    if let Some(n) = options.max_elem_size {
        config.max_elem_size = n;
    }
    Ok(config)
}

/// Implements `durq push <dir> <name> <data>...`.
fn cmd_push(
    dir: &Path,
    name: &str,
    data: &[String],
    options: &PushOptions,
    hex: bool,
) -> CliResult {
    let records = data
        .iter()
        .map(|d| if hex { decode_hex(d) } else { Ok(d.as_bytes().to_vec()) })
        .collect::<Result<Vec<_>, _>>()?;

    let mut volume = DirVolume::new(dir);
    volume.mount()?;
    let config = push_config(&mut volume, name, options)?;
    let mut queue = CircularQueue::open(&mut volume, name, &config)?;
    for record in &records {
        queue.enqueue(record)?;
    }

    println!(
        "Pushed {} record(s); count {}, {} bytes available",
        records.len(),
        queue.len(),
        queue.available_space()
    );
    Ok(())
}

/// Implements `durq peek <dir> <name>`.
fn cmd_peek(dir: &Path, name: &str, hex: bool) -> CliResult {
    let (_volume, queue) = open_existing(dir, name)?;
    match queue.front()? {
        Some(record) => println!("{}", render(&record, hex)),
        None => println!("(empty)"),
    }
    Ok(())
}

/// Implements `durq pop <dir> <name>`.
fn cmd_pop(dir: &Path, name: &str, hex: bool) -> CliResult {
    let (_volume, mut queue) = open_existing(dir, name)?;
    match queue.dequeue()? {
        Some(record) => println!("{}", render(&record, hex)),
        None => println!("(empty)"),
    }
    Ok(())
}

/// Implements `durq drain <dir> <name>`.
fn cmd_drain(dir: &Path, name: &str, hex: bool) -> CliResult {
    let (_volume, mut queue) = open_existing(dir, name)?;
    let mut drained = 0usize;
    for record in queue.drain() {
        println!("{}", render(&record?, hex));
        drained += 1;
    }
    tracing::info!(queue = %name, drained, "drained queue");
    Ok(())
}

/// Implements `durq free <dir> <name>`.
fn cmd_free(dir: &Path, name: &str) -> CliResult {
    let (mut volume, queue) = open_existing(dir, name)?;
    let count = queue.len();
    queue.free(&mut volume, true)?;
    println!("Freed '{name}' ({count} record(s) discarded)");
    Ok(())
}

fn render(record: &[u8], hex: bool) -> String {
    if hex {
        encode_hex(record)
    } else {
        String::from_utf8_lossy(record).into_owned()
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Parses a hex string, with or without a `0x` prefix.
fn decode_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    if digits.len() % 2 != 0 {
        return Err(format!("Invalid hex '{input}': odd number of digits"));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("Invalid hex '{input}' at offset {i}"))
        })
        .collect()
}
