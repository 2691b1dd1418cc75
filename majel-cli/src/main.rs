//! Majel CLI - inspect Majel-1 chassis and MajelFS media from the command line.
//!
//! Usage:
//!   majel [--trace] <command> ...
//!
//! Examples:
//!   majel scan bench.zip                      # Probe the backplane
//!   majel ls disk.img                         # List directories
//!   majel ls disk.img SYS                     # List entries of SYS
//!   majel cat disk.img SYS/CONFIG             # Dump a file
//!   majel mkfs out.img -l BOOT -d SYS -f SYS/CONFIG=config.txt
//!   majel run bench.zip monitor.bin           # Run a Z80 program
//!   majel footprint --mfs-top 0x0100          # Show RAM windows

use std::cell::RefCell;
use std::collections::VecDeque;
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio::sync::mpsc as tokio_mpsc;

use majel_core::ioseek::IOTBL_SIZE;
use majel_core::memory::{IOTBL_DEFAULT_TOP, MFS_DEFAULT_TOP};
use majel_core::mfs::MFS_CACHE_SIZE;
use majel_core::package::parse_hex;
use majel_core::{
    load_chassis_from_path, storage_ports, Chassis, ExitReason, HeadlessConsole, HandleKind,
    ImageBuilder, Ioseek, Machine, MemoryPlan, Mfs, OpenMode, OpenTarget, SerialConsole,
};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Majel-1 storage tools
#[derive(Parser, Debug)]
#[command(name = "majel")]
#[command(about = "Inspect Majel-1 chassis and MajelFS media")]
struct Args {
    /// Trace port and driver activity on stderr
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe all backplane slots and print the device table
    Scan {
        /// Chassis package (.zip), manifest (.json) or medium image
        chassis: PathBuf,
    },
    /// List directories, or the entries of one directory
    Ls {
        chassis: PathBuf,
        /// Directory label
        dir: Option<String>,
    },
    /// Write a file's contents to stdout
    Cat {
        chassis: PathBuf,
        /// NAME or DIR/NAME
        path: String,
    },
    /// Format a new medium image
    Mkfs {
        /// Output image file
        output: PathBuf,
        /// Volume label
        #[arg(short, long, default_value = "MAJEL")]
        label: String,
        /// Directory to create (up to three)
        #[arg(short, long = "dir")]
        dirs: Vec<String>,
        /// File to add, as DIR/NAME=HOST_PATH
        #[arg(short, long = "file")]
        files: Vec<String>,
        /// Minimum medium size in blocks
        #[arg(short, long, default_value_t = 0)]
        blocks: u64,
    },
    /// Run a Z80 program against the chassis
    Run {
        chassis: PathBuf,
        /// Raw binary to load
        program: PathBuf,
        /// Load and start address (hex)
        #[arg(long, default_value = "0x0400")]
        origin: String,
        /// Stop after this many T-states
        #[arg(long, default_value_t = 100_000_000)]
        limit: u64,
    },
    /// Show where the driver records live in RAM
    Footprint {
        #[arg(long)]
        mfs_top: Option<String>,
        #[arg(long)]
        iotbl_top: Option<String>,
    },
}

/// Serial console fed by the terminal input task.
struct ChannelConsole {
    /// Receiver for keyboard input
    key_rx: mpsc::Receiver<u8>,
    /// Keys received but not yet read
    key_buffer: RefCell<VecDeque<u8>>,
}

impl ChannelConsole {
    fn new(key_rx: mpsc::Receiver<u8>) -> Self {
        Self {
            key_rx,
            key_buffer: RefCell::new(VecDeque::new()),
        }
    }

    fn pump(&self) {
        self.key_buffer.borrow_mut().extend(self.key_rx.try_iter());
    }
}

impl SerialConsole for ChannelConsole {
    fn write(&mut self, ch: u8) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        match ch {
            0x0A => {
                // LF - raw mode needs the carriage return too
                let _ = handle.write_all(b"\r\n");
            }
            0x08 => {
                // Backspace
                let _ = handle.write_all(b"\x08 \x08");
            }
            _ => {
                let _ = handle.write_all(&[ch]);
            }
        }
        let _ = handle.flush();
    }

    fn has_key(&self) -> bool {
        self.available() > 0
    }

    fn get_key(&mut self) -> Option<u8> {
        self.pump();
        self.key_buffer.borrow_mut().pop_front()
    }

    fn available(&self) -> usize {
        self.pump();
        self.key_buffer.borrow().len()
    }
}

/// Translate crossterm key events to serial line bytes.
fn translate_key(code: KeyCode, modifiers: KeyModifiers) -> Option<u8> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char(c) = code {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() {
                return Some(upper as u8 - 64); // Ctrl+A=1, Ctrl+C=3, etc.
            }
        }
    }

    match code {
        KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
        KeyCode::Enter => Some(13),
        KeyCode::Backspace => Some(8),
        KeyCode::Tab => Some(9),
        KeyCode::Esc => Some(27),
        _ => None,
    }
}

/// Load a chassis, scan it and connect MFS to its storage card.
fn mount(path: &Path, trace: bool) -> CliResult<(Chassis, Mfs)> {
    let mut chassis = load_chassis_from_path(path)?.build()?;
    let mut ioseek = Ioseek::new();
    ioseek.trace = trace;
    ioseek.scan(&mut chassis);

    let ports = storage_ports(ioseek.table())?;
    let mut mfs = Mfs::new();
    mfs.trace = trace;
    mfs.connect(&mut chassis, ports)?;
    Ok((chassis, mfs))
}

fn scan(path: &Path, trace: bool) -> CliResult<()> {
    let loaded = load_chassis_from_path(path)?;
    let mut chassis = loaded.build()?;
    let mut ioseek = Ioseek::new();
    ioseek.trace = trace;
    let found = ioseek.scan(&mut chassis);

    for slot in 0..8u8 {
        let did = ioseek.table().get(slot);
        let card = chassis.card(slot).map_or("-", |c| c.name());
        if did == 0 {
            println!("slot {}  {:<8} absent", slot, card);
        } else {
            println!("slot {}  {:<8} DID {:#04X}", slot, card, did);
        }
    }
    println!("{} device(s)", found);
    Ok(())
}

fn ls(path: &Path, dir: Option<&str>, trace: bool) -> CliResult<()> {
    let (mut chassis, mut mfs) = mount(path, trace)?;
    let dirs = mfs.directories(&mut chassis)?;

    let Some(dir) = dir else {
        println!("Volume {}", mfs.label());
        for d in &dirs {
            println!("  [{}] {}", d.slot, d.label);
        }
        return Ok(());
    };

    let slot = dirs
        .iter()
        .find(|d| d.label.eq_ignore_ascii_case(dir))
        .map(|d| d.slot)
        .ok_or_else(|| format!("No directory {}", dir))?;
    mfs.open(&mut chassis, OpenTarget::Directory(slot), OpenMode::Read)?;
    while let Some(entry) = mfs.next_entry(&mut chassis)? {
        println!(
            "{:>3}  {:<31} {:>10}  @{}",
            entry.index, entry.label, entry.length, entry.data_block
        );
    }
    mfs.close();
    Ok(())
}

fn cat(path: &Path, file: &str, trace: bool) -> CliResult<()> {
    let (mut chassis, mut mfs) = mount(path, trace)?;
    let handle = mfs.open(&mut chassis, OpenTarget::Path(file), OpenMode::Read)?;
    if handle.kind != HandleKind::File {
        return Err(format!("{} is not a file", file).into());
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut buf = [0u8; 256];
    loop {
        let n = mfs.read(&mut chassis, &mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
    }
    out.flush()?;
    mfs.close();
    Ok(())
}

fn mkfs(
    output: &Path,
    label: &str,
    dirs: &[String],
    files: &[String],
    blocks: u64,
) -> CliResult<()> {
    let mut builder = ImageBuilder::new(label).min_blocks(blocks);
    for dir in dirs {
        builder = builder.directory(dir);
    }
    for arg in files {
        let (target, host) = arg
            .split_once('=')
            .ok_or_else(|| format!("Expected DIR/NAME=HOST_PATH, got {}", arg))?;
        let (dir, name) = target
            .split_once('/')
            .ok_or_else(|| format!("Expected DIR/NAME, got {}", target))?;
        builder = builder.file(dir, name, std::fs::read(host)?);
    }

    let image = builder.build()?;
    std::fs::write(output, &image)?;
    eprintln!(
        "Wrote {} ({} blocks)",
        output.display(),
        image.len() / majel_core::mfs::BLOCK_SIZE
    );
    Ok(())
}

fn footprint(mfs_top: Option<&str>, iotbl_top: Option<&str>) -> CliResult<()> {
    let mfs_top = mfs_top.map(parse_hex).transpose()?.unwrap_or(MFS_DEFAULT_TOP);
    let iotbl_top = iotbl_top
        .map(parse_hex)
        .transpose()?
        .unwrap_or(IOTBL_DEFAULT_TOP);
    let plan = MemoryPlan::new(mfs_top, iotbl_top)?;

    println!(
        "MFS cache  {:#06X}..{:#06X}  {:>3} bytes",
        plan.mfs.start, plan.mfs.end, MFS_CACHE_SIZE
    );
    println!(
        "IOTBL      {:#06X}..{:#06X}  {:>3} bytes",
        plan.iotbl.start, plan.iotbl.end, IOTBL_SIZE
    );
    Ok(())
}

async fn run(
    path: &Path,
    program: &Path,
    origin: &str,
    limit: u64,
    trace: bool,
) -> CliResult<()> {
    let origin = u16::try_from(parse_hex(origin)?)?;
    let program_data = std::fs::read(program)?;
    let loaded = load_chassis_from_path(path)?;
    let plan = loaded.memory_plan()?;

    // Create channel for keyboard input; the first serial card gets it
    let (key_tx, key_rx) = mpsc::channel::<u8>();
    let mut key_rx = Some(key_rx);
    let mut chassis = loaded.build_with(|| -> Box<dyn SerialConsole> {
        match key_rx.take() {
            Some(rx) => Box::new(ChannelConsole::new(rx)),
            None => Box::new(HeadlessConsole::new()),
        }
    })?;

    let mut ioseek = Ioseek::new();
    ioseek.trace = trace;
    let found = ioseek.scan(&mut chassis);
    eprintln!("IOSEEK: {} device(s)", found);

    let mut mfs = Mfs::new();
    mfs.trace = trace;
    match storage_ports(ioseek.table()) {
        Ok(ports) => match mfs.connect(&mut chassis, ports) {
            Ok(()) => eprintln!("MFS: mounted {}", mfs.label()),
            Err(e) => eprintln!("MFS: {} ({:#04X})", e, e.code()),
        },
        Err(_) => eprintln!("MFS: no storage card"),
    }

    // Create shutdown signal
    let (shutdown_tx, mut shutdown_rx) = tokio_mpsc::channel::<()>(1);

    // Enable raw mode (gracefully handle non-TTY)
    let raw_mode_enabled = enable_raw_mode().is_ok();

    let table = *ioseek.table();
    let state = *mfs.state();
    let machine_handle = tokio::task::spawn_blocking(move || {
        let mut machine = Machine::new(chassis);
        machine.trace = trace;
        machine.install(&plan, &state, &table)?;
        machine.load_at(origin, &program_data);
        machine.run_from(origin, limit)
    });

    // Spawn terminal input reader
    let input_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(10)) => {
                    if event::poll(Duration::from_millis(0)).unwrap_or(false) {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if let Some(ch) = translate_key(key_event.code, key_event.modifiers) {
                                if key_tx.send(ch).is_err() {
                                    break; // Channel closed
                                }
                            }
                        }
                    }
                }
            }
        }
    });

    // Wait for the machine to stop
    let result = machine_handle.await?;

    let _ = shutdown_tx.send(()).await;
    let _ = input_handle.await;

    if raw_mode_enabled {
        let _ = disable_raw_mode();
    }

    let info = result?;
    match info.reason {
        ExitReason::Halt => eprintln!(
            "\nHalted at {:#06X} after {} T-states",
            info.pc, info.t_states
        ),
        ExitReason::Limit => eprintln!("\nStopped at {:#06X}: T-state limit", info.pc),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let args = Args::parse();
    let trace = args.trace;

    let result = match args.command {
        Command::Scan { chassis } => scan(&chassis, trace),
        Command::Ls { chassis, dir } => ls(&chassis, dir.as_deref(), trace),
        Command::Cat { chassis, path } => cat(&chassis, &path, trace),
        Command::Mkfs {
            output,
            label,
            dirs,
            files,
            blocks,
        } => mkfs(&output, &label, &dirs, &files, blocks),
        Command::Run {
            chassis,
            program,
            origin,
            limit,
        } => run(&chassis, &program, &origin, limit, trace).await,
        Command::Footprint { mfs_top, iotbl_top } => {
            footprint(mfs_top.as_deref(), iotbl_top.as_deref())
        }
    };

    if let Err(e) = &result {
        eprintln!("Error: {}", e);
    }
    result
}
