//! Host-side tool for poking at FAT32 volume images with the same driver the
//! kernel uses.

use std::io::Write as _;
use std::process::exit;

use fat32::fd::FileDescriptor;
use fat32::{ClusterNumber, FatEntry, FatError, FatFileDescriptor, Volume};

/// Logs to stderr, colored by level.
struct Logger;

static LOGGER: Logger = Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let color = match record.level() {
                log::Level::Error => 31,
                log::Level::Warn => 33,
                log::Level::Info => 32,
                log::Level::Debug | log::Level::Trace => 37,
            };
            eprintln!("\x1b[{color}m[{}]\x1b[0m {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging(verbose: bool) {
    log::set_logger(&LOGGER).expect("logger already set");
    log::set_max_level(if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
}

const USAGE: &str = "Usage: fat32-inspect [-v] <image> <command>

Commands:
    info                 print volume geometry
    ls [PATH]            list a directory (default /)
    cat PATH             print a file to stdout
    put PATH HOSTFILE    write HOSTFILE into the image at PATH";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (verbose, args) = match &args[..] {
        [flag, rest @ ..] if flag == "-v" => (true, rest),
        rest => (false, rest),
    };
    init_logging(verbose);

    let (image_path, command) = match args {
        [image_path, command @ ..] if !command.is_empty() => (image_path, command),
        _ => {
            eprintln!("{USAGE}");
            exit(2);
        }
    };

    let mut image = std::fs::read(image_path).unwrap_or_else(|err| {
        eprintln!("failed to read {image_path}: {err}");
        exit(1);
    });

    let result = Volume::mount(&mut image).and_then(|mut volume| run(&mut volume, command));
    let dirty = match result {
        Ok(dirty) => dirty,
        Err(err) => {
            eprintln!("fat32-inspect: {err}");
            exit(1);
        }
    };

    if dirty {
        if let Err(err) = std::fs::write(image_path, &image) {
            eprintln!("failed to write {image_path}: {err}");
            exit(1);
        }
        log::info!("saved {image_path}");
    }
}

/// Runs one command. Returns whether the image was modified.
fn run(volume: &mut Volume, command: &[String]) -> Result<bool, FatError> {
    match command {
        [cmd] if cmd == "info" => {
            info(volume);
            Ok(false)
        }
        [cmd] if cmd == "ls" => ls(volume, "/").map(|()| false),
        [cmd, path] if cmd == "ls" => ls(volume, path).map(|()| false),
        [cmd, path] if cmd == "cat" => cat(volume, path).map(|()| false),
        [cmd, path, host_file] if cmd == "put" => put(volume, path, host_file).map(|()| true),
        _ => {
            eprintln!("{USAGE}");
            exit(2);
        }
    }
}

fn info(volume: &Volume) {
    let params = volume.params();
    let free = (ClusterNumber::FIRST_DATA.0..params.cluster_limit())
        .filter(|&cluster| volume.fat_entry(ClusterNumber(cluster)) == FatEntry::Free)
        .count();

    println!("bytes per sector:    {}", params.bytes_per_sector);
    println!("sectors per cluster: {}", params.sectors_per_cluster);
    println!("bytes per cluster:   {}", params.bytes_per_cluster);
    println!("FAT copies:          {}", params.fat_count);
    match params.active_fat {
        Some(active) => println!("active FAT:          {active}"),
        None => println!("active FAT:          all (mirrored)"),
    }
    println!("FAT offset:          {:#x}", params.fat_offset);
    println!("FAT size:            {:#x}", params.fat_size);
    println!("data offset:         {:#x}", params.data_offset);
    println!("clusters:            {} ({free} free)", params.cluster_count);
    println!("root cluster:        {}", params.root_cluster.0);
}

fn ls(volume: &Volume, path: &str) -> Result<(), FatError> {
    let dir = volume.open_directory(path)?;
    for (_, entry) in volume.read_dir(dir) {
        if entry.is_directory() {
            println!("{:<12} {:>10}  cluster {}", entry.name, "<DIR>", entry.first_cluster());
        } else {
            println!(
                "{:<12} {:>10}  cluster {}",
                entry.name,
                entry.file_size(),
                entry.first_cluster()
            );
        }
    }
    Ok(())
}

fn cat(volume: &mut Volume, path: &str) -> Result<(), FatError> {
    let mut fd = volume.open(path)?;
    let mut stdout = std::io::stdout().lock();
    let mut buf = vec![0u8; 4096];
    loop {
        let n = fd.read(&mut buf);
        if n == 0 {
            break;
        }
        if let Err(err) = stdout.write_all(&buf[..n]) {
            log::error!("failed to write to stdout: {err}");
            break;
        }
    }
    Ok(())
}

fn put(volume: &mut Volume, path: &str, host_file: &str) -> Result<(), FatError> {
    let contents = std::fs::read(host_file).unwrap_or_else(|err| {
        eprintln!("failed to read {host_file}: {err}");
        exit(1);
    });

    let location = match volume.open_entry(path) {
        Ok(location) => location,
        Err(FatError::NotFound) => volume.create_file(path)?,
        Err(err) => return Err(err),
    };
    let mut fd = FatFileDescriptor::new(volume, location);
    if fd.size() > contents.len() {
        log::warn!(
            "{path} is {} bytes; files never shrink, so the tail of the old contents stays",
            fd.size()
        );
    }

    // A short write still changed the image, so it is saved either way.
    let written = fd.write(&contents);
    if written < contents.len() {
        log::error!("{}: wrote only {written} of {} bytes", FatError::NoSpace, contents.len());
    } else {
        log::info!("wrote {written} bytes to {path}");
    }
    Ok(())
}
