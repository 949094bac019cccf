use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Appends to `update.log`, reopening it if it is removed while the updater runs.
struct ReopeningLogFile {
    path: PathBuf,
    file: File,
}

impl ReopeningLogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self { path, file })
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for ReopeningLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.file = open_append(&self.path)?;
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Keep only the newer half of a log larger than `max_log_size`, starting at
/// a line boundary. Returns whether anything was dropped.
fn trim_log(log_path: &Path, max_log_size: u64) -> io::Result<bool> {
    let size = match std::fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    if size <= max_log_size {
        return Ok(false);
    }

    let contents = std::fs::read(log_path)?;
    let half = contents.len() / 2;
    let keep_from = contents[half..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(contents.len(), |pos| half + pos + 1);
    std::fs::write(log_path, &contents[keep_from..])?;
    Ok(true)
}

fn file_level(debug_enabled: bool) -> LevelFilter {
    if debug_enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Log stage transitions and errors to `log_path`; with `debug_enabled`, log
/// at debug level and mirror everything to the terminal.
pub fn init_logging(log_path: &Path, debug_enabled: bool, max_log_size: u64) {
    let trimmed = match trim_log(log_path, max_log_size) {
        Ok(trimmed) => trimmed,
        Err(error) => {
            eprintln!("Could not trim log file {}: {error}", log_path.display());
            false
        }
    };

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("seekdesk")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    match ReopeningLogFile::open(log_path.to_path_buf()) {
        Ok(writer) => loggers.push(WriteLogger::new(
            file_level(debug_enabled),
            config.clone(),
            writer,
        )),
        Err(error) => eprintln!("Could not open log file {}: {error}", log_path.display()),
    }

    if debug_enabled {
        loggers.push(TermLogger::new(
            LevelFilter::Debug,
            config,
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }

    if trimmed {
        log::info!("Trimmed {} to stay under {max_log_size} bytes", log_path.display());
    }
    if debug_enabled {
        log::info!(
            "Debug logging initialized, log file: {}",
            log_path.display()
        );
    }
}
