//! Sink adapter: maps emissions onto stdout, one file, or a directory tree.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use zivi_shared::{Result, ZiviError};

use crate::assembler::{Emission, Layout, Target};

/// Where output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMode {
    Stdout,
    /// Append to (or create) a single file.
    File(PathBuf),
    /// One file per unit, or per channel for tables, below a directory.
    Directory(PathBuf),
}

impl SinkMode {
    pub fn layout(&self) -> Layout {
        match self {
            Self::Stdout | Self::File(_) => Layout::Stream,
            Self::Directory(_) => Layout::Directory,
        }
    }
}

/// Concrete write resolved from an emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    Stdout,
    Append(PathBuf),
    /// Create or truncate.
    Create(PathBuf),
}

/// Resolve where `emission` is written under `mode`.
///
/// In directory mode a unit lands in `{dir}/{title}.{ext}`, and a channel's
/// shared output in `{dir}/{channel}.{ext}`, created on its first write and
/// appended to afterwards.
pub fn resolve(mode: &SinkMode, emission: &Emission) -> WriteTarget {
    match mode {
        SinkMode::Stdout => WriteTarget::Stdout,
        SinkMode::File(path) => WriteTarget::Append(path.clone()),
        SinkMode::Directory(dir) => match &emission.target {
            Target::Unit(title) => {
                WriteTarget::Create(dir.join(format!("{title}.{}", emission.extension)))
            }
            Target::Channel { fresh } => {
                let path = dir.join(format!("{}.{}", emission.channel, emission.extension));
                if *fresh {
                    WriteTarget::Create(path)
                } else {
                    WriteTarget::Append(path)
                }
            }
        },
    }
}

/// The single writer of a run's output.
pub struct Sink {
    mode: SinkMode,
    stdout: Box<dyn Write + Send>,
}

impl Sink {
    pub fn new(mode: SinkMode) -> Self {
        Self::with_stdout(mode, Box::new(std::io::stdout()))
    }

    /// Use `stdout` in place of the process's standard output.
    pub fn with_stdout(mode: SinkMode, stdout: Box<dyn Write + Send>) -> Self {
        Self { mode, stdout }
    }

    pub fn mode(&self) -> &SinkMode {
        &self.mode
    }

    pub fn layout(&self) -> Layout {
        self.mode.layout()
    }

    /// Write `emission` to its resolved target, creating parent directories.
    pub fn write(&mut self, emission: &Emission) -> Result<()> {
        match resolve(&self.mode, emission) {
            WriteTarget::Stdout => {
                self.stdout
                    .write_all(&emission.bytes)
                    .and_then(|()| self.stdout.flush())
                    .map_err(|e| ZiviError::io("<stdout>", e))?;
            }
            WriteTarget::Append(path) => write_file(&path, &emission.bytes, true)?,
            WriteTarget::Create(path) => write_file(&path, &emission.bytes, false)?,
        }
        Ok(())
    }

    /// Write each emission that a transition produced.
    pub fn write_all<I>(&mut self, emissions: I) -> Result<()>
    where
        I: IntoIterator<Item = Emission>,
    {
        for emission in emissions {
            self.write(&emission)?;
        }
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8], append: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ZiviError::io(parent, e))?;
    }

    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }

    let mut file = options.open(path).map_err(|e| ZiviError::io(path, e))?;
    file.write_all(bytes).map_err(|e| ZiviError::io(path, e))?;

    debug!(path = %path.display(), bytes = bytes.len(), append, "output written");
    Ok(())
}
