use core::fmt;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::*;

const INTERRUPT_RETRIES: u32 = 5;
const INTERRUPT_BACKOFF: Duration = Duration::from_millis(2);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker #{}", self.0)
    }
}

/// Moves a winning layout from a search worker to the coordinator.
///
/// Every worker owns one slot. A slot is written at most once, by its worker,
/// and read or discarded at most once, by the coordinator.
pub trait Handoff: Sync {
    fn publish(&self, worker: WorkerId, layout: &MineLayout) -> Result<()>;

    /// Reads the slot and removes it. `size` is the field the layout belongs to.
    fn claim(&self, worker: WorkerId, size: Coord2) -> Result<MineLayout>;

    /// Removes the slot unread. A slot that was never written or is already
    /// gone is not an error.
    fn discard(&self, worker: WorkerId) -> Result<()>;
}

/// In-process slots behind a mutex.
#[derive(Debug, Default)]
pub struct MemoryHandoff {
    slots: Mutex<HashMap<WorkerId, MineLayout>>,
}

impl MemoryHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<WorkerId, MineLayout>> {
        // slots stay consistent even if a holder panicked
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Handoff for MemoryHandoff {
    fn publish(&self, worker: WorkerId, layout: &MineLayout) -> Result<()> {
        let mut slots = self.slots();
        if slots.contains_key(&worker) {
            return Err(SecurityFault::DuplicateArtifact { worker }.into());
        }
        slots.insert(worker, layout.clone());
        Ok(())
    }

    fn claim(&self, worker: WorkerId, size: Coord2) -> Result<MineLayout> {
        let layout = self
            .slots()
            .remove(&worker)
            .ok_or(GameError::MissingArtifact { worker })?;
        if layout.size() != size {
            return Err(SecurityFault::MalformedArtifact { worker }.into());
        }
        Ok(layout)
    }

    fn discard(&self, worker: WorkerId) -> Result<()> {
        self.slots().remove(&worker);
        Ok(())
    }
}

/// One file per slot, named `{stem}-{suffix:016x}-{worker}` inside `dir`.
///
/// Files are created exclusively and, on unix, readable by the owner only.
/// Each line holds one mine as `"{x} {y}"`.
#[derive(Clone, Debug)]
pub struct FileHandoff {
    dir: PathBuf,
    stem: String,
    suffix: u64,
}

impl FileHandoff {
    /// Picks a fresh random suffix, so two handoffs never share file names.
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            suffix: rand::random(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, worker: WorkerId) -> PathBuf {
        self.dir
            .join(format!("{}-{:016x}-{}", self.stem, self.suffix, worker.0))
    }

    fn create_exclusive(path: &Path) -> io::Result<fs::File> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.open(path)
    }
}

impl Handoff for FileHandoff {
    fn publish(&self, worker: WorkerId, layout: &MineLayout) -> Result<()> {
        let path = self.artifact_path(worker);

        let mut file = retry_interrupted(|| Self::create_exclusive(&path)).map_err(|err| {
            if err.kind() == io::ErrorKind::Interrupted {
                return GameError::io("create handoff artifact", &err);
            }
            log::error!("Exclusive create of {} failed: {}", path.display(), err);
            SecurityFault::ArtifactCreate {
                path: path.clone(),
                kind: err.kind(),
            }
            .into()
        })?;

        let content: String = layout
            .mines()
            .iter()
            .map(|(x, y)| format!("{} {}\n", x, y))
            .collect();
        retry_interrupted(|| file.write_all(content.as_bytes()))
            .map_err(|err| GameError::io("write handoff artifact", &err))?;
        retry_interrupted(|| file.sync_all())
            .map_err(|err| GameError::io("sync handoff artifact", &err))?;

        log::trace!("{} published {}", worker, path.display());
        Ok(())
    }

    fn claim(&self, worker: WorkerId, size: Coord2) -> Result<MineLayout> {
        let path = self.artifact_path(worker);

        let content = retry_interrupted(|| fs::read_to_string(&path)).map_err(|err| {
            match err.kind() {
                io::ErrorKind::NotFound => GameError::MissingArtifact { worker },
                // not valid UTF-8
                io::ErrorKind::InvalidData => SecurityFault::MalformedArtifact { worker }.into(),
                _ => GameError::io("read handoff artifact", &err),
            }
        });
        // the slot is consumed even when its content turns out to be bad
        let removed = retry_interrupted(|| fs::remove_file(&path));
        let content = content?;
        removed.map_err(|err| GameError::io("remove handoff artifact", &err))?;

        let mines = content
            .lines()
            .map(parse_mine)
            .collect::<Option<Vec<_>>>()
            .ok_or(SecurityFault::MalformedArtifact { worker })?;
        MineLayout::new(size, mines).map_err(|err| {
            log::error!("{} handed off an invalid layout: {}", worker, err);
            SecurityFault::MalformedArtifact { worker }.into()
        })
    }

    fn discard(&self, worker: WorkerId) -> Result<()> {
        match retry_interrupted(|| fs::remove_file(self.artifact_path(worker))) {
            Ok(()) => {
                log::trace!("Discarded artifact of {}", worker);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(GameError::io("discard handoff artifact", &err)),
        }
    }
}

fn parse_mine(line: &str) -> Option<Coord2> {
    let mut parts = line.split(' ');
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    match parts.next() {
        None => Some((x, y)),
        Some(_) => None,
    }
}

/// Runs `op` again when it is interrupted, a bounded number of times with a
/// growing pause, then hands back whatever it last returned.
pub(crate) fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(err) if err.kind() == io::ErrorKind::Interrupted && attempt < INTERRUPT_RETRIES => {
                attempt += 1;
                log::debug!("Interrupted I/O, retry {}/{}", attempt, INTERRUPT_RETRIES);
                std::thread::sleep(INTERRUPT_BACKOFF * attempt);
            }
            result => return result,
        }
    }
}
