//! Snapshot files: naming, discovery, cleanup and the replay-memory codec.
//!
//! A snapshot prefix such as `runs/agent0` names a family of files in the
//! prefix's directory:
//!
//! - `agent0_{role}_iter_{N}.weights` and `agent0_{role}_iter_{N}.solverstate`
//!   for `role` in `actor`, `critic`, `semantic`
//! - `agent0_iter_{N}.replaymemory`
//!
//! High-score snapshots use the prefix `agent0_HiScore{score}`.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{HermesError, Result};
use crate::transition::Transition;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Actor,
    Critic,
    Semantic,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Actor, Role::Critic, Role::Semantic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Actor => "actor",
            Role::Critic => "critic",
            Role::Semantic => "semantic",
        }
    }

    fn parse(s: &str) -> Option<Role> {
        Role::ALL.iter().copied().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One kind of file in a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Artifact {
    Weights(Role),
    SolverState(Role),
    ReplayMemory,
}

impl Artifact {
    pub fn file_name(&self, stem: &str, iter: usize) -> String {
        match self {
            Artifact::Weights(role) => format!("{}_{}_iter_{}.weights", stem, role, iter),
            Artifact::SolverState(role) => format!("{}_{}_iter_{}.solverstate", stem, role, iter),
            Artifact::ReplayMemory => format!("{}_iter_{}.replaymemory", stem, iter),
        }
    }

    /// Inverse of [`Artifact::file_name`]. Files of other prefixes (including
    /// `{stem}_HiScore...`) and temporaries do not parse.
    pub fn parse(stem: &str, file_name: &str) -> Option<(Artifact, usize)> {
        let rest = file_name.strip_prefix(stem)?.strip_prefix('_')?;
        let (body, extension) = rest.rsplit_once('.')?;
        let (role, iter) = body.rsplit_once("iter_")?;
        if iter.is_empty() || !iter.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let iter = iter.parse().ok()?;
        let artifact = match (role, extension) {
            ("", "replaymemory") => Artifact::ReplayMemory,
            (role, "weights") => Artifact::Weights(Role::parse(role.strip_suffix('_')?)?),
            (role, "solverstate") => Artifact::SolverState(Role::parse(role.strip_suffix('_')?)?),
            _ => return None,
        };
        Some((artifact, iter))
    }
}

/// Directory and file-name stem of a snapshot prefix.
fn split_prefix(prefix: &str) -> (PathBuf, String) {
    let path = Path::new(prefix);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (dir, stem)
}

pub fn artifact_path(prefix: &str, artifact: Artifact, iter: usize) -> PathBuf {
    let (dir, stem) = split_prefix(prefix);
    dir.join(artifact.file_name(&stem, iter))
}

/// Create the directory a prefix lives in.
pub fn ensure_prefix_dir(prefix: &str) -> Result<()> {
    let (dir, _) = split_prefix(prefix);
    fs::create_dir_all(dir)?;
    Ok(())
}

fn file_names(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push((name.to_string(), entry.path()));
        }
    }
    Ok(names)
}

/// Every snapshot file of `prefix`, with its iteration.
pub fn list_artifacts(prefix: &str) -> Result<Vec<(Artifact, usize, PathBuf)>> {
    let (dir, stem) = split_prefix(prefix);
    Ok(file_names(&dir)?
        .into_iter()
        .filter_map(|(name, path)| Artifact::parse(&stem, &name).map(|(artifact, iter)| (artifact, iter, path)))
        .collect())
}

/// Files making up one restorable snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotSet {
    pub iter: usize,
    pub actor_weights: PathBuf,
    pub actor_solver: PathBuf,
    pub critic_weights: PathBuf,
    pub critic_solver: PathBuf,
    pub semantic_weights: Option<PathBuf>,
    pub semantic_solver: Option<PathBuf>,
    pub replay_memory: Option<PathBuf>,
}

/// The highest iteration of `prefix` with actor and critic weights and solver
/// states, plus a replay memory when `load_solver` is set. Incomplete
/// iterations are skipped.
pub fn find_latest_snapshot(prefix: &str, load_solver: bool) -> Result<Option<SnapshotSet>> {
    let mut by_iter: BTreeMap<usize, HashMap<Artifact, PathBuf>> = BTreeMap::new();
    for (artifact, iter, path) in list_artifacts(prefix)? {
        by_iter.entry(iter).or_default().insert(artifact, path);
    }

    for (&iter, files) in by_iter.iter().rev() {
        let get = |artifact: Artifact| files.get(&artifact).cloned();
        let required = (
            get(Artifact::Weights(Role::Actor)),
            get(Artifact::SolverState(Role::Actor)),
            get(Artifact::Weights(Role::Critic)),
            get(Artifact::SolverState(Role::Critic)),
        );
        let (actor_weights, actor_solver, critic_weights, critic_solver) = match required {
            (Some(aw), Some(asv), Some(cw), Some(csv)) => (aw, asv, cw, csv),
            _ => {
                log::debug!("skipping incomplete snapshot {} at iteration {}", prefix, iter);
                continue;
            }
        };
        let replay_memory = get(Artifact::ReplayMemory);
        if load_solver && replay_memory.is_none() {
            log::debug!("snapshot {} at iteration {} has no replay memory", prefix, iter);
            continue;
        }
        return Ok(Some(SnapshotSet {
            iter,
            actor_weights,
            actor_solver,
            critic_weights,
            critic_solver,
            semantic_weights: get(Artifact::Weights(Role::Semantic)),
            semantic_solver: get(Artifact::SolverState(Role::Semantic)),
            replay_memory,
        }));
    }
    Ok(None)
}

/// Delete every file of `prefix` whose iteration is strictly below `iter`.
/// Returns how many were removed.
pub fn remove_snapshots(prefix: &str, iter: usize) -> Result<usize> {
    let mut removed = 0;
    for (_, file_iter, path) in list_artifacts(prefix)? {
        if file_iter < iter {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        log::info!("removed {} snapshot files of {} older than iteration {}", removed, prefix, iter);
    }
    Ok(removed)
}

pub fn hiscore_prefix(prefix: &str, score: i64) -> String {
    format!("{}_HiScore{}", prefix, score)
}

fn parse_hiscore(stem: &str, file_name: &str) -> Option<i64> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix("_HiScore")?;
    let (score, _) = rest.split_once('_')?;
    score.parse().ok()
}

/// Best score among the high-score snapshots of `prefix`.
pub fn find_hiscore(prefix: &str) -> Result<Option<i64>> {
    let (dir, stem) = split_prefix(prefix);
    Ok(file_names(&dir)?
        .iter()
        .filter_map(|(name, _)| parse_hiscore(&stem, name))
        .max())
}

/// Delete high-score snapshot files of `prefix` scoring below `score`.
pub fn remove_hiscores_below(prefix: &str, score: i64) -> Result<usize> {
    let (dir, stem) = split_prefix(prefix);
    let mut removed = 0;
    for (name, path) in file_names(&dir)? {
        if matches!(parse_hiscore(&stem, &name), Some(s) if s < score) {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Files written beside their destinations and moved into place together.
/// Whatever has not been moved when this is dropped is deleted.
///
/// Existing destinations are replaced. If any move fails, the destinations
/// already replaced get their previous contents back.
#[derive(Default)]
pub struct StagedWrite {
    staged: Vec<(PathBuf, PathBuf)>,
}

impl StagedWrite {
    pub fn new() -> Self {
        StagedWrite::default()
    }

    /// Write the file destined for `destination` through `write`, which
    /// receives the temporary path to write to.
    pub fn stage<F>(&mut self, destination: PathBuf, write: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let temporary = sibling(&destination, ".tmp");
        self.staged.push((temporary.clone(), destination));
        write(&temporary)
    }

    /// Move every staged file into place. Returns the final paths.
    pub fn commit(mut self) -> Result<Vec<PathBuf>> {
        // (destination, backup of what it replaced)
        let mut moved: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(self.staged.len());
        let mut pending = std::mem::take(&mut self.staged).into_iter();
        while let Some((temporary, destination)) = pending.next() {
            if let Err(err) = Self::replace(&temporary, &destination, &mut moved) {
                self.staged = std::iter::once((temporary, destination)).chain(pending).collect();
                Self::roll_back(moved);
                return Err(err);
            }
        }
        let mut committed = Vec::with_capacity(moved.len());
        for (destination, backup) in moved {
            if let Some(backup) = backup {
                if let Err(err) = fs::remove_file(&backup) {
                    log::warn!("could not remove {}: {}", backup.display(), err);
                }
            }
            committed.push(destination);
        }
        Ok(committed)
    }

    fn replace(temporary: &Path, destination: &Path, moved: &mut Vec<(PathBuf, Option<PathBuf>)>) -> Result<()> {
        if !temporary.is_file() {
            return Err(HermesError::IoError(format!("nothing staged at {}", temporary.display())));
        }
        let backup = if destination.exists() {
            let backup = sibling(destination, ".bak");
            fs::rename(destination, &backup)?;
            Some(backup)
        } else {
            None
        };
        if let Err(err) = fs::rename(temporary, destination) {
            if let Some(backup) = &backup {
                if let Err(restore) = fs::rename(backup, destination) {
                    log::error!("could not restore {}: {}", destination.display(), restore);
                }
            }
            return Err(err.into());
        }
        moved.push((destination.to_path_buf(), backup));
        Ok(())
    }

    fn roll_back(moved: Vec<(PathBuf, Option<PathBuf>)>) {
        for (destination, backup) in moved.into_iter().rev() {
            let restored = match &backup {
                Some(backup) => fs::rename(backup, &destination),
                None => fs::remove_file(&destination),
            };
            if let Err(err) = restored {
                log::error!("could not roll back {}: {}", destination.display(), err);
            }
        }
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        for (temporary, _) in &self.staged {
            if temporary.exists() {
                if let Err(err) = fs::remove_file(temporary) {
                    log::warn!("could not remove {}: {}", temporary.display(), err);
                }
            }
        }
    }
}

/// Write transitions as a gzip stream of length-prefixed (u32, little
/// endian) bincode records.
pub fn write_replay_memory<P: AsRef<Path>>(path: P, transitions: &[Transition]) -> Result<()> {
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    for transition in transitions {
        let record = bincode::serialize(transition)?;
        let len = u32::try_from(record.len())
            .map_err(|_| HermesError::SerializationError("transition record exceeds 4 GiB".to_string()))?;
        encoder.write_all(&len.to_le_bytes())?;
        encoder.write_all(&record)?;
    }
    let mut writer = encoder.finish()?;
    writer.flush()?;
    Ok(())
}

pub fn read_replay_memory<P: AsRef<Path>>(path: P) -> Result<Vec<Transition>> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
    let mut transitions = Vec::new();
    let mut len = [0u8; 4];
    loop {
        match decoder.read_exact(&mut len) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        let mut record = vec![0u8; u32::from_le_bytes(len) as usize];
        decoder.read_exact(&mut record)?;
        transitions.push(bincode::deserialize(&record)?);
    }
    Ok(transitions)
}
