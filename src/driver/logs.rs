use super::*;
use crate::pool::ContenderPool;
use crate::pool::ScoreBook;
use crate::space::ConfigId;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("unreadable snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// structured sinks in the scenario's log directory. snapshots tagged `n`
/// describe the state entering tournament `n`; tourn_nr.log holds the
/// number of completed tournaments.
pub struct Logs {
    path: PathBuf,
    objective_min: bool,
    best: BTreeMap<String, f64>,
}

impl Logs {
    /// prepare the directory; non-resume startups clear stale logs, with
    /// experimental runs keeping the tournament-0 snapshots
    pub fn new(path: &Path, objective_min: bool, resume: bool, experimental: bool) -> std::io::Result<Self> {
        fs::create_dir_all(path)?;
        if !resume {
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.ends_with(".log") {
                    continue;
                }
                if experimental && name.contains("tourn_0") {
                    continue;
                }
                fs::remove_file(entry.path())?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            objective_min,
            best: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scenario<S: serde::Serialize>(&self, scenario: &S) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(scenario)?;
        fs::write(self.path.join("scenario.log"), text)
    }

    /// persist the state entering the given tournament
    pub fn ranking(
        &self,
        pool: &ContenderPool,
        scores: &ScoreBook,
        ids: &[ConfigId],
        tourn_nr: usize,
    ) -> std::io::Result<()> {
        let write = |name: String, json: String| fs::write(self.path.join(name), json);
        write(
            format!("pool_tourn_{}.log", tourn_nr),
            serde_json::to_string(pool)?,
        )?;
        write(
            format!("scores_tourn_{}.log", tourn_nr),
            serde_json::to_string(scores)?,
        )?;
        write(
            format!("contender_dict_tourn_{}.log", tourn_nr),
            serde_json::to_string(ids)?,
        )?;
        Ok(())
    }

    /// per-tournament appends plus the single-line overwriting sinks
    pub fn race(&mut self, stats: &TournamentStats) -> std::io::Result<()> {
        self.append(
            "winner.log",
            &stats
                .winner
                .map(|id| id.simple().to_string())
                .unwrap_or_else(|| "0".to_string()),
        )?;
        self.append("tourn_stats.log", &serde_json::to_string(stats)?)?;
        fs::write(
            self.path.join("tourn_nr.log"),
            format!("{}\n", stats.tourn_nr + 1),
        )?;
        let (file, value) = if self.objective_min {
            let best = stats.objectives.iter().cloned().fold(crate::HUGE, f64::min);
            ("results.log", best)
        } else {
            let best = stats.runtimes.iter().cloned().fold(crate::HUGE, f64::min);
            ("times.log", best)
        };
        self.best.insert(stats.id.clone(), value);
        fs::write(self.path.join(file), serde_json::to_string(&self.best)?)?;
        Ok(())
    }

    fn append(&self, name: &str, line: &str) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.join(name))?;
        writeln!(file, "{}", line)
    }

    /// number of completed tournaments according to the persisted state
    pub fn last_tourn_nr(&self) -> Result<usize, SnapshotError> {
        let text = fs::read_to_string(self.path.join("tourn_nr.log"))?;
        text.trim()
            .parse()
            .map_err(|e| std::io::Error::other(format!("bad tourn_nr.log: {}", e)).into())
    }

    /// load the state entering the given tournament; `remove` drops the
    /// snapshot files after reading (experimental runs)
    pub fn load(
        &self,
        tourn_nr: usize,
        remove: bool,
    ) -> Result<(ContenderPool, ScoreBook, Vec<ConfigId>), SnapshotError> {
        let pool_path = self.path.join(format!("pool_tourn_{}.log", tourn_nr));
        let scores_path = self.path.join(format!("scores_tourn_{}.log", tourn_nr));
        let ids_path = self
            .path
            .join(format!("contender_dict_tourn_{}.log", tourn_nr));
        let pool = serde_json::from_str(&fs::read_to_string(&pool_path)?)?;
        let scores = serde_json::from_str(&fs::read_to_string(&scores_path)?)?;
        let ids = serde_json::from_str(&fs::read_to_string(&ids_path)?)?;
        if remove {
            for path in [pool_path, scores_path, ids_path] {
                let _ = fs::remove_file(path);
            }
        }
        Ok((pool, scores, ids))
    }
}
