use chrono::prelude::*;
use core::fmt;
use core::str::FromStr;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::handoff::retry_interrupted;
use crate::*;

const LOST_PREFIX: &str = "lost/";
const UNKNOWN_USER: &str = "(unknown)";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LedgerConfig {
    pub path: PathBuf,
    /// The file is never written beyond this many bytes.
    pub max_size: u64,
    /// Entries kept per signature.
    pub entries: usize,
    /// In characters, not bytes.
    pub nick_max_len: usize,
    pub use_user: bool,
    pub use_nick: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mineproof.scores"),
            max_size: 64 * 1024,
            entries: 10,
            nick_max_len: 20,
            use_user: true,
            use_nick: true,
        }
    }
}

impl LedgerConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.entries == 0 {
            return Err(GameError::InvalidConfig("ledger.entries must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Score {
    Won { secs: f64 },
    Lost { mines_left: CellCount, secs: f64 },
}

impl Score {
    pub const fn secs(&self) -> f64 {
        match self {
            Self::Won { secs } | Self::Lost { secs, .. } => *secs,
        }
    }
}

impl From<Outcome> for Score {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Won { elapsed } => Self::Won {
                secs: elapsed.as_secs_f64(),
            },
            Outcome::Lost {
                mines_left,
                elapsed,
            } => Self::Lost {
                mines_left,
                secs: elapsed.as_secs_f64(),
            },
        }
    }
}

/// One line of the ledger file: `signature:score:timestamp:user:nick`.
///
/// Only the nickname may contain colons. The user name has `\` and `:`
/// escaped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub signature: String,
    pub score: Score,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub nick: String,
}

impl LedgerEntry {
    pub fn is_lost(&self) -> bool {
        self.signature.starts_with(LOST_PREFIX)
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.signature)?;
        match self.score {
            Score::Won { secs } => write!(f, "{:.3}", secs)?,
            Score::Lost { mines_left, secs } => write!(f, "{},{:.3}", mines_left, secs)?,
        }
        write!(
            f,
            ":{}:{}:{}",
            self.timestamp.timestamp(),
            self.user,
            self.nick
        )
    }
}

impl FromStr for LedgerEntry {
    type Err = GameError;

    fn from_str(line: &str) -> Result<Self> {
        let malformed = || GameError::MalformedEntry(line.into());
        let mut parts = line.splitn(5, ':');
        let mut next = || parts.next().ok_or_else(malformed);

        let signature = next()?;
        let score = next()?;
        let timestamp = next()?;
        let user = next()?;
        let nick = next()?;

        if signature.is_empty() {
            return Err(malformed());
        }
        let parse_secs = |secs: &str| {
            secs.parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .ok_or_else(malformed)
        };
        let score = if signature.starts_with(LOST_PREFIX) {
            let (mines_left, secs) = score.split_once(',').ok_or_else(malformed)?;
            Score::Lost {
                mines_left: mines_left.parse().map_err(|_| malformed())?,
                secs: parse_secs(secs)?,
            }
        } else {
            Score::Won {
                secs: parse_secs(score)?,
            }
        };
        let timestamp = timestamp
            .parse()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(malformed)?;

        Ok(Self {
            signature: signature.into(),
            score,
            timestamp,
            user: user.into(),
            nick: nick.into(),
        })
    }
}

/// Rank-ordered results, one list per parameter signature.
#[derive(Clone, Debug, PartialEq)]
pub struct Ledger {
    config: LedgerConfig,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Reads the ledger file. A missing file is an empty ledger and lines
    /// that do not parse are dropped.
    pub fn load(config: LedgerConfig) -> Result<Self> {
        let entries = read_entries(&config)?;
        Ok(Self { config, entries })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Best first.
    pub fn standings(&self, signature: &str) -> Vec<&LedgerEntry> {
        let mut standings: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.signature == signature)
            .collect();
        sort_standings(&mut standings);
        standings
    }

    /// Zero-based position the summary would take, `None` if it would not
    /// make the list.
    pub fn rank_of(&self, summary: &GameSummary) -> Option<usize> {
        let candidate = self.entry_for(summary, String::new());
        rank_among(&self.entries, &candidate, self.config.entries)
    }

    /// Adds the summary under the login name and an optional nickname and
    /// writes the file back.
    ///
    /// The file is read again first, so results recorded by other players in
    /// the meantime are kept. Returns the rank the entry took, or `None` when
    /// it did not place; nothing is written then.
    pub fn record(&mut self, summary: &GameSummary, nick: Option<&str>) -> Result<Option<usize>> {
        let nick = match nick {
            Some(nick) if self.config.use_nick => clean_nick(nick, self.config.nick_max_len)?,
            _ => String::new(),
        };
        let entry = self.entry_for(summary, nick);

        self.entries = read_entries(&self.config)?;
        let Some(rank) = rank_among(&self.entries, &entry, self.config.entries) else {
            log::debug!("{} did not place in {}", entry.score.secs(), entry.signature);
            return Ok(None);
        };

        let mut entries: Vec<LedgerEntry> = self
            .entries
            .iter()
            .filter(|other| other.signature != entry.signature)
            .cloned()
            .collect();
        let mut standings = self.standings(&entry.signature);
        standings.push(&entry);
        sort_standings(&mut standings);
        entries.extend(
            standings
                .into_iter()
                .take(self.config.entries)
                .cloned(),
        );

        let content: String = entries.iter().map(|entry| format!("{}\n", entry)).collect();
        if content.len() as u64 > self.config.max_size {
            log::warn!(
                "Ledger would grow to {} bytes, limit is {}",
                content.len(),
                self.config.max_size
            );
            return Err(GameError::LedgerTooLarge {
                max_size: self.config.max_size,
            });
        }
        retry_interrupted(|| fs::write(&self.config.path, content.as_bytes()))
            .map_err(|err| GameError::io("write ledger", &err))?;

        log::debug!("Recorded {} at rank {}", entry.signature, rank + 1);
        self.entries = entries;
        Ok(Some(rank))
    }

    fn entry_for(&self, summary: &GameSummary, nick: String) -> LedgerEntry {
        LedgerEntry {
            signature: summary.signature.clone(),
            score: summary.outcome.into(),
            timestamp: summary.completed_at,
            user: if self.config.use_user {
                escape_user(&login_name())
            } else {
                String::new()
            },
            nick,
        }
    }
}

fn read_entries(config: &LedgerConfig) -> Result<Vec<LedgerEntry>> {
    let content = match retry_interrupted(|| fs::read_to_string(&config.path)) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(GameError::io("read ledger", &err)),
    };

    Ok(content
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse::<LedgerEntry>() {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Skipping ledger line: {}", err);
                None
            }
        })
        .collect())
}

fn rank_among(entries: &[LedgerEntry], candidate: &LedgerEntry, capacity: usize) -> Option<usize> {
    let mut standings: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|entry| entry.signature == candidate.signature)
        .collect();
    standings.push(candidate);
    sort_standings(&mut standings);

    standings
        .iter()
        .take(capacity)
        .position(|entry| core::ptr::eq(*entry, candidate))
}

/// Wins rank by time. Losses rank by time relative to the fastest loss with
/// the same mines left, scaled by the mines left.
fn sort_standings(standings: &mut [&LedgerEntry]) {
    let mut fastest: HashMap<CellCount, f64> = HashMap::new();
    for entry in standings.iter() {
        if let Score::Lost { mines_left, secs } = entry.score {
            let best = fastest.entry(mines_left).or_insert(secs);
            *best = best.min(secs);
        }
    }

    let key = |entry: &LedgerEntry| match entry.score {
        Score::Won { secs } => secs,
        Score::Lost { mines_left, secs } => {
            let best = fastest.get(&mines_left).copied().unwrap_or(secs);
            let ratio = if best > 0.0 { secs / best } else { 1.0 };
            ratio * f64::from(mines_left)
        }
    };
    standings.sort_by(|a, b| key(*a).total_cmp(&key(*b)));
}

fn clean_nick(nick: &str, max_len: usize) -> Result<String> {
    let nick: String = nick.chars().filter(|c| !c.is_control()).collect();
    if nick.chars().count() > max_len {
        return Err(GameError::NicknameTooLong { max: max_len });
    }
    Ok(nick)
}

fn login_name() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .into_iter()
        .find_map(|var| std::env::var(var).ok().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| UNKNOWN_USER.into())
}

fn escape_user(user: &str) -> String {
    let mut escaped = String::with_capacity(user.len());
    for c in user.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ':' => escaped.push_str("\\x3a"),
            c if c.is_control() => escaped.push_str(&format!("\\x{:02x}", u32::from(c))),
            c => escaped.push(c),
        }
    }
    escaped
}
