//! Text canonicalization and fingerprint-based deduplication.
//!
//! Different chunking strategies often emit the same menu text wrapped in
//! different markup. Canonicalization strips HTML tags and markdown syntax and
//! collapses whitespace so those variants hash to one [`Fingerprint`].
//! [`Deduplicator`] remembers which fingerprints were already indexed during a
//! run, optionally persisting them to a ledger file so later runs skip them
//! too.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Hex-encoded SHA-256 of canonicalized chunk text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hashes already-canonical text.
    pub fn of(canonical: &str) -> Self {
        let digest = Sha256::digest(canonical.as_bytes());
        Self(format!("{:x}", digest))
    }

    /// Wraps a fingerprint read back from a store or ledger.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strips markup and normalizes whitespace.
pub fn canonicalize(text: &str) -> String {
    let without_html = if markup_pattern().is_match(text) {
        let separated = block_tag_pattern().replace_all(text, "\n");
        let fragment = Html::parse_fragment(&separated);
        fragment.root_element().text().collect::<String>()
    } else {
        text.to_string()
    };
    let unlinked = link_pattern().replace_all(&without_html, "$1");
    let unprefixed = line_prefix_pattern().replace_all(&unlinked, "");
    let plain = emphasis_pattern().replace_all(&unprefixed, "");
    collapse_whitespace(&plain)
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}

fn markup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[A-Za-z/!][^>]*>").expect("markup regex"))
}

fn block_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)</?(?:p|div|br|hr|li|ul|ol|h[1-6]|tr|td|th|table|section|article|header|footer|blockquote|pre)\b[^>]*>",
        )
        .expect("block tag regex")
    })
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("link regex"))
}

fn line_prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]{0,3}(?:#{1,6}|>|[-*+])[ \t]+").expect("line prefix regex")
    })
}

fn emphasis_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[*_`~]+").expect("emphasis regex"))
}

/// Thread-safe set of fingerprints already indexed.
///
/// Check-and-insert happens under one lock, so two workers racing on the same
/// text see exactly one `is_new == true`. A claim stays in flight until it is
/// committed or released; later claimants wait for that outcome.
pub struct Deduplicator {
    state: Mutex<DedupeState>,
}

struct DedupeState {
    seen: HashSet<Fingerprint>,
    // Dropping the sender wakes every waiter on that fingerprint.
    in_flight: HashMap<Fingerprint, watch::Sender<()>>,
    ledger: Option<Ledger>,
}

enum ClaimState {
    Owned,
    Seen,
    Pending(watch::Receiver<()>),
}

struct Ledger {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Ledger {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    fn append(&mut self, fingerprint: &Fingerprint) -> io::Result<()> {
        writeln!(self.writer, "{}", fingerprint)?;
        self.writer.flush()
    }

    fn truncate(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

impl Deduplicator {
    /// Run-scoped deduplicator with an empty in-memory set.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DedupeState {
                seen: HashSet::new(),
                in_flight: HashMap::new(),
                ledger: None,
            }),
        }
    }

    /// Deduplicator backed by a fingerprint ledger shared across runs.
    ///
    /// Existing entries are loaded; new fingerprints are appended as they are
    /// first seen.
    pub fn with_ledger(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let mut seen = HashSet::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    seen.insert(Fingerprint::from_stored(trimmed));
                }
            }
        }
        debug!(path = %path.display(), loaded = seen.len(), "loaded fingerprint ledger");
        Ok(Self {
            state: Mutex::new(DedupeState {
                seen,
                in_flight: HashMap::new(),
                ledger: Some(Ledger::open(path)?),
            }),
        })
    }

    /// Canonicalizes `text`, fingerprints it, and records it.
    ///
    /// Returns the fingerprint and whether it was seen for the first time.
    ///
    /// An in-flight claim on the same fingerprint counts as seen.
    pub fn dedupe(&self, text: &str) -> (Fingerprint, bool) {
        let fingerprint = Fingerprint::of(&canonicalize(text));
        let is_new = matches!(self.try_claim(&fingerprint), ClaimState::Owned);
        if is_new {
            self.commit(&fingerprint);
        }
        (fingerprint, is_new)
    }

    /// Reserves a fingerprint, returning `true` when the caller now owns it.
    ///
    /// When another worker holds an unfinished claim this waits for it: a
    /// commit makes the result `false`, a release lets the caller take over.
    /// Owners must finish with [`Deduplicator::commit`] or
    /// [`Deduplicator::release`].
    pub async fn claim(&self, fingerprint: &Fingerprint) -> bool {
        loop {
            let mut pending = match self.try_claim(fingerprint) {
                ClaimState::Owned => return true,
                ClaimState::Seen => return false,
                ClaimState::Pending(pending) => pending,
            };
            debug!(%fingerprint, "waiting on in-flight claim");
            // Errors once the owner finishes, which is the only signal used.
            let _ = pending.changed().await;
        }
    }

    fn try_claim(&self, fingerprint: &Fingerprint) -> ClaimState {
        let mut state = self.lock();
        if let Some(owner) = state.in_flight.get(fingerprint) {
            return ClaimState::Pending(owner.subscribe());
        }
        if !state.seen.insert(fingerprint.clone()) {
            return ClaimState::Seen;
        }
        let (owner, _) = watch::channel(());
        state.in_flight.insert(fingerprint.clone(), owner);
        ClaimState::Owned
    }

    /// Marks a claim as indexed and appends it to the ledger, if configured.
    pub fn commit(&self, fingerprint: &Fingerprint) {
        let mut state = self.lock();
        state.in_flight.remove(fingerprint);
        if let Some(ledger) = state.ledger.as_mut() {
            if let Err(err) = ledger.append(fingerprint) {
                warn!(%fingerprint, error = %err, "failed to append fingerprint ledger");
            }
        }
    }

    /// Drops a claim so a waiting or later copy of the same text can be indexed.
    pub fn release(&self, fingerprint: &Fingerprint) {
        let mut state = self.lock();
        state.seen.remove(fingerprint);
        state.in_flight.remove(fingerprint);
    }

    /// Whether the fingerprint was already recorded.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().seen.contains(fingerprint)
    }

    /// Number of unique fingerprints recorded.
    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    /// True when nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every fingerprint ahead of a full reindex, truncating the ledger.
    pub fn reset(&self) -> io::Result<()> {
        let mut state = self.lock();
        state.seen.clear();
        state.in_flight.clear();
        if let Some(ledger) = state.ledger.as_mut() {
            ledger.truncate()?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, DedupeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn markup_variants_share_a_fingerprint() {
        let plain = "Butter Chicken ₹350, Restaurant: Bikanervala";
        let html = "<p>Butter   Chicken <b>₹350</b>, Restaurant: Bikanervala</p>";
        let markdown = "## **Butter Chicken** ₹350,\n  Restaurant: Bikanervala";
        assert_eq!(canonicalize(html), plain);
        assert_eq!(canonicalize(markdown), plain);
        assert_eq!(
            Fingerprint::of(&canonicalize(html)),
            Fingerprint::of(&canonicalize(markdown))
        );
    }

    #[test]
    fn markdown_links_keep_their_label() {
        assert_eq!(
            canonicalize("See [our menu](https://x.example/menu) - daily"),
            "See our menu - daily"
        );
    }

    #[test]
    fn dedupe_reports_first_sighting_only() {
        let dedupe = Deduplicator::new();
        let (first, is_new) = dedupe.dedupe("Samosa ₹40");
        assert!(is_new);
        let (second, is_new) = dedupe.dedupe("  Samosa   ₹40 ");
        assert!(!is_new);
        assert_eq!(first, second);
        assert_eq!(dedupe.len(), 1);

        dedupe.reset().unwrap();
        assert!(dedupe.is_empty());
        assert!(dedupe.dedupe("Samosa ₹40").1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn released_claims_can_be_retaken() {
        let dedupe = Deduplicator::new();
        let fp = Fingerprint::of("Rasmalai ₹120");
        assert!(dedupe.claim(&fp).await);
        dedupe.commit(&fp);
        assert!(!dedupe.claim(&fp).await);
        dedupe.release(&fp);
        assert!(!dedupe.contains(&fp));
        assert!(dedupe.claim(&fp).await);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn waiting_claim_follows_the_owner_outcome() {
        let dedupe = Deduplicator::new();
        let fp = Fingerprint::of("Jalebi ₹60");
        assert!(dedupe.claim(&fp).await);

        let owner_fails = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            dedupe.release(&fp);
        };
        let (_, taken_over) = tokio::join!(owner_fails, dedupe.claim(&fp));
        assert!(taken_over);

        let owner_succeeds = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            dedupe.commit(&fp);
        };
        let (_, duplicate) = tokio::join!(owner_succeeds, dedupe.claim(&fp));
        assert!(!duplicate);
        assert_eq!(dedupe.len(), 1);
    }

    #[test]
    fn concurrent_inserts_admit_one_winner() {
        let dedupe = Arc::new(Deduplicator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedupe = dedupe.clone();
                thread::spawn(move || dedupe.dedupe("Dal Makhani ₹280").1)
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|is_new| *is_new)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn ledger_persists_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger").join("fingerprints.txt");

        let first_run = Deduplicator::with_ledger(&path).unwrap();
        assert!(first_run.dedupe("Kulfi ₹90").1);
        drop(first_run);

        let second_run = Deduplicator::with_ledger(&path).unwrap();
        assert!(!second_run.dedupe("Kulfi ₹90").1);
        second_run.reset().unwrap();
        drop(second_run);

        let third_run = Deduplicator::with_ledger(&path).unwrap();
        assert!(third_run.is_empty());
    }
}
