//! Outbox transport.
//!
//! Each notification becomes `<seq>-<epoch>.json` plus a matching `.jpg` in the
//! spool directory, for an external mailer to pick up.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{Notification, NotificationTransport};

pub struct SpoolTransport {
    dir: PathBuf,
    next_seq: u64,
}

impl SpoolTransport {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create spool dir {}", dir.display()))?;
        let next_seq = highest_sequence(dir)? + 1;
        log::info!(
            "spool transport writing to {} (next #{})",
            dir.display(),
            next_seq
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            next_seq,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Highest `<seq>` prefix among entries still in the spool, or 0.
fn highest_sequence(dir: &Path) -> Result<u64> {
    let mut highest = 0u64;
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to list spool dir {}", dir.display()))?
    {
        let name = entry?.file_name();
        if let Some(seq) = parse_sequence(&name.to_string_lossy()) {
            highest = highest.max(seq);
        }
    }
    Ok(highest)
}

fn parse_sequence(file_name: &str) -> Option<u64> {
    let (seq, _) = file_name.split_once('-')?;
    if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok()
}

impl NotificationTransport for SpoolTransport {
    fn name(&self) -> &'static str {
        "spool"
    }

    fn deliver(&mut self, notification: &Notification) -> Result<String> {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let stem = format!("{:06}-{}", self.next_seq, epoch);

        // Image first so a visible .json always has its attachment.
        let image_path = self.dir.join(format!("{}.jpg", stem));
        std::fs::write(&image_path, &notification.attachment.bytes)
            .with_context(|| format!("failed to write {}", image_path.display()))?;

        let json_path = self.dir.join(format!("{}.json", stem));
        std::fs::write(&json_path, notification.to_json()?)
            .with_context(|| format!("failed to write {}", json_path.display()))?;

        self.next_seq += 1;
        Ok(json_path.display().to_string())
    }
}
