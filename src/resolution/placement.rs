//! Placement Policy
//!
//! Chooses among equally eligible candidates. Pools are ranked by free
//! space; what happens on a tie is up to the configured policy. Inside a
//! pool, filesystems are ranked by weight first and free space second.

use crate::domain::Filesystem;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Policy trait
// =============================================================================

/// Picks one candidate out of a list described by its free space
pub trait PlacementPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Index of the chosen candidate, `None` for an empty list
    fn select(&self, free_space: &[u64]) -> Option<usize>;
}

fn tied_at_max(free_space: &[u64]) -> Vec<usize> {
    let Some(max) = free_space.iter().copied().max() else {
        return Vec::new();
    };
    free_space
        .iter()
        .enumerate()
        .filter(|(_, free)| **free == max)
        .map(|(i, _)| i)
        .collect()
}

/// Most free space wins; ties go to the earliest candidate
#[derive(Debug, Default)]
pub struct FreeSpace;

impl PlacementPolicy for FreeSpace {
    fn name(&self) -> &'static str {
        "free-space"
    }

    fn select(&self, free_space: &[u64]) -> Option<usize> {
        tied_at_max(free_space).first().copied()
    }
}

/// Most free space wins; ties rotate across calls
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl PlacementPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn select(&self, free_space: &[u64]) -> Option<usize> {
        let tied = tied_at_max(free_space);
        if tied.is_empty() {
            return None;
        }
        let turn = self.next.fetch_add(1, Ordering::Relaxed);
        Some(tied[turn % tied.len()])
    }
}

// =============================================================================
// Configuration value
// =============================================================================

/// Value of the `WritePlacement` option
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WritePlacement {
    #[default]
    FreeSpace,
    RoundRobin,
}

impl WritePlacement {
    pub fn policy(self) -> std::sync::Arc<dyn PlacementPolicy> {
        match self {
            WritePlacement::FreeSpace => std::sync::Arc::new(FreeSpace),
            WritePlacement::RoundRobin => std::sync::Arc::new(RoundRobin::default()),
        }
    }
}

impl FromStr for WritePlacement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free-space" | "freespace" => Ok(WritePlacement::FreeSpace),
            "round-robin" | "roundrobin" => Ok(WritePlacement::RoundRobin),
            other => Err(Error::malformed(format!(
                "WritePlacement must be free-space or round-robin, got '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Filesystem choice
// =============================================================================

/// Best filesystem to write to: highest weight, then most free space.
/// Only filesystems accepting writes qualify.
pub fn choose_filesystem(filesystems: &[Filesystem]) -> Option<&Filesystem> {
    filesystems
        .iter()
        .filter(|fs| fs.accepts(true))
        .max_by(|a, b| {
            a.weight
                .cmp(&b.weight)
                .then(a.free.cmp(&b.free))
                // max_by keeps the last maximum; prefer the first listed
                .then(std::cmp::Ordering::Greater)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FilesystemStatus;

    fn fs(path: &str, weight: u32, free: u64, status: FilesystemStatus) -> Filesystem {
        Filesystem {
            server: "disk01".into(),
            path: path.into(),
            weight,
            free,
            total: free,
            status,
        }
    }

    #[test]
    fn test_free_space_policy() {
        let policy = FreeSpace;
        assert_eq!(policy.select(&[]), None);
        assert_eq!(policy.select(&[10, 30, 20]), Some(1));
        assert_eq!(policy.select(&[30, 30, 20]), Some(0));
        assert_eq!(policy.select(&[30, 30, 20]), Some(0));
    }

    #[test]
    fn test_round_robin_rotates_ties() {
        let policy = RoundRobin::default();
        let picks: Vec<_> = (0..4)
            .filter_map(|_| policy.select(&[30, 10, 30]))
            .collect();
        assert_eq!(picks, vec![0, 2, 0, 2]);
        assert_eq!(policy.select(&[1, 5]), Some(1));
    }

    #[test]
    fn test_parse_write_placement() {
        assert_eq!("round-robin".parse::<WritePlacement>().unwrap(), WritePlacement::RoundRobin);
        assert_eq!(" Free-Space ".parse::<WritePlacement>().unwrap(), WritePlacement::FreeSpace);
        assert!("random".parse::<WritePlacement>().is_err());
        assert_eq!(WritePlacement::RoundRobin.policy().name(), "round-robin");
    }

    #[test]
    fn test_choose_filesystem() {
        let filesystems = vec![
            fs("/a", 1, 500, FilesystemStatus::Active),
            fs("/b", 2, 100, FilesystemStatus::Active),
            fs("/c", 2, 300, FilesystemStatus::Active),
            fs("/d", 5, 900, FilesystemStatus::ReadOnly),
        ];
        assert_eq!(choose_filesystem(&filesystems).unwrap().path, "/c");

        let tie = vec![
            fs("/a", 1, 100, FilesystemStatus::Active),
            fs("/b", 1, 100, FilesystemStatus::Active),
        ];
        assert_eq!(choose_filesystem(&tie).unwrap().path, "/a");

        let none = vec![fs("/x", 1, 100, FilesystemStatus::Disabled)];
        assert!(choose_filesystem(&none).is_none());
    }
}
