//! ---
//! vs_section: "04-file-store"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Virtual file store backing camera uploads."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};

/// Number of files each directory keeps unless configured otherwise.
pub const DEFAULT_RETAIN_PER_DIRECTORY: usize = 5;

/// What the sweeper needs to know about one committed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionCandidate<'a> {
    /// Full path of the file.
    pub path: &'a str,
    /// Creation time; older files go first.
    pub created: DateTime<Utc>,
    /// Insertion sequence, breaks timestamp ties.
    pub seq: u64,
}

/// Paths to evict so that at most `keep` of `files` remain, oldest first.
pub fn select_evictions<'a>(mut files: Vec<RetentionCandidate<'a>>, keep: usize) -> Vec<&'a str> {
    if files.len() <= keep {
        return Vec::new();
    }
    files.sort_by(|a, b| a.created.cmp(&b.created).then(a.seq.cmp(&b.seq)));
    let excess = files.len() - keep;
    files.into_iter().take(excess).map(|file| file.path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn keeps_newest_and_evicts_oldest() {
        let files = vec![
            RetentionCandidate { path: "/c", created: at(3), seq: 3 },
            RetentionCandidate { path: "/a", created: at(1), seq: 1 },
            RetentionCandidate { path: "/b", created: at(2), seq: 2 },
        ];
        assert_eq!(select_evictions(files, 2), vec!["/a"]);
    }

    #[test]
    fn equal_timestamps_fall_back_to_insertion_order() {
        let files = vec![
            RetentionCandidate { path: "/second", created: at(1), seq: 2 },
            RetentionCandidate { path: "/first", created: at(1), seq: 1 },
            RetentionCandidate { path: "/third", created: at(1), seq: 3 },
        ];
        assert_eq!(select_evictions(files, 1), vec!["/first", "/second"]);
    }

    #[test]
    fn under_limit_evicts_nothing() {
        let files = vec![RetentionCandidate { path: "/a", created: at(1), seq: 1 }];
        assert!(select_evictions(files, DEFAULT_RETAIN_PER_DIRECTORY).is_empty());
    }
}
