//! How many versions the state manager remembers

/// Decides which versions to forget once a new one is recorded
pub trait RetentionPolicy: Send + Sync {
    /// Number of versions to drop from the front of `versions` (oldest first)
    fn expired(&self, versions: &[String]) -> usize;
}

/// Never forgets anything
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl RetentionPolicy for KeepAll {
    fn expired(&self, _versions: &[String]) -> usize {
        0
    }
}

/// Keeps the `n` most recent versions
#[derive(Debug, Clone, Copy)]
pub struct KeepLast(pub usize);

impl RetentionPolicy for KeepLast {
    fn expired(&self, versions: &[String]) -> usize {
        versions.len().saturating_sub(self.0)
    }
}

/// Policy for an optional `keep_versions` setting
pub fn from_setting(keep_versions: Option<usize>) -> Box<dyn RetentionPolicy> {
    match keep_versions {
        Some(n) => Box::new(KeepLast(n.max(1))),
        None => Box::new(KeepAll),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{i}")).collect()
    }

    #[test]
    fn test_keep_all() {
        assert_eq!(KeepAll.expired(&versions(1000)), 0);
    }

    #[test]
    fn test_keep_last() {
        assert_eq!(KeepLast(3).expired(&versions(2)), 0);
        assert_eq!(KeepLast(3).expired(&versions(3)), 0);
        assert_eq!(KeepLast(3).expired(&versions(5)), 2);
    }

    #[test]
    fn test_from_setting() {
        assert_eq!(from_setting(None).expired(&versions(10)), 0);
        assert_eq!(from_setting(Some(4)).expired(&versions(10)), 6);
        // zero would drop the version being built
        assert_eq!(from_setting(Some(0)).expired(&versions(10)), 9);
    }
}
