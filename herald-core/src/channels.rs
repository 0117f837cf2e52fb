// ABOUTME: Ordered, de-duplicated set of channels the session is joined to
// ABOUTME: Normalizes channel names so "#Alpha" and "alpha" are the same member

use std::sync::Mutex;

/// Normalize a channel name: trim, drop a leading '#', lowercase.
/// Returns None for names that are empty after normalization.
pub fn normalize_channel(name: &str) -> Option<String> {
    let name = name.trim().trim_start_matches('#').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

/// Channel membership. Insertion order is kept for display only.
#[derive(Debug, Default)]
pub struct ChannelSet {
    names: Mutex<Vec<String>>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from configured channels, dropping duplicates and empty names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = Self::new();
        for name in names {
            set.insert(name.as_ref());
        }
        set
    }

    /// Add a channel. Returns the normalized name when it was not yet a member.
    pub fn insert(&self, name: &str) -> Option<String> {
        let name = normalize_channel(name)?;
        let mut names = self.lock();
        if names.contains(&name) {
            return None;
        }
        names.push(name.clone());
        Some(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        normalize_channel(name)
            .map(|name| self.lock().contains(&name))
            .unwrap_or(false)
    }

    /// Snapshot of the members in insertion order
    pub fn names(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.names.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
