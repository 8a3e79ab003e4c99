//! Versioned snapshot exchange between one writer and one reader thread.
//!
//! The writer commits a new generation per version; the reader asks for the
//! newest generation not past the version it is ready to show. At most three
//! generations are alive at once: the reader's, the previous commit and the
//! latest commit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Number of live generations, derived from the role slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionerState {
    /// Nothing committed yet.
    Initialized,
    /// One generation alive.
    OneVersion,
    /// Two generations alive.
    TwoVersions,
    /// The reader pins a generation older than the previous commit.
    ThreeVersions,
}

/// Misuse of a [`PtrVersioner`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionerError {
    /// No data has been committed yet.
    #[error("no data has been committed yet")]
    Empty,

    /// A commit did not advance the version.
    #[error("version {attempted} is not newer than the last commit {current}")]
    NonIncreasingVersion {
        /// Rejected version.
        attempted: u64,
        /// Latest committed version.
        current: u64,
    },
}

#[derive(Debug)]
struct Generation<T> {
    version: u64,
    data: Arc<T>,
}

#[derive(Debug)]
struct Slots<T> {
    ring: [Option<Generation<T>>; 3],
    writer: Option<usize>,
    previous: Option<usize>,
    reader: Option<usize>,
}

impl<T> Slots<T> {
    fn generation(&self, slot: usize) -> &Generation<T> {
        self.ring[slot]
            .as_ref()
            .unwrap_or_else(|| unreachable!("role points at an empty slot"))
    }

    fn version(&self, slot: usize) -> u64 {
        self.generation(slot).version
    }

    fn live(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.ring.len()).filter(|&i| self.ring[i].is_some())
    }

    /// Newest live generation with version at most `version`.
    fn newest_at_most(&self, version: u64) -> Option<usize> {
        self.live()
            .filter(|&i| self.version(i) <= version)
            .max_by_key(|&i| self.version(i))
    }

    fn oldest(&self) -> Option<usize> {
        self.live().min_by_key(|&i| self.version(i))
    }

    /// Drop the previous commit if it is older than `floor`.
    fn retire_previous_below(&mut self, floor: u64) {
        if let Some(p) = self.previous {
            if self.version(p) < floor {
                self.previous = None;
            }
        }
    }

    /// Free every slot no role points at.
    fn reclaim(&mut self) {
        for i in 0..self.ring.len() {
            let held = [self.writer, self.previous, self.reader].contains(&Some(i));
            if !held {
                self.ring[i] = None;
            }
        }
    }

    fn state(&self) -> VersionerState {
        match self.live().count() {
            0 => VersionerState::Initialized,
            1 => VersionerState::OneVersion,
            2 => VersionerState::TwoVersions,
            _ => VersionerState::ThreeVersions,
        }
    }
}

/// Hands snapshots from a writer thread to a reader thread.
///
/// Values are shared as `Arc<T>`: a snapshot handed out stays valid for as
/// long as the caller keeps it, even after the versioner has moved on.
#[derive(Debug)]
pub struct PtrVersioner<T> {
    slots: Mutex<Slots<T>>,
}

impl<T> Default for PtrVersioner<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PtrVersioner<T> {
    /// An empty versioner.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                ring: [None, None, None],
                writer: None,
                previous: None,
                reader: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit `value` as `version`, which must be newer than the last commit.
    ///
    /// The previous commit is kept; the one before it is dropped unless the
    /// reader still holds it.
    pub fn set_data(&self, value: T, version: u64) -> Result<(), VersionerError> {
        let mut slots = self.lock();
        if let Some(w) = slots.writer {
            let current = slots.version(w);
            if version <= current {
                return Err(VersionerError::NonIncreasingVersion {
                    attempted: version,
                    current,
                });
            }
        }
        slots.previous = slots.writer.take();
        slots.reclaim();
        let free = (0..slots.ring.len())
            .find(|&i| slots.ring[i].is_none())
            .unwrap_or_else(|| unreachable!("at most two generations are held during a commit"));
        slots.ring[free] = Some(Generation {
            version,
            data: Arc::new(value),
        });
        slots.writer = Some(free);
        Ok(())
    }

    /// Newest generation with version at most `version`, for the reader.
    ///
    /// The reader never moves backwards: asking for an older version returns
    /// the one it already holds. If nothing qualifies the oldest generation
    /// is returned. Generations older than the result are released.
    pub fn get_reader_data(&self, version: u64) -> Result<Arc<T>, VersionerError> {
        let mut slots = self.lock();
        if slots.writer.is_none() {
            return Err(VersionerError::Empty);
        }
        let mut chosen = slots
            .newest_at_most(version)
            .or(slots.reader)
            .or_else(|| slots.oldest())
            .ok_or(VersionerError::Empty)?;
        if let Some(r) = slots.reader {
            if slots.version(r) > slots.version(chosen) {
                chosen = r;
            }
        }
        slots.reader = Some(chosen);
        let floor = slots.version(chosen);
        slots.retire_previous_below(floor);
        slots.reclaim();
        Ok(Arc::clone(&slots.generation(chosen).data))
    }

    /// Latest commit, for the writer.
    ///
    /// Generations older than the newest one at most `version` are released
    /// unless the reader holds them.
    pub fn get_writer_data(&self, version: u64) -> Result<Arc<T>, VersionerError> {
        let mut slots = self.lock();
        let w = slots.writer.ok_or(VersionerError::Empty)?;
        if let Some(floor) = slots.newest_at_most(version).map(|i| slots.version(i)) {
            slots.retire_previous_below(floor);
            slots.reclaim();
        }
        Ok(Arc::clone(&slots.generation(w).data))
    }

    /// The reader no longer holds a snapshot.
    pub fn release_reader(&self) {
        let mut slots = self.lock();
        slots.reader = None;
        slots.reclaim();
    }

    /// Current state.
    pub fn state(&self) -> VersionerState {
        self.lock().state()
    }

    /// Number of live generations.
    pub fn retained(&self) -> usize {
        self.lock().live().count()
    }

    /// Versions of the live generations, oldest first.
    pub fn versions(&self) -> Vec<u64> {
        let slots = self.lock();
        let mut versions: Vec<u64> = slots.live().map(|i| slots.version(i)).collect();
        versions.sort_unstable();
        versions
    }

    /// Version of the latest commit.
    pub fn writer_version(&self) -> Option<u64> {
        let slots = self.lock();
        slots.writer.map(|w| slots.version(w))
    }

    /// Version the reader holds.
    pub fn reader_version(&self) -> Option<u64> {
        let slots = self.lock();
        slots.reader.map(|r| slots.version(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_writer_only_keeps_two() {
        let v = PtrVersioner::new();
        assert_eq!(v.state(), VersionerState::Initialized);
        v.set_data("a", 1).unwrap();
        assert_eq!(v.state(), VersionerState::OneVersion);
        assert_eq!(v.versions(), vec![1]);
        v.set_data("b", 2).unwrap();
        assert_eq!(v.state(), VersionerState::TwoVersions);
        assert_eq!(v.versions(), vec![1, 2]);
        v.set_data("c", 3).unwrap();
        assert_eq!(v.state(), VersionerState::TwoVersions);
        assert_eq!(v.versions(), vec![2, 3]);
        assert_eq!(v.retained(), 2);
    }

    #[test]
    fn test_empty_and_non_increasing() {
        let v = PtrVersioner::<u32>::new();
        assert_eq!(v.get_reader_data(5), Err(VersionerError::Empty));
        assert_eq!(v.get_writer_data(5), Err(VersionerError::Empty));
        v.set_data(10, 4).unwrap();
        assert_eq!(
            v.set_data(11, 4),
            Err(VersionerError::NonIncreasingVersion {
                attempted: 4,
                current: 4
            })
        );
        assert_eq!(*v.get_writer_data(4).unwrap(), 10);
    }

    #[test]
    fn test_lagging_reader_pins_third_generation() {
        let v = PtrVersioner::new();
        v.set_data(1, 1).unwrap();
        assert_eq!(*v.get_reader_data(1).unwrap(), 1);
        v.set_data(2, 2).unwrap();
        assert_eq!(v.state(), VersionerState::TwoVersions);
        v.set_data(3, 3).unwrap();
        assert_eq!(v.state(), VersionerState::ThreeVersions);
        assert_eq!(v.versions(), vec![1, 2, 3]);

        assert_eq!(*v.get_reader_data(2).unwrap(), 2);
        assert_eq!(v.versions(), vec![2, 3]);
        assert_eq!(*v.get_reader_data(3).unwrap(), 3);
        assert_eq!(v.state(), VersionerState::OneVersion);
    }

    #[test]
    fn test_reader_never_moves_backwards() {
        let v = PtrVersioner::new();
        v.set_data('a', 5).unwrap();
        v.set_data('b', 6).unwrap();
        assert_eq!(*v.get_reader_data(6).unwrap(), 'b');
        assert_eq!(*v.get_reader_data(5).unwrap(), 'b');
        assert_eq!(v.reader_version(), Some(6));
        // nothing at or below 1: stay where we are
        assert_eq!(*v.get_reader_data(1).unwrap(), 'b');
    }

    #[test]
    fn test_reader_before_any_match_gets_oldest() {
        let v = PtrVersioner::new();
        v.set_data(7, 7).unwrap();
        v.set_data(8, 8).unwrap();
        assert_eq!(*v.get_reader_data(3).unwrap(), 7);
        assert_eq!(v.versions(), vec![7, 8]);
    }

    #[test]
    fn test_writer_data_releases_older_generations() {
        let v = PtrVersioner::new();
        v.set_data(1, 1).unwrap();
        v.set_data(2, 2).unwrap();
        assert_eq!(*v.get_writer_data(2).unwrap(), 2);
        assert_eq!(v.versions(), vec![2]);

        // a held reader generation survives
        v.set_data(3, 3).unwrap();
        v.get_reader_data(2).unwrap();
        v.set_data(4, 4).unwrap();
        assert_eq!(*v.get_writer_data(4).unwrap(), 4);
        assert_eq!(v.versions(), vec![2, 4]);
        v.release_reader();
        assert_eq!(v.versions(), vec![4]);
    }

    #[test]
    fn test_snapshot_outlives_reclaim() {
        let v = PtrVersioner::new();
        v.set_data(String::from("first"), 1).unwrap();
        let held = v.get_reader_data(1).unwrap();
        v.release_reader();
        v.set_data(String::from("second"), 2).unwrap();
        v.set_data(String::from("third"), 3).unwrap();
        assert_eq!(v.versions(), vec![2, 3]);
        assert_eq!(held.as_str(), "first");
    }

    #[test]
    fn test_concurrent_reader_sees_increasing_versions() {
        let v = Arc::new(PtrVersioner::new());
        let writer = {
            let v = Arc::clone(&v);
            thread::spawn(move || {
                for version in 1..=500u64 {
                    v.set_data(version * 10, version).unwrap();
                }
            })
        };
        let mut last = 0;
        while last < 500 {
            if let Ok(data) = v.get_reader_data(u64::MAX) {
                let seen = *data / 10;
                assert!(seen >= last);
                assert!(v.retained() <= 3);
                last = seen;
            }
            thread::yield_now();
        }
        writer.join().unwrap();
        assert_eq!(v.writer_version(), Some(500));
    }
}
