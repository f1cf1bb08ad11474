use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::genome::{ChromosomeSequence, GenomeReference};

/// Shared handle to one resident chromosome. Cloning shares the payload;
/// the payload is freed once the cache entry and every handle are gone.
#[derive(Clone)]
pub struct ChromosomeRef {
    name: String,
    sequence: Option<Arc<ChromosomeSequence>>,
}

impl ChromosomeRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence(&self) -> Option<&ChromosomeSequence> {
        self.sequence.as_deref()
    }

    /// True when the reference confirmed the chromosome does not exist.
    pub fn is_missing(&self) -> bool {
        self.sequence.is_none()
    }
}

enum Resident {
    Loaded(Arc<ChromosomeSequence>),
    Missing,
}

struct CacheState {
    resident: FxHashMap<String, Resident>,
    /// chromosome -> work items still needing it; drives the unload.
    remaining: FxHashMap<String, FxHashSet<usize>>,
}

impl CacheState {
    fn loaded_count(&self) -> usize {
        self.resident
            .values()
            .filter(|r| matches!(r, Resident::Loaded(_)))
            .count()
    }
}

/// Resource manager for chromosome references shared across worker threads.
///
/// Each chromosome loads exactly once for as long as any registered job
/// needs it and unloads the moment the last such job releases it. An
/// optional cap bounds how many loaded sequences are resident at once;
/// `acquire` blocks on a condvar (signalled on every unload) until the cap
/// allows a new load or the wanted chromosome is already resident. The maps
/// are never exposed; all invariants live behind this interface.
pub struct ChromosomeCache<G: GenomeReference> {
    provider: G,
    max_resident: Option<usize>,
    state: Mutex<CacheState>,
    unloaded: Condvar,
}

impl<G: GenomeReference> ChromosomeCache<G> {
    pub fn new(provider: G, max_resident: Option<usize>) -> ChromosomeCache<G> {
        ChromosomeCache {
            provider,
            max_resident: max_resident.map(|cap| cap.max(1)),
            state: Mutex::new(CacheState {
                resident: FxHashMap::default(),
                remaining: FxHashMap::default(),
            }),
            unloaded: Condvar::new(),
        }
    }

    /// Declare that `work` will process `chromosome`. Must happen for every
    /// job before any worker starts, so the unload can find the last job.
    pub fn register_job(&self, work: usize, chromosome: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .remaining
            .entry(chromosome.to_string())
            .or_default()
            .insert(work);
    }

    /// Block until the chromosome may be materialized, then return the
    /// shared reference and whether this call performed the load.
    pub fn acquire(&self, chromosome: &str) -> anyhow::Result<(ChromosomeRef, bool)> {
        let mut state = self.state.lock().unwrap();
        loop {
            // an already-resident chromosome never counts against the cap
            if state.resident.contains_key(chromosome) {
                break;
            }
            let below_cap = self
                .max_resident
                .map_or(true, |cap| state.loaded_count() < cap);
            if below_cap {
                break;
            }
            state = self.unloaded.wait(state).unwrap();
        }

        if let Some(entry) = state.resident.get(chromosome) {
            let sequence = match entry {
                Resident::Loaded(seq) => Some(Arc::clone(seq)),
                Resident::Missing => None,
            };
            return Ok((
                ChromosomeRef {
                    name: chromosome.to_string(),
                    sequence,
                },
                false,
            ));
        }

        // load while holding the mutex so a second load can never start
        let started = Instant::now();
        let entry = match self.provider.chromosome(chromosome)? {
            Some(sequence) => {
                info!(
                    "Loaded chromosome {} ({} bp) in {:.1?}",
                    chromosome,
                    sequence.bases.len(),
                    started.elapsed()
                );
                Resident::Loaded(Arc::new(sequence))
            }
            None => {
                warn!("Chromosome {} not present in the reference", chromosome);
                Resident::Missing
            }
        };
        let sequence = match &entry {
            Resident::Loaded(seq) => Some(Arc::clone(seq)),
            Resident::Missing => None,
        };
        state.resident.insert(chromosome.to_string(), entry);
        Ok((
            ChromosomeRef {
                name: chromosome.to_string(),
                sequence,
            },
            true,
        ))
    }

    /// Mark `work` as finished with `chromosome`; unloads the entry and
    /// wakes cap waiters when it was the last registered job.
    pub fn release_if_last(&self, work: usize, chromosome: &str) {
        let mut state = self.state.lock().unwrap();
        let last = match state.remaining.get_mut(chromosome) {
            Some(jobs) => {
                jobs.remove(&work);
                jobs.is_empty()
            }
            None => false,
        };
        if last {
            state.remaining.remove(chromosome);
            state.resident.remove(chromosome);
            self.unloaded.notify_all();
        }
    }

    /// Loaded (non-missing) entries currently resident.
    pub fn resident_count(&self) -> usize {
        self.state.lock().unwrap().loaded_count()
    }
}
