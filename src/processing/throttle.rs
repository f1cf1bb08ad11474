use std::sync::{Condvar, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};

struct ThrottleState {
    /// work item -> chromosomes not yet finished, in configured order.
    remaining: FxHashMap<usize, Vec<String>>,
    /// (work item, chromosome) signals that may proceed.
    armed: FxHashSet<(usize, String)>,
}

/// Per-work-item chromosome ordering.
///
/// Only each work item's first chromosome starts armed; finishing a
/// chromosome arms the item's next one. Jobs of different work items are
/// never ordered against each other.
pub struct FileThrottle {
    state: Mutex<ThrottleState>,
    advanced: Condvar,
}

impl FileThrottle {
    /// `plan`: for every work item, its chromosomes in processing order.
    pub fn new(plan: &[(usize, Vec<String>)]) -> FileThrottle {
        let mut remaining = FxHashMap::default();
        let mut armed = FxHashSet::default();
        for (work, chromosomes) in plan {
            if let Some(first) = chromosomes.first() {
                armed.insert((*work, first.clone()));
            }
            remaining.insert(*work, chromosomes.clone());
        }
        FileThrottle {
            state: Mutex::new(ThrottleState { remaining, armed }),
            advanced: Condvar::new(),
        }
    }

    /// Park until (work, chromosome) is armed.
    pub fn wait_for_turn(&self, work: usize, chromosome: &str) {
        let signal = (work, chromosome.to_string());
        let mut state = self.state.lock().unwrap();
        while !state.armed.contains(&signal) {
            state = self.advanced.wait(state).unwrap();
        }
    }

    /// Record completion (success or failure) and arm the work item's next
    /// remaining chromosome.
    pub fn job_done(&self, work: usize, chromosome: &str) {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        if let Some(chromosomes) = state.remaining.get_mut(&work) {
            if let Some(pos) = chromosomes.iter().position(|c| c == chromosome) {
                chromosomes.remove(pos);
            }
            match chromosomes.first() {
                Some(next) => {
                    let next = next.clone();
                    state.armed.insert((work, next));
                }
                None => {
                    state.remaining.remove(&work);
                }
            }
        }
        self.advanced.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_chromosomes_of_one_file_run_in_configured_order() {
        let chroms = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let throttle = Arc::new(FileThrottle::new(&[(0, chroms.clone())]));
        let order = Arc::new(Mutex::new(Vec::new()));

        // spawn in reverse so arrival order fights the configured order
        let mut handles = Vec::new();
        for chrom in chroms.iter().rev() {
            let throttle = Arc::clone(&throttle);
            let order = Arc::clone(&order);
            let chrom = chrom.clone();
            handles.push(std::thread::spawn(move || {
                throttle.wait_for_turn(0, &chrom);
                order.lock().unwrap().push(chrom.clone());
                throttle.job_done(0, &chrom);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), chroms);
    }

    #[test]
    fn test_files_do_not_block_each_other() {
        let throttle = FileThrottle::new(&[
            (0, vec!["a".to_string(), "b".to_string()]),
            (1, vec!["a".to_string(), "b".to_string()]),
        ]);
        // both first chromosomes are armed immediately
        throttle.wait_for_turn(0, "a");
        throttle.wait_for_turn(1, "a");
        // finishing file 1's "a" arms its "b" without touching file 0
        throttle.job_done(1, "a");
        throttle.wait_for_turn(1, "b");
    }
}
