use rust_htslib::bam::record::Record;

use crate::runtime::Error;

/// Up to two alignments sharing one read key.
///
/// The first-in-template flag steers a record into `read1`, everything else
/// into `read2`. If the targeted slot is taken the record fills the other
/// slot, so any two records complete the pair structurally; whether the pair
/// is acceptable (e.g. both records claiming the same role) is judged by the
/// pair-level policy, not here.
#[derive(Debug, Clone)]
pub struct ReadPair {
    key: Vec<u8>,
    read1: Option<Record>,
    read2: Option<Record>,
}

impl ReadPair {
    pub fn new(key: Vec<u8>, first: Record) -> ReadPair {
        let mut pair = ReadPair {
            key,
            read1: None,
            read2: None,
        };
        // cannot fail while both slots are empty
        let _ = pair.add_alignment(first);
        pair
    }

    /// Add the mate to a pending pair. A third record is a contract
    /// violation and terminates the owning job.
    pub fn add_alignment(&mut self, record: Record) -> Result<(), Error> {
        if self.is_complete() {
            return Err(Error::pair_already_complete(&self.key));
        }
        if record.is_first_in_template() && self.read1.is_none() {
            self.read1 = Some(record);
        } else if !record.is_first_in_template() && self.read2.is_none() {
            self.read2 = Some(record);
        } else if self.read1.is_none() {
            self.read1 = Some(record);
        } else {
            self.read2 = Some(record);
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.read1.is_some() && self.read2.is_some()
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn read1(&self) -> Option<&Record> {
        self.read1.as_ref()
    }

    pub fn read2(&self) -> Option<&Record> {
        self.read2.as_ref()
    }

    /// The stored alignments, read1 before read2.
    pub fn alignments(&self) -> impl Iterator<Item = &Record> {
        self.read1.iter().chain(self.read2.iter())
    }

    pub fn into_records(self) -> Vec<Record> {
        self.read1.into_iter().chain(self.read2).collect()
    }
}
