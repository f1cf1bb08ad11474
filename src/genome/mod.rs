use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use bio::io::fasta;
use log::debug;

use crate::runtime::Error;

/// One fully materialized chromosome.
pub struct ChromosomeSequence {
    pub name: String,
    pub bases: Vec<u8>,
}

/// Lazily materializes one chromosome's sequence by name. Idempotent; the
/// orchestrator guarantees at most one call per chromosome per run.
pub trait GenomeReference: Send + Sync {
    /// `Ok(None)` means the chromosome is absent from the reference, which
    /// is not an error.
    fn chromosome(&self, name: &str) -> Result<Option<ChromosomeSequence>>;

    /// All sequence names, in reference order, for planning.
    fn chromosome_names(&self) -> Vec<String>;
}

/// Indexed FASTA on disk. The reader seeks per fetch, so access goes through
/// a mutex; sequence names come from the `.fai` index.
#[derive(Debug)]
pub struct FastaGenome {
    reader: Mutex<fasta::IndexedReader<File>>,
    names: Vec<String>,
}

impl FastaGenome {
    pub fn new(path: &Path) -> Result<FastaGenome> {
        let path_index = PathBuf::from(format!("{}.fai", path.display()));
        if !path_index.exists() {
            return Err(Error::fasta_index_not_found(path, &path_index).into());
        }
        let names = read_index_names(&path_index)?;

        let index = fasta::Index::from_file(&path_index)
            .map_err(|e| anyhow!("Failed to load FASTA index {:?}: {:?}", path_index, e))?;
        let file = File::open(path).with_context(|| format!("Cannot open FASTA {:?}", path))?;
        let reader = fasta::IndexedReader::with_index(file, index);

        debug!("Opened FASTA {:?} with {} sequences", path, names.len());
        Ok(FastaGenome {
            reader: Mutex::new(reader),
            names,
        })
    }
}

impl GenomeReference for FastaGenome {
    fn chromosome(&self, name: &str) -> Result<Option<ChromosomeSequence>> {
        if !self.names.iter().any(|n| n == name) {
            return Ok(None);
        }
        let mut reader = self.reader.lock().unwrap();
        reader
            .fetch_all(name)
            .map_err(|e| anyhow!("Failed to fetch chromosome {}: {:?}", name, e))?;
        let mut bases = Vec::new();
        reader
            .read(&mut bases)
            .map_err(|e| anyhow!("Failed to read chromosome {}: {:?}", name, e))?;
        Ok(Some(ChromosomeSequence {
            name: name.to_string(),
            bases,
        }))
    }

    fn chromosome_names(&self) -> Vec<String> {
        self.names.clone()
    }
}

fn read_index_names(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("Cannot open FASTA index {:?}", path))?;
    let mut names = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if let Some(name) = line.split('\t').next() {
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}
