use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "Read pair '{}' already holds two alignments.",
        String::from_utf8_lossy(key)
    )]
    PairAlreadyComplete { key: Vec<u8> },

    #[error("{} must not be empty.", what)]
    EmptyInput { what: String },

    #[error(
        "FASTA index at {:?} not found. Create it with: samtools faidx {:?}",
        index,
        fasta
    )]
    FastaIndexNotFound {
        fasta: std::path::PathBuf,
        index: std::path::PathBuf,
    },
}

impl Error {
    #[cold]
    pub fn pair_already_complete(key: &[u8]) -> Self {
        Error::PairAlreadyComplete { key: key.to_vec() }
    }

    #[cold]
    pub fn empty_input<W: Into<String>>(what: W) -> Self {
        Error::EmptyInput { what: what.into() }
    }

    #[cold]
    pub fn fasta_index_not_found<P: AsRef<std::path::Path>>(fasta: P, index: P) -> Self {
        Error::FastaIndexNotFound {
            fasta: fasta.as_ref().to_path_buf(),
            index: index.as_ref().to_path_buf(),
        }
    }
}
