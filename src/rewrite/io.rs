use std::path::Path;

use anyhow::Result;
use rust_htslib::bam;
use rust_htslib::bam::record::Record;
use rust_htslib::bam::Read;

/// Sequential alignment input, non-decreasing reference order assumed.
pub trait AlignmentSource {
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Reference id for a chromosome name, for chromosome-filter setup.
    fn reference_index(&self, name: &str) -> Option<i32>;
}

/// Append-only alignment output; write order within a flush batch is kept.
pub trait AlignmentSink {
    fn write_record(&mut self, record: &Record) -> Result<()>;
}

pub struct BamSource {
    reader: bam::Reader,
}

impl BamSource {
    pub fn from_path(path: &Path, num_threads: usize) -> Result<BamSource> {
        let mut reader = bam::Reader::from_path(path)?;
        if num_threads > 1 {
            reader.set_threads(num_threads)?;
        }
        Ok(BamSource { reader })
    }

    pub fn header(&self) -> &bam::HeaderView {
        self.reader.header()
    }
}

impl AlignmentSource for BamSource {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let mut record = Record::new();
        match self.reader.read(&mut record) {
            Some(result) => {
                result?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn reference_index(&self, name: &str) -> Option<i32> {
        self.reader.header().tid(name.as_bytes()).map(|tid| tid as i32)
    }
}

pub struct BamSink {
    writer: bam::Writer,
}

impl BamSink {
    pub fn from_path(path: &Path, header: &bam::HeaderView, num_threads: usize) -> Result<BamSink> {
        let header = bam::Header::from_template(header);
        let mut writer = bam::Writer::from_path(path, &header, bam::Format::Bam)?;
        if num_threads > 1 {
            writer.set_threads(num_threads)?;
        }
        Ok(BamSink { writer })
    }
}

impl AlignmentSink for BamSink {
    fn write_record(&mut self, record: &Record) -> Result<()> {
        self.writer.write(record)?;
        Ok(())
    }
}
