use std::path::{Path, PathBuf};

use rust_htslib::bam;
use rust_htslib::bam::record::{Cigar, CigarString, Record};
use rust_htslib::bam::Read;

use remate::command::process::Process;

const FLAG_PAIRED: u16 = 1;
const FLAG_PROPER: u16 = 2;
const FLAG_FIRST: u16 = 64;
const FLAG_LAST: u16 = 128;

/// 60-column wrapped FASTA plus matching .fai index.
fn write_fasta(path: &Path, chroms: &[(&str, usize)]) {
    let mut fa = String::new();
    let mut fai = String::new();
    for (name, len) in chroms {
        fa.push_str(&format!(">{}\n", name));
        let offset = fa.len();
        let seq = "ACGT".chars().cycle().take(*len).collect::<String>();
        for chunk in seq.as_bytes().chunks(60) {
            fa.push_str(std::str::from_utf8(chunk).unwrap());
            fa.push('\n');
        }
        fai.push_str(&format!("{}\t{}\t{}\t60\t61\n", name, len, offset));
    }
    std::fs::write(path, fa).unwrap();
    std::fs::write(format!("{}.fai", path.display()), fai).unwrap();
}

fn rec(qname: &[u8], tid: i32, pos: i64, mpos: i64, flags: u16) -> Record {
    let mut r = Record::new();
    r.set(
        qname,
        Some(&CigarString(vec![Cigar::Match(4)])),
        b"ACGT",
        &[30, 30, 30, 30],
    );
    r.set_tid(tid);
    r.set_pos(pos);
    r.set_mtid(tid);
    r.set_mpos(mpos);
    r.set_flags(flags);
    r.set_mapq(60);
    r
}

/// One proper pair per chromosome.
fn write_input_bam(path: &Path) {
    let mut header = bam::header::Header::new();
    for name in ["chr1", "chr2"] {
        let mut chr_rec = bam::header::HeaderRecord::new(b"SQ");
        chr_rec.push_tag(b"SN", &name.to_string());
        chr_rec.push_tag(b"LN", &"240".to_string());
        header.push_record(&chr_rec);
    }
    let mut writer = bam::Writer::from_path(path, &header, bam::Format::Bam).unwrap();
    let fl = FLAG_PAIRED | FLAG_PROPER;
    for tid in 0..2 {
        writer.write(&rec(b"pair", tid, 10, 50, fl | FLAG_FIRST)).unwrap();
        writer.write(&rec(b"pair", tid, 50, 10, fl | FLAG_LAST)).unwrap();
    }
}

fn count_records(path: &Path) -> usize {
    let mut reader = bam::Reader::from_path(path).unwrap();
    let mut record = Record::new();
    let mut n = 0;
    while let Some(r) = reader.read(&mut record) {
        r.unwrap();
        n += 1;
    }
    n
}

fn params(dir: &Path, inputs: &[&str]) -> Process {
    Process {
        paths_in: inputs.iter().map(|n| dir.join(n)).collect(),
        path_out: dir.join("out"),
        path_genome: dir.join("ref.fa"),
        chromosomes: None,
        max_resident: None,
        throttle_files: false,
        buffer_limit: 1000,
        keep_unpaired: false,
        num_threads_pool: 2,
        num_threads_htslib: 1,
    }
}

fn setup(dir: &Path, inputs: &[&str]) {
    write_fasta(&dir.join("ref.fa"), &[("chr1", 240), ("chr2", 240)]);
    for name in inputs {
        write_input_bam(&dir.join(name));
    }
}

#[test]
fn test_process_writes_one_bam_per_input_and_chromosome() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path(), &["a.bam", "b.bam"]);

    Process::run(&params(dir.path(), &["a.bam", "b.bam"])).unwrap();

    for stem in ["a", "b"] {
        for chrom in ["chr1", "chr2"] {
            let path: PathBuf = dir.path().join("out").join(format!("{}.{}.bam", stem, chrom));
            assert_eq!(count_records(&path), 2, "missing output {:?}", path);
        }
    }
}

#[test]
fn test_process_under_resident_cap_and_throttle() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path(), &["a.bam", "b.bam"]);

    let mut p = params(dir.path(), &["a.bam", "b.bam"]);
    p.max_resident = Some(1);
    p.throttle_files = true;
    p.num_threads_pool = 4;
    Process::run(&p).unwrap();

    for stem in ["a", "b"] {
        for chrom in ["chr1", "chr2"] {
            let path = dir.path().join("out").join(format!("{}.{}.bam", stem, chrom));
            assert_eq!(count_records(&path), 2);
        }
    }
}

#[test]
fn test_process_restricted_chromosome_list() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path(), &["a.bam"]);

    let mut p = params(dir.path(), &["a.bam"]);
    // chrZ is absent from the reference: skipped, not an error
    p.chromosomes = Some(vec!["chr2".to_string(), "chrZ".to_string()]);
    Process::run(&p).unwrap();

    let out = dir.path().join("out");
    assert_eq!(count_records(&out.join("a.chr2.bam")), 2);
    assert!(!out.join("a.chr1.bam").exists());
    assert!(!out.join("a.chrZ.bam").exists());
}

#[test]
fn test_process_missing_fasta_index_fails_with_hint() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path(), &["a.bam"]);
    std::fs::remove_file(dir.path().join("ref.fa.fai")).unwrap();

    let err = Process::run(&params(dir.path(), &["a.bam"])).unwrap_err();
    assert!(format!("{}", err).contains("samtools faidx"));
}
