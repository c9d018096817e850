//! Augmented FASTX: a standard FASTA/FASTQ record followed by zero or more
//! `# offset<TAB>kmer<TAB>abundance_case[,abundance_ctrl...]` annotation
//! lines and a terminating bare `#` sentinel. Partitioned streams are
//! grouped by `#part=<label>` header lines preceding each block.
//!
//! No existing crate in the retrieval pack speaks this wire format, so this
//! module is a line-oriented reader/writer in the style of the teacher's
//! `io::fastq` module (same error handling and gzip-transparent IO idiom).

use crate::bio::kmer::{kmer_to_string, EncodedKmer};
use crate::error::PipelineError;
use crate::types::{AugmentedRead, KmerAnnotation, Read};
use std::io::{BufRead, Write};

pub struct AugmentedFastxWriter<W: Write> {
    inner: W,
}

impl<W: Write> AugmentedFastxWriter<W> {
    pub fn new(inner: W) -> Self {
        AugmentedFastxWriter { inner }
    }

    pub fn write_partition_header(&mut self, label: &str) -> std::io::Result<()> {
        writeln!(self.inner, "#part={label}")
    }

    pub fn write_record(&mut self, record: &AugmentedRead, k: usize) -> std::io::Result<()> {
        let read = &record.read;
        match &read.qualities {
            Some(qual) => {
                writeln!(self.inner, "@{}", read.id)?;
                writeln!(self.inner, "{}", String::from_utf8_lossy(&read.sequence))?;
                writeln!(self.inner, "+")?;
                writeln!(self.inner, "{}", String::from_utf8_lossy(qual))?;
            }
            None => {
                writeln!(self.inner, ">{}", read.id)?;
                writeln!(self.inner, "{}", String::from_utf8_lossy(&read.sequence))?;
            }
        }
        for mate in &read.mate_refs {
            writeln!(self.inner, "#mateseq={mate}")?;
        }
        for annotation in &record.novel_kmers {
            let counts = annotation
                .abundances
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",");
            writeln!(
                self.inner,
                "# {}\t{}\t{}",
                annotation.offset,
                kmer_to_string(annotation.kmer, k),
                counts
            )?;
        }
        writeln!(self.inner, "#")?;
        Ok(())
    }
}

/// Streaming reader over an augmented FASTX stream. Yields
/// `(partition_label, AugmentedRead)`; `partition_label` is `None` until
/// the first `#part=` header is seen, after which it sticks until the next one.
pub struct AugmentedFastxReader<R: BufRead> {
    inner: R,
    k: usize,
    current_partition: Option<String>,
    line_no: u64,
}

impl<R: BufRead> AugmentedFastxReader<R> {
    pub fn new(inner: R, k: usize) -> Self {
        AugmentedFastxReader {
            inner,
            k,
            current_partition: None,
            line_no: 0,
        }
    }

    fn read_line(&mut self) -> Result<Option<String>, PipelineError> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn parse_annotation(&self, line: &str) -> Result<KmerAnnotation, PipelineError> {
        let body = line.strip_prefix("# ").ok_or_else(|| {
            PipelineError::MalformedInput(format!(
                "line {}: expected annotation line, got {line:?}",
                self.line_no
            ))
        })?;
        let mut fields = body.split('\t');
        let offset: usize = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                PipelineError::MalformedInput(format!(
                    "line {}: bad offset field in {line:?}",
                    self.line_no
                ))
            })?;
        let kmer_str = fields.next().ok_or_else(|| {
            PipelineError::MalformedInput(format!("line {}: missing kmer field", self.line_no))
        })?;
        if kmer_str.len() != self.k {
            return Err(PipelineError::MalformedInput(format!(
                "line {}: kmer {kmer_str:?} has length {} but pipeline K={}",
                self.line_no,
                kmer_str.len(),
                self.k
            )));
        }
        let kmer = EncodedKmer::encode(kmer_str.as_bytes()).ok_or_else(|| {
            PipelineError::MalformedInput(format!(
                "line {}: invalid kmer {kmer_str:?}",
                self.line_no
            ))
        })?;
        let abund_field = fields.next().ok_or_else(|| {
            PipelineError::MalformedInput(format!("line {}: missing abundances", self.line_no))
        })?;
        let abundances: Result<Vec<u16>, _> =
            abund_field.split(',').map(|s| s.parse::<u16>()).collect();
        let abundances = abundances.map_err(|_| {
            PipelineError::MalformedInput(format!(
                "line {}: bad abundance list {abund_field:?}",
                self.line_no
            ))
        })?;
        Ok(KmerAnnotation {
            offset,
            kmer,
            abundances,
        })
    }
}

impl<R: BufRead> Iterator for AugmentedFastxReader<R> {
    type Item = Result<(Option<String>, AugmentedRead), PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            if line.is_empty() {
                continue;
            }
            if let Some(label) = line.strip_prefix("#part=") {
                self.current_partition = Some(label.to_string());
                continue;
            }

            let (id, qualities_expected) = if let Some(id) = line.strip_prefix('@') {
                (id.to_string(), true)
            } else if let Some(id) = line.strip_prefix('>') {
                (id.to_string(), false)
            } else {
                return Some(Err(PipelineError::MalformedInput(format!(
                    "line {}: expected record header, got {line:?}",
                    self.line_no
                ))));
            };

            let sequence = match self.read_line() {
                Ok(Some(seq)) => seq.into_bytes(),
                Ok(None) | Err(_) => {
                    return Some(Err(PipelineError::MalformedInput(format!(
                        "line {}: truncated record (missing sequence)",
                        self.line_no
                    ))))
                }
            };

            let qualities = if qualities_expected {
                match self.read_line() {
                    Ok(Some(plus)) if plus.starts_with('+') => {}
                    _ => {
                        return Some(Err(PipelineError::MalformedInput(format!(
                            "line {}: expected '+' separator",
                            self.line_no
                        ))))
                    }
                }
                match self.read_line() {
                    Ok(Some(qual)) => Some(qual.into_bytes()),
                    _ => {
                        return Some(Err(PipelineError::MalformedInput(format!(
                            "line {}: truncated record (missing qualities)",
                            self.line_no
                        ))))
                    }
                }
            } else {
                None
            };

            let mut mate_refs = Vec::new();
            let mut novel_kmers = Vec::new();
            loop {
                let annotation_line = match self.read_line() {
                    Ok(Some(l)) => l,
                    Ok(None) => {
                        return Some(Err(PipelineError::MalformedInput(
                            "unterminated record: missing '#' sentinel".into(),
                        )))
                    }
                    Err(e) => return Some(Err(e)),
                };
                if annotation_line == "#" {
                    break;
                }
                if let Some(mate) = annotation_line.strip_prefix("#mateseq=") {
                    mate_refs.push(mate.to_string());
                    continue;
                }
                match self.parse_annotation(&annotation_line) {
                    Ok(annotation) => novel_kmers.push(annotation),
                    Err(e) => return Some(Err(e)),
                }
            }

            let augmented = AugmentedRead {
                read: Read {
                    id,
                    sequence,
                    qualities,
                    mate_refs,
                },
                novel_kmers,
            };
            return Some(Ok((self.current_partition.clone(), augmented)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn sample_read(id: &str, seq: &[u8]) -> AugmentedRead {
        AugmentedRead {
            read: Read {
                id: id.to_string(),
                sequence: seq.to_vec(),
                qualities: Some(vec![b'I'; seq.len()]),
                mate_refs: vec![],
            },
            novel_kmers: vec![KmerAnnotation {
                offset: 2,
                kmer: EncodedKmer::encode(b"ACGT").unwrap(),
                abundances: vec![10, 0, 1],
            }],
        }
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let mut buf = Vec::new();
        {
            let mut writer = AugmentedFastxWriter::new(&mut buf);
            writer.write_partition_header("cc0").unwrap();
            writer.write_record(&sample_read("r1", b"AAACGTTT"), 4).unwrap();
        }

        let reader = AugmentedFastxReader::new(BufReader::new(buf.as_slice()), 4);
        let records: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 1);
        let (label, augmented) = &records[0];
        assert_eq!(label.as_deref(), Some("cc0"));
        assert_eq!(augmented.read.id, "r1");
        assert_eq!(augmented.novel_kmers.len(), 1);
        assert_eq!(augmented.novel_kmers[0].offset, 2);
        assert_eq!(augmented.novel_kmers[0].abundances, vec![10, 0, 1]);
    }

    #[test]
    fn test_record_with_no_annotations_has_only_sentinel() {
        let mut buf = Vec::new();
        let mut read = sample_read("r2", b"TTTTGGGG");
        read.novel_kmers.clear();
        AugmentedFastxWriter::new(&mut buf).write_record(&read, 4).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.trim_end().ends_with('#'));
    }

    #[test]
    fn test_fasta_record_without_qualities() {
        let mut buf = Vec::new();
        let mut read = sample_read("r3", b"GGGGCCCC");
        read.read.qualities = None;
        AugmentedFastxWriter::new(&mut buf).write_record(&read, 4).unwrap();
        let reader = AugmentedFastxReader::new(BufReader::new(buf.as_slice()), 4);
        let records: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
        assert!(records[0].1.read.qualities.is_none());
    }

    #[test]
    fn test_malformed_missing_sentinel_errors() {
        let text = "@r1\nACGT\n+\n!!!!\n";
        let reader = AugmentedFastxReader::new(BufReader::new(text.as_bytes()), 4);
        let records: Vec<_> = reader.collect();
        assert!(records[0].is_err());
    }
}
