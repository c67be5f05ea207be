use crate::matrix::{self, FormatError};
use crate::sigset::{Sigset, SubjectDescriptor};
use std::fs;
use std::path::Path;

/// Ground-truth label for one matrix cell.
/// Byte values follow the mask file convention: 0xff match, 0x7f non-match,
/// 0x00 ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MaskLabel {
    Genuine = 0xff,
    Impostor = 0x7f,
    DontCare = 0x00,
}

impl MaskLabel {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xff => Some(MaskLabel::Genuine),
            0x7f => Some(MaskLabel::Impostor),
            0x00 => Some(MaskLabel::DontCare),
            _ => None,
        }
    }
}

/// Same-shape companion to a similarity matrix labeling each cell genuine,
/// impostor, or ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    target_name: String,
    query_name: String,
    rows: usize,
    cols: usize,
    labels: Vec<MaskLabel>,
}

impl Mask {
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> MaskLabel {
        self.labels[row * self.cols + col]
    }

    pub fn labels(&self) -> &[MaskLabel] {
        &self.labels
    }

    /// Write the mask to a .mask file
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), FormatError> {
        let path = path.as_ref();
        let mut out = Vec::with_capacity(64 + self.labels.len());
        matrix::write_header(
            &mut out,
            b'B',
            &self.target_name,
            &self.query_name,
            self.rows,
            self.cols,
        );
        out.extend(self.labels.iter().map(|&label| label as u8));
        fs::write(path, out).map_err(|e| FormatError::io(path, e))
    }

    /// Load a mask from a .mask file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let path = path.as_ref();
        let buf = fs::read(path).map_err(|e| FormatError::io(path, e))?;
        let header = matrix::parse_header(path, &buf)?;
        if header.kind != b'B' {
            return Err(FormatError::corrupt(
                path,
                "expected a byte mask, found a score matrix",
            ));
        }

        let cells = matrix::cell_count(path, header.rows, header.cols)?;
        let payload = &buf[header.payload..];
        if payload.len() != cells {
            return Err(FormatError::corrupt(
                path,
                format!(
                    "payload is {} bytes, header declares {}x{} labels",
                    payload.len(),
                    header.rows,
                    header.cols
                ),
            ));
        }

        let labels = payload
            .iter()
            .map(|&byte| {
                MaskLabel::from_byte(byte).ok_or_else(|| {
                    FormatError::corrupt(path, format!("unknown label byte 0x{:02x}", byte))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            target_name: header.target_name,
            query_name: header.query_name,
            rows: header.rows,
            cols: header.cols,
            labels,
        })
    }
}

/// Two samples are the same source when they share a capture session id, or
/// failing that, the same source path (a sample compared against itself).
fn same_source(a: &SubjectDescriptor, b: &SubjectDescriptor) -> bool {
    if a.source == b.source {
        return true;
    }
    match (&a.session, &b.session) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Derive the ground-truth mask from two sigsets. A pure function of the
/// descriptor lists and the exclusion flag; scores are never consulted.
/// Genuine iff identities match and the pair is not same-source-excluded;
/// Impostor iff identities differ; DontCare for same-source genuine pairs
/// when exclusion is on.
pub fn make_mask(target: &Sigset, query: &Sigset, exclude_same_source: bool) -> Mask {
    let rows = target.len();
    let cols = query.len();
    let mut labels = Vec::with_capacity(rows * cols);

    for t in &target.subjects {
        for q in &query.subjects {
            let label = if t.identity == q.identity {
                if exclude_same_source && same_source(t, q) {
                    MaskLabel::DontCare
                } else {
                    MaskLabel::Genuine
                }
            } else {
                MaskLabel::Impostor
            };
            labels.push(label);
        }
    }

    Mask {
        target_name: target.name.clone(),
        query_name: query.name.clone(),
        rows,
        cols,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sigset::Partition;
    use std::path::PathBuf;

    fn sigset(name: &str, entries: &[(&str, &str, Option<&str>)]) -> Sigset {
        Sigset {
            name: name.to_string(),
            subjects: entries
                .iter()
                .map(|(identity, source, session)| SubjectDescriptor {
                    identity: identity.to_string(),
                    partition: Partition::Target,
                    source: PathBuf::from(source),
                    session: session.map(str::to_string),
                })
                .collect(),
        }
    }

    #[test]
    fn test_identity_labeling() {
        // target=[A,B,A], query=[A,C]
        let target = sigset(
            "t",
            &[("A", "a1.emb", None), ("B", "b1.emb", None), ("A", "a2.emb", None)],
        );
        let query = sigset("q", &[("A", "a3.emb", None), ("C", "c1.emb", None)]);

        let mask = make_mask(&target, &query, true);
        assert_eq!(mask.rows(), 3);
        assert_eq!(mask.cols(), 2);

        let expected = [
            [MaskLabel::Genuine, MaskLabel::Impostor],
            [MaskLabel::Impostor, MaskLabel::Impostor],
            [MaskLabel::Genuine, MaskLabel::Impostor],
        ];
        for (i, row) in expected.iter().enumerate() {
            for (j, &label) in row.iter().enumerate() {
                assert_eq!(mask.get(i, j), label, "cell ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_same_source_exclusion() {
        let target = sigset("t", &[("A", "a1.emb", Some("day1")), ("A", "a2.emb", None)]);
        let query = sigset("q", &[("A", "a1.emb", None), ("A", "a3.emb", Some("day1"))]);

        let mask = make_mask(&target, &query, true);
        // Same source path
        assert_eq!(mask.get(0, 0), MaskLabel::DontCare);
        // Same session id
        assert_eq!(mask.get(0, 1), MaskLabel::DontCare);
        // Same identity, different source and session
        assert_eq!(mask.get(1, 1), MaskLabel::Genuine);

        // Exclusion off keeps every matching-identity pair genuine
        let mask = make_mask(&target, &query, false);
        assert_eq!(mask.get(0, 0), MaskLabel::Genuine);
        assert_eq!(mask.get(0, 1), MaskLabel::Genuine);
    }

    #[test]
    fn test_mask_generation_is_deterministic() {
        let target = sigset("t", &[("A", "a1.emb", None), ("B", "b1.emb", None)]);
        let query = sigset("q", &[("A", "a2.emb", None)]);

        let first = make_mask(&target, &query, true);
        let second = make_mask(&target, &query, true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_round_trip_bit_identical() {
        let target = sigset("t", &[("A", "a1.emb", None), ("B", "b1.emb", None)]);
        let query = sigset("q", &[("A", "a1.emb", None), ("C", "c1.emb", None)]);
        let mask = make_mask(&target, &query, true);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mask");
        mask.write(&path).unwrap();
        let loaded = Mask::read(&path).unwrap();
        assert_eq!(loaded, mask);

        let path2 = dir.path().join("test2.mask");
        loaded.write(&path2).unwrap();
        assert_eq!(fs::read(&path).unwrap(), fs::read(&path2).unwrap());
    }

    #[test]
    fn test_unknown_label_byte_is_corrupt() {
        let target = sigset("t", &[("A", "a1.emb", None)]);
        let query = sigset("q", &[("B", "b1.emb", None)]);
        let mask = make_mask(&target, &query, true);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mask");
        mask.write(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0x42;
        fs::write(&path, bytes).unwrap();

        let err = Mask::read(&path).unwrap_err();
        assert!(matches!(err, FormatError::CorruptFile { .. }));
    }
}
