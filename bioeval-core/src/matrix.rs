use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Score recorded for cells that must not enter any metric: self-comparisons
/// excluded by configuration and comparisons against failure-to-enroll gaps.
pub const NON_COMPARABLE: f32 = f32::NEG_INFINITY;

/// Written raw after the dimension fields; a reader on a machine with the
/// other byte order sees it scrambled and rejects the file.
const BYTE_ORDER_TAG: u32 = 0x1234_5678;

const MAGIC: &[u8] = b"S2";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt file {}: {}", .path.display(), .reason)]
    CorruptFile { path: PathBuf, reason: String },
}

impl FormatError {
    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        FormatError::CorruptFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        FormatError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Parsed file header: magic line, the two gallery/sigset names, a payload
/// kind tag ('F' = f32 scores, 'B' = byte labels), and the declared shape.
pub(crate) struct Header {
    pub kind: u8,
    pub target_name: String,
    pub query_name: String,
    pub rows: usize,
    pub cols: usize,
    /// Offset of the first payload byte
    pub payload: usize,
}

pub(crate) fn write_header(
    out: &mut Vec<u8>,
    kind: u8,
    target_name: &str,
    query_name: &str,
    rows: usize,
    cols: usize,
) {
    out.extend_from_slice(MAGIC);
    out.push(b'\n');
    out.extend_from_slice(target_name.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(query_name.as_bytes());
    out.push(b'\n');
    out.push(b'M');
    out.push(kind);
    out.extend_from_slice(format!(" {} {} ", rows, cols).as_bytes());
    out.extend_from_slice(&BYTE_ORDER_TAG.to_le_bytes());
    out.push(b'\n');
}

pub(crate) fn parse_header(path: &Path, buf: &[u8]) -> Result<Header, FormatError> {
    let mut pos = 0;

    let magic = read_line(path, buf, &mut pos)?;
    if magic != MAGIC {
        return Err(FormatError::corrupt(path, "bad magic, expected S2"));
    }
    let target_name = String::from_utf8(read_line(path, buf, &mut pos)?.to_vec())
        .map_err(|_| FormatError::corrupt(path, "target name is not valid UTF-8"))?;
    let query_name = String::from_utf8(read_line(path, buf, &mut pos)?.to_vec())
        .map_err(|_| FormatError::corrupt(path, "query name is not valid UTF-8"))?;

    // Dimension line: M{F|B} <rows> <cols> <4 raw byte-order bytes>
    if buf.len() < pos + 2 || buf[pos] != b'M' {
        return Err(FormatError::corrupt(path, "missing dimension line"));
    }
    let kind = buf[pos + 1];
    if kind != b'F' && kind != b'B' {
        return Err(FormatError::corrupt(
            path,
            format!("unknown payload kind {:?}", kind as char),
        ));
    }
    pos += 2;
    expect(path, buf, &mut pos, b' ')?;
    let rows = read_usize(path, buf, &mut pos)?;
    expect(path, buf, &mut pos, b' ')?;
    let cols = read_usize(path, buf, &mut pos)?;
    expect(path, buf, &mut pos, b' ')?;

    if buf.len() < pos + 4 {
        return Err(FormatError::corrupt(path, "truncated byte-order tag"));
    }
    let tag = u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
    if tag != BYTE_ORDER_TAG {
        return Err(FormatError::corrupt(path, "byte-order tag mismatch"));
    }
    pos += 4;
    expect(path, buf, &mut pos, b'\n')?;

    Ok(Header {
        kind,
        target_name,
        query_name,
        rows,
        cols,
        payload: pos,
    })
}

fn read_line<'a>(path: &Path, buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], FormatError> {
    let start = *pos;
    let end = buf[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| start + i)
        .ok_or_else(|| FormatError::corrupt(path, "truncated header"))?;
    *pos = end + 1;
    Ok(&buf[start..end])
}

fn read_usize(path: &Path, buf: &[u8], pos: &mut usize) -> Result<usize, FormatError> {
    let mut value: usize = 0;
    let start = *pos;
    while let Some(byte) = buf.get(*pos).filter(|b| b.is_ascii_digit()) {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((byte - b'0') as usize))
            .ok_or_else(|| FormatError::corrupt(path, "dimension out of range"))?;
        *pos += 1;
    }
    if *pos == start {
        return Err(FormatError::corrupt(path, "malformed dimension"));
    }
    Ok(value)
}

fn expect(path: &Path, buf: &[u8], pos: &mut usize, byte: u8) -> Result<(), FormatError> {
    if buf.get(*pos) != Some(&byte) {
        return Err(FormatError::corrupt(path, "malformed dimension line"));
    }
    *pos += 1;
    Ok(())
}

pub(crate) fn cell_count(path: &Path, rows: usize, cols: usize) -> Result<usize, FormatError> {
    rows.checked_mul(cols)
        .ok_or_else(|| FormatError::corrupt(path, "dimensions overflow"))
}

/// Dense target x query score matrix in row-major order. Shape is fixed at
/// construction and always matches the galleries (or file header) it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    target_name: String,
    query_name: String,
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl SimilarityMatrix {
    pub fn from_data(
        target_name: String,
        query_name: String,
        rows: usize,
        cols: usize,
        data: Vec<f32>,
    ) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Self {
            target_name,
            query_name,
            rows,
            cols,
            data,
        }
    }

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

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn scores(&self) -> &[f32] {
        &self.data
    }

    /// Write the matrix to a .mtx file
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), FormatError> {
        let path = path.as_ref();
        let mut out = Vec::with_capacity(64 + self.data.len() * 4);
        write_header(
            &mut out,
            b'F',
            &self.target_name,
            &self.query_name,
            self.rows,
            self.cols,
        );
        for score in &self.data {
            out.extend_from_slice(&score.to_le_bytes());
        }
        fs::write(path, out).map_err(|e| FormatError::io(path, e))
    }

    /// Load a matrix from a .mtx file, regardless of which system wrote it
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let path = path.as_ref();
        let buf = fs::read(path).map_err(|e| FormatError::io(path, e))?;
        let header = parse_header(path, &buf)?;
        if header.kind != b'F' {
            return Err(FormatError::corrupt(
                path,
                "expected a score matrix, found a byte mask",
            ));
        }

        let cells = cell_count(path, header.rows, header.cols)?;
        let expected = cells
            .checked_mul(4)
            .ok_or_else(|| FormatError::corrupt(path, "dimensions overflow"))?;
        let payload = &buf[header.payload..];
        if payload.len() != expected {
            return Err(FormatError::corrupt(
                path,
                format!(
                    "payload is {} bytes, header declares {}x{} scores ({} bytes)",
                    payload.len(),
                    header.rows,
                    header.cols,
                    expected
                ),
            ));
        }

        let data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self {
            target_name: header.target_name,
            query_name: header.query_name,
            rows: header.rows,
            cols: header.cols,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SimilarityMatrix {
        SimilarityMatrix::from_data(
            "target".to_string(),
            "query".to_string(),
            3,
            2,
            vec![0.9, 0.1, 0.2, 0.05, NON_COMPARABLE, 0.3],
        )
    }

    #[test]
    fn test_round_trip_bit_identical() {
        let matrix = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.mtx");

        matrix.write(&path).unwrap();
        let loaded = SimilarityMatrix::read(&path).unwrap();

        assert_eq!(loaded.target_name(), "target");
        assert_eq!(loaded.query_name(), "query");
        assert_eq!(loaded.rows(), 3);
        assert_eq!(loaded.cols(), 2);
        // Bit-level equality, including the sentinel
        for (a, b) in matrix.scores().iter().zip(loaded.scores()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }

        // And writing again produces identical bytes
        let path2 = dir.path().join("scores2.mtx");
        loaded.write(&path2).unwrap();
        assert_eq!(fs::read(&path).unwrap(), fs::read(&path2).unwrap());
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let matrix = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.mtx");
        matrix.write(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        fs::write(&path, bytes).unwrap();

        let err = SimilarityMatrix::read(&path).unwrap_err();
        assert!(matches!(err, FormatError::CorruptFile { .. }));
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.mtx");
        fs::write(&path, b"XX\nt\nq\nMF 1 1 xxxx\n\0\0\0\0").unwrap();

        let err = SimilarityMatrix::read(&path).unwrap_err();
        assert!(matches!(err, FormatError::CorruptFile { .. }));
    }
}
