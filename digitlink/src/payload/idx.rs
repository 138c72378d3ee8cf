//! MNIST IDX dataset files.
//!
//! ```text
//! Images (magic 2051)             Labels (magic 2049)
//! +--------+-------+------+------+  +--------+-------+
//! | Magic  | Count | Rows | Cols |  | Magic  | Count |
//! +--------+-------+------+------+  +--------+-------+
//! | u32 BE | u32   | u32  | u32  |  | u32 BE | u32   |
//! +--------+-------+------+------+  +--------+-------+
//! | Count * Rows * Cols bytes    |  | Count bytes    |
//! +------------------------------+  +----------------+
//! ```

use crate::error::{Error, Result};
use crate::payload::Payload;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;
use std::path::Path;

/// Magic number of an image file.
pub const IMAGES_MAGIC: u32 = 2051;

/// Magic number of a label file.
pub const LABELS_MAGIC: u32 = 2049;

fn read_magic<R: Read>(reader: &mut R, expected: u32) -> Result<()> {
    let magic = reader.read_u32::<BigEndian>()?;
    if magic != expected {
        return Err(Error::InvalidDataset(format!(
            "bad magic {magic} (expected {expected})"
        )));
    }
    Ok(())
}

/// Read exactly `len` body bytes.
///
/// `len` comes from the header, so the buffer grows with the data actually
/// read instead of being sized up front.
fn read_body<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader
        .take(len as u64)
        .read_to_end(&mut data)?;
    if data.len() != len {
        return Err(Error::InvalidDataset(format!(
            "truncated data: {} of {len} bytes",
            data.len()
        )));
    }
    Ok(data)
}

/// A set of same-sized grayscale images.
#[derive(Debug, Clone)]
pub struct IdxImages {
    rows: usize,
    cols: usize,
    data: Vec<u8>,
}

impl IdxImages {
    /// Load an image file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::read_from(&mut std::io::BufReader::new(file))
    }

    /// Parse an image file from a reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        read_magic(reader, IMAGES_MAGIC)?;
        let count = reader.read_u32::<BigEndian>()? as usize;
        let rows = reader.read_u32::<BigEndian>()? as usize;
        let cols = reader.read_u32::<BigEndian>()? as usize;

        let len = count
            .checked_mul(rows)
            .and_then(|n| n.checked_mul(cols))
            .ok_or_else(|| Error::InvalidDataset("image dimensions overflow".into()))?;
        let data = read_body(reader, len)?;

        Ok(Self { rows, cols, data })
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        match self.image_size() {
            0 => 0,
            size => self.data.len() / size,
        }
    }

    /// Whether the file holds no images.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows per image.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Columns per image.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Bytes per image.
    pub fn image_size(&self) -> usize {
        self.rows * self.cols
    }

    /// Row-major pixels of image `index`.
    pub fn image(&self, index: usize) -> Option<&[u8]> {
        let size = self.image_size();
        let start = index.checked_mul(size)?;
        let end = start.checked_add(size)?;
        self.data
            .get(start..end)
    }

    /// Image `index` as a payload.
    pub fn payload(&self, index: usize) -> Option<Result<Payload>> {
        self.image(index)
            .map(|pixels| Payload::new(pixels.to_vec()))
    }
}

/// Digit labels matching an image file.
#[derive(Debug, Clone)]
pub struct IdxLabels {
    labels: Vec<u8>,
}

impl IdxLabels {
    /// Load a label file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::read_from(&mut std::io::BufReader::new(file))
    }

    /// Parse a label file from a reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        read_magic(reader, LABELS_MAGIC)?;
        let count = reader.read_u32::<BigEndian>()? as usize;
        let labels = read_body(reader, count)?;
        Ok(Self { labels })
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the file holds no labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label of image `index`.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.labels
            .get(index)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn image_file(count: u32, rows: u32, cols: u32, body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(IMAGES_MAGIC).unwrap();
        buf.write_u32::<BigEndian>(count).unwrap();
        buf.write_u32::<BigEndian>(rows).unwrap();
        buf.write_u32::<BigEndian>(cols).unwrap();
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn test_read_images() {
        let body: Vec<u8> = (0..8).collect();
        let bytes = image_file(2, 2, 2, &body);

        let images = IdxImages::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images.image_size(), 4);
        assert_eq!(images.image(1), Some(&[4u8, 5, 6, 7][..]));
        assert_eq!(images.image(2), None);

        let payload = images.payload(0).unwrap().unwrap();
        assert_eq!(payload.as_bytes(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_read_images_bad_magic() {
        let mut bytes = image_file(1, 1, 1, &[0]);
        bytes[3] = 0x01;
        assert!(matches!(
            IdxImages::read_from(&mut Cursor::new(bytes)),
            Err(Error::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_read_images_truncated() {
        let bytes = image_file(2, 28, 28, &[0u8; 784]);
        assert!(matches!(
            IdxImages::read_from(&mut Cursor::new(bytes)),
            Err(Error::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_read_images_huge_header_is_error() {
        let bytes = image_file(u32::MAX, 0xFFFF, 0xFFFF, &[0u8; 16]);
        assert!(matches!(
            IdxImages::read_from(&mut Cursor::new(bytes)),
            Err(Error::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_read_labels_huge_count_is_error() {
        let mut bytes = Vec::new();
        bytes.write_u32::<BigEndian>(LABELS_MAGIC).unwrap();
        bytes.write_u32::<BigEndian>(u32::MAX).unwrap();
        bytes.extend_from_slice(&[1, 2]);

        assert!(matches!(
            IdxLabels::read_from(&mut Cursor::new(bytes)),
            Err(Error::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_read_labels() {
        let mut bytes = Vec::new();
        bytes.write_u32::<BigEndian>(LABELS_MAGIC).unwrap();
        bytes.write_u32::<BigEndian>(3).unwrap();
        bytes.extend_from_slice(&[7, 2, 1]);

        let labels = IdxLabels::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get(0), Some(7));
        assert_eq!(labels.get(3), None);
    }

    #[test]
    fn test_labels_reject_image_magic() {
        let bytes = image_file(0, 28, 28, &[]);
        assert!(IdxLabels::read_from(&mut Cursor::new(bytes)).is_err());
    }
}
