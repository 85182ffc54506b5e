use thiserror::Error;

use crate::model::{GridCell, MapSize};

/// Storage width of one encoded cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellWidth {
    Byte,
    /// Little-endian `u16`, for values above 255 such as terrain short hashes.
    Short,
}

impl CellWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GridCodecError {
    #[error("grid buffer length mismatch: expected {expected} bytes for {size} cells of width {width}, got {actual}")]
    LengthMismatch {
        expected: usize,
        actual: usize,
        size: MapSize,
        width: usize,
    },
    #[error("cell ({x}, {y}) value {value} does not fit a one-byte grid")]
    ValueOutOfRange { x: u32, y: u32, value: u16 },
}

pub fn encode_grid(
    size: MapSize,
    width: CellWidth,
    mut cell_value: impl FnMut(GridCell) -> u16,
) -> Result<Vec<u8>, GridCodecError> {
    let mut bytes = Vec::<u8>::with_capacity(size.cell_count() * width.bytes());
    for cell in size.cells() {
        let value = cell_value(cell);
        match width {
            CellWidth::Byte => {
                let byte = u8::try_from(value).map_err(|_| GridCodecError::ValueOutOfRange {
                    x: cell.x,
                    y: cell.y,
                    value,
                })?;
                bytes.push(byte);
            }
            CellWidth::Short => bytes.extend_from_slice(&value.to_le_bytes()),
        }
    }
    Ok(bytes)
}

/// Calls `apply` once per cell in row-major order. The length is checked up
/// front, so a mismatched buffer never reaches the callback.
pub fn decode_grid(
    bytes: &[u8],
    size: MapSize,
    width: CellWidth,
    mut apply: impl FnMut(GridCell, u16),
) -> Result<(), GridCodecError> {
    check_length(bytes, size, width)?;
    let chunks = bytes.chunks_exact(width.bytes());
    for (cell, chunk) in size.cells().zip(chunks) {
        let value = match width {
            CellWidth::Byte => u16::from(chunk[0]),
            CellWidth::Short => u16::from_le_bytes([chunk[0], chunk[1]]),
        };
        apply(cell, value);
    }
    Ok(())
}

pub fn decode_values(
    bytes: &[u8],
    size: MapSize,
    width: CellWidth,
) -> Result<Vec<u16>, GridCodecError> {
    let mut values = Vec::<u16>::with_capacity(size.cell_count());
    decode_grid(bytes, size, width, |_, value| values.push(value))?;
    Ok(values)
}

fn check_length(bytes: &[u8], size: MapSize, width: CellWidth) -> Result<(), GridCodecError> {
    let expected = size.cell_count() * width.bytes();
    if bytes.len() != expected {
        return Err(GridCodecError::LengthMismatch {
            expected,
            actual: bytes.len(),
            size,
            width: width.bytes(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_grid_roundtrip_preserves_cells() {
        let size = MapSize::new(3, 2);
        let source = [0u16, 1, 2, 255, 7, 9];
        let bytes = encode_grid(size, CellWidth::Byte, |cell| {
            source[size.index_of(cell).expect("in bounds")]
        })
        .expect("encode");
        assert_eq!(bytes.len(), 6);

        let decoded = decode_values(&bytes, size, CellWidth::Byte).expect("decode");
        assert_eq!(decoded, source);
    }

    #[test]
    fn short_grid_roundtrip_keeps_values_above_255() {
        let size = MapSize::new(2, 2);
        let source = [1u16, 300, 65_535, 2];
        let bytes = encode_grid(size, CellWidth::Short, |cell| {
            source[size.index_of(cell).expect("in bounds")]
        })
        .expect("encode");
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[2..4], &300u16.to_le_bytes());

        let decoded = decode_values(&bytes, size, CellWidth::Short).expect("decode");
        assert_eq!(decoded, source);
    }

    #[test]
    fn byte_grid_rejects_wide_values() {
        let err = encode_grid(MapSize::new(1, 1), CellWidth::Byte, |_| 256).expect_err("err");
        assert_eq!(
            err,
            GridCodecError::ValueOutOfRange {
                x: 0,
                y: 0,
                value: 256
            }
        );
    }

    #[test]
    fn length_mismatch_never_invokes_callback() {
        let mut calls = 0;
        let err = decode_grid(&[1, 2, 3], MapSize::new(2, 2), CellWidth::Byte, |_, _| {
            calls += 1;
        })
        .expect_err("mismatch");
        assert!(matches!(
            err,
            GridCodecError::LengthMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
        assert_eq!(calls, 0);

        let err = decode_values(&[0; 4], MapSize::new(2, 2), CellWidth::Short).expect_err("err");
        assert!(matches!(err, GridCodecError::LengthMismatch { expected: 8, .. }));
    }

    #[test]
    fn decode_visits_cells_in_row_major_order() {
        let size = MapSize::new(2, 2);
        let mut visited = Vec::new();
        decode_grid(&[10, 11, 12, 13], size, CellWidth::Byte, |cell, value| {
            visited.push((cell.x, cell.y, value));
        })
        .expect("decode");
        assert_eq!(visited, vec![(0, 0, 10), (1, 0, 11), (0, 1, 12), (1, 1, 13)]);
    }
}
