//! Raw record layouts of the studio model file family.
//!
//! Every file is a little-endian blob of fixed-size records that point at each other with
//! byte offsets, so records are read at absolute positions rather than streamed.

use std::io::Cursor;

use binrw::{BinRead, BinResult, NullString};
use glam::{Mat3, Quat, Vec3};

use crate::transform::DecomposedTransform;

pub mod mdl;
pub mod phy;
pub mod vtx;
pub mod vvd;

/// Size in bytes of one record in a table.
pub trait FixedSize {
    const SIZE: u64;
}

impl FixedSize for u16 {
    const SIZE: u64 = 2;
}

impl FixedSize for i16 {
    const SIZE: u64 = 2;
}

pub(crate) fn bad_data(pos: u64, message: String) -> binrw::Error {
    binrw::Error::AssertFail { pos, message }
}

/// `base + relative`, rejecting positions before the start of the file.
pub(crate) fn offset(base: u64, relative: i32) -> BinResult<u64> {
    u64::try_from(base as i64 + i64::from(relative)).map_err(|_| {
        bad_data(
            base,
            format!("Offset {} points before the start of the file", relative),
        )
    })
}

pub(crate) fn count(value: i32, pos: u64, what: &str) -> BinResult<usize> {
    usize::try_from(value).map_err(|_| bad_data(pos, format!("Bad {} count: {}", what, value)))
}

pub(crate) fn read_at<T>(data: &[u8], offset: u64) -> BinResult<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(data);
    cursor.set_position(offset);
    T::read_le(&mut cursor)
}

/// Reads `count` consecutive records starting at `offset`.
pub(crate) fn read_table<T>(data: &[u8], offset: u64, count: usize) -> BinResult<Vec<T>>
where
    T: FixedSize + for<'a> BinRead<Args<'a> = ()>,
{
    let end = (count as u64)
        .checked_mul(T::SIZE)
        .and_then(|size| size.checked_add(offset));
    match end {
        Some(end) if end <= data.len() as u64 => {}
        _ => {
            return Err(bad_data(
                offset,
                format!(
                    "Table of {} records ({} bytes each) runs past the end of the file ({} bytes)",
                    count,
                    T::SIZE,
                    data.len()
                ),
            ))
        }
    }
    (0..count as u64)
        .map(|index| read_at(data, offset + index * T::SIZE))
        .collect()
}

pub(crate) fn read_string_at(data: &[u8], offset: u64) -> BinResult<String> {
    let string: NullString = read_at(data, offset)?;
    Ok(String::from_utf8_lossy(&string.0).into_owned())
}

/// Text stored in a fixed-size, zero-padded field.
pub(crate) fn fixed_string<const N: usize>(bytes: [u8; N]) -> String {
    let end = bytes.iter().position(|byte| *byte == 0).unwrap_or(N);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// A row-major 3x4 matrix: rotation in the first three columns, translation in the last.
pub(crate) fn matrix3x4_to_transform(matrix: &[f32; 12]) -> DecomposedTransform {
    let rotation = Mat3::from_cols(
        Vec3::new(matrix[0], matrix[4], matrix[8]),
        Vec3::new(matrix[1], matrix[5], matrix[9]),
        Vec3::new(matrix[2], matrix[6], matrix[10]),
    );
    DecomposedTransform::new(
        Vec3::new(matrix[3], matrix[7], matrix[11]),
        Quat::from_mat3(&rotation).normalize(),
    )
}

#[cfg(test)]
mod test {
    use binrw::BinRead;
    use glam::Vec3;

    use super::{fixed_string, matrix3x4_to_transform, offset, read_table, FixedSize};

    #[derive(Debug, BinRead, PartialEq)]
    struct Pair {
        a: u16,
        b: u16,
    }

    impl FixedSize for Pair {
        const SIZE: u64 = 4;
    }

    #[test]
    fn table_reads_at_stride() {
        let data = [1, 0, 2, 0, 3, 0, 4, 0];
        let pairs: Vec<Pair> = read_table(&data, 0, 2).unwrap();
        assert_eq!(pairs, vec![Pair { a: 1, b: 2 }, Pair { a: 3, b: 4 }]);
    }

    #[test]
    fn table_past_end_is_rejected() {
        let data = [0u8; 6];
        assert!(read_table::<Pair>(&data, 4, 1).is_err());
        assert!(read_table::<Pair>(&data, 0, usize::MAX).is_err());
    }

    #[test]
    fn negative_offsets_stop_at_file_start() {
        assert_eq!(offset(100, -20).unwrap(), 80);
        assert!(offset(10, -20).is_err());
    }

    #[test]
    fn fixed_strings_stop_at_nul() {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(b"body");
        assert_eq!(fixed_string(bytes), "body");
    }

    #[test]
    fn matrix_translation_is_last_column() {
        let matrix = [
            1.0, 0.0, 0.0, 5.0, //
            0.0, 1.0, 0.0, 6.0, //
            0.0, 0.0, 1.0, 7.0,
        ];
        let transform = matrix3x4_to_transform(&matrix);
        assert_eq!(transform.translation, Vec3::new(5.0, 6.0, 7.0));
        assert!(transform.rotation.abs_diff_eq(glam::Quat::IDENTITY, 1e-6));
    }
}
