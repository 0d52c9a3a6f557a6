use byteorder::{ByteOrder, LittleEndian};

use crate::tile::NAVMESH_MAGIC;

use super::{DecodeError, Payload, SourceFormat, SourceHeader, SourceMesh, SourceParams, SOURCE_VERSION};

/// Finds every embedded tile record: the magic followed by the source version,
/// with the record length stored in the `i32` just before the magic.
pub(crate) fn scan_binary(bytes: &[u8]) -> Result<SourceMesh, DecodeError> {
    let mut payloads = Vec::new();
    let mut i = 4;
    while i + 8 <= bytes.len() {
        let magic = LittleEndian::read_i32(&bytes[i..i + 4]);
        let version = LittleEndian::read_i32(&bytes[i + 4..i + 8]);
        if magic == NAVMESH_MAGIC && version == SOURCE_VERSION {
            let value = LittleEndian::read_i32(&bytes[i - 4..i]);
            let declared_len = usize::try_from(value).map_err(|_| DecodeError::NegativeLength { offset: i - 4, value })?;
            let end = i.saturating_add(declared_len).min(bytes.len());
            payloads.push(Payload { offset: i, bytes: bytes[i..end].to_vec(), declared_len });
            i += SourceHeader::SIZE;
        }
        i += 1;
    }
    Ok(SourceMesh {
        format: SourceFormat::Binary,
        params: SourceParams::default().with_defaults(),
        payloads,
        off_mesh: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{binary_asset, quad_grid_tile};

    #[test]
    fn finds_length_prefixed_records() {
        let a = quad_grid_tile(0, 0, 2, 2, 0.0);
        let b = quad_grid_tile(1, 0, 1, 1, 0.0);
        let blob = binary_asset(&[a.clone(), b.clone()]);
        let mesh = scan_binary(&blob).unwrap();
        assert_eq!(mesh.format, SourceFormat::Binary);
        assert_eq!(mesh.payloads.len(), 2);
        assert!(mesh.off_mesh.is_empty());
        assert_eq!(mesh.payloads[0].declared_len, a.encode().len());
        assert_eq!(mesh.payloads[0].decode().unwrap().polys, a.polys);
        assert_eq!(mesh.payloads[1].decode().unwrap().header.x, 1);
        assert_eq!(mesh.params.walkable_climb, 0.4166667);
    }

    #[test]
    fn magic_without_version_is_skipped() {
        let mut blob = vec![0u8; 32];
        LittleEndian::write_i32(&mut blob[8..12], NAVMESH_MAGIC);
        LittleEndian::write_i32(&mut blob[12..16], 7);
        assert!(scan_binary(&blob).unwrap().payloads.is_empty());
    }

    #[test]
    fn truncated_tail_is_clamped_and_fails_decode() {
        let tile = quad_grid_tile(0, 0, 1, 1, 0.0);
        let mut blob = binary_asset(&[tile]);
        blob.truncate(blob.len() - 20);
        let mesh = scan_binary(&blob).unwrap();
        assert_eq!(mesh.payloads.len(), 1);
        assert!(mesh.payloads[0].bytes.len() < mesh.payloads[0].declared_len);
        assert!(mesh.payloads[0].decode().is_err());
    }

    #[test]
    fn negative_length_prefix_is_an_error() {
        let mut blob = vec![0u8; 16];
        LittleEndian::write_i32(&mut blob[0..4], -5);
        LittleEndian::write_i32(&mut blob[4..8], NAVMESH_MAGIC);
        LittleEndian::write_i32(&mut blob[8..12], SOURCE_VERSION);
        assert!(matches!(scan_binary(&blob), Err(DecodeError::NegativeLength { offset: 0, value: -5 })));
    }
}
