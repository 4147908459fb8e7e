//! Octant payloads: `Octants/<octant id>.node` files.
//!
//! A payload is a `u32` point count and a `u32` raw point length followed by
//! that many raw points, little-endian. Octants without points have no file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use pcloud_core::codec::RawPointCodec;
use pcloud_core::container::PointCloud;
use pcloud_core::point::PointFields;
use pcloud_core::status::{PointCloudError, PointCloudResult};

use crate::octant::{Octant, OctantId};

pub const OCTANTS_DIR: &str = "Octants";
pub const NODE_EXTENSION: &str = "node";

const HEADER_LEN: usize = 8;

pub fn node_file_path(folder: &Path, id: &OctantId) -> PathBuf {
    folder
        .join(OCTANTS_DIR)
        .join(format!("{}.{}", id, NODE_EXTENSION))
}

/// Where octant payload bytes come from.
///
/// Implementations are shared with the loader's worker threads.
pub trait PayloadSource: Send + Sync {
    /// Returns the complete payload file of one octant.
    ///
    /// # Errors
    ///
    /// Returns `PointCloudError::LoadFailure` if the payload cannot be read.
    fn read_payload(&self, id: &OctantId) -> PointCloudResult<Vec<u8>>;
}

/// Reads payloads from the `Octants` directory of a point cloud folder.
#[derive(Debug, Clone)]
pub struct FolderPayloadSource {
    folder: PathBuf,
}

impl FolderPayloadSource {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

impl PayloadSource for FolderPayloadSource {
    fn read_payload(&self, id: &OctantId) -> PointCloudResult<Vec<u8>> {
        let path = node_file_path(&self.folder, id);
        fs::read(&path).map_err(|e| PointCloudError::LoadFailure {
            octant: id.to_string(),
            reason: match e.kind() {
                io::ErrorKind::NotFound => format!("missing payload file {}", path.display()),
                _ => format!("cannot read {}: {}", path.display(), e),
            },
        })
    }
}

pub fn encode_payload<P: PointFields>(
    codec: &RawPointCodec,
    points: &[P],
) -> PointCloudResult<Vec<u8>> {
    let mut out = vec![0u8; HEADER_LEN];
    LittleEndian::write_u32(&mut out[0..4], points.len() as u32);
    LittleEndian::write_u32(&mut out[4..8], codec.point_len() as u32);
    out.extend(codec.encode_all(points)?);
    Ok(out)
}

/// Reads the point count and raw point length from a payload header.
pub fn payload_header(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    Some((
        LittleEndian::read_u32(&bytes[0..4]),
        LittleEndian::read_u32(&bytes[4..8]),
    ))
}

/// Checks the payload header against `codec` and returns the point count and
/// the raw point bytes that follow it.
fn payload_body<'a>(
    codec: &RawPointCodec,
    id: &OctantId,
    bytes: &'a [u8],
) -> PointCloudResult<(usize, &'a [u8])> {
    let fail = |reason: String| PointCloudError::LoadFailure {
        octant: id.to_string(),
        reason,
    };
    let (count, point_len) =
        payload_header(bytes).ok_or_else(|| fail("payload header is truncated".into()))?;
    if point_len as usize != codec.point_len() {
        return Err(fail(format!(
            "payload points are {} bytes, schema expects {}",
            point_len,
            codec.point_len()
        )));
    }
    Ok((count as usize, &bytes[HEADER_LEN..]))
}

/// Decodes a payload file into points.
///
/// Every failure is reported as a `LoadFailure` for `id`.
pub fn decode_payload<P: PointFields>(
    codec: &RawPointCodec,
    id: &OctantId,
    bytes: &[u8],
) -> PointCloudResult<Vec<P>> {
    let (count, body) = payload_body(codec, id, bytes)?;
    codec
        .decode_all(body, count)
        .map_err(|e| e.into_load_failure(id.to_string()))
}

/// Reads and decodes the payload of `octant` into a point cloud.
///
/// Octants without points are answered with an empty cloud without touching
/// the source.
pub fn load_octant<P: PointFields>(
    source: &dyn PayloadSource,
    codec: &RawPointCodec,
    octant: &Octant,
) -> PointCloudResult<PointCloud<P>> {
    let source_name = octant.id.to_string();
    if octant.point_count == 0 {
        return PointCloud::from_raw(codec, &[], 0, octant.spacing, source_name);
    }
    let bytes = source.read_payload(&octant.id)?;
    let (count, body) = payload_body(codec, &octant.id, &bytes)?;
    if count != octant.point_count as usize {
        return Err(PointCloudError::LoadFailure {
            octant: source_name,
            reason: format!(
                "payload holds {} points, hierarchy declares {}",
                count, octant.point_count
            ),
        });
    }
    PointCloud::from_raw(codec, body, count, octant.spacing, source_name.clone())
        .map_err(|e| e.into_load_failure(source_name))
}
