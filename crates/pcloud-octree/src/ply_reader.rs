//! PLY import for point clouds (ASCII only).
//!
//! Reads `x y z` and, when present, `intensity`, `nx ny nz` and
//! `red green blue` vertex properties. Positions become `Float3_64`,
//! intensities `UInt16`, normals `Float3_32` and colors `Float3_32` in `0..=1`.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::debug;
use pcloud_core::data_types::Encoding;
use pcloud_core::point::{FieldValue, Point, PointFields};
use pcloud_core::schema::{FieldKind, PointSchema};
use pcloud_core::status::{PointCloudError, PointCloudResult};

use crate::traits::PointCloudReader;

fn invalid(msg: impl Into<String>) -> PointCloudError {
    PointCloudError::Io(msg.into())
}

#[derive(Debug, Default)]
struct PlyHeader {
    vertex_count: usize,
    properties: Vec<(String, String)>,
}

impl PlyHeader {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|(_, n)| n == name)
    }

    fn type_of(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(_, n)| n == name)
            .map(|(t, _)| t.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    position: [usize; 3],
    intensity: Option<usize>,
    normal: Option<[usize; 3]>,
    color: Option<[usize; 3]>,
    /// Integer colors are divided by 255.
    color_divisor: f64,
}

/// ASCII PLY point reader.
#[derive(Debug)]
pub struct PlyReader {
    path: PathBuf,
    header: PlyHeader,
    columns: Columns,
    schema: PointSchema,
}

impl PlyReader {
    /// Opens a PLY file and parses its header.
    pub fn open<P: AsRef<Path>>(path: P) -> PointCloudResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path)
            .map_err(|e| invalid(format!("Cannot open {}: {}", path.display(), e)))?;
        let header = read_header(&mut BufReader::new(file))?;

        let find3 = |a: &str, b: &str, c: &str| -> Option<[usize; 3]> {
            Some([header.index_of(a)?, header.index_of(b)?, header.index_of(c)?])
        };
        let position = find3("x", "y", "z").ok_or_else(|| invalid("No x/y/z properties"))?;
        let intensity = header
            .index_of("intensity")
            .or_else(|| header.index_of("scalar_intensity"));
        let normal = find3("nx", "ny", "nz");
        let color = find3("red", "green", "blue");
        let color_divisor = match header.type_of("red") {
            Some("float") | Some("float32") | Some("double") | Some("float64") => 1.0,
            _ => 255.0,
        };

        let mut builder = PointSchema::builder().position(Encoding::Float3_64);
        if intensity.is_some() {
            builder = builder.intensity(Encoding::UInt16);
        }
        if normal.is_some() {
            builder = builder.normal(Encoding::Float3_32);
        }
        if color.is_some() {
            builder = builder.color(Encoding::Float3_32);
        }
        let schema = builder.build()?;
        debug!(
            "PLY {} has {} vertices, schema {}",
            path.display(),
            header.vertex_count,
            schema
        );

        Ok(Self {
            path,
            header,
            columns: Columns {
                position,
                intensity,
                normal,
                color,
                color_divisor,
            },
            schema,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.header.vertex_count
    }

    fn parse_line(&self, line: &str) -> PointCloudResult<Option<Point>> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < self.header.properties.len() {
            return Ok(None);
        }
        let num = |i: usize| -> PointCloudResult<f64> {
            parts[i]
                .parse::<f64>()
                .map_err(|_| invalid(format!("Bad value '{}' in {}", parts[i], self.path.display())))
        };
        let c = &self.columns;
        let mut point = Point::new().with(
            FieldKind::Position,
            FieldValue::Float3_64([num(c.position[0])?, num(c.position[1])?, num(c.position[2])?]),
        );
        if let Some(i) = c.intensity {
            let v = FieldValue::Float64(num(i)?);
            if let Some(v) = v.convert(Encoding::UInt16) {
                point.set_field(FieldKind::Intensity, v);
            }
        }
        if let Some([x, y, z]) = c.normal {
            point.set_field(
                FieldKind::Normal,
                FieldValue::Float3_32([num(x)? as f32, num(y)? as f32, num(z)? as f32]),
            );
        }
        if let Some([r, g, b]) = c.color {
            let d = c.color_divisor;
            point.set_field(
                FieldKind::Color,
                FieldValue::Float3_32([
                    (num(r)? / d) as f32,
                    (num(g)? / d) as f32,
                    (num(b)? / d) as f32,
                ]),
            );
        }
        Ok(Some(point))
    }
}

impl PointCloudReader for PlyReader {
    fn schema(&self) -> &PointSchema {
        &self.schema
    }

    fn read_points(&mut self) -> PointCloudResult<Vec<Point>> {
        let file = fs::File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        read_header(&mut reader)?;

        let mut points = Vec::with_capacity(self.header.vertex_count);
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(point) = self.parse_line(trimmed)? {
                points.push(point);
            }
            if points.len() >= self.header.vertex_count {
                break;
            }
        }
        Ok(points)
    }
}

fn read_header<R: BufRead>(reader: &mut R) -> PointCloudResult<PlyHeader> {
    let mut header = PlyHeader::default();
    let mut in_vertex = false;
    let mut line = String::new();
    let mut first = true;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(invalid("No end_header found"));
        }
        let trimmed = line.trim();
        if first {
            if trimmed != "ply" {
                return Err(invalid("Missing 'ply' magic"));
            }
            first = false;
            continue;
        }
        if trimmed == "end_header" {
            break;
        }
        let mut words = trimmed.split_whitespace();
        match words.next() {
            Some("format") => {
                if words.next() != Some("ascii") {
                    return Err(invalid("Only ASCII PLY files are supported"));
                }
            }
            Some("element") => {
                in_vertex = words.next() == Some("vertex");
                if in_vertex {
                    header.vertex_count = words
                        .next()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| invalid("Invalid vertex count"))?;
                }
            }
            Some("property") if in_vertex => {
                let ty = words.next().unwrap_or_default().to_string();
                let name = words.last().unwrap_or_default().to_string();
                header.properties.push((ty, name));
            }
            _ => {}
        }
    }
    Ok(header)
}

/// Writes points as an ASCII PLY file with the fields present in `schema`.
pub fn write_ply_points<P: AsRef<Path>>(
    path: P,
    schema: &PointSchema,
    points: &[Point],
) -> PointCloudResult<()> {
    let mut file = std::io::BufWriter::new(fs::File::create(path)?);
    let has_intensity = schema.has_field(FieldKind::Intensity);
    let has_normal = schema.has_field(FieldKind::Normal);
    let has_color = schema.has_field(FieldKind::Color);

    writeln!(file, "ply")?;
    writeln!(file, "format ascii 1.0")?;
    writeln!(file, "element vertex {}", points.len())?;
    writeln!(file, "property double x")?;
    writeln!(file, "property double y")?;
    writeln!(file, "property double z")?;
    if has_intensity {
        writeln!(file, "property ushort intensity")?;
    }
    if has_normal {
        writeln!(file, "property float nx")?;
        writeln!(file, "property float ny")?;
        writeln!(file, "property float nz")?;
    }
    if has_color {
        writeln!(file, "property float red")?;
        writeln!(file, "property float green")?;
        writeln!(file, "property float blue")?;
    }
    writeln!(file, "end_header")?;

    for p in points {
        let pos = p.position().unwrap_or_default();
        write!(file, "{} {} {}", pos.x, pos.y, pos.z)?;
        if has_intensity {
            write!(file, " {}", p.intensity().unwrap_or(0.0))?;
        }
        if has_normal {
            let n = p.normal().unwrap_or_default();
            write!(file, " {} {} {}", n.x, n.y, n.z)?;
        }
        if has_color {
            let c = p.color().and_then(|c| c.as_dvec3()).unwrap_or_default();
            write!(file, " {} {} {}", c.x, c.y, c.z)?;
        }
        writeln!(file)?;
    }
    file.flush()?;
    Ok(())
}
