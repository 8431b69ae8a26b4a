//! SRTM elevation (`.hgt`) tiles, as distributed in zip archives.
//!
//! A tile covers one square degree and holds `R x R` big-endian
//! unsigned 16-bit samples, row-major, north row first. The tile is
//! named after its southwest corner, e.g. `N44W072`.
//!
//! # References
//!
//! 1. [SRTM Collection User Guide](https://lpdaac.usgs.gov/documents/179/SRTM_User_Guide_V3.pdf)
//! 1. [Archive Team](http://fileformats.archiveteam.org/index.php?title=HGT&oldid=17250)

mod error;

pub use crate::error::SrtmError;
use byteorder::{BigEndian as BE, ByteOrder};
use geo::geometry::Coord;
use std::{
    fmt,
    fs::File,
    io::{BufReader, Read, Seek},
    mem::size_of,
    path::Path,
    str::FromStr,
};
use zip::{result::ZipError, ZipArchive};

/// Base floating point type used for all coordinates and calculations.
pub type C = f64;

/// Samples per row of a 1 arcsecond (SRTMGL1) tile.
pub const SRTMGL1_RESOLUTION: usize = 3601;

/// One square degree cell, identified by its southwest corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
    sw_corner: Coord<i16>,
}

impl CellId {
    pub fn new(lat: i16, lon: i16) -> Self {
        Self {
            sw_corner: Coord { x: lon, y: lat },
        }
    }

    /// Returns the cell containing `coord`.
    pub fn from_coord(coord: Coord<C>) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self::new(coord.y.floor() as i16, coord.x.floor() as i16)
    }

    /// Returns this cell's canonical name, e.g. `N44W072`.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Name of the HGT member inside an archive.
    pub fn hgt_name(&self) -> String {
        format!("{self}.hgt")
    }

    /// Name of the downloadable archive, e.g.
    /// `N44W072.SRTMGL1.hgt.zip` for suffix `SRTMGL1.hgt`.
    pub fn archive_name(&self, suffix: &str) -> String {
        format!("{self}.{suffix}.zip")
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Coord { x: lon, y: lat } = self.sw_corner;
        let n_s = if lat < 0 { 'S' } else { 'N' };
        let e_w = if lon < 0 { 'W' } else { 'E' };
        let (lat, lon) = (lat.unsigned_abs(), lon.unsigned_abs());
        write!(f, "{n_s}{lat:02}{e_w}{lon:03}")
    }
}

impl FromStr for CellId {
    type Err = SrtmError;

    /// Parses the leading `N44W072` part of a cell, HGT or archive
    /// name.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let mk_err = || SrtmError::CellName(name.to_owned());
        let name7 = name.get(0..7).ok_or_else(mk_err)?;
        if !name7.is_ascii() {
            return Err(mk_err());
        }
        let lat_sign = match &name7[0..1] {
            "N" => 1,
            "S" => -1,
            _ => return Err(mk_err()),
        };
        let lat = lat_sign * name7[1..3].parse::<i16>().map_err(|_| mk_err())?;
        let lon_sign = match &name7[3..4] {
            "E" => 1,
            "W" => -1,
            _ => return Err(mk_err()),
        };
        let lon = lon_sign * name7[4..7].parse::<i16>().map_err(|_| mk_err())?;
        Ok(Self::new(lat, lon))
    }
}

pub struct Tile {
    cell: CellId,

    /// Number of samples per row (and rows per tile).
    resolution: usize,

    /// Elevation samples, north row first.
    samples: Box<[u16]>,
}

impl Tile {
    /// Builds a tile from already decoded samples.
    pub fn from_samples(cell: CellId, resolution: usize, samples: Vec<u16>) -> Result<Self, SrtmError> {
        let expected = resolution * resolution;
        if samples.len() != expected {
            return Err(SrtmError::HgtLen(samples.len(), cell.name(), expected));
        }
        Ok(Self {
            cell,
            resolution,
            samples: samples.into_boxed_slice(),
        })
    }

    /// Decodes a raw `.hgt` stream.
    pub fn from_hgt<R: Read>(cell: CellId, resolution: usize, mut rdr: R) -> Result<Self, SrtmError> {
        let expected = resolution * resolution * size_of::<u16>();
        let mut raw = Vec::with_capacity(expected);
        rdr.read_to_end(&mut raw)?;
        if raw.len() != expected {
            return Err(SrtmError::HgtLen(raw.len(), cell.hgt_name(), expected));
        }
        let samples = raw.chunks_exact(2).map(BE::read_u16).collect();
        Self::from_samples(cell, resolution, samples)
    }

    /// Decodes the `{cell}.hgt` member of a zip archive.
    pub fn from_archive<R: Read + Seek>(cell: CellId, resolution: usize, archive: R) -> Result<Self, SrtmError> {
        let mut zip = ZipArchive::new(archive)?;
        let member = cell.hgt_name();
        let file = match zip.by_name(&member) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(SrtmError::MissingMember(member)),
            Err(e) => return Err(e.into()),
        };
        Self::from_hgt(cell, resolution, BufReader::new(file))
    }

    /// Opens a zip archive on disk, deriving the cell from the file
    /// name.
    pub fn open<P: AsRef<Path>>(path: P, resolution: usize) -> Result<Self, SrtmError> {
        let path = path.as_ref();
        let cell = path
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .ok_or_else(|| SrtmError::CellName(path.display().to_string()))?
            .parse::<CellId>()?;
        Self::from_archive(cell, resolution, BufReader::new(File::open(path)?))
    }

    pub fn cell(&self) -> CellId {
        self.cell
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Returns `true` if `coord` falls within this tile's cell.
    pub fn contains(&self, coord: Coord<C>) -> bool {
        CellId::from_coord(coord) == self.cell
    }

    /// Returns the bilinearly interpolated elevation at `coord`,
    /// rounded to the nearest meter.
    ///
    /// Uses the sample at the computed grid position plus its east,
    /// north and northeast neighbours, clamped at the tile edges.
    pub fn interpolate(&self, coord: Coord<C>) -> C {
        #[allow(clippy::cast_precision_loss)]
        let r = self.resolution as C;
        let x = coord.x.rem_euclid(1.0) * r;
        let y = (1.0 - coord.y.rem_euclid(1.0)) * r - 1.0;
        let (fx, fy) = (x.rem_euclid(1.0), y.rem_euclid(1.0));

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (col, row) = (x as usize, y.trunc() as isize);
        let last = self.resolution - 1;

        let mut elevation = 0.0;
        for (i, wx) in [(0, 1.0 - fx), (1, fx)] {
            for (j, wy) in [(0_isize, 1.0 - fy), (1, fy)] {
                let xx = (col + i).min(last);
                #[allow(clippy::cast_sign_loss)]
                let yy = (row - j).max(0) as usize;
                elevation += wx * wy * C::from(self.get_xy((xx, yy.min(last))));
            }
        }
        elevation.round()
    }
}

/// Private API
impl Tile {
    fn get_xy(&self, (x, y): (usize, usize)) -> u16 {
        self.samples[self.resolution * y + x]
    }
}

#[cfg(test)]
mod tests {
    use super::{CellId, SrtmError, Tile, C};
    use approx::assert_relative_eq;
    use geo::geometry::Coord;
    use std::io::{Cursor, Write};
    use zip::{write::FileOptions, ZipWriter};

    fn zipped(member: &str, bytes: &[u8]) -> Cursor<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(member, FileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    fn hgt_bytes(samples: &[u16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_be_bytes()).collect()
    }

    #[test]
    fn test_cell_names() {
        let mt_washington = CellId::from_coord(Coord {
            y: 44.2705,
            x: -71.30325,
        });
        assert_eq!(mt_washington.name(), "N44W072");
        assert_eq!(
            mt_washington.archive_name("SRTMGL1.hgt"),
            "N44W072.SRTMGL1.hgt.zip"
        );
        let south = CellId::from_coord(Coord { y: -0.5, x: -0.5 });
        assert_eq!(south.name(), "S01W001");
        let east = CellId::from_coord(Coord { y: 45.9, x: 6.86 });
        assert_eq!(east.name(), "N45E006");
    }

    #[test]
    fn test_parse_cell_name() {
        let cell: CellId = "N44W072.SRTMGL1.hgt.zip".parse().unwrap();
        assert_eq!(cell, CellId::new(44, -72));
        let cell: CellId = "S01E001.hgt".parse().unwrap();
        assert_eq!(cell, CellId::new(-1, 1));
        assert!(matches!(
            "X44W072".parse::<CellId>(),
            Err(SrtmError::CellName(_))
        ));
        assert!("N44".parse::<CellId>().is_err());
    }

    #[test]
    fn test_non_ascii_cell_name() {
        for name in ["é12E001.hgt", "N4é1E001", "N44W07ü.hgt.zip"] {
            assert!(matches!(name.parse::<CellId>(), Err(SrtmError::CellName(_))));
        }
    }

    #[test]
    fn test_uniform_tile_interpolates_exactly() {
        let cell = CellId::new(48, 2);
        let tile = Tile::from_samples(cell, 5, vec![321; 25]).unwrap();
        for coord in [
            Coord { y: 48.0, x: 2.0 },
            Coord { y: 48.999, x: 2.999 },
            Coord { y: 48.37, x: 2.61 },
        ] {
            assert_relative_eq!(tile.interpolate(coord), 321.0);
        }
    }

    #[test]
    fn test_east_gradient() {
        // Elevation grows 10 m per column, eastward.
        let r = 4;
        let samples = (0..r * r).map(|idx| (idx % r) as u16 * 10).collect();
        let tile = Tile::from_samples(CellId::new(10, 20), r, samples).unwrap();
        // x = 0.55 * 4 = 2.2, between columns 2 and 3.
        assert_relative_eq!(tile.interpolate(Coord { y: 10.5, x: 20.55 }), 22.0);
        // Eastern edge clamps to the last column.
        assert_relative_eq!(tile.interpolate(Coord { y: 10.5, x: 20.99 }), 30.0);
    }

    #[test]
    fn test_north_row_first() {
        // Row 0 is the northern edge.
        let r = 3;
        let samples = (0..r * r).map(|idx| if idx < r { 900 } else { 100 }).collect();
        let tile = Tile::from_samples(CellId::new(0, 0), r, samples).unwrap();
        let north: C = tile.interpolate(Coord { y: 0.99, x: 0.5 });
        let south: C = tile.interpolate(Coord { y: 0.0, x: 0.5 });
        assert_relative_eq!(north, 900.0);
        assert_relative_eq!(south, 100.0);
    }

    #[test]
    fn test_from_archive() {
        let cell = CellId::new(44, -72);
        let samples: Vec<u16> = (0..16).collect();
        let archive = zipped(&cell.hgt_name(), &hgt_bytes(&samples));
        let tile = Tile::from_archive(cell, 4, archive).unwrap();
        assert_eq!(tile.cell(), cell);
        assert_eq!(tile.resolution(), 4);
        assert!(tile.contains(Coord { y: 44.5, x: -71.5 }));
        assert!(!tile.contains(Coord { y: 45.5, x: -71.5 }));
    }

    #[test]
    fn test_archive_errors() {
        let cell = CellId::new(44, -72);
        let wrong_member = zipped("N00E000.hgt", &hgt_bytes(&[0; 16]));
        assert!(matches!(
            Tile::from_archive(cell, 4, wrong_member),
            Err(SrtmError::MissingMember(name)) if name == "N44W072.hgt"
        ));

        let short = zipped(&cell.hgt_name(), &hgt_bytes(&[0; 15]));
        assert!(matches!(
            Tile::from_archive(cell, 4, short),
            Err(SrtmError::HgtLen(30, _, 32))
        ));

        let garbage = Cursor::new(b"not a zip archive".to_vec());
        assert!(matches!(
            Tile::from_archive(cell, 4, garbage),
            Err(SrtmError::Zip(_))
        ));
    }

    #[test]
    fn test_open_from_disk() {
        let cell = CellId::new(-1, 1);
        let dir = std::env::temp_dir().join(format!("srtm-open-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(cell.archive_name("SRTMGL1.hgt"));
        let archive = zipped(&cell.hgt_name(), &hgt_bytes(&[7; 9]));
        std::fs::write(&path, archive.into_inner()).unwrap();
        let tile = Tile::open(&path, 3).unwrap();
        assert_eq!(tile.cell(), cell);
        assert_relative_eq!(tile.interpolate(Coord { y: -0.5, x: 1.5 }), 7.0);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
