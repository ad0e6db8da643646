//! Raw frame dumps: planes written back to back with no header.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::GrayImage;
use memmap2::Mmap;
use tracing::info;

use crate::error::{Result, TyError};
use crate::frame::DepthView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneSpec {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: usize,
}

impl PlaneSpec {
    pub const fn new(name: &'static str, width: u32, height: u32, bytes_per_pixel: usize) -> Self {
        Self {
            name,
            width,
            height,
            bytes_per_pixel,
        }
    }

    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered planes of a dump file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpLayout {
    planes: Vec<PlaneSpec>,
}

impl DumpLayout {
    pub fn new(planes: Vec<PlaneSpec>) -> Self {
        Self { planes }
    }

    /// What the capture tool saves: 640x480 depth, then 640x480 BGR color.
    pub fn capture() -> Self {
        Self::new(vec![
            PlaneSpec::new("depth", 640, 480, 2),
            PlaneSpec::new("color", 640, 480, 3),
        ])
    }

    /// What the offline point-cloud tool reads: 640x480 depth, then the
    /// left and right 1280x960 IR images.
    pub fn stereo() -> Self {
        Self::new(vec![
            PlaneSpec::new("depth", 640, 480, 2),
            PlaneSpec::new("ir-left", 1280, 960, 1),
            PlaneSpec::new("ir-right", 1280, 960, 1),
        ])
    }

    pub fn planes(&self) -> &[PlaneSpec] {
        &self.planes
    }

    pub fn total_len(&self) -> usize {
        self.planes.iter().map(PlaneSpec::len).sum()
    }

    fn locate(&self, name: &str) -> Option<(usize, &PlaneSpec)> {
        let mut offset = 0;
        for plane in &self.planes {
            if plane.name == name {
                return Some((offset, plane));
            }
            offset += plane.len();
        }
        None
    }
}

/// Write `planes` back to back.
pub fn save_dump(path: impl AsRef<Path>, planes: &[&[u8]]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for plane in planes {
        out.write_all(plane)?;
    }
    out.flush()?;
    Ok(())
}

/// Memory-mapped dump file.
pub struct Dump {
    map: Mmap,
    layout: DumpLayout,
}

/// Map `path` and check it holds every plane of `layout`. Extra trailing
/// bytes are ignored.
pub fn load_dump(path: impl AsRef<Path>, layout: DumpLayout) -> Result<Dump> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let actual = file.metadata()?.len() as usize;
    let needed = layout.total_len();
    if actual < needed {
        return Err(TyError::InvalidFrame(format!(
            "{} holds {} bytes but the layout needs {}",
            path.display(),
            actual,
            needed
        )));
    }
    // SAFETY: the file is only read, and dumps are not modified while loaded.
    let map = unsafe { Mmap::map(&file)? };
    Ok(Dump { map, layout })
}

impl Dump {
    pub fn layout(&self) -> &DumpLayout {
        &self.layout
    }

    pub fn plane(&self, name: &str) -> Option<&[u8]> {
        let (offset, spec) = self.layout.locate(name)?;
        self.map.get(offset..offset + spec.len())
    }

    pub fn depth(&self) -> Result<DepthView<'_>> {
        let (_, spec) = self
            .layout
            .locate("depth")
            .ok_or_else(|| TyError::InvalidFrame("layout has no depth plane".into()))?;
        let data = self.plane("depth").unwrap_or_default();
        DepthView::from_bytes(spec.width, spec.height, data)
    }

    pub fn gray(&self, name: &str) -> Result<GrayImage> {
        let missing = || TyError::InvalidFrame(format!("layout has no {} plane", name));
        let (_, spec) = self.layout.locate(name).ok_or_else(missing)?;
        let data = self.plane(name).ok_or_else(missing)?;
        GrayImage::from_raw(spec.width, spec.height, data.to_vec()).ok_or_else(missing)
    }
}

/// `<base><suffix>`, e.g. `scan.img` + `-irl.jpg` gives `scan.img-irl.jpg`.
pub fn sidecar(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write both IR planes of a stereo dump as `<base>-irl.jpg` and `<base>-irr.jpg`.
pub fn export_ir_jpegs(dump: &Dump, base: &Path) -> Result<(PathBuf, PathBuf)> {
    let left = sidecar(base, "-irl.jpg");
    let right = sidecar(base, "-irr.jpg");
    dump.gray("ir-left")?.save(&left)?;
    dump.gray("ir-right")?.save(&right)?;
    Ok((left, right))
}

/// Numbered dumps `0.img`, `1.img`, ... in one directory.
#[derive(Debug)]
pub struct DumpWriter {
    dir: PathBuf,
    next: usize,
}

impl DumpWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, next: 0 })
    }

    pub fn next_index(&self) -> usize {
        self.next
    }

    pub fn write(&mut self, planes: &[&[u8]]) -> Result<PathBuf> {
        info!(">>>> save frame {}", self.next);
        let path = self.dir.join(format!("{}.img", self.next));
        save_dump(&path, planes)?;
        self.next += 1;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.img");
        save_dump(&path, &[&[0u8; 10][..]]).unwrap();
        assert!(matches!(
            load_dump(&path, DumpLayout::capture()),
            Err(TyError::InvalidFrame(_))
        ));
    }

    #[test]
    fn planes_are_found_at_their_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.img");
        let layout = DumpLayout::new(vec![
            PlaneSpec::new("depth", 2, 1, 2),
            PlaneSpec::new("ir-left", 2, 1, 1),
        ]);
        let depth: Vec<u8> = [500u16, 0].iter().flat_map(|d| d.to_ne_bytes()).collect();
        save_dump(&path, &[depth.as_slice(), &[7u8, 9][..]]).unwrap();

        let dump = load_dump(&path, layout).unwrap();
        assert_eq!(dump.depth().unwrap().at(0, 0), 500);
        assert_eq!(dump.plane("ir-left"), Some(&[7u8, 9][..]));
        assert_eq!(dump.gray("ir-left").unwrap().get_pixel(1, 0).0, [9]);
        assert!(dump.plane("color").is_none());
    }

    #[test]
    fn writer_numbers_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DumpWriter::new(dir.path().join("dumps")).unwrap();
        let first = writer.write(&[&[1u8, 2][..]]).unwrap();
        let second = writer.write(&[&[3u8][..]]).unwrap();
        assert!(first.ends_with("0.img"));
        assert!(second.ends_with("1.img"));
        assert_eq!(fs::read(second).unwrap(), vec![3]);
    }

    #[test]
    fn sidecar_appends_to_the_full_name() {
        assert_eq!(
            sidecar(Path::new("/tmp/scan.img"), "-p3d.txt"),
            PathBuf::from("/tmp/scan.img-p3d.txt")
        );
    }

    #[test]
    fn layouts_have_the_expected_sizes() {
        assert_eq!(DumpLayout::capture().total_len(), 640 * 480 * 5);
        assert_eq!(DumpLayout::stereo().total_len(), 640 * 480 * 2 + 1280 * 960 * 2);
    }
}
