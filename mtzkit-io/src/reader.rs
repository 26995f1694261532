//! Memory-mapped MTZ reader.
//!
//! The header is located through the pointer at byte 4 and scanned five
//! times: the first pass sizes the crystal and dataset hierarchy, the
//! second fills in crystals and datasets, the third creates columns and
//! reads the global records, the fourth attaches column sources and
//! groups, and the fifth keeps records with unknown keywords. History,
//! batch headers and trailing XML follow the `END` record.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::debug;
use memmap2::Mmap;
use mtzkit_core::{Context, HklCoefficients, Symop, UnitCell};
use mtzkit_mtz::{
    Batch, ColumnRef, DatasetRef, MissingValue, Mtz, Reflection, SpacegroupConfidence, BASE_NAME,
    MAX_CRYSTALS, MAX_DATASETS,
};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::header::{atoi, clip, HeaderRecord, RecordCursor, RECORD_LEN};
use crate::stamp::{word_at, MachineStamp, STAMP_OFFSET};

/// Byte offset of the first reflection.
pub const REFLECTION_OFFSET: usize = 80;

/// Format version written and accepted.
pub const MTZ_MAJOR_VERSION: i32 = 1;
pub const MTZ_MINOR_VERSION: i32 = 1;

/// Default tolerance for telling crystals apart by their cells.
pub const DEFAULT_CELL_TOLERANCE: f64 = 0.002;

/// Environment variable overriding the default cell tolerance.
pub const CELL_TOLERANCE_VAR: &str = "MTZ_CELL_TOLERANCE";

const NAME_LEN: usize = 64;
const SPGNAME_LEN: usize = 20;
const PGNAME_LEN: usize = 10;
const COLSOURCE_LEN: usize = 36;
const GROUP_NAME_LEN: usize = 30;
const GROUP_TYPE_LEN: usize = 4;

const KNOWN_HEADERS: [&str; 23] = [
    "PROJ", "DATA", "DCEL", "DRES", "DWAV", "VERS", "TITL", "CELL", "SORT", "SYMI", "SYMM", "COLU",
    "VALM", "RESO", "COLS", "COLG", "NCOL", "NDIF", "CRYS", "MTZH", "MTZB", "BH", "BATC",
];

/// A memory-mapped MTZ file.
pub struct MappedFile {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFile {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapError(e.to_string()))?;
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Options for opening a file.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    /// Read every reflection into the column arrays.
    pub load_reflections: bool,
    /// Cell tolerance for inferring crystals in files without `CRYSTAL`
    /// records.
    pub cell_tolerance: Option<f64>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            load_reflections: true,
            cell_tolerance: None,
        }
    }
}

impl ReadOptions {
    #[must_use]
    pub fn with_load_reflections(mut self, load: bool) -> Self {
        self.load_reflections = load;
        self
    }

    #[must_use]
    pub fn with_cell_tolerance(mut self, tolerance: f64) -> Self {
        self.cell_tolerance = Some(tolerance);
        self
    }

    /// The explicit tolerance, else `MTZ_CELL_TOLERANCE`, else 0.002.
    #[must_use]
    pub fn effective_cell_tolerance(&self) -> f64 {
        self.cell_tolerance
            .or_else(|| {
                std::env::var(CELL_TOLERANCE_VAR)
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
            })
            .unwrap_or(DEFAULT_CELL_TOLERANCE)
    }
}

/// Reads an MTZ file.
///
/// # Errors
///
/// Returns an error if the file cannot be mapped or its header is
/// malformed. No partial model is returned.
pub fn read_mtz<P: AsRef<Path>>(ctx: &Context, path: P, options: &ReadOptions) -> Result<Mtz> {
    let file = MappedFile::open(&path)?;
    let (mtz, _) = parse_mtz(ctx, file.as_bytes(), options)?;
    debug!(
        "read {}: {} columns, {} reflections, {} batches",
        file.path().display(),
        mtz.ncol_read,
        mtz.nref,
        mtz.num_batches()
    );
    Ok(mtz)
}

/// Streaming access to the reflections of a file whose header has been
/// read. Reflections are decoded from the mapping on demand.
pub struct MtzReader {
    file: MappedFile,
    mtz: Mtz,
    stamp: MachineStamp,
    next: usize,
}

impl MtzReader {
    /// Opens a file for streaming with default options.
    ///
    /// # Errors
    ///
    /// See [`read_mtz`].
    pub fn open<P: AsRef<Path>>(ctx: &Context, path: P) -> Result<Self> {
        Self::open_with(ctx, path, &ReadOptions::default())
    }

    /// Opens a file for streaming. `load_reflections` is ignored.
    ///
    /// # Errors
    ///
    /// See [`read_mtz`].
    pub fn open_with<P: AsRef<Path>>(ctx: &Context, path: P, options: &ReadOptions) -> Result<Self> {
        let file = MappedFile::open(&path)?;
        let options = options.clone().with_load_reflections(false);
        let (mtz, stamp) = parse_mtz(ctx, file.as_bytes(), &options)?;
        Ok(Self {
            file,
            mtz,
            stamp,
            next: 1,
        })
    }

    /// Header model of the file.
    #[must_use]
    pub fn mtz(&self) -> &Mtz {
        &self.mtz
    }

    #[must_use]
    pub fn into_mtz(self) -> Mtz {
        self.mtz
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Raw values of reflection `iref` (1-based) in file column order.
    #[must_use]
    pub fn row(&self, iref: usize) -> Option<Vec<f32>> {
        if iref == 0 || iref > self.mtz.nref_filein {
            return None;
        }
        let width = self.mtz.ncol_read * 4;
        let start = REFLECTION_OFFSET + (iref - 1) * width;
        let bytes = self.file.as_bytes().get(start..start + width)?;
        Some(bytes.chunks_exact(4).map(|w| decode_f32(self.stamp, w)).collect())
    }

    /// Next reflection in file order, or `None` past the last one.
    pub fn next_reflection(&mut self) -> Option<Reflection> {
        let row = self.row(self.next)?;
        self.next += 1;
        Some(self.mtz.reflection_from_row(&row))
    }

    /// Returns to the first reflection.
    pub fn rewind(&mut self) {
        self.next = 1;
    }

    /// Reads reflection `iref` and continues from the one after it.
    pub fn read_reflection(&mut self, iref: usize) -> Option<Reflection> {
        let row = self.row(iref)?;
        self.next = iref + 1;
        Some(self.mtz.reflection_from_row(&row))
    }

    /// Reads reflection `iref` with values in `lookup` order.
    pub fn read_reflection_lookup(&mut self, lookup: &[Option<ColumnRef>], iref: usize) -> Option<Reflection> {
        let row = self.row(iref)?;
        self.next = iref + 1;
        Some(self.mtz.lookup_from_row(lookup, &row))
    }
}

impl Iterator for MtzReader {
    type Item = Reflection;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_reflection()
    }
}

fn decode_f32(stamp: MachineStamp, word: &[u8]) -> f32 {
    word.try_into().map_or(0.0, |b| stamp.read_f32(b))
}

fn count(rec: &HeaderRecord, i: usize) -> usize {
    usize::try_from(rec.int(i)).unwrap_or(0)
}

#[allow(clippy::cast_possible_truncation)]
fn cell_at(rec: &HeaderRecord, first: usize) -> [f32; 6] {
    std::array::from_fn(|i| rec.number(first + i) as f32)
}

fn next_header_record(cursor: &mut RecordCursor<'_>) -> Result<HeaderRecord> {
    cursor
        .next_record()
        .ok_or_else(|| Error::ReadFail("header ended before its END record".into()))
}

fn too_many(what: &'static str, limit: usize) -> Error {
    Error::Mtz(mtzkit_mtz::Error::CapacityExceeded { what, limit })
}

/// Parses a complete file image.
pub(crate) fn parse_mtz(ctx: &Context, data: &[u8], options: &ReadOptions) -> Result<(Mtz, MachineStamp)> {
    let magic = data
        .get(..4)
        .filter(|m| m[0] != 0)
        .ok_or_else(|| Error::ReadFail("file too short for an MTZ preamble".into()))?;
    let magic = HeaderRecord::parse(magic);
    if !magic.is("MTZ") {
        return Err(Error::NotMtz);
    }

    let stamp_bytes = word_at(data, STAMP_OFFSET)
        .ok_or_else(|| Error::ReadFail("file too short for a machine stamp".into()))?;
    let stamp = MachineStamp::from_bytes(ctx, stamp_bytes)?;
    let hdrst = word_at(data, 4)
        .map(|w| stamp.read_i32(w))
        .ok_or_else(|| Error::ReadFail("file too short for a header pointer".into()))?;
    let header_start = usize::try_from(hdrst.saturating_sub(1))
        .ok()
        .and_then(|w| w.checked_mul(4))
        .filter(|&start| start < data.len())
        .ok_or_else(|| Error::ReadFail(format!("header pointer {hdrst} is outside the file")))?;

    let mut cursor = RecordCursor::new(data, header_start);
    let layout = scan_layout(&mut cursor, options.effective_cell_tolerance())?;
    debug!(
        "header layout: {} crystals, datasets per crystal {:?}",
        layout.crystals.len(),
        layout.nset
    );

    let mut mtz = Mtz::with_layout(&layout.nset)?;
    mtz.set_reflections_in_memory(options.load_reflections);
    mtz.nref_filein = layout.nref;
    mtz.nref = layout.nref;
    mtz.ncol_read = layout.ncol;
    if let Some(base) = mtz.crystal_mut(0) {
        base.project = BASE_NAME.to_string();
        base.name = BASE_NAME.to_string();
        base.id = 0;
        base.cell[0] = 0.0;
    }
    if let Some(set) = mtz.dataset_mut(DatasetRef::new(0, 0)) {
        set.id = 0;
        set.name = BASE_NAME.to_string();
        set.wavelength = 0.0;
    }

    cursor.rewind();
    fill_datasets(&mut cursor, &layout, &mut mtz)?;
    cursor.rewind();
    let (columns, sort) = read_globals(ctx, &mut cursor, &mut mtz)?;
    cursor.rewind();
    attach_column_extras(&mut cursor, &mut mtz)?;
    cursor.rewind();
    collect_unknown_headers(&mut cursor, &mut mtz)?;

    for (slot, &isort) in mtz.sort_order.iter_mut().zip(sort.iter()) {
        if let Some(i) = usize::try_from(isort).ok().filter(|&i| i > 0) {
            *slot = columns.get(i - 1).copied();
        }
    }

    read_history_and_batches(&mut cursor, &mut mtz, layout.nbat, stamp)?;
    mtz.n_orig_bat = mtz.num_batches();

    let xml = cursor.rest();
    if !xml.is_empty() {
        mtz.xml = Some(String::from_utf8_lossy(xml).into_owned());
    }

    if options.load_reflections {
        load_reflections(data, &mut mtz, stamp)?;
        mtz.extend_resolution_limits();
    }
    Ok((mtz, stamp))
}

struct CrystalSeed {
    project: String,
    name: String,
    cell: [f64; 6],
}

/// Hierarchy sizes found by the first pass.
struct Layout {
    ncol: usize,
    nref: usize,
    nbat: usize,
    crystals: Vec<CrystalSeed>,
    nset: Vec<usize>,
    /// Crystal of each `PROJECT` record, with the base dataset first.
    set_crystal: Vec<usize>,
}

impl Layout {
    fn push_crystal(&mut self, project: &str, name: String) -> Result<usize> {
        if self.crystals.len() >= MAX_CRYSTALS {
            return Err(too_many("crystals", MAX_CRYSTALS));
        }
        self.crystals.push(CrystalSeed {
            project: project.to_string(),
            name,
            cell: [0.0; 6],
        });
        self.nset.push(0);
        Ok(self.crystals.len() - 1)
    }

    fn current(&self) -> usize {
        self.set_crystal.last().copied().unwrap_or(0)
    }
}

fn cells_differ(a: &[f64; 6], b: &[f64; 6], tolerance: f64) -> bool {
    UnitCell::new(a[0], a[1], a[2], a[3], a[4], a[5])
        .cells_differ(&UnitCell::new(b[0], b[1], b[2], b[3], b[4], b[5]), tolerance)
}

fn scan_layout(cursor: &mut RecordCursor<'_>, tolerance: f64) -> Result<Layout> {
    let mut layout = Layout {
        ncol: 0,
        nref: 0,
        nbat: 0,
        crystals: vec![CrystalSeed {
            project: BASE_NAME.to_string(),
            name: BASE_NAME.to_string(),
            cell: [0.0; 6],
        }],
        nset: vec![1],
        set_crystal: vec![0],
    };
    let mut project = String::from("dummy");
    let mut crystal = String::from("dummy");
    let mut jxtal: Option<usize> = None;
    let mut new_project = false;

    loop {
        let rec = next_header_record(cursor)?;
        if rec.is("END") {
            break;
        }
        if rec.is("NCOL") {
            layout.ncol = count(&rec, 1);
            layout.nref = count(&rec, 2);
            layout.nbat = count(&rec, 3);
        } else if rec.is("PROJ") {
            if layout.set_crystal.len() >= MAX_DATASETS {
                return Err(too_many("datasets", MAX_DATASETS));
            }
            project = if rec.ntok() > 2 { rec.text_at(2).to_string() } else { "dummy".into() };
            crystal.clone_from(&project);
            jxtal = layout.crystals.iter().rposition(|x| x.project == project);
            new_project = jxtal.is_none();
            let x = match jxtal {
                Some(j) => j,
                None => layout.push_crystal(&project, crystal.clone())?,
            };
            layout.set_crystal.push(x);
        } else if rec.is("CRYS") {
            if rec.ntok() >= 3 {
                crystal = rec.text_at(2).to_string();
                if new_project {
                    if let Some(last) = layout.crystals.last_mut() {
                        last.name.clone_from(&crystal);
                    }
                } else {
                    jxtal = layout.crystals.iter().rposition(|x| x.name == crystal);
                    let x = match jxtal {
                        Some(j) => j,
                        None => layout.push_crystal(&project, crystal.clone())?,
                    };
                    if let Some(slot) = layout.set_crystal.last_mut() {
                        *slot = x;
                    }
                }
            }
        } else if rec.is("DATA") {
            if rec.ntok() <= 2 || rec.text_at(2) != BASE_NAME {
                let x = layout.current();
                layout.nset[x] += 1;
            }
        } else if rec.is("DCEL") {
            let cell: [f64; 6] = std::array::from_fn(|i| rec.number(i + 2));
            let iiset = layout.set_crystal.len() - 1;
            if let Some(j) = jxtal.filter(|&j| j > 0 && iiset > 0) {
                if cells_differ(&layout.crystals[j].cell, &cell, tolerance) {
                    // same crystal name but a different cell: split it off
                    let name = format!("{crystal}{}", layout.crystals.len() + 1);
                    let old = layout.current();
                    let x = layout.push_crystal(&project, name)?;
                    layout.nset[old] = layout.nset[old].saturating_sub(1);
                    layout.set_crystal[iiset] = x;
                    layout.nset[x] += 1;
                }
            }
            let x = layout.current();
            layout.crystals[x].cell = cell;
        }
    }
    Ok(layout)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn fill_datasets(cursor: &mut RecordCursor<'_>, layout: &Layout, mtz: &mut Mtz) -> Result<()> {
    let mut iiset = 0;
    let mut filled: Vec<Option<usize>> = (0..layout.crystals.len()).map(|i| (i == 0).then_some(0)).collect();
    let crystal_of = |iiset: usize| layout.set_crystal.get(iiset).copied().unwrap_or(0);

    loop {
        let rec = next_header_record(cursor)?;
        if rec.starts_with("END") {
            break;
        }
        let x = crystal_of(iiset);
        if rec.starts_with("PROJ") {
            iiset += 1;
            let x = crystal_of(iiset);
            let seed = &layout.crystals[x];
            if let Some(xtal) = mtz.crystal_mut(x) {
                xtal.project = clip(&seed.project, NAME_LEN);
                xtal.name = clip(&seed.name, NAME_LEN);
                xtal.id = x as i32 + 1;
            }
        } else if rec.starts_with("DATA") {
            if rec.ntok() <= 2 || rec.text_at(2) != BASE_NAME {
                let next = filled[x].map_or(0, |i| i + 1);
                filled[x] = Some(next);
                let set = mtz
                    .dataset_mut(DatasetRef::new(x, next))
                    .ok_or_else(|| mtzkit_mtz::Error::NullDataset(format!("dataset {next} of crystal {x}")))?;
                set.id = rec.int(1);
                set.name = if rec.ntok() > 2 {
                    clip(rec.text_at(2), NAME_LEN)
                } else {
                    "dummy".into()
                };
            }
        } else if rec.starts_with("DCEL") {
            if let Some(xtal) = mtz.crystal_mut(x) {
                xtal.cell = cell_at(&rec, 2);
            }
        } else if rec.starts_with("DRES") {
            if let Some(xtal) = mtz.crystal_mut(x) {
                let high = [rec.int(2), rec.int(3), rec.int(4)];
                let low = [rec.int(5), rec.int(6), rec.int(7)];
                if let Ok(coef) = HklCoefficients::from_cell(&xtal.cell) {
                    xtal.resmax = coef.resolution(high);
                    xtal.resmin = coef.resolution(low);
                }
            }
        } else if rec.starts_with("DWAV") {
            if let Some(set) = filled[x].and_then(|d| mtz.dataset_mut(DatasetRef::new(x, d))) {
                set.wavelength = rec.number(2) as f32;
            }
        }
    }
    Ok(())
}

/// Third pass: title, cell, sort order, symmetry, columns, missing value
/// and resolution. Returns the columns in file order and the raw sort
/// order.
#[allow(clippy::cast_possible_truncation)]
fn read_globals(ctx: &Context, cursor: &mut RecordCursor<'_>, mtz: &mut Mtz) -> Result<(Vec<ColumnRef>, [i32; 5])> {
    let mut columns = Vec::new();
    let mut sort = [0; 5];
    let mut warned_set = false;

    loop {
        let rec = next_header_record(cursor)?;
        if rec.starts_with("END") {
            break;
        }
        if rec.starts_with("VERS") {
            let major = atoi(&rec.field(10, RECORD_LEN));
            let minor = atoi(&rec.field(12, RECORD_LEN));
            if major != MTZ_MAJOR_VERSION {
                return Err(Error::BadVersion { major, minor });
            }
            if minor != MTZ_MINOR_VERSION {
                ctx.warn(
                    "read_mtz",
                    &format!("file has MTZ version {major}.{minor}, expected {MTZ_MAJOR_VERSION}.{MTZ_MINOR_VERSION}"),
                );
            }
        } else if rec.starts_with("TITL") {
            mtz.title = rec.field(6, 76).trim_end_matches(' ').to_string();
        } else if rec.starts_with("CELL") {
            let cell = cell_at(&rec, 1);
            for i in 0..mtz.num_crystals() {
                if let Some(xtal) = mtz.crystal_mut(i).filter(|x| x.cell[0] < 0.01) {
                    xtal.cell = cell;
                }
            }
        } else if rec.starts_with("SORT") {
            sort = std::array::from_fn(|i| rec.int(i + 1));
        } else if rec.starts_with("SYMI") {
            if rec.ntok() < 7 {
                return Err(Error::SyminfIncomplete);
            }
            let sym = &mut mtz.symmetry;
            sym.nsymp = count(&rec, 2);
            sym.lattice_type = rec.text_at(3).chars().next().unwrap_or('\0');
            sym.spacegroup_number = rec.int(4);
            sym.name = clip(rec.text_at(5), SPGNAME_LEN);
            sym.point_group = clip(rec.text_at(6), PGNAME_LEN);
            sym.confidence = if rec.ntok() > 7 {
                SpacegroupConfidence::from_char(rec.text_at(7).chars().next().unwrap_or('X'))
            } else {
                SpacegroupConfidence::Unknown
            };
        } else if rec.starts_with("SYMM") {
            let op = Symop::parse(&rec.field(4, RECORD_LEN))?;
            mtz.symmetry.operators.push(op);
        } else if rec.starts_with("COLU") {
            if rec.ntok() < 5 {
                return Err(Error::ColumnIncomplete);
            }
            let set_id = if rec.ntok() < 6 {
                if !warned_set {
                    ctx.warn("read_mtz", "dataset id missing from COLUMN records, using the base dataset");
                    warned_set = true;
                }
                0
            } else {
                rec.int(5)
            };
            // the last dataset with a matching id wins
            let set = mtz
                .dataset_refs()
                .filter(|&s| mtz.dataset(s).is_some_and(|d| d.id == set_id))
                .last()
                .unwrap_or(DatasetRef::new(0, 0));
            let col = mtz.add_column(set, rec.text_at(1), rec.text_at(2))?;
            if let Some(c) = mtz.column_mut(col) {
                c.source = columns.len() + 1;
                c.min = rec.number(3) as f32;
                c.max = rec.number(4) as f32;
            }
            columns.push(col);
        } else if rec.starts_with("VALM") {
            mtz.missing = if rec.text_at(1).starts_with("NAN") {
                MissingValue::NaN
            } else {
                MissingValue::Value(rec.number(1) as f32)
            };
        } else if rec.starts_with("RESO") {
            let minres = rec.number(1) as f32;
            let maxres = rec.number(2) as f32;
            for i in 0..mtz.num_crystals() {
                if let Some(xtal) = mtz.crystal_mut(i) {
                    if xtal.resmax == 0.0 {
                        xtal.resmax = maxres;
                    }
                    if (xtal.resmin - 100.0).abs() < f32::EPSILON {
                        xtal.resmin = minres;
                    }
                }
            }
        }
    }
    Ok((columns, sort))
}

/// Finds a column by stored label among datasets with id `set_id`; the
/// last matching dataset wins.
fn find_column(mtz: &Mtz, label: &str, set_id: i32) -> Option<ColumnRef> {
    mtz.dataset_refs()
        .filter_map(|s| mtz.dataset(s))
        .filter(|d| d.id == set_id)
        .filter_map(|d| {
            d.columns()
                .iter()
                .copied()
                .find(|&c| mtz.column(c).is_some_and(|col| col.label == label))
        })
        .last()
}

fn stored_label(label: &str) -> &str {
    if label.starts_with("M/ISYM") {
        "M_ISYM"
    } else {
        label
    }
}

fn attach_column_extras(cursor: &mut RecordCursor<'_>, mtz: &mut Mtz) -> Result<()> {
    loop {
        let rec = next_header_record(cursor)?;
        if rec.starts_with("END") {
            break;
        }
        if rec.starts_with("COLS") {
            let label = stored_label(rec.text_at(1));
            let col = find_column(mtz, label, rec.int(3))
                .ok_or_else(|| mtzkit_mtz::Error::ColumnSourceTarget(label.to_string()))?;
            if let Some(c) = mtz.column_mut(col) {
                c.colsource = clip(rec.text_at(2), COLSOURCE_LEN);
            }
        } else if rec.starts_with("COLG") {
            let label = stored_label(rec.text_at(1));
            let col = find_column(mtz, label, rec.int(5))
                .ok_or_else(|| mtzkit_mtz::Error::ColumnGroupTarget(label.to_string()))?;
            if let Some(c) = mtz.column_mut(col) {
                c.group_name = clip(rec.text_at(2), GROUP_NAME_LEN);
                c.group_type = clip(rec.text_at(3), GROUP_TYPE_LEN);
                c.group_position = rec.int(4);
            }
        }
    }
    Ok(())
}

fn collect_unknown_headers(cursor: &mut RecordCursor<'_>, mtz: &mut Mtz) -> Result<()> {
    loop {
        let rec = next_header_record(cursor)?;
        if rec.starts_with("END") {
            break;
        }
        if !KNOWN_HEADERS.iter().any(|k| rec.starts_with(k)) {
            mtz.unknown_headers.push(rec.text.trim_end_matches(' ').to_string());
        }
    }
    Ok(())
}

fn read_history_and_batches(
    cursor: &mut RecordCursor<'_>,
    mtz: &mut Mtz,
    nbat: usize,
    stamp: MachineStamp,
) -> Result<()> {
    loop {
        let rec = next_header_record(cursor)?;
        if rec.is("MTZE") {
            break;
        }
        if rec.is("MTZH") {
            for _ in 0..count(&rec, 1) {
                let line = next_header_record(cursor)?;
                mtz.history.push(line.text.trim_end_matches(' ').to_string());
            }
        } else if rec.is("MTZB") {
            for _ in 0..nbat {
                let batch = read_batch(cursor, stamp)?;
                mtz.push_batch(batch);
            }
        }
    }
    Ok(())
}

fn read_batch(cursor: &mut RecordCursor<'_>, stamp: MachineStamp) -> Result<Batch> {
    let bh = next_header_record(cursor)?;
    if !bh.is("BH") {
        return Err(Error::BadBatchHeader(bh.text.trim_end().to_string()));
    }
    let nintegers = count(&bh, 3);
    let nreals = count(&bh, 4);
    let mut batch = Batch::new(bh.int(1));

    let title = next_header_record(cursor)?;
    batch.set_title(title.field(6, 76).trim_end_matches(' '));

    let truncated = || Error::ReadFail(format!("batch {} header is truncated", bh.int(1)));
    let ints: Vec<i32> = cursor
        .read_bytes(nintegers * 4)
        .ok_or_else(truncated)?
        .chunks_exact(4)
        .map(|w| w.try_into().map_or(0, |b| stamp.read_i32(b)))
        .collect();
    let reals: Vec<f32> = cursor
        .read_bytes(nreals * 4)
        .ok_or_else(truncated)?
        .chunks_exact(4)
        .map(|w| decode_f32(stamp, w))
        .collect();
    batch.set_from_arrays(&ints, &reals);

    let bhch = next_header_record(cursor)?;
    match bhch.ntok() {
        4 => batch.set_goniostat_labels([bhch.text_at(1), bhch.text_at(2), bhch.text_at(3)]),
        2 => batch.set_goniostat_labels([bhch.text_at(1), "", ""]),
        _ => batch.set_goniostat_labels(["", "", ""]),
    }
    Ok(batch)
}

/// Decodes the reflection block and scatters it into the columns.
fn load_reflections(data: &[u8], mtz: &mut Mtz, stamp: MachineStamp) -> Result<()> {
    let ncol = mtz.ncol_read;
    let nref = mtz.nref_filein;
    if ncol == 0 || nref == 0 {
        return Ok(());
    }
    let len = nref
        .checked_mul(ncol)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| Error::ReadFail("reflection block size overflows".into()))?;
    let block = data
        .get(REFLECTION_OFFSET..REFLECTION_OFFSET + len)
        .ok_or_else(|| Error::ReadFail(format!("file too short for {nref} reflections of {ncol} columns")))?;

    let values: Vec<f32> = block.par_chunks_exact(4).map(|w| decode_f32(stamp, w)).collect();
    mtz.columns_mut()
        .par_iter_mut()
        .filter(|c| c.source > 0 && c.source <= ncol)
        .for_each(|col| {
            let j = col.source - 1;
            for (v, row) in col.values.as_mut_slice().iter_mut().zip(values.chunks_exact(ncol)) {
                *v = row[j];
            }
        });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::pad_record;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn quiet() -> Context {
        Context::new("reader").with_verbosity(0)
    }

    fn image(records: &[&str], rows: &[[f32; 4]]) -> Vec<u8> {
        let stamp = MachineStamp::native();
        let mut data = Vec::new();
        data.extend_from_slice(b"MTZ ");
        let hdrst = i32::try_from(rows.len() * 4 + 21).unwrap();
        data.extend_from_slice(&hdrst.to_ne_bytes());
        data.extend_from_slice(&stamp.to_bytes());
        data.resize(REFLECTION_OFFSET, 0);
        for row in rows {
            for v in row {
                data.extend_from_slice(&v.to_ne_bytes());
            }
        }
        for r in records {
            data.extend_from_slice(&pad_record(r, RECORD_LEN));
        }
        data
    }

    fn legacy_records() -> Vec<&'static str> {
        vec![
            "VERS MTZ:V1.1",
            "TITLE legacy file",
            "NCOL        4            2        0",
            "CELL     10.0000   20.0000   30.0000   90.0000   90.0000   90.0000",
            "SORT    1   2   3   0   0",
            "SYMINF   1  1 P     1                 'P 1'   PG1",
            "SYMM X,  Y,  Z",
            "RESO 0.0010 0.0400",
            "VALM NAN",
            "COLUMN H                              H 0 2 0",
            "COLUMN K                              H 0 1 0",
            "COLUMN L                              H 0 3 0",
            "COLUMN FP                             F 10 20 1",
            "NDIF        1",
            "PROJECT       1 proj",
            "CRYSTAL       1 xtal",
            "DATASET       1 native",
            "DCELL         1    10.0000   20.0000   30.0000   90.0000   90.0000   90.0000",
            "DWAVEL        1    1.54180",
            "MYKEY some private data",
            "END",
            "MTZENDOFHEADERS",
        ]
    }

    #[test]
    fn test_parse_in_memory() {
        let data = image(&legacy_records(), &[[1.0, 0.0, 3.0, 10.0], [2.0, 1.0, 0.0, 20.0]]);
        let (mtz, _) = parse_mtz(&quiet(), &data, &ReadOptions::default()).unwrap();
        assert_eq!(mtz.title, "legacy file");
        assert_eq!(mtz.num_crystals(), 2);
        assert_eq!(mtz.num_columns(), 4);
        assert_eq!(mtz.nref, 2);
        assert_eq!(mtz.unknown_headers, vec!["MYKEY some private data".to_string()]);
        assert_eq!(mtz.symmetry.name, "P 1");
        assert_eq!(mtz.symmetry.operators.len(), 1);
        assert_eq!(mtz.symmetry.confidence, SpacegroupConfidence::Unknown);

        let fp = mtz.column_lookup("/xtal/native/FP").unwrap();
        assert_eq!(mtz.column(fp).unwrap().values.as_slice(), &[10.0, 20.0]);
        assert_eq!(mtz.sort_order[0], mtz.column_lookup("H"));
        let xtal = &mtz.crystals()[1];
        assert_eq!(xtal.id, 2);
        assert!((xtal.datasets()[0].wavelength - 1.5418).abs() < 1e-5);
        assert!(mtz.xml.is_none());
    }

    #[test]
    fn test_cell_change_splits_crystal() {
        let mut records = legacy_records();
        records.retain(|r| !r.starts_with("CRYSTAL"));
        let extra = [
            "PROJECT       2 proj",
            "DATASET       2 second",
            "DCELL         2    12.0000   20.0000   30.0000   90.0000   90.0000   90.0000",
        ];
        let end = records.iter().position(|r| r.starts_with("MYKEY")).unwrap();
        for (i, r) in extra.into_iter().enumerate() {
            records.insert(end + i, r);
        }
        let data = image(&records, &[]);
        let options = ReadOptions::default().with_load_reflections(false);
        let (mtz, _) = parse_mtz(&quiet(), &data, &options).unwrap();
        assert_eq!(mtz.num_crystals(), 3);
        assert_eq!(mtz.crystals()[2].name, "proj3");
        assert!((mtz.crystals()[2].cell[0] - 12.0).abs() < 1e-5);
    }

    #[test]
    fn test_bad_files() {
        let ctx = quiet();
        let options = ReadOptions::default();
        assert!(matches!(parse_mtz(&ctx, b"MT", &options), Err(Error::ReadFail(_))));
        let mut junk = image(&legacy_records(), &[]);
        junk[..4].copy_from_slice(b"JUNK");
        assert!(matches!(parse_mtz(&ctx, &junk, &options), Err(Error::NotMtz)));

        let mut records = legacy_records();
        records[0] = "VERS MTZ:V2.0";
        let data = image(&records, &[]);
        assert!(matches!(
            parse_mtz(&ctx, &data, &options),
            Err(Error::BadVersion { major: 2, minor: 0 })
        ));

        let mut records = legacy_records();
        records[5] = "SYMINF   1  1 P";
        assert!(matches!(
            parse_mtz(&ctx, &image(&records, &[]), &options),
            Err(Error::SyminfIncomplete)
        ));

        let records: Vec<&str> = legacy_records().into_iter().take(10).collect();
        assert!(matches!(
            parse_mtz(&ctx, &image(&records, &[]), &options),
            Err(Error::ReadFail(_))
        ));
    }

    #[test]
    fn test_dangling_colsrc() {
        let mut records = legacy_records();
        records.insert(13, "COLSRC NOPE                           CREATED_01/01/2024_00:00:00     1");
        let err = parse_mtz(&quiet(), &image(&records, &[]), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Mtz(mtzkit_mtz::Error::ColumnSourceTarget(_))));
    }

    #[test]
    fn test_streaming_reader() {
        let data = image(&legacy_records(), &[[1.0, 0.0, 3.0, 10.0], [2.0, 1.0, 0.0, 20.0]]);
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let mut reader = MtzReader::open(&quiet(), file.path()).unwrap();
        assert!(!reader.mtz().refs_in_memory());
        let first = reader.next_reflection().unwrap();
        assert_eq!(first.values, vec![1.0, 0.0, 3.0, 10.0]);
        assert!(first.resolution > 0.0);
        assert_eq!(reader.by_ref().count(), 1);
        assert!(reader.next_reflection().is_none());

        reader.rewind();
        assert_eq!(reader.next_reflection().unwrap().values[3], 10.0);
        let second = reader.read_reflection(2).unwrap();
        assert_eq!(second.values[3], 20.0);
        assert!(reader.read_reflection(3).is_none());
    }

    #[test]
    fn test_cell_tolerance_option() {
        let options = ReadOptions::default().with_cell_tolerance(0.05);
        assert!((options.effective_cell_tolerance() - 0.05).abs() < f64::EPSILON);
    }
}
