//! MTZ file writer.
//!
//! The preamble is written first with a placeholder header pointer, then
//! the reflection rows, then the header records. The pointer is patched
//! once the number of reflections is known.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use mtzkit_core::Context;
use mtzkit_mtz::{external_label, ColumnRef, MissingValue, Mtz, BASE_NAME};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::header::{format_g, pad_record, RECORD_LEN};
use crate::provenance::column_source_stamp;
use crate::reader::{MTZ_MAJOR_VERSION, MTZ_MINOR_VERSION, REFLECTION_OFFSET};
use crate::stamp::{MachineStamp, STAMP_OFFSET};

/// Header pointer of a file with no reflections, in 4-byte words.
const PREAMBLE_WORDS: usize = REFLECTION_OFFSET / 4 + 1;

/// Writes a model whose reflections are held in memory.
///
/// Columns created in memory are stamped with their provenance, and
/// crystal and output resolution limits are recomputed before the
/// header is written.
///
/// # Errors
///
/// Returns [`Error::ReflectionsNotInMemory`] for a streaming model, or an
/// I/O error.
pub fn write_mtz<P: AsRef<Path>>(ctx: &Context, mtz: &mut Mtz, path: P) -> Result<()> {
    if !mtz.refs_in_memory() {
        return Err(Error::ReflectionsNotInMemory);
    }
    mtz.stamp_column_sources(&column_source_stamp());
    let mut out = BufWriter::new(File::create(&path)?);
    write_preamble(&mut out)?;
    write_reflection_block(mtz, &mut out)?;
    write_header(ctx, mtz, &mut out)?;
    patch_header_pointer(mtz, &mut out)?;
    debug!(
        "wrote {}: {} columns, {} reflections",
        path.as_ref().display(),
        mtz.num_active_columns(),
        mtz.nref
    );
    Ok(())
}

/// Writer for files whose reflections are produced one at a time.
///
/// Creating the writer switches the model to streaming mode; each row
/// passed to [`MtzWriter::write_reflection`] goes straight to disk.
pub struct MtzWriter<'a> {
    ctx: &'a Context,
    mtz: &'a mut Mtz,
    out: BufWriter<File>,
}

impl<'a> MtzWriter<'a> {
    /// Creates the file and writes its preamble.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(ctx: &'a Context, path: P, mtz: &'a mut Mtz) -> Result<Self> {
        mtz.set_reflections_in_memory(false);
        let mut out = BufWriter::new(File::create(path)?);
        write_preamble(&mut out)?;
        Ok(Self { ctx, mtz, out })
    }

    /// The model being written.
    #[must_use]
    pub fn mtz(&self) -> &Mtz {
        &*self.mtz
    }

    /// Appends reflection `iref` with values in `lookup` order.
    ///
    /// # Errors
    ///
    /// Propagates model errors and I/O errors.
    pub fn write_reflection(&mut self, iref: usize, values: &[f32], lookup: &[Option<ColumnRef>]) -> Result<()> {
        if let Some(row) = self.mtz.write_reflection(iref, values, lookup)? {
            for v in row {
                self.out.write_all(&v.to_ne_bytes())?;
            }
        }
        Ok(())
    }

    /// Writes the header and patches the header pointer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn finish(mut self) -> Result<()> {
        self.mtz.stamp_column_sources(&column_source_stamp());
        write_header(self.ctx, self.mtz, &mut self.out)?;
        patch_header_pointer(self.mtz, &mut self.out)?;
        Ok(())
    }
}

fn write_preamble<W: Write>(out: &mut W) -> Result<()> {
    let mut preamble = [0u8; REFLECTION_OFFSET];
    preamble[..4].copy_from_slice(b"MTZ ");
    let words = i32::try_from(PREAMBLE_WORDS).unwrap_or(i32::MAX);
    preamble[4..8].copy_from_slice(&words.to_ne_bytes());
    preamble[STAMP_OFFSET..STAMP_OFFSET + 4].copy_from_slice(&MachineStamp::native().to_bytes());
    out.write_all(&preamble)?;
    Ok(())
}

fn active_columns(mtz: &Mtz) -> Vec<ColumnRef> {
    mtz.column_refs()
        .filter(|&c| mtz.column(c).is_some_and(|col| col.active))
        .collect()
}

/// Encodes the active columns row by row.
fn write_reflection_block<W: Write>(mtz: &Mtz, out: &mut W) -> Result<()> {
    let fill = mtz.missing.fill();
    let columns: Vec<&[f32]> = active_columns(mtz)
        .into_iter()
        .filter_map(|c| mtz.column(c))
        .map(|col| col.values.as_slice())
        .collect();
    let width = columns.len() * 4;
    if width == 0 || mtz.nref == 0 {
        return Ok(());
    }
    let mut block = vec![0u8; width * mtz.nref];
    block.par_chunks_mut(width).enumerate().for_each(|(i, row)| {
        for (word, values) in row.chunks_exact_mut(4).zip(&columns) {
            let v = values.get(i).copied().unwrap_or(fill);
            word.copy_from_slice(&v.to_ne_bytes());
        }
    });
    out.write_all(&block)?;
    Ok(())
}

fn patch_header_pointer<W: Write + Seek>(mtz: &Mtz, out: &mut W) -> Result<()> {
    let words = mtz
        .nref
        .checked_mul(mtz.num_active_columns())
        .and_then(|n| n.checked_add(PREAMBLE_WORDS))
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "too many reflections for the header pointer",
            ))
        })?;
    out.seek(SeekFrom::Start(4))?;
    out.write_all(&words.to_ne_bytes())?;
    out.seek(SeekFrom::End(0))?;
    out.flush()?;
    Ok(())
}

struct Records<'w, W: Write> {
    out: &'w mut W,
}

impl<W: Write> Records<'_, W> {
    fn put(&mut self, text: &str, nitems: usize) -> Result<()> {
        self.out.write_all(&pad_record(text, nitems))?;
        Ok(())
    }
}

fn cell_record(cell: &[f32; 6]) -> String {
    let mut rec = String::from("CELL ");
    for v in cell {
        rec.push_str(&format!(" {:9.4}", f64::from(*v)));
    }
    rec
}

/// Global cell: the first crystal other than the base one that has
/// active datasets and a cell. Its cell is copied to the base crystal.
fn global_cell(mtz: &mut Mtz) -> Option<[f32; 6]> {
    let base = mtz.crystal_lookup(BASE_NAME);
    let found = (0..mtz.num_crystals()).find_map(|i| {
        let xtal = mtz.crystal(i)?;
        (xtal.name != BASE_NAME && mtz.num_active_datasets_in_crystal(i) > 0 && xtal.cell[0] > 0.001)
            .then_some(xtal.cell)
    });
    match (found, base) {
        (Some(cell), Some(b)) => {
            if let Some(xtal) = mtz.crystal_mut(b) {
                xtal.cell = cell;
            }
            Some(cell)
        }
        (Some(cell), None) => Some(cell),
        (None, Some(b)) => mtz.crystal(b).map(|x| x.cell),
        (None, None) => None,
    }
}

fn syminf_record(mtz: &Mtz) -> String {
    let sym = &mtz.symmetry;
    let name = format!("'{}'", sym.name.trim_end_matches(' '));
    format!(
        "SYMINF {:3} {:2} {} {:5} {:>22} {:>5} {}",
        sym.operators.len(),
        sym.nsymp,
        sym.lattice_type,
        sym.spacegroup_number,
        name,
        sym.point_group,
        sym.confidence.as_char()
    )
}

fn column_records(ctx: &Context, mtz: &mut Mtz) -> Vec<(String, usize)> {
    let mut records = Vec::new();
    let sets: Vec<_> = mtz.dataset_refs().collect();
    for set in sets {
        let Some(dataset) = mtz.dataset(set) else { continue };
        let set_id = dataset.id;
        let cols = dataset.columns().to_vec();
        for c in cols {
            let Some(col) = mtz.column_mut(c) else { continue };
            if !col.active {
                continue;
            }
            if col.col_type.is_empty() {
                ctx.warn(
                    "write_mtz",
                    &format!("column type for {} is not set, assuming type R", col.label),
                );
                col.col_type = "R".into();
            }
            if col.min == f32::MAX {
                col.min = 0.0;
            }
            if col.max == -f32::MAX {
                col.max = 0.0;
            }
            let label = external_label(&col.label, &col.col_type);
            records.push((
                format!(
                    "COLUMN {label:<30} {} {:>17} {:>17} {set_id:4}",
                    col.type_char(),
                    format_g(f64::from(col.min), 9),
                    format_g(f64::from(col.max), 9),
                ),
                RECORD_LEN,
            ));
            if !col.colsource.is_empty() {
                records.push((
                    format!("COLSRC {label:<30} {:<36}  {set_id:4}", col.colsource),
                    RECORD_LEN,
                ));
            }
            if !col.group_name.is_empty() && !col.group_type.is_empty() && col.group_position >= 0 {
                records.push((
                    format!(
                        "COLGRP {label:<30} {:<30} {:<4} {:X} {set_id:4}",
                        col.group_name, col.group_type, col.group_position
                    ),
                    RECORD_LEN,
                ));
            }
        }
    }
    records
}

/// Writes every header record after the reflection rows.
fn write_header<W: Write>(ctx: &Context, mtz: &mut Mtz, out: &mut W) -> Result<()> {
    let mut rec = Records { out };

    rec.put(&format!("VERS MTZ:V{MTZ_MAJOR_VERSION}.{MTZ_MINOR_VERSION}"), 13)?;
    rec.put(&format!("TITLE {}", mtz.title), 76)?;
    rec.put(
        &format!(
            "NCOL {:8} {:12} {:8}",
            mtz.num_active_columns(),
            mtz.nref,
            mtz.num_output_batches()
        ),
        35,
    )?;
    if let Some(cell) = global_cell(mtz) {
        rec.put(&cell_record(&cell), 65)?;
    }
    let sort = mtz.sort_order_indices();
    rec.put(
        &format!(
            "SORT  {:3} {:3} {:3} {:3} {:3}",
            sort[0], sort[1], sort[2], sort[3], sort[4]
        ),
        25,
    )?;
    rec.put(&syminf_record(mtz), 52)?;
    for op in &mtz.symmetry.operators {
        let text: String = op.to_symop_string().chars().take(74).collect();
        rec.put(&format!("SYMM {text:>74}"), 79)?;
    }

    if mtz.refs_in_memory() {
        mtz.recalculate_resolution_limits();
    }
    rec.put(
        &format!(
            "RESO {:<20.16} {:<20.16}",
            f64::from(mtz.resmin_out),
            f64::from(mtz.resmax_out)
        ),
        46,
    )?;
    match mtz.missing {
        MissingValue::NaN => rec.put("VALM NAN", 8)?,
        MissingValue::Value(v) => rec.put(&format!("VALM {:<20.6}", f64::from(v)), 25)?,
    }

    for (text, nitems) in column_records(ctx, mtz) {
        rec.put(&text, nitems)?;
    }

    rec.put(&format!("NDIF {:8}", mtz.num_active_datasets()), 13)?;
    let sets: Vec<_> = mtz.dataset_refs().filter(|&s| mtz.is_dataset_active(s)).collect();
    for set in sets {
        let (Some(xtal), Some(dataset)) = (mtz.crystal(set.crystal), mtz.dataset(set)) else {
            continue;
        };
        let id = dataset.id;
        rec.put(&format!("PROJECT {id:7} {:<64}", xtal.project), RECORD_LEN)?;
        rec.put(&format!("CRYSTAL {id:7} {:<64}", xtal.name), RECORD_LEN)?;
        rec.put(&format!("DATASET {id:7} {:<64}", dataset.name), RECORD_LEN)?;
        let mut dcell = format!("DCELL   {id:7} ");
        for v in &xtal.cell {
            dcell.push_str(&format!("{:10.4}", f64::from(*v)));
        }
        rec.put(&dcell, 76)?;
        rec.put(&format!("DWAVEL  {id:7} {:10.5}", f64::from(dataset.wavelength)), 26)?;
    }

    if mtz.num_batches() > 0 {
        mtz.sort_new_batches(ctx);
        for chunk in mtz.batch_numbers().chunks(12) {
            let mut line = String::from("BATCH ");
            for num in chunk {
                line.push_str(&format!("{num:6}"));
            }
            rec.put(&line, 6 + 6 * chunk.len())?;
        }
    }

    for unknown in &mtz.unknown_headers {
        rec.put(unknown, RECORD_LEN)?;
    }
    rec.put("END ", 4)?;

    if !mtz.history.is_empty() {
        rec.put(&format!("MTZHIST {:3}", mtz.history.len()), 11)?;
        for line in &mtz.history {
            rec.put(line, RECORD_LEN)?;
        }
    }

    if mtz.num_output_batches() > 0 {
        rec.put("MTZBATS", 7)?;
        for batch in mtz.output_batches() {
            rec.put(
                &format!("BH {:8}{:8}{:8}{:8}", batch.num, 185, 29, 156),
                35,
            )?;
            rec.put(&format!("TITLE {}", batch.title), 76)?;
            for word in batch.to_words() {
                rec.out.write_all(&word.to_ne_bytes())?;
            }
            if batch.gonlab[0].is_empty() {
                rec.put("BHCH", 29)?;
            } else {
                rec.put(
                    &format!(
                        "BHCH {:>8}{:>8}{:>8}",
                        batch.gonlab[0], batch.gonlab[1], batch.gonlab[2]
                    ),
                    29,
                )?;
            }
        }
    }

    rec.put("MTZENDOFHEADERS ", 16)?;
    if let Some(xml) = &mtz.xml {
        rec.out.write_all(xml.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::record_text;
    use mtzkit_mtz::DatasetRef;
    use tempfile::NamedTempFile;

    fn records(data: &[u8], start: usize) -> Vec<String> {
        data[start..]
            .chunks(RECORD_LEN)
            .map(|r| record_text(r).trim_end().to_string())
            .collect()
    }

    #[test]
    fn test_header_layout() {
        let ctx = Context::new("writer").with_verbosity(0);
        let mut mtz = Mtz::new();
        let base = DatasetRef::new(0, 0);
        let lookup: Vec<_> = ["H", "K", "L"]
            .iter()
            .map(|l| Some(mtz.add_column(base, l, "H").unwrap()))
            .collect();
        mtz.write_reflection(1, &[1.0, 2.0, 3.0], &lookup).unwrap();

        let file = NamedTempFile::new().unwrap();
        write_mtz(&ctx, &mut mtz, file.path()).unwrap();
        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(&data[..4], b"MTZ ");
        let hdrst = i32::from_ne_bytes(data[4..8].try_into().unwrap());
        assert_eq!(hdrst, 24);
        assert_eq!(f32::from_ne_bytes(data[84..88].try_into().unwrap()), 2.0);

        let recs = records(&data, 92);
        assert_eq!(recs[0], "VERS MTZ:V1.1");
        assert_eq!(recs[1], "TITLE");
        assert_eq!(recs[2], "NCOL        3            1        0");
        assert!(recs[3].starts_with("CELL "));
        assert_eq!(recs[4], "SORT    0   0   0   0   0");
        // unset lattice letter ends the record
        assert_eq!(recs[5], "SYMINF   0  0");
        assert_eq!(recs[7], "VALM NAN");
        assert!(recs[8].starts_with("COLUMN H                              H"));
        assert!(recs[8].ends_with("1                 1    0"));
        assert!(recs[9].starts_with("COLSRC H "));
        assert!(recs.iter().any(|r| r == "NDIF        1"));
        assert!(recs.iter().any(|r| r == "END"));
        assert_eq!(recs.last().map(String::as_str), Some("MTZENDOFHEADERS"));
    }

    #[test]
    fn test_streaming_mode_refused() {
        let ctx = Context::new("writer").with_verbosity(0);
        let mut mtz = Mtz::new();
        mtz.set_reflections_in_memory(false);
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            write_mtz(&ctx, &mut mtz, file.path()),
            Err(Error::ReflectionsNotInMemory)
        ));
    }
}
