//! Batch headers.
//!
//! Each batch describes one image or sweep segment of the experiment.
//! Batches are kept in an arena linked by next-indices; the list order
//! is the file order and only changes when new batches are sorted before
//! writing.

use mtzkit_core::Context;

use crate::error::{Error, Result};
use crate::model::{truncated, DatasetRef, Mtz};

/// Words in a packed batch header.
pub const NBATCHWORDS: usize = 185;
/// Integer words at the start of a packed batch header.
pub const NBATCHINTEGERS: usize = 29;
/// Real words following the integers.
pub const NBATCHREALS: usize = 156;

const TITLE_LEN: usize = 70;
const GONLAB_LEN: usize = 8;

/// Orientation and experiment description of one batch.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Batch {
    pub num: i32,
    pub title: String,
    /// Goniostat axis names.
    pub gonlab: [String; 3],
    pub iortyp: i32,
    pub lbcell: [i32; 6],
    pub misflg: i32,
    pub jumpax: i32,
    pub ncryst: i32,
    pub lcrflg: i32,
    pub ldtype: i32,
    pub jsaxs: i32,
    pub nbscal: i32,
    pub ngonax: i32,
    pub lbmflg: i32,
    pub ndet: i32,
    /// Id of the dataset the batch belongs to.
    pub nbsetid: i32,
    pub cell: [f32; 6],
    pub umat: [f32; 9],
    pub phixyz: [[f32; 3]; 2],
    pub crydat: [f32; 12],
    pub datum: [f32; 3],
    pub phistt: f32,
    pub phiend: f32,
    pub scanax: [f32; 3],
    pub time1: f32,
    pub time2: f32,
    pub bscale: f32,
    pub bbfac: f32,
    pub sdbscale: f32,
    pub sdbfac: f32,
    pub phirange: f32,
    pub e1: [f32; 3],
    pub e2: [f32; 3],
    pub e3: [f32; 3],
    pub source: [f32; 3],
    pub so: [f32; 3],
    pub alambd: f32,
    pub delamb: f32,
    pub delcor: f32,
    pub divhd: f32,
    pub divvd: f32,
    pub dx: [f32; 2],
    pub theta: [f32; 2],
    pub detlm: [[[f32; 2]; 2]; 2],
}

#[allow(clippy::cast_sign_loss)]
fn int_word(v: i32) -> u32 {
    v as u32
}

#[allow(clippy::cast_possible_wrap)]
fn word_int(w: u32) -> i32 {
    w as i32
}

impl Batch {
    /// Creates an empty batch with the given number.
    #[must_use]
    pub fn new(num: i32) -> Self {
        Self {
            num,
            ..Self::default()
        }
    }

    /// Sets the title, keeping at most 70 characters.
    pub fn set_title(&mut self, title: &str) {
        self.title = truncated(title, TITLE_LEN);
    }

    /// Sets the three goniostat axis names, 8 characters each.
    pub fn set_goniostat_labels(&mut self, labels: [&str; 3]) {
        self.gonlab = labels.map(|l| truncated(l, GONLAB_LEN));
    }

    /// Splits a packed text buffer: title in the first 70 characters,
    /// then three 8-character axis names.
    pub fn set_header_text(&mut self, text: &str) {
        let chars: Vec<char> = text.chars().take(94).collect();
        let field = |from: usize, len: usize| -> String {
            chars
                .iter()
                .skip(from)
                .take(len)
                .collect::<String>()
        };
        self.title = field(0, TITLE_LEN);
        self.gonlab = [
            field(TITLE_LEN, GONLAB_LEN),
            field(TITLE_LEN + GONLAB_LEN, GONLAB_LEN),
            field(TITLE_LEN + 2 * GONLAB_LEN, GONLAB_LEN),
        ];
    }

    /// Fills the orientation fields from integer and real arrays laid out
    /// as in a packed header. Short arrays read as zero.
    pub fn set_from_arrays(&mut self, ints: &[i32], reals: &[f32]) {
        let i = |k: usize| ints.get(k).copied().unwrap_or(0);
        let r = |k: usize| reals.get(k).copied().unwrap_or(0.0);
        let r3 = |k: usize| [r(k), r(k + 1), r(k + 2)];

        self.iortyp = i(3);
        self.lbcell = std::array::from_fn(|n| i(4 + n));
        self.misflg = i(10);
        self.jumpax = i(11);
        self.ncryst = i(12);
        self.lcrflg = i(13);
        self.ldtype = i(14);
        self.jsaxs = i(15);
        self.nbscal = i(16);
        self.ngonax = i(17);
        self.lbmflg = i(18);
        self.ndet = i(19);
        self.nbsetid = i(20);

        self.cell = std::array::from_fn(|n| r(n));
        self.umat = std::array::from_fn(|n| r(6 + n));
        self.phixyz = [r3(15), r3(18)];
        self.crydat = std::array::from_fn(|n| r(21 + n));
        self.datum = r3(33);
        self.phistt = r(36);
        self.phiend = r(37);
        self.scanax = r3(38);
        self.time1 = r(41);
        self.time2 = r(42);
        self.bscale = r(43);
        self.bbfac = r(44);
        self.sdbscale = r(45);
        self.sdbfac = r(46);
        self.phirange = r(47);
        self.e1 = r3(59);
        self.e2 = r3(62);
        self.e3 = r3(65);
        self.source = r3(80);
        self.so = r3(83);
        self.alambd = r(86);
        self.delamb = r(87);
        self.delcor = r(88);
        self.divhd = r(89);
        self.divvd = r(90);
        for d in 0..2 {
            let o = 111 + 6 * d;
            self.dx[d] = r(o);
            self.theta[d] = r(o + 1);
            self.detlm[d] = [[r(o + 2), r(o + 3)], [r(o + 4), r(o + 5)]];
        }
    }

    /// Decodes the orientation fields from a packed header of raw words.
    pub fn set_from_words(&mut self, words: &[u32]) {
        let ints: Vec<i32> = words.iter().take(NBATCHINTEGERS).map(|&w| word_int(w)).collect();
        let reals: Vec<f32> = words
            .iter()
            .skip(NBATCHINTEGERS)
            .take(NBATCHREALS)
            .map(|&w| f32::from_bits(w))
            .collect();
        self.set_from_arrays(&ints, &reals);
    }

    /// Packs the batch into the fixed 185-word header, with the word
    /// counts in the first three integers. Unused words are zero and only
    /// `ndet` detectors are stored.
    #[must_use]
    pub fn to_words(&self) -> [u32; NBATCHWORDS] {
        let mut w = [0u32; NBATCHWORDS];
        w[0] = int_word(185);
        w[1] = int_word(29);
        w[2] = int_word(156);
        w[3] = int_word(self.iortyp);
        for (n, v) in self.lbcell.iter().enumerate() {
            w[4 + n] = int_word(*v);
        }
        let ints = [
            self.misflg,
            self.jumpax,
            self.ncryst,
            self.lcrflg,
            self.ldtype,
            self.jsaxs,
            self.nbscal,
            self.ngonax,
            self.lbmflg,
            self.ndet,
            self.nbsetid,
        ];
        for (n, v) in ints.iter().enumerate() {
            w[10 + n] = int_word(*v);
        }

        let mut put = |k: usize, vals: &[f32]| {
            for (n, v) in vals.iter().enumerate() {
                w[NBATCHINTEGERS + k + n] = v.to_bits();
            }
        };
        put(0, &self.cell);
        put(6, &self.umat);
        put(15, &self.phixyz[0]);
        put(18, &self.phixyz[1]);
        put(21, &self.crydat);
        put(33, &self.datum);
        put(36, &[self.phistt, self.phiend]);
        put(38, &self.scanax);
        put(
            41,
            &[
                self.time1,
                self.time2,
                self.bscale,
                self.bbfac,
                self.sdbscale,
                self.sdbfac,
                self.phirange,
            ],
        );
        put(59, &self.e1);
        put(62, &self.e2);
        put(65, &self.e3);
        put(80, &self.source);
        put(83, &self.so);
        put(86, &[self.alambd, self.delamb, self.delcor, self.divhd, self.divvd]);
        let ndet = usize::try_from(self.ndet).unwrap_or(0).min(2);
        for d in 0..ndet {
            let lm = &self.detlm[d];
            put(
                111 + 6 * d,
                &[self.dx[d], self.theta[d], lm[0][0], lm[0][1], lm[1][0], lm[1][1]],
            );
        }
        w
    }
}

#[derive(Debug, Clone)]
struct BatchNode {
    batch: Batch,
    next: Option<usize>,
}

/// Arena of batches linked in file order.
#[derive(Debug, Clone, Default)]
pub struct BatchList {
    nodes: Vec<BatchNode>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl BatchList {
    /// Number of batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a batch at the end of the list.
    pub fn push(&mut self, batch: Batch) {
        let id = self.nodes.len();
        self.nodes.push(BatchNode { batch, next: None });
        match self.tail {
            Some(t) => self.nodes[t].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    /// Batches in list order.
    pub fn iter(&self) -> BatchIter<'_> {
        BatchIter {
            list: self,
            cur: self.head,
        }
    }

    fn node_ids(&self) -> Vec<usize> {
        let mut ids = Vec::with_capacity(self.nodes.len());
        let mut cur = self.head;
        while let Some(i) = cur {
            ids.push(i);
            cur = self.nodes[i].next;
        }
        ids
    }

    fn node_at(&self, pos: usize) -> Option<usize> {
        self.node_ids().get(pos).copied()
    }

    /// Batch at list position `pos`.
    #[must_use]
    pub fn get(&self, pos: usize) -> Option<&Batch> {
        self.iter().nth(pos)
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut Batch> {
        let id = self.node_at(pos)?;
        Some(&mut self.nodes[id].batch)
    }

    /// Sorts the batches from list position `start` onwards by number.
    /// Returns false without touching the links when they are already in
    /// ascending order.
    pub fn sort_from(&mut self, start: usize) -> bool {
        let ids = self.node_ids();
        if start >= ids.len() {
            return false;
        }
        let mut tail_ids = ids[start..].to_vec();
        if tail_ids
            .windows(2)
            .all(|w| self.nodes[w[0]].batch.num <= self.nodes[w[1]].batch.num)
        {
            return false;
        }
        tail_ids.sort_by_key(|&i| self.nodes[i].batch.num);

        for w in tail_ids.windows(2) {
            self.nodes[w[0]].next = Some(w[1]);
        }
        let first = tail_ids[0];
        let last = tail_ids[tail_ids.len() - 1];
        self.nodes[last].next = None;
        if start == 0 {
            self.head = Some(first);
        } else {
            self.nodes[ids[start - 1]].next = Some(first);
        }
        self.tail = Some(last);
        true
    }
}

/// Iterator over batches in list order.
pub struct BatchIter<'a> {
    list: &'a BatchList,
    cur: Option<usize>,
}

impl<'a> Iterator for BatchIter<'a> {
    type Item = &'a Batch;

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.list.nodes[self.cur?];
        self.cur = node.next;
        Some(&node.batch)
    }
}

impl Mtz {
    /// All batches in list order.
    #[must_use]
    pub fn batches(&self) -> &BatchList {
        &self.batches
    }

    #[must_use]
    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// True when batches were added after the file was read, in which case
    /// only the new ones are written out.
    #[must_use]
    pub fn has_new_batches(&self) -> bool {
        self.batches.len() != self.n_orig_bat
    }

    /// Batches that will be written: the new ones if any were added,
    /// otherwise all of them.
    pub fn output_batches(&self) -> impl Iterator<Item = &Batch> {
        let skip = if self.has_new_batches() { self.n_orig_bat } else { 0 };
        self.batches.iter().skip(skip)
    }

    /// Batch count as written in the `NCOL` header record.
    #[must_use]
    pub fn num_output_batches(&self) -> usize {
        if self.has_new_batches() {
            self.batches.len().saturating_sub(self.n_orig_bat)
        } else {
            self.n_orig_bat
        }
    }

    /// Numbers of the batches that will be written, in order.
    #[must_use]
    pub fn batch_numbers(&self) -> Vec<i32> {
        self.output_batches().map(|b| b.num).collect()
    }

    /// Number of output batches belonging to a dataset.
    #[must_use]
    pub fn num_batches_in_dataset(&self, set: DatasetRef) -> usize {
        let Some(id) = self.dataset(set).map(|s| s.id) else {
            return 0;
        };
        self.output_batches().filter(|b| b.nbsetid == id).count()
    }

    /// Appends a batch read from file, without checking its number.
    pub fn push_batch(&mut self, batch: Batch) {
        self.batches.push(batch);
    }

    /// Appends a new batch. A number already used by a batch added since
    /// the file was read is refused with a warning and returns false.
    pub fn add_batch(&mut self, ctx: &Context, batch: Batch) -> bool {
        if self
            .batches
            .iter()
            .skip(self.n_orig_bat)
            .any(|b| b.num == batch.num)
        {
            ctx.warn(
                "add_batch",
                &format!("attempt to add new batch with existing batch number {}", batch.num),
            );
            return false;
        }
        self.batches.push(batch);
        true
    }

    /// Changes the number of the batch at list position `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateBatch`] if another batch already has the
    /// number and [`Error::ParamError`] for a bad position.
    pub fn renumber_batch(&mut self, pos: usize, num: i32) -> Result<()> {
        if self
            .batches
            .iter()
            .enumerate()
            .any(|(i, b)| i != pos && b.num == num)
        {
            return Err(Error::DuplicateBatch(num));
        }
        let batch = self
            .batches
            .get_mut(pos)
            .ok_or_else(|| Error::ParamError(format!("no batch at position {pos}")))?;
        batch.num = num;
        Ok(())
    }

    /// Replaces the contents of the batch at `pos`, renumbering it if the
    /// number differs.
    ///
    /// # Errors
    ///
    /// As for [`Mtz::renumber_batch`].
    pub fn update_batch(&mut self, pos: usize, batch: Batch) -> Result<()> {
        let current = self
            .batches
            .get(pos)
            .ok_or_else(|| Error::ParamError(format!("no batch at position {pos}")))?
            .num;
        if current != batch.num {
            self.renumber_batch(pos, batch.num)?;
        }
        if let Some(b) = self.batches.get_mut(pos) {
            *b = batch;
        }
        Ok(())
    }

    /// Points the batch at `pos` to the dataset `/crystal/dataset`.
    /// Returns false with a warning if the dataset does not exist.
    pub fn assign_batch_dataset(&mut self, ctx: &Context, pos: usize, crystal: &str, dataset: &str) -> bool {
        let id = self.crystal_lookup(crystal).and_then(|x| {
            let path = format!("/{}/{}", self.crystals[x].name, dataset);
            self.dataset_lookup(&path).and_then(|s| self.dataset(s)).map(|s| s.id)
        });
        match (id, self.batches.get_mut(pos)) {
            (Some(id), Some(b)) => {
                b.nbsetid = id;
                true
            }
            _ => {
                ctx.warn("assign_batch_dataset", "dataset id not found");
                false
            }
        }
    }

    /// Sorts batches added since the file was read into ascending order.
    /// Returns true if they had to be reordered.
    pub fn sort_new_batches(&mut self, ctx: &Context) -> bool {
        if !self.has_new_batches() {
            return false;
        }
        let sorted = self.batches.sort_from(self.n_orig_bat);
        if sorted {
            ctx.info("sort_new_batches", "sorting batch headers prior to writing to file");
        }
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> Context {
        Context::new("batch").with_verbosity(0)
    }

    #[test]
    fn test_word_layout() {
        let mut b = Batch::new(7);
        b.iortyp = 3;
        b.ndet = 1;
        b.nbsetid = 2;
        b.cell = [10.0, 20.0, 30.0, 90.0, 90.0, 90.0];
        b.phistt = 1.5;
        b.alambd = 0.9;
        b.dx = [100.0, 200.0];
        let w = b.to_words();
        assert_eq!(w[0], 185);
        assert_eq!(w[3], 3);
        assert_eq!(w[20], 2);
        assert_eq!(f32::from_bits(w[29 + 2]), 30.0);
        assert_eq!(f32::from_bits(w[29 + 36]), 1.5);
        assert_eq!(f32::from_bits(w[29 + 86]), 0.9);
        assert_eq!(f32::from_bits(w[29 + 111]), 100.0);
        // second detector not stored when ndet is 1
        assert_eq!(w[29 + 117], 0);

        let mut back = Batch::new(7);
        back.set_from_words(&w);
        assert_eq!(back.cell, b.cell);
        assert_eq!(back.nbsetid, 2);
        assert_eq!(back.dx, [100.0, 0.0]);
    }

    #[test]
    fn test_header_text() {
        let mut b = Batch::new(1);
        let text = format!("{:<70}{:<8}{:<8}{:<8}", "run 1", "PHI", "KAPPA", "OMEGA");
        b.set_header_text(&text);
        assert_eq!(b.title.trim_end(), "run 1");
        assert_eq!(b.gonlab[1].trim_end(), "KAPPA");
        b.set_goniostat_labels(["PHIPHIPHIPHI", "", "X"]);
        assert_eq!(b.gonlab[0], "PHIPHIPH");
    }

    #[test]
    fn test_add_and_sort() {
        let ctx = quiet();
        let mut mtz = Mtz::new();
        for n in [5, 3, 9, 1] {
            assert!(mtz.add_batch(&ctx, Batch::new(n)));
        }
        assert!(!mtz.add_batch(&ctx, Batch::new(3)));
        assert_eq!(mtz.num_batches(), 4);
        assert!(mtz.sort_new_batches(&ctx));
        assert_eq!(mtz.batch_numbers(), vec![1, 3, 5, 9]);
        assert!(!mtz.sort_new_batches(&ctx));

        assert!(mtz.add_batch(&ctx, Batch::new(2)));
        assert!(mtz.sort_new_batches(&ctx));
        assert_eq!(mtz.batch_numbers(), vec![1, 2, 3, 5, 9]);
    }

    #[test]
    fn test_original_batches_are_replaced() {
        let ctx = quiet();
        let mut mtz = Mtz::new();
        mtz.push_batch(Batch::new(1));
        mtz.push_batch(Batch::new(2));
        mtz.n_orig_bat = 2;
        assert_eq!(mtz.batch_numbers(), vec![1, 2]);
        assert_eq!(mtz.num_output_batches(), 2);

        // reusing an original number is allowed for new batches
        assert!(mtz.add_batch(&ctx, Batch::new(2)));
        assert!(mtz.add_batch(&ctx, Batch::new(1)));
        assert!(mtz.sort_new_batches(&ctx));
        assert_eq!(mtz.batch_numbers(), vec![1, 2]);
        assert_eq!(mtz.num_output_batches(), 2);
        assert_eq!(mtz.num_batches(), 4);
    }

    #[test]
    fn test_renumber() {
        let ctx = quiet();
        let mut mtz = Mtz::new();
        mtz.add_batch(&ctx, Batch::new(1));
        mtz.add_batch(&ctx, Batch::new(2));
        assert!(matches!(mtz.renumber_batch(0, 2), Err(Error::DuplicateBatch(2))));
        mtz.renumber_batch(0, 10).unwrap();
        assert_eq!(mtz.batch_numbers(), vec![10, 2]);
    }
}
