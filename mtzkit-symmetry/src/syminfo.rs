//! Loader for the `syminfo.lib` reference table.
//!
//! The table is a sequence of `begin_spacegroup` / `end_spacegroup`
//! blocks. Each block lists the numbers, symbols, change of basis,
//! primitive and centering operators and ASU descriptions of one
//! spacegroup setting. Blocks are scanned in order and the first one
//! matching the query is turned into a [`Spacegroup`].

use std::env;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use mtzkit_core::{keymatch, operators_equal, Context, Symop, Token, Tokenizer};

use crate::asu::{AsuKind, LaueClass};
use crate::error::{Error, Result};
use crate::grid::range_to_limits;
use crate::names::name_equal_to_lib;
use crate::spacegroup::{CrystalSystem, Spacegroup};
use crate::zones::{centric_zones, epsilon_zones};

const ORIGIN: &str = "syminfo";

/// Where to find the reference table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyminfoLocation {
    /// An explicit file.
    Path(PathBuf),
    /// `$SYMINFO`, else `$CLIBD/syminfo.lib`.
    #[default]
    Environment,
}

impl SyminfoLocation {
    /// Resolves the location to a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoReferenceFile`] if neither environment
    /// variable is set.
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            Self::Path(p) => Ok(p.clone()),
            Self::Environment => {
                if let Some(p) = env::var_os("SYMINFO") {
                    return Ok(PathBuf::from(p));
                }
                env::var_os("CLIBD")
                    .map(|dir| Path::new(&dir).join("syminfo.lib"))
                    .ok_or_else(|| {
                        Error::NoReferenceFile("neither SYMINFO nor CLIBD is set".to_string())
                    })
            }
        }
    }
}

/// Selects a block of the reference table.
#[derive(Debug, Clone, PartialEq)]
pub enum SpacegroupQuery {
    /// International Tables number.
    Number(i32),
    /// CCP4 number, which also numbers non-standard settings.
    Ccp4Number(i32),
    /// Extended Hermann-Mauguin name.
    Name(String),
    /// Old CCP4 name, falling back to the extended name.
    Ccp4Name(String),
    /// The complete operator set, in any order.
    Operators(Vec<Symop>),
}

impl fmt::Display for SpacegroupQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "number {n}"),
            Self::Ccp4Number(n) => write!(f, "ccp4 number {n}"),
            Self::Name(s) => write!(f, "name '{s}'"),
            Self::Ccp4Name(s) => write!(f, "ccp4 name '{s}'"),
            Self::Operators(ops) => write!(f, "{} operators", ops.len()),
        }
    }
}

/// Raw contents of one table block.
#[derive(Debug, Default)]
struct Block {
    number: i32,
    ccp4_number: i32,
    basisop: String,
    hall: String,
    xhm: String,
    old: String,
    patt: String,
    pgrp: String,
    asu_descr: String,
    mapasu_zero: [String; 3],
    mapasu_ccp4: [String; 3],
    symops: Vec<String>,
    cenops: Vec<String>,
}

impl Block {
    fn parse_ops(list: &[String]) -> Result<Vec<Symop>> {
        list.iter().map(|s| Ok(Symop::parse(s)?)).collect()
    }

    /// Full operator set, centering-major, with translations wrapped.
    fn operators(&self) -> Result<Vec<Symop>> {
        let prim = Self::parse_ops(&self.symops)?;
        let cent = Self::parse_ops(&self.cenops)?;
        Ok(cent
            .iter()
            .flat_map(|c| prim.iter().map(move |p| c.multiply(p).normalize_translations()))
            .collect())
    }

    fn matches(&self, query: &SpacegroupQuery, normalized: &[Symop]) -> Result<bool> {
        let found = match query {
            SpacegroupQuery::Number(n) => self.number == *n,
            SpacegroupQuery::Ccp4Number(n) => self.ccp4_number == *n,
            SpacegroupQuery::Name(name) => name_equal_to_lib(&self.xhm, name),
            SpacegroupQuery::Ccp4Name(name) => {
                name_equal_to_lib(&self.old, name) || name_equal_to_lib(&self.xhm, name)
            }
            SpacegroupQuery::Operators(_) => {
                self.symops.len() * self.cenops.len() == normalized.len()
                    && operators_equal(normalized, &self.operators()?)
            }
        };
        Ok(found)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Handle on a `syminfo.lib` file.
#[derive(Debug, Clone)]
pub struct SyminfoTable {
    path: PathBuf,
    tokenizer: Tokenizer,
}

impl SyminfoTable {
    /// Opens the table at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoReferenceFile`] if the location cannot be
    /// resolved or is not a file.
    pub fn open(location: &SyminfoLocation) -> Result<Self> {
        let path = location.resolve()?;
        if !path.is_file() {
            return Err(Error::NoReferenceFile(path.display().to_string()));
        }
        // '=' appears in the map ASU ranges
        let tokenizer = Tokenizer::new(" \t,", ",");
        Ok(Self { path, tokenizer })
    }

    /// Resolved path of the syminfo file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the first spacegroup matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpacegroupNotFound`] if no block matches, and
    /// [`Error::NoAsuMatch`] or [`Error::NoLaueMatch`] if the matching
    /// block has an unknown ASU description.
    pub fn load(&self, ctx: &Context, query: &SpacegroupQuery) -> Result<Spacegroup> {
        let normalized: Vec<Symop> = match query {
            SpacegroupQuery::Operators(ops) => {
                ops.iter().map(|op| op.normalize_translations()).collect()
            }
            _ => Vec::new(),
        };

        let file = File::open(&self.path)
            .map_err(|e| Error::NoReferenceFile(format!("{}: {e}", self.path.display())))?;
        ctx.info(
            ORIGIN,
            &format!("spacegroup information from {}", self.path.display()),
        );

        let mut block = Block::default();
        let mut found = false;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.is_empty() {
                continue;
            }
            let tokens = self.tokenizer.tokenize(line);
            let Some(key) = tokens.first() else {
                continue;
            };
            let key = key.text.as_str();

            if keymatch(key, "number") {
                if let Some(t) = required(ctx, &tokens, 2, line) {
                    block.number = t[1].int();
                }
            } else if keymatch(key, "basisop") {
                block.basisop = tail(line, 8);
            } else if keymatch(key, "symbol") {
                if let Some(t) = required(ctx, &tokens, 3, line) {
                    let value = t[2].text.clone();
                    let third = t.get(3).map(|t| t.text.clone()).unwrap_or_default();
                    match t[1].text.as_str() {
                        "ccp4" => block.ccp4_number = t[2].int(),
                        "Hall" => block.hall = value,
                        "xHM" => block.xhm = value,
                        "old" => block.old = value,
                        "patt" => block.patt = third,
                        "pgrp" => block.pgrp = third,
                        _ => {}
                    }
                }
            } else if keymatch(key, "hklasu") {
                if let Some(t) = required(ctx, &tokens, 3, line) {
                    if t[1].text == "ccp4" {
                        block.asu_descr = t[2].text.clone();
                    }
                }
            } else if keymatch(key, "mapasu") {
                if let Some(t) = required(ctx, &tokens, 5, line) {
                    let ranges = [2, 3, 4].map(|i| t[i].text.clone());
                    match t[1].text.as_str() {
                        "zero" => block.mapasu_zero = ranges,
                        "ccp4" => block.mapasu_ccp4 = ranges,
                        _ => {}
                    }
                }
            } else if keymatch(key, "symop") {
                block.symops.push(tail(line, 6));
            } else if keymatch(key, "cenop") {
                block.cenops.push(tail(line, 6));
            } else if keymatch(key, "end_spacegroup") {
                if block.matches(query, &normalized)? {
                    found = true;
                    break;
                }
                block.reset();
            }
        }

        if !found || block.symops.is_empty() {
            return Err(Error::SpacegroupNotFound(query.to_string()));
        }
        let supplied = match query {
            SpacegroupQuery::Operators(ops) => Some(ops.as_slice()),
            _ => None,
        };
        build(&block, supplied)
    }

    /// Loads a spacegroup by International Tables number.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_by_number(&self, ctx: &Context, number: i32) -> Result<Spacegroup> {
        self.load(ctx, &SpacegroupQuery::Number(number))
    }

    /// Loads a spacegroup by CCP4 number.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_by_ccp4_number(&self, ctx: &Context, number: i32) -> Result<Spacegroup> {
        self.load(ctx, &SpacegroupQuery::Ccp4Number(number))
    }

    /// Loads a spacegroup by extended Hermann-Mauguin name.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_by_name(&self, ctx: &Context, name: &str) -> Result<Spacegroup> {
        self.load(ctx, &SpacegroupQuery::Name(name.to_string()))
    }

    /// Loads a spacegroup by old CCP4 name.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_by_ccp4_name(&self, ctx: &Context, name: &str) -> Result<Spacegroup> {
        self.load(ctx, &SpacegroupQuery::Ccp4Name(name.to_string()))
    }

    /// Identifies a spacegroup from its complete operator set.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_by_ops(&self, ctx: &Context, ops: &[Symop]) -> Result<Spacegroup> {
        self.load(ctx, &SpacegroupQuery::Operators(ops.to_vec()))
    }
}

fn required<'a>(ctx: &Context, tokens: &'a [Token], n: usize, line: &str) -> Option<&'a [Token]> {
    if tokens.len() < n {
        ctx.warn(ORIGIN, &format!("too few tokens in line: {line}"));
        None
    } else {
        Some(tokens)
    }
}

/// Text after the keyword field of fixed width `start`.
fn tail(line: &str, start: usize) -> String {
    line.get(start..).unwrap_or_default().to_string()
}

fn build(block: &Block, supplied: Option<&[Symop]>) -> Result<Spacegroup> {
    let chb = if block.basisop.trim().is_empty() {
        Symop::identity()
    } else {
        Symop::parse(&block.basisop)?
    }
    .rotation();

    let (symop, invsymop): (Vec<Symop>, Vec<Symop>) = match supplied {
        Some(ops) => (ops.to_vec(), ops.iter().map(Symop::inverse).collect()),
        None => {
            let prim = Block::parse_ops(&block.symops)?;
            let cent = Block::parse_ops(&block.cenops)?;
            cent.iter()
                .flat_map(|c| prim.iter().map(move |p| c.multiply(p)))
                .map(|op| (op.normalize_translations(), op.inverse().normalize_translations()))
                .unzip()
        }
    };

    let asu = AsuKind::from_description(&block.asu_descr, &block.patt)?;
    let laue = LaueClass::from_code(asu.laue_code())?;
    let (patterson_number, patterson_name) = asu.patterson(&block.hall, &block.xhm).unwrap_or((0, ""));

    let upper = |r: &str| range_to_limits(r)[1];
    let mapasu_zero_descr = block.mapasu_zero.join(" ");
    let mapasu_zero = [0, 1, 2].map(|i| upper(&block.mapasu_zero[i]));
    let (mapasu_ccp4_descr, mapasu_ccp4) = if upper(&block.mapasu_ccp4[0]) > 0.0 {
        (
            block.mapasu_ccp4.join(" "),
            [0, 1, 2].map(|i| upper(&block.mapasu_ccp4[i])),
        )
    } else {
        (mapasu_zero_descr.clone(), mapasu_zero)
    };

    let nsymop_prim = block.symops.len();
    let centrics = centric_zones(&symop);
    let epsilon = epsilon_zones(&symop[..nsymop_prim.min(symop.len())], symop.len());

    log::debug!(
        "loaded spacegroup {} '{}' with {} operators",
        block.number,
        block.xhm,
        symop.len()
    );

    Ok(Spacegroup {
        number: block.number,
        ccp4_number: block.ccp4_number,
        symbol_hall: block.hall.clone(),
        symbol_xhm: block.xhm.clone(),
        symbol_old: block.old.clone(),
        point_group: format!("PG{}", block.pgrp),
        crystal_system: CrystalSystem::from_number(block.number),
        chb,
        nsymop_prim,
        symop,
        invsymop,
        asu_descr: block.asu_descr.clone(),
        asu,
        laue,
        patterson_number,
        patterson_name: patterson_name.to_string(),
        centrics,
        epsilon,
        mapasu_zero_descr,
        mapasu_zero,
        mapasu_ccp4_descr,
        mapasu_ccp4,
    })
}
