//! mtzkit: inspect MTZ reflection files and CCP4 spacegroups.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use mtzkit_core::{parse_symop_list, Context};
use mtzkit_io::{read_mtz, write_mtz, MtzReader, ReadOptions};
use mtzkit_mtz::{ColumnListing, Mtz};
use mtzkit_symmetry::{
    generate_alternate_origins, Spacegroup, SpacegroupQuery, SyminfoLocation, SyminfoTable,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("MTZ I/O error: {0}")]
    MtzIo(#[from] mtzkit_io::Error),

    #[error("MTZ error: {0}")]
    Mtz(#[from] mtzkit_mtz::Error),

    #[error("Symmetry error: {0}")]
    Symmetry(#[from] mtzkit_symmetry::Error),

    #[error("Core error: {0}")]
    Core(#[from] mtzkit_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no column labelled '{0}'")]
    UnknownColumn(String),
}

/// MTZ reflection file and spacegroup toolkit.
#[derive(Parser)]
#[command(name = "mtzkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header of an MTZ file
    Info {
        /// Input MTZ file
        input: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print reflections of an MTZ file
    Dump {
        /// Input MTZ file
        input: PathBuf,

        /// Number of reflections to print
        #[arg(short, long, default_value = "10")]
        n: usize,

        /// Comma-separated column labels (default: all columns)
        #[arg(short, long, value_delimiter = ',')]
        labels: Vec<String>,
    },

    /// Describe a spacegroup from the syminfo table
    Spacegroup {
        /// Spacegroup number, name, or operators such as "X,Y,Z * -X,-Y,Z"
        query: String,

        /// Path to syminfo.lib (default: $SYMINFO or $CLIBD/syminfo.lib)
        #[arg(long)]
        syminfo: Option<PathBuf>,
    },

    /// Copy an MTZ file, optionally changing its title and history
    Copy {
        /// Input MTZ file
        input: PathBuf,

        /// Output MTZ file
        output: PathBuf,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// History line to prepend
        #[arg(long)]
        history: Vec<String>,
    },
}

#[derive(Serialize)]
struct DatasetSummary<'a> {
    id: i32,
    name: &'a str,
    wavelength: f32,
}

#[derive(Serialize)]
struct CrystalSummary<'a> {
    project: &'a str,
    name: &'a str,
    cell: [f32; 6],
    datasets: Vec<DatasetSummary<'a>>,
}

#[derive(Serialize)]
struct FileSummary<'a> {
    title: &'a str,
    reflections: usize,
    spacegroup_number: i32,
    spacegroup_name: &'a str,
    point_group: &'a str,
    symmetry_operators: Vec<String>,
    resolution: [f32; 2],
    crystals: Vec<CrystalSummary<'a>>,
    columns: Vec<ColumnListing>,
    batches: usize,
    history: &'a [String],
}

impl<'a> FileSummary<'a> {
    fn new(mtz: &'a Mtz) -> Self {
        let (lo, hi) = mtz.resolution_limits();
        Self {
            title: &mtz.title,
            reflections: mtz.nref,
            spacegroup_number: mtz.symmetry.spacegroup_number,
            spacegroup_name: &mtz.symmetry.name,
            point_group: &mtz.symmetry.point_group,
            symmetry_operators: mtz
                .symmetry
                .operators
                .iter()
                .map(mtzkit_core::Symop::to_symop_string)
                .collect(),
            resolution: [lo, hi],
            crystals: mtz
                .crystals()
                .iter()
                .map(|x| CrystalSummary {
                    project: &x.project,
                    name: &x.name,
                    cell: x.cell,
                    datasets: x
                        .datasets()
                        .iter()
                        .map(|d| DatasetSummary {
                            id: d.id,
                            name: &d.name,
                            wavelength: d.wavelength,
                        })
                        .collect(),
                })
                .collect(),
            columns: mtz.list_input_columns(),
            batches: mtz.num_batches(),
            history: &mtz.history,
        }
    }
}

/// Converts 1/d^2 to a resolution in Angstroms.
fn to_angstrom(s: f32) -> f32 {
    if s > 0.0 {
        1.0 / s.sqrt()
    } else {
        0.0
    }
}

fn print_info(summary: &FileSummary<'_>) {
    println!("Title: {}", summary.title);
    println!("Reflections: {}", summary.reflections);
    println!(
        "Spacegroup: {} '{}' ({})",
        summary.spacegroup_number, summary.spacegroup_name, summary.point_group
    );
    for op in &summary.symmetry_operators {
        println!("  {}", op);
    }
    println!(
        "Resolution: {:.2} - {:.2} A",
        to_angstrom(summary.resolution[0]),
        to_angstrom(summary.resolution[1])
    );
    for xtal in &summary.crystals {
        let c = xtal.cell;
        println!(
            "Crystal {}/{}: {:.3} {:.3} {:.3} {:.2} {:.2} {:.2}",
            xtal.project, xtal.name, c[0], c[1], c[2], c[3], c[4], c[5]
        );
        for set in &xtal.datasets {
            println!("  Dataset {} {} (wavelength {:.5})", set.id, set.name, set.wavelength);
        }
    }
    println!("{:<30} {:<4} {:>7}", "Column", "Type", "Dataset");
    for col in &summary.columns {
        println!("{:<30} {:<4} {:>7}", col.label, col.col_type, col.dataset_id);
    }
    if summary.batches > 0 {
        println!("Batches: {}", summary.batches);
    }
    for line in summary.history {
        println!("History: {}", line);
    }
}

fn spacegroup_query(text: &str) -> Result<SpacegroupQuery> {
    if let Ok(n) = text.trim().parse::<i32>() {
        return Ok(SpacegroupQuery::Number(n));
    }
    if text.contains(',') {
        return Ok(SpacegroupQuery::Operators(parse_symop_list(text)?));
    }
    Ok(SpacegroupQuery::Ccp4Name(text.trim().to_string()))
}

fn print_spacegroup(sg: &Spacegroup) {
    println!("Spacegroup {} (CCP4 {})", sg.number, sg.ccp4_number);
    println!("  Hall symbol: {}", sg.symbol_hall);
    println!("  Extended H-M: {}", sg.symbol_xhm);
    println!("  Old CCP4 name: {}", sg.symbol_old);
    println!("  Point group: {}", sg.point_group);
    println!("  Crystal system: {}", sg.crystal_system);
    println!("  Laue class: {}", sg.laue.name);
    println!("  Patterson group: {} {}", sg.patterson_number, sg.patterson_name);
    println!("  Reciprocal ASU: {}", sg.asu_descr);
    println!("Operators ({}, {} primitive):", sg.nsymop(), sg.nsymop_prim);
    for op in &sg.symop {
        println!("  {}", op.to_symop_string());
    }
    println!("Reciprocal operators:");
    for (isym, plus, minus) in sg.reciprocal_operators() {
        println!("  ISYM {:>2} {:<20} ISYM {:>2} {}", isym, plus, isym + 1, minus);
    }
    let centric = sg.centric_zone_descriptions();
    if centric.is_empty() {
        println!("No centric zones");
    } else {
        println!("Centric zones:");
        for zone in centric {
            println!("  {}", zone);
        }
    }
    println!("Epsilon zones:");
    for (zone, eps) in sg.epsilon_zone_descriptions() {
        println!("  {:<20} {}", zone, eps);
    }
    let origins = generate_alternate_origins(sg.primitive_operators());
    println!("Alternate origins ({}):", origins.polarity_description());
    for o in &origins.origins {
        println!("  {:6.3} {:6.3} {:6.3}", o[0], o[1], o[2]);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
    let ctx = Context::new("mtzkit").with_verbosity(u8::from(cli.verbose) + 1);

    match cli.command {
        Commands::Info { input, json } => {
            let options = ReadOptions::default().with_load_reflections(false);
            let mtz = read_mtz(&ctx, &input, &options)?;
            let summary = FileSummary::new(&mtz);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("File: {}", input.display());
                print_info(&summary);
            }
        }

        Commands::Dump { input, n, labels } => {
            let mut reader = MtzReader::open(&ctx, &input)?;
            let (labels, mut types): (Vec<String>, Vec<String>) = if labels.is_empty() {
                reader
                    .mtz()
                    .list_input_columns()
                    .into_iter()
                    .map(|c| (c.label, c.col_type))
                    .unzip()
            } else {
                let n = labels.len();
                (labels, vec![String::new(); n])
            };
            let names: Vec<&str> = labels.iter().map(String::as_str).collect();
            let lookup = reader.mtz().lookup_input_columns(&names, &mut types)?;
            if let Some(i) = lookup.iter().position(Option::is_none) {
                return Err(CliError::UnknownColumn(labels[i].clone()));
            }

            let header: Vec<String> = labels.iter().map(|l| format!("{:>12}", l)).collect();
            println!("{}", header.join(" "));
            for iref in 1..=n.min(reader.mtz().nref_filein) {
                let Some(r) = reader.read_reflection_lookup(&lookup, iref) else {
                    break;
                };
                let row: Vec<String> = r
                    .values
                    .iter()
                    .zip(&r.missing)
                    .map(|(v, &m)| if m { format!("{:>12}", "?") } else { format!("{:>12.4}", v) })
                    .collect();
                println!("{}", row.join(" "));
            }
        }

        Commands::Spacegroup { query, syminfo } => {
            let location = syminfo.map_or(SyminfoLocation::Environment, SyminfoLocation::Path);
            let table = SyminfoTable::open(&location)?;
            info!("using {}", table.path().display());
            let sg = table.load(&ctx, &spacegroup_query(&query)?)?;
            print_spacegroup(&sg);
        }

        Commands::Copy {
            input,
            output,
            title,
            history,
        } => {
            let mut mtz = read_mtz(&ctx, &input, &ReadOptions::default())?;
            if let Some(title) = title {
                mtz.set_title(&title, false);
            }
            if !history.is_empty() {
                mtz.add_history(&history);
            }
            write_mtz(&ctx, &mut mtz, &output)?;
            println!(
                "Copied {} reflections from {} to {}",
                mtz.nref,
                input.display(),
                output.display()
            );
        }
    }

    Ok(())
}
