#![allow(clippy::uninlined_format_args)]
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use approx::{assert_abs_diff_eq, assert_relative_eq};
use mtzkit_core::{parse_symop_list, Context, Severity, UnitCell};
use mtzkit_symmetry::{
    check_symmetry_cell, generate_alternate_origins, AsuKind, CrystalSystem, Error,
    SpacegroupQuery, SyminfoLocation, SyminfoTable,
};

fn table() -> SyminfoTable {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/syminfo.lib");
    SyminfoTable::open(&SyminfoLocation::Path(path)).unwrap()
}

fn quiet() -> Context {
    Context::new("spacegroups").with_verbosity(0)
}

#[test]
fn test_p212121_descriptor() {
    let sg = table().load_by_number(&quiet(), 19).unwrap();
    assert_eq!(sg.symbol_xhm, "P 21 21 21");
    assert_eq!(sg.symbol_hall, " P 2ac 2ab");
    assert_eq!(sg.point_group, "PG222");
    assert_eq!(sg.crystal_system, CrystalSystem::Orthorhombic);
    assert_eq!(sg.nsymop(), 4);
    assert_eq!(sg.nsymop_prim, 4);
    assert_eq!(sg.asu, AsuKind::Orthorhombic);
    assert_eq!(sg.laue.name, "mmm");
    assert_eq!(sg.patterson_number, 47);
    assert_eq!(sg.patterson_name, "Pmmm");
    assert_eq!(sg.centric_zone_descriptions(), vec!["0kl", "h0l", "hk0"]);
    assert_eq!(sg.mapasu_zero_descr, "0<=x<1/2; 0<=y<1/2; 0<=z<1");
    assert_relative_eq!(sg.mapasu_ccp4[0], 0.49999, epsilon = 1e-6);
    assert_relative_eq!(sg.mapasu_ccp4[2], 0.99999, epsilon = 1e-6);
}

#[test]
fn test_p212121_reflection_classes() {
    let sg = table().load_by_number(&quiet(), 19).unwrap();

    assert!(sg.is_systematic_absence(1, 0, 0));
    assert!(!sg.is_systematic_absence(2, 0, 0));
    assert!(sg.is_systematic_absence(0, 0, 3));
    assert!(!sg.is_systematic_absence(1, 1, 0));

    assert!(sg.is_centric(1, 2, 0));
    assert!(!sg.is_centric(1, 2, 3));
    assert_relative_eq!(sg.centric_phase(1, 2, 0), 90.0);
    assert_relative_eq!(sg.centric_phase(2, 1, 0), 0.0);
    assert_relative_eq!(sg.centric_phase(1, 2, 3), 0.0);

    assert_eq!(sg.multiplicity(2, 0, 0), 2);
    assert_eq!(sg.multiplicity(1, 2, 3), 1);
    let eps = sg.epsilon_zone_descriptions();
    assert!(eps.contains(&("h00", 2)));
    assert!(eps.contains(&("hkl", 1)));
}

#[test]
fn test_asu_round_trip() {
    let sg = table().load_by_number(&quiet(), 96).unwrap();
    assert_eq!(sg.asu, AsuKind::Tetragonal4mmm);
    assert_eq!(sg.patterson_name, "P4/mmm");

    for hkl in [[1, 2, 3], [-3, 1, 2], [2, -5, -1], [0, -4, 7], [-2, -2, -2]] {
        let (isym, asu) = sg.put_in_asu(hkl[0], hkl[1], hkl[2]).unwrap();
        assert!(sg.is_in_asu(asu[0], asu[1], asu[2]), "{:?} -> {:?}", hkl, asu);
        assert!((1..=16).contains(&isym));
        assert_eq!(sg.generate_indices(isym, asu[0], asu[1], asu[2]), Some(hkl));
    }
    // already in the ASU: identity, I+
    assert_eq!(sg.put_in_asu(3, 1, 2), Some((1, [3, 1, 2])));
    assert_eq!(sg.is_in_pm_asu(-3, -1, -2), -1);
}

#[test]
fn test_p1_descriptor() {
    let sg = table().load_by_number(&quiet(), 1).unwrap();
    assert_eq!(sg.nsymop(), 1);
    assert_eq!(sg.nsymop_prim, 1);
    assert_eq!(sg.symop[0].to_symop_string(), "X,  Y,  Z");
    assert!(sg.centric_zone_descriptions().is_empty());

    // exactly one of each Friedel pair
    for hkl in [[1, 2, 3], [0, 0, 4], [0, -1, 0], [-2, 3, -1], [5, 0, -5]] {
        let [h, k, l] = hkl;
        assert!(sg.is_in_asu(h, k, l) != sg.is_in_asu(-h, -k, -l), "{:?}", hkl);
        assert_eq!(sg.is_in_pm_asu(h, k, l), -sg.is_in_pm_asu(-h, -k, -l));
    }

    assert_eq!(sg.generate_indices(2, 1, 2, 3), Some([-1, -2, -3]));
    assert_eq!(sg.generate_indices(0, 1, 2, 3), None);
    assert_eq!(sg.generate_indices(3, 1, 2, 3), None);
}

#[test]
fn test_reflection_invariants_for_every_group() {
    let t = table();
    let ctx = quiet();
    for number in [1, 2, 4, 5, 19, 96, 146, 1146, 169, 195] {
        let sg = t.load_by_ccp4_number(&ctx, number).unwrap();

        for op in &sg.symop {
            let back = op.inverse().inverse();
            for i in 0..3 {
                for j in 0..3 {
                    assert_abs_diff_eq!(back.rot(i, j), op.rot(i, j), epsilon = 1e-5);
                }
                assert_abs_diff_eq!(back.trn()[i], op.trn()[i], epsilon = 1e-5);
            }
        }

        for h in -5..=5 {
            for k in -5..=5 {
                for l in -5..=5 {
                    let hkl = [h, k, l];
                    let (isym, asu) = sg
                        .put_in_asu(h, k, l)
                        .unwrap_or_else(|| panic!("{}: {:?} has no ASU image", number, hkl));
                    assert!(sg.is_in_asu(asu[0], asu[1], asu[2]));
                    assert_eq!(sg.put_in_asu(asu[0], asu[1], asu[2]), Some((1, asu)));
                    assert_eq!(
                        sg.generate_indices(isym, asu[0], asu[1], asu[2]),
                        Some(hkl),
                        "{}: isym {}",
                        number,
                        isym
                    );

                    if hkl == [0, 0, 0] {
                        continue;
                    }
                    let friedel = hkl.map(|x| -x);
                    let maps_to_mate = sg.symop.iter().any(|op| op.apply_to_hkl(hkl) == friedel);
                    assert_eq!(sg.is_centric(h, k, l), maps_to_mate, "{}: {:?}", number, hkl);
                }
            }
        }
    }
}

#[test]
fn test_lookup_by_names() {
    let t = table();
    let ctx = quiet();
    assert_eq!(t.load_by_name(&ctx, "P 1 21 1").unwrap().number, 4);
    assert_eq!(t.load_by_name(&ctx, "p21").unwrap().number, 4);
    assert_eq!(t.load_by_ccp4_name(&ctx, "C2").unwrap().number, 5);
    assert_eq!(t.load_by_ccp4_name(&ctx, "H3").unwrap().ccp4_number, 146);
    assert_eq!(t.load_by_ccp4_name(&ctx, "R3").unwrap().ccp4_number, 1146);
    assert_eq!(t.load_by_ccp4_number(&ctx, 1146).unwrap().symbol_xhm, "R 3 :R");
}

#[test]
fn test_lookup_by_operators() {
    let t = table();
    let ops = parse_symop_list("-x,y-1/2,-z * x,y,z").unwrap();
    let sg = t.load_by_ops(&quiet(), &ops).unwrap();
    assert_eq!(sg.number, 4);
    // supplied operators are kept as given
    assert_relative_eq!(sg.symop[0].trn()[1], -0.5);

    let wrong = parse_symop_list("x,y,z * -x,-y,z").unwrap();
    assert!(matches!(
        t.load(&quiet(), &SpacegroupQuery::Operators(wrong)),
        Err(Error::SpacegroupNotFound(_))
    ));
}

#[test]
fn test_centred_monoclinic() {
    let sg = table().load_by_number(&quiet(), 5).unwrap();
    assert_eq!(sg.nsymop(), 4);
    assert_eq!(sg.nsymop_prim, 2);
    assert_eq!(sg.symop[3].to_symop_string(), "-X+1/2,  Y+1/2,  -Z");
    assert_eq!(sg.patterson_number, 12);
    assert_eq!(sg.multiplicity(1, 2, 3), 2);
    assert_eq!(sg.multiplicity(0, 2, 0), 4);
    // C centering: h + k odd is absent
    assert!(sg.is_systematic_absence(1, 2, 3));
    assert!(!sg.is_systematic_absence(1, 1, 3));
}

#[test]
fn test_rhombohedral_settings() {
    let t = table();
    let ctx = quiet();

    let hex = t.load_by_ccp4_number(&ctx, 146).unwrap();
    assert_eq!(hex.nsymop(), 9);
    assert_eq!(hex.patterson_number, 148);
    assert_eq!(hex.laue.code, 9);

    let rhomb = t.load_by_ccp4_number(&ctx, 1146).unwrap();
    assert_eq!(rhomb.patterson_number, 1148);
    assert_eq!(rhomb.patterson_name, "R-3");
    assert_eq!(rhomb.chb[0], [0.0, -1.0, 1.0]);
    // (1,0,0) maps to (0,-1,1) in the hexagonal reference basis
    assert!(!rhomb.is_in_asu(1, 0, 0));
    assert!(rhomb.is_in_asu(-1, 0, 0));
}

#[test]
fn test_hexagonal_grid_and_cell() {
    let t = table();
    let ctx = quiet();
    let sg = t.load_by_number(&ctx, 169).unwrap();
    assert_eq!(sg.asu, AsuKind::Hexagonal6m);
    assert_eq!(sg.laue.sampling, [6, 6, 12]);
    assert_eq!(sg.fft_grid([50, 50, 50], 0.0), [78, 78, 84]);

    let hex_cell = UnitCell::new(90.0, 90.0, 120.0, 90.0, 90.0, 120.0);
    let ortho_cell = UnitCell::new(90.0, 90.0, 120.0, 90.0, 90.0, 90.0);
    assert!(check_symmetry_cell(&ctx, &t, &sg.symop, &hex_cell).unwrap());
    assert!(!check_symmetry_cell(&ctx, &t, &sg.symop, &ortho_cell).unwrap());
    assert!(!check_symmetry_cell(&ctx, &t, &[], &hex_cell).unwrap());

    let p1 = t.load_by_number(&ctx, 1).unwrap();
    assert!(check_symmetry_cell(&ctx, &t, &p1.symop, &ortho_cell).unwrap());
}

#[test]
fn test_cubic_and_triclinic() {
    let t = table();
    let ctx = quiet();
    let cubic = t.load_by_number(&ctx, 195).unwrap();
    assert_eq!(cubic.asu, AsuKind::CubicM3b);
    assert_eq!(cubic.patterson_name, "Pm-3");
    assert_eq!(cubic.crystal_system.to_string(), "CUBIC");
    assert_eq!(cubic.nsymop(), 12);

    let pbar1 = t.load_by_number(&ctx, 2).unwrap();
    // no ccp4 map ASU in the table: falls back to the zero-origin one
    assert_eq!(pbar1.mapasu_ccp4_descr, pbar1.mapasu_zero_descr);
    assert_relative_eq!(pbar1.mapasu_ccp4[0], 0.50001, epsilon = 1e-6);
    assert_eq!(pbar1.centric_zone_descriptions().len(), 12);
    assert!(pbar1.is_centric(3, 5, 7));
}

#[test]
fn test_alternate_origins_from_loaded_group() {
    let sg = table().load_by_number(&quiet(), 19).unwrap();
    let origins = generate_alternate_origins(&sg.symop);
    assert_eq!(origins.origins.len(), 8);
    assert_eq!(origins.polar, [false, false, false]);

    let p21 = table().load_by_number(&quiet(), 4).unwrap();
    let recip = p21.reciprocal_operators();
    assert_eq!(recip.len(), 2);
    assert_eq!(recip[1].0, 3);
    assert_eq!(recip[1].1, "-h,+k,-l");
    assert_eq!(recip[1].2, "+h,-k,+l");
}

#[test]
fn test_missing_reference_and_group() {
    let missing = SyminfoTable::open(&SyminfoLocation::Path(PathBuf::from(
        "/nonexistent/syminfo.lib",
    )));
    assert!(matches!(missing, Err(Error::NoReferenceFile(_))));

    let result = table().load_by_number(&quiet(), 230);
    assert!(matches!(result, Err(Error::SpacegroupNotFound(_))));
}

#[test]
fn test_short_lines_are_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "begin_spacegroup\nnumber\nsymbol ccp4 3\nsymbol xHM  'P 1 2 1'\n\
         symbol patt '-P 2y' '2/m'\nhklasu ccp4 'k>=0 and (l>0 or (l=0 and h>=0))'\n\
         symop x,y,z\nsymop -x,y,-z\ncenop x,y,z\nend_spacegroup"
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let ctx = Context::new("spacegroups")
        .with_verbosity(0)
        .with_callback(move |sev, _, msg| sink.lock().unwrap().push((sev, msg.to_string())));

    let t = SyminfoTable::open(&SyminfoLocation::Path(file.path().to_path_buf())).unwrap();
    let sg = t.load_by_ccp4_number(&ctx, 3).unwrap();
    assert_eq!(sg.number, 0);
    assert_eq!(sg.crystal_system, CrystalSystem::Triclinic);
    // hall symbol missing: no Patterson group for the lattice
    assert_eq!(sg.patterson_number, 0);

    let seen = seen.lock().unwrap();
    assert!(seen
        .iter()
        .any(|(sev, msg)| *sev == Severity::Warning && msg.contains("too few tokens")));
}
