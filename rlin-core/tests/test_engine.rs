// Engine-level behavior: batching, matrix backing, filters, import,
// the debug log, and single-writer locking.

use rlin_core::{Engine, EngineConfig, LockContention, SchemePaths};
use std::fs;
use std::path::Path;

fn write_scheme(dir: &Path, locus_count: usize, thresholds: &str, profiles: &[(&str, &str)]) {
    let paths = SchemePaths::new(dir, 1);
    let mut loci = String::new();
    for i in 1..=locus_count {
        loci.push_str(&format!("locus_{i:04}\n"));
    }
    fs::write(paths.loci(), loci).unwrap();
    fs::write(paths.thresholds(), format!("{thresholds}\n")).unwrap();

    let mut table = String::from("id\tprofile\n");
    for (id, alleles) in profiles {
        table.push_str(&format!("{id}\t{alleles}\n"));
    }
    fs::write(paths.profiles(), table).unwrap();
}

fn quiet() -> EngineConfig {
    EngineConfig {
        verbosity: 0,
        ..EngineConfig::default()
    }
}

fn run(dir: &Path, config: EngineConfig) -> usize {
    let mut engine = Engine::open(dir, 1, config).unwrap();
    engine.run().unwrap()
}

fn varied_profiles() -> Vec<(&'static str, &'static str)> {
    vec![
        ("1", "1,1,1,1,1,1"),
        ("2", "1,1,1,1,1,2"),
        ("3", "1,1,1,1,3,2"),
        ("4", "7,7,7,7,7,7"),
        ("5", "7,7,7,7,7,8"),
        ("6", "1,1,2,2,3,3"),
        ("7", "4,4,4,4,4,4"),
        ("8", "1,1,1,1,N,2"),
    ]
}

#[test]
fn mmap_and_ram_matrices_produce_identical_output() {
    let ram_dir = tempfile::tempdir().unwrap();
    let map_dir = tempfile::tempdir().unwrap();
    write_scheme(ram_dir.path(), 6, "1;2;3", &varied_profiles());
    write_scheme(map_dir.path(), 6, "1;2;3", &varied_profiles());

    let base = EngineConfig {
        max_missing: 1,
        ..quiet()
    };
    run(ram_dir.path(), base.clone());
    run(
        map_dir.path(),
        EngineConfig {
            mmap_matrix: true,
            ..base
        },
    );

    let ram = fs::read_to_string(SchemePaths::new(ram_dir.path(), 1).lincodes()).unwrap();
    let map = fs::read_to_string(SchemePaths::new(map_dir.path(), 1).lincodes()).unwrap();
    assert_eq!(ram, map);
}

#[test]
fn unit_batches_label_everything_in_id_order() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(
        dir.path(),
        4,
        "1;2",
        &[("1", "1,1,1,1"), ("2", "1,1,1,2"), ("3", "1,1,2,2")],
    );
    let labeled = run(
        dir.path(),
        EngineConfig {
            batch_size: 1,
            ..quiet()
        },
    );
    assert_eq!(labeled, 3);

    let content = fs::read_to_string(SchemePaths::new(dir.path(), 1).lincodes()).unwrap();
    let ids: Vec<&str> = content
        .lines()
        .skip(1)
        .map(|line| line.split('\t').next().unwrap())
        .collect();
    // With batch_size 1 the Prim step is skipped and profiles are taken
    // in stored order
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[test]
fn small_batches_match_single_batch_for_chained_profiles() {
    // A chain where each profile is nearest its predecessor gives the
    // same codes regardless of batch boundaries.
    let profiles = vec![
        ("1", "1,1,1,1"),
        ("2", "1,1,1,2"),
        ("3", "1,1,2,2"),
        ("4", "1,2,2,2"),
    ];
    let one_dir = tempfile::tempdir().unwrap();
    let two_dir = tempfile::tempdir().unwrap();
    write_scheme(one_dir.path(), 4, "1;2", &profiles);
    write_scheme(two_dir.path(), 4, "1;2", &profiles);

    run(one_dir.path(), quiet());
    run(
        two_dir.path(),
        EngineConfig {
            batch_size: 2,
            ..quiet()
        },
    );

    let one = fs::read_to_string(SchemePaths::new(one_dir.path(), 1).lincodes()).unwrap();
    let two = fs::read_to_string(SchemePaths::new(two_dir.path(), 1).lincodes()).unwrap();
    assert_eq!(one, two);
}

#[test]
fn profiles_over_the_missing_budget_wait_for_it_to_rise() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(dir.path(), 4, "1;2", &[("1", "1,1,1,1"), ("2", "1,1,N,N")]);

    assert_eq!(run(dir.path(), quiet()), 1);

    // Raising the budget picks up the parked profile
    assert_eq!(
        run(
            dir.path(),
            EngineConfig {
                max_missing: 2,
                ..quiet()
            }
        ),
        1
    );
}

#[test]
fn id_range_filter_limits_the_unlabeled_queue() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(
        dir.path(),
        4,
        "1;2",
        &[("1", "1,1,1,1"), ("2", "1,1,1,2"), ("30", "1,1,2,2")],
    );
    let labeled = run(
        dir.path(),
        EngineConfig {
            min_id: Some(1),
            max_id: Some(2),
            ..quiet()
        },
    );
    assert_eq!(labeled, 2);

    let content = fs::read_to_string(SchemePaths::new(dir.path(), 1).lincodes()).unwrap();
    assert!(!content.contains("\n30\t"));
}

#[test]
fn import_adds_profiles_before_assignment() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(dir.path(), 4, "1;2", &[("1", "1,1,1,1")]);

    let input = dir.path().join("batch.tsv");
    fs::write(&input, "id\tl1\tl2\tl3\tl4\n1\t8,8,8,8\n2\t1\t1\t1\t2\n").unwrap();

    let mut engine = Engine::open(dir.path(), 1, quiet()).unwrap();
    assert_eq!(engine.import_profiles(&input).unwrap(), 1);
    assert_eq!(engine.run().unwrap(), 2);
    drop(engine);

    let content = fs::read_to_string(SchemePaths::new(dir.path(), 1).lincodes()).unwrap();
    assert!(content.contains("1\t0_0\t1,1,1,1"));
    assert!(content.contains("2\t0_1\t1,1,1,2"));
}

#[test]
fn debug_log_records_one_line_per_assignment() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(dir.path(), 4, "1;2", &[("1", "1,1,1,1"), ("2", "1,1,1,2")]);

    let log_path = dir.path().join("assign.log.tsv");
    run(
        dir.path(),
        EngineConfig {
            log_path: Some(log_path.clone()),
            ..quiet()
        },
    );

    let content = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "profile_id\tclosest_profile_id\tcommon_alleles\tmissing_alleles\t\
         missing_in_either\tidentity\tdistance\tchosen_prefix\tnew_lincode"
    );
    // First assignment has no comparison partner
    assert_eq!(lines[1], "1\t-\t4\t0\t0\t-\t-\t\t0_0");
    assert_eq!(lines[2], "2\t1\t4\t0\t0\t75.00\t25.00\t0\t0_1");
}

#[test]
fn second_engine_on_the_same_scheme_is_contention() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(dir.path(), 4, "1;2", &[("1", "1,1,1,1")]);

    let _held = Engine::open(dir.path(), 1, quiet()).unwrap();
    let err = Engine::open(dir.path(), 1, quiet()).unwrap_err();
    assert!(err.downcast_ref::<LockContention>().is_some());
}

#[test]
fn lock_is_released_when_the_engine_drops() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(dir.path(), 4, "1;2", &[("1", "1,1,1,1")]);

    {
        let _engine = Engine::open(dir.path(), 1, quiet()).unwrap();
    }
    assert!(Engine::open(dir.path(), 1, quiet()).is_ok());
}

#[test]
fn malformed_thresholds_fail_at_startup_naming_the_file() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(dir.path(), 4, "1;2", &[("1", "1,1,1,1")]);
    let paths = SchemePaths::new(dir.path(), 1);
    fs::write(paths.thresholds(), "4;2;1\n").unwrap();

    let err = Engine::open(dir.path(), 1, quiet()).unwrap_err();
    assert!(format!("{err:#}").contains("thresholds"));
}

#[test]
fn missing_profile_table_fails_at_startup_naming_the_file() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(dir.path(), 4, "1;2", &[("1", "1,1,1,1")]);
    let paths = SchemePaths::new(dir.path(), 1);
    fs::remove_file(paths.profiles()).unwrap();

    let err = Engine::open(dir.path(), 1, quiet()).unwrap_err();
    assert!(format!("{err:#}").contains("profiles.tsv"));
}
