mod common;

use common::{create_segment_output, create_test_dir, list_names, names, write_file};
use imagery_pipeline::reconciliation::{
    parse_targets, reconcile, reconcile_with_options, ReconcileError, ReconcileOptions,
    TargetSubpath,
};
use imagery_pipeline::utils::DEFAULT_TARGETS;
use std::fs;

fn default_targets() -> Vec<TargetSubpath> {
    parse_targets(&DEFAULT_TARGETS[..]).expect("Default targets should parse")
}

// ============ Scenario Tests ============

#[tokio::test]
async fn test_first_encountered_copy_wins() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "unitA/segmentation/frame/img1.tif", b"from A");
    write_file(&source, "unitB/segmentation/frame/img1.tif", b"from B");

    let result = reconcile(&source, &dest, &default_targets())
        .await
        .expect("Should reconcile");

    let copied = fs::read(dest.join("frame/img1.tif")).expect("Should exist");
    assert_eq!(copied, b"from A");

    let frame = result.target("frame").expect("Should report frame");
    assert_eq!(frame.matched_dirs, 2);
    assert_eq!(frame.copied.len(), 1);
    assert_eq!(frame.skipped, vec![source.join("unitB/segmentation/frame/img1.tif")]);
    assert_eq!(frame.file_count, 1);
}

#[tokio::test]
async fn test_spaces_replaced_with_underscores() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "unitA/measurements/data 1.csv", b"a,b\n");

    reconcile(&source, &dest, &default_targets())
        .await
        .expect("Should reconcile");

    assert!(dest.join("measurements/data_1.csv").is_file());
    assert!(!dest.join("measurements/data 1.csv").exists());
    // Source is untouched
    assert!(source.join("unitA/measurements/data 1.csv").is_file());
}

#[tokio::test]
async fn test_absent_target_yields_empty_folder() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "unitA/measurements/m.csv", b"x");

    let result = reconcile(&source, &dest, &default_targets())
        .await
        .expect("Absent targets are not an error");

    for name in ["corrected_crop", "frame"] {
        let folder = dest.join(name);
        assert!(folder.is_dir(), "{name} should be created");
        assert!(list_names(&folder).is_empty(), "{name} should be empty");
        assert_eq!(result.target(name).unwrap().file_count, 0);
    }
    assert_eq!(list_names(&dest.join("measurements")).len(), 1);
}

#[tokio::test]
async fn test_missing_source_root_is_not_an_error() {
    let temp_dir = create_test_dir();
    let dest = temp_dir.path().join("dest");

    let result = reconcile(&temp_dir.path().join("does-not-exist"), &dest, &default_targets())
        .await
        .expect("Missing source is not an error");

    assert_eq!(result.total_copied(), 0);
    assert_eq!(
        list_names(&dest),
        names(&["corrected_crop", "frame", "measurements"])
    );
}

// ============ Property Tests ============

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    create_segment_output(&source, &["img_001", "img_002", "img_003"]);
    let targets = default_targets();

    let first = reconcile(&source, &dest, &targets).await.expect("First run");
    let after_first: Vec<_> = ["corrected_crop", "frame", "measurements"]
        .iter()
        .map(|n| list_names(&dest.join(n)))
        .collect();

    let second = reconcile(&source, &dest, &targets).await.expect("Second run");
    let after_second: Vec<_> = ["corrected_crop", "frame", "measurements"]
        .iter()
        .map(|n| list_names(&dest.join(n)))
        .collect();

    assert_eq!(first.total_copied(), 9);
    assert_eq!(second.total_copied(), 0);
    assert_eq!(second.total_skipped(), 9);
    assert_eq!(after_first, after_second);
    assert!(after_second[2].contains("img_001_measurements.csv"));
}

#[tokio::test]
async fn test_runs_accumulate_into_existing_destination() {
    let temp_dir = create_test_dir();
    let dest = temp_dir.path().join("dest");
    let batch_one = temp_dir.path().join("batch1");
    let batch_two = temp_dir.path().join("batch2");
    create_segment_output(&batch_one, &["img_001"]);
    create_segment_output(&batch_two, &["img_002"]);
    let targets = default_targets();

    reconcile(&batch_one, &dest, &targets).await.expect("Batch one");
    let result = reconcile(&batch_two, &dest, &targets).await.expect("Batch two");

    assert_eq!(result.target("frame").unwrap().file_count, 2);
    assert_eq!(
        list_names(&dest.join("frame")),
        names(&["img_001.tif", "img_002.tif"])
    );
}

#[tokio::test]
async fn test_existing_destination_never_overwritten() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "unitA/segmentation/frame/img 1.tif", b"new bytes");
    write_file(&dest, "frame/img_1.tif", b"old bytes");

    reconcile(&source, &dest, &default_targets())
        .await
        .expect("Should reconcile");

    assert_eq!(fs::read(dest.join("frame/img_1.tif")).unwrap(), b"old bytes");
}

#[tokio::test]
async fn test_nested_files_not_copied() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "unitA/segmentation/frame/top.tif", b"top");
    write_file(&source, "unitA/segmentation/frame/extra/deep.tif", b"deep");

    reconcile(&source, &dest, &default_targets())
        .await
        .expect("Should reconcile");

    assert_eq!(
        list_names(&dest.join("frame")),
        names(&["top.tif"])
    );
}

#[tokio::test]
async fn test_units_nested_at_any_depth_are_merged() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "batch/unitA/segmentation/frame/img1.tif", b"nested");
    write_file(&source, "batch/unitA/measurements/m.csv", b"x");
    // No unit component above the target: ignored
    write_file(&source, "measurements/top.csv", b"x");

    let result = reconcile(&source, &dest, &default_targets())
        .await
        .expect("Should reconcile");

    assert_eq!(fs::read(dest.join("frame/img1.tif")).unwrap(), b"nested");
    assert_eq!(result.target("measurements").unwrap().matched_dirs, 1);
    assert_eq!(list_names(&dest.join("measurements")), names(&["m.csv"]));
}

#[tokio::test]
async fn test_shallower_unit_wins_over_nested_duplicate() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "a/segmentation/frame/img1.tif", b"from a");
    write_file(&source, "a/deeper/segmentation/frame/img1.tif", b"from a/deeper");

    reconcile(&source, &dest, &default_targets())
        .await
        .expect("Should reconcile");

    // Depth-first, name-sorted: "a" is visited before "a/deeper"
    assert_eq!(fs::read(dest.join("frame/img1.tif")).unwrap(), b"from a");
}

#[tokio::test]
async fn test_custom_targets_named_by_final_segment() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "unitA/a/b/masks/m.png", b"x");
    let targets = parse_targets(&["a/b/masks"][..]).unwrap();

    reconcile(&source, &dest, &targets).await.expect("Should reconcile");

    assert!(dest.join("masks/m.png").is_file());
    assert_eq!(list_names(&dest).len(), 1);
}

// ============ Conflict Detection ============

#[tokio::test]
async fn test_conflicts_reported_but_not_resolved() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "unitA/measurements/data 1.csv", b"first");
    write_file(&source, "unitB/measurements/data_1.csv", b"second");
    write_file(&source, "unitC/measurements/data_1.csv", b"first");

    let options = ReconcileOptions {
        detect_conflicts: true,
    };
    let result = reconcile_with_options(&source, &dest, &default_targets(), &options)
        .await
        .expect("Should reconcile");

    let report = result.target("measurements").unwrap();
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(
        report.conflicts[0].source,
        source.join("unitB/measurements/data_1.csv")
    );
    assert_eq!(fs::read(dest.join("measurements/data_1.csv")).unwrap(), b"first");
}

#[tokio::test]
async fn test_conflicts_not_checked_by_default() {
    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "unitA/measurements/m.csv", b"first");
    write_file(&source, "unitB/measurements/m.csv", b"second");

    let result = reconcile(&source, &dest, &default_targets())
        .await
        .expect("Should reconcile");

    assert!(result.target("measurements").unwrap().conflicts.is_empty());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_non_utf8_names_keep_their_bytes() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::{OsStrExt, OsStringExt};

    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    let measurements_dir = source.join("unitA/measurements");
    fs::create_dir_all(&measurements_dir).unwrap();
    fs::write(measurements_dir.join(OsStr::from_bytes(b"a\xff.csv")), b"ff").unwrap();
    fs::write(measurements_dir.join(OsStr::from_bytes(b"a\xfe.csv")), b"fe").unwrap();
    fs::write(measurements_dir.join(OsStr::from_bytes(b"b \xff.csv")), b"space").unwrap();

    let result = reconcile(&source, &dest, &default_targets())
        .await
        .expect("Should reconcile");

    let report = result.target("measurements").unwrap();
    assert_eq!(report.copied.len(), 3);
    assert!(report.skipped.is_empty());

    let mut dest_names: Vec<Vec<u8>> = fs::read_dir(dest.join("measurements"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_vec())
        .collect();
    dest_names.sort();
    assert_eq!(
        dest_names,
        vec![
            b"a\xfe.csv".to_vec(),
            b"a\xff.csv".to_vec(),
            b"b_\xff.csv".to_vec()
        ]
    );
}

// ============ Error Tests ============

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_source_file_aborts() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = create_test_dir();
    let source = temp_dir.path().join("scratch");
    let dest = temp_dir.path().join("dest");
    write_file(&source, "unitA/segmentation/frame/locked.tif", b"x");
    let locked = source.join("unitA/segmentation/frame/locked.tif");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root can read anything; nothing to assert in that case
    if fs::read(&locked).is_ok() {
        return;
    }

    let result = reconcile(&source, &dest, &default_targets()).await;
    assert!(matches!(result, Err(ReconcileError::CopyFailed { .. })));
}
