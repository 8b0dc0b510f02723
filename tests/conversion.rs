//! End-to-end conversions of in-memory scenes.

use std::path::Path;
use std::sync::Arc;

use abc2jsx::archive::{Animated, MemoryArchive, MemoryArchiveBuilder};
use abc2jsx::config::ConverterConfig;
use abc2jsx::convert::{
    build_outputs, CancellationToken, Channel, ConversionReport, ConvertOptions, Converter, Outcome, PropertySampler,
    RunContext, SceneWalker, TimeGrid, Value,
};
use abc2jsx::geom::{CameraSample, XformSample, CAMERA_SCHEMA};
use abc2jsx::util::{DVec3, Error};

fn convert(archive: &MemoryArchive, dir: &Path, options: &ConvertOptions) -> (Outcome, String) {
    convert_with(&Converter::default(), archive, dir, options)
}

fn convert_with(converter: &Converter, archive: &MemoryArchive, dir: &Path, options: &ConvertOptions) -> (Outcome, String) {
    let output = dir.join("out.jsx");
    let outcome = converter.convert_archive(archive, &output, options);
    let script = std::fs::read_to_string(&output).unwrap_or_default();
    (outcome, script)
}

fn success(outcome: Outcome) -> ConversionReport {
    match outcome {
        Outcome::Success(report) => report,
        other => panic!("expected success, got {:?}", other),
    }
}

fn lines_with<'a>(script: &'a str, needle: &str) -> Vec<&'a str> {
    script.lines().filter(|l| l.contains(needle)).collect()
}

/// Value text of a keyframe directive: everything after the frame argument.
fn directive_value(line: &str) -> &str {
    let args = line.trim().trim_end_matches(");");
    args.splitn(4, ", ").nth(3).unwrap()
}

fn spinning_scene() -> MemoryArchive {
    let mut b = MemoryArchiveBuilder::new("spin.abc");
    b.frame_range(0, 39, 24.0);
    b.add_locator(
        b.top(),
        "spinner",
        Animated::from_fn(|t| XformSample::from_trs(DVec3::ZERO, DVec3::new(0.0, t * 24.0 * 10.0, 0.0), DVec3::ONE)),
    );
    b.build()
}

#[test]
fn static_transform_keeps_two_equal_keys() {
    let mut b = MemoryArchiveBuilder::new("static.abc");
    b.frame_range(1, 24, 24.0);
    b.add_locator(
        b.top(),
        "marker",
        XformSample::from_trs(DVec3::new(1.0, 2.0, 3.0), DVec3::new(10.0, 20.0, 30.0), DVec3::splat(2.0)),
    );
    let dir = tempfile::tempdir().unwrap();
    let (outcome, script) = convert(&b.build(), dir.path(), &ConvertOptions::default());
    let report = success(outcome);
    assert_eq!(report.layers, 1);

    for channel in ["Position", "Scale", "X Rotation", "Y Rotation", "Z Rotation"] {
        let keys = lines_with(&script, &format!("abcKey(layer, \"{}\"", channel));
        assert_eq!(keys.len(), 2, "{}", channel);
        assert!(keys[0].contains("\", 1, "), "{}", keys[0]);
        assert!(keys[1].contains("\", 24, "), "{}", keys[1]);
        assert_eq!(directive_value(keys[0]), directive_value(keys[1]));
    }
    assert!(script.contains("abcKey(layer, \"Scale\", 1, [200.000000, 200.000000, 200.000000]);"));
}

#[test]
fn continuous_rotation_has_no_flips() {
    let archive = spinning_scene();
    let config = ConverterConfig::default();
    let ctx = RunContext::detached();
    let graph = SceneWalker::new(&archive, 0.0).walk(&ctx).unwrap();
    let grid = TimeGrid::new(0, 39, 24.0).unwrap();
    let tracks = PropertySampler::new(&archive, &graph, grid, &config).sample(&ctx).unwrap().tracks;
    let outputs = build_outputs(&graph, &tracks, &config);

    let rotation = outputs[0].property(Channel::YRotation).unwrap();
    assert_eq!(rotation.keyframes.len(), 40);
    for pair in rotation.keyframes.windows(2) {
        let (Value::Scalar(a), Value::Scalar(b)) = (pair[0].value, pair[1].value) else {
            panic!("rotation keys are scalars");
        };
        let delta = (b - a).abs() / (pair[1].frame - pair[0].frame) as f64;
        assert!(delta <= 10.0 + 1e-6, "frames {} -> {}: {} -> {}", pair[0].frame, pair[1].frame, a, b);
    }
    for channel in [Channel::XRotation, Channel::ZRotation] {
        assert_eq!(outputs[0].property(channel).unwrap().keyframes.len(), 2);
    }
}

#[test]
fn rotation_through_gimbal_lock_stays_continuous() {
    // Y reaches 630 degrees (-90, locked) at frame 90 while X and Z keep turning.
    let rates = DVec3::new(15.0, 7.0, 11.0);
    let mut b = MemoryArchiveBuilder::new("tumble.abc");
    b.frame_range(0, 99, 24.0);
    b.add_xform(
        b.top(),
        "tumbler",
        Animated::from_fn(move |t| XformSample::from_trs(DVec3::ZERO, rates * (t * 24.0), DVec3::ONE)),
    );
    let archive = b.build();
    let config = ConverterConfig::default();
    let ctx = RunContext::detached();
    let graph = SceneWalker::new(&archive, 0.0).walk(&ctx).unwrap();
    let grid = TimeGrid::new(0, 99, 24.0).unwrap();
    let tracks = PropertySampler::new(&archive, &graph, grid, &config).sample(&ctx).unwrap().tracks;

    let rotation = &tracks[0].rotation;
    assert_eq!(rotation.len(), 100);
    for (frame, pair) in rotation.windows(2).enumerate() {
        let delta = (pair[1] - pair[0]).abs();
        assert!(
            delta.cmple(rates + DVec3::splat(1e-6)).all(),
            "frames {} -> {}: {:?} -> {:?}",
            frame,
            frame + 1,
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn object_failing_mid_range_is_skipped() {
    let mut b = MemoryArchiveBuilder::new("flaky.abc");
    b.frame_range(0, 9, 24.0);
    b.add_xform(
        b.top(),
        "flaky",
        Animated::try_from_fn(|t| {
            if t > 0.1 {
                Err(Error::schema("/flaky", "sample missing"))
            } else {
                Ok(XformSample::identity())
            }
        }),
    );
    b.add_locator(b.top(), "steady", XformSample::identity());
    let dir = tempfile::tempdir().unwrap();
    let (outcome, script) = convert(&b.build(), dir.path(), &ConvertOptions::default());
    let report = success(outcome);

    assert_eq!(report.layers, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name, "/flaky");
    assert!(report.skipped[0].reason.starts_with("frame 3: "), "{}", report.skipped[0].reason);
    assert!(script.contains("layer = abcNull(comp, \"steady\");"));
    assert!(!script.contains("abcNull(comp, \"flaky\")"));
}

#[test]
fn keyframe_frames_strictly_increase() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ConverterConfig::default();
    config.keep_hold_ends = true;
    let converter = Converter::new(config.clone());
    let (outcome, _) = convert_with(&converter, &spinning_scene(), dir.path(), &ConvertOptions::default());
    success(outcome);

    let archive = spinning_scene();
    let ctx = RunContext::detached();
    let graph = SceneWalker::new(&archive, 0.0).walk(&ctx).unwrap();
    let grid = TimeGrid::new(0, 39, 24.0).unwrap();
    let tracks = PropertySampler::new(&archive, &graph, grid, &config).sample(&ctx).unwrap().tracks;
    for object in build_outputs(&graph, &tracks, &config) {
        for property in &object.properties {
            assert!(
                property.keyframes.windows(2).all(|w| w[0].frame < w[1].frame),
                "{:?}",
                property.channel
            );
        }
    }
}

#[test]
fn duplicate_names_are_suffixed_in_traversal_order() {
    let mut b = MemoryArchiveBuilder::new("dupes.abc");
    let left = b.add_group(b.top(), "left");
    let right = b.add_group(b.top(), "right");
    b.add_xform(left, "null", XformSample::identity());
    b.add_xform(right, "null", XformSample::identity());
    let dir = tempfile::tempdir().unwrap();
    let (outcome, script) = convert(&b.build(), dir.path(), &ConvertOptions::default());
    assert_eq!(success(outcome).layers, 2);

    let first = script.find("layer = abcNull(comp, \"null\");").unwrap();
    let second = script.find("layer = abcNull(comp, \"null_2\");").unwrap();
    assert!(first < second);
}

#[test]
fn cancel_mid_run_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    let options = ConvertOptions {
        cancel: token,
        progress: Some(Arc::new(move |_: f64, status: &str| {
            if status == "frame 10" {
                trigger.cancel();
            }
        })),
        ..ConvertOptions::default()
    };
    let (outcome, _) = convert(&spinning_scene(), dir.path(), &options);
    assert!(matches!(outcome, Outcome::Cancelled));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn static_camera_scene() {
    let mut b = MemoryArchiveBuilder::new("camera.abc");
    b.frame_range(0, 19, 24.0);
    b.add_camera(b.top(), "cam", CameraSample::with_focal_length(35.0));
    let dir = tempfile::tempdir().unwrap();
    let (outcome, script) = convert(&b.build(), dir.path(), &ConvertOptions::default());
    let report = success(outcome);
    assert_eq!(report.grid.frame_count(), 20);

    let comps = lines_with(&script, "= abcComp(");
    assert_eq!(comps.len(), 1);
    assert!(comps[0].contains(", 20, 24, "), "{}", comps[0]);
    assert_eq!(lines_with(&script, "= abcCamera(").len(), 1);
    assert!(lines_with(&script, "= abcNull(").is_empty());

    let focal = lines_with(&script, "abcLens(layer, \"Focal Length\"");
    assert_eq!(focal.len(), 2);
    assert!(focal.iter().all(|l| directive_value(l) == "35.000000"));
    assert!(lines_with(&script, "abcKey(layer, \"Scale\"").is_empty());
}

#[test]
fn unreadable_objects_are_reported() {
    let mut b = MemoryArchiveBuilder::new("broken.abc");
    b.frame_range(0, 4, 24.0);
    b.add_broken(b.top(), "badCam", CAMERA_SCHEMA, "missing .camera");
    b.add_unsupported(b.top(), "mesh", "AbcGeom_PolyMesh_v1");
    b.add_locator(b.top(), "ok", XformSample::identity());
    let dir = tempfile::tempdir().unwrap();
    let (outcome, script) = convert(&b.build(), dir.path(), &ConvertOptions::default());
    let report = success(outcome);

    assert_eq!(report.layers, 1);
    let names: Vec<_> = report.skipped.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["/badCam", "/mesh"]);
    assert!(report.skipped[0].reason.contains("missing .camera"));
    assert!(script.contains("layer = abcNull(comp, \"ok\");"));
}

#[test]
fn overrides_rederive_the_grid() {
    let dir = tempfile::tempdir().unwrap();
    let options = ConvertOptions {
        frame_rate: Some(12.0),
        composition_name: Some("Shot 010".to_string()),
        ..ConvertOptions::default()
    };
    let (outcome, script) = convert(&spinning_scene(), dir.path(), &options);
    let report = success(outcome);
    assert_eq!((report.grid.start_frame, report.grid.end_frame), (0, 20));
    assert!(script.contains("var comp = abcComp(\"Shot 010\", 1920, 1080, 1, 21, 12, 0);"));

    let options = ConvertOptions {
        duration: Some(10),
        ..ConvertOptions::default()
    };
    let (outcome, script) = convert(&spinning_scene(), dir.path(), &options);
    assert_eq!(success(outcome).grid.end_frame, 9);
    assert!(script.contains("var comp = abcComp(\"spin\", 1920, 1080, 1, 10, 24, 0);"));
}

#[test]
fn invalid_overrides_are_format_errors() {
    let dir = tempfile::tempdir().unwrap();
    for options in [
        ConvertOptions {
            frame_rate: Some(0.0),
            ..ConvertOptions::default()
        },
        ConvertOptions {
            duration: Some(0),
            ..ConvertOptions::default()
        },
    ] {
        let (outcome, _) = convert(&spinning_scene(), dir.path(), &options);
        assert!(matches!(outcome, Outcome::FormatError(_)), "{:?}", outcome);
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn missing_input_and_unwritable_output() {
    let dir = tempfile::tempdir().unwrap();
    let converter = Converter::default();

    let outcome = converter.convert(
        &dir.path().join("missing.abc"),
        &dir.path().join("out.jsx"),
        &ConvertOptions::default(),
    );
    assert!(matches!(outcome, Outcome::InputNotFound(_)));

    let outcome = converter.convert_archive(
        &spinning_scene(),
        &dir.path().join("no_such_dir").join("out.jsx"),
        &ConvertOptions::default(),
    );
    assert!(matches!(outcome, Outcome::WriteError(_)));
}

#[test]
fn parallel_sampling_writes_the_same_script() {
    let mut b = MemoryArchiveBuilder::new("many.abc");
    b.frame_range(0, 12, 24.0);
    for i in 0..8 {
        let parent = b.add_xform(
            b.top(),
            &format!("rig{}", i),
            Animated::from_fn(move |t| XformSample::from_trs(DVec3::new(i as f64, t, 0.0), DVec3::new(t * 90.0, 0.0, 0.0), DVec3::ONE)),
        );
        b.add_locator(parent, "tip", XformSample::from_trs(DVec3::X, DVec3::ZERO, DVec3::ONE));
    }
    let archive = b.build();

    let dir = tempfile::tempdir().unwrap();
    let (outcome, sequential) = convert(&archive, dir.path(), &ConvertOptions::default());
    success(outcome);

    let mut config = ConverterConfig::default();
    config.parallel = true;
    config.threads = 4;
    let (outcome, parallel) = convert_with(&Converter::new(config), &archive, dir.path(), &ConvertOptions::default());
    success(outcome);
    assert_eq!(sequential, parallel);
}
