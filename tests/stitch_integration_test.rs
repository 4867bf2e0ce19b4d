//! Integration tests for the stitcher and the fragment stores, against
//! fragment files on local disk

use fragcube::store::create_storage;
use fragcube::task::TaskBase;
use fragcube::utils::fragment_path;
use fragcube::{
    CubeError, FragmentId, FragmentStore, Function, Gvt, ManifestStore, StitchConfig,
    StitchManifest, Stitcher,
};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

const MANIFEST: &str = r#"{
    "basename": "horizon",
    "fragment-xs": 3, "fragment-ys": 3, "fragment-zs": 4,
    "cube-xs": 7, "cube-ys": 5, "cube-zs": 6
}"#;

/// Write every fragment file of the cube, each cell holding its global
/// offset
fn write_cube(dir: &Path) -> Gvt {
    std::fs::write(dir.join("manifest.json"), MANIFEST).unwrap();
    let manifest = StitchManifest::from_json(MANIFEST.as_bytes()).unwrap();
    let gvt = manifest.gvt().unwrap();

    let [cx, cy, cz] = gvt.fragment_counts();
    for x in 0..cx {
        for y in 0..cy {
            for z in 0..cz {
                let id = FragmentId::new(x, y, z);
                let bytes: Vec<u8> = (0..gvt.fragment_shape().total_cells())
                    .flat_map(|off| {
                        let v = gvt.local_to_global(off, id).map_or(f32::NAN, |g| g as f32);
                        v.to_le_bytes()
                    })
                    .collect();
                std::fs::write(dir.join(fragment_path(&manifest.basename, id)), bytes).unwrap();
            }
        }
    }
    gvt
}

/// A horizon through the whole cube
fn horizon() -> Vec<[i32; 3]> {
    let mut points = Vec::new();
    for x in 0..7 {
        for y in 0..5 {
            points.push([x, y, (x + y) % 6]);
        }
    }
    points
}

fn stitch_input(points: &[[i32; 3]]) -> Vec<u8> {
    let mut input = format!(r#"{{"size": {}, "survey": "test"}}"#, points.len()).into_bytes();
    for p in points {
        for v in p {
            input.extend(v.to_le_bytes());
        }
    }
    input
}

fn check_pairs(gvt: &Gvt, points: &[[i32; 3]], pairs: &[u8]) {
    assert_eq!(pairs.len(), points.len() * 12);

    let mut got: Vec<u64> = pairs
        .chunks_exact(12)
        .map(|chunk| {
            let offset = u64::from_le_bytes(chunk[..8].try_into().unwrap());
            let value = f32::from_le_bytes(chunk[8..].try_into().unwrap());
            assert_eq!(value, offset as f32);
            offset
        })
        .collect();
    got.sort_unstable();

    let [_, ny, nz] = *gvt.cube_shape().dims();
    let mut expected: Vec<u64> = points
        .iter()
        .map(|p| ((p[0] as usize * ny + p[1] as usize) * nz + p[2] as usize) as u64)
        .collect();
    expected.sort_unstable();
    assert_eq!(got, expected);
}

#[test]
fn test_stitch_horizon() {
    let dir = TempDir::new().unwrap();
    let gvt = write_cube(dir.path());

    let stitcher = Stitcher::open("manifest.json", StitchConfig::new(dir.path()).with_threads(4))
        .unwrap();
    let points = horizon();
    let mut out = Vec::new();
    stitcher
        .run(&mut stitch_input(&points).as_slice(), &mut out)
        .unwrap();

    let echo = br#"{"size":35,"survey":"test"}"#;
    assert!(out.starts_with(echo));
    check_pairs(&gvt, &points, &out[echo.len()..]);
}

#[test]
fn test_stitch_rejects_points_outside_cube() {
    let dir = TempDir::new().unwrap();
    write_cube(dir.path());

    let stitcher = Stitcher::open("manifest.json", StitchConfig::new(dir.path())).unwrap();
    let result = stitcher.run(
        &mut stitch_input(&[[0, 0, 0], [7, 0, 0]]).as_slice(),
        &mut Vec::<u8>::new(),
    );
    assert!(matches!(result, Err(CubeError::OutOfRange(_))));
}

#[test]
fn test_stitch_binary() {
    let dir = TempDir::new().unwrap();
    let gvt = write_cube(dir.path());
    let report = dir.path().join("time");
    let points = horizon();

    let mut child = Command::new(env!("CARGO_BIN_EXE_stitch"))
        .arg("manifest.json")
        .arg("--input-dir")
        .arg(dir.path())
        .arg("--time")
        .arg("--time-file")
        .arg(&report)
        .arg("--threads")
        .arg("2")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start stitch");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(&stitch_input(&points))
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "stitch failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let echo = br#"{"size":35,"survey":"test"}"#;
    assert!(output.stdout.starts_with(echo));
    check_pairs(&gvt, &points, &output.stdout[echo.len()..]);

    let text = std::fs::read_to_string(report).unwrap();
    assert!(text.contains("Fragment size: x: 3, y: 3, z: 4"));
}

#[test]
fn test_stitch_binary_missing_manifest() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_stitch"))
        .arg("manifest.json")
        .arg("-i")
        .arg(dir.path())
        .stdin(Stdio::null())
        .output()
        .expect("Failed to start stitch");

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_stitch_binary_short_input() {
    let dir = TempDir::new().unwrap();
    write_cube(dir.path());

    let mut child = Command::new(env!("CARGO_BIN_EXE_stitch"))
        .arg("manifest.json")
        .arg("-i")
        .arg(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start stitch");

    let mut input = br#"{"size": 1000000000000}"#.to_vec();
    input.extend([0u8; 12]);
    child.stdin.take().unwrap().write_all(&input).unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bytes of points"));
}

#[tokio::test]
async fn test_stores_on_local_disk() {
    let dir = TempDir::new().unwrap();
    let url = format!("file://{}", dir.path().display());
    let storage = create_storage(&url).unwrap();

    let manifests = ManifestStore::new(storage.clone());
    assert!(matches!(
        manifests.fetch("survey").await,
        Err(CubeError::NotFound(_))
    ));

    let manifest: fragcube::Manifest = serde_json::from_str(
        r#"{
            "format-version": 1,
            "data": [{ "prefix": "src", "file-extension": "f32", "shapes": [[2, 2, 2]] }],
            "line-numbers": [[1, 2], [1, 2, 3], [0, 4]],
            "line-labels": ["inline", "crossline", "time"]
        }"#,
    )
    .unwrap();
    manifests.put("survey", &manifest).await.unwrap();
    let manifest = manifests.fetch("survey").await.unwrap();

    let query = fragcube::query::QueryBase {
        pid: "pid".to_string(),
        token: String::new(),
        guid: "survey".to_string(),
        storage_endpoint: url.clone(),
        manifest,
        attributes: Vec::new(),
    };
    let task = TaskBase::data(&query, Function::Slice).unwrap();

    let ids = [FragmentId::new(0, 1, 0), FragmentId::new(0, 0, 0)];
    for id in ids {
        storage
            .write(
                &fragcube::utils::fragment_key(&task.prefix, &task.shape, &task.ext, id),
                &[id.y() as u8; 32],
            )
            .await
            .unwrap();
    }

    let fragments = FragmentStore::new(storage);
    let fetched = fragments.fetch_all(&task, &ids).await.unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].0, ids[0]);
    assert_eq!(fetched[0].1[0], 1);
    assert_eq!(fetched[1].1[0], 0);
}
