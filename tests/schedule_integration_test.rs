//! Integration tests for scheduling, from a query document to a decoded
//! response stream

use fragcube::envelope::{read_part, unpack_envelope};
use fragcube::partition::task_count;
use fragcube::{
    mkschedule, CubeError, CurtainTask, FragmentId, Function, Manifest, ProcessHeader, Request,
    Scheduler, SchedulerConfig, SliceTask,
};
use serde_json::json;
use std::collections::BTreeSet;

/// A 6 x 5 x 4 cube in 2 x 2 x 2 fragments, with partial fragments along y
fn manifest() -> Manifest {
    serde_json::from_value(json!({
        "format-version": 1,
        "data": [
            { "prefix": "src", "file-extension": "f32", "shapes": [[2, 2, 2]] }
        ],
        "attributes": [
            {
                "type": "cdpx", "prefix": "attributes/cdpx", "file-extension": "f32",
                "layout": "tiled", "labels": ["CDP X"], "shapes": [[4, 4, 1]]
            },
            {
                "type": "cdpy", "prefix": "attributes/cdpy", "file-extension": "f32",
                "layout": "tiled", "labels": ["CDP Y"], "shapes": [[4, 4, 1]]
            }
        ],
        "line-numbers": [
            [100, 101, 102, 103, 104, 105],
            [200, 201, 202, 203, 204],
            [0, 4, 8, 12]
        ],
        "line-labels": ["inline", "crossline", "depth"]
    }))
    .expect("Failed to parse manifest")
}

#[test]
fn test_slice_stream_is_one_message() {
    let doc = Request::slice(manifest(), 1, 4)
        .with_pid("slice-pid")
        .with_attributes(["cdp"])
        .to_document()
        .unwrap();

    let stream = Scheduler::new(SchedulerConfig::new().with_task_size(2))
        .unwrap()
        .schedule(&doc)
        .unwrap()
        .into_stream();

    // buffered: the whole response decodes as [header, [tasks...]]
    let (head, tasks): (ProcessHeader, Vec<SliceTask>) = rmp_serde::from_slice(&stream).unwrap();
    assert_eq!(head.pid, "slice-pid");
    assert_eq!(head.function, Function::Slice);
    assert_eq!(head.nbundles, tasks.len());
    assert_eq!(head.attributes, vec!["data", "cdpx", "cdpy"]);
    assert_eq!(head.index_sizes(), &[6, 1, 4]);

    // incremental: the same header and tasks, one at a time
    let mut reader = stream.as_slice();
    let (streamed_head, n) = unpack_envelope(&mut reader).unwrap();
    assert_eq!(streamed_head, head);
    assert_eq!(n, tasks.len());
    for task in &tasks {
        let streamed: SliceTask = read_part(&mut reader).unwrap();
        assert_eq!(&streamed, task);
    }
    assert!(reader.is_empty());
}

#[test]
fn test_slice_covers_the_plane() {
    let doc = Request::slice(manifest(), 1, 4).to_document().unwrap();
    let sched = mkschedule(&doc, 4).unwrap();

    // y = 4 lives in the partial fragment row 2: 3 x 1 x 2 fragments
    assert_eq!(sched.count(), task_count(6, 4).unwrap());

    let ids: Vec<FragmentId> = sched
        .iter()
        .flat_map(|block| rmp_serde::from_slice::<SliceTask>(block).unwrap().ids)
        .collect();
    assert_eq!(ids.len(), 6);
    assert!(ids.iter().all(|id| id.y() == 2));
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_task_blocks_respect_task_size() {
    let doc = Request::slice(manifest(), 2, 0)
        .with_attributes(["cdpx"])
        .to_document()
        .unwrap();

    for task_size in 1..8 {
        let sched = mkschedule(&doc, task_size).unwrap();
        let mut per_attribute = std::collections::BTreeMap::<String, usize>::new();
        for block in sched.iter() {
            let task: SliceTask = rmp_serde::from_slice(block).unwrap();
            assert!(!task.ids.is_empty());
            assert!(task.ids.len() <= task_size);
            *per_attribute.entry(task.base.attribute).or_default() += task.ids.len();
        }
        // 3 x 3 data fragments, 2 x 2 attribute fragments
        assert_eq!(per_attribute["data"], 9);
        assert_eq!(per_attribute["cdpx"], 4);
    }
}

#[test]
fn test_curtain_end_to_end() {
    let pairs = [(0, 0), (1, 1), (5, 4), (0, 1), (3, 2)];
    let doc = Request::curtain(manifest(), &pairs)
        .with_pid("curtain-pid")
        .with_attributes(["cdpx"])
        .to_document()
        .unwrap();

    let stream = mkschedule(&doc, 100).unwrap().into_stream();
    let mut reader = stream.as_slice();
    let (head, n) = unpack_envelope(&mut reader).unwrap();

    assert_eq!(head.function, Function::Curtain);
    assert_eq!(head.index_sizes(), &[5, 5, 4]);
    assert_eq!(head.shape_of("data"), Some(&[5, 4][..]));
    assert_eq!(head.shape_of("cdpx"), Some(&[5][..]));
    assert_eq!(n, 2);

    let data: CurtainTask = read_part(&mut reader).unwrap();
    assert_eq!(data.base.attribute, "data");

    // every point is extracted from every fragment in its column
    let columns: BTreeSet<(usize, usize)> = data.ids.iter().map(|s| (s.id.x(), s.id.y())).collect();
    assert_eq!(columns, BTreeSet::from([(0, 0), (1, 1), (2, 2)]));
    for single in &data.ids {
        let traces = pairs
            .iter()
            .filter(|(x, y)| x / 2 == single.id.x() && y / 2 == single.id.y())
            .count();
        assert_eq!(single.coordinates.len(), traces);
    }
    let zs: BTreeSet<usize> = data.ids.iter().map(|s| s.id.z()).collect();
    assert_eq!(zs, BTreeSet::from([0, 1]));

    let cdpx: CurtainTask = read_part(&mut reader).unwrap();
    assert_eq!(cdpx.base.attribute, "cdpx");
    assert!(cdpx.ids.iter().all(|s| s.id.z() == 0));
    let traces: usize = cdpx.ids.iter().map(|s| s.coordinates.len()).sum();
    assert_eq!(traces, pairs.len());
    assert!(reader.is_empty());
}

#[test]
fn test_request_errors_are_classified() {
    let out_of_range = Request::slice(manifest(), 0, 6).to_document().unwrap();
    let err = mkschedule(&out_of_range, 10).unwrap_err();
    assert!(matches!(err, CubeError::OutOfRange(_)));
    assert!(err.is_client_error());

    let bad_axis = Request::slice(manifest(), 3, 0).to_document().unwrap();
    assert!(mkschedule(&bad_axis, 10).unwrap_err().is_client_error());

    let mut ragged: serde_json::Value =
        serde_json::from_slice(&Request::curtain(manifest(), &[(0, 0)]).to_document().unwrap())
            .unwrap();
    ragged["dim1s"] = json!([0, 1]);
    let err = mkschedule(&serde_json::to_vec(&ragged).unwrap(), 10).unwrap_err();
    assert!(matches!(err, CubeError::InvalidDocument(_)));
    assert!(err.is_client_error());
}

#[test]
fn test_empty_curtain() {
    let doc = Request::curtain(manifest(), &[]).to_document().unwrap();
    let stream = mkschedule(&doc, 10).unwrap().into_stream();
    let (head, n) = unpack_envelope(&mut stream.as_slice()).unwrap();
    assert_eq!(n, 0);
    assert_eq!(head.nbundles, 0);
    assert_eq!(head.index_sizes(), &[0, 0, 4]);
}
