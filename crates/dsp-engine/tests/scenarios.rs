//! Literal pipeline-level scenarios, one test per scenario.

use approx::assert_relative_eq;
use dsp_engine::Pipeline;
use serde_json::json;

fn rt() -> tokio::runtime::Runtime {
    let _ = env_logger::try_init();
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

#[test]
fn s1_moving_average_window_3() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage("movingAverage", &json!({"mode": "moving", "windowSize": 3})).unwrap();
    let out = rt().block_on(pipeline.process(vec![1.0, 2.0, 3.0, 4.0, 5.0], 1)).unwrap().unwrap();
    assert_eq!(out, vec![1.0, 1.5, 2.0, 3.0, 4.0]);
}

#[test]
fn s2_moving_average_batch() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage("movingAverage", &json!({"mode": "batch"})).unwrap();
    let out = rt().block_on(pipeline.process(vec![10.0, 20.0, 30.0, 40.0, 50.0], 1)).unwrap().unwrap();
    assert_eq!(out, vec![30.0; 5]);
}

#[test]
fn s3_rectify_full() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage("rectify", &json!({"mode": "full"})).unwrap();
    let out = rt()
        .block_on(pipeline.process(vec![1.0, -2.0, 3.0, -4.0, 5.0, -6.0], 1))
        .unwrap()
        .unwrap();
    assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn s4_rectify_half() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage("rectify", &json!({"mode": "half"})).unwrap();
    let out = rt()
        .block_on(pipeline.process(vec![1.0, -2.0, 3.0, -4.0, 5.0, -6.0], 1))
        .unwrap()
        .unwrap();
    assert_eq!(out, vec![1.0, 0.0, 3.0, 0.0, 5.0, 0.0]);
}

#[test]
fn s5_rms_moving_window_3() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage("rms", &json!({"mode": "moving", "windowSize": 3})).unwrap();
    let out = rt().block_on(pipeline.process(vec![3.0, 4.0, 0.0], 1)).unwrap().unwrap();
    assert_relative_eq!(out[2], 2.886751, epsilon = 1e-5);
}

#[test]
fn s6_zscore_batch() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage("zScoreNormalize", &json!({"mode": "batch"})).unwrap();
    let out = rt().block_on(pipeline.process(vec![10.0, 20.0, 30.0, 40.0, 50.0], 1)).unwrap().unwrap();
    let expected = [-1.41421, -0.70711, 0.0, 0.70711, 1.41421];
    for (a, b) in out.iter().zip(expected.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-4);
    }
}

#[test]
fn s7_multi_channel_moving_average_window_3() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage("movingAverage", &json!({"mode": "moving", "windowSize": 3})).unwrap();
    let out = rt()
        .block_on(pipeline.process(vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0], 2))
        .unwrap()
        .unwrap();
    assert_eq!(out, vec![1.0, 10.0, 1.5, 15.0, 2.0, 20.0, 3.0, 30.0]);
}

#[test]
fn s8_save_restore_continuity() {
    let rt = rt();

    let mut reference = Pipeline::new();
    reference.add_stage("movingAverage", &json!({"mode": "moving", "windowSize": 5})).unwrap();
    rt.block_on(reference.process(vec![1.0, 2.0, 3.0, 4.0, 5.0], 1)).unwrap().unwrap();
    rt.block_on(reference.process(vec![6.0, 7.0, 8.0], 1)).unwrap().unwrap();
    let reference_tail = rt.block_on(reference.process(vec![9.0, 10.0, 11.0], 1)).unwrap().unwrap();

    let mut source = Pipeline::new();
    source.add_stage("movingAverage", &json!({"mode": "moving", "windowSize": 5})).unwrap();
    rt.block_on(source.process(vec![1.0, 2.0, 3.0, 4.0, 5.0], 1)).unwrap().unwrap();
    rt.block_on(source.process(vec![6.0, 7.0, 8.0], 1)).unwrap().unwrap();
    let saved = source.save_state();

    let mut restored = Pipeline::new();
    restored.add_stage("movingAverage", &json!({"mode": "moving", "windowSize": 5})).unwrap();
    restored.load_state(&saved).unwrap();
    let restored_tail = rt.block_on(restored.process(vec![9.0, 10.0, 11.0], 1)).unwrap().unwrap();

    assert_eq!(restored_tail, reference_tail);
}

#[test]
fn property_10_tampered_aggregate_is_rejected() {
    let mut source = Pipeline::new();
    source.add_stage("movingAverage", &json!({"mode": "moving", "windowSize": 3})).unwrap();
    let rt = rt();
    rt.block_on(source.process(vec![1.0, 2.0, 3.0], 1)).unwrap().unwrap();
    let mut doc = source.save_state();
    doc.stages[0].state["channels"][0]["runningSum"] = json!(9999.0);

    let mut target = Pipeline::new();
    target.add_stage("movingAverage", &json!({"mode": "moving", "windowSize": 3})).unwrap();
    let err = target.load_state(&doc).unwrap_err();
    assert!(matches!(err, dsp_core::DspError::State(dsp_core::StateError::AggregateChecksumFailed { .. })));
}

#[test]
fn mean_absolute_value_infers_window_size_from_process_options() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_stage("meanAbsoluteValue", &json!({"mode": "moving", "windowSize": 0}))
        .unwrap();
    let out = rt()
        .block_on(pipeline.process_with_rate(vec![1.0; 12], 1, Some(100.0)))
        .unwrap()
        .unwrap();
    assert_eq!(out.len(), 12);
    let summary = pipeline.list_state();
    assert_eq!(summary.stages[0].summary.window_size, Some(10));
}
