//! Chain editing while a session streams

use crate::helpers::*;
use rackd::prelude::*;
use rackd::{HostError, LoadStage};

fn first_peak(block: &AudioBuffer32) -> Option<usize> {
    block
        .channel(0)
        .iter()
        .position(|s| s.abs() > tolerances::SILENCE_THRESHOLD)
}

#[test]
fn test_add_plugin_while_streaming_updates_latency() {
    let delay = TestPluginSpec::new("Delay").delay(16);
    let server = test_server(&[delay.clone()]);
    let (worker, client) = start_session(&server, stereo_session(), &[]);

    let before = client
        .process(AudioBlock::from_f32(impulse(2, TEST_BLOCK_SIZE)), TIMEOUT)
        .unwrap();
    assert_eq!(before.latency_samples, 0);

    assert_eq!(worker.add_plugin(&delay.id()).unwrap(), 0);
    let after = client
        .process(AudioBlock::from_f32(impulse(2, TEST_BLOCK_SIZE)), TIMEOUT)
        .unwrap();
    assert_eq!(after.latency_samples, 16);
    assert_eq!(first_peak(&after.block.audio_f32), Some(16));
}

#[test]
fn test_unknown_plugin_leaves_chain_unchanged() {
    let gain = TestPluginSpec::new("Gain");
    let server = test_server(&[gain.clone()]);
    let (worker, _client) = start_session(&server, stereo_session(), &[gain.id()]);

    let err = worker.add_plugin("VST3-Missing-1").unwrap_err();
    assert!(matches!(
        err,
        HostError::LoadFailed {
            stage: LoadStage::Resolving,
            ..
        }
    ));
    assert_eq!(worker.num_plugins(), 1);
    assert_eq!(server.loaded_plugins(), 1);
}

#[test]
fn test_legacy_and_path_ids_load() {
    let gain = TestPluginSpec::new("Gain");
    let server = test_server(&[gain.clone()]);
    let (worker, _client) = start_session(&server, stereo_session(), &[]);

    worker.add_plugin("VST3-Gain-c0ffee-2a").unwrap();
    worker.add_plugin("/plugins/Gain.vst3").unwrap();
    assert_eq!(worker.num_plugins(), 2);
    assert_eq!(worker.describe_chain(), "Gain > Gain");
}

#[test]
fn test_bypass_keeps_latency_alignment() {
    let delay = TestPluginSpec::new("Delay").delay(4).gain(0.5);
    let server = test_server(&[delay.clone()]);
    let (worker, client) = start_session(&server, stereo_session(), &[delay.id()]);

    assert!(worker.set_bypass(0, true));
    assert_eq!(worker.describe_chain(), "<bypassed>");

    let processed = client
        .process(AudioBlock::from_f32(impulse(2, TEST_BLOCK_SIZE)), TIMEOUT)
        .unwrap();
    assert_eq!(processed.latency_samples, 4);
    // Delayed but not attenuated
    assert_eq!(first_peak(&processed.block.audio_f32), Some(4));
    assert_eq!(processed.block.audio_f32.channel(0)[4], 1.0);

    assert!(worker.set_bypass(0, false));
    assert!(!worker.set_bypass(3, true));
    assert_eq!(worker.describe_chain(), "Delay");
}

#[test]
fn test_reorder_and_delete() {
    let a = TestPluginSpec::new("Comp");
    let b = TestPluginSpec::new("EQ");
    let c = TestPluginSpec::new("Limiter");
    let server = test_server(&[a.clone(), b.clone(), c.clone()]);
    let (worker, client) = start_session(&server, stereo_session(), &[a.id(), b.id(), c.id()]);
    assert_eq!(worker.describe_chain(), "Comp > EQ > Limiter");

    assert!(worker.exchange_plugins(0, 2));
    assert_eq!(worker.describe_chain(), "Limiter > EQ > Comp");
    assert!(!worker.exchange_plugins(0, 7));

    assert!(worker.del_plugin(1));
    assert_eq!(worker.describe_chain(), "Limiter > Comp");
    assert_eq!(server.loaded_plugins(), 2);

    client
        .process(AudioBlock::from_f32(constant(2, TEST_BLOCK_SIZE, 0.1)), TIMEOUT)
        .unwrap();
}

#[test]
fn test_parameter_values() {
    let gain = TestPluginSpec::new("Gain");
    let server = test_server(&[gain.clone()]);
    let (worker, _client) = start_session(&server, stereo_session(), &[gain.id()]);

    assert_eq!(worker.get_parameter_value(0, 1), 0.5);
    assert_eq!(worker.get_parameter_value(0, 9), 0.0);
    assert_eq!(worker.get_parameter_value(4, 0), 0.0);
}
