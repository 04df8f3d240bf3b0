//! Channel routing: active channel masks, extra channels, precision

use crate::helpers::*;
use rackd::prelude::*;
use rackd::ActiveChannels;
use std::sync::atomic::Ordering;

#[test]
fn test_partial_wire_is_mapped_to_processing_positions() {
    let spec = TestPluginSpec::new("Half").gain(0.5);
    let stats = Arc::clone(&spec.stats);
    let server = test_server(&[spec.clone()]);

    // Only the right channel travels over the wire
    let mut active = ActiveChannels::new(0, true, 2, 2);
    active.set_input_active(1, true);
    active.set_output_active(1, true);
    let config = stereo_session().active_channels(active.mask());
    let (_worker, client) = start_session(&server, config, &[spec.id()]);

    let processed = client
        .process(AudioBlock::from_f32(constant(1, TEST_BLOCK_SIZE, 0.6)), TIMEOUT)
        .unwrap();
    assert_eq!(stats.last_channels.load(Ordering::SeqCst), 2);
    assert_eq!(processed.block.num_channels(), 1);
    for s in processed.block.audio_f32.channel(0) {
        assert!((s - 0.3).abs() < tolerances::FLOAT_EPSILON);
    }
}

#[test]
fn test_output_only_session_processes_silence() {
    let spec = TestPluginSpec::new("Instrument");
    let server = test_server(&[spec.clone()]);

    let mut active = ActiveChannels::new(0, true, 2, 2);
    active.set_output_active(0, true);
    let config = stereo_session().active_channels(active.mask());
    let (_worker, client) = start_session(&server, config, &[spec.id()]);

    let processed = client
        .process(AudioBlock::from_f32(constant(1, TEST_BLOCK_SIZE, 0.7)), TIMEOUT)
        .unwrap();
    assert!(processed.block.audio_f32.is_silent());
}

#[test]
fn test_extra_channels_widen_processing_buffer() {
    let wide = BusesLayout {
        inputs: vec![ChannelSet::Discrete(4)],
        outputs: vec![ChannelSet::Stereo],
    };
    let spec = TestPluginSpec::new("Wide").fixed_layout(wide);
    let stats = Arc::clone(&spec.stats);
    let server = test_server(&[spec.clone()]);
    let (worker, client) = start_session(&server, stereo_session(), &[spec.id()]);
    assert_eq!(worker.chain().unwrap().extra_channels(), 2);

    let input = constant(2, TEST_BLOCK_SIZE, 0.25);
    let processed = client
        .process(AudioBlock::from_f32(input.clone()), TIMEOUT)
        .unwrap();
    assert!(stats.last_channels.load(Ordering::SeqCst) >= 4);
    assert_eq!(processed.block.audio_f32, input);
}

#[test]
fn test_sidechain_session_in_place() {
    let spec = TestPluginSpec::new("Ducker").gain(0.5);
    let stats = Arc::clone(&spec.stats);
    let server = test_server(&[spec.clone()]);
    let config = SessionConfig::new(ChannelTopology::new(2, 2, 2), TEST_SAMPLE_RATE, TEST_BLOCK_SIZE);
    let (_worker, client) = start_session(&server, config, &[spec.id()]);

    let processed = client
        .process(AudioBlock::from_f32(constant(4, TEST_BLOCK_SIZE, 1.0)), TIMEOUT)
        .unwrap();
    assert_eq!(stats.last_channels.load(Ordering::SeqCst), 4);
    assert_eq!(processed.block.audio_f32.channel(0)[0], 0.5);
    assert_eq!(processed.block.audio_f32.channel(1)[0], 0.5);
}

#[test]
fn test_double_block_through_single_precision_chain() {
    let spec = TestPluginSpec::new("Vintage").single_precision().gain(2.0);
    let stats = Arc::clone(&spec.stats);
    let server = test_server(&[spec.clone()]);
    let config = stereo_session().double_precision(true);
    let (worker, client) = start_session(&server, config, &[spec.id()]);
    assert!(!worker.chain().unwrap().is_using_double_precision());

    let input = AudioBuffer64::from_channels(vec![vec![0.125; TEST_BLOCK_SIZE]; 2]);
    let processed = client.process(AudioBlock::from_f64(input), TIMEOUT).unwrap();
    assert!(processed.block.is_double());
    assert_eq!(processed.block.audio_f64.channel(0), &[0.25; TEST_BLOCK_SIZE][..]);
    assert_eq!(stats.f64_blocks.load(Ordering::SeqCst), 0);
}

#[test]
fn test_double_block_through_double_chain() {
    let spec = TestPluginSpec::new("Modern");
    let stats = Arc::clone(&spec.stats);
    let server = test_server(&[spec.clone()]);
    let config = stereo_session().double_precision(true);
    let (worker, client) = start_session(&server, config, &[spec.id()]);
    assert!(worker.chain().unwrap().is_using_double_precision());

    let before = stats.f64_blocks.load(Ordering::SeqCst);
    let input = AudioBuffer64::from_channels(vec![vec![0.1; TEST_BLOCK_SIZE]; 2]);
    let processed = client
        .process(AudioBlock::from_f64(input.clone()), TIMEOUT)
        .unwrap();
    assert_eq!(processed.block.audio_f64, input);
    assert_eq!(stats.f64_blocks.load(Ordering::SeqCst), before + 1);
}

#[test]
fn test_mixed_precision_chain_falls_back_to_single() {
    let modern = TestPluginSpec::new("Modern");
    let vintage = TestPluginSpec::new("Vintage").single_precision();
    let server = test_server(&[modern.clone(), vintage.clone()]);
    let config = stereo_session().double_precision(true);
    let (worker, _client) = start_session(&server, config, &[modern.id()]);
    assert!(worker.chain().unwrap().is_using_double_precision());

    worker.add_plugin(&vintage.id()).unwrap();
    assert!(!worker.chain().unwrap().is_using_double_precision());

    worker.del_plugin(1);
    assert!(worker.chain().unwrap().is_using_double_precision());
}
