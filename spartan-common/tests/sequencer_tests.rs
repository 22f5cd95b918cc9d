// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the configuration sequencer against a simulated FPGA.

mod support;

use spartan_common::bitstream::{FramerError, PREAMBLE};
use spartan_common::poll::{CancelToken, PollBudget};
use spartan_common::sequencer::{
    ConfigError, ConfigStatus, Handshake, Sequencer, State, Timing,
};
use support::{container, header_len, payload, FakeDelay, FakeFpga};

fn sequencer(fpga: &FakeFpga) -> (Sequencer<FakeFpga, FakeDelay>, FakeDelay) {
    let delay = FakeDelay::default();
    (Sequencer::new(fpga.clone(), delay.clone()), delay)
}

fn minimal_container(data: &[u8]) -> Vec<u8> {
    let mut out = PREAMBLE.to_vec();
    out.push(b'e');
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

// =============================================================================
// reset
// =============================================================================

#[test]
fn test_reset_waits_for_init() {
    let fpga = FakeFpga::new(5, 1);
    let (mut seq, delay) = sequencer(&fpga);

    assert_eq!(seq.reset(), Ok(()));
    assert_eq!(fpga.state.borrow().program_pulses, 1);
    // Setup, pulse, then one 10 us interval per failed INIT sample.
    assert_eq!(delay.elapsed_us(), 1 + 1 + 5 * 10);
}

#[test]
fn test_reset_times_out_when_init_never_rises() {
    let fpga = FakeFpga::never_ready();
    let timing = Timing {
        init_poll: PollBudget::new(50, 10),
        ..Timing::default()
    };
    let delay = FakeDelay::default();
    let mut seq = Sequencer::with_timing(fpga.clone(), delay.clone(), timing);

    assert_eq!(
        seq.reset(),
        Err(ConfigError::HandshakeTimeout(Handshake::Init))
    );
    assert_eq!(delay.elapsed_us(), 1 + 1 + 50 * 10);
}

#[test]
fn test_reset_observes_cancel_token() {
    static CANCEL: CancelToken = CancelToken::new();
    CANCEL.cancel();

    let fpga = FakeFpga::never_ready();
    let (mut seq, _) = sequencer(&fpga);
    seq.set_cancel_token(&CANCEL);
    assert_eq!(seq.reset(), Err(ConfigError::Cancelled));
}

// =============================================================================
// write_block / finish_config
// =============================================================================

#[test]
fn test_write_block_strobes_each_byte() {
    let fpga = FakeFpga::new(0, 3);
    let (mut seq, _) = sequencer(&fpga);
    seq.prepare(3).unwrap();
    seq.write_block(&[0x11, 0x22, 0x33]);
    assert_eq!(fpga.received(), vec![0x11, 0x22, 0x33]);
}

#[test]
fn test_write_block_empty_is_noop() {
    let fpga = FakeFpga::new(0, 3);
    let (mut seq, _) = sequencer(&fpga);
    seq.prepare(3).unwrap();
    seq.write_block(&[]);
    assert!(fpga.received().is_empty());
    assert!(!fpga.state.borrow().clock_high);
}

#[test]
fn test_finish_config_runs_startup_clocks() {
    let fpga = FakeFpga::new(0, 2);
    let (mut seq, _) = sequencer(&fpga);
    seq.prepare(2).unwrap();
    assert_eq!(seq.feed_body(&[0xAA, 0x55]), 2);
    assert_eq!(seq.finish_config(), Ok(()));

    let state = fpga.state.borrow();
    assert_eq!(state.clocks_after_done, 8);
    assert!(!state.clock_output, "CCLK released after startup");
    assert!(!state.data_output, "data bus released after payload");
    drop(state);
    assert!(seq.configured());
    assert_eq!(seq.session().state, State::Standby);
}

#[test]
fn test_finish_config_times_out_without_done() {
    let fpga = FakeFpga::never_done();
    let timing = Timing {
        done_poll: PollBudget::new(100, 0),
        ..Timing::default()
    };
    let mut seq = Sequencer::with_timing(fpga.clone(), FakeDelay::default(), timing);
    seq.prepare(1).unwrap();
    seq.feed_body(&[0x00]);
    assert_eq!(
        seq.finish_config(),
        Err(ConfigError::HandshakeTimeout(Handshake::Done))
    );
    assert_eq!(fpga.state.borrow().idle_clocks, 100);
    assert!(!seq.configured());
}

#[test]
fn test_configured_before_any_attempt() {
    let fpga = FakeFpga::new(0, 1);
    let (mut seq, _) = sequencer(&fpga);
    assert!(!seq.configured());
    assert_eq!(seq.bitstream_left(), 0);
    assert_eq!(seq.bitstream_size(), 0);
}

// =============================================================================
// process
// =============================================================================

#[test]
fn test_process_without_start_is_ready() {
    let fpga = FakeFpga::new(0, 1);
    let (mut seq, _) = sequencer(&fpga);
    assert_eq!(seq.process(&[0x00, 0x09]), ConfigStatus::Ready);
}

#[test]
fn test_process_four_byte_payload() {
    let fpga = FakeFpga::new(2, 4);
    let (mut seq, _) = sequencer(&fpga);
    let image = minimal_container(&[0xAA, 0xBB, 0xCC, 0xDD]);

    seq.start();
    // Header only.
    assert_eq!(seq.process(&image[..18]), ConfigStatus::Ongoing);
    assert_eq!(seq.session().state, State::Body);
    assert_eq!(seq.bitstream_size(), 4);
    assert_eq!(seq.bitstream_left(), 4);

    assert_eq!(seq.process(&image[18..21]), ConfigStatus::Ongoing);
    assert_eq!(seq.bitstream_left(), 1);
    assert_eq!(seq.process(&image[21..]), ConfigStatus::Finishing);
    assert_eq!(seq.process(&[]), ConfigStatus::Success);

    assert_eq!(fpga.received(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
    assert!(seq.configured());
    assert_eq!(seq.process(&[]), ConfigStatus::Ready);
}

#[test]
fn test_process_header_and_body_in_one_chunk() {
    let data = payload(100);
    let fpga = FakeFpga::new(0, data.len());
    let (mut seq, _) = sequencer(&fpga);
    let image = container(&data);

    seq.start();
    assert_eq!(seq.process(&image), ConfigStatus::Finishing);
    assert_eq!(seq.process(&[]), ConfigStatus::Success);
    assert_eq!(fpga.received(), data);
}

#[test]
fn test_process_one_byte_at_a_time() {
    let data = payload(37);
    let fpga = FakeFpga::new(1, data.len());
    let (mut seq, _) = sequencer(&fpga);
    let image = container(&data);

    seq.start();
    let (last, head) = image.split_last().unwrap();
    for byte in head {
        assert_eq!(seq.process(std::slice::from_ref(byte)), ConfigStatus::Ongoing);
    }
    assert_eq!(seq.process(&[*last]), ConfigStatus::Finishing);
    assert_eq!(seq.process(&[]), ConfigStatus::Success);
    assert_eq!(fpga.received(), data);
}

#[test]
fn test_process_drops_bytes_past_payload() {
    let data = payload(16);
    let fpga = FakeFpga::new(0, data.len());
    let (mut seq, _) = sequencer(&fpga);
    let mut image = container(&data);
    image.extend_from_slice(&[0xEE; 20]);

    seq.start();
    assert_eq!(seq.process(&image), ConfigStatus::Finishing);
    assert_eq!(fpga.received(), data);
}

#[test]
fn test_short_payload_stays_in_body() {
    let data = payload(50);
    let fpga = FakeFpga::new(0, data.len());
    let (mut seq, _) = sequencer(&fpga);
    let image = container(&data);

    seq.start();
    assert_eq!(seq.process(&image[..image.len() - 1]), ConfigStatus::Ongoing);
    for _ in 0..10 {
        assert_eq!(seq.process(&[]), ConfigStatus::Ongoing);
    }
    assert_eq!(seq.session().state, State::Body);
    assert_eq!(seq.bitstream_left(), 1);
    assert!(!seq.configured());
    assert_eq!(fpga.state.borrow().idle_clocks, 0);
}

#[test]
fn test_malformed_header_fails_once_then_standby() {
    let fpga = FakeFpga::new(0, 1);
    let (mut seq, _) = sequencer(&fpga);

    seq.start();
    assert_eq!(
        seq.process(&[0x00, 0x08]),
        ConfigStatus::Fail(ConfigError::Malformed(FramerError::BadPreamble))
    );
    assert_eq!(seq.session().state, State::Standby);
    assert_eq!(seq.process(&[0x00]), ConfigStatus::Ready);
    assert_eq!(fpga.state.borrow().program_pulses, 0);
}

#[test]
fn test_init_timeout_fails_attempt() {
    let fpga = FakeFpga::never_ready();
    let timing = Timing {
        init_poll: PollBudget::new(20, 10),
        ..Timing::default()
    };
    let mut seq = Sequencer::with_timing(fpga.clone(), FakeDelay::default(), timing);

    seq.start();
    assert_eq!(
        seq.process(&minimal_container(&[1, 2, 3])),
        ConfigStatus::Fail(ConfigError::HandshakeTimeout(Handshake::Init))
    );
    assert_eq!(seq.process(&[]), ConfigStatus::Ready);
    assert!(fpga.received().is_empty());
}

#[test]
fn test_done_timeout_fails_attempt() {
    let fpga = FakeFpga::never_done();
    let timing = Timing {
        done_poll: PollBudget::new(10, 0),
        ..Timing::default()
    };
    let mut seq = Sequencer::with_timing(fpga.clone(), FakeDelay::default(), timing);

    seq.start();
    assert_eq!(
        seq.process(&minimal_container(&[7])),
        ConfigStatus::Finishing
    );
    assert_eq!(
        seq.process(&[]),
        ConfigStatus::Fail(ConfigError::HandshakeTimeout(Handshake::Done))
    );
    assert_eq!(seq.session().state, State::Standby);
}

#[test]
fn test_start_discards_previous_attempt() {
    let first = payload(30);
    let fpga = FakeFpga::new(0, 10);
    let (mut seq, _) = sequencer(&fpga);

    seq.start();
    let image = container(&first);
    assert_eq!(seq.process(&image[..header_len() + 5]), ConfigStatus::Ongoing);
    assert_eq!(seq.bitstream_left(), 25);

    seq.start();
    assert_eq!(seq.session().bytes_remaining, 0);
    assert_eq!(seq.session().total_payload_size, 0);
    assert_eq!(seq.bitstream_left(), 0);

    let second = payload(10);
    assert_eq!(seq.process(&container(&second)), ConfigStatus::Finishing);
    assert_eq!(seq.process(&[]), ConfigStatus::Success);
    assert_eq!(fpga.received(), second);
    assert_eq!(fpga.state.borrow().program_pulses, 2);
}

#[test]
fn test_prepare_rejects_empty_payload() {
    let fpga = FakeFpga::new(0, 1);
    let (mut seq, _) = sequencer(&fpga);
    assert_eq!(
        seq.prepare(0),
        Err(ConfigError::Malformed(FramerError::EmptyPayload))
    );
    assert_eq!(
        seq.process(&[]),
        ConfigStatus::Fail(ConfigError::Malformed(FramerError::EmptyPayload))
    );
}

#[test]
fn test_feed_body_caps_at_remaining() {
    let fpga = FakeFpga::new(0, 3);
    let (mut seq, _) = sequencer(&fpga);
    seq.prepare(3).unwrap();
    assert_eq!(seq.feed_body(&[1, 2, 3, 4, 5]), 3);
    assert_eq!(seq.session().state, State::Startup);
    assert_eq!(seq.feed_body(&[6]), 0);
    assert_eq!(fpga.received(), vec![1, 2, 3]);
}

#[test]
fn test_abort_releases_port() {
    let fpga = FakeFpga::new(0, 10);
    let (mut seq, _) = sequencer(&fpga);
    seq.prepare(10).unwrap();
    seq.feed_body(&[1, 2]);
    seq.abort();

    let state = fpga.state.borrow();
    assert!(!state.clock_output);
    assert!(!state.data_output);
    drop(state);
    assert_eq!(seq.session().state, State::Standby);
    assert_eq!(seq.bitstream_left(), 0);
}
