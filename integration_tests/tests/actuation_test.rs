use assertables::{assert_ge, assert_le};
use integration_tests::prelude::*;
use serial_test::serial;

/// Writes processed in the full tick take effect within a couple of ticks
const SLACK_US: u64 = 2000;

fn assert_near(expected_us: u64, actual_us: u64) {
    assert_ge!(actual_us, expected_us);
    assert_le!(actual_us, expected_us + SLACK_US);
}

#[serial]
#[test]
fn test_ignite_timing() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.trigger_at(ms(1000), 1);
    node.read_trigger_at(ms(3500));
    node.read_trigger_at(ms(4500));
    node.read_trigger_at(ms(7500));
    node.control.reset_application(ms(8000));

    assert_eq!(Exit::ApplicationReset, node.run());

    let transitions = node.output.transitions();
    assert_eq!(2, transitions.len(), "{transitions:?}");
    assert!(transitions[0].1);
    assert_near(4_000_000, transitions[0].0);
    assert!(!transitions[1].1);
    assert_near(7_000_000, transitions[1].0);

    // Reads return the actuator state
    let reads: Vec<_> = node
        .uploads(object_ids::IGNITE)
        .into_iter()
        .map(|(_, r)| r.unwrap())
        .collect();
    assert_eq!(vec![vec![0], vec![1], vec![0]], reads);
    assert_eq!(0, node.mirror());
    assert_eq!(ActuationState::Idle, node.runtime.actuator().state());
}

#[serial]
#[test]
fn test_writes_are_accepted_but_not_stored() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.trigger_at(ms(100), 1);
    node.read_trigger_at(ms(101));
    node.trigger_at(ms(200), 7);
    node.control.reset_application(ms(300));

    node.run();

    let downloads: Vec<_> = node
        .journal
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::SdoDownload { result, .. } => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(vec![Ok(()), Ok(())], downloads);
    // The write of 1 is not stored: the trigger object reads back the output state
    assert_eq!(Ok(vec![0]), node.uploads(object_ids::IGNITE)[0].1);
}

#[serial]
#[test]
fn test_cancel_while_idle_is_noop() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.trigger_at(ms(1000), 0);
    node.read_trigger_at(ms(1500));
    node.control.reset_application(ms(2000));

    node.run();

    // Only the initial write at start up
    assert_eq!(vec![(0, false)], node.output.history());
    assert_eq!(0, node.mirror());
    assert_eq!(ActuationState::Idle, node.runtime.actuator().state());
}

#[serial]
#[test]
fn test_cancel_before_activation() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.trigger_at(ms(1000), 1);
    node.trigger_at(ms(2000), 0);
    node.control.reset_application(ms(10_000));

    node.run();

    assert!(node.output.transitions().is_empty());
    assert_eq!(0, node.mirror());
    // Only the cadence tasks are left
    assert_eq!(2, QUEUE.len());
}

#[serial]
#[test]
fn test_cancel_while_active() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.trigger_at(ms(1000), 1);
    node.trigger_at(ms(5000), 0);
    node.read_trigger_at(ms(5500));
    node.control.reset_application(ms(10_000));

    node.run();

    let transitions = node.output.transitions();
    assert_eq!(2, transitions.len(), "{transitions:?}");
    assert_near(4_000_000, transitions[0].0);
    assert!(!transitions[1].1);
    assert_near(5_000_000, transitions[1].0);
    assert_eq!(Ok(vec![0]), node.uploads(object_ids::IGNITE)[0].1);
    assert_eq!(2, QUEUE.len());
}

#[serial]
#[test]
fn test_ignite_while_pending_is_ignored() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.trigger_at(ms(1000), 1);
    node.trigger_at(ms(2000), 1);
    node.trigger_at(ms(5000), 1);
    node.control.reset_application(ms(12_000));

    node.run();

    // One cycle, timed from the first write
    let transitions = node.output.transitions();
    assert_eq!(2, transitions.len(), "{transitions:?}");
    assert_near(4_000_000, transitions[0].0);
    assert_near(7_000_000, transitions[1].0);
}

#[serial]
#[test]
fn test_rapid_toggling() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    for i in 0..20u64 {
        node.trigger_at(ms(1000 + 10 * i), (i % 2 == 0) as u8);
    }
    // Ends with a cancel, so nothing fires
    node.read_trigger_at(ms(1300));
    // Cancel once active, then arm a final cycle which runs to completion
    node.trigger_at(ms(2000), 1);
    node.trigger_at(ms(5500), 0);
    node.read_trigger_at(ms(5600));
    node.trigger_at(ms(6000), 1);
    node.trigger_at(ms(6500), 0);
    node.trigger_at(ms(6510), 1);
    node.read_trigger_at(ms(10_000));
    node.control.reset_application(ms(14_000));

    node.run();

    let transitions: Vec<_> = node
        .output
        .transitions()
        .into_iter()
        .map(|(t, active)| (t / 1000, active))
        .collect();
    assert_eq!(
        vec![(5000, true), (5500, false), (9510, true), (12_510, false)],
        transitions
    );

    // The mirror always followed the output
    for (t, read) in node.uploads(object_ids::IGNITE) {
        assert_eq!(Ok(vec![node.output.active_at(t) as u8]), read);
    }
    assert_eq!(0, node.mirror());
    assert_eq!(2, QUEUE.len());
}

#[serial]
#[test]
fn test_rpdo_trigger() {
    let mut config = NodeConfig::DEFAULT;
    config.protocol.nmt_control = config.protocol.nmt_control | NmtControl::STARTUP_TO_OPERATIONAL;
    let mut node = SimNode::new(config);
    node.control
        .rpdo_write(ms(1000), object_ids::IGNITE, object_ids::IGNITE_SUB, &[1]);
    node.control.reset_application(ms(8000));

    node.run();

    assert!(node.journal.events().contains(&Event::RpdoWrite {
        index: object_ids::IGNITE,
        sub: 0,
        result: Ok(())
    }));
    let transitions = node.output.transitions();
    assert_eq!(2, transitions.len(), "{transitions:?}");
    assert_near(4_000_000, transitions[0].0);
    assert_near(7_000_000, transitions[1].0);
}

#[serial]
#[test]
fn test_rpdo_ignored_before_operational() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.control
        .rpdo_write(ms(1000), object_ids::IGNITE, object_ids::IGNITE_SUB, &[1]);
    node.control.reset_application(ms(5000));

    node.run();

    assert!(node.output.transitions().is_empty());
    assert_eq!(1, node.control.pending_actions());
}

#[serial]
#[test]
fn test_actuation_survives_communication_reset() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.trigger_at(ms(1000), 1);
    node.control.reset_communication(ms(2000));
    node.control.reset_communication(ms(5000));
    node.control.reset_application(ms(8000));

    node.run();

    assert_eq!(3, node.runtime.starts());
    let transitions = node.output.transitions();
    assert_eq!(2, transitions.len(), "{transitions:?}");
    assert_near(4_000_000, transitions[0].0);
    assert_near(7_000_000, transitions[1].0);
    assert_eq!(0, node.mirror());
}

#[serial]
#[test]
fn test_dwell_from_config() {
    let config = NodeConfig {
        dwell_ms: 250,
        ..NodeConfig::DEFAULT
    };
    let mut node = SimNode::new(config);
    node.trigger_at(ms(100), 1);
    node.control.reset_application(ms(1000));

    node.run();

    let transitions = node.output.transitions();
    assert_near(350_000, transitions[0].0);
    assert_near(600_000, transitions[1].0);
}
