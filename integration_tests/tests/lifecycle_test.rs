use assertables::{assert_ge, assert_gt, assert_lt};
use integration_tests::prelude::*;
use serial_test::serial;

fn index_of(node: &SimNode, event: Event) -> usize {
    node.journal
        .position(|e| *e == event)
        .unwrap_or_else(|| panic!("{event:?} not in journal"))
}

#[serial]
#[test]
fn test_start_sequence() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.control.reset_application(ms(10));

    assert_eq!(Exit::ApplicationReset, node.run());
    assert_eq!(1, node.runtime.starts());

    let events = node.journal.events();
    assert_eq!(
        &[
            Event::Created(1),
            Event::TransportConfigured {
                instance: 1,
                bitrate_kbps: 500
            },
            Event::ProtocolInit {
                instance: 1,
                node_id: NodeId::Configured(5)
            },
            Event::ProcessDataInit(1),
            Event::NormalMode(1),
            Event::Nmt(NmtState::PreOperational),
            Event::TickerAttached(ms(1)),
        ],
        &events[..7]
    );
    // The fast cadence is stopped on application reset, but the instance is not torn down
    assert_eq!(Some(&Event::TickerDetached), events.last());
    assert!(!events.contains(&Event::Destroyed(1)));
    assert_eq!(Some(1), node.control.live_instance());
}

#[serial]
#[test]
fn test_communication_reset_recreates_instance() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.control.reset_communication(ms(2000));
    node.control.reset_application(ms(3000));

    assert_eq!(Exit::ApplicationReset, node.run());
    assert_eq!(2, node.runtime.starts());

    let detached = index_of(&node, Event::TickerDetached);
    let config_mode = index_of(&node, Event::ConfigMode(1));
    let disabled = index_of(&node, Event::Disabled(1));
    let destroyed = index_of(&node, Event::Destroyed(1));
    let created = index_of(&node, Event::Created(2));
    let normal = index_of(&node, Event::NormalMode(2));
    let events = node.journal.events();
    let reattached = events
        .iter()
        .rposition(|e| matches!(e, Event::TickerAttached(_)))
        .unwrap();

    // The interrupt is stopped before the instance goes away
    assert_lt!(detached, config_mode);
    assert_lt!(config_mode, disabled);
    assert_lt!(disabled, destroyed);
    // The old instance is gone before the new one exists
    assert_lt!(destroyed, created);
    // The new instance is running before the cadences restart
    assert_lt!(normal, reattached);

    assert!(!events.iter().any(|e| matches!(e, Event::StaleAccess(_))));

    // Reset processed at 2 s, at the first full tick of that millisecond
    let records = node.journal.records();
    assert_eq!(2_000_000, records[destroyed].at_us);
    assert_eq!(2_000_000, records[created].at_us);
}

#[serial]
#[test]
fn test_cadences_resume_after_reset() {
    let mut node = SimNode::new(NodeConfig::DEFAULT);
    node.control.reset_communication(ms(500));
    node.control.reset_application(ms(1000));

    node.run();

    // Full ticks keep their 1 ms period across the reset
    let counters = node.control.counters();
    assert_ge!(counters.full_ticks, 999);
    assert_ge!(node.fast.tick_count(), 999);
    assert_eq!(counters.rpdo_steps, counters.tpdo_steps);
    assert_eq!(ms(1), counters.max_fast_elapsed);
    // Tick statistics cover both instances
    assert_gt!(node.runtime.diagnostics().full_ticks(), 990);
}

#[serial]
#[test]
fn test_unconfigured_node_id_is_tolerated() {
    let config = NodeConfig {
        node_id: NodeId::Unconfigured,
        ..NodeConfig::DEFAULT
    };
    let mut node = SimNode::new(config);
    node.control.reset_application(ms(10));

    assert_eq!(Exit::ApplicationReset, node.run());

    let events = node.journal.events();
    assert!(events.contains(&Event::ProtocolInit {
        instance: 1,
        node_id: NodeId::Unconfigured
    }));
    assert!(events.contains(&Event::ProcessDataInit(1)));
    assert!(events.contains(&Event::NormalMode(1)));
    // Waiting for LSS, so the node never boots
    assert_eq!(NmtState::Bootup, node.control.nmt_state());
}

#[serial]
#[test]
fn test_startup_to_operational() {
    let mut config = NodeConfig::DEFAULT;
    config.protocol.nmt_control = config.protocol.nmt_control | NmtControl::STARTUP_TO_OPERATIONAL;
    let mut node = SimNode::new(config);
    node.control.reset_application(ms(10));

    node.run();
    assert_eq!(NmtState::Operational, node.control.nmt_state());
}

#[serial]
#[test]
fn test_error_register_stops_node() {
    let mut config = NodeConfig::DEFAULT;
    config.protocol.nmt_control = config.protocol.nmt_control
        | NmtControl::STARTUP_TO_OPERATIONAL
        | NmtControl::ERR_TO_STOPPED;
    let mut node = SimNode::new(config);
    node.control.sdo_write(ms(5), object_ids::ERROR_REGISTER, 0, &[0x01]);
    node.control.reset_application(ms(10));

    node.run();
    assert_eq!(NmtState::Stopped, node.control.nmt_state());
}
