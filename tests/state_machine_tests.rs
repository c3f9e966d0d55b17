//! State machine reconciliation tests

mod common;

use ble_transport_bridge::ble::advertising::{AdvertisingMode, AdvertisingPayloadBuilder};
use ble_transport_bridge::ble::error::nrf_codes;
use ble_transport_bridge::ble::events::{PlatformChannel, PlatformEvent};
use ble_transport_bridge::ble::gatt::{GattServiceBridge, ServiceDefinition};
use ble_transport_bridge::ble::state::{RadioState, ServiceMode, StateFlags};
use ble_transport_bridge::ble::state_machine::DriveOutcome;
use ble_transport_bridge::config::AdvertisingInterval;
use ble_transport_bridge::TransportConfig;
use common::*;
use embassy_time::Instant;

#[test]
fn test_initial_convergence_advertises_fast() {
    let mut core = new_core(TransportConfig::default());
    core.init();
    core.set_advertising_enabled(true, Instant::from_ticks(0)).unwrap();

    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(
        core.driver().ops(),
        vec![
            Op::InitLayer,
            Op::SetDeviceName,
            Op::ConfigureAdvertising,
            Op::StartAdvertising
        ]
    );
    assert_eq!(
        core.driver().calls[0],
        Call::InitLayer(ServiceDefinition::transport(0xFFF6))
    );
    assert_eq!(core.driver().last_device_name().as_deref(), Some(DEFAULT_NAME));

    let expected = AdvertisingPayloadBuilder::new(0xFFF6, &ID_INFO).build().unwrap();
    assert_eq!(core.driver().last_adv_data(), Some(expected.to_vec()));

    match core.driver().calls.last() {
        Some(Call::StartAdvertising(params)) => {
            assert_eq!(params.mode, AdvertisingMode::Fast);
            assert_eq!(params.interval, AdvertisingInterval::FAST);
        }
        other => panic!("unexpected call {:?}", other),
    }

    let status = core.status();
    assert!(status.async_init_completed);
    assert!(status.radio_layer_initialized);
    assert!(status.advertising_configured);
    assert!(status.advertising);
    assert!(!status.advertising_refresh_needed);
    assert_eq!(core.driver().out_of_order, 0);
}

#[test]
fn test_converged_state_makes_no_native_calls() {
    let mut core = advertising_core();
    for _ in 0..3 {
        assert_eq!(core.drive_step(), DriveOutcome::Converged);
        assert_eq!(core.converge(), DriveOutcome::Converged);
    }
    assert!(core.driver().calls.is_empty());
}

#[test]
fn test_layer_comes_up_without_advertising() {
    let mut core = new_core(TransportConfig::default());
    core.init();
    assert_eq!(core.converge(), DriveOutcome::Converged);

    assert_eq!(core.driver().ops(), vec![Op::InitLayer]);
    assert_eq!(core.radio_state(), RadioState::Idle);
    // Refresh stays pending until advertising is wanted
    assert!(core.flags().contains(StateFlags::ADVERTISING_REFRESH_NEEDED));
}

#[test]
fn test_provisioned_device_starts_disabled() {
    let mut core = new_core(TransportConfig::default().with_alternate_transport_provisioned(true));
    core.init();
    core.set_advertising_enabled(true, Instant::from_ticks(0)).unwrap();

    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.service_mode(), ServiceMode::Disabled);
    assert!(core.driver().calls.is_empty());
}

#[test]
fn test_not_supported_rejects_policy_changes() {
    let mut core = new_core(TransportConfig::default().with_ble_supported(false));
    core.init();
    assert_eq!(core.service_mode(), ServiceMode::NotSupported);
    assert!(core.set_advertising_enabled(true, Instant::from_ticks(0)).is_err());
    assert!(core.set_advertising_mode(AdvertisingMode::Slow).is_err());
    assert!(core.set_service_mode(ServiceMode::Enabled).is_err());
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert!(core.driver().calls.is_empty());
}

#[test]
fn test_mode_change_restarts_advertising() {
    let mut core = advertising_core();
    core.set_advertising_mode(AdvertisingMode::Slow).unwrap();

    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(
        core.driver().ops(),
        vec![
            Op::StopAdvertising,
            Op::SetDeviceName,
            Op::ConfigureAdvertising,
            Op::StartAdvertising
        ]
    );
    match core.driver().calls.last() {
        Some(Call::StartAdvertising(params)) => assert_eq!(params.interval, AdvertisingInterval::SLOW),
        other => panic!("unexpected call {:?}", other),
    }
}

#[test]
fn test_disabling_advertising_keeps_layer() {
    let mut core = advertising_core();
    core.set_advertising_enabled(false, Instant::from_ticks(0)).unwrap();

    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.driver().ops(), vec![Op::StopAdvertising]);
    assert_eq!(core.radio_state(), RadioState::Idle);
}

#[test]
fn test_service_disable_tears_down() {
    let mut core = advertising_core();
    core.set_service_mode(ServiceMode::Disabled).unwrap();

    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.driver().ops(), vec![Op::StopAdvertising, Op::Teardown]);
    assert_eq!(core.radio_state(), RadioState::Uninitialized);
    assert!(core.handles().is_none());

    // Re-enabling brings everything back
    core.set_service_mode(ServiceMode::Enabled).unwrap();
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert!(core.status().advertising);
    assert_eq!(core.driver().out_of_order, 0);
}

#[test]
fn test_requesting_not_supported_is_an_argument_error() {
    let mut core = advertising_core();
    assert!(core.set_service_mode(ServiceMode::NotSupported).is_err());
    assert_eq!(core.service_mode(), ServiceMode::Enabled);
}

#[test]
fn test_init_failure_disables() {
    let mut core = new_core(TransportConfig::default());
    core.driver_mut().fail(Op::InitLayer, nrf_codes::NRF_ERROR_NO_MEM);
    core.init();
    core.set_advertising_enabled(true, Instant::from_ticks(0)).unwrap();

    assert_eq!(core.converge(), DriveOutcome::Failed);
    assert_eq!(core.service_mode(), ServiceMode::Disabled);
    assert_eq!(core.radio_state(), RadioState::Uninitialized);
    assert_eq!(core.driver().ops(), vec![Op::InitLayer]);
}

#[test]
fn test_configure_failure_releases_layer() {
    let mut core = new_core(TransportConfig::default());
    core.driver_mut().fail(Op::ConfigureAdvertising, nrf_codes::NRF_ERROR_INVALID_LENGTH);
    core.init();
    core.set_advertising_enabled(true, Instant::from_ticks(0)).unwrap();

    assert_eq!(core.converge(), DriveOutcome::Failed);
    assert_eq!(core.service_mode(), ServiceMode::Disabled);
    assert!(!core.status().advertising);
    assert_eq!(core.radio_state(), RadioState::Uninitialized);
    assert_eq!(core.driver().count(Op::StartAdvertising), 0);
}

#[test]
fn test_payload_failure_disables_without_native_calls() {
    // The default name no longer fits the 16 byte limit
    let config = TransportConfig::default().with_device_name_prefix("VERY-LONG-PREFIX-");
    let mut core = new_core(config);
    core.init();
    core.set_advertising_enabled(true, Instant::from_ticks(0)).unwrap();

    assert_eq!(core.converge(), DriveOutcome::Failed);
    assert_eq!(core.service_mode(), ServiceMode::Disabled);
    assert_eq!(core.driver().ops(), vec![Op::InitLayer, Op::Teardown]);
}

#[test]
fn test_connect_and_disconnect_cycle() {
    let mut core = advertising_core();

    core.handle_event(PlatformEvent::Connected { conn: 1 });
    core.converge();
    assert_eq!(core.driver().ops(), vec![Op::StopAdvertising]);
    assert_eq!(core.num_connections(), 1);

    core.driver_mut().calls.clear();
    core.handle_event(PlatformEvent::Disconnected { conn: 1, reason: 0x13 });
    core.converge();
    assert_eq!(core.num_connections(), 0);
    assert!(core.status().advertising);
    // Configuration survived the connection
    assert_eq!(core.driver().ops(), vec![Op::StartAdvertising]);
}

#[test]
fn test_unknown_disconnect_is_ignored() {
    let mut core = advertising_core();
    core.handle_event(PlatformEvent::Connected { conn: 1 });
    core.converge();
    core.driver_mut().calls.clear();

    assert_eq!(core.handle_event(PlatformEvent::Disconnected { conn: 9, reason: 0 }), None);
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.num_connections(), 1);
    assert!(core.driver().calls.is_empty());
}

#[test]
fn test_second_connection_is_dropped() {
    let mut core = advertising_core();
    core.handle_event(PlatformEvent::Connected { conn: 1 });
    core.handle_event(PlatformEvent::Connected { conn: 2 });
    assert_eq!(core.num_connections(), 1);
    assert!(core.driver().calls.contains(&Call::Disconnect(2)));
}

#[test]
fn test_pairing_complete_tears_down_after_disconnect() {
    let mut core = advertising_core();
    core.handle_event(PlatformEvent::Connected { conn: 4 });
    core.converge();

    // Commissioning done; upper layer stops advertising and signals completion
    core.set_advertising_enabled(false, Instant::from_ticks(0)).unwrap();
    core.handle_event(PlatformEvent::PairingComplete);
    core.converge();
    assert_eq!(core.service_mode(), ServiceMode::Enabled);
    assert_eq!(core.radio_state(), RadioState::Idle);

    core.driver_mut().calls.clear();
    core.handle_event(PlatformEvent::Disconnected { conn: 4, reason: 0x13 });
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.service_mode(), ServiceMode::Disabled);
    assert_eq!(core.driver().ops(), vec![Op::Teardown]);
    assert_eq!(core.radio_state(), RadioState::Uninitialized);
}

#[test]
fn test_pairing_complete_without_link_tears_down_immediately() {
    let mut core = advertising_core();
    core.set_advertising_enabled(false, Instant::from_ticks(0)).unwrap();
    core.handle_event(PlatformEvent::PairingComplete);

    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.driver().ops(), vec![Op::StopAdvertising, Op::Teardown]);
    assert_eq!(core.service_mode(), ServiceMode::Disabled);
}

#[test]
fn test_pairing_complete_keeps_radio_while_advertising_wanted() {
    let mut core = advertising_core();
    core.handle_event(PlatformEvent::PairingComplete);
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.service_mode(), ServiceMode::Enabled);
    assert!(core.driver().calls.is_empty());
}

#[test]
fn test_fast_window_expiry_switches_to_slow() {
    let mut core = advertising_core();
    let generation = core.timer().generation();
    core.handle_event(PlatformEvent::FastAdvertisingExpired { generation });

    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert!(!core.status().fast_advertising_enabled);
    match core.driver().calls.last() {
        Some(Call::StartAdvertising(params)) => assert_eq!(params.mode, AdvertisingMode::Slow),
        other => panic!("unexpected call {:?}", other),
    }

    // Delivering the same expiry again changes nothing
    core.driver_mut().calls.clear();
    core.handle_event(PlatformEvent::FastAdvertisingExpired { generation });
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert!(core.driver().calls.is_empty());
}

#[test]
fn test_device_name_change_reconfigures() {
    let mut core = advertising_core();
    core.set_device_name("Kitchen").unwrap();
    core.converge();

    assert_eq!(core.driver().last_device_name().as_deref(), Some("Kitchen"));
    assert_eq!(core.driver().count(Op::ConfigureAdvertising), 1);
    assert!(core.status().use_custom_device_name);
    assert!(core.status().advertising);
}

#[test]
fn test_disable_while_connected_drops_link_then_tears_down() {
    let mut core = advertising_core();
    core.handle_event(PlatformEvent::Connected { conn: 1 });
    core.converge();
    core.driver_mut().calls.clear();

    core.set_service_mode(ServiceMode::Disabled).unwrap();
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.driver().ops(), vec![Op::Disconnect]);
    assert_eq!(core.driver().calls[0], Call::Disconnect(1));
    assert_eq!(core.radio_state(), RadioState::Idle);

    // The request is in flight; converged passes stay quiet
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.driver().calls.len(), 1);

    core.handle_event(PlatformEvent::Disconnected { conn: 1, reason: 0x16 });
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.driver().ops(), vec![Op::Disconnect, Op::Teardown]);
    assert_eq!(core.radio_state(), RadioState::Uninitialized);
    assert_eq!(core.num_connections(), 0);
    assert_eq!(core.driver().out_of_order, 0);
}

#[test]
fn test_failed_link_drop_is_not_retried() {
    let mut core = advertising_core();
    core.handle_event(PlatformEvent::Connected { conn: 1 });
    core.converge();
    core.driver_mut().calls.clear();
    core.driver_mut().fail(Op::Disconnect, nrf_codes::NRF_ERROR_INVALID_STATE);

    core.set_service_mode(ServiceMode::Disabled).unwrap();
    assert_eq!(core.converge(), DriveOutcome::Failed);
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.driver().count(Op::Disconnect), 1);
    assert_eq!(core.service_mode(), ServiceMode::Disabled);
}

#[test]
fn test_radio_side_advertising_failure_is_reported() {
    let platform = PlatformChannel::new();
    let bridge = GattServiceBridge::new(platform.sender(), HANDLES);
    let mut core = advertising_core();

    // Radio went quiet on its own
    core.driver_mut().advertising = false;
    assert!(bridge.on_advertising_stopped(nrf_codes::NRF_ERROR_NO_MEM));
    let event = platform.try_receive().ok().unwrap();
    assert_eq!(event, PlatformEvent::AdvertisingStopped { code: nrf_codes::NRF_ERROR_NO_MEM });

    core.handle_event(event);
    assert!(!core.status().advertising);
    assert_eq!(core.service_mode(), ServiceMode::Disabled);

    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert_eq!(core.driver().ops(), vec![Op::Teardown]);
    assert_eq!(core.driver().out_of_order, 0);
}
