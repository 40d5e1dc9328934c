//! Receiver behavior against a local HTTP server and a loopback telnet stream

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use denon_avr::{
    AttributeKey, AttributeValue, Capability, PowerState, Receiver, ReceiverConfig, SdkError,
    StateError, StreamConfig, ZoneFilter, ZoneId, ZoneRole,
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use rstest::rstest;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const MAIN_STATUS: &str = "/goform/formMainZone_MainZoneXmlStatus.xml";
const APPCOMMAND: &str = "/goform/AppCommand.xml";
const APPCOMMAND0300: &str = "/goform/AppCommand0300.xml";

const TONE_RESPONSE: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
    "<rx><cmd><status>1</status><adjust>1</adjust>",
    "<bassvalue>6</bassvalue><treblevalue>6</treblevalue></cmd></rx>"
);

const COMMAND_OK: &str = "<rx><cmd>OK</cmd></rx>";

fn tone_response(status: u8, adjust: u8, bass: u8) -> String {
    format!(
        "<rx><cmd><status>{}</status><adjust>{}</adjust><basslevel>{:+}dB</basslevel>\
<bassvalue>{}</bassvalue><treblevalue>6</treblevalue></cmd></rx>",
        status,
        adjust,
        i32::from(bass) - 6,
        bass
    )
}

fn audyssey_response(dynamic_eq: u8, multi_eq: u8) -> String {
    format!(
        "<rx><cmd><list>\
<param name=\"dynamiceq\" control=\"1\">{}</param>\
<param name=\"reflevoffset\" control=\"1\">0</param>\
<param name=\"dynamicvol\" control=\"1\">2</param>\
<param name=\"multeq\" control=\"1\">{}</param>\
</list></cmd></rx>",
        dynamic_eq, multi_eq
    )
}

fn status(power: &str, volume: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>
<item>
  <ZonePower><value>{}</value></ZonePower>
  <InputFuncSelect><value>SAT/CBL</value></InputFuncSelect>
  <MasterVolume><value>{}</value></MasterVolume>
  <Mute><value>off</value></Mute>
  <selectSurround><value>STEREO</value></selectSurround>
</item>",
        power, volume
    )
}

fn host_and_port(server: &ServerGuard) -> (String, u16) {
    let address = server.host_with_port();
    let (host, port) = address.rsplit_once(':').unwrap();
    (host.to_string(), port.parse().unwrap())
}

fn receiver_for(server: &ServerGuard) -> Receiver {
    let (host, port) = host_and_port(server);
    Receiver::new(ReceiverConfig::new(host).with_http_port(port)).unwrap()
}

fn mock_status(server: &mut ServerGuard, path: &str, power: &str, volume: &str) -> Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(status(power, volume))
        .create()
}

/// POST to `path` whose body matches `pattern`
fn mock_post(server: &mut ServerGuard, path: &str, pattern: &str, body: &str) -> Mock {
    server
        .mock("POST", path)
        .match_body(Matcher::Regex(pattern.to_string()))
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(body)
        .create()
}

fn mock_appcommand(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", APPCOMMAND)
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(TONE_RESPONSE)
        .create()
}

#[test]
fn test_refresh_reads_full_status() {
    let mut server = Server::new();
    let _status = mock_status(&mut server, MAIN_STATUS, "ON", "-36.5");
    let _tone = mock_appcommand(&mut server);
    let receiver = receiver_for(&server);
    let main = receiver.main();

    let outcome = main.refresh().unwrap();

    assert_eq!(outcome.revision, 1);
    assert_eq!(main.power(), Some(PowerState::On));
    assert_eq!(main.volume(), Some(-36.5));
    assert_eq!(main.is_muted(), Some(false));
    assert_eq!(main.input_source().as_deref(), Some("SAT/CBL"));
    assert_eq!(main.bass(), Some(6));
    assert_eq!(main.treble(), Some(6));
    assert_eq!(main.tone_control_available(), Some(true));
    assert_eq!(main.tone_control_adjust(), Some(true));
    assert_eq!(main.dynamic_eq(), None);
}

#[test]
fn test_command_changes_nothing_until_polled() {
    let mut server = Server::new();
    let status_on = mock_status(&mut server, MAIN_STATUS, "ON", "-36.5");
    let _tone = mock_appcommand(&mut server);
    let power_off = server
        .mock("GET", "/goform/formiPhoneAppPower.xml?1+PowerStandby")
        .with_status(200)
        .expect(1)
        .create();

    let receiver = receiver_for(&server);
    let main = receiver.main();
    main.refresh().unwrap();

    main.power_off().unwrap();
    power_off.assert();
    assert_eq!(main.power(), Some(PowerState::On));

    status_on.remove();
    let _status_off = mock_status(&mut server, MAIN_STATUS, "STANDBY", "-36.5");
    main.refresh().unwrap();

    assert_eq!(main.power(), Some(PowerState::Standby));
}

#[test]
fn test_failed_refresh_keeps_previous_state() {
    let mut server = Server::new();
    let status = mock_status(&mut server, MAIN_STATUS, "ON", "-40.0");
    let _tone = mock_appcommand(&mut server);
    let receiver = receiver_for(&server);
    let main = receiver.main();
    main.refresh().unwrap();
    let before = main.snapshot().unwrap();

    status.remove();
    let _html = server
        .mock("GET", MAIN_STATUS)
        .with_status(200)
        .with_body("<html><body>Busy</body></html>")
        .create();

    let err = main.refresh().unwrap_err();
    assert!(matches!(
        err,
        SdkError::State(StateError::RefreshFailed { .. })
    ));
    assert_eq!(main.snapshot().unwrap(), before);
}

#[test]
fn test_refresh_and_confirm_reports_ignored_command() {
    let mut server = Server::new();
    let _status = mock_status(&mut server, MAIN_STATUS, "STANDBY", "-36.5");
    let _tone = mock_appcommand(&mut server);
    let _power_on = server
        .mock("GET", "/goform/formiPhoneAppPower.xml?1+PowerOn")
        .with_status(200)
        .create();

    let receiver = receiver_for(&server);
    let main = receiver.main();
    main.power_on().unwrap();

    let err = main
        .refresh_and_confirm(AttributeKey::Power, &AttributeValue::Power(PowerState::On))
        .unwrap_err();
    match err {
        SdkError::CommandRejected { key, expected, actual } => {
            assert_eq!(key, AttributeKey::Power);
            assert_eq!(expected, "ON");
            assert_eq!(actual.as_deref(), Some("STANDBY"));
        }
        other => panic!("unexpected error: {other}"),
    }

    main.refresh_and_confirm(
        AttributeKey::Power,
        &AttributeValue::Power(PowerState::Standby),
    )
    .unwrap();
}

#[test]
fn test_set_volume_snaps_to_half_steps() {
    let mut server = Server::new();
    let volume = server
        .mock("GET", "/goform/formiPhoneAppVolume.xml?1+-35.5")
        .with_status(200)
        .expect(1)
        .create();
    let receiver = receiver_for(&server);

    receiver.main().set_volume(-35.3).unwrap();

    volume.assert();
    assert_eq!(receiver.main().volume(), None);
}

#[rstest]
#[case(20.0)]
#[case(-80.5)]
#[case(f32::NAN)]
fn test_set_volume_rejects_out_of_range(#[case] decibels: f32) {
    let mut server = Server::new();
    let any_volume = server
        .mock("GET", mockito::Matcher::Any)
        .expect(0)
        .create();
    let receiver = receiver_for(&server);

    let err = receiver.main().set_volume(decibels).unwrap_err();

    assert!(matches!(err, SdkError::InvalidArgument(_)));
    any_volume.assert();
}

#[test]
fn test_set_bass_enables_tone_control_then_sets_level() {
    let mut server = Server::new();
    let _status = mock_status(&mut server, MAIN_STATUS, "ON", "-36.5");
    let appcommand = server
        .mock("POST", APPCOMMAND)
        .with_status(200)
        .with_body(TONE_RESPONSE)
        .expect(3)
        .create();
    let receiver = receiver_for(&server);
    let main = receiver.main();
    main.refresh().unwrap();

    main.set_bass(8).unwrap();

    appcommand.assert();
    assert_eq!(main.bass(), Some(6));
    assert!(matches!(main.set_bass(13), Err(SdkError::InvalidArgument(_))));
    assert!(matches!(main.set_treble(200), Err(SdkError::InvalidArgument(_))));
}

#[test]
fn test_unavailable_tone_control_refuses_bass() {
    let mut server = Server::new();
    let _status = mock_status(&mut server, MAIN_STATUS, "ON", "-36.5");
    let _get_tone = mock_post(&mut server, APPCOMMAND, "GetToneControl", &tone_response(0, 1, 6));
    let set_tone = server
        .mock("POST", APPCOMMAND)
        .match_body(Matcher::Regex("SetToneControl".to_string()))
        .with_status(200)
        .with_body(COMMAND_OK)
        .expect(0)
        .create();
    let receiver = receiver_for(&server);
    let main = receiver.main();
    main.refresh().unwrap();

    assert_eq!(main.tone_control_available(), Some(false));
    assert_eq!(main.tone_control_adjust(), Some(true));
    assert!(matches!(main.set_bass(6), Err(SdkError::InvalidArgument(_))));
    assert!(matches!(main.treble_up(), Err(SdkError::InvalidArgument(_))));
    set_tone.assert();
}

#[test]
fn test_bass_steps_from_the_stored_level() {
    let mut server = Server::new();
    let _status = mock_status(&mut server, MAIN_STATUS, "ON", "-36.5");
    let get_tone = mock_post(&mut server, APPCOMMAND, "GetToneControl", &tone_response(1, 1, 6));
    let _adjust = mock_post(&mut server, APPCOMMAND, "<adjust>1</adjust>", COMMAND_OK);
    let bass_up = server
        .mock("POST", APPCOMMAND)
        .match_body(Matcher::Regex("<bassvalue>7</bassvalue>".to_string()))
        .with_status(200)
        .with_body(COMMAND_OK)
        .expect(1)
        .create();
    let receiver = receiver_for(&server);
    let main = receiver.main();

    assert!(matches!(main.bass_up(), Err(SdkError::InvalidArgument(_))));

    main.refresh().unwrap();
    assert_eq!(main.bass_level(), Some(0.0));
    main.bass_up().unwrap();
    bass_up.assert();
    // The store still holds the polled level until the receiver reports the change
    assert_eq!(main.bass(), Some(6));

    get_tone.remove();
    let _top = mock_post(&mut server, APPCOMMAND, "GetToneControl", &tone_response(1, 1, 12));
    let no_step = server
        .mock("POST", APPCOMMAND)
        .match_body(Matcher::Regex("<bassvalue>".to_string()))
        .with_status(200)
        .with_body(COMMAND_OK)
        .expect(0)
        .create();
    main.refresh().unwrap();

    assert_eq!(main.bass_level(), Some(6.0));
    main.bass_up().unwrap();
    no_step.assert();
}

#[test]
fn test_refresh_reads_audyssey_settings() {
    let mut server = Server::new();
    let _status = mock_status(&mut server, MAIN_STATUS, "ON", "-36.5");
    let _tone = mock_appcommand(&mut server);
    let _audyssey = mock_post(&mut server, APPCOMMAND0300, "GetAudyssey", &audyssey_response(1, 3));
    let set_offset = server
        .mock("POST", APPCOMMAND0300)
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("<name>SetAudyssey</name>".to_string()),
            Matcher::Regex(r#"<param name="reflevoffset">1</param>"#.to_string()),
        ]))
        .with_status(200)
        .with_body(COMMAND_OK)
        .expect(1)
        .create();
    let receiver = receiver_for(&server);
    let main = receiver.main();

    main.refresh().unwrap();

    assert_eq!(main.dynamic_eq(), Some(true));
    assert_eq!(main.multi_eq().as_deref(), Some("Reference"));
    assert_eq!(main.reference_level_offset().as_deref(), Some("0dB"));
    assert_eq!(main.dynamic_volume().as_deref(), Some("Medium"));

    main.set_reference_level_offset("+5dB").unwrap();
    set_offset.assert();
    assert!(matches!(main.set_multi_eq("Manual"), Err(SdkError::InvalidArgument(_))));
    assert!(matches!(main.set_dynamic_volume("Loud"), Err(SdkError::InvalidArgument(_))));
}

#[test]
fn test_reference_level_offset_needs_dynamic_eq() {
    let mut server = Server::new();
    let _status = mock_status(&mut server, MAIN_STATUS, "ON", "-36.5");
    let _tone = mock_appcommand(&mut server);
    let _audyssey = mock_post(&mut server, APPCOMMAND0300, "GetAudyssey", &audyssey_response(0, 1));
    let set_audyssey = server
        .mock("POST", APPCOMMAND0300)
        .match_body(Matcher::Regex("SetAudyssey".to_string()))
        .with_status(200)
        .with_body(COMMAND_OK)
        .expect(1)
        .create();
    let receiver = receiver_for(&server);
    let main = receiver.main();
    main.refresh().unwrap();

    assert_eq!(main.dynamic_eq(), Some(false));
    assert!(matches!(
        main.set_reference_level_offset("+10dB"),
        Err(SdkError::InvalidArgument(_))
    ));
    main.set_dynamic_eq(true).unwrap();
    set_audyssey.assert();
}

#[tokio::test]
async fn test_tone_switch_off_does_not_block_bass() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let telnet_port = listener.local_addr().unwrap().port();
    let mut http = Server::new_async().await;
    let _status = http
        .mock("GET", MAIN_STATUS)
        .with_status(200)
        .with_body(status("ON", "-36.5"))
        .create_async()
        .await;
    let _get_tone = http
        .mock("POST", APPCOMMAND)
        .match_body(Matcher::Regex("GetToneControl".to_string()))
        .with_status(200)
        .with_body(tone_response(1, 1, 6))
        .create_async()
        .await;
    let set_tone = http
        .mock("POST", APPCOMMAND)
        .match_body(Matcher::Regex("SetToneControl".to_string()))
        .with_status(200)
        .with_body(COMMAND_OK)
        .expect(2)
        .create_async()
        .await;
    let (host, http_port) = host_and_port(&http);

    let config = ReceiverConfig::new(host.clone())
        .with_http_port(http_port)
        .with_stream(StreamConfig::new(host).with_port(telnet_port));
    let receiver = Receiver::new(config).unwrap();
    let main = receiver.main().clone();

    let (resynced_tx, resynced_rx) = oneshot::channel::<()>();
    let device = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        resynced_rx.await.unwrap();
        socket.write_all(b"PSTONE CTRL OFF\r").await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    receiver.connect_events().await.unwrap();
    let wait_until = |check: fn(&denon_avr::Zone) -> bool, what: &'static str| {
        let zone = main.clone();
        async move {
            tokio::time::timeout(Duration::from_secs(5), async {
                while !check(&zone) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap_or_else(|_| panic!("{} not seen in time", what));
        }
    };

    // Refresh after connect reads adjust=1 first
    wait_until(|zone| zone.tone_control_adjust() == Some(true), "resync").await;
    resynced_tx.send(()).unwrap();
    wait_until(|zone| zone.tone_control_adjust() == Some(false), "PSTONE CTRL OFF").await;

    assert_eq!(main.tone_control_available(), Some(true));
    let zone = main.clone();
    tokio::task::spawn_blocking(move || zone.set_bass(6))
        .await
        .unwrap()
        .unwrap();
    set_tone.assert_async().await;

    receiver.disconnect_events().await.unwrap();
    device.abort();
}

#[test]
fn test_secondary_zone_capabilities() {
    let server = Server::new();
    let receiver = receiver_for(&server);
    let zone2 = receiver.add_zone(ZoneId::zone2()).unwrap();

    assert_eq!(zone2.role(), ZoneRole::Secondary);
    assert_eq!(receiver.main().role(), ZoneRole::Main);

    let denied = |result: denon_avr::Result<()>, expected: Capability| match result {
        Err(SdkError::CapabilityDenied { zone, role, capability }) => {
            assert_eq!(zone, ZoneId::zone2());
            assert_eq!(role, ZoneRole::Secondary);
            assert_eq!(capability, expected);
        }
        other => panic!("expected {expected} to be denied, got {other:?}"),
    };

    denied(zone2.set_sound_mode("MOVIE"), Capability::SelectSoundMode);
    denied(zone2.set_bass(5), Capability::ToneControl);
    denied(zone2.set_tone_control(true), Capability::ToneControl);
    denied(zone2.bass_up(), Capability::ToneControl);
    denied(zone2.set_dynamic_eq(false), Capability::Audyssey);
    denied(zone2.set_multi_eq("Manual"), Capability::Audyssey);
    denied(
        zone2.add_zone(ZoneId::zone3()).map(|_| ()),
        Capability::ManageZones,
    );
}

#[tokio::test]
async fn test_secondary_zone_cannot_manage_connection() {
    let server = Server::new_async().await;
    let receiver = receiver_for(&server);
    let zone2 = receiver.add_zone(ZoneId::zone2()).unwrap();

    assert!(matches!(
        zone2.connect().await,
        Err(SdkError::CapabilityDenied {
            capability: Capability::ManageConnection,
            ..
        })
    ));
    assert!(matches!(
        zone2.disconnect().await,
        Err(SdkError::CapabilityDenied { .. })
    ));
}

#[test]
fn test_add_zone_is_idempotent_and_rejects_unknown_zones() {
    let server = Server::new();
    let receiver = receiver_for(&server);

    let first = receiver.add_zone(ZoneId::zone2()).unwrap();
    let second = receiver.add_zone(ZoneId::zone2()).unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(receiver.zones().len(), 2);

    assert!(matches!(
        receiver.add_zone(ZoneId::main()),
        Err(SdkError::UnsupportedZone(_))
    ));
    assert!(matches!(
        receiver.add_zone(ZoneId::new("Zone4")),
        Err(SdkError::UnsupportedZone(_))
    ));
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let mut server = Server::new();
    let _status = mock_status(&mut server, MAIN_STATUS, "ON", "-36.5");
    let _tone = mock_appcommand(&mut server);
    let receiver = receiver_for(&server);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = receiver.on_change(ZoneFilter::All, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    receiver.main().refresh().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(receiver.unsubscribe(id));
    assert!(!receiver.unsubscribe(id));
}

#[test]
fn test_key_filtered_subscription() {
    let mut server = Server::new();
    let first = mock_status(&mut server, MAIN_STATUS, "ON", "-36.5");
    let _tone = mock_appcommand(&mut server);
    let receiver = receiver_for(&server);

    let bass_changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&bass_changes);
    receiver.on_change_keys(
        ZoneFilter::Zone(ZoneId::main()),
        &[AttributeKey::Bass],
        move |change| {
            assert_eq!(change.changes.len(), 1);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );

    receiver.main().refresh().unwrap();
    first.remove();
    let _second = mock_status(&mut server, MAIN_STATUS, "ON", "-30.0");
    receiver.main().refresh().unwrap();

    assert_eq!(receiver.main().volume(), Some(-30.0));
    assert_eq!(bass_changes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stream_events_update_only_their_zone() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let telnet_port = listener.local_addr().unwrap().port();
    let http = Server::new_async().await;
    let (host, http_port) = host_and_port(&http);

    let config = ReceiverConfig::new(host.clone())
        .with_http_port(http_port)
        .with_stream(StreamConfig::new(host).with_port(telnet_port))
        .with_secondary_zone(ZoneId::zone2());
    let receiver = Receiver::new(config).unwrap();

    let main_changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&main_changes);
    receiver.main().on_change(move |change| {
        assert_eq!(change.zone, ZoneId::main());
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let device = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"Z250\r").await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        socket.write_all(b"MV455\rMVMAX 98\r").await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    receiver.connect_events().await.unwrap();
    let zone2 = receiver.zone(&ZoneId::zone2()).unwrap();
    let main = receiver.main().clone();

    tokio::time::timeout(Duration::from_secs(5), async {
        while zone2.volume().is_none() || main.volume().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("events not applied in time");

    assert_eq!(zone2.volume(), Some(-32.0));
    assert_eq!(main.volume(), Some(-36.5));
    assert_eq!(main_changes.load(Ordering::SeqCst), 1);

    receiver.disconnect_events().await.unwrap();
    device.abort();
}

#[tokio::test]
async fn test_background_refresh_fills_the_store() {
    let mut server = Server::new_async().await;
    let _status = server
        .mock("GET", MAIN_STATUS)
        .with_status(200)
        .with_body(status("ON", "-20.0"))
        .create_async()
        .await;
    let _tone = server
        .mock("POST", APPCOMMAND)
        .with_status(200)
        .with_body(TONE_RESPONSE)
        .create_async()
        .await;
    let (host, port) = host_and_port(&server);

    let idle = Receiver::new(ReceiverConfig::new(host.clone()).with_http_port(port)).unwrap();
    assert!(!idle.start_polling().unwrap());

    let receiver = Receiver::new(
        ReceiverConfig::new(host)
            .with_http_port(port)
            .with_poll_interval(Some(Duration::from_secs(1))),
    )
    .unwrap();
    assert!(receiver.start_polling().unwrap());
    assert!(!receiver.start_polling().unwrap());
    assert!(receiver.is_polling());

    let main = receiver.main().clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while main.volume().is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("no background refresh");

    assert_eq!(main.volume(), Some(-20.0));
    receiver.stop_polling().await.unwrap();
    assert!(!receiver.is_polling());
}
