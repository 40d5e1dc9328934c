//! Description fetches against a local HTTP server

use std::time::Duration;

use avr_discovery::{describe, DiscoveryError};
use mockito::Server;
use rstest::rstest;

const TIMEOUT: Duration = Duration::from_secs(2);

fn description(manufacturer: &str, device_type: &str, presentation: Option<&str>) -> String {
    let presentation = presentation
        .map(|url| format!("<presentationURL>{}</presentationURL>", url))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>{}</deviceType>
    <friendlyName>Living Room</friendlyName>
    <manufacturer>{}</manufacturer>
    <modelName>AVR-X2700H</modelName>
    <serialNumber>BBW123</serialNumber>
    {}
  </device>
</root>"#,
        device_type, manufacturer, presentation
    )
}

#[test]
fn test_describe_receiver() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/description.xml")
        .with_status(200)
        .with_body(description(
            "Denon",
            "urn:schemas-upnp-org:device:MediaRenderer:1",
            Some("http://192.168.1.50/"),
        ))
        .create();

    let device = describe(&format!("{}/description.xml", server.url()), TIMEOUT)
        .unwrap()
        .unwrap();

    mock.assert();
    assert_eq!(device.host, "192.168.1.50");
    assert_eq!(device.name, "Living Room");
    assert_eq!(device.manufacturer, "Denon");
    assert_eq!(device.serial_number.as_deref(), Some("BBW123"));
}

#[test]
fn test_describe_uses_location_host_without_presentation_url() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/description.xml")
        .with_status(200)
        .with_body(description("Marantz", "urn:schemas-upnp-org:device:MediaRenderer:1", None))
        .create();

    let device = describe(&format!("{}/description.xml", server.url()), TIMEOUT)
        .unwrap()
        .unwrap();

    let expected_host = server.host_with_port();
    let expected_host = expected_host.split(':').next().unwrap();
    assert_eq!(device.host, expected_host);
}

#[rstest]
#[case("Sonos, Inc.", "urn:schemas-upnp-org:device:ZonePlayer:1")]
#[case("Denon", "urn:schemas-upnp-org:device:MediaServer:1")]
#[case("Yamaha", "urn:schemas-upnp-org:device:MediaRenderer:1")]
fn test_describe_ignores_other_devices(#[case] manufacturer: &str, #[case] device_type: &str) {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/description.xml")
        .with_status(200)
        .with_body(description(manufacturer, device_type, None))
        .create();

    let found = describe(&format!("{}/description.xml", server.url()), TIMEOUT).unwrap();
    assert!(found.is_none());
}

#[test]
fn test_describe_http_error() {
    let mut server = Server::new();
    let _mock = server.mock("GET", "/description.xml").with_status(404).create();

    let err = describe(&format!("{}/description.xml", server.url()), TIMEOUT).unwrap_err();
    assert!(matches!(err, DiscoveryError::NetworkError(_)));
}

#[test]
fn test_describe_malformed_document() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/description.xml")
        .with_status(200)
        .with_body("<html><body>Not here</body></html>")
        .create();

    let err = describe(&format!("{}/description.xml", server.url()), TIMEOUT).unwrap_err();
    assert!(matches!(err, DiscoveryError::ParseError(_)));
}
