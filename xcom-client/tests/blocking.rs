mod common;

use common::{fast_config, installation, serve, Device};
use xcom_client::{BlockingClient, ClientBuilder, ValuesItem, ValuesRequest};
use xcom_core::{AggregationType, Value};
use xcom_dataset::FamilyId;
use xcom_transport::StreamTransport;

#[test]
fn test_blocking_client() {
    let device = Device::new(installation());
    let (client_side, device_side) = tokio::io::duplex(16 * 1024);
    let server = std::thread::spawn({
        let device = device.clone();
        move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(serve(device_side, device));
        }
    });

    let client = ClientBuilder::new()
        .config(fast_config())
        .build_with(StreamTransport::new(client_side))
        .unwrap();
    let client = BlockingClient::new(client).unwrap();
    client.start().unwrap();
    assert!(client.is_connected());

    let output_power = client.dataset().get_by_nr(3023, Some(FamilyId::Xt)).unwrap().clone();
    let charge_current = client.dataset().get_by_nr(1138, Some(FamilyId::Xt)).unwrap().clone();

    assert_eq!(
        client.request_value(&output_power, "XT1").unwrap(),
        Value::Float(1500.0)
    );
    client
        .update_value(&charge_current, Value::Float(25.0), "XT1")
        .unwrap();
    assert_eq!(
        client.request_value(&charge_current, "XT1").unwrap(),
        Value::Float(60.0)
    );

    let request = ValuesRequest::new(vec![ValuesItem::aggregated(
        &output_power,
        AggregationType::Sum,
    )]);
    let response = client.request_infos(&request).unwrap();
    assert_eq!(response.items[0].value(), Some(&Value::Float(2500.0)));
    assert_eq!(client.statistics().requests, 4);

    client.stop().unwrap();
    assert!(!client.is_connected());
    server.join().unwrap();
    assert_eq!(device.requests(), 4);
}
