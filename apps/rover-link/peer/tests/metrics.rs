use futures_util::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use rover_link_peer::{spawn, PeerConfig};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

// The recorder is process-global, so this binary holds a single test.
#[test_timeout::tokio_timeout_test]
async fn metrics_endpoint_reports_peer_counters() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("install recorder");
    let peer = spawn(PeerConfig::ephemeral(), Some(handle.clone()))
        .await
        .expect("spawn peer");

    let (mut client, _) = connect_async(peer.url()).await.expect("connect");
    client
        .send(Message::Text(r#"{"cmd":"move","dir":"forward"}"#.to_owned().into()))
        .await
        .expect("send");
    client
        .send(Message::Text(r#"{"cmd":"warp"}"#.to_owned().into()))
        .await
        .expect("send");
    client
        .send(Message::Text(r#"{"cmd":"camera","angle":5}"#.to_owned().into()))
        .await
        .expect("send");
    for _ in 0..2 {
        loop {
            match client.next().await.expect("open").expect("frame") {
                Message::Text(_) => break,
                _ => continue,
            }
        }
    }

    let body = reqwest::get(format!("http://{}/metrics", peer.local_addr()))
        .await
        .expect("metrics")
        .error_for_status()
        .expect("metrics status")
        .text()
        .await
        .expect("metrics body");

    assert!(body.contains(r#"rover_peer_commands_total{cmd="move"} 1"#), "{body}");
    assert!(body.contains(r#"rover_peer_commands_total{cmd="camera"} 1"#), "{body}");
    assert!(
        body.contains(r#"rover_peer_decode_failures_total{reason="unknown_command"} 1"#),
        "{body}"
    );
    assert!(body.contains("rover_peer_connections_active"), "{body}");
    assert!(body.contains("rover_peer_reports_total"), "{body}");

    peer.shutdown().await.expect("shutdown");
}
