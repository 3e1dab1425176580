use std::time::Duration;

use la_vak_discovery::Discovery;
use la_vak_types::DeviceIdentity;

fn identity(name: &str) -> DeviceIdentity {
    DeviceIdentity {
        device_id: format!("{name}-{}", std::process::id()),
        device_name: name.to_string(),
        platform: "linux".to_string(),
        http_port: 0,
        transport_port: 0,
    }
}

/// Nodes X, Y, Z start; Y is stopped; X and Z observe Y join then leave
/// within the documented windows, and neither ever lists itself.
#[tokio::test]
async fn discovery_churn_join_and_leave() {
    let x = Discovery::new(identity("X"));
    let y = Discovery::new(identity("Y"));
    let z = Discovery::new(identity("Z"));

    x.start().await.expect("x starts");
    y.start().await.expect("y starts");
    z.start().await.expect("z starts");

    // Give the broadcaster a few ticks to announce and be observed.
    tokio::time::sleep(Duration::from_secs(4)).await;

    let x_peers = x.peers().await;
    let z_peers = z.peers().await;

    assert!(
        x_peers.iter().any(|p| p.device_name == "Y"),
        "X should see Y: {x_peers:?}"
    );
    assert!(
        z_peers.iter().any(|p| p.device_name == "Y"),
        "Z should see Y: {z_peers:?}"
    );
    assert!(x_peers.iter().all(|p| p.device_name != "X"), "X self-suppressed");
    assert!(z_peers.iter().all(|p| p.device_name != "Z"), "Z self-suppressed");

    y.stop().await;

    // PEER_TIMEOUT (10s) + one sweep tick (5s) upper bound.
    tokio::time::sleep(Duration::from_secs(16)).await;

    let x_peers = x.peers().await;
    let z_peers = z.peers().await;
    assert!(
        x_peers.iter().all(|p| p.device_name != "Y"),
        "X should evict Y: {x_peers:?}"
    );
    assert!(
        z_peers.iter().all(|p| p.device_name != "Y"),
        "Z should evict Y: {z_peers:?}"
    );

    x.stop().await;
    z.stop().await;
}
