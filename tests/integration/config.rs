use std::io::Write;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rattan_rem::cells::queue::{QueueMode, RemConfig, RemQueue};
use rattan_rem::cells::{Packet, StdPacket};
use rattan_rem::config::load_rem_config;
use rattan_rem::error::Error;

#[test_log::test]
fn queue_from_config_file() -> Result<(), Error> {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
    file.write_all(
        br#"{
            "mode": "bytes",
            "queue_limit": 3000,
            "target": 1000,
            "update_interval": "1ms",
            "link_bandwidth": "100Mbps"
        }"#,
    )?;
    let config = load_rem_config(file.path())?;
    assert_eq!(config.mode(), QueueMode::Bytes);

    let mut queue = RemQueue::<StdPacket>::with_config(config, StdRng::seed_from_u64(9))?;
    queue.initialize()?;
    for _ in 0..3 {
        assert!(queue.enqueue(StdPacket::from_raw_buffer(&[0; 1014])).is_accept());
    }
    assert_eq!(queue.occupancy(), 3000);
    assert!(!queue.enqueue(StdPacket::from_raw_buffer(&[0; 15])).is_accept());
    assert_eq!(queue.stats().queue_limit_drop, 1);
    Ok(())
}

#[test_log::test]
fn config_survives_json_round_trip() -> Result<(), Error> {
    let mut config = RemConfig::new();
    config
        .set_mode(QueueMode::Bytes)?
        .set_target(64_000)?
        .set_update_interval(tokio::time::Duration::from_micros(1500))?;
    let json = serde_json::to_value(&config)?;
    assert_eq!(json["mode"], "bytes");
    assert!(json["update_interval"].is_string());
    let back: RemConfig = serde_json::from_value(json)?;
    assert_eq!(back, config);
    Ok(())
}
