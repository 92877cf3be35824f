use rand::rngs::StdRng;
use rand::SeedableRng;
use rattan_rem::cells::queue::{QueueMode, RemConfig, RemQueue, RemStats, Verdict};
use rattan_rem::cells::{Packet, StdPacket};
use rattan_rem::error::Error;
use tracing::{info, span, Level};

// 1000 bytes at the network layer, one mean-sized packet
const FRAME_LENGTH: usize = 1014;
const MEAN_PACKET_SIZE: usize = 1000;
// Update rule runs between two consecutive arrivals
const TICKS_PER_PACKET: usize = 20;

fn frame(tag: u8) -> StdPacket {
    let mut buf = vec![0u8; FRAME_LENGTH];
    buf[0] = tag;
    StdPacket::from_raw_buffer(&buf)
}

fn scaled(mode: QueueMode, packets: usize) -> usize {
    match mode {
        QueueMode::Bytes => packets * MEAN_PACKET_SIZE,
        QueueMode::Packets => packets,
    }
}

fn scenario_config(mode: QueueMode, target: usize) -> Result<RemConfig, Error> {
    let mut config = RemConfig::new();
    config
        .set_mode(mode)?
        .set_queue_limit(scaled(mode, 300))?
        .set_target(scaled(mode, target))?;
    Ok(config)
}

fn fill_and_drain(mode: QueueMode, target: usize, seed: u64) -> Result<RemStats, Error> {
    let mut queue = RemQueue::<StdPacket>::with_config(
        scenario_config(mode, target)?,
        StdRng::seed_from_u64(seed),
    )?;
    queue.initialize()?;

    let mut accepted = 0;
    for i in 0..300 {
        for _ in 0..TICKS_PER_PACKET {
            queue.run_update();
        }
        if queue.enqueue(frame(i as u8)).is_accept() {
            accepted += 1;
        }
    }
    assert_eq!(queue.len(), accepted);
    while queue.dequeue().is_some() {}
    assert!(queue.is_empty());

    let stats = queue.stats();
    info!(?mode, target, accepted, ?stats, "Fill and drain");
    Ok(stats)
}

#[test_log::test]
fn no_drops_below_target() -> Result<(), Error> {
    for mode in [QueueMode::Packets, QueueMode::Bytes] {
        let _span = span!(Level::INFO, "no_drops_below_target", %mode).entered();
        let mut queue = RemQueue::<StdPacket>::with_config(
            scenario_config(mode, 20)?,
            StdRng::seed_from_u64(1),
        )?;
        queue.initialize()?;

        for i in 1..=8 {
            assert_eq!(queue.enqueue(frame(i as u8)), Verdict::Accept);
            assert_eq!(queue.occupancy(), scaled(mode, i));
        }
        for i in 1..=8 {
            let packet = queue.dequeue().ok_or(Error::Custom("queue ran dry".into()))?;
            assert_eq!(packet.as_slice()[0], i as u8);
        }
        assert!(queue.is_empty());
        assert_eq!(queue.occupancy(), 0);
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.stats(), RemStats::default());
    }
    Ok(())
}

#[test_log::test]
fn early_drops_above_target() -> Result<(), Error> {
    for mode in [QueueMode::Packets, QueueMode::Bytes] {
        let _span = span!(Level::INFO, "early_drops_above_target", %mode).entered();
        let stats = fill_and_drain(mode, 100, 11)?;
        assert!(stats.unforced_drop > 0);
        assert_eq!(stats.queue_limit_drop, 0);
    }
    Ok(())
}

#[test_log::test]
fn higher_target_relaxes_dropping() -> Result<(), Error> {
    for mode in [QueueMode::Packets, QueueMode::Bytes] {
        let _span = span!(Level::INFO, "higher_target_relaxes_dropping", %mode).entered();
        let tight = fill_and_drain(mode, 100, 11)?;
        let relaxed = fill_and_drain(mode, 150, 11)?;
        assert!(relaxed.unforced_drop < tight.unforced_drop);
        assert_eq!(relaxed.queue_limit_drop, 0);
    }
    Ok(())
}

#[test_log::test]
fn byte_mode_matches_packet_mode() -> Result<(), Error> {
    for seed in [3, 11, 29] {
        assert_eq!(
            fill_and_drain(QueueMode::Packets, 100, seed)?,
            fill_and_drain(QueueMode::Bytes, 100, seed)?
        );
    }
    Ok(())
}

#[test_log::test]
fn full_queue_drops_without_random_draw() -> Result<(), Error> {
    let mut config = RemConfig::new();
    config.set_queue_limit(4)?;
    let mut queue = RemQueue::<StdPacket>::with_config(config, StdRng::seed_from_u64(5))?;
    queue.initialize()?;

    for i in 0..4 {
        assert!(queue.enqueue(frame(i)).is_accept());
    }
    for i in 4..10 {
        assert_eq!(queue.enqueue(frame(i)), Verdict::DropForced);
    }
    assert_eq!(queue.stats().queue_limit_drop, 6);
    assert_eq!(queue.stats().unforced_drop, 0);
    assert_eq!(queue.controller().arrivals(), 4);
    assert_eq!(queue.len(), 4);
    Ok(())
}

#[test_log::test]
fn reseeding_reproduces_drops() -> Result<(), Error> {
    let run = |stream: u64| -> Result<RemStats, Error> {
        let mut queue = RemQueue::<StdPacket>::with_config(
            scenario_config(QueueMode::Packets, 100)?,
            StdRng::seed_from_u64(0),
        )?;
        assert_eq!(queue.assign_streams(stream), 1);
        queue.initialize()?;
        for i in 0..300 {
            for _ in 0..TICKS_PER_PACKET {
                queue.run_update();
            }
            let _ = queue.enqueue(frame(i as u8));
        }
        Ok(queue.stats())
    };
    assert_eq!(run(17)?, run(17)?);
    assert_eq!(run(17)?, fill_and_drain(QueueMode::Packets, 100, 17)?);
    Ok(())
}
