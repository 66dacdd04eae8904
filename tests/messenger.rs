//! Protocol properties of the single-slot messenger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use traffic_manager::{DataPacket, Messenger};

/// A completed handoff returns the sent payload and moves the state
/// counter by exactly two.
#[test]
fn round_trip_advances_state_by_two() {
    let messenger = Messenger::new();
    let before = messenger.state();

    let after_send = messenger.send(DataPacket {
        id: before - 1,
        data: 42u32,
    });
    assert_eq!(after_send, before + 1);

    let packet = messenger.receive(before).expect("messenger is live");
    assert_eq!(packet.data, 42);
    assert_eq!(packet.id, before + 2);
    assert_eq!(messenger.state(), before + 2);
}

/// A producer that remembers its post-send state blocks on the next send
/// until the consumer has taken the slot, and payloads arrive in order.
#[test]
fn second_send_blocks_until_receive() {
    let messenger: Arc<Messenger<u32>> = Arc::new(Messenger::new());
    let sent_second = Arc::new(AtomicBool::new(false));

    let producer = {
        let messenger = messenger.clone();
        let sent_second = sent_second.clone();
        thread::spawn(move || {
            let state = messenger.send(DataPacket {
                id: messenger.state() - 1,
                data: 1,
            });
            messenger.send(DataPacket { id: state, data: 2 });
            sent_second.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(
        !sent_second.load(Ordering::SeqCst),
        "second send must block until a receive completes"
    );

    let first = messenger.receive(0).expect("messenger is live");
    assert_eq!(first.data, 1);

    let second = messenger.receive(first.id).expect("messenger is live");
    assert_eq!(second.data, 2);
    producer.join().unwrap();
}

/// Stopping the messenger promptly unblocks a waiting sender and makes
/// receives read as disconnected.
#[test]
fn stop_unblocks_blocked_send() {
    let messenger: Arc<Messenger<u32>> = Arc::new(Messenger::new());

    let producer = {
        let messenger = messenger.clone();
        thread::spawn(move || {
            let state = messenger.send(DataPacket {
                id: messenger.state() - 1,
                data: 1,
            });
            // Blocks: nothing has received the first payload.
            messenger.send(DataPacket { id: state, data: 2 });
        })
    };

    thread::sleep(Duration::from_millis(20));
    messenger.stop();
    producer.join().unwrap();

    assert!(messenger.receive(messenger.state()).is_none());
}

/// State snapshots never block, whatever the slot is doing.
#[test]
fn state_is_a_snapshot() {
    let messenger: Messenger<u32> = Messenger::new();
    assert_eq!(messenger.state(), 0);
    messenger.send(DataPacket { id: -1, data: 9 });
    assert_eq!(messenger.state(), 1);
}
