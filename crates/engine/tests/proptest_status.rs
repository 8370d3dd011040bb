use engine::{StatusBoard, StatusChannel};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Update(u8, u16),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..5, any::<u16>()).prop_map(|(k, v)| Op::Update(k, v)),
        (0u8..5).prop_map(Op::Remove),
    ]
}

proptest! {
    /// Draining after every push leaves the board equal to a plain map
    /// that applied the same operations in order.
    #[test]
    fn board_tracks_last_value_per_key(ops in prop::collection::vec(op(), 0..60)) {
        let (publisher, mut receiver) = StatusChannel::new(4);
        let mut board = StatusBoard::new();
        let mut model: Vec<(String, String)> = Vec::new();

        for op in ops {
            match op {
                Op::Update(k, v) => {
                    let key = format!("k{k}");
                    prop_assert!(publisher.update(&key, v.to_string()));
                    match model.iter_mut().find(|(mk, _)| *mk == key) {
                        Some(entry) => entry.1 = v.to_string(),
                        None => model.push((key, v.to_string())),
                    }
                }
                Op::Remove(k) => {
                    let key = format!("k{k}");
                    prop_assert!(publisher.remove(&key));
                    model.retain(|(mk, _)| *mk != key);
                }
            }
            receiver.drain_into(&mut board);
        }

        let actual: Vec<(String, String)> = board
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        prop_assert_eq!(actual, model);
    }

    /// Draining once after many pushes gives the same board as applying
    /// them one at a time, however updates and removals interleave.
    #[test]
    fn batched_drain_preserves_send_order(ops in prop::collection::vec(op(), 0..30)) {
        let (publisher, mut receiver) = StatusChannel::new(32);
        let mut model: Vec<(String, String)> = Vec::new();

        for op in ops {
            match op {
                Op::Update(k, v) => {
                    let key = format!("k{k}");
                    prop_assert!(publisher.update(&key, v.to_string()));
                    match model.iter_mut().find(|(mk, _)| *mk == key) {
                        Some(entry) => entry.1 = v.to_string(),
                        None => model.push((key, v.to_string())),
                    }
                }
                Op::Remove(k) => {
                    let key = format!("k{k}");
                    prop_assert!(publisher.remove(&key));
                    model.retain(|(mk, _)| *mk != key);
                }
            }
        }

        let mut board = StatusBoard::new();
        receiver.drain_into(&mut board);
        let actual: Vec<(String, String)> = board
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        prop_assert_eq!(actual, model);
    }

    /// A full queue drops instead of blocking; the queue never holds more
    /// than its capacity.
    #[test]
    fn full_queue_rejects_overflow(capacity in 1usize..16, pushes in 0usize..40) {
        let (publisher, mut receiver) = StatusChannel::new(capacity);
        let accepted = (0..pushes)
            .filter(|i| publisher.update(&format!("k{i}"), "x"))
            .count();
        prop_assert_eq!(accepted, pushes.min(capacity));

        let mut board = StatusBoard::new();
        prop_assert_eq!(receiver.drain_into(&mut board), accepted);
    }
}
