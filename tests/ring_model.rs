//! Checks the target ring against a simple queue model.

use std::collections::VecDeque;

use proptest::prelude::*;
use swd_serial::Error;
use swd_serial::ring::RingBuffer;

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    PushAll(Vec<u8>),
    Pop,
    Reset,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u8>().prop_map(Op::Push),
        2 => prop::collection::vec(any::<u8>(), 0..5).prop_map(Op::PushAll),
        4 => Just(Op::Pop),
        1 => Just(Op::Reset),
    ]
}

fn run<const N: usize>(ops: &[Op]) {
    let ring = RingBuffer::<N>::new();
    let mut model = VecDeque::new();

    for op in ops {
        match op {
            Op::Push(byte) => {
                let result = ring.try_push(*byte);
                if model.len() < N - 1 {
                    assert_eq!(result, Ok(()));
                    model.push_back(*byte);
                } else {
                    assert_eq!(result, Err(Error::BufferFull));
                }
            }
            Op::PushAll(bytes) => {
                let result = ring.try_push_all(bytes);
                if model.len() + bytes.len() < N {
                    assert_eq!(result, Ok(()));
                    model.extend(bytes.iter().copied());
                } else {
                    assert_eq!(result, Err(Error::BufferFull));
                }
            }
            Op::Pop => assert_eq!(ring.try_pop(), model.pop_front()),
            Op::Reset => {
                ring.reset();
                model.clear();
            }
        }

        assert_eq!(ring.len(), model.len());
        assert_eq!(ring.free(), N - 1 - model.len());
        assert_eq!(ring.is_empty(), model.is_empty());
        assert_eq!(ring.is_full(), model.len() == N - 1);

        let cb = ring.control_block();
        assert!(cb.head < N as u32 && cb.tail < N as u32);
        assert_eq!(cb.len(), model.len());
    }

    // Whatever is left drains in order, leaving the ring empty
    while let Some(expected) = model.pop_front() {
        assert_eq!(ring.try_pop(), Some(expected));
    }
    assert_eq!(ring.try_pop(), None);
}

proptest! {
    #[test]
    fn smallest_ring_matches_model(ops in prop::collection::vec(op(), 0..200)) {
        run::<2>(&ops);
    }

    #[test]
    fn odd_ring_matches_model(ops in prop::collection::vec(op(), 0..200)) {
        run::<3>(&ops);
    }

    #[test]
    fn default_rx_ring_matches_model(ops in prop::collection::vec(op(), 0..400)) {
        run::<16>(&ops);
    }

    #[test]
    fn large_ring_matches_model(ops in prop::collection::vec(op(), 0..400)) {
        run::<64>(&ops);
    }
}

#[test]
fn holds_one_less_than_capacity() {
    let ring = RingBuffer::<16>::new();
    for byte in 1..=15 {
        ring.try_push(byte).unwrap();
    }
    assert_eq!(ring.try_push(16), Err(Error::BufferFull));
    assert_eq!(ring.try_push_all(&[]), Ok(()));
    assert_eq!(ring.len(), 15);
}
