// tests/trigger_properties.rs
//! Property tests for the rising-edge detector
//!
//! The detector must produce the same windows no matter how the input stream
//! is cut into chunks, and a single crossing must yield exactly one window
//! equal to `stream[i - pre .. i + post]`.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scope_core::processing::{RisingEdgeTrigger, TriggerConfig, TriggerWindow};

fn detector(threshold: u8, pre: usize, post: usize) -> RisingEdgeTrigger {
    RisingEdgeTrigger::new(TriggerConfig {
        threshold,
        pre_samples: pre,
        post_samples: post,
    })
    .expect("valid trigger config")
}

/// Feed `stream` in pieces whose sizes cycle through `cuts`
fn feed_chunked(trigger: &mut RisingEdgeTrigger, stream: &[u8], cuts: &[usize]) -> Vec<TriggerWindow> {
    let mut windows = Vec::new();
    let mut offset = 0;
    let mut sizes = cuts.iter().cycle();
    while offset < stream.len() {
        let size = sizes.next().copied().unwrap_or(1).max(1).min(stream.len() - offset);
        windows.extend(trigger.push(&stream[offset..offset + size]));
        offset += size;
    }
    windows
}

/// Samples at or below the threshold before `crossing`, strictly above from
/// `crossing` on
fn single_crossing_stream(threshold: u8, crossing: usize, len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|i| {
            if i == 0 {
                0
            } else if i < crossing {
                rng.gen_range(0..=threshold)
            } else {
                rng.gen_range(threshold + 1..=255)
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn single_crossing_yields_exact_window(
        threshold in 1u8..=254,
        pre in 1usize..64,
        post in 1usize..64,
        lead in 0usize..64,
        tail in 0usize..64,
        seed in any::<u64>(),
        cuts in prop::collection::vec(1usize..50, 1..20),
    ) {
        let crossing = pre + lead;
        let stream = single_crossing_stream(threshold, crossing, crossing + post + tail, seed);

        let mut trigger = detector(threshold, pre, post);
        let windows = feed_chunked(&mut trigger, &stream, &cuts);

        prop_assert_eq!(windows.len(), 1);
        prop_assert_eq!(windows[0].crossing_index(), crossing as u64);
        prop_assert_eq!(windows[0].samples(), &stream[crossing - pre..crossing + post]);
        prop_assert!(!trigger.is_pending());
    }

    #[test]
    fn crossing_without_history_emits_nothing(
        threshold in 1u8..=254,
        pre in 2usize..64,
        post in 1usize..64,
        seed in any::<u64>(),
        cuts in prop::collection::vec(1usize..50, 1..20),
    ) {
        let crossing = 1 + (seed as usize % (pre - 1));
        let stream = single_crossing_stream(threshold, crossing, crossing + post + 10, seed);

        let mut trigger = detector(threshold, pre, post);
        let windows = feed_chunked(&mut trigger, &stream, &cuts);

        prop_assert!(windows.is_empty());
        prop_assert_eq!(trigger.counters().crossings_skipped, 1);
    }

    #[test]
    fn chunking_does_not_change_windows(
        stream in prop::collection::vec(any::<u8>(), 0..2000),
        threshold in 1u8..=254,
        pre in 1usize..40,
        post in 1usize..40,
        cuts in prop::collection::vec(1usize..300, 1..10),
    ) {
        let whole = detector(threshold, pre, post).push(&stream);
        let chunked = feed_chunked(&mut detector(threshold, pre, post), &stream, &cuts);
        prop_assert_eq!(&whole, &chunked);

        // Full length, no overlap, no duplicates
        for window in &chunked {
            prop_assert_eq!(window.len(), pre + post);
            let start = window.crossing_index() as usize - pre;
            prop_assert_eq!(window.samples(), &stream[start..start + pre + post]);
        }
        for pair in chunked.windows(2) {
            prop_assert!(pair[1].crossing_index() >= pair[0].crossing_index() + post as u64);
        }
    }
}

#[test]
fn deferred_crossing_in_last_post_samples_emits_once() {
    // Crossing falls within the last post-1 bytes of the first chunk
    for offset_from_end in 1..50usize {
        let first_len = 500;
        let crossing = first_len - offset_from_end;
        let stream = single_crossing_stream(180, crossing, first_len + 100, offset_from_end as u64);

        let mut trigger = detector(180, 50, 50);
        let mut windows = trigger.push(&stream[..first_len]);
        assert!(windows.is_empty());
        windows.extend(trigger.push(&stream[first_len..]));

        assert_eq!(windows.len(), 1, "crossing {} emitted {} windows", crossing, windows.len());
        assert_eq!(windows[0].samples(), &stream[crossing - 50..crossing + 50]);
    }
}
