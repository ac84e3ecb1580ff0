//! Integration tests for the first-ready-wins merge and source/sink plumbing

mod common;

use common::{delayed_source, test_runtime};
use effio::prelude::*;
use effio::{ChannelStatus, ErrorCode, Runtime, RuntimeConfig};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

#[test]
fn test_merge_take_one_yields_fastest_source() {
    let runtime = test_runtime();
    let merged = Source::merge(vec![
        delayed_source(1, Duration::from_millis(50)),
        delayed_source(2, Duration::from_millis(10)),
    ]);

    assert_eq!(runtime.execute(&merged.take(1).collect()).unwrap(), vec![2]);
}

#[test]
fn test_merge_collects_each_item_exactly_once() {
    let runtime = test_runtime();
    let mut rng = rand::rng();

    for round in 0..5 {
        let count = 8 + round * 4;
        let sources: Vec<Source<usize>> = (0..count)
            .map(|i| delayed_source(i, Duration::from_millis(rng.random_range(0..20))))
            .collect();

        let items = runtime.execute(&Source::merge(sources).collect()).unwrap();

        assert_eq!(items.len(), count);
        let unique: HashSet<usize> = items.iter().copied().collect();
        assert_eq!(unique, (0..count).collect::<HashSet<_>>());
    }
}

#[test]
fn test_merge_of_channels_with_concurrent_writers() {
    let runtime = test_runtime();
    let channels: Vec<Channel<(usize, usize)>> = (0..4).map(|_| Channel::unbounded()).collect();

    for (writer, channel) in channels.iter().enumerate() {
        let channel = channel.clone();
        runtime.handle().spawn(async move {
            for seq in 0..25 {
                channel.post((writer, seq)).unwrap();
                if seq % 5 == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
            channel.complete().unwrap();
        });
    }

    let merged = Source::merge(channels.iter().cloned().map(Source::channel));
    let items = runtime.execute(&merged.collect()).unwrap();

    assert_eq!(items.len(), 100);
    for writer in 0..4 {
        let sequence: Vec<usize> = items
            .iter()
            .filter(|(w, _)| *w == writer)
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(sequence, (0..25).collect::<Vec<_>>());
    }
}

#[test]
fn test_merge_of_nothing_fails_closed() {
    let runtime = test_runtime();
    let err = runtime
        .execute(&Source::<u8>::merge(Vec::new()).collect())
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::CLOSED_SOURCE);
}

#[test]
fn test_cancelled_merge_stops_waiting() {
    let runtime = test_runtime();
    let idle = Channel::<u8>::unbounded();
    let merged = Source::channel(idle.clone()).merge_with(Source::channel(idle));

    let effect = merged
        .collect()
        .fork(None)
        .bind(|reader| {
            let joined = reader.clone();
            Effect::sleep(Duration::from_millis(10))
                .bind(move |_| reader.cancel())
                .bind(move |_| joined.join())
        });

    let err = runtime.execute(&effect).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_producer_pipes_into_combined_sinks() {
    let runtime = Runtime::new(RuntimeConfig::default().with_channel_capacity(2)).unwrap();
    let audit = Channel::unbounded();
    let output = Channel::unbounded();

    let producer = Source::from_producer(|sink: Sink<u32>| {
        Effect::sequence((1..=10).map(move |n| sink.post(n))).map(|_| ())
    });
    let sink = Sink::combine(Sink::channel(audit.clone()), Sink::channel(output.clone()));

    runtime.execute(&producer.filter(|n| n % 2 == 1).pipe(sink)).unwrap();

    for channel in [audit, output] {
        assert_eq!(channel.status(), ChannelStatus::Completed);
        let mut drained = Vec::new();
        while let Some(n) = channel.try_read() {
            drained.push(n);
        }
        assert_eq!(drained, vec![1, 3, 5, 7, 9]);
    }
}

#[test]
fn test_sink_post_after_complete_is_an_error_value() {
    let runtime = test_runtime();
    let sink = Sink::<i32>::void();

    let effect = sink.complete().bind({
        let sink = sink.clone();
        move |_| sink.post(1)
    });

    let err = runtime.execute(&effect).unwrap_err();
    assert!(err.is_closed());
    assert_eq!(err.code(), ErrorCode::CLOSED_SINK);
}
