use optisync_signals::*;
mod common;
use common::change_watcher;
use std::sync::Arc;

#[test]
fn test_read_follows_mut() {
    let signal = Mut::new(42);
    let read = signal.read();
    assert_eq!(read.get(), 42);
    signal.set(43);
    assert_eq!(read.get(), 43);
    assert_eq!(read.with(|v| *v * 2), 86);
    assert_eq!(format!("{read}"), "43");
}

#[test]
fn test_subscribe_skips_current_value() {
    let name = Mut::new("Buffy".to_string());
    let (watcher, check) = change_watcher();
    let _guard = name.read().subscribe(move |value: String| watcher(value));

    assert_eq!(check(), [] as [String; 0]);
    name.set("Willow".to_string());
    name.set("Xander".to_string());
    assert_eq!(check(), ["Willow".to_string(), "Xander".to_string()]);
}

#[test]
fn test_many_readers_share_one_value() {
    let signal = Mut::new(vec![1, 2]);
    let readers: Vec<Read<Vec<i32>>> = (0..3).map(|_| signal.read()).collect();
    signal.update(|v| {
        v.push(3);
        true
    });
    for reader in &readers {
        assert_eq!(reader.get(), vec![1, 2, 3]);
    }
}

#[tokio::test]
async fn test_wait_for_returns_predicate_output() {
    let signal = Arc::new(Mut::new(None::<u32>));
    let writer = {
        let signal = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            signal.set(Some(7));
        })
    };
    let value = signal.read().wait_for(|v| *v).await;
    assert_eq!(value, 7);
    writer.await.unwrap();
}

#[test]
fn test_update_without_change_does_not_notify() {
    let count = Mut::new(1);
    let (watcher, check) = change_watcher();
    let guard = count.read().subscribe(move |value: i32| watcher(value));

    count.update(|_| false);
    assert_eq!(check(), [] as [i32; 0]);
    count.update(|v| {
        *v += 1;
        true
    });
    assert_eq!(check(), [2]);

    drop(guard);
    count.set(5);
    assert_eq!(check(), [] as [i32; 0]);
}

#[tokio::test]
async fn test_wait_for_resolves_immediately_when_satisfied() {
    let signal = Mut::new(3u32);
    let value = signal.read().wait_for(|v| if *v >= 3 { Some(*v) } else { None }).await;
    assert_eq!(value, 3);
}
