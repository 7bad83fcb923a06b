use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bcache_core::consts::{BLOCK_SIZE, POOL_SIZE};
use bcache_core::{BlockDevice, BlockKey, BlockNo, BufferCache, DeviceId, RamDisk, ThreadSleepLock};
use byteorder::{ByteOrder, LittleEndian};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WORKERS: u64 = 8;
const ROUNDS: u32 = 400;
const BLOCKS: BlockNo = 64;
const DEVICES: DeviceId = 2;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setup() -> (Arc<RamDisk>, BufferCache<ThreadSleepLock>) {
    init_logger();
    let disk = Arc::new(RamDisk::new(BLOCKS));
    let cache = BufferCache::new(disk.clone());
    (disk, cache)
}

fn assert_conserved(cache: &BufferCache<ThreadSleepLock>) {
    let mut seen = BTreeSet::new();
    for shard in cache.snapshot() {
        for slot in shard.slots {
            assert!(seen.insert(slot.slot), "slot {} in two shards", slot.slot);
        }
    }
    assert_eq!(seen.len(), POOL_SIZE);
}

#[test]
fn same_block_fetches_are_serialized() {
    let (disk, cache) = setup();
    let key = BlockKey::new(1, 10);
    disk.write_block(key, &[5; BLOCK_SIZE]).unwrap();

    let mut first = cache.fetch(1, 10).unwrap();
    assert!(first.is_valid());
    let entered = AtomicBool::new(false);

    thread::scope(|s| {
        let waiter = s.spawn(|| {
            let buf = cache.fetch(1, 10).unwrap();
            entered.store(true, Ordering::SeqCst);
            let seen = buf.data()[0];
            buf.release().unwrap();
            seen
        });

        // 等待者登记引用后才会阻塞在独占锁上
        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.ref_count(1, 10) != Some(2) {
            assert!(Instant::now() < deadline, "waiter never reached the buffer");
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));
        assert!(!entered.load(Ordering::SeqCst));

        // 未提交的修改只存在于缓冲槽中
        first.data_mut()[0] = 6;
        first.release().unwrap();

        assert_eq!(waiter.join().unwrap(), 6);
    });

    assert!(entered.load(Ordering::SeqCst));
    assert_eq!(disk.reads_of(key), 1);
    assert_eq!(cache.ref_count(1, 10), Some(0));
}

#[test]
fn concurrent_increments_are_not_lost() {
    let (disk, cache) = setup();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let workers: Vec<_> = (0..WORKERS)
            .map(|seed| {
                let cache = &cache;
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed);
                    for _ in 0..ROUNDS {
                        let dev = rng.gen_range(1..=DEVICES);
                        let blockno = rng.gen_range(0..BLOCKS);
                        let mut buf = cache.fetch(dev, blockno).unwrap();
                        let count = buf.read_u32(0).unwrap();
                        buf.write_u32(0, count + 1).unwrap();
                        buf.commit().unwrap();
                        buf.release().unwrap();
                    }
                })
            })
            .collect();

        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                assert_conserved(&cache);
                thread::yield_now();
            }
        });

        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, Ordering::Release);
    });

    let total: u64 = (1..=DEVICES)
        .flat_map(|dev| (0..BLOCKS).map(move |b| BlockKey::new(dev, b)))
        .map(|key| LittleEndian::read_u32(&disk.peek(key)[..4]) as u64)
        .sum();
    assert_eq!(total, WORKERS * ROUNDS as u64);

    let stats = cache.stats();
    assert_eq!(stats.total_accesses, WORKERS * ROUNDS as u64);
    assert_eq!(stats.hits + stats.misses, stats.total_accesses);
    assert_eq!(stats.device_writes, WORKERS * ROUNDS as u64);
    assert!(stats.evictions > 0);
    assert!(stats.max_foreign_locks_held <= 1);

    assert_conserved(&cache);
    for shard in cache.snapshot() {
        assert!(shard.slots.iter().all(|s| s.refcnt == 0));
    }
}

#[test]
fn pinned_blocks_survive_pressure() {
    let (disk, cache) = setup();
    let pinned: Vec<_> = (0..4)
        .map(|b| {
            let mut buf = cache.fetch(1, b).unwrap();
            buf.write_u32(4, b + 100).unwrap();
            let pin = buf.pin().unwrap();
            buf.release().unwrap();
            pin
        })
        .collect();

    thread::scope(|s| {
        for seed in 0..4 {
            let cache = &cache;
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed + 100);
                for _ in 0..ROUNDS {
                    let blockno = rng.gen_range(4..BLOCKS);
                    drop(cache.fetch(2, blockno).unwrap());
                }
            });
        }
    });

    // 修改没有提交，只有块一直留在缓存里才能读到
    for (b, pin) in (0..4).zip(pinned) {
        let buf = pin.fetch().unwrap();
        assert_eq!(buf.read_u32(4).unwrap(), b + 100);
        assert_eq!(disk.reads_of(BlockKey::new(1, b)), 1);
        drop(buf);
        pin.unpin().unwrap();
    }
    assert_eq!(cache.stats().max_foreign_locks_held, 1);
}
