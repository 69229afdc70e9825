use gridrt_core::handle::Handle;
use gridrt_core::runtime::Grid;
use gridrt_distmap::DistributedMap;

#[tokio::test(flavor = "multi_thread")]
async fn scenario_three_buffered_bulk_insert_then_selective_erase() {
    let grid = Grid::new(5);
    let map: DistributedMap<u64, u64> = DistributedMap::create(grid, 64, 64).await.unwrap();

    let handle = Handle::new();
    for k in 0..10000u64 {
        map.buffered_async_insert(&handle, k, k + 11);
    }
    handle.wait().await.unwrap();
    map.flush_buffers().await;

    assert_eq!(map.size().await, 10000);
    for k in 0..10000u64 {
        assert_eq!(map.lookup(k).await, Some(k + 11));
    }

    let handle = Handle::new();
    for k in 0..10000u64 {
        if k % 3 != 0 {
            map.async_erase(&handle, k);
        }
    }
    handle.wait().await.unwrap();

    let expected_remaining = (0..10000u64).filter(|k| k % 3 == 0).count();
    assert_eq!(expected_remaining, 3334, "ceil(10000 / 3)");
    assert_eq!(map.size().await, expected_remaining);

    for k in 0..10000u64 {
        if k % 3 == 0 {
            assert_eq!(map.lookup(k).await, Some(k + 11));
        } else {
            assert_eq!(map.lookup(k).await, None);
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_six_replicated_insert_converges_to_one_entry() {
    let grid = Grid::new(8);
    let map: DistributedMap<u64, u64> = DistributedMap::create(grid.clone(), 8, 8).await.unwrap();

    let handle = Handle::new();
    for _ in 0..grid.num_localities() {
        map.async_insert(&handle, 42, 7);
    }
    handle.wait().await.unwrap();

    assert_eq!(map.size().await, 1);
    assert_eq!(map.lookup(42).await, Some(7));
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_then_insert_observes_a_clean_slate() {
    let grid = Grid::new(4);
    let map: DistributedMap<u64, u64> = DistributedMap::create(grid, 4, 4).await.unwrap();
    for k in 0..500u64 {
        map.insert(k, k).await;
    }
    map.clear().await;
    assert_eq!(map.size().await, 0);
    map.insert(1, 99).await;
    assert_eq!(map.lookup(1).await, Some(99));
    assert_eq!(map.size().await, 1);
}
