use std::sync::Arc;

use gridrt_array::DistributedArray;
use gridrt_core::locality::Locality;
use gridrt_core::runtime::Grid;

#[tokio::test(flavor = "multi_thread")]
async fn scenario_one_two_localities_prefix_scan() {
    let grid = Grid::new(2);
    let array: DistributedArray<u64> = DistributedArray::create(grid, 10).await.unwrap();

    for i in 0..10u64 {
        array.insert_at(i as usize, i + 1).await.unwrap();
    }
    assert_eq!(array.len(), 10);
    assert_eq!(array.at(0).await.unwrap(), 1);
    assert_eq!(array.at(9).await.unwrap(), 10);

    array.exclusive_scan().await.unwrap();

    let expected = [0u64, 1, 3, 6, 10, 15, 21, 28, 36, 45];
    for (i, want) in expected.iter().enumerate() {
        assert_eq!(array.at(i).await.unwrap(), *want, "position {i}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_two_four_localities_with_remainder() {
    let grid = Grid::new(4);
    let array: DistributedArray<u64> = DistributedArray::create(grid, 10).await.unwrap();

    let (loc, offset) = array.partition().locate(5);
    assert_eq!(loc, Locality::new(2));
    assert_eq!(offset, 1);

    array.insert_at(5, 99).await.unwrap();
    assert_eq!(array.at(5).await.unwrap(), 99);
}

#[tokio::test(flavor = "multi_thread")]
async fn accumulate_and_min_max_over_an_odd_sequence() {
    let grid = Grid::new(3);
    let n = 20usize;
    let array: DistributedArray<u64> = DistributedArray::create(grid, n).await.unwrap();

    for i in 0..n {
        array.insert_at(i, (2 * i + 1) as u64).await.unwrap();
    }

    assert_eq!(array.min_element().await, Some(1));
    assert_eq!(array.max_element().await, Some((2 * n - 1) as u64));
    assert_eq!(array.accumulate().await, (n * n) as u64);
}

#[tokio::test(flavor = "multi_thread")]
async fn buffered_insert_is_visible_after_wait_and_flush() {
    let grid = Grid::new(3);
    let array: Arc<DistributedArray<u64>> = Arc::new(DistributedArray::create(grid, 9).await.unwrap());

    let handle = gridrt_core::handle::Handle::new();
    for i in 0..9usize {
        array.buffered_async_insert_at(&handle, i, (i * 10) as u64).unwrap();
    }
    handle.wait().await.unwrap();
    array.flush_buffers().await;

    for i in 0..9usize {
        assert_eq!(array.at(i).await.unwrap(), (i * 10) as u64);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn for_each_in_range_only_touches_the_requested_slice() {
    let grid = Grid::new(4);
    let array: DistributedArray<u64> = DistributedArray::create(grid, 12).await.unwrap();

    array.for_each(|x| *x = 1).await.unwrap();
    array.for_each_in_range(3..7, |x| *x += 100).await.unwrap();

    for i in 0..12usize {
        let want = if (3..7).contains(&i) { 101 } else { 1 };
        assert_eq!(array.at(i).await.unwrap(), want, "position {i}");
    }
}
