//! Demo binary for `gridrt` — stands up a simulated multi-locality grid
//! and drives the distributed array and distributed map through a
//! representative sequence of operations, logging every locality-crossing
//! step via `tracing`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use gridrt_array::DistributedArray;
use gridrt_core::handle::Handle;
use gridrt_core::runtime::Grid;
use gridrt_core::telemetry;
use gridrt_distmap::DistributedMap;

#[derive(Parser)]
#[command(name = "gridrt-cli", about = "Demo driver for the gridrt distributed runtime")]
struct Cli {
    /// Number of simulated localities to stand up.
    #[arg(long, default_value_t = 4)]
    localities: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a distributed array, fill it, and run the exclusive scan.
    Array {
        /// Array length.
        #[arg(long, default_value_t = 20)]
        n: usize,
    },
    /// Build a distributed map, bulk-insert through buffered async inserts,
    /// then erase a fraction of the keys.
    Map {
        /// Number of key/value pairs to insert.
        #[arg(long, default_value_t = 1000)]
        count: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing_json();
    let cli = Cli::parse();
    let grid = Grid::new(cli.localities);
    info!(localities = cli.localities, "grid started");

    match cli.command {
        Command::Array { n } => run_array_demo(grid, n).await?,
        Command::Map { count } => run_map_demo(grid, count).await?,
    }

    Ok(())
}

async fn run_array_demo(grid: Arc<Grid>, n: usize) -> Result<()> {
    let array: DistributedArray<u64> = DistributedArray::create(grid, n).await?;
    for i in 0..n {
        array.insert_at(i, (i + 1) as u64).await?;
    }
    info!(len = array.len(), first = array.at(0).await?, last = array.at(n - 1).await?, "array filled");

    array.exclusive_scan().await?;
    let mut scanned = Vec::with_capacity(n);
    for i in 0..n {
        scanned.push(array.at(i).await?);
    }
    info!(?scanned, "exclusive scan complete");

    Ok(())
}

async fn run_map_demo(grid: Arc<Grid>, count: u64) -> Result<()> {
    let map: DistributedMap<u64, u64> = DistributedMap::create(grid, 64, 64).await?;

    let handle = Handle::new();
    for k in 0..count {
        map.buffered_async_insert(&handle, k, k + 11);
    }
    handle.wait().await?;
    map.flush_buffers().await;
    info!(size = map.size().await, "bulk insert complete");

    let handle = Handle::new();
    for k in 0..count {
        if k % 3 != 0 {
            map.async_erase(&handle, k);
        }
    }
    handle.wait().await?;
    info!(size = map.size().await, "selective erase complete");

    Ok(())
}
