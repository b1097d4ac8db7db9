//! Async usage examples

use esox_connector_host::{HandlerError, ObjectPool, PoolConfiguration, PoolHandler};
use std::time::Duration;
use tokio::time::sleep;

struct Numbers;

impl PoolHandler<u64> for Numbers {
    fn make_object(&self) -> Result<u64, HandlerError> {
        println!("   Creating new object...");
        Ok(42)
    }
}

#[tokio::main]
async fn main() {
    println!("=== Esox Connector Host - Async Examples ===\n");

    // Example 1: Async borrow
    async_borrow().await;

    // Example 2: Async borrow running into max_wait
    async_with_timeout().await;

    // Example 3: Concurrent access
    concurrent_access().await;
}

async fn async_borrow() {
    println!("1. Async Borrow:");
    let pool = ObjectPool::new(Numbers, PoolConfiguration::default()).unwrap();

    {
        let obj = pool.borrow_object_async().await.unwrap();
        println!("   Got object asynchronously: {}", *obj);
    }

    println!();
}

async fn async_with_timeout() {
    println!("2. Async with Timeout:");

    let config = PoolConfiguration::new()
        .with_max_objects(1)
        .with_max_idle(1)
        .with_max_wait(Duration::from_millis(100));
    let pool = ObjectPool::new(Numbers, config).unwrap();

    // Hold the only object
    let _obj = pool.borrow_object().unwrap();

    match pool.borrow_object_async().await {
        Ok(_) => println!("   Got object"),
        Err(e) => println!("   Error: {e}"),
    }

    println!();
}

async fn concurrent_access() {
    println!("3. Concurrent Access:");

    let config = PoolConfiguration::new()
        .with_max_objects(3)
        .with_max_idle(3)
        .with_max_wait(Duration::from_millis(500));
    let pool = ObjectPool::new(Numbers, config).unwrap();

    let mut handles = vec![];

    for i in 0..10 {
        let pool = pool.clone();
        let handle = tokio::spawn(async move {
            match pool.borrow_object_async().await {
                Ok(obj) => {
                    println!("   Task {i} got object {}", obj.id());
                    sleep(Duration::from_millis(50)).await;
                }
                Err(e) => println!("   Task {i} couldn't get object: {e}"),
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let stats = pool.statistics();
    println!("   Final idle: {}, active: {}", stats.idle, stats.active);
}
