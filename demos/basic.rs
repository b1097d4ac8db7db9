//! Basic usage examples for ObjectPool

use esox_connector_host::{HandlerError, ObjectPool, PoolConfiguration, PoolHandler};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Hands out numbered sessions
struct Sessions {
    next: AtomicU32,
}

impl PoolHandler<String> for Sessions {
    fn make_object(&self) -> Result<String, HandlerError> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        println!("   Opening session-{id}");
        Ok(format!("session-{id}"))
    }

    fn test_object(&self, session: &String) -> Result<(), HandlerError> {
        if session.is_empty() {
            return Err("session was reset".into());
        }
        Ok(())
    }

    fn dispose_object(&self, session: String) -> Result<(), HandlerError> {
        println!("   Closing {session}");
        Ok(())
    }
}

fn sessions(config: PoolConfiguration) -> ObjectPool<String> {
    ObjectPool::new(Sessions { next: AtomicU32::new(1) }, config).unwrap()
}

fn main() {
    println!("=== Esox Connector Host - Pool Examples ===\n");

    // Example 1: Borrow and return
    simple_pool();

    // Example 2: Bounded pool with a short wait
    bounded_pool();

    // Example 3: Idle trimming
    idle_trimming();

    // Example 4: Metrics and health
    metrics_and_health();
}

fn simple_pool() {
    println!("1. Simple Pool:");
    let pool = sessions(PoolConfiguration::default());

    {
        let session = pool.borrow_object().unwrap();
        println!("   Got {} ({})", *session, session.id());
        // Returned when dropped
    }

    let again = pool.borrow_object().unwrap();
    println!("   Reused {}", *again);
    again.release().unwrap();
    println!("   Idle after return: {}\n", pool.statistics().idle);
}

fn bounded_pool() {
    println!("2. Bounded Pool:");
    let config = PoolConfiguration::new()
        .with_max_objects(1)
        .with_max_idle(1)
        .with_max_wait(Duration::from_millis(100));
    let pool = sessions(config);

    let held = pool.borrow_object().unwrap();
    match pool.borrow_object() {
        Ok(_) => println!("   Unexpectedly got a second session"),
        Err(e) => println!("   Second borrow failed: {e}"),
    }
    drop(held);

    let session = pool.borrow_object().unwrap();
    println!("   After return: got {}\n", *session);
}

fn idle_trimming() {
    println!("3. Idle Trimming:");
    let config = PoolConfiguration::new()
        .with_max_objects(4)
        .with_max_idle(1)
        .with_min_idle(0);
    let pool = sessions(config);

    let borrowed: Vec<_> = (0..4).map(|_| pool.borrow_object().unwrap()).collect();
    println!("   Active: {}", pool.statistics().active);
    drop(borrowed);
    println!("   Idle after returning all: {}\n", pool.statistics().idle);
}

fn metrics_and_health() {
    println!("4. Metrics and Health:");
    let pool = sessions(PoolConfiguration::new().with_max_objects(2).with_max_idle(2));

    {
        let _first = pool.borrow_object().unwrap();
        let _second = pool.borrow_object().unwrap();

        let health = pool.statistics().health(pool.configuration().max_objects);
        println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
        println!("   Utilization: {:.1}%", health.utilization * 100.0);
        for warning in &health.warnings {
            println!("   Warning: {warning}");
        }
    }

    println!("\n   Metrics:");
    let mut metrics: Vec<_> = pool.metrics().export().into_iter().collect();
    metrics.sort();
    for (key, value) in metrics {
        println!("     {key}: {value}");
    }

    pool.shutdown().unwrap();
}
