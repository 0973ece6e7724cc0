// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn one_turn_at_a_time() {
    let gate = TurnGate::new();
    let permit = gate.try_acquire();
    assert!(permit.is_some());
    assert!(gate.try_acquire().is_none());
    drop(permit);
    assert!(gate.try_acquire().is_some());
}

#[tokio::test]
async fn waiters_are_served_in_order() -> anyhow::Result<()> {
    let gate = Arc::new(TurnGate::new());
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let first = gate.acquire().await.map_err(anyhow::Error::new)?;

    let mut handles = Vec::new();
    for n in 0..3 {
        let gate = Arc::clone(&gate);
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            if let Ok(permit) = gate.acquire().await {
                order.lock().push(n);
                drop(permit);
            }
        }));
        // Let each waiter enqueue before the next spawns.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    drop(first);
    for handle in handles {
        handle.await?;
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn close_drains_waiters_with_failure() -> anyhow::Result<()> {
    let gate = Arc::new(TurnGate::new());
    let held = gate.acquire().await.map_err(anyhow::Error::new)?;

    let waiter = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.acquire().await.is_err() })
    };
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    gate.close();
    assert!(waiter.await?);
    drop(held);
    assert!(gate.is_closed());
    Ok(())
}
