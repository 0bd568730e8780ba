//! Submissions racing through a shared registry and ledger.
//!
//! Whatever order the tasks land in, the newest state wins and the
//! escrow pays out once.

mod common;

use std::sync::Arc;

use common::{Harness, after_sub_timeout, t0};
use metachannel_types::{Amount, ChannelError};
use tokio::sync::Mutex;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_submissions_keep_the_newest_state() {
    let mut h = Harness::funded();
    let sub_v0 = h.new_sub("salt1", 0, 10);
    h.update(sub_v0.clone(), 10, 10);
    let sub_v1 = sub_v0.with_payment(Amount::ether(1), Amount::ether(9));
    h.update(sub_v1.clone(), 10, 10);
    h.deploy();

    let ctf = h.metachannel_address();
    let submitter = h.a.address();
    let channel_id = sub_v0.channel_id;
    let submissions = [
        (h.history[1].clone(), sub_v0),
        (h.history[2].clone(), sub_v1),
    ];
    let registry = Arc::new(Mutex::new(h.registry));

    let mut handles = Vec::new();
    for (snapshot, sub) in submissions {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            let proof = snapshot.proof(&sub);
            let mut registry = registry.lock().await;
            registry
                .get_mut(&ctf)?
                .start_settle_state_subchannel(&proof, &snapshot.meta, sub, submitter, t0())
        }));
    }
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(()) => {}
            Err(ChannelError::StaleState {
                submitted,
                accepted,
            }) => assert_eq!((submitted, accepted), (0, 1)),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let registry = registry.lock().await;
    let record = registry.get(&ctf).unwrap().subchannel(&channel_id).unwrap();
    assert_eq!(record.sequence, 1);
    assert_eq!(record.state.balance_a, Amount::ether(1));
    assert_eq!(registry.get(&ctf).unwrap().metachannel().highest_sequence_seen, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_releases_pay_once() {
    let mut h = Harness::funded();
    let (sub1, _) = h.standard_history();
    h.deploy();
    h.dispute(4, &sub1, t0()).unwrap();
    h.metachannel()
        .close_with_timeout_subchannel(&sub1.channel_id, after_sub_timeout())
        .unwrap();

    let id = h.agreement;
    let (a, b) = (h.a.address(), h.b.address());
    let registry = Arc::new(h.registry);
    let ledger = Arc::new(Mutex::new(h.ledger));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let (registry, ledger) = (Arc::clone(&registry), Arc::clone(&ledger));
        let channel_id = sub1.channel_id;
        handles.push(tokio::spawn(async move {
            ledger
                .lock()
                .await
                .release_subchannel(id, &registry, &channel_id)
        }));
    }
    let mut paid = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => paid += 1,
            Err(err) => assert!(matches!(err, ChannelError::AlreadyReleased { .. })),
        }
    }
    assert_eq!(paid, 1);

    let ledger = ledger.lock().await;
    assert_eq!(ledger.balance_of(&a), Amount::ether(1));
    assert_eq!(ledger.balance_of(&b), Amount::ether(9));
    assert_eq!(ledger.held(&id).unwrap(), Amount::ether(20));
}
