//! End-to-end flows through the engine over the in-memory store, including
//! the concurrency properties the storage compare-and-set discipline is
//! meant to guarantee.

use accord_engine::{
    Accord, EngineConfig, EngineError, MemoryDirectory, MemorySink, NewContract,
    NotificationEvent, ShareOutcome, ShareRecipient,
};
use accord_storage::memory::InMemoryAccordStorage;
use accord_storage::{CollaboratorStore, ContractStore};
use accord_types::{
    Act, AmendmentChanges, AmendmentKind, ConsentMethod, ContractStatus, UserId,
};
use chrono::Utc;
use std::sync::Arc;

struct Harness {
    accord: Arc<Accord<InMemoryAccordStorage>>,
    store: Arc<InMemoryAccordStorage>,
    sink: Arc<MemorySink>,
}

fn harness(users: &[&str]) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = Arc::new(InMemoryAccordStorage::new());
    let directory = Arc::new(MemoryDirectory::with_users(
        users.iter().map(|u| UserId::new(*u)),
    ));
    let sink = Arc::new(MemorySink::new());
    let accord = Arc::new(Accord::new(
        store.clone(),
        directory,
        sink.clone(),
        EngineConfig::default(),
    ));
    Harness {
        accord,
        store,
        sink,
    }
}

fn signature_draft(owner: &str) -> NewContract {
    NewContract {
        owner_id: UserId::new(owner),
        method: ConsentMethod::Signature,
        encounter_type: "date".to_string(),
        acts: vec![Act::Kissing, Act::Massage],
        start_time: Utc::now(),
        duration_minutes: 120,
        parties: vec!["Owner".to_string()],
        participants: vec![],
    }
}

#[tokio::test]
async fn share_approve_activate_flow() {
    let h = harness(&["owner", "riley"]);
    let owner = UserId::new("owner");
    let riley = UserId::new("riley");

    let contract = h
        .accord
        .contracts
        .create_contract(signature_draft("owner"))
        .await
        .unwrap();

    h.accord
        .collaboration
        .share(
            &contract.id,
            &owner,
            "owner@example.com",
            ShareRecipient::User(riley.clone()),
        )
        .await
        .unwrap();

    let current = h.store.get_contract(&contract.id).await.unwrap().unwrap();
    assert_eq!(current.status, ContractStatus::PendingApproval);

    assert!(h.accord.approvals.approve(&contract.id, &riley).await.unwrap());
    let current = h.store.get_contract(&contract.id).await.unwrap().unwrap();
    assert_eq!(current.status, ContractStatus::Active);

    // The activation event was dispatched after the fact.
    assert!(h
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, NotificationEvent::ContractActivated { contract_id } if contract_id == &contract.id)));
}

#[tokio::test]
async fn direct_creation_confirmation_flow() {
    let h = harness(&["owner", "riley"]);
    let owner = UserId::new("owner");
    let riley = UserId::new("riley");

    let mut draft = signature_draft("owner");
    draft.method = ConsentMethod::Voice;
    draft.participants = vec![riley.clone()];
    let contract = h.accord.contracts.create_contract(draft).await.unwrap();
    assert_eq!(contract.status, ContractStatus::Draft);

    let outcome = h
        .accord
        .confirmations
        .confirm(&contract.id, &owner)
        .await
        .unwrap();
    assert!(!outcome.all_confirmed);
    assert_eq!(outcome.contract_status, ContractStatus::Draft);

    let outcome = h
        .accord
        .confirmations
        .confirm(&contract.id, &riley)
        .await
        .unwrap();
    assert!(outcome.all_confirmed);
    assert_eq!(outcome.contract_status, ContractStatus::Active);
}

#[tokio::test]
async fn amendment_cap_scenario() {
    let h = harness(&["owner", "riley"]);
    let owner = UserId::new("owner");
    let riley = UserId::new("riley");

    let contract = h
        .accord
        .contracts
        .create_contract(signature_draft("owner"))
        .await
        .unwrap();
    h.accord
        .collaboration
        .share(
            &contract.id,
            &owner,
            "owner@example.com",
            ShareRecipient::User(riley.clone()),
        )
        .await
        .unwrap();
    h.accord.approvals.approve(&contract.id, &riley).await.unwrap();

    for act in [Act::Oral, Act::Photography] {
        let amendment = h
            .accord
            .amendments
            .propose(
                &contract.id,
                &owner,
                AmendmentKind::AddActs,
                AmendmentChanges::Acts(vec![act]),
                "one more",
            )
            .await
            .unwrap();
        assert!(h
            .accord
            .amendments
            .approve_amendment(&amendment.id, &riley)
            .await
            .unwrap());
    }

    let third = h
        .accord
        .amendments
        .propose(
            &contract.id,
            &owner,
            AmendmentKind::AddActs,
            AmendmentChanges::Acts(vec![Act::Recording]),
            "a third",
        )
        .await;
    assert!(matches!(third, Err(EngineError::LimitExceeded)));

    let current = h.store.get_contract(&contract.id).await.unwrap().unwrap();
    assert!(current.acts.contains(&Act::Oral));
    assert!(current.acts.contains(&Act::Photography));
    assert!(!current.acts.contains(&Act::Recording));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_by_one_collaborator_count_once() {
    let h = harness(&["owner", "riley"]);
    let owner = UserId::new("owner");
    let riley = UserId::new("riley");

    let contract = h
        .accord
        .contracts
        .create_contract(signature_draft("owner"))
        .await
        .unwrap();
    h.accord
        .collaboration
        .share(
            &contract.id,
            &owner,
            "owner@example.com",
            ShareRecipient::User(riley.clone()),
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let accord = h.accord.clone();
        let contract_id = contract.id.clone();
        let riley = riley.clone();
        handles.push(tokio::spawn(async move {
            accord.approvals.approve(&contract_id, &riley).await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let row = h
        .store
        .get_collaborator(&contract.id, &riley)
        .await
        .unwrap()
        .unwrap();
    assert!(row.is_approved());
    let current = h.store.get_contract(&contract.id).await.unwrap().unwrap();
    assert_eq!(current.status, ContractStatus::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_approvers_always_activate() {
    // The classic lost-aggregate race: both approve within the same window,
    // and each computes unanimity from a post-write read, so at least one
    // of them observes the complete set.
    for _ in 0..16 {
        let h = harness(&["owner", "riley", "sam"]);
        let owner = UserId::new("owner");
        let riley = UserId::new("riley");
        let sam = UserId::new("sam");

        let contract = h
            .accord
            .contracts
            .create_contract(signature_draft("owner"))
            .await
            .unwrap();
        for user in [&riley, &sam] {
            h.accord
                .collaboration
                .share(
                    &contract.id,
                    &owner,
                    "owner@example.com",
                    ShareRecipient::User(user.clone()),
                )
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for user in [riley.clone(), sam.clone()] {
            let accord = h.accord.clone();
            let contract_id = contract.id.clone();
            handles.push(tokio::spawn(async move {
                accord.approvals.approve(&contract_id, &user).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }

        let current = h.store.get_contract(&contract.id).await.unwrap().unwrap();
        assert_eq!(current.status, ContractStatus::Active);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acceptance_of_one_code_is_single_shot() {
    let h = harness(&["owner", "riley", "sam"]);
    let owner = UserId::new("owner");

    let contract = h
        .accord
        .contracts
        .create_contract(signature_draft("owner"))
        .await
        .unwrap();
    let ShareOutcome::Invitation { code, .. } = h
        .accord
        .collaboration
        .share(
            &contract.id,
            &owner,
            "owner@example.com",
            ShareRecipient::Email("guest@example.com".to_string()),
        )
        .await
        .unwrap()
    else {
        panic!("expected invitation outcome");
    };

    let mut handles = Vec::new();
    for user in ["riley", "sam"] {
        let accord = h.accord.clone();
        let code = code.clone();
        let user = UserId::new(user);
        handles.push(tokio::spawn(async move {
            accord.collaboration.accept_invitation(&code, &user).await
        }));
    }

    let mut joined = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            joined += 1;
        }
    }
    assert_eq!(joined, 1);

    // Exactly one recipient slot was created next to the initiator's.
    let rows = h.store.list_collaborators(&contract.id).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn pause_resume_does_not_touch_collaboration_state() {
    let h = harness(&["owner", "riley"]);
    let owner = UserId::new("owner");
    let riley = UserId::new("riley");

    let contract = h
        .accord
        .contracts
        .create_contract(signature_draft("owner"))
        .await
        .unwrap();
    h.accord
        .collaboration
        .share(
            &contract.id,
            &owner,
            "owner@example.com",
            ShareRecipient::User(riley.clone()),
        )
        .await
        .unwrap();
    h.accord.approvals.approve(&contract.id, &riley).await.unwrap();

    let before = h.store.list_collaborators(&contract.id).await.unwrap();
    assert!(h.accord.contracts.pause(&contract.id, &riley).await.unwrap());
    assert!(h.accord.contracts.resume(&contract.id, &owner).await.unwrap());
    let after = h.store.list_collaborators(&contract.id).await.unwrap();

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.status, a.status);
        assert_eq!(b.approved_at, a.approved_at);
        assert_eq!(b.confirmed_at, a.confirmed_at);
    }
}

#[tokio::test]
async fn rejection_reaches_terminal_state_for_everyone() {
    let h = harness(&["owner", "riley", "sam"]);
    let owner = UserId::new("owner");
    let riley = UserId::new("riley");
    let sam = UserId::new("sam");

    let contract = h
        .accord
        .contracts
        .create_contract(signature_draft("owner"))
        .await
        .unwrap();
    for user in [&riley, &sam] {
        h.accord
            .collaboration
            .share(
                &contract.id,
                &owner,
                "owner@example.com",
                ShareRecipient::User(user.clone()),
            )
            .await
            .unwrap();
    }

    h.accord.approvals.approve(&contract.id, &riley).await.unwrap();
    assert!(h
        .accord
        .approvals
        .reject(&contract.id, &sam, Some("not comfortable".to_string()))
        .await
        .unwrap());

    let current = h.store.get_contract(&contract.id).await.unwrap().unwrap();
    assert_eq!(current.status, ContractStatus::Rejected);

    // Late approval attempts land on a resolved contract and change nothing.
    assert!(!h.accord.approvals.approve(&contract.id, &riley).await.unwrap());
    let current = h.store.get_contract(&contract.id).await.unwrap().unwrap();
    assert_eq!(current.status, ContractStatus::Rejected);
}
