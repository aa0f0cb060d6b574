//! Tests for the broadcast phase: global ordering across synchronous and multisig senders.

use alloy_primitives::{address, b256, Address, Bytes, B256, U256};
use mega_sender::{test_utils::*, *};

const KEY: B256 = b256!("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");
const OTHER_KEY: B256 = b256!("59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d");
const SAFE: Address = address!("0000000000000000000000000000000000005afe");
const COUNTER_A: Address = address!("0000000000000000000000000000000000100001");
const COUNTER_B: Address = address!("0000000000000000000000000000000000100002");

fn coordinator() -> Coordinator<EvmContext> {
    let real = EvmContext::new(1)
        .account_code(COUNTER_A, counter_code())
        .account_code(COUNTER_B, counter_code());
    let config = CoordinatorConfig { run_marker: Some(7), ..Default::default() };
    Coordinator::new(config, ExecutionContexts::fork(real))
}

fn bump(target: Address, label: &str) -> Operation {
    Operation::new(target, Bytes::new(), label)
}

fn address_word(address: Address) -> Bytes {
    Bytes::copy_from_slice(address.into_word().as_slice())
}

fn executed_labels(events: &[LifecycleEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            LifecycleEvent::Executed { label, .. } => Some(label.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_single_synchronous_sender_replays_in_order() {
    let mut coordinator = coordinator();
    coordinator.register_sender(SenderInitConfig::private_key("deployer", KEY)).unwrap();
    let issued = coordinator
        .execute_all("deployer", ["first", "second", "third"].map(|l| bump(COUNTER_A, l)))
        .unwrap();
    assert_eq!(
        issued.iter().map(|rich| rich.simulated_return_data.clone()).collect::<Vec<_>>(),
        [word(1), word(2), word(3)]
    );
    assert_eq!(coordinator.contexts().real.storage(COUNTER_A, U256::ZERO), U256::ZERO);

    let report = coordinator.broadcast(&mut InMemoryProposalService::default()).unwrap();

    for (simulated, executed) in issued.iter().zip(&report.operations) {
        assert_eq!(executed.id, simulated.id);
        assert_eq!(executed.status, OperationStatus::Executed);
        let executed_data = executed.executed_return_data.as_ref();
        assert_eq!(executed_data, Some(&simulated.simulated_return_data));
    }
    assert_eq!(executed_labels(coordinator.events()), ["first", "second", "third"]);
    assert_eq!(coordinator.contexts().real.storage(COUNTER_A, U256::ZERO), U256::from(3));

    assert_eq!(report.batches.len(), 1);
    let batch = &report.batches[0];
    assert_eq!(batch.batch_id, batch_id(sender_id("deployer"), 0));
    assert_eq!(batch.operations, report.operations);
    assert!(batch.proposal.is_none());
    assert!(coordinator.sender("deployer").unwrap().pending().is_empty());
}

#[test]
fn test_multisig_batch_is_proposed_after_synchronous_operations() {
    let mut coordinator = coordinator();
    coordinator.register_sender(SenderInitConfig::private_key("a", KEY)).unwrap();
    coordinator.register_sender(SenderInitConfig::safe("b", SAFE, "a")).unwrap();

    let x = coordinator.execute("a", bump(COUNTER_A, "x")).unwrap();
    let z = coordinator.execute("b", bump(COUNTER_B, "z")).unwrap();
    let y = coordinator.execute("a", bump(COUNTER_A, "y")).unwrap();
    assert_eq!(
        coordinator.queue().iter().map(|rich| rich.id).collect::<Vec<_>>(),
        [x.id, z.id, y.id]
    );

    let mut service = InMemoryProposalService::default();
    let report = coordinator.broadcast(&mut service).unwrap();

    // X and Y ran in the real context, Z only went to the Safe.
    let real = &coordinator.contexts().real;
    assert_eq!(real.storage(COUNTER_A, U256::ZERO), U256::from(2));
    assert_eq!(real.storage(COUNTER_B, U256::ZERO), U256::ZERO);
    assert_eq!(report.count(OperationStatus::Executed), 2);
    assert_eq!(report.count(OperationStatus::Queued), 1);
    assert_eq!(report.operations[1].status, OperationStatus::Queued);
    assert_eq!(report.operations[1].executed_return_data, None);

    // Every executed event precedes the proposal.
    let events = coordinator.events();
    let proposed = events
        .iter()
        .position(|event| matches!(event, LifecycleEvent::BatchProposed { .. }))
        .unwrap();
    let last_executed = events
        .iter()
        .rposition(|event| matches!(event, LifecycleEvent::Executed { .. }))
        .unwrap();
    assert!(last_executed < proposed);
    assert_eq!(executed_labels(events), ["x", "y"]);
    assert!(matches!(
        &events[proposed],
        LifecycleEvent::BatchProposed { operations, safe, .. }
            if operations == &[z.id] && *safe == SAFE
    ));
    assert!(matches!(events.last(), Some(LifecycleEvent::BroadcastCompleted { batches: 2, .. })));

    let proposals: Vec<_> = report.proposals().collect();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].to, COUNTER_B);
    assert_eq!(proposals[0].operation, constants::safe_operation::CALL);
    assert_eq!(service.proposals(), [proposals[0].clone()]);

    let multisig_batch = report.batches.last().unwrap();
    assert_eq!(multisig_batch.sender_id, sender_id("b"));
    assert_eq!(multisig_batch.proposal_hash, Some(proposals[0].safe_tx_hash));
    assert_eq!(coordinator.sender("b").unwrap().state(), SenderState::Flushed);
}

#[test]
fn test_multisig_batch_keeps_issuance_order() {
    let mut coordinator = coordinator();
    coordinator.register_sender(SenderInitConfig::private_key("a", KEY)).unwrap();
    coordinator.register_sender(SenderInitConfig::private_key("c", OTHER_KEY)).unwrap();
    coordinator.register_sender(SenderInitConfig::safe("b", SAFE, "c")).unwrap();

    let first = coordinator.execute("b", bump(COUNTER_B, "first")).unwrap();
    coordinator.execute("a", bump(COUNTER_A, "between")).unwrap();
    let poke = Operation::new(COUNTER_A, Bytes::from_static(&[0xaa]), "second");
    let second = coordinator.execute("b", poke).unwrap();

    let report = coordinator.broadcast(&mut InMemoryProposalService::default()).unwrap();
    let batch = report.batches.iter().find(|batch| batch.sender_id == sender_id("b")).unwrap();
    assert_eq!(
        batch.operations.iter().map(|rich| rich.id).collect::<Vec<_>>(),
        [first.id, second.id]
    );

    let proposal = batch.proposal.as_ref().unwrap();
    assert_eq!(proposal.operation, constants::safe_operation::DELEGATE_CALL);
    assert_eq!(proposal.to, constants::MULTISEND_CALL_ONLY_ADDRESS);
    assert_eq!(
        proposal.transactions.iter().map(|call| call.target).collect::<Vec<_>>(),
        [COUNTER_B, COUNTER_A]
    );
    assert_eq!(proposal.proposer, coordinator.sender("c").unwrap().account());
}

#[test]
fn test_mismatch_aborts_without_rollback() {
    let mut coordinator = coordinator();
    coordinator.register_sender(SenderInitConfig::private_key("a", KEY)).unwrap();
    coordinator.register_sender(SenderInitConfig::safe("b", SAFE, "a")).unwrap();

    coordinator.execute("a", bump(COUNTER_A, "first")).unwrap();
    coordinator.execute("b", bump(COUNTER_B, "queued")).unwrap();
    coordinator.execute("a", bump(COUNTER_B, "second")).unwrap();

    // The real chain moved on since the simulation was forked.
    coordinator.contexts_mut().real.set_storage(COUNTER_B, U256::ZERO, U256::from(10));

    let mut service = InMemoryProposalService::default();
    let err = coordinator.broadcast(&mut service).unwrap_err();
    assert!(matches!(err, SenderError::ExecutionMismatch(label) if label == "second"));
    assert_eq!(coordinator.phase(), RunPhase::Aborted);

    // The first operation stays applied and nothing was proposed.
    assert_eq!(coordinator.contexts().real.storage(COUNTER_A, U256::ZERO), U256::from(1));
    assert_eq!(coordinator.contexts().real.storage(COUNTER_B, U256::ZERO), U256::from(11));
    assert!(service.proposals().is_empty());
    assert_eq!(executed_labels(coordinator.events()), ["first"]);
    assert_eq!(coordinator.queue().as_slice()[0].status, OperationStatus::Executed);
    assert_eq!(coordinator.queue().as_slice()[2].status, OperationStatus::Simulated);

    assert!(matches!(coordinator.broadcast(&mut service), Err(SenderError::RunAborted)));
}

#[test]
fn test_real_context_revert_fails_execution() {
    let mut coordinator = coordinator();
    coordinator.register_sender(SenderInitConfig::private_key("a", KEY)).unwrap();
    coordinator.execute("a", bump(COUNTER_A, "bump")).unwrap();

    coordinator.contexts_mut().real.set_account_code(COUNTER_A, reverting_code());

    let err = coordinator.broadcast(&mut InMemoryProposalService::default()).unwrap_err();
    assert!(matches!(
        err,
        SenderError::ExecutionFailed { label, reason }
            if label == "bump" && reason.contains(REVERT_REASON)
    ));
}

#[test]
fn test_value_bearing_multisig_operation_is_rejected() {
    let mut coordinator = coordinator();
    coordinator.contexts_mut().simulation.set_account_balance(SAFE, U256::from(1_000));
    coordinator.register_sender(SenderInitConfig::private_key("a", KEY)).unwrap();
    coordinator.register_sender(SenderInitConfig::safe("b", SAFE, "a")).unwrap();

    coordinator.execute("a", bump(COUNTER_A, "sync")).unwrap();
    let paid = bump(COUNTER_B, "paid").with_value(U256::from(1));
    coordinator.execute("b", paid).unwrap();

    let mut service = InMemoryProposalService::default();
    let err = coordinator.broadcast(&mut service).unwrap_err();
    assert!(matches!(err, SenderError::ValueNotZero(label) if label == "paid"));
    assert!(service.proposals().is_empty());
    // Synchronous operations ran before the batch was built.
    assert_eq!(coordinator.contexts().real.storage(COUNTER_A, U256::ZERO), U256::from(1));
}

#[test]
fn test_operations_are_issued_as_the_sender_account() {
    let echo = Address::with_last_byte(0xca);
    let mut coordinator = coordinator();
    coordinator.contexts_mut().simulation.set_account_code(echo, caller_code());
    coordinator.contexts_mut().real.set_account_code(echo, caller_code());
    coordinator.register_sender(SenderInitConfig::private_key("a", KEY)).unwrap();
    coordinator.register_sender(SenderInitConfig::safe("b", SAFE, "a")).unwrap();

    let by_key = coordinator.execute("a", bump(echo, "whoami")).unwrap();
    let by_safe = coordinator.execute("b", bump(echo, "whoami")).unwrap();

    let account = coordinator.sender("a").unwrap().account();
    assert_eq!(by_key.simulated_return_data, address_word(account));
    assert_eq!(by_safe.simulated_return_data, address_word(SAFE));
    coordinator.broadcast(&mut InMemoryProposalService::default()).unwrap();
}
