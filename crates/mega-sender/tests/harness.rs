//! Tests for call interception through harnesses.

use alloy_primitives::{address, b256, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use mega_sender::{test_utils::*, *};

sol! {
    interface ICounter {
        function increment() external returns (uint256);
        function owner() external view returns (address);
    }
}

const KEY: B256 = b256!("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");
const KEY_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
const SAFE: Address = address!("0000000000000000000000000000000000005afe");
const COUNTER: Address = address!("0000000000000000000000000000000000100001");
const ECHO: Address = address!("0000000000000000000000000000000000100002");

fn coordinator() -> Coordinator<EvmContext> {
    let real = EvmContext::new(1)
        .account_code(COUNTER, counter_code())
        .account_code(ECHO, caller_code());
    let config = CoordinatorConfig { run_marker: Some(1), ..Default::default() };
    let mut coordinator = Coordinator::new(config, ExecutionContexts::fork(real));
    coordinator.register_sender(SenderInitConfig::private_key("deployer", KEY)).unwrap();
    coordinator.register_sender(SenderInitConfig::safe("treasury", SAFE, "deployer")).unwrap();
    coordinator
}

#[test]
fn test_harness_identity() {
    let mut coordinator = coordinator();

    let first = coordinator.harness("deployer", COUNTER).unwrap().proxy();
    let again = coordinator.harness("deployer", COUNTER).unwrap().proxy();
    let other = coordinator.harness("treasury", COUNTER).unwrap().proxy();

    assert_eq!(first, again);
    assert_ne!(first, other);
    assert_eq!(first, proxy_address(sender_id("deployer"), KEY_ADDRESS, COUNTER));
    assert_eq!(other, proxy_address(sender_id("treasury"), SAFE, COUNTER));
    assert_eq!(coordinator.harnesses().len(), 2);
    assert_eq!(coordinator.harnesses().get(sender_id("treasury"), COUNTER), Some(other));
}

#[test]
fn test_harness_identity_with_shared_account() {
    let mut coordinator = coordinator();
    coordinator.register_sender(SenderInitConfig::private_key("spare", KEY)).unwrap();
    assert_eq!(coordinator.sender("spare").unwrap().account(), KEY_ADDRESS);

    let target = Address::with_last_byte(9);
    let deployer = coordinator.harness("deployer", target).unwrap().proxy();
    let spare = coordinator.harness("spare", target).unwrap().proxy();

    assert_ne!(deployer, spare);
    assert_eq!(coordinator.harnesses().len(), 2);
}

#[test]
fn test_typed_calls_return_simulated_values() {
    let mut coordinator = coordinator();

    let mut counter = coordinator.harness("deployer", COUNTER).unwrap();
    assert_eq!(counter.target(), COUNTER);
    assert_eq!(counter.call(&ICounter::incrementCall {}).unwrap(), U256::from(1));
    assert_eq!(counter.call(&ICounter::incrementCall {}).unwrap(), U256::from(2));

    let mut echo = coordinator.harness("treasury", ECHO).unwrap();
    assert_eq!(echo.call(&ICounter::ownerCall {}).unwrap(), SAFE);

    let queue = coordinator.queue();
    assert_eq!(queue.len(), 3);
    assert!(queue.iter().all(|rich| rich.status == OperationStatus::Simulated));
    assert_eq!(queue.as_slice()[0].label(), ICounter::incrementCall::SIGNATURE);
    assert_eq!(
        queue.as_slice()[0].operation.payload.as_ref(),
        ICounter::incrementCall {}.abi_encode().as_slice()
    );
    assert_eq!(queue.as_slice()[2].sender_id, sender_id("treasury"));

    // Nothing reaches the real context before broadcast.
    assert_eq!(coordinator.contexts().real.storage(COUNTER, U256::ZERO), U256::ZERO);
    let report = coordinator.broadcast(&mut InMemoryProposalService::default()).unwrap();
    assert_eq!(report.count(OperationStatus::Executed), 2);
    assert_eq!(report.count(OperationStatus::Queued), 1);
    assert_eq!(coordinator.contexts().real.storage(COUNTER, U256::ZERO), U256::from(2));
}

#[test]
fn test_raw_and_value_calls() {
    let mut coordinator = coordinator();
    let account = coordinator.sender("deployer").unwrap().account();
    coordinator.contexts_mut().simulation.set_account_balance(account, U256::from(100));

    let mut counter = coordinator.harness("deployer", COUNTER).unwrap();
    let rich = counter.call_raw(Bytes::from_static(&[0x01, 0x02]), "poke").unwrap();
    assert_eq!(rich.simulated_return_data, word(1));
    assert_eq!(rich.label(), "poke");

    let value = U256::from(40);
    let returned = counter.call_with_value(&ICounter::incrementCall {}, value).unwrap();
    assert_eq!(returned, U256::from(2));
    assert_eq!(coordinator.queue().as_slice()[1].operation.value, value);
    assert_eq!(coordinator.contexts().simulation.balance(COUNTER), value);
}

#[test]
fn test_undecodable_return_data() {
    let mut coordinator = coordinator();
    let silent = Address::with_last_byte(0x51);
    coordinator.contexts_mut().simulation.set_account_code(silent, Bytes::new());

    let err = coordinator
        .harness("deployer", silent)
        .unwrap()
        .call(&ICounter::ownerCall {})
        .unwrap_err();
    assert!(matches!(
        err,
        SenderError::ReturnDecode { label, .. } if label == ICounter::ownerCall::SIGNATURE
    ));
    // The call itself succeeded and stays queued.
    assert_eq!(coordinator.queue().len(), 1);
}

#[test]
fn test_harness_for_unknown_sender() {
    let mut coordinator = coordinator();
    let err = coordinator.harness("ghost", COUNTER).unwrap_err();
    assert!(matches!(err, SenderError::UnknownSender(name) if name == "ghost"));
}
