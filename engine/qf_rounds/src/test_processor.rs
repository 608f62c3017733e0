use std::cell::RefCell;
use std::rc::Rc;

use crate::codec::encode_donation;
use crate::errors::ProtocolError;
use crate::events::{EventLog, ProtocolEvent};
use crate::invariants;
use crate::ledger::Ledger;
use crate::processor::ContributionProcessor;
use crate::types::{Address, Donation, Medium, ProjectId};

fn addr(n: u8) -> Address {
    Address::new([n; 32])
}

fn project() -> ProjectId {
    ProjectId::new([0x01; 32])
}

fn donation(medium: Medium, amount: i128, recipient: Address, application_index: u32) -> Vec<u8> {
    encode_donation(&Donation {
        medium,
        amount,
        recipient,
        project_id: project(),
        application_index,
    })
    .unwrap()
}

struct Setup {
    ledger: Rc<Ledger>,
    events: Rc<EventLog>,
    processor: Rc<ContributionProcessor>,
    round: Address,
    payer: Address,
    originator: Address,
}

fn setup() -> Setup {
    let setup = Setup {
        ledger: Rc::new(Ledger::new()),
        events: Rc::new(EventLog::new()),
        processor: Rc::new(ContributionProcessor::new(addr(0xEE))),
        round: addr(0x10),
        payer: addr(0x20),
        originator: addr(0x21),
    };
    setup.processor.initialize(setup.round).unwrap();
    setup
}

impl Setup {
    fn process(&self, batch: &[Vec<u8>], attached_value: i128) -> crate::errors::Result<()> {
        self.processor.process_donations(
            &self.ledger,
            &self.events,
            &self.round,
            &self.originator,
            batch,
            &self.payer,
            attached_value,
        )
    }
}

#[test]
fn test_initialize_twice_fails_and_keeps_binding() {
    let processor = ContributionProcessor::new(addr(0xEE));
    assert_eq!(processor.authorized_caller(), None);

    processor.initialize(addr(0x10)).unwrap();
    let err = processor.initialize(addr(0x11)).unwrap_err();
    assert_eq!(err, ProtocolError::AlreadyInitialized);
    invariants::assert_binding_immutable(&processor, &addr(0x10));
}

#[test]
fn test_unbound_processor_rejects_every_caller() {
    let ledger = Ledger::new();
    let events = EventLog::new();
    let processor = ContributionProcessor::new(addr(0xEE));
    ledger.mint_native(&addr(0x10), 1_000);

    let batch = vec![donation(Medium::Native, 100, addr(0x30), 0)];
    let err = processor
        .process_donations(
            &ledger,
            &events,
            &addr(0x10),
            &addr(0x21),
            &batch,
            &addr(0x20),
            100,
        )
        .unwrap_err();
    assert_eq!(err, ProtocolError::Unauthorized);
    assert_eq!(ledger.native_balance(&addr(0x30)), 0);
    assert!(events.is_empty());
}

#[test]
fn test_unauthorized_caller_moves_no_funds() {
    let s = setup();
    s.ledger.mint_native(&s.round, 1_000);
    let stranger = addr(0x99);

    let batch = vec![donation(Medium::Native, 100, addr(0x30), 0)];
    let err = s
        .processor
        .process_donations(
            &s.ledger,
            &s.events,
            &stranger,
            &s.originator,
            &batch,
            &s.payer,
            100,
        )
        .unwrap_err();
    assert_eq!(err, ProtocolError::Unauthorized);
    assert_eq!(s.ledger.native_balance(&s.round), 1_000);
    assert_eq!(s.ledger.native_balance(&addr(0x30)), 0);
    assert!(s.events.is_empty());
}

#[test]
fn test_mixed_batch_settles_and_reconciles() {
    let s = setup();
    let token_x = addr(0x40);
    let recipient_a = addr(0x30);
    let recipient_b = addr(0x31);
    s.ledger.mint_native(&s.round, 1_000);
    s.ledger.mint_token(&token_x, &s.payer, 500);
    s.ledger
        .approve(&token_x, &s.payer, &s.processor.address(), 50);

    let batch = vec![
        donation(Medium::Native, 100, recipient_a, 0),
        donation(Medium::Token(token_x), 50, recipient_b, 1),
    ];
    s.process(&batch, 100).unwrap();

    assert_eq!(s.ledger.native_balance(&s.round), 900);
    assert_eq!(s.ledger.native_balance(&recipient_a), 100);
    assert_eq!(s.ledger.token_balance(&token_x, &s.payer), 450);
    assert_eq!(s.ledger.token_balance(&token_x, &recipient_b), 50);
    assert_eq!(
        s.ledger.allowance(&token_x, &s.payer, &s.processor.address()),
        0
    );

    let all = s.events.all();
    assert_eq!(all.len(), 2);
    match (&all[0], &all[1]) {
        (ProtocolEvent::DonationRecorded(first), ProtocolEvent::DonationRecorded(second)) => {
            assert_eq!(first.application_index, 0);
            assert_eq!(second.application_index, 1);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[test]
fn test_value_mismatch_rolls_back_everything() {
    let s = setup();
    let token_x = addr(0x40);
    let recipient_a = addr(0x30);
    let recipient_b = addr(0x31);
    s.ledger.mint_native(&s.round, 1_000);
    s.ledger.mint_token(&token_x, &s.payer, 500);
    s.ledger
        .approve(&token_x, &s.payer, &s.processor.address(), 50);

    let holders = [s.round, s.payer, recipient_a, recipient_b];
    let spenders = [s.processor.address()];
    let before = invariants::snapshot(&s.ledger, &holders, &[token_x], &spenders);

    let batch = vec![
        donation(Medium::Native, 100, recipient_a, 0),
        donation(Medium::Token(token_x), 50, recipient_b, 1),
    ];
    let err = s.process(&batch, 99).unwrap_err();
    assert_eq!(
        err,
        ProtocolError::ValueMismatch {
            declared: 99,
            spent: 100
        }
    );
    invariants::assert_no_partial_effects(&s.ledger, &before, &holders, &[token_x], &spenders);
    assert!(s.events.is_empty());
}

#[test]
fn test_overdeclared_value_also_mismatches() {
    let s = setup();
    s.ledger.mint_native(&s.round, 1_000);

    let batch = vec![donation(Medium::Native, 100, addr(0x30), 0)];
    let err = s.process(&batch, 150).unwrap_err();
    assert_eq!(
        err,
        ProtocolError::ValueMismatch {
            declared: 150,
            spent: 100
        }
    );
    assert_eq!(s.ledger.native_balance(&addr(0x30)), 0);
}

#[test]
fn test_malformed_record_aborts_batch_at_any_position() {
    for position in 0..3 {
        let s = setup();
        let token_x = addr(0x40);
        s.ledger.mint_native(&s.round, 1_000);
        s.ledger.mint_token(&token_x, &s.payer, 500);
        s.ledger
            .approve(&token_x, &s.payer, &s.processor.address(), 500);

        let mut batch = vec![
            donation(Medium::Native, 100, addr(0x30), 0),
            donation(Medium::Token(token_x), 50, addr(0x31), 1),
            donation(Medium::Native, 25, addr(0x32), 2),
        ];
        batch[position] = b"{\"not\": \"a donation\"}".to_vec();

        let holders = [s.round, s.payer, addr(0x30), addr(0x31), addr(0x32)];
        let spenders = [s.processor.address()];
        let before = invariants::snapshot(&s.ledger, &holders, &[token_x], &spenders);

        let err = s.process(&batch, 125).unwrap_err();
        assert!(
            matches!(err, ProtocolError::MalformedDonation(_)),
            "position {position}: got {err:?}"
        );
        invariants::assert_no_partial_effects(&s.ledger, &before, &holders, &[token_x], &spenders);
        assert!(s.events.is_empty(), "position {position}: events leaked");
    }
}

#[test]
fn test_insufficient_allowance_reverts_earlier_donations() {
    let s = setup();
    let token_x = addr(0x40);
    s.ledger.mint_native(&s.round, 1_000);
    s.ledger.mint_token(&token_x, &s.payer, 500);
    s.ledger
        .approve(&token_x, &s.payer, &s.processor.address(), 10);

    let batch = vec![
        donation(Medium::Native, 100, addr(0x30), 0),
        donation(Medium::Token(token_x), 50, addr(0x31), 1),
    ];
    let err = s.process(&batch, 100).unwrap_err();
    assert!(matches!(err, ProtocolError::TransferFailed(_)));

    // The native leg that already settled is rolled back with the batch.
    assert_eq!(s.ledger.native_balance(&s.round), 1_000);
    assert_eq!(s.ledger.native_balance(&addr(0x30)), 0);
    assert_eq!(
        s.ledger.allowance(&token_x, &s.payer, &s.processor.address()),
        10
    );
    assert!(s.events.is_empty());
}

#[test]
fn test_insufficient_round_balance_fails_transfer() {
    let s = setup();
    s.ledger.mint_native(&s.round, 40);

    let batch = vec![donation(Medium::Native, 100, addr(0x30), 0)];
    let err = s.process(&batch, 100).unwrap_err();
    assert!(matches!(err, ProtocolError::TransferFailed(_)));
    assert_eq!(s.ledger.native_balance(&s.round), 40);
}

#[test]
fn test_rejecting_recipient_reverts_whole_batch() {
    let s = setup();
    s.ledger.mint_native(&s.round, 1_000);
    s.ledger
        .set_receive_hook(&addr(0x31), Rc::new(|_, _| Err("not accepting funds".into())));

    let batch = vec![
        donation(Medium::Native, 100, addr(0x30), 0),
        donation(Medium::Native, 50, addr(0x31), 1),
    ];
    let err = s.process(&batch, 150).unwrap_err();
    assert!(matches!(err, ProtocolError::TransferFailed(_)));
    assert_eq!(s.ledger.native_balance(&s.round), 1_000);
    assert_eq!(s.ledger.native_balance(&addr(0x30)), 0);
    assert_eq!(s.ledger.native_balance(&addr(0x31)), 0);
    assert!(s.events.is_empty());
}

#[test]
fn test_reentrant_recipient_is_rejected_and_outer_batch_completes() {
    let s = setup();
    let recipient_a = addr(0x30);
    let recipient_c = addr(0x32);
    s.ledger.mint_native(&s.round, 1_000);

    // recipient_a is executable code that calls straight back into the
    // processor when its transfer lands.
    let inner_result: Rc<RefCell<Option<ProtocolError>>> = Rc::new(RefCell::new(None));
    let hook_result = Rc::clone(&inner_result);
    let ledger = Rc::clone(&s.ledger);
    let events = Rc::clone(&s.events);
    let processor = Rc::clone(&s.processor);
    let round = s.round;
    let payer = s.payer;
    let originator = s.originator;
    s.ledger.set_receive_hook(
        &recipient_a,
        Rc::new(move |_, _| {
            let err = processor
                .process_donations(&ledger, &events, &round, &originator, &[], &payer, 0)
                .unwrap_err();
            *hook_result.borrow_mut() = Some(err);
            Ok(())
        }),
    );

    let batch = vec![
        donation(Medium::Native, 100, recipient_a, 0),
        donation(Medium::Native, 50, recipient_c, 1),
    ];
    s.process(&batch, 150).unwrap();

    assert_eq!(*inner_result.borrow(), Some(ProtocolError::ReentrantCall));
    assert_eq!(s.ledger.native_balance(&recipient_a), 100);
    assert_eq!(s.ledger.native_balance(&recipient_c), 50);
    assert_eq!(s.events.len(), 2);
}

#[test]
fn test_lock_is_released_after_a_failed_batch() {
    let s = setup();
    s.ledger.mint_native(&s.round, 1_000);

    let err = s
        .process(&[donation(Medium::Native, 100, addr(0x30), 0)], 99)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ValueMismatch { .. }));

    // The same processor accepts a corrected resubmission.
    s.process(&[donation(Medium::Native, 100, addr(0x30), 0)], 100)
        .unwrap();
    assert_eq!(s.ledger.native_balance(&addr(0x30)), 100);
}

#[test]
fn test_native_total_overflow_fails_without_panicking() {
    let s = setup();
    let recipient_a = addr(0x30);
    s.ledger.mint_native(&s.round, i128::MAX);

    let batch = vec![
        donation(Medium::Native, i128::MAX, recipient_a, 0),
        donation(Medium::Native, 1, addr(0x31), 1),
    ];
    let err = s.process(&batch, i128::MAX).unwrap_err();
    assert!(matches!(err, ProtocolError::TransferFailed(_)));

    assert_eq!(s.ledger.native_balance(&s.round), i128::MAX);
    assert_eq!(s.ledger.native_balance(&recipient_a), 0);
    assert!(s.events.is_empty());
}

#[test]
fn test_empty_batch_reconciles_against_zero() {
    let s = setup();
    s.process(&[], 0).unwrap();
    assert!(s.events.is_empty());

    let err = s.process(&[], 10).unwrap_err();
    assert_eq!(
        err,
        ProtocolError::ValueMismatch {
            declared: 10,
            spent: 0
        }
    );
}

#[test]
fn test_supply_is_conserved_across_processing() {
    let s = setup();
    let token_x = addr(0x40);
    let holders = [s.round, s.payer, addr(0x30), addr(0x31)];
    s.ledger.mint_native(&s.round, 1_000);
    s.ledger.mint_token(&token_x, &s.payer, 500);
    s.ledger
        .approve(&token_x, &s.payer, &s.processor.address(), 500);

    let native_before = invariants::total_native(&s.ledger, &holders);
    let token_before = invariants::total_token(&s.ledger, &token_x, &holders);

    let batch = vec![
        donation(Medium::Native, 300, addr(0x30), 0),
        donation(Medium::Token(token_x), 200, addr(0x31), 1),
        donation(Medium::Native, 100, addr(0x31), 2),
    ];
    s.process(&batch, 400).unwrap();

    invariants::assert_native_conserved(
        native_before,
        invariants::total_native(&s.ledger, &holders),
    );
    invariants::assert_token_conserved(
        &token_x,
        token_before,
        invariants::total_token(&s.ledger, &token_x, &holders),
    );
}
