// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::test_util::*;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread;
use vote_ledger::{Error, MemStorage, Tally, WinnerResult};

// A second vote by the same address in the same session fails, the first succeeds.
#[test]
fn test_second_vote_rejected_for_every_pair() {
    let ledger = new_ledger(MemStorage::new());
    let addresses = ["0x01", "0x02", "0xAB", "0xab00"];
    for session in 0..5 {
        for (i, addr) in addresses.iter().enumerate() {
            assert!(ledger.record_vote(session, i as u64, addr, 1).is_ok());
        }
        for addr in &addresses {
            let err = ledger.record_vote(session, 0, addr, 2).unwrap_err();
            assert!(
                matches!(err, Error::DuplicateVote(session_id, _) if session_id == session),
                "unexpected error {:?}",
                err
            );
        }
    }
    assert_eq!(ledger.len(), 20);
}

#[test]
fn test_winner_of_empty_session_is_neutral() {
    let ledger = new_ledger(MemStorage::new());
    for session in &[0, 1, u64::max_value()] {
        let result = ledger.compute_winner(*session);
        assert_eq!(result, WinnerResult::default());
        assert_eq!(result.winning_index, None);
        assert!(result.counts.is_empty());
    }
}

#[test]
fn test_winner_two_to_one() {
    let ledger = new_ledger(MemStorage::new());
    cast(&ledger, 11, 0, 2, "0xa");
    cast(&ledger, 11, 1, 1, "0xb");

    let result = ledger.compute_winner(11);
    let expected: Tally = vec![(0, 2), (1, 1)].into_iter().collect();
    assert_eq!(result.winning_index, Some(0));
    assert_eq!(result.counts, expected);
}

#[test]
fn test_winner_tie_breaks_to_lowest_index() {
    let mut test_cases = vec![
        // (index, count) pairs cast in this order, expected winner.
        (vec![(1, 3), (0, 3)], 0),
        (vec![(5, 2), (3, 2), (4, 1)], 3),
        (vec![(2, 1), (9, 4), (7, 4)], 7),
    ];
    for (i, (casts, expected)) in test_cases.drain(..).enumerate() {
        let ledger = new_ledger(MemStorage::new());
        for (index, count) in casts {
            cast(&ledger, 1, index, count, &format!("0x{}", index));
        }
        assert_eq!(
            ledger.compute_winner(1).winning_index,
            Some(expected),
            "[test_cases #{}] tie not broken to the lowest index",
            i + 1
        );
    }
}

// Random ballots, some of them repeated, checked against a plain model.
#[test]
fn test_random_ballots_match_model() {
    let mut rng = rand::thread_rng();
    let ledger = new_ledger(MemStorage::new());
    let mut voted: HashSet<(u64, String)> = HashSet::new();
    let mut model: BTreeMap<u64, Tally> = BTreeMap::new();

    let voters: Vec<String> = (0..30).map(|i| format!("0x{:x}", i)).collect();
    for ts in 0..500 {
        let session = rng.gen_range(0, 4);
        let index = rng.gen_range(0, 5);
        let voter = voters.choose(&mut rng).unwrap();
        // Mix the case to exercise normalization.
        let sent = if rng.gen::<bool>() {
            voter.to_uppercase()
        } else {
            voter.clone()
        };

        let res = ledger.record_vote(session, index, &sent, ts);
        if voted.insert((session, voter.clone())) {
            res.unwrap();
            *model.entry(session).or_default().entry(index).or_insert(0) += 1;
        } else {
            assert!(res.is_err(), "duplicate by {} in {} accepted", voter, session);
        }
    }

    for session in 0..4 {
        let tally = model.remove(&session).unwrap_or_default();
        let expected = WinnerResult::from_tally(tally);
        assert_eq!(ledger.compute_winner(session), expected);
    }
    assert_eq!(ledger.len(), voted.len());
}

#[test]
fn test_concurrent_voters() {
    let ledger = Arc::new(new_ledger(MemStorage::new()));
    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let mut accepted = 0u64;
                // Every thread tries the same 50 addresses.
                for i in 0..50u64 {
                    if ledger
                        .record_vote(1, t % 2, &format!("0x{:02}", i), i)
                        .is_ok()
                    {
                        accepted += 1;
                    }
                }
                accepted
            })
        })
        .collect();
    let accepted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(accepted, 50);
    assert_eq!(ledger.compute_winner(1).total_votes(), 50);
    assert_eq!(ledger.store().rl().votes().len(), 50);
}
