// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::test_util::*;
use harness::TestServer;
use hyper::StatusCode;
use std::fs;
use std::sync::Arc;
use vote_ledger::storage::VOTE_LOG_FILE;
use vote_ledger::{default_logger, Config, Error, FileStorage, StorageError, Tally};

fn open(dir: &std::path::Path) -> FileStorage {
    FileStorage::open(dir, true, &default_logger()).expect("open vote log")
}

// A reopened ledger reproduces the tallies and still rejects duplicates.
#[test]
fn test_reopen_keeps_votes() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger = new_ledger(open(dir.path()));
        cast(&ledger, 1, 0, 2, "0xa");
        cast(&ledger, 1, 1, 1, "0xb");
        cast(&ledger, 2, 3, 4, "0xc");
    }

    let ledger = new_ledger(open(dir.path()));
    assert_eq!(ledger.len(), 7);
    assert_eq!(ledger.sessions(), vec![1, 2]);

    let result = ledger.compute_winner(1);
    let expected: Tally = vec![(0, 2), (1, 1)].into_iter().collect();
    assert_eq!(result.winning_index, Some(0));
    assert_eq!(result.counts, expected);
    assert_eq!(ledger.compute_winner(2).winning_index, Some(3));

    assert_eq!(
        ledger.record_vote(1, 1, "0xA0000", 99),
        Err(Error::DuplicateVote(1, "0xa0000".to_owned()))
    );
    ledger.record_vote(1, 1, "0xnew", 100).unwrap();
    drop(ledger);

    let ledger = new_ledger(open(dir.path()));
    assert_eq!(ledger.len(), 8);
    assert!(ledger.has_voted(1, "0xNEW"));
}

#[test]
fn test_duplicate_lines_are_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let line = serde_json::to_string(&new_vote(1, "0xa", 0, 1)).unwrap();
    fs::write(
        dir.path().join(VOTE_LOG_FILE),
        format!("{}\n{}\n", line, line),
    )
    .unwrap();

    match vote_ledger::VoteLedger::new(open(dir.path()), &default_logger()) {
        Err(Error::Store(StorageError::Corrupted(_))) => {}
        Err(e) => panic!("unexpected error {:?}", e),
        Ok(_) => panic!("duplicate ballots should not load"),
    }
}

#[test]
fn test_torn_tail_is_recovered() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger = new_ledger(open(dir.path()));
        cast(&ledger, 6, 2, 3, "0xe");
    }
    let path = dir.path().join(VOTE_LOG_FILE);
    let mut data = fs::read(&path).unwrap();
    data.extend_from_slice(br#"{"session_id":6,"address":"0xf"#);
    fs::write(&path, data).unwrap();

    let ledger = new_ledger(open(dir.path()));
    assert_eq!(ledger.compute_winner(6).total_votes(), 3);
    // The voter whose write was torn can vote again.
    ledger.record_vote(6, 1, "0xf", 4).unwrap();
    assert_eq!(ledger.compute_winner(6).total_votes(), 4);
}

#[tokio::test]
async fn test_server_restart_keeps_votes() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config {
        data_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };

    let ledger = Arc::new(new_ledger(open(dir.path())));
    let server = TestServer::start(cfg.clone(), ledger, &default_logger());
    assert_eq!(server.vote(5, 1, "0x01").await.0, StatusCode::OK);
    assert_eq!(server.vote(5, 1, "0x02").await.0, StatusCode::OK);
    assert_eq!(server.vote(5, 0, "0x03").await.0, StatusCode::OK);
    server.stop().await.unwrap();

    let ledger = Arc::new(new_ledger(open(dir.path())));
    let server = TestServer::start(cfg, ledger, &default_logger());
    assert_eq!(server.vote(5, 0, "0x01").await.0, StatusCode::BAD_REQUEST);
    let (status, body) = server.winner(5).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({ "winningIndex": 1, "counts": { "0": 1, "1": 2 } })
    );
    server.stop().await.unwrap();
}
