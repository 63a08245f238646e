// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

/*!

## Overview

This crate keeps the ballots of a community NFT vote. A *session* is one
selection round; every wallet address may cast exactly one ballot per session,
choosing the index of a candidate. The ledger answers which candidate is
currently ahead.

The crate is split into three layers:

* [`VoteLedger`] holds the in-memory index and enforces the one-vote rule.
* [`Storage`] is where votes are durably kept. [`MemStorage`] and
  [`FileStorage`] are provided.
* [`server`] exposes the ledger over a small JSON HTTP API.

## Recording and tallying

```rust
use vote_ledger::{default_logger, MemStorage, VoteLedger};

let logger = default_logger();
let ledger = VoteLedger::new(MemStorage::new(), &logger).unwrap();

ledger.record_vote(7, 0, "0xAbC", 1).unwrap();
ledger.record_vote(7, 0, "0xdef", 2).unwrap();
ledger.record_vote(7, 1, "0x123", 3).unwrap();

// The same address, in any case, cannot vote twice in a session.
assert!(ledger.record_vote(7, 1, "0xabc", 4).is_err());

let result = ledger.compute_winner(7);
assert_eq!(result.winning_index, Some(0));
assert_eq!(result.counts[&0], 2);
assert_eq!(result.counts[&1], 1);
```

## Serving

```no_run
use std::sync::Arc;
use vote_ledger::{default_logger, server, Config, MemStorage, VoteLedger};

# async fn run() -> vote_ledger::Result<()> {
let logger = default_logger();
let cfg = Config::default();
let ledger = Arc::new(VoteLedger::new(MemStorage::new(), &logger)?);
server::serve(&cfg, ledger, std::future::pending(), &logger).await?;
# Ok(())
# }
```

*/

#![deny(clippy::all)]
#![deny(missing_docs)]

#[cfg(feature = "failpoints")]
#[macro_use]
extern crate fail;

#[macro_use]
extern crate getset;
#[macro_use]
extern crate quick_error;
#[macro_use]
extern crate slog;

mod config;
mod errors;
mod ledger;
pub mod server;
pub mod storage;
mod vote;

pub use self::config::Config;
pub use self::errors::{Error, Result, StorageError};
pub use self::ledger::VoteLedger;
pub use self::storage::{FileStorage, MemStorage, Storage};
pub use self::vote::{normalize_address, Tally, Vote, WinnerResult};

pub mod prelude {
    //! A "prelude" for crates using the `vote-ledger` crate.
    //!
    //! ```rust
    //! use vote_ledger::prelude::*;
    //! ```

    pub use crate::config::Config;
    pub use crate::ledger::VoteLedger;
    pub use crate::storage::{FileStorage, MemStorage, Storage};
    pub use crate::vote::{Tally, Vote, WinnerResult};
}

/// Session identifier type.
pub type SessionId = u64;

type DefaultHashBuilder = std::hash::BuildHasherDefault<fxhash::FxHasher>;

/// A HashMap with the fast, non-cryptographic FxHash hasher.
pub type HashMap<K, V> = std::collections::HashMap<K, V, DefaultHashBuilder>;

/// The default logger used by the server binary and the tests.
///
/// A terminal drain on stderr, filtered through `RUST_LOG` and made async.
/// The root is built once and also receives records logged through the `log`
/// crate; every call returns a child tagged with the current
/// test case name when there is one.
#[cfg(feature = "default-logger")]
pub fn default_logger() -> slog::Logger {
    use slog::Drain;

    lazy_static::lazy_static! {
        static ref ROOT: slog::Logger = {
            let decorator = slog_term::TermDecorator::new().stderr().build();
            let drain = slog_term::CompactFormat::new(decorator).build().fuse();
            let drain = slog_envlogger::new(drain);
            let drain = slog_async::Async::new(drain).build().fuse();
            let root = slog::Logger::root(drain, o!());

            // Records sent through the `log` facade land in the same drain.
            slog_scope::set_global_logger(root.clone()).cancel_reset();
            let _ = slog_stdlog::init();
            root
        };
    }

    if let Some(case) = std::thread::current()
        .name()
        .and_then(|v| v.split(':').last())
    {
        ROOT.new(o!("case" => case.to_string()))
    } else {
        ROOT.new(o!())
    }
}
