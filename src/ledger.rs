// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::errors::{Error, Result, StorageError};
use crate::storage::Storage;
use crate::vote::{normalize_address, Tally, Vote, WinnerResult};
use crate::{HashMap, SessionId};
use slog::Logger;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The ballots of one session, indexed by voter.
#[derive(Default)]
struct SessionVotes {
    ballots: HashMap<String, Vote>,
    tally: Tally,
}

impl SessionVotes {
    fn insert(&mut self, vote: Vote) {
        *self.tally.entry(vote.index).or_insert(0) += 1;
        self.ballots.insert(vote.address.clone(), vote);
    }
}

#[derive(Default)]
struct LedgerCore {
    sessions: HashMap<SessionId, SessionVotes>,
    votes: usize,
}

impl LedgerCore {
    fn has_voted(&self, session_id: SessionId, address: &str) -> bool {
        self.sessions
            .get(&session_id)
            .map_or(false, |s| s.ballots.contains_key(address))
    }

    fn insert(&mut self, vote: Vote) {
        self.sessions
            .entry(vote.session_id)
            .or_default()
            .insert(vote);
        self.votes += 1;
    }
}

/// VoteLedger records at most one vote per address and session, and answers
/// which candidate leads a session.
///
/// Every accepted vote is handed to the storage before it becomes visible,
/// so the in-memory index never runs ahead of what was persisted.
#[derive(Getters)]
pub struct VoteLedger<T: Storage> {
    /// The storage votes are persisted to.
    #[get = "pub"]
    store: T,
    core: RwLock<LedgerCore>,
    /// The logger for the ledger.
    #[get = "pub"]
    logger: Logger,
}

impl<T: Storage> VoteLedger<T> {
    /// Creates a ledger on top of `store`, replaying every vote it already
    /// holds.
    ///
    /// Stored addresses are compared the same way live ones are. A store
    /// containing two votes for one address in one session, or a vote with
    /// an empty address, is reported as corrupted.
    pub fn new(store: T, logger: &Logger) -> Result<VoteLedger<T>> {
        let logger = logger.new(o!("component" => "ledger"));
        let mut core = LedgerCore::default();
        for mut vote in store.initial_votes()? {
            vote.address = normalize_address(&vote.address).ok_or_else(|| {
                Error::Store(StorageError::Corrupted(format!(
                    "empty address in session {}",
                    vote.session_id
                )))
            })?;
            if core.has_voted(vote.session_id, &vote.address) {
                return Err(Error::Store(StorageError::Corrupted(format!(
                    "address {} voted twice in session {}",
                    vote.address, vote.session_id
                ))));
            }
            core.insert(vote);
        }
        info!(
            logger,
            "ledger ready";
            "sessions" => core.sessions.len(),
            "votes" => core.votes,
        );
        Ok(VoteLedger {
            store,
            core: RwLock::new(core),
            logger,
        })
    }

    fn rl(&self) -> RwLockReadGuard<'_, LedgerCore> {
        self.core.read().unwrap()
    }

    fn wl(&self) -> RwLockWriteGuard<'_, LedgerCore> {
        self.core.write().unwrap()
    }

    /// Records that `address` chose candidate `index` in session `session_id`.
    ///
    /// The address is compared case-insensitively. Fails with
    /// `Error::DuplicateVote` if the address already voted in the session;
    /// if the storage refuses the vote its error is returned and the ledger
    /// is unchanged, so the same address may retry.
    pub fn record_vote(
        &self,
        session_id: SessionId,
        index: u64,
        address: &str,
        timestamp: u64,
    ) -> Result<()> {
        let address = normalize_address(address).ok_or(Error::InvalidAddress)?;

        // Check, persist and insert under one lock so two requests for the
        // same pair cannot both pass the check.
        let mut core = self.wl();
        if core.has_voted(session_id, &address) {
            warn!(
                self.logger,
                "rejected duplicate vote";
                "session" => session_id,
                "address" => &address,
            );
            return Err(Error::DuplicateVote(session_id, address));
        }

        let vote = Vote {
            session_id,
            address,
            index,
            timestamp,
        };
        if let Err(e) = self.store.append(&vote) {
            error!(
                self.logger,
                "failed to persist vote";
                "vote" => %vote,
                "err" => %e,
            );
            return Err(e);
        }

        info!(
            self.logger,
            "recorded vote";
            "session" => session_id,
            "address" => &vote.address,
            "index" => index,
        );
        core.insert(vote);
        Ok(())
    }

    /// Counts the votes of a session and picks the leading index, the lowest
    /// one on a tie. A session nobody voted in yields an empty result.
    pub fn compute_winner(&self, session_id: SessionId) -> WinnerResult {
        WinnerResult::from_tally(self.tally(session_id))
    }

    /// Vote counts of a session keyed by candidate index.
    pub fn tally(&self, session_id: SessionId) -> Tally {
        self.rl()
            .sessions
            .get(&session_id)
            .map(|s| s.tally.clone())
            .unwrap_or_default()
    }

    /// Whether `address` already voted in the session.
    pub fn has_voted(&self, session_id: SessionId, address: &str) -> bool {
        match normalize_address(address) {
            Some(address) => self.rl().has_voted(session_id, &address),
            None => false,
        }
    }

    /// All votes of a session, oldest first.
    pub fn session_votes(&self, session_id: SessionId) -> Vec<Vote> {
        let mut votes: Vec<Vote> = self
            .rl()
            .sessions
            .get(&session_id)
            .map(|s| s.ballots.values().cloned().collect())
            .unwrap_or_default();
        votes.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.address.cmp(&b.address))
        });
        votes
    }

    /// Ids of the sessions that have at least one vote, ascending.
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.rl().sessions.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Total number of votes across all sessions.
    pub fn len(&self) -> usize {
        self.rl().votes
    }

    /// True if no vote has been recorded in any session.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
