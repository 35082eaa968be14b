//! Agreement session driving one group to a single DKG result hash

use super::{RecordOutcome, ResultTally, Vote, VoteVerifier};
use crate::gossip::{Gossip, Subscription};
use crate::promise::Promise;
use crate::signing::Signer;
use crate::{AgreementConfig, DkgResult, Error, MemberIndex, Result, ResultHash};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of an agreement session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, local result not submitted yet
    Idle,
    /// Collecting votes from the group
    Collecting,
    /// A result hash reached the threshold
    Decided(ResultHash),
    /// The decided result is being submitted
    Submitting(ResultHash),
    /// Submission finished
    Closed,
    /// The collection window elapsed without quorum
    Abandoned,
}

/// One run of result agreement for a group.
///
/// The session is a cheap handle; clones share state. Incoming votes are
/// verified, tallied, and the first hash reaching the threshold resolves the
/// session promise. Votes arriving after a decision or abandonment are still
/// recorded, but the promise is resolved at most once.
///
/// Background tasks hold the session weakly. Dropping every handle ends the
/// session and fails its promise if it is still pending.
#[derive(Clone)]
pub struct AgreementSession {
    inner: Arc<Inner>,
}

struct Inner {
    config: AgreementConfig,
    signer: Arc<dyn Signer>,
    verifier: VoteVerifier,
    gossip: Arc<dyn Gossip>,
    state: Mutex<State>,
    promise: Promise<ResultHash>,
    shutdown: watch::Sender<bool>,
}

struct State {
    phase: Phase,
    tally: ResultTally,
}

impl AgreementSession {
    /// Create a session for the member described by `config`
    pub fn new(
        config: AgreementConfig,
        signer: Arc<dyn Signer>,
        verifier: VoteVerifier,
        gossip: Arc<dyn Gossip>,
    ) -> Result<Self> {
        if verifier.group_size() != config.group_size {
            return Err(Error::InvalidConfig(format!(
                "Group snapshot has {} members, configuration expects {}",
                verifier.group_size(),
                config.group_size
            )));
        }

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                signer,
                verifier,
                gossip,
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    tally: ResultTally::new(),
                }),
                promise: Promise::new(),
                shutdown,
            }),
        })
    }

    /// Submit the locally computed result and start collecting votes.
    ///
    /// Signs and broadcasts this member's vote, subscribes to peer votes, and
    /// arms the collection window. The returned promise is fulfilled with the
    /// agreed hash or failed with [`Error::NoQuorum`].
    ///
    /// A failed subscription leaves the session `Idle` so `start` can be
    /// retried. A failed broadcast abandons the session and fails the promise
    /// with the transport error.
    #[instrument(skip(self, result), fields(member_index = self.inner.config.member_index))]
    pub async fn start(&self, result: &DkgResult) -> Result<Promise<ResultHash>> {
        let config = &self.inner.config;
        let result_hash = result.hash();
        let vote = Vote::sign(config.member_index, result_hash, self.inner.signer.as_ref())?;
        self.inner.verifier.verify(&vote)?;

        self.ensure_idle()?;
        let subscription = self.inner.gossip.subscribe(&config.session_id).await?;
        {
            let mut state = self.lock();
            if state.phase != Phase::Idle {
                return Err(already_started(state.phase));
            }
            state.phase = Phase::Collecting;
        }

        info!(
            result_hash = %result_hash,
            group_size = config.group_size,
            threshold = config.threshold,
            "Starting result agreement"
        );

        let shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(collection_timer(
            Arc::downgrade(&self.inner),
            config.collection_window,
            shutdown.clone(),
        ));
        tokio::spawn(listen(Arc::downgrade(&self.inner), subscription, shutdown));

        self.on_vote_received(vote.clone())?;
        if let Err(e) = self
            .inner
            .gossip
            .publish(&config.session_id, vote.to_bytes())
            .await
        {
            self.abort(&e);
            return Err(e);
        }

        Ok(self.promise())
    }

    /// Handle a vote delivered by the broadcast channel.
    ///
    /// Rejected votes are reported as errors and never reach the tally.
    pub fn on_vote_received(&self, vote: Vote) -> Result<RecordOutcome> {
        if let Err(e) = self.inner.verifier.verify(&vote) {
            warn!(
                sender = vote.sender_index(),
                result_hash = %vote.result_hash(),
                error = %e,
                "Rejected vote"
            );
            return Err(e);
        }

        let threshold = self.inner.config.threshold;
        let (outcome, decided) = {
            let mut state = self.lock();
            let outcome = state.tally.record(&vote);

            let mut decided = None;
            if state.phase == Phase::Collecting && state.tally.has_quorum(threshold) {
                if let Some((hash, supporters)) = state.tally.leader() {
                    state.phase = Phase::Decided(hash);
                    decided = Some((hash, supporters));
                }
            }
            (outcome, decided)
        };

        match &outcome {
            RecordOutcome::Counted { hash, supporters } => debug!(
                sender = vote.sender_index(),
                result_hash = %hash,
                supporters,
                "Vote counted"
            ),
            RecordOutcome::DuplicateVote { sender, first_hash } => debug!(
                sender,
                first_hash = %first_hash,
                "Duplicate vote ignored"
            ),
        }

        if let Some((hash, supporters)) = decided {
            info!(result_hash = %hash, supporters, threshold, "Result agreed");
            if let Err(e) = self.inner.promise.fulfill(hash) {
                debug!(error = %e, "Session promise already resolved");
            }
        }

        Ok(outcome)
    }

    /// Abandon the session if no result reached the threshold yet
    pub fn expire(&self) {
        let leading = {
            let mut state = self.lock();
            if state.phase != Phase::Collecting {
                return;
            }
            state.phase = Phase::Abandoned;
            state.tally.leader().map_or(0, |(_, supporters)| supporters)
        };

        let threshold = self.inner.config.threshold;
        info!(threshold, leading, "Collection window elapsed without quorum");

        if let Err(e) = self.inner.promise.fail(Error::NoQuorum { threshold, leading }) {
            debug!(error = %e, "Session promise already resolved");
        }
    }

    /// Abandon a session whose own vote could not be broadcast
    fn abort(&self, cause: &Error) {
        let abandoned = {
            let mut state = self.lock();
            let collecting = state.phase == Phase::Collecting;
            if collecting {
                state.phase = Phase::Abandoned;
            }
            collecting
        };
        self.inner.shutdown.send_replace(true);

        warn!(error = %cause, "Failed to broadcast own vote");

        if abandoned {
            let reason = match cause {
                Error::Relay(reason) => reason.clone(),
                other => other.to_string(),
            };
            if let Err(e) = self.inner.promise.fail(Error::Relay(reason)) {
                debug!(error = %e, "Session promise already resolved");
            }
        }
    }

    /// Mark the decided result as being submitted
    pub fn begin_submission(&self) -> Result<ResultHash> {
        let mut state = self.lock();
        match state.phase {
            Phase::Decided(hash) => {
                state.phase = Phase::Submitting(hash);
                Ok(hash)
            }
            phase => Err(Error::InvalidState(format!(
                "cannot submit in phase {:?}",
                phase
            ))),
        }
    }

    /// Finish the session and stop background tasks.
    ///
    /// An abandoned session stays abandoned.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.lock();
            match state.phase {
                Phase::Decided(_) | Phase::Submitting(_) => state.phase = Phase::Closed,
                Phase::Closed | Phase::Abandoned => {}
                phase => {
                    return Err(Error::InvalidState(format!(
                        "cannot close in phase {:?}",
                        phase
                    )))
                }
            }
        }
        self.inner.shutdown.send_replace(true);
        Ok(())
    }

    /// Promise resolved with the agreed hash
    pub fn promise(&self) -> Promise<ResultHash> {
        self.inner.promise.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Currently leading hash and its supporter count
    pub fn leader(&self) -> Option<(ResultHash, usize)> {
        self.lock().tally.leader()
    }

    pub fn supporters_of(&self, hash: &ResultHash) -> usize {
        self.lock().tally.supporters_of(hash)
    }

    /// Signatures of the members supporting `hash`, as needed for submission
    pub fn supporting_signatures(&self, hash: &ResultHash) -> BTreeMap<MemberIndex, Vec<u8>> {
        self.lock().tally.signatures_for(hash)
    }

    pub fn config(&self) -> &AgreementConfig {
        &self.inner.config
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.lock().phase {
            Phase::Idle => Ok(()),
            phase => Err(already_started(phase)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Nothing can resolve the promise once the last handle is gone.
        let _ = self.promise.fail(Error::InvalidState(
            "session dropped before completion".into(),
        ));
    }
}

fn already_started(phase: Phase) -> Error {
    Error::InvalidState(format!("session already started ({:?})", phase))
}

/// Feed votes from the broadcast channel into the session.
///
/// Holds the session weakly and stops once every handle is dropped.
async fn listen(
    session: Weak<Inner>,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        tokio::select! {
            payload = subscription.recv() => {
                let Some(payload) = payload else { break };
                let Some(inner) = session.upgrade() else { break };
                match Vote::from_bytes(&payload) {
                    Ok(vote) => {
                        // Rejections are logged by on_vote_received.
                        let _ = AgreementSession { inner }.on_vote_received(vote);
                    }
                    Err(e) => warn!(error = %e, "Dropped undecodable vote"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Vote listener stopped");
}

async fn collection_timer(
    session: Weak<Inner>,
    window: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let window = tokio::time::sleep(window);
    tokio::pin!(window);

    while !*shutdown.borrow() {
        tokio::select! {
            _ = &mut window => {
                if let Some(inner) = session.upgrade() {
                    AgreementSession { inner }.expire();
                }
                break;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::{async_trait, MemoryGossip};
    use crate::SessionId;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use crate::membership::GroupSnapshot;
    use crate::signing::{Secp256k1Signer, Secp256k1Verifier};
    use crate::session_id_for_channel;

    struct Group {
        signers: Vec<Arc<Secp256k1Signer>>,
        verifier: VoteVerifier,
        gossip: Arc<MemoryGossip>,
    }

    impl Group {
        fn new(n: usize) -> Self {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();

            let signers: Vec<_> = (0..n).map(|_| Arc::new(Secp256k1Signer::random())).collect();
            let snapshot =
                GroupSnapshot::from_public_keys(signers.iter().map(|s| s.public_key()));
            Self {
                verifier: VoteVerifier::new(Arc::new(snapshot), Arc::new(Secp256k1Verifier)),
                signers,
                gossip: Arc::new(MemoryGossip::new()),
            }
        }

        fn session(&self, member: MemberIndex, threshold: usize, window: Duration) -> AgreementSession {
            self.session_over(member, threshold, window, self.gossip.clone())
        }

        fn session_over(
            &self,
            member: MemberIndex,
            threshold: usize,
            window: Duration,
            gossip: Arc<dyn Gossip>,
        ) -> AgreementSession {
            let config = AgreementConfig::new(
                session_id_for_channel("test-group"),
                self.signers.len(),
                member,
            )
            .unwrap()
            .with_threshold(threshold)
            .unwrap()
            .with_collection_window(window);

            AgreementSession::new(
                config,
                self.signers[member as usize - 1].clone(),
                self.verifier.clone(),
                gossip,
            )
            .unwrap()
        }

        fn vote(&self, member: MemberIndex, hash: ResultHash) -> Vote {
            Vote::sign(member, hash, self.signers[member as usize - 1].as_ref()).unwrap()
        }
    }

    /// Broadcast channel whose relay is unreachable for subscribing once, or
    /// for publishing always
    struct FlakyGossip {
        subscribe_down: AtomicBool,
        publish_down: bool,
        inner: MemoryGossip,
    }

    impl FlakyGossip {
        fn new(subscribe_down: bool, publish_down: bool) -> Arc<Self> {
            Arc::new(Self {
                subscribe_down: AtomicBool::new(subscribe_down),
                publish_down,
                inner: MemoryGossip::new(),
            })
        }
    }

    #[async_trait]
    impl Gossip for FlakyGossip {
        async fn publish(&self, session_id: &SessionId, payload: Vec<u8>) -> Result<()> {
            if self.publish_down {
                return Err(Error::Relay("down".into()));
            }
            self.inner.publish(session_id, payload).await
        }

        async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription> {
            if self.subscribe_down.swap(false, Ordering::SeqCst) {
                return Err(Error::Relay("down".into()));
            }
            self.inner.subscribe(session_id).await
        }
    }

    fn result(key: u8) -> DkgResult {
        DkgResult::new(vec![key; 33], vec![])
    }

    async fn wait(promise: &Promise<ResultHash>) -> crate::promise::Outcome<ResultHash> {
        tokio::time::timeout(Duration::from_secs(5), promise.wait())
            .await
            .expect("promise was not resolved")
    }

    #[tokio::test]
    async fn test_threshold_decides_first_hash() {
        let group = Group::new(5);
        let h1 = result(1).hash();
        let h2 = result(2).hash();
        let session = group.session(1, 3, Duration::from_secs(60));

        let promise = session.start(&result(1)).await.unwrap();
        assert_eq!(session.phase(), Phase::Collecting);

        session.on_vote_received(group.vote(2, h1)).unwrap();
        assert!(!promise.is_complete());
        assert_eq!(
            session.on_vote_received(group.vote(3, h1)).unwrap(),
            RecordOutcome::Counted {
                hash: h1,
                supporters: 3
            }
        );

        assert_eq!(wait(&promise).await.unwrap(), h1);
        assert_eq!(session.phase(), Phase::Decided(h1));
        assert_eq!(session.leader(), Some((h1, 3)));

        session.on_vote_received(group.vote(4, h2)).unwrap();
        session.on_vote_received(group.vote(5, h2)).unwrap();
        assert_eq!(session.supporters_of(&h2), 2);
        assert_eq!(session.leader(), Some((h1, 3)));
        assert_eq!(session.phase(), Phase::Decided(h1));
        assert_eq!(promise.outcome().unwrap().unwrap(), h1);

        let signatures = session.supporting_signatures(&h1);
        assert_eq!(signatures.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);

        session.close().unwrap();
    }

    #[tokio::test]
    async fn test_replayed_vote_is_duplicate() {
        let group = Group::new(5);
        let h1 = result(1).hash();
        let h2 = result(2).hash();
        let session = group.session(1, 3, Duration::from_secs(60));
        session.start(&result(9)).await.unwrap();

        session.on_vote_received(group.vote(2, h1)).unwrap();
        assert_eq!(
            session.on_vote_received(group.vote(2, h2)).unwrap(),
            RecordOutcome::DuplicateVote {
                sender: 2,
                first_hash: h1
            }
        );
        assert_eq!(session.supporters_of(&h1), 1);
        assert_eq!(session.supporters_of(&h2), 0);
    }

    #[tokio::test]
    async fn test_unknown_sender_never_reaches_tally() {
        let group = Group::new(5);
        let session = group.session(1, 3, Duration::from_secs(60));
        let hash = result(1).hash();
        session.start(&result(1)).await.unwrap();

        let outsider = Secp256k1Signer::random();
        let vote = Vote::sign(7, hash, &outsider).unwrap();

        assert!(matches!(
            session.on_vote_received(vote),
            Err(Error::UnknownSender(7))
        ));
        assert_eq!(session.supporters_of(&hash), 1);
    }

    #[tokio::test]
    async fn test_window_elapses_without_quorum() {
        let group = Group::new(5);
        let h1 = result(1).hash();
        let session = group.session(1, 3, Duration::from_millis(100));

        let promise = session.start(&result(1)).await.unwrap();
        session.on_vote_received(group.vote(2, h1)).unwrap();

        let err = wait(&promise).await.unwrap_err();
        assert!(matches!(
            *err,
            Error::NoQuorum {
                threshold: 3,
                leading: 2
            }
        ));
        assert_eq!(session.phase(), Phase::Abandoned);

        // A late quorum is recorded but not honored.
        session.on_vote_received(group.vote(3, h1)).unwrap();
        assert_eq!(session.supporters_of(&h1), 3);
        assert_eq!(session.phase(), Phase::Abandoned);
        assert!(promise.outcome().unwrap().is_err());
    }

    #[tokio::test]
    async fn test_group_agrees_over_gossip() {
        let group = Group::new(5);
        let agreed = result(1);
        let sessions: Vec<_> = (1..=5)
            .map(|member| group.session(member, 3, Duration::from_secs(60)))
            .collect();

        let mut promises = Vec::new();
        for (i, session) in sessions.iter().enumerate() {
            let local = if i < 3 { agreed.clone() } else { result(2) };
            promises.push(session.start(&local).await.unwrap());
        }

        for promise in &promises {
            assert_eq!(wait(promise).await.unwrap(), agreed.hash());
        }
        assert_eq!(group.gossip.published(&sessions[0].config().session_id), 5);

        for session in &sessions {
            assert_eq!(session.begin_submission().unwrap(), agreed.hash());
            session.close().unwrap();
            assert_eq!(session.phase(), Phase::Closed);
        }
    }

    #[tokio::test]
    async fn test_undecodable_and_forged_payloads_are_dropped() {
        let group = Group::new(3);
        let hash = result(1).hash();
        let session = group.session(1, 2, Duration::from_secs(60));
        let promise = session.start(&result(1)).await.unwrap();
        let session_id = session.config().session_id;

        group.gossip.publish(&session_id, vec![0xff, 0x00]).await.unwrap();
        let forged = Vote::new(2, hash, vec![0; 64], group.signers[1].public_key());
        group.gossip.publish(&session_id, forged.to_bytes()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!promise.is_complete());
        assert_eq!(session.supporters_of(&hash), 1);

        let vote = group.vote(3, hash);
        group.gossip.publish(&session_id, vote.to_bytes()).await.unwrap();
        assert_eq!(wait(&promise).await.unwrap(), hash);
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let group = Group::new(3);
        let session = group.session(1, 2, Duration::from_secs(60));

        assert!(matches!(session.begin_submission(), Err(Error::InvalidState(_))));
        assert!(matches!(session.close(), Err(Error::InvalidState(_))));

        session.start(&result(1)).await.unwrap();
        assert!(matches!(
            session.start(&result(1)).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_single_member_threshold_decides_on_own_vote() {
        let group = Group::new(1);
        let session = group.session(1, 1, Duration::from_secs(60));

        let promise = session.start(&result(4)).await.unwrap();
        assert_eq!(wait(&promise).await.unwrap(), result(4).hash());
    }

    #[tokio::test]
    async fn test_failed_subscription_leaves_session_idle() {
        let group = Group::new(3);
        let gossip = FlakyGossip::new(true, false);
        let session = group.session_over(1, 2, Duration::from_millis(50), gossip);

        assert!(matches!(
            session.start(&result(1)).await,
            Err(Error::Relay(_))
        ));
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.supporters_of(&result(1).hash()), 0);

        // No collection window was armed.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!session.promise().is_complete());

        session.start(&result(1)).await.unwrap();
        assert_eq!(session.phase(), Phase::Collecting);
        assert_eq!(session.supporters_of(&result(1).hash()), 1);
    }

    #[tokio::test]
    async fn test_failed_broadcast_abandons_session() {
        let group = Group::new(3);
        let gossip = FlakyGossip::new(false, true);
        let session = group.session_over(1, 2, Duration::from_secs(60), gossip);

        assert!(matches!(
            session.start(&result(1)).await,
            Err(Error::Relay(_))
        ));
        assert_eq!(session.phase(), Phase::Abandoned);

        let err = wait(&session.promise()).await.unwrap_err();
        assert!(matches!(&*err, Error::Relay(reason) if reason == "down"));

        assert!(matches!(
            session.start(&result(1)).await,
            Err(Error::InvalidState(_))
        ));
        session.close().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_session_releases_state() {
        let group = Group::new(3);
        let session = group.session(1, 2, Duration::from_millis(50));

        let promise = session.start(&result(1)).await.unwrap();
        assert!(wait(&promise).await.is_err());
        assert_eq!(session.phase(), Phase::Abandoned);

        let state = Arc::downgrade(&session.inner);
        drop(session);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_dropping_pending_session_fails_promise() {
        let group = Group::new(3);
        let session = group.session(1, 2, Duration::from_secs(60));

        let promise = session.start(&result(1)).await.unwrap();
        let state = Arc::downgrade(&session.inner);
        drop(session);

        let err = wait(&promise).await.unwrap_err();
        assert!(matches!(*err, Error::InvalidState(_)));
        assert!(state.upgrade().is_none());
    }

    fn split_votes(group: &Group, h1: ResultHash, h2: ResultHash) -> Vec<Vote> {
        // Members 2..=5 back h1 alongside member 1, members 6..=9 back h2.
        let votes: Vec<Vote> = (2..=9)
            .map(|member| group.vote(member, if member <= 5 { h1 } else { h2 }))
            .collect();
        votes.iter().chain(votes.iter()).cloned().collect()
    }

    async fn deliver_concurrently(session: &AgreementSession, votes: Vec<Vote>) {
        let tasks: Vec<_> = votes
            .into_iter()
            .map(|vote| {
                let session = session.clone();
                tokio::spawn(async move { session.on_vote_received(vote).unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_decide_once() {
        let group = Group::new(9);
        let h1 = result(1).hash();
        let h2 = result(2).hash();
        let session = group.session(1, 3, Duration::from_secs(60));

        let promise = session.start(&result(1)).await.unwrap();
        let fulfilled = Arc::new(AtomicUsize::new(0));
        let counter = fulfilled.clone();
        promise.on_success(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        deliver_concurrently(&session, split_votes(&group, h1, h2)).await;

        let decided = wait(&promise).await.unwrap();
        assert!(decided == h1 || decided == h2);
        assert_eq!(session.phase(), Phase::Decided(decided));
        assert_eq!(session.supporters_of(&h1), 5);
        assert_eq!(session.supporters_of(&h2), 4);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fulfilled.load(Ordering::SeqCst), 1);
        session.close().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_decide_leader() {
        let group = Group::new(9);
        let h1 = result(1).hash();
        let h2 = result(2).hash();
        let session = group.session(1, 5, Duration::from_secs(60));

        let promise = session.start(&result(1)).await.unwrap();
        deliver_concurrently(&session, split_votes(&group, h1, h2)).await;

        assert_eq!(wait(&promise).await.unwrap(), h1);
        assert_eq!(session.leader(), Some((h1, 5)));
        assert_eq!(session.phase(), Phase::Decided(h1));
        assert_eq!(session.supporters_of(&h2), 4);
        session.close().unwrap();
    }

    #[test]
    fn test_rejects_mismatched_group() {
        let group = Group::new(3);
        let config = AgreementConfig::new([0u8; 32], 4, 1).unwrap();

        let session = AgreementSession::new(
            config,
            group.signers[0].clone(),
            group.verifier.clone(),
            group.gossip.clone(),
        );
        assert!(matches!(session, Err(Error::InvalidConfig(_))));
    }
}
