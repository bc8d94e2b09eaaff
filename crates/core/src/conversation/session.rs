use crate::conversation::ConversationUnit;
use crate::orchestrator::TurnPhase;
use tokio::sync::{watch, Mutex, MutexGuard, RwLock};

/// Ordered log of one chat's exchange units.
///
/// Units are only ever appended or dropped all at once. The turn guard is
/// separate from the unit lock so readers can take snapshots while a turn is
/// waiting on a remote call.
pub struct ConversationSession {
    id: String,
    units: RwLock<Vec<ConversationUnit>>,
    turn: Mutex<()>,
    phase: watch::Sender<TurnPhase>,
}

/// Held for the duration of one turn. Dropping it lets the next turn start.
pub struct TurnGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    phase: &'a watch::Sender<TurnPhase>,
}

impl TurnGuard<'_> {
    pub fn set_phase(&self, phase: TurnPhase) {
        self.phase.send_replace(phase);
    }
}

impl ConversationSession {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            units: RwLock::new(Vec::new()),
            turn: Mutex::new(()),
            phase: watch::channel(TurnPhase::Idle).0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn append(&self, unit: impl Into<ConversationUnit>) {
        self.units.write().await.push(unit.into());
    }

    pub async fn snapshot(&self) -> Vec<ConversationUnit> {
        self.units.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.units.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.units.read().await.is_empty()
    }

    /// Drops every unit in one step.
    ///
    /// Waits for an in-flight turn to finish first, so a turn never appends its
    /// reply into a session that was cleared underneath it.
    pub async fn clear(&self) {
        let _turn = self.turn.lock().await;
        let dropped = std::mem::take(&mut *self.units.write().await);
        tracing::debug!(session = %self.id, units = dropped.len(), "session cleared");
    }

    /// Drops every unit after the first `len`.
    pub(crate) async fn truncate(&self, len: usize) {
        self.units.write().await.truncate(len);
    }

    /// Claims the session for a new turn, or `None` if one is already running.
    pub fn try_begin_turn(&self) -> Option<TurnGuard<'_>> {
        self.turn.try_lock().ok().map(|g| TurnGuard {
            _guard: g,
            phase: &self.phase,
        })
    }

    pub fn phase(&self) -> TurnPhase {
        *self.phase.borrow()
    }

    /// Follows the phase of this session's turns, e.g. to drive a busy indicator.
    pub fn watch_phase(&self) -> watch::Receiver<TurnPhase> {
        self.phase.subscribe()
    }

    pub fn turn_in_flight(&self) -> bool {
        self.turn.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{AssistantTextUnit, AudioFormat, UserAudioUnit};
    use std::sync::Arc;

    #[tokio::test]
    async fn preserves_insertion_order() {
        let session = ConversationSession::new("s1");
        session
            .append(UserAudioUnit::from_bytes(b"a", AudioFormat::Wav))
            .await;
        session.append(AssistantTextUnit::new("one")).await;
        session
            .append(UserAudioUnit::from_bytes(b"b", AudioFormat::Mp3))
            .await;

        let units = session.snapshot().await;
        assert_eq!(units.len(), 3);
        assert!(units[0].is_user());
        assert_eq!(units[1], ConversationUnit::from(AssistantTextUnit::new("one")));
        assert!(units[2].is_user());
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_appends() {
        let session = ConversationSession::new("s1");
        session.append(AssistantTextUnit::new("one")).await;
        let before = session.snapshot().await;
        session.append(AssistantTextUnit::new("two")).await;
        assert_eq!(before.len(), 1);
        assert_eq!(session.len().await, 2);
    }

    #[tokio::test]
    async fn clear_empties_session() {
        let session = ConversationSession::new("s1");
        for i in 0..5 {
            session.append(AssistantTextUnit::new(i.to_string())).await;
        }
        session.clear().await;
        assert!(session.is_empty().await);
        assert!(session.snapshot().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reader_never_sees_partial_clear() {
        let session = Arc::new(ConversationSession::new("s1"));
        for i in 0..64 {
            session.append(AssistantTextUnit::new(i.to_string())).await;
        }

        let reader = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                for _ in 0..200 {
                    let n = session.snapshot().await.len();
                    assert!(n == 64 || n == 0, "observed partial clear: {n}");
                    tokio::task::yield_now().await;
                }
            })
        };
        session.clear().await;
        reader.await.expect("reader task");
    }

    #[tokio::test]
    async fn only_one_turn_at_a_time() {
        let session = ConversationSession::new("s1");
        let guard = session.try_begin_turn().expect("first turn");
        assert!(session.turn_in_flight());
        assert!(session.try_begin_turn().is_none());
        drop(guard);
        assert!(!session.turn_in_flight());
        assert!(session.try_begin_turn().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn clear_waits_for_running_turn() {
        let session = Arc::new(ConversationSession::new("s1"));
        session.append(AssistantTextUnit::new("kept until turn ends")).await;
        let guard = session.try_begin_turn().expect("turn");

        let clearing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.clear().await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!clearing.is_finished());
        assert_eq!(session.len().await, 1);

        drop(guard);
        clearing.await.expect("clear task");
        assert!(session.is_empty().await);
    }

    #[tokio::test]
    async fn truncate_keeps_prefix() {
        let session = ConversationSession::new("s1");
        for i in 0..3 {
            session.append(AssistantTextUnit::new(i.to_string())).await;
        }
        session.truncate(1).await;
        assert_eq!(
            session.snapshot().await,
            vec![ConversationUnit::from(AssistantTextUnit::new("0"))]
        );
    }

    #[tokio::test]
    async fn phase_updates_reach_watchers() {
        let session = ConversationSession::new("s1");
        let mut rx = session.watch_phase();
        assert_eq!(session.phase(), TurnPhase::Idle);

        let guard = session.try_begin_turn().expect("turn");
        guard.set_phase(TurnPhase::AwaitingInference);
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow(), TurnPhase::AwaitingInference);
    }
}
