use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use uuid::Uuid;

use super::{
	sorted_threads,
	unread::{UnreadCounter, UnreadDelta},
	InboxSnapshot, ThreadEntry, ThreadView,
};
use crate::{
	domain::{
		message::{events::ChangeEvent, DeliveryState, Message, NewMessage, OutgoingMessage},
		viewer::Viewer,
	},
	services::status::{StatusPort, StatusVariant},
};

/// Failed sends kept on screen; older ones are dropped first.
pub const MAX_FAILED_OUTGOING: usize = 20;

/// Client-side cache of one viewer's inbox.
pub struct InboxState {
	viewer: Viewer,
	messages: HashMap<Uuid, Message>,
	outgoing: Vec<OutgoingMessage>,
	unread: UnreadCounter,
	epoch: u64,
	mounted: bool,
	updates: broadcast::Sender<InboxSnapshot>,
	status: Arc<dyn StatusPort>,
}

/// Proof that a fetch was started against a given generation of the state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FetchTicket(u64);

impl InboxState {
	pub fn viewer(&self) -> &Viewer {
		&self.viewer
	}

	pub fn unread(&self) -> &UnreadCounter {
		&self.unread
	}

	pub fn is_mounted(&self) -> bool {
		self.mounted
	}

	pub fn ticket(&self) -> FetchTicket {
		FetchTicket(self.epoch)
	}

	fn accepts(
		&self,
		ticket: FetchTicket,
	) -> bool {
		self.mounted && self.epoch == ticket.0
	}

	/// Merges freshly fetched rows into the cache. Rows the cache already
	/// holds keep any `read_at` they have seen. Returns `false` and leaves the
	/// state untouched when the ticket is stale.
	pub fn merge_fetched(
		&mut self,
		ticket: FetchTicket,
		rows: Vec<Message>,
	) -> bool {
		if !self.accepts(ticket) {
			return false;
		}
		for row in rows.into_iter().filter(|m| m.involves(&self.viewer)) {
			let merged = match self.messages.remove(&row.id) {
				Some(cached) => row.merge(cached),
				None => row,
			};
			self.messages.insert(merged.id, merged);
		}
		self.unread = UnreadCounter::recount(&self.viewer, self.messages.values());
		true
	}

	/// Applies one realtime event to the rows and the counter.
	pub fn apply_event(
		&mut self,
		event: ChangeEvent,
	) -> Option<UnreadDelta> {
		let row = event.row().clone();
		if !row.involves(&self.viewer) {
			return None;
		}
		// A row the cache never held was never counted, whatever the
		// feed's old snapshot says.
		let prior = self.messages.remove(&row.id);
		let row = match &prior {
			Some(prior) => row.merge(prior.clone()),
			None => row,
		};
		let delta = UnreadDelta::between(&self.viewer, prior.as_ref(), &row);
		self.messages.insert(row.id, row);
		if let Some(delta) = &delta {
			self.unread.apply(delta);
		}
		delta
	}

	/// Optimistically marks every cached unread row from `counterpart` as
	/// read and zeroes its count. Returns the ids that changed.
	pub fn mark_read_locally(
		&mut self,
		counterpart: &str,
		now: DateTime<Utc>,
	) -> Vec<Uuid> {
		let viewer = self.viewer.clone();
		let mut changed: Vec<Uuid> = self
			.messages
			.values_mut()
			.filter(|m| m.sender_id == counterpart && m.is_unread_for(&viewer))
			.map(|m| {
				m.read_at = Some(now);
				m.id
			})
			.collect();
		changed.sort();
		self.unread.apply(&UnreadDelta::Reset(counterpart.to_string()));
		changed
	}

	pub fn push_outgoing(
		&mut self,
		new_message: NewMessage,
	) -> OutgoingMessage {
		let outgoing = OutgoingMessage::pending(new_message);
		self.outgoing.push(outgoing.clone());
		outgoing
	}

	/// Replaces the optimistic entry with the stored row.
	pub fn confirm_outgoing(
		&mut self,
		local_id: Uuid,
		stored: Message,
	) -> Option<OutgoingMessage> {
		let position = self.outgoing.iter().position(|o| o.local_id == local_id)?;
		let mut outgoing = self.outgoing.remove(position);
		outgoing.message = stored.clone();
		outgoing.delivery = DeliveryState::Delivered;
		let prior = self.messages.remove(&stored.id);
		if let Some(delta) = UnreadDelta::between(&self.viewer, prior.as_ref(), &stored) {
			// only a note-to-self lands here
			self.unread.apply(&delta);
		}
		self.messages.insert(stored.id, stored);
		Some(outgoing)
	}

	/// Keeps the optimistic entry visible, flagged as not delivered.
	pub fn fail_outgoing(
		&mut self,
		local_id: Uuid,
	) -> Option<OutgoingMessage> {
		let outgoing = self.outgoing.iter_mut().find(|o| o.local_id == local_id)?;
		outgoing.delivery = DeliveryState::Failed;
		let failed = outgoing.clone();

		let mut excess = self.outgoing.iter().filter(|o| o.delivery == DeliveryState::Failed).count().saturating_sub(MAX_FAILED_OUTGOING);
		self.outgoing.retain(|o| {
			if excess > 0 && o.delivery == DeliveryState::Failed {
				excess -= 1;
				return false;
			}
			true
		});
		Some(failed)
	}

	/// Removes a failed entry. Pending entries are left alone.
	pub fn discard_outgoing(
		&mut self,
		local_id: Uuid,
	) -> Option<OutgoingMessage> {
		let position = self
			.outgoing
			.iter()
			.position(|o| o.local_id == local_id && o.delivery == DeliveryState::Failed)?;
		Some(self.outgoing.remove(position))
	}

	pub fn snapshot(&self) -> InboxSnapshot {
		let pending = self.outgoing.iter().map(|o| &o.message);
		InboxSnapshot {
			threads: sorted_threads(&self.viewer, self.messages.values().chain(pending), &self.unread),
			total_unread: self.unread.total(),
			degraded: false,
		}
	}

	pub fn thread_view(
		&self,
		counterpart: &str,
	) -> ThreadView {
		let mut entries: Vec<ThreadEntry> = self
			.messages
			.values()
			.filter(|m| m.is_between(&self.viewer, counterpart))
			.cloned()
			.map(ThreadEntry::from)
			.chain(
				self.outgoing
					.iter()
					.filter(|o| o.message.recipient_id == counterpart)
					.cloned()
					.map(ThreadEntry::from),
			)
			.collect();
		entries.sort_by(|a, b| a.message.sent_at.cmp(&b.message.sent_at).then_with(|| a.message.id.cmp(&b.message.id)));
		ThreadView {
			counterpart_id: counterpart.to_string(),
			entries,
			degraded: false,
		}
	}

	/// The incremental counter agrees with a full rescan of the cache.
	pub fn is_consistent(&self) -> bool {
		self.unread == UnreadCounter::recount(&self.viewer, self.messages.values())
	}

	pub fn present(
		&self,
		message: &str,
		variant: StatusVariant,
	) {
		self.status.present(message, variant);
	}

	pub(crate) fn publish(&self) {
		// no live receivers is fine
		let _ = self.updates.send(self.snapshot());
	}
}

#[derive(Clone)]
pub struct InboxSession(pub Arc<Mutex<InboxState>>);

impl InboxSession {
	pub fn new(
		viewer: Viewer,
		status: Arc<dyn StatusPort>,
	) -> Self {
		let (updates, _rx) = broadcast::channel(100);
		InboxState {
			viewer,
			messages: HashMap::new(),
			outgoing: Vec::new(),
			unread: UnreadCounter::default(),
			epoch: 0,
			mounted: true,
			updates,
			status,
		}
		.into()
	}

	pub(crate) async fn write(&self) -> MutexGuard<'_, InboxState> {
		self.0.lock().await
	}

	pub async fn viewer(&self) -> Viewer {
		self.write().await.viewer.clone()
	}

	pub async fn ticket(&self) -> FetchTicket {
		self.write().await.ticket()
	}

	pub async fn snapshot(&self) -> InboxSnapshot {
		self.write().await.snapshot()
	}

	pub async fn unread(&self) -> UnreadCounter {
		self.write().await.unread.clone()
	}

	/// Receives a fresh snapshot after every applied change.
	pub async fn subscribe(&self) -> broadcast::Receiver<InboxSnapshot> {
		self.write().await.updates.subscribe()
	}

	pub async fn apply_event(
		&self,
		event: ChangeEvent,
	) -> Option<UnreadDelta> {
		let mut state = self.write().await;
		let delta = state.apply_event(event);
		debug_assert!(state.is_consistent());
		state.publish();
		delta
	}

	pub async fn merge_fetched(
		&self,
		ticket: FetchTicket,
		rows: Vec<Message>,
	) -> bool {
		let mut state = self.write().await;
		let applied = state.merge_fetched(ticket, rows);
		if applied {
			state.publish();
		}
		applied
	}

	pub async fn mark_read_locally(
		&self,
		counterpart: &str,
		now: DateTime<Utc>,
	) -> Vec<Uuid> {
		let mut state = self.write().await;
		let changed = state.mark_read_locally(counterpart, now);
		state.publish();
		changed
	}

	/// Drops the view: results of fetches still in flight are discarded.
	pub async fn unmount(&self) {
		let mut state = self.write().await;
		state.mounted = false;
		state.epoch += 1;
	}

	/// Starts a new generation; fetches started before are discarded.
	pub async fn remount(&self) {
		let mut state = self.write().await;
		state.mounted = true;
		state.epoch += 1;
	}
}

impl From<InboxState> for InboxSession {
	fn from(value: InboxState) -> Self {
		Self(Arc::new(Mutex::new(value)))
	}
}

#[cfg(test)]
mod test {
	use std::{collections::HashMap, sync::Arc};

	use chrono::{DateTime, Duration, TimeZone, Utc};
	use proptest::prelude::*;
	use uuid::Uuid;

	use super::{InboxSession, MAX_FAILED_OUTGOING};
	use crate::{
		domain::{
			inbox::unread::UnreadCounter,
			message::{events::ChangeEvent, DeliveryState, Message, NewMessage},
			viewer::Viewer,
		},
		services::status::TracingStatus,
	};

	const PEERS: [&str; 3] = ["b", "c", "d"];

	fn session(viewer: &str) -> InboxSession {
		InboxSession::new(Viewer::resolve(Some(viewer)).unwrap(), Arc::new(TracingStatus))
	}

	fn inbound(sender: &str) -> Message {
		Message {
			id: Uuid::new_v4(),
			sender_id: sender.into(),
			recipient_id: "a".into(),
			content: "hey".into(),
			sent_at: Utc::now(),
			read_at: None,
		}
	}

	#[tokio::test]
	async fn test_stale_fetch_is_discarded_after_unmount() {
		let session = session("a");
		let ticket = session.ticket().await;
		session.unmount().await;

		assert!(!session.merge_fetched(ticket, vec![inbound("b")]).await);
		assert!(session.snapshot().await.threads.is_empty());
	}

	#[tokio::test]
	async fn test_stale_fetch_is_discarded_after_remount() {
		let session = session("a");
		let ticket = session.ticket().await;
		session.remount().await;

		assert!(!session.merge_fetched(ticket, vec![inbound("b")]).await);
		let fresh = session.ticket().await;
		assert!(session.merge_fetched(fresh, vec![inbound("b")]).await);
		assert_eq!(session.unread().await.get("b"), 1);
	}

	#[tokio::test]
	async fn test_local_read_then_echoed_update_does_not_double_count() {
		let session = session("a");
		let first = inbound("b");
		let ticket = session.ticket().await;
		session.merge_fetched(ticket, vec![first.clone()]).await;

		let changed = session.mark_read_locally("b", Utc::now()).await;
		assert_eq!(changed, vec![first.id]);

		// a new message lands before the echo of our own mark-read
		session.apply_event(ChangeEvent::Insert { new: inbound("b") }).await;
		let echo = ChangeEvent::read_transitions(vec![Message {
			read_at: Some(Utc::now()),
			..first
		}]);
		for event in echo {
			session.apply_event(event).await;
		}

		assert_eq!(session.unread().await.get("b"), 1);
		assert!(session.write().await.is_consistent());
	}

	#[tokio::test]
	async fn test_fetch_does_not_regress_read_rows() {
		let session = session("a");
		let row = inbound("b");
		session
			.apply_event(ChangeEvent::Insert {
				new: Message {
					read_at: Some(Utc::now()),
					..row.clone()
				},
			})
			.await;

		let ticket = session.ticket().await;
		session.merge_fetched(ticket, vec![row]).await;
		assert_eq!(session.unread().await.get("b"), 0);
	}

	#[tokio::test]
	async fn test_failed_outgoing_stays_visible() {
		let session = session("a");
		let mut state = session.write().await;
		let outgoing = state.push_outgoing(NewMessage {
			sender_id: "a".into(),
			recipient_id: "b".into(),
			content: "offline".into(),
		});
		state.fail_outgoing(outgoing.local_id);

		let view = state.thread_view("b");
		assert_eq!(view.entries.len(), 1);
		assert_eq!(view.entries[0].delivery, DeliveryState::Failed);
		assert_eq!(state.snapshot().threads[0].counterpart_id, "b");
		assert_eq!(state.unread().total(), 0);

		assert!(state.discard_outgoing(outgoing.local_id).is_some());
		assert!(state.thread_view("b").entries.is_empty());
	}

	#[tokio::test]
	async fn test_failed_outgoing_is_capped_oldest_first() {
		let session = session("a");
		let mut state = session.write().await;
		let mut ids = Vec::new();
		for n in 0..MAX_FAILED_OUTGOING + 5 {
			let outgoing = state.push_outgoing(NewMessage {
				sender_id: "a".into(),
				recipient_id: "b".into(),
				content: format!("attempt {n}"),
			});
			state.fail_outgoing(outgoing.local_id);
			ids.push(outgoing.local_id);
		}
		let pending = state.push_outgoing(NewMessage {
			sender_id: "a".into(),
			recipient_id: "b".into(),
			content: "in flight".into(),
		});

		let view = state.thread_view("b");
		assert_eq!(view.entries.len(), MAX_FAILED_OUTGOING + 1);
		assert!(view.entries.iter().all(|e| e.message.content != "attempt 0"));
		assert!(state.discard_outgoing(ids[0]).is_none());
		// pending entries cannot be discarded
		assert!(state.discard_outgoing(pending.local_id).is_none());
	}

	#[derive(Clone, Debug)]
	enum Step {
		Receive(usize),
		Send(usize),
		/// Delivers any queued feed event, so updates may overtake inserts.
		Deliver(usize),
		DuplicateInsert(usize),
		MarkReadLocally(usize),
		ReadElsewhere(usize),
		Snapshot,
		Refetch(usize),
	}

	fn step() -> impl Strategy<Value = Step> {
		let peer = 0..PEERS.len();
		prop_oneof![
			peer.clone().prop_map(Step::Receive),
			peer.clone().prop_map(Step::Send),
			any::<usize>().prop_map(Step::Deliver),
			any::<usize>().prop_map(Step::Deliver),
			any::<usize>().prop_map(Step::DuplicateInsert),
			peer.clone().prop_map(Step::MarkReadLocally),
			peer.prop_map(Step::ReadElsewhere),
			Just(Step::Snapshot),
			any::<usize>().prop_map(Step::Refetch),
		]
	}

	fn row_at(
		sender: &str,
		recipient: &str,
		sent_at: DateTime<Utc>,
	) -> Message {
		Message {
			id: Uuid::new_v4(),
			sender_id: sender.into(),
			recipient_id: recipient.into(),
			content: String::new(),
			sent_at,
			read_at: None,
		}
	}

	/// What the store's mark-as-read does: returns the rows it changed.
	fn read_thread(
		store: &mut HashMap<Uuid, Message>,
		peer: &str,
		at: DateTime<Utc>,
	) -> Vec<Message> {
		store
			.values_mut()
			.filter(|m| m.sender_id == peer && m.is_unread_for("a"))
			.map(|m| {
				m.read_at = Some(at);
				m.clone()
			})
			.collect()
	}

	proptest! {
		#[test]
		fn test_session_count_matches_store_under_any_interleaving(steps in prop::collection::vec(step(), 0..80)) {
			let session = session("a");
			let mut state = session.0.try_lock().unwrap();
			let mut store: HashMap<Uuid, Message> = HashMap::new();
			let mut queued: Vec<ChangeEvent> = Vec::new();
			let mut delivered_inserts: Vec<ChangeEvent> = Vec::new();
			let mut snapshots: Vec<Vec<Message>> = Vec::new();
			let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

			for (clock, step) in steps.into_iter().enumerate() {
				let at = base + Duration::seconds(clock as i64);
				match step {
					Step::Receive(peer) => {
						let row = row_at(PEERS[peer], "a", at);
						store.insert(row.id, row.clone());
						queued.push(ChangeEvent::Insert { new: row });
					}
					Step::Send(peer) => {
						let outgoing = state.push_outgoing(NewMessage {
							sender_id: "a".into(),
							recipient_id: PEERS[peer].into(),
							content: String::new(),
						});
						let stored = row_at("a", PEERS[peer], at);
						state.confirm_outgoing(outgoing.local_id, stored.clone());
						store.insert(stored.id, stored.clone());
						queued.push(ChangeEvent::Insert { new: stored });
					}
					Step::Deliver(pick) => {
						if !queued.is_empty() {
							let event = queued.remove(pick % queued.len());
							if matches!(event, ChangeEvent::Insert { .. }) {
								delivered_inserts.push(event.clone());
							}
							state.apply_event(event);
						}
					}
					Step::DuplicateInsert(pick) => {
						if !delivered_inserts.is_empty() {
							state.apply_event(delivered_inserts[pick % delivered_inserts.len()].clone());
						}
					}
					Step::MarkReadLocally(peer) => {
						state.mark_read_locally(PEERS[peer], at);
						queued.extend(ChangeEvent::read_transitions(read_thread(&mut store, PEERS[peer], at)));
					}
					Step::ReadElsewhere(peer) => {
						queued.extend(ChangeEvent::read_transitions(read_thread(&mut store, PEERS[peer], at)));
					}
					Step::Snapshot => snapshots.push(store.values().cloned().collect()),
					Step::Refetch(pick) => {
						if !snapshots.is_empty() {
							let ticket = state.ticket();
							state.merge_fetched(ticket, snapshots[pick % snapshots.len()].clone());
						}
					}
				}
				prop_assert!(state.is_consistent());
			}

			for event in queued.drain(..) {
				state.apply_event(event);
			}
			prop_assert!(state.is_consistent());
			prop_assert_eq!(state.unread(), &UnreadCounter::recount("a", store.values()));
		}
	}
}
