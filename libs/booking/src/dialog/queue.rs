//! Per-conversation ordered processing
//!
//! Each active conversation gets one worker task fed by a bounded channel,
//! so events of one chat are handled strictly in arrival order while other
//! chats proceed independently. A worker that stays idle for the configured
//! window exits and is respawned on the next event. A full channel makes the
//! sender wait, which pushes back on a chat flooding the bot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use super::{Dispatcher, Inbound, Outbound};

struct Job {
    inbound: Inbound,
    reply: oneshot::Sender<Outbound>,
}

/// Events a single conversation may have waiting before senders are held back
pub const QUEUE_CAPACITY: usize = 32;

type Workers = Arc<Mutex<HashMap<i64, mpsc::Sender<Job>>>>;

#[derive(Clone)]
pub struct ConversationQueue {
    dispatcher: Arc<Dispatcher>,
    workers: Workers,
    idle: Duration,
}

impl ConversationQueue {
    pub fn new(dispatcher: Arc<Dispatcher>, idle: Duration) -> Self {
        Self {
            dispatcher,
            workers: Arc::new(Mutex::new(HashMap::new())),
            idle,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Queue an event behind earlier events of the same conversation
    ///
    /// The order of `enqueue` calls is the processing order. The returned
    /// receiver resolves with the reply once the event has been handled.
    pub async fn enqueue(&self, inbound: Inbound) -> oneshot::Receiver<Outbound> {
        let (reply, receiver) = oneshot::channel();
        let conversation_id = inbound.conversation_id;
        let mut job = Job { inbound, reply };

        // Waiting on a full channel happens outside the map lock
        loop {
            let sender = {
                let mut workers = self.workers.lock().await;
                match workers.get(&conversation_id) {
                    Some(sender) if !sender.is_closed() => sender.clone(),
                    _ => {
                        let sender = self.spawn_worker(conversation_id);
                        workers.insert(conversation_id, sender.clone());
                        sender
                    }
                }
            };

            match sender.send(job).await {
                Ok(()) => return receiver,
                Err(mpsc::error::SendError(returned)) => {
                    warn!("Worker for conversation {} exited, respawning", conversation_id);
                    job = returned;
                    let mut workers = self.workers.lock().await;
                    if workers
                        .get(&conversation_id)
                        .is_some_and(|current| current.same_channel(&sender))
                    {
                        workers.remove(&conversation_id);
                    }
                }
            }
        }
    }

    /// Enqueue and wait for the reply
    pub async fn submit(&self, inbound: Inbound) -> Option<Outbound> {
        self.enqueue(inbound).await.await.ok()
    }

    pub async fn active_workers(&self) -> usize {
        self.workers.lock().await.len()
    }

    fn spawn_worker(&self, conversation_id: i64) -> mpsc::Sender<Job> {
        let (sender, mut receiver) = mpsc::channel::<Job>(QUEUE_CAPACITY);
        let dispatcher = self.dispatcher.clone();
        let workers = self.workers.clone();
        let idle = self.idle;

        tokio::spawn(async move {
            debug!("Conversation worker {} started", conversation_id);
            loop {
                match tokio::time::timeout(idle, receiver.recv()).await {
                    Ok(Some(job)) => {
                        let reply = dispatcher.handle(&job.inbound).await;
                        if job.reply.send(reply).is_err() {
                            debug!("Reply for conversation {} dropped", conversation_id);
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        // Holding the map lock, no new worker can start before removal
                        let mut workers = workers.lock().await;
                        if receiver.is_empty() {
                            receiver.close();
                            // A send already past the lock may land before close
                            while let Ok(job) = receiver.try_recv() {
                                let reply = dispatcher.handle(&job.inbound).await;
                                let _ = job.reply.send(reply);
                            }
                            workers.remove(&conversation_id);
                            break;
                        }
                    }
                }
            }
            debug!("Conversation worker {} stopped", conversation_id);
        });

        sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionPolicy;
    use crate::clock::FixedClock;
    use crate::dialog::{Command, Event, SenderProfile};
    use crate::intake::{InMemorySessionStore, IntakeStage, SessionStore};
    use crate::lifecycle::LifecycleManager;
    use crate::store::InMemoryRecordStore;
    use chrono::{TimeZone, Utc};

    async fn queue(idle: Duration) -> (ConversationQueue, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let user = store.seed_user(7, "member", false).await;
        let department = store.seed_department("Finance", 10).await;
        store.add_membership(user.id, department.id).await;

        let sessions = Arc::new(InMemorySessionStore::new(chrono::Duration::minutes(30)));
        let lifecycle = LifecycleManager::new(
            store,
            AdmissionPolicy::default(),
            Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap(),
            )),
        );
        let dispatcher = Arc::new(Dispatcher::new(lifecycle, sessions.clone(), false));
        (ConversationQueue::new(dispatcher, idle), sessions)
    }

    fn inbound(event: Event) -> Inbound {
        Inbound {
            conversation_id: 7,
            sender: SenderProfile {
                external_id: 7,
                username: None,
                first_name: "Member".to_string(),
                last_name: String::new(),
            },
            event,
        }
    }

    #[tokio::test]
    async fn test_events_of_one_conversation_keep_order() {
        let (queue, sessions) = queue(Duration::from_secs(5)).await;

        let receivers = vec![
            queue.enqueue(inbound(Event::Command(Command::Book))).await,
            queue.enqueue(inbound(Event::Text("Finance".to_string()))).await,
            queue.enqueue(inbound(Event::Text("Quarterly review".to_string()))).await,
        ];
        let mut replies = Vec::new();
        for receiver in receivers {
            replies.push(receiver.await.unwrap());
        }

        assert!(replies[0].text.contains("department"));
        assert!(replies[1].text.contains("title"));
        assert!(replies[2].text.contains("start time"));

        let session = sessions
            .load(7, Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.stage, IntakeStage::AwaitingStartTime);
        assert_eq!(session.title.as_deref(), Some("Quarterly review"));
    }

    #[tokio::test]
    async fn test_idle_worker_exits_and_respawns() {
        let (queue, _) = queue(Duration::from_millis(50)).await;

        assert!(queue.submit(inbound(Event::Command(Command::Help))).await.is_some());
        assert_eq!(queue.active_workers().await, 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(queue.active_workers().await, 0);

        assert!(queue.submit(inbound(Event::Command(Command::Help))).await.is_some());
    }

    #[tokio::test]
    async fn test_burst_beyond_capacity_is_delivered() {
        let (queue, _) = queue(Duration::from_secs(5)).await;

        let queue_clone = queue.clone();
        let producer = tokio::spawn(async move {
            let mut receivers = Vec::new();
            for _ in 0..QUEUE_CAPACITY * 3 {
                receivers.push(queue_clone.enqueue(inbound(Event::Command(Command::Help))).await);
            }
            receivers
        });

        let receivers = tokio::time::timeout(Duration::from_secs(5), producer)
            .await
            .expect("producer stalled on a full queue")
            .unwrap();
        assert_eq!(receivers.len(), QUEUE_CAPACITY * 3);
        for receiver in receivers {
            assert!(receiver.await.is_ok());
        }
        assert_eq!(queue.active_workers().await, 1);
    }
}
