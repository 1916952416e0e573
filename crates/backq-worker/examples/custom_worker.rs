use async_trait::async_trait;
use backq_core::{Job, MemoryAdapter, MemoryQueue, Outcome, WorkerConfig};
use backq_worker::{JobHandler, Worker, WorkerHooks};
use serde::Deserialize;
use std::time::Duration;

/// Custom handler for sending notifications
struct NotificationHandler {
    sent: usize,
}

#[async_trait]
impl JobHandler for NotificationHandler {
    async fn handle(&mut self, job: &Job) -> Outcome {
        #[derive(Deserialize)]
        struct Notification {
            user_id: String,
            message: String,
            channel: String,
        }

        let notif: Notification = match serde_json::from_slice(&job.payload) {
            Ok(notif) => notif,
            Err(e) => {
                println!("Invalid notification {}: {}", job.handle, e);
                return Outcome::Failure;
            }
        };

        println!(
            "Sending {} notification to user {}: {}",
            notif.channel, notif.user_id, notif.message
        );

        // Simulate notification sending
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.sent += 1;

        Outcome::Success
    }

    async fn checkpoint(&mut self) {
        println!("Checkpoint ({} sent so far)", self.sent);
    }
}

/// Keeps going past the restart threshold while the queue still has work
struct DrainQueue {
    queue: MemoryQueue,
    name: String,
}

impl WorkerHooks for DrainQueue {
    fn on_restart_threshold(&mut self, processed: u64) -> bool {
        let remaining = self.queue.len(&self.name);
        println!("Restart threshold reached after {} jobs, {} remaining", processed, remaining);
        remaining == 0
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = WorkerConfig {
        work_timeout_secs: 1,
        idle_timeout_secs: 3,
        restart_threshold: 2,
        ..WorkerConfig::new("notifications")
    };

    let queue = MemoryQueue::new();
    for (user, channel) in [("alice", "email"), ("bob", "sms"), ("carol", "push")] {
        let payload = serde_json::json!({
            "user_id": user,
            "message": "Your order has shipped",
            "channel": channel,
        });
        queue.push(&config.queue_name, serde_json::to_vec(&payload)?);
    }
    queue.push(&config.queue_name, b"not json".to_vec());

    let hooks = DrainQueue {
        queue: queue.clone(),
        name: config.queue_name.clone(),
    };
    let mut worker = Worker::new(MemoryAdapter::new(queue.clone()), config).with_hooks(hooks);
    worker.toggle_debug(true);

    let mut handler = NotificationHandler { sent: 0 };
    let processed = worker.run(&mut handler).await?;

    println!(
        "Processed {} jobs ({} sent, {} failed)",
        processed,
        handler.sent,
        queue.failed().len()
    );

    Ok(())
}
