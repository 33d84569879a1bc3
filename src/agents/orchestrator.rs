//! Agent task orchestrator
//!
//! Tasks are queued by priority (FIFO within a priority), drained by a
//! background worker, and each run races a timeout. Finished tasks are kept
//! in a bounded history for lookup.

use crate::config::OrchestratorConfig;
use crate::error::{ModexoError, Result};
use crate::services::Metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lower value runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    pub id: Uuid,
    pub agent_id: String,
    pub input: Value,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl AgentTask {
    pub fn new(agent_id: &str, input: Value, priority: TaskPriority) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            input,
            priority,
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }
}

/// Runs one task to completion
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &AgentTask) -> Result<Value>;
}

// ==================== Priority Queue ====================

#[derive(Debug)]
struct QueuedTask {
    id: Uuid,
    priority: TaskPriority,
    // FIFO within a priority
    sequence: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.priority.cmp(&self.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ord => ord,
        }
    }
}

/// Bounded priority queue of task ids
pub struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
    sequence_counter: u64,
    max_size: usize,
    enqueued_count: u64,
    dequeued_count: u64,
    evicted_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub current_size: usize,
    pub max_size: usize,
    pub enqueued_total: u64,
    pub dequeued_total: u64,
    pub evicted_total: u64,
    pub critical_count: usize,
    pub high_count: usize,
    pub normal_count: usize,
    pub low_count: usize,
}

impl TaskQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence_counter: 0,
            max_size: max_size.max(1),
            enqueued_count: 0,
            dequeued_count: 0,
            evicted_count: 0,
        }
    }

    /// Enqueue a task id. When full, a strictly more urgent task evicts the
    /// least urgent (newest among equals); the evicted id is returned.
    pub fn enqueue(
        &mut self,
        id: Uuid,
        priority: TaskPriority,
    ) -> std::result::Result<Option<Uuid>, String> {
        let mut evicted = None;
        if self.heap.len() >= self.max_size {
            let mut items = std::mem::take(&mut self.heap).into_vec();
            // Least urgent sorts lowest in the heap order
            let lowest = items
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.cmp(b))
                .map(|(i, item)| (i, item.priority));

            match lowest {
                Some((index, lowest_priority)) if priority < lowest_priority => {
                    let dropped = items.swap_remove(index);
                    warn!(
                        "Task queue full, evicted {:?} task {} for {:?}",
                        dropped.priority, dropped.id, priority
                    );
                    self.evicted_count += 1;
                    evicted = Some(dropped.id);
                    self.heap = BinaryHeap::from(items);
                }
                _ => {
                    self.heap = BinaryHeap::from(items);
                    return Err("task queue is full and the task is not more urgent".to_string());
                }
            }
        }

        let sequence = self.sequence_counter;
        self.sequence_counter += 1;
        self.heap.push(QueuedTask {
            id,
            priority,
            sequence,
        });
        self.enqueued_count += 1;
        Ok(evicted)
    }

    pub fn dequeue(&mut self) -> Option<Uuid> {
        let item = self.heap.pop()?;
        self.dequeued_count += 1;
        Some(item.id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        let mut priority_counts = [0usize; 4];
        for item in self.heap.iter() {
            priority_counts[item.priority as usize] += 1;
        }

        QueueStats {
            current_size: self.heap.len(),
            max_size: self.max_size,
            enqueued_total: self.enqueued_count,
            dequeued_total: self.dequeued_count,
            evicted_total: self.evicted_count,
            critical_count: priority_counts[0],
            high_count: priority_counts[1],
            normal_count: priority_counts[2],
            low_count: priority_counts[3],
        }
    }
}

// ==================== Orchestrator ====================

pub struct Orchestrator {
    config: OrchestratorConfig,
    executor: Arc<dyn TaskExecutor>,
    queue: Mutex<TaskQueue>,
    tasks: RwLock<HashMap<Uuid, AgentTask>>,
    finished: Mutex<VecDeque<Uuid>>,
    notify: Notify,
    metrics: Option<Arc<Metrics>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        let queue = TaskQueue::new(config.max_queue);
        Self {
            config,
            executor,
            queue: Mutex::new(queue),
            tasks: RwLock::new(HashMap::new()),
            finished: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Queue a task for the worker
    pub async fn submit(
        &self,
        agent_id: &str,
        input: Value,
        priority: TaskPriority,
    ) -> Result<AgentTask> {
        let task = AgentTask::new(agent_id, input, priority);
        // Registered before it is visible to the worker
        self.tasks.write().await.insert(task.id, task.clone());

        let enqueued = self.queue.lock().await.enqueue(task.id, priority);
        let evicted = match enqueued {
            Ok(evicted) => evicted,
            Err(reason) => {
                self.tasks.write().await.remove(&task.id);
                return Err(ModexoError::QueueFull(reason));
            }
        };

        if let Some(id) = evicted {
            self.finish(id, Err("evicted from a full queue".to_string()), TaskStatus::Failed)
                .await;
        }

        debug!("Queued task {} for {} ({:?})", task.id, agent_id, priority);
        self.notify.notify_one();
        Ok(task)
    }

    pub async fn get(&self, id: Uuid) -> Option<AgentTask> {
        self.tasks.read().await.get(&id).cloned()
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.lock().await.stats()
    }

    /// Run the most urgent queued task; `None` when the queue is empty
    pub async fn run_next(&self) -> Option<AgentTask> {
        let id = self.queue.lock().await.dequeue()?;

        let task = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id)?;
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            task.clone()
        };

        let timeout = Duration::from_secs(self.config.task_timeout_secs);
        let (outcome, status) =
            match tokio::time::timeout(timeout, self.executor.execute(&task)).await {
                Ok(Ok(value)) => (Ok(value), TaskStatus::Completed),
                Ok(Err(e)) => (Err(e.to_string()), TaskStatus::Failed),
                Err(_) => (
                    Err(ModexoError::TaskTimeout(self.config.task_timeout_secs).to_string()),
                    TaskStatus::TimedOut,
                ),
            };

        match status {
            TaskStatus::Completed => info!("Task {} ({}) completed", id, task.agent_id),
            _ => warn!("Task {} ({}) ended as {:?}", id, task.agent_id, status),
        }
        self.finish(id, outcome, status).await
    }

    async fn finish(
        &self,
        id: Uuid,
        outcome: std::result::Result<Value, String>,
        status: TaskStatus,
    ) -> Option<AgentTask> {
        let finished = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id)?;
            task.status = status;
            task.finished_at = Some(Utc::now());
            match outcome {
                Ok(value) => task.result = Some(value),
                Err(error) => task.error = Some(error),
            }
            task.clone()
        };
        if let Some(metrics) = &self.metrics {
            metrics.inc_tasks_finished();
        }

        let expired: Vec<Uuid> = {
            let mut history = self.finished.lock().await;
            history.push_back(id);
            let excess = history.len().saturating_sub(self.config.history_size.max(1));
            history.drain(..excess).collect()
        };
        if !expired.is_empty() {
            let mut tasks = self.tasks.write().await;
            for old in expired {
                tasks.remove(&old);
            }
        }

        Some(finished)
    }

    /// Drain the queue until shutdown is signalled
    pub async fn run_worker(&self, mut shutdown: watch::Receiver<bool>) {
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(10));
        info!("Orchestrator worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.run_next().await.is_some() {
                continue;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(poll) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("Orchestrator worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoExecutor;

    #[async_trait]
    impl TaskExecutor for EchoExecutor {
        async fn execute(&self, task: &AgentTask) -> Result<Value> {
            match task.agent_id.as_str() {
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Value::Null)
                }
                "broken" => Err(ModexoError::Internal("boom".to_string())),
                _ => Ok(json!({ "echo": task.input })),
            }
        }
    }

    fn orchestrator(config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(config, Arc::new(EchoExecutor))
    }

    #[test]
    fn test_queue_priority_and_fifo() {
        let mut queue = TaskQueue::new(10);
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        queue.enqueue(ids[0], TaskPriority::Low).unwrap();
        queue.enqueue(ids[1], TaskPriority::Normal).unwrap();
        queue.enqueue(ids[2], TaskPriority::Critical).unwrap();
        queue.enqueue(ids[3], TaskPriority::Normal).unwrap();

        assert_eq!(queue.dequeue(), Some(ids[2]));
        assert_eq!(queue.dequeue(), Some(ids[1]));
        assert_eq!(queue.dequeue(), Some(ids[3]));
        assert_eq!(queue.dequeue(), Some(ids[0]));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_full_queue_evicts_least_urgent() {
        let mut queue = TaskQueue::new(2);
        let normal = Uuid::new_v4();
        let low = Uuid::new_v4();
        queue.enqueue(normal, TaskPriority::Normal).unwrap();
        queue.enqueue(low, TaskPriority::Low).unwrap();

        assert!(queue.enqueue(Uuid::new_v4(), TaskPriority::Low).is_err());

        let high = Uuid::new_v4();
        assert_eq!(queue.enqueue(high, TaskPriority::High).unwrap(), Some(low));
        assert_eq!(queue.stats().evicted_total, 1);
        assert_eq!(queue.dequeue(), Some(high));
        assert_eq!(queue.dequeue(), Some(normal));
    }

    #[tokio::test]
    async fn test_run_next_completes_task() {
        let orch = orchestrator(OrchestratorConfig::default());
        let task = orch
            .submit("token-safety", json!({ "address": "x" }), TaskPriority::Normal)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Queued);

        let done = orch.run_next().await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.unwrap()["echo"]["address"], "x");
        assert!(orch.run_next().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let orch = orchestrator(OrchestratorConfig::default());
        let task = orch
            .submit("broken", Value::Null, TaskPriority::High)
            .await
            .unwrap();
        orch.run_next().await;

        let stored = orch.get(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.error.unwrap().contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_timeout() {
        let orch = orchestrator(OrchestratorConfig {
            task_timeout_secs: 1,
            ..OrchestratorConfig::default()
        });
        orch.submit("slow", Value::Null, TaskPriority::Normal)
            .await
            .unwrap();

        let done = orch.run_next().await.unwrap();
        assert_eq!(done.status, TaskStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let orch = orchestrator(OrchestratorConfig {
            history_size: 2,
            ..OrchestratorConfig::default()
        });
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                orch.submit("echo", Value::Null, TaskPriority::Normal)
                    .await
                    .unwrap()
                    .id,
            );
            orch.run_next().await;
        }

        assert!(orch.get(ids[0]).await.is_none());
        assert!(orch.get(ids[2]).await.is_some());
    }

    #[tokio::test]
    async fn test_evicted_task_is_failed() {
        let orch = orchestrator(OrchestratorConfig {
            max_queue: 1,
            ..OrchestratorConfig::default()
        });
        let low = orch.submit("echo", Value::Null, TaskPriority::Low).await.unwrap();
        orch.submit("echo", Value::Null, TaskPriority::Critical)
            .await
            .unwrap();

        let evicted = orch.get(low.id).await.unwrap();
        assert_eq!(evicted.status, TaskStatus::Failed);

        assert!(matches!(
            orch.submit("echo", Value::Null, TaskPriority::Low).await,
            Err(ModexoError::QueueFull(_))
        ));
        // The refused submission leaves no record behind
        assert_eq!(orch.tasks.read().await.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tasks_submitted_while_worker_runs_all_finish() {
        let orch = Arc::new(orchestrator(OrchestratorConfig {
            poll_interval_ms: 10,
            ..OrchestratorConfig::default()
        }));
        let (tx, rx) = watch::channel(false);
        let worker = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run_worker(rx).await })
        };

        let submitters: Vec<_> = (0..50)
            .map(|i| {
                let orch = orch.clone();
                tokio::spawn(async move {
                    orch.submit("echo", json!(i), TaskPriority::Normal)
                        .await
                        .unwrap()
                        .id
                })
            })
            .collect();
        let mut ids = Vec::new();
        for handle in submitters {
            ids.push(handle.await.unwrap());
        }

        for _ in 0..200 {
            let mut done = 0;
            for id in &ids {
                if orch.get(*id).await.is_some_and(|t| t.status.is_finished()) {
                    done += 1;
                }
            }
            if done == ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for id in &ids {
            assert_eq!(orch.get(*id).await.unwrap().status, TaskStatus::Completed);
        }
        assert_eq!(orch.queue_stats().await.current_size, 0);

        tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_drains_and_stops() {
        let orch = Arc::new(orchestrator(OrchestratorConfig::default()));
        let (tx, rx) = watch::channel(false);
        let worker = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run_worker(rx).await })
        };

        let task = orch
            .submit("echo", json!(1), TaskPriority::Normal)
            .await
            .unwrap();
        for _ in 0..50 {
            if orch.get(task.id).await.unwrap().status.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(orch.get(task.id).await.unwrap().status, TaskStatus::Completed);

        tx.send(true).unwrap();
        worker.await.unwrap();
    }
}
