// Scheduler core - binding table, dispatch loop, bounded pools

mod config;
mod pool;

pub use config::{SchedulerConfig, ShutdownMode};
pub use pool::WorkerPool;

use crate::application::engine::panic_message;
use crate::application::recovery::RecoveryService;
use crate::domain::{
    BindingState, DomainError, JobId, PoolKind, ScheduleBinding, Trigger, TriggerSpec, Workflow,
    WorkflowId,
};
use crate::error::{AppError, Result};
use crate::port::time_provider::millis_to_datetime;
use crate::port::{
    ExecutionListener, IdProvider, JobStore, SchedulerEvent, TimeProvider, WorkflowLauncher,
};
use crate::shutdown::{shutdown_channel, ShutdownSender};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Options of [`SchedulerCore::add_job`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddJobOptions {
    /// Overwrite a binding with the same id instead of failing
    pub replace_existing: bool,
    pub pool: PoolKind,
}

impl AddJobOptions {
    pub fn replacing() -> Self {
        Self {
            replace_existing: true,
            ..Self::default()
        }
    }

    pub fn on_pool(mut self, pool: PoolKind) -> Self {
        self.pool = pool;
        self
    }
}

/// Point-in-time view of one binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub id: JobId,
    pub workflow_id: WorkflowId,
    pub trigger: TriggerSpec,
    pub state: BindingState,
    pub pool: PoolKind,
    /// Epoch ms
    pub next_fire_time: Option<i64>,
    /// Runs currently in flight
    pub running: usize,
}

/// Snapshot of the binding table, ordered by id; iterable any number of times
#[derive(Debug, Clone, Default)]
pub struct JobListing {
    jobs: Vec<JobSummary>,
}

impl JobListing {
    pub fn iter(&self) -> std::slice::Iter<'_, JobSummary> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&JobSummary> {
        self.jobs.iter().find(|j| j.id == id)
    }
}

impl<'a> IntoIterator for &'a JobListing {
    type Item = &'a JobSummary;
    type IntoIter = std::slice::Iter<'a, JobSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.iter()
    }
}

struct BindingEntry {
    binding: ScheduleBinding,
    workflow: Arc<Workflow>,
    trigger: Arc<dyn Trigger>,
    in_flight: usize,
    /// The current fire is waiting for a pool slot; exempt from misfire
    deferred: bool,
}

impl BindingEntry {
    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.binding.id.clone(),
            workflow_id: self.binding.workflow_id.clone(),
            trigger: self.binding.trigger_spec.clone(),
            state: self.binding.state,
            pool: self.binding.pool,
            next_fire_time: self.binding.next_fire_time,
            running: self.in_flight,
        }
    }

    /// Move to the next fire strictly after `now`, completing an exhausted trigger
    fn advance(&mut self, now: i64) {
        self.deferred = false;
        match self.trigger.next_fire_after(millis_to_datetime(now)) {
            Some(next) => self.binding.next_fire_time = Some(next.timestamp_millis()),
            None => self.binding.complete(),
        }
    }

    fn is_retirable(&self) -> bool {
        self.binding.is_completed() && self.in_flight == 0
    }
}

/// A run that holds a pool slot and is ready to be spawned
struct Dispatch {
    job_id: JobId,
    workflow: Arc<Workflow>,
    run_id: String,
    launcher: Arc<dyn WorkflowLauncher>,
    permit: OwnedSemaphorePermit,
}

struct Inner {
    config: SchedulerConfig,
    store: Arc<dyn JobStore>,
    listener: Arc<dyn ExecutionListener>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    thread_pool: WorkerPool,
    process_pool: WorkerPool,

    /// Binding table; held only while reading or writing it
    bindings: AsyncMutex<HashMap<JobId, BindingEntry>>,
    runs: Mutex<JoinSet<()>>,
    /// Asks in-flight runs to stop after their current task
    run_cancel: Mutex<ShutdownSender>,
    dispatch_loop: Mutex<Option<(ShutdownSender, JoinHandle<()>)>>,
}

/// Owns the schedule: decides when each workflow runs and hands runs to pools
///
/// Cheap to clone; clones share one binding table.
#[derive(Clone)]
pub struct SchedulerCore {
    inner: Arc<Inner>,
}

impl SchedulerCore {
    /// Create a scheduler with injected collaborators
    ///
    /// # Errors
    /// - AppError::Config if the configuration is invalid
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn JobStore>,
        thread_launcher: Arc<dyn WorkflowLauncher>,
        process_launcher: Arc<dyn WorkflowLauncher>,
        listener: Arc<dyn ExecutionListener>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let (run_cancel, _) = shutdown_channel();

        Ok(Self {
            inner: Arc::new(Inner {
                thread_pool: WorkerPool::new(PoolKind::Thread, config.max_threads, thread_launcher),
                process_pool: WorkerPool::new(
                    PoolKind::Process,
                    config.max_processes,
                    process_launcher,
                ),
                config,
                store,
                listener,
                time_provider,
                id_provider,
                bindings: AsyncMutex::new(HashMap::new()),
                runs: Mutex::new(JoinSet::new()),
                run_cancel: Mutex::new(run_cancel),
                dispatch_loop: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn pool(&self, kind: PoolKind) -> &WorkerPool {
        match kind {
            PoolKind::Thread => &self.inner.thread_pool,
            PoolKind::Process => &self.inner.process_pool,
        }
    }

    // ------------------------------------------------------------------
    // Binding table operations
    // ------------------------------------------------------------------

    /// Bind `workflow` to a trigger under `id` and persist both
    ///
    /// Any other binding of the same workflow is replaced.
    ///
    /// # Errors
    /// - AppError::Domain(InvalidScheduleSpec) for malformed or past triggers
    /// - AppError::DuplicateJobId if `id` is bound and `replace_existing` is off
    pub async fn add_job(
        &self,
        workflow: Workflow,
        trigger_spec: TriggerSpec,
        id: impl Into<String>,
        options: AddJobOptions,
    ) -> Result<ScheduleBinding> {
        let id = id.into();
        workflow.validate()?;

        let now = self.inner.time_provider.now_millis();
        let trigger = trigger_spec.build(millis_to_datetime(now), self.inner.config.timezone)?;
        let next_fire = trigger
            .next_fire_after(millis_to_datetime(now))
            .map(|t| t.timestamp_millis())
            .ok_or_else(|| {
                DomainError::InvalidScheduleSpec(format!(
                    "{} never fires after now (date already in the past?)",
                    trigger_spec
                ))
            })?;

        let binding = ScheduleBinding::new(
            id.clone(),
            workflow.id.clone(),
            trigger_spec,
            options.pool,
            now,
            Some(next_fire),
        );

        let mut table = self.inner.bindings.lock().await;
        if table.contains_key(&id) && !options.replace_existing {
            return Err(AppError::DuplicateJobId(id));
        }
        // Rebinding an id to another workflow orphans the old definition
        let displaced_workflow = table
            .get(&id)
            .map(|e| e.binding.workflow_id.clone())
            .filter(|workflow_id| *workflow_id != workflow.id);
        let superseded: Vec<JobId> = table
            .values()
            .filter(|e| e.binding.workflow_id == workflow.id && e.binding.id != id)
            .map(|e| e.binding.id.clone())
            .collect();

        for old_id in &superseded {
            self.inner.store.delete(old_id).await?;
        }
        self.inner.store.put_workflow(&workflow).await?;
        self.inner.store.put(&binding).await?;
        if let Some(old_workflow_id) = &displaced_workflow {
            self.inner.store.delete_workflow(old_workflow_id).await?;
            info!(job_id = %id, workflow_id = %old_workflow_id, "Displaced workflow deleted");
        }

        for old_id in &superseded {
            info!(job_id = %old_id, workflow_id = %workflow.id, "Prior binding replaced");
            table.remove(old_id);
        }
        let in_flight = table.get(&id).map(|e| e.in_flight).unwrap_or(0);
        table.insert(
            id.clone(),
            BindingEntry {
                binding: binding.clone(),
                workflow: Arc::new(workflow),
                trigger,
                in_flight,
                deferred: false,
            },
        );
        drop(table);

        info!(
            job_id = %id,
            workflow_id = %binding.workflow_id,
            trigger = %binding.trigger_spec,
            pool = %binding.pool,
            next_fire_time = %next_fire,
            "Job added"
        );
        Ok(binding)
    }

    /// Stop dispatching a binding until it is resumed
    pub async fn pause_job(&self, id: &str) -> Result<()> {
        let mut table = self.inner.bindings.lock().await;
        let entry = table
            .get_mut(id)
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;

        let mut updated = entry.binding.clone();
        updated
            .pause()
            .map_err(|_| invalid_job_state(&entry.binding, "paused"))?;
        self.inner
            .store
            .update_state(id, updated.state, updated.next_fire_time)
            .await?;
        entry.binding = updated;

        info!(job_id = %id, "Job paused");
        Ok(())
    }

    /// Re-activate a paused binding; its next fire is computed from now
    pub async fn resume_job(&self, id: &str) -> Result<()> {
        let now = self.inner.time_provider.now_millis();
        let mut table = self.inner.bindings.lock().await;
        let entry = table
            .get_mut(id)
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;

        let next = entry
            .trigger
            .next_fire_after(millis_to_datetime(now))
            .map(|t| t.timestamp_millis());
        let mut updated = entry.binding.clone();
        updated
            .resume(next)
            .map_err(|_| invalid_job_state(&entry.binding, "resumed"))?;
        if next.is_none() {
            // A one-shot whose time passed while paused
            updated.complete();
        }
        self.inner
            .store
            .update_state(id, updated.state, updated.next_fire_time)
            .await?;
        entry.binding = updated;
        entry.deferred = false;
        drop(table);

        info!(job_id = %id, next_fire_time = ?next, "Job resumed");
        if next.is_none() {
            self.retire_if_idle(id).await;
        }
        Ok(())
    }

    /// Delete a binding and its stored workflow
    ///
    /// Runs already in flight are not interrupted.
    pub async fn remove_job(&self, id: &str) -> Result<()> {
        let mut table = self.inner.bindings.lock().await;
        let workflow_id = table
            .get(id)
            .map(|e| e.binding.workflow_id.clone())
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;

        self.inner.store.delete(id).await?;
        self.inner.store.delete_workflow(&workflow_id).await?;
        table.remove(id);

        info!(job_id = %id, workflow_id = %workflow_id, "Job removed");
        Ok(())
    }

    /// Snapshot of every binding, ordered by id
    pub async fn list_jobs(&self) -> JobListing {
        let table = self.inner.bindings.lock().await;
        let mut jobs: Vec<JobSummary> = table.values().map(BindingEntry::summary).collect();
        drop(table);
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        JobListing { jobs }
    }

    pub async fn get_job(&self, id: &str) -> Option<JobSummary> {
        self.inner
            .bindings
            .lock()
            .await
            .get(id)
            .map(BindingEntry::summary)
    }

    /// Load persisted bindings into the table (bindings already present win)
    ///
    /// Returns the number of bindings restored.
    pub async fn restore(&self) -> Result<usize> {
        let recovered = RecoveryService::new(Arc::clone(&self.inner.store))
            .recover()
            .await?;
        let now = self.inner.time_provider.now_millis();

        let mut restored = 0;
        let mut table = self.inner.bindings.lock().await;
        for job in recovered {
            let mut binding = job.binding;
            if table.contains_key(&binding.id) {
                continue;
            }
            let trigger = match binding
                .trigger_spec
                .build(millis_to_datetime(binding.anchor_at), self.inner.config.timezone)
            {
                Ok(trigger) => trigger,
                Err(e) => {
                    error!(job_id = %binding.id, error = %e, "Stored trigger is invalid, binding skipped");
                    continue;
                }
            };
            if binding.is_active() && binding.next_fire_time.is_none() {
                binding.next_fire_time = trigger
                    .next_fire_after(millis_to_datetime(now))
                    .map(|t| t.timestamp_millis());
            }

            debug!(job_id = %binding.id, next_fire_time = ?binding.next_fire_time, "Binding restored");
            table.insert(
                binding.id.clone(),
                BindingEntry {
                    binding,
                    workflow: Arc::new(job.workflow),
                    trigger,
                    in_flight: 0,
                    deferred: false,
                },
            );
            restored += 1;
        }
        drop(table);

        info!(restored = %restored, "Bindings restored from store");
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Start the dispatch loop (no-op when already running)
    pub fn start(&self) {
        let mut slot = self
            .inner
            .dispatch_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("Dispatch loop already running");
            return;
        }

        let (stop_tx, mut stop) = shutdown_channel();
        let core = self.clone();
        let tick_interval = self.inner.config.tick_interval;

        let handle = tokio::spawn(async move {
            info!(tick_ms = %tick_interval.as_millis(), "Dispatch loop started");
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.wait() => break,
                    _ = ticker.tick() => {
                        core.tick().await;
                    }
                }
            }
            info!("Dispatch loop stopped");
        });
        *slot = Some((stop_tx, handle));
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .dispatch_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// One pass over the binding table: dispatch every due active binding
    ///
    /// Never fails; problems are logged and reported as events. Returns the
    /// number of runs dispatched.
    pub async fn tick(&self) -> usize {
        let now = self.inner.time_provider.now_millis();
        let grace = self.inner.config.misfire_grace_millis();
        let max_instances = self.inner.config.max_instances;

        let mut events = Vec::new();
        let mut updates = Vec::new();
        let mut dispatches = Vec::new();
        let mut retirable = Vec::new();

        {
            let mut table = self.inner.bindings.lock().await;
            for entry in table.values_mut() {
                if !entry.binding.is_due(now) {
                    continue;
                }
                let id = entry.binding.id.clone();
                let due_at = entry.binding.next_fire_time.unwrap_or(now);

                if now - due_at > grace && !entry.deferred {
                    events.push(SchedulerEvent::JobMissed {
                        id: id.clone(),
                        scheduled_for: due_at,
                    });
                    entry.advance(now);
                } else if entry.in_flight >= max_instances {
                    events.push(SchedulerEvent::JobSkippedMaxInstances {
                        id: id.clone(),
                        running: entry.in_flight,
                    });
                    entry.advance(now);
                } else {
                    let pool = self.pool(entry.binding.pool);
                    let Some(permit) = pool.try_reserve() else {
                        // Deferred: next_fire_time stays put so the next tick retries
                        entry.deferred = true;
                        events.push(SchedulerEvent::JobSkippedBackpressure {
                            id,
                            pool: pool.kind(),
                        });
                        continue;
                    };

                    let run_id = self.inner.id_provider.generate_id();
                    entry.in_flight += 1;
                    entry.advance(now);
                    events.push(SchedulerEvent::JobDispatched {
                        id: id.clone(),
                        workflow_id: entry.binding.workflow_id.clone(),
                        run_id: run_id.clone(),
                        pool: pool.kind(),
                    });
                    dispatches.push(Dispatch {
                        job_id: id.clone(),
                        workflow: Arc::clone(&entry.workflow),
                        run_id,
                        launcher: pool.launcher(),
                        permit,
                    });
                }

                updates.push((id.clone(), entry.binding.state, entry.binding.next_fire_time));
                if entry.is_retirable() {
                    retirable.push(id);
                }
            }

            // Written before the lock drops: a pause or resume queued behind
            // this tick must land after these writes, not before
            for (id, state, next_fire_time) in updates {
                if let Err(e) = self
                    .inner
                    .store
                    .update_state(&id, state, next_fire_time)
                    .await
                {
                    warn!(job_id = %id, error = %e, "Failed to persist binding state");
                }
            }
        }

        for event in &events {
            self.inner.listener.on_event(event);
        }

        let dispatched = dispatches.len();
        for dispatch in dispatches {
            self.spawn_run(dispatch);
        }
        for id in retirable {
            self.retire_if_idle(&id).await;
        }
        dispatched
    }

    fn spawn_run(&self, dispatch: Dispatch) {
        let cancel = self
            .inner
            .run_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe();
        let core = self.clone();

        let mut runs = self.inner.runs.lock().unwrap_or_else(PoisonError::into_inner);
        while runs.try_join_next().is_some() {}

        runs.spawn(async move {
            let Dispatch {
                job_id,
                workflow,
                run_id,
                launcher,
                permit,
            } = dispatch;

            // Isolated so a panicking launcher still releases the slot and is reported
            let launch =
                tokio::spawn(async move { launcher.launch(workflow, run_id, cancel).await });

            let event = match launch.await {
                Ok(Ok(result)) => SchedulerEvent::WorkflowCompleted {
                    id: job_id.clone(),
                    result,
                },
                Ok(Err(e)) => SchedulerEvent::WorkflowError {
                    id: job_id.clone(),
                    error: e.to_string(),
                },
                Err(join_err) => {
                    let error = if join_err.is_panic() {
                        format!("run panicked: {}", panic_message(join_err.into_panic()))
                    } else {
                        "run was cancelled".to_string()
                    };
                    SchedulerEvent::WorkflowError {
                        id: job_id.clone(),
                        error,
                    }
                }
            };
            drop(permit);
            core.finish_run(&job_id, event).await;
        });
    }

    async fn finish_run(&self, id: &str, event: SchedulerEvent) {
        self.inner.listener.on_event(&event);

        let retire = {
            let mut table = self.inner.bindings.lock().await;
            match table.get_mut(id) {
                Some(entry) => {
                    entry.in_flight = entry.in_flight.saturating_sub(1);
                    entry.is_retirable()
                }
                None => false,
            }
        };
        if retire {
            self.retire_if_idle(id).await;
        }
    }

    /// Drop a completed binding once no run of it is in flight
    async fn retire_if_idle(&self, id: &str) {
        let removed = {
            let mut table = self.inner.bindings.lock().await;
            if table.get(id).is_some_and(BindingEntry::is_retirable) {
                table.remove(id)
            } else {
                None
            }
        };
        let Some(entry) = removed else {
            return;
        };

        if let Err(e) = self.inner.store.delete(id).await {
            warn!(job_id = %id, error = %e, "Failed to delete retired binding");
        }
        if let Err(e) = self
            .inner
            .store
            .delete_workflow(&entry.binding.workflow_id)
            .await
        {
            warn!(job_id = %id, error = %e, "Failed to delete retired workflow");
        }
        self.inner
            .listener
            .on_event(&SchedulerEvent::JobRetired { id: id.to_string() });
    }

    /// Wait until every run dispatched so far has finished
    pub async fn drain_runs(&self) {
        loop {
            let mut runs = std::mem::take(
                &mut *self.inner.runs.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if runs.is_empty() {
                return;
            }
            while let Some(joined) = runs.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Run supervisor failed");
                }
            }
        }
    }

    /// Stop dispatching and deal with in-flight runs according to `mode`
    pub async fn shutdown(&self, mode: ShutdownMode) {
        let dispatch_loop = self
            .inner
            .dispatch_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((stop, handle)) = dispatch_loop {
            stop.shutdown();
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch loop ended abnormally");
            }
        }

        match mode {
            ShutdownMode::Abandon => {
                let mut runs = self.inner.runs.lock().unwrap_or_else(PoisonError::into_inner);
                let abandoned = runs.len();
                runs.detach_all();
                info!(abandoned = %abandoned, "Scheduler shut down, in-flight runs abandoned");
            }
            ShutdownMode::Wait => {
                let (fresh, _) = shutdown_channel();
                let previous = std::mem::replace(
                    &mut *self
                        .inner
                        .run_cancel
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner),
                    fresh,
                );
                previous.shutdown();
                info!("Waiting for in-flight runs to stop after their current task");
                self.drain_runs().await;
                info!("Scheduler shut down");
            }
        }
    }
}

fn invalid_job_state(binding: &ScheduleBinding, action: &'static str) -> AppError {
    AppError::InvalidJobState {
        id: binding.id.clone(),
        state: binding.state.to_string(),
        action,
    }
}
