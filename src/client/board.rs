//! Client-side task list. One board per signed-in user.
//!
//! `fetch` replaces the list wholesale. `add` re-fetches afterwards because
//! ids and timestamps only exist once the server has the task. `edit`,
//! `remove` and `change_status` patch the local list in place instead.

use super::{ClientError, ClientResult, TaskGateway};
use crate::models::{NewTask, Task, TaskDraft, TaskPatch, TaskStatus};
use crate::view::{self, TaskFilters, TaskStats};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Where the board is in its fetch cycle: `Idle` until the first fetch,
/// `Loading` while one is in flight, then `Loaded` or `Failed`. The last
/// two are idle states that also remember how the previous fetch ended;
/// the next fetch starts from either of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BoardPhase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

impl BoardPhase {
    /// True in every phase except `Loading`.
    pub fn is_idle(&self) -> bool {
        !matches!(self, BoardPhase::Loading)
    }
}

#[derive(Debug, Default)]
struct BoardState {
    tasks: Vec<Task>,
    filters: TaskFilters,
    phase: BoardPhase,
    error: Option<String>,
}

pub struct TaskBoard<G> {
    gateway: G,
    state: Mutex<BoardState>,
    loading: AtomicBool,
}

/// Clears the loading flag when the operation ends, however it ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<G: TaskGateway> TaskBoard<G> {
    pub fn new(gateway: G) -> Self {
        TaskBoard {
            gateway,
            state: Mutex::new(BoardState::default()),
            loading: AtomicBool::new(false),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    fn begin(&self) -> ClientResult<LoadingGuard<'_>> {
        self.loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| LoadingGuard(&self.loading))
            .map_err(|_| ClientError::Busy)
    }

    // ── Reads ──────────────────────────────────────────────────

    pub async fn phase(&self) -> BoardPhase {
        self.state.lock().await.phase.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.state.lock().await.error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.lock().await.error = None;
    }

    pub async fn filters(&self) -> TaskFilters {
        self.state.lock().await.filters
    }

    /// The held list, in the order the last fetch returned it.
    pub async fn tasks(&self) -> Vec<Task> {
        self.state.lock().await.tasks.clone()
    }

    /// The held list with the remembered filters applied.
    pub async fn visible(&self) -> Vec<Task> {
        let state = self.state.lock().await;
        view::apply(state.tasks.clone(), &state.filters)
    }

    pub async fn stats(&self, today: NaiveDate) -> TaskStats {
        TaskStats::from_tasks(&self.state.lock().await.tasks, today)
    }

    // ── Fetch ──────────────────────────────────────────────────

    pub async fn fetch(&self, filters: TaskFilters) -> ClientResult<usize> {
        let _guard = self.begin()?;
        self.load(filters).await
    }

    async fn load(&self, filters: TaskFilters) -> ClientResult<usize> {
        {
            let mut state = self.state.lock().await;
            state.filters = filters;
            state.phase = BoardPhase::Loading;
            state.error = None;
        }

        let result = self.gateway.list(&filters).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(tasks) => {
                let count = tasks.len();
                state.tasks = tasks;
                state.phase = BoardPhase::Loaded;
                Ok(count)
            }
            Err(error) => {
                state.tasks.clear();
                state.phase = BoardPhase::Failed(error.to_string());
                state.error = Some(error.to_string());
                Err(error)
            }
        }
    }

    // ── Mutations ──────────────────────────────────────────────

    /// Create, then re-fetch with the remembered filters.
    pub async fn add(&self, draft: TaskDraft) -> ClientResult<Task> {
        NewTask::try_from(draft.clone())?;
        let _guard = self.begin()?;

        let created = self.record(self.gateway.create(&draft).await).await?;
        let filters = self.filters().await;
        // The task exists either way; a failed refresh shows up in `phase`.
        if let Err(error) = self.load(filters).await {
            tracing::warn!(%error, "refresh after create failed");
        }
        Ok(created)
    }

    /// Update on the server, then merge the changed fields locally.
    pub async fn edit(&self, id: &str, draft: TaskDraft) -> ClientResult<Task> {
        let patch = TaskPatch::try_from(draft.clone())?;
        let _guard = self.begin()?;

        let updated = self.record(self.gateway.update(id, &draft).await).await?;
        let mut state = self.state.lock().await;
        if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
            task.apply(&patch);
            task.updated_at = updated.updated_at;
        }
        Ok(updated)
    }

    pub async fn remove(&self, id: &str) -> ClientResult<()> {
        let _guard = self.begin()?;

        self.record(self.gateway.delete(id).await).await?;
        self.state.lock().await.tasks.retain(|t| t.id != id);
        Ok(())
    }

    pub async fn change_status(&self, id: &str, status: TaskStatus) -> ClientResult<Task> {
        let _guard = self.begin()?;

        let draft = TaskDraft {
            status: Some(status.as_str().to_string()),
            ..TaskDraft::default()
        };
        let updated = self.record(self.gateway.update(id, &draft).await).await?;
        let mut state = self.state.lock().await;
        if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
            task.updated_at = updated.updated_at;
        }
        Ok(updated)
    }

    /// Keep the failure message around for display, pass the result on.
    async fn record<T>(&self, result: ClientResult<T>) -> ClientResult<T> {
        let mut state = self.state.lock().await;
        match &result {
            Ok(_) => state.error = None,
            Err(error) => state.error = Some(error.to_string()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{SortField, SortOrder, StatusFilter};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::sync::Notify;

    /// In-memory gateway that keeps tasks the way the server would.
    #[derive(Default)]
    struct FakeGateway {
        tasks: StdMutex<Vec<Task>>,
        list_calls: AtomicUsize,
        fail_next: StdMutex<Option<ClientError>>,
        hold_list: Option<Arc<Notify>>,
    }

    impl FakeGateway {
        fn seeded(tasks: Vec<Task>) -> Self {
            FakeGateway {
                tasks: StdMutex::new(tasks),
                ..FakeGateway::default()
            }
        }

        fn failure(&self) -> Option<ClientError> {
            self.fail_next.lock().unwrap().take()
        }
    }

    #[async_trait]
    impl TaskGateway for FakeGateway {
        async fn list(&self, filters: &TaskFilters) -> ClientResult<Vec<Task>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(notify) = &self.hold_list {
                notify.notified().await;
            }
            if let Some(error) = self.failure() {
                return Err(error);
            }
            Ok(view::apply(self.tasks.lock().unwrap().clone(), filters))
        }

        async fn create(&self, draft: &TaskDraft) -> ClientResult<Task> {
            if let Some(error) = self.failure() {
                return Err(error);
            }
            let new = NewTask::try_from(draft.clone())?;
            let mut tasks = self.tasks.lock().unwrap();
            let now = Utc::now();
            let task = Task {
                id: format!("t{}", tasks.len() + 1),
                user_id: "u1".into(),
                title: new.title,
                description: new.description,
                status: new.status,
                due_date: Some(new.due_date),
                created_at: now,
                updated_at: now,
            };
            tasks.push(task.clone());
            Ok(task)
        }

        async fn update(&self, id: &str, draft: &TaskDraft) -> ClientResult<Task> {
            if let Some(error) = self.failure() {
                return Err(error);
            }
            let patch = TaskPatch::try_from(draft.clone())?;
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks.iter_mut().find(|t| t.id == id).ok_or(ClientError::Api {
                status: 404,
                error: "Task not found".into(),
                message: "No task exists with this id".into(),
            })?;
            task.apply(&patch);
            task.updated_at = task.updated_at + Duration::milliseconds(5);
            Ok(task.clone())
        }

        async fn delete(&self, id: &str) -> ClientResult<()> {
            if let Some(error) = self.failure() {
                return Err(error);
            }
            self.tasks.lock().unwrap().retain(|t| t.id != id);
            Ok(())
        }
    }

    fn task(id: &str, title: &str, status: TaskStatus, due: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.into(),
            user_id: "u1".into(),
            title: title.into(),
            description: String::new(),
            status,
            due_date: due.parse().ok(),
            created_at: now,
            updated_at: now,
        }
    }

    fn seeded_board() -> TaskBoard<FakeGateway> {
        TaskBoard::new(FakeGateway::seeded(vec![
            task("t1", "Buy milk", TaskStatus::Todo, "2026-01-10"),
            task("t2", "File taxes", TaskStatus::Done, "2026-01-05"),
        ]))
    }

    fn by_due_date() -> TaskFilters {
        TaskFilters::default()
    }

    #[tokio::test]
    async fn fetch_replaces_list_and_remembers_filters() {
        let board = seeded_board();
        assert_eq!(board.phase().await, BoardPhase::Idle);

        let filters = TaskFilters {
            status: StatusFilter::Only(TaskStatus::Todo),
            ..by_due_date()
        };
        assert_eq!(board.fetch(filters).await.unwrap(), 1);
        assert_eq!(board.phase().await, BoardPhase::Loaded);
        assert_eq!(board.filters().await, filters);
        assert_eq!(board.tasks().await[0].id, "t1");
    }

    #[tokio::test]
    async fn failed_fetch_clears_list() {
        let board = seeded_board();
        board.fetch(by_due_date()).await.unwrap();
        *board.gateway().fail_next.lock().unwrap() = Some(ClientError::Transport("reset".into()));

        assert!(board.fetch(by_due_date()).await.is_err());
        assert!(board.tasks().await.is_empty());
        assert!(matches!(board.phase().await, BoardPhase::Failed(_)));
        assert!(board.error().await.is_some());
        assert!(!board.is_loading());
    }

    #[tokio::test]
    async fn add_refetches_with_remembered_filters() {
        let board = seeded_board();
        board.fetch(by_due_date()).await.unwrap();
        let calls_before = board.gateway().list_calls.load(Ordering::SeqCst);

        let created = board.add(TaskDraft::new("Call mum", "2026-01-07")).await.unwrap();

        assert_eq!(board.gateway().list_calls.load(Ordering::SeqCst), calls_before + 1);
        let titles: Vec<String> = board.tasks().await.into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["File taxes", "Call mum", "Buy milk"]);
        assert_eq!(created.status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_gateway() {
        let board = seeded_board();
        let err = board.add(TaskDraft::new("   ", "2026-01-07")).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(board.gateway().tasks.lock().unwrap().len(), 2);

        let long = TaskDraft {
            title: Some("x".repeat(101)),
            ..TaskDraft::default()
        };
        assert!(matches!(board.edit("t1", long).await, Err(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn edit_and_status_change_patch_locally() {
        let board = seeded_board();
        board.fetch(by_due_date()).await.unwrap();
        let calls = board.gateway().list_calls.load(Ordering::SeqCst);

        board
            .edit("t1", TaskDraft::default().with_description("semi-skimmed"))
            .await
            .unwrap();
        board.change_status("t1", TaskStatus::Done).await.unwrap();

        let local = board.tasks().await;
        let t1 = local.iter().find(|t| t.id == "t1").unwrap();
        assert_eq!(t1.description, "semi-skimmed");
        assert_eq!(t1.status, TaskStatus::Done);
        assert_eq!(t1.title, "Buy milk");
        assert!(t1.updated_at > t1.created_at);
        assert_eq!(board.gateway().list_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn status_change_twice_is_idempotent() {
        let board = seeded_board();
        board.fetch(by_due_date()).await.unwrap();

        let once = board.change_status("t1", TaskStatus::InProgress).await.unwrap();
        let twice = board.change_status("t1", TaskStatus::InProgress).await.unwrap();
        assert_eq!(once.status, twice.status);
        assert_eq!(once.title, twice.title);
        assert_eq!(once.description, twice.description);
        assert_eq!(once.due_date, twice.due_date);
    }

    #[tokio::test]
    async fn remove_drops_the_task_locally() {
        let board = seeded_board();
        board.fetch(by_due_date()).await.unwrap();
        board.remove("t2").await.unwrap();
        let ids: Vec<String> = board.tasks().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["t1"]);
    }

    #[tokio::test]
    async fn failed_mutation_keeps_local_state_and_reports() {
        let board = seeded_board();
        board.fetch(by_due_date()).await.unwrap();
        *board.gateway().fail_next.lock().unwrap() = Some(ClientError::Api {
            status: 403,
            error: "Forbidden".into(),
            message: "You do not have permission to access this task".into(),
        });

        let err = board.remove("t1").await.unwrap_err();
        assert!(err.is_forbidden());
        assert_eq!(board.tasks().await.len(), 2);
        assert_eq!(
            board.error().await.as_deref(),
            Some("You do not have permission to access this task")
        );
        board.clear_error().await;
        assert_eq!(board.error().await, None);
    }

    #[tokio::test]
    async fn overlapping_calls_are_reported_busy() {
        let notify = Arc::new(Notify::new());
        let gateway = FakeGateway {
            hold_list: Some(notify.clone()),
            ..FakeGateway::seeded(vec![task("t1", "Buy milk", TaskStatus::Todo, "2026-01-10")])
        };
        let board = Arc::new(TaskBoard::new(gateway));

        let first = tokio::spawn({
            let board = board.clone();
            async move { board.fetch(by_due_date()).await }
        });
        while !board.is_loading() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(board.remove("t1").await, Err(ClientError::Busy)));
        notify.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert!(!board.is_loading());
    }

    #[tokio::test]
    async fn visible_applies_remembered_ordering() {
        let board = seeded_board();
        let filters = TaskFilters {
            status: StatusFilter::All,
            sort_by: SortField::DueDate,
            order: SortOrder::Desc,
        };
        board.fetch(filters).await.unwrap();
        let ids: Vec<String> = board.visible().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        let today = NaiveDate::from_ymd_opt(2026, 1, 8).unwrap();
        let stats = board.stats(today).await;
        assert_eq!((stats.total, stats.done, stats.overdue), (2, 1, 0));
    }

    #[tokio::test]
    async fn every_fetch_settles_back_to_an_idle_phase() {
        let board = seeded_board();
        assert!(board.phase().await.is_idle());

        board.fetch(by_due_date()).await.unwrap();
        assert!(board.phase().await.is_idle());
        assert!(!board.is_loading());

        *board.gateway().fail_next.lock().unwrap() = Some(ClientError::Transport("down".into()));
        board.fetch(by_due_date()).await.unwrap_err();
        let phase = board.phase().await;
        assert!(matches!(phase, BoardPhase::Failed(_)));
        assert!(phase.is_idle());
        assert!(!board.is_loading());

        board.fetch(by_due_date()).await.unwrap();
        assert_eq!(board.phase().await, BoardPhase::Loaded);
        assert!(!BoardPhase::Loading.is_idle());
    }
}
