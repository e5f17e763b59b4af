//! List-level CRUD for projects, routes and tests.
//!
//! Local state only changes after the backend acknowledges a mutation. How
//! an edit is merged back is chosen per collection with [`RefreshStrategy`].

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::Api;
use crate::error::{ClientError, Result};
use crate::models::{
    Project, ProjectEdit, Route, RouteEdit, RouteStat, RunResult, RunSummary, TestCase,
    TestStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStrategy {
    /// Re-list the whole collection after a successful edit.
    FullRefetch,
    /// Patch the matching entry with the submitted fields.
    InPlacePatch,
}

pub trait Entity: Clone + Send + Sync {
    type Edit: Send + Sync;
    const KIND: &'static str;

    fn id(&self) -> i64;
    fn apply(&mut self, edit: &Self::Edit);
}

impl Entity for Project {
    type Edit = ProjectEdit;
    const KIND: &'static str = "project";

    fn id(&self) -> i64 {
        self.id
    }

    fn apply(&mut self, edit: &ProjectEdit) {
        self.name = edit.name.clone();
        self.description = edit.description.clone();
        self.project_url = edit.project_url.clone();
    }
}

impl Entity for Route {
    type Edit = RouteEdit;
    const KIND: &'static str = "route";

    fn id(&self) -> i64 {
        self.id
    }

    fn apply(&mut self, edit: &RouteEdit) {
        self.routename = edit.routename.clone();
        self.method = edit.method.clone();
    }
}

impl Entity for TestCase {
    /// The full test document, sent as edited.
    type Edit = Value;
    const KIND: &'static str = "test";

    fn id(&self) -> i64 {
        self.id
    }

    fn apply(&mut self, edit: &Value) {
        self.body = edit.clone();
    }
}

/// Where a collection is listed from and written back to.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    type Item: Entity;

    async fn list(&self, api: &Api) -> Result<Vec<Self::Item>>;
    async fn update(&self, api: &Api, id: i64, edit: &<Self::Item as Entity>::Edit) -> Result<()>;
    async fn delete(&self, api: &Api, id: i64) -> Result<()>;
}

pub struct ProjectsSource;

#[async_trait]
impl CollectionSource for ProjectsSource {
    type Item = Project;

    async fn list(&self, api: &Api) -> Result<Vec<Project>> {
        api.projects_with_stats().await
    }

    async fn update(&self, api: &Api, id: i64, edit: &ProjectEdit) -> Result<()> {
        api.update_project(id, edit).await.map(|_| ())
    }

    async fn delete(&self, api: &Api, id: i64) -> Result<()> {
        api.delete_project(id).await
    }
}

pub struct RoutesSource {
    pub project_id: i64,
}

#[async_trait]
impl CollectionSource for RoutesSource {
    type Item = Route;

    async fn list(&self, api: &Api) -> Result<Vec<Route>> {
        api.project_routes(self.project_id).await
    }

    async fn update(&self, api: &Api, id: i64, edit: &RouteEdit) -> Result<()> {
        api.update_route(id, edit).await.map(|_| ())
    }

    async fn delete(&self, api: &Api, id: i64) -> Result<()> {
        api.delete_route(id).await
    }
}

pub struct TestsSource {
    pub route_id: i64,
}

#[async_trait]
impl CollectionSource for TestsSource {
    type Item = TestCase;

    async fn list(&self, api: &Api) -> Result<Vec<TestCase>> {
        let mut tests = api.route_tests(self.route_id).await?;
        for test in tests.iter_mut() {
            test.route.get_or_insert(self.route_id);
        }
        Ok(tests)
    }

    async fn update(&self, api: &Api, id: i64, edit: &Value) -> Result<()> {
        api.update_test(id, edit).await.map(|_| ())
    }

    async fn delete(&self, api: &Api, id: i64) -> Result<()> {
        api.delete_test(id).await
    }
}

/// Blocking confirmation before a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

pub struct CollectionEditor<S: CollectionSource> {
    source: S,
    strategy: RefreshStrategy,
    items: Vec<S::Item>,
}

impl<S: CollectionSource> CollectionEditor<S> {
    pub fn new(source: S, strategy: RefreshStrategy) -> Self {
        Self {
            source,
            strategy,
            items: Vec::new(),
        }
    }

    /// Start from an already known list (e.g. a cache hit).
    pub fn with_items(mut self, items: Vec<S::Item>) -> Self {
        self.items = items;
        self
    }

    pub fn items(&self) -> &[S::Item] {
        &self.items
    }

    pub fn get(&self, id: i64) -> Option<&S::Item> {
        self.items.iter().find(|i| i.id() == id)
    }

    pub async fn load(&mut self, api: &Api) -> Result<&[S::Item]> {
        self.items = self.source.list(api).await?;
        debug!(kind = <S::Item as Entity>::KIND, count = self.items.len(), "collection loaded");
        Ok(&self.items)
    }

    pub async fn edit(&mut self, api: &Api, id: i64, edit: &<S::Item as Entity>::Edit) -> Result<()> {
        self.source.update(api, id, edit).await?;
        match self.strategy {
            RefreshStrategy::FullRefetch => {
                self.load(api).await?;
            }
            RefreshStrategy::InPlacePatch => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id() == id) {
                    item.apply(edit);
                }
            }
        }
        info!(kind = <S::Item as Entity>::KIND, id, strategy = ?self.strategy, "edit saved");
        Ok(())
    }

    /// Returns `false` when the user declined the confirmation.
    pub async fn delete(&mut self, api: &Api, id: i64, confirm: &dyn Confirm) -> Result<bool> {
        if !confirm.confirm(&format!("Delete this {}?", <S::Item as Entity>::KIND)) {
            return Ok(false);
        }
        self.source.delete(api, id).await?;
        self.items.retain(|i| i.id() != id);
        info!(kind = <S::Item as Entity>::KIND, id, "deleted");
        Ok(true)
    }
}

impl CollectionEditor<RoutesSource> {
    /// Merge freshly fetched pass stats into the listing.
    pub fn merge_stats(&mut self, stats: &[RouteStat]) {
        for stat in stats {
            if let Some(route) = self.items.iter_mut().find(|r| r.id == stat.route_id) {
                route.pass_percentage = stat.percentage;
                route.total_tests = stat.total_tests;
            }
        }
    }
}

impl CollectionEditor<TestsSource> {
    pub fn set_status(&mut self, test_id: i64, status: TestStatus) {
        if let Some(test) = self.items.iter_mut().find(|t| t.id == test_id) {
            test.status = status;
        }
    }

    /// Fill every test's status from the status endpoint (wait-for-all).
    pub async fn load_statuses(&mut self, api: &Api) {
        let ids: Vec<i64> = self.items.iter().map(|t| t.id).collect();
        let statuses = api.test_statuses(&ids).await;
        if api.cancel_token().is_cancelled() {
            return;
        }
        for (test, status) in self.items.iter_mut().zip(statuses) {
            test.status = status;
        }
    }
}

/// Per-item "running" flags, shared by every task that may trigger a run.
#[derive(Clone, Default)]
pub struct RunTracker {
    running: Arc<Mutex<HashSet<i64>>>,
}

/// Clears the running flag when dropped, whatever the outcome of the run.
pub struct RunGuard {
    tracker: RunTracker,
    id: i64,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.tracker.lock().remove(&self.id);
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, id: i64) -> Result<RunGuard> {
        if !self.lock().insert(id) {
            return Err(ClientError::AlreadyRunning(id));
        }
        Ok(RunGuard {
            tracker: self.clone(),
            id,
        })
    }

    pub fn is_running(&self, id: i64) -> bool {
        self.lock().contains(&id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<i64>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Run one test; duplicate triggers for the same test are rejected.
pub async fn run_test(api: &Api, tracker: &RunTracker, test_id: i64) -> Result<RunResult> {
    let _guard = tracker.begin(test_id)?;
    api.run_test(test_id).await
}

/// Run every test of a route, then re-fetch the project's route stats.
pub async fn run_route(
    api: &Api,
    tracker: &RunTracker,
    project_id: i64,
    route_id: i64,
) -> Result<(RunSummary, Vec<RouteStat>)> {
    let _guard = tracker.begin(route_id)?;
    let summary = api.run_route_tests(project_id, route_id).await?;
    let stats = api.routes_passed_stats(project_id).await?;
    Ok((summary, stats))
}

/// Route picker plus the tests of the selected route, as shown on the
/// project tests page.
pub struct RouteTestBrowser {
    selected_route: Option<i64>,
    test_counts: BTreeMap<i64, u64>,
    tests: Option<CollectionEditor<TestsSource>>,
}

impl RouteTestBrowser {
    pub fn new(routes: &[Route]) -> Self {
        Self {
            selected_route: None,
            test_counts: routes.iter().map(|r| (r.id, r.total_tests)).collect(),
            tests: None,
        }
    }

    pub fn selected_route(&self) -> Option<i64> {
        self.selected_route
    }

    pub fn test_counts(&self) -> &BTreeMap<i64, u64> {
        &self.test_counts
    }

    pub fn tests(&self) -> &[TestCase] {
        self.tests.as_ref().map(|t| t.items()).unwrap_or(&[])
    }

    pub async fn select_route(&mut self, api: &Api, route_id: i64) -> Result<()> {
        let mut editor = CollectionEditor::new(TestsSource { route_id }, RefreshStrategy::InPlacePatch);
        editor.load(api).await?;
        self.test_counts.insert(route_id, editor.items().len() as u64);
        self.selected_route = Some(route_id);
        self.tests = Some(editor);
        Ok(())
    }

    /// Delete a test of the selected route. Removing the last one clears the
    /// selection and drops the route from the count map.
    pub async fn delete_test(&mut self, api: &Api, test_id: i64, confirm: &dyn Confirm) -> Result<bool> {
        let (route_id, editor) = match (self.selected_route, self.tests.as_mut()) {
            (Some(route_id), Some(editor)) => (route_id, editor),
            _ => return Ok(false),
        };
        if !editor.delete(api, test_id, confirm).await? {
            return Ok(false);
        }
        let remaining = editor.items().len() as u64;
        if remaining == 0 {
            self.test_counts.remove(&route_id);
            self.selected_route = None;
            self.tests = None;
        } else {
            self.test_counts.insert(route_id, remaining);
        }
        Ok(true)
    }
}
