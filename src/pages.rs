//! Page flows: session guard, cache, fetch and local state wired together
//! the same way on every page.
//!
//! Reads report failures through [`LoadState`]; mutations return
//! `Result` so the caller can surface the backend's message.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::Api;
use crate::auth::{persist_token, Navigation};
use crate::cache::CacheMode;
use crate::collection::{
    run_route, CollectionEditor, Confirm, ProjectsSource, RefreshStrategy, RoutesSource,
    RunTracker, TestsSource,
};
use crate::context::AppContext;
use crate::error::{ClientError, Result};
use crate::form::{
    AccountEditForm, AccountField, Form, GenerateTestsForm, LoginForm, ManualTestForm, ProjectForm,
    RegisterForm,
};
use crate::models::{
    DashboardView, GeneratedTest, ProjectEdit, Route, RouteEdit, RunSummary, SaveTestEntry,
    SaveTestsRequest, SaveTestsResponse, User,
};
use crate::storage::{keys, StoreExt};

#[derive(Debug)]
pub enum LoadState<T> {
    /// Nothing applied yet (also what a cancelled load leaves behind).
    Loading,
    Loaded(T),
    LoadError(String),
    Redirect(Navigation),
}

impl<T> LoadState<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => LoadState::Loaded(value),
            Err(ClientError::Cancelled) => LoadState::Loading,
            Err(e) if e.is_auth_failure() => LoadState::Redirect(Navigation::Login),
            Err(e) => {
                warn!(error = %e, "page load failed");
                LoadState::LoadError(e.user_message())
            }
        }
    }

    pub fn loaded(self) -> Option<T> {
        match self {
            LoadState::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

fn mount_or<T>(ctx: &AppContext, cancel: &CancellationToken) -> std::result::Result<Api, LoadState<T>> {
    ctx.mount(cancel.clone()).map_err(|e| LoadState::from_result(Err(e)))
}

// --- login / registration ---

pub async fn login(ctx: &AppContext, form: &LoginForm) -> Result<Navigation> {
    let payload = form.payload()?;
    let resp = ctx.anonymous_api().login(&payload).await?;
    persist_token(ctx.persisted.as_ref(), &resp.token)?;
    info!(email = %payload.email, "logged in");
    Ok(Navigation::Dashboard)
}

pub async fn register(ctx: &AppContext, form: &RegisterForm) -> Result<Navigation> {
    let payload = form.payload()?;
    let resp = ctx.anonymous_api().signup(&payload).await?;
    persist_token(ctx.persisted.as_ref(), &resp.token)?;
    info!(username = %payload.username, "registered");
    Ok(Navigation::Dashboard)
}

pub fn logout(ctx: &AppContext) -> Result<Navigation> {
    for key in [
        keys::USER_TOKEN,
        keys::SELECTED_PROJECT_ID,
        keys::SELECTED_ROUTE_ID,
        keys::GENERATED_TESTS,
    ] {
        ctx.persisted.clear(key)?;
    }
    ctx.session.clear_all()?;
    Ok(Navigation::Login)
}

// --- dashboard ---

pub async fn load_dashboard(
    ctx: &AppContext,
    cancel: &CancellationToken,
    mode: CacheMode,
) -> LoadState<DashboardView> {
    let api = match mount_or(ctx, cancel) {
        Ok(api) => api,
        Err(state) => return state,
    };
    let result = ctx
        .cache()
        .get_or_fetch(keys::DASHBOARD, mode, || async {
            let (user, stats) = tokio::try_join!(api.me(), api.dashboard())?;
            Ok::<_, ClientError>(DashboardView::build(&user, &stats))
        })
        .await;
    LoadState::from_result(result.map(|cached| cached.value))
}

// --- projects ---

pub async fn create_project(ctx: &AppContext, cancel: &CancellationToken, form: &ProjectForm) -> Result<Navigation> {
    let payload = form.payload()?;
    let api = ctx.mount(cancel.clone())?;
    api.create_project(&payload).await?;
    ctx.invalidate_dashboard()?;
    info!(project = %payload.project_name, "project created");
    Ok(Navigation::Dashboard)
}

/// Check that the backend can reach the project's URL.
pub async fn test_connection(ctx: &AppContext, cancel: &CancellationToken, form: &ProjectForm) -> Result<Value> {
    if form.project_url.trim().is_empty() {
        return Err(ClientError::LocalValidation("project url is required".into()));
    }
    let api = ctx.mount(cancel.clone())?;
    api.test_connection(form.project_url.trim()).await
}

pub struct ProjectsPage {
    pub api: Api,
    pub editor: CollectionEditor<ProjectsSource>,
}

impl ProjectsPage {
    pub async fn open(ctx: &AppContext, cancel: &CancellationToken) -> LoadState<Self> {
        let api = match mount_or(ctx, cancel) {
            Ok(api) => api,
            Err(state) => return state,
        };
        let mut editor = CollectionEditor::new(ProjectsSource, RefreshStrategy::FullRefetch);
        let result = editor.load(&api).await.map(|_| ());
        LoadState::from_result(result.map(|_| Self { api, editor }))
    }

    pub async fn edit(&mut self, ctx: &AppContext, id: i64, edit: &ProjectEdit) -> Result<()> {
        self.editor.edit(&self.api, id, edit).await?;
        ctx.invalidate_dashboard()
    }

    pub async fn delete(&mut self, ctx: &AppContext, id: i64, confirm: &dyn Confirm) -> Result<bool> {
        let deleted = self.editor.delete(&self.api, id, confirm).await?;
        if deleted {
            ctx.invalidate_dashboard()?;
            ctx.invalidate_routes(id)?;
            if ctx.persisted.get_id(keys::SELECTED_PROJECT_ID)? == Some(id) {
                ctx.persisted.clear(keys::SELECTED_PROJECT_ID)?;
            }
        }
        Ok(deleted)
    }

    /// Pass rates refreshed per project with a wait-for-all join.
    pub async fn refresh_pass_rates(&mut self) -> Result<()> {
        let projects = self.api.projects_with_pass_rates().await?;
        self.editor = CollectionEditor::new(ProjectsSource, RefreshStrategy::FullRefetch).with_items(projects);
        Ok(())
    }
}

// --- routes ---

pub struct RoutesPage {
    pub api: Api,
    pub project_id: i64,
    pub project_name: String,
    pub editor: CollectionEditor<RoutesSource>,
    pub from_cache: bool,
}

impl RoutesPage {
    /// Route listing of one project, read through `routes_{projectId}`.
    pub async fn open(ctx: &AppContext, cancel: &CancellationToken, project_id: i64, mode: CacheMode) -> LoadState<Self> {
        let api = match mount_or(ctx, cancel) {
            Ok(api) => api,
            Err(state) => return state,
        };
        let result: Result<Self> = async {
            ctx.persisted.set_as(keys::SELECTED_PROJECT_ID, &project_id)?;
            let cached = ctx
                .cache()
                .get_or_fetch(&keys::routes(project_id), mode, || api.project_routes(project_id))
                .await?;
            // The name is cosmetic; a failed lookup keeps the placeholder
            let project_name = match api.project(project_id).await {
                Ok(project) => project.name,
                Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
                Err(_) => "Project".to_string(),
            };
            let editor = CollectionEditor::new(RoutesSource { project_id }, RefreshStrategy::FullRefetch)
                .with_items(cached.value);
            Ok::<_, ClientError>(Self {
                api: api.clone(),
                project_id,
                project_name,
                editor,
                from_cache: cached.from_cache,
            })
        }
        .await;
        LoadState::from_result(result)
    }

    pub fn routes(&self) -> &[Route] {
        self.editor.items()
    }

    fn write_cache(&self, ctx: &AppContext) -> Result<()> {
        ctx.cache().set(&keys::routes(self.project_id), &self.editor.items())
    }

    pub async fn edit(&mut self, ctx: &AppContext, id: i64, edit: &RouteEdit) -> Result<()> {
        if edit.routename.trim().is_empty() {
            return Err(ClientError::LocalValidation("route name is required".into()));
        }
        self.editor.edit(&self.api, id, edit).await?;
        self.write_cache(ctx)
    }

    pub async fn delete(&mut self, ctx: &AppContext, id: i64, confirm: &dyn Confirm) -> Result<bool> {
        let deleted = self.editor.delete(&self.api, id, confirm).await?;
        if deleted {
            self.write_cache(ctx)?;
            ctx.invalidate_dashboard()?;
        }
        Ok(deleted)
    }

    /// Run every test of a route, then merge the re-fetched pass stats.
    pub async fn run(&mut self, ctx: &AppContext, tracker: &RunTracker, route_id: i64) -> Result<RunSummary> {
        let (summary, stats) = run_route(&self.api, tracker, self.project_id, route_id).await?;
        self.editor.merge_stats(&stats);
        self.write_cache(ctx)?;
        info!(route_id, passed = summary.passed(), total = summary.results.len(), "route run finished");
        Ok(summary)
    }
}

// --- tests of one route ---

pub async fn open_route_tests(
    ctx: &AppContext,
    cancel: &CancellationToken,
    route_id: i64,
) -> LoadState<(Api, CollectionEditor<TestsSource>)> {
    let api = match mount_or(ctx, cancel) {
        Ok(api) => api,
        Err(state) => return state,
    };
    let result: Result<CollectionEditor<TestsSource>> = async {
        ctx.persisted.set_as(keys::SELECTED_ROUTE_ID, &route_id)?;
        let mut editor = CollectionEditor::new(TestsSource { route_id }, RefreshStrategy::InPlacePatch);
        editor.load(&api).await?;
        editor.load_statuses(&api).await;
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        Ok::<_, ClientError>(editor)
    }
    .await;
    LoadState::from_result(result.map(|editor| (api, editor)))
}

// --- test generation and hand-off ---

fn selected_project(ctx: &AppContext) -> Result<i64> {
    ctx.persisted
        .get_id(keys::SELECTED_PROJECT_ID)?
        .ok_or_else(|| ClientError::LocalValidation("select a project first".into()))
}

/// Generate tests and hand the batch to the results page.
pub async fn generate_tests(ctx: &AppContext, cancel: &CancellationToken, form: &GenerateTestsForm) -> Result<Navigation> {
    let prompt = form.prompt()?;
    let api = ctx.mount(cancel.clone())?;
    let tests = api.generate_tests(prompt).await?;
    ctx.persisted.set_as(keys::GENERATED_TESTS, &tests)?;
    info!(count = tests.len(), "tests generated");
    Ok(Navigation::Results)
}

pub fn generated_tests(ctx: &AppContext) -> Result<Vec<GeneratedTest>> {
    Ok(ctx.persisted.get_as(keys::GENERATED_TESTS)?.unwrap_or_default())
}

async fn save_entries(ctx: &AppContext, api: &Api, project_id: i64, tests: Vec<SaveTestEntry>) -> Result<SaveTestsResponse> {
    let resp = api.save_tests(&SaveTestsRequest { tests, project_id }).await?;
    // Saving may create routes implicitly
    ctx.invalidate_routes(project_id)?;
    ctx.invalidate_dashboard()?;
    Ok(resp)
}

/// Save the handed-off batch under the selected project.
pub async fn save_generated_tests(ctx: &AppContext, cancel: &CancellationToken) -> Result<SaveTestsResponse> {
    let api = ctx.mount(cancel.clone())?;
    let project_id = selected_project(ctx)?;
    let tests = generated_tests(ctx)?;
    if tests.is_empty() {
        return Err(ClientError::LocalValidation("no generated tests to save".into()));
    }
    let entries = tests
        .into_iter()
        .map(|t| SaveTestEntry {
            method: t.method.unwrap_or_else(|| t.body.request_method.clone()),
            route: t.route,
            body: t.body,
        })
        .collect();
    let resp = save_entries(ctx, &api, project_id, entries).await?;
    ctx.persisted.clear(keys::GENERATED_TESTS)?;
    Ok(resp)
}

pub async fn save_manual_test(ctx: &AppContext, cancel: &CancellationToken, form: &ManualTestForm) -> Result<SaveTestsResponse> {
    let entry = form.entry()?;
    let api = ctx.mount(cancel.clone())?;
    let project_id = selected_project(ctx)?;
    save_entries(ctx, &api, project_id, vec![entry]).await
}

// --- account settings ---

pub struct AccountPage {
    pub api: Api,
    pub user: User,
}

impl AccountPage {
    pub async fn open(ctx: &AppContext, cancel: &CancellationToken) -> LoadState<Self> {
        let api = match mount_or(ctx, cancel) {
            Ok(api) => api,
            Err(state) => return state,
        };
        let result = api.me().await;
        LoadState::from_result(result.map(|user| Self { api, user }))
    }

    /// The local view changes only after the backend accepts the update.
    pub async fn update(&mut self, ctx: &AppContext, form: &AccountEditForm) -> Result<()> {
        form.ensure_valid()?;
        let value = form.value.trim();
        match form.field {
            AccountField::Username => {
                self.api.update_username(value).await?;
                self.user.username = value.to_string();
                // Cached dashboard carries the username
                ctx.invalidate_dashboard()?;
            }
            AccountField::Email => {
                self.api.update_email(value).await?;
                self.user.email = value.to_string();
            }
            AccountField::Password => {
                self.api.update_password(&form.value).await?;
            }
        }
        Ok(())
    }
}
