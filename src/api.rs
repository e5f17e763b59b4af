//! Typed wrappers over the backend REST surface.

use futures::future::{join_all, try_join_all};
use reqwest::Method;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::AuthStyle;
use crate::error::{ClientError, Result};
use crate::models::*;
use crate::rest::{ApiRequest, AuthenticatedFetcher};

/// A fetcher bound to one token and one cancellation scope (one page mount).
#[derive(Clone)]
pub struct Api {
    fetcher: AuthenticatedFetcher,
    token: Option<String>,
    cancel: CancellationToken,
}

impl Api {
    pub fn new(fetcher: AuthenticatedFetcher, token: Option<String>, cancel: CancellationToken) -> Self {
        Self { fetcher, token, cancel }
    }

    pub fn anonymous(fetcher: AuthenticatedFetcher) -> Self {
        Self::new(fetcher, None, CancellationToken::new())
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn public(&self, method: Method, path: &str) -> ApiRequest<'_> {
        self.fetcher.request(method, path)
    }

    fn authed(&self, method: Method, path: &str) -> Result<ApiRequest<'_>> {
        let token = self.token.as_deref().ok_or(ClientError::AuthMissing)?;
        Ok(self.fetcher.request(method, path).token(Some(token)))
    }

    // --- auth ---

    pub async fn signup(&self, payload: &SignupRequest) -> Result<TokenResponse> {
        self.public(Method::POST, "/auth/signup").json(payload)?.send(&self.cancel).await
    }

    pub async fn login(&self, payload: &LoginRequest) -> Result<TokenResponse> {
        self.public(Method::POST, "/auth/login").json(payload)?.send(&self.cancel).await
    }

    pub async fn me(&self) -> Result<User> {
        self.authed(Method::GET, "/auth/me")?.send(&self.cancel).await
    }

    pub async fn update_username(&self, username: &str) -> Result<Value> {
        self.authed(Method::PUT, "/auth/me/username")?
            .json(&json!({ "username": username }))?
            .send_value(&self.cancel)
            .await
    }

    pub async fn update_email(&self, email: &str) -> Result<Value> {
        self.authed(Method::PUT, "/auth/me/email")?
            .json(&json!({ "email": email }))?
            .send_value(&self.cancel)
            .await
    }

    pub async fn update_password(&self, password: &str) -> Result<Value> {
        self.authed(Method::PUT, "/auth/me/password")?
            .json(&json!({ "password": password }))?
            .send_value(&self.cancel)
            .await
    }

    // --- dashboard ---

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        self.authed(Method::GET, "/dashboard/")?.send(&self.cancel).await
    }

    // --- projects ---

    pub async fn create_project(&self, project: &NewProject) -> Result<Value> {
        self.authed(Method::POST, "/api/projects")?
            .json(project)?
            .send_value(&self.cancel)
            .await
    }

    pub async fn projects_with_stats(&self) -> Result<Vec<Project>> {
        let envelope: ProjectsEnvelope = self
            .authed(Method::GET, "/api/projects-with-stats")?
            .send(&self.cancel)
            .await?;
        Ok(envelope.projects)
    }

    pub async fn project(&self, id: i64) -> Result<Project> {
        self.authed(Method::GET, &format!("/api/projects/{}", id))?
            .send(&self.cancel)
            .await
    }

    pub async fn project_test_stats(&self, id: i64) -> Result<ProjectTestStats> {
        self.authed(Method::GET, &format!("/api/project-test-stats/{}", id))?
            .send(&self.cancel)
            .await
    }

    /// Project list with each pass rate refreshed in parallel. The join waits
    /// for every stats call; one failure fails the whole batch.
    pub async fn projects_with_pass_rates(&self) -> Result<Vec<Project>> {
        let mut projects = self.projects_with_stats().await?;
        let stats = try_join_all(projects.iter().map(|p| self.project_test_stats(p.id))).await?;
        for (project, stat) in projects.iter_mut().zip(stats) {
            project.pass_percentage = stat.percentage;
            project.total_tests = stat.total_tests;
        }
        Ok(projects)
    }

    pub async fn update_project(&self, id: i64, edit: &ProjectEdit) -> Result<Value> {
        self.authed(Method::PUT, &format!("/api/projects/{}", id))?
            .json(edit)?
            .send_value(&self.cancel)
            .await
    }

    pub async fn delete_project(&self, id: i64) -> Result<()> {
        self.authed(Method::DELETE, &format!("/api/projects/{}", id))?
            .send_unit(&self.cancel)
            .await
    }

    // --- routes ---

    pub async fn project_routes(&self, project_id: i64) -> Result<Vec<Route>> {
        let envelope: RoutesEnvelope = self
            .authed(Method::GET, &format!("/api/projects/{}/routes", project_id))?
            .send(&self.cancel)
            .await?;
        Ok(envelope.routes)
    }

    pub async fn routes_passed_stats(&self, project_id: i64) -> Result<Vec<RouteStat>> {
        let envelope: RouteStatsEnvelope = self
            .authed(Method::GET, &format!("/api/routes-passed-stats/{}", project_id))?
            .send(&self.cancel)
            .await?;
        Ok(envelope.routes)
    }

    pub async fn update_route(&self, id: i64, edit: &RouteEdit) -> Result<Value> {
        self.authed(Method::PUT, &format!("/api/routes/{}", id))?
            .json(edit)?
            .send_value(&self.cancel)
            .await
    }

    pub async fn delete_route(&self, id: i64) -> Result<()> {
        self.authed(Method::DELETE, &format!("/api/routes/{}", id))?
            .send_unit(&self.cancel)
            .await
    }

    pub async fn run_route_tests(&self, project_id: i64, route_id: i64) -> Result<RunSummary> {
        self.authed(Method::POST, &format!("/api/run-tests/{}/{}", project_id, route_id))?
            .send(&self.cancel)
            .await
    }

    // --- tests ---

    pub async fn route_tests(&self, route_id: i64) -> Result<Vec<TestCase>> {
        let envelope: TestsEnvelope = self
            .authed(Method::GET, &format!("/api/routes/{}/tests", route_id))?
            .send(&self.cancel)
            .await?;
        Ok(envelope.tests)
    }

    pub async fn run_test(&self, test_id: i64) -> Result<RunResult> {
        self.authed(Method::POST, &format!("/api/run-test/{}", test_id))?
            .send(&self.cancel)
            .await
    }

    pub async fn test_status(&self, test_id: i64) -> Result<TestStatus> {
        let resp: TestStatusResponse = self
            .authed(Method::GET, &format!("/api/test-status/{}", test_id))?
            .send(&self.cancel)
            .await?;
        Ok(resp.status())
    }

    /// Statuses for a listing, joined after all complete. Any per-test
    /// failure reads as `NotRun`.
    pub async fn test_statuses(&self, test_ids: &[i64]) -> Vec<TestStatus> {
        join_all(test_ids.iter().map(|id| async move {
            self.test_status(*id).await.unwrap_or(TestStatus::NotRun)
        }))
        .await
    }

    pub async fn update_test(&self, id: i64, body: &Value) -> Result<Value> {
        self.authed(Method::PUT, &format!("/api/tests/{}", id))?
            .json(&TestEdit { test: body.clone() })?
            .send_value(&self.cancel)
            .await
    }

    pub async fn delete_test(&self, id: i64) -> Result<()> {
        self.authed(Method::DELETE, &format!("/api/tests/{}", id))?
            .send_unit(&self.cancel)
            .await
    }

    pub async fn save_tests(&self, request: &SaveTestsRequest) -> Result<SaveTestsResponse> {
        self.authed(Method::POST, "/api/save-tests")?
            .json(request)?
            .send(&self.cancel)
            .await
    }

    pub async fn generate_tests(&self, prompt: String) -> Result<Vec<GeneratedTest>> {
        self.authed(Method::POST, "/api/generate-tests")?
            .json(&GenerateRequest { prompt })?
            .send(&self.cancel)
            .await
    }

    // --- history ---

    pub async fn history_urls(&self) -> Result<Vec<HistoryUrl>> {
        self.authed(Method::GET, "/history/url")?.send(&self.cancel).await
    }

    pub async fn history_tests(&self, url_id: i64) -> Result<Vec<Value>> {
        self.authed(Method::POST, "/history/tests")?
            .json(&HistoryTestsRequest { id: url_id })?
            .send(&self.cancel)
            .await
    }

    /// The connectivity probe is the one endpoint that expects a standard
    /// `Authorization: Bearer` header.
    pub async fn test_connection(&self, url: &str) -> Result<Value> {
        self.authed(Method::POST, "/api/test-connection")?
            .style(AuthStyle::Bearer)
            .json(&ConnectionRequest { url: url.to_string() })?
            .send_value(&self.cancel)
            .await
    }
}
