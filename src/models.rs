//! Payloads exchanged with the backend and the views built from them.
//!
//! Field aliases accept both the backend's column names (`project_id`,
//! `projectName`, ...) and the names the list views use (`id`, `name`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- auth ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct User {
    pub username: String,
    pub email: String,
}

// --- projects ---

/// Body of `POST /api/projects`, identical to the creation form fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub project_name: String,
    pub business_logic: String,
    pub project_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(alias = "project_id")]
    pub id: i64,
    #[serde(alias = "projectName")]
    pub name: String,
    #[serde(default, alias = "businessLogic")]
    pub description: String,
    #[serde(default)]
    pub project_url: String,
    #[serde(default, alias = "total_tests")]
    pub total_tests: u64,
    /// Server computed, in `[0, 100]`.
    #[serde(default, alias = "percentage")]
    pub pass_percentage: f64,
}

/// Editable project fields sent with `PUT /api/projects/{id}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectEdit {
    #[serde(rename = "projectName")]
    pub name: String,
    #[serde(rename = "businessLogic")]
    pub description: String,
    #[serde(rename = "projectUrl")]
    pub project_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProjectsEnvelope {
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectTestStats {
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub total_tests: u64,
}

// --- routes ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(alias = "route_id")]
    pub id: i64,
    pub routename: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, alias = "total_tests")]
    pub total_tests: u64,
    #[serde(default, alias = "percentage")]
    pub pass_percentage: f64,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RouteEdit {
    pub routename: String,
    pub method: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoutesEnvelope {
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RouteStat {
    pub route_id: i64,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub total_tests: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RouteStatsEnvelope {
    #[serde(default)]
    pub routes: Vec<RouteStat>,
}

// --- tests ---

/// The JSON document describing one API test.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestBody {
    #[serde(default)]
    pub test_name: String,
    #[serde(default = "default_method")]
    pub request_method: String,
    #[serde(default = "empty_object")]
    pub request_headers: Value,
    #[serde(default = "empty_object")]
    pub request_body: Value,
    #[serde(default = "default_status")]
    pub expected_status_code: u16,
    #[serde(default = "empty_object")]
    pub expected_response_body: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn default_status() -> u16 {
    200
}

impl Default for TestBody {
    fn default() -> Self {
        Self {
            test_name: String::new(),
            request_method: default_method(),
            request_headers: empty_object(),
            request_body: empty_object(),
            expected_status_code: default_status(),
            expected_response_body: empty_object(),
        }
    }
}

impl TestBody {
    pub fn display_name(&self) -> &str {
        if self.test_name.trim().is_empty() {
            "Untitled Test"
        } else {
            &self.test_name
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestStatus {
    #[default]
    Loading,
    NotRun,
    Passed,
    Failed,
}

impl TestStatus {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestCase {
    pub id: i64,
    #[serde(default, alias = "route_id")]
    pub route: Option<i64>,
    /// Stored verbatim; the backend does not enforce the [`TestBody`] shape.
    #[serde(default = "empty_object")]
    pub body: Value,
    #[serde(skip)]
    pub status: TestStatus,
}

impl TestCase {
    pub fn display_name(&self) -> &str {
        match self.body.get("test_name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name,
            _ => "Untitled Test",
        }
    }

    pub fn request_method(&self) -> &str {
        self.body
            .get("request_method")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
    }

    /// Accepts numbers and numeric strings.
    pub fn expected_status(&self) -> Option<u16> {
        match self.body.get("expected_status_code")? {
            Value::Number(n) => n.as_u64().and_then(|s| u16::try_from(s).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestsEnvelope {
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestEdit {
    pub test: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestStatusResponse {
    #[serde(default)]
    pub has_run: bool,
    #[serde(default)]
    pub passed: bool,
}

impl TestStatusResponse {
    pub fn status(&self) -> TestStatus {
        if self.has_run {
            TestStatus::from_passed(self.passed)
        } else {
            TestStatus::NotRun
        }
    }
}

/// Outcome of executing one test, from either run endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunResult {
    #[serde(default)]
    pub test_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    pub passed: bool,
    #[serde(default)]
    pub expected_status: Option<u16>,
    #[serde(default)]
    pub actual_status: Option<u16>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RunSummary {
    #[serde(default)]
    pub results: Vec<RunResult>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }
}

/// One freshly generated test, as handed from the generation page to the
/// results page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneratedTest {
    #[serde(default)]
    pub project_id: Option<i64>,
    pub route: String,
    #[serde(default)]
    pub method: Option<String>,
    pub body: TestBody,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SaveTestEntry {
    pub route: String,
    pub method: String,
    pub body: TestBody,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SaveTestsRequest {
    pub tests: Vec<SaveTestEntry>,
    pub project_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SavedTestRef {
    pub test_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SaveTestsResponse {
    #[serde(default)]
    pub tests: Vec<SavedTestRef>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GenerateRequest {
    /// Stringified JSON of the generation form.
    pub prompt: String,
}

// --- dashboard ---

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DashboardStats {
    #[serde(default)]
    pub total_tests: u64,
    #[serde(default)]
    pub total_urls: Option<u64>,
    #[serde(default)]
    pub total_projects: Option<u64>,
    #[serde(default)]
    pub total_routes: u64,
    #[serde(default)]
    pub weekly_tests: BTreeMap<String, u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatCard {
    pub label: String,
    pub value: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChartBar {
    /// `YYYY-MM-DD`
    pub day: String,
    pub count: u64,
}

/// What the dashboard renders, and what is cached under `dashboardData`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub stats: Vec<StatCard>,
    #[serde(rename = "chartData")]
    pub chart_data: Vec<ChartBar>,
    pub username: String,
}

impl DashboardView {
    pub fn build(user: &User, stats: &DashboardStats) -> Self {
        let projects = stats.total_projects.or(stats.total_urls).unwrap_or(0);
        Self {
            stats: vec![
                StatCard { label: "Tests".into(), value: stats.total_tests },
                StatCard { label: "Projects".into(), value: projects },
                StatCard { label: "Routes".into(), value: stats.total_routes },
            ],
            // BTreeMap keeps YYYY-MM-DD keys in chronological order
            chart_data: stats
                .weekly_tests
                .iter()
                .map(|(day, count)| ChartBar { day: day.clone(), count: *count })
                .collect(),
            username: user.username.clone(),
        }
    }

    pub fn stat(&self, label: &str) -> Option<u64> {
        self.stats.iter().find(|s| s.label == label).map(|s| s.value)
    }
}

// --- history ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HistoryUrl {
    #[serde(alias = "id")]
    pub url_id: i64,
    pub urlname: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryTestsRequest {
    pub id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConnectionRequest {
    pub url: String,
}
