//! Seed script for a running backend
//!
//! Signs up (or logs in) a demo user, creates a demo project and saves a
//! small batch of tests under it.
//! Run: cargo run --bin seed_project [tests.json]
//! An optional JSON file holds an array of `{route, method, body}` entries.
//! Honours APITEST_BASE_URL / APITEST_STATE_DIR like the CLI.

use apitest_client::config::ClientConfig;
use apitest_client::form::{LoginForm, ProjectForm, RegisterForm};
use apitest_client::models::{SaveTestEntry, SaveTestsRequest, TestBody};
use apitest_client::{logging, pages, AppContext};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEMO_USER: &str = "demo";
const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "demo-password";
const DEMO_PROJECT: &str = "Demo Shop";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    let _guard = logging::init(&config);
    let ctx = AppContext::from_config(config);
    let cancel = CancellationToken::new();

    let register = RegisterForm {
        username: DEMO_USER.into(),
        email: DEMO_EMAIL.into(),
        password: DEMO_PASSWORD.into(),
    };
    if let Err(e) = pages::register(&ctx, &register).await {
        // Already registered on a previous run
        warn!(error = %e, "signup failed, trying login");
        let login = LoginForm {
            email: DEMO_EMAIL.into(),
            password: DEMO_PASSWORD.into(),
        };
        pages::login(&ctx, &login).await?;
    }

    let api = ctx.mount(cancel.clone())?;
    let project = match api
        .projects_with_stats()
        .await?
        .into_iter()
        .find(|p| p.name == DEMO_PROJECT)
    {
        Some(project) => project,
        None => {
            let form = ProjectForm {
                project_name: DEMO_PROJECT.into(),
                business_logic: "Customers browse items and check out".into(),
                project_url: "http://localhost:3000".into(),
            };
            pages::create_project(&ctx, &cancel, &form).await?;
            api.projects_with_stats()
                .await?
                .into_iter()
                .find(|p| p.name == DEMO_PROJECT)
                .ok_or("created project not listed")?
        }
    };
    info!(project_id = project.id, "using project");

    let tests = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str::<Vec<SaveTestEntry>>(&text)?
        }
        None => sample_tests(),
    };
    let count = tests.len();
    let saved = api
        .save_tests(&SaveTestsRequest {
            tests,
            project_id: project.id,
        })
        .await?;
    ctx.invalidate_routes(project.id)?;
    ctx.invalidate_dashboard()?;

    println!(
        "Seeded project {} ({}) with {}/{} tests",
        project.name,
        project.id,
        saved.tests.len(),
        count
    );
    Ok(())
}

/// One test per common route shape.
fn sample_tests() -> Vec<SaveTestEntry> {
    vec![
        SaveTestEntry {
            route: "/items".into(),
            method: "GET".into(),
            body: TestBody {
                test_name: "lists items".into(),
                expected_response_body: json!({ "items": [] }),
                ..Default::default()
            },
        },
        SaveTestEntry {
            route: "/items".into(),
            method: "POST".into(),
            body: TestBody {
                test_name: "creates an item".into(),
                request_method: "POST".into(),
                request_body: json!({ "name": "mug", "price": 9 }),
                expected_status_code: 201,
                ..Default::default()
            },
        },
        SaveTestEntry {
            route: "/checkout".into(),
            method: "POST".into(),
            body: TestBody {
                test_name: "rejects empty cart".into(),
                request_method: "POST".into(),
                request_body: json!({ "items": [] }),
                expected_status_code: 400,
                expected_response_body: json!({ "detail": "cart is empty" }),
                ..Default::default()
            },
        },
    ]
}
