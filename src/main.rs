//! apitest: command-line front end for the API test management backend.
//!
//! Usage:
//!   apitest login --email a@b.com --password secret
//!   apitest dashboard
//!   apitest routes list 3
//!   apitest tests run 17

use std::fs;
use std::io::{self, BufRead, Read, Write};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use apitest_client::auth::GuardOutcome;
use apitest_client::cache::CacheMode;
use apitest_client::collection::{run_test, Confirm, RouteTestBrowser, RunTracker};
use apitest_client::config::ClientConfig;
use apitest_client::form::{
    parse_test_json, AccountEditForm, AccountField, Form, GenerateTestsForm, LoginForm,
    ManualTestForm, ProjectForm, RegisterForm,
};
use apitest_client::logging::{self, token_preview};
use apitest_client::models::{ProjectEdit, RouteEdit, RunSummary, TestStatus};
use apitest_client::pages::{self, AccountPage, LoadState, ProjectsPage, RoutesPage};
use apitest_client::storage::{keys, StoreExt};
use apitest_client::AppContext;

#[derive(Parser)]
#[command(name = "apitest")]
#[command(about = "Client for the API test management backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL
    #[arg(long, global = true, env = "APITEST_BASE_URL")]
    url: Option<String>,

    /// Directory for the token, selections and cache
    #[arg(long, global = true, env = "APITEST_STATE_DIR")]
    state_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    Signup {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    /// Show the stored session
    Whoami,
    Dashboard {
        /// Ignore the cached dashboard
        #[arg(long)]
        refresh: bool,
    },
    #[command(subcommand)]
    Projects(ProjectCommands),
    #[command(subcommand)]
    Routes(RouteCommands),
    #[command(subcommand)]
    Tests(TestCommands),
    /// Generate tests for one endpoint and keep them for `save-generated`
    Generate(GenerateArgs),
    /// Save the last generated batch under the selected project
    SaveGenerated {
        #[arg(short, long)]
        project: Option<i64>,
    },
    /// Previously tested URLs, or the tests of one of them
    History {
        #[arg(long)]
        url_id: Option<i64>,
    },
    /// Ask the backend whether it can reach a URL
    TestConnection {
        #[arg(long)]
        target: String,
    },
    #[command(subcommand)]
    Account(AccountCommands),
}

#[derive(Subcommand)]
enum ProjectCommands {
    List {
        /// Refresh every project's pass rate
        #[arg(long)]
        pass_rates: bool,
    },
    Create(ProjectArgs),
    Edit {
        id: i64,
        #[command(flatten)]
        fields: ProjectArgs,
    },
    Delete {
        id: i64,
        #[arg(short, long)]
        yes: bool,
    },
    Select {
        id: i64,
    },
}

#[derive(Args)]
struct ProjectArgs {
    #[arg(short, long)]
    name: String,
    #[arg(short, long)]
    description: String,
    #[arg(long = "project-url")]
    project_url: String,
}

#[derive(Subcommand)]
enum RouteCommands {
    List {
        project: i64,
        #[arg(long)]
        refresh: bool,
    },
    Edit {
        project: i64,
        id: i64,
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
    },
    Delete {
        project: i64,
        id: i64,
        #[arg(short, long)]
        yes: bool,
    },
    /// Run every test of a route
    Run {
        project: i64,
        id: i64,
    },
}

#[derive(Subcommand)]
enum TestCommands {
    List {
        route: i64,
    },
    /// Replace a test with JSON read from a file or stdin
    Edit {
        route: i64,
        id: i64,
        #[arg(short, long)]
        file: Option<String>,
    },
    Delete {
        route: i64,
        id: i64,
        #[arg(short, long)]
        project: Option<i64>,
        #[arg(short, long)]
        yes: bool,
    },
    Run {
        id: i64,
    },
    Status {
        id: i64,
    },
    /// Add one test by hand to a route of the selected project
    Add {
        route: i64,
        #[arg(short, long)]
        name: String,
        /// Request JSON: optional method, headers, body
        #[arg(long, default_value = "{}")]
        request: String,
        /// Expected response JSON: optional status and body
        #[arg(long)]
        response: String,
    },
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long)]
    api_url: String,
    #[arg(long)]
    request_format: String,
    #[arg(long)]
    business_logic: String,
    #[arg(long, default_value = "")]
    test_case: String,
}

#[derive(Subcommand)]
enum AccountCommands {
    Show,
    Set { field: FieldArg, value: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum FieldArg {
    Username,
    Email,
    Password,
}

impl From<FieldArg> for AccountField {
    fn from(f: FieldArg) -> Self {
        match f {
            FieldArg::Username => AccountField::Username,
            FieldArg::Email => AccountField::Email,
            FieldArg::Password => AccountField::Password,
        }
    }
}

fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

struct StdinConfirm {
    assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", prompt);
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

fn loaded<T>(state: LoadState<T>) -> Result<T> {
    match state {
        LoadState::Loaded(value) => Ok(value),
        LoadState::Redirect(nav) => {
            bail!("not signed in or session expired; run `apitest login` ({})", nav.path())
        }
        LoadState::LoadError(msg) => bail!("{msg}"),
        LoadState::Loading => bail!("cancelled"),
    }
}

fn status_label(status: TestStatus) -> colored::ColoredString {
    match status {
        TestStatus::Passed => "passed".green(),
        TestStatus::Failed => "failed".red(),
        TestStatus::NotRun => "not run".yellow(),
        TestStatus::Loading => "loading".dimmed(),
    }
}

const CHART_WIDTH: u64 = 40;

/// Bar scaled so the busiest day spans the chart width; non-zero days get
/// at least one cell.
fn chart_bar(count: u64, max: u64) -> String {
    if count == 0 || max == 0 {
        return String::new();
    }
    let cells = (count as u128 * CHART_WIDTH as u128 / max as u128).clamp(1, CHART_WIDTH as u128);
    "▇".repeat(cells as usize)
}

fn print_summary(summary: &RunSummary) {
    for r in &summary.results {
        let mark = if r.passed { "✓".green() } else { "✗".red() };
        let name = r.name.as_deref().unwrap_or("Untitled Test");
        match (&r.error, r.expected_status, r.actual_status) {
            (Some(err), _, _) => println!("{mark} {name}: {err}"),
            (None, Some(exp), Some(act)) => println!("{mark} {name} (expected {exp}, got {act})"),
            _ => println!("{mark} {name}"),
        }
    }
    println!("{}/{} passed", summary.passed(), summary.results.len());
}

fn read_text(file: &Option<String>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}")),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.url {
        config = config.with_base_url(url)?;
    }
    if let Some(dir) = &cli.state_dir {
        config = config.with_state_dir(dir);
    }
    let _log_guard = logging::init(&config);

    let ctx = AppContext::from_config(config);

    // Ctrl-C abandons in-flight requests
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Signup { username, email, password } => {
            let form = RegisterForm { username, email, password };
            pages::register(&ctx, &form).await?;
            print_success("Account created, token saved");
        }
        Commands::Login { email, password } => {
            let form = LoginForm { email, password };
            pages::login(&ctx, &form).await?;
            print_success("Logged in, token saved");
        }
        Commands::Logout => {
            pages::logout(&ctx)?;
            print_success("Logged out");
        }
        Commands::Whoami => match ctx.guard().check()? {
            GuardOutcome::Proceed(session) => {
                println!("{}: {}", "Token".cyan(), token_preview(&session.token));
                match session.exp {
                    Some(exp) => {
                        let when = chrono::DateTime::<chrono::Utc>::from_timestamp(exp as i64, 0)
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| exp.to_string());
                        println!("{}: {}", "Expires".cyan(), when);
                    }
                    None => println!("{}: never", "Expires".cyan()),
                }
            }
            GuardOutcome::Redirect { reason, .. } => bail!("no valid session ({reason:?})"),
        },
        Commands::Dashboard { refresh } => {
            let mode = if refresh { CacheMode::Refresh } else { CacheMode::ReadThrough };
            let view = loaded(pages::load_dashboard(&ctx, &cancel, mode).await)?;
            println!("{} {}", "Welcome,".cyan(), view.username);
            for card in &view.stats {
                println!("  {:<10} {}", card.label, card.value);
            }
            let max = view.chart_data.iter().map(|b| b.count).max().unwrap_or(0);
            for bar in &view.chart_data {
                println!("  {}  {} {}", bar.day, chart_bar(bar.count, max), bar.count);
            }
        }
        Commands::Projects(cmd) => projects(&ctx, &cancel, cmd).await?,
        Commands::Routes(cmd) => routes(&ctx, &cancel, cmd).await?,
        Commands::Tests(cmd) => tests(&ctx, &cancel, cmd).await?,
        Commands::Generate(args) => {
            let form = GenerateTestsForm {
                api_url: args.api_url,
                request_format: args.request_format,
                business_logic: args.business_logic,
                test_case: args.test_case,
            };
            pages::generate_tests(&ctx, &cancel, &form).await?;
            let generated = pages::generated_tests(&ctx)?;
            for t in &generated {
                let method = t.method.as_deref().unwrap_or(&t.body.request_method);
                println!("  {} {} {}", method.cyan(), t.route, t.body.display_name());
            }
            print_success(&format!("{} tests generated; run `apitest save-generated` to keep them", generated.len()));
        }
        Commands::SaveGenerated { project } => {
            if let Some(id) = project {
                ctx.persisted.set_as(keys::SELECTED_PROJECT_ID, &id)?;
            }
            let resp = pages::save_generated_tests(&ctx, &cancel).await?;
            print_success(&format!("Saved {} tests", resp.tests.len()));
        }
        Commands::History { url_id } => {
            let api = ctx.mount(cancel.clone())?;
            match url_id {
                Some(id) => {
                    for test in api.history_tests(id).await? {
                        print_json(&test);
                    }
                }
                None => {
                    for url in api.history_urls().await? {
                        println!("{:>5}  {}", url.url_id, url.urlname);
                    }
                }
            }
        }
        Commands::TestConnection { target } => {
            let form = ProjectForm { project_url: target, ..Default::default() };
            let resp = pages::test_connection(&ctx, &cancel, &form).await?;
            print_json(&resp);
        }
        Commands::Account(cmd) => {
            let mut page = loaded(AccountPage::open(&ctx, &cancel).await)?;
            match cmd {
                AccountCommands::Show => {}
                AccountCommands::Set { field, value } => {
                    let form = AccountEditForm { field: field.into(), value };
                    page.update(&ctx, &form).await?;
                    print_success(&format!("Updated {}", form.field.name()));
                }
            }
            println!("{}: {}", "Username".cyan(), page.user.username);
            println!("{}: {}", "Email".cyan(), page.user.email);
        }
    }

    Ok(())
}

async fn projects(ctx: &AppContext, cancel: &CancellationToken, cmd: ProjectCommands) -> Result<()> {
    match &cmd {
        ProjectCommands::Create(args) => {
            let mut form = ProjectForm::default();
            form.set_field("projectName", &args.name)?;
            form.set_field("businessLogic", &args.description)?;
            form.set_field("projectUrl", &args.project_url)?;
            pages::create_project(ctx, cancel, &form).await?;
            print_success(&format!("Created project {}", args.name.cyan()));
            return Ok(());
        }
        ProjectCommands::Select { id } => {
            ctx.persisted.set_as(keys::SELECTED_PROJECT_ID, id)?;
            print_success(&format!("Selected project {id}"));
            return Ok(());
        }
        _ => {}
    }

    let mut page = loaded(ProjectsPage::open(ctx, cancel).await)?;
    match cmd {
        ProjectCommands::List { pass_rates } => {
            if pass_rates {
                page.refresh_pass_rates().await?;
            }
            for p in page.editor.items() {
                println!(
                    "{:>5}  {:<24} {:>4} tests  {:>5.1}%  {}",
                    p.id, p.name, p.total_tests, p.pass_percentage, p.project_url
                );
            }
        }
        ProjectCommands::Edit { id, fields } => {
            let edit = ProjectEdit {
                name: fields.name,
                description: fields.description,
                project_url: fields.project_url,
            };
            page.edit(ctx, id, &edit).await?;
            print_success(&format!("Updated project {id}"));
        }
        ProjectCommands::Delete { id, yes } => {
            if page.delete(ctx, id, &StdinConfirm { assume_yes: yes }).await? {
                print_success(&format!("Deleted project {id}"));
            }
        }
        ProjectCommands::Create(_) | ProjectCommands::Select { .. } => {}
    }
    Ok(())
}

async fn routes(ctx: &AppContext, cancel: &CancellationToken, cmd: RouteCommands) -> Result<()> {
    let (project, refresh) = match &cmd {
        RouteCommands::List { project, refresh } => (*project, *refresh),
        RouteCommands::Edit { project, .. }
        | RouteCommands::Delete { project, .. }
        | RouteCommands::Run { project, .. } => (*project, false),
    };
    let mode = if refresh { CacheMode::Refresh } else { CacheMode::ReadThrough };
    let mut page = loaded(RoutesPage::open(ctx, cancel, project, mode).await)?;

    match cmd {
        RouteCommands::List { .. } => {
            println!("{} {}", "Project:".cyan(), page.project_name);
            for r in page.routes() {
                println!(
                    "{:>5}  {:<7} {:<32} {:>4} tests  {:>5.1}%",
                    r.id, r.method, r.routename, r.total_tests, r.pass_percentage
                );
            }
        }
        RouteCommands::Edit { id, name, method, .. } => {
            page.edit(ctx, id, &RouteEdit { routename: name, method }).await?;
            print_success(&format!("Updated route {id}"));
        }
        RouteCommands::Delete { id, yes, .. } => {
            if page.delete(ctx, id, &StdinConfirm { assume_yes: yes }).await? {
                print_success(&format!("Deleted route {id}"));
            }
        }
        RouteCommands::Run { id, .. } => {
            let tracker = RunTracker::new();
            let summary = page.run(ctx, &tracker, id).await?;
            print_summary(&summary);
        }
    }
    Ok(())
}

async fn tests(ctx: &AppContext, cancel: &CancellationToken, cmd: TestCommands) -> Result<()> {
    match cmd {
        TestCommands::List { route } => {
            let (_, editor) = loaded(pages::open_route_tests(ctx, cancel, route).await)?;
            for t in editor.items() {
                println!(
                    "{:>5}  {:<7} {:<32} {}",
                    t.id,
                    t.request_method(),
                    t.display_name(),
                    status_label(t.status)
                );
            }
        }
        TestCommands::Edit { route, id, file } => {
            let body = parse_test_json(&read_text(&file)?)?;
            let (api, mut editor) = loaded(pages::open_route_tests(ctx, cancel, route).await)?;
            editor.edit(&api, id, &body).await?;
            print_success(&format!("Updated test {id}"));
        }
        TestCommands::Delete { route, id, project, yes } => {
            let project = match project {
                Some(p) => p,
                None => ctx
                    .persisted
                    .get_id(keys::SELECTED_PROJECT_ID)?
                    .context("no project selected; pass --project")?,
            };
            let page = loaded(RoutesPage::open(ctx, cancel, project, CacheMode::ReadThrough).await)?;
            let mut browser = RouteTestBrowser::new(page.routes());
            browser.select_route(&page.api, route).await?;
            if browser.delete_test(&page.api, id, &StdinConfirm { assume_yes: yes }).await? {
                ctx.invalidate_routes(project)?;
                print_success(&format!("Deleted test {id}"));
                if browser.selected_route().is_none() {
                    println!("Route {route} has no tests left");
                }
            }
        }
        TestCommands::Run { id } => {
            let api = ctx.mount(cancel.clone())?;
            let result = run_test(&api, &RunTracker::new(), id).await?;
            print_summary(&RunSummary { results: vec![result] });
        }
        TestCommands::Status { id } => {
            let api = ctx.mount(cancel.clone())?;
            println!("{}", status_label(api.test_status(id).await?));
        }
        TestCommands::Add { route, name, request, response } => {
            let project = ctx
                .persisted
                .get_id(keys::SELECTED_PROJECT_ID)?
                .context("no project selected; run `apitest projects select <id>`")?;
            let page = loaded(RoutesPage::open(ctx, cancel, project, CacheMode::ReadThrough).await)?;
            let route = page
                .routes()
                .iter()
                .find(|r| r.id == route)
                .cloned()
                .with_context(|| format!("route {route} not found in project {project}"))?;
            let form = ManualTestForm {
                test_name: name,
                request_body: request,
                response_body: response,
                route: Some(route),
            };
            let resp = pages::save_manual_test(ctx, cancel, &form).await?;
            print_success(&format!("Saved {} test(s)", resp.tests.len()));
        }
    }
    Ok(())
}
