use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use log::debug;

use schoolhub::analytics::{attendance_trend, load_overview, AttendanceBand, TrendPeriod};
use schoolhub::directory::{self, AnnouncementFilter, AttendanceSummary, LectureFilter, LectureWindow};
use schoolhub::models::NewProfileFields;
use schoolhub::prelude::*;
use schoolhub::seed::{authorize, DemoSeeder, SeedReport};

#[derive(Parser, Debug)]
#[clap(name = "schoolhub", version)]
#[clap(about = "Role-based school management on a Supabase project", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Email to sign in with
    #[clap(long, env = "SCHOOLHUB_EMAIL", global = true)]
    email: Option<String>,

    /// Password to sign in with
    #[clap(long, env = "SCHOOLHUB_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show whether the project is configured
    Status,
    /// Sign in and show profile, menu and dashboard
    Whoami,
    /// Ask the guard about a page, e.g. /dashboard/students
    Check { path: String },
    /// School-wide counts and the attendance trend
    Overview {
        /// 7, 30 or 90 days
        #[clap(long, default_value = "7")]
        period: TrendPeriod,
    },
    /// List lectures
    Lectures {
        #[clap(long, value_enum, default_value = "today")]
        window: Window,
        #[clap(long, default_value = "")]
        search: String,
    },
    /// List announcements
    Announcements {
        /// Include unpublished drafts
        #[clap(long)]
        drafts: bool,
        #[clap(long, default_value = "")]
        search: String,
    },
    /// Attendance summary for one day (default today)
    Attendance {
        #[clap(long)]
        date: Option<NaiveDate>,
        #[clap(long)]
        class_id: Option<String>,
    },
    /// Create an account with a profile
    SignUp {
        #[clap(long)]
        role: Role,
        #[clap(long)]
        full_name: Option<String>,
        #[clap(long)]
        phone: Option<String>,
    },
    /// Change fields of the signed-in user's profile
    UpdateProfile {
        #[clap(long)]
        full_name: Option<String>,
        #[clap(long)]
        phone: Option<String>,
        #[clap(long)]
        avatar_url: Option<String>,
    },
    /// Load the demo school (development projects or with the setup key)
    SeedDemo {
        #[clap(long, env = "SCHOOLHUB_DEMO_KEY", hide_env_values = true)]
        key: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Window {
    Today,
    Tomorrow,
    Week,
    All,
}

impl From<Window> for LectureWindow {
    fn from(window: Window) -> Self {
        match window {
            Window::Today => LectureWindow::Today,
            Window::Tomorrow => LectureWindow::Tomorrow,
            Window::Week => LectureWindow::ThisWeek,
            Window::All => LectureWindow::All,
        }
    }
}

fn describe(decision: GuardDecision) -> String {
    match decision {
        GuardDecision::Pending => "pending".to_string(),
        GuardDecision::Allow => "allow".to_string(),
        GuardDecision::Redirect(route) => format!("redirect {}", route),
    }
}

fn credentials(cli: &Cli) -> anyhow::Result<(&str, &str)> {
    match (cli.email.as_deref(), cli.password.as_deref()) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => bail!("--email and --password (or SCHOOLHUB_EMAIL / SCHOOLHUB_PASSWORD) are required"),
    }
}

async fn sign_in(app: &App, cli: &Cli) -> anyhow::Result<AuthState> {
    let (email, password) = credentials(cli)?;
    let state = app
        .auth()
        .sign_in(email, password)
        .await
        .with_context(|| format!("Sign-in as {} failed", email))?;
    debug!("Signed in as {:?}", state.user_id());
    Ok(state)
}

/// Signs in and insists the guard lets the user onto `page`.
async fn sign_in_for(app: &App, cli: &Cli, page: Page) -> anyhow::Result<AuthState> {
    let state = sign_in(app, cli).await?;
    match check_page(&state, page) {
        GuardDecision::Allow => Ok(state),
        other => bail!("{} is not available: {}", page, describe(other)),
    }
}

async fn seed_demo(app: &App, key: Option<&str>) -> anyhow::Result<SeedReport> {
    authorize(app.config(), key)?;
    let report = DemoSeeder::new(app.hub()?)?.run().await?;
    Ok(report)
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = ServiceConfig::from_env().context("Invalid configuration")?;
    let app = App::start(config).await?;

    match &cli.command {
        Commands::Status => {
            let state = app.auth().settled().await.unwrap_or_else(|_| app.state());
            match &state.setup {
                SetupStatus::Ready => println!("Configured ({})", app.config().deploy_env),
                SetupStatus::NeedsSetup { missing } => {
                    println!("Setup required, missing: {}", missing.join(", "))
                }
            }
            println!("Entry: {}", describe(entry_route(&state)));
        }
        Commands::Whoami => {
            sign_in(&app, &cli).await?;
            let state = app.state();
            let profile = state
                .profile
                .as_ref()
                .context("Signed in, but no profile row exists for this user")?;
            println!("{} <{}>", profile.display_name(), profile.email);
            println!("Role: {}", profile.role);
            let menu: Vec<&str> = app.navigation().into_iter().map(Page::title).collect();
            println!("Menu: {}", menu.join(", "));
            if let Some(dashboard) = app.dashboard() {
                let view = dashboard.view();
                println!("{}", view.welcome);
                println!("{}", view.subtitle);
                for card in &view.stats {
                    println!("  {}", card);
                }
            }
        }
        Commands::Check { path } => {
            if cli.email.is_some() {
                sign_in(&app, &cli).await?;
            } else {
                app.auth().settled().await?;
            }
            println!("{}: {}", path, describe(app.check_path(path)?));
        }
        Commands::Overview { period } => {
            sign_in_for(&app, &cli, Page::Analytics).await?;
            let overview = load_overview(app.hub()?).await;
            println!("Students:      {}", overview.total_students);
            println!("Teachers:      {}", overview.total_teachers);
            println!("Classes:       {}", overview.total_classes);
            println!("Subjects:      {}", overview.total_subjects);
            println!(
                "Lectures:      {} ({} completed, {} scheduled)",
                overview.total_lectures, overview.completed_lectures, overview.scheduled_lectures
            );
            println!("Announcements: {}", overview.total_announcements);
            println!(
                "Attendance:    {:.1}% ({})",
                overview.attendance_rate,
                AttendanceBand::from_rate(overview.attendance_rate)
            );

            let today = Utc::now().date_naive();
            for point in attendance_trend(*period, today, &mut rand::thread_rng()) {
                println!("  {}  {:.1}%", point.date, point.rate);
            }
        }
        Commands::Lectures { window, search } => {
            sign_in_for(&app, &cli, Page::Lectures).await?;
            let lectures = directory::lectures(app.hub()?).await;
            let filter = LectureFilter {
                window: (*window).into(),
                search: search.clone(),
                ..Default::default()
            };
            for lecture in filter.apply(&lectures, Utc::now().date_naive()) {
                println!(
                    "{} {}-{}  {}  [{}] {}",
                    lecture.scheduled_date,
                    lecture.start_time.format("%H:%M"),
                    lecture.end_time.format("%H:%M"),
                    lecture.title,
                    lecture.subject_name().unwrap_or("-"),
                    lecture.class_name().unwrap_or("-"),
                );
            }
        }
        Commands::Announcements { drafts, search } => {
            sign_in_for(&app, &cli, Page::Announcements).await?;
            let announcements = directory::announcements(app.hub()?).await;
            let filter = AnnouncementFilter {
                published: if *drafts { None } else { Some(true) },
                search: search.clone(),
                ..Default::default()
            };
            for announcement in filter.apply(&announcements) {
                println!(
                    "[{:?}] {} ({:?})",
                    announcement.priority, announcement.title, announcement.target_audience
                );
            }
        }
        Commands::Attendance { date, class_id } => {
            sign_in_for(&app, &cli, Page::Attendance).await?;
            let records = directory::attendance(app.hub()?).await;
            let day = date.unwrap_or_else(|| Utc::now().date_naive());
            let summary = AttendanceSummary::from_records(directory::attendance_on(
                &records,
                day,
                class_id.as_deref(),
                None,
            ));
            println!(
                "{}: {} records, {} present, {} late, {} absent, {} excused, rate {:.1}%",
                day,
                summary.total,
                summary.present,
                summary.late,
                summary.absent,
                summary.excused,
                summary.rate
            );
        }
        Commands::SignUp {
            role,
            full_name,
            phone,
        } => {
            let (email, password) = credentials(&cli)?;
            let fields = NewProfileFields {
                full_name: full_name.clone(),
                role: *role,
                phone: phone.clone(),
            };
            let response = app.auth().sign_up(email, password, fields).await?;
            if response.session().is_some() {
                println!("Account created and signed in as {}", role);
            } else {
                println!("Account created; confirm the email before signing in");
            }
        }
        Commands::UpdateProfile {
            full_name,
            phone,
            avatar_url,
        } => {
            sign_in_for(&app, &cli, Page::Profile).await?;
            let update = ProfileUpdate {
                full_name: full_name.clone(),
                phone: phone.clone(),
                avatar_url: avatar_url.clone(),
            };
            let profile = app.auth().update_profile(update).await?;
            println!("Updated {} at {}", profile.display_name(), profile.updated_at);
        }
        Commands::SeedDemo { key } => {
            let report = seed_demo(&app, key.as_deref()).await?;
            print!("{}", report);
        }
    }

    app.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use schoolhub::config::DeployEnv;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn lectures_default_to_today() {
        let cli = Cli::try_parse_from(["schoolhub", "lectures"]).unwrap();
        match cli.command {
            Commands::Lectures { window, search } => {
                assert_eq!(LectureWindow::from(window), LectureWindow::Today);
                assert!(search.is_empty());
            }
            other => panic!("Expected lectures, got {:?}", other),
        }
    }

    #[test]
    fn seed_demo_goes_through_the_app() {
        let cli = Cli::try_parse_from(["schoolhub", "seed-demo", "--key", "k"]).unwrap();
        assert!(matches!(cli.command, Commands::SeedDemo { key: Some(ref k) } if k == "k"));

        let config = ServiceConfig::default().with_deploy_env(DeployEnv::Development);
        let app = tokio_test::block_on(App::start(config)).unwrap();
        let err = tokio_test::block_on(seed_demo(&app, None)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotConfigured { .. })
        ));
    }

    #[test]
    fn seed_demo_outside_development_needs_the_key() {
        let config = ServiceConfig::default().with_deploy_env(DeployEnv::Production);
        let app = tokio_test::block_on(App::start(config)).unwrap();
        let err = tokio_test::block_on(seed_demo(&app, Some("wrong"))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Unauthorized(_))
        ));
    }
}
