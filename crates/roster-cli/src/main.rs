// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use roster_app::{AppState, RegistrationFormInput, RetreatId, WriteFailure};
use roster_db::{Store, classify_write_error};
use runtime::DbRuntime;
use std::env;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

const DEMO_SEED: u64 = 2026;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `roster --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    init_tracing(config.log_level(), &config.log_path()?)?;

    let store = Store::open(&db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or ROSTER_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;

    let identity = config.identity();
    info!(user = %identity.user_id, admin = identity.is_admin, "session identity");
    if options.demo {
        runtime::seed_demo_data(&store, &identity, DEMO_SEED)?;
    }

    if let Some(request) = &options.registration {
        let message = register(&store, request)?;
        println!("{message}");
        return Ok(());
    }

    let poll_interval = config.poll_interval()?;
    if options.check_only {
        return Ok(());
    }

    let mut state = AppState::default();
    let mut runtime = DbRuntime::new(&store, identity);
    if !options.demo {
        runtime = runtime.with_background(db_path, poll_interval);
    }
    roster_tui::run_app(&mut state, &mut runtime, config.history_depth())
}

fn init_tracing(level: &str, log_path: &Path) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = env::var("RUST_LOG").map_or_else(|_| EnvFilter::new(level), EnvFilter::new);

    if let Some(parent) = log_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| {
            format!(
                "open log file {} -- set [log].file to a writable path and retry",
                log_path.display()
            )
        })?;

    fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))?;
    Ok(())
}

/// Runs the public self-service registration and returns the line to print.
fn register(store: &Store, request: &RegistrationRequest) -> Result<String> {
    let form = RegistrationFormInput {
        retreat_id: RetreatId::new(request.retreat_id),
        name: request.name.clone(),
        email: request.email.clone(),
        phone: request.phone.clone(),
        dietary: request.dietary.clone(),
    };
    form.validate()?;

    let registration = store
        .register_participant(&form)
        .map_err(|error| match classify_write_error(&error) {
            WriteFailure::Duplicate(_) => anyhow!(
                "{} is already registered for retreat {} -- use a different email",
                form.email.trim(),
                form.retreat_id
            ),
            _ => error,
        })?;

    Ok(format!(
        "registered {} as {} (participant {})",
        form.name.trim(),
        registration.status.label(),
        registration.participant_id
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct RegistrationRequest {
    retreat_id: i64,
    name: String,
    email: String,
    phone: String,
    dietary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    registration: Option<RegistrationRequest>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        registration: None,
    };
    let mut registration_fields = RegistrationRequest::default();
    let mut registration_field_flag: Option<&'static str> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let flag = arg.as_ref();
        match flag {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            "--register" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--register requires a retreat id"))?;
                let raw = value.as_ref();
                let retreat_id = raw.parse::<i64>().map_err(|_| {
                    anyhow!("--register expects a numeric retreat id, got {raw:?}")
                })?;
                options.registration = Some(RegistrationRequest::default());
                registration_fields.retreat_id = retreat_id;
            }
            "--name" | "--email" | "--phone" | "--dietary" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("{flag} requires a value"))?;
                let value = value.as_ref().to_owned();
                let (name, slot) = match flag {
                    "--name" => ("--name", &mut registration_fields.name),
                    "--email" => ("--email", &mut registration_fields.email),
                    "--phone" => ("--phone", &mut registration_fields.phone),
                    _ => ("--dietary", &mut registration_fields.dietary),
                };
                *slot = value;
                if registration_field_flag.is_none() {
                    registration_field_flag = Some(name);
                }
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    match (&mut options.registration, registration_field_flag) {
        (Some(registration), _) => *registration = registration_fields,
        (None, Some(flag)) => {
            return Err(anyhow!(
                "{flag} is only valid together with --register <retreat-id>"
            ));
        }
        (None, None) => {}
    }

    Ok(options)
}

fn print_help() {
    println!("roster");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch with seeded demo data (in-memory)");
    println!("  --check                  Validate config + DB and exit");
    println!("  --register <retreat-id>  Public registration; needs --name and --email");
    println!("      --name <name>        Registrant name");
    println!("      --email <email>      Registrant email");
    println!("      --phone <phone>      Optional phone number");
    println!("      --dietary <list>     Optional dietary needs, comma separated");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, RegistrationRequest, parse_cli_args, register};
    use anyhow::Result;
    use roster_app::RetreatStatus;
    use roster_db::{NewRetreat, Store};
    use std::path::PathBuf;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/roster-config.toml")
    }

    fn store_with_retreat(capacity: i64, status: RetreatStatus) -> Result<(Store, i64)> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let retreat_id = store.create_retreat(&NewRetreat {
            name: "Forest Weekend".to_owned(),
            date_range: "Jun 5-7".to_owned(),
            location: "Aspen Camp".to_owned(),
            capacity,
            chat_link: None,
            status,
            owner_id: "local".to_owned(),
        })?;
        Ok((store, retreat_id.get()))
    }

    fn request(retreat_id: i64, name: &str, email: &str) -> RegistrationRequest {
        RegistrationRequest {
            retreat_id,
            name: name.to_owned(),
            email: email.to_owned(),
            phone: String::new(),
            dietary: "vegan".to_owned(),
        }
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                print_config_path: false,
                print_db_path: false,
                demo: false,
                print_example: false,
                check_only: false,
                show_help: false,
                registration: None,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_config_value() {
        let error = parse_cli_args(vec!["--config"], default_options_path())
            .expect_err("missing config value should fail");
        assert!(error.to_string().contains("--config requires a file path"));
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_sets_print_demo_and_check_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-path", "--demo", "--check", "-h"],
            default_options_path(),
        )?;
        assert!(options.print_db_path);
        assert!(options.demo);
        assert!(options.check_only);
        assert!(options.show_help);
        assert!(!options.print_example);
        Ok(())
    }

    #[test]
    fn parse_cli_args_collects_registration_in_any_order() -> Result<()> {
        let options = parse_cli_args(
            vec![
                "--email",
                "kai@example.com",
                "--register",
                "3",
                "--name",
                "Kai Reed",
                "--dietary",
                "vegan, other:no onion",
            ],
            default_options_path(),
        )?;
        assert_eq!(
            options.registration,
            Some(RegistrationRequest {
                retreat_id: 3,
                name: "Kai Reed".to_owned(),
                email: "kai@example.com".to_owned(),
                phone: String::new(),
                dietary: "vegan, other:no onion".to_owned(),
            })
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_rejects_registration_fields_without_register() {
        let error = parse_cli_args(vec!["--name", "Kai"], default_options_path())
            .expect_err("--name alone should fail");
        assert!(error.to_string().contains("only valid together with --register"));

        let error = parse_cli_args(vec!["--register", "spring"], default_options_path())
            .expect_err("non-numeric id should fail");
        assert!(error.to_string().contains("numeric retreat id"));
    }

    #[test]
    fn register_accepts_then_waitlists_at_capacity() -> Result<()> {
        let (store, retreat_id) = store_with_retreat(1, RetreatStatus::Open)?;
        let first = register(&store, &request(retreat_id, "Kai Reed", "kai@example.com"))?;
        assert!(first.starts_with("registered Kai Reed as pending"));

        let second = register(&store, &request(retreat_id, "Rowan Hill", "rowan@example.com"))?;
        assert!(second.contains("as waitlist"));
        Ok(())
    }

    #[test]
    fn register_reports_duplicates_and_closed_retreats() -> Result<()> {
        let (store, retreat_id) = store_with_retreat(5, RetreatStatus::Open)?;
        register(&store, &request(retreat_id, "Kai Reed", "kai@example.com"))?;
        let error = register(&store, &request(retreat_id, "Kai R", "KAI@example.com"))
            .expect_err("duplicate email should fail");
        assert!(error.to_string().contains("already registered"));

        let (closed, closed_id) = store_with_retreat(5, RetreatStatus::Closed)?;
        let error = register(&closed, &request(closed_id, "Kai Reed", "kai@example.com"))
            .expect_err("closed retreat should refuse");
        assert!(format!("{error:#}").contains("not accepting registrations"));

        let error = register(&closed, &request(closed_id, " ", "kai@example.com"))
            .expect_err("blank name should fail");
        assert!(error.to_string().contains("name is required"));
        Ok(())
    }
}
