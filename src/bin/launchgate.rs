use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use launchgate::Interceptor;
use launchgate::config::{InterceptSettings, default_config_path};
use launchgate::descriptor::parse_descriptor;
use launchgate::engine::DefaultDelegate;
use launchgate::handlers::{DryRunLauncher, StaticResolver};
use launchgate::navigation::{NavigationRequest, PageTransition, TransitionKind};
use launchgate::telemetry;
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "launchgate", version, about = "Dry-run navigation interception decisions", long_about = None)]
struct Cli {
    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,

    /// Override the default settings path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one navigation and print the decision as JSON.
    Evaluate(EvaluateArgs),
    /// Parse a URL into a launch descriptor and print it.
    Parse {
        url: String,
    },
    /// Print the effective settings.
    Config,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    url: String,

    #[arg(long)]
    referrer: Option<String>,

    #[arg(long, value_enum, default_value_t = TransitionKind::Link)]
    transition: TransitionKind,

    #[arg(long, action = ArgAction::SetTrue)]
    redirect: bool,

    #[arg(long, action = ArgAction::SetTrue)]
    gesture: bool,

    #[arg(long, action = ArgAction::SetTrue)]
    incognito: bool,

    /// Treat the navigation as delivered by another app's intent.
    #[arg(long, action = ArgAction::SetTrue)]
    from_intent: bool,

    #[arg(long, action = ArgAction::SetTrue)]
    subframe: bool,

    /// JSON handler table used instead of a platform resolver.
    #[arg(long, value_name = "FILE")]
    handlers: Option<PathBuf>,
}

fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    match override_path {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.clone())?;
    let settings = InterceptSettings::load_or_default(&config_path)?;
    telemetry::init_tracing("launchgate", cli.verbose, &settings.traces)?;
    info!(path = %config_path.display(), "using intercept settings");

    match cli.command {
        Command::Evaluate(args) => evaluate(settings, args),
        Command::Parse { url } => {
            let descriptor = parse_descriptor(&url)
                .with_context(|| format!("Unable to parse launch descriptor from {url}"))?;
            let output = json!({
                "descriptor": descriptor,
                "intent_uri": descriptor.to_intent_uri(),
                "browser_fallback_url": descriptor.browser_fallback_url().map(|url| url.to_string()),
                "market_referrer": descriptor.market_referrer(&settings.host_package),
                "store_listing_package": descriptor.store_listing_package(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Config => {
            let output = json!({
                "path": config_path,
                "settings": &settings,
                "audit_log": settings
                    .audit_active()
                    .then(|| settings.resolve_audit_log())
                    .transpose()?,
                "traces": telemetry::trace_report(&settings.traces)?,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn evaluate(settings: InterceptSettings, args: EvaluateArgs) -> Result<()> {
    let resolver = match &args.handlers {
        Some(path) => StaticResolver::load(path)?,
        None => StaticResolver::default(),
    };
    let interceptor = Interceptor::new(
        settings,
        Box::new(resolver),
        Box::new(DryRunLauncher),
        Box::new(DefaultDelegate),
    );

    let mut transition = PageTransition::new(args.transition);
    if args.from_intent {
        transition = transition.with_from_api();
    }
    let mut request = NavigationRequest::new(args.url)
        .with_transition(transition)
        .with_redirect(args.redirect)
        .with_user_gesture(args.gesture)
        .with_incognito(args.incognito)
        .with_main_frame(!args.subframe);
    if let Some(referrer) = args.referrer {
        request = request.with_referrer(referrer);
    }

    let evaluation = interceptor.evaluate_detached(&request);
    let output = json!({
        "rule": evaluation.rule,
        "decision": evaluation.decision,
        "effects": evaluation.effects,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
