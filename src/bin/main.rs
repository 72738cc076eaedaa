use clap::Parser;
use fb_auth::clock::SystemClock;
use fb_auth::gate::{GateError, TokenProvider};
use fb_auth::http::client::HttpClient;
use fb_auth::parameters::{
    AuthInputArgs, DEFAULT_READY_TIMEOUT_SECS, DEFAULT_TICK_INTERVAL, LogLevel, OutPutTokenFormat,
    TransportArgs, build_auth_config, build_http_config, load_settings,
};
use fb_auth::signer::Signer;
use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fb-auth-cli")]
/// Acquires a credential and prints it once ready.
struct Cli {
    /// Web API key of the project
    #[arg(long)]
    api_key: Option<String>,

    /// Options selecting the auth mode, anonymous when none is provided.
    #[command(flatten)]
    input_auth_args: AuthInputArgs,

    /// Create the account (anonymous without --email/--password) instead of signing in
    #[arg(long, requires = "api_key")]
    sign_up: bool,

    /// JSON file with the signer settings (retries, backoff, endpoints, scopes)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Base url replacing every identity endpoint, e.g. a local emulator
    #[arg(long)]
    endpoint_base: Option<String>,

    #[command(flatten)]
    transport_args: TransportArgs,

    /// Seconds to wait for the credential before giving up
    #[arg(long, default_value_t = DEFAULT_READY_TIMEOUT_SECS)]
    timeout: u64,

    /// Select format how the credential should be printed
    #[arg(long, value_enum, default_value_t = OutPutTokenFormat::Plain)]
    output_token_format: OutPutTokenFormat,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(cli.log_level))
        .with_writer(std::io::stderr)
        .init();

    let config = build_auth_config(cli.api_key.clone(), &cli.input_auth_args)?;
    let settings = load_settings(cli.settings.as_deref(), cli.endpoint_base.as_deref())?;
    let http_client = HttpClient::new(build_http_config(cli.transport_args)?)
        .map_err(|e| format!("error creating http client: {e}"))?;

    let signer = Signer::new(http_client, SystemClock, settings);
    signer.begin(&config);

    if cli.sign_up {
        let email = cli.input_auth_args.email.as_deref().unwrap_or_default();
        let password = cli.input_auth_args.password.as_deref().unwrap_or_default();
        signer.sign_up(email, password)?;
        info!("account created");
    }

    let deadline = Instant::now() + Duration::from_secs(cli.timeout);
    while !signer.handle_token() {
        match signer.bearer() {
            Err(GateError::Auth(err)) => return Err(err.into()),
            _ if Instant::now() >= deadline => {
                return Err(format!("credential not ready after {}s", cli.timeout).into());
            }
            _ => thread::sleep(DEFAULT_TICK_INTERVAL),
        }
    }

    let credential = signer.credential();
    match cli.output_token_format {
        OutPutTokenFormat::Plain => {
            println!("{}", credential.token());
        }
        OutPutTokenFormat::Json => {
            let output = serde_json::to_string_pretty(&credential)?;
            println!("{}", output);
        }
    }
    Ok(())
}
