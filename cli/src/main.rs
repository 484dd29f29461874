use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use donation_portal::api::emergency::triage;
use donation_portal::config::{ConfigError, PortalConfig};
use donation_portal::forms::{
    AppointmentForm, BlogForm, DeferralReasonForm, EmergencyRequestForm, HospitalForm, LoginForm, RegisterForm,
    ResetPasswordForm,
};
use donation_portal::ingest::{EncodeMode, ImageIngestor, ObjectUrlRegistry, SelectedFile};
use donation_portal::models::Urgency;
use donation_portal::{ApiClient, ApiError, SessionStore};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{}", api_message(.0))]
    Api(#[from] ApiError),
    #[error("could not encode image {path}: {reason}")]
    Image { path: String, reason: String },
    #[error("not signed in")]
    NotSignedIn,
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "E_CONFIG",
            Self::Api(err) => err.error_code(),
            Self::Image { .. } => "E_IMAGE",
            Self::NotSignedIn => "E_NOT_SIGNED_IN",
            Self::Json(_) => "E_JSON",
        }
    }
}

/// Validation failures keep their per-field reasons after the generic text.
fn api_message(err: &ApiError) -> String {
    match err {
        ApiError::Validation(errors) => format!("{}: {errors}", err.user_message()),
        _ => err.user_message(),
    }
}

#[derive(Parser, Debug)]
#[command(name = "donation-cli", about = "Blood-donation portal API client")]
struct Cli {
    #[arg(long, env = "DONATION_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "DONATION_SESSION_PATH")]
    session_path: Option<PathBuf>,

    #[arg(long, env = "DONATION_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "DONATION_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    Whoami,
    Register(RegisterArgs),
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    ResetPassword(ResetPasswordArgs),
    Hospital(HospitalCommand),
    Blog(BlogCommand),
    Deferral(DeferralCommand),
    Emergency(EmergencyCommand),
    Appointment(AppointmentCommand),
    Image(ImageCommand),
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    confirm_password: String,
    #[arg(long)]
    full_name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    blood_type: Option<String>,
    #[arg(long, help = "Date of birth, YYYY-MM-DD")]
    date_of_birth: Option<String>,
}

#[derive(Args, Debug)]
struct ResetPasswordArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    token: String,
    #[arg(long)]
    new_password: String,
    #[arg(long)]
    confirm_password: String,
}

#[derive(Args, Debug)]
struct HospitalCommand {
    #[command(subcommand)]
    command: HospitalSubcommand,
}

#[derive(Subcommand, Debug)]
enum HospitalSubcommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Args, Debug)]
struct BlogCommand {
    #[command(subcommand)]
    command: BlogSubcommand,
}

#[derive(Args, Debug)]
struct BlogFields {
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
    #[arg(long, help = "Cover image file, sent as a base64 data URI")]
    image: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum BlogSubcommand {
    List,
    Create(BlogFields),
    Update {
        id: i64,
        #[command(flatten)]
        fields: BlogFields,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct DeferralCommand {
    #[command(subcommand)]
    command: DeferralSubcommand,
}

#[derive(Args, Debug)]
struct DeferralFields {
    #[arg(long)]
    description: String,
    #[arg(long, default_value_t = 0)]
    days: u32,
    #[arg(long, default_value_t = false)]
    permanent: bool,
}

#[derive(Subcommand, Debug)]
enum DeferralSubcommand {
    List,
    Create {
        #[arg(long)]
        code: String,
        #[command(flatten)]
        fields: DeferralFields,
    },
    Update {
        code: String,
        #[command(flatten)]
        fields: DeferralFields,
    },
    Delete {
        code: String,
    },
}

#[derive(Args, Debug)]
struct EmergencyCommand {
    #[command(subcommand)]
    command: EmergencySubcommand,
}

#[derive(Subcommand, Debug)]
enum EmergencySubcommand {
    Register {
        #[arg(long)]
        patient_name: String,
        #[arg(long)]
        blood_type: String,
        #[arg(long)]
        units: u32,
        #[arg(long)]
        hospital: String,
        #[arg(long)]
        phone: String,
        #[arg(long, default_value = "medium")]
        urgency: Urgency,
        #[arg(long)]
        note: Option<String>,
    },
    /// All requests (staff only), optionally in triage order.
    List {
        #[arg(long, default_value_t = false)]
        triage: bool,
    },
    Mine,
    Fulfill {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct AppointmentCommand {
    #[command(subcommand)]
    command: AppointmentSubcommand,
}

#[derive(Subcommand, Debug)]
enum AppointmentSubcommand {
    Events,
    Register {
        #[arg(long)]
        event_id: i64,
        #[arg(long)]
        note: Option<String>,
    },
    Mine,
    History {
        username: String,
    },
    Cancel {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct ImageCommand {
    #[command(subcommand)]
    command: ImageSubcommand,
}

#[derive(Subcommand, Debug)]
enum ImageSubcommand {
    Encode {
        path: PathBuf,
        #[arg(long, default_value = "base64")]
        mode: EncodeMode,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error [{}]: {err}", err.code());
            ExitCode::FAILURE
        }
    }
}

struct CliContext {
    config: PortalConfig,
    client: ApiClient,
}

fn build_context(cli: &Cli) -> Result<CliContext, CliError> {
    let mut config = PortalConfig::from_env()?;
    if let Some(base) = &cli.base_url {
        config.api_base_url = PortalConfig::new(base)?.api_base_url;
    }
    if let Some(path) = &cli.session_path {
        config.session_path.clone_from(path);
    }
    if cli.request_timeout_secs.is_some() {
        config.timeouts.request_secs = cli.request_timeout_secs;
    }

    let session = Arc::new(SessionStore::open(&config.session_path));
    let client = ApiClient::new(&config, session)?;
    Ok(CliContext { config, client })
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = build_context(&cli)?;
    let client = &ctx.client;

    match cli.command {
        Command::Login { username, password } => {
            let session = client.auth().login(&LoginForm { username, password }).await?;
            print_json(&json!({ "username": session.user.username, "role": session.user.role }))
        }
        Command::Logout => {
            client.auth().logout()?;
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            let session = client.session().get_session().map_err(ApiError::from)?.ok_or(CliError::NotSignedIn)?;
            print_json(&serde_json::to_value(&session.user)?)
        }
        Command::Register(args) => {
            let form = RegisterForm {
                username: args.username,
                password: args.password,
                confirm_password: args.confirm_password,
                full_name: args.full_name,
                email: args.email,
                phone_number: args.phone,
                blood_type: args.blood_type,
                date_of_birth: args.date_of_birth,
            };
            print_json(&client.auth().register(&form).await?)
        }
        Command::ForgotPassword { email } => print_json(&client.auth().forgot_password(&email).await?),
        Command::ResetPassword(args) => {
            let form = ResetPasswordForm {
                email: args.email,
                token: args.token,
                new_password: args.new_password,
                confirm_password: args.confirm_password,
            };
            print_json(&client.auth().reset_password(&form).await?)
        }
        Command::Hospital(hospital) => run_hospital(client, hospital).await,
        Command::Blog(blog) => run_blog(&ctx, blog).await,
        Command::Deferral(deferral) => run_deferral(client, deferral).await,
        Command::Emergency(emergency) => run_emergency(client, emergency).await,
        Command::Appointment(appointment) => run_appointment(client, appointment).await,
        Command::Image(image) => run_image(&ctx, image).await,
    }
}

async fn run_hospital(client: &ApiClient, hospital: HospitalCommand) -> Result<(), CliError> {
    match hospital.command {
        HospitalSubcommand::List => print_json(&serde_json::to_value(client.hospitals().list().await?)?),
        HospitalSubcommand::Create { name, address, phone, email } => {
            let form = HospitalForm { name, address, phone_number: phone, email };
            print_json(&client.hospitals().create(&form).await?)
        }
    }
}

async fn run_blog(ctx: &CliContext, blog: BlogCommand) -> Result<(), CliError> {
    let client = &ctx.client;
    match blog.command {
        BlogSubcommand::List => print_json(&serde_json::to_value(client.blogs().list().await?)?),
        BlogSubcommand::Create(fields) => {
            let form = blog_form(ctx, fields).await?;
            print_json(&client.blogs().create(&form).await?)
        }
        BlogSubcommand::Update { id, fields } => {
            let form = blog_form(ctx, fields).await?;
            print_json(&client.blogs().update(id, &form).await?)
        }
        BlogSubcommand::Delete { id } => print_json(&client.blogs().delete(id).await?),
    }
}

async fn blog_form(ctx: &CliContext, fields: BlogFields) -> Result<BlogForm, CliError> {
    let image = match fields.image {
        Some(path) => Some(encode_image(ctx, path, EncodeMode::Base64).await?),
        None => None,
    };
    Ok(BlogForm { title: fields.title, content: fields.content, image })
}

async fn run_deferral(client: &ApiClient, deferral: DeferralCommand) -> Result<(), CliError> {
    let reasons = client.deferral_reasons();
    match deferral.command {
        DeferralSubcommand::List => print_json(&serde_json::to_value(reasons.list().await?)?),
        DeferralSubcommand::Create { code, fields } => {
            let form = deferral_form(code, fields);
            print_json(&reasons.create(&form).await?)
        }
        DeferralSubcommand::Update { code, fields } => {
            let form = deferral_form(code.clone(), fields);
            print_json(&reasons.update(&code, &form).await?)
        }
        DeferralSubcommand::Delete { code } => print_json(&reasons.delete(&code).await?),
    }
}

fn deferral_form(code: String, fields: DeferralFields) -> DeferralReasonForm {
    DeferralReasonForm {
        code,
        description: fields.description,
        deferral_days: fields.days,
        is_permanent: fields.permanent,
    }
}

async fn run_emergency(client: &ApiClient, emergency: EmergencyCommand) -> Result<(), CliError> {
    let emergencies = client.emergencies();
    match emergency.command {
        EmergencySubcommand::Register { patient_name, blood_type, units, hospital, phone, urgency, note } => {
            let form = EmergencyRequestForm {
                patient_name,
                blood_type,
                units_needed: units,
                hospital_name: hospital,
                contact_phone: phone,
                urgency,
                note,
            };
            print_json(&emergencies.register(&form).await?)
        }
        EmergencySubcommand::List { triage: sort } => {
            if let Ok(Some(session)) = client.session().get_session() {
                if !session.user.is_staff() {
                    tracing::warn!(role = %session.user.role, "listing all emergencies usually requires a staff role");
                }
            }
            let list = emergencies.list_all().await?;
            let list = if sort { triage(list) } else { list };
            print_json(&serde_json::to_value(list)?)
        }
        EmergencySubcommand::Mine => print_json(&serde_json::to_value(emergencies.list_mine().await?)?),
        EmergencySubcommand::Fulfill { id } => print_json(&emergencies.mark_fulfilled(id).await?),
    }
}

async fn run_appointment(client: &ApiClient, appointment: AppointmentCommand) -> Result<(), CliError> {
    let appointments = client.appointments();
    match appointment.command {
        AppointmentSubcommand::Events => print_json(&serde_json::to_value(appointments.events().await?)?),
        AppointmentSubcommand::Register { event_id, note } => {
            print_json(&appointments.register(&AppointmentForm { event_id, note }).await?)
        }
        AppointmentSubcommand::Mine => print_json(&serde_json::to_value(appointments.mine().await?)?),
        AppointmentSubcommand::History { username } => {
            print_json(&serde_json::to_value(appointments.history(&username).await?)?)
        }
        AppointmentSubcommand::Cancel { id } => print_json(&appointments.cancel(id).await?),
    }
}

async fn run_image(ctx: &CliContext, image: ImageCommand) -> Result<(), CliError> {
    match image.command {
        ImageSubcommand::Encode { path, mode } => {
            let file = SelectedFile::from_path(&path);
            let (name, mime) = (file.name.clone(), file.mime.clone());
            let encoded = encode_image(ctx, path, mode).await?;
            print_json(&json!({ "name": name, "mime": mime, "encodedValue": encoded }))
        }
    }
}

async fn encode_image(ctx: &CliContext, path: PathBuf, mode: EncodeMode) -> Result<String, CliError> {
    let registry = Arc::new(ObjectUrlRegistry::new(ctx.config.object_url_origin.clone()));
    let ingestor = ImageIngestor::new(mode, registry, |result| {
        tracing::debug!(name = %result.source_file.name, len = result.encoded_value.len(), "image encoded");
    });
    let display = path.display().to_string();

    match ingestor.submit_files(vec![SelectedFile::from_path(path)]).await {
        Some(result) => Ok(result.encoded_value),
        None => Err(CliError::Image {
            path: display,
            reason: ingestor.state().last_error.unwrap_or_else(|| "no result".to_owned()),
        }),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
