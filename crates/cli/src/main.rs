//! Administrative CLI for Keel.

mod api_client;

use anyhow::{Context, Result};
use api_client::{
    ApiClient, CreateCdnRequest, CreateLockRequest, CreateParameterRequest, CreateTokenRequest,
    Envelope, Parameter, Profile, ProfileQuery, ProfileRequest,
};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use keel_core::token::hash_token;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

#[derive(Parser)]
#[command(name = "keelctl")]
#[command(about = "Administrative CLI for Keel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ClientConfigArgs {
    /// Client config file path
    #[arg(long, env = "KEEL_CLIENT_CONFIG")]
    client_config: Option<String>,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Server URL (overrides client config)
    #[arg(long)]
    server: Option<String>,

    /// API token (overrides client config)
    #[arg(long)]
    token: Option<String>,

    /// Server alias to use from client config (default: default_server)
    #[arg(long)]
    alias: Option<String>,

    #[command(flatten)]
    client: ClientConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile management commands
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Parameter and association commands
    Parameter {
        #[command(subcommand)]
        command: ParameterCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// CDN commands
    Cdn {
        #[command(subcommand)]
        command: CdnCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// CDN lock commands
    Lock {
        #[command(subcommand)]
        command: LockCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Token management commands
    Token {
        #[command(subcommand)]
        command: TokenCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Check server health and version
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Save a server and token in the client config
    Login {
        /// Local alias for the server
        alias: String,
        /// Server base URL (e.g., https://keel.example.com)
        url: String,
        /// Token value (avoid if possible; prefer --token-stdin)
        #[arg(long)]
        token: Option<String>,
        /// Read token from stdin
        #[arg(long, default_value_t = false)]
        token_stdin: bool,
        /// Make this server the default
        #[arg(long, default_value_t = false)]
        set_default: bool,
        #[command(flatten)]
        client: ClientConfigArgs,
    },
    /// Select the default server alias
    Use {
        /// Server alias to select
        alias: String,
        #[command(flatten)]
        client: ClientConfigArgs,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// List profiles
    List {
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        name: Option<String>,
        /// Only profiles on this CDN ID
        #[arg(long)]
        cdn: Option<i64>,
        /// Only profiles using this parameter ID
        #[arg(long)]
        param: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
        #[arg(long)]
        page: Option<i64>,
        /// Order by: id, name, description, type, cdn, cdnName, routingDisabled, lastUpdated
        #[arg(long)]
        orderby: Option<String>,
        /// asc or desc
        #[arg(long)]
        sort_order: Option<String>,
    },
    /// Create a profile
    Create {
        #[command(flatten)]
        profile: ProfileFields,
    },
    /// Replace a profile's fields
    Update {
        /// Profile ID
        id: i64,
        #[command(flatten)]
        profile: ProfileFields,
        /// Only update if the profile still has this ETag
        #[arg(long)]
        if_match: Option<String>,
    },
    /// Delete a profile
    Delete {
        /// Profile ID
        id: i64,
        /// Only delete if the profile still has this ETag
        #[arg(long)]
        if_match: Option<String>,
    },
    /// Copy a profile and its parameter associations to a new name
    Copy {
        /// Existing profile name
        existing_name: String,
        /// New profile name
        name: String,
    },
    /// Export a profile as a portable document
    Export {
        /// Profile ID
        id: i64,
        /// Write the document to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Import a profile from an exported document ("-" reads stdin)
    Import {
        file: String,
    },
}

#[derive(Args, Clone)]
struct ProfileFields {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Profile type (e.g., ATS_PROFILE)
    #[arg(long = "type")]
    profile_type: String,
    /// CDN ID
    #[arg(long)]
    cdn: i64,
    #[arg(long, default_value_t = false)]
    routing_disabled: bool,
}

impl From<ProfileFields> for ProfileRequest {
    fn from(fields: ProfileFields) -> Self {
        Self {
            name: fields.name,
            description: fields.description,
            profile_type: fields.profile_type,
            cdn: fields.cdn,
            routing_disabled: fields.routing_disabled,
        }
    }
}

#[derive(Subcommand)]
enum ParameterCommands {
    /// List parameters
    List {
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a parameter
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        config_file: String,
        #[arg(long, default_value = "")]
        value: String,
        #[arg(long, default_value_t = false)]
        secure: bool,
    },
    /// Delete a parameter and its associations
    Delete {
        /// Parameter ID
        id: i64,
    },
    /// Associate parameters with a profile (all or nothing)
    Associate {
        /// Profile ID
        #[arg(long)]
        profile: i64,
        /// Parameter IDs
        #[arg(required = true)]
        parameters: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum CdnCommands {
    /// List CDNs
    List,
    /// Create a CDN
    Create {
        name: String,
        #[arg(long)]
        domain_name: String,
        #[arg(long, default_value_t = false)]
        dnssec: bool,
    },
}

#[derive(Subcommand)]
enum LockCommands {
    /// List CDN locks
    List {
        #[arg(long)]
        cdn: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },
    /// Lock a CDN (soft unless --hard)
    Acquire {
        cdn: String,
        /// Block other users' changes to the CDN's profiles
        #[arg(long, default_value_t = false)]
        hard: bool,
        #[arg(long)]
        message: Option<String>,
    },
    /// Release a CDN lock
    Release {
        cdn: String,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Generate a token secret and hash locally (for the bootstrap admin token)
    Generate {
        #[arg(long)]
        description: Option<String>,
    },
    /// Create a token on the server
    Create {
        #[arg(long)]
        username: String,
        /// admin, operations or read-only
        #[arg(long, default_value = "operations")]
        role: String,
        /// Expiry in seconds
        #[arg(long)]
        expires_in: Option<u64>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List tokens
    List,
    /// Revoke a token
    Revoke {
        token_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Login {
            alias,
            url,
            token,
            token_stdin,
            set_default,
            client,
        } => handle_login_command(&alias, &url, token, token_stdin, set_default, &client).await,
        Commands::Use { alias, client } => handle_use_command(&alias, &client).await,
        Commands::Profile { command, api } => handle_profile_command(command, &api).await,
        Commands::Parameter { command, api } => handle_parameter_command(command, &api).await,
        Commands::Cdn { command, api } => handle_cdn_command(command, &api).await,
        Commands::Lock { command, api } => handle_lock_command(command, &api).await,
        Commands::Token { command, api } => handle_token_command(command, &api).await,
        Commands::Health { api } => handle_health_command(&api).await,
    }
}

async fn resolve_api_config(api: &ApiArgs) -> Result<(String, String)> {
    match (&api.server, &api.token) {
        (Some(server), Some(token)) => return Ok((server.clone(), token.clone())),
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("missing paired flag: use both --server and --token");
        }
        (None, None) => {}
    }

    let server_env = std::env::var("KEEL_SERVER").ok();
    let token_env = std::env::var("KEEL_TOKEN").ok();

    match (server_env, token_env) {
        (Some(server), Some(token)) => return Ok((server, token)),
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("missing paired env var: set both KEEL_SERVER and KEEL_TOKEN");
        }
        (None, None) => {}
    }

    let config_path = client_config_path(api.client.client_config.as_deref())?;
    let config = load_client_config(&config_path).await?;

    let alias = api
        .alias
        .as_ref()
        .or(config.default_server.as_ref())
        .ok_or_else(|| anyhow::anyhow!("no alias specified and no default_server set"))?;

    let server = config
        .servers
        .get(alias)
        .ok_or_else(|| anyhow::anyhow!("alias '{}' not found in client config", alias))?;

    Ok((server.url.clone(), server.token.clone()))
}

async fn get_api_client(api: &ApiArgs) -> Result<ApiClient> {
    let (server, token) = resolve_api_config(api).await?;
    let base_url = normalize_base_url(&server)?;
    ApiClient::new(&base_url, &token)
}

fn print_alerts<T>(envelope: &Envelope<T>) {
    for alert in &envelope.alerts {
        println!("{}: {}", alert.level, alert.text);
    }
}

fn print_profiles(profiles: &[Profile]) {
    println!(
        "{:<8} {:<32} {:<16} {:<12} {:<8} {:<25} Description",
        "ID", "Name", "Type", "CDN", "Routing", "Last Updated"
    );
    println!("{}", "-".repeat(120));
    for profile in profiles {
        let routing = if profile.routing_disabled {
            "off"
        } else {
            "on"
        };
        println!(
            "{:<8} {:<32} {:<16} {:<12} {:<8} {:<25} {}",
            profile.id,
            profile.name,
            profile.profile_type,
            profile.cdn_name,
            routing,
            profile.last_updated,
            profile.description
        );
    }
}

fn print_parameters(parameters: &[Parameter]) {
    println!(
        "{:<8} {:<32} {:<28} {:<7} Value",
        "ID", "Name", "Config File", "Secure"
    );
    println!("{}", "-".repeat(100));
    for parameter in parameters {
        println!(
            "{:<8} {:<32} {:<28} {:<7} {}",
            parameter.id,
            parameter.name,
            parameter.config_file,
            if parameter.secure { "yes" } else { "no" },
            parameter.value
        );
    }
}

async fn handle_profile_command(command: ProfileCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;

    match command {
        ProfileCommands::List {
            id,
            name,
            cdn,
            param,
            limit,
            offset,
            page,
            orderby,
            sort_order,
        } => {
            let query = ProfileQuery {
                id,
                name,
                cdn,
                param,
                limit,
                offset,
                page,
                orderby,
                sort_order,
            };
            let profiles = client.list_profiles(&query).await?.response.unwrap_or_default();

            if profiles.is_empty() {
                println!("No profiles found.");
                return Ok(());
            }
            print_profiles(&profiles);
        }
        ProfileCommands::Create { profile } => {
            let envelope = client.create_profile(&profile.into()).await?;
            print_alerts(&envelope);
            if let Some(profile) = envelope.response {
                println!("ID: {}", profile.id);
            }
        }
        ProfileCommands::Update {
            id,
            profile,
            if_match,
        } => {
            let envelope = client
                .update_profile(id, &profile.into(), if_match.as_deref())
                .await?;
            print_alerts(&envelope);
        }
        ProfileCommands::Delete { id, if_match } => {
            let envelope = client.delete_profile(id, if_match.as_deref()).await?;
            print_alerts(&envelope);
        }
        ProfileCommands::Copy {
            existing_name,
            name,
        } => {
            let envelope = client.copy_profile(&existing_name, &name).await?;
            print_alerts(&envelope);
            if let Some(copied) = envelope.response {
                println!("ID: {}", copied.id);
            }
        }
        ProfileCommands::Export { id, output } => {
            let document = client.export_profile(id).await?;
            let contents = serde_json::to_string_pretty(&document)?;
            if let Some(path) = output {
                tokio::fs::write(&path, contents)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Exported profile {id} to {}", path.display());
            } else {
                println!("{contents}");
            }
        }
        ProfileCommands::Import { file } => {
            let contents = if file == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("failed to read {file}"))?
            };
            let document: serde_json::Value =
                serde_json::from_str(&contents).context("import document is not valid JSON")?;
            let envelope = client.import_profile(&document).await?;
            print_alerts(&envelope);
            if let Some(imported) = envelope.response {
                println!("ID: {}", imported.id);
            }
        }
    }
    Ok(())
}

async fn handle_parameter_command(command: ParameterCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;

    match command {
        ParameterCommands::List { name } => {
            let parameters = client
                .list_parameters(name.as_deref())
                .await?
                .response
                .unwrap_or_default();
            if parameters.is_empty() {
                println!("No parameters found.");
                return Ok(());
            }
            print_parameters(&parameters);
        }
        ParameterCommands::Create {
            name,
            config_file,
            value,
            secure,
        } => {
            let envelope = client
                .create_parameter(&CreateParameterRequest {
                    name,
                    config_file,
                    value,
                    secure,
                })
                .await?;
            print_alerts(&envelope);
            if let Some(parameter) = envelope.response {
                println!("ID: {}", parameter.id);
            }
        }
        ParameterCommands::Delete { id } => {
            let envelope = client.delete_parameter(id).await?;
            print_alerts(&envelope);
        }
        ParameterCommands::Associate {
            profile,
            parameters,
        } => {
            let envelope = client.associate_parameters(profile, &parameters).await?;
            print_alerts(&envelope);
        }
    }
    Ok(())
}

async fn handle_cdn_command(command: CdnCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;

    match command {
        CdnCommands::List => {
            let cdns = client.list_cdns().await?.response.unwrap_or_default();
            if cdns.is_empty() {
                println!("No CDNs found.");
                return Ok(());
            }
            println!("{:<8} {:<24} {:<8} Domain", "ID", "Name", "DNSSEC");
            println!("{}", "-".repeat(72));
            for cdn in cdns {
                println!(
                    "{:<8} {:<24} {:<8} {}",
                    cdn.id,
                    cdn.name,
                    if cdn.dnssec_enabled { "yes" } else { "no" },
                    cdn.domain_name
                );
            }
        }
        CdnCommands::Create {
            name,
            domain_name,
            dnssec,
        } => {
            let envelope = client
                .create_cdn(&CreateCdnRequest {
                    name,
                    domain_name,
                    dnssec_enabled: dnssec,
                })
                .await?;
            print_alerts(&envelope);
            if let Some(cdn) = envelope.response {
                println!("ID: {}", cdn.id);
            }
        }
    }
    Ok(())
}

async fn handle_lock_command(command: LockCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;

    match command {
        LockCommands::List { cdn, username } => {
            let locks = client
                .list_locks(cdn.as_deref(), username.as_deref())
                .await?
                .response
                .unwrap_or_default();
            if locks.is_empty() {
                println!("No locks held.");
                return Ok(());
            }
            println!(
                "{:<24} {:<20} {:<6} {:<25} Message",
                "CDN", "User", "Kind", "Since"
            );
            println!("{}", "-".repeat(100));
            for lock in locks {
                println!(
                    "{:<24} {:<20} {:<6} {:<25} {}",
                    lock.cdn,
                    lock.user_name,
                    if lock.soft { "soft" } else { "hard" },
                    lock.last_updated,
                    lock.message.as_deref().unwrap_or("-")
                );
            }
        }
        LockCommands::Acquire { cdn, hard, message } => {
            let envelope = client
                .acquire_lock(&CreateLockRequest {
                    cdn,
                    soft: !hard,
                    message,
                })
                .await?;
            print_alerts(&envelope);
        }
        LockCommands::Release { cdn } => {
            let envelope = client.release_lock(&cdn).await?;
            print_alerts(&envelope);
        }
    }
    Ok(())
}

async fn handle_token_command(command: TokenCommands, api: &ApiArgs) -> Result<()> {
    match command {
        TokenCommands::Generate { description } => handle_token_generate(description),
        TokenCommands::Create {
            username,
            role,
            expires_in,
            description,
        } => {
            let client = get_api_client(api).await?;
            let response = client
                .create_token(&CreateTokenRequest {
                    username,
                    role,
                    expires_in_secs: expires_in,
                    description,
                })
                .await?
                .response
                .ok_or_else(|| anyhow::anyhow!("server returned no token"))?;

            println!("Token created successfully!");
            println!("\nToken ID: {}", response.token_id);
            println!("User: {} ({})", response.username, response.role);
            println!("Token secret: {}", response.token_secret);
            println!("\nIMPORTANT: Save this token secret now. It cannot be recovered.");
            if let Some(expires) = response.expires_at {
                println!("Expires: {expires}");
            }
            Ok(())
        }
        TokenCommands::List => {
            let client = get_api_client(api).await?;
            let tokens = client.list_tokens().await?.response.unwrap_or_default();

            if tokens.is_empty() {
                println!("No tokens found.");
                return Ok(());
            }

            println!(
                "{:<38} {:<20} {:<12} {:<10} {:<25} {:<25} Description",
                "ID", "User", "Role", "Status", "Created", "Last Used"
            );
            println!("{}", "-".repeat(150));

            let now = OffsetDateTime::now_utc();
            for token in tokens {
                let status = token_status(
                    token.revoked_at.as_deref(),
                    token.expires_at.as_deref(),
                    now,
                );
                let last_used_at = token.last_used_at.as_deref().unwrap_or("-");
                let description = token.description.as_deref().unwrap_or("-");

                println!(
                    "{:<38} {:<20} {:<12} {:<10} {:<25} {:<25} {}",
                    token.token_id,
                    token.username,
                    token.role,
                    status,
                    token.created_at,
                    last_used_at,
                    description
                );
            }
            Ok(())
        }
        TokenCommands::Revoke { token_id } => {
            let client = get_api_client(api).await?;
            client.revoke_token(&token_id).await?;
            println!("Token revoked: {token_id}");
            Ok(())
        }
    }
}

fn token_status(revoked_at: Option<&str>, expires_at: Option<&str>, now: OffsetDateTime) -> &'static str {
    if revoked_at.is_some() {
        return "revoked";
    }
    let expired = expires_at
        .and_then(|t| {
            OffsetDateTime::parse(t, &time::format_description::well_known::Rfc3339).ok()
        })
        .is_some_and(|t| t < now);
    if expired { "expired" } else { "active" }
}

fn handle_token_generate(description: Option<String>) -> Result<()> {
    let token_secret = generate_token_secret();
    let token_hash = hash_token(&token_secret);

    println!("Token generated (save the secret - it cannot be recovered):\n");
    println!("  Secret: {token_secret}");
    println!("  Hash:   sha256:{token_hash}");
    if let Some(desc) = description {
        println!("  Description: {desc}");
    }
    println!("\nAdd to server.toml:");
    println!("  [admin]");
    println!("  token_hash = \"sha256:{token_hash}\"");

    Ok(())
}

async fn handle_health_command(api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;
    let health = client.health().await.context("health request failed")?;

    println!("Status: {}", health.status);
    println!("Server version: {}", health.version);
    println!("Client version: {}", env!("CARGO_PKG_VERSION"));

    if health.version != env!("CARGO_PKG_VERSION") {
        eprintln!(
            "Warning: version mismatch (server: {}, client: {})",
            health.version,
            env!("CARGO_PKG_VERSION")
        );
    }
    Ok(())
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
#[serde(default)]
struct ClientConfig {
    default_server: Option<String>,
    servers: BTreeMap<String, ServerProfile>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
struct ServerProfile {
    url: String,
    token: String,
}

async fn handle_login_command(
    alias: &str,
    url: &str,
    token: Option<String>,
    token_stdin: bool,
    set_default: bool,
    client: &ClientConfigArgs,
) -> Result<()> {
    let token = read_token(token, token_stdin)?;
    let base_url = normalize_base_url(url)?;
    let config_path = client_config_path(client.client_config.as_deref())?;

    // Any authenticated read proves the token works.
    let api = ApiClient::new(&base_url, &token)?;
    api.list_cdns()
        .await
        .context("failed to verify token against server")?;

    let mut config = load_client_config(&config_path).await?;
    config.servers.insert(
        alias.to_string(),
        ServerProfile {
            url: base_url.clone(),
            token,
        },
    );

    if set_default || config.default_server.is_none() {
        config.default_server = Some(alias.to_string());
    }

    save_client_config(&config_path, &config).await?;

    println!("Logged in as '{alias}'");
    println!("  URL: {base_url}");
    println!("Client config: {}", config_path.display());

    Ok(())
}

async fn handle_use_command(alias: &str, client: &ClientConfigArgs) -> Result<()> {
    let config_path = client_config_path(client.client_config.as_deref())?;
    let mut config = load_client_config(&config_path).await?;

    if !config.servers.contains_key(alias) {
        anyhow::bail!("unknown server alias: {alias}");
    }

    config.default_server = Some(alias.to_string());
    save_client_config(&config_path, &config).await?;

    println!("Selected server: {alias}");
    Ok(())
}

fn client_config_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = std::env::var_os("KEEL_CLIENT_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(path) => PathBuf::from(path),
        None => {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| anyhow::anyhow!("HOME not set; set KEEL_CLIENT_CONFIG"))?;
            PathBuf::from(home).join(".config")
        }
    };

    Ok(base.join("keel").join("client.toml"))
}

async fn load_client_config(path: &Path) -> Result<ClientConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("KEEL_CLIENT__").split("__"));

    match figment.extract() {
        Ok(config) => Ok(config),
        Err(_) if !path.exists() => Ok(ClientConfig::default()),
        Err(err) => Err(anyhow::anyhow!(err).context("failed to load client configuration")),
    }
}

async fn save_client_config(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = toml::to_string_pretty(config)?;

    tokio::fs::write(path, contents).await?;

    // The file holds tokens.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

fn read_token(token: Option<String>, token_stdin: bool) -> Result<String> {
    if let Some(token) = token {
        return Ok(token);
    }
    if token_stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        let token = buf.trim().to_string();
        if token.is_empty() {
            anyhow::bail!("token read from stdin is empty");
        }
        return Ok(token);
    }
    anyhow::bail!("token required: use --token or --token-stdin");
}

fn normalize_base_url(url: &str) -> Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("server URL must start with http:// or https://");
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// Generate a random token secret using a cryptographically secure RNG.
fn generate_token_secret() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::future::Future;
    use std::sync::OnceLock;
    use tempfile::tempdir;
    use tokio::sync::Mutex;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    async fn with_env_lock<F, Fut, T>(action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().await;
        action().await
    }

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: env mutation is serialized by ENV_LOCK
            unsafe { std::env::set_var(key, value) };
            Self { key, prev }
        }

        fn unset(key: &'static str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: env mutation is serialized by ENV_LOCK
            unsafe { std::env::remove_var(key) };
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            // SAFETY: env mutation is serialized by ENV_LOCK
            unsafe {
                if let Some(value) = self.prev.take() {
                    std::env::set_var(self.key, value);
                } else {
                    std::env::remove_var(self.key);
                }
            }
        }
    }

    fn api_args(server: Option<&str>, token: Option<&str>, config: &Path) -> ApiArgs {
        ApiArgs {
            server: server.map(str::to_string),
            token: token.map(str::to_string),
            alias: None,
            client: ClientConfigArgs {
                client_config: Some(config.display().to_string()),
            },
        }
    }

    #[test]
    fn normalize_base_url_requires_scheme() {
        assert!(normalize_base_url("keel.example.com").is_err());
        assert_eq!(
            normalize_base_url("https://keel.example.com/").unwrap(),
            "https://keel.example.com"
        );
    }

    #[test]
    fn generated_secret_is_url_safe() {
        let secret = generate_token_secret();
        assert_eq!(secret.len(), 43);
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(secret, generate_token_secret());
    }

    #[test]
    fn token_status_reports_revoked_and_expired() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(token_status(Some("2024-01-01T00:00:00Z"), None, now), "revoked");
        assert_eq!(token_status(None, Some("2001-01-01T00:00:00Z"), now), "expired");
        assert_eq!(token_status(None, Some("2999-01-01T00:00:00Z"), now), "active");
        assert_eq!(token_status(None, None, now), "active");
    }

    #[tokio::test]
    async fn client_config_roundtrip() {
        with_env_lock(|| async {
            let temp = tempdir().unwrap();
            let path = temp.path().join("client.toml");

            let mut config = ClientConfig {
                default_server: Some("prod".to_string()),
                ..Default::default()
            };
            config.servers.insert(
                "prod".to_string(),
                ServerProfile {
                    url: "https://keel.example.com".to_string(),
                    token: "token".to_string(),
                },
            );

            save_client_config(&path, &config).await.unwrap();
            let loaded = load_client_config(&path).await.unwrap();
            assert_eq!(loaded.default_server, config.default_server);
            assert_eq!(loaded.servers.len(), 1);
            assert_eq!(loaded.servers["prod"].url, "https://keel.example.com");
        })
        .await;
    }

    #[tokio::test]
    async fn load_client_config_missing_returns_default() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing.toml");
        let config = load_client_config(&path).await.unwrap();
        assert!(config.servers.is_empty());
    }

    #[tokio::test]
    async fn resolve_prefers_paired_flags() {
        with_env_lock(|| async {
            let temp = tempdir().unwrap();
            let _server = EnvVarGuard::set("KEEL_SERVER", "https://env.example.com");
            let _token = EnvVarGuard::set("KEEL_TOKEN", "env-token");

            let args = api_args(
                Some("https://flag.example.com"),
                Some("flag-token"),
                &temp.path().join("client.toml"),
            );
            let (server, token) = resolve_api_config(&args).await.unwrap();
            assert_eq!(server, "https://flag.example.com");
            assert_eq!(token, "flag-token");

            let args = api_args(Some("https://flag.example.com"), None, &temp.path().join("c"));
            let err = resolve_api_config(&args).await.unwrap_err();
            assert!(err.to_string().contains("--server and --token"));
        })
        .await;
    }

    #[tokio::test]
    async fn resolve_falls_back_to_env_then_config() {
        with_env_lock(|| async {
            let temp = tempdir().unwrap();
            let path = temp.path().join("client.toml");
            let args = api_args(None, None, &path);

            {
                let _server = EnvVarGuard::set("KEEL_SERVER", "https://env.example.com");
                let _token = EnvVarGuard::set("KEEL_TOKEN", "env-token");
                let (server, token) = resolve_api_config(&args).await.unwrap();
                assert_eq!(server, "https://env.example.com");
                assert_eq!(token, "env-token");
            }

            {
                let _server = EnvVarGuard::set("KEEL_SERVER", "https://env.example.com");
                let _token = EnvVarGuard::unset("KEEL_TOKEN");
                let err = resolve_api_config(&args).await.unwrap_err();
                assert!(err.to_string().contains("KEEL_SERVER and KEEL_TOKEN"));
            }

            let _server = EnvVarGuard::unset("KEEL_SERVER");
            let _token = EnvVarGuard::unset("KEEL_TOKEN");

            let err = resolve_api_config(&args).await.unwrap_err();
            assert!(err.to_string().contains("default_server"));

            let mut config = ClientConfig {
                default_server: Some("staging".to_string()),
                ..Default::default()
            };
            config.servers.insert(
                "staging".to_string(),
                ServerProfile {
                    url: "https://staging.example.com".to_string(),
                    token: "staging-token".to_string(),
                },
            );
            save_client_config(&path, &config).await.unwrap();

            let (server, token) = resolve_api_config(&args).await.unwrap();
            assert_eq!(server, "https://staging.example.com");
            assert_eq!(token, "staging-token");
        })
        .await;
    }

    #[test]
    fn read_token_prefers_flag() {
        assert_eq!(
            read_token(Some("abc".to_string()), true).unwrap(),
            "abc".to_string()
        );
        assert!(read_token(None, false).is_err());
    }
}
