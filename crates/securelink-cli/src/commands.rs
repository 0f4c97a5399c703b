//! CLI command definitions and dispatch.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde_json::json;

use securelink::store::SqliteStore;
use securelink::{
    AuditAction, AuditEvent, AuditFilter, FileRef, LinkId, LinkState, LinkStatus, LinkSummary,
    PolicyParams, RedemptionAttempt, RedemptionResult, UploadedFile, Vault,
};

use crate::state::DataDir;

/// SecureLink: share encrypted files through expiring links
#[derive(Debug, Parser)]
#[command(name = "securelink", version, about, long_about = None)]
pub struct Cli {
    /// Vault directory (defaults to the platform data directory)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the vault directory, master key and database
    Init,
    /// Encrypt a file into the vault
    Upload(UploadArgs),
    /// List uploaded files
    Files,
    /// Mint a share link for an uploaded file
    Share(ShareArgs),
    /// Redeem a link and write the file out
    Redeem(RedeemArgs),
    /// Show a link's status and history
    Status {
        /// Link id
        link: String,
    },
    /// List every link
    Links,
    /// Deactivate a link permanently
    Deactivate {
        /// Link id
        link: String,
        /// Reason recorded in the audit log
        #[arg(short, long, default_value = "manual")]
        reason: String,
    },
    /// Remove a link, and its file once nothing else references it
    Discard {
        /// Link id
        link: String,
    },
    /// Audit log
    #[command(subcommand)]
    Audit(AuditCommand),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// File to encrypt
    pub path: PathBuf,
    /// Stored file name (defaults to the path's file name)
    #[arg(long)]
    pub name: Option<String>,
    /// MIME type
    #[arg(long, default_value = "application/octet-stream")]
    pub mime: String,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("expiry").required(true).args(["downloads", "expires_in"])))]
pub struct ShareArgs {
    /// File reference printed by `upload`
    pub file: String,
    /// Allow this many downloads
    #[arg(long)]
    pub downloads: Option<i64>,
    /// Expire this many seconds after creation
    #[arg(long)]
    pub expires_in: Option<i64>,
    /// Require a password
    #[arg(long)]
    pub password: Option<String>,
    /// Require a 6-digit one-time code
    #[arg(long)]
    pub otp: bool,
}

#[derive(Debug, Args)]
pub struct RedeemArgs {
    /// Link id
    pub link: String,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub otp: Option<String>,
    /// Where to write the file (defaults to its original name in the
    /// current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Audit subcommands
#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// Show audit events, newest first
    List {
        /// Only this action (e.g. access_denied)
        #[arg(short, long)]
        action: Option<AuditAction>,
        /// Case-insensitive search over ids and details
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Summary counters
    Stats,
    /// Write the audit log as JSON
    Export {
        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete every audit event
    Clear,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        let data = DataDir::resolve(self.data_dir.clone())?;
        if let Commands::Init = self.command {
            data.init()?;
            println!("initialized vault at {}", data.root.display());
            return Ok(());
        }

        let vault = data.open()?;
        match &self.command {
            Commands::Init => Ok(()),
            Commands::Upload(args) => upload(&vault, args, self.json).await,
            Commands::Files => files(&vault, self.json).await,
            Commands::Share(args) => share(&vault, args, self.json).await,
            Commands::Redeem(args) => redeem(&vault, args).await,
            Commands::Status { link } => status(&vault, &parse_link(link)?, self.json).await,
            Commands::Links => links(&vault, self.json).await,
            Commands::Deactivate { link, reason } => {
                let link = parse_link(link)?;
                if vault.deactivate_link(&link, reason).await? {
                    println!("deactivated {}", link);
                } else {
                    println!("{} was already inactive", link);
                }
                Ok(())
            }
            Commands::Discard { link } => {
                let discarded = vault.discard_link(&parse_link(link)?).await?;
                println!(
                    "discarded {}{}",
                    link,
                    if discarded.content_deleted {
                        " and its file"
                    } else {
                        ""
                    }
                );
                Ok(())
            }
            Commands::Audit(command) => audit(&vault, command, self.json),
        }
    }
}

fn parse_link(raw: &str) -> Result<LinkId> {
    raw.trim()
        .parse()
        .with_context(|| format!("invalid link id {:?}", raw))
}

fn parse_file(raw: &str) -> Result<FileRef> {
    raw.trim()
        .parse()
        .with_context(|| format!("invalid file reference {:?}", raw))
}

async fn upload(vault: &Vault<SqliteStore>, args: &UploadArgs, as_json: bool) -> Result<()> {
    let bytes = fs::read(&args.path).with_context(|| format!("reading {}", args.path.display()))?;
    let name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("path has no file name; pass --name")?,
    };

    let uploaded = vault.upload(bytes, &name, &args.mime).await?;
    if as_json {
        print_json(&file_json(&uploaded));
    } else {
        println!("{}", uploaded.file_ref);
    }
    Ok(())
}

async fn files(vault: &Vault<SqliteStore>, as_json: bool) -> Result<()> {
    let files = vault.list_files().await?;
    if as_json {
        print_json(&json!(files.iter().map(file_json).collect::<Vec<_>>()));
        return Ok(());
    }
    if files.is_empty() {
        println!("No files.");
    }
    for file in &files {
        println!(
            "{}  {:>10}  {}  {}",
            file.file_ref, file.metadata.size, file.metadata.mime, file.metadata.name
        );
    }
    Ok(())
}

async fn share(vault: &Vault<SqliteStore>, args: &ShareArgs, as_json: bool) -> Result<()> {
    let file = parse_file(&args.file)?;
    let mut params = match (args.downloads, args.expires_in) {
        (Some(limit), None) => PolicyParams::by_downloads(limit),
        (None, Some(seconds)) => PolicyParams::by_time(seconds),
        _ => bail!("pass exactly one of --downloads or --expires-in"),
    };
    if let Some(password) = &args.password {
        params = params.with_password(password.clone());
    }
    if args.otp {
        params = params.with_otp();
    }

    let link = vault.create_link(&file, params).await?;
    if as_json {
        print_json(&json!({ "link_id": link, "file_ref": file }));
    } else {
        println!("{}", link);
    }
    Ok(())
}

async fn redeem(vault: &Vault<SqliteStore>, args: &RedeemArgs) -> Result<()> {
    let link = parse_link(&args.link)?;
    if let Some(output) = &args.output {
        // Checked up front so a refused write does not spend a download.
        if !args.force && output.exists() {
            bail!("{} already exists; pass --force to overwrite", output.display());
        }
    }
    let attempt = RedemptionAttempt {
        password: args.password.clone(),
        otp: args.otp.clone(),
    };

    match vault.redeem_link(&link, &attempt).await? {
        RedemptionResult::Granted(file) => {
            let output = match &args.output {
                Some(path) => {
                    write_output(path, &file.bytes, args.force)?;
                    path.clone()
                }
                None => write_into(Path::new("."), &file.name, &file.bytes, args.force)?,
            };
            println!("wrote {} ({} bytes)", output.display(), file.size);
            if let Some(left) = file.remaining_downloads {
                println!("{} download(s) left", left);
            }
            Ok(())
        }
        RedemptionResult::Denied(reason) => bail!("{} ({})", reason.message(), reason),
    }
}

/// Reduces an uploader-supplied name to a bare file name.
fn safe_file_name(name: &str) -> Result<&Path> {
    if name.trim().is_empty() || name.contains("..") {
        bail!("refusing to write to stored name {:?}; pass --output", name);
    }
    let file_name = Path::new(name)
        .file_name()
        .with_context(|| format!("stored name {:?} has no file name; pass --output", name))?;
    Ok(Path::new(file_name))
}

/// Writes `bytes` under `dir` using the stored name. Without `force` an
/// existing file is kept and a numbered sibling is written instead.
fn write_into(dir: &Path, name: &str, bytes: &[u8], force: bool) -> Result<PathBuf> {
    let file_name = safe_file_name(name)?;
    let target = dir.join(file_name);
    if force {
        write_output(&target, bytes, true)?;
        return Ok(target);
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for n in 0..100u32 {
        let candidate = if n == 0 {
            target.clone()
        } else {
            dir.join(format!("{} ({}){}", stem, n, ext))
        };
        match write_output(&candidate, bytes, false) {
            Ok(()) => return Ok(candidate),
            Err(e) if is_already_exists(&e) => continue,
            Err(e) => return Err(e),
        }
    }
    bail!("too many files named like {}; pass --output", target.display())
}

fn write_output(path: &Path, bytes: &[u8], force: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("writing {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("writing {}", path.display()))
}

fn is_already_exists(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .map_or(false, |e| e.kind() == ErrorKind::AlreadyExists)
}

async fn status(vault: &Vault<SqliteStore>, link: &LinkId, as_json: bool) -> Result<()> {
    let state = vault.get_link_status(link).await?;
    if as_json {
        print_json(&json!({ "link_id": link, "state": state }));
        return Ok(());
    }

    print_state(link, &state);
    for record in state.access_history() {
        println!(
            "  {}  {:?}  {}",
            record.timestamp, record.outcome, record.detail
        );
    }
    Ok(())
}

fn print_state(link: &LinkId, state: &LinkState) {
    let policy = state.policy();
    println!("link      {}", link);
    println!("file      {}", policy.file_ref());
    println!("status    {}", status_label(state.status()));
    println!("mode      {}", policy.expiry_mode());
    if let Some(left) = state.remaining_downloads() {
        println!("remaining {}", left);
    }
    if let Some(expires_at) = policy.expires_at() {
        println!("expires   {}", expires_at);
    }
    println!(
        "secrets   password={} otp={}",
        policy.requires_password(),
        policy.requires_otp()
    );
}

async fn links(vault: &Vault<SqliteStore>, as_json: bool) -> Result<()> {
    let links = vault.list_links().await?;
    if as_json {
        print_json(&json!(links.iter().map(summary_json).collect::<Vec<_>>()));
        return Ok(());
    }
    if links.is_empty() {
        println!("No links.");
    }
    for summary in &links {
        println!(
            "{}  {:<34}  grants={}",
            summary.link_id,
            status_label(&summary.status),
            summary.grants
        );
    }
    Ok(())
}

fn audit(vault: &Vault<SqliteStore>, command: &AuditCommand, as_json: bool) -> Result<()> {
    match command {
        AuditCommand::List { action, search } => {
            let filter = AuditFilter {
                action: *action,
                search: search.clone(),
            };
            let events = vault.audit_events(&filter)?;
            if as_json {
                print_json(&json!(events));
            } else {
                events.iter().for_each(print_event);
            }
        }
        AuditCommand::Stats => {
            let stats = vault.audit_stats()?;
            if as_json {
                print_json(&json!(stats));
            } else {
                println!("events        {}", stats.total);
                println!("unique files  {}", stats.unique_files);
                println!("unique links  {}", stats.unique_links);
                println!("downloads     {}", stats.downloads);
            }
        }
        AuditCommand::Export { output } => {
            let export = vault.export_audit_json()?;
            match output {
                Some(path) => {
                    fs::write(path, export)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("exported audit log to {}", path.display());
                }
                None => println!("{}", export),
            }
        }
        AuditCommand::Clear => {
            let removed = vault.clear_audit()?;
            println!("removed {} audit event(s)", removed);
        }
    }
    Ok(())
}

fn print_event(event: &AuditEvent) {
    println!(
        "{}  {:<16}  {:?}  {}  {}",
        event.timestamp,
        event.action,
        event.outcome,
        event.link_id.map(|id| id.to_hex()).unwrap_or_else(|| "-".into()),
        event.reason_detail.as_deref().unwrap_or("")
    );
}

fn status_label(status: &LinkStatus) -> String {
    match status {
        LinkStatus::Active => "active".to_string(),
        LinkStatus::Deactivated(reason) => format!("deactivated ({})", reason),
    }
}

fn file_json(file: &UploadedFile) -> serde_json::Value {
    json!({
        "file_ref": file.file_ref,
        "name": file.metadata.name,
        "size": file.metadata.size,
        "mime": file.metadata.mime,
        "uploaded_at": file.metadata.uploaded_at,
    })
}

fn summary_json(summary: &LinkSummary) -> serde_json::Value {
    json!({
        "link_id": summary.link_id,
        "file_ref": summary.file_ref,
        "status": summary.status,
        "grants": summary.grants,
        "remaining_downloads": summary.remaining_downloads,
        "expires_at": summary.expires_at,
    })
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: rendering JSON: {}", e),
    }
}
