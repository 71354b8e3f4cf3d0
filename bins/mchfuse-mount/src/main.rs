use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use mchfuse_client::{DeviceList, Session};
use mchfuse_fuse::{MchFilesystem, MountOptions, RemoteFs};

const DEFAULT_CONFIG_PATH: &str = "/etc/mchfuse.conf";

/// Mount a WD My Cloud Home device as a FUSE filesystem
#[derive(Parser, Debug)]
#[command(name = "mchfuse", version, about)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// mycloud.com username
    #[arg(short, long)]
    username: Option<String>,

    /// mycloud.com password
    #[arg(short, long)]
    password: Option<String>,

    /// Allow other users to access the filesystem
    #[arg(short = 'a', long)]
    allow_other: bool,

    /// Set the owner of the files in the filesystem
    #[arg(short = 'U', long)]
    uid: Option<u32>,

    /// Set the group of the files in the filesystem
    #[arg(short = 'G', long)]
    gid: Option<u32>,

    /// Do not daemonize; stay attached to the terminal
    #[arg(short, long)]
    foreground: bool,

    /// Activate debug output (implies --foreground)
    #[arg(short, long)]
    debug: bool,

    /// Source spec: deviceName[:devicePath]
    source: String,

    /// Where to mount the filesystem
    mountpoint: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    username: Option<String>,
    password: Option<String>,
    debug: Option<bool>,
    foreground: Option<bool>,
    #[serde(rename = "allow-other")]
    allow_other: Option<bool>,
    uid: Option<u32>,
    gid: Option<u32>,
}

/// Settings after merging the config file with command-line flags; flags
/// win.
#[derive(Debug)]
struct Settings {
    username: String,
    password: String,
    debug: bool,
    foreground: bool,
    allow_other: bool,
    uid: u32,
    gid: u32,
}

fn load_config_file(path: Option<&Path>) -> anyhow::Result<FileConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if !default.exists() {
                return Ok(FileConfig::default());
            }
            default.to_path_buf()
        }
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

fn merge_settings(args: &Args, file: FileConfig) -> anyhow::Result<Settings> {
    let username = args
        .username
        .clone()
        .or(file.username)
        .ok_or_else(|| anyhow!("username is required; set it in the config file or with --username"))?;
    let password = args
        .password
        .clone()
        .or(file.password)
        .ok_or_else(|| anyhow!("password is required; set it in the config file or with --password"))?;

    // The uid option sets the uid, the gid option sets the gid; both
    // default to the calling user.
    let uid = args
        .uid
        .or(file.uid)
        .unwrap_or_else(|| unsafe { libc::getuid() });
    let gid = args
        .gid
        .or(file.gid)
        .unwrap_or_else(|| unsafe { libc::getgid() });

    let debug = args.debug || file.debug.unwrap_or(false);
    Ok(Settings {
        username,
        password,
        debug,
        // Debugging implies running in the foreground.
        foreground: args.foreground || file.foreground.unwrap_or(false) || debug,
        allow_other: args.allow_other || file.allow_other.unwrap_or(false),
        uid,
        gid,
    })
}

fn split_source(source: &str) -> (&str, &str) {
    match source.split_once(':') {
        Some((device_name, device_path)) => (device_name, device_path),
        None => (source, ""),
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = ctrl_c => { tracing::info!("received CTRL+C"); }
        _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let file_config = load_config_file(args.config.as_deref())?;
    let settings = merge_settings(&args, file_config)?;

    let default_level = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let (device_name, device_path) = split_source(&args.source);

    let session = Arc::new(
        Session::login(&settings.username, &settings.password)
            .await
            .context("signing in to the My Cloud Home account")?,
    );

    let devices = DeviceList::fetch(&session)
        .await
        .context("retrieving the device list")?;
    let device = devices.find(device_name).ok_or_else(|| {
        anyhow!(
            "unknown device {:?} (available devices: {})",
            device_name,
            devices.names().join(", ")
        )
    })?;

    let root = device
        .file_by_path(device_path)
        .await
        .with_context(|| format!("resolving device path {device_path:?}"))?;

    let options = MountOptions {
        uid: settings.uid,
        gid: settings.gid,
        allow_other: settings.allow_other,
        debug: settings.debug,
        fs_name: args.source.clone(),
        ..Default::default()
    };

    let remote: Arc<dyn RemoteFs> = device.clone();
    let fs = MchFilesystem::new(remote, root, options);

    tracing::info!(
        mountpoint = %args.mountpoint.display(),
        source = %args.source,
        nodes = fs.node_count(),
        "filesystem ready; serving until unmounted"
    );
    if !settings.foreground {
        // Daemonization is left to the service manager; the process stays
        // attached either way.
        tracing::warn!("running in the foreground; use a service manager to detach");
    }

    wait_for_shutdown_signal().await;
    tracing::info!("shutting down");
    Ok(())
}
