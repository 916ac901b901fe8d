//! Command-line interface for camwatch_launch

use argh::FromArgs;
use std::path::PathBuf;

/// Start one camwatch worker process per configured camera
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to the cameras file (default: configs/cameras.yaml)
    #[argh(positional, default = "String::from(\"configs/cameras.yaml\")")]
    pub config: String,

    /// path to the camwatch_node executable (default: next to this launcher)
    #[argh(option, short = 'n')]
    pub node_binary: Option<String>,

    /// only launch these cameras (comma-separated ids)
    #[argh(option, short = 'c', from_str_fn(parse_cameras))]
    pub cameras: Option<Vec<String>>,

    /// show launch plan without executing
    #[argh(switch)]
    pub dry_run: bool,

    /// validate the cameras file and exit
    #[argh(switch)]
    pub validate: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Parse comma-separated camera id list
fn parse_cameras(s: &str) -> Result<Vec<String>, String> {
    let ids: Vec<String> = s
        .split(',')
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err(format!("Invalid camera list '{}'. Expected 'id[,id...]'", s));
    }
    Ok(ids)
}

/// Normalize a log level, falling back to `info`
pub fn log_filter(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}

impl LaunchArgs {
    /// Worker executable to spawn.
    ///
    /// Defaults to `camwatch_node` in the directory of the running launcher.
    pub fn node_binary(&self) -> std::io::Result<PathBuf> {
        if let Some(path) = &self.node_binary {
            return Ok(PathBuf::from(path));
        }
        let exe = std::env::current_exe()?;
        Ok(exe.with_file_name(format!("camwatch_node{}", std::env::consts::EXE_SUFFIX)))
    }
}
