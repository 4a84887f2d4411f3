//! Command-line arguments.
//!
//! Global flags and the fixed commands are derived. Resource commands come
//! from the catalog at startup, so the command tree is assembled by hand
//! around the derived argument groups.

use clap::{
    Arg, ArgAction, ArgMatches, Args, Command, CommandFactory, FromArgMatches, Parser, ValueEnum,
};
use serde_json::{Map, Value};

use ads_core::config::{
    DEFAULT_BASE_URL, DEFAULT_LINKEDIN_VERSION, DEFAULT_RESTLI_PROTOCOL_VERSION,
    DEFAULT_URL_LENGTH_THRESHOLD,
};
use ads_core::upload::{DEFAULT_MAX_POLLS, DEFAULT_PARALLELISM};
use ads_core::params::is_restli_literal;
use ads_core::{Catalog, MediaKind, Operation, OutputMode, ParamKind, ParamSpec, TunnelMode};

/// Upper bound for the polling interval and timeout: one day.
const MAX_POLL_SECS: u64 = 86_400;

#[derive(Parser, Debug)]
#[command(
    name = "linkedin-ads",
    author,
    version,
    about = "LinkedIn Marketing API client (Rest.li /rest)",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// OAuth access token
    #[arg(long, global = true, env = "LINKEDIN_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Value of the LinkedIn-Version header (YYYYMM)
    #[arg(
        long,
        global = true,
        env = "LINKEDIN_VERSION",
        default_value = DEFAULT_LINKEDIN_VERSION
    )]
    pub linkedin_version: String,

    #[arg(long, global = true, env = "LINKEDIN_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(
        long,
        global = true,
        env = "LINKEDIN_RESTLI_PROTOCOL_VERSION",
        default_value = DEFAULT_RESTLI_PROTOCOL_VERSION
    )]
    pub restli_protocol_version: String,

    /// Ad account used when an ad-account command has no --id
    #[arg(long, global = true, env = "LINKEDIN_AD_ACCOUNT_ID")]
    pub ad_account_id: Option<String>,

    /// Asset used when an image or video command has no --id
    #[arg(long, global = true, env = "LINKEDIN_ASSET_ID")]
    pub asset_id: Option<String>,

    /// When to send GET/DELETE as a tunneled POST
    #[arg(long, global = true, value_enum, default_value_t = TunnelArg::Auto)]
    pub tunnel: TunnelArg,

    /// URL length above which `--tunnel auto` tunnels
    #[arg(long, global = true, default_value_t = DEFAULT_URL_LENGTH_THRESHOLD, hide = true)]
    pub url_length_threshold: usize,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Pretty-printed JSON
    #[arg(long, global = true, conflicts_with_all = ["json", "raw"])]
    pub pretty: bool,

    /// Compact JSON (default)
    #[arg(long, global = true, conflicts_with = "raw")]
    pub json: bool,

    /// Status line, headers and body exactly as received
    #[arg(long, global = true)]
    pub raw: bool,

    /// Log every request at debug level
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalArgs {
    pub fn output_mode(&self) -> OutputMode {
        if self.raw {
            OutputMode::Raw
        } else if self.pretty {
            OutputMode::Pretty
        } else {
            OutputMode::Json
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelArg {
    Auto,
    Always,
    Never,
}

impl From<TunnelArg> for TunnelMode {
    fn from(value: TunnelArg) -> Self {
        match value {
            TunnelArg::Auto => TunnelMode::Auto,
            TunnelArg::Always => TunnelMode::Always,
            TunnelArg::Never => TunnelMode::Never,
        }
    }
}

/// Arguments shared by every catalog operation.
#[derive(Args, Debug, Clone)]
pub struct OperationArgs {
    /// Entity id for `{id}` in the path
    #[arg(long)]
    pub id: Option<String>,

    /// Parameters as a JSON object
    #[arg(long, value_name = "JSON")]
    pub params: Option<String>,

    /// Field projection, e.g. `id,name,status`
    #[arg(long, visible_alias = "select")]
    pub fields: Option<String>,

    /// Follow paging links and print every element
    #[arg(long)]
    pub all: bool,

    /// Page limit for --all
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: u32,

    /// Element limit for --all
    #[arg(long, requires = "all", value_parser = parse_positive)]
    pub max_items: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Owner URN, e.g. urn:li:organization:2414183
    #[arg(long)]
    pub owner: String,

    /// Local path, @path, file://, http(s):// or s3://bucket/key
    #[arg(long, value_name = "REF")]
    pub file: String,

    /// Poll until the asset finishes processing
    #[arg(long)]
    pub wait: bool,

    /// Concurrent part uploads
    #[arg(long, default_value_t = DEFAULT_PARALLELISM, value_parser = parse_positive)]
    pub parallel: usize,

    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u64).range(0..=MAX_POLL_SECS)
    )]
    pub poll_interval: u64,

    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..=MAX_POLL_SECS)
    )]
    pub poll_timeout: u64,

    #[arg(
        long,
        default_value_t = DEFAULT_MAX_POLLS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_polls: u32,
}

#[derive(Args, Debug, Clone)]
pub struct RawArgs {
    /// HTTP method
    pub method: String,

    /// Path relative to the base URL
    pub path: String,

    /// Query parameters as a JSON object
    #[arg(long, value_name = "JSON")]
    pub query: Option<String>,

    /// Request body as JSON
    #[arg(long, value_name = "JSON")]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DescribeArgs {
    pub resource: String,
    pub operation: String,
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// The full command tree: fixed commands plus one subcommand per catalog
/// resource, with `upload` added for media resources.
pub fn build_command(catalog: &Catalog) -> Command {
    let mut cmd = Cli::command()
        .subcommand(Command::new("list").about("List resources and their operations"))
        .subcommand(DescribeArgs::augment_args(
            Command::new("describe").about("Show an operation's method, path and parameters"),
        ))
        .subcommand(RawArgs::augment_args(
            Command::new("raw").about("Send an arbitrary request"),
        ));

    for resource in &catalog.resources {
        let mut sub = Command::new(resource.name.clone())
            .about(resource.about.clone())
            .subcommand_required(true)
            .arg_required_else_help(true);
        for op in &resource.operations {
            let op_cmd = OperationArgs::augment_args(
                Command::new(op.name.clone()).about(op.about.clone()),
            );
            sub = sub.subcommand(with_param_flags(op_cmd, op));
        }
        if resource.name.parse::<MediaKind>().is_ok() {
            sub = sub.subcommand(UploadArgs::augment_args(
                Command::new("upload").about(format!("Upload a file as a new {}", resource.name)),
            ));
        }
        cmd = cmd.subcommand(sub);
    }
    cmd
}

/// Long flag for a catalog parameter: `pageSize` becomes `page-size`.
pub fn param_flag(name: &str) -> String {
    let mut flag = String::with_capacity(name.len() + 2);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if !flag.is_empty() {
                flag.push('-');
            }
            flag.push(c.to_ascii_lowercase());
        } else {
            flag.push(c);
        }
    }
    flag
}

fn param_id(name: &str) -> String {
    format!("param:{name}")
}

/// One flag per catalog parameter. Parameters whose flag would shadow a
/// fixed or global flag are reachable through `--params` only.
fn with_param_flags(mut cmd: Command, op: &Operation) -> Command {
    let global = Cli::command();
    let taken = |flag: &str| {
        cmd.get_arguments()
            .chain(global.get_arguments())
            .any(|arg| arg.get_long() == Some(flag))
    };
    let flags: Vec<Arg> = op
        .params
        .iter()
        .filter(|spec| !taken(&param_flag(&spec.name)))
        .map(param_arg)
        .collect();
    for arg in flags {
        cmd = cmd.arg(arg);
    }
    cmd
}

fn param_arg(spec: &ParamSpec) -> Arg {
    let arg = Arg::new(param_id(&spec.name))
        .long(param_flag(&spec.name))
        .value_name(spec.kind.as_str().to_uppercase())
        .value_parser(clap::value_parser!(String))
        .help(format!("Value for `{}`", spec.name));
    match spec.kind {
        ParamKind::List | ParamKind::UrnList => arg.action(ArgAction::Append),
        _ => arg.action(ArgAction::Set),
    }
}

/// Parameters given as flags, in catalog order. JSON is accepted where the
/// text parses as JSON; anything else is taken as a string.
pub fn param_values(op: &Operation, matches: &ArgMatches) -> Map<String, Value> {
    let mut values = Map::new();
    for spec in &op.params {
        let id = param_id(&spec.name);
        let Ok(Some(raw)) = matches.try_get_many::<String>(&id) else {
            continue;
        };
        let raw: Vec<&String> = raw.collect();
        let value = match (spec.kind, raw.as_slice()) {
            (ParamKind::List | ParamKind::UrnList, [single]) if is_restli_literal(single) => {
                Value::String(single.to_string())
            }
            (ParamKind::List, items) => Value::Array(items.iter().map(|v| flag_json(v)).collect()),
            (ParamKind::UrnList, items) => {
                Value::Array(items.iter().map(|v| Value::String(v.to_string())).collect())
            }
            (ParamKind::Urn, [single, ..]) => Value::String(single.to_string()),
            (_, [single, ..]) => flag_json(single),
            (_, []) => continue,
        };
        values.insert(spec.name.clone(), value);
    }
    values
}

fn flag_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// The innermost matched subcommand. Global flags are propagated down, so
/// this is where every global value can be read.
pub fn leaf(matches: &ArgMatches) -> &ArgMatches {
    let mut current = matches;
    while let Some((_, sub)) = current.subcommand() {
        current = sub;
    }
    current
}

pub fn global_args(matches: &ArgMatches) -> Result<GlobalArgs, clap::Error> {
    Cli::from_arg_matches(leaf(matches)).map(|cli| cli.global)
}
