use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

pub const DEFAULT_CACHE_ROOT: &str = ".cache/cp2000";

#[derive(Parser, Debug)]
#[command(
    name = "cp2000",
    version,
    about = "CP2000 notice extraction, CRM matching, review and upload tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// OCR intake PDFs and extract notice fields.
    Extract(ExtractArgs),
    /// Match extracted notices against CRM cases.
    Match(MatchArgs),
    /// Inspect and decide rows in the review queue.
    Review(ReviewArgs),
    /// Upload approved documents and create follow-up tasks.
    Upload(UploadArgs),
    /// Extract, match, route and queue in one pass, optionally on an interval.
    Run(RunArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Intake folder to scan recursively; repeatable.
    #[arg(long = "input", required = true)]
    pub input_dirs: Vec<PathBuf>,

    /// Only PDFs below a folder whose name contains this text are processed.
    #[arg(long, default_value = "CP2000")]
    pub folder_filter: String,

    #[arg(long, default_value_t = false)]
    pub no_folder_filter: bool,

    #[arg(long)]
    pub limit: Option<usize>,

    /// Process at most five documents.
    #[arg(long, default_value_t = false)]
    pub test: bool,

    /// Ignore the processing ledger and reprocess everything.
    #[arg(long, default_value_t = false)]
    pub full: bool,
}

impl SourceArgs {
    pub fn effective_limit(&self) -> Option<usize> {
        match (self.test, self.limit) {
            (true, Some(limit)) => Some(limit.min(5)),
            (true, None) => Some(5),
            (false, limit) => limit,
        }
    }

    pub fn folder_filter(&self) -> Option<&str> {
        if self.no_folder_filter || self.folder_filter.trim().is_empty() {
            None
        } else {
            Some(self.folder_filter.as_str())
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct OcrArgs {
    #[arg(long, value_enum, default_value_t = OcrMode::Force)]
    pub ocr_mode: OcrMode,

    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    /// Text-layer characters needed to skip OCR in `auto` mode.
    #[arg(long, default_value_t = 120)]
    pub ocr_min_text_chars: usize,

    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u32).range(72..=800))]
    pub dpi: u32,

    #[arg(long = "psm", value_delimiter = ',', default_values_t = [6_u8, 4, 3, 11, 13, 8])]
    pub psm_modes: Vec<u8>,

    #[arg(long, default_value_t = 3)]
    pub max_pages: u32,

    #[arg(long, default_value_t = 60)]
    pub ocr_timeout_secs: u64,

    /// Concurrent OCR documents; defaults to available parallelism.
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OcrMode {
    Off,
    Auto,
    Force,
}

impl OcrMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Auto => "auto",
            Self::Force => "force",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CrmArgs {
    #[arg(
        long,
        env = "CP2000_CRM_BASE_URL",
        default_value = "https://tps.logiqs.com/publicapi"
    )]
    pub crm_base_url: String,

    #[arg(long, env = "LOGIQS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "LOGIQS_SECRET_TOKEN", hide_env_values = true)]
    pub secret_token: Option<String>,

    #[arg(long, default_value = "/V3/Case/FindCase")]
    pub case_match_path: String,

    #[arg(long, default_value = "/2020-02-22/documents/casedocument")]
    pub document_path: String,

    #[arg(long, default_value = "/V3/Task/Task")]
    pub task_path: String,

    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Pause between successive CRM calls.
    #[arg(long, default_value_t = 100)]
    pub attempt_delay_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub ocr: OcrArgs,

    #[arg(long)]
    pub rules_path: Option<PathBuf>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MatchArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    /// Extraction manifest to match; defaults to the newest one.
    #[arg(long)]
    pub extraction_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    /// Skip the name-variant and SSN-correction retry pass.
    #[arg(long, default_value_t = false)]
    pub no_enhanced: bool,

    #[command(flatten)]
    pub crm: CrmArgs,

    #[arg(long)]
    pub rules_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReviewArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub action: ReviewAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReviewAction {
    List(ReviewListArgs),
    Set(ReviewSetArgs),
    /// Queue the records of a match manifest; defaults to the newest one.
    Enqueue(ReviewEnqueueArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ReviewListArgs {
    #[arg(long, value_enum)]
    pub status: Option<ReviewStatus>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReviewSetArgs {
    #[arg(long)]
    pub id: i64,

    #[arg(long, value_enum)]
    pub status: ReviewStatus,

    #[arg(long)]
    pub case_id: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReviewEnqueueArgs {
    #[arg(long)]
    pub match_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub rules_path: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ReviewStatus {
    Approve,
    UnderReview,
    Reject,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Reject => "REJECT",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[command(flatten)]
    pub crm: CrmArgs,

    #[arg(long)]
    pub limit: Option<usize>,

    /// List what would be uploaded without calling the CRM.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value_t = false)]
    pub skip_tasks: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub ocr: OcrArgs,

    #[command(flatten)]
    pub crm: CrmArgs,

    #[arg(long)]
    pub rules_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub no_enhanced: bool,

    /// Do not queue results for review.
    #[arg(long, default_value_t = false)]
    pub skip_review: bool,

    /// Upload rows already approved in the review queue at the end of each pass.
    #[arg(long, default_value_t = false)]
    pub upload_approved: bool,

    /// Repeat the pass every N seconds instead of running once.
    #[arg(long)]
    pub watch: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,
}
