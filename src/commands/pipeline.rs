use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Local;
use tracing::{error, info};

use crate::cli::RunArgs;
use crate::commands::extract::{BatchRequest, extract_batch};
use crate::commands::matching::match_documents;
use crate::commands::review::{enqueue_records, open_review_db};
use crate::commands::routing::{DocumentNamer, route_documents};
use crate::commands::upload::{UploadRequest, upload_approved};
use crate::crm::{CrmClient, CrmConfig};
use crate::model::WorkPaths;
use crate::rules::ExtractionRules;

#[derive(Debug, Clone, Copy, Default)]
pub struct PassSummary {
    pub extracted: usize,
    pub matched: usize,
    pub queued: usize,
    pub uploaded: usize,
}

/// One configured intake pipeline: extract, match, route, queue and
/// optionally upload rows operators have already approved.
pub struct Pipeline {
    args: RunArgs,
    rules: ExtractionRules,
    paths: WorkPaths,
    client: CrmClient,
}

impl Pipeline {
    pub fn new(args: RunArgs) -> Result<Self> {
        let rules = ExtractionRules::load(args.rules_path.as_deref())?;
        let paths = WorkPaths::new(&args.cache_root);
        let client = CrmClient::new(CrmConfig::from_args(&args.crm)?)?;
        if args.upload_approved && !client.has_secret_token() {
            bail!("CRM secret token is not set (use --secret-token or LOGIQS_SECRET_TOKEN)");
        }
        Ok(Self {
            args,
            rules,
            paths,
            client,
        })
    }

    pub async fn run_once(&self) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        let attempt_delay = Duration::from_millis(self.args.crm.attempt_delay_ms);

        let request = BatchRequest::new(
            self.paths.clone(),
            &self.args.source,
            &self.args.ocr,
            self.rules.clone(),
            "cp2000 run".to_string(),
        );
        let extraction = extract_batch(&request).await?;
        summary.extracted = extraction.manifest.results.len();

        if summary.extracted > 0 {
            let matched = match_documents(
                &self.client,
                &self.rules,
                attempt_delay,
                extraction.manifest.results.clone(),
                &extraction.manifest_path,
                &self.paths,
                !self.args.no_enhanced,
                None,
            )
            .await?;
            summary.matched = matched.manifest.counts.matched;

            let namer = DocumentNamer::new(&self.rules, Local::now().date_naive())?;
            route_documents(&matched.manifest.records, &namer, &self.paths)?;

            if self.args.skip_review {
                info!("review queue skipped for this pass");
            } else {
                let mut connection = open_review_db(&self.paths.review_db_path)?;
                summary.queued =
                    enqueue_records(&mut connection, &matched.manifest.records, &namer)?.inserted;
            }
        }

        if self.args.upload_approved {
            let connection = open_review_db(&self.paths.review_db_path)?;
            let request = UploadRequest {
                limit: None,
                dry_run: false,
                skip_tasks: false,
                delay: attempt_delay,
                manifest_dir: self.paths.manifest_dir.clone(),
            };
            let (_, manifest) = upload_approved(Some(&self.client), &connection, &request).await?;
            summary.uploaded = manifest
                .outcomes
                .iter()
                .filter(|outcome| outcome.document_uploaded)
                .count();
        }

        info!(
            extracted = summary.extracted,
            matched = summary.matched,
            queued = summary.queued,
            uploaded = summary.uploaded,
            "pipeline pass complete"
        );
        Ok(summary)
    }
}

pub async fn run(args: RunArgs) -> Result<()> {
    let watch = args.watch;
    let pipeline = Pipeline::new(args)?;

    let Some(interval) = watch else {
        pipeline.run_once().await?;
        return Ok(());
    };

    let interval = Duration::from_secs(interval.max(1));
    info!(interval_secs = interval.as_secs(), "watching intake folders");
    loop {
        if let Err(err) = pipeline.run_once().await {
            error!(error = %err, "pipeline pass failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping watch");
                return Ok(());
            }
        }
    }
}
