//! Status report contract for the reporting and mailing collaborators.
//!
//! The core's only obligation here is shape: [`Context`] binds the
//! [`RunSummary`](crate::run::RunSummary) fields a report needs (per-device
//! status rows, aggregate counts, timestamps). Rendering engines and mail
//! transports are external collaborators behind the [`ReportRenderer`] and
//! [`Mailer`] traits; they run strictly after backup work is complete, and a
//! failure in either cannot alter recorded backup outcomes.

use std::future::Future;

use log::info;

use crate::credentials::MailSettings;
use crate::error::{MailError, ReportError};
use crate::run::RunSummary;

/// Report-facing view of one run.
#[derive(Debug, Clone)]
pub struct Context {
    /// Organization label from the credential store.
    pub org: String,

    /// Run date, `YYYY-MM-DD`.
    pub date: String,

    /// Per-device rows, in inventory order.
    pub rows: Vec<Row>,

    /// Devices backed up.
    pub succeeded: usize,

    /// Devices that failed.
    pub failed: usize,

    /// Devices that timed out.
    pub timed_out: usize,

    /// Total wall-clock seconds.
    pub elapsed_secs: f64,
}

/// One device's line in the report.
#[derive(Debug, Clone)]
pub struct Row {
    /// Device name.
    pub device: String,

    /// Terminal status label.
    pub status: String,

    /// Error detail, empty for successes.
    pub detail: String,

    /// Dispatch duration in milliseconds.
    pub duration_ms: u128,
}

impl Context {
    /// Bind a run summary into report shape.
    pub fn from_summary(org: &str, summary: &RunSummary) -> Self {
        Self {
            org: org.to_string(),
            date: summary.started_at.format("%Y-%m-%d").to_string(),
            rows: summary
                .results
                .iter()
                .map(|r| Row {
                    device: r.device.clone(),
                    status: r.status.to_string(),
                    detail: r.message.clone().unwrap_or_default(),
                    duration_ms: r.elapsed.as_millis(),
                })
                .collect(),
            succeeded: summary.succeeded,
            failed: summary.failed,
            timed_out: summary.timed_out,
            elapsed_secs: summary.elapsed.as_secs_f64(),
        }
    }
}

/// Renders a [`Context`] into a report document.
pub trait ReportRenderer {
    /// Produce the report body.
    fn render(&self, context: &Context) -> Result<String, ReportError>;
}

/// Built-in renderer: a plain HTML status table.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlReport;

impl ReportRenderer for HtmlReport {
    fn render(&self, context: &Context) -> Result<String, ReportError> {
        let mut rows = String::new();
        for row in &context.rows {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{} ms</td></tr>\n",
                escape(&row.device),
                row.status,
                escape(&row.detail),
                row.duration_ms,
            ));
        }

        Ok(format!(
            "<html><body>\n\
             <h2>Backup report for {org} at {date}</h2>\n\
             <p>{ok} ok, {failed} failed, {timed_out} timed out \
             ({elapsed:.1}s total)</p>\n\
             <table border=\"1\">\n\
             <tr><th>Device</th><th>Status</th><th>Detail</th><th>Duration</th></tr>\n\
             {rows}\
             </table>\n\
             </body></html>\n",
            org = escape(&context.org),
            date = context.date,
            ok = context.succeeded,
            failed = context.failed,
            timed_out = context.timed_out,
            elapsed = context.elapsed_secs,
        ))
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Delivers a rendered report. The SMTP transport itself is a collaborator
/// implementation; the core only defines the contract.
pub trait Mailer {
    /// Send `body` with `subject` using `settings`.
    fn send(
        &self,
        settings: &MailSettings,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), MailError>> + Send;
}

/// Mailer for runs without SMTP: records what would have been sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send(
        &self,
        settings: &MailSettings,
        subject: &str,
        body: &str,
    ) -> Result<(), MailError> {
        info!(
            "Report '{subject}' ({} bytes) for {} not mailed (no SMTP transport wired in)",
            body.len(),
            settings.to
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::dispatch::{BackupResult, BackupStatus};

    fn summary() -> RunSummary {
        let now = Utc::now();
        let result = |device: &str, status, message: Option<&str>| BackupResult {
            device: device.into(),
            status,
            message: message.map(ToString::to_string),
            artifact: None,
            payload_bytes: 0,
            started_at: now,
            finished_at: now,
            elapsed: Duration::from_millis(1500),
        };
        RunSummary {
            results: vec![
                result("gw-one", BackupStatus::Success, None),
                result("gw-bad", BackupStatus::Failure, Some("unknown vendor")),
            ],
            succeeded: 1,
            failed: 1,
            timed_out: 0,
            started_at: now,
            finished_at: now,
            elapsed: Duration::from_secs(3),
        }
    }

    #[test]
    fn context_binds_summary_rows_in_order() {
        let context = Context::from_summary("acme", &summary());
        assert_eq!(context.org, "acme");
        assert_eq!(context.rows.len(), 2);
        assert_eq!(context.rows[0].device, "gw-one");
        assert_eq!(context.rows[0].status, "OK");
        assert_eq!(context.rows[1].detail, "unknown vendor");
    }

    #[test]
    fn html_report_contains_counts_and_rows() {
        let context = Context::from_summary("acme", &summary());
        let html = HtmlReport.render(&context).unwrap();
        assert!(html.contains("Backup report for acme"));
        assert!(html.contains("1 ok, 1 failed, 0 timed out"));
        assert!(html.contains("<td>gw-one</td><td>OK</td>"));
        assert!(html.contains("unknown vendor"));
    }

    #[test]
    fn html_report_escapes_device_detail() {
        let mut summary = summary();
        summary.results[1].message = Some("<script>alert(1)</script>".into());
        let html = HtmlReport
            .render(&Context::from_summary("acme", &summary))
            .unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    /// A reporting-stage failure must not alter any recorded backup result.
    #[tokio::test]
    async fn report_failure_leaves_summary_untouched() {
        struct FailingRenderer;
        impl ReportRenderer for FailingRenderer {
            fn render(&self, _: &Context) -> Result<String, ReportError> {
                Err(ReportError::Render("template exploded".into()))
            }
        }

        struct FailingMailer;
        impl Mailer for FailingMailer {
            async fn send(
                &self,
                _: &MailSettings,
                _: &str,
                _: &str,
            ) -> Result<(), MailError> {
                Err(MailError::Delivery("relay refused".into()))
            }
        }

        let summary = summary();
        let before: Vec<(String, BackupStatus)> = summary
            .results
            .iter()
            .map(|r| (r.device.clone(), r.status))
            .collect();

        let context = Context::from_summary("acme", &summary);
        assert!(FailingRenderer.render(&context).is_err());

        let settings = MailSettings {
            host: "mx".into(),
            port: 587,
            username: "u".into(),
            password: secrecy::SecretString::from("p".to_string()),
            from: "a@b".into(),
            to: "c@d".into(),
        };
        assert!(FailingMailer.send(&settings, "subject", "body").await.is_err());

        let after: Vec<(String, BackupStatus)> = summary
            .results
            .iter()
            .map(|r| (r.device.clone(), r.status))
            .collect();
        assert_eq!(before, after);
        assert_eq!(summary.succeeded, 1);
    }
}
