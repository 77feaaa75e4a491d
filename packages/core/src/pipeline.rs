//! The batch job: decode the parameter table, walk the planned sheets,
//! query the model per window and assemble the output workbook. One bad
//! sheet is logged and skipped; a job that yields no records at all fails.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rowforge_types::{Result, anyhow, bail, now_stamp};
use serde::Serialize;

use crate::llm::{CompletionModel, build_prompt};
use crate::params::ParamTable;
use crate::range::RangeSpec;
use crate::reply::{Record, parse_reply};
use crate::workbook;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// Append-only in-memory job log; lines are prefixed `[HH:MM:SS] `. The
/// handle is cheap to clone so the server can poll while the job writes.
#[derive(Debug, Clone, Default)]
pub struct JobLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl JobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        tracing::info!("{}", msg);
        let line = format!("[{}] {}", now_stamp(), msg);
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub param_path: PathBuf,
    pub report_path: PathBuf,
    pub out_path: PathBuf,
}

/// Run one uploaded job end to end. The caller owns status bookkeeping;
/// this only reads the two uploads, drives the model and writes `out_path`.
pub async fn run_job(
    req: ProcessRequest,
    model: Arc<dyn CompletionModel>,
    log: JobLog,
) -> Result<()> {
    let param_bytes = tokio::fs::read(&req.param_path)
        .await
        .map_err(|e| anyhow!("failed to read parameter upload: {}", e))?;
    let report_bytes: Arc<Vec<u8>> = Arc::new(
        tokio::fs::read(&req.report_path)
            .await
            .map_err(|e| anyhow!("failed to read report upload: {}", e))?,
    );

    let params =
        tokio::task::spawn_blocking(move || ParamTable::decode(&param_bytes)).await??;
    log.push(format!(
        "parameter table decoded: mode {:?}, {} directive(s)",
        params.mode,
        params.directives.len()
    ));

    let names = {
        let bytes = report_bytes.clone();
        tokio::task::spawn_blocking(move || workbook::sheet_names(&bytes)).await??
    };
    log.push(format!("report workbook has {} sheet(s)", names.len()));

    let plan = params.plan(&names);
    for missing in &plan.missing {
        log.push(format!(
            "sheet '{}' listed in the parameter table is not in the report, skipping",
            missing
        ));
    }
    if plan.jobs.is_empty() {
        bail!("no sheets to process");
    }

    let mut records: Vec<Record> = Vec::new();
    for job in &plan.jobs {
        match process_sheet(&report_bytes, job, model.as_ref(), &log).await {
            Ok(mut sheet_records) => {
                log.push(format!(
                    "sheet '{}': {} record(s)",
                    job.sheet,
                    sheet_records.len()
                ));
                records.append(&mut sheet_records);
            }
            Err(e) => {
                log.push(format!("sheet '{}' failed, skipping: {:#}", job.sheet, e));
            }
        }
    }

    if records.is_empty() {
        bail!("no sheet produced any records");
    }
    log.push(format!("assembled {} record(s) in total", records.len()));

    let out_path = req.out_path.clone();
    let to_write = records;
    tokio::task::spawn_blocking(move || workbook::write_records(&to_write, &out_path))
        .await??;
    log.push("output workbook written, ready for download".to_string());

    Ok(())
}

async fn process_sheet(
    report_bytes: &Arc<Vec<u8>>,
    job: &crate::params::SheetJob,
    model: &dyn CompletionModel,
    log: &JobLog,
) -> Result<Vec<Record>> {
    let grid = {
        let bytes = report_bytes.clone();
        let sheet = job.sheet.clone();
        let spec: RangeSpec = job.range;
        tokio::task::spawn_blocking(move || workbook::read_window(&bytes, &sheet, &spec))
            .await??
    };

    let Some(grid) = grid else {
        log.push(format!(
            "sheet '{}': window misses the data, skipping",
            job.sheet
        ));
        return Ok(Vec::new());
    };

    log.push(format!(
        "sheet '{}': querying model with {} row(s)",
        job.sheet,
        grid.rows.len()
    ));

    let preview = workbook::preview_text(&grid, &job.sheet);
    let (system, user) = build_prompt(&job.sheet, &job.region, &job.product, &preview);
    let reply = model.complete(&system, &user).await?;

    let mut records = parse_reply(&reply)?;
    for record in &mut records {
        record.apply_defaults(&job.region, &job.product);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::workbook_bytes;
    use rowforge_types::async_trait;
    use std::collections::HashMap;

    /// Scripted model: replies keyed by the sheet name found in the user
    /// prompt.
    struct ScriptedModel {
        replies: HashMap<String, String>,
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            for (sheet, reply) in &self.replies {
                if user.contains(&format!("'{}'", sheet)) {
                    return Ok(reply.clone());
                }
            }
            bail!("no scripted reply matched");
        }
    }

    fn write_upload(dir: &std::path::Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn param_upload(flag: &str, rows: Vec<Vec<&str>>) -> Vec<u8> {
        let mut sheet = vec![
            vec!["mode", flag],
            vec!["sheet", "range", "region", "product"],
        ];
        sheet.extend(rows);
        workbook_bytes(&[("Params", sheet)])
    }

    fn report_upload() -> Vec<u8> {
        workbook_bytes(&[
            (
                "North",
                vec![
                    vec!["Title banner", "", ""],
                    vec!["grid", "target", "actual"],
                    vec!["A", "10", "3"],
                    vec!["B", "8", "5"],
                ],
            ),
            ("South", vec![vec!["grid", "score"], vec!["C", "99"]]),
        ])
    }

    #[tokio::test]
    async fn simple_job_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let param = write_upload(
            dir.path(),
            "param.xlsx",
            &param_upload("simple", vec![vec!["North", "A2:C4", "Banner", "P1"]]),
        );
        let report = write_upload(dir.path(), "report.xlsx", &report_upload());
        let out = dir.path().join("out.xlsx");

        let model = Arc::new(ScriptedModel {
            replies: HashMap::from([(
                "North".to_string(),
                r#"[{"unit": "A", "daily_target": 10, "daily_actual": 3},
                    {"unit": "B", "daily_target": 8, "daily_actual": 5}]"#
                    .to_string(),
            )]),
        });

        let log = JobLog::new();
        run_job(
            ProcessRequest {
                param_path: param,
                report_path: report,
                out_path: out.clone(),
            },
            model,
            log.clone(),
        )
        .await
        .unwrap();

        let bytes = std::fs::read(&out).unwrap();
        let range = workbook::worksheet_range(&bytes, "Result").unwrap();
        assert_eq!(workbook::read_cell(&range, 2, 1), "A");
        assert_eq!(workbook::read_cell(&range, 3, 1), "B");
        // Directive metadata fills the blanks the model left.
        assert_eq!(workbook::read_cell(&range, 2, 9), "Banner");
        assert_eq!(workbook::read_cell(&range, 2, 10), "P1");

        let lines = log.snapshot();
        assert!(lines.iter().any(|l| l.contains("2 record(s)")));
        assert!(lines.iter().any(|l| l.contains("ready for download")));
    }

    #[tokio::test]
    async fn bad_sheet_is_skipped_but_job_survives() {
        let dir = tempfile::tempdir().unwrap();
        let param = write_upload(
            dir.path(),
            "param.xlsx",
            &param_upload(
                "simple",
                vec![vec!["North", "", "", ""], vec!["South", "", "", ""]],
            ),
        );
        let report = write_upload(dir.path(), "report.xlsx", &report_upload());
        let out = dir.path().join("out.xlsx");

        let model = Arc::new(ScriptedModel {
            replies: HashMap::from([
                ("North".to_string(), "no table here, sorry".to_string()),
                (
                    "South".to_string(),
                    r#"[{"unit": "C", "score": 99}]"#.to_string(),
                ),
            ]),
        });

        let log = JobLog::new();
        run_job(
            ProcessRequest {
                param_path: param,
                report_path: report,
                out_path: out.clone(),
            },
            model,
            log.clone(),
        )
        .await
        .unwrap();

        let bytes = std::fs::read(&out).unwrap();
        let range = workbook::worksheet_range(&bytes, "Result").unwrap();
        assert_eq!(workbook::read_cell(&range, 2, 1), "C");
        assert!(
            log.snapshot()
                .iter()
                .any(|l| l.contains("'North' failed, skipping"))
        );
    }

    #[tokio::test]
    async fn job_with_no_records_fails() {
        let dir = tempfile::tempdir().unwrap();
        let param = write_upload(
            dir.path(),
            "param.xlsx",
            &param_upload("simple", vec![vec!["North", "", "", ""]]),
        );
        let report = write_upload(dir.path(), "report.xlsx", &report_upload());

        let model = Arc::new(ScriptedModel {
            replies: HashMap::from([("North".to_string(), "nothing tabular".to_string())]),
        });

        let err = run_job(
            ProcessRequest {
                param_path: param,
                report_path: report,
                out_path: dir.path().join("out.xlsx"),
            },
            model,
            JobLog::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no sheet produced any records"));
    }

    #[tokio::test]
    async fn missing_simple_sheet_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let param = write_upload(
            dir.path(),
            "param.xlsx",
            &param_upload(
                "simple",
                vec![vec!["Ghost", "", "", ""], vec!["South", "", "", ""]],
            ),
        );
        let report = write_upload(dir.path(), "report.xlsx", &report_upload());

        let model = Arc::new(ScriptedModel {
            replies: HashMap::from([(
                "South".to_string(),
                r#"[{"unit": "C"}]"#.to_string(),
            )]),
        });

        let log = JobLog::new();
        run_job(
            ProcessRequest {
                param_path: param,
                report_path: report,
                out_path: dir.path().join("out.xlsx"),
            },
            model,
            log.clone(),
        )
        .await
        .unwrap();

        assert!(
            log.snapshot()
                .iter()
                .any(|l| l.contains("'Ghost'") && l.contains("not in the report"))
        );
    }
}
