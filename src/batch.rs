// src/batch.rs

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::cnpj::normalize;
use crate::columns::resolve_cnpj_column;
use crate::config::{RunPaths, PACING_DELAY};
use crate::fetch::{HttpRegistry, LookupClient, LookupResult, RegistryApi, Sleep, ThreadSleep};
use crate::progress::{Progress, ProgressEvent, ProgressSink};
use crate::sheet::{self, RawRecord, Table};

/// Optional input column shown instead of the bare CNPJ in progress lines.
pub const DISPLAY_NAME_COLUMN: &str = "nome";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no CNPJ column found; available columns: {available:?}")]
    NoCnpjColumn { available: Vec<String> },
}

/// Drives the row loop: normalize → look up → collect, one row at a time.
pub struct BatchRunner<A = HttpRegistry, S = ThreadSleep> {
    client: LookupClient<A, S>,
    pacing: Duration,
}

impl<A: RegistryApi, S: Sleep> BatchRunner<A, S> {
    pub fn new(client: LookupClient<A, S>) -> Self {
        Self {
            client,
            pacing: PACING_DELAY,
        }
    }

    /// Gap slept between two consecutive lookups.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Looks up every row with a usable CNPJ, in input order.
    ///
    /// Rows whose identifier does not normalize are skipped and reported; the
    /// only error is a table with no CNPJ column, raised before any request.
    #[instrument(level = "info", skip_all, fields(rows = table.len()))]
    pub fn run<P: ProgressSink>(
        &self,
        table: &Table,
        mut sink: P,
    ) -> std::result::Result<Vec<LookupResult>, BatchError> {
        let column = resolve_cnpj_column(&table.columns)
            .ok_or_else(|| {
                error!(columns = ?table.columns, "no CNPJ column");
                BatchError::NoCnpjColumn {
                    available: table.columns.clone(),
                }
            })?
            .to_string();
        let name_column = table
            .columns
            .iter()
            .find(|c| c.trim().eq_ignore_ascii_case(DISPLAY_NAME_COLUMN))
            .cloned();

        let total = table.len();
        info!(column = %column, total, "CNPJ column detected");
        sink.emit(ProgressEvent::ColumnDetected {
            column: column.clone(),
            total,
        });

        let start = Instant::now();
        let mut results = Vec::new();
        let mut skipped = 0usize;
        let mut first_lookup = true;

        for (i, record) in table.rows.iter().enumerate() {
            let row = i + 1;
            let raw = record.get(&column);

            match normalize(raw) {
                None => {
                    skipped += 1;
                    warn!(row, raw = %raw, "invalid CNPJ, skipping row");
                    sink.emit(ProgressEvent::InvalidIdentifier {
                        row,
                        raw: raw.to_string(),
                    });
                }
                Some(cnpj) => {
                    if !first_lookup {
                        self.client.sleeper().sleep(self.pacing);
                    }
                    first_lookup = false;

                    let display = display_name(record, name_column.as_deref())
                        .unwrap_or_else(|| cnpj.to_string());
                    info!(row, %cnpj, "querying");
                    sink.emit(ProgressEvent::Querying {
                        row,
                        cnpj: cnpj.clone(),
                        display,
                    });

                    let outcome = self.client.lookup_with(&cnpj, |notice| {
                        sink.emit(ProgressEvent::Retrying {
                            cnpj: cnpj.clone(),
                            notice: notice.clone(),
                        })
                    });

                    match outcome {
                        Ok(result) => {
                            sink.emit(ProgressEvent::Resolved {
                                row,
                                result: result.clone(),
                            });
                            results.push(result);
                        }
                        Err(e) => {
                            skipped += 1;
                            error!(row, %cnpj, error = %e, "lookup abandoned");
                            sink.emit(ProgressEvent::LookupFailed {
                                row,
                                cnpj,
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }

            sink.emit(ProgressEvent::Progress(Progress {
                processed: row,
                total,
                elapsed: start.elapsed(),
            }));
        }

        info!(records = results.len(), skipped, "batch finished");
        sink.emit(ProgressEvent::Finished {
            records: results.len(),
            skipped,
        });
        Ok(results)
    }
}

fn display_name(record: &RawRecord, name_column: Option<&str>) -> Option<String> {
    let value = record.get(name_column?);
    if value.is_empty() {
        None
    } else {
        Some(value.to_string().trim().to_string())
    }
}

/// Reads `paths.input`, runs the batch, then writes `paths.output` in one go.
/// Nothing is written unless the whole run completes. Returns the number of
/// records written.
pub fn process_file<A: RegistryApi, S: Sleep, P: ProgressSink>(
    runner: &BatchRunner<A, S>,
    paths: &RunPaths,
    sink: P,
) -> Result<usize> {
    let table = sheet::read_table(&paths.input)
        .with_context(|| format!("reading {}", paths.input.display()))?;
    info!(path = %paths.input.display(), rows = table.len(), columns = table.columns.len(), "input loaded");

    let results = runner.run(&table, sink)?;

    sheet::write_results(&paths.output, &results)
        .with_context(|| format!("writing {}", paths.output.display()))?;
    info!(path = %paths.output.display(), records = results.len(), "output written");
    Ok(results.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnpj::Cnpj;
    use crate::config::LookupConfig;
    use crate::fetch::{RegistryResponse, RetryReason};
    use crate::sheet::CellValue;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,cnpjscraper=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    type Outcome = std::result::Result<RegistryResponse, RetryReason>;

    /// Per-CNPJ scripted outcomes; an unscripted CNPJ answers OK with its own digits as name.
    #[derive(Default)]
    struct FakeRegistry {
        scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRegistry {
        fn script(self, cnpj: &str, outcomes: Vec<Outcome>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(cnpj.to_string(), outcomes.into());
            self
        }
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RegistryApi for FakeRegistry {
        fn fetch(&self, cnpj: &Cnpj) -> Outcome {
            self.calls.lock().unwrap().push(cnpj.to_string());
            let scripted = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(cnpj.as_str())
                .and_then(|q| q.pop_front());
            scripted.unwrap_or_else(|| {
                Ok(serde_json::from_value(json!({
                    "status": "OK",
                    "nome": format!("EMPRESA {}", cnpj),
                    "simples": { "optante": false },
                    "simei": { "optante": true }
                }))
                .unwrap())
            })
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Duration>>);

    impl Sleep for Recorder {
        fn sleep(&self, dur: Duration) {
            self.0.lock().unwrap().push(dur);
        }
    }

    impl Recorder {
        fn secs(&self) -> Vec<u64> {
            self.0.lock().unwrap().iter().map(|d| d.as_secs()).collect()
        }
    }

    fn table(columns: &[&str], rows: Vec<Vec<CellValue>>) -> Table {
        Table::from_grid(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.into())
    }

    fn runner<'a>(
        api: &'a FakeRegistry,
        sleeper: &'a Recorder,
        config: LookupConfig,
    ) -> BatchRunner<&'a FakeRegistry, &'a Recorder> {
        BatchRunner::new(LookupClient::new(api, sleeper, config))
    }

    #[test]
    fn test_invalid_row_is_skipped_and_order_kept() {
        init_test_logging();
        let api = FakeRegistry::default();
        let sleeper = Recorder::default();
        let t = table(
            &["Razão Social", "CNPJ Empresa"],
            vec![
                vec![text("A"), text("11.222.333/0001-81")],
                vec![text("B"), text("123")],
                vec![text("C"), CellValue::Number(1222333000181.0)],
            ],
        );

        let mut events = Vec::new();
        let out = runner(&api, &sleeper, LookupConfig::default())
            .run(&t, &mut events)
            .unwrap();

        let cnpjs: Vec<_> = out.iter().map(|r| r.cnpj.to_string()).collect();
        assert_eq!(cnpjs, vec!["11222333000181", "01222333000181"]);
        assert_eq!(api.calls(), cnpjs);
        // one pacing gap between the two lookups, none after the last
        assert_eq!(sleeper.secs(), vec![3]);

        assert!(events.contains(&ProgressEvent::InvalidIdentifier {
            row: 2,
            raw: "123".into()
        }));
        let progress: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress(p) => Some((p.processed, p.percent())),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(1, 33), (2, 66), (3, 100)]);
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Finished {
                records: 2,
                skipped: 1
            })
        );
    }

    #[test]
    fn test_missing_column_fails_before_any_request() {
        let api = FakeRegistry::default();
        let sleeper = Recorder::default();
        let t = table(&["A", "B"], vec![vec![text("11222333000181"), text("x")]]);

        let err = runner(&api, &sleeper, LookupConfig::default())
            .run(&t, ())
            .unwrap_err();

        let BatchError::NoCnpjColumn { available } = &err;
        assert_eq!(available, &vec!["A".to_string(), "B".to_string()]);
        assert!(err.to_string().contains(r#"["A", "B"]"#));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_retries_reach_the_sink_and_pacing_is_separate() {
        let api = FakeRegistry::default().script(
            "22333444000155",
            vec![
                Err(RetryReason::HttpStatus(429)),
                Err(RetryReason::Network("timed out".into())),
            ],
        );
        let sleeper = Recorder::default();
        let t = table(
            &["cnpj"],
            vec![vec![text("11222333000181")], vec![text("22.333.444/0001-55")]],
        );

        let mut events = Vec::new();
        let out = runner(&api, &sleeper, LookupConfig::default())
            .run(&t, &mut events)
            .unwrap();

        assert_eq!(out.len(), 2);
        // pacing, then backoff 3s and 5s inside the second lookup
        assert_eq!(sleeper.secs(), vec![3, 3, 5]);
        let retries = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Retrying { .. }))
            .count();
        assert_eq!(retries, 2);
    }

    #[test]
    fn test_exhausted_lookup_is_isolated_to_its_row() {
        let api = FakeRegistry::default().script(
            "11222333000181",
            vec![Err(RetryReason::HttpStatus(500))],
        );
        let sleeper = Recorder::default();
        let config = LookupConfig {
            max_attempts: Some(1),
            ..LookupConfig::default()
        };
        let t = table(
            &["cnpj"],
            vec![vec![text("11222333000181")], vec![text("22333444000155")]],
        );

        let mut events = Vec::new();
        let out = runner(&api, &sleeper, config).run(&t, &mut events).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].cnpj.as_str(), "22333444000155");
        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressEvent::LookupFailed { row: 1, .. })));
    }

    #[test]
    fn test_display_name_from_nome_column() {
        let api = FakeRegistry::default();
        let sleeper = Recorder::default();
        let t = table(
            &["Nome", "CNPJ"],
            vec![
                vec![text("Padaria do Zé"), text("11222333000181")],
                vec![CellValue::Empty, text("22333444000155")],
            ],
        );

        let mut events = Vec::new();
        runner(&api, &sleeper, LookupConfig::default())
            .with_pacing(Duration::ZERO)
            .run(&t, &mut events)
            .unwrap();

        let displays: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Querying { display, .. } => Some(display.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(displays, vec!["Padaria do Zé", "22333444000155"]);
        assert_eq!(sleeper.secs(), vec![0]);
    }

    #[test]
    fn test_empty_table() {
        let api = FakeRegistry::default();
        let sleeper = Recorder::default();
        let t = table(&["cnpj"], vec![]);

        let mut events = Vec::new();
        let out = runner(&api, &sleeper, LookupConfig::default())
            .run(&t, &mut events)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(events.len(), 2);
    }
}
